//! Error types for the protolift-core library.
//!
//! This module provides error handling using the `thiserror` crate,
//! with one variant per failure mode of loading, reconstruction and export.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for protolift operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for all protolift operations
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Failed to read input file
    #[error("failed to read file '{path}': {source}")]
    FileRead {
        /// Path to the file that failed to read
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Failed to walk an input directory
    #[error("failed to list directory '{path}': {source}")]
    DirectoryRead {
        /// Directory being listed
        path: PathBuf,
        /// Underlying walk error
        #[source]
        source: walkdir::Error,
    },

    /// Lua source text could not be parsed
    #[error("syntax error in '{source_name}': {details}")]
    Syntax {
        /// File name of the offending source
        source_name: String,
        /// Parser message, including position
        details: String,
    },

    /// An import names a module the source provider does not know
    #[error("module '{module}' not found")]
    ModuleNotFound {
        /// Requested module identifier
        module: String,
    },

    /// The module does not have the shape of descriptor-pool construction code
    #[error("malformed module '{module}': {details}")]
    MalformedInput {
        /// Module being reconstructed
        module: String,
        /// What is wrong with it
        details: String,
    },

    /// A type reference names a symbol that is bound neither locally nor in an import
    #[error("unresolved reference '{symbol}' in module '{module}'")]
    UnresolvedReference {
        /// Module being reconstructed
        module: String,
        /// The reference as written
        symbol: String,
    },

    /// A construct that cannot be reconstructed at all
    #[error("unsupported construct in module '{module}': {construct}")]
    Unsupported {
        /// Module being reconstructed
        module: String,
        /// Description of the construct
        construct: String,
    },

    /// Unsupported proto syntax version
    #[error("unsupported proto syntax: '{syntax}'")]
    UnsupportedSyntax {
        /// The unsupported syntax string
        syntax: String,
    },

    /// Modules import each other
    #[error("cyclic import: {}", chain.join(" -> "))]
    CyclicImport {
        /// Module identifiers forming the cycle, first repeated at the end
        chain: Vec<String>,
    },

    /// Failed to build file descriptors with prost-reflect
    #[error("failed to build file descriptor: {0}")]
    DescriptorBuild(String),
}

impl Error {
    /// Creates a new file read error
    pub fn file_read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileRead {
            path: path.into(),
            source,
        }
    }

    /// Creates a new syntax error
    pub fn syntax(source_name: impl Into<String>, details: impl Into<String>) -> Self {
        Self::Syntax {
            source_name: source_name.into(),
            details: details.into(),
        }
    }

    /// Creates a new module-not-found error
    pub fn module_not_found(module: impl Into<String>) -> Self {
        Self::ModuleNotFound {
            module: module.into(),
        }
    }

    /// Creates a new malformed input error
    pub fn malformed(module: impl Into<String>, details: impl Into<String>) -> Self {
        Self::MalformedInput {
            module: module.into(),
            details: details.into(),
        }
    }

    /// Creates a new unresolved reference error
    pub fn unresolved(module: impl Into<String>, symbol: impl Into<String>) -> Self {
        Self::UnresolvedReference {
            module: module.into(),
            symbol: symbol.into(),
        }
    }

    /// Creates a new unsupported construct error
    pub fn unsupported(module: impl Into<String>, construct: impl Into<String>) -> Self {
        Self::Unsupported {
            module: module.into(),
            construct: construct.into(),
        }
    }

    /// Creates a new descriptor build error
    pub fn descriptor_build(msg: impl Into<String>) -> Self {
        Self::DescriptorBuild(msg.into())
    }

    /// Returns true if the failure is confined to one module graph, so a caller
    /// processing many modules can skip it and continue
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Syntax { .. }
                | Self::ModuleNotFound { .. }
                | Self::MalformedInput { .. }
                | Self::UnresolvedReference { .. }
                | Self::Unsupported { .. }
                | Self::CyclicImport { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::unresolved("person_pb", "common_pb.ITEM");
        assert!(err.to_string().contains("unresolved reference"));
        assert!(err.to_string().contains("common_pb.ITEM"));
    }

    #[test]
    fn test_cyclic_import_display() {
        let err = Error::CyclicImport {
            chain: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(err.to_string(), "cyclic import: a -> b -> a");
    }

    #[test]
    fn test_is_recoverable() {
        assert!(Error::malformed("m", "no return").is_recoverable());
        assert!(Error::module_not_found("m").is_recoverable());
        assert!(!Error::descriptor_build("test").is_recoverable());
    }
}
