//! Loading Lua modules from disk.

use super::SyntaxTree;
use crate::error::{Error, Result};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::{debug, trace, warn};
use walkdir::WalkDir;

/// Extension of Lua source files
pub const LUA_EXTENSION: &str = "lua";

/// Supplies parsed syntax trees to the reconstruction engine.
///
/// Implement this trait to feed trees from somewhere other than the
/// filesystem, e.g. sources extracted from an archive.
pub trait SyntaxSource {
    /// Resolves a module identifier or `require` path to its syntax tree
    fn resolve(&self, module: &str) -> Result<&SyntaxTree>;
}

/// Parses a single `.lua` file or every `.lua` file of a directory up front and
/// indexes the trees by file name without extension
#[derive(Debug, Clone, Default)]
pub struct LuaSourceLoader {
    trees: BTreeMap<String, SyntaxTree>,
}

impl LuaSourceLoader {
    /// Creates an empty loader
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a file, or all `.lua` files directly inside a directory
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::load_with(path.as_ref(), Err)
    }

    /// Like [`load`](Self::load), but files that fail to parse are skipped.
    ///
    /// Returns the skipped files' errors alongside the loader. I/O errors
    /// still abort.
    pub fn load_lenient(path: impl AsRef<Path>) -> Result<(Self, Vec<Error>)> {
        let mut skipped = Vec::new();
        let loader = Self::load_with(path.as_ref(), |err| {
            if !err.is_recoverable() {
                return Err(err);
            }
            warn!("Skipping unparsable module: {}", err);
            skipped.push(err);
            Ok(())
        })?;
        Ok((loader, skipped))
    }

    fn load_with(path: &Path, mut on_error: impl FnMut(Error) -> Result<()>) -> Result<Self> {
        let mut loader = Self::new();

        if path.is_file() {
            if let Err(err) = loader.load_file(path) {
                on_error(err)?;
            }
        } else {
            for entry in WalkDir::new(path).min_depth(1).max_depth(1).sort_by_file_name() {
                let entry = entry.map_err(|source| Error::DirectoryRead {
                    path: path.to_path_buf(),
                    source,
                })?;
                let file = entry.path();

                let is_lua = file.extension().and_then(|e| e.to_str()) == Some(LUA_EXTENSION);
                if !entry.file_type().is_file() || !is_lua {
                    trace!("Skipping {}", file.display());
                    continue;
                }

                if let Err(err) = loader.load_file(file) {
                    on_error(err)?;
                }
            }
        }

        debug!("Loaded {} Lua syntax tree(s) from {}", loader.len(), path.display());
        Ok(loader)
    }

    fn load_file(&mut self, path: &Path) -> Result<()> {
        let bytes = fs::read(path).map_err(|e| Error::file_read(path, e))?;
        // Generated modules may carry comments in legacy encodings such as GBK
        let text = String::from_utf8_lossy(&bytes);
        if let Cow::Owned(_) = text {
            debug!("{} is not valid UTF-8; invalid bytes replaced", path.display());
        }
        let source_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();

        trace!("Parsing {}", path.display());
        self.insert(SyntaxTree::parse(source_name, &text)?);
        Ok(())
    }

    /// Parses source text and adds it under its module name
    pub fn add_source(&mut self, source_name: impl Into<String>, text: &str) -> Result<()> {
        self.insert(SyntaxTree::parse(source_name, text)?);
        Ok(())
    }

    /// Builder-style variant of [`add_source`](Self::add_source)
    pub fn with_source(mut self, source_name: impl Into<String>, text: &str) -> Result<Self> {
        self.add_source(source_name, text)?;
        Ok(self)
    }

    /// Adds an already parsed tree, replacing any tree with the same module name
    pub fn insert(&mut self, tree: SyntaxTree) {
        self.trees.insert(tree.module.clone(), tree);
    }

    /// Module identifiers in sorted order
    pub fn modules(&self) -> impl Iterator<Item = &str> {
        self.trees.keys().map(String::as_str)
    }

    /// Loaded trees in module-name order
    pub fn trees(&self) -> impl Iterator<Item = &SyntaxTree> {
        self.trees.values()
    }

    /// Number of loaded trees
    pub fn len(&self) -> usize {
        self.trees.len()
    }

    /// Returns true if nothing was loaded
    pub fn is_empty(&self) -> bool {
        self.trees.is_empty()
    }
}

impl SyntaxSource for LuaSourceLoader {
    fn resolve(&self, module: &str) -> Result<&SyntaxTree> {
        self.trees
            .get(module_identifier(module))
            .ok_or_else(|| Error::module_not_found(module))
    }
}

/// Reduces a `require` path to the module identifier it names.
///
/// Both `protos/common_pb` and `protos.common_pb` name `common_pb`.
pub(crate) fn module_identifier(path: &str) -> &str {
    let path = super::module_name(path);
    path.rsplit(|c: char| matches!(c, '/' | '\\' | '.'))
        .next()
        .unwrap_or(path)
}
