//! Schema reconstruction from Lua descriptor-pool code.
//!
//! ## Architecture
//!
//! A [`ProtoReconstructor`] is one reconstruction session. It walks a module's
//! statements once, left to right, and:
//!
//! 1. Binds every `Descriptor()`-style factory call to its table key
//! 2. Applies `key.member = value` assignments to the bound object
//! 3. Recursively reconstructs modules pulled in with `require`
//! 4. Validates the module shape and freezes the result as a [`SchemaFile`]
//!
//! Completed modules are memoised per session, so every importer of a module
//! shares the same `Rc<SchemaFile>`.

mod module;

use crate::error::{Error, Result};
use crate::schema::{EntryId, ProtoSyntax, SchemaFile};
use crate::syntax::{SyntaxSource, SyntaxTree};
use module::ModuleBuilder;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use tracing::{debug, trace, warn};

/// `require` paths of the Lua protobuf runtime
pub const PROTOBUF_LIBRARY_PATHS: &[&str] = &["protobuf/protobuf", "protobuf"];

/// Suffix of the descriptor table name, replaced by `.proto` in file names
pub const TABLE_SUFFIX: &str = "_pbTable";

/// Configuration for reconstruction
#[derive(Debug, Clone, Default)]
pub struct ReconstructorConfig {
    /// Type enum-typed fields as `int32` instead of resolving the enum
    pub skip_enums: bool,
    /// Syntax declared by reconstructed files
    pub syntax: ProtoSyntax,
}

impl ReconstructorConfig {
    /// Creates a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether enum references are replaced by `int32`
    pub fn skip_enums(mut self, skip: bool) -> Self {
        self.skip_enums = skip;
        self
    }

    /// Sets the syntax of reconstructed files
    pub fn syntax(mut self, syntax: ProtoSyntax) -> Self {
        self.syntax = syntax;
        self
    }
}

/// Constructs that are recognised but not reconstructed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnsupportedConstruct {
    /// Non-empty `nested_types`
    NestedTypes,
    /// Non-empty `enum_types`
    NestedEnums,
    /// Non-empty `extensions`
    Extensions,
    /// `is_extendable = true`
    ExtensionRanges,
    /// `has_default_value = true`
    DefaultValue,
}

impl fmt::Display for UnsupportedConstruct {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            UnsupportedConstruct::NestedTypes => "nested message types",
            UnsupportedConstruct::NestedEnums => "nested enum types",
            UnsupportedConstruct::Extensions => "extensions",
            UnsupportedConstruct::ExtensionRanges => "extension ranges",
            UnsupportedConstruct::DefaultValue => "default values",
        })
    }
}

/// A non-fatal finding about a module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Module identifier
    pub module: String,
    /// Line of the statement
    pub line: usize,
    /// Table key the statement assigned to
    pub symbol: String,
    /// What was skipped
    pub construct: UnsupportedConstruct,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}: {} on '{}' are not supported and were skipped",
            self.module, self.line, self.construct, self.symbol
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EntryKind {
    Message,
    Enum,
}

impl EntryKind {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            EntryKind::Message => "message",
            EntryKind::Enum => "enum",
        }
    }
}

/// Table keys of a completed module that name messages and enums
pub(crate) type Exports = HashMap<String, (EntryId, EntryKind)>;

/// A completed module
#[derive(Debug, Clone)]
pub(crate) struct Module {
    pub(crate) file: Rc<SchemaFile>,
    pub(crate) exports: Rc<Exports>,
}

/// One reconstruction session over a [`SyntaxSource`]
pub struct ProtoReconstructor<'s> {
    source: &'s dyn SyntaxSource,
    config: ReconstructorConfig,
    /// Completed modules by identifier
    modules: HashMap<String, Module>,
    /// Completed files, imports before importers
    completed: Vec<Rc<SchemaFile>>,
    /// Modules currently being reconstructed, outermost first
    in_progress: Vec<String>,
    diagnostics: Vec<Diagnostic>,
}

impl<'s> ProtoReconstructor<'s> {
    /// Creates a session with default configuration
    pub fn new(source: &'s dyn SyntaxSource) -> Self {
        Self {
            source,
            config: ReconstructorConfig::default(),
            modules: HashMap::new(),
            completed: Vec::new(),
            in_progress: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    /// Replaces the configuration
    pub fn with_config(mut self, config: ReconstructorConfig) -> Self {
        self.config = config;
        self
    }

    /// Current configuration
    pub fn config(&self) -> &ReconstructorConfig {
        &self.config
    }

    /// Reconstructs the module the source resolves `module` to
    pub fn reconstruct(&mut self, module: &str) -> Result<Rc<SchemaFile>> {
        let source = self.source;
        let tree = source.resolve(module)?;
        self.reconstruct_tree(tree)
    }

    /// Reconstructs a tree, memoised by its module identifier.
    ///
    /// Imports are resolved through the session's source.
    pub fn reconstruct_tree(&mut self, tree: &SyntaxTree) -> Result<Rc<SchemaFile>> {
        if let Some(module) = self.modules.get(&tree.module) {
            trace!("Reusing reconstructed module {}", tree.module);
            return Ok(Rc::clone(&module.file));
        }

        self.build(tree).map(|module| module.file)
    }

    /// Completed files in dependency order
    pub fn files(&self) -> &[Rc<SchemaFile>] {
        &self.completed
    }

    /// The completed file of a module, if it was reconstructed in this session
    pub fn file(&self, module: &str) -> Option<Rc<SchemaFile>> {
        self.modules.get(module).map(|m| Rc::clone(&m.file))
    }

    /// Unsupported constructs seen so far
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Resolves and reconstructs an imported module
    pub(crate) fn import(&mut self, path: &str) -> Result<Module> {
        let source = self.source;
        let tree = source.resolve(path)?;

        match self.modules.get(&tree.module) {
            Some(module) => Ok(module.clone()),
            None => self.build(tree),
        }
    }

    pub(crate) fn report(&mut self, diagnostic: Diagnostic) {
        warn!("{}", diagnostic);
        self.diagnostics.push(diagnostic);
    }

    fn build(&mut self, tree: &SyntaxTree) -> Result<Module> {
        if let Some(start) = self.in_progress.iter().position(|m| *m == tree.module) {
            let mut chain = self.in_progress[start..].to_vec();
            chain.push(tree.module.clone());
            return Err(Error::CyclicImport { chain });
        }

        debug!("Reconstructing module {}", tree.module);
        self.in_progress.push(tree.module.clone());
        let config = self.config.clone();
        let result = ModuleBuilder::new(tree, config).run(self);
        self.in_progress.pop();

        let (file, exports) = result?;
        debug!(
            "Reconstructed {} from {}: {} entries, {} imports",
            file.file_name(),
            tree.module,
            file.entries().len(),
            file.imports().len()
        );

        let module = Module {
            file: Rc::new(file),
            exports: Rc::new(exports),
        };
        self.completed.push(Rc::clone(&module.file));
        self.modules.insert(tree.module.clone(), module.clone());
        Ok(module)
    }
}

impl fmt::Debug for ProtoReconstructor<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProtoReconstructor")
            .field("config", &self.config)
            .field("modules", &self.modules.keys().collect::<Vec<_>>())
            .field("in_progress", &self.in_progress)
            .field("diagnostics", &self.diagnostics.len())
            .finish()
    }
}
