//! Single-module pass: statement dispatch, symbol tables and final assembly.

use super::{
    Diagnostic, EntryKind, Exports, Module, ProtoReconstructor, ReconstructorConfig,
    UnsupportedConstruct, PROTOBUF_LIBRARY_PATHS, TABLE_SUFFIX,
};
use crate::error::{Error, Result};
use crate::schema::{
    ElementType, Enum, EnumField, EntryId, EntryRef, FieldType, Label, Message, MessageField,
    Scalar, SchemaFile, TypeCode, PROTO_EXTENSION,
};
use crate::syntax::{Expr, Statement, StatementKind, SyntaxTree};
use std::collections::HashMap;
use tracing::{debug, trace, warn};

/// Descriptor factories of the Lua protobuf runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Factory {
    Descriptor,
    EnumDescriptor,
    FieldDescriptor,
    EnumValueDescriptor,
}

impl Factory {
    /// Recognises `protobuf.Descriptor()` and friends, with or without the
    /// library prefix
    fn of(expr: &Expr) -> Option<Self> {
        let Expr::Call { callee, .. } = expr else {
            return None;
        };
        let path = callee.path()?;
        let name = match path.as_slice() {
            [name] | [_, name] => *name,
            _ => return None,
        };

        match name {
            "Descriptor" => Some(Factory::Descriptor),
            "EnumDescriptor" => Some(Factory::EnumDescriptor),
            "FieldDescriptor" => Some(Factory::FieldDescriptor),
            "EnumValueDescriptor" => Some(Factory::EnumValueDescriptor),
            _ => None,
        }
    }
}

/// What a table key is bound to, as an index into the matching arena
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Symbol {
    Message(usize),
    Enum(usize),
    MessageField(usize),
    EnumField(usize),
}

impl Symbol {
    fn describe(self) -> &'static str {
        match self {
            Symbol::Message(_) => "message",
            Symbol::Enum(_) => "enum",
            Symbol::MessageField(_) => "message field",
            Symbol::EnumField(_) => "enum value",
        }
    }
}

#[derive(Debug)]
enum EntryDraft {
    Message {
        key: String,
        name: Option<String>,
        fields: Vec<usize>,
    },
    Enum {
        key: String,
        name: Option<String>,
        values: Vec<usize>,
    },
}

/// Where a field's message or enum type comes from
#[derive(Debug, Clone)]
enum TypeSource {
    /// Key in this module's symbol table, resolved once the pass completes
    Local {
        key: String,
        kind: EntryKind,
        written: String,
    },
    /// Entry of an imported module, resolved on sight
    Imported { entry: EntryRef, kind: EntryKind },
    /// Enum reference replaced by `int32`
    Int32,
}

#[derive(Debug)]
struct FieldDraft {
    key: String,
    name: Option<String>,
    number: Option<i32>,
    optional: bool,
    required: bool,
    repeated: bool,
    scalar: Option<Scalar>,
    reference: Option<TypeSource>,
}

#[derive(Debug)]
struct ValueDraft {
    key: String,
    name: Option<String>,
    number: Option<i32>,
}

/// State of one pass over one module
pub(super) struct ModuleBuilder<'t> {
    tree: &'t SyntaxTree,
    config: ReconstructorConfig,
    /// First `local X = {}` of the module.
    ///
    /// The `_pbTable` suffix is not required; without it the file name is the
    /// table name plus `.proto`.
    root: Option<String>,
    /// Identifier of the final `return`
    returned: Option<String>,
    library_imported: bool,
    symbols: HashMap<String, Symbol>,
    aliases: HashMap<String, Module>,
    entries: Vec<EntryDraft>,
    fields: Vec<FieldDraft>,
    values: Vec<ValueDraft>,
    imports: Vec<String>,
    package: Option<String>,
}

impl<'t> ModuleBuilder<'t> {
    pub(super) fn new(tree: &'t SyntaxTree, config: ReconstructorConfig) -> Self {
        Self {
            tree,
            config,
            root: None,
            returned: None,
            library_imported: false,
            symbols: HashMap::new(),
            aliases: HashMap::new(),
            entries: Vec::new(),
            fields: Vec::new(),
            values: Vec::new(),
            imports: Vec::new(),
            package: None,
        }
    }

    pub(super) fn run(mut self, session: &mut ProtoReconstructor<'_>) -> Result<(SchemaFile, Exports)> {
        let tree = self.tree;
        for statement in &tree.statements {
            self.statement(session, statement)?;
        }
        self.finish()
    }

    fn statement(&mut self, session: &mut ProtoReconstructor<'_>, statement: &Statement) -> Result<()> {
        let line = statement.line;

        match &statement.kind {
            StatementKind::Local { names, values } => {
                for (name, value) in names.iter().zip(values) {
                    if let Some(path) = require_path(value) {
                        self.require(session, name, path)?;
                    } else if let Some(factory) = Factory::of(value) {
                        self.construct(name, factory, line);
                    } else if self.root.is_none() && value.is_empty_table() {
                        debug!("Descriptor table of {} is {}", self.tree.module, name);
                        self.root = Some(name.clone());
                    } else {
                        trace!("{}:{}: ignoring local {}", self.tree.module, line, name);
                    }
                }
            }
            StatementKind::Assign { targets, values } => {
                for (target, value) in targets.iter().zip(values) {
                    self.assign(session, target, value, line)?;
                }
            }
            StatementKind::Call(_) => {
                trace!("{}:{}: ignoring call statement", self.tree.module, line);
            }
            StatementKind::Return(values) => match values.as_slice() {
                [Expr::Name(name)] => self.returned = Some(name.clone()),
                _ => {
                    return Err(self.malformed(format!(
                        "line {line}: module must return its descriptor table"
                    )))
                }
            },
        }

        Ok(())
    }

    fn require(&mut self, session: &mut ProtoReconstructor<'_>, alias: &str, path: &str) -> Result<()> {
        if PROTOBUF_LIBRARY_PATHS.contains(&path) {
            trace!("{} imports the protobuf library as {}", self.tree.module, alias);
            self.library_imported = true;
            return Ok(());
        }

        let module = session.import(path)?;
        let file_name = module.file.file_name().to_string();
        debug!("{} imports {} as {}", self.tree.module, file_name, alias);

        if !self.imports.contains(&file_name) {
            self.imports.push(file_name);
        }
        self.aliases.insert(alias.to_string(), module);
        Ok(())
    }

    fn assign(
        &mut self,
        session: &mut ProtoReconstructor<'_>,
        target: &Expr,
        value: &Expr,
        line: usize,
    ) -> Result<()> {
        let Some(path) = target.path() else {
            trace!("{}:{}: ignoring assignment to non-path target", self.tree.module, line);
            return Ok(());
        };

        if let Some(factory) = Factory::of(value) {
            if let Some(key) = self.local_key(&path) {
                self.construct(key, factory, line);
            }
            return Ok(());
        }

        // `root.KEY = LOCAL` binds KEY to whatever LOCAL is bound to
        let aliased = value
            .path()
            .and_then(|source| self.local_key(&source))
            .and_then(|source| self.symbols.get(source).copied());
        if let (Some(symbol), Some(key)) = (aliased, self.local_key(&path)) {
            trace!("{}:{}: {} aliases a {}", self.tree.module, line, key, symbol.describe());
            self.symbols.insert(key.to_string(), symbol);
            return Ok(());
        }

        let Some((member, prefix)) = path.split_last() else {
            return Ok(());
        };
        let symbol = self
            .local_key(prefix)
            .and_then(|key| self.symbols.get(key).map(|symbol| (key, *symbol)));

        match symbol {
            Some((key, symbol)) => self.property(session, key, symbol, member, value, line),
            None => {
                trace!("{}:{}: ignoring assignment to {}", self.tree.module, line, path.join("."));
                Ok(())
            }
        }
    }

    /// Maps `root.KEY` or a bare `KEY` to the symbol table key
    fn local_key<'p>(&self, path: &[&'p str]) -> Option<&'p str> {
        match path {
            [table, key] if Some(*table) == self.root.as_deref() => Some(*key),
            [key] => Some(*key),
            _ => None,
        }
    }

    fn construct(&mut self, key: &str, factory: Factory, line: usize) {
        trace!("{}:{}: {} = {:?}()", self.tree.module, line, key, factory);

        let symbol = match factory {
            Factory::Descriptor => {
                self.entries.push(EntryDraft::Message {
                    key: key.to_string(),
                    name: None,
                    fields: Vec::new(),
                });
                Symbol::Message(self.entries.len() - 1)
            }
            Factory::EnumDescriptor => {
                self.entries.push(EntryDraft::Enum {
                    key: key.to_string(),
                    name: None,
                    values: Vec::new(),
                });
                Symbol::Enum(self.entries.len() - 1)
            }
            Factory::FieldDescriptor => {
                self.fields.push(FieldDraft {
                    key: key.to_string(),
                    name: None,
                    number: None,
                    optional: false,
                    required: false,
                    repeated: false,
                    scalar: None,
                    reference: None,
                });
                Symbol::MessageField(self.fields.len() - 1)
            }
            Factory::EnumValueDescriptor => {
                self.values.push(ValueDraft {
                    key: key.to_string(),
                    name: None,
                    number: None,
                });
                Symbol::EnumField(self.values.len() - 1)
            }
        };

        if let Some(previous) = self.symbols.insert(key.to_string(), symbol) {
            debug!("{}:{}: {} rebound (was a {})", self.tree.module, line, key, previous.describe());
        }
    }

    fn property(
        &mut self,
        session: &mut ProtoReconstructor<'_>,
        key: &str,
        symbol: Symbol,
        member: &str,
        value: &Expr,
        line: usize,
    ) -> Result<()> {
        match symbol {
            Symbol::Message(index) => match member {
                "name" => self.set_entry_name(index, key, value),
                "full_name" => {
                    self.note_full_name(value);
                    Ok(())
                }
                "fields" => {
                    let fields = self
                        .list_of(key, member, value)?
                        .into_iter()
                        .map(|item| match self.symbol_of(item)? {
                            Symbol::MessageField(field) => Ok(field),
                            other => Err(self.wrong_kind(item, other, "message field")),
                        })
                        .collect::<Result<Vec<_>>>()?;
                    if let Some(EntryDraft::Message { fields: owned, .. }) = self.entries.get_mut(index) {
                        owned.extend(fields);
                    }
                    Ok(())
                }
                "nested_types" if !is_empty_value(value) => {
                    self.report(session, key, line, UnsupportedConstruct::NestedTypes);
                    Ok(())
                }
                "enum_types" if !is_empty_value(value) => {
                    self.report(session, key, line, UnsupportedConstruct::NestedEnums);
                    Ok(())
                }
                "extensions" if !is_empty_value(value) => {
                    self.report(session, key, line, UnsupportedConstruct::Extensions);
                    Ok(())
                }
                "is_extendable" if value.as_bool() == Some(true) => {
                    self.report(session, key, line, UnsupportedConstruct::ExtensionRanges);
                    Ok(())
                }
                _ => Ok(()),
            },
            Symbol::Enum(index) => match member {
                "name" => self.set_entry_name(index, key, value),
                "full_name" => {
                    self.note_full_name(value);
                    Ok(())
                }
                "values" => {
                    let values = self
                        .list_of(key, member, value)?
                        .into_iter()
                        .map(|item| match self.symbol_of(item)? {
                            Symbol::EnumField(value) => Ok(value),
                            other => Err(self.wrong_kind(item, other, "enum value")),
                        })
                        .collect::<Result<Vec<_>>>()?;
                    if let Some(EntryDraft::Enum { values: owned, .. }) = self.entries.get_mut(index) {
                        owned.extend(values);
                    }
                    Ok(())
                }
                _ => Ok(()),
            },
            Symbol::MessageField(index) => self.field_property(session, index, key, member, value, line),
            Symbol::EnumField(index) => match member {
                "name" => {
                    let name = self.string_of(key, member, value)?;
                    self.values[index].name = Some(name);
                    Ok(())
                }
                "number" => {
                    let number = self.i32_of(key, member, value)?;
                    self.values[index].number = Some(number);
                    Ok(())
                }
                _ => Ok(()),
            },
        }
    }

    fn field_property(
        &mut self,
        session: &mut ProtoReconstructor<'_>,
        index: usize,
        key: &str,
        member: &str,
        value: &Expr,
        line: usize,
    ) -> Result<()> {
        match member {
            "name" => {
                self.fields[index].name = Some(self.string_of(key, member, value)?);
            }
            "number" => {
                self.fields[index].number = Some(self.i32_of(key, member, value)?);
            }
            "label" => {
                let code = self.integer_of(key, member, value)?;
                let label = Label::from_code(code)
                    .ok_or_else(|| self.malformed(format!("{key}.label: unknown label code {code}")))?;
                let field = &mut self.fields[index];
                match label {
                    Label::Optional => field.optional = true,
                    Label::Required => field.required = true,
                    Label::Repeated => field.repeated = true,
                }
            }
            "type" => {
                let code = self.integer_of(key, member, value)?;
                match TypeCode::from(code) {
                    TypeCode::Scalar(scalar) => {
                        let field = &mut self.fields[index];
                        if field.reference.is_none() {
                            field.scalar = Some(scalar);
                        }
                    }
                    TypeCode::Message | TypeCode::Enum => {
                        trace!("{}:{}: {} takes its type from a reference", self.tree.module, line, key);
                    }
                    TypeCode::Group => {
                        return Err(Error::unsupported(
                            &self.tree.module,
                            format!("{key}: proto2 groups cannot be reconstructed"),
                        ))
                    }
                    TypeCode::Unknown(code) => {
                        return Err(self.malformed(format!("{key}.type: unknown type code {code}")))
                    }
                }
            }
            "message_type" => {
                let source = self.type_source(value, EntryKind::Message)?;
                self.fields[index].reference = Some(source);
            }
            "enum_type" => {
                let source = if self.config.skip_enums {
                    TypeSource::Int32
                } else {
                    self.type_source(value, EntryKind::Enum)?
                };
                self.fields[index].reference = Some(source);
            }
            "has_default_value" if value.as_bool() == Some(true) => {
                self.report(session, key, line, UnsupportedConstruct::DefaultValue);
            }
            _ => {}
        }
        Ok(())
    }

    /// Resolves a `message_type`/`enum_type` value.
    ///
    /// `alias.KEY` looks in the imported module's exports right away; local keys
    /// are kept by name so they may be bound later in the module.
    fn type_source(&self, value: &Expr, kind: EntryKind) -> Result<TypeSource> {
        let Some(path) = value.path() else {
            return Err(self.malformed(format!("{} reference must be a symbol", kind.as_str())));
        };
        let written = path.join(".");

        if let [alias, key] = path.as_slice() {
            if let Some(module) = self.aliases.get(*alias) {
                let Some(&(entry, actual)) = module.exports.get(*key) else {
                    return Err(Error::unresolved(&self.tree.module, written));
                };
                if actual != kind {
                    return Err(self.malformed(format!(
                        "'{written}' is a {}, expected a {}",
                        actual.as_str(),
                        kind.as_str()
                    )));
                }
                return Ok(TypeSource::Imported {
                    entry: EntryRef::External {
                        file: module.file.clone(),
                        entry,
                    },
                    kind,
                });
            }
        }

        match self.local_key(&path) {
            Some(key) => Ok(TypeSource::Local {
                key: key.to_string(),
                kind,
                written,
            }),
            None => Err(Error::unresolved(&self.tree.module, written)),
        }
    }

    fn set_entry_name(&mut self, index: usize, key: &str, value: &Expr) -> Result<()> {
        let name = self.string_of(key, "name", value)?;
        match &mut self.entries[index] {
            EntryDraft::Message { name: slot, .. } | EntryDraft::Enum { name: slot, .. } => {
                *slot = Some(name)
            }
        }
        Ok(())
    }

    /// Takes the package from the first `full_name = ".pkg.Name"`
    fn note_full_name(&mut self, value: &Expr) {
        if self.package.is_some() {
            return;
        }
        if let Some((package, _)) = value
            .as_str()
            .map(|full| full.trim_start_matches('.'))
            .and_then(|full| full.rsplit_once('.'))
        {
            if !package.is_empty() {
                debug!("{} declares package {}", self.tree.module, package);
                self.package = Some(package.to_string());
            }
        }
    }

    fn report(
        &self,
        session: &mut ProtoReconstructor<'_>,
        key: &str,
        line: usize,
        construct: UnsupportedConstruct,
    ) {
        session.report(Diagnostic {
            module: self.tree.module.clone(),
            line,
            symbol: key.to_string(),
            construct,
        });
    }

    fn symbol_of(&self, item: &Expr) -> Result<Symbol> {
        let path = item
            .path()
            .ok_or_else(|| self.malformed("list items must be symbol references"))?;
        self.local_key(&path)
            .and_then(|key| self.symbols.get(key).copied())
            .ok_or_else(|| Error::unresolved(&self.tree.module, path.join(".")))
    }

    fn list_of<'e>(&self, key: &str, member: &str, value: &'e Expr) -> Result<Vec<&'e Expr>> {
        value
            .as_list()
            .ok_or_else(|| self.malformed(format!("{key}.{member} must be a list")))
    }

    fn string_of(&self, key: &str, member: &str, value: &Expr) -> Result<String> {
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| self.malformed(format!("{key}.{member} must be a string literal")))
    }

    fn integer_of(&self, key: &str, member: &str, value: &Expr) -> Result<i64> {
        value
            .as_integer()
            .ok_or_else(|| self.malformed(format!("{key}.{member} must be an integer literal")))
    }

    fn i32_of(&self, key: &str, member: &str, value: &Expr) -> Result<i32> {
        let n = self.integer_of(key, member, value)?;
        i32::try_from(n).map_err(|_| self.malformed(format!("{key}.{member}: {n} is out of range")))
    }

    fn wrong_kind(&self, item: &Expr, actual: Symbol, expected: &str) -> Error {
        let written = item.path().map(|p| p.join(".")).unwrap_or_default();
        self.malformed(format!("'{written}' is a {}, expected a {expected}", actual.describe()))
    }

    fn malformed(&self, details: impl Into<String>) -> Error {
        Error::malformed(&self.tree.module, details)
    }

    /// Validates the module shape and assembles the schema file
    fn finish(self) -> Result<(SchemaFile, Exports)> {
        if !self.library_imported {
            return Err(self.malformed(format!(
                "missing `require \"{}\"`",
                PROTOBUF_LIBRARY_PATHS[0]
            )));
        }

        let root = self
            .root
            .as_deref()
            .ok_or_else(|| self.malformed("no descriptor table declared"))?;
        let returned = self
            .returned
            .as_deref()
            .ok_or_else(|| self.malformed("missing return of the descriptor table"))?;
        if returned != root {
            return Err(self.malformed(format!(
                "returns '{returned}' but the descriptor table is '{root}'"
            )));
        }

        let mut file = SchemaFile::new();
        file.set_syntax(self.config.syntax);
        file.set_source_name(&self.tree.source_name);
        if let Some(package) = &self.package {
            file.set_package(package);
        }
        for import in &self.imports {
            file.add_import(import);
        }

        for draft in &self.entries {
            match draft {
                EntryDraft::Message { key, name, fields } => {
                    let name = self.required_name(name, "message", key)?;
                    let mut message = Message::new(name);
                    for &index in fields {
                        let field = self.field(index)?;
                        if let Some(replaced) = message.insert_field(field) {
                            warn!(
                                "{}: field number {} of {} is used twice; '{}' was overwritten",
                                self.tree.module, replaced.number, message.name, replaced.name
                            );
                        }
                    }
                    file.push_entry(message);
                }
                EntryDraft::Enum { key, name, values } => {
                    let name = self.required_name(name, "enum", key)?;
                    let mut enumeration = Enum::new(name);
                    for &index in values {
                        enumeration.values.push(self.value(index)?);
                    }
                    file.push_entry(enumeration);
                }
            }
        }

        file.set_file_name(format!(
            "{}{}",
            returned.strip_suffix(TABLE_SUFFIX).unwrap_or(returned),
            PROTO_EXTENSION
        ));

        let exports = self
            .symbols
            .iter()
            .filter_map(|(key, symbol)| match *symbol {
                Symbol::Message(index) => Some((key.clone(), (EntryId(index), EntryKind::Message))),
                Symbol::Enum(index) => Some((key.clone(), (EntryId(index), EntryKind::Enum))),
                Symbol::MessageField(_) | Symbol::EnumField(_) => None,
            })
            .collect();

        Ok((file, exports))
    }

    fn required_name(&self, name: &Option<String>, kind: &str, key: &str) -> Result<String> {
        name.clone()
            .ok_or_else(|| self.malformed(format!("{kind} '{key}' has no name")))
    }

    fn field(&self, index: usize) -> Result<MessageField> {
        let draft = &self.fields[index];
        let name = self.required_name(&draft.name, "field", &draft.key)?;
        let number = draft
            .number
            .ok_or_else(|| self.malformed(format!("field '{}' has no number", draft.key)))?;

        let element = match (&draft.reference, draft.scalar) {
            (Some(TypeSource::Int32), _) => ElementType::Scalar(Scalar::Int32),
            (Some(TypeSource::Imported { entry, kind }), _) => element_of(*kind, entry.clone()),
            (Some(TypeSource::Local { key, kind, written }), _) => {
                let entry = self.resolve_local(key, *kind, written)?;
                element_of(*kind, EntryRef::Local(entry))
            }
            (None, Some(scalar)) => ElementType::Scalar(scalar),
            (None, None) => {
                return Err(self.malformed(format!("field '{}' has no type", draft.key)))
            }
        };

        let mut field = MessageField::new(name, number, FieldType::Single(element));
        field.optional = draft.optional;
        field.required = draft.required;
        if draft.repeated {
            field.apply_label(Label::Repeated);
        }
        Ok(field)
    }

    fn value(&self, index: usize) -> Result<EnumField> {
        let draft = &self.values[index];
        let name = self.required_name(&draft.name, "enum value", &draft.key)?;
        let number = draft
            .number
            .ok_or_else(|| self.malformed(format!("enum value '{}' has no number", draft.key)))?;
        Ok(EnumField::new(name, number))
    }

    fn resolve_local(&self, key: &str, kind: EntryKind, written: &str) -> Result<EntryId> {
        match (self.symbols.get(key), kind) {
            (Some(Symbol::Message(index)), EntryKind::Message) | (Some(Symbol::Enum(index)), EntryKind::Enum) => {
                Ok(EntryId(*index))
            }
            (Some(other), _) => Err(self.malformed(format!(
                "'{written}' is a {}, expected a {}",
                other.describe(),
                kind.as_str()
            ))),
            (None, _) => Err(Error::unresolved(&self.tree.module, written)),
        }
    }
}

fn element_of(kind: EntryKind, entry: EntryRef) -> ElementType {
    match kind {
        EntryKind::Message => ElementType::Message(entry),
        EntryKind::Enum => ElementType::Enum(entry),
    }
}

/// `require "path"` or `require("path")`
fn require_path(expr: &Expr) -> Option<&str> {
    match expr {
        Expr::Call { callee, args } if callee.path().as_deref() == Some(&["require"][..]) => {
            args.first()?.as_str()
        }
        _ => None,
    }
}

/// `nil` and `{}` both mean "none"
fn is_empty_value(value: &Expr) -> bool {
    matches!(value, Expr::Nil) || value.is_empty_table()
}
