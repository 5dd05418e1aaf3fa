//! The reconstructed schema model.
//!
//! A [`SchemaFile`] owns its top-level [`Message`]s and [`Enum`]s in declaration
//! order; a message owns its fields keyed by field number. Fields refer to the
//! entries they use through [`EntryRef`] handles: an index for entries of the
//! same file, a shared pointer to the completed file for imported ones.

mod types;

use crate::error::{Error, Result};
use std::cell::OnceCell;
use std::collections::BTreeMap;

pub use types::{ElementType, EntryId, EntryRef, FieldType, Label, Scalar, TypeCode};

/// Extension of emitted schema files
pub const PROTO_EXTENSION: &str = ".proto";

/// Proto syntax version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProtoSyntax {
    /// Proto2 syntax
    #[default]
    Proto2,
    /// Proto3 syntax
    Proto3,
}

impl ProtoSyntax {
    /// Returns the syntax declaration string
    pub fn as_str(&self) -> &'static str {
        match self {
            ProtoSyntax::Proto2 => "proto2",
            ProtoSyntax::Proto3 => "proto3",
        }
    }
}

impl TryFrom<&str> for ProtoSyntax {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self> {
        match value {
            "" | "proto2" | "2" => Ok(ProtoSyntax::Proto2),
            "proto3" | "3" => Ok(ProtoSyntax::Proto3),
            _ => Err(Error::UnsupportedSyntax {
                syntax: value.to_string(),
            }),
        }
    }
}

/// One reconstructed `.proto` document
#[derive(Debug, Clone, Default)]
pub struct SchemaFile {
    syntax: ProtoSyntax,
    edition: Option<String>,
    source_name: Option<String>,
    package: Option<String>,
    entries: Vec<TopLevel>,
    imports: Vec<String>,
    file_name: OnceCell<String>,
}

impl SchemaFile {
    /// Creates an empty proto2 file
    pub fn new() -> Self {
        Self::default()
    }

    /// Syntax version
    pub fn syntax(&self) -> ProtoSyntax {
        self.syntax
    }

    /// Sets the syntax version
    pub fn set_syntax(&mut self, syntax: ProtoSyntax) {
        self.syntax = syntax;
    }

    /// Edition, which replaces the syntax declaration when set
    pub fn edition(&self) -> Option<&str> {
        self.edition.as_deref()
    }

    /// Sets the edition
    pub fn set_edition(&mut self, edition: impl Into<String>) {
        self.edition = Some(edition.into());
    }

    /// Name of the source the file was reconstructed from
    pub fn source_name(&self) -> Option<&str> {
        self.source_name.as_deref()
    }

    /// Sets the source name
    pub fn set_source_name(&mut self, name: impl Into<String>) {
        self.source_name = Some(name.into());
    }

    /// Declared package
    pub fn package(&self) -> Option<&str> {
        self.package.as_deref()
    }

    /// Sets the package
    pub fn set_package(&mut self, package: impl Into<String>) {
        self.package = Some(package.into());
    }

    /// Top-level entries in declaration order
    pub fn entries(&self) -> &[TopLevel] {
        &self.entries
    }

    /// Looks up an entry of this file
    pub fn entry(&self, id: EntryId) -> Option<&TopLevel> {
        self.entries.get(id.0)
    }

    /// Mutable access to an entry of this file
    pub fn entry_mut(&mut self, id: EntryId) -> Option<&mut TopLevel> {
        self.entries.get_mut(id.0)
    }

    /// Appends a top-level entry and returns its id
    pub fn push_entry(&mut self, entry: impl Into<TopLevel>) -> EntryId {
        self.entries.push(entry.into());
        EntryId(self.entries.len() - 1)
    }

    /// Messages in declaration order
    pub fn messages(&self) -> impl Iterator<Item = &Message> {
        self.entries.iter().filter_map(|entry| match entry {
            TopLevel::Message(message) => Some(message),
            TopLevel::Enum(_) => None,
        })
    }

    /// Enums in declaration order
    pub fn enums(&self) -> impl Iterator<Item = &Enum> {
        self.entries.iter().filter_map(|entry| match entry {
            TopLevel::Enum(enumeration) => Some(enumeration),
            TopLevel::Message(_) => None,
        })
    }

    /// Imported file names in insertion order
    pub fn imports(&self) -> &[String] {
        &self.imports
    }

    /// Adds an import; returns false if it was already present
    pub fn add_import(&mut self, name: impl Into<String>) -> bool {
        let name = name.into();
        if self.imports.contains(&name) {
            return false;
        }
        self.imports.push(name);
        true
    }

    /// Output file name.
    ///
    /// Unless overridden, derived from the entry names joined by `_`. The first
    /// read freezes the value.
    pub fn file_name(&self) -> &str {
        self.file_name.get_or_init(|| {
            let names: Vec<&str> = self.entries.iter().map(TopLevel::name).collect();
            format!("{}{}", names.join("_"), PROTO_EXTENSION)
        })
    }

    /// Overrides the output file name
    pub fn set_file_name(&mut self, name: impl Into<String>) {
        self.file_name = OnceCell::from(name.into());
    }

    /// Resolves a reference made from a field of this file
    pub fn resolve<'a>(&'a self, entry: &'a EntryRef) -> Option<&'a TopLevel> {
        match entry {
            EntryRef::Local(id) => self.entry(*id),
            EntryRef::External { file, entry } => file.entry(*entry),
        }
    }

    /// Name of a referenced entry as written in this file.
    ///
    /// Entries of another file are qualified with that file's package when it
    /// differs from this file's.
    pub fn qualified_name(&self, entry: &EntryRef) -> String {
        let name = self.resolve(entry).map(TopLevel::name).unwrap_or_default();
        match entry {
            EntryRef::External { file, .. } => match file.package() {
                Some(package) if Some(package) != self.package() => format!("{package}.{name}"),
                _ => name.to_string(),
            },
            EntryRef::Local(_) => name.to_string(),
        }
    }

    /// Name of an element type as written in this file
    pub fn element_type_name(&self, element: &ElementType) -> String {
        match element {
            ElementType::Scalar(scalar) => scalar.name().to_string(),
            ElementType::Message(entry) | ElementType::Enum(entry) => self.qualified_name(entry),
        }
    }

    /// Name of a field type as written in this file, `repeated ` prefix included
    pub fn type_name(&self, field_type: &FieldType) -> String {
        match field_type {
            FieldType::Single(element) => self.element_type_name(element),
            FieldType::Repeated(element) => format!("repeated {}", self.element_type_name(element)),
        }
    }
}

/// A message or enum declared at file level
#[derive(Debug, Clone, PartialEq)]
pub enum TopLevel {
    /// `message`
    Message(Message),
    /// `enum`
    Enum(Enum),
}

impl TopLevel {
    /// Declared name
    pub fn name(&self) -> &str {
        match self {
            TopLevel::Message(message) => &message.name,
            TopLevel::Enum(enumeration) => &enumeration.name,
        }
    }

    /// `message` or `enum`
    pub fn kind(&self) -> &'static str {
        match self {
            TopLevel::Message(_) => "message",
            TopLevel::Enum(_) => "enum",
        }
    }
}

impl From<Message> for TopLevel {
    fn from(message: Message) -> Self {
        TopLevel::Message(message)
    }
}

impl From<Enum> for TopLevel {
    fn from(enumeration: Enum) -> Self {
        TopLevel::Enum(enumeration)
    }
}

/// A message with its fields ordered by number
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Message {
    /// Declared name
    pub name: String,
    fields: BTreeMap<i32, MessageField>,
}

impl Message {
    /// Creates a message without fields
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Inserts a field under its number, returning the field it replaced
    pub fn insert_field(&mut self, field: MessageField) -> Option<MessageField> {
        self.fields.insert(field.number, field)
    }

    /// Fields in number order
    pub fn fields(&self) -> impl Iterator<Item = &MessageField> {
        self.fields.values()
    }

    /// Looks up a field by number
    pub fn field(&self, number: i32) -> Option<&MessageField> {
        self.fields.get(&number)
    }

    /// Number of fields
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }
}

/// An enum with its values in declaration order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Enum {
    /// Declared name
    pub name: String,
    /// Values, not reordered by number
    pub values: Vec<EnumField>,
}

impl Enum {
    /// Creates an enum without values
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            values: Vec::new(),
        }
    }
}

/// A message field.
///
/// `optional`, `required` and `repeated` are independent flags rather than one
/// label, since the source can carry more than one annotation.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageField {
    /// Field name
    pub name: String,
    /// Field number
    pub number: i32,
    /// Resolved type
    pub field_type: FieldType,
    /// Emit `optional`
    pub optional: bool,
    /// Emit `required`
    pub required: bool,
    /// Label said repeated
    pub repeated: bool,
    /// Emit `[deprecated = true]`
    pub deprecated: bool,
}

impl MessageField {
    /// Creates a field without label flags
    pub fn new(name: impl Into<String>, number: i32, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            number,
            field_type,
            optional: false,
            required: false,
            repeated: false,
            deprecated: false,
        }
    }

    /// Sets the flag corresponding to a label
    pub fn with_label(mut self, label: Label) -> Self {
        self.apply_label(label);
        self
    }

    /// Sets the flag corresponding to a label, wrapping the type for `repeated`
    pub fn apply_label(&mut self, label: Label) {
        match label {
            Label::Optional => self.optional = true,
            Label::Required => self.required = true,
            Label::Repeated => {
                self.repeated = true;
                self.field_type = self.field_type.clone().into_repeated();
            }
        }
    }

    /// Repeated by label or by type
    pub fn is_repeated(&self) -> bool {
        self.repeated || self.field_type.is_repeated()
    }
}

/// An enum value
#[derive(Debug, Clone, PartialEq)]
pub struct EnumField {
    /// Value name
    pub name: String,
    /// Numeric value
    pub value: i32,
    /// Emit `[deprecated = true]`
    pub deprecated: bool,
}

impl EnumField {
    /// Creates a value
    pub fn new(name: impl Into<String>, value: i32) -> Self {
        Self {
            name: name.into(),
            value,
            deprecated: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    #[test]
    fn test_proto_syntax() {
        assert_eq!(ProtoSyntax::try_from("").unwrap(), ProtoSyntax::Proto2);
        assert_eq!(ProtoSyntax::try_from("proto2").unwrap(), ProtoSyntax::Proto2);
        assert_eq!(ProtoSyntax::try_from("proto3").unwrap(), ProtoSyntax::Proto3);
        assert!(ProtoSyntax::try_from("proto4").is_err());
    }

    #[test]
    fn test_file_name_is_frozen_on_first_read() {
        let mut file = SchemaFile::new();
        file.push_entry(Message::new("Person"));
        file.push_entry(Enum::new("Kind"));
        assert_eq!(file.file_name(), "Person_Kind.proto");

        file.push_entry(Message::new("Later"));
        assert_eq!(file.file_name(), "Person_Kind.proto");

        file.set_file_name("person.proto");
        assert_eq!(file.file_name(), "person.proto");
    }

    #[test]
    fn test_imports_are_unique() {
        let mut file = SchemaFile::new();
        assert!(file.add_import("b.proto"));
        assert!(file.add_import("a.proto"));
        assert!(!file.add_import("b.proto"));
        assert_eq!(file.imports(), ["b.proto", "a.proto"]);
    }

    #[test]
    fn test_fields_iterate_in_number_order() {
        let mut message = Message::new("M");
        message.insert_field(MessageField::new("c", 3, FieldType::scalar(Scalar::Bool)));
        message.insert_field(MessageField::new("a", 1, FieldType::scalar(Scalar::Int32)));
        let replaced = message.insert_field(MessageField::new("b", 3, FieldType::scalar(Scalar::Bytes)));

        assert_eq!(replaced.map(|f| f.name), Some("c".to_string()));
        let names: Vec<_> = message.fields().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_repeated_label() {
        let field = MessageField::new("ids", 1, FieldType::scalar(Scalar::Int64)).with_label(Label::Repeated);
        assert!(field.is_repeated());
        assert_eq!(SchemaFile::new().type_name(&field.field_type), "repeated int64");
    }

    #[test]
    fn test_qualified_names() {
        let mut common = SchemaFile::new();
        common.set_package("shared");
        let item = common.push_entry(Message::new("Item"));
        let common = Rc::new(common);

        let mut file = SchemaFile::new();
        let local = file.push_entry(Enum::new("Kind"));

        let external = EntryRef::External {
            file: Rc::clone(&common),
            entry: item,
        };
        assert_eq!(file.qualified_name(&external), "shared.Item");
        assert_eq!(file.qualified_name(&EntryRef::Local(local)), "Kind");

        file.set_package("shared");
        assert_eq!(file.qualified_name(&external), "Item");
    }
}
