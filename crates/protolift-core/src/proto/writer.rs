//! Extensible proto writing traits.
//!
//! This module provides the [`ProtoWriter`] visitor trait and the [`walk`]
//! driver that feeds a [`SchemaFile`] through it in emission order.

use crate::schema::{Enum, EnumField, Message, MessageField, SchemaFile, TopLevel};
use std::fmt::Result;

/// Trait for writing schema elements to output.
///
/// Every method defaults to a no-op, so an implementation only overrides what
/// it cares about. [`walk`] calls the methods in this order for each file:
/// `write_file`, then per entry `write_message` + `write_field`* or
/// `write_enum` + `write_enum_value`*, each followed by `end_entry`, and
/// finally `finish_file`.
///
/// # Example
///
/// ```
/// use protolift_core::proto::{walk, ProtoWriter};
/// use protolift_core::schema::{Message, SchemaFile};
///
/// #[derive(Default)]
/// struct Names(Vec<String>);
///
/// impl ProtoWriter for Names {
///     fn write_message(&mut self, _file: &SchemaFile, message: &Message) -> std::fmt::Result {
///         self.0.push(message.name.clone());
///         Ok(())
///     }
/// }
///
/// let mut file = SchemaFile::new();
/// file.push_entry(Message::new("Person"));
///
/// let mut names = Names::default();
/// walk(&file, &mut names).unwrap();
/// assert_eq!(names.0, ["Person"]);
/// ```
pub trait ProtoWriter {
    /// Start of a file: header, syntax, imports, package
    fn write_file(&mut self, file: &SchemaFile) -> Result {
        let _ = file;
        Ok(())
    }

    /// Start of a message definition
    fn write_message(&mut self, file: &SchemaFile, message: &Message) -> Result {
        let _ = (file, message);
        Ok(())
    }

    /// A message field; `file` qualifies references to other files
    fn write_field(&mut self, file: &SchemaFile, field: &MessageField) -> Result {
        let _ = (file, field);
        Ok(())
    }

    /// Start of an enum definition
    fn write_enum(&mut self, enum_type: &Enum) -> Result {
        let _ = enum_type;
        Ok(())
    }

    /// An enum value
    fn write_enum_value(&mut self, value: &EnumField) -> Result {
        let _ = value;
        Ok(())
    }

    /// End of the current message or enum
    fn end_entry(&mut self) -> Result {
        Ok(())
    }

    /// End of the file
    fn finish_file(&mut self, file: &SchemaFile) -> Result {
        let _ = file;
        Ok(())
    }
}

/// Drives a writer over one file, entries in declaration order and message
/// fields in number order
pub fn walk<W: ProtoWriter + ?Sized>(file: &SchemaFile, writer: &mut W) -> Result {
    writer.write_file(file)?;

    for entry in file.entries() {
        match entry {
            TopLevel::Message(message) => {
                writer.write_message(file, message)?;
                for field in message.fields() {
                    writer.write_field(file, field)?;
                }
            }
            TopLevel::Enum(enum_type) => {
                writer.write_enum(enum_type)?;
                for value in &enum_type.values {
                    writer.write_enum_value(value)?;
                }
            }
        }
        writer.end_entry()?;
    }

    writer.finish_file(file)
}

/// A writer that collects statistics about schema files
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StatsWriter {
    /// Number of files
    pub file_count: usize,
    /// Number of imports
    pub import_count: usize,
    /// Number of messages
    pub message_count: usize,
    /// Number of fields
    pub field_count: usize,
    /// Number of enums
    pub enum_count: usize,
    /// Number of enum values
    pub enum_value_count: usize,
}

impl ProtoWriter for StatsWriter {
    fn write_file(&mut self, file: &SchemaFile) -> Result {
        self.file_count += 1;
        self.import_count += file.imports().len();
        Ok(())
    }

    fn write_message(&mut self, _file: &SchemaFile, _message: &Message) -> Result {
        self.message_count += 1;
        Ok(())
    }

    fn write_field(&mut self, _file: &SchemaFile, _field: &MessageField) -> Result {
        self.field_count += 1;
        Ok(())
    }

    fn write_enum(&mut self, _enum_type: &Enum) -> Result {
        self.enum_count += 1;
        Ok(())
    }

    fn write_enum_value(&mut self, _value: &EnumField) -> Result {
        self.enum_value_count += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldType, Scalar};

    #[test]
    fn test_stats_writer() {
        let mut person = Message::new("Person");
        person.insert_field(MessageField::new("id", 1, FieldType::scalar(Scalar::Int64)));
        person.insert_field(MessageField::new("name", 2, FieldType::scalar(Scalar::String)));
        let mut kind = Enum::new("Kind");
        kind.values.push(EnumField::new("NONE", 0));

        let mut file = SchemaFile::new();
        file.add_import("common.proto");
        file.push_entry(person);
        file.push_entry(kind);
        file.push_entry(Message::new("Empty"));

        let mut writer = StatsWriter::default();
        walk(&file, &mut writer).unwrap();
        walk(&SchemaFile::new(), &mut writer).unwrap();

        assert_eq!(writer.file_count, 2);
        assert_eq!(writer.import_count, 1);
        assert_eq!(writer.message_count, 2);
        assert_eq!(writer.field_count, 2);
        assert_eq!(writer.enum_count, 1);
        assert_eq!(writer.enum_value_count, 1);
    }

    #[test]
    fn test_walk_order() {
        #[derive(Default)]
        struct Trace(Vec<String>);

        impl ProtoWriter for Trace {
            fn write_message(&mut self, _file: &SchemaFile, message: &Message) -> Result {
                self.0.push(format!("message {}", message.name));
                Ok(())
            }

            fn write_field(&mut self, _file: &SchemaFile, field: &MessageField) -> Result {
                self.0.push(format!("field {}", field.number));
                Ok(())
            }

            fn end_entry(&mut self) -> Result {
                self.0.push("end".into());
                Ok(())
            }
        }

        let mut message = Message::new("M");
        message.insert_field(MessageField::new("b", 7, FieldType::scalar(Scalar::Bool)));
        message.insert_field(MessageField::new("a", 2, FieldType::scalar(Scalar::Bool)));
        let mut file = SchemaFile::new();
        file.push_entry(message);

        let mut trace = Trace::default();
        walk(&file, &mut trace).unwrap();
        assert_eq!(trace.0, ["message M", "field 2", "field 7", "end"]);
    }
}
