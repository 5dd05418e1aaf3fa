//! `.proto` emission.
//!
//! This module turns a reconstructed [`SchemaFile`] back into text. Output is
//! deterministic: entries appear in declaration order, message fields in number
//! order, and the same model always renders to the same bytes.
//!
//! ## Extensibility
//!
//! Emission is a [`walk`] over the [`ProtoWriter`] visitor trait. The text
//! writer is one implementation; [`StatsWriter`] is another, and
//! [`descriptor`] exports the same model as protobuf descriptors instead.

pub mod descriptor;
mod writer;

use crate::schema::{Enum, EnumField, Message, MessageField, SchemaFile};
use std::fmt::Write as FmtWrite;

pub use writer::{walk, ProtoWriter, StatsWriter};

/// First line of every emitted file
pub const HEADER: &str = "// Reconstructed by protolift";

/// Configuration for text emission
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Indentation string (default: 2 spaces)
    pub indent_str: String,
    /// Emit a `// Source:` line when the file knows its source
    pub include_source: bool,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            indent_str: "  ".to_string(),
            include_source: true,
        }
    }
}

impl WriterConfig {
    /// Creates a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the indentation string
    pub fn indent_str(mut self, s: impl Into<String>) -> Self {
        self.indent_str = s.into();
        self
    }

    /// Sets whether to emit the source line
    pub fn include_source(mut self, include: bool) -> Self {
        self.include_source = include;
        self
    }
}

/// Renders a file with the default configuration
pub fn render(file: &SchemaFile) -> String {
    render_with(file, &WriterConfig::default())
}

/// Renders a file with a custom configuration
pub fn render_with(file: &SchemaFile, config: &WriterConfig) -> String {
    let mut output = String::new();
    // Writing into a String cannot fail
    let _ = write_to(file, config, &mut output);
    output
}

/// Writes the rendered file to any `fmt::Write` sink
pub fn write_to(file: &SchemaFile, config: &WriterConfig, w: &mut impl FmtWrite) -> std::fmt::Result {
    let mut writer = DefaultProtoWriter::new(w, config);
    walk(file, &mut writer)
}

/// Text implementation of [`ProtoWriter`]
pub struct DefaultProtoWriter<'a, W: FmtWrite> {
    writer: &'a mut W,
    config: &'a WriterConfig,
}

impl<'a, W: FmtWrite> DefaultProtoWriter<'a, W> {
    /// Creates a writer over a sink
    pub fn new(writer: &'a mut W, config: &'a WriterConfig) -> Self {
        Self { writer, config }
    }

    fn write_indent(&mut self) -> std::fmt::Result {
        self.writer.write_str(&self.config.indent_str)
    }
}

impl<W: FmtWrite> ProtoWriter for DefaultProtoWriter<'_, W> {
    fn write_file(&mut self, file: &SchemaFile) -> std::fmt::Result {
        writeln!(self.writer, "{}", HEADER)?;
        if self.config.include_source {
            if let Some(source) = file.source_name() {
                writeln!(self.writer, "// Source: {}", source)?;
            }
        }
        writeln!(self.writer)?;

        match file.edition() {
            Some(edition) => writeln!(self.writer, "edition = \"{}\";", edition)?,
            None => writeln!(self.writer, "syntax = \"{}\";", file.syntax().as_str())?,
        }

        if !file.imports().is_empty() {
            writeln!(self.writer)?;
            for import in file.imports() {
                writeln!(self.writer, "import \"{}\";", import)?;
            }
        }

        if let Some(package) = file.package() {
            writeln!(self.writer)?;
            writeln!(self.writer, "package {};", package)?;
        }

        Ok(())
    }

    fn write_message(&mut self, _file: &SchemaFile, message: &Message) -> std::fmt::Result {
        writeln!(self.writer)?;
        writeln!(self.writer, "message {} {{", message.name)
    }

    fn write_field(&mut self, file: &SchemaFile, field: &MessageField) -> std::fmt::Result {
        self.write_indent()?;
        if field.optional {
            write!(self.writer, "optional ")?;
        }
        if field.required {
            write!(self.writer, "required ")?;
        }
        write!(
            self.writer,
            "{} {} = {}",
            file.type_name(&field.field_type),
            field.name,
            field.number
        )?;
        if field.deprecated {
            write!(self.writer, " [deprecated = true]")?;
        }
        writeln!(self.writer, ";")
    }

    fn write_enum(&mut self, enum_type: &Enum) -> std::fmt::Result {
        writeln!(self.writer)?;
        writeln!(self.writer, "enum {} {{", enum_type.name)
    }

    fn write_enum_value(&mut self, value: &EnumField) -> std::fmt::Result {
        self.write_indent()?;
        write!(self.writer, "{} = {}", value.name, value.value)?;
        if value.deprecated {
            write!(self.writer, " [deprecated = true]")?;
        }
        writeln!(self.writer, ";")
    }

    fn end_entry(&mut self) -> std::fmt::Result {
        writeln!(self.writer, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ElementType, EntryRef, FieldType, Label, ProtoSyntax, Scalar};
    use pretty_assertions::assert_eq;
    use std::rc::Rc;

    fn sample() -> SchemaFile {
        let mut common = SchemaFile::new();
        common.set_package("shared");
        let item = common.push_entry(Message::new("Item"));
        common.set_file_name("Common.proto");
        let common = Rc::new(common);

        let mut file = SchemaFile::new();
        file.set_source_name("person_pb.lua");
        file.add_import(common.file_name());
        let kind = file.push_entry(Enum::new("Kind"));

        let mut person = Message::new("Person");
        person.insert_field(
            MessageField::new(
                "items",
                3,
                FieldType::Single(ElementType::Message(EntryRef::External { file: common, entry: item })),
            )
            .with_label(Label::Repeated),
        );
        person.insert_field(
            MessageField::new("kind", 2, FieldType::Single(ElementType::Enum(EntryRef::Local(kind))))
                .with_label(Label::Optional),
        );
        let mut id = MessageField::new("id", 1, FieldType::scalar(Scalar::Int64)).with_label(Label::Required);
        id.deprecated = true;
        person.insert_field(id);
        file.push_entry(person);

        if let Some(crate::schema::TopLevel::Enum(kind)) = file.entry_mut(kind) {
            kind.values.push(EnumField::new("NONE", 0));
            let mut old = EnumField::new("OLD", -5);
            old.deprecated = true;
            kind.values.push(old);
        }
        file
    }

    #[test]
    fn test_render() {
        let expected = "\
// Reconstructed by protolift
// Source: person_pb.lua

syntax = \"proto2\";

import \"Common.proto\";

enum Kind {
  NONE = 0;
  OLD = -5 [deprecated = true];
}

message Person {
  required int64 id = 1 [deprecated = true];
  optional Kind kind = 2;
  repeated shared.Item items = 3;
}
";
        assert_eq!(render(&sample()), expected);
    }

    #[test]
    fn test_render_minimal_file() {
        let mut file = SchemaFile::new();
        file.set_syntax(ProtoSyntax::Proto3);
        file.set_package("game");
        file.push_entry(Message::new("Empty"));

        let expected = "\
// Reconstructed by protolift

syntax = \"proto3\";

package game;

message Empty {
}
";
        assert_eq!(render(&file), expected);
    }

    #[test]
    fn test_writer_config() {
        let mut file = sample();
        file.set_edition("2023");
        let config = WriterConfig::new().indent_str("\t").include_source(false);
        let text = render_with(&file, &config);

        assert!(text.starts_with("// Reconstructed by protolift\n\nedition = \"2023\";\n"));
        assert!(text.contains("\tNONE = 0;\n"));
        assert!(!text.contains("// Source:"));
    }

    #[test]
    fn test_render_is_stable() {
        let file = sample();
        assert_eq!(render(&file), render(&file));
    }
}
