//! Export of reconstructed files as protobuf descriptors.
//!
//! Conversion to `prost_types` is direct. [`descriptor_pool`] then runs the
//! result through prost-reflect, so dangling type names or duplicate symbols
//! surface as errors before anything is written.

use crate::error::{Error, Result};
use crate::schema::{
    ElementType, Enum, EntryRef, Label, Message, MessageField, SchemaFile, TopLevel,
};
use prost::Message as _;
use prost_reflect::DescriptorPool;
use prost_types::field_descriptor_proto::{Label as ProtoLabel, Type as ProtoType};
use prost_types::{
    DescriptorProto, EnumDescriptorProto, EnumValueDescriptorProto, EnumValueOptions,
    FieldDescriptorProto, FieldOptions, FileDescriptorProto, FileDescriptorSet,
};
use std::rc::Rc;
use tracing::debug;

/// Converts one file into a `FileDescriptorProto`
pub fn to_file_descriptor_proto(file: &SchemaFile) -> FileDescriptorProto {
    let mut proto = FileDescriptorProto {
        name: Some(file.file_name().to_string()),
        package: file.package().map(str::to_string),
        dependency: file.imports().to_vec(),
        syntax: Some(file.syntax().as_str().to_string()),
        ..Default::default()
    };

    for entry in file.entries() {
        match entry {
            TopLevel::Message(message) => proto.message_type.push(message_proto(file, message)),
            TopLevel::Enum(enum_type) => proto.enum_type.push(enum_proto(enum_type)),
        }
    }

    proto
}

/// Converts files into a set, keeping their order
pub fn to_descriptor_set(files: &[Rc<SchemaFile>]) -> FileDescriptorSet {
    FileDescriptorSet {
        file: files.iter().map(|file| to_file_descriptor_proto(file)).collect(),
    }
}

/// Builds and validates a descriptor pool.
///
/// Every import of every file must be part of `files`.
pub fn descriptor_pool(files: &[Rc<SchemaFile>]) -> Result<DescriptorPool> {
    let set = to_descriptor_set(files);
    let pool = DescriptorPool::from_file_descriptor_set(set)
        .map_err(|e| Error::descriptor_build(e.to_string()))?;
    debug!("Built descriptor pool with {} files", pool.files().count());
    Ok(pool)
}

/// Validates the files and encodes them as a serialized `FileDescriptorSet`
pub fn encode_descriptor_set(files: &[Rc<SchemaFile>]) -> Result<Vec<u8>> {
    descriptor_pool(files)?;
    Ok(to_descriptor_set(files).encode_to_vec())
}

fn message_proto(file: &SchemaFile, message: &Message) -> DescriptorProto {
    DescriptorProto {
        name: Some(message.name.clone()),
        field: message.fields().map(|field| field_proto(file, field)).collect(),
        ..Default::default()
    }
}

fn field_proto(file: &SchemaFile, field: &MessageField) -> FieldDescriptorProto {
    let label = if field.is_repeated() {
        Label::Repeated
    } else if field.required {
        Label::Required
    } else {
        Label::Optional
    };

    let (ty, type_name) = match field.field_type.element() {
        ElementType::Scalar(scalar) => (scalar_type(scalar.code()), None),
        ElementType::Message(entry) => (ProtoType::Message, Some(full_name(file, entry))),
        ElementType::Enum(entry) => (ProtoType::Enum, Some(full_name(file, entry))),
    };

    FieldDescriptorProto {
        name: Some(field.name.clone()),
        number: Some(field.number),
        label: Some(proto_label(label) as i32),
        r#type: Some(ty as i32),
        type_name,
        json_name: Some(to_lower_camel_case(&field.name)),
        options: field.deprecated.then(|| FieldOptions {
            deprecated: Some(true),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn enum_proto(enum_type: &Enum) -> EnumDescriptorProto {
    EnumDescriptorProto {
        name: Some(enum_type.name.clone()),
        value: enum_type
            .values
            .iter()
            .map(|value| EnumValueDescriptorProto {
                name: Some(value.name.clone()),
                number: Some(value.value),
                options: value.deprecated.then(|| EnumValueOptions {
                    deprecated: Some(true),
                    ..Default::default()
                }),
            })
            .collect(),
        ..Default::default()
    }
}

fn proto_label(label: Label) -> ProtoLabel {
    match label {
        Label::Optional => ProtoLabel::Optional,
        Label::Required => ProtoLabel::Required,
        Label::Repeated => ProtoLabel::Repeated,
    }
}

fn scalar_type(code: i32) -> ProtoType {
    // Scalar codes are taken from descriptor.proto, so the lookup cannot miss
    ProtoType::try_from(code).unwrap_or(ProtoType::Bytes)
}

/// Fully qualified name with a leading dot, as descriptors spell references
fn full_name(file: &SchemaFile, entry: &EntryRef) -> String {
    let package = match entry {
        EntryRef::Local(_) => file.package(),
        EntryRef::External { file: owner, .. } => owner.package(),
    };
    let name = file.resolve(entry).map(TopLevel::name).unwrap_or_default();

    match package {
        Some(package) => format!(".{package}.{name}"),
        None => format!(".{name}"),
    }
}

/// Convert a snake_case name to lowerCamelCase
fn to_lower_camel_case(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut capitalize_next = false;

    for c in s.chars() {
        if c == '_' {
            capitalize_next = true;
        } else if capitalize_next {
            result.push(c.to_ascii_uppercase());
            capitalize_next = false;
        } else {
            result.push(c);
        }
    }

    result
}
