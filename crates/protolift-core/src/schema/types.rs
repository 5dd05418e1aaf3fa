//! Field types: the scalar catalog, descriptor codes and references to
//! top-level entries.

use super::SchemaFile;
use std::fmt;
use std::rc::Rc;

/// Primitive protobuf wire types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scalar {
    /// `double`
    Double,
    /// `float`
    Float,
    /// `int64`
    Int64,
    /// `uint64`
    UInt64,
    /// `int32`
    Int32,
    /// `fixed64`
    Fixed64,
    /// `fixed32`
    Fixed32,
    /// `bool`
    Bool,
    /// `string`
    String,
    /// `bytes`
    Bytes,
    /// `uint32`
    UInt32,
    /// `sfixed32`
    SFixed32,
    /// `sfixed64`
    SFixed64,
    /// `sint32`
    SInt32,
    /// `sint64`
    SInt64,
}

impl Scalar {
    /// Every scalar, in descriptor code order
    pub const ALL: [Scalar; 15] = [
        Scalar::Double,
        Scalar::Float,
        Scalar::Int64,
        Scalar::UInt64,
        Scalar::Int32,
        Scalar::Fixed64,
        Scalar::Fixed32,
        Scalar::Bool,
        Scalar::String,
        Scalar::Bytes,
        Scalar::UInt32,
        Scalar::SFixed32,
        Scalar::SFixed64,
        Scalar::SInt32,
        Scalar::SInt64,
    ];

    /// Returns the `.proto` keyword for this type
    pub fn name(self) -> &'static str {
        match self {
            Scalar::Double => "double",
            Scalar::Float => "float",
            Scalar::Int64 => "int64",
            Scalar::UInt64 => "uint64",
            Scalar::Int32 => "int32",
            Scalar::Fixed64 => "fixed64",
            Scalar::Fixed32 => "fixed32",
            Scalar::Bool => "bool",
            Scalar::String => "string",
            Scalar::Bytes => "bytes",
            Scalar::UInt32 => "uint32",
            Scalar::SFixed32 => "sfixed32",
            Scalar::SFixed64 => "sfixed64",
            Scalar::SInt32 => "sint32",
            Scalar::SInt64 => "sint64",
        }
    }

    /// Returns the `FieldDescriptorProto.Type` code
    pub fn code(self) -> i32 {
        match self {
            Scalar::Double => 1,
            Scalar::Float => 2,
            Scalar::Int64 => 3,
            Scalar::UInt64 => 4,
            Scalar::Int32 => 5,
            Scalar::Fixed64 => 6,
            Scalar::Fixed32 => 7,
            Scalar::Bool => 8,
            Scalar::String => 9,
            Scalar::Bytes => 12,
            Scalar::UInt32 => 13,
            Scalar::SFixed32 => 15,
            Scalar::SFixed64 => 16,
            Scalar::SInt32 => 17,
            Scalar::SInt64 => 18,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Classification of a `FieldDescriptorProto.Type` code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCode {
    /// A primitive type
    Scalar(Scalar),
    /// Code 10, proto2 groups
    Group,
    /// Code 11, the type comes from a message reference
    Message,
    /// Code 14, the type comes from an enum reference
    Enum,
    /// Anything outside the descriptor catalog
    Unknown(i64),
}

impl From<i64> for TypeCode {
    fn from(code: i64) -> Self {
        match code {
            10 => TypeCode::Group,
            11 => TypeCode::Message,
            14 => TypeCode::Enum,
            _ => Scalar::ALL
                .into_iter()
                .find(|s| i64::from(s.code()) == code)
                .map_or(TypeCode::Unknown(code), TypeCode::Scalar),
        }
    }
}

/// `FieldDescriptorProto.Label`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Label {
    /// Code 1
    Optional,
    /// Code 2
    Required,
    /// Code 3
    Repeated,
}

impl Label {
    /// Maps a label code, returning `None` for codes outside 1..=3
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(Label::Optional),
            2 => Some(Label::Required),
            3 => Some(Label::Repeated),
            _ => None,
        }
    }

    /// Returns the descriptor code
    pub fn code(self) -> i32 {
        match self {
            Label::Optional => 1,
            Label::Required => 2,
            Label::Repeated => 3,
        }
    }
}

/// Index of a top-level entry within its file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId(pub(crate) usize);

impl EntryId {
    /// Position in [`SchemaFile::entries`]
    pub fn index(self) -> usize {
        self.0
    }
}

/// Handle to a message or enum, in the same file or in an imported one
#[derive(Clone)]
pub enum EntryRef {
    /// Entry of the file that owns the referencing field
    Local(EntryId),
    /// Entry of another, already completed file
    External {
        /// The imported file
        file: Rc<SchemaFile>,
        /// Entry within `file`
        entry: EntryId,
    },
}

impl EntryRef {
    /// Returns the entry id, regardless of which file it lives in
    pub fn entry(&self) -> EntryId {
        match self {
            EntryRef::Local(entry) | EntryRef::External { entry, .. } => *entry,
        }
    }
}

impl fmt::Debug for EntryRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryRef::Local(entry) => f.debug_tuple("Local").field(entry).finish(),
            EntryRef::External { file, entry } => f
                .debug_struct("External")
                .field("file", &file.file_name())
                .field("entry", entry)
                .finish(),
        }
    }
}

impl PartialEq for EntryRef {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (EntryRef::Local(a), EntryRef::Local(b)) => a == b,
            (
                EntryRef::External { file: fa, entry: a },
                EntryRef::External { file: fb, entry: b },
            ) => Rc::ptr_eq(fa, fb) && a == b,
            _ => false,
        }
    }
}

/// A single (non-repeated) value type
#[derive(Debug, Clone, PartialEq)]
pub enum ElementType {
    /// Primitive type
    Scalar(Scalar),
    /// Message reference
    Message(EntryRef),
    /// Enum reference
    Enum(EntryRef),
}

/// Resolved type of a message field.
///
/// Repetition wraps an [`ElementType`], so a repeated repeated type cannot be
/// expressed.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldType {
    /// One value
    Single(ElementType),
    /// `repeated T`
    Repeated(ElementType),
}

impl FieldType {
    /// Shorthand for a non-repeated scalar
    pub fn scalar(scalar: Scalar) -> Self {
        FieldType::Single(ElementType::Scalar(scalar))
    }

    /// The element type, without repetition
    pub fn element(&self) -> &ElementType {
        match self {
            FieldType::Single(element) | FieldType::Repeated(element) => element,
        }
    }

    /// Returns true for the repeated wrapper
    pub fn is_repeated(&self) -> bool {
        matches!(self, FieldType::Repeated(_))
    }

    /// Wraps the element type in `repeated`; already repeated types are unchanged
    pub fn into_repeated(self) -> Self {
        match self {
            FieldType::Single(element) => FieldType::Repeated(element),
            repeated => repeated,
        }
    }
}

impl From<ElementType> for FieldType {
    fn from(element: ElementType) -> Self {
        FieldType::Single(element)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_codes() {
        assert_eq!(TypeCode::from(1), TypeCode::Scalar(Scalar::Double));
        assert_eq!(TypeCode::from(9), TypeCode::Scalar(Scalar::String));
        assert_eq!(TypeCode::from(12), TypeCode::Scalar(Scalar::Bytes));
        assert_eq!(TypeCode::from(18), TypeCode::Scalar(Scalar::SInt64));
        assert_eq!(TypeCode::from(10), TypeCode::Group);
        assert_eq!(TypeCode::from(11), TypeCode::Message);
        assert_eq!(TypeCode::from(14), TypeCode::Enum);
        assert_eq!(TypeCode::from(19), TypeCode::Unknown(19));
        assert_eq!(TypeCode::from(0), TypeCode::Unknown(0));
    }

    #[test]
    fn test_scalar_codes_are_distinct() {
        let mut codes: Vec<_> = Scalar::ALL.iter().map(|s| s.code()).collect();
        codes.dedup();
        assert_eq!(codes.len(), 15);
        assert!(!codes.contains(&10));
    }

    #[test]
    fn test_labels() {
        assert_eq!(Label::from_code(1), Some(Label::Optional));
        assert_eq!(Label::from_code(2), Some(Label::Required));
        assert_eq!(Label::from_code(3), Some(Label::Repeated));
        assert_eq!(Label::from_code(4), None);
    }

    #[test]
    fn test_repeated_is_not_nested() {
        let ty = FieldType::scalar(Scalar::Int32).into_repeated().into_repeated();
        assert_eq!(ty, FieldType::Repeated(ElementType::Scalar(Scalar::Int32)));
        assert!(ty.is_repeated());
    }
}
