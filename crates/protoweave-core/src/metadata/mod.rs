//! Type metadata consumed by discovery and marshalling.
//!
//! The engine never inspects host-language types directly. Everything it needs
//! (type names, kinds, declared fields and enum symbols) comes through the
//! read-only [`TypeMetadataProvider`] trait. [`TypeUniverse`] is the in-memory
//! implementation; it can be loaded from JSON or from a compiled
//! `FileDescriptorSet` (see [`TypeUniverse::from_descriptor_set_bytes`]).

mod reflect;

use crate::error::{Error, Result};
use crate::MAX_FIELD_NUMBER;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;

/// Whether a type is a message or an enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeKind {
    /// Message type with fields
    Message,
    /// Enum type with symbols
    Enum,
}

/// Protobuf scalar types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalarType {
    /// 64-bit float
    Double,
    /// 32-bit float
    Float,
    /// Varint-encoded signed 32-bit
    Int32,
    /// Varint-encoded signed 64-bit
    Int64,
    /// Varint-encoded unsigned 32-bit
    Uint32,
    /// Varint-encoded unsigned 64-bit
    Uint64,
    /// Zigzag-encoded signed 32-bit
    Sint32,
    /// Zigzag-encoded signed 64-bit
    Sint64,
    /// Fixed-width unsigned 32-bit
    Fixed32,
    /// Fixed-width unsigned 64-bit
    Fixed64,
    /// Fixed-width signed 32-bit
    Sfixed32,
    /// Fixed-width signed 64-bit
    Sfixed64,
    /// Boolean
    Bool,
    /// UTF-8 string
    String,
    /// Raw bytes
    Bytes,
}

impl ScalarType {
    /// Returns the proto keyword for this type
    pub fn as_str(&self) -> &'static str {
        match self {
            ScalarType::Double => "double",
            ScalarType::Float => "float",
            ScalarType::Int32 => "int32",
            ScalarType::Int64 => "int64",
            ScalarType::Uint32 => "uint32",
            ScalarType::Uint64 => "uint64",
            ScalarType::Sint32 => "sint32",
            ScalarType::Sint64 => "sint64",
            ScalarType::Fixed32 => "fixed32",
            ScalarType::Fixed64 => "fixed64",
            ScalarType::Sfixed32 => "sfixed32",
            ScalarType::Sfixed64 => "sfixed64",
            ScalarType::Bool => "bool",
            ScalarType::String => "string",
            ScalarType::Bytes => "bytes",
        }
    }

    /// Returns true if repeated values of this type may be packed
    pub fn is_packable(&self) -> bool {
        !matches!(self, ScalarType::String | ScalarType::Bytes)
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a field carries on the wire
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    /// A scalar value
    Scalar(ScalarType),
    /// A nested message, by fully-qualified type name
    Message(String),
    /// An enum value, by fully-qualified type name
    Enum(String),
}

impl FieldKind {
    /// Returns the referenced type name for message and enum fields
    pub fn referenced_type(&self) -> Option<&str> {
        match self {
            FieldKind::Scalar(_) => None,
            FieldKind::Message(name) | FieldKind::Enum(name) => Some(name),
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldKind::Scalar(scalar) => write!(f, "{}", scalar),
            FieldKind::Message(name) => write!(f, "message {}", name),
            FieldKind::Enum(name) => write!(f, "enum {}", name),
        }
    }
}

/// Field cardinality
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cardinality {
    /// At most one value
    #[default]
    Single,
    /// Zero or more values
    Collection,
}

/// A declared field of a message type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    /// Field name
    pub name: String,
    /// Field number (tag)
    pub number: u32,
    /// Wire kind
    pub kind: FieldKind,
    /// Single or collection
    #[serde(default)]
    pub cardinality: Cardinality,
    /// Whether a singular field must be present
    #[serde(default)]
    pub required: bool,
}

impl FieldDescriptor {
    /// Creates an optional singular field
    pub fn new(name: impl Into<String>, number: u32, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            number,
            kind,
            cardinality: Cardinality::Single,
            required: false,
        }
    }

    /// Marks the field as a collection
    pub fn repeated(mut self) -> Self {
        self.cardinality = Cardinality::Collection;
        self
    }

    /// Marks the field as required
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Returns true for collection fields
    pub fn is_collection(&self) -> bool {
        self.cardinality == Cardinality::Collection
    }
}

/// A named enum constant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumValue {
    /// Symbol name
    pub name: String,
    /// Wire number
    pub number: i32,
}

fn default_true() -> bool {
    true
}

/// Metadata for one message or enum type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDescriptor {
    /// Package the type lives in (may be empty)
    #[serde(default)]
    pub package: String,
    /// Dotted name relative to the package, e.g. `Outer.Inner`
    pub name: String,
    /// Message or enum
    pub kind: TypeKind,
    /// Declared fields, in declaration order (messages only)
    #[serde(default)]
    pub fields: Vec<FieldDescriptor>,
    /// Symbol table (enums only)
    #[serde(default)]
    pub values: Vec<EnumValue>,
    /// Whether instances carry an unknown field set
    #[serde(default = "default_true")]
    pub unknown_fields: bool,
}

impl TypeDescriptor {
    /// Creates an empty message descriptor
    pub fn message(package: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            name: name.into(),
            kind: TypeKind::Message,
            fields: Vec::new(),
            values: Vec::new(),
            unknown_fields: true,
        }
    }

    /// Creates an empty enum descriptor
    pub fn enumeration(package: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: TypeKind::Enum,
            ..Self::message(package, name)
        }
    }

    /// Adds a field
    pub fn field(mut self, field: FieldDescriptor) -> Self {
        self.fields.push(field);
        self
    }

    /// Adds an enum symbol
    pub fn value(mut self, name: impl Into<String>, number: i32) -> Self {
        self.values.push(EnumValue {
            name: name.into(),
            number,
        });
        self
    }

    /// Returns the fully-qualified name
    pub fn full_name(&self) -> String {
        qualify(&self.package, &self.name)
    }

    /// Returns the last segment of the name
    pub fn simple_name(&self) -> &str {
        self.name.rsplit('.').next().unwrap_or(&self.name)
    }

    /// Returns true if the type is lexically nested in another type
    pub fn is_nested(&self) -> bool {
        self.name.contains('.')
    }

    /// Returns the fully-qualified name of the enclosing type
    pub fn enclosing_type(&self) -> Option<String> {
        self.name
            .rsplit_once('.')
            .map(|(parent, _)| qualify(&self.package, parent))
    }

    /// Returns true if the type's package is `package` or one of its subpackages
    pub fn is_in_package(&self, package: &str) -> bool {
        self.package == package
            || self
                .package
                .strip_prefix(package)
                .is_some_and(|rest| rest.starts_with('.'))
    }

    /// Looks up a field by name
    pub fn find_field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Looks up a field by number
    pub fn find_field_by_number(&self, number: u32) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.number == number)
    }

    /// Looks up an enum symbol by wire number
    pub fn find_value(&self, number: i32) -> Option<&EnumValue> {
        self.values.iter().find(|v| v.number == number)
    }

    fn check(&self) -> Result<()> {
        let full_name = self.full_name();
        if self.name.is_empty() {
            return Err(Error::invalid_metadata(full_name, "empty type name"));
        }
        let mut numbers = HashSet::new();
        let mut names = HashSet::new();
        for field in &self.fields {
            if field.number == 0 || field.number > MAX_FIELD_NUMBER {
                return Err(Error::InvalidFieldNumber {
                    number: field.number,
                    max: MAX_FIELD_NUMBER,
                });
            }
            if !numbers.insert(field.number) {
                return Err(Error::invalid_metadata(
                    full_name,
                    format!("duplicate field number {}", field.number),
                ));
            }
            if !names.insert(field.name.as_str()) {
                return Err(Error::invalid_metadata(
                    full_name,
                    format!("duplicate field name '{}'", field.name),
                ));
            }
        }
        match self.kind {
            TypeKind::Enum if !self.fields.is_empty() => {
                Err(Error::invalid_metadata(full_name, "enum types cannot declare fields"))
            }
            TypeKind::Message if !self.values.is_empty() => {
                Err(Error::invalid_metadata(full_name, "message types cannot declare enum values"))
            }
            _ => Ok(()),
        }
    }
}

/// Joins a package and a relative name
pub(crate) fn qualify(package: &str, name: &str) -> String {
    if package.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", package, name)
    }
}

/// Read-only source of type metadata.
///
/// Implementations must be safe to share across threads, since several units
/// may query the same provider.
pub trait TypeMetadataProvider: Send + Sync {
    /// Looks up a type by fully-qualified name
    fn lookup(&self, full_name: &str) -> Option<&TypeDescriptor>;

    /// Enumerates all known types in a stable order
    fn types(&self) -> Box<dyn Iterator<Item = &TypeDescriptor> + '_>;

    /// Looks up a type, failing with [`Error::UnknownType`]
    fn require(&self, full_name: &str) -> Result<&TypeDescriptor> {
        self.lookup(full_name)
            .ok_or_else(|| Error::unknown_type(full_name))
    }
}

#[derive(Deserialize)]
struct UniverseFile {
    #[serde(default)]
    types: Vec<TypeDescriptor>,
}

/// In-memory type metadata, in insertion order
#[derive(Debug, Clone, Default)]
pub struct TypeUniverse {
    types: Vec<TypeDescriptor>,
    index: HashMap<String, usize>,
}

impl TypeUniverse {
    /// Creates an empty universe
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a type, rejecting duplicates and malformed descriptors
    pub fn insert(&mut self, descriptor: TypeDescriptor) -> Result<()> {
        descriptor.check()?;
        let full_name = descriptor.full_name();
        if self.index.contains_key(&full_name) {
            return Err(Error::invalid_metadata(full_name, "type declared more than once"));
        }
        self.index.insert(full_name, self.types.len());
        self.types.push(descriptor);
        Ok(())
    }

    /// Builder-style [`insert`](Self::insert)
    pub fn with(mut self, descriptor: TypeDescriptor) -> Result<Self> {
        self.insert(descriptor)?;
        Ok(self)
    }

    /// Moves every type of `other` into this universe
    pub fn merge(&mut self, other: TypeUniverse) -> Result<()> {
        for descriptor in other.types {
            self.insert(descriptor)?;
        }
        Ok(())
    }

    /// Parses a JSON document of the form `{"types": [...]}`
    pub fn from_json(json: &str) -> std::result::Result<Self, serde_json::Error> {
        let file: UniverseFile = serde_json::from_str(json)?;
        let mut universe = Self::new();
        for descriptor in file.types {
            universe
                .insert(descriptor)
                .map_err(serde::de::Error::custom)?;
        }
        Ok(universe)
    }

    /// Loads a JSON universe from disk
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| Error::file_read(path, e))?;
        Self::from_json(&text).map_err(|e| Error::parse(path, e))
    }

    /// Number of known types
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Returns true if no types are known
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

impl TypeMetadataProvider for TypeUniverse {
    fn lookup(&self, full_name: &str) -> Option<&TypeDescriptor> {
        self.index.get(full_name).map(|&i| &self.types[i])
    }

    fn types(&self) -> Box<dyn Iterator<Item = &TypeDescriptor> + '_> {
        Box::new(self.types.iter())
    }
}
