//! Intermediate representation of one generated schema file.

use super::writer::ProtoWriter;
use crate::metadata::ScalarType;
use std::fmt;

/// Field label in the generated proto2 schema
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldLabel {
    /// `optional`
    Optional,
    /// `required`
    Required,
    /// `repeated`
    Repeated,
}

impl FieldLabel {
    /// Returns the proto keyword
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldLabel::Optional => "optional",
            FieldLabel::Required => "required",
            FieldLabel::Repeated => "repeated",
        }
    }
}

/// Type of a schema field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    /// Scalar keyword
    Scalar(ScalarType),
    /// Message, by fully-qualified schema name
    Message(String),
    /// Enum, by fully-qualified schema name
    Enum(String),
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Scalar(scalar) => f.write_str(scalar.as_str()),
            FieldType::Message(name) | FieldType::Enum(name) => f.write_str(name),
        }
    }
}

/// One field declaration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldLine {
    /// Label
    pub label: FieldLabel,
    /// Field type
    pub field_type: FieldType,
    /// Field name
    pub name: String,
    /// Field number
    pub number: u32,
}

/// One enum constant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumLine {
    /// Symbol name
    pub name: String,
    /// Wire number
    pub number: i32,
}

/// A message definition and the definitions nested in it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageBlock {
    /// Simple schema name
    pub name: String,
    /// Fully-qualified schema name
    pub full_name: String,
    /// Type the block was generated from
    pub source: String,
    /// Declared fields
    pub fields: Vec<FieldLine>,
    /// Nested definitions, in discovery order
    pub nested: Vec<SchemaItem>,
}

/// An enum definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumBlock {
    /// Simple schema name
    pub name: String,
    /// Fully-qualified schema name
    pub full_name: String,
    /// Type the block was generated from
    pub source: String,
    /// Constants
    pub values: Vec<EnumLine>,
}

/// A top-level or nested definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaItem {
    /// Message definition
    Message(MessageBlock),
    /// Enum definition
    Enum(EnumBlock),
}

impl SchemaItem {
    /// Simple schema name
    pub fn name(&self) -> &str {
        match self {
            SchemaItem::Message(m) => &m.name,
            SchemaItem::Enum(e) => &e.name,
        }
    }

    /// Type the definition was generated from
    pub fn source(&self) -> &str {
        match self {
            SchemaItem::Message(m) => &m.source,
            SchemaItem::Enum(e) => &e.source,
        }
    }
}

/// One generated schema file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaFile {
    /// Unit that owns the file
    pub unit: String,
    /// Path relative to the output directory
    pub file_name: String,
    /// Proto package, if any
    pub package: Option<String>,
    /// Schema files of the units this one depends on
    pub imports: Vec<String>,
    /// Top-level definitions, in discovery order
    pub items: Vec<SchemaItem>,
}

impl SchemaFile {
    /// Feeds the file to a [`ProtoWriter`], depth first
    pub fn walk<W: ProtoWriter + ?Sized>(&self, writer: &mut W) -> fmt::Result {
        writer.write_file(self)?;
        walk_items(&self.items, writer)
    }

    /// Returns the source types of every definition, depth first
    pub fn sources(&self) -> Vec<&str> {
        fn collect<'a>(items: &'a [SchemaItem], out: &mut Vec<&'a str>) {
            for item in items {
                out.push(item.source());
                if let SchemaItem::Message(m) = item {
                    collect(&m.nested, out);
                }
            }
        }
        let mut out = Vec::new();
        collect(&self.items, &mut out);
        out
    }
}

fn walk_items<W: ProtoWriter + ?Sized>(items: &[SchemaItem], writer: &mut W) -> fmt::Result {
    for item in items {
        match item {
            SchemaItem::Message(message) => {
                writer.write_message(message)?;
                walk_items(&message.nested, writer)?;
                for field in &message.fields {
                    writer.write_field(field)?;
                }
                writer.end_message(message)?;
            }
            SchemaItem::Enum(enum_block) => writer.write_enum(enum_block)?,
        }
    }
    Ok(())
}
