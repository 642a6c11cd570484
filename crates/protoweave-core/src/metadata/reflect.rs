//! Builds a [`TypeUniverse`] from compiled protobuf descriptors.
//!
//! Hosts that already carry a `FileDescriptorSet` (for example one emitted by
//! `protoc --descriptor_set_out`) can feed discovery without writing JSON
//! metadata by hand.

use super::{
    Cardinality, FieldDescriptor, FieldKind, ScalarType, TypeDescriptor, TypeKind, TypeUniverse,
};
use crate::error::{Error, Result};
use prost::Message;
use prost_reflect::{Cardinality as ReflectCardinality, DescriptorPool, Kind};
use prost_types::FileDescriptorSet;
use tracing::debug;

impl TypeUniverse {
    /// Decodes a binary `FileDescriptorSet` and converts every message and enum
    pub fn from_descriptor_set_bytes(data: &[u8]) -> Result<Self> {
        let set = FileDescriptorSet::decode(data)?;
        let pool = DescriptorPool::from_file_descriptor_set(set)
            .map_err(|e| Error::descriptor_build(e.to_string()))?;
        Self::from_descriptor_pool(&pool)
    }

    /// Converts every message and enum in `pool`
    pub fn from_descriptor_pool(pool: &DescriptorPool) -> Result<Self> {
        let mut universe = Self::new();

        for message in pool.all_messages() {
            let package = message.package_name().to_string();
            let name = relative_name(message.full_name(), &package);

            let mut descriptor = TypeDescriptor::message(package, name);
            for field in message.fields() {
                let kind = match field.kind() {
                    Kind::Message(nested) => FieldKind::Message(nested.full_name().to_string()),
                    Kind::Enum(nested) => FieldKind::Enum(nested.full_name().to_string()),
                    scalar => FieldKind::Scalar(scalar_type(&scalar)?),
                };
                descriptor.fields.push(FieldDescriptor {
                    name: field.name().to_string(),
                    number: field.number(),
                    kind,
                    cardinality: if field.is_list() || field.is_map() {
                        Cardinality::Collection
                    } else {
                        Cardinality::Single
                    },
                    required: field.cardinality() == ReflectCardinality::Required,
                });
            }
            universe.insert(descriptor)?;
        }

        for enumeration in pool.all_enums() {
            let package = enumeration.package_name().to_string();
            let name = relative_name(enumeration.full_name(), &package);

            let mut descriptor = TypeDescriptor::enumeration(package, name);
            for value in enumeration.values() {
                descriptor = descriptor.value(value.name(), value.number());
            }
            universe.insert(descriptor)?;
        }

        debug!("Loaded {} types from descriptor pool", universe.len());
        Ok(universe)
    }
}

fn relative_name(full_name: &str, package: &str) -> String {
    if package.is_empty() {
        return full_name.to_string();
    }
    full_name
        .strip_prefix(package)
        .and_then(|rest| rest.strip_prefix('.'))
        .unwrap_or(full_name)
        .to_string()
}

fn scalar_type(kind: &Kind) -> Result<ScalarType> {
    Ok(match kind {
        Kind::Double => ScalarType::Double,
        Kind::Float => ScalarType::Float,
        Kind::Int32 => ScalarType::Int32,
        Kind::Int64 => ScalarType::Int64,
        Kind::Uint32 => ScalarType::Uint32,
        Kind::Uint64 => ScalarType::Uint64,
        Kind::Sint32 => ScalarType::Sint32,
        Kind::Sint64 => ScalarType::Sint64,
        Kind::Fixed32 => ScalarType::Fixed32,
        Kind::Fixed64 => ScalarType::Fixed64,
        Kind::Sfixed32 => ScalarType::Sfixed32,
        Kind::Sfixed64 => ScalarType::Sfixed64,
        Kind::Bool => ScalarType::Bool,
        Kind::String => ScalarType::String,
        Kind::Bytes => ScalarType::Bytes,
        Kind::Message(_) | Kind::Enum(_) => {
            return Err(Error::internal("message and enum kinds are not scalars"))
        }
    })
}
