//! Marshalling contract between in-memory values and the protobuf wire format.
//!
//! Every message type gets a [`MessageAdapter`] that reads its fields by name
//! from a [`FieldReader`] and writes them to a [`FieldWriter`]. Fields present
//! on the wire but unknown to the active schema are captured into an
//! [`UnknownFieldSet`]; adapters that expose an [`UnknownFieldSetHandler`] get
//! them back on the next write, so data survives a trip through an older
//! schema version unchanged.
//!
//! ## Example
//!
//! ```
//! use protoweave_core::marshal::{from_bytes, to_bytes, DynamicAdapter, DynamicMessage, Value};
//! use protoweave_core::metadata::{FieldDescriptor, FieldKind, ScalarType, TypeDescriptor, TypeUniverse};
//!
//! let universe = TypeUniverse::new()
//!     .with(
//!         TypeDescriptor::message("demo", "Point")
//!             .field(FieldDescriptor::new("x", 1, FieldKind::Scalar(ScalarType::Sint32)))
//!             .field(FieldDescriptor::new("y", 2, FieldKind::Scalar(ScalarType::Sint32))),
//!     )?;
//! let adapter = DynamicAdapter::new("demo.Point");
//!
//! let point = DynamicMessage::new("demo.Point")
//!     .with("x", Value::I32(-3))
//!     .with("y", Value::I32(4));
//! let bytes = to_bytes(&universe, &adapter, &point)?;
//! assert_eq!(from_bytes(&universe, &adapter, bytes)?, point);
//! # Ok::<(), protoweave_core::Error>(())
//! ```

mod dynamic;
mod reader;
mod scalar;
mod unknown;
pub mod wire;
mod writer;

pub use dynamic::{DynamicAdapter, DynamicMessage, Value};
pub use reader::{FieldReader, Repeated};
pub use scalar::Scalar;
pub use unknown::UnknownFieldSet;
pub use writer::FieldWriter;

use crate::error::{Error, Result};
use crate::metadata::{TypeDescriptor, TypeKind, TypeMetadataProvider};
use bytes::Bytes;
use tracing::trace;

/// A Rust enum mapped onto a protobuf enum's symbol table
pub trait ProtoEnum: Sized {
    /// Maps a wire number to a constant, `None` if the number is unknown
    fn from_number(number: i32) -> Option<Self>;

    /// Wire number of this constant
    fn number(&self) -> i32;
}

/// Access to the unknown fields carried by an instance
pub trait UnknownFieldSetHandler<T> {
    /// Returns the preserved unknown fields, if any
    fn unknown_fields<'v>(&self, value: &'v T) -> Option<&'v UnknownFieldSet>;

    /// Stores the unknown fields captured while reading `value`
    fn set_unknown_fields(&self, value: &mut T, unknown: UnknownFieldSet);
}

/// Reads and writes instances of `T` field by field.
pub trait MessageAdapter<T> {
    /// Fully-qualified schema type this adapter handles
    fn type_name(&self) -> &str;

    /// Builds an instance from the fields of one encoded message
    fn read_from(&self, reader: &mut FieldReader<'_>) -> Result<T>;

    /// Writes the fields of `value`
    fn write_to(&self, writer: &mut FieldWriter<'_>, value: &T) -> Result<()>;

    /// Unknown field accessors; `None` drops unknown fields on read
    fn unknown_field_handler(&self) -> Option<&dyn UnknownFieldSetHandler<T>> {
        None
    }
}

/// Decodes one message of the adapter's type
pub fn from_bytes<T, A>(
    provider: &dyn TypeMetadataProvider,
    adapter: &A,
    data: impl Into<Bytes>,
) -> Result<T>
where
    A: MessageAdapter<T> + ?Sized,
{
    decode_message(provider, adapter, data.into())
}

/// Encodes one message of the adapter's type
pub fn to_bytes<T, A>(provider: &dyn TypeMetadataProvider, adapter: &A, value: &T) -> Result<Bytes>
where
    A: MessageAdapter<T> + ?Sized,
{
    encode_message(provider, adapter, value)
}

fn message_descriptor<'a>(
    provider: &'a dyn TypeMetadataProvider,
    type_name: &str,
) -> Result<&'a TypeDescriptor> {
    let descriptor = provider.require(type_name)?;
    if descriptor.kind != TypeKind::Message {
        return Err(Error::invalid_metadata(type_name, "not a message type"));
    }
    Ok(descriptor)
}

pub(crate) fn decode_message<T, A>(
    provider: &dyn TypeMetadataProvider,
    adapter: &A,
    data: Bytes,
) -> Result<T>
where
    A: MessageAdapter<T> + ?Sized,
{
    let descriptor = message_descriptor(provider, adapter.type_name())?;
    let fields = wire::parse_fields(&data)?;

    let mut reader = FieldReader::new(provider, descriptor, fields);
    let mut value = adapter.read_from(&mut reader)?;
    let unknown = reader.finish();

    match adapter.unknown_field_handler() {
        Some(handler) if descriptor.unknown_fields => {
            handler.set_unknown_fields(&mut value, unknown)
        }
        _ if !unknown.is_empty() => trace!(
            type_name = adapter.type_name(),
            count = unknown.len(),
            "dropping unknown fields"
        ),
        _ => {}
    }
    Ok(value)
}

pub(crate) fn encode_message<T, A>(
    provider: &dyn TypeMetadataProvider,
    adapter: &A,
    value: &T,
) -> Result<Bytes>
where
    A: MessageAdapter<T> + ?Sized,
{
    let descriptor = message_descriptor(provider, adapter.type_name())?;

    let mut writer = FieldWriter::new(provider, descriptor);
    adapter.write_to(&mut writer, value)?;
    if descriptor.unknown_fields {
        if let Some(unknown) = adapter
            .unknown_field_handler()
            .and_then(|handler| handler.unknown_fields(value))
        {
            writer.write_unknown(unknown);
        }
    }
    writer.finish()
}
