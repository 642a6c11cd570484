//! Mapping between Rust scalar types and protobuf scalar encodings.

use super::wire::{
    encode_varint, zigzag_decode_32, zigzag_decode_64, zigzag_encode_32, zigzag_encode_64,
    RawValue,
};
use crate::metadata::ScalarType;
use bytes::{BufMut, Bytes, BytesMut};

/// A Rust value that can be read from or written to a scalar field.
///
/// One Rust type usually serves several wire encodings: `i32` handles
/// `int32`, `sint32` and `sfixed32`, and the field's declared [`ScalarType`]
/// picks the encoding.
pub trait Scalar: Sized {
    /// Returns true if values of this type can back fields of `scalar` type
    fn accepts(scalar: ScalarType) -> bool;

    /// Returns true if this particular value can be written as `scalar`
    fn fits(&self, scalar: ScalarType) -> bool {
        Self::accepts(scalar)
    }

    /// Decodes a value; `None` if the raw value does not have the right shape
    fn decode(scalar: ScalarType, value: &RawValue) -> Option<Self>;

    /// Appends the encoded value (without tag) to `buf`
    fn encode(&self, scalar: ScalarType, buf: &mut BytesMut);
}

fn put_len(data: &[u8], buf: &mut BytesMut) {
    encode_varint(data.len() as u64, buf);
    buf.put_slice(data);
}

impl Scalar for i32 {
    fn accepts(scalar: ScalarType) -> bool {
        matches!(scalar, ScalarType::Int32 | ScalarType::Sint32 | ScalarType::Sfixed32)
    }

    fn decode(scalar: ScalarType, value: &RawValue) -> Option<Self> {
        match (scalar, value) {
            (ScalarType::Int32, RawValue::Varint(v)) => Some(*v as i32),
            (ScalarType::Sint32, RawValue::Varint(v)) => Some(zigzag_decode_32(*v)),
            (ScalarType::Sfixed32, RawValue::Fixed32(v)) => Some(*v as i32),
            _ => None,
        }
    }

    fn encode(&self, scalar: ScalarType, buf: &mut BytesMut) {
        match scalar {
            // Negative int32 values are sign-extended to ten bytes
            ScalarType::Sint32 => encode_varint(zigzag_encode_32(*self), buf),
            ScalarType::Sfixed32 => buf.put_i32_le(*self),
            _ => encode_varint(*self as i64 as u64, buf),
        }
    }
}

impl Scalar for i64 {
    fn accepts(scalar: ScalarType) -> bool {
        matches!(scalar, ScalarType::Int64 | ScalarType::Sint64 | ScalarType::Sfixed64)
    }

    fn decode(scalar: ScalarType, value: &RawValue) -> Option<Self> {
        match (scalar, value) {
            (ScalarType::Int64, RawValue::Varint(v)) => Some(*v as i64),
            (ScalarType::Sint64, RawValue::Varint(v)) => Some(zigzag_decode_64(*v)),
            (ScalarType::Sfixed64, RawValue::Fixed64(v)) => Some(*v as i64),
            _ => None,
        }
    }

    fn encode(&self, scalar: ScalarType, buf: &mut BytesMut) {
        match scalar {
            ScalarType::Sint64 => encode_varint(zigzag_encode_64(*self), buf),
            ScalarType::Sfixed64 => buf.put_i64_le(*self),
            _ => encode_varint(*self as u64, buf),
        }
    }
}

impl Scalar for u32 {
    fn accepts(scalar: ScalarType) -> bool {
        matches!(scalar, ScalarType::Uint32 | ScalarType::Fixed32)
    }

    fn decode(scalar: ScalarType, value: &RawValue) -> Option<Self> {
        match (scalar, value) {
            (ScalarType::Uint32, RawValue::Varint(v)) => Some(*v as u32),
            (ScalarType::Fixed32, RawValue::Fixed32(v)) => Some(*v),
            _ => None,
        }
    }

    fn encode(&self, scalar: ScalarType, buf: &mut BytesMut) {
        match scalar {
            ScalarType::Fixed32 => buf.put_u32_le(*self),
            _ => encode_varint(*self as u64, buf),
        }
    }
}

impl Scalar for u64 {
    fn accepts(scalar: ScalarType) -> bool {
        matches!(scalar, ScalarType::Uint64 | ScalarType::Fixed64)
    }

    fn decode(scalar: ScalarType, value: &RawValue) -> Option<Self> {
        match (scalar, value) {
            (ScalarType::Uint64, RawValue::Varint(v)) => Some(*v),
            (ScalarType::Fixed64, RawValue::Fixed64(v)) => Some(*v),
            _ => None,
        }
    }

    fn encode(&self, scalar: ScalarType, buf: &mut BytesMut) {
        match scalar {
            ScalarType::Fixed64 => buf.put_u64_le(*self),
            _ => encode_varint(*self, buf),
        }
    }
}

impl Scalar for f32 {
    fn accepts(scalar: ScalarType) -> bool {
        scalar == ScalarType::Float
    }

    fn decode(_: ScalarType, value: &RawValue) -> Option<Self> {
        match value {
            RawValue::Fixed32(v) => Some(f32::from_bits(*v)),
            _ => None,
        }
    }

    fn encode(&self, _: ScalarType, buf: &mut BytesMut) {
        buf.put_f32_le(*self);
    }
}

impl Scalar for f64 {
    fn accepts(scalar: ScalarType) -> bool {
        scalar == ScalarType::Double
    }

    fn decode(_: ScalarType, value: &RawValue) -> Option<Self> {
        match value {
            RawValue::Fixed64(v) => Some(f64::from_bits(*v)),
            _ => None,
        }
    }

    fn encode(&self, _: ScalarType, buf: &mut BytesMut) {
        buf.put_f64_le(*self);
    }
}

impl Scalar for bool {
    fn accepts(scalar: ScalarType) -> bool {
        scalar == ScalarType::Bool
    }

    fn decode(_: ScalarType, value: &RawValue) -> Option<Self> {
        match value {
            RawValue::Varint(v) => Some(*v != 0),
            _ => None,
        }
    }

    fn encode(&self, _: ScalarType, buf: &mut BytesMut) {
        encode_varint(*self as u64, buf);
    }
}

impl Scalar for String {
    fn accepts(scalar: ScalarType) -> bool {
        scalar == ScalarType::String
    }

    fn decode(_: ScalarType, value: &RawValue) -> Option<Self> {
        match value {
            RawValue::Len(data) => String::from_utf8(data.to_vec()).ok(),
            _ => None,
        }
    }

    fn encode(&self, _: ScalarType, buf: &mut BytesMut) {
        put_len(self.as_bytes(), buf);
    }
}

impl Scalar for Bytes {
    fn accepts(scalar: ScalarType) -> bool {
        scalar == ScalarType::Bytes
    }

    fn decode(_: ScalarType, value: &RawValue) -> Option<Self> {
        match value {
            RawValue::Len(data) => Some(data.clone()),
            _ => None,
        }
    }

    fn encode(&self, _: ScalarType, buf: &mut BytesMut) {
        put_len(self, buf);
    }
}

impl Scalar for Vec<u8> {
    fn accepts(scalar: ScalarType) -> bool {
        scalar == ScalarType::Bytes
    }

    fn decode(_: ScalarType, value: &RawValue) -> Option<Self> {
        match value {
            RawValue::Len(data) => Some(data.to_vec()),
            _ => None,
        }
    }

    fn encode(&self, _: ScalarType, buf: &mut BytesMut) {
        put_len(self, buf);
    }
}
