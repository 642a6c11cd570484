//! Protobuf binary wire codec used by the marshalling runtime.
//!
//! Fields are split into [`RawField`]s that keep their value bytes exactly as
//! received, so unknown fields can be written back byte for byte. Scalars map
//! onto four wire types; groups are parsed far enough to be rejected.

use crate::error::{Error, Result};
use crate::metadata::ScalarType;
use crate::MAX_FIELD_NUMBER;
use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;
use std::ops::Range;

/// Protobuf wire types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WireType {
    /// Integers, bools and enums
    Varint = 0,
    /// fixed64, sfixed64, double
    I64 = 1,
    /// Strings, bytes, messages and packed scalars
    Len = 2,
    /// Group start, rejected
    StartGroup = 3,
    /// Group end, rejected
    EndGroup = 4,
    /// fixed32, sfixed32, float
    I32 = 5,
}

impl TryFrom<u8> for WireType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        const ALL: [WireType; 6] = [
            WireType::Varint,
            WireType::I64,
            WireType::Len,
            WireType::StartGroup,
            WireType::EndGroup,
            WireType::I32,
        ];
        ALL.get(usize::from(value))
            .copied()
            .ok_or_else(|| Error::invalid_wire_format(0, format!("wire type {} does not exist", value)))
    }
}

impl WireType {
    /// Returns the wire type a scalar is encoded with
    pub fn for_scalar(scalar: ScalarType) -> Self {
        match scalar {
            ScalarType::Int32
            | ScalarType::Int64
            | ScalarType::Uint32
            | ScalarType::Uint64
            | ScalarType::Sint32
            | ScalarType::Sint64
            | ScalarType::Bool => WireType::Varint,
            ScalarType::Fixed64 | ScalarType::Sfixed64 | ScalarType::Double => WireType::I64,
            ScalarType::Fixed32 | ScalarType::Sfixed32 | ScalarType::Float => WireType::I32,
            ScalarType::String | ScalarType::Bytes => WireType::Len,
        }
    }
}

impl fmt::Display for WireType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WireType::Varint => "VARINT",
            WireType::I64 => "I64",
            WireType::Len => "LEN",
            WireType::StartGroup => "SGROUP",
            WireType::EndGroup => "EGROUP",
            WireType::I32 => "I32",
        };
        f.write_str(name)
    }
}

/// Longest valid varint encoding of a `u64`
const MAX_VARINT_LEN: usize = 10;

/// Decodes a varint, returning the value and its encoded length
pub fn decode_varint(data: &[u8]) -> Result<(u64, usize)> {
    let mut value = 0u64;
    for (index, byte) in data.iter().take(MAX_VARINT_LEN).enumerate() {
        value |= u64::from(byte & 0x7F) << (7 * index);
        if byte & 0x80 == 0 {
            return Ok((value, index + 1));
        }
    }
    Err(Error::varint_decode(data.len().min(MAX_VARINT_LEN)))
}

/// Encode a varint
pub fn encode_varint(mut value: u64, buf: &mut BytesMut) {
    while value >= 0x80 {
        buf.put_u8((value as u8 & 0x7F) | 0x80);
        value >>= 7;
    }
    buf.put_u8(value as u8);
}

/// Encode a field tag
pub fn encode_key(number: u32, wire_type: WireType, buf: &mut BytesMut) {
    encode_varint(((number as u64) << 3) | wire_type as u64, buf);
}

/// Zigzag-encode a signed 32-bit value
pub fn zigzag_encode_32(value: i32) -> u64 {
    ((value << 1) ^ (value >> 31)) as u32 as u64
}

/// Zigzag-decode a signed 32-bit value
pub fn zigzag_decode_32(value: u64) -> i32 {
    let value = value as u32;
    ((value >> 1) as i32) ^ -((value & 1) as i32)
}

/// Zigzag-encode a signed 64-bit value
pub fn zigzag_encode_64(value: i64) -> u64 {
    ((value << 1) ^ (value >> 63)) as u64
}

/// Zigzag-decode a signed 64-bit value
pub fn zigzag_decode_64(value: u64) -> i64 {
    ((value >> 1) as i64) ^ -((value & 1) as i64)
}

/// A decoded field value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawValue {
    /// Wire type 0
    Varint(u64),
    /// Wire type 1
    Fixed64(u64),
    /// Wire type 2, without the length prefix
    Len(Bytes),
    /// Wire type 5
    Fixed32(u32),
}

impl RawValue {
    /// Returns the wire type of the value
    pub fn wire_type(&self) -> WireType {
        match self {
            RawValue::Varint(_) => WireType::Varint,
            RawValue::Fixed64(_) => WireType::I64,
            RawValue::Len(_) => WireType::Len,
            RawValue::Fixed32(_) => WireType::I32,
        }
    }

    /// Encodes the value without its tag
    pub fn encode(&self, buf: &mut BytesMut) {
        match self {
            RawValue::Varint(v) => encode_varint(*v, buf),
            RawValue::Fixed64(v) => buf.put_u64_le(*v),
            RawValue::Len(data) => {
                encode_varint(data.len() as u64, buf);
                buf.put_slice(data);
            }
            RawValue::Fixed32(v) => buf.put_u32_le(*v),
        }
    }
}

/// One field occurrence as it appears on the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawField {
    /// Field number
    pub number: u32,
    /// Wire type from the tag
    pub wire_type: WireType,
    /// Value bytes exactly as received, without the tag
    pub raw: Bytes,
}

impl RawField {
    /// Creates a varint occurrence
    pub fn varint(number: u32, value: u64) -> Self {
        let mut raw = BytesMut::new();
        encode_varint(value, &mut raw);
        Self {
            number,
            wire_type: WireType::Varint,
            raw: raw.freeze(),
        }
    }

    /// Decodes the value bytes
    pub fn value(&self) -> Result<RawValue> {
        Ok(match self.wire_type {
            WireType::Varint => RawValue::Varint(decode_varint(&self.raw)?.0),
            WireType::I64 => RawValue::Fixed64(u64::from_le_bytes(fixed::<8>(&self.raw)?)),
            WireType::I32 => RawValue::Fixed32(u32::from_le_bytes(fixed::<4>(&self.raw)?)),
            WireType::Len => {
                let (length, prefix) = decode_varint(&self.raw)?;
                let end = usize::try_from(length)
                    .ok()
                    .and_then(|length| prefix.checked_add(length))
                    .filter(|&end| end <= self.raw.len())
                    .ok_or_else(|| {
                        Error::invalid_wire_format(
                            prefix,
                            format!(
                                "length {} exceeds {} available bytes",
                                length,
                                self.raw.len() - prefix
                            ),
                        )
                    })?;
                RawValue::Len(self.raw.slice(prefix..end))
            }
            WireType::StartGroup | WireType::EndGroup => {
                return Err(Error::invalid_wire_format(0, "groups are not supported"))
            }
        })
    }

    /// Re-encodes the field verbatim, tag included
    pub fn encode(&self, buf: &mut BytesMut) {
        encode_key(self.number, self.wire_type, buf);
        buf.put_slice(&self.raw);
    }
}

fn fixed<const N: usize>(data: &[u8]) -> Result<[u8; N]> {
    data.get(..N)
        .and_then(|slice| slice.try_into().ok())
        .ok_or_else(|| Error::invalid_wire_format(0, format!("expected {} bytes", N)))
}

/// Walks a message body, tracking the offset of everything it reads
struct Cursor<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    fn is_empty(&self) -> bool {
        self.position >= self.data.len()
    }

    fn varint(&mut self) -> Result<u64> {
        let (value, len) = decode_varint(&self.data[self.position..])
            .map_err(|_| Error::varint_decode(self.position))?;
        self.position += len;
        Ok(value)
    }

    fn take(&mut self, len: usize, what: &str) -> Result<&'a [u8]> {
        let available = self.data.len() - self.position;
        if available < len {
            return Err(Error::invalid_wire_format(
                self.position,
                format!("truncated {}: need {} bytes, have {}", what, len, available),
            ));
        }
        let data: &'a [u8] = self.data;
        let slice = &data[self.position..self.position + len];
        self.position += len;
        Ok(slice)
    }

    /// Reads one tagged field, returning its number, wire type and the range
    /// of its value bytes
    fn field(&mut self) -> Result<(u32, WireType, Range<usize>)> {
        let start = self.position;
        let tag = self.varint()?;
        let wire_type = WireType::try_from((tag & 0x07) as u8)
            .map_err(|_| Error::invalid_wire_format(start, format!("unknown wire type in tag {:#x}", tag)))?;

        let number = tag >> 3;
        if number == 0 || number > u64::from(MAX_FIELD_NUMBER) {
            return Err(Error::InvalidFieldNumber {
                number: number.min(u64::from(u32::MAX)) as u32,
                max: MAX_FIELD_NUMBER,
            });
        }
        let number = number as u32;

        let value_start = self.position;
        match wire_type {
            WireType::Varint => {
                self.varint()?;
            }
            WireType::I64 => {
                self.take(8, "I64 value")?;
            }
            WireType::I32 => {
                self.take(4, "I32 value")?;
            }
            WireType::Len => {
                let len = self.varint()?;
                let len = usize::try_from(len)
                    .map_err(|_| Error::invalid_wire_format(value_start, "length prefix overflows"))?;
                self.take(len, "LEN value")?;
            }
            WireType::StartGroup | WireType::EndGroup => {
                return Err(Error::invalid_wire_format(
                    start,
                    format!("field {} uses groups, which are not supported", number),
                ));
            }
        }

        Ok((number, wire_type, value_start..self.position))
    }
}

/// Splits a message body into its field occurrences, in wire order
pub fn parse_fields(data: &Bytes) -> Result<Vec<RawField>> {
    let mut cursor = Cursor::new(data);
    let mut fields = Vec::new();

    while !cursor.is_empty() {
        let (number, wire_type, range) = cursor.field()?;
        fields.push(RawField {
            number,
            wire_type,
            raw: data.slice(range),
        });
    }

    Ok(fields)
}

/// Splits a packed repeated payload into individual values
pub fn unpack(scalar: ScalarType, data: &[u8]) -> Result<Vec<RawValue>> {
    let wire_type = WireType::for_scalar(scalar);
    if !matches!(wire_type, WireType::Varint | WireType::I64 | WireType::I32) {
        return Err(Error::invalid_wire_format(
            0,
            format!("{} values cannot be packed", scalar),
        ));
    }

    let mut cursor = Cursor::new(data);
    let mut values = Vec::new();
    while !cursor.is_empty() {
        values.push(match wire_type {
            WireType::Varint => RawValue::Varint(cursor.varint()?),
            WireType::I64 => RawValue::Fixed64(u64::from_le_bytes(fixed::<8>(cursor.take(8, "packed I64")?)?)),
            _ => RawValue::Fixed32(u32::from_le_bytes(fixed::<4>(cursor.take(4, "packed I32")?)?)),
        });
    }

    Ok(values)
}
