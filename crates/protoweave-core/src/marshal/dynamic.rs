//! Schema-driven adapter for messages without a dedicated Rust type.

use super::scalar::Scalar;
use super::wire::RawValue;
use super::{FieldReader, FieldWriter, MessageAdapter, UnknownFieldSet, UnknownFieldSetHandler};
use crate::error::{Error, Result};
use crate::metadata::{FieldDescriptor, FieldKind, ScalarType};
use bytes::{Bytes, BytesMut};
use std::collections::BTreeMap;

/// A field value of a [`DynamicMessage`]
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// `int32`, `sint32` or `sfixed32`
    I32(i32),
    /// `int64`, `sint64` or `sfixed64`
    I64(i64),
    /// `uint32` or `fixed32`
    U32(u32),
    /// `uint64` or `fixed64`
    U64(u64),
    /// `float`
    F32(f32),
    /// `double`
    F64(f64),
    /// `bool`
    Bool(bool),
    /// `string`
    String(String),
    /// `bytes`
    Bytes(Bytes),
    /// Enum wire number
    Enum(i32),
    /// Nested message
    Message(DynamicMessage),
    /// Elements of a repeated field
    List(Vec<Value>),
}

impl Value {
    fn kind(&self) -> &'static str {
        match self {
            Value::I32(_) => "i32",
            Value::I64(_) => "i64",
            Value::U32(_) => "u32",
            Value::U64(_) => "u64",
            Value::F32(_) => "f32",
            Value::F64(_) => "f64",
            Value::Bool(_) => "bool",
            Value::String(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::Enum(_) => "enum",
            Value::Message(_) => "message",
            Value::List(_) => "list",
        }
    }
}

impl Scalar for Value {
    fn accepts(_: ScalarType) -> bool {
        true
    }

    fn fits(&self, scalar: ScalarType) -> bool {
        match self {
            Value::I32(_) => i32::accepts(scalar),
            Value::I64(_) => i64::accepts(scalar),
            Value::U32(_) => u32::accepts(scalar),
            Value::U64(_) => u64::accepts(scalar),
            Value::F32(_) => f32::accepts(scalar),
            Value::F64(_) => f64::accepts(scalar),
            Value::Bool(_) => bool::accepts(scalar),
            Value::String(_) => String::accepts(scalar),
            Value::Bytes(_) => Bytes::accepts(scalar),
            Value::Enum(_) | Value::Message(_) | Value::List(_) => false,
        }
    }

    fn decode(scalar: ScalarType, value: &RawValue) -> Option<Self> {
        match scalar {
            ScalarType::Int32 | ScalarType::Sint32 | ScalarType::Sfixed32 => {
                i32::decode(scalar, value).map(Value::I32)
            }
            ScalarType::Int64 | ScalarType::Sint64 | ScalarType::Sfixed64 => {
                i64::decode(scalar, value).map(Value::I64)
            }
            ScalarType::Uint32 | ScalarType::Fixed32 => u32::decode(scalar, value).map(Value::U32),
            ScalarType::Uint64 | ScalarType::Fixed64 => u64::decode(scalar, value).map(Value::U64),
            ScalarType::Float => f32::decode(scalar, value).map(Value::F32),
            ScalarType::Double => f64::decode(scalar, value).map(Value::F64),
            ScalarType::Bool => bool::decode(scalar, value).map(Value::Bool),
            ScalarType::String => String::decode(scalar, value).map(Value::String),
            ScalarType::Bytes => Bytes::decode(scalar, value).map(Value::Bytes),
        }
    }

    fn encode(&self, scalar: ScalarType, buf: &mut BytesMut) {
        match self {
            Value::I32(v) => v.encode(scalar, buf),
            Value::I64(v) => v.encode(scalar, buf),
            Value::U32(v) => v.encode(scalar, buf),
            Value::U64(v) => v.encode(scalar, buf),
            Value::F32(v) => v.encode(scalar, buf),
            Value::F64(v) => v.encode(scalar, buf),
            Value::Bool(v) => v.encode(scalar, buf),
            Value::String(v) => v.encode(scalar, buf),
            Value::Bytes(v) => v.encode(scalar, buf),
            // Rejected by `fits` before encoding
            Value::Enum(_) | Value::Message(_) | Value::List(_) => {}
        }
    }
}

/// A message held as a map from field name to value
#[derive(Debug, Clone, PartialEq)]
pub struct DynamicMessage {
    type_name: String,
    fields: BTreeMap<String, Value>,
    unknown: UnknownFieldSet,
}

impl DynamicMessage {
    /// Creates an empty message of the given fully-qualified type
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            fields: BTreeMap::new(),
            unknown: UnknownFieldSet::new(),
        }
    }

    /// Builder-style [`set`](Self::set)
    pub fn with(mut self, field: impl Into<String>, value: Value) -> Self {
        self.set(field, value);
        self
    }

    /// Fully-qualified type name
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Returns a field value
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Sets a field value
    pub fn set(&mut self, field: impl Into<String>, value: Value) {
        self.fields.insert(field.into(), value);
    }

    /// Clears a field
    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.fields.remove(field)
    }

    /// Iterates set fields by name
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Unknown fields captured on read
    pub fn unknown_fields(&self) -> &UnknownFieldSet {
        &self.unknown
    }
}

/// Adapter for any message type known to the metadata provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DynamicAdapter {
    type_name: String,
}

impl DynamicAdapter {
    /// Creates an adapter for the given fully-qualified message type
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
        }
    }

    fn read_field(&self, reader: &mut FieldReader<'_>, field: &FieldDescriptor) -> Result<Option<Value>> {
        let name = field.name.as_str();
        if field.is_collection() {
            let mut items = Vec::new();
            match &field.kind {
                FieldKind::Scalar(_) => reader.read_scalars::<Value, _>(name, &mut items)?,
                FieldKind::Enum(_) => {
                    let mut numbers = Vec::new();
                    reader.read_enum_numbers(name, &mut numbers)?;
                    items.extend(numbers.into_iter().map(Value::Enum));
                }
                FieldKind::Message(type_name) => {
                    let mut messages = Vec::new();
                    reader.read_messages(name, &DynamicAdapter::new(type_name), &mut messages)?;
                    items.extend(messages.into_iter().map(Value::Message));
                }
            }
            return Ok((!items.is_empty()).then_some(Value::List(items)));
        }

        Ok(match &field.kind {
            FieldKind::Scalar(_) => reader.read_scalar::<Value>(name)?,
            FieldKind::Enum(_) => reader.read_enum_number(name)?.map(Value::Enum),
            FieldKind::Message(type_name) => reader
                .read_message(name, &DynamicAdapter::new(type_name))?
                .map(Value::Message),
        })
    }

    fn write_field(
        &self,
        writer: &mut FieldWriter<'_>,
        field: &FieldDescriptor,
        value: Option<&Value>,
    ) -> Result<()> {
        let name = field.name.as_str();
        let mismatch = |value: &Value| {
            Error::wire_type_mismatch(&self.type_name, name, &field.kind, value.kind())
        };

        if field.is_collection() {
            let items = match value {
                None => &[][..],
                Some(Value::List(items)) => items.as_slice(),
                Some(other) => return Err(mismatch(other)),
            };
            return match &field.kind {
                FieldKind::Scalar(_) => writer.write_scalars(name, items),
                FieldKind::Enum(_) => {
                    let numbers = items
                        .iter()
                        .map(|item| match item {
                            Value::Enum(n) => Ok(*n),
                            other => Err(mismatch(other)),
                        })
                        .collect::<Result<Vec<_>>>()?;
                    writer.write_enum_numbers(name, numbers)
                }
                FieldKind::Message(type_name) => {
                    let messages = items
                        .iter()
                        .map(|item| match item {
                            Value::Message(m) => Ok(m),
                            other => Err(mismatch(other)),
                        })
                        .collect::<Result<Vec<_>>>()?;
                    writer.write_messages(name, &DynamicAdapter::new(type_name), messages)
                }
            };
        }

        match (&field.kind, value) {
            (FieldKind::Scalar(_), value) => writer.write_scalar(name, value),
            (FieldKind::Enum(_), None) => writer.write_enum_number(name, None),
            (FieldKind::Enum(_), Some(Value::Enum(n))) => writer.write_enum_number(name, Some(*n)),
            (FieldKind::Message(type_name), None) => {
                writer.write_message::<DynamicMessage, _>(name, &DynamicAdapter::new(type_name), None)
            }
            (FieldKind::Message(type_name), Some(Value::Message(m))) => {
                writer.write_message(name, &DynamicAdapter::new(type_name), Some(m))
            }
            (_, Some(other)) => Err(mismatch(other)),
        }
    }
}

impl MessageAdapter<DynamicMessage> for DynamicAdapter {
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn read_from(&self, reader: &mut FieldReader<'_>) -> Result<DynamicMessage> {
        let mut message = DynamicMessage::new(&self.type_name);
        for field in &reader.descriptor().fields {
            if let Some(value) = self.read_field(reader, field)? {
                message.set(&field.name, value);
            }
        }
        Ok(message)
    }

    fn write_to(&self, writer: &mut FieldWriter<'_>, message: &DynamicMessage) -> Result<()> {
        if message.type_name != self.type_name {
            return Err(Error::AdapterMismatch {
                adapter: self.type_name.clone(),
                expected: message.type_name.clone(),
            });
        }
        let descriptor = writer.descriptor();
        if let Some(name) = message.fields.keys().find(|k| descriptor.find_field(k).is_none()) {
            return Err(Error::unknown_schema_field(&self.type_name, name));
        }
        // Declaration order, so equal messages always encode identically
        for field in &descriptor.fields {
            self.write_field(writer, field, message.get(&field.name))?;
        }
        Ok(())
    }

    fn unknown_field_handler(&self) -> Option<&dyn UnknownFieldSetHandler<DynamicMessage>> {
        Some(self)
    }
}

impl UnknownFieldSetHandler<DynamicMessage> for DynamicAdapter {
    fn unknown_fields<'v>(&self, message: &'v DynamicMessage) -> Option<&'v UnknownFieldSet> {
        Some(&message.unknown)
    }

    fn set_unknown_fields(&self, message: &mut DynamicMessage, unknown: UnknownFieldSet) {
        message.unknown = unknown;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marshal::{from_bytes, to_bytes};
    use crate::metadata::{TypeDescriptor, TypeUniverse};
    use pretty_assertions::assert_eq;

    fn account_v1() -> TypeDescriptor {
        let scalar = |name: &str, number, ty| FieldDescriptor::new(name, number, FieldKind::Scalar(ty));
        TypeDescriptor::message("sample_bank_account", "Account")
            .field(scalar("id", 1, ScalarType::Int32).required())
            .field(scalar("description", 2, ScalarType::String))
            .field(FieldDescriptor::new(
                "currency",
                3,
                FieldKind::Enum("sample_bank_account.Currency".into()),
            ))
            .field(
                FieldDescriptor::new("limits", 4, FieldKind::Message("sample_bank_account.Limits".into()))
                    .repeated(),
            )
    }

    fn universe(account: TypeDescriptor, currencies: &[(&str, i32)]) -> TypeUniverse {
        let currency = currencies.iter().fold(
            TypeDescriptor::enumeration("sample_bank_account", "Currency"),
            |t, (name, number)| t.value(*name, *number),
        );
        TypeUniverse::new()
            .with(account)
            .and_then(|u| u.with(currency))
            .and_then(|u| {
                u.with(
                    TypeDescriptor::message("sample_bank_account", "Limits")
                        .field(FieldDescriptor::new("maxDailyLimit", 1, FieldKind::Scalar(ScalarType::Double)))
                        .field(
                            FieldDescriptor::new("tags", 2, FieldKind::Scalar(ScalarType::Sint64)).repeated(),
                        ),
                )
            })
            .unwrap()
    }

    fn v1() -> TypeUniverse {
        universe(account_v1(), &[("EUR", 0), ("USD", 1)])
    }

    fn v2() -> TypeUniverse {
        let account = account_v1()
            .field(FieldDescriptor::new("creationDate", 5, FieldKind::Scalar(ScalarType::Fixed64)))
            .field(FieldDescriptor::new("flags", 6, FieldKind::Scalar(ScalarType::Bool)).repeated());
        universe(account, &[("EUR", 0), ("USD", 1), ("BRL", 2)])
    }

    fn limits(max: f64, tags: &[i64]) -> Value {
        let mut limits =
            DynamicMessage::new("sample_bank_account.Limits").with("maxDailyLimit", Value::F64(max));
        // Empty repeated fields read back as unset
        if !tags.is_empty() {
            limits.set("tags", Value::List(tags.iter().map(|t| Value::I64(*t)).collect()));
        }
        Value::Message(limits)
    }

    fn account(currency: i32) -> DynamicMessage {
        DynamicMessage::new("sample_bank_account.Account")
            .with("id", Value::I32(7))
            .with("description", Value::String("checking".into()))
            .with("currency", Value::Enum(currency))
            .with("limits", Value::List(vec![limits(1.5, &[-1, 2]), limits(9.0, &[])]))
    }

    #[test]
    fn test_round_trip() {
        let universe = v1();
        let adapter = DynamicAdapter::new("sample_bank_account.Account");
        let message = account(1);

        let bytes = to_bytes(&universe, &adapter, &message).unwrap();
        let decoded: DynamicMessage = from_bytes(&universe, &adapter, bytes.clone()).unwrap();
        assert_eq!(decoded, message);
        assert_eq!(to_bytes(&universe, &adapter, &decoded).unwrap(), bytes);
    }

    #[test]
    fn test_newer_fields_survive_older_schema() {
        let adapter = DynamicAdapter::new("sample_bank_account.Account");
        let message = account(2)
            .with("creationDate", Value::U64(1_700_000_000))
            .with("flags", Value::List(vec![Value::Bool(true), Value::Bool(false)]));

        let written_by_v2 = to_bytes(&v2(), &adapter, &message).unwrap();

        let seen_by_v1: DynamicMessage = from_bytes(&v1(), &adapter, written_by_v2.clone()).unwrap();
        assert!(seen_by_v1.get("creationDate").is_none());
        // BRL is not a v1 currency
        assert!(seen_by_v1.get("currency").is_none());
        assert_eq!(seen_by_v1.unknown_fields().len(), 4);

        let written_by_v1 = to_bytes(&v1(), &adapter, &seen_by_v1).unwrap();
        let back_in_v2: DynamicMessage = from_bytes(&v2(), &adapter, written_by_v1).unwrap();
        assert_eq!(back_in_v2, message);
    }

    #[test]
    fn test_value_shape_is_checked_on_write() {
        let universe = v1();
        let adapter = DynamicAdapter::new("sample_bank_account.Account");

        let bad = account(0).with("description", Value::I32(3));
        assert!(matches!(
            to_bytes(&universe, &adapter, &bad),
            Err(Error::WireTypeMismatch { ref field, .. }) if field == "description"
        ));

        let extra = account(0).with("nickname", Value::String("x".into()));
        assert!(matches!(
            to_bytes(&universe, &adapter, &extra),
            Err(Error::UnknownSchemaField { .. })
        ));

        let other = DynamicMessage::new("sample_bank_account.Limits");
        assert!(matches!(
            to_bytes(&universe, &adapter, &other),
            Err(Error::AdapterMismatch { .. })
        ));
    }

    #[test]
    fn test_required_field() {
        let universe = v1();
        let adapter = DynamicAdapter::new("sample_bank_account.Account");
        let mut message = account(0);
        message.remove("id");

        assert!(matches!(
            to_bytes(&universe, &adapter, &message),
            Err(Error::MissingRequiredField { ref field, .. }) if field == "id"
        ));
    }
}
