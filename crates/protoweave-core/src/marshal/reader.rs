use super::scalar::Scalar;
use super::unknown::UnknownFieldSet;
use super::wire::{unpack, RawField, RawValue, WireType};
use super::{decode_message, MessageAdapter, ProtoEnum};
use crate::error::{Error, Result};
use crate::metadata::{FieldDescriptor, FieldKind, ScalarType, TypeDescriptor, TypeMetadataProvider};
use bytes::Bytes;
use std::collections::{BTreeSet, HashSet, VecDeque};
use std::hash::{BuildHasher, Hash};

/// Caller-supplied container for the values of a repeated field.
///
/// Each container accepts a single element type, so the element type of a
/// `read_*s` call is inferred from the container alone. `Extend` cannot do
/// that for `Copy` elements, since `Vec<i32>` extends from both `i32` and
/// `&i32`.
pub trait Repeated<T> {
    /// Appends one decoded value
    fn add(&mut self, value: T);
}

impl<T> Repeated<T> for Vec<T> {
    fn add(&mut self, value: T) {
        self.push(value);
    }
}

impl<T> Repeated<T> for VecDeque<T> {
    fn add(&mut self, value: T) {
        self.push_back(value);
    }
}

impl<T: Ord> Repeated<T> for BTreeSet<T> {
    fn add(&mut self, value: T) {
        self.insert(value);
    }
}

impl<T: Eq + Hash, S: BuildHasher> Repeated<T> for HashSet<T, S> {
    fn add(&mut self, value: T) {
        self.insert(value);
    }
}

/// Field-oriented view over one encoded message.
///
/// The wire data is split into field occurrences once; adapters then ask for
/// fields by schema name in any order. For singular fields the last
/// occurrence wins. Occurrences nobody asked for, and enum values that are not
/// in the enum's symbol table, end up in the [`UnknownFieldSet`] returned by
/// [`finish`](Self::finish).
pub struct FieldReader<'a> {
    provider: &'a dyn TypeMetadataProvider,
    descriptor: &'a TypeDescriptor,
    fields: Vec<RawField>,
    consumed: Vec<bool>,
    // (index of the occurrence the value came from, deferred value)
    deferred: Vec<(usize, RawField)>,
}

impl<'a> FieldReader<'a> {
    pub(crate) fn new(
        provider: &'a dyn TypeMetadataProvider,
        descriptor: &'a TypeDescriptor,
        fields: Vec<RawField>,
    ) -> Self {
        let consumed = vec![false; fields.len()];
        Self {
            provider,
            descriptor,
            fields,
            consumed,
            deferred: Vec::new(),
        }
    }

    /// Descriptor of the message being read
    pub fn descriptor(&self) -> &'a TypeDescriptor {
        self.descriptor
    }

    /// Metadata provider used for nested types
    pub fn provider(&self) -> &'a dyn TypeMetadataProvider {
        self.provider
    }

    /// Reads a singular scalar field
    pub fn read_scalar<T: Scalar>(&mut self, name: &str) -> Result<Option<T>> {
        let field = self.field(name, false)?;
        let scalar = self.scalar_kind::<T>(field)?;

        let Some(index) = self.take_last(field.number) else {
            return self.absent(field);
        };
        let raw = &self.fields[index];
        if raw.wire_type != WireType::for_scalar(scalar) {
            return Err(self.mismatch(field, WireType::for_scalar(scalar), raw.wire_type));
        }
        self.decode_scalar(field, scalar, &raw.value()?).map(Some)
    }

    /// Reads a repeated scalar field into `into`, in encounter order.
    ///
    /// Both packed and unpacked encodings are accepted, even mixed.
    pub fn read_scalars<T: Scalar, C: Repeated<T>>(&mut self, name: &str, into: &mut C) -> Result<()> {
        let field = self.field(name, true)?;
        let scalar = self.scalar_kind::<T>(field)?;
        let expected = WireType::for_scalar(scalar);

        for index in self.take_all(field.number) {
            let raw = &self.fields[index];
            if raw.wire_type == expected {
                into.add(self.decode_scalar(field, scalar, &raw.value()?)?);
            } else if raw.wire_type == WireType::Len && scalar.is_packable() {
                let RawValue::Len(data) = raw.value()? else {
                    return Err(Error::internal("LEN field decoded to a non-LEN value"));
                };
                for value in unpack(scalar, &data)? {
                    into.add(self.decode_scalar(field, scalar, &value)?);
                }
            } else {
                return Err(self.mismatch(field, expected, raw.wire_type));
            }
        }
        Ok(())
    }

    /// Reads a singular enum field as a typed enum.
    ///
    /// Numbers that `E` does not know are deferred into the unknown field set
    /// and read as `None`.
    pub fn read_enum<E: ProtoEnum>(&mut self, name: &str) -> Result<Option<E>> {
        self.read_enum_with(name, E::from_number)
    }

    /// Reads a repeated enum field as typed enums
    pub fn read_enums<E: ProtoEnum, C: Repeated<E>>(&mut self, name: &str, into: &mut C) -> Result<()> {
        self.read_enums_with(name, into, E::from_number)
    }

    /// Reads a singular enum field as a number checked against the enum's
    /// declared symbols
    pub fn read_enum_number(&mut self, name: &str) -> Result<Option<i32>> {
        let symbols = self.symbols(name)?;
        self.read_enum_with(name, |n| symbols.find_value(n).map(|v| v.number))
    }

    /// Reads a repeated enum field as checked numbers
    pub fn read_enum_numbers<C: Repeated<i32>>(&mut self, name: &str, into: &mut C) -> Result<()> {
        let symbols = self.symbols(name)?;
        self.read_enums_with(name, into, |n| symbols.find_value(n).map(|v| v.number))
    }

    /// Reads a singular message field through its adapter
    pub fn read_message<T, A>(&mut self, name: &str, adapter: &A) -> Result<Option<T>>
    where
        A: MessageAdapter<T> + ?Sized,
    {
        let field = self.field(name, false)?;
        self.check_adapter(field, adapter.type_name())?;

        let Some(index) = self.take_last(field.number) else {
            return self.absent(field);
        };
        let data = self.message_bytes(field, index)?;
        decode_message(self.provider, adapter, data).map(Some)
    }

    /// Reads a repeated message field into `into`, in encounter order
    pub fn read_messages<T, A, C>(&mut self, name: &str, adapter: &A, into: &mut C) -> Result<()>
    where
        A: MessageAdapter<T> + ?Sized,
        C: Repeated<T>,
    {
        let field = self.field(name, true)?;
        self.check_adapter(field, adapter.type_name())?;

        for index in self.take_all(field.number) {
            let data = self.message_bytes(field, index)?;
            into.add(decode_message(self.provider, adapter, data)?);
        }
        Ok(())
    }

    /// Returns every unread occurrence and every deferred enum value, in wire
    /// order
    pub fn finish(self) -> UnknownFieldSet {
        let mut deferred = self.deferred;
        deferred.sort_by_key(|(at, _)| *at);
        let mut deferred = deferred.into_iter().peekable();
        let mut unknown = UnknownFieldSet::new();

        for (index, (field, consumed)) in self.fields.into_iter().zip(self.consumed).enumerate() {
            if !consumed {
                unknown.push(field);
            }
            while let Some((_, value)) = deferred.next_if(|(at, _)| *at == index) {
                unknown.push(value);
            }
        }
        unknown
    }

    fn field(&self, name: &str, collection: bool) -> Result<&'a FieldDescriptor> {
        let descriptor = self.descriptor;
        let field = descriptor
            .find_field(name)
            .ok_or_else(|| Error::unknown_schema_field(descriptor.full_name(), name))?;
        if field.is_collection() != collection {
            return Err(Error::wire_type_mismatch(
                descriptor.full_name(),
                name,
                cardinality(field.is_collection()),
                cardinality(collection),
            ));
        }
        Ok(field)
    }

    fn scalar_kind<T: Scalar>(&self, field: &FieldDescriptor) -> Result<ScalarType> {
        match field.kind {
            FieldKind::Scalar(scalar) if T::accepts(scalar) => Ok(scalar),
            ref kind => Err(Error::wire_type_mismatch(
                self.descriptor.full_name(),
                &field.name,
                kind,
                std::any::type_name::<T>(),
            )),
        }
    }

    fn symbols(&self, name: &str) -> Result<&'a TypeDescriptor> {
        let field = self
            .descriptor
            .find_field(name)
            .ok_or_else(|| Error::unknown_schema_field(self.descriptor.full_name(), name))?;
        match &field.kind {
            FieldKind::Enum(type_name) => self.provider.require(type_name),
            kind => Err(Error::wire_type_mismatch(
                self.descriptor.full_name(),
                name,
                kind,
                "enum",
            )),
        }
    }

    fn check_enum(&self, field: &FieldDescriptor) -> Result<()> {
        match field.kind {
            FieldKind::Enum(_) => Ok(()),
            ref kind => Err(Error::wire_type_mismatch(
                self.descriptor.full_name(),
                &field.name,
                kind,
                "enum",
            )),
        }
    }

    fn check_adapter(&self, field: &FieldDescriptor, adapter: &str) -> Result<()> {
        match &field.kind {
            FieldKind::Message(type_name) if type_name == adapter => Ok(()),
            FieldKind::Message(type_name) => Err(Error::AdapterMismatch {
                adapter: adapter.to_string(),
                expected: type_name.clone(),
            }),
            kind => Err(Error::wire_type_mismatch(
                self.descriptor.full_name(),
                &field.name,
                kind,
                "message",
            )),
        }
    }

    fn read_enum_with<V>(&mut self, name: &str, decode: impl Fn(i32) -> Option<V>) -> Result<Option<V>> {
        let field = self.field(name, false)?;
        self.check_enum(field)?;

        let Some(index) = self.take_last(field.number) else {
            return self.absent(field);
        };
        let raw = &self.fields[index];
        let RawValue::Varint(number) = raw.value()? else {
            return Err(self.mismatch(field, WireType::Varint, raw.wire_type));
        };
        match decode(number as i32) {
            Some(value) => Ok(Some(value)),
            None => {
                // Keep the occurrence for the unknown field set
                self.consumed[index] = false;
                Ok(None)
            }
        }
    }

    fn read_enums_with<V, C: Repeated<V>>(
        &mut self,
        name: &str,
        into: &mut C,
        decode: impl Fn(i32) -> Option<V>,
    ) -> Result<()> {
        let field = self.field(name, true)?;
        self.check_enum(field)?;

        for index in self.take_all(field.number) {
            let raw = &self.fields[index];
            let numbers = match raw.value()? {
                RawValue::Varint(number) => vec![number],
                RawValue::Len(data) => unpack(ScalarType::Int32, &data)?
                    .into_iter()
                    .filter_map(|v| match v {
                        RawValue::Varint(n) => Some(n),
                        _ => None,
                    })
                    .collect(),
                _ => return Err(self.mismatch(field, WireType::Varint, raw.wire_type)),
            };

            for number in numbers {
                match decode(number as i32) {
                    Some(value) => into.add(value),
                    None => self
                        .deferred
                        .push((index, RawField::varint(field.number, number))),
                }
            }
        }
        Ok(())
    }

    fn message_bytes(&self, field: &FieldDescriptor, index: usize) -> Result<Bytes> {
        let raw = &self.fields[index];
        match raw.value()? {
            RawValue::Len(data) => Ok(data),
            _ => Err(self.mismatch(field, WireType::Len, raw.wire_type)),
        }
    }

    fn decode_scalar<T: Scalar>(
        &self,
        field: &FieldDescriptor,
        scalar: ScalarType,
        value: &RawValue,
    ) -> Result<T> {
        T::decode(scalar, value).ok_or_else(|| {
            Error::wire_type_mismatch(
                self.descriptor.full_name(),
                &field.name,
                scalar,
                "malformed value",
            )
        })
    }

    /// Marks every occurrence of `number` as consumed and returns the last one
    fn take_last(&mut self, number: u32) -> Option<usize> {
        self.take_all(number).pop()
    }

    /// Marks every occurrence of `number` as consumed, in wire order
    fn take_all(&mut self, number: u32) -> Vec<usize> {
        let indices: Vec<usize> = self
            .fields
            .iter()
            .enumerate()
            .filter(|(_, f)| f.number == number)
            .map(|(i, _)| i)
            .collect();
        for &i in &indices {
            self.consumed[i] = true;
        }
        indices
    }

    fn absent<T>(&self, field: &FieldDescriptor) -> Result<Option<T>> {
        if field.required {
            Err(Error::missing_required(self.descriptor.full_name(), &field.name))
        } else {
            Ok(None)
        }
    }

    fn mismatch(&self, field: &FieldDescriptor, expected: WireType, found: WireType) -> Error {
        Error::wire_type_mismatch(self.descriptor.full_name(), &field.name, expected, found)
    }
}

fn cardinality(collection: bool) -> &'static str {
    if collection {
        "repeated field"
    } else {
        "singular field"
    }
}
