use super::scalar::Scalar;
use super::unknown::UnknownFieldSet;
use super::wire::{encode_key, encode_varint, WireType};
use super::{encode_message, MessageAdapter, ProtoEnum};
use crate::error::{Error, Result};
use crate::metadata::{FieldDescriptor, FieldKind, TypeDescriptor, TypeMetadataProvider};
use bytes::{BufMut, Bytes, BytesMut};
use std::collections::HashSet;

/// Field-oriented encoder for one message.
///
/// Fields are emitted in the order the adapter writes them. Repeated fields
/// are written unpacked. `None` for an optional field writes nothing; `None`
/// for a required field is a [`Error::MissingRequiredField`].
pub struct FieldWriter<'a> {
    provider: &'a dyn TypeMetadataProvider,
    descriptor: &'a TypeDescriptor,
    buf: BytesMut,
    written: HashSet<u32>,
}

impl<'a> FieldWriter<'a> {
    pub(crate) fn new(provider: &'a dyn TypeMetadataProvider, descriptor: &'a TypeDescriptor) -> Self {
        Self {
            provider,
            descriptor,
            buf: BytesMut::new(),
            written: HashSet::new(),
        }
    }

    /// Descriptor of the message being written
    pub fn descriptor(&self) -> &'a TypeDescriptor {
        self.descriptor
    }

    /// Metadata provider used for nested types
    pub fn provider(&self) -> &'a dyn TypeMetadataProvider {
        self.provider
    }

    /// Writes a singular scalar field
    pub fn write_scalar<T: Scalar>(&mut self, name: &str, value: Option<&T>) -> Result<()> {
        let field = self.field(name, false)?;
        let Some(value) = value else {
            return self.absent(field);
        };
        self.put_scalar(field, value)
    }

    /// Writes every element of a repeated scalar field, in iteration order
    pub fn write_scalars<'v, T, I>(&mut self, name: &str, values: I) -> Result<()>
    where
        T: Scalar + 'v,
        I: IntoIterator<Item = &'v T>,
    {
        let field = self.field(name, true)?;
        for value in values {
            self.put_scalar(field, value)?;
        }
        Ok(())
    }

    /// Writes a singular typed enum field
    pub fn write_enum<E: ProtoEnum>(&mut self, name: &str, value: Option<&E>) -> Result<()> {
        self.write_enum_number(name, value.map(ProtoEnum::number))
    }

    /// Writes a repeated typed enum field
    pub fn write_enums<'v, E, I>(&mut self, name: &str, values: I) -> Result<()>
    where
        E: ProtoEnum + 'v,
        I: IntoIterator<Item = &'v E>,
    {
        self.write_enum_numbers(name, values.into_iter().map(ProtoEnum::number))
    }

    /// Writes a singular enum field from its wire number
    pub fn write_enum_number(&mut self, name: &str, value: Option<i32>) -> Result<()> {
        let field = self.field(name, false)?;
        self.check_enum(field)?;
        let Some(number) = value else {
            return self.absent(field);
        };
        self.put_enum(field, number);
        Ok(())
    }

    /// Writes a repeated enum field from wire numbers
    pub fn write_enum_numbers<I>(&mut self, name: &str, values: I) -> Result<()>
    where
        I: IntoIterator<Item = i32>,
    {
        let field = self.field(name, true)?;
        self.check_enum(field)?;
        for number in values {
            self.put_enum(field, number);
        }
        Ok(())
    }

    /// Writes a singular message field through its adapter
    pub fn write_message<T, A>(&mut self, name: &str, adapter: &A, value: Option<&T>) -> Result<()>
    where
        A: MessageAdapter<T> + ?Sized,
    {
        let field = self.field(name, false)?;
        self.check_adapter(field, adapter.type_name())?;
        let Some(value) = value else {
            return self.absent(field);
        };
        self.put_message(field, adapter, value)
    }

    /// Writes every element of a repeated message field, in iteration order
    pub fn write_messages<'v, T, A, I>(&mut self, name: &str, adapter: &A, values: I) -> Result<()>
    where
        T: 'v,
        A: MessageAdapter<T> + ?Sized,
        I: IntoIterator<Item = &'v T>,
    {
        let field = self.field(name, true)?;
        self.check_adapter(field, adapter.type_name())?;
        for value in values {
            self.put_message(field, adapter, value)?;
        }
        Ok(())
    }

    /// Appends preserved unknown fields verbatim
    pub(crate) fn write_unknown(&mut self, unknown: &UnknownFieldSet) {
        unknown.encode(&mut self.buf);
    }

    /// Checks that every required field was written and returns the encoding
    pub(crate) fn finish(self) -> Result<Bytes> {
        if let Some(missing) = self
            .descriptor
            .fields
            .iter()
            .find(|f| f.required && !self.written.contains(&f.number))
        {
            return Err(Error::missing_required(
                self.descriptor.full_name(),
                &missing.name,
            ));
        }
        Ok(self.buf.freeze())
    }

    fn field(&self, name: &str, collection: bool) -> Result<&'a FieldDescriptor> {
        let descriptor = self.descriptor;
        let field = descriptor
            .find_field(name)
            .ok_or_else(|| Error::unknown_schema_field(descriptor.full_name(), name))?;
        if field.is_collection() != collection {
            let shape = |c: bool| if c { "repeated field" } else { "singular field" };
            return Err(Error::wire_type_mismatch(
                descriptor.full_name(),
                name,
                shape(field.is_collection()),
                shape(collection),
            ));
        }
        Ok(field)
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

    fn put_scalar<T: Scalar>(&mut self, field: &FieldDescriptor, value: &T) -> Result<()> {
        let scalar = match field.kind {
            FieldKind::Scalar(scalar) if value.fits(scalar) => scalar,
            ref kind => {
                return Err(Error::wire_type_mismatch(
                    self.descriptor.full_name(),
                    &field.name,
                    kind,
                    std::any::type_name::<T>(),
                ))
            }
        };
        encode_key(field.number, WireType::for_scalar(scalar), &mut self.buf);
        value.encode(scalar, &mut self.buf);
        self.written.insert(field.number);
        Ok(())
    }

    fn put_enum(&mut self, field: &FieldDescriptor, number: i32) {
        encode_key(field.number, WireType::Varint, &mut self.buf);
        encode_varint(number as i64 as u64, &mut self.buf);
        self.written.insert(field.number);
    }

    fn put_message<T, A>(&mut self, field: &FieldDescriptor, adapter: &A, value: &T) -> Result<()>
    where
        A: MessageAdapter<T> + ?Sized,
    {
        let data = encode_message(self.provider, adapter, value)?;
        encode_key(field.number, WireType::Len, &mut self.buf);
        encode_varint(data.len() as u64, &mut self.buf);
        self.buf.put_slice(&data);
        self.written.insert(field.number);
        Ok(())
    }

    fn absent(&self, field: &FieldDescriptor) -> Result<()> {
        if field.required {
            Err(Error::missing_required(self.descriptor.full_name(), &field.name))
        } else {
            Ok(())
        }
    }
}
