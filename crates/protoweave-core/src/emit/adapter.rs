//! Adapter plans for discovered message types.

use crate::marshal::DynamicAdapter;
use crate::metadata::{FieldDescriptor, FieldKind, ScalarType, TypeDescriptor};
use serde::Serialize;

/// Which reader/writer pair an adapter uses for a field
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", content = "type", rename_all = "snake_case")]
pub enum FieldOperation {
    /// `read_scalar` / `write_scalar`
    Scalar(ScalarType),
    /// `read_scalars` / `write_scalars`
    Scalars(ScalarType),
    /// `read_enum` / `write_enum`
    Enum(String),
    /// `read_enums` / `write_enums`
    Enums(String),
    /// `read_message` / `write_message`
    Message(String),
    /// `read_messages` / `write_messages`
    Messages(String),
}

impl FieldOperation {
    fn for_field(field: &FieldDescriptor) -> Self {
        match (&field.kind, field.is_collection()) {
            (FieldKind::Scalar(s), false) => FieldOperation::Scalar(*s),
            (FieldKind::Scalar(s), true) => FieldOperation::Scalars(*s),
            (FieldKind::Enum(t), false) => FieldOperation::Enum(t.clone()),
            (FieldKind::Enum(t), true) => FieldOperation::Enums(t.clone()),
            (FieldKind::Message(t), false) => FieldOperation::Message(t.clone()),
            (FieldKind::Message(t), true) => FieldOperation::Messages(t.clone()),
        }
    }

    /// Name of the [`FieldReader`](crate::marshal::FieldReader) method
    pub fn reader_method(&self) -> &'static str {
        match self {
            FieldOperation::Scalar(_) => "read_scalar",
            FieldOperation::Scalars(_) => "read_scalars",
            FieldOperation::Enum(_) => "read_enum",
            FieldOperation::Enums(_) => "read_enums",
            FieldOperation::Message(_) => "read_message",
            FieldOperation::Messages(_) => "read_messages",
        }
    }

    /// Name of the [`FieldWriter`](crate::marshal::FieldWriter) method
    pub fn writer_method(&self) -> &'static str {
        match self {
            FieldOperation::Scalar(_) => "write_scalar",
            FieldOperation::Scalars(_) => "write_scalars",
            FieldOperation::Enum(_) => "write_enum",
            FieldOperation::Enums(_) => "write_enums",
            FieldOperation::Message(_) => "write_message",
            FieldOperation::Messages(_) => "write_messages",
        }
    }
}

/// One field of an adapter plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldPlan {
    /// Field name
    pub name: String,
    /// Field number
    pub number: u32,
    /// Whether absence is an error
    pub required: bool,
    /// Reader/writer pair
    pub operation: FieldOperation,
}

/// What a generated adapter for one message type must do
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdapterSpec {
    /// Source type the adapter marshals
    pub source_type: String,
    /// Fully-qualified schema name
    pub proto_name: String,
    /// Fields in declaration order
    pub fields: Vec<FieldPlan>,
    /// Whether the adapter exposes unknown field accessors
    pub unknown_fields: bool,
}

impl AdapterSpec {
    pub(crate) fn new(descriptor: &TypeDescriptor, proto_name: String) -> Self {
        Self {
            source_type: descriptor.full_name(),
            proto_name,
            fields: descriptor
                .fields
                .iter()
                .map(|f| FieldPlan {
                    name: f.name.clone(),
                    number: f.number,
                    required: f.required,
                    operation: FieldOperation::for_field(f),
                })
                .collect(),
            unknown_fields: descriptor.unknown_fields,
        }
    }

    /// A ready schema-driven adapter for the source type
    pub fn adapter(&self) -> DynamicAdapter {
        DynamicAdapter::new(&self.source_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operations() {
        let descriptor = TypeDescriptor::message("p", "T")
            .field(FieldDescriptor::new("a", 1, FieldKind::Scalar(ScalarType::Int32)).required())
            .field(FieldDescriptor::new("b", 2, FieldKind::Enum("p.E".into())).repeated())
            .field(FieldDescriptor::new("c", 3, FieldKind::Message("p.M".into())));
        let spec = AdapterSpec::new(&descriptor, "x.T".into());

        assert_eq!(spec.source_type, "p.T");
        assert!(spec.unknown_fields);
        let methods: Vec<_> = spec
            .fields
            .iter()
            .map(|f| (f.operation.reader_method(), f.operation.writer_method()))
            .collect();
        assert_eq!(
            methods,
            vec![
                ("read_scalar", "write_scalar"),
                ("read_enums", "write_enums"),
                ("read_message", "write_message"),
            ]
        );
        assert!(spec.fields[0].required);
    }

    #[test]
    fn test_serializes() {
        let descriptor = TypeDescriptor::message("p", "T")
            .field(FieldDescriptor::new("a", 1, FieldKind::Scalar(ScalarType::Sint64)).repeated());
        let json = serde_json::to_value(AdapterSpec::new(&descriptor, "T".into())).unwrap();
        assert_eq!(json["fields"][0]["operation"]["op"], "scalars");
        assert_eq!(json["fields"][0]["operation"]["type"], "sint64");
    }
}
