//! Lowering of schema files to descriptors, used to check generated schemas
//! with prost-reflect before anything is written.

use super::ir::{EnumBlock, FieldLabel, FieldType, MessageBlock, SchemaFile, SchemaItem};
use crate::error::{Error, Result};
use crate::metadata::ScalarType;
use prost_reflect::DescriptorPool;
use prost_types::field_descriptor_proto::{Label, Type};
use prost_types::{
    DescriptorProto, EnumDescriptorProto, EnumValueDescriptorProto, FieldDescriptorProto,
    FileDescriptorProto, FileDescriptorSet,
};

fn scalar_type(scalar: ScalarType) -> Type {
    match scalar {
        ScalarType::Double => Type::Double,
        ScalarType::Float => Type::Float,
        ScalarType::Int32 => Type::Int32,
        ScalarType::Int64 => Type::Int64,
        ScalarType::Uint32 => Type::Uint32,
        ScalarType::Uint64 => Type::Uint64,
        ScalarType::Sint32 => Type::Sint32,
        ScalarType::Sint64 => Type::Sint64,
        ScalarType::Fixed32 => Type::Fixed32,
        ScalarType::Fixed64 => Type::Fixed64,
        ScalarType::Sfixed32 => Type::Sfixed32,
        ScalarType::Sfixed64 => Type::Sfixed64,
        ScalarType::Bool => Type::Bool,
        ScalarType::String => Type::String,
        ScalarType::Bytes => Type::Bytes,
    }
}

fn label(label: FieldLabel) -> Label {
    match label {
        FieldLabel::Optional => Label::Optional,
        FieldLabel::Required => Label::Required,
        FieldLabel::Repeated => Label::Repeated,
    }
}

fn message_proto(message: &MessageBlock) -> DescriptorProto {
    let mut proto = DescriptorProto {
        name: Some(message.name.clone()),
        ..Default::default()
    };

    for field in &message.fields {
        let (ty, type_name) = match &field.field_type {
            FieldType::Scalar(scalar) => (scalar_type(*scalar), None),
            FieldType::Message(name) => (Type::Message, Some(format!(".{}", name))),
            FieldType::Enum(name) => (Type::Enum, Some(format!(".{}", name))),
        };
        proto.field.push(FieldDescriptorProto {
            name: Some(field.name.clone()),
            number: Some(field.number as i32),
            label: Some(label(field.label) as i32),
            r#type: Some(ty as i32),
            type_name,
            ..Default::default()
        });
    }

    for item in &message.nested {
        match item {
            SchemaItem::Message(nested) => proto.nested_type.push(message_proto(nested)),
            SchemaItem::Enum(nested) => proto.enum_type.push(enum_proto(nested)),
        }
    }
    proto
}

fn enum_proto(enum_block: &EnumBlock) -> EnumDescriptorProto {
    EnumDescriptorProto {
        name: Some(enum_block.name.clone()),
        value: enum_block
            .values
            .iter()
            .map(|v| EnumValueDescriptorProto {
                name: Some(v.name.clone()),
                number: Some(v.number),
                ..Default::default()
            })
            .collect(),
        ..Default::default()
    }
}

/// Lowers one schema file to a `FileDescriptorProto`
pub fn file_descriptor(file: &SchemaFile) -> FileDescriptorProto {
    let mut proto = FileDescriptorProto {
        name: Some(file.file_name.clone()),
        package: file.package.clone(),
        dependency: file.imports.clone(),
        syntax: Some("proto2".to_string()),
        ..Default::default()
    };

    for item in &file.items {
        match item {
            SchemaItem::Message(message) => proto.message_type.push(message_proto(message)),
            SchemaItem::Enum(enum_block) => proto.enum_type.push(enum_proto(enum_block)),
        }
    }
    proto
}

/// Loads the given files (dependencies first) into a descriptor pool,
/// resolving every type reference and import.
pub fn build_pool(files: &[SchemaFile]) -> Result<DescriptorPool> {
    let set = FileDescriptorSet {
        file: files.iter().map(file_descriptor).collect(),
    };
    DescriptorPool::from_file_descriptor_set(set)
        .map_err(|e| Error::descriptor_build(format!("generated schema does not resolve: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emit::ir::{EnumLine, FieldLine};

    fn file(name: &str, package: &str, imports: &[&str], items: Vec<SchemaItem>) -> SchemaFile {
        SchemaFile {
            unit: name.into(),
            file_name: format!("{}.proto", name),
            package: Some(package.into()),
            imports: imports.iter().map(|s| s.to_string()).collect(),
            items,
        }
    }

    fn message(package: &str, name: &str, fields: Vec<FieldLine>) -> SchemaItem {
        SchemaItem::Message(MessageBlock {
            name: name.into(),
            full_name: format!("{}.{}", package, name),
            source: name.into(),
            fields,
            nested: Vec::new(),
        })
    }

    fn reference(name: &str, number: u32, target: FieldType) -> FieldLine {
        FieldLine {
            label: FieldLabel::Optional,
            field_type: target,
            name: name.into(),
            number,
        }
    }

    #[test]
    fn test_pool_resolves_cross_file_references() {
        let common = file(
            "common",
            "common",
            &[],
            vec![
                message("common", "Money", vec![reference("amount", 1, FieldType::Scalar(ScalarType::Sint64))]),
                SchemaItem::Enum(EnumBlock {
                    name: "Currency".into(),
                    full_name: "common.Currency".into(),
                    source: "Currency".into(),
                    values: vec![EnumLine { name: "EUR".into(), number: 0 }],
                }),
            ],
        );
        let account = file(
            "account",
            "bank",
            &["common.proto"],
            vec![message(
                "bank",
                "Account",
                vec![
                    reference("balance", 1, FieldType::Message("common.Money".into())),
                    reference("currency", 2, FieldType::Enum("common.Currency".into())),
                ],
            )],
        );

        let pool = build_pool(&[common, account]).unwrap();
        let account = pool.get_message_by_name("bank.Account").unwrap();
        let balance = account.get_field_by_name("balance").unwrap();
        assert_eq!(
            balance.kind().as_message().map(|m| m.full_name().to_string()),
            Some("common.Money".to_string())
        );
    }

    #[test]
    fn test_unresolved_reference_fails() {
        let broken = file(
            "broken",
            "bank",
            &[],
            vec![message("bank", "Account", vec![reference("balance", 1, FieldType::Message("common.Money".into()))])],
        );
        assert!(matches!(build_pool(&[broken]), Err(Error::DescriptorBuild(_))));
    }
}
