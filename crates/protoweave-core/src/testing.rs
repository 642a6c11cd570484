//! Shared fixtures for unit tests.

use crate::metadata::{FieldDescriptor, FieldKind, ScalarType, TypeDescriptor, TypeUniverse};

fn scalar(name: &str, number: u32, ty: ScalarType) -> FieldDescriptor {
    FieldDescriptor::new(name, number, FieldKind::Scalar(ty))
}

fn message(name: &str, number: u32, type_name: &str) -> FieldDescriptor {
    FieldDescriptor::new(name, number, FieldKind::Message(type_name.to_string()))
}

fn enumeration(name: &str, number: u32, type_name: &str) -> FieldDescriptor {
    FieldDescriptor::new(name, number, FieldKind::Enum(type_name.to_string()))
}

/// A universe covering the discovery scenarios:
///
/// - `test_basic_stuff` / `test_basic_stuff_dependent`: a root unit and a unit
///   referencing one of its types
/// - `test_nested`: outer types with nested types, some never referenced
/// - `test_discovery`: a cross-package reference without auto-import
/// - `test_cycle_a` / `test_cycle_b`: two packages referencing each other
pub(crate) fn sample_universe() -> TypeUniverse {
    let types = vec![
        TypeDescriptor::message("test_basic_stuff", "TestMessage")
            .field(scalar("name", 1, ScalarType::String))
            .field(message("details", 2, "test_basic_stuff.Details"))
            .field(enumeration("status", 3, "test_basic_stuff.Status")),
        TypeDescriptor::message("test_basic_stuff", "Details")
            .field(scalar("notes", 1, ScalarType::String).repeated()),
        TypeDescriptor::enumeration("test_basic_stuff", "Status")
            .value("ACTIVE", 0)
            .value("RETIRED", 1),
        TypeDescriptor::message("test_basic_stuff_dependent", "Dependent")
            .field(message("message", 1, "test_basic_stuff.TestMessage"))
            .field(scalar("count", 2, ScalarType::Int64)),
        TypeDescriptor::message("test_nested", "OuterMessage2")
            .field(scalar("baseField1", 1, ScalarType::String))
            .field(message("inner", 2, "test_nested.OuterMessage2.InnerMessage2")),
        TypeDescriptor::message("test_nested", "OuterMessage2.InnerMessage2")
            .field(scalar("value", 1, ScalarType::Int32)),
        TypeDescriptor::message("test_nested", "OuterMessage3")
            .field(scalar("field", 1, ScalarType::String)),
        TypeDescriptor::message("test_nested", "OuterMessage3.InnerMessage3")
            .field(scalar("hidden", 1, ScalarType::Bool)),
        TypeDescriptor::message("test_nested", "OuterMessage4")
            .field(message("inner", 1, "test_nested.OuterMessage4.InnerMessage4")),
        TypeDescriptor::message("test_nested", "OuterMessage4.InnerMessage4")
            .field(enumeration("color", 1, "test_nested.Color")),
        TypeDescriptor::enumeration("test_nested", "Color")
            .value("RED", 0)
            .value("GREEN", 1),
        TypeDescriptor::message("test_discovery", "OuterMessage1")
            .field(message("inner", 1, "test_discovery_inner.InnerMessage1")),
        TypeDescriptor::message("test_discovery_inner", "InnerMessage1")
            .field(scalar("flag", 1, ScalarType::Bool)),
        TypeDescriptor::message("test_cycle_a", "A")
            .field(message("b", 1, "test_cycle_b.B")),
        TypeDescriptor::message("test_cycle_b", "B")
            .field(message("a", 1, "test_cycle_a.A")),
    ];

    let mut universe = TypeUniverse::new();
    for descriptor in types {
        universe
            .insert(descriptor)
            .expect("fixture types are well-formed");
    }
    universe
}
