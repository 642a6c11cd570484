//! Schema and adapter emission.
//!
//! ## Architecture
//!
//! For every resolved unit, [`SchemaEmitter`]:
//!
//! 1. Lays out the unit's discovered types as a [`SchemaFile`]; a nested type
//!    is placed inside its enclosing type when both belong to the unit, and
//!    at top level under its simple name otherwise
//! 2. Resolves field references to fully-qualified schema names and adds an
//!    import for every other unit referenced
//! 3. Loads the unit's file and the files it imports into a
//!    `prost_reflect::DescriptorPool` to make sure the schema resolves; a
//!    failing unit and its dependents are reported, the rest carry on
//! 4. Renders proto2 text with [`ProtoRenderer`] and plans one
//!    [`AdapterSpec`] per message type
//!
//! ## Extensibility
//!
//! The [`ProtoWriter`] trait visits the intermediate representation, so other
//! output formats can be produced from the same [`SchemaFile`].

mod adapter;
mod descriptor;
mod ir;
mod manifest;
mod render;
mod writer;

pub use adapter::{AdapterSpec, FieldOperation, FieldPlan};
pub use descriptor::{build_pool, file_descriptor};
pub use ir::{
    EnumBlock, EnumLine, FieldLabel, FieldLine, FieldType, MessageBlock, SchemaFile, SchemaItem,
};
pub use manifest::{RegistrationManifest, DEFAULT_MANIFEST_NAME};
pub use render::{render, ProtoRenderer, RenderConfig};
pub use writer::{ProtoWriter, StatsWriter};

use crate::diagnostic::Diagnostic;
use crate::error::{Error, ErrorCategory, Result};
use crate::metadata::{qualify, FieldDescriptor, FieldKind, TypeDescriptor, TypeKind, TypeMetadataProvider};
use crate::resolver::{Resolution, SchemaUnit};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Everything generated for one unit
#[derive(Debug, Clone)]
pub struct EmittedUnit {
    /// Schema layout
    pub file: SchemaFile,
    /// Rendered proto2 source
    pub text: String,
    /// One adapter plan per message type, in discovery order
    pub adapters: Vec<AdapterSpec>,
    /// Definition counts
    pub stats: StatsWriter,
}

/// Output of [`SchemaEmitter::emit`]
#[derive(Debug, Clone)]
pub struct Emission {
    /// Emitted units, dependencies first
    pub units: Vec<EmittedUnit>,
    /// Registration manifest listing every emitted unit
    pub manifest: RegistrationManifest,
    /// One error per unit that could not be emitted
    pub diagnostics: Vec<Diagnostic>,
}

impl Emission {
    /// Returns true if any unit was left out
    pub fn has_errors(&self) -> bool {
        !self.diagnostics.is_empty()
    }
}

/// Builds schema files and adapter plans from a [`Resolution`]
pub struct SchemaEmitter<'a> {
    provider: &'a dyn TypeMetadataProvider,
    resolution: &'a Resolution,
    config: RenderConfig,
}

impl<'a> SchemaEmitter<'a> {
    /// Creates an emitter with the default render configuration
    pub fn new(provider: &'a dyn TypeMetadataProvider, resolution: &'a Resolution) -> Self {
        Self {
            provider,
            resolution,
            config: RenderConfig::default(),
        }
    }

    /// Replaces the render configuration
    pub fn with_config(mut self, config: RenderConfig) -> Self {
        self.config = config;
        self
    }

    /// Lays out, checks and renders every resolved unit.
    ///
    /// Each schema is checked together with the schemas it imports,
    /// transitively. A unit that fails, and every unit depending on it, is
    /// left out with an error diagnostic while the others are still emitted.
    /// Only internal errors are returned as `Err`.
    pub fn emit(&self) -> Result<Emission> {
        let mut units: Vec<EmittedUnit> = Vec::with_capacity(self.resolution.units.len());
        let mut emitted: HashMap<&'a str, usize> = HashMap::new();
        let mut diagnostics = Vec::new();

        for unit in &self.resolution.units {
            let closure = self.dependency_closure(unit);
            if let Some(failed) = closure.iter().find(|name| !emitted.contains_key(*name)) {
                warn!("Skipping unit {}: dependency {} was not emitted", unit.name(), failed);
                diagnostics.push(Diagnostic::error(
                    unit.name(),
                    format!("depends on unit '{}' which could not be emitted", failed),
                ));
                continue;
            }

            // Dependencies first, in emission order
            let imported: Vec<SchemaFile> = self
                .resolution
                .units
                .iter()
                .filter(|u| closure.contains(&u.name()))
                .filter_map(|u| emitted.get(u.name()))
                .map(|&index| units[index].file.clone())
                .collect();

            match self.emit_unit(unit, imported) {
                Ok(unit_output) => {
                    emitted.insert(unit.name(), units.len());
                    units.push(unit_output);
                }
                Err(err) if err.category() == ErrorCategory::Internal => return Err(err),
                Err(err) => {
                    warn!("Failed to emit unit {}: {}", unit.name(), err);
                    diagnostics.push(
                        err.to_diagnostic()
                            .unwrap_or_else(|| Diagnostic::error(unit.name(), err.to_string())),
                    );
                }
            }
        }

        Ok(Emission {
            manifest: RegistrationManifest::from_units(units.iter().map(|u| u.file.unit.as_str())),
            units,
            diagnostics,
        })
    }

    fn emit_unit(&self, unit: &SchemaUnit, mut pool_files: Vec<SchemaFile>) -> Result<EmittedUnit> {
        let file = self.schema_file(unit)?;
        pool_files.push(file.clone());
        let pool = build_pool(&pool_files)?;
        debug!(unit = unit.name(), files = pool.files().count(), "generated schema resolves");

        let adapters = self.adapters(unit)?;
        let text = render(&file, &self.config);
        let stats = StatsWriter::of(&file);
        debug!(
            unit = unit.name(),
            file = %file.file_name,
            messages = stats.message_count,
            enums = stats.enum_count,
            "emitted schema"
        );
        Ok(EmittedUnit {
            file,
            text,
            adapters,
            stats,
        })
    }

    /// Every unit `unit` depends on, directly or transitively
    fn dependency_closure(&self, unit: &SchemaUnit) -> Vec<&'a str> {
        let mut closure: Vec<&'a str> = Vec::new();
        let mut stack: Vec<&str> = unit.depends_on.iter().map(String::as_str).collect();
        while let Some(name) = stack.pop() {
            let Some(dependency) = self.resolution.unit(name) else {
                continue;
            };
            if closure.contains(&dependency.name()) {
                continue;
            }
            closure.push(dependency.name());
            stack.extend(dependency.depends_on.iter().map(String::as_str));
        }
        closure
    }

    /// Lays out one unit's schema file
    pub fn schema_file(&self, unit: &SchemaUnit) -> Result<SchemaFile> {
        let mut imports = Vec::new();
        let mut items = Vec::new();
        for type_name in &unit.types {
            let descriptor = self.provider.require(type_name)?;
            if self.rendered_parent(unit, descriptor).is_none() {
                items.push(self.item(unit, descriptor, &mut imports)?);
            }
        }

        let file = SchemaFile {
            unit: unit.name().to_string(),
            file_name: unit.schema_file_name(),
            package: unit.schema_package().map(str::to_string),
            imports,
            items,
        };
        check_unique_names(unit, &file)?;
        Ok(file)
    }

    /// Fully-qualified schema name of an owned type
    pub fn proto_name(&self, type_name: &str) -> Result<String> {
        let descriptor = self.provider.require(type_name)?;
        let unit = self.owner(type_name)?;
        match self.rendered_parent(unit, descriptor) {
            Some(parent) => Ok(format!("{}.{}", self.proto_name(&parent)?, descriptor.simple_name())),
            None => Ok(qualify(
                unit.schema_package().unwrap_or_default(),
                descriptor.simple_name(),
            )),
        }
    }

    fn owner(&self, type_name: &str) -> Result<&'a SchemaUnit> {
        self.resolution
            .ownership
            .owner(type_name)
            .and_then(|unit| self.resolution.unit(unit))
            .ok_or_else(|| Error::internal(format!("type '{}' has no owning unit", type_name)))
    }

    fn rendered_parent(&self, unit: &SchemaUnit, descriptor: &TypeDescriptor) -> Option<String> {
        descriptor
            .enclosing_type()
            .filter(|parent| unit.owns(parent))
    }

    fn item(
        &self,
        unit: &SchemaUnit,
        descriptor: &TypeDescriptor,
        imports: &mut Vec<String>,
    ) -> Result<SchemaItem> {
        let source = descriptor.full_name();
        let full_name = self.proto_name(&source)?;
        let name = descriptor.simple_name().to_string();

        if descriptor.kind == TypeKind::Enum {
            return Ok(SchemaItem::Enum(EnumBlock {
                name,
                full_name,
                source,
                values: descriptor
                    .values
                    .iter()
                    .map(|v| EnumLine {
                        name: v.name.clone(),
                        number: v.number,
                    })
                    .collect(),
            }));
        }

        let fields = descriptor
            .fields
            .iter()
            .map(|field| self.field_line(unit, field, imports))
            .collect::<Result<Vec<_>>>()?;

        let mut nested = Vec::new();
        for type_name in &unit.types {
            let candidate = self.provider.require(type_name)?;
            if self.rendered_parent(unit, candidate).as_deref() == Some(source.as_str()) {
                nested.push(self.item(unit, candidate, imports)?);
            }
        }

        Ok(SchemaItem::Message(MessageBlock {
            name,
            full_name,
            source,
            fields,
            nested,
        }))
    }

    fn field_line(
        &self,
        unit: &SchemaUnit,
        field: &FieldDescriptor,
        imports: &mut Vec<String>,
    ) -> Result<FieldLine> {
        let field_type = match &field.kind {
            FieldKind::Scalar(scalar) => FieldType::Scalar(*scalar),
            FieldKind::Message(target) => FieldType::Message(self.reference(unit, target, imports)?),
            FieldKind::Enum(target) => FieldType::Enum(self.reference(unit, target, imports)?),
        };
        let label = if field.is_collection() {
            FieldLabel::Repeated
        } else if field.required {
            FieldLabel::Required
        } else {
            FieldLabel::Optional
        };

        Ok(FieldLine {
            label,
            field_type,
            name: field.name.clone(),
            number: field.number,
        })
    }

    fn reference(&self, unit: &SchemaUnit, target: &str, imports: &mut Vec<String>) -> Result<String> {
        let owner = self.owner(target)?;
        if owner.name() != unit.name() {
            let file_name = owner.schema_file_name();
            if !imports.contains(&file_name) {
                imports.push(file_name);
            }
        }
        self.proto_name(target)
    }

    fn adapters(&self, unit: &SchemaUnit) -> Result<Vec<AdapterSpec>> {
        let mut adapters = Vec::new();
        for type_name in &unit.types {
            let descriptor = self.provider.require(type_name)?;
            if descriptor.kind == TypeKind::Message {
                adapters.push(AdapterSpec::new(descriptor, self.proto_name(type_name)?));
            }
        }
        Ok(adapters)
    }
}

fn check_unique_names(unit: &SchemaUnit, file: &SchemaFile) -> Result<()> {
    fn visit<'f>(items: &'f [SchemaItem], seen: &mut HashMap<String, &'f str>, unit: &SchemaUnit) -> Result<()> {
        for item in items {
            let (full_name, nested) = match item {
                SchemaItem::Message(m) => (&m.full_name, m.nested.as_slice()),
                SchemaItem::Enum(e) => (&e.full_name, &[][..]),
            };
            if let Some(previous) = seen.insert(full_name.clone(), item.source()) {
                return Err(Error::type_conflict(
                    unit.name(),
                    item.source(),
                    format!(
                        "{} and {} would both be emitted as {}",
                        previous,
                        item.source(),
                        full_name
                    ),
                ));
            }
            visit(nested, seen, unit)?;
        }
        Ok(())
    }
    visit(&file.items, &mut HashMap::new(), unit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marshal::{from_bytes, to_bytes, DynamicMessage, Value};
    use crate::metadata::{ScalarType, TypeUniverse};
    use crate::resolver::ProjectResolver;
    use crate::testing::sample_universe;
    use crate::unit::UnitConfig;
    use pretty_assertions::assert_eq;

    fn emit(universe: &TypeUniverse, units: Vec<UnitConfig>) -> Result<Emission> {
        let resolution = ProjectResolver::new(universe, units).resolve()?;
        SchemaEmitter::new(universe, &resolution)
            .with_config(RenderConfig::new().include_comments(false))
            .emit()
    }

    #[test]
    fn test_unreferenced_nested_type_is_omitted() {
        let universe = sample_universe();
        let emission = emit(
            &universe,
            vec![UnitConfig::new("test_nested.NestedInitializer").base_package("test_nested")],
        )
        .unwrap();

        let unit = &emission.units[0];
        assert_eq!(unit.file.file_name, "NestedInitializer.proto");
        assert!(unit.text.contains("message OuterMessage2 {"));
        assert!(unit.text.contains("   message InnerMessage2 {"));
        assert!(unit.text.contains("message OuterMessage3 {"));
        assert!(!unit.text.contains("InnerMessage3"));
        assert!(unit.text.contains("optional OuterMessage4.InnerMessage4 inner = 1;"));
        assert!(unit.text.contains("optional Color color = 1;"));

        let sources = unit.file.sources();
        assert!(!sources.contains(&"test_nested.OuterMessage3.InnerMessage3"));
        assert_eq!(unit.stats.enum_count, 1);
        assert_eq!(unit.stats.message_count, 5);
    }

    #[test]
    fn test_cross_unit_reference_imports_owner() {
        let universe = sample_universe();
        let emission = emit(
            &universe,
            vec![
                UnitConfig::new("test_basic_stuff_dependent.DependentInitializer")
                    .base_package("test_basic_stuff_dependent")
                    .schema_package("dependent"),
                UnitConfig::new("test_basic_stuff.FirstInitializer")
                    .base_package("test_basic_stuff")
                    .schema_file("first/First.proto")
                    .schema_package("first"),
            ],
        )
        .unwrap();

        let names: Vec<_> = emission.units.iter().map(|u| u.file.unit.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "test_basic_stuff.FirstInitializer",
                "test_basic_stuff_dependent.DependentInitializer"
            ]
        );

        let dependent = &emission.units[1];
        assert_eq!(dependent.file.imports, vec!["first/First.proto"]);
        assert!(dependent.text.contains("import \"first/First.proto\";"));
        assert!(dependent.text.contains("optional first.TestMessage message = 1;"));

        assert_eq!(
            emission.manifest.render(),
            "test_basic_stuff.FirstInitializer\ntest_basic_stuff_dependent.DependentInitializer\n"
        );
    }

    #[test]
    fn test_adapter_specs_round_trip() {
        let universe = sample_universe();
        let emission = emit(
            &universe,
            vec![UnitConfig::new("test_basic_stuff.FirstInitializer")
                .base_package("test_basic_stuff")
                .schema_package("first")],
        )
        .unwrap();

        let adapters = &emission.units[0].adapters;
        let names: Vec<_> = adapters.iter().map(|a| a.proto_name.as_str()).collect();
        assert_eq!(names, vec!["first.TestMessage", "first.Details"]);

        let adapter = adapters[0].adapter();
        let message = DynamicMessage::new("test_basic_stuff.TestMessage")
            .with("name", Value::String("batman".into()))
            .with("status", Value::Enum(1))
            .with(
                "details",
                Value::Message(
                    DynamicMessage::new("test_basic_stuff.Details")
                        .with("notes", Value::List(vec![Value::String("a".into())])),
                ),
            );
        let bytes = to_bytes(&universe, &adapter, &message).unwrap();
        let decoded: DynamicMessage = from_bytes(&universe, &adapter, bytes).unwrap();
        assert_eq!(decoded, message);
    }

    #[test]
    fn test_nested_type_owned_alone_goes_top_level() {
        let universe = sample_universe();
        let emission = emit(
            &universe,
            vec![UnitConfig::new("test_nested.InnerOnly")
                .include("test_nested.OuterMessage2.InnerMessage2")
                .schema_package("inner")],
        )
        .unwrap();

        let file = &emission.units[0].file;
        assert_eq!(file.items.len(), 1);
        assert_eq!(file.items[0].name(), "InnerMessage2");
        assert!(emission.units[0].text.contains("message InnerMessage2 {\n   optional int32 value = 1;\n}"));
    }

    #[test]
    fn test_simple_name_collision_is_a_conflict() {
        let universe = TypeUniverse::new()
            .with(TypeDescriptor::message("alpha", "Thing"))
            .and_then(|u| u.with(TypeDescriptor::message("beta", "Thing")))
            .and_then(|u| {
                u.with(
                    TypeDescriptor::message("alpha", "Holder")
                        .field(FieldDescriptor::new("a", 1, FieldKind::Message("alpha.Thing".into())))
                        .field(FieldDescriptor::new("b", 2, FieldKind::Message("beta.Thing".into()))),
                )
            })
            .unwrap();

        let emission = emit(
            &universe,
            vec![UnitConfig::new("alpha.Init").include("alpha.Holder")],
        )
        .unwrap();
        assert!(emission.units.is_empty());
        assert!(emission.manifest.is_empty());
        assert_eq!(emission.diagnostics.len(), 1);
        assert_eq!(emission.diagnostics[0].unit, "alpha.Init");
        assert_eq!(
            emission.diagnostics[0].message,
            "alpha.Thing and beta.Thing would both be emitted as Thing"
        );
    }

    #[test]
    fn test_failed_unit_does_not_stop_healthy_units() {
        let universe = TypeUniverse::new()
            .with(TypeDescriptor::message("alpha", "Thing"))
            .and_then(|u| u.with(TypeDescriptor::message("beta", "Thing")))
            .and_then(|u| {
                u.with(
                    TypeDescriptor::message("alpha", "Holder")
                        .field(FieldDescriptor::new("a", 1, FieldKind::Message("alpha.Thing".into())))
                        .field(FieldDescriptor::new("b", 2, FieldKind::Message("beta.Thing".into()))),
                )
            })
            .and_then(|u| {
                u.with(
                    TypeDescriptor::message("gamma", "Solo")
                        .field(FieldDescriptor::new("id", 1, FieldKind::Scalar(ScalarType::Int64))),
                )
            })
            .and_then(|u| {
                u.with(
                    TypeDescriptor::message("delta", "User")
                        .field(FieldDescriptor::new("holder", 1, FieldKind::Message("alpha.Holder".into()))),
                )
            })
            .unwrap();

        let emission = emit(
            &universe,
            vec![
                UnitConfig::new("alpha.Init").include("alpha.Holder"),
                UnitConfig::new("gamma.Init")
                    .base_package("gamma")
                    .schema_file("gamma.proto"),
                UnitConfig::new("delta.Init")
                    .base_package("delta")
                    .schema_file("delta.proto")
                    .auto_import(false),
            ],
        )
        .unwrap();

        let names: Vec<_> = emission.units.iter().map(|u| u.file.unit.as_str()).collect();
        assert_eq!(names, vec!["gamma.Init"]);
        assert_eq!(emission.manifest.render(), "gamma.Init\n");

        let failed: Vec<_> = emission
            .diagnostics
            .iter()
            .map(|d| (d.unit.as_str(), d.message.as_str()))
            .collect();
        assert_eq!(
            failed,
            vec![
                ("alpha.Init", "alpha.Thing and beta.Thing would both be emitted as Thing"),
                ("delta.Init", "depends on unit 'alpha.Init' which could not be emitted"),
            ]
        );
    }

    #[test]
    fn test_schema_is_checked_with_its_imports_only() {
        // Both providers emit `shared.Thing`; each resolves alone, but a
        // schema importing both does not
        let universe = TypeUniverse::new()
            .with(TypeDescriptor::message("a", "Thing"))
            .and_then(|u| u.with(TypeDescriptor::message("b", "Thing")))
            .and_then(|u| {
                u.with(
                    TypeDescriptor::message("z", "User")
                        .field(FieldDescriptor::new("a", 1, FieldKind::Message("a.Thing".into())))
                        .field(FieldDescriptor::new("b", 2, FieldKind::Message("b.Thing".into()))),
                )
            })
            .unwrap();
        let provider = |name: &str, package: &str, file: &str| {
            UnitConfig::new(name)
                .base_package(package)
                .schema_file(file)
                .schema_package("shared")
        };

        let emission = emit(
            &universe,
            vec![
                provider("a.Init", "a", "a.proto"),
                provider("b.Init", "b", "b.proto"),
                UnitConfig::new("z.Init")
                    .base_package("z")
                    .schema_file("z.proto")
                    .auto_import(false),
            ],
        )
        .unwrap();

        let names: Vec<_> = emission.units.iter().map(|u| u.file.unit.as_str()).collect();
        assert_eq!(names, vec!["a.Init", "b.Init"]);
        assert_eq!(emission.diagnostics.len(), 1);
        assert_eq!(emission.diagnostics[0].unit, "z.Init");
        assert!(emission.diagnostics[0]
            .message
            .contains("generated schema does not resolve"));
    }

    #[test]
    fn test_scalar_field_lines() {
        let universe = TypeUniverse::new()
            .with(
                TypeDescriptor::message("p", "Sample")
                    .field(FieldDescriptor::new("id", 1, FieldKind::Scalar(ScalarType::Fixed64)).required())
                    .field(FieldDescriptor::new("tags", 2, FieldKind::Scalar(ScalarType::String)).repeated()),
            )
            .unwrap();
        let emission = emit(&universe, vec![UnitConfig::new("p.Init").base_package("p")]).unwrap();
        let text = &emission.units[0].text;
        assert!(text.contains("   required fixed64 id = 1;\n   repeated string tags = 2;\n"));
    }
}
