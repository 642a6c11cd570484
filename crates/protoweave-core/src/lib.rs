//! # protoweave-core
//!
//! Generates protobuf schemas and marshalling adapters from declaratively
//! configured schema units.
//!
//! A schema unit names a set of root types (by package or explicitly),
//! discovers every type reachable from them through field references, and
//! emits one proto2 schema file plus one adapter plan per message type. Units
//! may import types owned by other units; the resulting dependency graph must
//! be acyclic.
//!
//! ## Architecture
//!
//! - [`metadata`]: Type metadata, loaded from JSON or compiled descriptors
//! - [`unit`]: Unit declarations and their validation
//! - [`discovery`]: Transitive type discovery and ownership
//! - [`graph`]: Unit dependency graph with cycle detection
//! - [`resolver`]: Runs validation, discovery and ordering for a project
//! - [`emit`]: Schema layout, rendering and adapter plans
//! - [`marshal`]: Wire-level reader/writer contract with unknown-field
//!   preservation
//! - [`error`] and [`diagnostic`]: Failures and reported findings
//!
//! ## Example
//!
//! ```
//! use protoweave_core::emit::SchemaEmitter;
//! use protoweave_core::metadata::{FieldDescriptor, FieldKind, ScalarType, TypeDescriptor, TypeUniverse};
//! use protoweave_core::{ProjectResolver, UnitConfig};
//!
//! let universe = TypeUniverse::new().with(
//!     TypeDescriptor::message("shop", "Order")
//!         .field(FieldDescriptor::new("id", 1, FieldKind::Scalar(ScalarType::Uint64)).required()),
//! )?;
//! let units = vec![UnitConfig::new("shop.ShopSchema").base_package("shop").schema_package("shop")];
//!
//! let resolution = ProjectResolver::new(&universe, units).resolve()?;
//! let emission = SchemaEmitter::new(&universe, &resolution).emit()?;
//!
//! assert_eq!(emission.units[0].file.file_name, "ShopSchema.proto");
//! assert!(emission.units[0].text.contains("required uint64 id = 1;"));
//! # Ok::<(), protoweave_core::Error>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unreachable_pub)]

pub mod diagnostic;
pub mod discovery;
pub mod emit;
pub mod error;
pub mod graph;
pub mod marshal;
pub mod metadata;
pub mod resolver;
pub mod unit;

#[cfg(test)]
mod testing;

// Re-export primary types for convenience
pub use diagnostic::{Diagnostic, Severity};
pub use emit::{Emission, RegistrationManifest, SchemaEmitter};
pub use error::{Error, Result};
pub use marshal::{MessageAdapter, UnknownFieldSet};
pub use metadata::{TypeDescriptor, TypeMetadataProvider, TypeUniverse};
pub use resolver::{ProjectResolver, Resolution, SchemaUnit};
pub use unit::{ProjectConfig, UnitConfig};

/// Crate version for programmatic access
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Maximum valid protobuf field number (2^29 - 1)
pub const MAX_FIELD_NUMBER: u32 = 536_870_911;
