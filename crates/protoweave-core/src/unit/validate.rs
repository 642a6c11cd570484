//! Pre-discovery validation of unit options.
//!
//! Validation is a pure function over a [`UnitConfig`] and the metadata
//! provider (used only to resolve the package of excluded classes). It never
//! runs discovery. Each rejection carries a stable message.

use super::UnitConfig;
use crate::diagnostic::Diagnostic;
use crate::error::{Error, Result};
use crate::metadata::TypeMetadataProvider;
use std::path::{Component, Path};
use tracing::warn;

/// Suffix every schema file name should carry
pub const SCHEMA_FILE_SUFFIX: &str = ".proto";

/// Returns true if `name` is a dotted sequence of identifiers
pub fn is_valid_package_name(name: &str) -> bool {
    !name.is_empty()
        && name.split('.').all(|segment| {
            let mut chars = segment.chars();
            match chars.next() {
                Some(first) if first.is_alphabetic() || first == '_' => {
                    chars.all(|c| c.is_alphanumeric() || c == '_')
                }
                _ => false,
            }
        })
}

/// Checks a unit's options for conflicting combinations.
///
/// Returns the non-fatal warnings on success, or a
/// [`Error::ConfigurationConflict`] naming the first problem found.
pub fn validate_unit(
    unit: &UnitConfig,
    provider: &dyn TypeMetadataProvider,
) -> Result<Vec<Diagnostic>> {
    let name = unit.name.as_str();
    if name.trim().is_empty() {
        return Err(Error::configuration_conflict(name, "unit name must not be empty"));
    }

    if !unit.include_classes.is_empty() && !unit.exclude_classes.is_empty() {
        return Err(Error::configuration_conflict(
            name,
            "includeClasses and excludeClasses are mutually exclusive",
        ));
    }

    if !unit.include_classes.is_empty() && !unit.base_packages.is_empty() {
        return Err(Error::configuration_conflict(
            name,
            "includeClasses and value/basePackages are mutually exclusive",
        ));
    }

    for package in &unit.base_packages {
        if !is_valid_package_name(package) {
            return Err(Error::configuration_conflict(
                name,
                format!(
                    "value/basePackages contains an invalid package name : \"{}\"",
                    package
                ),
            ));
        }
    }

    if let Some(package) = &unit.schema_package_name {
        if !is_valid_package_name(package) {
            return Err(Error::configuration_conflict(
                name,
                format!(
                    "schemaPackageName contains an invalid package name : \"{}\"",
                    package
                ),
            ));
        }
    }

    for (option, classes) in [
        ("includeClasses", &unit.include_classes),
        ("excludeClasses", &unit.exclude_classes),
    ] {
        for class in classes {
            if provider.lookup(class).is_none() {
                return Err(Error::type_conflict(
                    name,
                    class,
                    format!("{} contains an unknown type '{}'", option, class),
                ));
            }
        }
    }

    if !unit.base_packages.is_empty() {
        for class in &unit.exclude_classes {
            let descriptor = provider.require(class)?;
            let covered = unit
                .base_packages
                .iter()
                .any(|package| descriptor.is_in_package(package));
            if !covered {
                return Err(Error::type_conflict(
                    name,
                    class,
                    format!(
                        "excludeClasses and value/basePackages are conflicting. Class '{}' must belong to a base package.",
                        class
                    ),
                ));
            }
        }
    }

    let mut warnings = Vec::new();
    if let Some(file_name) = &unit.schema_file_name {
        let escapes = Path::new(file_name).components().any(|c| {
            matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_))
        });
        if escapes || file_name.is_empty() {
            return Err(Error::configuration_conflict(
                name,
                format!(
                    "schemaFileName must be a relative path inside the output directory: '{}'",
                    file_name
                ),
            ));
        }
        if !file_name.ends_with(SCHEMA_FILE_SUFFIX) {
            warn!(
                "{}: schemaFileName '{}' lacks the {} suffix, using {}",
                name,
                file_name,
                SCHEMA_FILE_SUFFIX,
                unit.effective_schema_file_name()
            );
            warnings.push(Diagnostic::warning(
                name,
                format!("schemaFileName should end with '{}'", SCHEMA_FILE_SUFFIX),
            ));
        }
    }

    Ok(warnings)
}
