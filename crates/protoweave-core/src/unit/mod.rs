//! Schema unit configuration.
//!
//! A schema unit is one independently configured scope that owns a subset of
//! the discovered types and maps to one generated schema file. Units are
//! declared in a TOML project file:
//!
//! ```toml
//! metadata = ["types.json"]
//!
//! [[unit]]
//! name = "test_basic_stuff.FirstInitializer"
//! basePackages = ["test_basic_stuff"]
//! schemaFileName = "first_initializer/FirstInitializer.proto"
//! ```

mod validate;

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub use validate::{is_valid_package_name, validate_unit, SCHEMA_FILE_SUFFIX};

fn default_true() -> bool {
    true
}

/// Declared options of a schema unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitConfig {
    /// Unit identity
    pub name: String,
    /// Packages scanned for root types (subpackages included)
    #[serde(default, alias = "value", alias = "rootPackages")]
    pub base_packages: Vec<String>,
    /// Explicit root types
    #[serde(default)]
    pub include_classes: Vec<String>,
    /// Types never admitted by this unit
    #[serde(default)]
    pub exclude_classes: Vec<String>,
    /// Admit referenced types outside any include list
    #[serde(default = "default_true")]
    pub auto_import_classes: bool,
    /// Generated schema file, relative to the output directory
    #[serde(default)]
    pub schema_file_name: Option<String>,
    /// Proto package of the generated schema
    #[serde(default)]
    pub schema_package_name: Option<String>,
    /// Units whose types this unit imports
    #[serde(default)]
    pub depends_on: Vec<String>,
}

impl UnitConfig {
    /// Creates a unit with default options
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_packages: Vec::new(),
            include_classes: Vec::new(),
            exclude_classes: Vec::new(),
            auto_import_classes: true,
            schema_file_name: None,
            schema_package_name: None,
            depends_on: Vec::new(),
        }
    }

    /// Adds a base package
    pub fn base_package(mut self, package: impl Into<String>) -> Self {
        self.base_packages.push(package.into());
        self
    }

    /// Adds an included class
    pub fn include(mut self, type_name: impl Into<String>) -> Self {
        self.include_classes.push(type_name.into());
        self
    }

    /// Adds an excluded class
    pub fn exclude(mut self, type_name: impl Into<String>) -> Self {
        self.exclude_classes.push(type_name.into());
        self
    }

    /// Sets auto-import
    pub fn auto_import(mut self, enabled: bool) -> Self {
        self.auto_import_classes = enabled;
        self
    }

    /// Sets the schema file name
    pub fn schema_file(mut self, file_name: impl Into<String>) -> Self {
        self.schema_file_name = Some(file_name.into());
        self
    }

    /// Sets the proto package
    pub fn schema_package(mut self, package: impl Into<String>) -> Self {
        self.schema_package_name = Some(package.into());
        self
    }

    /// Declares a dependency on another unit
    pub fn depends_on(mut self, unit: impl Into<String>) -> Self {
        self.depends_on.push(unit.into());
        self
    }

    /// Returns the last dotted segment of the unit name
    pub fn simple_name(&self) -> &str {
        self.name.rsplit('.').next().unwrap_or(&self.name)
    }

    /// Returns the schema file name, falling back to `<SimpleName>.proto` when
    /// none was configured or the configured one lacks the suffix
    pub fn effective_schema_file_name(&self) -> String {
        match &self.schema_file_name {
            Some(name) if name.ends_with(SCHEMA_FILE_SUFFIX) => name.clone(),
            _ => format!("{}{}", self.simple_name(), SCHEMA_FILE_SUFFIX),
        }
    }
}

/// A project file: metadata sources plus unit declarations
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProjectConfig {
    /// Metadata files or directories, relative to the project file
    #[serde(default)]
    pub metadata: Vec<PathBuf>,
    /// Declared units, in declaration order
    #[serde(default, rename = "unit")]
    pub units: Vec<UnitConfig>,
}

impl ProjectConfig {
    /// Parses a TOML project
    pub fn from_toml(text: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Loads a project file, resolving metadata paths against its directory
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| Error::file_read(path, e))?;
        let mut project = Self::from_toml(&text).map_err(|e| Error::parse(path, e))?;

        let base = path.parent().unwrap_or_else(|| Path::new("."));
        for entry in &mut project.metadata {
            if entry.is_relative() {
                *entry = base.join(&*entry);
            }
        }
        Ok(project)
    }
}
