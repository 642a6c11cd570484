//! Error types for the protoweave-core library.
//!
//! This module provides comprehensive error handling using the `thiserror` crate.
//! Analysis failures (configuration conflicts, discovery policy violations and
//! dependency cycles) display their diagnostic message verbatim, since build
//! tooling pattern-matches on that text.

use crate::diagnostic::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for protoweave operations
pub type Result<T> = std::result::Result<T, Error>;

/// Comprehensive error type for all protoweave operations
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Failed to read input file
    #[error("failed to read file '{path}': {source}")]
    FileRead {
        /// Path to the file that failed to read
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse a project or metadata file
    #[error("failed to parse '{path}': {details}")]
    Parse {
        /// Path of the offending file
        path: PathBuf,
        /// Parser message
        details: String,
    },

    /// Path traversal attempt detected (security error)
    #[error("path traversal detected: '{path}' would escape output directory")]
    PathTraversal {
        /// The suspicious path
        path: PathBuf,
    },

    /// Mutually exclusive or inconsistent unit options
    #[error("{message}")]
    ConfigurationConflict {
        /// Unit whose configuration was rejected
        unit: String,
        /// Diagnostic text
        message: String,
        /// Type the conflict is about, if any
        type_name: Option<String>,
    },

    /// A referenced type cannot be admitted by the unit's inclusion policy
    #[error("Found a reference to class {type_name} which was not explicitly included by {unit} and the combination of relevant attributes (basePackages, includeClasses, excludeClasses, autoImportClasses) do not allow it to be included.")]
    DiscoveryPolicyViolation {
        /// Unit running discovery
        unit: String,
        /// Type that could not be admitted
        type_name: String,
    },

    /// Back-edge in the unit dependency graph
    #[error("Illegal recursive dependency on {unit}")]
    CyclicDependency {
        /// Unit where the cycle closes
        unit: String,
    },

    /// Two units share a name
    #[error("duplicate schema unit '{unit}'")]
    DuplicateUnit {
        /// The repeated name
        unit: String,
    },

    /// Type metadata is inconsistent
    #[error("invalid type metadata for '{type_name}': {details}")]
    InvalidMetadata {
        /// Type being described
        type_name: String,
        /// What is wrong with it
        details: String,
    },

    /// A type name is not known to the metadata provider
    #[error("unknown type '{type_name}'")]
    UnknownType {
        /// The unresolved name
        type_name: String,
    },

    /// Invalid field number in metadata
    #[error("invalid field number {number}: must be between 1 and {max}")]
    InvalidFieldNumber {
        /// The invalid field number
        number: u32,
        /// Maximum valid field number
        max: u32,
    },

    /// Invalid protobuf wire format
    #[error("invalid protobuf wire format at offset {offset}: {details}")]
    InvalidWireFormat {
        /// Byte offset where the error occurred
        offset: usize,
        /// Detailed description of the issue
        details: String,
    },

    /// Failed to decode varint
    #[error("failed to decode varint at offset {offset}: buffer too small or invalid encoding")]
    VarintDecode {
        /// Byte offset where the error occurred
        offset: usize,
    },

    /// The wire data does not match the declared field shape
    #[error("field '{type_name}.{field}': expected {expected}, found {found}")]
    WireTypeMismatch {
        /// Message type being read
        type_name: String,
        /// Field name
        field: String,
        /// What the schema declares
        expected: String,
        /// What was found
        found: String,
    },

    /// A required field is absent
    #[error("required field '{type_name}.{field}' is missing")]
    MissingRequiredField {
        /// Message type being marshalled
        type_name: String,
        /// Field name
        field: String,
    },

    /// An adapter asked for a field that the schema does not declare
    #[error("type '{type_name}' has no field named '{field}'")]
    UnknownSchemaField {
        /// Message type being marshalled
        type_name: String,
        /// Requested field name
        field: String,
    },

    /// An adapter was used for a field of another type
    #[error("adapter for '{adapter}' cannot handle field of type '{expected}'")]
    AdapterMismatch {
        /// Type the adapter handles
        adapter: String,
        /// Type the field declares
        expected: String,
    },

    /// Failed to parse a binary FileDescriptorSet
    #[error("failed to parse FileDescriptorSet: {0}")]
    DescriptorParse(#[from] prost::DecodeError),

    /// Failed to build file descriptors with prost-reflect
    #[error("failed to build file descriptor: {0}")]
    DescriptorBuild(String),

    /// Generic internal error
    #[error("internal error: {0}")]
    Internal(String),
}

/// Error taxonomy used for propagation decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Inconsistent unit options, aborts only the offending unit
    ConfigurationConflict,
    /// Discovery could not admit a type, aborts the whole resolution
    DiscoveryPolicyViolation,
    /// Unit graph contains a cycle, aborts the whole resolution
    CyclicDependency,
    /// Marshalling failure, local to one read or write call
    WireFormat,
    /// Broken or unknown type metadata
    Metadata,
    /// Filesystem and parsing problems
    Io,
    /// Everything else
    Internal,
}

impl Error {
    /// Creates a new file read error
    pub fn file_read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileRead {
            path: path.into(),
            source,
        }
    }

    /// Creates a new parse error
    pub fn parse(path: impl Into<PathBuf>, details: impl ToString) -> Self {
        Self::Parse {
            path: path.into(),
            details: details.to_string(),
        }
    }

    /// Creates a new path traversal error
    pub fn path_traversal(path: impl Into<PathBuf>) -> Self {
        Self::PathTraversal { path: path.into() }
    }

    /// Creates a configuration conflict for a unit
    pub fn configuration_conflict(unit: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigurationConflict {
            unit: unit.into(),
            message: message.into(),
            type_name: None,
        }
    }

    /// Creates a configuration conflict about a specific type
    pub fn type_conflict(
        unit: impl Into<String>,
        type_name: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::ConfigurationConflict {
            unit: unit.into(),
            message: message.into(),
            type_name: Some(type_name.into()),
        }
    }

    /// Creates a discovery policy violation
    pub fn policy_violation(unit: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self::DiscoveryPolicyViolation {
            unit: unit.into(),
            type_name: type_name.into(),
        }
    }

    /// Creates a cyclic dependency error closing at `unit`
    pub fn cyclic_dependency(unit: impl Into<String>) -> Self {
        Self::CyclicDependency { unit: unit.into() }
    }

    /// Creates an invalid metadata error
    pub fn invalid_metadata(type_name: impl Into<String>, details: impl Into<String>) -> Self {
        Self::InvalidMetadata {
            type_name: type_name.into(),
            details: details.into(),
        }
    }

    /// Creates an unknown type error
    pub fn unknown_type(type_name: impl Into<String>) -> Self {
        Self::UnknownType {
            type_name: type_name.into(),
        }
    }

    /// Creates a new wire format error
    pub fn invalid_wire_format(offset: usize, details: impl Into<String>) -> Self {
        Self::InvalidWireFormat {
            offset,
            details: details.into(),
        }
    }

    /// Creates a new varint decode error
    pub fn varint_decode(offset: usize) -> Self {
        Self::VarintDecode { offset }
    }

    /// Creates a wire type mismatch error
    pub fn wire_type_mismatch(
        type_name: impl Into<String>,
        field: impl Into<String>,
        expected: impl ToString,
        found: impl ToString,
    ) -> Self {
        Self::WireTypeMismatch {
            type_name: type_name.into(),
            field: field.into(),
            expected: expected.to_string(),
            found: found.to_string(),
        }
    }

    /// Creates a missing required field error
    pub fn missing_required(type_name: impl Into<String>, field: impl Into<String>) -> Self {
        Self::MissingRequiredField {
            type_name: type_name.into(),
            field: field.into(),
        }
    }

    /// Creates an unknown schema field error
    pub fn unknown_schema_field(type_name: impl Into<String>, field: impl Into<String>) -> Self {
        Self::UnknownSchemaField {
            type_name: type_name.into(),
            field: field.into(),
        }
    }

    /// Creates a new descriptor build error
    pub fn descriptor_build(msg: impl Into<String>) -> Self {
        Self::DescriptorBuild(msg.into())
    }

    /// Creates a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Classifies this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ConfigurationConflict { .. } => ErrorCategory::ConfigurationConflict,
            Self::DiscoveryPolicyViolation { .. } => ErrorCategory::DiscoveryPolicyViolation,
            Self::CyclicDependency { .. } => ErrorCategory::CyclicDependency,
            Self::InvalidWireFormat { .. }
            | Self::VarintDecode { .. }
            | Self::WireTypeMismatch { .. }
            | Self::MissingRequiredField { .. }
            | Self::UnknownSchemaField { .. }
            | Self::AdapterMismatch { .. } => ErrorCategory::WireFormat,
            Self::InvalidMetadata { .. }
            | Self::UnknownType { .. }
            | Self::InvalidFieldNumber { .. }
            | Self::DuplicateUnit { .. }
            | Self::DescriptorParse(_)
            | Self::DescriptorBuild(_) => ErrorCategory::Metadata,
            Self::FileRead { .. } | Self::Parse { .. } | Self::PathTraversal { .. } => {
                ErrorCategory::Io
            }
            Self::Internal(_) => ErrorCategory::Internal,
        }
    }

    /// Returns true if this error invalidates the whole multi-unit resolution
    /// rather than a single unit
    pub fn aborts_project(&self) -> bool {
        !matches!(
            self.category(),
            ErrorCategory::ConfigurationConflict | ErrorCategory::WireFormat
        )
    }

    /// Converts an analysis error into a structured diagnostic
    pub fn to_diagnostic(&self) -> Option<Diagnostic> {
        match self {
            Self::ConfigurationConflict {
                unit, type_name, ..
            } => Some(Diagnostic::error(unit, self.to_string()).with_type(type_name.clone())),
            Self::DiscoveryPolicyViolation { unit, type_name } => {
                Some(Diagnostic::error(unit, self.to_string()).with_type(Some(type_name.clone())))
            }
            Self::CyclicDependency { unit } => Some(Diagnostic::error(unit, self.to_string())),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostic::Severity;

    #[test]
    fn test_error_display() {
        let err = Error::path_traversal("/etc/passwd");
        assert!(err.to_string().contains("path traversal"));
        assert!(err.to_string().contains("/etc/passwd"));
    }

    #[test]
    fn test_analysis_messages_are_verbatim() {
        assert_eq!(
            Error::cyclic_dependency("pkg.Cycle").to_string(),
            "Illegal recursive dependency on pkg.Cycle"
        );
        assert_eq!(
            Error::configuration_conflict("u", "some text").to_string(),
            "some text"
        );
        let violation = Error::policy_violation("pkg.Unit", "pkg.Inner").to_string();
        assert!(violation.starts_with("Found a reference to class pkg.Inner which was not explicitly included by pkg.Unit"));
    }

    #[test]
    fn test_aborts_project() {
        assert!(!Error::configuration_conflict("u", "x").aborts_project());
        assert!(Error::policy_violation("u", "t").aborts_project());
        assert!(Error::cyclic_dependency("u").aborts_project());
        assert!(!Error::missing_required("T", "f").aborts_project());
    }

    #[test]
    fn test_to_diagnostic() {
        let diag = Error::policy_violation("pkg.Unit", "pkg.Inner")
            .to_diagnostic()
            .unwrap();
        assert_eq!(diag.severity, Severity::Error);
        assert_eq!(diag.unit, "pkg.Unit");
        assert_eq!(diag.type_name.as_deref(), Some("pkg.Inner"));

        assert!(Error::internal("boom").to_diagnostic().is_none());
    }
}
