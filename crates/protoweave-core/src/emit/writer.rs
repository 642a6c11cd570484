//! Visitor interface over the schema IR, plus a counting implementation.

use super::ir::{EnumBlock, FieldLine, MessageBlock, SchemaFile};
use std::fmt::Result;

/// Visitor over a [`SchemaFile`].
///
/// [`SchemaFile::walk`] calls `write_file` once, then for every message
/// `write_message`, its nested definitions, its fields and `end_message`;
/// enums arrive whole through `write_enum`. All methods default to no-ops, so
/// implementations only override what they need.
///
/// # Example
///
/// ```
/// use protoweave_core::emit::{MessageBlock, ProtoWriter};
///
/// #[derive(Default)]
/// struct MessageNames(Vec<String>);
///
/// impl ProtoWriter for MessageNames {
///     fn write_message(&mut self, message: &MessageBlock) -> std::fmt::Result {
///         self.0.push(message.full_name.clone());
///         Ok(())
///     }
/// }
/// ```
pub trait ProtoWriter {
    /// Write the file header (syntax, package, imports)
    fn write_file(&mut self, file: &SchemaFile) -> Result {
        let _ = file;
        Ok(())
    }

    /// Open a message definition
    fn write_message(&mut self, message: &MessageBlock) -> Result {
        let _ = message;
        Ok(())
    }

    /// Close a message definition
    fn end_message(&mut self, message: &MessageBlock) -> Result {
        let _ = message;
        Ok(())
    }

    /// Write a field definition
    fn write_field(&mut self, field: &FieldLine) -> Result {
        let _ = field;
        Ok(())
    }

    /// Write an enum definition
    fn write_enum(&mut self, enum_type: &EnumBlock) -> Result {
        let _ = enum_type;
        Ok(())
    }
}

/// A writer that collects statistics about a schema file
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StatsWriter {
    /// Number of messages
    pub message_count: usize,
    /// Number of fields
    pub field_count: usize,
    /// Number of enums
    pub enum_count: usize,
    /// Number of imports
    pub import_count: usize,
}

impl StatsWriter {
    /// Collects statistics for one file
    pub fn of(file: &SchemaFile) -> Self {
        let mut stats = Self::default();
        // The visitor methods never fail
        let _ = file.walk(&mut stats);
        stats
    }
}

impl ProtoWriter for StatsWriter {
    fn write_file(&mut self, file: &SchemaFile) -> Result {
        self.import_count += file.imports.len();
        Ok(())
    }

    fn write_message(&mut self, _message: &MessageBlock) -> Result {
        self.message_count += 1;
        Ok(())
    }

    fn write_field(&mut self, _field: &FieldLine) -> Result {
        self.field_count += 1;
        Ok(())
    }

    fn write_enum(&mut self, _enum_type: &EnumBlock) -> Result {
        self.enum_count += 1;
        Ok(())
    }
}
