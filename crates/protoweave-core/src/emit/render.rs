use super::ir::{EnumBlock, FieldLine, MessageBlock, SchemaFile};
use super::writer::ProtoWriter;
use std::fmt::Write as FmtWrite;

/// Configuration for schema text rendering
#[derive(Debug, Clone)]
pub struct RenderConfig {
    /// Indentation string (default: 3 spaces)
    pub indent_str: String,
    /// Emit a header comment naming the unit and a comment per definition
    /// naming its source type
    pub include_comments: bool,
    /// Sort fields by number
    pub sort_fields: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            indent_str: "   ".to_string(),
            include_comments: true,
            sort_fields: false,
        }
    }
}

impl RenderConfig {
    /// Default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the indentation string
    pub fn indent(mut self, indent: impl Into<String>) -> Self {
        self.indent_str = indent.into();
        self
    }

    /// Toggles unit and source-type comments
    pub fn include_comments(mut self, include: bool) -> Self {
        self.include_comments = include;
        self
    }

    /// Emits fields by number instead of declaration order
    pub fn sort_fields(mut self, sort: bool) -> Self {
        self.sort_fields = sort;
        self
    }
}

/// Renders a [`SchemaFile`] as proto2 source text
pub struct ProtoRenderer<'a, W: FmtWrite> {
    writer: &'a mut W,
    config: &'a RenderConfig,
    indent_level: usize,
    // Fields of the open message, flushed by `end_message` so nested
    // definitions come first
    pending: Vec<Vec<FieldLine>>,
}

impl<'a, W: FmtWrite> ProtoRenderer<'a, W> {
    /// Creates a renderer writing to `writer`
    pub fn new(writer: &'a mut W, config: &'a RenderConfig) -> Self {
        Self {
            writer,
            config,
            indent_level: 0,
            pending: Vec::new(),
        }
    }

    fn indent(&mut self) {
        self.indent_level += 1;
    }

    fn dedent(&mut self) {
        self.indent_level = self.indent_level.saturating_sub(1);
    }

    fn write_indent(&mut self) -> std::fmt::Result {
        for _ in 0..self.indent_level {
            write!(self.writer, "{}", self.config.indent_str)?;
        }
        Ok(())
    }

    fn writeln(&mut self, s: &str) -> std::fmt::Result {
        self.write_indent()?;
        writeln!(self.writer, "{}", s)
    }

    fn write_source_comment(&mut self, source: &str, full_name: &str) -> std::fmt::Result {
        if self.config.include_comments && source != full_name {
            self.writeln(&format!("// {}", source))?;
        }
        Ok(())
    }
}

impl<W: FmtWrite> ProtoWriter for ProtoRenderer<'_, W> {
    fn write_file(&mut self, file: &SchemaFile) -> std::fmt::Result {
        if self.config.include_comments {
            writeln!(self.writer, "// Schema unit {}", file.unit)?;
            writeln!(self.writer)?;
        }

        writeln!(self.writer, "syntax = \"proto2\";")?;
        writeln!(self.writer)?;

        if let Some(package) = &file.package {
            writeln!(self.writer, "package {};", package)?;
            writeln!(self.writer)?;
        }

        if !file.imports.is_empty() {
            for import in &file.imports {
                writeln!(self.writer, "import {};", quote(import))?;
            }
            writeln!(self.writer)?;
        }

        Ok(())
    }

    fn write_message(&mut self, message: &MessageBlock) -> std::fmt::Result {
        self.write_source_comment(&message.source, &message.full_name)?;
        self.writeln(&format!("message {} {{", message.name))?;
        self.indent();
        self.pending.push(Vec::new());
        Ok(())
    }

    fn write_field(&mut self, field: &FieldLine) -> std::fmt::Result {
        match self.pending.last_mut() {
            Some(fields) => fields.push(field.clone()),
            None => return Err(std::fmt::Error),
        }
        Ok(())
    }

    fn end_message(&mut self, _message: &MessageBlock) -> std::fmt::Result {
        let mut fields = self.pending.pop().ok_or(std::fmt::Error)?;
        if self.config.sort_fields {
            fields.sort_by_key(|f| f.number);
        }

        for field in &fields {
            self.write_indent()?;
            writeln!(
                self.writer,
                "{} {} {} = {};",
                field.label.as_str(),
                field.field_type,
                field.name,
                field.number
            )?;
        }

        self.dedent();
        self.writeln("}")?;
        writeln!(self.writer)?;
        Ok(())
    }

    fn write_enum(&mut self, enum_type: &EnumBlock) -> std::fmt::Result {
        self.write_source_comment(&enum_type.source, &enum_type.full_name)?;
        self.writeln(&format!("enum {} {{", enum_type.name))?;
        self.indent();

        for value in &enum_type.values {
            self.write_indent()?;
            writeln!(self.writer, "{} = {};", value.name, value.number)?;
        }

        self.dedent();
        self.writeln("}")?;
        writeln!(self.writer)?;
        Ok(())
    }
}

/// Renders a schema file to a string
pub fn render(file: &SchemaFile, config: &RenderConfig) -> String {
    let mut output = String::new();
    let mut renderer = ProtoRenderer::new(&mut output, config);
    // Writing into a String only fails on unbalanced visitor calls, which
    // `walk` never produces
    let _ = file.walk(&mut renderer);
    output
}

/// Quotes an import path as a proto string literal
fn quote(path: &str) -> String {
    let mut quoted = String::with_capacity(path.len() + 2);
    quoted.push('"');
    for c in path.chars() {
        if matches!(c, '"' | '\\') {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emit::ir::{EnumLine, FieldLabel, FieldType, SchemaItem};
    use crate::metadata::ScalarType;
    use pretty_assertions::assert_eq;

    fn field(label: FieldLabel, field_type: FieldType, name: &str, number: u32) -> FieldLine {
        FieldLine {
            label,
            field_type,
            name: name.into(),
            number,
        }
    }

    fn sample() -> SchemaFile {
        SchemaFile {
            unit: "test_nested.NestedInitializer".into(),
            file_name: "nested.proto".into(),
            package: Some("nested".into()),
            imports: vec!["common/Common.proto".into()],
            items: vec![SchemaItem::Message(MessageBlock {
                name: "OuterMessage2".into(),
                full_name: "nested.OuterMessage2".into(),
                source: "test_nested.OuterMessage2".into(),
                fields: vec![
                    field(FieldLabel::Repeated, FieldType::Message("nested.OuterMessage2.InnerMessage2".into()), "inner", 2),
                    field(FieldLabel::Optional, FieldType::Scalar(ScalarType::String), "baseField1", 1),
                ],
                nested: vec![
                    SchemaItem::Message(MessageBlock {
                        name: "InnerMessage2".into(),
                        full_name: "nested.OuterMessage2.InnerMessage2".into(),
                        source: "test_nested.OuterMessage2.InnerMessage2".into(),
                        fields: vec![field(FieldLabel::Required, FieldType::Scalar(ScalarType::Int32), "value", 1)],
                        nested: Vec::new(),
                    }),
                    SchemaItem::Enum(EnumBlock {
                        name: "Color".into(),
                        full_name: "nested.OuterMessage2.Color".into(),
                        source: "test_nested.OuterMessage2.Color".into(),
                        values: vec![
                            EnumLine { name: "RED".into(), number: 0 },
                            EnumLine { name: "GREEN".into(), number: 1 },
                        ],
                    }),
                ],
            })],
        }
    }

    #[test]
    fn test_render() {
        let config = RenderConfig::new().indent("  ").include_comments(false).sort_fields(true);
        let expected = "\
syntax = \"proto2\";

package nested;

import \"common/Common.proto\";

message OuterMessage2 {
  message InnerMessage2 {
    required int32 value = 1;
  }

  enum Color {
    RED = 0;
    GREEN = 1;
  }

  optional string baseField1 = 1;
  repeated nested.OuterMessage2.InnerMessage2 inner = 2;
}

";
        assert_eq!(render(&sample(), &config), expected);
    }

    #[test]
    fn test_render_comments() {
        let text = render(&sample(), &RenderConfig::default());
        assert!(text.starts_with("// Schema unit test_nested.NestedInitializer\n"));
        assert!(text.contains("// test_nested.OuterMessage2\nmessage OuterMessage2 {"));
        assert!(text.contains("   // test_nested.OuterMessage2.InnerMessage2\n   message InnerMessage2 {"));
        // Declaration order when not sorting
        let inner = text.find("inner = 2").unwrap();
        let base = text.find("baseField1 = 1").unwrap();
        assert!(inner < base);
    }

    #[test]
    fn test_quote() {
        assert_eq!(quote("first/First.proto"), "\"first/First.proto\"");
        assert_eq!(quote("odd\"name"), "\"odd\\\"name\"");
    }
}
