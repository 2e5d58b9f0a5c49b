//! Append-only HLSL text sink used while walking a graph.

use std::fmt::Write as _;

use super::types::{Value, ValueType};
use super::utils::format_values;

/// Prefix of generated local variables.
pub const LOCAL_PREFIX: &str = "Local";

/// Text buffer for one function body plus the per-compilation local counter.
///
/// Locals are numbered monotonically across the whole compilation so a name
/// is never reused even though each shader tree gets its own body.
#[derive(Debug, Default)]
pub struct ShaderWriter {
    text: String,
    locals: u32,
    indent: usize,
    node_comments: bool,
}

impl ShaderWriter {
    pub fn new() -> Self {
        Self {
            indent: 1,
            ..Self::default()
        }
    }

    /// Annotate each emitted local with the id of the node that produced it.
    pub fn with_node_comments(mut self, enabled: bool) -> Self {
        self.node_comments = enabled;
        self
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Move the buffered text out, keeping the local counter.
    pub fn take(&mut self) -> String {
        std::mem::take(&mut self.text)
    }

    pub fn local_count(&self) -> u32 {
        self.locals
    }

    pub fn push_indent(&mut self) {
        self.indent += 1;
    }

    pub fn pop_indent(&mut self) {
        self.indent = self.indent.saturating_sub(1);
    }

    /// Write one line at the current indentation.
    pub fn write_line(&mut self, line: &str) {
        for _ in 0..self.indent {
            self.text.push('\t');
        }
        self.text.push_str(line);
        self.text.push('\n');
    }

    /// Write a line with `{i}` placeholders replaced by value expressions.
    pub fn write(&mut self, template: &str, args: &[&Value]) {
        let line = format_values(template, args);
        for l in line.lines() {
            self.write_line(l);
        }
    }

    /// Reserve a new unique local name without writing anything.
    pub fn next_local_name(&mut self) -> String {
        self.locals += 1;
        format!("{LOCAL_PREFIX}{}", self.locals)
    }

    /// Declare `<type> LocalN = <init>;` and return the new local.
    ///
    /// A missing initializer declares the zero of `ty`.
    pub fn write_local(&mut self, ty: ValueType, init: Option<&str>, node: Option<u32>) -> Value {
        let name = self.next_local_name();
        let zero;
        let init = match init {
            Some(i) => i,
            None => {
                zero = Value::zero(ty);
                if zero.is_valid() { zero.expr.as_str() } else { "0" }
            }
        };
        let mut line = format!("{} {} = {};", ty.hlsl(), name, init);
        if self.node_comments {
            if let Some(id) = node {
                let _ = write!(line, " // node {id}");
            }
        }
        self.write_line(&line);
        Value::new(ty, name)
    }

    /// Declare a local of a custom HLSL type (for example a struct), zero-initialized.
    pub fn write_struct_local(&mut self, type_name: &str, ty: ValueType) -> Value {
        let name = self.next_local_name();
        self.write_line(&format!("{type_name} {name} = ({type_name})0;"));
        Value::new(ty, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locals_are_numbered_across_takes() {
        let mut w = ShaderWriter::new();
        let a = w.write_local(ValueType::Float4, Some("Param1.Sample(SamplerLinearWrap, uv)"), None);
        assert_eq!(a.expr, "Local1");
        let first = w.take();
        assert_eq!(first, "\tfloat4 Local1 = Param1.Sample(SamplerLinearWrap, uv);\n");
        let b = w.write_local(ValueType::Float, None, None);
        assert_eq!(b.expr, "Local2");
        assert_eq!(w.text(), "\tfloat Local2 = 0;\n");
    }

    #[test]
    fn node_comments_are_optional() {
        let mut w = ShaderWriter::new().with_node_comments(true);
        w.write_local(ValueType::Float2, Some("uv"), Some(7));
        assert!(w.text().ends_with("// node 7\n"));
    }

    #[test]
    fn write_substitutes_values() {
        let mut w = ShaderWriter::new();
        let v = Value::new(ValueType::Float, "Local3");
        w.write("material.Roughness = {0};", &[&v]);
        assert_eq!(w.text(), "\tmaterial.Roughness = Local3;\n");
    }
}
