//! Utility functions for the generator module.

use super::types::{Value, ValueType};

/// Format a float for HLSL as its shortest round-trip decimal (`1`, `0.4`).
pub fn fmt_f32(v: f32) -> String {
    if v.is_finite() && v != 0.0 {
        format!("{v}")
    } else {
        "0".to_string()
    }
}

/// Substitute positional `{0}`, `{1}`, ... placeholders with value expressions.
///
/// Unknown indices and malformed braces are copied through unchanged.
pub fn format_values(template: &str, args: &[&Value]) -> String {
    let mut out = String::with_capacity(template.len() + 16 * args.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let close = after.find('}');
        let index = close.and_then(|c| after[..c].parse::<usize>().ok());
        match (close, index) {
            (Some(c), Some(i)) if i < args.len() => {
                out.push_str(&args[i].expr);
                rest = &after[c + 1..];
            }
            _ => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Coerce two values for component-wise binary operations (promoting to the wider kind).
pub fn coerce_for_binary(a: Value, b: Value) -> (Value, Value, ValueType) {
    let ty = ValueType::widest(a.ty, b.ty);
    if ty == ValueType::Void {
        return (Value::zero(ValueType::Float), Value::zero(ValueType::Float), ValueType::Float);
    }
    (a.cast(ty), b.cast(ty), ty)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fmt_f32_trims() {
        assert_eq!(fmt_f32(1.0), "1");
        assert_eq!(fmt_f32(0.25), "0.25");
        assert_eq!(fmt_f32(-0.0), "0");
        assert_eq!(fmt_f32(f32::NAN), "0");
    }

    #[test]
    fn format_values_substitutes_positions() {
        let a = Value::new(ValueType::Float, "A");
        let b = Value::new(ValueType::Float, "B");
        assert_eq!(format_values("lerp({0}, {1}, {0})", &[&a, &b]), "lerp(A, B, A)");
        assert_eq!(format_values("{x} {5}", &[&a]), "{x} {5}");
    }

    #[test]
    fn coerce_promotes_scalar() {
        let (a, b, ty) = coerce_for_binary(
            Value::new(ValueType::Float, "s"),
            Value::new(ValueType::Float2, "v"),
        );
        assert_eq!(ty, ValueType::Float2);
        assert_eq!(a.expr, "float2(s,s)");
        assert_eq!(b.expr, "v");
    }
}
