//! Core type definitions for the material generator.
//!
//! A [`Value`] is a typed HLSL expression. Casting between kinds is total:
//! every pair of [`ValueType`]s has a wrapper expression, and conversions that
//! make no sense (matrix to vector, texture to scalar, ...) fall back to the
//! zero value of the target kind.

use serde::{Deserialize, Serialize};

use super::utils::fmt_f32;

/// HLSL value kind of a shader expression.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueType {
    Bool,
    Int,
    Uint,
    Float,
    Float2,
    Float3,
    Float4,
    Quaternion,
    Matrix,
    /// Opaque handles: textures and material-layer structs.
    Object,
    /// No value. On an input box this means "accept any kind without coercion".
    Void,
}

impl ValueType {
    /// Returns the HLSL type name for this value type.
    pub fn hlsl(self) -> &'static str {
        match self {
            ValueType::Bool => "bool",
            ValueType::Int => "int",
            ValueType::Uint => "uint",
            ValueType::Float => "float",
            ValueType::Float2 => "float2",
            ValueType::Float3 => "float3",
            ValueType::Float4 | ValueType::Quaternion => "float4",
            ValueType::Matrix => "float4x4",
            ValueType::Object => "Texture2D",
            ValueType::Void => "void",
        }
    }

    /// Number of scalar components (0 for objects and void).
    pub fn components(self) -> u32 {
        match self {
            ValueType::Bool | ValueType::Int | ValueType::Uint | ValueType::Float => 1,
            ValueType::Float2 => 2,
            ValueType::Float3 => 3,
            ValueType::Float4 | ValueType::Quaternion => 4,
            ValueType::Matrix => 16,
            ValueType::Object | ValueType::Void => 0,
        }
    }

    pub fn is_scalar(self) -> bool {
        matches!(
            self,
            ValueType::Bool | ValueType::Int | ValueType::Uint | ValueType::Float
        )
    }

    pub fn is_vector(self) -> bool {
        matches!(
            self,
            ValueType::Float2 | ValueType::Float3 | ValueType::Float4 | ValueType::Quaternion
        )
    }

    /// Float vector kind with `n` components (1 maps to `Float`).
    pub fn float_vector(n: u32) -> ValueType {
        match n {
            0 | 1 => ValueType::Float,
            2 => ValueType::Float2,
            3 => ValueType::Float3,
            _ => ValueType::Float4,
        }
    }

    /// Result kind of a component-wise binary operation between `a` and `b`.
    ///
    /// Scalars promote to the vector kind; between two vectors the wider wins.
    pub fn widest(a: ValueType, b: ValueType) -> ValueType {
        if a == b {
            return a;
        }
        if a == ValueType::Void {
            return b;
        }
        if b == ValueType::Void {
            return a;
        }
        match (a.components(), b.components()) {
            (ca, cb) if ca == 0 || cb == 0 => ValueType::Void,
            (1, 1) => {
                // bool < int < uint < float
                let rank = |t: ValueType| match t {
                    ValueType::Bool => 0,
                    ValueType::Int => 1,
                    ValueType::Uint => 2,
                    _ => 3,
                };
                if rank(a) >= rank(b) { a } else { b }
            }
            (16, _) | (_, 16) => ValueType::Matrix,
            (ca, cb) => ValueType::float_vector(ca.max(cb)),
        }
    }
}

/// A typed HLSL expression.
///
/// The expression is either an identifier (a previously written local, a
/// parameter, an input member), a literal, or a parenthesized compound, so it
/// can be inlined into any arithmetic context.
#[derive(Clone, Debug, PartialEq)]
pub struct Value {
    pub ty: ValueType,
    pub expr: String,
}

const SWIZZLE: [char; 4] = ['x', 'y', 'z', 'w'];

impl Value {
    pub fn new(ty: ValueType, expr: impl Into<String>) -> Self {
        Self {
            ty,
            expr: expr.into(),
        }
    }

    /// The invalid value (no expression).
    pub fn null() -> Self {
        Self::new(ValueType::Void, "")
    }

    pub fn is_valid(&self) -> bool {
        !self.expr.is_empty()
    }

    pub fn bool(v: bool) -> Self {
        Self::new(ValueType::Bool, if v { "true" } else { "false" })
    }

    pub fn int(v: i32) -> Self {
        Self::new(ValueType::Int, v.to_string())
    }

    pub fn uint(v: u32) -> Self {
        Self::new(ValueType::Uint, v.to_string())
    }

    pub fn float(v: f32) -> Self {
        Self::new(ValueType::Float, fmt_f32(v))
    }

    pub fn float2(v: [f32; 2]) -> Self {
        Self::new(ValueType::Float2, vector_literal("float2", &v))
    }

    pub fn float3(v: [f32; 3]) -> Self {
        Self::new(ValueType::Float3, vector_literal("float3", &v))
    }

    pub fn float4(v: [f32; 4]) -> Self {
        Self::new(ValueType::Float4, vector_literal("float4", &v))
    }

    /// Literal with every component set to `v`, for any kind.
    fn splat_literal(ty: ValueType, v: f32) -> Self {
        match ty {
            ValueType::Bool => Self::bool(v != 0.0),
            ValueType::Int => Self::int(v as i32),
            ValueType::Uint => Self::uint(v.max(0.0) as u32),
            ValueType::Float => Self::float(v),
            ValueType::Float2 => Self::float2([v; 2]),
            ValueType::Float3 => Self::float3([v; 3]),
            ValueType::Float4 => Self::float4([v; 4]),
            ValueType::Quaternion => {
                Self::new(ValueType::Quaternion, vector_literal("float4", &[0.0, 0.0, 0.0, 1.0]))
            }
            ValueType::Matrix => {
                if v == 0.0 {
                    Self::new(ValueType::Matrix, "(float4x4)0")
                } else {
                    Self::new(
                        ValueType::Matrix,
                        "float4x4(1,0,0,0,0,1,0,0,0,0,1,0,0,0,0,1)",
                    )
                }
            }
            ValueType::Object | ValueType::Void => Self::null(),
        }
    }

    /// Zero of the given kind. Quaternions zero to identity; objects have no zero.
    pub fn zero(ty: ValueType) -> Self {
        Self::splat_literal(ty, 0.0)
    }

    pub fn one(ty: ValueType) -> Self {
        Self::splat_literal(ty, 1.0)
    }

    pub fn half(ty: ValueType) -> Self {
        match ty {
            ValueType::Float | ValueType::Float2 | ValueType::Float3 | ValueType::Float4 => {
                Self::splat_literal(ty, 0.5)
            }
            other => Self::zero(other),
        }
    }

    /// Convert to `to`. Never fails; illegal conversions yield `zero(to)`.
    pub fn cast(&self, to: ValueType) -> Value {
        use ValueType as T;
        let from = self.ty;
        if from == to || to == T::Void {
            return self.clone();
        }
        if !self.is_valid() {
            return Value::zero(to);
        }
        if let Some(folded) = self.fold_literal(to) {
            return folded;
        }
        let e = &self.expr;
        match (from, to) {
            // scalar <-> scalar
            (f, t) if f.is_scalar() && t.is_scalar() => {
                if t == T::Bool {
                    Value::new(t, format!("({e} != 0)"))
                } else {
                    Value::new(t, format!("({})({})", t.hlsl(), e))
                }
            }
            // scalar -> vector
            (f, t) if f.is_scalar() && matches!(t, T::Float2 | T::Float3 | T::Float4) => {
                let n = t.components() as usize;
                let parts = vec![e.as_str(); n].join(",");
                Value::new(t, format!("{}({})", t.hlsl(), parts))
            }
            (f, T::Quaternion) if f.is_scalar() => Value::zero(T::Quaternion),
            // vector -> scalar
            (f, t) if f.is_vector() && t.is_scalar() => {
                let x = format!("{e}.x");
                if t == T::Float {
                    Value::new(t, x)
                } else {
                    Value::new(T::Float, x).cast(t)
                }
            }
            (T::Quaternion, T::Float4) | (T::Float4, T::Quaternion) => Value::new(to, e.clone()),
            (T::Float3, T::Quaternion) | (T::Float2, T::Quaternion) => Value::zero(T::Quaternion),
            // vector -> vector
            (f, t) if f.is_vector() && t.is_vector() => {
                let (fc, tc) = (f.components(), t.components());
                if tc < fc {
                    let mask: String = SWIZZLE[..tc as usize].iter().collect();
                    Value::new(t, format!("{e}.{mask}"))
                } else {
                    let pad = vec!["0"; (tc - fc) as usize].join(",");
                    Value::new(t, format!("{}({},{})", t.hlsl(), e, pad))
                }
            }
            _ => Value::zero(to),
        }
    }

    /// Cast a float literal by rewriting its components instead of wrapping it.
    fn fold_literal(&self, to: ValueType) -> Option<Value> {
        let is_float = |t: ValueType| {
            matches!(
                t,
                ValueType::Float | ValueType::Float2 | ValueType::Float3 | ValueType::Float4
            )
        };
        if !is_float(self.ty) || !is_float(to) {
            return None;
        }
        let c = literal_components(&self.expr)?;
        let n = to.components() as usize;
        let parts: Vec<f32> = if c.len() == 1 {
            vec![c[0]; n]
        } else {
            (0..n).map(|i| c.get(i).copied().unwrap_or(0.0)).collect()
        };
        Some(match to {
            ValueType::Float => Value::float(parts[0]),
            _ => Value::new(to, vector_literal(to.hlsl(), &parts)),
        })
    }

    /// Append a component selection (`x`, `xy`, `zw`, `rgb`, ...).
    pub fn swizzle(&self, mask: &str) -> Value {
        let n = mask.chars().count() as u32;
        if !self.is_valid() || n == 0 || n > 4 {
            return Value::zero(ValueType::float_vector(n.max(1)));
        }
        if self.ty.is_scalar() {
            // Swizzles on scalars replicate the value.
            return self.cast(ValueType::float_vector(n));
        }
        Value::new(ValueType::float_vector(n), format!("{}.{}", self.expr, mask))
    }

    /// Single component `i` (0..4) as a float.
    pub fn component(&self, i: usize) -> Value {
        match SWIZZLE.get(i) {
            Some(c) if (i as u32) < self.ty.components() => self.swizzle(&c.to_string()),
            _ => Value::zero(ValueType::Float),
        }
    }

    /// True if the expression is a canonical literal whose every component is 0.
    pub fn is_zero_literal(&self) -> bool {
        literal_components(&self.expr).is_some_and(|c| c.iter().all(|v| *v == 0.0))
    }

    /// True if the expression is a canonical literal whose every component is 1.
    pub fn is_one_literal(&self) -> bool {
        literal_components(&self.expr).is_some_and(|c| c.iter().all(|v| *v == 1.0))
    }
}

fn vector_literal(ctor: &str, v: &[f32]) -> String {
    let parts: Vec<String> = v.iter().copied().map(fmt_f32).collect();
    format!("{ctor}({})", parts.join(","))
}

/// Parse a scalar or `floatN(...)` literal into its components.
fn literal_components(expr: &str) -> Option<Vec<f32>> {
    let s = expr.trim();
    match s {
        "true" => return Some(vec![1.0]),
        "false" => return Some(vec![0.0]),
        _ => {}
    }
    if let Some(v) = parse_scalar_literal(s) {
        return Some(vec![v]);
    }
    let inner = ["float2(", "float3(", "float4("]
        .iter()
        .find_map(|p| s.strip_prefix(p))?
        .strip_suffix(')')?;
    inner.split(',').map(|p| parse_scalar_literal(p.trim())).collect()
}

fn parse_scalar_literal(s: &str) -> Option<f32> {
    let s = s.trim_end_matches(['f', 'u']);
    if s.is_empty() {
        return None;
    }
    s.parse::<f32>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn float_literals_are_trimmed() {
        assert_eq!(Value::float(0.4).expr, "0.4");
        assert_eq!(Value::float3([0.5, 0.5, 0.5]).expr, "float3(0.5,0.5,0.5)");
        assert_eq!(Value::zero(ValueType::Float).expr, "0");
    }

    #[test]
    fn cast_scalar_to_vector_replicates() {
        let v = Value::new(ValueType::Float, "x").cast(ValueType::Float3);
        assert_eq!(v.expr, "float3(x,x,x)");
        assert_eq!(v.ty, ValueType::Float3);
    }

    #[test]
    fn cast_vector_narrowing_uses_swizzle() {
        let v = Value::new(ValueType::Float4, "v").cast(ValueType::Float3);
        assert_eq!(v.expr, "v.xyz");
        let s = Value::new(ValueType::Float3, "v").cast(ValueType::Float);
        assert_eq!(s.expr, "v.x");
    }

    #[test]
    fn cast_vector_widening_pads_with_zero() {
        let v = Value::new(ValueType::Float2, "uv").cast(ValueType::Float3);
        assert_eq!(v.expr, "float3(uv,0)");
    }

    #[test]
    fn literal_casts_fold() {
        assert_eq!(Value::zero(ValueType::Float4).cast(ValueType::Float3).expr, "float3(0,0,0)");
        assert_eq!(Value::float(0.5).cast(ValueType::Float2).expr, "float2(0.5,0.5)");
        assert_eq!(Value::float2([1.0, 2.0]).cast(ValueType::Float4).expr, "float4(1,2,0,0)");
        assert_eq!(Value::float3([0.25, 1.0, 0.0]).cast(ValueType::Float).expr, "0.25");
    }

    #[test]
    fn illegal_cast_is_zero_of_target() {
        let m = Value::new(ValueType::Matrix, "m").cast(ValueType::Float3);
        assert_eq!(m, Value::zero(ValueType::Float3));
        let o = Value::new(ValueType::Object, "Param1").cast(ValueType::Float);
        assert_eq!(o, Value::zero(ValueType::Float));
    }

    #[test]
    fn literal_detection() {
        assert!(Value::zero(ValueType::Float3).is_zero_literal());
        assert!(Value::new(ValueType::Float, "0.0").is_zero_literal());
        assert!(Value::one(ValueType::Float).is_one_literal());
        assert!(!Value::new(ValueType::Float, "Local1").is_zero_literal());
        assert!(!Value::float3([1.0, 0.0, 1.0]).is_one_literal());
    }

    #[test]
    fn widest_promotes_scalars() {
        assert_eq!(ValueType::widest(ValueType::Float, ValueType::Float3), ValueType::Float3);
        assert_eq!(ValueType::widest(ValueType::Float2, ValueType::Float4), ValueType::Float4);
        assert_eq!(ValueType::widest(ValueType::Int, ValueType::Float), ValueType::Float);
    }
}
