//! Compilers for constants and math operations (group 5, subtypes below 60).
//!
//! Binary nodes read `a`/`b` from boxes 0/1 and output on box 2; unary nodes
//! read box 0 and output on box 1. Unconnected operands fall back to the
//! literal stored in `values[box]`. Results are inline expressions: math never
//! emits locals.

use super::super::compilation::Compilation;
use super::super::types::{Value, ValueType};
use super::super::utils::{coerce_for_binary, format_values};
use crate::graph::{Node, NodeBox};

pub const CONSTANT_BOOL: u16 = 1;
pub const CONSTANT_INT: u16 = 2;
pub const CONSTANT_FLOAT: u16 = 3;
pub const CONSTANT_FLOAT2: u16 = 4;
pub const CONSTANT_FLOAT3: u16 = 5;
pub const CONSTANT_FLOAT4: u16 = 6;
pub const CONSTANT_COLOR: u16 = 7;
pub const CONSTANT_UINT: u16 = 8;
pub const CONSTANT_PI: u16 = 9;

/// Operation table indexed by `subtype - 20`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MathOp {
    Add,
    Subtract,
    Multiply,
    Modulo,
    Divide,
    Abs,
    Ceil,
    Cos,
    Floor,
    Normalize,
    Round,
    Saturate,
    Sin,
    Sqrt,
    Tan,
    Cross,
    Distance,
    Dot,
    Max,
    Min,
    Power,
    Reflect,
    Length,
    Negate,
    OneMinus,
    Lerp,
    Clamp,
    Step,
    Smoothstep,
    Frac,
    Exp,
    Log,
    Atan2,
}

impl MathOp {
    const TABLE: [MathOp; 33] = [
        MathOp::Add,
        MathOp::Subtract,
        MathOp::Multiply,
        MathOp::Modulo,
        MathOp::Divide,
        MathOp::Abs,
        MathOp::Ceil,
        MathOp::Cos,
        MathOp::Floor,
        MathOp::Normalize,
        MathOp::Round,
        MathOp::Saturate,
        MathOp::Sin,
        MathOp::Sqrt,
        MathOp::Tan,
        MathOp::Cross,
        MathOp::Distance,
        MathOp::Dot,
        MathOp::Max,
        MathOp::Min,
        MathOp::Power,
        MathOp::Reflect,
        MathOp::Length,
        MathOp::Negate,
        MathOp::OneMinus,
        MathOp::Lerp,
        MathOp::Clamp,
        MathOp::Step,
        MathOp::Smoothstep,
        MathOp::Frac,
        MathOp::Exp,
        MathOp::Log,
        MathOp::Atan2,
    ];

    pub const FIRST_SUBTYPE: u16 = 20;

    pub fn from_subtype(subtype: u16) -> Option<MathOp> {
        let i = subtype.checked_sub(Self::FIRST_SUBTYPE)?;
        Self::TABLE.get(i as usize).copied()
    }

    pub fn subtype(self) -> u16 {
        Self::FIRST_SUBTYPE + Self::TABLE.iter().position(|o| *o == self).unwrap_or(0) as u16
    }

    fn unary_function(self) -> Option<&'static str> {
        Some(match self {
            MathOp::Abs => "abs",
            MathOp::Ceil => "ceil",
            MathOp::Cos => "cos",
            MathOp::Floor => "floor",
            MathOp::Normalize => "normalize",
            MathOp::Round => "round",
            MathOp::Saturate => "saturate",
            MathOp::Sin => "sin",
            MathOp::Sqrt => "sqrt",
            MathOp::Tan => "tan",
            MathOp::Frac => "frac",
            MathOp::Exp => "exp",
            MathOp::Log => "log",
            _ => return None,
        })
    }
}

pub fn compile(comp: &mut Compilation, node: &Node, out_box: &NodeBox, subtype: u16) -> Value {
    if subtype < MathOp::FIRST_SUBTYPE {
        return compile_constant(comp, node, out_box, subtype);
    }
    match MathOp::from_subtype(subtype) {
        Some(op) => compile_math(comp, node, op),
        None => super::unsupported(comp, node, out_box),
    }
}

/// Operand from input `box_id`, or the node literal, or a float zero.
pub(crate) fn operand(comp: &mut Compilation, node: &Node, box_id: u32) -> Value {
    let v = comp.try_get_value_or_literal(node, box_id, box_id as usize);
    if v.is_valid() { v } else { Value::float(0.0) }
}

fn compile_constant(comp: &mut Compilation, node: &Node, out_box: &NodeBox, subtype: u16) -> Value {
    let value = match subtype {
        CONSTANT_BOOL => Value::bool(node.value_bool(0, false)),
        CONSTANT_INT => Value::int(node.value_i32(0, 0)),
        CONSTANT_UINT => Value::uint(node.value_i32(0, 0).max(0) as u32),
        CONSTANT_FLOAT => Value::float(node.value_f32(0, 0.0)),
        CONSTANT_PI => Value::float(std::f32::consts::PI),
        CONSTANT_FLOAT2 | CONSTANT_FLOAT3 | CONSTANT_FLOAT4 | CONSTANT_COLOR => {
            let ty = match subtype {
                CONSTANT_FLOAT2 => ValueType::Float2,
                CONSTANT_FLOAT3 => ValueType::Float3,
                _ => ValueType::Float4,
            };
            let v = node.value(0).map(|v| v.to_value()).unwrap_or_else(Value::null);
            if v.is_valid() { v.cast(ty) } else { Value::zero(ty) }
        }
        _ => return super::unsupported(comp, node, out_box),
    };
    // Vector constants expose their components on boxes 1..=4.
    match out_box.id {
        0 => value,
        id @ 1..=4 => value.component(id as usize - 1),
        _ => value,
    }
}

fn compile_math(comp: &mut Compilation, node: &Node, op: MathOp) -> Value {
    if let Some(func) = op.unary_function() {
        let a = operand(comp, node, 0);
        return Value::new(a.ty, format!("{func}({})", a.expr));
    }
    match op {
        MathOp::Add => binary_operator(comp, node, "+"),
        MathOp::Subtract => binary_operator(comp, node, "-"),
        MathOp::Multiply => binary_operator(comp, node, "*"),
        MathOp::Divide => binary_operator(comp, node, "/"),
        MathOp::Modulo => binary_function(comp, node, "fmod({0}, {1})"),
        MathOp::Max => binary_function(comp, node, "max({0}, {1})"),
        MathOp::Min => binary_function(comp, node, "min({0}, {1})"),
        MathOp::Power => binary_function(comp, node, "pow({0}, {1})"),
        MathOp::Reflect => binary_function(comp, node, "reflect({0}, {1})"),
        MathOp::Step => binary_function(comp, node, "step({0}, {1})"),
        MathOp::Atan2 => binary_function(comp, node, "atan2({0}, {1})"),
        MathOp::Cross => {
            let a = operand(comp, node, 0).cast(ValueType::Float3);
            let b = operand(comp, node, 1).cast(ValueType::Float3);
            Value::new(ValueType::Float3, format_values("cross({0}, {1})", &[&a, &b]))
        }
        MathOp::Distance | MathOp::Dot => {
            let a = operand(comp, node, 0);
            let b = operand(comp, node, 1);
            let (a, b, _) = coerce_for_binary(a, b);
            let f = if op == MathOp::Dot { "dot" } else { "distance" };
            Value::new(ValueType::Float, format!("{f}({}, {})", a.expr, b.expr))
        }
        MathOp::Length => {
            let a = operand(comp, node, 0);
            Value::new(ValueType::Float, format!("length({})", a.expr))
        }
        MathOp::Negate => {
            let a = operand(comp, node, 0);
            Value::new(a.ty, format!("(-{})", a.expr))
        }
        MathOp::OneMinus => {
            let a = operand(comp, node, 0);
            Value::new(a.ty, format!("(1 - {})", a.expr))
        }
        MathOp::Lerp => {
            let a = operand(comp, node, 0);
            let b = operand(comp, node, 1);
            let (a, b, ty) = coerce_for_binary(a, b);
            let alpha = operand(comp, node, 2);
            let alpha = if alpha.ty.is_scalar() { alpha.cast(ValueType::Float) } else { alpha.cast(ty) };
            Value::new(ty, format_values("lerp({0}, {1}, {2})", &[&a, &b, &alpha]))
        }
        MathOp::Clamp | MathOp::Smoothstep => {
            let x = operand(comp, node, 0);
            let lo = operand(comp, node, 1);
            let hi = operand(comp, node, 2);
            let ty = ValueType::widest(ValueType::widest(x.ty, lo.ty), hi.ty);
            let ty = if ty == ValueType::Void { ValueType::Float } else { ty };
            let (x, lo, hi) = (x.cast(ty), lo.cast(ty), hi.cast(ty));
            let template = if op == MathOp::Clamp {
                "clamp({0}, {1}, {2})"
            } else {
                // Boxes are min, max, x.
                "smoothstep({0}, {1}, {2})"
            };
            Value::new(ty, format_values(template, &[&x, &lo, &hi]))
        }
        _ => Value::float(0.0),
    }
}

fn binary_operator(comp: &mut Compilation, node: &Node, op: &str) -> Value {
    let a = operand(comp, node, 0);
    let b = operand(comp, node, 1);
    let (a, b, ty) = coerce_for_binary(a, b);
    Value::new(ty, format!("({} {op} {})", a.expr, b.expr))
}

fn binary_function(comp: &mut Compilation, node: &Node, template: &str) -> Value {
    let a = operand(comp, node, 0);
    let b = operand(comp, node, 1);
    let (a, b, ty) = coerce_for_binary(a, b);
    Value::new(ty, format_values(template, &[&a, &b]))
}
