//! Compilers for built-in material inputs (group 1): geometry, view, screen,
//! custom code, derivatives and vector space transforms.

use super::super::compilation::{Compilation, ShaderTree};
use super::super::types::{Value, ValueType};
use super::{function_nodes, texture_nodes};
use crate::graph::{Node, NodeBox};
use crate::material_info::UsageFlags;

pub const MATERIAL_OUTPUT: u16 = 1;
pub const WORLD_POSITION: u16 = 2;
pub const VIEW: u16 = 3;
pub const NORMAL: u16 = 4;
pub const CAMERA_VECTOR: u16 = 5;
pub const SCREEN_POSITION: u16 = 6;
pub const SCREEN_SIZE: u16 = 7;
pub const CUSTOM_CODE: u16 = 8;
pub const OBJECT_POSITION: u16 = 9;
pub const TWO_SIDED_SIGN: u16 = 10;
pub const CAMERA_DISTANCE: u16 = 11;
pub const VERTEX_COLOR: u16 = 13;
pub const PRE_SKINNED_POSITION: u16 = 14;
pub const PRE_SKINNED_NORMAL: u16 = 15;
pub const SCENE_DEPTH: u16 = 16;
pub const DDX: u16 = 18;
pub const DDY: u16 = 19;
pub const TRANSFORM_VECTOR: u16 = 23;
pub const MATERIAL_FUNCTION: u16 = 24;

/// Number of input and output slots on a Custom Code node.
pub const CUSTOM_CODE_SLOTS: u32 = 4;
/// First output box of a Custom Code node.
pub const CUSTOM_CODE_FIRST_OUTPUT: u32 = 8;

pub fn compile(comp: &mut Compilation, node: &Node, out_box: &NodeBox, subtype: u16) -> Value {
    let f3 = |e: &str| Value::new(ValueType::Float3, e);
    match subtype {
        WORLD_POSITION => f3("input.WorldPosition"),
        VIEW => match out_box.id {
            0 => f3("ViewPos"),
            1 => f3("ViewDir"),
            _ => Value::new(ValueType::Float, "ViewFar"),
        },
        NORMAL => f3("input.TBN[2]"),
        CAMERA_VECTOR => f3("normalize(ViewPos - input.WorldPosition)"),
        SCREEN_POSITION => match out_box.id {
            0 => Value::new(ValueType::Float2, "input.SvPosition.xy"),
            _ => Value::new(ValueType::Float2, "(input.SvPosition.xy * ScreenSize.zw)"),
        },
        SCREEN_SIZE => match out_box.id {
            0 => Value::new(ValueType::Float2, "ScreenSize.xy"),
            _ => Value::new(ValueType::Float2, "ScreenSize.zw"),
        },
        CUSTOM_CODE => compile_custom_code(comp, node, out_box),
        OBJECT_POSITION => f3("GetObjectPosition(input)"),
        TWO_SIDED_SIGN => Value::new(ValueType::Float, "input.TwoSidedSign"),
        CAMERA_DISTANCE => Value::new(ValueType::Float, "distance(ViewPos, input.WorldPosition)"),
        VERTEX_COLOR => {
            comp.add_layer_usage(UsageFlags::USE_VERTEX_COLOR);
            let color = Value::new(ValueType::Float4, "input.VertexColor");
            match out_box.id {
                id @ 1..=4 => color.component(id as usize - 1),
                _ => color,
            }
        }
        PRE_SKINNED_POSITION => f3("input.PreSkinnedPosition"),
        PRE_SKINNED_NORMAL => f3("input.PreSkinnedNormal"),
        SCENE_DEPTH => {
            let uv = comp.try_get_value(
                node,
                0,
                Value::new(ValueType::Float2, "(input.SvPosition.xy * ScreenSize.zw)"),
            );
            texture_nodes::sample_scene_depth(comp, node, &uv)
        }
        DDX | DDY => {
            let v = comp.try_get_value(node, 0, Value::float(0.0));
            if comp.current_tree != ShaderTree::Pixel {
                return Value::zero(v.ty);
            }
            let f = if subtype == DDX { "ddx" } else { "ddy" };
            Value::new(v.ty, format!("{f}({})", v.expr))
        }
        TRANSFORM_VECTOR => compile_transform_vector(comp, node),
        MATERIAL_FUNCTION => function_nodes::compile_material_function(comp, node, out_box),
        MATERIAL_OUTPUT => {
            comp.error(node, out_box.id, "material output node cannot be used as an input");
            Value::zero(out_box.ty)
        }
        _ => super::unsupported(comp, node, out_box),
    }
}

/// Replace whole-word occurrences of `ident` in HLSL `code`.
pub fn replace_identifier(code: &str, ident: &str, with: &str) -> String {
    let is_ident = |c: char| c.is_ascii_alphanumeric() || c == '_';
    let mut out = String::with_capacity(code.len());
    let mut rest = code;
    while let Some(pos) = rest.find(ident) {
        let before = rest[..pos].chars().next_back();
        let after = rest[pos + ident.len()..].chars().next();
        out.push_str(&rest[..pos]);
        if before.is_some_and(is_ident) || after.is_some_and(is_ident) {
            out.push_str(ident);
        } else {
            out.push_str(with);
        }
        rest = &rest[pos + ident.len()..];
    }
    out.push_str(rest);
    out
}

/// Custom Code: `Input0..3` read boxes 0..3, `Output0..3` are float4 locals on boxes 8..11.
fn compile_custom_code(comp: &mut Compilation, node: &Node, out_box: &NodeBox) -> Value {
    let inputs: Vec<Value> = (0..CUSTOM_CODE_SLOTS)
        .map(|i| comp.try_get_value(node, i, Value::zero(ValueType::Float4)).cast(ValueType::Float4))
        .collect();
    let outputs: Vec<Value> = (0..CUSTOM_CODE_SLOTS)
        .map(|_| comp.writer.write_local(ValueType::Float4, None, Some(node.id)))
        .collect();

    let mut code = node.value(0).and_then(|v| v.as_str()).unwrap_or_default().to_string();
    for i in 0..CUSTOM_CODE_SLOTS as usize {
        code = replace_identifier(&code, &format!("Input{i}"), &inputs[i].expr);
        code = replace_identifier(&code, &format!("Output{i}"), &outputs[i].expr);
    }
    comp.writer.write_line("{");
    comp.writer.push_indent();
    for line in code.lines() {
        comp.writer.write_line(line.trim_end());
    }
    comp.writer.pop_indent();
    comp.writer.write_line("}");

    for (i, out) in outputs.iter().enumerate() {
        let box_id = CUSTOM_CODE_FIRST_OUTPUT + i as u32;
        if let Some(b) = node.get_box(box_id) {
            comp.set_box_cache(node, box_id, out.cast(b.ty));
        }
    }
    match out_box.id.checked_sub(CUSTOM_CODE_FIRST_OUTPUT) {
        Some(i) if i < CUSTOM_CODE_SLOTS => outputs[i as usize].cast(out_box.ty),
        _ => Value::zero(out_box.ty),
    }
}

/// Vector spaces understood by Transform Vector (`values[0]` from, `values[1]` to).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransformSpace {
    Tangent,
    World,
    View,
    Local,
}

impl TransformSpace {
    pub fn from_i32(v: i32) -> Option<Self> {
        Some(match v {
            0 => TransformSpace::Tangent,
            1 => TransformSpace::World,
            2 => TransformSpace::View,
            3 => TransformSpace::Local,
            _ => return None,
        })
    }
}

fn compile_transform_vector(comp: &mut Compilation, node: &Node) -> Value {
    let v = comp.try_get_value(node, 0, Value::zero(ValueType::Float3)).cast(ValueType::Float3);
    let from = TransformSpace::from_i32(node.value_i32(0, 0));
    let to = TransformSpace::from_i32(node.value_i32(1, 1));
    let (Some(from), Some(to)) = (from, to) else {
        comp.error(node, 1, "invalid transform space");
        return v;
    };
    if from == to {
        return v;
    }
    let to_world = match from {
        TransformSpace::Tangent => format!("TransformTangentVectorToWorld(input, {})", v.expr),
        TransformSpace::View => format!("TransformViewVectorToWorld({})", v.expr),
        TransformSpace::Local => format!("TransformLocalVectorToWorld(input, {})", v.expr),
        TransformSpace::World => v.expr.clone(),
    };
    let expr = match to {
        TransformSpace::Tangent => format!("TransformWorldVectorToTangent(input, {to_world})"),
        TransformSpace::View => format!("TransformWorldVectorToView({to_world})"),
        TransformSpace::Local => format!("TransformWorldVectorToLocal(input, {to_world})"),
        TransformSpace::World => to_world,
    };
    comp.writer.write_local(ValueType::Float3, Some(&expr), Some(node.id))
}
