//! Compilers for material layer nodes (group 6).

use super::super::compilation::Compilation;
use super::super::layers::{BlendMode, MATERIAL_STRUCT};
use super::super::material::MaterialChannel;
use super::super::types::{Value, ValueType};
use crate::graph::{Node, NodeBox};

pub const SAMPLE_LAYER: u16 = 1;
pub const BLEND_LINEAR: u16 = 2;
pub const PACK_LAYER: u16 = 3;
pub const UNPACK_LAYER: u16 = 4;
pub const BLEND_ADD: u16 = 5;
pub const BLEND_HEIGHT: u16 = 8;

/// Sample Layer UV input.
pub const SAMPLE_UV_BOX: u32 = 1;

/// Below this the height blend treats a layer as fully covered.
const HEIGHT_EPSILON: &str = "0.0001";

pub fn compile(comp: &mut Compilation, node: &Node, out_box: &NodeBox, subtype: u16) -> Value {
    match subtype {
        SAMPLE_LAYER => compile_sample_layer(comp, node, out_box),
        BLEND_LINEAR => compile_blend(comp, node, BlendMode::Linear),
        BLEND_ADD => compile_blend(comp, node, BlendMode::Add),
        BLEND_HEIGHT => compile_blend(comp, node, BlendMode::Height),
        PACK_LAYER => compile_pack(comp, node),
        UNPACK_LAYER => compile_unpack(comp, node, out_box),
        _ => super::unsupported(comp, node, out_box),
    }
}

fn compile_sample_layer(comp: &mut Compilation, node: &Node, out_box: &NodeBox) -> Value {
    let Some(id) = node.value(0).and_then(|v| v.as_guid()).filter(|id| !id.is_nil()) else {
        comp.error(node, out_box.id, "missing layer reference");
        return Value::null();
    };
    if id == comp.material_id() {
        comp.error(node, out_box.id, "layer samples itself");
        return Value::null();
    }
    let Some(layer) = comp.get_layer(node, out_box.id, id) else {
        return Value::null();
    };
    comp.sample_layer(node, out_box.id, layer, SAMPLE_UV_BOX)
}

/// A layer struct flowing into `box_id`, or null when unconnected or not a layer.
fn layer_input(comp: &mut Compilation, node: &Node, box_id: u32) -> Value {
    let v = comp.eat_box(node, box_id);
    if v.is_valid() && v.ty != ValueType::Object {
        comp.error(node, box_id, "expected a material layer");
        return Value::null();
    }
    v
}

/// Bottom 1, top 2, alpha 3; Blend Height also reads heights on 4 and 5.
fn compile_blend(comp: &mut Compilation, node: &Node, mode: BlendMode) -> Value {
    let alpha = comp
        .try_get_value(node, 3, Value::float(node.value_f32(0, 0.5)))
        .cast(ValueType::Float);

    // Constant alphas select one side without evaluating the other.
    if alpha.is_zero_literal() {
        let bottom = layer_input(comp, node, 1);
        return or_default_layer(comp, bottom);
    }
    if alpha.is_one_literal() && mode != BlendMode::Add {
        let top = layer_input(comp, node, 2);
        return or_default_layer(comp, top);
    }
    let bottom = layer_input(comp, node, 1);
    let top = layer_input(comp, node, 2);
    let bottom = or_default_layer(comp, bottom);
    let top = or_default_layer(comp, top);

    let alpha = if mode == BlendMode::Height {
        let bottom_height = comp.try_get_value(node, 4, Value::float(0.0)).cast(ValueType::Float);
        let top_height = comp.try_get_value(node, 5, Value::float(0.0)).cast(ValueType::Float);
        let w = &mut comp.writer;
        let start = w.write_local(
            ValueType::Float,
            Some(&format!(
                "max({0} * (1 - {2}), {1} * {2}) - 0.05",
                bottom_height.expr, top_height.expr, alpha.expr
            )),
            Some(node.id),
        );
        let level = w.write_local(
            ValueType::Float,
            Some(&format!(
                "max({} * {} - {}, {HEIGHT_EPSILON})",
                top_height.expr, alpha.expr, start.expr
            )),
            Some(node.id),
        );
        w.write_local(
            ValueType::Float,
            Some(&format!(
                "{1} / (max({0} - {2}, 0) + {1})",
                bottom_height.expr, level.expr, start.expr
            )),
            Some(node.id),
        )
    } else {
        alpha
    };
    comp.blend_layers(&bottom, &top, &alpha, mode)
}

fn or_default_layer(comp: &mut Compilation, layer: Value) -> Value {
    if layer.is_valid() { layer } else { comp.write_default_layer() }
}

/// Builds a layer from per-channel inputs on boxes `1 + channel`.
fn compile_pack(comp: &mut Compilation, node: &Node) -> Value {
    let var = comp.writer.write_struct_local(MATERIAL_STRUCT, ValueType::Object);
    for ch in MaterialChannel::for_tree(comp.current_tree) {
        let box_id = 1 + ch.box_id();
        let v = comp.try_get_value(node, box_id, ch.default_value()).cast(ch.kind());
        comp.writer.write_line(&format!("{}.{} = {};", var.expr, ch.name(), v.expr));
        if node.is_connected(box_id) {
            comp.add_layer_usage(ch.usage_flag());
        }
    }
    var
}

/// Reads channel `out_box - 1` from the layer on box 0.
fn compile_unpack(comp: &mut Compilation, node: &Node, out_box: &NodeBox) -> Value {
    let Some(ch) = out_box.id.checked_sub(1).and_then(MaterialChannel::from_box_id) else {
        return Value::zero(out_box.ty);
    };
    if ch.tree() != comp.current_tree {
        return ch.default_value();
    }
    let layer = layer_input(comp, node, 0);
    if !layer.is_valid() {
        return ch.default_value();
    }
    Value::new(ch.kind(), format!("{}.{}", layer.expr, ch.name()))
}
