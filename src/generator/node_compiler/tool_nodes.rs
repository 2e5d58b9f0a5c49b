//! Compilers for tool nodes (group 4).

use super::super::compilation::Compilation;
use super::super::types::{Value, ValueType};
use super::super::utils::coerce_for_binary;
use crate::graph::{Node, NodeBox};

pub const FRESNEL: u16 = 1;
pub const DESATURATION: u16 = 2;
pub const TIME: u16 = 3;
pub const PANNER: u16 = 4;
pub const LINEARIZE_DEPTH: u16 = 5;
pub const ROTATOR: u16 = 6;
pub const SPHERE_MASK: u16 = 7;

pub fn compile(comp: &mut Compilation, node: &Node, out_box: &NodeBox, subtype: u16) -> Value {
    match subtype {
        FRESNEL => compile_fresnel(comp, node),
        DESATURATION => compile_desaturation(comp, node),
        TIME => Value::new(ValueType::Float, "TimeParam"),
        PANNER => compile_panner(comp, node),
        LINEARIZE_DEPTH => {
            let depth = comp.try_get_value(node, 0, Value::float(0.0)).cast(ValueType::Float);
            let expr = format!("ViewInfo.w / ({} - ViewInfo.z)", depth.expr);
            comp.writer.write_local(ValueType::Float, Some(&expr), Some(node.id))
        }
        ROTATOR => compile_rotator(comp, node),
        SPHERE_MASK => compile_sphere_mask(comp, node),
        _ => super::unsupported(comp, node, out_box),
    }
}

/// Exponent 0, base reflect fraction 1, normal 2.
fn compile_fresnel(comp: &mut Compilation, node: &Node) -> Value {
    let exponent = comp.try_get_value(node, 0, Value::float(5.0)).cast(ValueType::Float);
    let base = comp.try_get_value(node, 1, Value::float(0.04)).cast(ValueType::Float);
    let normal = comp
        .try_get_value(node, 2, Value::new(ValueType::Float3, "input.TBN[2]"))
        .cast(ValueType::Float3);
    let expr = format!(
        "{1} + (1 - {1}) * pow(1 - saturate(dot({2}, normalize(ViewPos - input.WorldPosition))), {0})",
        exponent.expr, base.expr, normal.expr
    );
    comp.writer.write_local(ValueType::Float, Some(&expr), Some(node.id))
}

/// Color 0, fraction 1, luminance factors 2.
fn compile_desaturation(comp: &mut Compilation, node: &Node) -> Value {
    let color = comp
        .try_get_value(node, 0, Value::zero(ValueType::Float3))
        .cast(ValueType::Float3);
    let scale = comp.try_get_value(node, 1, Value::float(1.0)).cast(ValueType::Float);
    let luminance = comp
        .try_get_value(node, 2, Value::float3([0.3, 0.59, 0.11]))
        .cast(ValueType::Float3);
    let expr = format!(
        "lerp({0}, dot({0}, {1}), {2})",
        color.expr, luminance.expr, scale.expr
    );
    comp.writer.write_local(ValueType::Float3, Some(&expr), Some(node.id))
}

/// UV 0, time 1, speed 2; `values[0]` keeps only the fractional part.
fn compile_panner(comp: &mut Compilation, node: &Node) -> Value {
    let uv = comp
        .try_get_value(node, 0, comp.tex_coord())
        .cast(ValueType::Float2);
    let time = comp
        .try_get_value(node, 1, Value::new(ValueType::Float, "TimeParam"))
        .cast(ValueType::Float);
    let speed = comp.try_get_value(node, 2, Value::float2([1.0, 1.0])).cast(ValueType::Float2);
    let offset = format!("{} * {}", speed.expr, time.expr);
    let expr = if node.value_bool(0, false) {
        format!("{} + frac({offset})", uv.expr)
    } else {
        format!("{} + {offset}", uv.expr)
    };
    comp.writer.write_local(ValueType::Float2, Some(&expr), Some(node.id))
}

/// UV 0, center 1, rotation angle 2.
fn compile_rotator(comp: &mut Compilation, node: &Node) -> Value {
    let uv = comp
        .try_get_value(node, 0, comp.tex_coord())
        .cast(ValueType::Float2);
    let center = comp.try_get_value(node, 1, Value::float2([0.5, 0.5])).cast(ValueType::Float2);
    let angle = comp.try_get_value(node, 2, Value::float(0.0)).cast(ValueType::Float);
    let id = Some(node.id);
    let w = &mut comp.writer;
    let d = w.write_local(ValueType::Float2, Some(&format!("{} - {}", uv.expr, center.expr)), id);
    let s = w.write_local(ValueType::Float, Some(&format!("sin({})", angle.expr)), id);
    let c = w.write_local(ValueType::Float, Some(&format!("cos({})", angle.expr)), id);
    let expr = format!(
        "{0} + float2({1}.x * {3} - {1}.y * {2}, {1}.x * {2} + {1}.y * {3})",
        center.expr, d.expr, s.expr, c.expr
    );
    w.write_local(ValueType::Float2, Some(&expr), id)
}

/// A 0, B 1, radius 2, hardness 3; `values[0]` inverts the mask.
fn compile_sphere_mask(comp: &mut Compilation, node: &Node) -> Value {
    let a = comp.try_get_value(node, 0, Value::float(0.0));
    let b = comp.try_get_value(node, 1, Value::float(0.0));
    let (a, b, _) = coerce_for_binary(a, b);
    let radius = comp.try_get_value(node, 2, Value::float(0.3)).cast(ValueType::Float);
    let hardness = comp.try_get_value(node, 3, Value::float(0.5)).cast(ValueType::Float);
    let mask = format!(
        "saturate((1 - distance({}, {}) / max({}, 0.00001)) / max(1 - {}, 0.00001))",
        a.expr, b.expr, radius.expr, hardness.expr
    );
    let expr = if node.value_bool(0, false) {
        format!("1 - {mask}")
    } else {
        mask
    };
    comp.writer.write_local(ValueType::Float, Some(&expr), Some(node.id))
}

#[cfg(test)]
mod tests {
    use super::super::test_utils::{eval_channel, material_graph, node};
    use super::*;
    use crate::asset_store::AssetStore;
    use crate::generator::material::MaterialChannel;
    use crate::graph::NodeValue;
    use crate::material_info::MaterialInfo;

    #[test]
    fn fresnel_defaults() {
        let mut g = material_graph();
        g.add_node(node(
            2,
            4,
            FRESNEL,
            &[
                (0, ValueType::Float),
                (1, ValueType::Float),
                (2, ValueType::Float3),
                (3, ValueType::Float),
            ],
        ))
        .unwrap();
        g.connect_ids(2, 3, 1, MaterialChannel::Opacity.box_id()).unwrap();
        let (v, c) = eval_channel(g, MaterialInfo::default(), AssetStore::new(), MaterialChannel::Opacity);
        assert_eq!(v.expr, "Local1");
        assert!(c.writer.text().contains(
            "float Local1 = 0.04 + (1 - 0.04) * pow(1 - saturate(dot(input.TBN[2], normalize(ViewPos - input.WorldPosition))), 5);"
        ));
    }

    #[test]
    fn panner_with_fraction() {
        let mut g = material_graph();
        g.add_node(
            node(
                2,
                4,
                PANNER,
                &[
                    (0, ValueType::Float2),
                    (1, ValueType::Float),
                    (2, ValueType::Float2),
                    (3, ValueType::Float2),
                ],
            )
            .with_value(NodeValue::Bool(true)),
        )
        .unwrap();
        g.connect_ids(2, 3, 1, MaterialChannel::Emissive.box_id()).unwrap();
        let (v, c) = eval_channel(g, MaterialInfo::default(), AssetStore::new(), MaterialChannel::Emissive);
        assert_eq!(v.expr, "float3(Local1,0)");
        assert!(c
            .writer
            .text()
            .contains("float2 Local1 = input.TexCoord.xy + frac(float2(1,1) * TimeParam);"));
    }

    #[test]
    fn inverted_sphere_mask() {
        let mut g = material_graph();
        g.add_node(
            node(
                2,
                4,
                SPHERE_MASK,
                &[
                    (0, ValueType::Void),
                    (1, ValueType::Void),
                    (2, ValueType::Float),
                    (3, ValueType::Float),
                    (4, ValueType::Float),
                ],
            )
            .with_value(NodeValue::Bool(true)),
        )
        .unwrap();
        g.connect_ids(2, 4, 1, MaterialChannel::Mask.box_id()).unwrap();
        let (_, c) = eval_channel(g, MaterialInfo::default(), AssetStore::new(), MaterialChannel::Mask);
        assert!(c.writer.text().contains(
            "float Local1 = 1 - saturate((1 - distance(0, 0) / max(0.3, 0.00001)) / max(1 - 0.5, 0.00001));"
        ));
    }
}
