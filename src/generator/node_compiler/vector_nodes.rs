//! Compilers for vector construction and decomposition nodes (group 5, subtypes 60+).

use super::super::compilation::Compilation;
use super::super::types::{Value, ValueType};
use super::math_nodes::operand;
use crate::graph::{Node, NodeBox};

pub const PACK_FLOAT2: u16 = 60;
pub const PACK_FLOAT3: u16 = 61;
pub const PACK_FLOAT4: u16 = 62;
pub const UNPACK: u16 = 63;
pub const SWIZZLE: u16 = 64;
pub const APPEND: u16 = 65;

pub fn compile(comp: &mut Compilation, node: &Node, out_box: &NodeBox, subtype: u16) -> Value {
    match subtype {
        PACK_FLOAT2 => compile_pack(comp, node, 2),
        PACK_FLOAT3 => compile_pack(comp, node, 3),
        PACK_FLOAT4 => compile_pack(comp, node, 4),
        UNPACK => compile_unpack(comp, node, out_box),
        SWIZZLE => compile_swizzle(comp, node, out_box),
        APPEND => compile_append(comp, node, out_box),
        _ => super::unsupported(comp, node, out_box),
    }
}

/// Pack Float2/3/4: components on boxes 1..=n, vector on box 0.
fn compile_pack(comp: &mut Compilation, node: &Node, n: u32) -> Value {
    let parts: Vec<String> = (1..=n)
        .map(|b| operand(comp, node, b).cast(ValueType::Float).expr)
        .collect();
    let ty = ValueType::float_vector(n);
    Value::new(ty, format!("{}({})", ty.hlsl(), parts.join(", ")))
}

/// Unpack: vector on box 0; X, Y, Z, W on boxes 1..=4, XY on 5, XYZ on 6.
fn compile_unpack(comp: &mut Compilation, node: &Node, out_box: &NodeBox) -> Value {
    let v = operand(comp, node, 0);
    match out_box.id {
        id @ 1..=4 => v.component(id as usize - 1),
        5 => v.cast(ValueType::Float2),
        6 => v.cast(ValueType::Float3),
        _ => Value::zero(out_box.ty),
    }
}

/// Normalize a swizzle mask to `xyzw` letters, checking it against `components`.
pub fn parse_swizzle(mask: &str, components: u32) -> Result<String, String> {
    let n = mask.chars().count();
    if n == 0 || n > 4 {
        return Err(format!("invalid swizzle '{mask}'"));
    }
    mask.chars()
        .map(|c| {
            let (letter, index) = match c {
                'x' | 'r' => ('x', 0),
                'y' | 'g' => ('y', 1),
                'z' | 'b' => ('z', 2),
                'w' | 'a' => ('w', 3),
                _ => return Err(format!("invalid swizzle component '{c}' in '{mask}'")),
            };
            // Scalars replicate `x` only.
            if index >= components.max(1) {
                return Err(format!("swizzle '{mask}' reads past {components} components"));
            }
            Ok(letter)
        })
        .collect()
}

fn compile_swizzle(comp: &mut Compilation, node: &Node, out_box: &NodeBox) -> Value {
    let v = operand(comp, node, 0);
    let mask = node.value(0).and_then(|m| m.as_str()).unwrap_or("xyzw");
    match parse_swizzle(mask, v.ty.components()) {
        Ok(m) => v.swizzle(&m),
        Err(msg) => {
            comp.error(node, out_box.id, msg);
            Value::zero(ValueType::float_vector(mask.chars().count().clamp(1, 4) as u32))
        }
    }
}

/// Append: concatenates the components of boxes 0 and 1 on box 2.
fn compile_append(comp: &mut Compilation, node: &Node, out_box: &NodeBox) -> Value {
    let a = comp.eat_box(node, 0);
    let b = comp.eat_box(node, 1);
    match (a.is_valid(), b.is_valid()) {
        (false, false) => return Value::zero(ValueType::Float2),
        (true, false) => return a,
        (false, true) => return b,
        _ => {}
    }
    let (ca, cb) = (a.ty.components(), b.ty.components());
    if ca == 0 || cb == 0 || ca + cb > 4 {
        comp.error(
            node,
            out_box.id,
            format!("cannot append {:?} and {:?}", a.ty, b.ty),
        );
        return Value::zero(ValueType::Float4);
    }
    let to_float = |v: Value| {
        if v.ty.is_scalar() { v.cast(ValueType::Float) } else { v }
    };
    let (a, b) = (to_float(a), to_float(b));
    let ty = ValueType::float_vector(ca + cb);
    Value::new(ty, format!("{}({}, {})", ty.hlsl(), a.expr, b.expr))
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
    fn swizzle_masks() {
        assert_eq!(parse_swizzle("rgb", 4).unwrap(), "xyz");
        assert_eq!(parse_swizzle("xx", 1).unwrap(), "xx");
        assert!(parse_swizzle("z", 2).is_err());
        assert!(parse_swizzle("xyzwx", 4).is_err());
        assert!(parse_swizzle("q", 4).is_err());
    }

    #[test]
    fn append_builds_wider_vector() {
        let mut g = material_graph();
        g.add_node(
            node(2, 5, 4, &[(0, ValueType::Float2)]).with_value(NodeValue::Float2([0.25, 0.5])),
        )
        .unwrap();
        g.add_node(node(3, 5, 3, &[(0, ValueType::Float)]).with_value(NodeValue::Float(1.0)))
            .unwrap();
        g.add_node(node(
            4,
            5,
            APPEND,
            &[(0, ValueType::Void), (1, ValueType::Void), (2, ValueType::Void)],
        ))
        .unwrap();
        g.connect_ids(2, 0, 4, 0).unwrap();
        g.connect_ids(3, 0, 4, 1).unwrap();
        g.connect_ids(4, 2, 1, MaterialChannel::Emissive.box_id()).unwrap();
        let (v, _) = eval_channel(g, MaterialInfo::default(), AssetStore::new(), MaterialChannel::Emissive);
        assert_eq!(v.expr, "float3(float2(0.25,0.5), 1)");
    }

    #[test]
    fn invalid_swizzle_reports_error() {
        let mut g = material_graph();
        g.add_node(node(2, 5, 3, &[(0, ValueType::Float)]).with_value(NodeValue::Float(1.0)))
            .unwrap();
        g.add_node(
            node(3, 5, SWIZZLE, &[(0, ValueType::Void), (1, ValueType::Void)])
                .with_value(NodeValue::String("xyz".into())),
        )
        .unwrap();
        g.connect_ids(2, 0, 3, 0).unwrap();
        g.connect_ids(3, 1, 1, MaterialChannel::Color.box_id()).unwrap();
        let (v, c) = eval_channel(g, MaterialInfo::default(), AssetStore::new(), MaterialChannel::Color);
        assert_eq!(v.expr, "float3(0,0,0)");
        assert_eq!(c.errors().len(), 1);
    }
}
