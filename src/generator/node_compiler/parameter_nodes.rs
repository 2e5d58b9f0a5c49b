//! Compilers for parameter access nodes (group 2).

use uuid::Uuid;

use super::super::compilation::Compilation;
use super::super::parameters::ParameterKind;
use super::super::types::{Value, ValueType};
use crate::graph::{Node, NodeBox};

pub const GET_PARAMETER: u16 = 1;
pub const GET_LAYER_PARAMETER: u16 = 2;

pub fn compile(comp: &mut Compilation, node: &Node, out_box: &NodeBox, subtype: u16) -> Value {
    match subtype {
        GET_PARAMETER => {
            let Some(id) = guid(node, 0) else {
                comp.error(node, out_box.id, "missing parameter id");
                return Value::zero(out_box.ty);
            };
            // Ids are seen through the remap of the layer whose graph is being evaluated.
            let mapped = comp
                .owning_layer(comp.top_graph())
                .and_then(|l| comp.layers[l].param_remap.get(&id).copied())
                .unwrap_or(id);
            parameter_value(comp, node, out_box, mapped, id)
        }
        GET_LAYER_PARAMETER => {
            let (Some(layer_id), Some(id)) = (guid(node, 0), guid(node, 1)) else {
                comp.error(node, out_box.id, "missing layer parameter reference");
                return Value::zero(out_box.ty);
            };
            let Some(layer) = comp.get_layer(node, out_box.id, layer_id) else {
                return Value::zero(out_box.ty);
            };
            let mapped = comp.layers[layer].param_remap.get(&id).copied().unwrap_or(id);
            parameter_value(comp, node, out_box, mapped, id)
        }
        _ => super::unsupported(comp, node, out_box),
    }
}

fn guid(node: &Node, index: usize) -> Option<Uuid> {
    node.value(index).and_then(|v| v.as_guid()).filter(|id| !id.is_nil())
}

/// Box 0 is the parameter itself, boxes 1..=4 its components. Channel masks
/// instead select from the float4 on box 1.
fn parameter_value(comp: &mut Compilation, node: &Node, out_box: &NodeBox, mapped: Uuid, id: Uuid) -> Value {
    let Some(param) = comp.params.find_by_id(mapped).and_then(|i| comp.params.get(i)) else {
        comp.error(node, out_box.id, format!("missing parameter {id}"));
        return Value::zero(out_box.ty);
    };
    let (kind, ty) = (param.kind, param.value_type);
    let name = param.shader_name.clone();

    match kind {
        ParameterKind::ChannelMask => {
            let input = comp
                .try_get_value(node, 1, Value::zero(ValueType::Float4))
                .cast(ValueType::Float4);
            Value::new(ValueType::Float, format!("dot({}, {name})", input.expr))
        }
        k if k.is_texture() || k == ParameterKind::TextureGroupSampler => {
            Value::new(ValueType::Object, name)
        }
        _ => {
            let value = Value::new(ty, name);
            match out_box.id {
                0 => value,
                i @ 1..=4 if ty.is_vector() => value.component(i as usize - 1),
                _ => Value::zero(out_box.ty),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_utils::{eval_channel, material_graph, node};
    use super::*;
    use crate::asset_store::AssetStore;
    use crate::generator::material::MaterialChannel;
    use crate::graph::{GraphParameter, NodeValue};
    use crate::material_info::MaterialInfo;

    fn param(kind: ParameterKind, value: NodeValue) -> GraphParameter {
        GraphParameter {
            id: Uuid::new_v4(),
            name: "Tint".into(),
            kind,
            value,
            is_public: true,
            is_override: false,
            asset: None,
        }
    }

    #[test]
    fn vector_parameter_components() {
        let p = param(ParameterKind::Vector, NodeValue::Float3([1.0, 0.5, 0.25]));
        let mut g = material_graph();
        g.parameters.push(p.clone());
        g.add_node(
            node(
                2,
                2,
                GET_PARAMETER,
                &[(0, ValueType::Float3), (1, ValueType::Float), (2, ValueType::Float)],
            )
            .with_value(NodeValue::Guid(p.id)),
        )
        .unwrap();
        g.connect_ids(2, 0, 1, MaterialChannel::Color.box_id()).unwrap();
        g.connect_ids(2, 2, 1, MaterialChannel::Roughness.box_id()).unwrap();
        let (v, mut c) = eval_channel(g, MaterialInfo::default(), AssetStore::new(), MaterialChannel::Color);
        assert_eq!(v.expr, "Param1");
        let graph = c.graph(c.top_graph());
        let root = graph.node_by_id(1).unwrap();
        assert_eq!(c.eat_box(root, MaterialChannel::Roughness.box_id()).expr, "Param1.y");
    }

    #[test]
    fn channel_mask_selects_with_dot() {
        let p = param(ParameterKind::ChannelMask, NodeValue::Int(2));
        let mut g = material_graph();
        g.parameters.push(p.clone());
        g.add_node(node(3, 1, 13, &[(0, ValueType::Float4)])).unwrap();
        g.add_node(
            node(2, 2, GET_PARAMETER, &[(0, ValueType::Float), (1, ValueType::Float4)])
                .with_value(NodeValue::Guid(p.id)),
        )
        .unwrap();
        g.connect_ids(3, 0, 2, 1).unwrap();
        g.connect_ids(2, 0, 1, MaterialChannel::Mask.box_id()).unwrap();
        let (v, c) = eval_channel(g, MaterialInfo::default(), AssetStore::new(), MaterialChannel::Mask);
        assert_eq!(v.expr, "dot(input.VertexColor, Param1)");
        assert_eq!(c.params.get(0).unwrap().value_type, ValueType::Float4);
    }

    #[test]
    fn unknown_parameter_is_an_error() {
        let mut g = material_graph();
        g.add_node(
            node(2, 2, GET_PARAMETER, &[(0, ValueType::Float)])
                .with_value(NodeValue::Guid(Uuid::new_v4())),
        )
        .unwrap();
        g.connect_ids(2, 0, 1, MaterialChannel::Specular.box_id()).unwrap();
        let (v, c) = eval_channel(g, MaterialInfo::default(), AssetStore::new(), MaterialChannel::Specular);
        assert_eq!(v.expr, "0");
        assert!(c.errors()[0].message.starts_with("missing parameter"));
    }
}
