//! Particle attribute reads (group 7), available to particle materials and emitters.

use super::super::compilation::Compilation;
use super::super::types::{Value, ValueType};
use crate::graph::{Node, NodeBox};
use crate::particles::attributes::{AttributeSpace, attribute_kind_from_code};

pub const POSITION: u16 = 1;
pub const VELOCITY: u16 = 2;
pub const COLOR: u16 = 3;
pub const AGE: u16 = 4;
pub const LIFETIME: u16 = 5;
pub const NORMALIZED_AGE: u16 = 6;
pub const SIZE: u16 = 7;
pub const ROTATION: u16 = 8;
pub const MASS: u16 = 9;
pub const RADIUS: u16 = 10;
pub const PARTICLE_INDEX: u16 = 11;
pub const CUSTOM: u16 = 12;

/// Name, kind and space of the built-in attributes.
pub fn builtin_attribute(subtype: u16) -> Option<(&'static str, ValueType, AttributeSpace)> {
    use AttributeSpace::*;
    Some(match subtype {
        POSITION => ("Position", ValueType::Float3, LocalPosition),
        VELOCITY => ("Velocity", ValueType::Float3, LocalVector),
        COLOR => ("Color", ValueType::Float4, Simulation),
        AGE => ("Age", ValueType::Float, Simulation),
        LIFETIME => ("Lifetime", ValueType::Float, Simulation),
        SIZE => ("Size", ValueType::Float2, Simulation),
        ROTATION => ("Rotation", ValueType::Float3, Simulation),
        MASS => ("Mass", ValueType::Float, Simulation),
        RADIUS => ("Radius", ValueType::Float, Simulation),
        _ => return None,
    })
}

pub fn compile(comp: &mut Compilation, node: &Node, out_box: &NodeBox, subtype: u16) -> Value {
    if let Some((name, kind, space)) = builtin_attribute(subtype) {
        return comp.access_particle_attribute(node, out_box.id, name, kind, None, space);
    }
    match subtype {
        NORMALIZED_AGE => {
            let age = comp.access_particle_attribute(node, out_box.id, "Age", ValueType::Float, None, AttributeSpace::Simulation);
            let lifetime = comp.access_particle_attribute(
                node,
                out_box.id,
                "Lifetime",
                ValueType::Float,
                None,
                AttributeSpace::Simulation,
            );
            Value::new(ValueType::Float, format!("({} / {})", age.expr, lifetime.expr))
        }
        PARTICLE_INDEX => comp.particle_index(),
        CUSTOM => {
            let name = node.value(0).and_then(|v| v.as_str()).unwrap_or_default();
            let code = node.value_i32(1, 0);
            let Some(kind) = attribute_kind_from_code(code) else {
                comp.error(node, out_box.id, format!("invalid particle attribute kind {code}"));
                return Value::zero(out_box.ty);
            };
            if name.is_empty() {
                comp.error(node, out_box.id, "missing particle attribute name");
                return Value::zero(kind);
            }
            comp.access_particle_attribute(node, out_box.id, name, kind, None, AttributeSpace::Simulation)
        }
        _ => super::unsupported(comp, node, out_box),
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_utils::{eval_channel, material_graph, node};
    use super::*;
    use crate::asset_store::AssetStore;
    use crate::generator::material::MaterialChannel;
    use crate::material_info::{MaterialDomain, MaterialInfo};

    fn particle_info() -> MaterialInfo {
        MaterialInfo {
            domain: MaterialDomain::Particle,
            ..MaterialInfo::default()
        }
    }

    #[test]
    fn normalized_age_reads_two_attributes() {
        let mut g = material_graph();
        g.add_node(node(2, 7, NORMALIZED_AGE, &[(0, ValueType::Float)])).unwrap();
        g.connect_ids(2, 0, 1, MaterialChannel::Opacity.box_id()).unwrap();
        let (v, c) = eval_channel(g, particle_info(), AssetStore::new(), MaterialChannel::Opacity);
        assert_eq!(v.expr, "(Local1 / Local2)");
        let text = c.writer.text();
        assert!(text.contains("float Local1 = GetParticleFloat(Param1, input.ParticleIndex);"));
        assert!(text.contains("float Local2 = GetParticleFloat(Param2, input.ParticleIndex);"));
        assert_eq!(c.particle_layout.find("Lifetime").unwrap().offset, 4);
    }

    #[test]
    fn position_is_transformed_from_local_space() {
        let mut g = material_graph();
        g.add_node(node(2, 7, POSITION, &[(0, ValueType::Float3)])).unwrap();
        g.connect_ids(2, 0, 1, MaterialChannel::Emissive.box_id()).unwrap();
        let (_, c) = eval_channel(g, particle_info(), AssetStore::new(), MaterialChannel::Emissive);
        assert!(c
            .writer
            .text()
            .contains("float3 Local1 = TransformParticlePosition(GetParticleVec3(Param1, input.ParticleIndex));"));
    }

    #[test]
    fn surface_materials_read_zero() {
        let mut g = material_graph();
        g.add_node(node(2, 7, COLOR, &[(0, ValueType::Float4)])).unwrap();
        g.connect_ids(2, 0, 1, MaterialChannel::Color.box_id()).unwrap();
        let (v, c) = eval_channel(g, MaterialInfo::default(), AssetStore::new(), MaterialChannel::Color);
        assert_eq!(v.expr, "float3(0,0,0)");
        assert!(c.params.is_empty());
    }
}
