//! Node handlers, dispatched on `(group, subtype)`.
//!
//! Every handler receives the producer node and the output box being
//! requested and returns the value of that box. Handlers pull their inputs
//! through [`Compilation::eat_box`] / [`Compilation::try_get_value`], which
//! memoise per box, so a handler may freely evaluate inputs it ends up not
//! using. Problems are reported with [`Compilation::error`] and answered with
//! the zero of the output kind.

pub mod function_nodes;
pub mod layer_nodes;
pub mod material_nodes;
pub mod math_nodes;
pub mod parameter_nodes;
pub mod particle_nodes;
pub mod texture_nodes;
pub mod tool_nodes;
pub mod vector_nodes;

use super::compilation::{Compilation, CompilationMode};
use super::types::Value;
use crate::graph::{Node, NodeBox};

pub const GROUP_MATERIAL: u16 = 1;
pub const GROUP_PARAMETERS: u16 = 2;
pub const GROUP_TEXTURES: u16 = 3;
pub const GROUP_TOOLS: u16 = 4;
pub const GROUP_MATH: u16 = 5;
pub const GROUP_LAYERS: u16 = 6;
pub const GROUP_PARTICLES: u16 = 7;
pub const GROUP_FUNCTION: u16 = 8;
pub const GROUP_PARTICLE_MODULES: u16 = 15;

/// Evaluate `out_box` of `node`.
pub fn process_node(comp: &mut Compilation, node: &Node, out_box: &NodeBox) -> Value {
    let subtype = node.type_id.subtype();
    match node.type_id.group() {
        GROUP_MATERIAL => material_nodes::compile(comp, node, out_box, subtype),
        GROUP_PARAMETERS => parameter_nodes::compile(comp, node, out_box, subtype),
        GROUP_TEXTURES => texture_nodes::compile(comp, node, out_box, subtype),
        GROUP_TOOLS => tool_nodes::compile(comp, node, out_box, subtype),
        GROUP_MATH if subtype >= 60 => vector_nodes::compile(comp, node, out_box, subtype),
        GROUP_MATH => math_nodes::compile(comp, node, out_box, subtype),
        GROUP_LAYERS => layer_nodes::compile(comp, node, out_box, subtype),
        GROUP_PARTICLES => {
            let allowed = comp.mode == CompilationMode::Emitter
                || comp.root_info().is_some_and(|i| i.domain.is_particle());
            if allowed {
                particle_nodes::compile(comp, node, out_box, subtype)
            } else {
                // Particle data only exists for particle materials.
                Value::zero(out_box.ty)
            }
        }
        GROUP_FUNCTION => function_nodes::compile(comp, node, out_box, subtype),
        _ => unsupported(comp, node, out_box),
    }
}

/// Report an unknown node type and yield zero.
pub(crate) fn unsupported(comp: &mut Compilation, node: &Node, out_box: &NodeBox) -> Value {
    comp.error(
        node,
        out_box.id,
        format!(
            "unsupported node type ({}, {})",
            node.type_id.group(),
            node.type_id.subtype()
        ),
    );
    Value::zero(out_box.ty)
}

#[cfg(test)]
pub mod test_utils {
    //! Helpers for building small material graphs in handler tests.

    use std::sync::Arc;

    use uuid::Uuid;

    use crate::asset_store::AssetStore;
    use crate::generator::compilation::Compilation;
    use crate::generator::material::{MaterialChannel, default_material_graph};
    use crate::generator::types::{Value, ValueType};
    use crate::graph::{Graph, Node, NodeTypeId};
    use crate::material_info::MaterialInfo;

    /// Graph holding a material root node with id 1.
    pub fn material_graph() -> Graph {
        default_material_graph()
    }

    pub fn node(id: u32, group: u16, subtype: u16, boxes: &[(u32, ValueType)]) -> Node {
        boxes
            .iter()
            .fold(Node::new(id, NodeTypeId::new(group, subtype)), |n, (b, t)| {
                n.with_box(*b, *t)
            })
    }

    /// Evaluate what flows into root channel `ch` in the pixel tree.
    pub fn eval_channel(graph: Graph, info: MaterialInfo, assets: AssetStore, ch: MaterialChannel) -> (Value, Compilation) {
        let g = Arc::new(graph);
        let mut c = Compilation::new_material(Uuid::new_v4(), g.clone(), info, assets);
        c.current_tree = ch.tree();
        let root = g.node_by_id(1).unwrap();
        let v = c.try_get_value(root, ch.box_id(), ch.default_value());
        (v, c)
    }
}
