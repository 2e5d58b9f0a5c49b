//! Material function inlining: the Material Function call node (group 1) and
//! the Function Input/Output nodes living inside function graphs (group 8).
//!
//! Every call site gets its own [`GraphOwner::Function`] instance, so two calls
//! of the same function never share cached box values. Inputs are resolved
//! lazily in the caller's scope, which is why the function graph is popped
//! while a Function Input evaluates the caller box.

use uuid::Uuid;

use super::super::compilation::{Compilation, GraphId, GraphOwner, NodeRef};
use super::super::types::{Value, ValueType};
use crate::graph::{Node, NodeBox};

pub const FUNCTION_INPUT: u16 = 1;
pub const FUNCTION_OUTPUT: u16 = 2;

/// Number of input ports on a Material Function node; outputs follow.
pub const FUNCTION_PORTS: u32 = 16;

pub fn compile(comp: &mut Compilation, node: &Node, out_box: &NodeBox, subtype: u16) -> Value {
    match subtype {
        FUNCTION_INPUT => compile_function_input(comp, node, out_box),
        FUNCTION_OUTPUT => comp.try_get_value(node, 0, Value::zero(out_box.ty)),
        _ => super::unsupported(comp, node, out_box),
    }
}

/// Evaluate output `out_box.id - 16` of the function referenced by `values[0]`.
pub fn compile_material_function(comp: &mut Compilation, node: &Node, out_box: &NodeBox) -> Value {
    let Some(output) = out_box.id.checked_sub(FUNCTION_PORTS) else {
        return Value::zero(out_box.ty);
    };
    let Some(id) = node.value(0).and_then(|v| v.as_guid()).filter(|id| !id.is_nil()) else {
        comp.error(node, out_box.id, "missing function reference");
        return Value::zero(out_box.ty);
    };
    let Some(asset) = comp.assets.function(id) else {
        comp.error(node, out_box.id, format!("missing function {id}"));
        return Value::zero(out_box.ty);
    };
    comp.add_dependency(id);

    if is_function_active(comp, id) {
        comp.error(node, out_box.id, format!("recursive call to function {id}"));
        return Value::zero(out_box.ty);
    }
    let Some(&output_node) = asset.outputs.get(output as usize) else {
        comp.error(node, out_box.id, format!("function {id} has no output {output}"));
        return Value::zero(out_box.ty);
    };
    let Some(site) = comp.current_node() else {
        return Value::zero(out_box.ty);
    };

    let gid = match comp.functions.get(&site) {
        Some(&gid) => gid,
        None => {
            let graph = asset.graph.clone();
            let gid = comp.add_graph(
                graph,
                GraphOwner::Function {
                    asset: asset.clone(),
                    call_site: site,
                },
            );
            comp.functions.insert(site, gid);
            gid
        }
    };

    comp.push_graph(gid);
    let graph = comp.graph(gid);
    let value = comp.try_get_value(graph.node(output_node), 0, Value::zero(out_box.ty));
    comp.pop_graph();
    if matches!(out_box.ty, ValueType::Void | ValueType::Object) {
        value
    } else {
        value.cast(out_box.ty)
    }
}

/// True if an instance of function `id` is already being evaluated.
fn is_function_active(comp: &Compilation, id: Uuid) -> bool {
    comp.graph_stack.iter().any(|g| {
        matches!(comp.owner(*g), GraphOwner::Function { asset, .. } if asset.id == id)
    })
}

/// Call site of the function instance on top of the graph stack.
fn find_caller(comp: &Compilation, function: GraphId) -> Option<NodeRef> {
    comp.call_stack
        .iter()
        .rev()
        .copied()
        .find(|r| comp.functions.get(r) == Some(&function))
}

fn compile_function_input(comp: &mut Compilation, node: &Node, out_box: &NodeBox) -> Value {
    let top = comp.top_graph();
    let caller = find_caller(comp, top);
    let input = match (comp.owner(top), comp.current_node()) {
        (GraphOwner::Function { asset, .. }, Some(me)) => asset.inputs.iter().position(|&i| i == me.node),
        _ => None,
    };

    let value = match (caller, input) {
        (Some(caller), Some(input)) if (input as u32) < FUNCTION_PORTS => {
            let caller_graph = comp.graph(caller.graph);
            let caller_node = caller_graph.node(caller.node);
            if caller_node.is_connected(input as u32) {
                let popped = comp.pop_graph();
                debug_assert_eq!(comp.top_graph(), caller.graph);
                let v = comp.eat_box(caller_node, input as u32);
                if let Some(g) = popped {
                    comp.push_graph(g);
                }
                v
            } else {
                Value::null()
            }
        }
        (Some(_), Some(input)) => {
            comp.error(node, out_box.id, format!("function input {input} out of range"));
            Value::null()
        }
        _ => Value::null(),
    };

    let value = if value.is_valid() {
        value
    } else {
        // Unbound inputs use the default wired inside the function.
        comp.try_get_value(node, 1, Value::zero(out_box.ty))
    };
    if matches!(out_box.ty, ValueType::Void | ValueType::Object) {
        value
    } else {
        value.cast(out_box.ty)
    }
}
