//! Material layers: sub-materials sampled into `MaterialLayer` struct locals.
//!
//! Layer 0 is always the material being compiled. Other layers are loaded on
//! first use by a Sample Layer or Get Layer Parameter node and live until the
//! compilation ends. Each layer tracks up to [`MAX_LAYER_USAGES`] distinct UV
//! inputs per shader tree; every UV key gets its own struct local.

use std::sync::Arc;

use uuid::Uuid;

use super::compilation::{Compilation, CompilationMode, GraphId, GraphOwner};
use super::material::{LAYER_BOX, MaterialChannel};
use super::parameters::ParameterRemap;
use super::types::{Value, ValueType};
use crate::graph::{BoxRef, Graph, Node};
use crate::material_info::{MaterialInfo, UsageFlags};

/// Number of UV-keyed slots per layer.
pub const MAX_LAYER_USAGES: usize = 4;

/// HLSL type of the material struct.
pub const MATERIAL_STRUCT: &str = "MaterialLayer";

/// Producer box of a UV connection, qualified by its graph instance.
pub type UvKey = (GraphId, BoxRef);

#[derive(Clone, Debug, Default, PartialEq)]
pub struct LayerUsage {
    pub var_name: String,
    pub hint: Option<UvKey>,
}

#[derive(Debug)]
pub struct Layer {
    pub id: Uuid,
    pub graph: GraphId,
    /// Arena index of the material output node, if the graph has one.
    pub root: Option<usize>,
    pub info: MaterialInfo,
    /// Inputs consumed so far; unioned into layer 0 after each sample.
    pub usage: UsageFlags,
    pub param_remap: ParameterRemap,
    pub usages: [LayerUsage; MAX_LAYER_USAGES],
}

impl Layer {
    pub(crate) fn reset_usages(&mut self) {
        self.usages = Default::default();
    }
}

/// How two layers are combined per channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlendMode {
    Linear,
    Add,
    Height,
}

impl Compilation {
    /// Register a layer graph and its parameters; returns the layer index.
    pub(crate) fn add_layer(&mut self, id: Uuid, graph: Arc<Graph>, info: MaterialInfo) -> usize {
        let index = self.layers.len();
        let root = graph.root();
        let mut remap = ParameterRemap::new();
        for p in &graph.parameters {
            let target = if self.params.find_by_id(p.id).is_some() {
                Uuid::new_v5(&id, p.id.as_bytes())
            } else {
                p.id
            };
            remap.insert(p.id, target);
            self.params.add_graph_parameter(p, target);
        }
        let gid = self.add_graph(graph, GraphOwner::Layer(index));
        self.layers.push(Layer {
            id,
            graph: gid,
            root,
            info,
            usage: UsageFlags::empty(),
            param_remap: remap,
            usages: Default::default(),
        });
        index
    }

    /// Record `flags` on the layer being evaluated. Emitters have no layers.
    pub(crate) fn add_layer_usage(&mut self, flags: UsageFlags) {
        if let Some(layer) = self.layers.get_mut(self.current_layer) {
            layer.usage |= flags;
        }
    }

    /// Find or load the layer for material `id` on behalf of `caller`.
    pub(crate) fn get_layer(&mut self, caller: &Node, box_id: u32, id: Uuid) -> Option<usize> {
        if self.mode == CompilationMode::Emitter {
            self.error(caller, box_id, "material layers are not available in particle emitters");
            return None;
        }
        if let Some(i) = self.layers.iter().position(|l| l.id == id) {
            return Some(i);
        }
        let Some(asset) = self.assets.material(id) else {
            self.error(caller, box_id, format!("missing material layer {id}"));
            return None;
        };
        self.add_dependency(id);
        if let Some(root) = self.root_info() {
            if !root.is_compatible_layer(&asset.info) {
                let msg = format!(
                    "layer {id} has domain {:?}, expected {:?}",
                    asset.info.domain, root.domain
                );
                self.error(caller, box_id, msg);
                return None;
            }
        }
        Some(self.add_layer(id, asset.graph.clone(), asset.info))
    }

    /// Layer whose parameters are visible from graph `id`.
    pub(crate) fn owning_layer(&self, mut id: GraphId) -> Option<usize> {
        loop {
            match self.owner(id) {
                GraphOwner::Layer(i) => return Some(*i),
                GraphOwner::Function { call_site, .. } => id = call_site.graph,
                GraphOwner::Emitter => return None,
            }
        }
    }

    /// UV slot of `layer` for `key`; `None` keys use slot 0.
    pub(crate) fn layer_usage_slot(&mut self, layer: usize, key: Option<UvKey>, caller: &Node, box_id: u32) -> usize {
        let Some(key) = key else {
            return 0;
        };
        let usages = &mut self.layers[layer].usages;
        if let Some(i) = (1..MAX_LAYER_USAGES).find(|&i| usages[i].hint == Some(key)) {
            return i;
        }
        if let Some(i) = (1..MAX_LAYER_USAGES).find(|&i| usages[i].hint.is_none()) {
            usages[i].hint = Some(key);
            return i;
        }
        let id = self.layers[layer].id;
        log::warn!(
            "material {}: layer {id} sampled with more than {MAX_LAYER_USAGES} UV inputs, falling back to the default UVs",
            self.material_id
        );
        self.error(caller, box_id, format!("too many UV inputs for layer {id}"));
        0
    }

    /// Sample `layer` from the Sample Layer node `caller`, whose UV input is `uv_box`.
    pub(crate) fn sample_layer(&mut self, caller: &Node, out_box: u32, layer: usize, uv_box: u32) -> Value {
        let gid = self.layers[layer].graph;
        if self.graph_stack.contains(&gid) {
            self.error(caller, out_box, "layer samples itself");
            return Value::null();
        }
        let key = caller
            .get_box(uv_box)
            .and_then(|b| b.first_connection())
            .map(|r| (self.top_graph(), r));
        let slot = self.layer_usage_slot(layer, key, caller, out_box);
        // The overflow fallback samples with the default UVs.
        let custom_uv = key.is_some() && slot != 0;
        if !self.layers[layer].usages[slot].var_name.is_empty() {
            return Value::new(ValueType::Object, self.layers[layer].usages[slot].var_name.clone());
        }

        let uv = if custom_uv {
            Some(self.try_get_value(caller, uv_box, self.tex_coord()).cast(ValueType::Float2))
        } else {
            None
        };
        let var = self.writer.write_struct_local(MATERIAL_STRUCT, ValueType::Object);
        self.layers[layer].usages[slot].var_name = var.expr.clone();

        let snapshot = uv.map(|uv| {
            let saved = self
                .writer
                .write_local(ValueType::Float2, Some("input.TexCoord.xy"), Some(caller.id));
            self.writer.write("input.TexCoord.xy = {0};", &[&uv]);
            saved
        });

        self.reset_graph_cache(gid);
        self.evaluate_layer(layer, &var.expr);

        if let Some(saved) = snapshot {
            self.writer.write("input.TexCoord.xy = {0};", &[&saved]);
        }

        let usage = self.layers[layer].usage;
        self.layers[0].usage |= usage;
        var
    }

    /// Fill struct local `var` with every channel of the current tree from `layer`'s root.
    pub(crate) fn evaluate_layer(&mut self, layer: usize, var: &str) {
        let prev_layer = std::mem::replace(&mut self.current_layer, layer);
        let gid = self.layers[layer].graph;
        self.push_graph(gid);

        let graph = self.graph(gid);
        let target = Value::new(ValueType::Object, var);
        match self.layers[layer].root.map(|r| graph.node(r)) {
            Some(root) if root.is_connected(LAYER_BOX) => {
                let v = self.eat_box(root, LAYER_BOX);
                if v.is_valid() {
                    self.writer.write("{0} = {1};", &[&target, &v]);
                } else {
                    self.write_default_channels(var);
                }
            }
            Some(root) => {
                for ch in MaterialChannel::for_tree(self.current_tree) {
                    let v = self.try_get_value(root, ch.box_id(), ch.default_value());
                    self.writer
                        .write_line(&format!("{var}.{} = {};", ch.name(), v.expr));
                    if root.is_connected(ch.box_id()) {
                        self.layers[layer].usage |= ch.usage_flag();
                    }
                }
            }
            None => self.write_default_channels(var),
        }

        self.pop_graph();
        self.current_layer = prev_layer;
    }

    fn write_default_channels(&mut self, var: &str) {
        for ch in MaterialChannel::for_tree(self.current_tree) {
            self.writer
                .write_line(&format!("{var}.{} = {};", ch.name(), ch.default_value().expr));
        }
    }

    /// A struct local holding the tree defaults.
    pub(crate) fn write_default_layer(&mut self) -> Value {
        let var = self.writer.write_struct_local(MATERIAL_STRUCT, ValueType::Object);
        self.write_default_channels(&var.expr);
        var
    }

    /// Blend `bottom` and `top` struct locals into a new struct local.
    pub(crate) fn blend_layers(&mut self, bottom: &Value, top: &Value, alpha: &Value, mode: BlendMode) -> Value {
        let result = self.writer.write_struct_local(MATERIAL_STRUCT, ValueType::Object);
        for ch in MaterialChannel::for_tree(self.current_tree) {
            self.write_blending(ch, &result, bottom, top, alpha, mode);
        }
        result
    }

    fn write_blending(
        &mut self,
        ch: MaterialChannel,
        result: &Value,
        bottom: &Value,
        top: &Value,
        alpha: &Value,
        mode: BlendMode,
    ) {
        let name = ch.name();
        let (r, b, t, a) = (&result.expr, &bottom.expr, &top.expr, &alpha.expr);
        let line = match (mode, ch) {
            (BlendMode::Add, MaterialChannel::Normal) => {
                format!("{r}.{name} = normalize({b}.{name} + {t}.{name} * {a});")
            }
            (BlendMode::Add, _) if ch.kind().is_scalar() => {
                format!("{r}.{name} = saturate({b}.{name} + {t}.{name} * {a});")
            }
            (BlendMode::Add, _) => format!("{r}.{name} = {b}.{name} + {t}.{name} * {a};"),
            (_, MaterialChannel::Normal) => {
                format!("{r}.{name} = normalize(lerp({b}.{name}, {t}.{name}, {a}));")
            }
            _ => format!("{r}.{name} = lerp({b}.{name}, {t}.{name}, {a});"),
        };
        self.writer.write_line(&line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset_store::{AssetStore, MaterialAsset};
    use crate::graph::{NodeTypeId, NodeValue, ROOT_NODE};
    use crate::material_info::MaterialDomain;

    fn root_only() -> Graph {
        let mut g = Graph::new();
        let mut root = Node::new(1, ROOT_NODE);
        for ch in MaterialChannel::ALL {
            root = root.with_box(ch.box_id(), ch.kind());
        }
        root = root.with_box(LAYER_BOX, ValueType::Object);
        g.add_node(root).unwrap();
        g
    }

    #[test]
    fn fifth_uv_key_falls_back_to_slot_zero() {
        let mut c = Compilation::new_material(
            Uuid::new_v4(),
            Arc::new(root_only()),
            MaterialInfo::default(),
            AssetStore::new(),
        );
        let caller = Node::new(9, NodeTypeId::new(6, 1));
        let key = |n| Some((GraphId(0), BoxRef { node: n, slot: 0 }));
        assert_eq!(c.layer_usage_slot(0, None, &caller, 0), 0);
        assert_eq!(c.layer_usage_slot(0, key(1), &caller, 0), 1);
        assert_eq!(c.layer_usage_slot(0, key(2), &caller, 0), 2);
        assert_eq!(c.layer_usage_slot(0, key(1), &caller, 0), 1);
        assert_eq!(c.layer_usage_slot(0, key(3), &caller, 0), 3);
        assert_eq!(c.layer_usage_slot(0, key(4), &caller, 0), 0);
        assert_eq!(c.errors().len(), 1);
    }

    #[test]
    fn incompatible_domain_is_rejected() {
        let assets = AssetStore::new();
        let layer_id = Uuid::new_v4();
        assets.insert_material(MaterialAsset {
            id: layer_id,
            info: MaterialInfo {
                domain: MaterialDomain::Decal,
                ..MaterialInfo::default()
            },
            graph: Arc::new(root_only()),
            path: None,
        });
        let mut c = Compilation::new_material(
            Uuid::new_v4(),
            Arc::new(root_only()),
            MaterialInfo::default(),
            assets,
        );
        let caller = Node::new(9, NodeTypeId::new(6, 1)).with_value(NodeValue::Guid(layer_id));
        assert_eq!(c.get_layer(&caller, 0, layer_id), None);
        assert!(c.errors()[0].message.contains("domain"));
    }

    #[test]
    fn colliding_parameter_ids_are_remapped() {
        let shared = crate::graph::GraphParameter {
            id: Uuid::new_v4(),
            name: "Tint".into(),
            kind: crate::generator::parameters::ParameterKind::Vector,
            value: NodeValue::Float3([1.0; 3]),
            is_public: true,
            is_override: false,
            asset: None,
        };
        let mut root = root_only();
        root.parameters.push(shared.clone());
        let mut layer_graph = root_only();
        layer_graph.parameters.push(shared.clone());

        let mut c = Compilation::new_material(
            Uuid::new_v4(),
            Arc::new(root),
            MaterialInfo::default(),
            AssetStore::new(),
        );
        let layer_id = Uuid::new_v4();
        let l = c.add_layer(layer_id, Arc::new(layer_graph), MaterialInfo::default());
        let mapped = c.layers[l].param_remap[&shared.id];
        assert_ne!(mapped, shared.id);
        assert_eq!(mapped, Uuid::new_v5(&layer_id, shared.id.as_bytes()));
        assert_eq!(c.params.len(), 2);
    }
}
