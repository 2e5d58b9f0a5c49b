//! Per-compilation evaluator state and the memoised box walk.
//!
//! Every graph taking part in one compilation (the material itself, each
//! sampled layer, each inlined function call site) is a [`GraphInstance`] with
//! its own box cache. Evaluation always happens relative to the graph on top of
//! `graph_stack`; `call_stack` records which nodes are being evaluated so that
//! function inputs can find their caller and cycles are caught.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use uuid::Uuid;

use super::layers::Layer;
use super::node_compiler;
use super::parameters::ParameterTable;
use super::types::{Value, ValueType};
use super::writer::ShaderWriter;
use crate::asset_store::{AssetStore, FunctionAsset};
use crate::error::GeneratorError;
use crate::graph::{BoxRef, Graph, Node};
use crate::material_info::MaterialInfo;
use crate::particles::attributes::ParticleLayout;

/// Shader stage a function body is generated for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderTree {
    Vertex,
    Domain,
    Pixel,
    /// Particle simulation (emitter graphs).
    Compute,
}

impl ShaderTree {
    /// Trees of a material, in generation order.
    pub const ALL: [ShaderTree; 3] = [ShaderTree::Vertex, ShaderTree::Domain, ShaderTree::Pixel];

    pub fn suffix(self) -> &'static str {
        match self {
            ShaderTree::Vertex => "VS",
            ShaderTree::Domain => "DS",
            ShaderTree::Pixel => "PS",
            ShaderTree::Compute => "CS",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompilationMode {
    Material,
    Emitter,
}

/// Index of a graph instance within one compilation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GraphId(pub usize);

/// A node of a specific graph instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeRef {
    pub graph: GraphId,
    pub node: usize,
}

#[derive(Debug)]
pub(crate) enum GraphOwner {
    /// Root graph of `layers[i]`.
    Layer(usize),
    /// Function inlined at `call_site`.
    Function {
        asset: Arc<FunctionAsset>,
        call_site: NodeRef,
    },
    Emitter,
}

#[derive(Debug)]
pub(crate) struct GraphInstance {
    pub(crate) graph: Arc<Graph>,
    pub(crate) owner: GraphOwner,
    cache: Vec<Vec<Option<Value>>>,
}

impl GraphInstance {
    pub(crate) fn new(graph: Arc<Graph>, owner: GraphOwner) -> Self {
        let cache = graph.nodes().iter().map(|n| vec![None; n.boxes.len()]).collect();
        Self { graph, owner, cache }
    }

    fn clear_cache(&mut self) {
        for slots in &mut self.cache {
            slots.iter_mut().for_each(|s| *s = None);
        }
    }
}

/// All mutable state of one material (or emitter) compilation.
pub struct Compilation {
    pub writer: ShaderWriter,
    pub params: ParameterTable,
    pub current_tree: ShaderTree,
    pub mode: CompilationMode,
    pub particle_layout: ParticleLayout,
    pub(crate) assets: AssetStore,
    pub(crate) material_id: Uuid,
    pub(crate) graphs: Vec<GraphInstance>,
    pub(crate) graph_stack: Vec<GraphId>,
    pub(crate) call_stack: Vec<NodeRef>,
    pub(crate) functions: HashMap<NodeRef, GraphId>,
    pub(crate) layers: Vec<Layer>,
    pub(crate) current_layer: usize,
    ddx: Option<Value>,
    ddy: Option<Value>,
    includes: BTreeSet<String>,
    dependencies: Vec<Uuid>,
    errors: Vec<GeneratorError>,
    reported: HashSet<GeneratorError>,
}

impl Compilation {
    /// Start a material compilation; the material graph becomes layer 0.
    pub fn new_material(id: Uuid, graph: Arc<Graph>, info: MaterialInfo, assets: AssetStore) -> Self {
        let mut c = Self::empty(id, assets, CompilationMode::Material);
        c.add_layer(id, graph, info);
        c.graph_stack.push(c.layers[0].graph);
        c
    }

    /// Start a particle emitter compilation over `graph`.
    pub fn new_emitter(id: Uuid, graph: Arc<Graph>, assets: AssetStore) -> Self {
        let mut c = Self::empty(id, assets, CompilationMode::Emitter);
        c.current_tree = ShaderTree::Compute;
        for p in &graph.parameters {
            c.params.add_graph_parameter(p, p.id);
        }
        c.graphs.push(GraphInstance::new(graph, GraphOwner::Emitter));
        c.graph_stack.push(GraphId(0));
        c
    }

    fn empty(id: Uuid, assets: AssetStore, mode: CompilationMode) -> Self {
        Self {
            writer: ShaderWriter::new(),
            params: ParameterTable::new(),
            current_tree: ShaderTree::Pixel,
            mode,
            particle_layout: ParticleLayout::new(),
            assets,
            material_id: id,
            graphs: Vec::new(),
            graph_stack: Vec::new(),
            call_stack: Vec::new(),
            functions: HashMap::new(),
            layers: Vec::new(),
            current_layer: 0,
            ddx: None,
            ddy: None,
            includes: BTreeSet::new(),
            dependencies: Vec::new(),
            errors: Vec::new(),
            reported: HashSet::new(),
        }
    }

    pub fn material_id(&self) -> Uuid {
        self.material_id
    }

    /// Info of the material being compiled (layer 0).
    pub fn root_info(&self) -> Option<&MaterialInfo> {
        self.layers.first().map(|l| &l.info)
    }

    pub fn errors(&self) -> &[GeneratorError] {
        &self.errors
    }

    pub fn includes(&self) -> impl Iterator<Item = &str> {
        self.includes.iter().map(String::as_str)
    }

    pub fn add_include(&mut self, path: &str) {
        self.includes.insert(path.to_string());
    }

    /// Assets (layers, functions) resolved during this compilation, in first-use order.
    pub fn dependencies(&self) -> &[Uuid] {
        &self.dependencies
    }

    pub(crate) fn add_dependency(&mut self, id: Uuid) {
        if id != self.material_id && !self.dependencies.contains(&id) {
            self.dependencies.push(id);
        }
    }

    /// Record a generator error once per `(node, box, message)`.
    pub fn error(&mut self, node: &Node, box_id: u32, message: impl Into<String>) {
        let e = GeneratorError {
            node_id: node.id,
            box_id,
            message: message.into(),
        };
        if self.reported.insert(e.clone()) {
            log::error!("material {}: {e}", self.material_id);
            self.errors.push(e);
        }
    }

    // -----------------------------------------------------------------------
    // Graph stack
    // -----------------------------------------------------------------------

    pub(crate) fn top_graph(&self) -> GraphId {
        self.graph_stack.last().copied().unwrap_or(GraphId(0))
    }

    pub(crate) fn graph(&self, id: GraphId) -> Arc<Graph> {
        self.graphs[id.0].graph.clone()
    }

    pub(crate) fn owner(&self, id: GraphId) -> &GraphOwner {
        &self.graphs[id.0].owner
    }

    pub(crate) fn add_graph(&mut self, graph: Arc<Graph>, owner: GraphOwner) -> GraphId {
        self.graphs.push(GraphInstance::new(graph, owner));
        GraphId(self.graphs.len() - 1)
    }

    pub(crate) fn push_graph(&mut self, id: GraphId) {
        self.graph_stack.push(id);
    }

    pub(crate) fn pop_graph(&mut self) -> Option<GraphId> {
        self.graph_stack.pop()
    }

    /// The node currently being evaluated.
    pub(crate) fn current_node(&self) -> Option<NodeRef> {
        self.call_stack.last().copied()
    }

    // -----------------------------------------------------------------------
    // Box evaluation
    // -----------------------------------------------------------------------

    /// Value flowing into input `box_id` of `node` (a node of the top graph).
    ///
    /// Returns the null value when the box is missing or unconnected.
    pub fn eat_box(&mut self, node: &Node, box_id: u32) -> Value {
        let Some(src) = node.get_box(box_id).and_then(|b| b.first_connection()) else {
            return Value::null();
        };
        self.eat_output(src)
    }

    /// Value of input `box_id`, cast to the box kind, or `default` when unconnected.
    pub fn try_get_value(&mut self, node: &Node, box_id: u32, default: Value) -> Value {
        let v = self.eat_box(node, box_id);
        if !v.is_valid() {
            return default;
        }
        match node.get_box(box_id).map(|b| b.ty) {
            Some(ValueType::Void) | Some(ValueType::Object) | None => v,
            Some(ty) => v.cast(ty),
        }
    }

    /// Value of input `box_id`, defaulting to the node literal `values[value_index]`
    /// and then to zero of the box kind.
    pub fn try_get_value_or_literal(&mut self, node: &Node, box_id: u32, value_index: usize) -> Value {
        let ty = node.get_box(box_id).map(|b| b.ty).unwrap_or(ValueType::Float);
        let literal = node
            .value(value_index)
            .map(|v| v.to_value())
            .filter(Value::is_valid)
            .map(|v| if matches!(ty, ValueType::Void | ValueType::Object) { v } else { v.cast(ty) })
            .unwrap_or_else(|| Value::zero(ty));
        self.try_get_value(node, box_id, literal)
    }

    /// Evaluate the output box `src` of the top graph, memoised per graph instance.
    pub(crate) fn eat_output(&mut self, src: BoxRef) -> Value {
        let gid = self.top_graph();
        if let Some(v) = self.graphs[gid.0].cache[src.node][src.slot].clone() {
            return v;
        }
        let graph = self.graph(gid);
        let producer = graph.node(src.node);
        let out_box = &producer.boxes[src.slot];
        let me = NodeRef {
            graph: gid,
            node: src.node,
        };
        if self.call_stack.contains(&me) {
            self.error(producer, out_box.id, "graph contains a cycle");
            return Value::zero(out_box.ty);
        }

        self.call_stack.push(me);
        let depth = self.graph_stack.len();
        let value = node_compiler::process_node(self, producer, out_box);
        debug_assert_eq!(depth, self.graph_stack.len(), "graph stack not restored");
        self.call_stack.pop();

        let value = if value.is_valid() { value } else { Value::zero(out_box.ty) };
        self.graphs[gid.0].cache[src.node][src.slot] = Some(value.clone());
        value
    }

    /// Pre-fill the cache of a sibling output box of `node` (top graph).
    pub fn set_box_cache(&mut self, node: &Node, box_id: u32, value: Value) {
        let gid = self.top_graph();
        let instance = &mut self.graphs[gid.0];
        let Some(r) = instance.graph.box_ref(node.id, box_id) else {
            return;
        };
        instance.cache[r.node][r.slot] = Some(value);
    }

    /// Forget cached values of `id` and of every function inlined from it.
    pub(crate) fn reset_graph_cache(&mut self, id: GraphId) {
        self.graphs[id.0].clear_cache();
        let nested: Vec<GraphId> = self
            .functions
            .iter()
            .filter(|(site, _)| site.graph == id)
            .map(|(_, g)| *g)
            .collect();
        for g in nested {
            self.reset_graph_cache(g);
        }
    }

    /// Start a new function body: locals of the previous tree are out of scope.
    pub(crate) fn begin_tree(&mut self, tree: ShaderTree) {
        self.current_tree = tree;
        for g in &mut self.graphs {
            g.clear_cache();
        }
        self.ddx = None;
        self.ddy = None;
        for layer in &mut self.layers {
            layer.reset_usages();
        }
    }

    /// Screen-space derivatives of the texture coordinates, emitted on first use.
    ///
    /// Outside the pixel shader they are zero.
    pub fn uv_derivatives(&mut self) -> (Value, Value) {
        if self.current_tree != ShaderTree::Pixel {
            return (Value::zero(ValueType::Float2), Value::zero(ValueType::Float2));
        }
        if self.ddx.is_none() {
            self.ddx = Some(
                self.writer
                    .write_local(ValueType::Float2, Some("ddx(input.TexCoord.xy)"), None),
            );
            self.ddy = Some(
                self.writer
                    .write_local(ValueType::Float2, Some("ddy(input.TexCoord.xy)"), None),
            );
        }
        match (&self.ddx, &self.ddy) {
            (Some(x), Some(y)) => (x.clone(), y.clone()),
            _ => (Value::zero(ValueType::Float2), Value::zero(ValueType::Float2)),
        }
    }

    /// Default texture coordinates of the current vertex or pixel.
    pub fn tex_coord(&self) -> Value {
        Value::new(ValueType::Float2, "input.TexCoord.xy")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{NodeTypeId, NodeValue};

    fn constant(id: u32, v: f32) -> Node {
        Node::new(id, NodeTypeId::new(5, 3))
            .with_box(0, ValueType::Float)
            .with_value(NodeValue::Float(v))
    }

    fn graph_with_add() -> Graph {
        let mut g = Graph::new();
        g.add_node(Node::new(1, crate::graph::ROOT_NODE).with_box(7, ValueType::Float))
            .unwrap();
        g.add_node(constant(2, 0.25)).unwrap();
        g.add_node(
            Node::new(3, NodeTypeId::new(5, 20))
                .with_box(0, ValueType::Float)
                .with_box(1, ValueType::Float)
                .with_box(2, ValueType::Float),
        )
        .unwrap();
        g.connect_ids(2, 0, 3, 0).unwrap();
        g.connect_ids(2, 0, 3, 1).unwrap();
        g.connect_ids(3, 2, 1, 7).unwrap();
        g
    }

    #[test]
    fn unconnected_box_yields_default() {
        let g = Arc::new(graph_with_add());
        let mut c = Compilation::new_material(Uuid::new_v4(), g.clone(), MaterialInfo::default(), AssetStore::new());
        let add = g.node_by_id(3).unwrap();
        let v = c.try_get_value(add, 9, Value::float(0.4));
        assert_eq!(v.expr, "0.4");
    }

    #[test]
    fn producer_is_evaluated_once() {
        let g = Arc::new(graph_with_add());
        let mut c = Compilation::new_material(Uuid::new_v4(), g.clone(), MaterialInfo::default(), AssetStore::new());
        let root = g.node_by_id(1).unwrap();
        let v = c.eat_box(root, 7);
        assert_eq!(v.expr, "(0.25 + 0.25)");
        assert!(c.call_stack.is_empty());
        assert_eq!(c.graph_stack.len(), 1);
        let again = c.eat_box(root, 7);
        assert_eq!(again, v);
    }

    #[test]
    fn cycles_are_reported_not_followed() {
        let mut g = Graph::new();
        g.add_node(Node::new(1, crate::graph::ROOT_NODE).with_box(7, ValueType::Float))
            .unwrap();
        g.add_node(
            Node::new(2, NodeTypeId::new(5, 44))
                .with_box(0, ValueType::Float)
                .with_box(1, ValueType::Float),
        )
        .unwrap();
        // One Minus feeding itself.
        g.connect_ids(2, 1, 2, 0).unwrap();
        g.connect_ids(2, 1, 1, 7).unwrap();
        let g = Arc::new(g);
        let mut c = Compilation::new_material(Uuid::new_v4(), g.clone(), MaterialInfo::default(), AssetStore::new());
        let root = g.node_by_id(1).unwrap();
        let _ = c.eat_box(root, 7);
        assert_eq!(c.errors().len(), 1);
        assert!(c.errors()[0].message.contains("cycle"));
    }
}
