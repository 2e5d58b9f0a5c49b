//! Material graph model: nodes, typed boxes, symmetric connections, parameters.
//!
//! Nodes live in an arena (`Vec<Node>`); connections are stored as
//! [`BoxRef`] index pairs on both endpoints. The JSON envelope keeps node and
//! box *ids* so files stay stable when nodes are reordered.

use std::collections::HashMap;
use std::io::{Read, Write};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::generator::parameters::ParameterKind;
use crate::generator::types::{Value, ValueType};

/// Current graph envelope version.
pub const GRAPH_FORMAT_VERSION: u32 = 2;
/// Oldest envelope version that can still be read (and is flagged deprecated).
pub const MIN_GRAPH_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("unsupported graph version {found} (supported {min}..={max})")]
    UnsupportedVersion { found: u32, min: u32, max: u32 },
    #[error("invalid graph json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("duplicate node id {0}")]
    DuplicateNode(u32),
    #[error("missing node {0}")]
    MissingNode(u32),
    #[error("node {node} has no box {box_id}")]
    MissingBox { node: u32, box_id: u32 },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Node type encoded as `(group << 16) | subtype`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeTypeId(pub u32);

impl NodeTypeId {
    pub const fn new(group: u16, subtype: u16) -> Self {
        Self(((group as u32) << 16) | subtype as u32)
    }

    pub const fn group(self) -> u16 {
        (self.0 >> 16) as u16
    }

    pub const fn subtype(self) -> u16 {
        (self.0 & 0xFFFF) as u16
    }
}

/// The material output node.
pub const ROOT_NODE: NodeTypeId = NodeTypeId::new(1, 1);

/// Literal or asset reference stored on a node or parameter.
#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
pub enum NodeValue {
    #[default]
    Null,
    Bool(bool),
    Int(i32),
    Uint(u32),
    Float(f32),
    Float2([f32; 2]),
    Float3([f32; 3]),
    Float4([f32; 4]),
    Matrix([f32; 16]),
    Guid(Uuid),
    String(String),
}

impl NodeValue {
    pub fn as_f32(&self) -> Option<f32> {
        match self {
            NodeValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            NodeValue::Int(v) => Some(*v as f32),
            NodeValue::Uint(v) => Some(*v as f32),
            NodeValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            NodeValue::Bool(b) => Some(*b as i32),
            NodeValue::Int(v) => Some(*v),
            NodeValue::Uint(v) => i32::try_from(*v).ok(),
            NodeValue::Float(v) if v.is_finite() => Some(*v as i32),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            NodeValue::Bool(b) => Some(*b),
            other => other.as_f32().map(|v| v != 0.0),
        }
    }

    pub fn as_guid(&self) -> Option<Uuid> {
        match self {
            NodeValue::Guid(g) => Some(*g),
            NodeValue::String(s) => Uuid::parse_str(s).ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            NodeValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn value_type(&self) -> ValueType {
        match self {
            NodeValue::Bool(_) => ValueType::Bool,
            NodeValue::Int(_) => ValueType::Int,
            NodeValue::Uint(_) => ValueType::Uint,
            NodeValue::Float(_) => ValueType::Float,
            NodeValue::Float2(_) => ValueType::Float2,
            NodeValue::Float3(_) => ValueType::Float3,
            NodeValue::Float4(_) => ValueType::Float4,
            NodeValue::Matrix(_) => ValueType::Matrix,
            NodeValue::Guid(_) | NodeValue::String(_) => ValueType::Object,
            NodeValue::Null => ValueType::Void,
        }
    }

    /// HLSL literal for numeric values; the null value for everything else.
    pub fn to_value(&self) -> Value {
        match self {
            NodeValue::Bool(b) => Value::bool(*b),
            NodeValue::Int(v) => Value::int(*v),
            NodeValue::Uint(v) => Value::uint(*v),
            NodeValue::Float(v) => Value::float(*v),
            NodeValue::Float2(v) => Value::float2(*v),
            NodeValue::Float3(v) => Value::float3(*v),
            NodeValue::Float4(v) => Value::float4(*v),
            NodeValue::Matrix(m) => {
                let parts: Vec<String> = m
                    .iter()
                    .copied()
                    .map(crate::generator::utils::fmt_f32)
                    .collect();
                Value::new(ValueType::Matrix, format!("float4x4({})", parts.join(",")))
            }
            _ => Value::null(),
        }
    }

    /// Little-endian bytes used as a parameter default.
    pub fn to_bytes(&self) -> Vec<u8> {
        let floats = |v: &[f32]| v.iter().flat_map(|f| f.to_le_bytes()).collect::<Vec<u8>>();
        match self {
            NodeValue::Null => Vec::new(),
            NodeValue::Bool(b) => (*b as u32).to_le_bytes().to_vec(),
            NodeValue::Int(v) => v.to_le_bytes().to_vec(),
            NodeValue::Uint(v) => v.to_le_bytes().to_vec(),
            NodeValue::Float(v) => v.to_le_bytes().to_vec(),
            NodeValue::Float2(v) => floats(v),
            NodeValue::Float3(v) => floats(v),
            NodeValue::Float4(v) => floats(v),
            NodeValue::Matrix(v) => floats(v),
            NodeValue::Guid(g) => g.as_bytes().to_vec(),
            NodeValue::String(s) => s.as_bytes().to_vec(),
        }
    }
}

/// Arena address of a box: node index within the graph and box slot within the node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BoxRef {
    pub node: usize,
    pub slot: usize,
}

/// A typed port owned by a node.
#[derive(Clone, Debug, PartialEq)]
pub struct NodeBox {
    pub id: u32,
    pub ty: ValueType,
    pub connections: Vec<BoxRef>,
}

impl NodeBox {
    pub fn new(id: u32, ty: ValueType) -> Self {
        Self {
            id,
            ty,
            connections: Vec::new(),
        }
    }

    pub fn has_connection(&self) -> bool {
        !self.connections.is_empty()
    }

    pub fn first_connection(&self) -> Option<BoxRef> {
        self.connections.first().copied()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Node {
    pub id: u32,
    pub type_id: NodeTypeId,
    pub boxes: Vec<NodeBox>,
    pub values: Vec<NodeValue>,
    /// Editor-only metadata, carried through untouched.
    pub meta: serde_json::Value,
}

impl Node {
    pub fn new(id: u32, type_id: NodeTypeId) -> Self {
        Self {
            id,
            type_id,
            boxes: Vec::new(),
            values: Vec::new(),
            meta: serde_json::Value::Null,
        }
    }

    pub fn with_box(mut self, id: u32, ty: ValueType) -> Self {
        self.boxes.push(NodeBox::new(id, ty));
        self
    }

    pub fn with_value(mut self, value: NodeValue) -> Self {
        self.values.push(value);
        self
    }

    /// Slot index of the box with the given id.
    pub fn find_box(&self, box_id: u32) -> Option<usize> {
        self.boxes.iter().position(|b| b.id == box_id)
    }

    pub fn get_box(&self, box_id: u32) -> Option<&NodeBox> {
        self.boxes.iter().find(|b| b.id == box_id)
    }

    pub fn is_connected(&self, box_id: u32) -> bool {
        self.get_box(box_id).is_some_and(NodeBox::has_connection)
    }

    pub fn value(&self, index: usize) -> Option<&NodeValue> {
        self.values.get(index)
    }

    pub fn value_f32(&self, index: usize, default: f32) -> f32 {
        self.value(index).and_then(NodeValue::as_f32).unwrap_or(default)
    }

    pub fn value_i32(&self, index: usize, default: i32) -> i32 {
        self.value(index).and_then(NodeValue::as_i32).unwrap_or(default)
    }

    pub fn value_bool(&self, index: usize, default: bool) -> bool {
        self.value(index).and_then(NodeValue::as_bool).unwrap_or(default)
    }
}

/// A user-declared graph parameter.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GraphParameter {
    pub id: Uuid,
    pub name: String,
    pub kind: ParameterKind,
    #[serde(default)]
    pub value: NodeValue,
    #[serde(default = "default_true", rename = "isPublic")]
    pub is_public: bool,
    #[serde(default, rename = "isOverride")]
    pub is_override: bool,
    /// Texture asset for texture parameters.
    #[serde(default)]
    pub asset: Option<Uuid>,
}

fn default_true() -> bool {
    true
}

/// Node container with stable indices for the duration of one compilation.
#[derive(Clone, Debug, Default)]
pub struct Graph {
    nodes: Vec<Node>,
    index: HashMap<u32, usize>,
    pub parameters: Vec<GraphParameter>,
}

/// Result of [`Graph::load`].
#[derive(Debug)]
pub struct LoadedGraph {
    pub graph: Graph,
    /// The envelope used an old version and should be saved again.
    pub deprecated: bool,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn node(&self, index: usize) -> &Node {
        &self.nodes[index]
    }

    /// Add a node, failing if its id is already taken.
    pub fn add_node(&mut self, node: Node) -> Result<usize, GraphError> {
        if self.index.contains_key(&node.id) {
            return Err(GraphError::DuplicateNode(node.id));
        }
        let idx = self.nodes.len();
        self.index.insert(node.id, idx);
        self.nodes.push(node);
        Ok(idx)
    }

    /// Arena index of the node with `id`.
    pub fn find_node(&self, id: u32) -> Option<usize> {
        self.index.get(&id).copied()
    }

    pub fn node_by_id(&self, id: u32) -> Option<&Node> {
        self.find_node(id).map(|i| &self.nodes[i])
    }

    /// Index of the first material output node.
    pub fn root(&self) -> Option<usize> {
        self.nodes.iter().position(|n| n.type_id == ROOT_NODE)
    }

    pub fn box_ref(&self, node_id: u32, box_id: u32) -> Option<BoxRef> {
        let node = self.find_node(node_id)?;
        let slot = self.nodes[node].find_box(box_id)?;
        Some(BoxRef { node, slot })
    }

    pub fn box_at(&self, r: BoxRef) -> &NodeBox {
        &self.nodes[r.node].boxes[r.slot]
    }

    fn box_at_mut(&mut self, r: BoxRef) -> &mut NodeBox {
        &mut self.nodes[r.node].boxes[r.slot]
    }

    pub fn first_connection(&self, r: BoxRef) -> Option<BoxRef> {
        self.box_at(r).first_connection()
    }

    /// Connect two boxes, recording the pairing on both endpoints.
    pub fn connect(&mut self, a: BoxRef, b: BoxRef) {
        if !self.box_at(a).connections.contains(&b) {
            self.box_at_mut(a).connections.push(b);
        }
        if !self.box_at(b).connections.contains(&a) {
            self.box_at_mut(b).connections.push(a);
        }
    }

    pub fn disconnect(&mut self, a: BoxRef, b: BoxRef) {
        self.box_at_mut(a).connections.retain(|c| *c != b);
        self.box_at_mut(b).connections.retain(|c| *c != a);
    }

    /// Connect `(from_node, from_box)` to `(to_node, to_box)` by ids.
    pub fn connect_ids(
        &mut self,
        from_node: u32,
        from_box: u32,
        to_node: u32,
        to_box: u32,
    ) -> Result<(), GraphError> {
        let a = self.resolve_box(from_node, from_box)?;
        let b = self.resolve_box(to_node, to_box)?;
        self.connect(a, b);
        Ok(())
    }

    fn resolve_box(&self, node: u32, box_id: u32) -> Result<BoxRef, GraphError> {
        let n = self.find_node(node).ok_or(GraphError::MissingNode(node))?;
        let slot = self.nodes[n]
            .find_box(box_id)
            .ok_or(GraphError::MissingBox { node, box_id })?;
        Ok(BoxRef { node: n, slot })
    }

    /// True when every connection `a -> b` has a matching `b -> a`.
    pub fn connections_are_symmetric(&self) -> bool {
        self.nodes.iter().enumerate().all(|(ni, n)| {
            n.boxes.iter().enumerate().all(|(si, b)| {
                let me = BoxRef { node: ni, slot: si };
                b.connections.iter().all(|c| {
                    c.node < self.nodes.len()
                        && c.slot < self.nodes[c.node].boxes.len()
                        && self.box_at(*c).connections.contains(&me)
                })
            })
        })
    }

    pub fn find_parameter(&self, id: Uuid) -> Option<&GraphParameter> {
        self.parameters.iter().find(|p| p.id == id)
    }

    /// Parse a graph envelope. Old versions load with `deprecated = true`.
    pub fn load(reader: impl Read, load_meta: bool) -> Result<LoadedGraph, GraphError> {
        let raw: SerializedGraph = serde_json::from_reader(reader)?;
        Self::from_serialized(raw, load_meta)
    }

    pub fn from_json_str(text: &str) -> Result<LoadedGraph, GraphError> {
        let raw: SerializedGraph = serde_json::from_str(text)?;
        Self::from_serialized(raw, true)
    }

    /// Parse an envelope already embedded in a larger JSON document.
    pub fn from_value(value: serde_json::Value) -> Result<LoadedGraph, GraphError> {
        let raw: SerializedGraph = serde_json::from_value(value)?;
        Self::from_serialized(raw, true)
    }

    fn from_serialized(raw: SerializedGraph, load_meta: bool) -> Result<LoadedGraph, GraphError> {
        if !(MIN_GRAPH_FORMAT_VERSION..=GRAPH_FORMAT_VERSION).contains(&raw.version) {
            return Err(GraphError::UnsupportedVersion {
                found: raw.version,
                min: MIN_GRAPH_FORMAT_VERSION,
                max: GRAPH_FORMAT_VERSION,
            });
        }

        let mut graph = Graph::new();
        for sn in &raw.nodes {
            // Version 1 packed group and subtype into `type`.
            let type_id = match sn.group {
                Some(group) => NodeTypeId::new(group, sn.type_id as u16),
                None => NodeTypeId(sn.type_id),
            };
            let mut node = Node::new(sn.id, type_id);
            node.values = sn.values.clone();
            node.boxes = sn.boxes.iter().map(|b| NodeBox::new(b.id, b.ty)).collect();
            if load_meta {
                node.meta = sn.meta.clone();
            }
            graph.add_node(node)?;
        }

        // Version 1 stored connections on one side only; `connect` restores symmetry.
        for sn in &raw.nodes {
            for sb in &sn.boxes {
                for c in &sb.connections {
                    match (
                        graph.box_ref(sn.id, sb.id),
                        graph.box_ref(c.node, c.box_id),
                    ) {
                        (Some(a), Some(b)) => graph.connect(a, b),
                        _ => log::warn!(
                            "dropping connection {}:{} -> {}:{} (missing endpoint)",
                            sn.id,
                            sb.id,
                            c.node,
                            c.box_id
                        ),
                    }
                }
            }
        }

        graph.parameters = raw.parameters;
        Ok(LoadedGraph {
            graph,
            deprecated: raw.version < GRAPH_FORMAT_VERSION,
        })
    }

    /// Write the current envelope version.
    pub fn save(&self, writer: impl Write, save_meta: bool) -> Result<(), GraphError> {
        serde_json::to_writer_pretty(writer, &self.to_serialized(save_meta))?;
        Ok(())
    }

    pub fn to_json(&self) -> Result<String, GraphError> {
        Ok(serde_json::to_string_pretty(&self.to_serialized(true))?)
    }

    fn to_serialized(&self, save_meta: bool) -> SerializedGraph {
        let nodes = self
            .nodes
            .iter()
            .map(|n| SerializedNode {
                id: n.id,
                group: Some(n.type_id.group()),
                type_id: n.type_id.subtype() as u32,
                values: n.values.clone(),
                boxes: n
                    .boxes
                    .iter()
                    .map(|b| SerializedBox {
                        id: b.id,
                        ty: b.ty,
                        connections: b
                            .connections
                            .iter()
                            .map(|c| SerializedEndpoint {
                                node: self.nodes[c.node].id,
                                box_id: self.box_at(*c).id,
                            })
                            .collect(),
                    })
                    .collect(),
                meta: if save_meta { n.meta.clone() } else { serde_json::Value::Null },
            })
            .collect();
        SerializedGraph {
            version: GRAPH_FORMAT_VERSION,
            nodes,
            parameters: self.parameters.clone(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
struct SerializedGraph {
    version: u32,
    #[serde(default)]
    nodes: Vec<SerializedNode>,
    #[serde(default)]
    parameters: Vec<GraphParameter>,
}

#[derive(Debug, Deserialize, Serialize)]
struct SerializedNode {
    id: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    group: Option<u16>,
    #[serde(rename = "type")]
    type_id: u32,
    #[serde(default)]
    values: Vec<NodeValue>,
    #[serde(default)]
    boxes: Vec<SerializedBox>,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    meta: serde_json::Value,
}

#[derive(Debug, Deserialize, Serialize)]
struct SerializedBox {
    id: u32,
    #[serde(rename = "type")]
    ty: ValueType,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    connections: Vec<SerializedEndpoint>,
}

#[derive(Debug, Deserialize, Serialize)]
struct SerializedEndpoint {
    node: u32,
    #[serde(rename = "box")]
    box_id: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_nodes() -> Graph {
        let mut g = Graph::new();
        g.add_node(Node::new(1, ROOT_NODE).with_box(4, ValueType::Float3))
            .unwrap();
        g.add_node(
            Node::new(2, NodeTypeId::new(5, 5))
                .with_box(0, ValueType::Float3)
                .with_value(NodeValue::Float3([1.0, 0.0, 0.0])),
        )
        .unwrap();
        g
    }

    #[test]
    fn connect_is_symmetric_and_deduplicated() {
        let mut g = two_nodes();
        g.connect_ids(2, 0, 1, 4).unwrap();
        g.connect_ids(1, 4, 2, 0).unwrap();
        assert!(g.connections_are_symmetric());
        let root_box = g.box_ref(1, 4).unwrap();
        assert_eq!(g.box_at(root_box).connections.len(), 1);

        let src = g.box_ref(2, 0).unwrap();
        g.disconnect(src, root_box);
        assert!(!g.box_at(root_box).has_connection());
        assert!(!g.box_at(src).has_connection());
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let mut g = two_nodes();
        assert!(matches!(
            g.add_node(Node::new(1, ROOT_NODE)),
            Err(GraphError::DuplicateNode(1))
        ));
    }

    #[test]
    fn save_then_load_keeps_connections() {
        let mut g = two_nodes();
        g.connect_ids(2, 0, 1, 4).unwrap();
        let json = g.to_json().unwrap();
        let loaded = Graph::from_json_str(&json).unwrap();
        assert!(!loaded.deprecated);
        let g2 = loaded.graph;
        assert!(g2.node_by_id(1).unwrap().is_connected(4));
        assert!(g2.connections_are_symmetric());
        assert_eq!(g2.node_by_id(2).unwrap().type_id, NodeTypeId::new(5, 5));
    }

    #[test]
    fn version_one_is_deprecated_and_symmetrized() {
        let json = r#"{
            "version": 1,
            "nodes": [
                { "id": 1, "type": 65537, "boxes": [ { "id": 4, "type": "Float3",
                    "connections": [ { "node": 2, "box": 0 } ] } ] },
                { "id": 2, "type": 327685, "boxes": [ { "id": 0, "type": "Float3" } ] }
            ]
        }"#;
        let loaded = Graph::from_json_str(json).unwrap();
        assert!(loaded.deprecated);
        assert_eq!(loaded.graph.node_by_id(1).unwrap().type_id, ROOT_NODE);
        assert!(loaded.graph.node_by_id(2).unwrap().is_connected(0));
    }

    #[test]
    fn unsupported_version_fails() {
        let err = Graph::from_json_str(r#"{ "version": 99, "nodes": [] }"#).unwrap_err();
        assert!(matches!(err, GraphError::UnsupportedVersion { found: 99, .. }));
    }

    #[test]
    fn dangling_connections_are_dropped() {
        let json = r#"{ "version": 2, "nodes": [
            { "id": 1, "group": 1, "type": 1, "boxes": [ { "id": 4, "type": "Float3",
                "connections": [ { "node": 9, "box": 0 } ] } ] } ] }"#;
        let g = Graph::from_json_str(json).unwrap().graph;
        assert!(!g.node_by_id(1).unwrap().is_connected(4));
    }
}
