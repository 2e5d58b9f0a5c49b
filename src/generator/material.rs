//! Material output channels and the per-tree driver that produces the final source.

use std::fmt::Write as _;
use std::sync::Arc;

use uuid::Uuid;

use super::compilation::{Compilation, ShaderTree};
use super::layers::MATERIAL_STRUCT;
use super::types::{Value, ValueType};
use super::writer::ShaderWriter;
use crate::asset_store::AssetStore;
use crate::error::GeneratorError;
use crate::graph::{Graph, Node, ROOT_NODE};
use crate::material_info::{MaterialInfo, UsageFlags};

/// Root-node box carrying a whole `MaterialLayer` (overrides the per-channel boxes).
pub const LAYER_BOX: u32 = 14;

/// Shared include every generated material starts with.
pub const MATERIAL_COMMON_INCLUDE: &str = "Material/MaterialCommon.hlsl";

/// One output slot of the material root node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MaterialChannel {
    PositionOffset,
    TessellationMultiplier,
    WorldDisplacement,
    Normal,
    Color,
    Metalness,
    Specular,
    Roughness,
    AmbientOcclusion,
    Opacity,
    Refraction,
    Mask,
    Emissive,
    SubsurfaceColor,
}

impl MaterialChannel {
    pub const ALL: [MaterialChannel; 14] = [
        MaterialChannel::PositionOffset,
        MaterialChannel::TessellationMultiplier,
        MaterialChannel::WorldDisplacement,
        MaterialChannel::Normal,
        MaterialChannel::Color,
        MaterialChannel::Metalness,
        MaterialChannel::Specular,
        MaterialChannel::Roughness,
        MaterialChannel::AmbientOcclusion,
        MaterialChannel::Opacity,
        MaterialChannel::Refraction,
        MaterialChannel::Mask,
        MaterialChannel::Emissive,
        MaterialChannel::SubsurfaceColor,
    ];

    /// Root box id; channels are numbered in table order.
    pub fn box_id(self) -> u32 {
        self as u32
    }

    pub fn from_box_id(id: u32) -> Option<Self> {
        Self::ALL.get(id as usize).copied()
    }

    /// Field name in `MaterialLayer`.
    pub fn name(self) -> &'static str {
        match self {
            MaterialChannel::PositionOffset => "PositionOffset",
            MaterialChannel::TessellationMultiplier => "TessellationMultiplier",
            MaterialChannel::WorldDisplacement => "WorldDisplacement",
            MaterialChannel::Normal => "Normal",
            MaterialChannel::Color => "Color",
            MaterialChannel::Metalness => "Metalness",
            MaterialChannel::Specular => "Specular",
            MaterialChannel::Roughness => "Roughness",
            MaterialChannel::AmbientOcclusion => "AmbientOcclusion",
            MaterialChannel::Opacity => "Opacity",
            MaterialChannel::Refraction => "Refraction",
            MaterialChannel::Mask => "Mask",
            MaterialChannel::Emissive => "Emissive",
            MaterialChannel::SubsurfaceColor => "SubsurfaceColor",
        }
    }

    pub fn kind(self) -> ValueType {
        match self {
            MaterialChannel::PositionOffset
            | MaterialChannel::WorldDisplacement
            | MaterialChannel::Normal
            | MaterialChannel::Color
            | MaterialChannel::Emissive
            | MaterialChannel::SubsurfaceColor => ValueType::Float3,
            _ => ValueType::Float,
        }
    }

    pub fn tree(self) -> ShaderTree {
        match self {
            MaterialChannel::PositionOffset | MaterialChannel::TessellationMultiplier => ShaderTree::Vertex,
            MaterialChannel::WorldDisplacement => ShaderTree::Domain,
            _ => ShaderTree::Pixel,
        }
    }

    /// Value used when the channel box is disconnected.
    pub fn default_value(self) -> Value {
        match self {
            MaterialChannel::Normal => Value::float3([0.0, 0.0, 1.0]),
            MaterialChannel::Color => Value::float3([0.5; 3]),
            MaterialChannel::SubsurfaceColor => Value::float3([1.0; 3]),
            MaterialChannel::PositionOffset
            | MaterialChannel::WorldDisplacement
            | MaterialChannel::Emissive => Value::float3([0.0; 3]),
            MaterialChannel::Metalness => Value::float(0.0),
            MaterialChannel::Specular => Value::float(0.5),
            MaterialChannel::Roughness => Value::float(0.4),
            MaterialChannel::TessellationMultiplier
            | MaterialChannel::AmbientOcclusion
            | MaterialChannel::Opacity
            | MaterialChannel::Refraction
            | MaterialChannel::Mask => Value::float(1.0),
        }
    }

    /// Usage bit raised when the channel is driven by the graph.
    pub fn usage_flag(self) -> UsageFlags {
        match self {
            MaterialChannel::PositionOffset => UsageFlags::USE_POSITION_OFFSET,
            MaterialChannel::WorldDisplacement => UsageFlags::USE_DISPLACEMENT,
            MaterialChannel::Normal => UsageFlags::USE_NORMAL,
            MaterialChannel::Emissive => UsageFlags::USE_EMISSIVE,
            MaterialChannel::Refraction => UsageFlags::USE_REFRACTION,
            MaterialChannel::Mask => UsageFlags::USE_MASK,
            _ => UsageFlags::empty(),
        }
    }

    pub fn for_tree(tree: ShaderTree) -> impl Iterator<Item = MaterialChannel> {
        Self::ALL.into_iter().filter(move |c| c.tree() == tree)
    }
}

/// A graph holding only a root node (id 1) with every channel box.
///
/// Used when a material has no surface or its surface fails to load.
pub fn default_material_graph() -> Graph {
    let mut root = Node::new(1, ROOT_NODE);
    for ch in MaterialChannel::ALL {
        root = root.with_box(ch.box_id(), ch.kind());
    }
    let mut g = Graph::new();
    // A fresh graph cannot hold a duplicate id.
    let _ = g.add_node(root.with_box(LAYER_BOX, ValueType::Object));
    g
}

/// Everything one material generation produces.
#[derive(Debug, Clone)]
pub struct GeneratedMaterial {
    pub source: String,
    /// Serialized parameter table (parameters chunk).
    pub parameters: Vec<u8>,
    /// Input info with usage flags replaced by what the graph consumes.
    pub info: MaterialInfo,
    pub includes: Vec<String>,
    /// Layers and functions the material was built from.
    pub dependencies: Vec<Uuid>,
    pub errors: Vec<GeneratorError>,
}

pub struct MaterialGenerator {
    id: Uuid,
    graph: Arc<Graph>,
    info: MaterialInfo,
    assets: AssetStore,
    node_comments: bool,
}

impl MaterialGenerator {
    pub fn new(id: Uuid, graph: Arc<Graph>, info: MaterialInfo, assets: AssetStore) -> Self {
        Self {
            id,
            graph,
            info,
            assets,
            node_comments: false,
        }
    }

    /// Annotate locals with the id of the node that produced them.
    pub fn with_node_comments(mut self, enabled: bool) -> Self {
        self.node_comments = enabled;
        self
    }

    pub fn generate(&self) -> GeneratedMaterial {
        let mut c = Compilation::new_material(self.id, self.graph.clone(), self.info, self.assets.clone());
        c.writer = ShaderWriter::new().with_node_comments(self.node_comments);
        c.add_include(MATERIAL_COMMON_INCLUDE);

        let mut bodies = Vec::with_capacity(ShaderTree::ALL.len());
        for tree in ShaderTree::ALL {
            c.begin_tree(tree);
            c.evaluate_layer(0, "material");
            bodies.push((tree, c.writer.take()));
        }

        let mut info = self.info;
        info.usage_flags = c.layers[0].usage;
        let source = write_source(self.id, &c, &bodies);
        log::debug!(
            "material {}: generated {} bytes, {} parameters, {} errors",
            self.id,
            source.len(),
            c.params.len(),
            c.errors().len()
        );
        GeneratedMaterial {
            source,
            parameters: c.params.serialize(),
            info,
            includes: c.includes().map(str::to_string).collect(),
            dependencies: c.dependencies().to_vec(),
            errors: c.errors().to_vec(),
        }
    }
}

fn write_source(id: Uuid, c: &Compilation, bodies: &[(ShaderTree, String)]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "// Material {id}");
    out.push_str("// Generated source. Do not edit.\n\n");
    let includes: Vec<&str> = c.includes().collect();
    // The common include goes first; the others are sorted.
    let _ = writeln!(out, "#include \"{MATERIAL_COMMON_INCLUDE}\"");
    for inc in includes.iter().filter(|i| **i != MATERIAL_COMMON_INCLUDE) {
        let _ = writeln!(out, "#include \"{inc}\"");
    }
    out.push('\n');

    let _ = writeln!(out, "struct {MATERIAL_STRUCT}\n{{");
    for ch in MaterialChannel::ALL {
        let _ = writeln!(out, "\t{} {};", ch.kind().hlsl(), ch.name());
    }
    out.push_str("};\n\n");

    let decl = c.params.declarations();
    if !decl.is_empty() {
        out.push_str(&decl);
        out.push('\n');
    }

    for (tree, body) in bodies {
        let _ = writeln!(
            out,
            "{MATERIAL_STRUCT} GetMaterial{}(MaterialInput input)\n{{",
            tree.suffix()
        );
        let _ = writeln!(out, "\t{MATERIAL_STRUCT} material = ({MATERIAL_STRUCT})0;");
        out.push_str(body);
        out.push_str("\treturn material;\n}\n\n");
    }
    out
}
