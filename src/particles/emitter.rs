//! Particle emitter graph to HLSL.

use std::fmt::Write as _;
use std::sync::Arc;

use uuid::Uuid;

use super::attributes::ParticleAttribute;
use super::modules::{self, ModuleStage};
use crate::asset_store::AssetStore;
use crate::error::GeneratorError;
use crate::generator::compilation::{Compilation, ShaderTree};
use crate::generator::node_compiler::GROUP_PARTICLE_MODULES;
use crate::generator::writer::ShaderWriter;
use crate::graph::Graph;

/// Include providing `Context`, the particle buffer accessors and `RAND*`.
pub const PARTICLE_EMITTER_INCLUDE: &str = "Particles/ParticleEmitterCommon.hlsl";

#[derive(Debug, Clone)]
pub struct GeneratedEmitter {
    pub source: String,
    pub parameters: Vec<u8>,
    /// Particle record layout in first-access order.
    pub layout: Vec<ParticleAttribute>,
    /// Particle record size in bytes.
    pub stride: u32,
    pub includes: Vec<String>,
    pub dependencies: Vec<Uuid>,
    pub errors: Vec<GeneratorError>,
}

pub struct ParticleEmitterGenerator {
    id: Uuid,
    graph: Arc<Graph>,
    assets: AssetStore,
    node_comments: bool,
}

impl ParticleEmitterGenerator {
    pub fn new(id: Uuid, graph: Arc<Graph>, assets: AssetStore) -> Self {
        Self {
            id,
            graph,
            assets,
            node_comments: false,
        }
    }

    pub fn with_node_comments(mut self, enabled: bool) -> Self {
        self.node_comments = enabled;
        self
    }

    pub fn generate(&self) -> GeneratedEmitter {
        let mut c = Compilation::new_emitter(self.id, self.graph.clone(), self.assets.clone());
        c.writer = ShaderWriter::new().with_node_comments(self.node_comments);
        c.add_include(PARTICLE_EMITTER_INCLUDE);

        let mut bodies = Vec::with_capacity(ModuleStage::ALL.len());
        for stage in ModuleStage::ALL {
            c.begin_tree(ShaderTree::Compute);
            for node in self.graph.nodes() {
                if node.type_id.group() != GROUP_PARTICLE_MODULES || !modules::is_enabled(node) {
                    continue;
                }
                match modules::module_stage(node) {
                    Some(s) if s == stage => modules::compile_module(&mut c, node),
                    Some(_) => {}
                    None => c.error(node, 0, format!("invalid module stage {}", node.value_i32(1, 0))),
                }
            }
            bodies.push((stage, c.writer.take()));
        }

        let source = write_source(self.id, &c, &bodies);
        log::debug!(
            "emitter {}: generated {} bytes, {} attributes, {} errors",
            self.id,
            source.len(),
            c.particle_layout.attributes().len(),
            c.errors().len()
        );
        GeneratedEmitter {
            source,
            parameters: c.params.serialize(),
            layout: c.particle_layout.attributes().to_vec(),
            stride: c.particle_layout.size(),
            includes: c.includes().map(str::to_string).collect(),
            dependencies: c.dependencies().to_vec(),
            errors: c.errors().to_vec(),
        }
    }
}

fn write_source(id: Uuid, c: &Compilation, bodies: &[(ModuleStage, String)]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "// Particle emitter {id}");
    out.push_str("// Generated source. Do not edit.\n\n");
    let _ = writeln!(out, "#include \"{PARTICLE_EMITTER_INCLUDE}\"");
    for inc in c.includes().filter(|i| *i != PARTICLE_EMITTER_INCLUDE) {
        let _ = writeln!(out, "#include \"{inc}\"");
    }
    out.push('\n');
    let _ = writeln!(out, "#define PARTICLE_STRIDE {}", c.particle_layout.size());
    out.push('\n');

    let decl = c.params.declarations();
    if !decl.is_empty() {
        out.push_str(&decl);
        out.push('\n');
    }

    for (stage, body) in bodies {
        let _ = writeln!(out, "void {}(Context context)\n{{", stage.function_name());
        out.push_str(body);
        out.push_str("}\n\n");
    }
    out
}
