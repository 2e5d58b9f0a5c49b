use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use serde::Deserialize;
use uuid::Uuid;

use crate::graph::{Graph, NodeTypeId};
use crate::material_info::MaterialInfo;

pub const FUNCTION_INPUT_NODE: NodeTypeId = NodeTypeId::new(8, 1);
pub const FUNCTION_OUTPUT_NODE: NodeTypeId = NodeTypeId::new(8, 2);

/// A material that can be sampled as a layer.
#[derive(Debug)]
pub struct MaterialAsset {
    pub id: Uuid,
    pub info: MaterialInfo,
    pub graph: Arc<Graph>,
    /// Location on disk, when loaded from a file.
    pub path: Option<PathBuf>,
}

/// A reusable function graph with its input and output signature.
#[derive(Debug)]
pub struct FunctionAsset {
    pub id: Uuid,
    pub graph: Arc<Graph>,
    /// Node indices of the Function Input nodes, in graph order.
    pub inputs: Vec<usize>,
    /// Node indices of the Function Output nodes, in graph order.
    pub outputs: Vec<usize>,
}

impl FunctionAsset {
    pub fn new(id: Uuid, graph: Graph) -> Self {
        let indices_of = |ty: NodeTypeId| -> Vec<usize> {
            graph
                .nodes()
                .iter()
                .enumerate()
                .filter(|(_, n)| n.type_id == ty)
                .map(|(i, _)| i)
                .collect()
        };
        let inputs = indices_of(FUNCTION_INPUT_NODE);
        let outputs = indices_of(FUNCTION_OUTPUT_NODE);
        Self {
            id,
            graph: Arc::new(graph),
            inputs,
            outputs,
        }
    }
}

#[derive(Debug, Default)]
struct Assets {
    materials: HashMap<Uuid, Arc<MaterialAsset>>,
    functions: HashMap<Uuid, Arc<FunctionAsset>>,
}

/// Thread-safe, clone-friendly registry of material and function graphs keyed by GUID.
///
/// Compilations only read from it; a compilation resolving a GUID through the
/// store records it as a content dependency of the material being built.
#[derive(Debug, Clone, Default)]
pub struct AssetStore {
    inner: Arc<Mutex<Assets>>,
}

impl AssetStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a material.
    pub fn insert_material(&self, asset: MaterialAsset) {
        let Ok(mut map) = self.inner.lock() else {
            return;
        };
        map.materials.insert(asset.id, Arc::new(asset));
    }

    /// Insert or replace a function graph.
    pub fn insert_function(&self, asset: FunctionAsset) {
        let Ok(mut map) = self.inner.lock() else {
            return;
        };
        map.functions.insert(asset.id, Arc::new(asset));
    }

    pub fn material(&self, id: Uuid) -> Option<Arc<MaterialAsset>> {
        self.inner.lock().ok()?.materials.get(&id).cloned()
    }

    pub fn function(&self, id: Uuid) -> Option<Arc<FunctionAsset>> {
        self.inner.lock().ok()?.functions.get(&id).cloned()
    }
}

// ---------------------------------------------------------------------------
// Convenience loaders
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct MaterialFile {
    id: Uuid,
    #[serde(default)]
    info: MaterialInfo,
    graph: serde_json::Value,
}

#[derive(Deserialize)]
struct FunctionFile {
    id: Uuid,
    graph: serde_json::Value,
}

/// Read a `*.material.json` file (`{ id, info, graph }`).
pub fn load_material_file(path: &Path) -> Result<MaterialAsset> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read material {}", path.display()))?;
    let file: MaterialFile = serde_json::from_str(&text)
        .with_context(|| format!("failed to parse material {}", path.display()))?;
    let loaded = Graph::from_value(file.graph)
        .with_context(|| format!("invalid graph in {}", path.display()))?;
    Ok(MaterialAsset {
        id: file.id,
        info: file.info,
        graph: Arc::new(loaded.graph),
        path: Some(path.to_path_buf()),
    })
}

/// Read a `*.function.json` file (`{ id, graph }`).
pub fn load_function_file(path: &Path) -> Result<FunctionAsset> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read function {}", path.display()))?;
    let file: FunctionFile = serde_json::from_str(&text)
        .with_context(|| format!("failed to parse function {}", path.display()))?;
    let loaded = Graph::from_value(file.graph)
        .with_context(|| format!("invalid graph in {}", path.display()))?;
    Ok(FunctionAsset::new(file.id, loaded.graph))
}

/// Populate an `AssetStore` from every `*.material.json` and `*.function.json`
/// directly inside `dir`.
pub fn load_from_dir(dir: &Path) -> Result<AssetStore> {
    let store = AssetStore::new();
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("failed to list assets in {}", dir.display()))?;
    let mut paths: Vec<PathBuf> = entries
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.is_file())
        .collect();
    paths.sort();
    for path in paths {
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        if name.ends_with(".material.json") {
            store.insert_material(load_material_file(&path)?);
        } else if name.ends_with(".function.json") {
            store.insert_function(load_function_file(&path)?);
        }
    }
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::types::ValueType;
    use crate::graph::Node;

    fn function_graph() -> Graph {
        let mut g = Graph::new();
        g.add_node(Node::new(1, FUNCTION_INPUT_NODE).with_box(0, ValueType::Float))
            .unwrap();
        g.add_node(Node::new(2, NodeTypeId::new(5, 25))).unwrap();
        g.add_node(Node::new(3, FUNCTION_OUTPUT_NODE).with_box(0, ValueType::Float))
            .unwrap();
        g
    }

    #[test]
    fn function_signature_is_collected_in_order() {
        let f = FunctionAsset::new(Uuid::new_v4(), function_graph());
        assert_eq!(f.inputs, vec![0]);
        assert_eq!(f.outputs, vec![2]);
    }

    #[test]
    fn clones_share_storage() {
        let store = AssetStore::new();
        let other = store.clone();
        let id = Uuid::new_v4();
        other.insert_function(FunctionAsset::new(id, function_graph()));
        assert!(store.function(id).is_some());
        assert!(store.material(id).is_none());
        assert!(store.function(Uuid::nil()).is_none());
    }
}
