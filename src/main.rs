use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use material_forge::asset_store::{self, AssetStore};
use material_forge::config::{PipelineConfig, RuntimeOptions};
use material_forge::generator::MaterialGenerator;
use material_forge::graph::Graph;
use material_forge::material_info::MaterialInfo;
use material_forge::particles::ParticleEmitterGenerator;
use uuid::Uuid;

const USAGE: &str = "--graph <surface.json>, --info <info.json>, --assets <dir>, --output-dir <dir>, \
--emitter, --config <file.json>, -shaderdebug, -shaderprofile";

#[derive(Debug, Default, Clone)]
struct Cli {
    graph: Option<PathBuf>,
    info: Option<PathBuf>,
    assets: Option<PathBuf>,
    output_dir: Option<PathBuf>,
    emitter: bool,
    config: Option<PathBuf>,
    runtime: RuntimeOptions,
}

fn parse_cli(args: &[String]) -> Result<Cli> {
    let mut cli = Cli::default();
    let mut i = 0;
    while i < args.len() {
        let arg = args[i].as_str();
        if cli.runtime.apply_flag(arg) {
            i += 1;
            continue;
        }
        let slot = match arg {
            "--graph" => &mut cli.graph,
            "--info" => &mut cli.info,
            "--assets" => &mut cli.assets,
            "--outputdir" | "--output-dir" => &mut cli.output_dir,
            "--config" => &mut cli.config,
            "--emitter" => {
                cli.emitter = true;
                i += 1;
                continue;
            }
            other => return Err(anyhow!("unknown argument: {other} (supported: {USAGE})")),
        };
        let Some(v) = args.get(i + 1) else {
            return Err(anyhow!("missing value for {arg}"));
        };
        *slot = Some(PathBuf::from(v));
        i += 2;
    }
    Ok(cli)
}

/// Stable id for a graph file so repeated runs name parameters identically.
fn graph_id(path: &Path) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_URL, path.to_string_lossy().as_bytes())
}

fn read_info(path: Option<&Path>) -> Result<MaterialInfo> {
    let Some(path) = path else {
        return Ok(MaterialInfo::default());
    };
    let text = std::fs::read_to_string(path).with_context(|| format!("failed to read --info file {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("invalid material info in {}", path.display()))
}

fn write_output(dir: &Path, stem: &str, source: &str, parameters: &[u8]) -> Result<()> {
    std::fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    let hlsl = dir.join(format!("{stem}.hlsl"));
    std::fs::write(&hlsl, source).with_context(|| format!("failed to write {}", hlsl.display()))?;
    let params = dir.join(format!("{stem}.params.bin"));
    std::fs::write(&params, parameters).with_context(|| format!("failed to write {}", params.display()))?;
    log::info!("wrote {} and {}", hlsl.display(), params.display());
    Ok(())
}

fn run(cli: Cli) -> Result<()> {
    let graph_path = cli
        .graph
        .as_deref()
        .ok_or_else(|| anyhow!("--graph <surface.json> is required"))?;
    let mut config = match cli.config.as_deref() {
        Some(p) => PipelineConfig::load(p)?,
        None => PipelineConfig::default(),
    };
    config.runtime.shader_debug |= cli.runtime.shader_debug;
    config.runtime.shader_profile |= cli.runtime.shader_profile;

    let assets = match cli.assets.as_deref() {
        Some(dir) => asset_store::load_from_dir(dir)?,
        None => AssetStore::new(),
    };
    let file = std::fs::File::open(graph_path)
        .with_context(|| format!("failed to read --graph file {}", graph_path.display()))?;
    let loaded = Graph::load(std::io::BufReader::new(file), true)
        .with_context(|| format!("invalid graph in {}", graph_path.display()))?;
    if loaded.deprecated {
        log::warn!("{} uses an old graph format", graph_path.display());
    }
    let graph = Arc::new(loaded.graph);

    let id = graph_id(graph_path);
    let output_dir = cli.output_dir.clone().unwrap_or_else(|| {
        graph_path
            .parent()
            .map(ToOwned::to_owned)
            .unwrap_or_else(|| PathBuf::from("."))
    });
    let stem = graph_path
        .file_stem()
        .and_then(|s| s.to_str())
        .map(|s| s.trim_end_matches(".surface").to_string())
        .unwrap_or_else(|| id.to_string());
    // Debug builds of the shader keep node ids in the source.
    let node_comments = config.editor || config.runtime.shader_debug;

    let errors = if cli.emitter {
        let out = ParticleEmitterGenerator::new(id, graph, assets)
            .with_node_comments(node_comments)
            .generate();
        write_output(&output_dir, &stem, &out.source, &out.parameters)?;
        let layout = output_dir.join(format!("{stem}.layout.json"));
        std::fs::write(&layout, serde_json::to_string_pretty(&out.layout)?)
            .with_context(|| format!("failed to write {}", layout.display()))?;
        println!("emitter {id}: stride {} bytes, {} attributes", out.stride, out.layout.len());
        out.errors
    } else {
        let info = read_info(cli.info.as_deref())?;
        let out = MaterialGenerator::new(id, graph, info, assets)
            .with_node_comments(node_comments)
            .generate();
        write_output(&output_dir, &stem, &out.source, &out.parameters)?;
        println!(
            "material {id}: usage flags {:?}, {} dependencies",
            out.info.usage_flags,
            out.dependencies.len()
        );
        out.errors
    };

    for e in &errors {
        eprintln!("[generator] {e}");
    }
    if !errors.is_empty() {
        println!("{} generator error(s); affected boxes use default values", errors.len());
    }
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let argv: Vec<String> = std::env::args().skip(1).collect();
    let cli = parse_cli(&argv)?;
    run(cli)
}
