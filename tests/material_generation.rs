use std::path::PathBuf;
use std::sync::Arc;

use material_forge::asset_store::{self, AssetStore};
use material_forge::generator::{GeneratedMaterial, MaterialGenerator, ParameterKind, ParameterTable};
use material_forge::graph::Graph;
use material_forge::material_info::{FeaturesFlags, MaterialInfo, UsageFlags};
use uuid::Uuid;

const TEXTURE_ASSET: &str = "6f1c2d1e-5a3b-4c2d-9e8f-0123456789ab";
const STONE_LAYER: &str = "0b7e4c55-8d1f-4e2a-a3b4-c5d6e7f80912";
const SELF_CALL_FUNCTION: &str = "9d2f7a10-3c4b-4d5e-8f60-718293a4b5c6";

fn cases_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests").join("cases")
}

fn load_graph(case: &str) -> Graph {
    let path = cases_root().join(case).join("surface.json");
    let text = std::fs::read_to_string(&path)
        .unwrap_or_else(|e| panic!("case {case}: failed to read {}: {e}", path.display()));
    Graph::from_json_str(&text)
        .unwrap_or_else(|e| panic!("case {case}: invalid graph: {e}"))
        .graph
}

fn load_assets(case: &str) -> AssetStore {
    let dir = cases_root().join(case).join("assets");
    if dir.is_dir() {
        asset_store::load_from_dir(&dir).unwrap_or_else(|e| panic!("case {case}: {e:#}"))
    } else {
        AssetStore::new()
    }
}

fn generate(case: &str) -> GeneratedMaterial {
    MaterialGenerator::new(
        Uuid::new_v5(&Uuid::NAMESPACE_OID, case.as_bytes()),
        Arc::new(load_graph(case)),
        MaterialInfo::default(),
        load_assets(case),
    )
    .generate()
}

/// Body of `GetMaterial<suffix>`.
fn tree_body<'a>(source: &'a str, suffix: &str) -> &'a str {
    let start = source
        .find(&format!("GetMaterial{suffix}("))
        .unwrap_or_else(|| panic!("no GetMaterial{suffix} in:\n{source}"));
    let rest = &source[start..];
    let end = rest.find("\treturn material;").unwrap_or(rest.len());
    &rest[..end]
}

#[test]
fn empty_opaque_material_uses_channel_defaults() {
    let out = generate("empty_opaque");
    let ps = tree_body(&out.source, "PS");
    assert!(!out.source.contains("input.TexCoord.xy"));
    assert!(ps.contains("material.Color = float3(0.5,0.5,0.5);"));
    assert!(ps.contains("material.Normal = float3(0,0,1);"));
    assert!(ps.contains("material.Metalness = 0;"));
    assert!(ps.contains("material.Roughness = 0.4;"));
    assert!(ps.contains("material.Specular = 0.5;"));
    assert!(tree_body(&out.source, "VS").contains("material.PositionOffset = float3(0,0,0);"));

    assert_eq!(ParameterTable::deserialize(&out.parameters), Some(Vec::new()));
    assert_eq!(out.info.usage_flags, UsageFlags::empty());
    assert_eq!(out.info.features_flags, FeaturesFlags::empty());
    assert!(out.errors.is_empty());
    assert!(out.dependencies.is_empty());
}

#[test]
fn textured_diffuse_samples_into_color() {
    let out = generate("textured_diffuse");
    let ps = tree_body(&out.source, "PS");
    assert!(
        ps.contains("\tfloat4 Local1 = Param1.Sample(SamplerLinearWrap, input.TexCoord.xy);\n"),
        "{ps}"
    );
    assert!(ps.contains("material.Color = Local1.rgb;"));

    let params = ParameterTable::deserialize(&out.parameters).expect("parameters blob");
    assert_eq!(params.len(), 1);
    assert_eq!(params[0].kind, ParameterKind::Texture2D);
    assert_eq!(params[0].asset_id, Some(Uuid::parse_str(TEXTURE_ASSET).unwrap()));
    assert_eq!(params[0].shader_name, "Param1");
    assert!(out.source.contains("Param1 : register(t0);"));
    assert!(out.errors.is_empty());
}

#[test]
fn layer_sampled_with_two_uvs_gets_two_locals() {
    let out = generate("layer_two_uvs");
    assert!(out.errors.is_empty(), "{:?}", out.errors);
    assert_eq!(out.dependencies, vec![Uuid::parse_str(STONE_LAYER).unwrap()]);

    let ps = tree_body(&out.source, "PS");
    // One struct per UV slot plus the blended result.
    assert_eq!(ps.matches("= (MaterialLayer)0;").count(), 3, "{ps}");
    assert_eq!(ps.matches(".Roughness = 0.8;").count(), 2, "{ps}");

    // The custom UV sample snapshots and restores the interpolated UVs.
    let save = ps.find(" = input.TexCoord.xy;").expect("uv snapshot");
    let set = ps.find("input.TexCoord.xy = float2(0.5,0.5);").expect("uv override");
    let line_start = ps[..save].rfind('\t').unwrap_or(0);
    let saved = ps[line_start..save].trim().trim_start_matches("float2 ").to_string();
    let restore = ps
        .find(&format!("input.TexCoord.xy = {saved};"))
        .expect("uv restore");
    assert!(save < set && set < restore);
    assert!(ps.contains("material = "));
}

#[test]
fn recursive_function_yields_zero_and_one_error() {
    let out = generate("function_recursion");
    let ps = tree_body(&out.source, "PS");
    assert!(ps.contains("material.Metalness = (0 + 0);"), "{ps}");
    assert_eq!(out.errors.len(), 1, "{:?}", out.errors);
    assert!(out.errors[0].message.contains("recursive"));
    assert_eq!(out.dependencies, vec![Uuid::parse_str(SELF_CALL_FUNCTION).unwrap()]);
}

#[test]
fn generation_is_deterministic() {
    for case in ["empty_opaque", "textured_diffuse", "layer_two_uvs", "function_recursion"] {
        let a = generate(case);
        let b = generate(case);
        assert_eq!(a.source, b.source, "case {case}");
        assert_eq!(a.parameters, b.parameters, "case {case}");
    }
}

#[test]
fn fixture_graphs_have_symmetric_connections() {
    for case in ["empty_opaque", "textured_diffuse", "layer_two_uvs", "function_recursion", "legacy_v1"] {
        assert!(load_graph(case).connections_are_symmetric(), "case {case}");
    }
}

#[test]
fn legacy_envelope_loads_as_deprecated() {
    let path = cases_root().join("legacy_v1").join("surface.json");
    let loaded = Graph::load(std::fs::File::open(path).unwrap(), true).unwrap();
    assert!(loaded.deprecated);

    let out = MaterialGenerator::new(Uuid::new_v4(), Arc::new(loaded.graph), MaterialInfo::default(), AssetStore::new())
        .generate();
    assert!(tree_body(&out.source, "PS").contains("material.Roughness = 0.25;"));
}
