use std::path::PathBuf;
use std::sync::Arc;

use material_forge::asset_store::AssetStore;
use material_forge::generator::{ParameterKind, ParameterTable, ValueType};
use material_forge::graph::Graph;
use material_forge::particles::{GeneratedEmitter, ParticleEmitterGenerator};
use uuid::Uuid;

fn generate(case: &str) -> GeneratedEmitter {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("cases")
        .join(case)
        .join("emitter.json");
    let text = std::fs::read_to_string(&path).unwrap_or_else(|e| panic!("{}: {e}", path.display()));
    let graph = Graph::from_json_str(&text).unwrap().graph;
    ParticleEmitterGenerator::new(Uuid::nil(), Arc::new(graph), AssetStore::new()).generate()
}

fn stage_body<'a>(source: &'a str, name: &str) -> &'a str {
    let start = source
        .find(&format!("void {name}(Context context)"))
        .unwrap_or_else(|| panic!("no {name} in:\n{source}"));
    let rest = &source[start..];
    let end = rest.find("\n}\n").unwrap_or(rest.len());
    &rest[..end]
}

#[test]
fn basic_emitter_splits_modules_by_stage() {
    let e = generate("emitter_basic");
    assert!(e.errors.is_empty(), "{:?}", e.errors);
    assert!(e.source.contains("#include \"Particles/ParticleEmitterCommon.hlsl\""));
    assert!(e.source.contains(&format!("#define PARTICLE_STRIDE {}", e.stride)));

    let init = stage_body(&e.source, "Initialize");
    let update = stage_body(&e.source, "Update");
    assert!(init.contains("SetParticleVec3("));
    assert!(!init.contains("DeltaTime"));
    assert!(update.contains("DeltaTime"));
    assert!(update.contains("float3(0,-10,0) * DeltaTime"));
    assert!(update.contains("if ("));
}

#[test]
fn layout_follows_first_access_order() {
    let e = generate("emitter_basic");
    let names: Vec<&str> = e.layout.iter().map(|a| a.name.as_str()).collect();
    assert_eq!(names.first(), Some(&"Position"));
    assert!(names.contains(&"Age") && names.contains(&"Velocity") && names.contains(&"Lifetime"));
    // The disabled drag module never touches Mass.
    assert!(!names.contains(&"Mass"));

    let mut expected_offset = 0;
    for a in &e.layout {
        assert_eq!(a.offset, expected_offset, "{}", a.name);
        expected_offset += a.kind.components() * 4;
    }
    assert_eq!(e.stride, expected_offset);
    assert_eq!(e.layout[0].kind, ValueType::Float3);
}

#[test]
fn attribute_offsets_are_hidden_parameters() {
    let e = generate("emitter_basic");
    let params = ParameterTable::deserialize(&e.parameters).expect("parameters blob");
    assert_eq!(params.len(), e.layout.len());
    for (p, a) in params.iter().zip(&e.layout) {
        assert_eq!(p.name, format!("Particle.{}", a.name));
        assert!(!p.is_public);
        assert_eq!(p.default, a.offset.to_le_bytes().to_vec());
        assert_ne!(p.kind, ParameterKind::Texture2D);
    }
}

#[test]
fn every_statement_is_terminated() {
    let e = generate("emitter_basic");
    for stage in ["Initialize", "Update"] {
        let body = stage_body(&e.source, stage);
        for line in body.lines().skip(2).map(str::trim).filter(|l| !l.is_empty()) {
            assert!(
                line.ends_with(';') || line.starts_with("if (") || line == "{" || line == "}",
                "{stage}: unterminated statement: {line}"
            );
        }
    }
}
