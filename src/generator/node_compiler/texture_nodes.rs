//! Compilers for texture nodes (group 3): sampling, scene textures, the global
//! signed distance field and the procedural/triplanar/parallax samplers.

use super::super::compilation::{Compilation, ShaderTree};
use super::super::parameters::{ParameterKind, SceneTexture};
use super::super::types::{Value, ValueType};
use crate::graph::{Node, NodeBox};

pub const SAMPLE_TEXTURE: u16 = 1;
pub const TEX_COORD: u16 = 2;
pub const PROCEDURAL_SAMPLE: u16 = 5;
pub const SCENE_TEXTURE: u16 = 6;
pub const SAMPLE_GLOBAL_SDF: u16 = 7;
pub const SAMPLE_GLOBAL_SDF_GRADIENT: u16 = 8;
pub const TRIPLANAR: u16 = 9;
pub const PARALLAX_OCCLUSION: u16 = 10;

// Sample Texture boxes.
pub const BOX_UV: u32 = 0;
pub const BOX_COLOR: u32 = 1;
pub const BOX_R: u32 = 2;
pub const BOX_A: u32 = 5;
pub const BOX_OBJECT: u32 = 6;
pub const BOX_RGB: u32 = 7;
pub const BOX_TEXTURE: u32 = 8;

/// Static samplers declared by the shader template (`s0..s3`), indexed by `values[2]`.
pub const STATIC_SAMPLERS: [&str; 4] = [
    "SamplerLinearClamp",
    "SamplerPointClamp",
    "SamplerLinearWrap",
    "SamplerPointWrap",
];
const DEFAULT_SAMPLER: i32 = 2;

pub const GLOBAL_SDF_INCLUDE: &str = "Material/GlobalSignDistanceField.hlsl";

pub fn compile(comp: &mut Compilation, node: &Node, out_box: &NodeBox, subtype: u16) -> Value {
    match subtype {
        SAMPLE_TEXTURE => compile_sample(comp, node, out_box),
        TEX_COORD => comp.tex_coord(),
        PROCEDURAL_SAMPLE => compile_procedural(comp, node, out_box),
        SCENE_TEXTURE => compile_scene_texture(comp, node, out_box),
        SAMPLE_GLOBAL_SDF => compile_global_sdf(comp, node),
        SAMPLE_GLOBAL_SDF_GRADIENT => compile_global_sdf_gradient(comp, node, out_box),
        TRIPLANAR => compile_triplanar(comp, node, out_box),
        PARALLAX_OCCLUSION => compile_parallax(comp, node, out_box),
        _ => super::unsupported(comp, node, out_box),
    }
}

/// Texture kind selected by the Sample Texture `values[1]` code.
pub fn texture_kind_from_code(code: i32) -> Option<ParameterKind> {
    Some(match code {
        0 => ParameterKind::Texture2D,
        1 => ParameterKind::TextureCube,
        2 => ParameterKind::TextureArray,
        3 => ParameterKind::Texture3D,
        4 => ParameterKind::NormalMap,
        _ => return None,
    })
}

/// A texture resource bound to the material.
struct TextureRef {
    handle: Value,
    kind: ParameterKind,
}

/// Texture from the Object override box, or the asset referenced by `values[asset_index]`.
fn resolve_texture(
    comp: &mut Compilation,
    node: &Node,
    out_box: u32,
    asset_index: usize,
    kind_index: Option<usize>,
) -> Option<TextureRef> {
    if node.is_connected(BOX_TEXTURE) && asset_index == 0 {
        let v = comp.eat_box(node, BOX_TEXTURE);
        let kind = (v.ty == ValueType::Object)
            .then(|| comp.params.find_by_shader_name(&v.expr))
            .flatten()
            .and_then(|i| comp.params.get(i))
            .map(|p| p.kind)
            .filter(|k| k.is_texture());
        return match kind {
            Some(kind) => Some(TextureRef { kind, handle: v }),
            None => {
                comp.error(node, out_box, "texture input is not a texture");
                None
            }
        };
    }

    let code = kind_index.map(|i| node.value_i32(i, 0)).unwrap_or(0);
    let Some(kind) = texture_kind_from_code(code) else {
        comp.error(node, out_box, format!("invalid texture kind {code}"));
        return None;
    };
    let Some(asset) = node.value(asset_index).and_then(|v| v.as_guid()).filter(|id| !id.is_nil()) else {
        comp.error(node, out_box, "missing texture");
        return None;
    };
    let index = comp.params.find_or_add(kind, asset);
    let name = comp.params.get(index)?.shader_name.clone();
    Some(TextureRef {
        handle: Value::new(ValueType::Object, name),
        kind,
    })
}

/// Sampler from a texture group (`values[3]`) or one of the static samplers (`values[2]`).
fn resolve_sampler(comp: &mut Compilation, node: &Node, out_box: u32) -> String {
    let group = node.value_i32(3, -1);
    if group >= 0 {
        let index = comp.params.find_or_add_sampler(group);
        if let Some(p) = comp.params.get(index) {
            return p.shader_name.clone();
        }
    }
    let which = node.value_i32(2, DEFAULT_SAMPLER);
    match usize::try_from(which).ok().and_then(|i| STATIC_SAMPLERS.get(i)) {
        Some(s) => s.to_string(),
        None => {
            comp.error(node, out_box, format!("unavailable texture sampler {which}"));
            STATIC_SAMPLERS[DEFAULT_SAMPLER as usize].to_string()
        }
    }
}

/// `Sample` in the pixel shader, `SampleLevel(.., 0)` elsewhere.
fn sample_call(tree: ShaderTree, texture: &str, sampler: &str, uv: &str) -> String {
    if tree == ShaderTree::Pixel {
        format!("{texture}.Sample({sampler}, {uv})")
    } else {
        format!("{texture}.SampleLevel({sampler}, {uv}, 0)")
    }
}

fn compile_sample(comp: &mut Compilation, node: &Node, out_box: &NodeBox) -> Value {
    let Some(texture) = resolve_texture(comp, node, out_box.id, 0, Some(1)) else {
        return Value::zero(out_box.ty);
    };
    if out_box.id == BOX_OBJECT {
        return texture.handle;
    }
    let sampler = resolve_sampler(comp, node, out_box.id);
    let uv = comp
        .try_get_value(node, BOX_UV, comp.tex_coord())
        .cast(ValueType::float_vector(texture.kind.uv_components()));

    let call = sample_call(comp.current_tree, &texture.handle.expr, &sampler, &uv.expr);
    let color = comp.writer.write_local(ValueType::Float4, Some(&call), Some(node.id));
    if texture.kind == ParameterKind::NormalMap {
        comp.writer.write("{0}.xy = {0}.xy * 2.0 - 1.0;", &[&color]);
        comp.writer
            .write("{0}.z = sqrt(saturate(1.0 - dot({0}.xy, {0}.xy)));", &[&color]);
    }
    finish_sample(comp, node, out_box, &color, &texture.handle)
}

/// Fill the sibling output boxes of a sample node and return `out_box`'s value.
fn finish_sample(comp: &mut Compilation, node: &Node, out_box: &NodeBox, color: &Value, handle: &Value) -> Value {
    let value_of = |id: u32| -> Option<Value> {
        match id {
            BOX_COLOR => Some(color.clone()),
            BOX_R..=BOX_A => Some(color.component((id - BOX_R) as usize)),
            BOX_OBJECT => Some(handle.clone()),
            BOX_RGB => Some(color.swizzle("rgb")),
            _ => None,
        }
    };
    for b in &node.boxes {
        if b.id != out_box.id {
            if let Some(v) = value_of(b.id) {
                comp.set_box_cache(node, b.id, v);
            }
        }
    }
    value_of(out_box.id).unwrap_or_else(|| Value::zero(out_box.ty))
}

/// Linear view depth of the scene at `uv`.
pub fn sample_scene_depth(comp: &mut Compilation, node: &Node, uv: &Value) -> Value {
    let index = comp.params.find_or_add_scene_texture(SceneTexture::SceneDepth);
    let Some(name) = comp.params.get(index).map(|p| p.shader_name.clone()) else {
        return Value::zero(ValueType::Float);
    };
    let uv = uv.cast(ValueType::Float2);
    let expr = format!(
        "LinearizeZ(ViewInfo, {name}.SampleLevel(SamplerPointClamp, {}, 0).x)",
        uv.expr
    );
    comp.writer.write_local(ValueType::Float, Some(&expr), Some(node.id))
}

fn compile_scene_texture(comp: &mut Compilation, node: &Node, out_box: &NodeBox) -> Value {
    let which = node.value_i32(0, 0);
    let Some(which) = u8::try_from(which).ok().and_then(SceneTexture::from_u8) else {
        comp.error(node, out_box.id, format!("invalid scene texture {which}"));
        return Value::zero(out_box.ty);
    };
    let uv = comp.try_get_value(
        node,
        0,
        Value::new(ValueType::Float2, "(input.SvPosition.xy * ScreenSize.zw)"),
    );
    let color = if which == SceneTexture::SceneDepth {
        sample_scene_depth(comp, node, &uv).cast(ValueType::Float4)
    } else {
        let index = comp.params.find_or_add_scene_texture(which);
        let Some(name) = comp.params.get(index).map(|p| p.shader_name.clone()) else {
            return Value::zero(out_box.ty);
        };
        let expr = format!(
            "{name}.SampleLevel(SamplerPointClamp, {}, 0)",
            uv.cast(ValueType::Float2).expr
        );
        comp.writer.write_local(ValueType::Float4, Some(&expr), Some(node.id))
    };
    for id in 1..=5u32 {
        if id != out_box.id && node.get_box(id).is_some() {
            let v = if id == 1 { color.clone() } else { color.component(id as usize - 2) };
            comp.set_box_cache(node, id, v);
        }
    }
    match out_box.id {
        1 => color,
        id @ 2..=5 => color.component(id as usize - 2),
        _ => Value::zero(out_box.ty),
    }
}

/// Shader name of the global SDF bundle, recording its include.
pub fn global_sdf(comp: &mut Compilation) -> Option<String> {
    comp.add_include(GLOBAL_SDF_INCLUDE);
    let index = comp.params.find_or_add_global_sdf();
    comp.params.get(index).map(|p| p.shader_name.clone())
}

fn compile_global_sdf(comp: &mut Compilation, node: &Node) -> Value {
    let pos = comp
        .try_get_value(node, 0, Value::new(ValueType::Float3, "input.WorldPosition"))
        .cast(ValueType::Float3);
    let Some(n) = global_sdf(comp) else {
        return Value::zero(ValueType::Float);
    };
    let expr = format!("SampleGlobalSDF({n}, {n}_Tex, {n}_Mip, {})", pos.expr);
    comp.writer.write_local(ValueType::Float, Some(&expr), Some(node.id))
}

/// Gradient on box 1, distance on box 2.
fn compile_global_sdf_gradient(comp: &mut Compilation, node: &Node, out_box: &NodeBox) -> Value {
    let pos = comp
        .try_get_value(node, 0, Value::new(ValueType::Float3, "input.WorldPosition"))
        .cast(ValueType::Float3);
    let Some(n) = global_sdf(comp) else {
        return Value::zero(out_box.ty);
    };
    let distance = comp.writer.write_local(ValueType::Float, None, Some(node.id));
    let expr = format!(
        "SampleGlobalSDFGradient({n}, {n}_Tex, {n}_Mip, {}, {})",
        pos.expr, distance.expr
    );
    let gradient = comp.writer.write_local(ValueType::Float3, Some(&expr), Some(node.id));
    if out_box.id == 1 {
        comp.set_box_cache(node, 2, distance);
        gradient
    } else {
        comp.set_box_cache(node, 1, gradient);
        distance
    }
}

/// Triplanar projection: out 0, scale 1, blend 2, offset 3; `values[0]` texture.
fn compile_triplanar(comp: &mut Compilation, node: &Node, out_box: &NodeBox) -> Value {
    let Some(texture) = resolve_texture(comp, node, out_box.id, 0, None) else {
        return Value::zero(out_box.ty);
    };
    let scale = comp.try_get_value(node, 1, Value::float(1.0)).cast(ValueType::Float3);
    let blend = comp.try_get_value(node, 2, Value::float(1.0)).cast(ValueType::Float);
    let offset = comp
        .try_get_value(node, 3, Value::zero(ValueType::Float2))
        .cast(ValueType::Float2);

    let w = &mut comp.writer;
    let weights = w.write_local(ValueType::Float3, Some("abs(input.TBN[2])"), Some(node.id));
    w.write("{0} = pow({0}, {1});", &[&weights, &blend]);
    w.write("{0} /= dot({0}, float3(1, 1, 1));", &[&weights]);
    let pos = w.write_local(
        ValueType::Float3,
        Some(&format!("input.WorldPosition * {}", scale.expr)),
        Some(node.id),
    );
    let tree = comp.current_tree;
    let t = &texture.handle.expr;
    let sampler = STATIC_SAMPLERS[DEFAULT_SAMPLER as usize];
    let x = sample_call(tree, t, sampler, &format!("{}.yz + {}", pos.expr, offset.expr));
    let y = sample_call(tree, t, sampler, &format!("{}.xz + {}", pos.expr, offset.expr));
    let z = sample_call(tree, t, sampler, &format!("{}.xy + {}", pos.expr, offset.expr));
    let expr = format!(
        "{x} * {0}.x + {y} * {0}.y + {z} * {0}.z",
        weights.expr
    );
    let result = comp.writer.write_local(ValueType::Float4, Some(&expr), Some(node.id));
    result.cast(out_box.ty)
}

/// Hex-tiled sampling that hides texture repetition: UV on box 0, color on box 1.
fn compile_procedural(comp: &mut Compilation, node: &Node, out_box: &NodeBox) -> Value {
    let Some(texture) = resolve_texture(comp, node, out_box.id, 0, Some(1)) else {
        return Value::zero(out_box.ty);
    };
    let uv = comp
        .try_get_value(node, 0, comp.tex_coord())
        .cast(ValueType::Float2);
    let uv = comp.writer.write_local(ValueType::Float2, Some(&uv.expr), Some(node.id));
    let id = Some(node.id);

    let w = &mut comp.writer;
    let skew = w.write_local(
        ValueType::Float2,
        Some(&format!(
            "mul(float2x2(1.0, 0.0, -0.57735027, 1.15470054), {} * 3.46410162)",
            uv.expr
        )),
        id,
    );
    let base = w.write_local(ValueType::Float2, Some(&format!("floor({})", skew.expr)), id);
    let weights = w.write_local(ValueType::Float3, Some(&format!("float3(frac({}), 0)", skew.expr)), id);
    w.write("{0}.z = 1.0 - {0}.x - {0}.y;", &[&weights]);
    let v1 = w.write_local(ValueType::Float2, None, id);
    let v2 = w.write_local(ValueType::Float2, None, id);
    let v3 = w.write_local(ValueType::Float2, None, id);
    let args = [&weights, &base, &v1, &v2, &v3];
    w.write("if ({0}.z > 0)", &args);
    w.write("{", &args);
    w.push_indent();
    w.write("{0} = float3({0}.z, {0}.y, {0}.x);", &args);
    w.write("{2} = {1};", &args);
    w.write("{3} = {1} + float2(0, 1);", &args);
    w.write("{4} = {1} + float2(1, 0);", &args);
    w.pop_indent();
    w.write("}", &args);
    w.write("else", &args);
    w.write("{", &args);
    w.push_indent();
    w.write("{0} = float3(-{0}.z, 1.0 - {0}.y, 1.0 - {0}.x);", &args);
    w.write("{2} = {1} + float2(1, 1);", &args);
    w.write("{3} = {1} + float2(1, 0);", &args);
    w.write("{4} = {1} + float2(0, 1);", &args);
    w.pop_indent();
    w.write("}", &args);

    let pixel = comp.current_tree == ShaderTree::Pixel;
    let sampler = resolve_sampler(comp, node, out_box.id);
    let t = &texture.handle.expr;
    let tap = |v: &Value| {
        let offset = format!(
            "{} + frac(sin(mul(float2x2(127.1, 311.7, 269.5, 183.3), {})) * 43758.5453)",
            uv.expr, v.expr
        );
        if pixel {
            format!("{t}.SampleGrad({sampler}, {offset}, ddx({0}), ddy({0}))", uv.expr)
        } else {
            format!("{t}.SampleLevel({sampler}, {offset}, 0)")
        }
    };
    let expr = format!(
        "{0} * {3}.x + {1} * {3}.y + {2} * {3}.z",
        tap(&v1),
        tap(&v2),
        tap(&v3),
        weights.expr
    );
    let color = comp.writer.write_local(ValueType::Float4, Some(&expr), id);
    color.cast(out_box.ty)
}

/// Parallax occlusion mapping: UV 0, scale 1, offset UV out 2. Values: heightmap,
/// min steps, max steps, height channel.
fn compile_parallax(comp: &mut Compilation, node: &Node, out_box: &NodeBox) -> Value {
    let uv = comp
        .try_get_value(node, 0, comp.tex_coord())
        .cast(ValueType::Float2);
    if comp.current_tree != ShaderTree::Pixel {
        return uv;
    }
    let Some(texture) = resolve_texture(comp, node, out_box.id, 0, None) else {
        return uv;
    };
    let scale = comp.try_get_value(node, 1, Value::float(0.05)).cast(ValueType::Float);
    let min_steps = Value::float(node.value_f32(1, 8.0));
    let max_steps = Value::float(node.value_f32(2, 32.0));
    let channel = ["x", "y", "z", "w"][node.value_i32(3, 0).clamp(0, 3) as usize];
    let id = Some(node.id);
    let t = texture.handle.expr.clone();

    let w = &mut comp.writer;
    let view = w.write_local(
        ValueType::Float3,
        Some("normalize(TransformWorldVectorToTangent(input, ViewPos - input.WorldPosition))"),
        id,
    );
    let steps = w.write_local(
        ValueType::Float,
        Some(&format!(
            "lerp({}, {}, saturate({}.z))",
            max_steps.expr, min_steps.expr, view.expr
        )),
        id,
    );
    let step = w.write_local(ValueType::Float, Some(&format!("1.0 / {}", steps.expr)), id);
    let delta = w.write_local(
        ValueType::Float2,
        Some(&format!(
            "{0}.xy * {1} / (max({0}.z, 0.0001) * {2})",
            view.expr, scale.expr, steps.expr
        )),
        id,
    );
    let dx = w.write_local(ValueType::Float2, Some(&format!("ddx({})", uv.expr)), id);
    let dy = w.write_local(ValueType::Float2, Some(&format!("ddy({})", uv.expr)), id);
    let height_at = |at: &str| {
        format!(
            "(1.0 - {t}.SampleGrad(SamplerLinearWrap, {at}, {}, {}).{channel})",
            dx.expr, dy.expr
        )
    };
    let current = w.write_local(ValueType::Float2, Some(&uv.expr), id);
    let depth = w.write_local(ValueType::Float, None, id);
    let height = w.write_local(ValueType::Float, Some(&height_at(&current.expr)), id);
    let args = [&current, &delta, &depth, &step, &height];
    w.write("[loop]", &args);
    w.write("while ({2} < {4} && {2} < 1.0)", &args);
    w.write("{", &args);
    w.push_indent();
    w.write("{0} -= {1};", &args);
    w.write_line(&format!("{} = {};", height.expr, height_at(&current.expr)));
    w.write("{2} += {3};", &args);
    w.pop_indent();
    w.write("}", &args);
    let previous = w.write_local(
        ValueType::Float2,
        Some(&format!("{} + {}", current.expr, delta.expr)),
        id,
    );
    let after = w.write_local(
        ValueType::Float,
        Some(&format!("{} - {}", height.expr, depth.expr)),
        id,
    );
    let before = w.write_local(
        ValueType::Float,
        Some(&format!(
            "{} - {} + {}",
            height_at(&previous.expr),
            depth.expr,
            step.expr
        )),
        id,
    );
    let expr = format!(
        "lerp({}, {}, {} / min({} - {}, -0.0001))",
        current.expr, previous.expr, after.expr, after.expr, before.expr
    );
    let result = w.write_local(ValueType::Float2, Some(&expr), id);
    result.cast(out_box.ty)
}
