//! Ordered table of GPU parameters collected during one compilation.
//!
//! Parameter `i` (0-based) is named `Param{i+1}` in the generated source. The
//! same insertion order defines the constant-buffer layout, the texture and
//! sampler registers, and the serialized parameter blob.

use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::types::ValueType;
use crate::graph::GraphParameter;

/// Prefix of generated parameter identifiers.
pub const PARAMETER_PREFIX: &str = "Param";

/// Version of the serialized parameter blob.
pub const PARAMETERS_BLOB_VERSION: u32 = 1;

/// First sampler register available for texture-group samplers; s0..s3 are
/// the static samplers declared by the shader template.
pub const FIRST_GROUP_SAMPLER_REGISTER: u32 = 4;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ParameterKind {
    Scalar = 0,
    Vector = 1,
    Matrix = 2,
    Texture2D = 3,
    TextureCube = 4,
    TextureArray = 5,
    Texture3D = 6,
    NormalMap = 7,
    SceneTexture = 8,
    ChannelMask = 9,
    GlobalSdf = 10,
    TextureGroupSampler = 11,
}

impl ParameterKind {
    pub fn from_u8(v: u8) -> Option<Self> {
        use ParameterKind::*;
        Some(match v {
            0 => Scalar,
            1 => Vector,
            2 => Matrix,
            3 => Texture2D,
            4 => TextureCube,
            5 => TextureArray,
            6 => Texture3D,
            7 => NormalMap,
            8 => SceneTexture,
            9 => ChannelMask,
            10 => GlobalSdf,
            11 => TextureGroupSampler,
            _ => return None,
        })
    }

    pub fn is_texture(self) -> bool {
        matches!(
            self,
            ParameterKind::Texture2D
                | ParameterKind::TextureCube
                | ParameterKind::TextureArray
                | ParameterKind::Texture3D
                | ParameterKind::NormalMap
                | ParameterKind::SceneTexture
        )
    }

    /// Number of UV components expected when sampling this texture kind.
    pub fn uv_components(self) -> u32 {
        match self {
            ParameterKind::TextureCube | ParameterKind::TextureArray | ParameterKind::Texture3D => 3,
            _ => 2,
        }
    }

    fn resource_type(self) -> &'static str {
        match self {
            ParameterKind::TextureCube => "TextureCube",
            ParameterKind::TextureArray => "Texture2DArray",
            ParameterKind::Texture3D => "Texture3D",
            _ => "Texture2D",
        }
    }
}

/// Built-in scene textures a material may read.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum SceneTexture {
    SceneColor = 0,
    SceneDepth = 1,
    GBuffer0 = 2,
    GBuffer1 = 3,
    GBuffer2 = 4,
    GBuffer3 = 5,
}

impl SceneTexture {
    pub fn from_u8(v: u8) -> Option<Self> {
        Some(match v {
            0 => SceneTexture::SceneColor,
            1 => SceneTexture::SceneDepth,
            2 => SceneTexture::GBuffer0,
            3 => SceneTexture::GBuffer1,
            4 => SceneTexture::GBuffer2,
            5 => SceneTexture::GBuffer3,
            _ => return None,
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct MaterialParameter {
    pub id: Uuid,
    pub kind: ParameterKind,
    /// Value kind for scalar, vector and matrix parameters.
    pub value_type: ValueType,
    pub is_public: bool,
    pub is_override: bool,
    /// Display name (unique among public parameters).
    pub name: String,
    pub shader_name: String,
    pub default: Vec<u8>,
    pub asset_id: Option<Uuid>,
    pub scene_texture: Option<SceneTexture>,
    pub sampler_group: Option<i32>,
}

/// Location of a parameter in the runtime parameter block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParameterSlot {
    /// Byte offset inside `MaterialParams`.
    Constant(u32),
    /// First texture register (`tN`).
    Texture(u32),
    /// Sampler register (`sN`).
    Sampler(u32),
}

impl ParameterSlot {
    fn raw(self) -> u32 {
        match self {
            ParameterSlot::Constant(v) | ParameterSlot::Texture(v) | ParameterSlot::Sampler(v) => v,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ParameterTable {
    params: Vec<MaterialParameter>,
    public_names: HashSet<String>,
    reported_collisions: HashSet<String>,
}

impl ParameterTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MaterialParameter> {
        self.params.iter()
    }

    pub fn get(&self, index: usize) -> Option<&MaterialParameter> {
        self.params.get(index)
    }

    pub fn find_by_id(&self, id: Uuid) -> Option<usize> {
        self.params.iter().position(|p| p.id == id)
    }

    pub fn find_by_shader_name(&self, name: &str) -> Option<usize> {
        self.params.iter().position(|p| p.shader_name == name)
    }

    pub fn shader_name_for(index: usize) -> String {
        format!("{PARAMETER_PREFIX}{}", index + 1)
    }

    fn push(&mut self, mut param: MaterialParameter) -> usize {
        let index = self.params.len();
        param.shader_name = Self::shader_name_for(index);
        if param.name.is_empty() {
            param.name = param.shader_name.clone();
        }
        self.params.push(param);
        index
    }

    fn private(id: Uuid, kind: ParameterKind, value_type: ValueType) -> MaterialParameter {
        MaterialParameter {
            id,
            kind,
            value_type,
            is_public: false,
            is_override: false,
            name: String::new(),
            shader_name: String::new(),
            default: Vec::new(),
            asset_id: None,
            scene_texture: None,
            sampler_group: None,
        }
    }

    /// Texture parameter for `asset_id`, reusing an existing entry for the same asset.
    pub fn find_or_add(&mut self, kind: ParameterKind, asset_id: Uuid) -> usize {
        if let Some(i) = self
            .params
            .iter()
            .position(|p| p.kind.is_texture() && p.asset_id == Some(asset_id))
        {
            return i;
        }
        let mut p = Self::private(
            Uuid::new_v5(&asset_id, b"material-texture"),
            kind,
            ValueType::Object,
        );
        p.asset_id = Some(asset_id);
        self.push(p)
    }

    pub fn find_or_add_scene_texture(&mut self, which: SceneTexture) -> usize {
        if let Some(i) = self
            .params
            .iter()
            .position(|p| p.kind == ParameterKind::SceneTexture && p.scene_texture == Some(which))
        {
            return i;
        }
        let mut p = Self::private(
            Uuid::new_v5(&Uuid::NAMESPACE_OID, &[b's', b't', which as u8]),
            ParameterKind::SceneTexture,
            ValueType::Object,
        );
        p.scene_texture = Some(which);
        self.push(p)
    }

    /// The global signed-distance-field bundle (`Name`, `Name_Tex`, `Name_Mip`).
    pub fn find_or_add_global_sdf(&mut self) -> usize {
        if let Some(i) = self.params.iter().position(|p| p.kind == ParameterKind::GlobalSdf) {
            return i;
        }
        self.push(Self::private(
            Uuid::new_v5(&Uuid::NAMESPACE_OID, b"global-sdf"),
            ParameterKind::GlobalSdf,
            ValueType::Object,
        ))
    }

    pub fn find_or_add_sampler(&mut self, group_id: i32) -> usize {
        if let Some(i) = self.params.iter().position(|p| {
            p.kind == ParameterKind::TextureGroupSampler && p.sampler_group == Some(group_id)
        }) {
            return i;
        }
        let mut p = Self::private(
            Uuid::new_v5(&Uuid::NAMESPACE_OID, format!("sampler-{group_id}").as_bytes()),
            ParameterKind::TextureGroupSampler,
            ValueType::Object,
        );
        p.sampler_group = Some(group_id);
        self.push(p)
    }

    /// Hidden constant (for example a particle attribute offset) keyed by `key`.
    pub fn find_or_add_internal(&mut self, key: &str, value_type: ValueType, default: Vec<u8>) -> usize {
        let id = Uuid::new_v5(&Uuid::NAMESPACE_OID, key.as_bytes());
        if let Some(i) = self.find_by_id(id) {
            return i;
        }
        let kind = if value_type.is_scalar() {
            ParameterKind::Scalar
        } else {
            ParameterKind::Vector
        };
        let mut p = Self::private(id, kind, value_type);
        p.name = key.to_string();
        p.default = default;
        self.push(p)
    }

    /// Append a user-declared parameter under `id` (which may be remapped).
    ///
    /// Public name collisions are reported once per name and resolved with a
    /// synthetic unique name.
    pub fn add_graph_parameter(&mut self, param: &GraphParameter, id: Uuid) -> usize {
        if let Some(i) = self.find_by_id(id) {
            return i;
        }
        let value_type = match param.kind {
            ParameterKind::Scalar | ParameterKind::Vector | ParameterKind::Matrix => {
                match param.value.value_type() {
                    ValueType::Void | ValueType::Object => ValueType::Float,
                    t => t,
                }
            }
            ParameterKind::ChannelMask => ValueType::Float4,
            _ => ValueType::Object,
        };
        let mut name = param.name.clone();
        if param.is_public {
            if self.public_names.contains(&name) {
                if self.reported_collisions.insert(name.clone()) {
                    log::error!("duplicate material parameter name '{name}'");
                }
                let base = name.clone();
                let mut n = 1;
                while self.public_names.contains(&name) {
                    name = format!("{base}_{n}");
                    n += 1;
                }
            }
            self.public_names.insert(name.clone());
        }
        let index = self.params.len();
        self.push(MaterialParameter {
            id,
            kind: param.kind,
            value_type,
            is_public: param.is_public,
            is_override: param.is_override,
            name,
            shader_name: String::new(),
            default: match param.kind {
                ParameterKind::ChannelMask => {
                    // Stored as the selected channel index; materialized as a float4 mask.
                    let ch = param.value.as_i32().unwrap_or(0).clamp(0, 3) as usize;
                    let mut mask = [0.0f32; 4];
                    mask[ch] = 1.0;
                    mask.iter().flat_map(|f| f.to_le_bytes()).collect()
                }
                _ => param.value.to_bytes(),
            },
            asset_id: param.asset,
            scene_texture: None,
            sampler_group: None,
        });
        index
    }

    /// Constant-buffer offsets and registers, in insertion order.
    pub fn layout(&self) -> Vec<ParameterSlot> {
        let mut offset = 0u32;
        let mut texture = 0u32;
        let mut sampler = FIRST_GROUP_SAMPLER_REGISTER;
        self.params
            .iter()
            .map(|p| match p.kind {
                ParameterKind::Scalar | ParameterKind::Vector | ParameterKind::Matrix | ParameterKind::ChannelMask => {
                    let size = match p.kind {
                        ParameterKind::ChannelMask => 16,
                        ParameterKind::Matrix => 64,
                        _ => 4 * p.value_type.components().max(1),
                    };
                    // HLSL packing: values never straddle a 16-byte row.
                    if size >= 16 || (offset % 16) + size > 16 {
                        offset = offset.div_ceil(16) * 16;
                    }
                    let slot = ParameterSlot::Constant(offset);
                    offset += size;
                    slot
                }
                ParameterKind::GlobalSdf => {
                    offset = offset.div_ceil(16) * 16;
                    let slot = ParameterSlot::Constant(offset);
                    offset += GLOBAL_SDF_DATA_SIZE;
                    // The two companion textures are appended after the other textures
                    // at materialization time, so only the data block lives here.
                    slot
                }
                ParameterKind::TextureGroupSampler => {
                    let slot = ParameterSlot::Sampler(sampler);
                    sampler += 1;
                    slot
                }
                _ => {
                    let slot = ParameterSlot::Texture(texture);
                    texture += 1;
                    slot
                }
            })
            .collect()
    }

    /// Size in bytes of the `MaterialParams` constant buffer.
    pub fn constants_size(&self) -> u32 {
        let layout = self.layout();
        let mut end = 0;
        for (p, slot) in self.params.iter().zip(&layout) {
            if let ParameterSlot::Constant(o) = slot {
                let size = match p.kind {
                    ParameterKind::ChannelMask => 16,
                    ParameterKind::Matrix => 64,
                    ParameterKind::GlobalSdf => GLOBAL_SDF_DATA_SIZE,
                    _ => 4 * p.value_type.components().max(1),
                };
                end = end.max(o + size);
            }
        }
        end.div_ceil(16) * 16
    }

    /// HLSL declarations for the shader preamble.
    pub fn declarations(&self) -> String {
        let layout = self.layout();
        let mut constants = String::new();
        let mut resources = String::new();
        let mut textures_used = 0u32;
        for slot in &layout {
            if let ParameterSlot::Texture(t) = slot {
                textures_used = textures_used.max(t + 1);
            }
        }
        for (p, slot) in self.params.iter().zip(&layout) {
            let name = &p.shader_name;
            match (p.kind, slot) {
                (ParameterKind::ChannelMask, _) => {
                    let _ = writeln!(constants, "\tfloat4 {name};");
                }
                (ParameterKind::GlobalSdf, _) => {
                    let _ = writeln!(constants, "\tGlobalSDFData {name};");
                    let _ = writeln!(
                        resources,
                        "Texture3D<float> {name}_Tex : register(t{});",
                        textures_used
                    );
                    let _ = writeln!(
                        resources,
                        "Texture3D<float> {name}_Mip : register(t{});",
                        textures_used + 1
                    );
                    textures_used += 2;
                }
                (_, ParameterSlot::Constant(_)) => {
                    let _ = writeln!(constants, "\t{} {name};", p.value_type.hlsl());
                }
                (_, ParameterSlot::Sampler(s)) => {
                    let _ = writeln!(resources, "SamplerState {name} : register(s{s});");
                }
                (kind, ParameterSlot::Texture(t)) => {
                    let _ = writeln!(resources, "{} {name} : register(t{t});", kind.resource_type());
                }
            }
        }
        let mut out = String::new();
        if !constants.is_empty() {
            out.push_str("cbuffer MaterialParams : register(b1)\n{\n");
            out.push_str(&constants);
            out.push_str("};\n");
        }
        out.push_str(&resources);
        out
    }

    /// Serialize the table into the parameters blob.
    pub fn serialize(&self) -> Vec<u8> {
        let layout = self.layout();
        let mut out = Vec::new();
        out.extend_from_slice(&PARAMETERS_BLOB_VERSION.to_le_bytes());
        out.extend_from_slice(&(self.params.len() as u32).to_le_bytes());
        for (p, slot) in self.params.iter().zip(&layout) {
            out.extend_from_slice(p.id.as_bytes());
            out.push(p.kind as u8);
            out.push(value_type_code(p.value_type));
            out.push(p.is_public as u8 | ((p.is_override as u8) << 1));
            write_short_str(&mut out, &p.name);
            write_short_str(&mut out, &p.shader_name);
            out.extend_from_slice(&(p.default.len() as u32).to_le_bytes());
            out.extend_from_slice(&p.default);
            match p.asset_id {
                Some(a) => {
                    out.push(1);
                    out.extend_from_slice(a.as_bytes());
                }
                None => out.push(0),
            }
            out.extend_from_slice(&slot.raw().to_le_bytes());
        }
        out
    }

    /// Decode a blob produced by [`ParameterTable::serialize`].
    pub fn deserialize(bytes: &[u8]) -> Option<Vec<SerializedParameter>> {
        let mut r = BlobReader { bytes, pos: 0 };
        if r.u32()? != PARAMETERS_BLOB_VERSION {
            return None;
        }
        let count = r.u32()? as usize;
        let mut out = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            let id = Uuid::from_slice(r.take(16)?).ok()?;
            let kind = ParameterKind::from_u8(r.u8()?)?;
            let value_type = value_type_from_code(r.u8()?)?;
            let flags = r.u8()?;
            let name = r.short_str()?;
            let shader_name = r.short_str()?;
            let len = r.u32()? as usize;
            let default = r.take(len)?.to_vec();
            let asset_id = match r.u8()? {
                0 => None,
                _ => Some(Uuid::from_slice(r.take(16)?).ok()?),
            };
            let slot = r.u32()?;
            out.push(SerializedParameter {
                id,
                kind,
                value_type,
                is_public: flags & 1 != 0,
                is_override: flags & 2 != 0,
                name,
                shader_name,
                default,
                asset_id,
                slot,
            });
        }
        Some(out)
    }
}

/// Data block size of the global SDF bundle in the constant buffer.
const GLOBAL_SDF_DATA_SIZE: u32 = 64;

/// One entry decoded from a parameters blob.
#[derive(Clone, Debug, PartialEq)]
pub struct SerializedParameter {
    pub id: Uuid,
    pub kind: ParameterKind,
    pub value_type: ValueType,
    pub is_public: bool,
    pub is_override: bool,
    pub name: String,
    pub shader_name: String,
    pub default: Vec<u8>,
    pub asset_id: Option<Uuid>,
    pub slot: u32,
}

/// Length-prefixed UTF-8, cut at the last char boundary that fits a `u16` length.
fn write_short_str(out: &mut Vec<u8>, s: &str) {
    let max = u16::MAX as usize;
    let end = if s.len() <= max {
        s.len()
    } else {
        s.char_indices()
            .map(|(i, _)| i)
            .take_while(|&i| i <= max)
            .last()
            .unwrap_or(0)
    };
    let bytes = &s.as_bytes()[..end];
    out.extend_from_slice(&(bytes.len() as u16).to_le_bytes());
    out.extend_from_slice(bytes);
}

const VALUE_TYPES: [ValueType; 11] = [
    ValueType::Bool,
    ValueType::Int,
    ValueType::Uint,
    ValueType::Float,
    ValueType::Float2,
    ValueType::Float3,
    ValueType::Float4,
    ValueType::Quaternion,
    ValueType::Matrix,
    ValueType::Object,
    ValueType::Void,
];

fn value_type_code(t: ValueType) -> u8 {
    VALUE_TYPES.iter().position(|v| *v == t).unwrap_or(10) as u8
}

fn value_type_from_code(c: u8) -> Option<ValueType> {
    VALUE_TYPES.get(c as usize).copied()
}

struct BlobReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> BlobReader<'a> {
    fn take(&mut self, n: usize) -> Option<&'a [u8]> {
        let end = self.pos.checked_add(n)?;
        let s = self.bytes.get(self.pos..end)?;
        self.pos = end;
        Some(s)
    }

    fn u8(&mut self) -> Option<u8> {
        self.take(1).map(|b| b[0])
    }

    fn u32(&mut self) -> Option<u32> {
        self.take(4).map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn short_str(&mut self) -> Option<String> {
        let len = self.take(2).map(|b| u16::from_le_bytes([b[0], b[1]]))? as usize;
        String::from_utf8(self.take(len)?.to_vec()).ok()
    }
}

/// Map from graph parameter ids to the ids they were registered under.
pub type ParameterRemap = HashMap<Uuid, Uuid>;
