//! Versioned material descriptor: domain, blending, shading, usage and feature flags.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::error::ShaderAssetError;

macro_rules! u8_enum {
    ($(#[$m:meta])* pub enum $name:ident { $($(#[$vm:meta])* $variant:ident = $v:literal),+ $(,)? }) => {
        $(#[$m])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
        #[repr(u8)]
        pub enum $name {
            $($(#[$vm])* $variant = $v,)+
        }

        impl $name {
            /// Parse a stored discriminant.
            pub fn from_u8(v: u8) -> Option<Self> {
                match v {
                    $($v => Some(Self::$variant),)+
                    _ => None,
                }
            }
        }
    };
}

u8_enum! {
    pub enum MaterialDomain {
        #[default]
        Surface = 0,
        PostProcess = 1,
        Decal = 2,
        Gui = 3,
        Terrain = 4,
        Particle = 5,
        Deformable = 6,
        VolumeParticle = 7,
    }
}

u8_enum! {
    pub enum BlendMode {
        #[default]
        Opaque = 0,
        Transparent = 1,
        Additive = 2,
        Multiply = 3,
    }
}

u8_enum! {
    pub enum ShadingModel {
        Unlit = 0,
        #[default]
        Lit = 1,
        Subsurface = 2,
        Foliage = 3,
    }
}

u8_enum! {
    pub enum DecalBlendMode {
        #[default]
        Translucent = 0,
        Stain = 1,
        Normal = 2,
        Emissive = 3,
    }
}

u8_enum! {
    pub enum TransparentLightingMode {
        #[default]
        Surface = 0,
        SurfaceNonDirectional = 1,
    }
}

u8_enum! {
    pub enum PostFxLocation {
        #[default]
        AfterPostProcessingPass = 0,
        BeforeReflectionsPass = 1,
        BeforeForwardPass = 2,
        AfterForwardPass = 3,
        BeforePostProcessingPass = 4,
        AfterAntiAliasingPass = 5,
    }
}

u8_enum! {
    pub enum CullMode {
        #[default]
        Normal = 0,
        Inverted = 1,
        TwoSided = 2,
    }
}

u8_enum! {
    pub enum TessellationMethod {
        #[default]
        None = 0,
        Flat = 1,
        PointNormal = 2,
        Phong = 3,
    }
}

impl MaterialDomain {
    pub fn is_particle(self) -> bool {
        matches!(self, MaterialDomain::Particle | MaterialDomain::VolumeParticle)
    }
}

bitflags! {
    /// Inputs a generated material actually consumes.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct UsageFlags: u32 {
        const USE_MASK = 1 << 0;
        const USE_EMISSIVE = 1 << 1;
        const USE_POSITION_OFFSET = 1 << 2;
        const USE_VERTEX_COLOR = 1 << 3;
        const USE_NORMAL = 1 << 4;
        const USE_DISPLACEMENT = 1 << 5;
        const USE_REFRACTION = 1 << 6;
    }
}

bitflags! {
    /// Render-state features selected by the author.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct FeaturesFlags: u32 {
        const WIREFRAME = 1 << 0;
        const DISABLE_DEPTH_TEST = 1 << 1;
        const DISABLE_DEPTH_WRITE = 1 << 2;
        const INPUT_WORLD_SPACE_NORMAL = 1 << 3;
        const DITHERED_LOD_TRANSITION = 1 << 4;
        const DISABLE_FOG = 1 << 5;
        const DISABLE_REFLECTIONS = 1 << 6;
        const DISABLE_DISTORTION = 1 << 7;
        const PIXEL_NORMAL_OFFSET_REFRACTION = 1 << 8;
        const SCREEN_SPACE_REFLECTIONS = 1 << 9;
        const GLOBAL_ILLUMINATION = 1 << 10;
    }
}

/// Size of the packed [`MaterialInfo`] record.
pub const MATERIAL_INFO_SIZE: usize = 28;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MaterialInfo {
    pub domain: MaterialDomain,
    pub blend_mode: BlendMode,
    pub shading_model: ShadingModel,
    pub usage_flags: UsageFlags,
    pub features_flags: FeaturesFlags,
    pub decal_blend_mode: DecalBlendMode,
    pub transparent_lighting_mode: TransparentLightingMode,
    pub post_fx_location: PostFxLocation,
    pub cull_mode: CullMode,
    pub mask_threshold: f32,
    pub opacity_threshold: f32,
    pub tessellation_mode: TessellationMethod,
    pub max_tessellation_factor: i32,
}

impl Default for MaterialInfo {
    fn default() -> Self {
        Self {
            domain: MaterialDomain::Surface,
            blend_mode: BlendMode::Opaque,
            shading_model: ShadingModel::Lit,
            usage_flags: UsageFlags::empty(),
            features_flags: FeaturesFlags::empty(),
            decal_blend_mode: DecalBlendMode::Translucent,
            transparent_lighting_mode: TransparentLightingMode::Surface,
            post_fx_location: PostFxLocation::AfterPostProcessingPass,
            cull_mode: CullMode::Normal,
            mask_threshold: 0.3,
            opacity_threshold: 0.12,
            tessellation_mode: TessellationMethod::None,
            max_tessellation_factor: 15,
        }
    }
}

impl MaterialInfo {
    /// Packed little-endian record as stored in the shader asset header.
    pub fn to_bytes(&self) -> [u8; MATERIAL_INFO_SIZE] {
        let mut out = [0u8; MATERIAL_INFO_SIZE];
        out[0] = self.domain as u8;
        out[1] = self.blend_mode as u8;
        out[2] = self.shading_model as u8;
        out[3..7].copy_from_slice(&self.usage_flags.bits().to_le_bytes());
        out[7..11].copy_from_slice(&self.features_flags.bits().to_le_bytes());
        out[11] = self.decal_blend_mode as u8;
        out[12] = self.transparent_lighting_mode as u8;
        out[13] = self.post_fx_location as u8;
        out[14] = self.cull_mode as u8;
        out[15..19].copy_from_slice(&self.mask_threshold.to_le_bytes());
        out[19..23].copy_from_slice(&self.opacity_threshold.to_le_bytes());
        out[23] = self.tessellation_mode as u8;
        out[24..28].copy_from_slice(&self.max_tessellation_factor.to_le_bytes());
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ShaderAssetError> {
        if bytes.len() < MATERIAL_INFO_SIZE {
            return Err(ShaderAssetError::InvalidHeader(format!(
                "material info needs {MATERIAL_INFO_SIZE} bytes, got {}",
                bytes.len()
            )));
        }
        let u32_at = |o: usize| u32::from_le_bytes([bytes[o], bytes[o + 1], bytes[o + 2], bytes[o + 3]]);
        let bad = |what: &str, v: u8| ShaderAssetError::InvalidHeader(format!("invalid {what} {v}"));
        Ok(Self {
            domain: MaterialDomain::from_u8(bytes[0]).ok_or_else(|| bad("domain", bytes[0]))?,
            blend_mode: BlendMode::from_u8(bytes[1]).ok_or_else(|| bad("blend mode", bytes[1]))?,
            shading_model: ShadingModel::from_u8(bytes[2])
                .ok_or_else(|| bad("shading model", bytes[2]))?,
            usage_flags: UsageFlags::from_bits_truncate(u32_at(3)),
            features_flags: FeaturesFlags::from_bits_truncate(u32_at(7)),
            decal_blend_mode: DecalBlendMode::from_u8(bytes[11])
                .ok_or_else(|| bad("decal blend mode", bytes[11]))?,
            transparent_lighting_mode: TransparentLightingMode::from_u8(bytes[12])
                .ok_or_else(|| bad("transparent lighting mode", bytes[12]))?,
            post_fx_location: PostFxLocation::from_u8(bytes[13])
                .ok_or_else(|| bad("post fx location", bytes[13]))?,
            cull_mode: CullMode::from_u8(bytes[14]).ok_or_else(|| bad("cull mode", bytes[14]))?,
            mask_threshold: f32::from_bits(u32_at(15)),
            opacity_threshold: f32::from_bits(u32_at(19)),
            tessellation_mode: TessellationMethod::from_u8(bytes[23])
                .ok_or_else(|| bad("tessellation mode", bytes[23]))?,
            max_tessellation_factor: u32_at(24) as i32,
        })
    }

    /// A sampled layer must share the domain of the material sampling it.
    pub fn is_compatible_layer(&self, layer: &MaterialInfo) -> bool {
        self.domain == layer.domain
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packed_record_decodes() {
        let info = MaterialInfo {
            domain: MaterialDomain::Particle,
            blend_mode: BlendMode::Additive,
            usage_flags: UsageFlags::USE_NORMAL | UsageFlags::USE_EMISSIVE,
            features_flags: FeaturesFlags::DISABLE_FOG,
            mask_threshold: 0.5,
            tessellation_mode: TessellationMethod::Phong,
            max_tessellation_factor: 32,
            ..MaterialInfo::default()
        };
        let bytes = info.to_bytes();
        assert_eq!(bytes[0], 5);
        assert_eq!(MaterialInfo::from_bytes(&bytes).unwrap(), info);
    }

    #[test]
    fn invalid_enum_is_rejected() {
        let mut bytes = MaterialInfo::default().to_bytes();
        bytes[0] = 42;
        assert!(matches!(
            MaterialInfo::from_bytes(&bytes),
            Err(ShaderAssetError::InvalidHeader(_))
        ));
    }

    #[test]
    fn info_parses_from_json_with_defaults() {
        let info: MaterialInfo =
            serde_json::from_str(r#"{ "domain": "PostProcess", "usageFlags": "USE_MASK" }"#).unwrap();
        assert_eq!(info.domain, MaterialDomain::PostProcess);
        assert_eq!(info.usage_flags, UsageFlags::USE_MASK);
        assert_eq!(info.shading_model, ShadingModel::Lit);
    }
}
