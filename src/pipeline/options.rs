//! Compilation options handed to the backend, including the material macros.

use uuid::Uuid;

use super::compiler::ShaderProfile;
use crate::config::{PipelineConfig, RuntimeOptions};
use crate::material_info::{
    BlendMode, FeaturesFlags, MaterialDomain, MaterialInfo, ShadingModel, TessellationMethod,
    TransparentLightingMode, UsageFlags,
};

/// Control points per patch when tessellation is enabled.
const TESSELLATION_CONTROL_POINTS: u32 = 3;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShaderMacro {
    pub name: String,
    pub definition: String,
}

impl ShaderMacro {
    pub fn new(name: impl Into<String>, definition: impl ToString) -> Self {
        Self {
            name: name.into(),
            definition: definition.to_string(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ShaderCompilationOptions {
    pub target_id: Uuid,
    pub target_name: String,
    pub profile: ShaderProfile,
    /// Decrypted HLSL source.
    pub source: Vec<u8>,
    pub macros: Vec<ShaderMacro>,
    pub generate_debug_data: bool,
    pub no_optimize: bool,
}

impl ShaderCompilationOptions {
    pub fn new(target_id: Uuid, profile: ShaderProfile, source: Vec<u8>) -> Self {
        Self {
            target_id,
            target_name: target_id.to_string(),
            profile,
            source,
            macros: Vec::new(),
            generate_debug_data: false,
            no_optimize: false,
        }
    }

    /// Options for a material: platform, editor, debug switches and the info macros.
    pub fn for_material(
        target_id: Uuid,
        profile: ShaderProfile,
        source: Vec<u8>,
        info: &MaterialInfo,
        config: &PipelineConfig,
    ) -> Self {
        let mut o = Self::new(target_id, profile, source);
        o.macros.push(ShaderMacro::new(platform_macro(), 1));
        if config.editor {
            o.macros.push(ShaderMacro::new("USE_EDITOR", 1));
        }
        o.apply_runtime(&config.runtime);
        o.macros.extend(material_macros(info));
        o
    }

    pub fn apply_runtime(&mut self, runtime: &RuntimeOptions) {
        if runtime.shader_debug {
            self.generate_debug_data = true;
            self.no_optimize = true;
        } else if runtime.shader_profile {
            self.generate_debug_data = true;
        }
    }

    pub fn macro_value(&self, name: &str) -> Option<&str> {
        self.macros
            .iter()
            .find(|m| m.name == name)
            .map(|m| m.definition.as_str())
    }
}

pub fn platform_macro() -> &'static str {
    if cfg!(target_os = "windows") {
        "PLATFORM_WINDOWS"
    } else if cfg!(target_os = "macos") {
        "PLATFORM_MAC"
    } else {
        "PLATFORM_LINUX"
    }
}

/// Macros describing the material to the shared shader templates.
pub fn material_macros(info: &MaterialInfo) -> Vec<ShaderMacro> {
    let usage = info.usage_flags;
    let features = info.features_flags;
    let domain = info.domain;
    let flag = |b: bool| b as u32;

    let surface_like = matches!(domain, MaterialDomain::Surface | MaterialDomain::Deformable);
    let particle = domain.is_particle();
    let forward = (surface_like && info.blend_mode != BlendMode::Opaque) || particle;
    let deferred = (surface_like || domain == MaterialDomain::Terrain) && info.blend_mode == BlendMode::Opaque;
    let tessellation = info.tessellation_mode != TessellationMethod::None;
    let shading_model = if info.blend_mode == BlendMode::Opaque || forward {
        info.shading_model
    } else {
        ShadingModel::Unlit
    };

    let mut m = vec![
        ShaderMacro::new("MATERIAL_DOMAIN", domain as u8),
        ShaderMacro::new("MATERIAL_BLEND", info.blend_mode as u8),
        ShaderMacro::new("MATERIAL_SHADING_MODEL", shading_model as u8),
        ShaderMacro::new("MATERIAL_MASKED", flag(usage.contains(UsageFlags::USE_MASK))),
        ShaderMacro::new("DECAL_BLEND_MODE", info.decal_blend_mode as u8),
        ShaderMacro::new("USE_EMISSIVE", flag(usage.contains(UsageFlags::USE_EMISSIVE))),
        ShaderMacro::new("USE_NORMAL", flag(usage.contains(UsageFlags::USE_NORMAL))),
        ShaderMacro::new(
            "USE_POSITION_OFFSET",
            flag(usage.contains(UsageFlags::USE_POSITION_OFFSET)),
        ),
        ShaderMacro::new("USE_VERTEX_COLOR", flag(usage.contains(UsageFlags::USE_VERTEX_COLOR))),
        ShaderMacro::new("USE_DISPLACEMENT", flag(usage.contains(UsageFlags::USE_DISPLACEMENT))),
        ShaderMacro::new(
            "USE_DITHERED_LOD_TRANSITION",
            flag(features.contains(FeaturesFlags::DITHERED_LOD_TRANSITION)),
        ),
        ShaderMacro::new(
            "USE_GBUFFER_CUSTOM_DATA",
            flag(matches!(shading_model, ShadingModel::Subsurface | ShadingModel::Foliage)),
        ),
        ShaderMacro::new(
            "USE_REFLECTIONS",
            flag(forward && !features.contains(FeaturesFlags::DISABLE_REFLECTIONS)),
        ),
        ShaderMacro::new(
            "MATERIAL_REFLECTIONS",
            flag(features.contains(FeaturesFlags::SCREEN_SPACE_REFLECTIONS)),
        ),
        ShaderMacro::new("USE_FOG", flag(!features.contains(FeaturesFlags::DISABLE_FOG))),
        ShaderMacro::new(
            "USE_PIXEL_NORMAL_OFFSET_REFRACTION",
            flag(features.contains(FeaturesFlags::PIXEL_NORMAL_OFFSET_REFRACTION)),
        ),
        ShaderMacro::new(
            "LIGHTING_NO_DIRECTIONAL",
            flag(info.transparent_lighting_mode == TransparentLightingMode::SurfaceNonDirectional),
        ),
        ShaderMacro::new("USE_TESSELLATION", flag(tessellation)),
        ShaderMacro::new("TESSELLATION_IN_CONTROL_POINTS", TESSELLATION_CONTROL_POINTS),
        ShaderMacro::new("MATERIAL_TESSELLATION", info.tessellation_mode as u8),
        ShaderMacro::new("MAX_TESSELLATION_FACTOR", info.max_tessellation_factor),
    ];
    let domains = [
        ("IS_SURFACE", domain == MaterialDomain::Surface),
        ("IS_POST_FX", domain == MaterialDomain::PostProcess),
        ("IS_GUI", domain == MaterialDomain::Gui),
        ("IS_DECAL", domain == MaterialDomain::Decal),
        ("IS_TERRAIN", domain == MaterialDomain::Terrain),
        ("IS_PARTICLE", particle),
        ("IS_DEFORMABLE", domain == MaterialDomain::Deformable),
    ];
    m.extend(domains.into_iter().map(|(n, v)| ShaderMacro::new(n, flag(v))));
    m.push(ShaderMacro::new("USE_FORWARD", flag(forward)));
    m.push(ShaderMacro::new("USE_DEFERRED", flag(deferred)));
    m.push(ShaderMacro::new(
        "USE_DISTORTION",
        flag(
            forward
                && usage.contains(UsageFlags::USE_REFRACTION)
                && !features.contains(FeaturesFlags::DISABLE_DISTORTION),
        ),
    ));
    m
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(info: MaterialInfo, config: PipelineConfig) -> ShaderCompilationOptions {
        ShaderCompilationOptions::for_material(Uuid::nil(), ShaderProfile::DirectXSm5, vec![], &info, &config)
    }

    #[test]
    fn opaque_surface_is_deferred() {
        let o = options(MaterialInfo::default(), PipelineConfig::default());
        assert_eq!(o.macro_value("IS_SURFACE"), Some("1"));
        assert_eq!(o.macro_value("USE_DEFERRED"), Some("1"));
        assert_eq!(o.macro_value("USE_FORWARD"), Some("0"));
        assert_eq!(o.macro_value("MATERIAL_SHADING_MODEL"), Some("1"));
        assert_eq!(o.macro_value("USE_FOG"), Some("1"));
        assert_eq!(o.macro_value("USE_EDITOR"), None);
        assert_eq!(o.macro_value(platform_macro()), Some("1"));
        assert!(!o.generate_debug_data && !o.no_optimize);
    }

    #[test]
    fn transparent_refraction_enables_distortion() {
        let info = MaterialInfo {
            blend_mode: BlendMode::Transparent,
            usage_flags: UsageFlags::USE_REFRACTION | UsageFlags::USE_MASK,
            ..MaterialInfo::default()
        };
        let config = PipelineConfig {
            editor: true,
            ..PipelineConfig::default()
        };
        let o = options(info, config);
        assert_eq!(o.macro_value("USE_FORWARD"), Some("1"));
        assert_eq!(o.macro_value("USE_DISTORTION"), Some("1"));
        assert_eq!(o.macro_value("MATERIAL_MASKED"), Some("1"));
        assert_eq!(o.macro_value("USE_EDITOR"), Some("1"));
    }

    #[test]
    fn debug_switch_disables_optimisation() {
        let mut config = PipelineConfig::default();
        config.runtime.shader_debug = true;
        let o = options(MaterialInfo::default(), config);
        assert!(o.generate_debug_data && o.no_optimize);

        let mut config = PipelineConfig::default();
        config.runtime.shader_profile = true;
        let o = options(MaterialInfo::default(), config);
        assert!(o.generate_debug_data && !o.no_optimize);
    }
}
