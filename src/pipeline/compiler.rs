//! Seams to the shader backend and the GPU device.

use std::fmt;
use std::str::FromStr;

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};

use super::options::ShaderCompilationOptions;

/// Backend shader target. Each profile owns one cache chunk of the asset.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShaderProfile {
    DirectXSm5,
    DirectXSm4,
    Glsl410,
    Glsl440,
    VulkanSm5,
    DirectXSm6,
}

impl ShaderProfile {
    pub const ALL: [ShaderProfile; 6] = [
        ShaderProfile::DirectXSm5,
        ShaderProfile::DirectXSm4,
        ShaderProfile::Glsl410,
        ShaderProfile::Glsl440,
        ShaderProfile::VulkanSm5,
        ShaderProfile::DirectXSm6,
    ];

    /// Asset chunk holding this profile's compiled cache.
    pub fn cache_chunk(self) -> usize {
        match self {
            ShaderProfile::DirectXSm5 => 1,
            ShaderProfile::DirectXSm4 => 2,
            ShaderProfile::Glsl410 => 3,
            ShaderProfile::Glsl440 => 4,
            ShaderProfile::VulkanSm5 => 5,
            ShaderProfile::DirectXSm6 => 7,
        }
    }

    /// Stable name, also the project cache directory.
    pub fn name(self) -> &'static str {
        match self {
            ShaderProfile::DirectXSm5 => "DirectX_SM5",
            ShaderProfile::DirectXSm4 => "DirectX_SM4",
            ShaderProfile::Glsl410 => "GLSL_410",
            ShaderProfile::Glsl440 => "GLSL_440",
            ShaderProfile::VulkanSm5 => "Vulkan_SM5",
            ShaderProfile::DirectXSm6 => "DirectX_SM6",
        }
    }
}

impl fmt::Display for ShaderProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ShaderProfile {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|p| p.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| anyhow!("unknown shader profile '{s}'"))
    }
}

/// Output of one backend compilation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CompiledShader {
    pub bytecode: Vec<u8>,
    /// Resolved paths of every file the source included.
    pub includes: Vec<String>,
}

/// HLSL to bytecode backend. May block for a long time; there is no cancellation.
pub trait ShaderCompiler: Send + Sync {
    fn compile(&self, options: &ShaderCompilationOptions) -> Result<CompiledShader>;
}

pub trait RenderDevice: Send + Sync {
    /// The device finished initialising and can accept shaders.
    fn is_ready(&self) -> bool;
    fn shader_profile(&self) -> ShaderProfile;
}

/// A device that is always ready, for offline tools.
#[derive(Clone, Copy, Debug)]
pub struct OfflineDevice(pub ShaderProfile);

impl RenderDevice for OfflineDevice {
    fn is_ready(&self) -> bool {
        true
    }

    fn shader_profile(&self) -> ShaderProfile {
        self.0
    }
}
