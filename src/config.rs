//! Runtime switches and pipeline configuration.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Process-wide shader switches taken from the command line.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RuntimeOptions {
    /// Compile with debug data and without optimisation.
    pub shader_debug: bool,
    /// Compile with debug data for GPU profilers.
    pub shader_profile: bool,
}

impl RuntimeOptions {
    /// Consume `arg` if it is one of the shader switches.
    pub fn apply_flag(&mut self, arg: &str) -> bool {
        match arg {
            "-shaderdebug" | "--shader-debug" => self.shader_debug = true,
            "-shaderprofile" | "--shader-profile" => self.shader_profile = true,
            _ => return false,
        }
        true
    }

    pub fn from_args<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut opts = Self::default();
        for a in args {
            opts.apply_flag(a.as_ref());
        }
        opts
    }
}

/// Where compiled shader caches are persisted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShaderCacheMode {
    /// Compile on every load, keep nothing.
    Disabled,
    /// Store caches in the material asset's own chunks.
    #[default]
    AssetInternal,
    /// Store caches under the project cache directory.
    ProjectCache,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PipelineConfig {
    pub caching: ShaderCacheMode,
    pub project_cache_dir: Option<PathBuf>,
    /// Emit `USE_EDITOR`.
    pub editor: bool,
    pub gpu_ready_timeout_ms: u64,
    pub gpu_ready_poll_ms: u64,
    pub runtime: RuntimeOptions,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            caching: ShaderCacheMode::AssetInternal,
            project_cache_dir: None,
            editor: false,
            gpu_ready_timeout_ms: 1000,
            gpu_ready_poll_ms: 1,
            runtime: RuntimeOptions::default(),
        }
    }
}

impl PipelineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("invalid config {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_flag_spellings_are_accepted() {
        let o = RuntimeOptions::from_args(["-shaderdebug", "--graph", "x.json"]);
        assert!(o.shader_debug && !o.shader_profile);
        let o = RuntimeOptions::from_args(["--shader-profile"]);
        assert!(o.shader_profile);
    }

    #[test]
    fn config_fields_default() {
        let c: PipelineConfig = serde_json::from_str(r#"{ "caching": "ProjectCache", "editor": true }"#).unwrap();
        assert_eq!(c.caching, ShaderCacheMode::ProjectCache);
        assert!(c.editor);
        assert_eq!(c.gpu_ready_timeout_ms, 1000);
        assert_eq!(c.gpu_ready_poll_ms, 1);
        assert_eq!(c.runtime, RuntimeOptions::default());
    }
}
