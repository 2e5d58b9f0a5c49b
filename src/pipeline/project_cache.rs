//! Project-level shader cache: one file per material and profile under a shared directory.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::SystemTime;

use anyhow::{Context, Result};
use uuid::Uuid;

use super::compiler::ShaderProfile;
use super::container::write_atomically;

/// Serialises writers across every cache instance of the process.
static WRITE_LOCK: Mutex<()> = Mutex::new(());

#[derive(Clone, Debug)]
pub struct ProjectShaderCache {
    root: PathBuf,
}

impl ProjectShaderCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn entry_path(&self, id: Uuid, profile: ShaderProfile) -> PathBuf {
        self.root.join(profile.name()).join(format!("{}.cache", id.simple()))
    }

    /// Cached blob, if one exists and is newer than `source` (the material's own file).
    pub fn load(&self, id: Uuid, profile: ShaderProfile, source: Option<&Path>) -> Option<Vec<u8>> {
        let path = self.entry_path(id, profile);
        let cached_at = modified(&path)?;
        if let Some(src) = source.and_then(modified)
            && src > cached_at
        {
            log::debug!("project cache {} is older than its material", path.display());
            return None;
        }
        match std::fs::read(&path) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                log::warn!("failed to read project cache {}: {e}", path.display());
                None
            }
        }
    }

    pub fn store(&self, id: Uuid, profile: ShaderProfile, blob: &[u8]) -> Result<()> {
        let path = self.entry_path(id, profile);
        let _guard = WRITE_LOCK.lock().unwrap_or_else(|p| p.into_inner());
        write_atomically(&path, blob).with_context(|| format!("failed to store shader cache for {id}"))
    }

    pub fn remove(&self, id: Uuid, profile: ShaderProfile) {
        let _guard = WRITE_LOCK.lock().unwrap_or_else(|p| p.into_inner());
        let _ = std::fs::remove_file(self.entry_path(id, profile));
    }
}

fn modified(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).ok()?.modified().ok()
}

#[cfg(test)]
mod tests {
    use std::fs::File;
    use std::time::Duration;

    use super::*;

    fn temp_root() -> PathBuf {
        std::env::temp_dir().join(format!("material-forge-project-cache-{}", Uuid::new_v4()))
    }

    #[test]
    fn entries_are_grouped_by_profile() {
        let cache = ProjectShaderCache::new("/cache");
        let id = Uuid::nil();
        assert_eq!(
            cache.entry_path(id, ShaderProfile::VulkanSm5),
            Path::new("/cache/Vulkan_SM5/00000000000000000000000000000000.cache")
        );
    }

    #[test]
    fn stale_entries_are_ignored() {
        let root = temp_root();
        let cache = ProjectShaderCache::new(&root);
        let id = Uuid::new_v4();
        cache.store(id, ShaderProfile::DirectXSm5, b"blob").unwrap();
        assert_eq!(cache.load(id, ShaderProfile::DirectXSm5, None).as_deref(), Some(&b"blob"[..]));
        assert!(cache.load(id, ShaderProfile::Glsl410, None).is_none());

        let material = root.join("material.asset");
        std::fs::write(&material, b"m").unwrap();
        let later = SystemTime::now() + Duration::from_secs(60);
        File::options().write(true).open(&material).unwrap().set_modified(later).unwrap();
        assert!(cache.load(id, ShaderProfile::DirectXSm5, Some(&material)).is_none());

        cache.remove(id, ShaderProfile::DirectXSm5);
        assert!(cache.load(id, ShaderProfile::DirectXSm5, None).is_none());
        let _ = std::fs::remove_dir_all(root);
    }
}
