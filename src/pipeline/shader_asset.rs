//! Loading a material shader asset: source regeneration and the compiled cache.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;
use uuid::Uuid;

use super::cache::{CacheStatus, IncludeRecord, ShaderCacheBlob, cache_status};
use super::compiler::{RenderDevice, ShaderCompiler, ShaderProfile};
use super::container::AssetContainer;
use super::encryption::{decrypted, encrypted};
use super::header::ShaderAssetHeader;
use super::include_watcher::IncludeWatcher;
use super::options::ShaderCompilationOptions;
use super::project_cache::ProjectShaderCache;
use super::{MATERIAL_GRAPH_VERSION, PARAMETERS_CHUNK, SOURCE_CHUNK, SURFACE_CHUNK};
use crate::asset_store::AssetStore;
use crate::config::{PipelineConfig, ShaderCacheMode};
use crate::error::{GeneratorError, ShaderAssetError};
use crate::generator::material::default_material_graph;
use crate::generator::MaterialGenerator;
use crate::graph::Graph;
use crate::material_info::MaterialInfo;

/// Shared services every shader asset load goes through.
pub struct ShaderPipeline {
    pub config: PipelineConfig,
    pub assets: AssetStore,
    device: Arc<dyn RenderDevice>,
    compiler: Arc<dyn ShaderCompiler>,
    watcher: Option<IncludeWatcher>,
    project_cache: Option<ProjectShaderCache>,
}

impl ShaderPipeline {
    pub fn new(
        config: PipelineConfig,
        assets: AssetStore,
        device: Arc<dyn RenderDevice>,
        compiler: Arc<dyn ShaderCompiler>,
    ) -> Self {
        let project_cache = match (config.caching, &config.project_cache_dir) {
            (ShaderCacheMode::ProjectCache, Some(dir)) => Some(ProjectShaderCache::new(dir)),
            (ShaderCacheMode::ProjectCache, None) => {
                log::warn!("project shader cache selected without a directory; caching disabled");
                None
            }
            _ => None,
        };
        Self {
            config,
            assets,
            device,
            compiler,
            watcher: None,
            project_cache,
        }
    }

    pub fn with_watcher(mut self, watcher: IncludeWatcher) -> Self {
        self.watcher = Some(watcher);
        self
    }

    pub fn watcher(&self) -> Option<&IncludeWatcher> {
        self.watcher.as_ref()
    }

    pub fn profile(&self) -> ShaderProfile {
        self.device.shader_profile()
    }

    /// Sleep-poll until the device is ready, bounded by the configured timeout.
    fn wait_for_device(&self) -> Result<(), ShaderAssetError> {
        let timeout = Duration::from_millis(self.config.gpu_ready_timeout_ms);
        let poll = Duration::from_millis(self.config.gpu_ready_poll_ms.max(1));
        let start = Instant::now();
        while !self.device.is_ready() {
            if start.elapsed() >= timeout {
                return Err(ShaderAssetError::InvalidData(format!(
                    "render device not ready after {} ms",
                    self.config.gpu_ready_timeout_ms
                )));
            }
            thread::sleep(poll);
        }
        Ok(())
    }
}

/// Where the bytecode of a load came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheSource {
    Asset,
    ProjectCache,
    Compiled,
}

#[derive(Debug)]
pub struct LoadReport {
    pub regenerated: bool,
    pub cache: CacheSource,
    /// Generator errors of the regeneration pass, empty when the source was reused.
    pub errors: Vec<GeneratorError>,
}

pub struct ShaderAsset<C: AssetContainer> {
    container: C,
    header: Option<ShaderAssetHeader>,
    dependency_modified: Arc<AtomicBool>,
    bytecode: Option<Vec<u8>>,
    includes: Vec<String>,
}

impl<C: AssetContainer> ShaderAsset<C> {
    pub fn new(container: C) -> Self {
        Self {
            container,
            header: None,
            dependency_modified: Arc::new(AtomicBool::new(false)),
            bytecode: None,
            includes: Vec::new(),
        }
    }

    /// Initialise `container` as a new material with `surface` as its graph.
    /// The first load generates its source.
    pub fn create(mut container: C, info: MaterialInfo, surface: &Graph) -> Result<Self> {
        let mut bytes = Vec::new();
        surface.save(&mut bytes, true)?;
        container.set_header(ShaderAssetHeader::new(info).to_bytes());
        container.set_chunk(SURFACE_CHUNK, bytes);
        container.save()?;
        Ok(Self::new(container))
    }

    pub fn id(&self) -> Uuid {
        self.container.id()
    }

    pub fn container(&self) -> &C {
        &self.container
    }

    pub fn container_mut(&mut self) -> &mut C {
        &mut self.container
    }

    pub fn into_container(self) -> C {
        self.container
    }

    /// Header of the last successful load.
    pub fn header(&self) -> Option<&ShaderAssetHeader> {
        self.header.as_ref()
    }

    pub fn parameters(&self) -> Option<&[u8]> {
        self.container.chunk(PARAMETERS_CHUNK)
    }

    pub fn bytecode(&self) -> Option<&[u8]> {
        self.bytecode.as_deref()
    }

    pub fn includes(&self) -> &[String] {
        &self.includes
    }

    /// Decrypted generated source.
    pub fn source(&self) -> Option<String> {
        self.container
            .chunk(SOURCE_CHUNK)
            .map(|c| String::from_utf8_lossy(&decrypted(c)).into_owned())
    }

    /// Flag set when an include or a referenced asset changed. The next load regenerates.
    pub fn dependency_flag(&self) -> Arc<AtomicBool> {
        self.dependency_modified.clone()
    }

    pub fn mark_dependency_modified(&self) {
        self.dependency_modified.store(true, Ordering::Release);
    }

    pub fn load(&mut self, pipeline: &ShaderPipeline, off_main_thread: bool) -> Result<LoadReport, ShaderAssetError> {
        if off_main_thread {
            pipeline.wait_for_device()?;
        }
        let id = self.container.id();
        let mut header = ShaderAssetHeader::from_bytes(self.container.header())?;

        let dependency_modified = self.dependency_modified.swap(false, Ordering::AcqRel);
        let regenerate =
            !header.is_current_graph() || !self.container.has_chunk(SOURCE_CHUNK) || dependency_modified;
        let mut errors = Vec::new();
        if regenerate {
            log::info!(
                "material {id}: regenerating source (graph version {}, dependency modified: {dependency_modified})",
                header.graph_version
            );
            errors = self.regenerate(pipeline, &mut header);
        } else if !self.container.has_chunk(PARAMETERS_CHUNK) {
            return Err(ShaderAssetError::MissingDataChunk(PARAMETERS_CHUNK));
        }
        self.header = Some(header);

        let (blob, cache) = self.load_cache(pipeline, &header)?;
        let blob = ShaderCacheBlob::decode(&blob)?;
        self.includes = blob.includes.into_iter().map(|i| i.path).collect();
        self.bytecode = Some(blob.bytecode);

        if let Some(w) = pipeline.watcher() {
            w.register(id, &self.includes, self.dependency_modified.clone());
        }
        Ok(LoadReport {
            regenerated: regenerate,
            cache,
            errors,
        })
    }

    pub fn unload(&mut self, pipeline: &ShaderPipeline) {
        if let Some(w) = pipeline.watcher() {
            w.unregister(self.container.id());
        }
        self.bytecode = None;
        self.includes.clear();
    }

    /// Rebuild source, parameters and dependencies from the surface graph.
    fn regenerate(&mut self, pipeline: &ShaderPipeline, header: &mut ShaderAssetHeader) -> Vec<GeneratorError> {
        let lock = self.container.storage_lock();
        let _guard = lock.lock();
        let id = self.container.id();

        let graph = match self.container.chunk(SURFACE_CHUNK) {
            Some(bytes) => match Graph::load(bytes, true) {
                Ok(loaded) => {
                    if loaded.deprecated {
                        self.resave_surface(&loaded.graph);
                    }
                    loaded.graph
                }
                Err(e) => {
                    log::error!("material {id}: cannot load surface graph, using the default layer: {e}");
                    default_material_graph()
                }
            },
            None => {
                log::warn!("material {id}: no surface graph, using the default layer");
                default_material_graph()
            }
        };

        self.container.release_chunk(PARAMETERS_CHUNK);
        let generated = MaterialGenerator::new(id, Arc::new(graph), header.info, pipeline.assets.clone())
            .with_node_comments(pipeline.config.editor)
            .generate();

        self.container.set_chunk(PARAMETERS_CHUNK, generated.parameters);
        self.container.set_dependencies(generated.dependencies);
        self.container.set_chunk(SOURCE_CHUNK, encrypted(generated.source.as_bytes()));
        for profile in ShaderProfile::ALL {
            self.container.release_chunk(profile.cache_chunk());
        }
        self.container.release_chunk(GENERIC_CACHE_CHUNK);
        if let Some(pc) = &pipeline.project_cache {
            for profile in ShaderProfile::ALL {
                pc.remove(id, profile);
            }
        }

        header.info = generated.info;
        header.graph_version = MATERIAL_GRAPH_VERSION;
        self.container.set_header(header.to_bytes());
        if let Err(e) = self.container.save() {
            log::error!("material {id}: failed to save regenerated asset: {e:#}");
        }
        generated.errors
    }

    fn resave_surface(&mut self, graph: &Graph) {
        let mut bytes = Vec::new();
        match graph.save(&mut bytes, true) {
            Ok(()) => {
                log::info!("material {}: upgraded surface graph", self.container.id());
                self.container.set_chunk(SURFACE_CHUNK, bytes);
            }
            Err(e) => log::warn!("material {}: failed to upgrade surface graph: {e}", self.container.id()),
        }
    }

    fn load_cache(
        &mut self,
        pipeline: &ShaderPipeline,
        header: &ShaderAssetHeader,
    ) -> Result<(Vec<u8>, CacheSource), ShaderAssetError> {
        let id = self.container.id();
        let profile = pipeline.profile();
        match (pipeline.config.caching, &pipeline.project_cache) {
            (ShaderCacheMode::AssetInternal, _) => {
                let chunk = profile.cache_chunk();
                if let Some(bytes) = self.container.chunk(chunk) {
                    match cache_status(bytes) {
                        CacheStatus::Valid => return Ok((bytes.to_vec(), CacheSource::Asset)),
                        CacheStatus::Invalid(reason) => {
                            log::info!("material {id}: {profile} cache invalid: {reason}")
                        }
                    }
                }
                let blob = self.compile(pipeline, header, profile)?;
                let lock = self.container.storage_lock();
                let _guard = lock.lock();
                self.container.set_chunk(chunk, blob.clone());
                if let Err(e) = self.container.save() {
                    log::warn!("material {id}: failed to save shader cache: {e:#}");
                }
                Ok((blob, CacheSource::Compiled))
            }
            (ShaderCacheMode::ProjectCache, Some(pc)) => {
                if let Some(bytes) = pc.load(id, profile, self.container.path()) {
                    match cache_status(&bytes) {
                        CacheStatus::Valid => return Ok((bytes, CacheSource::ProjectCache)),
                        CacheStatus::Invalid(reason) => {
                            log::info!("material {id}: project {profile} cache invalid: {reason}")
                        }
                    }
                }
                let blob = self.compile(pipeline, header, profile)?;
                if let Err(e) = pc.store(id, profile, &blob) {
                    log::warn!("material {id}: {e:#}");
                }
                Ok((blob, CacheSource::Compiled))
            }
            _ => Ok((self.compile(pipeline, header, profile)?, CacheSource::Compiled)),
        }
    }

    /// Compile the current source into an encoded cache blob.
    fn compile(
        &self,
        pipeline: &ShaderPipeline,
        header: &ShaderAssetHeader,
        profile: ShaderProfile,
    ) -> Result<Vec<u8>, ShaderAssetError> {
        let id = self.container.id();
        let source = self
            .container
            .chunk(SOURCE_CHUNK)
            .map(decrypted)
            .ok_or(ShaderAssetError::MissingDataChunk(SOURCE_CHUNK))?;
        let options = ShaderCompilationOptions::for_material(id, profile, source, &header.info, &pipeline.config);
        let started = Instant::now();
        let compiled = pipeline.compiler.compile(&options).map_err(|e| {
            log::error!("material {id}: {profile} compilation failed: {e:#}");
            ShaderAssetError::CompileBackend(e)
        })?;
        log::info!(
            "material {id}: compiled {profile} in {} ms ({} bytes)",
            started.elapsed().as_millis(),
            compiled.bytecode.len()
        );
        let blob = ShaderCacheBlob {
            bytecode: compiled.bytecode,
            includes: compiled.includes.into_iter().map(IncludeRecord::capture).collect(),
        };
        Ok(blob.encode())
    }
}

/// Cache slot shared by every profile. Cleared with the others but never written.
const GENERIC_CACHE_CHUNK: usize = 6;

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::pipeline::compiler::{CompiledShader, OfflineDevice};
    use crate::pipeline::container::MemoryContainer;

    #[derive(Default)]
    struct CountingCompiler {
        calls: Mutex<usize>,
        fail: bool,
    }

    impl ShaderCompiler for CountingCompiler {
        fn compile(&self, options: &ShaderCompilationOptions) -> Result<CompiledShader> {
            *self.calls.lock().unwrap() += 1;
            if self.fail {
                anyhow::bail!("syntax error");
            }
            Ok(CompiledShader {
                bytecode: options.source.len().to_le_bytes().to_vec(),
                includes: Vec::new(),
            })
        }
    }

    struct NeverReady;

    impl RenderDevice for NeverReady {
        fn is_ready(&self) -> bool {
            false
        }

        fn shader_profile(&self) -> ShaderProfile {
            ShaderProfile::DirectXSm5
        }
    }

    fn pipeline(compiler: Arc<CountingCompiler>) -> ShaderPipeline {
        ShaderPipeline::new(
            PipelineConfig::default(),
            AssetStore::new(),
            Arc::new(OfflineDevice(ShaderProfile::DirectXSm5)),
            compiler,
        )
    }

    fn new_asset() -> ShaderAsset<MemoryContainer> {
        ShaderAsset::create(
            MemoryContainer::new(Uuid::new_v4()),
            MaterialInfo::default(),
            &default_material_graph(),
        )
        .unwrap()
    }

    #[test]
    fn second_load_reuses_source_and_cache() {
        let compiler = Arc::new(CountingCompiler::default());
        let p = pipeline(compiler.clone());
        let mut asset = new_asset();

        let first = asset.load(&p, false).unwrap();
        assert!(first.regenerated);
        assert_eq!(first.cache, CacheSource::Compiled);
        assert!(asset.source().unwrap().contains("GetMaterialPS"));
        assert_eq!(asset.header().unwrap().graph_version, MATERIAL_GRAPH_VERSION);

        let second = asset.load(&p, false).unwrap();
        assert!(!second.regenerated);
        assert_eq!(second.cache, CacheSource::Asset);
        assert_eq!(*compiler.calls.lock().unwrap(), 1);
    }

    #[test]
    fn dependency_flag_forces_regeneration() {
        let p = pipeline(Arc::new(CountingCompiler::default()));
        let mut asset = new_asset();
        asset.load(&p, false).unwrap();
        asset.mark_dependency_modified();
        let report = asset.load(&p, false).unwrap();
        assert!(report.regenerated);
        assert_eq!(report.cache, CacheSource::Compiled);
        assert!(!asset.dependency_flag().load(Ordering::Acquire));
    }

    #[test]
    fn compile_failure_keeps_previous_cache() {
        let p = pipeline(Arc::new(CountingCompiler::default()));
        let mut asset = new_asset();
        asset.load(&p, false).unwrap();
        // An unreadable cache forces a compile.
        asset.container_mut().set_chunk(1, vec![1, 2, 3]);

        let mut broken = p;
        broken.compiler = Arc::new(CountingCompiler {
            fail: true,
            ..CountingCompiler::default()
        });
        let err = asset.load(&broken, false).unwrap_err();
        assert!(matches!(err, ShaderAssetError::CompileBackend(_)));
        assert_eq!(asset.container().chunk(1), Some(&[1u8, 2, 3][..]));
    }

    #[test]
    fn device_wait_times_out() {
        let mut config = PipelineConfig::default();
        config.gpu_ready_timeout_ms = 5;
        let p = ShaderPipeline::new(
            config,
            AssetStore::new(),
            Arc::new(NeverReady),
            Arc::new(CountingCompiler::default()),
        );
        let mut asset = new_asset();
        assert!(matches!(asset.load(&p, true), Err(ShaderAssetError::InvalidData(_))));
        // The main thread does not wait.
        assert!(asset.load(&p, false).is_ok());
    }

    #[test]
    fn wrong_format_version_fails() {
        let p = pipeline(Arc::new(CountingCompiler::default()));
        let mut asset = new_asset();
        let mut header = asset.container().header().to_vec();
        header[0] = 7;
        asset.container_mut().set_header(header);
        assert!(matches!(
            asset.load(&p, false),
            Err(ShaderAssetError::VersionMismatch { found: 7, .. })
        ));
    }
}
