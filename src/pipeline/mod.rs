//! Shader asset pipeline.
//!
//! A material asset stores its surface graph, the generated (encrypted) HLSL
//! source, its parameter table and one compiled cache per shader profile in
//! separate chunks of an [`AssetContainer`]. [`ShaderAsset::load`] regenerates
//! the source when the graph format moved on or a dependency changed, then
//! loads or compiles the cache for the device's profile.
//!
//! Chunk layout:
//!
//! | chunk | content                              |
//! |-------|--------------------------------------|
//! | 0     | parameter table                      |
//! | 1..=7 | compiled caches (see [`ShaderProfile::cache_chunk`]) |
//! | 14    | surface graph (JSON)                 |
//! | 15    | encrypted source                     |

pub mod bytes;
pub mod cache;
pub mod compiler;
pub mod container;
pub mod encryption;
pub mod header;
pub mod include_watcher;
pub mod options;
pub mod project_cache;
pub mod shader_asset;

/// Shader asset header format.
pub const SHADER_ASSET_VERSION: u32 = 20;
/// Generated sources older than this are regenerated on load.
pub const MATERIAL_GRAPH_VERSION: u32 = 19;

pub const PARAMETERS_CHUNK: usize = 0;
pub const SURFACE_CHUNK: usize = 14;
pub const SOURCE_CHUNK: usize = 15;

pub use cache::{CacheStatus, IncludeRecord, SHADER_CACHE_FORMAT_VERSION, ShaderCacheBlob, cache_status};
pub use compiler::{CompiledShader, OfflineDevice, RenderDevice, ShaderCompiler, ShaderProfile};
pub use container::{AssetContainer, CHUNK_COUNT, FileContainer, MemoryContainer, StorageLock};
pub use header::ShaderAssetHeader;
pub use include_watcher::{IncludeWatcher, PollLoop};
pub use options::{ShaderCompilationOptions, ShaderMacro};
pub use project_cache::ProjectShaderCache;
pub use shader_asset::{CacheSource, LoadReport, ShaderAsset, ShaderPipeline};
