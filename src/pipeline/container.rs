//! Chunked asset storage.
//!
//! A shader asset is a header plus up to [`CHUNK_COUNT`] independent binary
//! chunks and a list of content dependencies. The pipeline only talks to the
//! [`AssetContainer`] trait; [`MemoryContainer`] backs tests and tools and
//! [`FileContainer`] keeps everything in one file.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::{Context, Result, bail};
use uuid::Uuid;

use super::bytes::{ByteReader, ByteWriter};

pub const CHUNK_COUNT: usize = 16;

const FILE_MAGIC: &[u8; 4] = b"MFSA";
const FILE_VERSION: u32 = 1;

/// Exclusive lock over an asset's storage, shared by every handle of the asset.
#[derive(Clone, Debug, Default)]
pub struct StorageLock(Arc<Mutex<()>>);

impl StorageLock {
    /// Held for the guard's lifetime.
    pub fn lock(&self) -> MutexGuard<'_, ()> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_locked(&self) -> bool {
        self.0.try_lock().is_err()
    }
}

pub trait AssetContainer: Send {
    fn id(&self) -> Uuid;

    /// Backing file, if the asset lives on disk.
    fn path(&self) -> Option<&Path>;

    fn header(&self) -> &[u8];
    fn set_header(&mut self, header: Vec<u8>);

    fn chunk(&self, index: usize) -> Option<&[u8]>;
    fn set_chunk(&mut self, index: usize, data: Vec<u8>);
    fn release_chunk(&mut self, index: usize);

    fn has_chunk(&self, index: usize) -> bool {
        self.chunk(index).is_some()
    }

    /// Assets this one was built from.
    fn dependencies(&self) -> &[Uuid];
    fn set_dependencies(&mut self, dependencies: Vec<Uuid>);

    fn save(&mut self) -> Result<()>;

    fn storage_lock(&self) -> StorageLock;
}

#[derive(Clone, Debug, Default)]
struct ContainerData {
    header: Vec<u8>,
    chunks: Vec<Option<Vec<u8>>>,
    dependencies: Vec<Uuid>,
}

impl ContainerData {
    fn new() -> Self {
        Self {
            chunks: vec![None; CHUNK_COUNT],
            ..Self::default()
        }
    }

    fn chunk(&self, index: usize) -> Option<&[u8]> {
        self.chunks.get(index).and_then(|c| c.as_deref())
    }

    fn set_chunk(&mut self, index: usize, data: Vec<u8>) {
        if let Some(slot) = self.chunks.get_mut(index) {
            *slot = Some(data);
        } else {
            log::warn!("ignoring write to chunk {index} (only {CHUNK_COUNT} chunks)");
        }
    }

    fn release_chunk(&mut self, index: usize) {
        if let Some(slot) = self.chunks.get_mut(index) {
            *slot = None;
        }
    }

    fn encode(&self, id: Uuid) -> Vec<u8> {
        let mut w = ByteWriter::new();
        w.bytes(FILE_MAGIC);
        w.u32(FILE_VERSION);
        w.bytes(id.as_bytes());
        w.blob(&self.header);
        w.u32(self.dependencies.len() as u32);
        for d in &self.dependencies {
            w.bytes(d.as_bytes());
        }
        for chunk in &self.chunks {
            match chunk {
                Some(c) => {
                    w.u8(1);
                    w.blob(c);
                }
                None => w.u8(0),
            }
        }
        w.into_inner()
    }

    fn decode(bytes: &[u8]) -> Result<(Uuid, Self)> {
        let mut r = ByteReader::new(bytes);
        if r.take(4)? != FILE_MAGIC {
            bail!("not a shader asset file");
        }
        let version = r.u32()?;
        if version != FILE_VERSION {
            bail!("unsupported shader asset file version {version}");
        }
        let id = Uuid::from_slice(r.take(16)?)?;
        let header = r.blob()?.to_vec();
        let count = r.u32()? as usize;
        let mut dependencies = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            dependencies.push(Uuid::from_slice(r.take(16)?)?);
        }
        let mut chunks = Vec::with_capacity(CHUNK_COUNT);
        for _ in 0..CHUNK_COUNT {
            chunks.push(match r.u8()? {
                0 => None,
                _ => Some(r.blob()?.to_vec()),
            });
        }
        Ok((
            id,
            Self {
                header,
                chunks,
                dependencies,
            },
        ))
    }
}

/// In-memory asset. `save` only counts.
#[derive(Debug)]
pub struct MemoryContainer {
    id: Uuid,
    data: ContainerData,
    lock: StorageLock,
    saves: usize,
}

impl MemoryContainer {
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            data: ContainerData::new(),
            lock: StorageLock::default(),
            saves: 0,
        }
    }

    pub fn save_count(&self) -> usize {
        self.saves
    }
}

impl AssetContainer for MemoryContainer {
    fn id(&self) -> Uuid {
        self.id
    }

    fn path(&self) -> Option<&Path> {
        None
    }

    fn header(&self) -> &[u8] {
        &self.data.header
    }

    fn set_header(&mut self, header: Vec<u8>) {
        self.data.header = header;
    }

    fn chunk(&self, index: usize) -> Option<&[u8]> {
        self.data.chunk(index)
    }

    fn set_chunk(&mut self, index: usize, data: Vec<u8>) {
        self.data.set_chunk(index, data);
    }

    fn release_chunk(&mut self, index: usize) {
        self.data.release_chunk(index);
    }

    fn dependencies(&self) -> &[Uuid] {
        &self.data.dependencies
    }

    fn set_dependencies(&mut self, dependencies: Vec<Uuid>) {
        self.data.dependencies = dependencies;
    }

    fn save(&mut self) -> Result<()> {
        self.saves += 1;
        Ok(())
    }

    fn storage_lock(&self) -> StorageLock {
        self.lock.clone()
    }
}

/// Single-file asset: magic, version, id, header, dependencies, chunk table.
#[derive(Debug)]
pub struct FileContainer {
    id: Uuid,
    path: PathBuf,
    data: ContainerData,
    lock: StorageLock,
}

impl FileContainer {
    /// New, unsaved asset at `path`.
    pub fn create(id: Uuid, path: impl Into<PathBuf>) -> Self {
        Self {
            id,
            path: path.into(),
            data: ContainerData::new(),
            lock: StorageLock::default(),
        }
    }

    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let bytes = std::fs::read(&path).with_context(|| format!("failed to read asset {}", path.display()))?;
        let (id, data) =
            ContainerData::decode(&bytes).with_context(|| format!("invalid asset file {}", path.display()))?;
        Ok(Self {
            id,
            path,
            data,
            lock: StorageLock::default(),
        })
    }
}

impl AssetContainer for FileContainer {
    fn id(&self) -> Uuid {
        self.id
    }

    fn path(&self) -> Option<&Path> {
        Some(&self.path)
    }

    fn header(&self) -> &[u8] {
        &self.data.header
    }

    fn set_header(&mut self, header: Vec<u8>) {
        self.data.header = header;
    }

    fn chunk(&self, index: usize) -> Option<&[u8]> {
        self.data.chunk(index)
    }

    fn set_chunk(&mut self, index: usize, data: Vec<u8>) {
        self.data.set_chunk(index, data);
    }

    fn release_chunk(&mut self, index: usize) {
        self.data.release_chunk(index);
    }

    fn dependencies(&self) -> &[Uuid] {
        &self.data.dependencies
    }

    fn set_dependencies(&mut self, dependencies: Vec<Uuid>) {
        self.data.dependencies = dependencies;
    }

    fn save(&mut self) -> Result<()> {
        write_atomically(&self.path, &self.data.encode(self.id))
    }

    fn storage_lock(&self) -> StorageLock {
        self.lock.clone()
    }
}

/// Write `bytes` to a sibling temp file and rename it over `path`.
pub(crate) fn write_atomically(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(format!(".{}.tmp", Uuid::new_v4().simple()));
    let tmp = PathBuf::from(tmp);
    std::fs::write(&tmp, bytes).with_context(|| format!("failed to write {}", tmp.display()))?;
    std::fs::rename(&tmp, path).with_context(|| {
        let _ = std::fs::remove_file(&tmp);
        format!("failed to replace {}", path.display())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_range_chunks_are_ignored() {
        let mut c = MemoryContainer::new(Uuid::new_v4());
        c.set_chunk(15, vec![1]);
        c.set_chunk(16, vec![2]);
        assert!(c.has_chunk(15));
        assert!(c.chunk(16).is_none());
        c.release_chunk(15);
        assert!(!c.has_chunk(15));
    }

    #[test]
    fn storage_lock_is_shared_between_handles() {
        let c = MemoryContainer::new(Uuid::new_v4());
        let a = c.storage_lock();
        let b = c.storage_lock();
        let guard = a.lock();
        assert!(b.is_locked());
        drop(guard);
        assert!(!b.is_locked());
    }

    #[test]
    fn file_container_persists_everything() {
        let dir = std::env::temp_dir().join(format!("material-forge-container-{}", Uuid::new_v4()));
        let path = dir.join("m.asset");
        let id = Uuid::new_v4();
        let dep = Uuid::new_v4();
        let mut c = FileContainer::create(id, &path);
        c.set_header(vec![20, 0, 0, 0]);
        c.set_chunk(0, vec![]);
        c.set_chunk(15, b"source".to_vec());
        c.set_dependencies(vec![dep]);
        c.save().unwrap();

        let back = FileContainer::open(&path).unwrap();
        assert_eq!(back.id(), id);
        assert_eq!(back.header(), &[20, 0, 0, 0]);
        assert_eq!(back.chunk(0), Some(&[][..]));
        assert_eq!(back.chunk(15), Some(&b"source"[..]));
        assert!(back.chunk(1).is_none());
        assert_eq!(back.dependencies(), &[dep]);
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn garbage_files_are_rejected() {
        let dir = std::env::temp_dir().join(format!("material-forge-container-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("bad.asset");
        std::fs::write(&path, b"nope").unwrap();
        assert!(FileContainer::open(&path).is_err());
        let _ = std::fs::remove_dir_all(dir);
    }
}
