//! Compiled shader cache blobs and their include-time validation.
//!
//! Layout (little-endian):
//!
//! ```text
//! u32 format version
//! u32 offset of the include list
//! ... backend bytecode ...
//! u32 include count
//! per include: u32 UTF-16 unit count, units, u64 last edit time
//! ```
//!
//! Edit times are 100 ns ticks since the UNIX epoch.

use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use super::bytes::{ByteReader, ByteWriter};
use crate::error::CacheError;

pub const SHADER_CACHE_FORMAT_VERSION: u32 = 9;

/// Size of the fixed prefix before the bytecode.
const PREFIX_SIZE: usize = 8;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IncludeRecord {
    pub path: String,
    pub last_edit_time: u64,
}

impl IncludeRecord {
    /// Record `path` with its current modification time (0 when it cannot be read).
    pub fn capture(path: impl Into<String>) -> Self {
        let path = path.into();
        let last_edit_time = file_time_ticks(Path::new(&path)).unwrap_or(0);
        Self { path, last_edit_time }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShaderCacheBlob {
    pub bytecode: Vec<u8>,
    pub includes: Vec<IncludeRecord>,
}

impl ShaderCacheBlob {
    pub fn encode(&self) -> Vec<u8> {
        let mut w = ByteWriter::new();
        w.u32(SHADER_CACHE_FORMAT_VERSION);
        w.u32(0);
        w.bytes(&self.bytecode);
        let offset = w.len() as u32;
        w.patch_u32(4, offset);
        w.u32(self.includes.len() as u32);
        for inc in &self.includes {
            w.utf16(&inc.path);
            w.u64(inc.last_edit_time);
        }
        w.into_inner()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, CacheError> {
        let offset = check_prefix(bytes)?;
        let includes = read_includes_at(bytes, offset)?;
        Ok(Self {
            bytecode: bytes[PREFIX_SIZE..offset].to_vec(),
            includes,
        })
    }
}

/// Validate the prefix and return the include-list offset.
fn check_prefix(bytes: &[u8]) -> Result<usize, CacheError> {
    let mut r = ByteReader::new(bytes);
    let version = r.u32()?;
    if version != SHADER_CACHE_FORMAT_VERSION {
        return Err(CacheError::FormatVersion {
            found: version,
            expected: SHADER_CACHE_FORMAT_VERSION,
        });
    }
    let offset = r.u32()?;
    if (offset as usize) < PREFIX_SIZE || offset as usize > bytes.len() {
        return Err(CacheError::BadOffset {
            offset,
            size: bytes.len(),
        });
    }
    Ok(offset as usize)
}

fn read_includes_at(bytes: &[u8], offset: usize) -> Result<Vec<IncludeRecord>, CacheError> {
    let mut r = ByteReader::at(bytes, offset);
    let count = r.u32()? as usize;
    let mut out = Vec::with_capacity(count.min(256));
    for _ in 0..count {
        let path = r.utf16()?;
        let last_edit_time = r.u64()?;
        out.push(IncludeRecord { path, last_edit_time });
    }
    Ok(out)
}

/// Only the include list of a blob; the bytecode is not copied.
pub fn read_includes(bytes: &[u8]) -> Result<Vec<IncludeRecord>, CacheError> {
    let offset = check_prefix(bytes)?;
    read_includes_at(bytes, offset)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CacheStatus {
    Valid,
    Invalid(String),
}

impl CacheStatus {
    pub fn is_valid(&self) -> bool {
        matches!(self, CacheStatus::Valid)
    }
}

/// A cache is valid when every recorded include still exists and was not
/// edited after it was recorded.
pub fn cache_status(bytes: &[u8]) -> CacheStatus {
    let includes = match read_includes(bytes) {
        Ok(i) => i,
        Err(e) => return CacheStatus::Invalid(e.to_string()),
    };
    for inc in &includes {
        match file_time_ticks(Path::new(&inc.path)) {
            None => return CacheStatus::Invalid(format!("include {} is missing", inc.path)),
            Some(t) if t > inc.last_edit_time => {
                return CacheStatus::Invalid(format!("include {} was modified", inc.path));
            }
            Some(_) => {}
        }
    }
    CacheStatus::Valid
}

pub fn system_time_ticks(t: SystemTime) -> u64 {
    t.duration_since(UNIX_EPOCH)
        .map(|d| (d.as_nanos() / 100) as u64)
        .unwrap_or(0)
}

/// Modification time of `path` in ticks, `None` if it does not exist.
pub fn file_time_ticks(path: &Path) -> Option<u64> {
    let meta = std::fs::metadata(path).ok()?;
    meta.modified().ok().map(system_time_ticks)
}

#[cfg(test)]
mod tests {
    use std::fs::File;
    use std::time::Duration;

    use super::*;
    use proptest::prelude::*;

    fn temp_dir() -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("material-forge-cache-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn include_list_is_found_through_offset() {
        let blob = ShaderCacheBlob {
            bytecode: vec![0xAB; 13],
            includes: vec![IncludeRecord {
                path: "a.hlsl".into(),
                last_edit_time: 42,
            }],
        };
        let bytes = blob.encode();
        assert_eq!(&bytes[4..8], &21u32.to_le_bytes());
        assert_eq!(ShaderCacheBlob::decode(&bytes).unwrap(), blob);
    }

    #[test]
    fn wrong_version_and_offset_are_rejected() {
        let mut bytes = ShaderCacheBlob {
            bytecode: vec![1, 2],
            includes: vec![],
        }
        .encode();
        bytes[4] = 200;
        assert!(matches!(read_includes(&bytes), Err(CacheError::BadOffset { .. })));
        bytes[0] = 1;
        assert!(matches!(read_includes(&bytes), Err(CacheError::FormatVersion { .. })));
        assert!(!cache_status(&bytes).is_valid());
    }

    #[test]
    fn touched_include_invalidates() {
        let dir = temp_dir();
        let path = dir.join("a.hlsl");
        std::fs::write(&path, "// a").unwrap();
        let t = SystemTime::now() - Duration::from_secs(60);
        File::options().write(true).open(&path).unwrap().set_modified(t).unwrap();

        let rec = IncludeRecord::capture(path.to_string_lossy().into_owned());
        assert!(rec.last_edit_time > 0);
        let bytes = ShaderCacheBlob {
            bytecode: vec![],
            includes: vec![rec],
        }
        .encode();
        assert_eq!(cache_status(&bytes), CacheStatus::Valid);

        File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(t + Duration::from_secs(1))
            .unwrap();
        assert!(!cache_status(&bytes).is_valid());

        std::fs::remove_file(&path).unwrap();
        assert!(matches!(cache_status(&bytes), CacheStatus::Invalid(m) if m.contains("missing")));
        let _ = std::fs::remove_dir_all(dir);
    }

    proptest! {
        #[test]
        fn include_lists_round_trip(
            bytecode in proptest::collection::vec(any::<u8>(), 0..64),
            includes in proptest::collection::vec(("[a-zA-Z0-9/._ é]{0,24}", any::<u64>()), 0..6),
        ) {
            let blob = ShaderCacheBlob {
                bytecode,
                includes: includes
                    .into_iter()
                    .map(|(path, last_edit_time)| IncludeRecord { path, last_edit_time })
                    .collect(),
            };
            let bytes = blob.encode();
            prop_assert_eq!(read_includes(&bytes).unwrap(), blob.includes.clone());
            prop_assert_eq!(ShaderCacheBlob::decode(&bytes).unwrap(), blob);
        }
    }
}
