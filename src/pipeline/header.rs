//! Shader asset header: format version, graph version and the packed material info.

use bytemuck::{Pod, Zeroable};

use super::{MATERIAL_GRAPH_VERSION, SHADER_ASSET_VERSION};
use crate::error::ShaderAssetError;
use crate::material_info::{MATERIAL_INFO_SIZE, MaterialInfo};

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct HeaderPrefix {
    format_version: u32,
    graph_version: u32,
}

const PREFIX_SIZE: usize = std::mem::size_of::<HeaderPrefix>();

/// Total encoded header size.
pub const HEADER_SIZE: usize = PREFIX_SIZE + MATERIAL_INFO_SIZE;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ShaderAssetHeader {
    pub format_version: u32,
    pub graph_version: u32,
    pub info: MaterialInfo,
}

impl ShaderAssetHeader {
    /// Header of a new asset; its graph version forces source generation on first load.
    pub fn new(info: MaterialInfo) -> Self {
        Self {
            format_version: SHADER_ASSET_VERSION,
            graph_version: 0,
            info,
        }
    }

    pub fn is_current_graph(&self) -> bool {
        self.graph_version == MATERIAL_GRAPH_VERSION
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let prefix = HeaderPrefix {
            format_version: self.format_version.to_le(),
            graph_version: self.graph_version.to_le(),
        };
        let mut out = Vec::with_capacity(HEADER_SIZE);
        out.extend_from_slice(bytemuck::bytes_of(&prefix));
        out.extend_from_slice(&self.info.to_bytes());
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ShaderAssetError> {
        if bytes.len() < HEADER_SIZE {
            return Err(ShaderAssetError::InvalidHeader(format!(
                "header needs {HEADER_SIZE} bytes, got {}",
                bytes.len()
            )));
        }
        let prefix: HeaderPrefix = bytemuck::pod_read_unaligned(&bytes[..PREFIX_SIZE]);
        let format_version = u32::from_le(prefix.format_version);
        if format_version != SHADER_ASSET_VERSION {
            return Err(ShaderAssetError::VersionMismatch {
                found: format_version,
                expected: SHADER_ASSET_VERSION,
            });
        }
        Ok(Self {
            format_version,
            graph_version: u32::from_le(prefix.graph_version),
            info: MaterialInfo::from_bytes(&bytes[PREFIX_SIZE..])?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material_info::MaterialDomain;

    #[test]
    fn header_layout() {
        let mut h = ShaderAssetHeader::new(MaterialInfo {
            domain: MaterialDomain::Decal,
            ..MaterialInfo::default()
        });
        h.graph_version = 18;
        let bytes = h.to_bytes();
        assert_eq!(bytes.len(), 36);
        assert_eq!(&bytes[..4], &20u32.to_le_bytes());
        assert_eq!(&bytes[4..8], &18u32.to_le_bytes());
        assert_eq!(bytes[8], MaterialDomain::Decal as u8);
        assert_eq!(ShaderAssetHeader::from_bytes(&bytes).unwrap(), h);
    }

    #[test]
    fn other_format_versions_are_refused() {
        let mut bytes = ShaderAssetHeader::new(MaterialInfo::default()).to_bytes();
        bytes[0] = 19;
        assert!(matches!(
            ShaderAssetHeader::from_bytes(&bytes),
            Err(ShaderAssetError::VersionMismatch { found: 19, expected: 20 })
        ));
        assert!(matches!(
            ShaderAssetHeader::from_bytes(&bytes[..10]),
            Err(ShaderAssetError::InvalidHeader(_))
        ));
    }
}
