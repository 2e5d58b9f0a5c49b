//! Error types shared by the generator and the shader asset pipeline.

use std::fmt;

use thiserror::Error;

use crate::graph::GraphError;

/// Structural failures of a shader asset load. Anything here aborts the load.
#[derive(Debug, Error)]
pub enum ShaderAssetError {
    #[error("shader asset version {found} is not supported (expected {expected})")]
    VersionMismatch { found: u32, expected: u32 },
    #[error("invalid shader asset header: {0}")]
    InvalidHeader(String),
    #[error("missing data chunk {0}")]
    MissingDataChunk(usize),
    #[error("failed to load material graph: {0}")]
    GraphLoad(#[from] GraphError),
    #[error("shader compilation failed: {0:#}")]
    CompileBackend(anyhow::Error),
    #[error("shader cache i/o: {0}")]
    CacheIo(String),
    #[error("invalid data: {0}")]
    InvalidData(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Decoding failures of a compiled shader cache blob.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    #[error("cache blob truncated at byte {0}")]
    Truncated(usize),
    #[error("additional data offset {offset} outside blob of {size} bytes")]
    BadOffset { offset: u32, size: usize },
    #[error("cache format version {found} (expected {expected})")]
    FormatVersion { found: u32, expected: u32 },
    #[error("include path is not valid UTF-16")]
    InvalidUtf16,
}

impl From<CacheError> for ShaderAssetError {
    fn from(e: CacheError) -> Self {
        ShaderAssetError::CacheIo(e.to_string())
    }
}

/// A problem found while evaluating one box. Evaluation continues with a zero value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GeneratorError {
    pub node_id: u32,
    pub box_id: u32,
    pub message: String,
}

impl fmt::Display for GeneratorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node {} box {}: {}", self.node_id, self.box_id, self.message)
    }
}

impl std::error::Error for GeneratorError {}
