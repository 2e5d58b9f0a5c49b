//! Material graph to HLSL generator.
//!
//! This module is organized into several submodules:
//! - `types`: value kinds and typed shader expressions
//! - `utils`: literal formatting and template substitution
//! - `writer`: the append-only code sink and local naming
//! - `parameters`: the ordered GPU parameter table and its blob
//! - `compilation`: evaluator state and the memoised box walk
//! - `node_compiler`: per-node-type handlers
//! - `layers`: layer sampling and blending
//! - `material`: root channels and the per-tree driver
//!
//! The main entry point is [`MaterialGenerator`].

pub mod compilation;
pub mod layers;
pub mod material;
pub mod node_compiler;
pub mod parameters;
pub mod types;
pub mod utils;
pub mod writer;

pub use compilation::{Compilation, CompilationMode, ShaderTree};
pub use material::{GeneratedMaterial, MaterialChannel, MaterialGenerator};
pub use parameters::{ParameterKind, ParameterTable};
pub use types::{Value, ValueType};
