//! Particle support: attribute layout and access shared with particle
//! materials, emitter modules and the emitter source generator.

pub mod attributes;
pub mod emitter;
pub mod modules;

pub use attributes::{AttributeSpace, ParticleAttribute, ParticleLayout};
pub use emitter::{GeneratedEmitter, ParticleEmitterGenerator};
pub use modules::ModuleStage;
