//! Per-particle attribute layout and attribute access.
//!
//! Particle data is a flat record; every attribute gets a byte offset in
//! first-access order. Generated code never hardcodes offsets: each attribute
//! is read through a hidden uint parameter whose default is the offset, so the
//! runtime may repack the record without regenerating source.

use serde::Serialize;

use crate::generator::compilation::{Compilation, CompilationMode};
use crate::generator::types::{Value, ValueType};
use crate::graph::Node;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ParticleAttribute {
    pub name: String,
    pub kind: ValueType,
    pub offset: u32,
}

/// Attribute frame of a simulation space.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttributeSpace {
    /// Raw simulation-space value.
    Simulation,
    /// A position that must be moved into world space.
    LocalPosition,
    /// A direction that must be rotated into world space.
    LocalVector,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct ParticleLayout {
    attributes: Vec<ParticleAttribute>,
    size: u32,
}

impl ParticleLayout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attributes(&self) -> &[ParticleAttribute] {
        &self.attributes
    }

    /// Size of one particle record in bytes.
    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn find(&self, name: &str) -> Option<&ParticleAttribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// Byte offset of `name`, appending it if new. Fails when the attribute
    /// already exists with another kind.
    pub fn find_or_add(&mut self, name: &str, kind: ValueType) -> Result<u32, String> {
        if let Some(a) = self.find(name) {
            return if a.kind == kind {
                Ok(a.offset)
            } else {
                Err(format!(
                    "particle attribute '{name}' is {:?}, accessed as {:?}",
                    a.kind, kind
                ))
            };
        }
        if accessor_suffix(kind).is_none() {
            return Err(format!("particle attribute '{name}' cannot be {kind:?}"));
        }
        let offset = self.size;
        self.size += 4 * kind.components();
        self.attributes.push(ParticleAttribute {
            name: name.to_string(),
            kind,
            offset,
        });
        Ok(offset)
    }
}

/// `GetParticle*`/`SetParticle*` suffix for a stored kind.
pub fn accessor_suffix(kind: ValueType) -> Option<&'static str> {
    Some(match kind {
        ValueType::Float => "Float",
        ValueType::Float2 => "Vec2",
        ValueType::Float3 => "Vec3",
        ValueType::Float4 => "Vec4",
        ValueType::Int => "Int",
        ValueType::Uint => "Uint",
        _ => return None,
    })
}

/// Map the `value kind` code stored on custom attribute nodes.
pub fn attribute_kind_from_code(code: i32) -> Option<ValueType> {
    Some(match code {
        0 => ValueType::Float,
        1 => ValueType::Float2,
        2 => ValueType::Float3,
        3 => ValueType::Float4,
        4 => ValueType::Int,
        5 => ValueType::Uint,
        _ => return None,
    })
}

impl Compilation {
    /// Expression of the particle being processed.
    pub fn particle_index(&self) -> Value {
        match self.mode {
            CompilationMode::Emitter => Value::new(ValueType::Uint, "context.ParticleIndex"),
            CompilationMode::Material => Value::new(ValueType::Uint, "input.ParticleIndex"),
        }
    }

    /// Hidden parameter holding the byte offset of `name`, or `None` after
    /// reporting a kind conflict.
    pub fn particle_attribute_param(
        &mut self,
        caller: &Node,
        box_id: u32,
        name: &str,
        kind: ValueType,
    ) -> Option<String> {
        let offset = match self.particle_layout.find_or_add(name, kind) {
            Ok(o) => o,
            Err(msg) => {
                self.error(caller, box_id, msg);
                return None;
            }
        };
        let index = self.params.find_or_add_internal(
            &format!("Particle.{name}"),
            ValueType::Uint,
            offset.to_le_bytes().to_vec(),
        );
        self.params.get(index).map(|p| p.shader_name.clone())
    }

    /// Read a particle attribute into a new local.
    pub fn access_particle_attribute(
        &mut self,
        caller: &Node,
        box_id: u32,
        name: &str,
        kind: ValueType,
        index: Option<Value>,
        space: AttributeSpace,
    ) -> Value {
        let Some(param) = self.particle_attribute_param(caller, box_id, name, kind) else {
            return Value::zero(kind);
        };
        let Some(suffix) = accessor_suffix(kind) else {
            return Value::zero(kind);
        };
        let index = index
            .map(|i| i.cast(ValueType::Uint))
            .unwrap_or_else(|| self.particle_index());
        let mut expr = format!("GetParticle{suffix}({param}, {})", index.expr);
        match (space, kind) {
            (AttributeSpace::LocalPosition, ValueType::Float3) => {
                expr = format!("TransformParticlePosition({expr})");
            }
            (AttributeSpace::LocalVector, ValueType::Float3) => {
                expr = format!("TransformParticleVector({expr})");
            }
            _ => {}
        }
        self.writer.write_local(kind, Some(&expr), Some(caller.id))
    }

    /// Store `value` into a particle attribute of the current particle.
    pub fn write_particle_attribute(&mut self, caller: &Node, box_id: u32, name: &str, value: &Value) {
        let kind = value.ty;
        let Some(param) = self.particle_attribute_param(caller, box_id, name, kind) else {
            return;
        };
        let Some(suffix) = accessor_suffix(kind) else {
            self.error(caller, box_id, format!("cannot store {kind:?} in a particle"));
            return;
        };
        let index = self.particle_index();
        self.writer.write_line(&format!(
            "SetParticle{suffix}({param}, {}, {});",
            index.expr, value.expr
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_follow_first_access() {
        let mut layout = ParticleLayout::new();
        assert_eq!(layout.find_or_add("Position", ValueType::Float3), Ok(0));
        assert_eq!(layout.find_or_add("Age", ValueType::Float), Ok(12));
        assert_eq!(layout.find_or_add("Position", ValueType::Float3), Ok(0));
        assert_eq!(layout.size(), 16);
        assert!(layout.find_or_add("Age", ValueType::Float3).is_err());
        assert!(layout.find_or_add("Bad", ValueType::Matrix).is_err());
    }
}
