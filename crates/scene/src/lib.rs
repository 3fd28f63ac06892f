//! Scene object model: geometry, materials, animation bindings, deletion
//! state.
//!
//! A [`SceneObject`] owns immutable authored geometry plus the mutable working
//! state the simulation thread advances every tick (model matrix, posed vertex
//! buffer, active movement/animation bindings). Objects are advanced through
//! the [`Advance`] capability trait rather than inheritance hooks.
//!
//! # Invariants
//! - Authored geometry (`MeshData`) is never mutated after construction; all
//!   per-tick vertex updates go to the object's working buffer.
//! - Soft deletion only flips a flag; containers decide when to compact.

pub mod material;
pub mod mesh;
pub mod object;

pub use material::{AttributeKind, Material, ProgramHandle, Topology, VertexLayout};
pub use mesh::MeshData;
pub use object::{Advance, ArmatureBinding, Metadata, ObjectId, SceneObject, VertexInfluence};

/// Errors from scene contract violations, rejected at the introducing call.
#[derive(Debug, thiserror::Error)]
pub enum SceneError {
    #[error("vertex array length {0} is not a multiple of 3")]
    BadVertexArray(usize),
    #[error("normal array holds {normals} floats but vertex array holds {verts}")]
    NormalSizeMismatch { normals: usize, verts: usize },
    #[error("index {value} at position {position} exceeds vertex count {count}")]
    IndexOutOfRange {
        value: u16,
        position: usize,
        count: usize,
    },
    #[error("attribute array holds {len} floats, expected {expected}")]
    AttributeSizeMismatch { len: usize, expected: usize },
    #[error("staging span needs {needed} floats but only {available} remain")]
    StagingOverflow { needed: usize, available: usize },
    #[error("animation `{id}` holds {frame_len} floats per keyframe but the object has {verts}")]
    AnimationSizeMismatch {
        id: String,
        frame_len: usize,
        verts: usize,
    },
    #[error("armature binding has {influences} influence lists for {verts} vertices")]
    InfluenceCountMismatch { influences: usize, verts: usize },
    #[error("vertex {vertex} references bone {bone}, but the skeleton has {count} bones")]
    InvalidInfluence {
        vertex: usize,
        bone: usize,
        count: usize,
    },
}
