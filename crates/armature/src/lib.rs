//! Armature: hierarchical bone rotation state and posed matrix composition.
//!
//! A [`Skeleton`] flattens an authored bone forest into a single array ordered
//! parent-before-child, so forward kinematics is one linear pass.
//!
//! # Invariants
//! - `bone_count()` equals the number of nodes in the authored forest.
//! - Every bone's stored index equals its position in the flat array.
//! - A bone's matrix is written only after its parent's matrix exists.

pub mod skeleton;

pub use skeleton::{Bone, BoneDef, Skeleton};

/// Errors from armature contract violations.
#[derive(Debug, thiserror::Error)]
pub enum ArmatureError {
    #[error("bone index {index} out of range (skeleton has {count} bones)")]
    BoneIndexOutOfRange { index: usize, count: usize },
}
