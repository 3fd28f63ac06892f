//! Time-based animation: keyframe mesh interpolation and transform movements.
//!
//! All timing is in engine milliseconds (`u64` since the engine epoch);
//! blend math runs in `f64` so a late-starting animation can be represented
//! as a negative frame point without signed-time plumbing.
//!
//! # Invariants
//! - A [`MeshAnimation`]'s time ratios parallel its keyframes one-to-one and
//!   are normalized so the last ratio is <= 1.0.
//! - Every keyframe of an animation holds the same number of floats.

pub mod keyframe;
pub mod movement;

pub use keyframe::{FrameResult, Keyframe, MeshAnimation, MeshAnimationData};
pub use movement::{LinearMovement, Movement, MovementData, SpinMovement};

/// Errors from animation contract violations, rejected at construction.
#[derive(Debug, thiserror::Error)]
pub enum AnimationError {
    #[error("animation `{0}` has no keyframes")]
    EmptyAnimation(String),
    #[error("animation `{id}` has {keyframes} keyframes but {ratios} time ratios")]
    LengthMismatch {
        id: String,
        keyframes: usize,
        ratios: usize,
    },
    #[error(
        "animation `{id}` keyframe {index} holds {len} floats, expected {expected}"
    )]
    KeyframeSizeMismatch {
        id: String,
        index: usize,
        len: usize,
        expected: usize,
    },
}

/// Linearly interpolate `from` toward `to` into `out`, component-wise.
///
/// `factor` outside `[0, 1]` extrapolates; callers keep it in range.
pub fn lerp_mesh(out: &mut [f32], from: &[f32], to: &[f32], factor: f32) {
    debug_assert_eq!(from.len(), to.len());
    debug_assert_eq!(out.len(), from.len());
    for ((o, &a), &b) in out.iter_mut().zip(from).zip(to) {
        *o = a + (b - a) * factor;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lerp_mesh_endpoints_exact() {
        let from = [0.0, 1.0, 2.0];
        let to = [4.0, 5.0, 6.0];
        let mut out = [0.0; 3];

        lerp_mesh(&mut out, &from, &to, 0.0);
        assert_eq!(out, from);

        lerp_mesh(&mut out, &from, &to, 1.0);
        assert_eq!(out, to);

        lerp_mesh(&mut out, &from, &to, 0.5);
        assert_eq!(out, [2.0, 3.0, 4.0]);
    }
}
