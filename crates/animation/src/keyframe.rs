use crate::{lerp_mesh, AnimationError};

/// A complete vertex-position snapshot at one point in an animation cycle.
#[derive(Debug, Clone)]
pub struct Keyframe {
    verts: Vec<f32>,
}

impl Keyframe {
    pub fn new(verts: Vec<f32>) -> Self {
        Self { verts }
    }

    pub fn verts(&self) -> &[f32] {
        &self.verts
    }

    /// Number of floats in the snapshot (three per vertex).
    pub fn len(&self) -> usize {
        self.verts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.verts.is_empty()
    }

    pub fn load_to(&self, out: &mut [f32]) {
        out.copy_from_slice(&self.verts);
    }
}

/// Per-object playback state for a [`MeshAnimation`].
///
/// `trigger_time` is when the animation was requested, `start_time` when the
/// cycle begins; between the two, playback blends from `initial_state` (the
/// object's vertex buffer captured at trigger time) into the first keyframe.
#[derive(Debug, Clone)]
pub struct MeshAnimationData {
    pub trigger_time: u64,
    pub start_time: u64,
    pub duration: u64,
    /// Number of cycles after which playback stops; `<= 0` loops forever.
    pub loop_threshold: f32,
    pub initial_state: Vec<f32>,
}

impl MeshAnimationData {
    pub fn new(
        trigger_time: u64,
        start_time: u64,
        duration: u64,
        loop_threshold: f32,
        initial_state: Vec<f32>,
    ) -> Self {
        Self {
            trigger_time,
            start_time,
            duration,
            loop_threshold,
            initial_state,
        }
    }
}

/// Outcome of advancing an animation one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameResult {
    Running,
    /// The final keyframe was written; the caller clears the binding and the
    /// object holds this pose from now on.
    Finished,
}

/// A named mesh animation: keyframes plus parallel normalized time ratios.
///
/// Ratios live in `[0, 1)` with an implied wraparound at 1.0; if the caller
/// supplies ratios whose last value exceeds 1.0 the whole array is rescaled by
/// that last value at construction.
#[derive(Debug, Clone)]
pub struct MeshAnimation {
    id: String,
    keyframes: Vec<Keyframe>,
    times: Vec<f32>,
}

impl MeshAnimation {
    pub fn new(
        id: impl Into<String>,
        keyframes: Vec<Keyframe>,
        ratios: Vec<f32>,
    ) -> Result<Self, AnimationError> {
        let id = id.into();
        if keyframes.is_empty() {
            return Err(AnimationError::EmptyAnimation(id));
        }
        if keyframes.len() != ratios.len() {
            return Err(AnimationError::LengthMismatch {
                id,
                keyframes: keyframes.len(),
                ratios: ratios.len(),
            });
        }
        let expected = keyframes[0].len();
        for (index, frame) in keyframes.iter().enumerate() {
            if frame.len() != expected {
                return Err(AnimationError::KeyframeSizeMismatch {
                    id,
                    index,
                    len: frame.len(),
                    expected,
                });
            }
        }

        let mut times = ratios;
        let last = times[times.len() - 1];
        if last > 1.0 {
            for t in &mut times {
                *t /= last;
            }
        }

        Ok(Self {
            id,
            keyframes,
            times,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn keyframe_count(&self) -> usize {
        self.keyframes.len()
    }

    /// Number of floats per keyframe; the bound object's vertex buffer must
    /// match.
    pub fn frame_len(&self) -> usize {
        self.keyframes[0].len()
    }

    pub fn times(&self) -> &[f32] {
        &self.times
    }

    /// Write the pose for `current_time` into `verts`.
    ///
    /// Before `start_time`, blends from the captured initial state toward
    /// keyframe 0. Once the frame point reaches a positive loop threshold,
    /// snaps to the final keyframe and reports [`FrameResult::Finished`].
    /// Otherwise loops within the cycle, interpolating between the bracketing
    /// keyframes; the final interval wraps around to keyframe 0.
    pub fn get_frame(
        &self,
        current_time: u64,
        data: &MeshAnimationData,
        verts: &mut [f32],
    ) -> FrameResult {
        let last = self.keyframes.len() - 1;
        let frame_point =
            (current_time as f64 - data.start_time as f64) / data.duration as f64;

        if frame_point < 0.0 {
            // Triggered but not started: ease out of the captured pose.
            let span = (data.start_time - data.trigger_time) as f64;
            let blend = (current_time as f64 - data.trigger_time as f64) / span;
            lerp_mesh(
                verts,
                &data.initial_state,
                self.keyframes[0].verts(),
                blend as f32,
            );
            return FrameResult::Running;
        }

        if data.loop_threshold > 0.0 && frame_point >= data.loop_threshold as f64 {
            self.keyframes[last].load_to(verts);
            return FrameResult::Finished;
        }

        if self.keyframes.len() == 1 {
            // Degenerate single-pose animation: nothing to blend.
            self.keyframes[0].load_to(verts);
            return FrameResult::Running;
        }

        let point = frame_point % 1.0;

        // Last keyframe whose ratio is <= the reduced point.
        let mut last_key = last;
        while last_key > 0 && point < self.times[last_key] as f64 {
            last_key -= 1;
        }

        let (next_key, local) = if last_key < last {
            let gap = (self.times[last_key + 1] - self.times[last_key]) as f64;
            (last_key + 1, (point - self.times[last_key] as f64) / gap)
        } else {
            // Wraparound interval: final keyframe back to the first.
            let gap = (1.0 + self.times[0] - self.times[last]) as f64;
            (0, (point - self.times[last] as f64) / gap)
        };

        lerp_mesh(
            verts,
            self.keyframes[last_key].verts(),
            self.keyframes[next_key].verts(),
            local as f32,
        );
        FrameResult::Running
    }
}
