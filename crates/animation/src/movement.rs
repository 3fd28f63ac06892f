use glam::{Mat4, Vec3};

/// Per-object timing state for an active [`Movement`].
///
/// Captures the model matrix at the moment the movement starts so the
/// movement function can be a pure function of elapsed time.
#[derive(Debug, Clone)]
pub struct MovementData {
    pub start_time: u64,
    pub duration: u64,
    pub start_matrix: Mat4,
}

impl Default for MovementData {
    fn default() -> Self {
        Self {
            start_time: 0,
            duration: 0,
            start_matrix: Mat4::IDENTITY,
        }
    }
}

impl MovementData {
    pub fn set(&mut self, time: u64, duration: u64, matrix: Mat4) {
        self.start_time = time;
        self.duration = duration;
        self.start_matrix = matrix;
    }

    /// Elapsed seconds since the movement started, clamped at zero.
    pub fn elapsed_secs(&self, time: u64) -> f32 {
        (time.saturating_sub(self.start_time) as f64 / 1000.0) as f32
    }
}

/// A transform animation: computes a model matrix for a point in time.
///
/// Implementations are shared between objects (`Arc<dyn Movement>`); all
/// per-object state lives in [`MovementData`].
pub trait Movement: Send + Sync {
    fn advance(&self, data: &MovementData, time: u64) -> Mat4;
}

/// Constant-velocity translation, in units per second, applied in world space
/// on top of the captured start matrix.
#[derive(Debug, Clone, Copy)]
pub struct LinearMovement {
    pub velocity: Vec3,
}

impl Movement for LinearMovement {
    fn advance(&self, data: &MovementData, time: u64) -> Mat4 {
        let offset = self.velocity * data.elapsed_secs(time);
        Mat4::from_translation(offset) * data.start_matrix
    }
}

/// Constant-rate rotation about an object-local axis, in radians per second.
/// Post-multiplied, so the object's translation is untouched.
#[derive(Debug, Clone, Copy)]
pub struct SpinMovement {
    pub axis: Vec3,
    pub rate: f32,
}

impl Movement for SpinMovement {
    fn advance(&self, data: &MovementData, time: u64) -> Mat4 {
        let angle = self.rate * data.elapsed_secs(time);
        data.start_matrix * Mat4::from_axis_angle(self.axis.normalize(), angle)
    }
}
