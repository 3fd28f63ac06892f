use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Errors from validating an [`EngineConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("capacity field `{0}` must be non-zero")]
    ZeroCapacity(&'static str),
    #[error("frame interval must be non-zero")]
    ZeroFrameInterval,
}

/// Fixed buffer capacities and timing for an engine instance.
///
/// Supplied at construction and never renegotiated at runtime: the staging
/// arrays and the GPU-side stores are both sized from these values so element
/// offsets computed on the simulation thread stay valid on the render thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Vertex staging capacity, in floats.
    pub vbo_capacity: usize,
    /// Index staging capacity, in indices.
    pub ibo_capacity: usize,
    /// Maximum number of live objects (caps inserts and sizes per-draw
    /// uniform storage).
    pub max_objects: usize,
    /// Nominal interval between simulated frames.
    pub frame_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            vbo_capacity: 1 << 16,
            ibo_capacity: 1 << 15,
            max_objects: 256,
            frame_interval: Duration::from_millis(1000 / 30),
        }
    }
}

impl EngineConfig {
    /// Reject zero-sized capacities up front rather than failing mid-tick.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.vbo_capacity == 0 {
            return Err(ConfigError::ZeroCapacity("vbo_capacity"));
        }
        if self.ibo_capacity == 0 {
            return Err(ConfigError::ZeroCapacity("ibo_capacity"));
        }
        if self.max_objects == 0 {
            return Err(ConfigError::ZeroCapacity("max_objects"));
        }
        if self.frame_interval.is_zero() {
            return Err(ConfigError::ZeroFrameInterval);
        }
        Ok(())
    }
}
