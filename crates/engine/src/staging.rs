use ketch_common::{DirtyRange, EngineConfig};

/// One set of CPU-side staging buffers the pack step fills and a backend
/// uploads from.
///
/// Two sets alternate between the simulation and render threads behind
/// `Arc<Mutex<_>>`; the frame hand-off guarantees only one side holds a set's
/// lock at any moment.
///
/// Dirty ranges are conservative: each covers the single contiguous span of
/// everything written since the consumer last cleared it, so an upload is one
/// copy even when the writes were scattered.
#[derive(Debug)]
pub struct StagingBuffers {
    /// Interleaved vertex data, laid out per each object's material.
    pub vbo: Vec<f32>,
    /// Raw mesh indices; draw calls rebase them via their vertex offset.
    pub ibo: Vec<u16>,
    pub vbo_range: DirtyRange,
    pub ibo_range: DirtyRange,
}

impl StagingBuffers {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            vbo: vec![0.0; config.vbo_capacity],
            ibo: vec![0; config.ibo_capacity],
            vbo_range: DirtyRange::EMPTY,
            ibo_range: DirtyRange::EMPTY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sized_from_config() {
        let config = EngineConfig {
            vbo_capacity: 64,
            ibo_capacity: 32,
            ..EngineConfig::default()
        };
        let buffers = StagingBuffers::new(&config);
        assert_eq!(buffers.vbo.len(), 64);
        assert_eq!(buffers.ibo.len(), 32);
        assert!(buffers.vbo_range.is_empty());
        assert!(buffers.ibo_range.is_empty());
    }
}
