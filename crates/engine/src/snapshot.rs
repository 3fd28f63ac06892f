use std::sync::{Arc, Mutex};

use glam::Mat4;
use ketch_common::Light;
use ketch_scene::{ProgramHandle, Topology};

use crate::staging::StagingBuffers;

/// One draw call's worth of a frame snapshot.
///
/// Offsets address the staging buffers the parent [`RenderData`] carries;
/// `vbo_offset` is in floats, `ibo_offset` in indices.
#[derive(Debug, Clone, Copy)]
pub struct DrawRecord {
    pub program: ProgramHandle,
    pub topology: Topology,
    pub index_count: usize,
    pub vbo_offset: usize,
    pub ibo_offset: usize,
    pub model: Mat4,
}

/// Everything a backend needs to draw one frame.
///
/// Published through the frame pipe once per tick. The staging set it points
/// at is not written again by the simulation until the frame after next, so
/// the consumer may hold the lock for the duration of its uploads.
pub struct RenderData {
    pub buffers: Arc<Mutex<StagingBuffers>>,
    pub view: Mat4,
    pub light: Light,
    pub records: Vec<DrawRecord>,
    /// Engine time the poses in this frame were computed for, in milliseconds.
    pub time_ms: u64,
}
