use glam::Mat4;
use ketch_common::Light;
use ketch_scene::{ProgramHandle, Topology};

use crate::RenderError;

/// A linked program as the backend knows it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramId(pub u32);

/// One submitted draw: a span of the backend's vertex and index buffers plus
/// the per-object transform.
///
/// `vbo_offset` is in floats and `ibo_offset` in indices, matching the
/// staging buffers the spans were uploaded from.
#[derive(Debug, Clone, Copy)]
pub struct DrawCall {
    pub program: ProgramId,
    pub topology: Topology,
    pub index_count: usize,
    pub vbo_offset: usize,
    pub ibo_offset: usize,
    pub model: Mat4,
}

/// The seam between frame consumption and a concrete GPU API.
///
/// Calls arrive in a fixed order per frame: uploads, `begin_frame`, zero or
/// more `draw`s, `end_frame`.
pub trait RenderBackend {
    /// Compile and link the program behind `handle`. Called once per handle
    /// per cache generation.
    fn link_program(&mut self, handle: ProgramHandle) -> Result<ProgramId, RenderError>;

    /// Replace `data.len()` floats of vertex storage starting at `first`.
    fn upload_vertices(&mut self, first: usize, data: &[f32]);

    /// Replace `data.len()` indices of index storage starting at `first`.
    fn upload_indices(&mut self, first: usize, data: &[u16]);

    fn begin_frame(&mut self, view_proj: Mat4, light: Light);

    fn draw(&mut self, call: &DrawCall);

    fn end_frame(&mut self);
}

/// In-memory backend for tests and headless runs.
///
/// Mirrors uploads into plain vectors and logs every draw, so assertions can
/// inspect exactly what a GPU would have received.
#[derive(Debug, Default)]
pub struct RecordingBackend {
    pub vertices: Vec<f32>,
    pub indices: Vec<u16>,
    pub draws: Vec<DrawCall>,
    pub frames_begun: u64,
    pub frames_ended: u64,
    pub links: u64,
    pub last_view_proj: Mat4,
    pub last_light: Light,
    /// Handles that refuse to link, for exercising failure paths.
    pub failing: Vec<ProgramHandle>,
    next_program: u32,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_handle(&mut self, handle: ProgramHandle) {
        self.failing.push(handle);
    }

    /// Draws submitted in the most recent frame.
    pub fn draw_count(&self) -> usize {
        self.draws.len()
    }
}

impl RenderBackend for RecordingBackend {
    fn link_program(&mut self, handle: ProgramHandle) -> Result<ProgramId, RenderError> {
        if self.failing.contains(&handle) {
            return Err(RenderError::ProgramLink {
                handle,
                reason: "marked as failing".into(),
            });
        }
        self.links += 1;
        let id = ProgramId(self.next_program);
        self.next_program += 1;
        Ok(id)
    }

    fn upload_vertices(&mut self, first: usize, data: &[f32]) {
        let end = first + data.len();
        if self.vertices.len() < end {
            self.vertices.resize(end, 0.0);
        }
        self.vertices[first..end].copy_from_slice(data);
    }

    fn upload_indices(&mut self, first: usize, data: &[u16]) {
        let end = first + data.len();
        if self.indices.len() < end {
            self.indices.resize(end, 0);
        }
        self.indices[first..end].copy_from_slice(data);
    }

    fn begin_frame(&mut self, view_proj: Mat4, light: Light) {
        self.frames_begun += 1;
        self.last_view_proj = view_proj;
        self.last_light = light;
        self.draws.clear();
    }

    fn draw(&mut self, call: &DrawCall) {
        self.draws.push(*call);
    }

    fn end_frame(&mut self) {
        self.frames_ended += 1;
    }
}
