//! wgpu implementation of the render backend.
//!
//! [`WgpuBackend`] mirrors the engine's staging arrays into two large GPU
//! buffers and draws each record with per-draw uniforms selected by dynamic
//! offset. The windowing side hands it a target texture view each frame;
//! everything else arrives through the backend trait.

pub mod camera;
pub mod gpu;
pub mod shaders;

pub use camera::FlyCamera;
pub use gpu::WgpuBackend;
