//! Backend-agnostic frame consumption.
//!
//! A [`FrameConsumer`] collects snapshots from the engine's frame pipe,
//! uploads the dirty staging spans through a [`RenderBackend`], and submits
//! one draw call per record. The backend trait is the seam between the
//! engine's CPU-side frame data and whatever GPU API actually draws it; a
//! [`RecordingBackend`] stands in for tests and headless runs.
//!
//! # Invariants
//! - The consumer never mutates scene state; everything it needs arrives in
//!   the snapshot.
//! - A program handle is linked at most once per cache generation; a link
//!   failure aborts the frame rather than drawing with a missing program.

pub mod backend;
pub mod consumer;
pub mod program;

pub use backend::{DrawCall, ProgramId, RecordingBackend, RenderBackend};
pub use consumer::{ConsumeStatus, FrameConsumer};
pub use program::ProgramCache;

use ketch_scene::ProgramHandle;

/// Errors raised on the render side of the frame pipe.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("program {handle:?} failed to link: {reason}")]
    ProgramLink {
        handle: ProgramHandle,
        reason: String,
    },
    #[error("render surface unavailable: {0}")]
    Surface(String),
}
