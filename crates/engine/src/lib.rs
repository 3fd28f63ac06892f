//! Simulation thread, staging buffers, and the frame hand-off pipe.
//!
//! The engine runs the scene on its own thread and publishes one frame
//! snapshot per tick through a capacity-one synchronous [`FramePipe`]. The
//! consumer (a render backend driver) collects each snapshot and uploads the
//! dirty spans of the staging set it references.
//!
//! # Invariants
//! - At most one frame of slack ever exists between the two threads; the
//!   producer blocks inside [`FramePipe::publish`] until the previous frame
//!   is collected.
//! - Staging sets alternate frame by frame, so the set a published snapshot
//!   references is never written while the consumer reads it.

pub mod engine;
pub mod pipe;
pub mod snapshot;
pub mod staging;

pub use engine::{Action, Engine, EngineHandle};
pub use pipe::FramePipe;
pub use snapshot::{DrawRecord, RenderData};
pub use staging::StagingBuffers;

/// The frame pipe was shut down; no further frames will flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("frame pipe is shut down")]
pub struct PipeShutdown;
