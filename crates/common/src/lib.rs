//! Shared types for the ketch engine.
//!
//! # Invariants
//! - A `DirtyRange` only ever grows between resets; it covers the union of all
//!   marked spans as one contiguous range (conservative superset, never an
//!   under-estimate).
//! - `Light` is plain `Copy` data so readers can take an atomic-by-value copy
//!   under whatever lock guards it.

pub mod config;
pub mod types;

pub use config::{ConfigError, EngineConfig};
pub use types::{DirtyRange, Light};
