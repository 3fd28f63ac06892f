use std::collections::HashMap;

use ketch_scene::ProgramHandle;
use tracing::{debug, info};

use crate::backend::{ProgramId, RenderBackend};
use crate::RenderError;

/// Memoizes program linking per backend generation.
///
/// A GPU context loss invalidates every linked program at once;
/// [`invalidate_all`](Self::invalidate_all) empties the cache so the next
/// frame relinks on demand.
#[derive(Debug, Default)]
pub struct ProgramCache {
    programs: HashMap<ProgramHandle, ProgramId>,
}

impl ProgramCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve a handle, linking through the backend on first use.
    pub fn resolve<B: RenderBackend>(
        &mut self,
        handle: ProgramHandle,
        backend: &mut B,
    ) -> Result<ProgramId, RenderError> {
        if let Some(&id) = self.programs.get(&handle) {
            return Ok(id);
        }
        let id = backend.link_program(handle)?;
        debug!(handle = handle.0, id = id.0, "program linked");
        self.programs.insert(handle, id);
        Ok(id)
    }

    pub fn len(&self) -> usize {
        self.programs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }

    /// Drop every cached program, forcing relinks on next resolve.
    pub fn invalidate_all(&mut self) {
        if !self.programs.is_empty() {
            info!(dropped = self.programs.len(), "program cache invalidated");
        }
        self.programs.clear();
    }
}
