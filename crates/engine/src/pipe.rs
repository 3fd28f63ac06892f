use std::sync::{Condvar, Mutex};
use std::time::Instant;

use crate::PipeShutdown;

struct Slot<T> {
    data: Option<T>,
    last_collect: Instant,
    shutdown: bool,
}

/// Capacity-one synchronous hand-off between the simulation and render
/// threads.
///
/// [`publish`](FramePipe::publish) deposits the frame, wakes the consumer,
/// and blocks until the consumer has taken it. It returns the instant of
/// that collect, so the producer can pose the next frame for the time it
/// will actually be shown. Once `publish` returns the consumer is reading
/// this frame's staging set while the producer packs the other one; the
/// producer never gets further ahead than that.
///
/// Shutdown is sticky and wakes both sides: a blocked producer gets
/// [`PipeShutdown`], a blocked consumer drains any pending frame and then
/// gets `None`.
pub struct FramePipe<T> {
    slot: Mutex<Slot<T>>,
    available: Condvar,
}

impl<T> FramePipe<T> {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(Slot {
                data: None,
                last_collect: Instant::now(),
                shutdown: false,
            }),
            available: Condvar::new(),
        }
    }

    /// Hand a frame to the consumer, blocking until the consumer takes it.
    ///
    /// Returns the instant this frame was collected.
    pub fn publish(&self, data: T) -> Result<Instant, PipeShutdown> {
        let mut slot = self.slot.lock().expect("frame pipe mutex poisoned");
        while slot.data.is_some() && !slot.shutdown {
            slot = self
                .available
                .wait(slot)
                .expect("frame pipe mutex poisoned");
        }
        if slot.shutdown {
            return Err(PipeShutdown);
        }
        slot.data = Some(data);
        self.available.notify_all();
        while slot.data.is_some() && !slot.shutdown {
            slot = self
                .available
                .wait(slot)
                .expect("frame pipe mutex poisoned");
        }
        if slot.data.is_some() {
            // Shut down before the frame was taken; collect can still drain it.
            return Err(PipeShutdown);
        }
        Ok(slot.last_collect)
    }

    /// Take the pending frame, blocking until one is published.
    ///
    /// Returns `None` only after shutdown with no frame left to drain.
    pub fn collect(&self) -> Option<T> {
        let mut slot = self.slot.lock().expect("frame pipe mutex poisoned");
        while slot.data.is_none() && !slot.shutdown {
            slot = self
                .available
                .wait(slot)
                .expect("frame pipe mutex poisoned");
        }
        let data = slot.data.take();
        if data.is_some() {
            slot.last_collect = Instant::now();
            self.available.notify_all();
        }
        data
    }

    /// Take the pending frame if one is ready, never blocking.
    pub fn try_collect(&self) -> Option<T> {
        let mut slot = self.slot.lock().expect("frame pipe mutex poisoned");
        let data = slot.data.take();
        if data.is_some() {
            slot.last_collect = Instant::now();
            self.available.notify_all();
        }
        data
    }

    /// Permanently close the pipe and wake any blocked side. Idempotent.
    pub fn shutdown(&self) {
        let mut slot = self.slot.lock().expect("frame pipe mutex poisoned");
        slot.shutdown = true;
        self.available.notify_all();
    }

    pub fn is_shutdown(&self) -> bool {
        self.slot
            .lock()
            .expect("frame pipe mutex poisoned")
            .shutdown
    }
}

impl<T> Default for FramePipe<T> {
    fn default() -> Self {
        Self::new()
    }
}
