use glam::Vec3;
use serde::{Deserialize, Serialize};

/// A contiguous span of buffer elements that changed since the last consumer
/// read.
///
/// Marking disjoint spans widens the range to cover everything between them:
/// the gap may be re-uploaded needlessly, but no changed element is ever left
/// out. Element units are whatever the owning buffer stores (floats for the
/// vertex staging array, indices for the index staging array).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DirtyRange {
    start: usize,
    end: usize,
}

impl DirtyRange {
    /// An empty range; uploads nothing.
    pub const EMPTY: Self = Self { start: 0, end: 0 };

    /// Grow the range to include `[lo, hi)`. Marking an empty span is a no-op.
    pub fn mark(&mut self, lo: usize, hi: usize) {
        if hi <= lo {
            return;
        }
        if self.is_empty() {
            self.start = lo;
            self.end = hi;
        } else {
            self.start = self.start.min(lo);
            self.end = self.end.max(hi);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// First element covered.
    pub fn start(&self) -> usize {
        self.start
    }

    /// One past the last element covered.
    pub fn end(&self) -> usize {
        self.end
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    /// Return the current range and reset this one to empty.
    pub fn take(&mut self) -> DirtyRange {
        std::mem::take(self)
    }

    pub fn clear(&mut self) {
        *self = Self::EMPTY;
    }
}

/// Directional light state for a frame: a direction vector and an RGB color.
///
/// Mutable from the application thread at any time; the simulation thread
/// copies it by value into each snapshot, so the render thread never observes
/// a half-written update.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Light {
    pub vector: Vec3,
    pub color: Vec3,
}

impl Default for Light {
    fn default() -> Self {
        Self {
            vector: Vec3::new(0.0, 1.0, 0.0),
            color: Vec3::ONE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_range_uploads_nothing() {
        let r = DirtyRange::EMPTY;
        assert!(r.is_empty());
        assert_eq!(r.len(), 0);
    }

    #[test]
    fn mark_grows_to_union() {
        let mut r = DirtyRange::EMPTY;
        r.mark(10, 20);
        assert_eq!((r.start(), r.end()), (10, 20));

        // Disjoint span: the gap is covered too.
        r.mark(40, 50);
        assert_eq!((r.start(), r.end()), (10, 50));

        // Overlapping span below.
        r.mark(5, 12);
        assert_eq!((r.start(), r.end()), (5, 50));
    }

    #[test]
    fn mark_empty_span_is_noop() {
        let mut r = DirtyRange::EMPTY;
        r.mark(7, 7);
        assert!(r.is_empty());
        r.mark(3, 9);
        r.mark(100, 90);
        assert_eq!((r.start(), r.end()), (3, 9));
    }

    #[test]
    fn take_resets() {
        let mut r = DirtyRange::EMPTY;
        r.mark(0, 16);
        let taken = r.take();
        assert_eq!(taken.len(), 16);
        assert!(r.is_empty());
    }

    #[test]
    fn light_default_is_white_overhead() {
        let light = Light::default();
        assert_eq!(light.vector, Vec3::Y);
        assert_eq!(light.color, Vec3::ONE);
    }
}
