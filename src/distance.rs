//! Minimum distance shared between the coordinate observations and the flush controller

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// Floor of the auto-derived minimum distance
pub const MIN_AUTO_DISTANCE: u32 = 100;

#[derive(Debug)]
struct Inner {
    value: AtomicU32,
    fixed: bool,
    seeded: AtomicBool,
}

/// Handle to the minimum distance in effect for a run
///
/// A fixed distance never changes. An auto-derived one is seeded from the first
/// read as `max(2 * read length, 100)` and then only grows, to the largest
/// leading clip observed. Clones share the same cell.
#[derive(Debug, Clone)]
pub struct MinimumDistance {
    inner: Arc<Inner>,
}

impl MinimumDistance {
    pub fn fixed(distance: u32) -> Self {
        Self {
            inner: Arc::new(Inner {
                value: AtomicU32::new(distance),
                fixed: true,
                seeded: AtomicBool::new(true),
            }),
        }
    }

    pub fn auto() -> Self {
        Self {
            inner: Arc::new(Inner {
                value: AtomicU32::new(MIN_AUTO_DISTANCE),
                fixed: false,
                seeded: AtomicBool::new(false),
            }),
        }
    }

    pub fn from_config(distance: Option<u32>) -> Self {
        distance.map_or_else(Self::auto, Self::fixed)
    }

    #[inline]
    pub fn get(&self) -> u32 {
        self.inner.value.load(Ordering::Relaxed)
    }

    /// Records a read's length and leading clip; returns the distance now in effect
    pub fn observe(&self, read_length: usize, leading_clip: usize) -> u32 {
        if self.inner.fixed {
            return self.get();
        }
        if !self.inner.seeded.swap(true, Ordering::Relaxed) {
            let seed = u32::try_from(read_length.saturating_mul(2)).unwrap_or(u32::MAX);
            self.inner.value.fetch_max(seed, Ordering::Relaxed);
        }
        let clip = u32::try_from(leading_clip).unwrap_or(u32::MAX);
        let previous = self.inner.value.fetch_max(clip, Ordering::Relaxed);
        if clip > previous {
            log::debug!("minimum distance grew from {previous} to {clip}");
        }
        previous.max(clip)
    }
}
