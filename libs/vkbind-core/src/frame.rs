use std::sync::atomic::{AtomicU64, Ordering};

/// Tracks which of the N overlapping frames the CPU is currently recording.
/// The monotonic frame index stamps descriptor sets; the slot picks the
/// arena for the frame being recorded.
pub struct FrameCounter {
    in_flight: usize,
    frame: AtomicU64,
}

impl FrameCounter {
    pub fn new(in_flight: usize) -> Self {
        assert!(in_flight > 0, "at least one frame in flight is required");
        Self {
            in_flight,
            frame: AtomicU64::new(0),
        }
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    pub fn current(&self) -> u64 {
        self.frame.load(Ordering::Relaxed)
    }

    pub fn slot(&self) -> usize {
        (self.current() % self.in_flight as u64) as usize
    }

    pub fn advance(&self) {
        self.frame.fetch_add(1, Ordering::Relaxed);
    }
}
