use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Running totals kept by the workers.
#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub(crate) generated: AtomicUsize,
    pub(crate) loaded: AtomicUsize,
    pub(crate) saved: AtomicUsize,
    pub(crate) save_failures: AtomicUsize,
    pub(crate) rebuilt_exhaustive: AtomicUsize,
    pub(crate) rebuilt_near_field: AtomicUsize,
    pub(crate) rebuilt_raycast: AtomicUsize,
    pub(crate) rebuilt_instant: AtomicUsize,
    pub(crate) updates_run: AtomicUsize,
}

impl Counters {
    pub(crate) fn bump(counter: &AtomicUsize, by: usize) {
        counter.fetch_add(by, Ordering::Relaxed);
    }
}

/// Point-in-time view of the world for instrumentation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamStats {
    /// Slots whose occupant matches the current scope.
    pub resident: usize,
    pub stale: usize,
    pub rebuilding: usize,
    pub instant_pending: usize,
    pub unsaved: usize,
    pub generated_total: usize,
    pub loaded_total: usize,
    pub saved_total: usize,
    pub save_failures: usize,
    pub rebuilt_exhaustive: usize,
    pub rebuilt_near_field: usize,
    pub rebuilt_raycast: usize,
    pub rebuilt_instant: usize,
    pub updates_run: usize,
    pub triangles: usize,
}

impl StreamStats {
    pub fn rebuilt_total(&self) -> usize {
        self.rebuilt_exhaustive + self.rebuilt_near_field + self.rebuilt_raycast + self.rebuilt_instant
    }
}

pub(crate) fn load(counter: &AtomicUsize) -> usize {
    counter.load(Ordering::Relaxed)
}

/// Rolling window of frame durations.
#[derive(Debug)]
pub struct FrameTimer {
    window: VecDeque<Duration>,
    capacity: usize,
}

impl FrameTimer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            window: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn record(&mut self, dt: Duration) {
        if self.window.len() == self.capacity {
            self.window.pop_front();
        }
        self.window.push_back(dt);
    }

    pub fn count(&self) -> usize {
        self.window.len()
    }

    pub fn average(&self) -> Duration {
        if self.window.is_empty() {
            return Duration::ZERO;
        }
        self.window.iter().sum::<Duration>() / self.window.len() as u32
    }

    pub fn max(&self) -> Duration {
        self.window.iter().copied().max().unwrap_or(Duration::ZERO)
    }

    pub fn min(&self) -> Duration {
        self.window.iter().copied().min().unwrap_or(Duration::ZERO)
    }

    pub fn last(&self) -> Option<Duration> {
        self.window.back().copied()
    }
}
