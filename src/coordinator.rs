//! Coordination between decode workers and the render thread.
//!
//! The [`LoadCoordinator`] carries the layer currently displayed at full
//! detail (the high-resolution index) and a tile-ready notification. Workers
//! consult [`is_stale`](LoadCoordinator::is_stale) to drop requests for
//! layers the viewer has moved away from; a display-refresh thread blocks on
//! [`wait_for_update`](LoadCoordinator::wait_for_update) instead of polling
//! the cache.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// Shared coordination state, held as `Arc<LoadCoordinator>` by the slide
/// handle, its decode workers and any outer prefetch logic.
pub struct LoadCoordinator {
    hr_index: AtomicU32,
    /// Count of tile inserts so far; guarded by the condvar's mutex so a
    /// notification between a waiter's registration and its block is not
    /// lost.
    updates: Mutex<u64>,
    tile_ready: Condvar,
}

impl LoadCoordinator {
    /// Create a coordinator with the given initial high-resolution layer.
    pub fn new(hr_index: u32) -> Self {
        Self {
            hr_index: AtomicU32::new(hr_index),
            updates: Mutex::new(0),
            tile_ready: Condvar::new(),
        }
    }

    /// The layer currently treated as primary display resolution.
    pub fn hr_index(&self) -> u32 {
        self.hr_index.load(Ordering::Acquire)
    }

    /// Update the high-resolution layer. Takes effect for all staleness
    /// checks evaluated after the store.
    pub fn set_hr_index(&self, layer: u32) {
        self.hr_index.store(layer, Ordering::Release);
    }

    /// True iff `layer` is neither the high-resolution layer nor the one
    /// directly below it. Stale work may be dropped without error.
    pub fn is_stale(&self, layer: u32) -> bool {
        let hr = self.hr_index();
        !(layer == hr || Some(layer) == hr.checked_sub(1))
    }

    /// Signal that a tile insert completed. Raised once per cache put; also
    /// available to outer prefetch layers sharing this coordinator.
    pub fn notify_tile_ready(&self) {
        let mut updates = self.updates.lock();
        *updates += 1;
        drop(updates);
        self.tile_ready.notify_all();
    }

    /// Block until a tile insert occurs or `timeout` elapses.
    ///
    /// Returns true if woken by a real update; inserts that complete before
    /// the call do not count.
    pub fn wait_for_update(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut updates = self.updates.lock();
        let start = *updates;
        while *updates == start {
            if self.tile_ready.wait_until(&mut updates, deadline).timed_out() {
                return *updates != start;
            }
        }
        true
    }
}

impl Default for LoadCoordinator {
    fn default() -> Self {
        Self::new(0)
    }
}
