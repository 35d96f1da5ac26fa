//! Background tile decoding.
//!
//! Owns a dedicated rayon pool that turns cache misses into decoded,
//! cache-resident tiles. Requests are deduplicated through an in-flight set
//! and dropped when the coordinator marks their layer stale, checked once
//! when the request is claimed and again before the decoded bytes are
//! committed.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::buffer::Buffer;
use crate::cache::TileCache;
use crate::coordinator::LoadCoordinator;
use crate::error::SlideResult;
use crate::pyramid::{Pyramid, TileCoord, TileIndex};

/// Codec collaborator: produces decoded pixel bytes for one tile.
///
/// Implementations decode from whatever backs the slide (a vendor file, a
/// network stream) and return a strong buffer sized for the slide's pixel
/// format. Called concurrently from decode workers.
pub trait TileDecoder: Send + Sync {
    fn decode_tile(&self, coord: TileCoord) -> SlideResult<Buffer<'static>>;
}

/// Background decode pool feeding a tile cache.
pub struct DecodeScheduler {
    pool: rayon::ThreadPool,
    decoder: Arc<dyn TileDecoder>,
    cache: Arc<TileCache>,
    coordinator: Arc<LoadCoordinator>,
    pyramid: Arc<Pyramid>,
    /// Tiles claimed by a pending or running decode job.
    in_flight: Arc<Mutex<HashSet<TileIndex>>>,
    /// Set on cancel; queued jobs exit without decoding or inserting.
    cancelled: Arc<AtomicBool>,
}

impl DecodeScheduler {
    /// Create a scheduler with a dedicated decode pool.
    ///
    /// `num_threads` of zero selects one worker per core.
    pub fn new(
        decoder: Arc<dyn TileDecoder>,
        cache: Arc<TileCache>,
        coordinator: Arc<LoadCoordinator>,
        pyramid: Arc<Pyramid>,
        num_threads: usize,
    ) -> Self {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .thread_name(|idx| format!("decode-{}", idx))
            .build()
            .expect("failed to create decode rayon pool");

        Self {
            pool,
            decoder,
            cache,
            coordinator,
            pyramid,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Enqueue a background decode for one tile.
    ///
    /// Skips tiles that are already resident, already claimed by another
    /// request, or on a layer the coordinator reports stale. A decode
    /// failure is logged and leaves the tile absent, so the next frame's
    /// miss re-requests it.
    pub fn request(&self, index: TileIndex) {
        if self.cancelled.load(Ordering::Acquire) {
            return;
        }
        let coord = match self.pyramid.tile_coord(index) {
            Ok(coord) => coord,
            Err(_) => return,
        };
        if self.coordinator.is_stale(coord.layer) {
            return;
        }
        if self.cache.contains(index) {
            return;
        }
        if !self.in_flight.lock().insert(index) {
            return;
        }

        let decoder = Arc::clone(&self.decoder);
        let cache = Arc::clone(&self.cache);
        let coordinator = Arc::clone(&self.coordinator);
        let in_flight = Arc::clone(&self.in_flight);
        let cancelled = Arc::clone(&self.cancelled);

        self.pool.spawn(move || {
            // A request can go stale while queued behind other decodes.
            if cancelled.load(Ordering::Acquire) || coordinator.is_stale(coord.layer) {
                in_flight.lock().remove(&index);
                return;
            }

            match decoder.decode_tile(coord) {
                Ok(buffer) => {
                    if !cancelled.load(Ordering::Acquire) && !coordinator.is_stale(coord.layer) {
                        cache.put(index, buffer);
                    }
                }
                Err(error) => {
                    eprintln!("[slideview] decode failed {:?}: {:?}", coord, error);
                }
            }

            in_flight.lock().remove(&index);
        });
    }

    /// Enqueue decodes for every tile overlapping a pixel rectangle.
    ///
    /// Returns the number of tiles the rectangle covers, whether each was
    /// newly requested, already claimed, or already resident.
    pub fn request_region(
        &self,
        layer: u32,
        x: f64,
        y: f64,
        width: f64,
        height: f64,
    ) -> SlideResult<usize> {
        let tiles = self.pyramid.tiles_overlapping(layer, x, y, width, height)?;
        let count = tiles.len();
        for index in tiles {
            self.request(index);
        }
        Ok(count)
    }

    /// Stop accepting requests and tell queued jobs to exit early.
    ///
    /// Dropping the scheduler afterwards joins the pool; a job already past
    /// its final cancellation check finishes its insert first.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Number of claimed requests not yet completed.
    pub fn pending(&self) -> usize {
        self.in_flight.lock().len()
    }
}

impl Drop for DecodeScheduler {
    fn drop(&mut self) {
        // The rayon pool joins outstanding jobs when it drops; the flag
        // makes queued jobs return without decoding.
        self.cancelled.store(true, Ordering::Release);
    }
}
