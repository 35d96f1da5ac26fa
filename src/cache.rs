//! Capacity-bounded tile cache.
//!
//! Maps [`TileIndex`] to published pixel buffers, bounded by a resident tile
//! count. Eviction runs synchronously inside [`put`](TileCache::put) and is
//! two-tier: tiles outside the coordinator's high-resolution window go
//! first, then the least-recently-inserted. Every put raises the
//! coordinator's tile-ready notification exactly once.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::buffer::{Buffer, SharedBuffer};
use crate::coordinator::LoadCoordinator;
use crate::pyramid::{Pyramid, TileIndex};

/// Default maximum resident tile count.
pub const DEFAULT_CACHE_CAPACITY: usize = 1000;

/// Cache statistics.
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub resident: usize,
    pub capacity: usize,
}

/// Bounded tile store shared by decode workers and the render thread.
///
/// Reads take a shared lock so viewport queries do not serialize against
/// each other; only inserts, removals and eviction take the write lock.
/// Lock order is `tiles` before `insert_order`.
pub struct TileCache {
    /// Index-to-buffer mapping; many readers, one writer.
    tiles: RwLock<HashMap<TileIndex, SharedBuffer>>,
    /// Insertion order, oldest at the front.
    insert_order: Mutex<VecDeque<TileIndex>>,
    /// Maximum resident tile count.
    capacity: usize,
    pyramid: Arc<Pyramid>,
    coordinator: Arc<LoadCoordinator>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl TileCache {
    /// Create a cache bounded at `capacity` resident tiles.
    pub fn new(capacity: usize, pyramid: Arc<Pyramid>, coordinator: Arc<LoadCoordinator>) -> Self {
        Self {
            tiles: RwLock::new(HashMap::new()),
            insert_order: Mutex::new(VecDeque::new()),
            capacity,
            pyramid,
            coordinator,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Get a tile from the cache.
    ///
    /// Returns None on a miss; a miss is normal control flow, not an error.
    /// The returned handle keeps the pixel data alive even if the entry is
    /// evicted afterwards.
    pub fn get(&self, index: TileIndex) -> Option<SharedBuffer> {
        let tiles = self.tiles.read();
        match tiles.get(&index) {
            Some(buffer) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(Arc::clone(buffer))
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Insert a finished tile, evicting past the capacity bound.
    ///
    /// Re-inserting an existing index replaces its bytes and refreshes its
    /// insertion recency. Raises the coordinator's tile-ready notification
    /// once per call.
    pub fn put(&self, index: TileIndex, buffer: Buffer<'static>) {
        // Displaced buffers collect here and drop at the end of the call,
        // after the locks are released.
        let mut evicted: Vec<SharedBuffer> = Vec::new();
        {
            let mut tiles = self.tiles.write();
            let mut order = self.insert_order.lock();

            if let Some(previous) = tiles.insert(index, Arc::new(buffer)) {
                order.retain(|&queued| queued != index);
                evicted.push(previous);
            }
            order.push_back(index);

            while tiles.len() > self.capacity {
                match self.evict_one(&mut tiles, &mut order) {
                    Some(buffer) => evicted.push(buffer),
                    None => break,
                }
            }
        }

        self.coordinator.notify_tile_ready();
    }

    /// Pick and remove one victim: the oldest tile outside the
    /// high-resolution window, or the oldest overall if every resident tile
    /// is inside it.
    fn evict_one(
        &self,
        tiles: &mut HashMap<TileIndex, SharedBuffer>,
        order: &mut VecDeque<TileIndex>,
    ) -> Option<SharedBuffer> {
        let position = order
            .iter()
            .position(|&index| !self.is_relevant(index))
            .unwrap_or(0);
        let victim = order.remove(position)?;
        tiles.remove(&victim)
    }

    /// True if the tile's layer is inside the coordinator's window.
    fn is_relevant(&self, index: TileIndex) -> bool {
        match self.pyramid.tile_coord(index) {
            Ok(coord) => !self.coordinator.is_stale(coord.layer),
            Err(_) => false,
        }
    }

    /// Check whether a tile is resident.
    pub fn contains(&self, index: TileIndex) -> bool {
        self.tiles.read().contains_key(&index)
    }

    /// Remove one tile, returning its buffer to the caller.
    ///
    /// The buffer drops after the locks are released.
    pub fn remove(&self, index: TileIndex) -> Option<SharedBuffer> {
        let mut tiles = self.tiles.write();
        let mut order = self.insert_order.lock();
        let removed = tiles.remove(&index);
        if removed.is_some() {
            order.retain(|&queued| queued != index);
        }
        removed
    }

    /// Drop every resident tile. Used on slide close; does not raise the
    /// notification.
    pub fn clear(&self) {
        let drained: Vec<SharedBuffer> = {
            let mut tiles = self.tiles.write();
            let mut order = self.insert_order.lock();
            order.clear();
            tiles.drain().map(|(_, buffer)| buffer).collect()
        };
        // Dropped here, with no lock held.
        drop(drained);
    }

    /// Get cache statistics. Hit/miss counters survive `clear`.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            resident: self.len(),
            capacity: self.capacity,
        }
    }

    /// Number of resident tiles.
    pub fn len(&self) -> usize {
        self.tiles.read().len()
    }

    /// True if no tiles are resident.
    pub fn is_empty(&self) -> bool {
        self.tiles.read().is_empty()
    }

    /// Maximum resident tile count.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
