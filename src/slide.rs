//! Per-slide handle: pyramid, cache, coordinator and decode pool in one
//! open/close lifecycle.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::buffer::SharedBuffer;
use crate::cache::{TileCache, DEFAULT_CACHE_CAPACITY};
use crate::coordinator::LoadCoordinator;
use crate::error::SlideResult;
use crate::format::SlideMetadata;
use crate::pyramid::{Extent, PixelFormat, Pyramid, TileIndex};
use crate::scheduler::{DecodeScheduler, TileDecoder};

/// Where a slide's pyramid description comes from.
#[derive(Debug, Clone)]
pub enum SlideSource {
    /// A local slide directory holding `metadata.json`.
    Local(PathBuf),
    /// A slide whose description was already fetched by a network transport.
    /// The transport itself stays external; tiles arrive through the decoder.
    Remote { slide_id: String, extent: Extent },
}

/// Options for [`Slide::open`].
#[derive(Clone)]
pub struct SlideOpenOptions {
    /// Maximum resident tile count.
    pub capacity: usize,
    /// Initial high-resolution layer.
    pub hr_index: u32,
    /// Externally owned coordination handle shared with outer prefetch
    /// logic. When supplied, `hr_index` is ignored in favor of the handle's
    /// current value.
    pub coordinator: Option<Arc<LoadCoordinator>>,
    /// Decode worker count; zero selects one worker per core.
    pub decode_threads: usize,
}

impl Default for SlideOpenOptions {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CACHE_CAPACITY,
            hr_index: 0,
            coordinator: None,
            decode_threads: 0,
        }
    }
}

/// Slide lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SlideState {
    Closed = 0,
    Opening = 1,
    Open = 2,
    Closing = 3,
}

impl SlideState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Opening,
            2 => Self::Open,
            3 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

/// An open slide.
///
/// Owns the validated pyramid, the tile cache, the load coordinator and the
/// decode workers for one slide. `close` (or drop) stops the workers and
/// releases every cached buffer; the handle itself is cheap to share behind
/// an `Arc`.
pub struct Slide {
    source: SlideSource,
    pyramid: Arc<Pyramid>,
    format: PixelFormat,
    coordinator: Arc<LoadCoordinator>,
    cache: Arc<TileCache>,
    scheduler: Mutex<Option<DecodeScheduler>>,
    state: AtomicU8,
}

impl Slide {
    /// Open a slide and start its decode workers.
    ///
    /// A local source reads and validates `metadata.json` from the slide
    /// directory; a remote source uses the extent its transport already
    /// fetched. On any parse or validation failure no handle exists and
    /// nothing is retained.
    pub fn open(
        source: SlideSource,
        decoder: Arc<dyn TileDecoder>,
        options: SlideOpenOptions,
    ) -> SlideResult<Self> {
        let (pyramid, format) = match &source {
            SlideSource::Local(path) => {
                let metadata = SlideMetadata::load(path)?;
                let format = metadata.format;
                (Arc::new(metadata.into_pyramid()?), format)
            }
            SlideSource::Remote { extent, .. } => (
                Arc::new(Pyramid::new(extent.clone())?),
                PixelFormat::default(),
            ),
        };

        let coordinator = options
            .coordinator
            .unwrap_or_else(|| Arc::new(LoadCoordinator::new(options.hr_index)));
        let cache = Arc::new(TileCache::new(
            options.capacity,
            Arc::clone(&pyramid),
            Arc::clone(&coordinator),
        ));
        let scheduler = DecodeScheduler::new(
            decoder,
            Arc::clone(&cache),
            Arc::clone(&coordinator),
            Arc::clone(&pyramid),
            options.decode_threads,
        );

        let slide = Self {
            source,
            pyramid,
            format,
            coordinator,
            cache,
            scheduler: Mutex::new(Some(scheduler)),
            state: AtomicU8::new(SlideState::Opening as u8),
        };
        slide.state.store(SlideState::Open as u8, Ordering::Release);
        Ok(slide)
    }

    /// Close the slide: stop decode workers, then release every cached
    /// buffer. Idempotent; later tile requests become no-ops.
    pub fn close(&self) {
        let transitioned = self
            .state
            .compare_exchange(
                SlideState::Open as u8,
                SlideState::Closing as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();
        if !transitioned {
            return;
        }

        let scheduler = self.scheduler.lock().take();
        if let Some(scheduler) = scheduler {
            scheduler.cancel();
            // Dropping the pool joins jobs already running, so nothing can
            // insert after the clear below.
            drop(scheduler);
        }

        let resident = self.cache.len();
        self.cache.clear();
        if resident > 0 {
            eprintln!("[slideview] closed slide, dropped {} cached tiles", resident);
        }

        self.state.store(SlideState::Closed as u8, Ordering::Release);
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SlideState {
        SlideState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Cached pixels for a tile, if resident.
    pub fn tile(&self, index: TileIndex) -> Option<SharedBuffer> {
        self.cache.get(index)
    }

    /// Enqueue a background decode for a missing tile.
    pub fn request_tile(&self, index: TileIndex) {
        if let Some(scheduler) = self.scheduler.lock().as_ref() {
            scheduler.request(index);
        }
    }

    /// Enqueue decodes for every tile overlapping a viewport rectangle.
    ///
    /// Returns the number of tiles the rectangle covers; zero after close.
    pub fn request_region(
        &self,
        layer: u32,
        x: f64,
        y: f64,
        width: f64,
        height: f64,
    ) -> SlideResult<usize> {
        match self.scheduler.lock().as_ref() {
            Some(scheduler) => scheduler.request_region(layer, x, y, width, height),
            None => Ok(0),
        }
    }

    /// The source this slide was opened from.
    pub fn source(&self) -> &SlideSource {
        &self.source
    }

    /// Validated pyramid geometry.
    pub fn pyramid(&self) -> &Arc<Pyramid> {
        &self.pyramid
    }

    /// Pixel format of decoded tiles.
    pub fn pixel_format(&self) -> PixelFormat {
        self.format
    }

    /// The slide's tile cache.
    pub fn cache(&self) -> &Arc<TileCache> {
        &self.cache
    }

    /// The slide's coordination handle.
    pub fn coordinator(&self) -> &Arc<LoadCoordinator> {
        &self.coordinator
    }
}

impl Drop for Slide {
    fn drop(&mut self) {
        self.close();
    }
}
