//! Core tile buffer and cache subsystem for gigapixel whole-slide viewing.
//!
//! This crate provides:
//! - Strong/weak byte buffers for decoded tile data
//! - Pyramid tile addressing with dense per-slide tile indices
//! - A bounded tile cache with relevance-then-recency eviction
//! - Load coordination between decode workers and a render loop
//! - A per-slide open/close handle wiring the pieces together

pub mod buffer;
pub mod cache;
pub mod coordinator;
pub mod error;
pub mod format;
pub mod pyramid;
pub mod scheduler;
pub mod slide;

pub use buffer::{Buffer, Ownership, SharedBuffer};
pub use cache::{CacheStats, TileCache, DEFAULT_CACHE_CAPACITY};
pub use coordinator::LoadCoordinator;
pub use error::{SlideError, SlideResult};
pub use format::SlideMetadata;
pub use pyramid::{Extent, LayerExtent, PixelFormat, Pyramid, TileCoord, TileIndex, TILE_SIZE};
pub use scheduler::{DecodeScheduler, TileDecoder};
pub use slide::{Slide, SlideOpenOptions, SlideSource, SlideState};

/// Major component of the crate version.
pub fn major_version() -> u32 {
    parse_version_component(env!("CARGO_PKG_VERSION_MAJOR"))
}

/// Minor component of the crate version.
pub fn minor_version() -> u32 {
    parse_version_component(env!("CARGO_PKG_VERSION_MINOR"))
}

/// Patch component of the crate version, counted as the build number.
pub fn build_number() -> u32 {
    parse_version_component(env!("CARGO_PKG_VERSION_PATCH"))
}

fn parse_version_component(component: &str) -> u32 {
    component.parse().unwrap_or(0)
}
