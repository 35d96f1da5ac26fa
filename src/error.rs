//! Error types for slideview_core.

use thiserror::Error;

/// Error types for buffer, pyramid and slide operations.
///
/// A cache miss is not represented here: `TileCache::get` returns `Option`
/// so the render path stays error-free in the common case.
#[derive(Error, Debug)]
pub enum SlideError {
    #[error("Buffer allocation of {requested} bytes failed")]
    Allocation { requested: usize },

    #[error("Write of {requested} bytes exceeds weak buffer capacity ({writable} writable)")]
    Overflow { requested: usize, writable: usize },

    #[error("Layer {layer} out of range: pyramid has {layer_count} layers")]
    LayerOutOfRange { layer: u32, layer_count: u32 },

    #[error("Tile coordinate out of range: layer={layer}, row={row}, col={col}")]
    TileOutOfRange { layer: u32, row: u32, col: u32 },

    #[error("Tile index {index} out of range: pyramid has {tile_count} tiles")]
    TileIndexOutOfRange { index: u32, tile_count: u32 },

    #[error("Invalid slide format: {0}")]
    InvalidFormat(String),

    #[error("Failed to decode tile: {0}")]
    Decode(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for slide operations.
pub type SlideResult<T> = Result<T, SlideError>;
