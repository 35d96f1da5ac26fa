//! Pyramid geometry: layer extents and tile addressing.
//!
//! A slide is a multi-resolution pyramid of fixed 256x256-pixel tiles.
//! [`Pyramid`] validates an [`Extent`] description and maps between
//! `(layer, row, col)` coordinates and dense [`TileIndex`] values, which the
//! cache uses as keys.

use serde::Deserialize;

use crate::error::{SlideError, SlideResult};

/// Tile edge length in pixels. Every layer is gridded at this size.
pub const TILE_SIZE: u32 = 256;

/// Packed pixel layout of decoded tile bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    Bgr8,
    #[default]
    Rgb8,
    Bgra8,
    Rgba8,
}

impl PixelFormat {
    /// Bytes per pixel for this layout.
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Bgr8 | PixelFormat::Rgb8 => 3,
            PixelFormat::Bgra8 | PixelFormat::Rgba8 => 4,
        }
    }

    /// Bytes in one fully decoded tile.
    pub fn tile_bytes(self) -> usize {
        (TILE_SIZE as usize) * (TILE_SIZE as usize) * self.bytes_per_pixel()
    }
}

fn default_grid() -> u32 {
    1
}

fn default_unit() -> f32 {
    1.0
}

/// One pyramid layer: tile-grid size plus magnification factors.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct LayerExtent {
    /// Grid width in tiles.
    #[serde(default = "default_grid")]
    pub x_tiles: u32,
    /// Grid height in tiles.
    #[serde(default = "default_grid")]
    pub y_tiles: u32,
    /// Magnification relative to the most-magnified layer (<= 1).
    #[serde(default = "default_unit")]
    pub scale: f32,
    /// Reciprocal of `scale`.
    #[serde(default = "default_unit")]
    pub downsample: f32,
}

/// Full pyramid description: base dimensions plus per-layer extents,
/// ordered lowest magnification first.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Extent {
    /// Width in pixels at the most-magnified layer.
    pub width: u32,
    /// Height in pixels at the most-magnified layer.
    pub height: u32,
    pub layers: Vec<LayerExtent>,
}

/// Decoded form of a tile index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileCoord {
    pub layer: u32,
    pub row: u32,
    pub col: u32,
}

impl TileCoord {
    pub fn new(layer: u32, row: u32, col: u32) -> Self {
        Self { layer, row, col }
    }
}

/// Dense tile identifier, unique within one slide's pyramid.
///
/// Only [`Pyramid`] methods mint these, so a live index is always valid for
/// the pyramid that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileIndex(u32);

impl TileIndex {
    /// The raw dense value.
    pub fn as_u32(self) -> u32 {
        self.0
    }
}

/// Validated pyramid geometry with precomputed dense-index offsets.
#[derive(Debug, Clone)]
pub struct Pyramid {
    extent: Extent,
    /// First dense index of each layer.
    layer_offsets: Vec<u32>,
    tile_count: u32,
}

/// Tolerance for the scale/downsample reciprocity check.
const RECIPROCAL_EPS: f64 = 1e-3;

impl Pyramid {
    /// Validate an extent description and build the index tables.
    ///
    /// Rejects empty pyramids, zero dimensions, non-reciprocal
    /// scale/downsample pairs, tile grids that do not match
    /// `ceil(layer_pixels / 256)` and grids that shrink with layer index.
    pub fn new(extent: Extent) -> SlideResult<Self> {
        if extent.layers.is_empty() {
            return Err(SlideError::InvalidFormat("pyramid has no layers".into()));
        }
        if extent.width == 0 || extent.height == 0 {
            return Err(SlideError::InvalidFormat(format!(
                "slide dimensions must be positive, got {}x{}",
                extent.width, extent.height
            )));
        }

        let mut layer_offsets = Vec::with_capacity(extent.layers.len());
        let mut total: u64 = 0;
        let mut prev_grid = (0u32, 0u32);

        for (i, layer) in extent.layers.iter().enumerate() {
            if layer.scale <= 0.0 || layer.downsample <= 0.0 {
                return Err(SlideError::InvalidFormat(format!(
                    "layer {i}: scale and downsample must be positive"
                )));
            }
            let product = f64::from(layer.scale) * f64::from(layer.downsample);
            if (product - 1.0).abs() > RECIPROCAL_EPS {
                return Err(SlideError::InvalidFormat(format!(
                    "layer {i}: scale {} and downsample {} are not reciprocal",
                    layer.scale, layer.downsample
                )));
            }

            let expected_x = pixels_at_scale(extent.width, layer.scale).div_ceil(TILE_SIZE);
            let expected_y = pixels_at_scale(extent.height, layer.scale).div_ceil(TILE_SIZE);
            if layer.x_tiles != expected_x || layer.y_tiles != expected_y {
                return Err(SlideError::InvalidFormat(format!(
                    "layer {i}: tile grid {}x{} does not match {}x{} expected at scale {}",
                    layer.x_tiles, layer.y_tiles, expected_x, expected_y, layer.scale
                )));
            }
            if layer.x_tiles < prev_grid.0 || layer.y_tiles < prev_grid.1 {
                return Err(SlideError::InvalidFormat(format!(
                    "layer {i}: tile grid shrinks from {}x{} to {}x{}",
                    prev_grid.0, prev_grid.1, layer.x_tiles, layer.y_tiles
                )));
            }
            prev_grid = (layer.x_tiles, layer.y_tiles);

            layer_offsets.push(total as u32);
            total += u64::from(layer.x_tiles) * u64::from(layer.y_tiles);
            if total > u64::from(u32::MAX) {
                return Err(SlideError::InvalidFormat(format!(
                    "pyramid too large: more than {} tiles",
                    u32::MAX
                )));
            }
        }

        Ok(Self {
            extent,
            layer_offsets,
            tile_count: total as u32,
        })
    }

    /// The validated extent description.
    pub fn extent(&self) -> &Extent {
        &self.extent
    }

    /// Number of pyramid layers.
    pub fn layer_count(&self) -> u32 {
        self.extent.layers.len() as u32
    }

    /// Total tiles across all layers.
    pub fn tile_count(&self) -> u32 {
        self.tile_count
    }

    /// Extent of one layer.
    pub fn layer_extent(&self, layer: u32) -> SlideResult<LayerExtent> {
        self.extent
            .layers
            .get(layer as usize)
            .copied()
            .ok_or(SlideError::LayerOutOfRange {
                layer,
                layer_count: self.layer_count(),
            })
    }

    /// Pixel width of one layer.
    pub fn layer_width(&self, layer: u32) -> SlideResult<u32> {
        let extent = self.layer_extent(layer)?;
        Ok(pixels_at_scale(self.extent.width, extent.scale))
    }

    /// Pixel height of one layer.
    pub fn layer_height(&self, layer: u32) -> SlideResult<u32> {
        let extent = self.layer_extent(layer)?;
        Ok(pixels_at_scale(self.extent.height, extent.scale))
    }

    /// Encode a coordinate as its dense index.
    pub fn tile_index(&self, coord: TileCoord) -> SlideResult<TileIndex> {
        let extent = self.layer_extent(coord.layer)?;
        if coord.row >= extent.y_tiles || coord.col >= extent.x_tiles {
            return Err(SlideError::TileOutOfRange {
                layer: coord.layer,
                row: coord.row,
                col: coord.col,
            });
        }
        Ok(self.index_unchecked(coord.layer, coord.row, coord.col))
    }

    /// Decode a dense index back to its coordinate. Exact inverse of
    /// [`tile_index`](Self::tile_index).
    pub fn tile_coord(&self, index: TileIndex) -> SlideResult<TileCoord> {
        if index.0 >= self.tile_count {
            return Err(SlideError::TileIndexOutOfRange {
                index: index.0,
                tile_count: self.tile_count,
            });
        }
        let layer = self.layer_offsets.partition_point(|&off| off <= index.0) - 1;
        let local = index.0 - self.layer_offsets[layer];
        let x_tiles = self.extent.layers[layer].x_tiles;
        Ok(TileCoord {
            layer: layer as u32,
            row: local / x_tiles,
            col: local % x_tiles,
        })
    }

    /// Minimal set of tile indices covering a pixel rectangle at one layer.
    ///
    /// The rectangle is clamped to the layer's tile grid; a rectangle that is
    /// empty or entirely outside the grid yields an empty vector.
    pub fn tiles_overlapping(
        &self,
        layer: u32,
        x: f64,
        y: f64,
        width: f64,
        height: f64,
    ) -> SlideResult<Vec<TileIndex>> {
        let extent = self.layer_extent(layer)?;
        if !(width > 0.0) || !(height > 0.0) {
            return Ok(Vec::new());
        }

        let tile_size = f64::from(TILE_SIZE);
        // Float-to-u32 casts saturate, so a rect far off either side of the
        // grid collapses into an empty start >= end range below.
        let col_start = (x / tile_size).floor() as u32;
        let col_end = (((x + width) / tile_size).ceil() as u32).min(extent.x_tiles);
        let row_start = (y / tile_size).floor() as u32;
        let row_end = (((y + height) / tile_size).ceil() as u32).min(extent.y_tiles);

        if col_start >= col_end || row_start >= row_end {
            return Ok(Vec::new());
        }

        let mut tiles =
            Vec::with_capacity(((col_end - col_start) * (row_end - row_start)) as usize);
        for row in row_start..row_end {
            for col in col_start..col_end {
                tiles.push(self.index_unchecked(layer, row, col));
            }
        }
        Ok(tiles)
    }

    fn index_unchecked(&self, layer: u32, row: u32, col: u32) -> TileIndex {
        let offset = self.layer_offsets[layer as usize];
        let x_tiles = self.extent.layers[layer as usize].x_tiles;
        TileIndex(offset + row * x_tiles + col)
    }
}

fn pixels_at_scale(base: u32, scale: f32) -> u32 {
    (f64::from(base) * f64::from(scale)).ceil() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_layer_extent() -> Extent {
        Extent {
            width: 4096,
            height: 4096,
            layers: vec![
                LayerExtent {
                    x_tiles: 1,
                    y_tiles: 1,
                    scale: 1.0 / 16.0,
                    downsample: 16.0,
                },
                LayerExtent {
                    x_tiles: 16,
                    y_tiles: 16,
                    scale: 1.0,
                    downsample: 1.0,
                },
            ],
        }
    }

    fn two_layer_pyramid() -> Pyramid {
        Pyramid::new(two_layer_extent()).unwrap()
    }

    #[test]
    fn test_tile_index_round_trip() {
        let pyramid = two_layer_pyramid();
        let mut seen = Vec::new();
        for layer in 0..pyramid.layer_count() {
            let extent = pyramid.layer_extent(layer).unwrap();
            for row in 0..extent.y_tiles {
                for col in 0..extent.x_tiles {
                    let coord = TileCoord::new(layer, row, col);
                    let index = pyramid.tile_index(coord).unwrap();
                    assert_eq!(pyramid.tile_coord(index).unwrap(), coord);
                    seen.push(index.as_u32());
                }
            }
        }
        // Dense: the indices are exactly 0..tile_count with no gaps.
        seen.sort_unstable();
        let expected: Vec<u32> = (0..pyramid.tile_count()).collect();
        assert_eq!(seen, expected);
        assert_eq!(pyramid.tile_count(), 257);
    }

    #[test]
    fn test_tile_index_rejects_out_of_grid() {
        let pyramid = two_layer_pyramid();
        let err = pyramid.tile_index(TileCoord::new(0, 0, 1)).unwrap_err();
        assert!(matches!(err, SlideError::TileOutOfRange { .. }));
        let err = pyramid.tile_index(TileCoord::new(2, 0, 0)).unwrap_err();
        assert!(matches!(err, SlideError::LayerOutOfRange { .. }));
    }

    #[test]
    fn test_tile_coord_rejects_out_of_range_index() {
        let pyramid = two_layer_pyramid();
        let err = pyramid.tile_coord(TileIndex(257)).unwrap_err();
        assert!(matches!(err, SlideError::TileIndexOutOfRange { .. }));
    }

    #[test]
    fn test_layer_extent_out_of_range() {
        let pyramid = two_layer_pyramid();
        assert!(pyramid.layer_extent(1).is_ok());
        let err = pyramid.layer_extent(2).unwrap_err();
        assert!(matches!(
            err,
            SlideError::LayerOutOfRange {
                layer: 2,
                layer_count: 2
            }
        ));
    }

    #[test]
    fn test_layer_dimensions() {
        let pyramid = two_layer_pyramid();
        assert_eq!(pyramid.layer_width(0).unwrap(), 256);
        assert_eq!(pyramid.layer_height(0).unwrap(), 256);
        assert_eq!(pyramid.layer_width(1).unwrap(), 4096);
        assert_eq!(pyramid.layer_height(1).unwrap(), 4096);
    }

    #[test]
    fn test_tiles_overlapping_full_layer() {
        let pyramid = two_layer_pyramid();
        let tiles = pyramid
            .tiles_overlapping(1, 0.0, 0.0, 4096.0, 4096.0)
            .unwrap();
        assert_eq!(tiles.len(), 256);
    }

    #[test]
    fn test_tiles_overlapping_partial() {
        let pyramid = two_layer_pyramid();
        // Straddles the tile boundary at 256 in both axes.
        let tiles = pyramid
            .tiles_overlapping(1, 200.0, 200.0, 100.0, 100.0)
            .unwrap();
        assert_eq!(tiles.len(), 4);
    }

    #[test]
    fn test_tiles_overlapping_clamps_negative_origin() {
        let pyramid = two_layer_pyramid();
        let tiles = pyramid
            .tiles_overlapping(1, -500.0, -500.0, 1000.0, 1000.0)
            .unwrap();
        // Clamped to cols 0..2, rows 0..2.
        assert_eq!(tiles.len(), 4);
        for index in tiles {
            let coord = pyramid.tile_coord(index).unwrap();
            assert!(coord.row < 2 && coord.col < 2);
        }
    }

    #[test]
    fn test_tiles_overlapping_clamps_far_edge() {
        let pyramid = two_layer_pyramid();
        let tiles = pyramid
            .tiles_overlapping(1, 3900.0, 3900.0, 1000.0, 1000.0)
            .unwrap();
        // Only the bottom-right tile remains in range.
        assert_eq!(tiles.len(), 1);
        let coord = pyramid.tile_coord(tiles[0]).unwrap();
        assert_eq!(coord, TileCoord::new(1, 15, 15));
    }

    #[test]
    fn test_tiles_overlapping_outside_grid() {
        let pyramid = two_layer_pyramid();
        let tiles = pyramid
            .tiles_overlapping(1, 10000.0, 10000.0, 100.0, 100.0)
            .unwrap();
        assert!(tiles.is_empty());
    }

    #[test]
    fn test_tiles_overlapping_far_outside_grid() {
        let pyramid = two_layer_pyramid();
        // An origin past 2^32 tile columns must saturate, not wrap back
        // into the grid.
        let far = 1_099_511_627_776.0; // 2^40
        let tiles = pyramid
            .tiles_overlapping(1, far, far, 100.0, 100.0)
            .unwrap();
        assert!(tiles.is_empty());
        let tiles = pyramid
            .tiles_overlapping(1, -far, -far, 100.0, 100.0)
            .unwrap();
        assert!(tiles.is_empty());
    }

    #[test]
    fn test_tiles_overlapping_empty_rect() {
        let pyramid = two_layer_pyramid();
        let tiles = pyramid.tiles_overlapping(1, 100.0, 100.0, 0.0, 0.0).unwrap();
        assert!(tiles.is_empty());
    }

    #[test]
    fn test_tiles_overlapping_bad_layer() {
        let pyramid = two_layer_pyramid();
        let err = pyramid
            .tiles_overlapping(5, 0.0, 0.0, 100.0, 100.0)
            .unwrap_err();
        assert!(matches!(err, SlideError::LayerOutOfRange { .. }));
    }

    #[test]
    fn test_validation_rejects_empty_pyramid() {
        let extent = Extent {
            width: 4096,
            height: 4096,
            layers: vec![],
        };
        assert!(matches!(
            Pyramid::new(extent),
            Err(SlideError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_validation_rejects_non_reciprocal_scale() {
        let mut extent = two_layer_extent();
        extent.layers[0].downsample = 8.0;
        assert!(matches!(
            Pyramid::new(extent),
            Err(SlideError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_validation_rejects_mismatched_grid() {
        let mut extent = two_layer_extent();
        extent.layers[0].x_tiles = 2;
        assert!(matches!(
            Pyramid::new(extent),
            Err(SlideError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_validation_rejects_shrinking_grid() {
        let extent = Extent {
            width: 4096,
            height: 4096,
            layers: vec![
                LayerExtent {
                    x_tiles: 16,
                    y_tiles: 16,
                    scale: 1.0,
                    downsample: 1.0,
                },
                LayerExtent {
                    x_tiles: 1,
                    y_tiles: 1,
                    scale: 1.0 / 16.0,
                    downsample: 16.0,
                },
            ],
        };
        assert!(matches!(
            Pyramid::new(extent),
            Err(SlideError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_grid_derivation_rounds_up() {
        // 4100 pixels needs 17 tiles of 256.
        let extent = Extent {
            width: 4100,
            height: 300,
            layers: vec![LayerExtent {
                x_tiles: 17,
                y_tiles: 2,
                scale: 1.0,
                downsample: 1.0,
            }],
        };
        let pyramid = Pyramid::new(extent).unwrap();
        assert_eq!(pyramid.tile_count(), 34);
    }

    #[test]
    fn test_pixel_format_sizes() {
        assert_eq!(PixelFormat::Rgb8.bytes_per_pixel(), 3);
        assert_eq!(PixelFormat::Bgr8.bytes_per_pixel(), 3);
        assert_eq!(PixelFormat::Rgba8.bytes_per_pixel(), 4);
        assert_eq!(PixelFormat::Bgra8.bytes_per_pixel(), 4);
        assert_eq!(PixelFormat::Rgb8.tile_bytes(), 256 * 256 * 3);
        assert_eq!(PixelFormat::Bgra8.tile_bytes(), 256 * 256 * 4);
    }
}
