//! Slide metadata parsing.
//!
//! A local slide directory carries a `metadata.json` sidecar describing the
//! pyramid; this module deserializes it and hands the extent to
//! [`Pyramid`] for validation.

use std::path::Path;

use serde::Deserialize;

use crate::error::SlideResult;
use crate::pyramid::{Extent, PixelFormat, Pyramid};

/// Metadata from metadata.json.
#[derive(Debug, Clone, Deserialize)]
pub struct SlideMetadata {
    pub extent: Extent,
    /// Pixel layout of decoded tiles.
    #[serde(default)]
    pub format: PixelFormat,
    #[serde(default)]
    pub source_file: String,
}

impl SlideMetadata {
    /// Load metadata from a slide directory.
    pub fn load(slide_dir: &Path) -> SlideResult<Self> {
        let metadata_path = slide_dir.join("metadata.json");
        let content = std::fs::read_to_string(&metadata_path)?;
        let metadata: SlideMetadata = serde_json::from_str(&content)?;
        Ok(metadata)
    }

    /// Validate the extent into query-ready pyramid geometry.
    pub fn into_pyramid(self) -> SlideResult<Pyramid> {
        Pyramid::new(self.extent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SlideError;
    use std::fs;
    use tempfile::TempDir;

    const VALID_METADATA: &str = r#"{
        "extent": {
            "width": 4096,
            "height": 4096,
            "layers": [
                {"x_tiles": 1, "y_tiles": 1, "scale": 0.0625, "downsample": 16.0},
                {"x_tiles": 16, "y_tiles": 16, "scale": 1.0, "downsample": 1.0}
            ]
        },
        "format": "bgra8",
        "source_file": "slide.tiff"
    }"#;

    #[test]
    fn test_load_valid_metadata() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("metadata.json"), VALID_METADATA).unwrap();

        let metadata = SlideMetadata::load(temp.path()).unwrap();
        assert_eq!(metadata.format, PixelFormat::Bgra8);
        assert_eq!(metadata.source_file, "slide.tiff");

        let pyramid = metadata.into_pyramid().unwrap();
        assert_eq!(pyramid.layer_count(), 2);
        assert_eq!(pyramid.tile_count(), 257);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let temp = TempDir::new().unwrap();
        let err = SlideMetadata::load(temp.path()).unwrap_err();
        assert!(matches!(err, SlideError::Io(_)));
    }

    #[test]
    fn test_malformed_json_is_parse_error() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("metadata.json"), "{not json").unwrap();
        let err = SlideMetadata::load(temp.path()).unwrap_err();
        assert!(matches!(err, SlideError::Json(_)));
    }

    #[test]
    fn test_defaulted_fields() {
        // A slide smaller than one tile: every layer field may be omitted.
        let temp = TempDir::new().unwrap();
        let json = r#"{"extent": {"width": 200, "height": 200, "layers": [{}]}}"#;
        fs::write(temp.path().join("metadata.json"), json).unwrap();

        let metadata = SlideMetadata::load(temp.path()).unwrap();
        assert_eq!(metadata.format, PixelFormat::Rgb8);
        let pyramid = metadata.into_pyramid().unwrap();
        assert_eq!(pyramid.tile_count(), 1);
    }

    #[test]
    fn test_inconsistent_geometry_is_format_error() {
        let temp = TempDir::new().unwrap();
        let json = r#"{
            "extent": {
                "width": 4096,
                "height": 4096,
                "layers": [{"x_tiles": 3, "y_tiles": 3, "scale": 1.0, "downsample": 1.0}]
            }
        }"#;
        fs::write(temp.path().join("metadata.json"), json).unwrap();

        let err = SlideMetadata::load(temp.path())
            .unwrap()
            .into_pyramid()
            .unwrap_err();
        assert!(matches!(err, SlideError::InvalidFormat(_)));
    }
}
