// src/config.rs
//
// Processing configuration. Loading and layering belong to the caller;
// this crate only consumes an already-populated struct.

use std::path::PathBuf;

/// Configuration consumed by the processing pipeline and info generator.
///
/// Every field has a sensible default, so callers can start from
/// `ProcessorConfig::default()` and override what they need.
#[derive(Clone, Debug)]
pub struct ProcessorConfig {
    /// Directory searched for backend binaries (`gm`, `opj_decompress`,
    /// `opj_dump`). Empty means "use the search path of the environment".
    pub path_to_binaries: Option<PathBuf>,

    /// Apply a linear contrast stretch before any other operation.
    /// Normalization happens before cropping to keep the intensity of
    /// cropped regions relative to the full image.
    pub normalize: bool,

    /// Unsharp-mask amount appended after all requested operations.
    /// Zero disables sharpening.
    pub sharpen: f64,

    /// Background fill for rotation corners when the output format has no
    /// alpha channel. Any color string the backend understands; the native
    /// backend parses `#rrggbb` and a few named colors.
    pub background_color: String,

    /// Ceiling on the reduction factor a fast decode path may choose.
    pub max_reduction_factor: u32,

    /// Minimum tile dimension advertised in the info document.
    pub min_tile_size: u32,

    /// Minimum dimension for entries in the info document's size ladder.
    pub min_info_size: u32,

    /// Maximum pixel area advertised as `maxArea`. Zero means unlimited
    /// and omits the key.
    pub max_area: u64,

    /// JPEG encode quality (0-100).
    pub jpeg_quality: u8,

    /// WebP encode quality (0-100).
    pub webp_quality: u8,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            path_to_binaries: None,
            normalize: false,
            sharpen: 0.0,
            background_color: "black".to_string(),
            max_reduction_factor: 5,
            min_tile_size: 1024,
            min_info_size: 64,
            max_area: 0,
            jpeg_quality: 80,
            webp_quality: 80,
        }
    }
}

impl ProcessorConfig {
    /// Resolve the path of a backend binary against `path_to_binaries`.
    pub fn binary_path(&self, name: &str) -> PathBuf {
        match &self.path_to_binaries {
            Some(dir) if !dir.as_os_str().is_empty() => dir.join(name),
            _ => PathBuf::from(name),
        }
    }
}
