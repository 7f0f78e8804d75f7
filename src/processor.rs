// src/processor.rs
//
// The processing backends. This file is a facade over the implementations
// in processor/: the trait every backend satisfies, the shared limits, and
// re-exports of the three backends.

use crate::error::Result;
use crate::geometry::SourceGeometry;
use crate::info::compliance::{ProcessorFeature, Quality};
use crate::ops::{Format, OperationList};
use crate::source::Source;
use std::collections::HashSet;
use std::io::Write;

// =============================================================================
// SECURITY LIMITS
// =============================================================================

/// Maximum allowed image dimension (width or height).
/// Sources larger than 32768x32768 are rejected to prevent decompression
/// bombs. Same limit used by libvips/sharp.
pub const MAX_DIMENSION: u32 = 32768;

/// Maximum allowed total pixels (width * height).
/// 100 megapixels = 400MB uncompressed RGBA. Beyond this is likely malicious.
pub const MAX_PIXELS: u64 = 100_000_000;

// =============================================================================
// MODULE DECOMPOSITION
// =============================================================================

mod magick;
mod native;
mod openjpeg;
mod shell;

pub use magick::MagickProcessor;
pub use native::NativeProcessor;
pub use openjpeg::OpenJpegProcessor;

/// A processing backend: probes source geometry and renders derivatives.
///
/// Implementations are stateless apart from configuration and per-process
/// capability caches, so one instance serves concurrent requests.
pub trait Processor {
    /// Output formats this backend can produce for the given source format.
    /// Empty means the source format itself is unsupported.
    fn output_formats(&self, source_format: Format) -> HashSet<Format>;

    /// Probe the source for its geometry without decoding pixel data
    /// (subprocess backends shell out to a metadata-only tool).
    fn describe(&self, source: &Source) -> Result<SourceGeometry>;

    /// Apply the operation list to the source and write the encoded result
    /// to `sink`. `geometry` comes from a prior `describe` call.
    fn render(
        &self,
        source: &Source,
        ops: &OperationList,
        geometry: &SourceGeometry,
        sink: &mut dyn Write,
    ) -> Result<()>;

    /// Protocol features this backend supports, for compliance computation.
    fn supported_features(&self) -> HashSet<ProcessorFeature>;

    /// Quality renderings this backend supports.
    fn supported_qualities(&self) -> HashSet<Quality>;
}

/// Reject sources whose claimed dimensions are implausible before decoding.
pub(crate) fn check_dimensions(width: u32, height: u32) -> Result<()> {
    use crate::error::CasabaError;
    if width > MAX_DIMENSION || height > MAX_DIMENSION {
        return Err(CasabaError::invalid_argument(
            "dimensions",
            format!("{width}x{height}"),
            format!("a side exceeds maximum of {MAX_DIMENSION}"),
        ));
    }
    let pixels = width as u64 * height as u64;
    if pixels > MAX_PIXELS {
        return Err(CasabaError::invalid_argument(
            "dimensions",
            format!("{width}x{height}"),
            format!("pixel count {pixels} exceeds max of {MAX_PIXELS}"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dimension_limits_reject_bombs() {
        assert!(check_dimensions(1920, 1080).is_ok());
        assert!(check_dimensions(10000, 10000).is_ok());
        assert!(check_dimensions(32769, 1).is_err());
        assert!(check_dimensions(1, 32769).is_err());
        assert!(check_dimensions(10001, 10000).is_err());
    }

    #[test]
    fn dimension_limit_errors_are_recoverable() {
        let err = check_dimensions(40000, 40000).unwrap_err();
        assert!(err.is_recoverable());
    }
}
