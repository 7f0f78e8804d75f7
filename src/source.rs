// src/source.rs
//
// I/O: the Source enum, format sniffing, and metadata extraction
// (ICC profile, EXIF orientation).

use crate::error::{CasabaError, Result};
use crate::geometry::Orientation;
use crate::ops::Format;
use img_parts::{jpeg::Jpeg, png::Png, webp::WebP, ImageEXIF, ImageICC};
use memmap2::Mmap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Image source - supports in-memory data, memory-mapped files, and file
/// paths (lazy loading).
#[derive(Clone, Debug)]
pub enum Source {
    /// In-memory image data
    Memory(Arc<Vec<u8>>),
    /// Memory-mapped file (zero-copy access)
    Mapped(Arc<Mmap>),
    /// File path; data is read only when needed
    Path(PathBuf),
}

impl Source {
    pub fn from_bytes(data: Vec<u8>) -> Self {
        Source::Memory(Arc::new(data))
    }

    /// Memory-map a file. Falls back on nothing; callers that want lazy
    /// reads should construct `Source::Path` directly.
    pub fn map_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)
            .map_err(|e| CasabaError::source_io(path.to_string_lossy().to_string(), e))?;
        // Safety: the map is read-only and the file is not mutated by us.
        let mmap = unsafe { Mmap::map(&file) }
            .map_err(|e| CasabaError::source_io(path.to_string_lossy().to_string(), e))?;
        Ok(Source::Mapped(Arc::new(mmap)))
    }

    /// Load the actual bytes from the source.
    /// Prefer `as_bytes()` for zero-copy access when possible.
    pub fn load(&self) -> Result<Arc<Vec<u8>>> {
        match self {
            Source::Memory(data) => Ok(data.clone()),
            Source::Mapped(mmap) => Ok(Arc::new(mmap.as_ref().to_vec())),
            Source::Path(path) => {
                let data = std::fs::read(path)
                    .map_err(|e| CasabaError::source_io(path.to_string_lossy().to_string(), e))?;
                Ok(Arc::new(data))
            }
        }
    }

    /// Get path if this is a Path source.
    pub fn as_path(&self) -> Option<&PathBuf> {
        match self {
            Source::Path(p) => Some(p),
            Source::Memory(_) | Source::Mapped(_) => None,
        }
    }

    /// Get the bytes directly; None for Path sources, which must be loaded.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Source::Memory(data) => Some(data.as_slice()),
            Source::Mapped(mmap) => Some(mmap.as_ref()),
            Source::Path(_) => None,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Source::Memory(data) => data.len(),
            Source::Mapped(mmap) => mmap.len(),
            Source::Path(_) => 0, // Unknown until loaded
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0 && self.as_path().is_none()
    }

    /// Run `f` with a real filesystem path for this source, spilling
    /// in-memory data to a temp file first. `suffix` names the spill file's
    /// extension for tools that identify inputs by it (the opj tools do).
    /// The temp file is removed when the guard drops, even if `f` fails;
    /// existing Path sources are passed through untouched.
    pub fn with_path<T>(&self, suffix: &str, f: impl FnOnce(&Path) -> Result<T>) -> Result<T> {
        match self {
            Source::Path(path) => f(path),
            _ => {
                let bytes = self.load()?;
                let mut tmp = tempfile::Builder::new()
                    .suffix(suffix)
                    .tempfile()
                    .map_err(|e| CasabaError::source_io("tempfile", e))?;
                tmp.write_all(&bytes)
                    .map_err(|e| CasabaError::source_io("tempfile", e))?;
                f(tmp.path())
            }
        }
    }

    /// Sniff the format from magic bytes, loading Path sources if needed.
    pub fn format(&self) -> Result<Format> {
        let detected = match self.as_bytes() {
            Some(bytes) => detect_format(bytes),
            None => detect_format(&self.load()?),
        };
        detected.ok_or_else(|| CasabaError::unsupported_source_format("unrecognized magic bytes"))
    }
}

/// Identify a raster format from its leading magic bytes.
pub fn detect_format(data: &[u8]) -> Option<Format> {
    if data.len() < 12 {
        return None;
    }
    if data[0] == 0xFF && data[1] == 0xD8 {
        return Some(Format::Jpg);
    }
    if data.starts_with(&[0x89, 0x50, 0x4E, 0x47]) {
        return Some(Format::Png);
    }
    if data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a") {
        return Some(Format::Gif);
    }
    if data.starts_with(b"BM") {
        return Some(Format::Bmp);
    }
    if data.starts_with(b"II\x2A\x00") || data.starts_with(b"MM\x00\x2A") {
        return Some(Format::Tif);
    }
    if data.starts_with(b"RIFF") && &data[8..12] == b"WEBP" {
        return Some(Format::Webp);
    }
    // JP2 container: 12-byte signature box. Raw J2K codestream: SOC marker.
    if data.starts_with(&[0x00, 0x00, 0x00, 0x0C, 0x6A, 0x50, 0x20, 0x20, 0x0D, 0x0A, 0x87, 0x0A])
        || data.starts_with(&[0xFF, 0x4F, 0xFF, 0x51])
    {
        return Some(Format::Jp2);
    }
    None
}

/// Read the EXIF Orientation tag, folded onto quarter turns.
/// Absent or malformed EXIF means "no correction".
pub fn read_orientation(data: &[u8]) -> Orientation {
    let mut cursor = std::io::Cursor::new(data);
    let reader = match exif::Reader::new().read_from_container(&mut cursor) {
        Ok(reader) => reader,
        Err(_) => return Orientation::Rotate0,
    };
    reader
        .get_field(exif::Tag::Orientation, exif::In::PRIMARY)
        .and_then(|field| field.value.get_uint(0))
        .map(|v| Orientation::from_exif(v as u16))
        .unwrap_or_default()
}

/// Extract an ICC profile from image data.
/// Supports JPEG (APP2 marker), PNG (iCCP chunk), and WebP (ICCP chunk).
pub fn extract_icc_profile(data: &[u8]) -> Option<Vec<u8>> {
    let icc = match detect_format(data)? {
        Format::Jpg => Jpeg::from_bytes(data.to_vec().into())
            .ok()?
            .icc_profile()
            .map(|icc| icc.to_vec()),
        Format::Png => Png::from_bytes(data.to_vec().into())
            .ok()?
            .icc_profile()
            .map(|icc| icc.to_vec()),
        Format::Webp => WebP::from_bytes(data.to_vec().into())
            .ok()?
            .icc_profile()
            .map(|icc| icc.to_vec()),
        _ => None,
    }?;
    if validate_icc_profile(&icc) {
        Some(icc)
    } else {
        None
    }
}

/// Extract the raw EXIF segment from a JPEG. Copied verbatim on
/// re-embedding, never re-interpreted.
pub fn extract_exif(data: &[u8]) -> Option<Vec<u8>> {
    if detect_format(data)? != Format::Jpg {
        return None;
    }
    Jpeg::from_bytes(data.to_vec().into())
        .ok()?
        .exif()
        .map(|exif| exif.to_vec())
}

/// Sanity-check the 128-byte ICC header before trusting a profile.
pub(crate) fn validate_icc_profile(icc: &[u8]) -> bool {
    if icc.len() < 128 {
        return false;
    }
    let declared = u32::from_be_bytes([icc[0], icc[1], icc[2], icc[3]]) as usize;
    if declared != icc.len() {
        return false;
    }
    // Major version is 2, 4 or 5 in the wild.
    if icc[8] > 10 {
        return false;
    }
    // Class, color space and PCS signatures are ASCII fourccs.
    icc[12..24]
        .iter()
        .all(|&b| b == 0 || (32..=126).contains(&b))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_png() -> Vec<u8> {
        let img = image::DynamicImage::ImageRgb8(image::RgbImage::from_pixel(
            4,
            4,
            image::Rgb([10, 20, 30]),
        ));
        let mut buf = Vec::new();
        img.write_to(
            &mut std::io::Cursor::new(&mut buf),
            image::ImageFormat::Png,
        )
        .unwrap();
        buf
    }

    #[test]
    fn detects_formats_from_magic_bytes() {
        assert_eq!(detect_format(&minimal_png()), Some(Format::Png));
        assert_eq!(
            detect_format(&[0xFF, 0xD8, 0xFF, 0xE0, 0, 0, 0, 0, 0, 0, 0, 0]),
            Some(Format::Jpg)
        );
        assert_eq!(detect_format(b"GIF89a\x01\x00\x01\x00\x00\x00"), Some(Format::Gif));
        assert_eq!(
            detect_format(b"II\x2A\x00\x08\x00\x00\x00\x00\x00\x00\x00"),
            Some(Format::Tif)
        );
        assert_eq!(
            detect_format(b"RIFF\x00\x00\x00\x00WEBPVP8 "),
            Some(Format::Webp)
        );
        assert_eq!(
            detect_format(&[
                0x00, 0x00, 0x00, 0x0C, 0x6A, 0x50, 0x20, 0x20, 0x0D, 0x0A, 0x87, 0x0A
            ]),
            Some(Format::Jp2)
        );
        assert_eq!(detect_format(b"not an image"), None);
        assert_eq!(detect_format(&[]), None);
    }

    #[test]
    fn memory_source_round_trips() {
        let source = Source::from_bytes(vec![1, 2, 3]);
        assert_eq!(source.as_bytes(), Some(&[1u8, 2, 3][..]));
        assert_eq!(source.len(), 3);
        assert_eq!(*source.load().unwrap(), vec![1, 2, 3]);
        assert!(source.as_path().is_none());
    }

    #[test]
    fn path_source_loads_lazily() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(&minimal_png()).unwrap();
        let source = Source::Path(tmp.path().to_path_buf());
        assert!(source.as_bytes().is_none());
        assert_eq!(source.format().unwrap(), Format::Png);
    }

    #[test]
    fn mapped_source_is_zero_copy() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        let png = minimal_png();
        tmp.write_all(&png).unwrap();
        let source = Source::map_file(tmp.path()).unwrap();
        assert_eq!(source.as_bytes(), Some(png.as_slice()));
        assert_eq!(source.format().unwrap(), Format::Png);
    }

    #[test]
    fn with_path_spills_memory_sources_with_suffix() {
        let png = minimal_png();
        let source = Source::from_bytes(png.clone());
        let read_back = source
            .with_path(".png", |path| {
                assert_eq!(path.extension().and_then(|e| e.to_str()), Some("png"));
                Ok(std::fs::read(path)
                    .map_err(|e| CasabaError::source_io("read back", e))?)
            })
            .unwrap();
        assert_eq!(read_back, png);
    }

    #[test]
    fn missing_file_surfaces_source_io() {
        let err = Source::map_file("/nonexistent/image.jp2").unwrap_err();
        assert!(matches!(err, CasabaError::SourceIo { .. }));
    }

    #[test]
    fn orientation_defaults_without_exif() {
        assert_eq!(read_orientation(&minimal_png()), Orientation::Rotate0);
        assert_eq!(read_orientation(b"garbage"), Orientation::Rotate0);
    }

    mod icc_tests {
        use super::*;

        fn minimal_srgb_icc() -> Vec<u8> {
            let mut data = vec![0u8; 128];
            data[0..4].copy_from_slice(&128u32.to_be_bytes());
            data[4..8].copy_from_slice(b"ADBE");
            data[8] = 2;
            data[12..16].copy_from_slice(b"mntr");
            data[16..20].copy_from_slice(b"RGB ");
            data[20..24].copy_from_slice(b"XYZ ");
            data
        }

        #[test]
        fn validates_minimal_profile() {
            assert!(validate_icc_profile(&minimal_srgb_icc()));
        }

        #[test]
        fn rejects_truncated_profile() {
            let icc = minimal_srgb_icc();
            assert!(!validate_icc_profile(&icc[..64]));
            assert!(!validate_icc_profile(&[]));
        }

        #[test]
        fn rejects_size_mismatch() {
            let mut icc = minimal_srgb_icc();
            icc[3] = 0xFF;
            assert!(!validate_icc_profile(&icc));
        }

        #[test]
        fn rejects_absurd_version() {
            let mut icc = minimal_srgb_icc();
            icc[8] = 42;
            assert!(!validate_icc_profile(&icc));
        }

        #[test]
        fn extraction_returns_none_without_profile() {
            assert!(extract_icc_profile(&minimal_png()).is_none());
            assert!(extract_icc_profile(b"not an image").is_none());
            assert!(extract_icc_profile(&[]).is_none());
        }
    }
}
