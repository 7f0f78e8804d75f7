// src/processor/openjpeg.rs
//
// OpenJPEG backend for JP2 sources: `opj_dump` for geometry, then
// `opj_decompress` with region (-d) and reduction (-r) for a fast partial
// decode, handing a BMP intermediate to the native pipeline for the
// remaining operations and the encode.

use crate::config::ProcessorConfig;
use crate::error::{CasabaError, Result};
use crate::geometry::{Dimensions, Level, SourceGeometry};
use crate::info::compliance::{ProcessorFeature, Quality};
use crate::ops::{Format, OperationList};
use crate::processor::{check_dimensions, native, shell, Processor};
use crate::reduction::ReductionFactor;
use crate::source::Source;
use crate::writer;
use std::collections::HashSet;
use std::io::Write;
use std::path::Path;
use std::process::Command;
use tracing::debug;

const BACKEND: &str = "openjpeg";

#[derive(Clone, Debug)]
pub struct OpenJpegProcessor {
    config: ProcessorConfig,
}

impl OpenJpegProcessor {
    pub fn new(config: ProcessorConfig) -> Self {
        Self { config }
    }
}

impl Processor for OpenJpegProcessor {
    fn output_formats(&self, source_format: Format) -> HashSet<Format> {
        match source_format {
            Format::Jp2 => [
                Format::Jpg,
                Format::Png,
                Format::Webp,
                Format::Gif,
                Format::Tif,
                Format::Bmp,
            ]
            .into_iter()
            .collect(),
            _ => HashSet::new(),
        }
    }

    fn describe(&self, source: &Source) -> Result<SourceGeometry> {
        if source.format()? != Format::Jp2 {
            return Err(CasabaError::unsupported_source_format(
                "openjpeg reads JP2 only",
            ));
        }
        // The opj tools identify files purely by extension.
        source.with_path(".jp2", |path| {
            let mut cmd = Command::new(self.config.binary_path("opj_dump"));
            cmd.arg("-i").arg(path);
            let out = shell::run(cmd, None, BACKEND)?;
            let text = String::from_utf8_lossy(&out.stdout);
            parse_dump(&text)
        })
    }

    fn render(
        &self,
        source: &Source,
        ops: &OperationList,
        geometry: &SourceGeometry,
        sink: &mut dyn Write,
    ) -> Result<()> {
        if !self.output_formats(geometry.format).contains(&ops.format()) {
            return Err(CasabaError::unsupported_output_format(
                ops.format().extension(),
            ));
        }

        let virtual_size = geometry.virtual_size();
        let rect = ops
            .crop()
            .map(|c| c.rectangle(virtual_size))
            .unwrap_or_else(|| crate::geometry::Region::new(0, 0, virtual_size.width, virtual_size.height));

        // The reduction the tool may take while still over-delivering for
        // the requested scale, measured against the cropped size.
        let ratio = ops
            .scale()
            .map(|s| s.ratio(rect.size()))
            .unwrap_or(1.0);
        let reduction = ReductionFactor::for_scale(ratio, self.config.max_reduction_factor);
        debug!(factor = reduction.factor, "reduction for decode");

        let bmp =
            source.with_path(".jp2", |path| self.decompress(path, &rect, virtual_size, reduction))?;

        let img = native::decode(&bmp, Format::Bmp)?;
        check_dimensions(img.width(), img.height())?;

        // Scale must resolve against the full-resolution crop, not the
        // reduced raster the tool returned.
        let scale_target = ops.scale().map(|s| s.resolve(rect.size()));
        let img = native::finish_pipeline(img, ops, &self.config, scale_target)?;
        let encoded = writer::encode(&img, ops.format(), &self.config, None)?;
        sink.write_all(&encoded)
            .map_err(|e| CasabaError::source_io("sink", e))?;
        Ok(())
    }

    fn supported_features(&self) -> HashSet<ProcessorFeature> {
        ProcessorFeature::all().collect()
    }

    fn supported_qualities(&self) -> HashSet<Quality> {
        Quality::all().collect()
    }
}

impl OpenJpegProcessor {
    /// Run opj_decompress and return the BMP intermediate bytes. Prefers
    /// streaming through the process-lifetime stdout alias; falls back to a
    /// per-call temp file when the alias is unavailable.
    fn decompress(
        &self,
        input: &Path,
        rect: &crate::geometry::Region,
        full: Dimensions,
        reduction: ReductionFactor,
    ) -> Result<Vec<u8>> {
        let mut cmd = Command::new(self.config.binary_path("opj_decompress"));
        cmd.arg("-i").arg(input);

        if !rect.is_full(full) {
            cmd.arg("-d").arg(format!(
                "{},{},{},{}",
                rect.x,
                rect.y,
                rect.x + rect.width,
                rect.y + rect.height
            ));
        }
        if !reduction.is_none() {
            cmd.arg("-r").arg(reduction.factor.to_string());
        }

        if let Some(link) = stdout_link::path() {
            cmd.arg("-o").arg(link);
            let out = shell::run(cmd, None, BACKEND)?;
            return Ok(out.stdout);
        }

        // Fallback: a real output file the tool can name.
        let out_file = tempfile::Builder::new()
            .suffix(".bmp")
            .tempfile()
            .map_err(|e| CasabaError::source_io("tempfile", e))?;
        cmd.arg("-o").arg(out_file.path());
        shell::run(cmd, None, BACKEND)?;
        std::fs::read(out_file.path())
            .map_err(|e| CasabaError::source_io(out_file.path().to_string_lossy().to_string(), e))
    }
}

/// Parse opj_dump output: `x1=`, `y1=` give the image grid extent, `tdx=`,
/// `tdy=` the native tile size. An `[ERROR]` banner anywhere means the dump
/// is unusable regardless of exit status.
fn parse_dump(text: &str) -> Result<SourceGeometry> {
    if text.contains("[ERROR]") {
        return Err(CasabaError::backend_protocol_error(
            BACKEND,
            "opj_dump reported an error banner",
        ));
    }

    let mut x1 = None;
    let mut y1 = None;
    let mut tdx = None;
    let mut tdy = None;
    for line in text.lines() {
        for field in line.split(',') {
            let field = field.trim();
            if let Some((key, value)) = field.split_once('=') {
                let value = value.trim().parse::<u32>().ok();
                match key.trim() {
                    "x1" => x1 = x1.or(value),
                    "y1" => y1 = y1.or(value),
                    "tdx" => tdx = tdx.or(value),
                    "tdy" => tdy = tdy.or(value),
                    _ => {}
                }
            }
        }
    }

    let (width, height) = match (x1, y1) {
        (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
        _ => {
            return Err(CasabaError::backend_protocol_error(
                BACKEND,
                "missing x1=/y1= image extent",
            ))
        }
    };
    check_dimensions(width, height)?;
    let size = Dimensions::new(width, height);

    let mut geometry = SourceGeometry::new(Format::Jp2, size);
    if let (Some(tw), Some(th)) = (tdx, tdy) {
        if tw > 0 && th > 0 && (tw < width || th < height) {
            geometry.levels = vec![Level::tiled(size, Dimensions::new(tw, th))];
        }
    }
    Ok(geometry)
}

/// Process-lifetime alias for /dev/stdout with a .bmp extension, so
/// opj_decompress streams onto its stdout pipe instead of a scratch file.
/// Created at most once and removed at process exit.
#[cfg(unix)]
mod stdout_link {
    use once_cell::sync::OnceCell;
    use std::path::{Path, PathBuf};

    static LINK: OnceCell<Option<PathBuf>> = OnceCell::new();

    extern "C" fn cleanup() {
        if let Some(Some(path)) = LINK.get() {
            let _ = std::fs::remove_file(path);
            if let Some(dir) = path.parent() {
                let _ = std::fs::remove_dir(dir);
            }
        }
    }

    pub fn path() -> Option<&'static Path> {
        LINK.get_or_init(|| {
            let dir = std::env::temp_dir().join(format!("casaba-{}", std::process::id()));
            if std::fs::create_dir_all(&dir).is_err() {
                return None;
            }
            let link = dir.join("stdout.bmp");
            match std::os::unix::fs::symlink("/dev/stdout", &link) {
                Ok(()) => {
                    // Best effort; leaking the link on abnormal exit is
                    // harmless (pid-scoped temp dir).
                    unsafe {
                        libc::atexit(cleanup);
                    }
                    Some(link)
                }
                Err(_) => None,
            }
        })
        .as_deref()
    }
}

#[cfg(not(unix))]
mod stdout_link {
    use std::path::Path;

    pub fn path() -> Option<&'static Path> {
        None
    }
}
