// src/processor/magick.rs
//
// GraphicsMagick backend: wraps the `gm` binary. Geometry probes go through
// `gm identify -ping`; rendering synthesizes a single `gm convert` command
// with stdin/stdout piped.

use crate::config::ProcessorConfig;
use crate::error::{CasabaError, Result};
use crate::geometry::{Dimensions, Orientation, SourceGeometry};
use crate::info::compliance::{ProcessorFeature, Quality};
use crate::ops::{ColorReduce, Format, Operation, OperationList, Transpose};
use crate::processor::{check_dimensions, shell, Processor};
use crate::source::{read_orientation, Source};
use once_cell::sync::OnceCell;
use std::collections::HashSet;
use std::io::Write;
use std::process::Command;
use tracing::debug;

const BACKEND: &str = "gm";

/// Formats the `gm version` capability banner can toggle. Everything else
/// (BMP, GIF) is built in.
const BANNER_FORMATS: [(&str, Format); 5] = [
    ("JPEG-2000", Format::Jp2),
    ("JPEG", Format::Jpg),
    ("PNG", Format::Png),
    ("TIFF", Format::Tif),
    ("WebP", Format::Webp),
];

// Delegate availability never changes within a process; probe the banner
// once under concurrent first access.
static DELEGATE_FORMATS: OnceCell<HashSet<Format>> = OnceCell::new();

#[derive(Clone, Debug)]
pub struct MagickProcessor {
    config: ProcessorConfig,
}

impl MagickProcessor {
    pub fn new(config: ProcessorConfig) -> Self {
        Self { config }
    }

    fn gm_command(&self) -> Command {
        Command::new(self.config.binary_path("gm"))
    }

    /// Formats the installed gm build can read and write, probed from the
    /// `gm version` banner on first use.
    fn delegate_formats(&self) -> &'static HashSet<Format> {
        DELEGATE_FORMATS.get_or_init(|| {
            let mut cmd = self.gm_command();
            cmd.arg("version");
            match shell::run(cmd, None, BACKEND) {
                Ok(out) => {
                    let banner = String::from_utf8_lossy(&out.stdout);
                    parse_version_banner(&banner)
                }
                Err(e) => {
                    debug!(error = %e, "gm version probe failed; assuming no delegates");
                    baseline_formats()
                }
            }
        })
    }
}

fn baseline_formats() -> HashSet<Format> {
    [Format::Bmp, Format::Gif].into_iter().collect()
}

/// Parse the feature-support table of `gm version`: lines of the form
/// `  JPEG  yes` toggle delegate-backed formats.
fn parse_version_banner(banner: &str) -> HashSet<Format> {
    let mut formats = baseline_formats();
    for line in banner.lines() {
        let mut tokens = line.split_whitespace();
        let (Some(name), Some(enabled)) = (tokens.next(), tokens.next()) else {
            continue;
        };
        if !enabled.eq_ignore_ascii_case("yes") {
            continue;
        }
        for (banner_name, format) in BANNER_FORMATS {
            if name.eq_ignore_ascii_case(banner_name) {
                formats.insert(format);
            }
        }
    }
    formats
}

impl Processor for MagickProcessor {
    fn output_formats(&self, source_format: Format) -> HashSet<Format> {
        let available = self.delegate_formats();
        if !available.contains(&source_format) {
            return HashSet::new();
        }
        // JP2 output is never offered; decode-only delegate.
        available
            .iter()
            .copied()
            .filter(|f| *f != Format::Jp2)
            .collect()
    }

    fn describe(&self, source: &Source) -> Result<SourceGeometry> {
        let data = source.load()?;
        let format = source.format()?;

        let mut cmd = self.gm_command();
        cmd.args(["identify", "-ping", "-format", "%w;%h", "-"]);
        let out = shell::run(cmd, Some(&data), BACKEND)?;

        let text = String::from_utf8_lossy(&out.stdout);
        let line = text.trim();
        let (w, h) = line
            .split_once(';')
            .and_then(|(w, h)| Some((w.trim().parse::<u32>().ok()?, h.trim().parse::<u32>().ok()?)))
            .ok_or_else(|| {
                CasabaError::backend_protocol_error(
                    BACKEND,
                    format!("unparseable identify output: {line:?}"),
                )
            })?;
        check_dimensions(w, h)?;

        let orientation = match format {
            Format::Jpg | Format::Tif => read_orientation(&data),
            _ => Orientation::Rotate0,
        };

        Ok(SourceGeometry::new(format, Dimensions::new(w, h)).with_orientation(orientation))
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

        let data = source.load()?;
        let mut cmd = self.gm_command();
        cmd.arg("convert");
        cmd.arg(format!("{}:-", geometry.format.extension()));
        for arg in convert_args(ops, geometry, &self.config) {
            cmd.arg(arg);
        }
        cmd.arg(format!("{}:-", ops.format().extension()));

        let out = shell::run(cmd, Some(&data), BACKEND)?;
        sink.write_all(&out.stdout)
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

/// Synthesize the `gm convert` argument list for an operation list, in
/// canonical application order.
fn convert_args(
    ops: &OperationList,
    geometry: &SourceGeometry,
    config: &ProcessorConfig,
) -> Vec<String> {
    let mut args = Vec::new();

    if geometry.orientation != Orientation::Rotate0 {
        args.push("-auto-orient".to_string());
    }
    if config.normalize {
        args.push("-normalize".to_string());
    }

    let virtual_size = geometry.virtual_size();
    for op in ops.iter() {
        match op {
            Operation::Crop(crop) if !crop.is_no_op() => {
                let rect = crop.rectangle(virtual_size);
                args.push("-crop".to_string());
                args.push(format!(
                    "{}x{}+{}+{}",
                    rect.width, rect.height, rect.x, rect.y
                ));
            }
            Operation::Scale(scale) if !scale.is_no_op() => {
                let input = ops
                    .crop()
                    .map(|c| c.rectangle(virtual_size).size())
                    .unwrap_or(virtual_size);
                let target = scale.resolve(input);
                args.push("-resize".to_string());
                // `!` forces exact dimensions; aspect handling already
                // happened in resolve()
                args.push(format!("{}x{}!", target.width, target.height));
            }
            Operation::Transpose(Transpose::Horizontal) => args.push("-flop".to_string()),
            Operation::Transpose(Transpose::Vertical) => args.push("-flip".to_string()),
            Operation::Rotate(rotate) if !rotate.is_no_op() => {
                if !ops.format().supports_transparency() {
                    args.push("-background".to_string());
                    args.push(config.background_color.clone());
                }
                args.push("-rotate".to_string());
                args.push(format!("{}", rotate.degrees));
            }
            Operation::ColorReduce(ColorReduce::Gray) => {
                args.push("-colorspace".to_string());
                args.push("Gray".to_string());
            }
            Operation::ColorReduce(ColorReduce::Bitonal) => {
                args.push("-monochrome".to_string());
            }
            Operation::Sharpen(sharpen) if !sharpen.is_no_op() => {
                args.push("-unsharp".to_string());
                args.push(format!("0x{}", sharpen.amount));
            }
            _ => {}
        }
    }

    if config.sharpen > 0.0 {
        args.push("-unsharp".to_string());
        args.push(format!("0x{}", config.sharpen));
    }

    match ops.format() {
        Format::Jpg => {
            args.push("-quality".to_string());
            args.push(config.jpeg_quality.to_string());
        }
        Format::Webp => {
            args.push("-quality".to_string());
            args.push(config.webp_quality.to_string());
        }
        _ => {}
    }

    args.push("-depth".to_string());
    args.push("8".to_string());
    args
}
