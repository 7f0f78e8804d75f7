// src/ops.rs
//
// The operation model: pure data describing a derivative request.
// Resolution against a concrete source size happens in pure functions;
// the expensive work happens in the backends.

use crate::geometry::{Dimensions, Region};
use crate::reduction::ReductionFactor;

/// Raster formats this crate knows how to route.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Format {
    Bmp,
    Gif,
    Jp2,
    Jpg,
    Png,
    Tif,
    Webp,
}

impl Format {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "bmp" => Some(Self::Bmp),
            "gif" => Some(Self::Gif),
            "jp2" | "j2k" | "jpx" => Some(Self::Jp2),
            "jpg" | "jpeg" => Some(Self::Jpg),
            "png" => Some(Self::Png),
            "tif" | "tiff" => Some(Self::Tif),
            "webp" => Some(Self::Webp),
            _ => None,
        }
    }

    /// Preferred file extension, also used for `gm` format prefixes.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Bmp => "bmp",
            Self::Gif => "gif",
            Self::Jp2 => "jp2",
            Self::Jpg => "jpg",
            Self::Png => "png",
            Self::Tif => "tif",
            Self::Webp => "webp",
        }
    }

    pub fn media_type(&self) -> &'static str {
        match self {
            Self::Bmp => "image/bmp",
            Self::Gif => "image/gif",
            Self::Jp2 => "image/jp2",
            Self::Jpg => "image/jpeg",
            Self::Png => "image/png",
            Self::Tif => "image/tiff",
            Self::Webp => "image/webp",
        }
    }

    /// Whether the container can carry an alpha channel. Decides between
    /// transparent and configured background fill for rotation corners.
    pub fn supports_transparency(&self) -> bool {
        matches!(self, Self::Gif | Self::Png | Self::Tif | Self::Webp)
    }
}

/// Crop coordinate interpretation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CropUnit {
    /// Absolute pixels relative to the original full size.
    Pixels,
    /// Fractions of the original full size, normalized to [0,1].
    Percent,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CropShape {
    Rectangle,
    /// Centered square of side min(width, height); ignores x/y/w/h.
    Square,
}

/// A crop against the original full image.
///
/// Percent coordinates are always relative to the full source, never to a
/// previously scaled intermediate; that is why crop precedes scale in the
/// canonical order.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Crop {
    pub unit: CropUnit,
    pub shape: CropShape,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Crop {
    pub fn pixels(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            unit: CropUnit::Pixels,
            shape: CropShape::Rectangle,
            x,
            y,
            width,
            height,
        }
    }

    /// Percent crop with coordinates normalized to [0,1].
    pub fn percent(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            unit: CropUnit::Percent,
            shape: CropShape::Rectangle,
            x,
            y,
            width,
            height,
        }
    }

    /// Centered square of side min(W, H).
    pub fn square() -> Self {
        Self {
            unit: CropUnit::Pixels,
            shape: CropShape::Square,
            x: 0.0,
            y: 0.0,
            width: 0.0,
            height: 0.0,
        }
    }

    /// The whole image; a no-op.
    pub fn full() -> Self {
        Self::percent(0.0, 0.0, 1.0, 1.0)
    }

    pub fn is_no_op(&self) -> bool {
        self.shape == CropShape::Rectangle
            && self.unit == CropUnit::Percent
            && self.x <= 0.0
            && self.y <= 0.0
            && self.width >= 1.0
            && self.height >= 1.0
    }

    /// Resolve against the full source size. Pure; rounds to nearest and
    /// clamps so the region never exceeds the source bounds (silently
    /// shrinks, never errors).
    pub fn rectangle(&self, full: Dimensions) -> Region {
        let (x, y, width, height) = match self.shape {
            CropShape::Square => {
                let side = full.shortest_side();
                (
                    (full.width - side) / 2,
                    (full.height - side) / 2,
                    side,
                    side,
                )
            }
            CropShape::Rectangle => {
                let (x, y, w, h) = match self.unit {
                    CropUnit::Percent => (
                        (self.x * full.width as f64).round(),
                        (self.y * full.height as f64).round(),
                        (self.width * full.width as f64).round(),
                        (self.height * full.height as f64).round(),
                    ),
                    CropUnit::Pixels => (
                        self.x.round(),
                        self.y.round(),
                        self.width.round(),
                        self.height.round(),
                    ),
                };
                (
                    (x.max(0.0) as u32).min(full.width.saturating_sub(1)),
                    (y.max(0.0) as u32).min(full.height.saturating_sub(1)),
                    w.max(0.0) as u32,
                    h.max(0.0) as u32,
                )
            }
        };
        // Never request more than is available past the origin.
        let width = width.min(full.width - x).max(1);
        let height = height.min(full.height - y).max(1);
        Region::new(x, y, width, height)
    }

    /// Resolve against the full size, then map into a raster that a fast
    /// decode path has already reduced by `reduction`.
    pub fn rectangle_reduced(&self, full: Dimensions, reduction: ReductionFactor) -> Region {
        let rect = self.rectangle(full);
        if reduction.is_none() {
            return rect;
        }
        let scale = reduction.scale();
        let reduced = Dimensions::new(
            ((full.width as f64 * scale).round() as u32).max(1),
            ((full.height as f64 * scale).round() as u32).max(1),
        );
        let x = ((rect.x as f64 * scale).round() as u32).min(reduced.width.saturating_sub(1));
        let y = ((rect.y as f64 * scale).round() as u32).min(reduced.height.saturating_sub(1));
        let width = ((rect.width as f64 * scale).round() as u32)
            .min(reduced.width - x)
            .max(1);
        let height = ((rect.height as f64 * scale).round() as u32)
            .min(reduced.height - y)
            .max(1);
        Region::new(x, y, width, height)
    }
}

/// Resampling filter selector, mapped by each backend onto whatever its
/// engine natively supports.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Filter {
    Box,
    Bilinear,
    Bicubic,
    Mitchell,
    #[default]
    Lanczos3,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ScaleMode {
    #[default]
    Full,
    AspectFitWidth,
    AspectFitHeight,
    AspectFitInside,
    NonAspectFill,
}

/// Smallest dimension any scale may resolve to. Protects backends against
/// degenerate percent requests on large sources.
const MIN_SCALED_DIMENSION: u32 = 3;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Scale {
    pub mode: ScaleMode,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub percent: Option<f64>,
    pub filter: Filter,
}

impl Scale {
    pub fn full() -> Self {
        Self::default()
    }

    pub fn percent(percent: f64) -> Self {
        Self {
            mode: ScaleMode::AspectFitInside,
            percent: Some(percent),
            ..Self::default()
        }
    }

    pub fn fit_width(width: u32) -> Self {
        Self {
            mode: ScaleMode::AspectFitWidth,
            width: Some(width),
            ..Self::default()
        }
    }

    pub fn fit_height(height: u32) -> Self {
        Self {
            mode: ScaleMode::AspectFitHeight,
            height: Some(height),
            ..Self::default()
        }
    }

    pub fn fit_inside(width: u32, height: u32) -> Self {
        Self {
            mode: ScaleMode::AspectFitInside,
            width: Some(width),
            height: Some(height),
            ..Self::default()
        }
    }

    pub fn fill(width: u32, height: u32) -> Self {
        Self {
            mode: ScaleMode::NonAspectFill,
            width: Some(width),
            height: Some(height),
            ..Self::default()
        }
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }

    pub fn is_no_op(&self) -> bool {
        match self.mode {
            ScaleMode::Full => true,
            _ => self.percent.is_some_and(|p| p == 1.0),
        }
    }

    /// The per-axis scale ratios this operation implies for `input`.
    fn ratios(&self, input: Dimensions) -> (f64, f64) {
        if let Some(percent) = self.percent {
            return (percent, percent);
        }
        let w = input.width as f64;
        let h = input.height as f64;
        match self.mode {
            ScaleMode::Full => (1.0, 1.0),
            ScaleMode::AspectFitWidth => {
                let r = self.width.unwrap_or(input.width) as f64 / w;
                (r, r)
            }
            ScaleMode::AspectFitHeight => {
                let r = self.height.unwrap_or(input.height) as f64 / h;
                (r, r)
            }
            ScaleMode::AspectFitInside => {
                let rw = self.width.map_or(f64::INFINITY, |t| t as f64 / w);
                let rh = self.height.map_or(f64::INFINITY, |t| t as f64 / h);
                let r = rw.min(rh);
                let r = if r.is_finite() { r } else { 1.0 };
                (r, r)
            }
            ScaleMode::NonAspectFill => (
                self.width.unwrap_or(input.width) as f64 / w,
                self.height.unwrap_or(input.height) as f64 / h,
            ),
        }
    }

    /// Smaller of the two axis ratios; what a power-of-two fast path must
    /// still satisfy.
    pub fn ratio(&self, input: Dimensions) -> f64 {
        let (rw, rh) = self.ratios(input);
        rw.min(rh)
    }

    /// Resolve the target size for `input`. Pure. Aspect-fit modes preserve
    /// ratio within rounding; every axis is floored to 3 px.
    pub fn resolve(&self, input: Dimensions) -> Dimensions {
        if self.is_no_op() {
            return input;
        }
        let (rw, rh) = self.ratios(input);
        let width = (input.width as f64 * rw).round() as u32;
        let height = (input.height as f64 * rh).round() as u32;
        Dimensions::new(
            floor_axis(width, input.width),
            floor_axis(height, input.height),
        )
    }
}

fn floor_axis(value: u32, source: u32) -> u32 {
    if source >= MIN_SCALED_DIMENSION {
        value.max(MIN_SCALED_DIMENSION)
    } else {
        value.max(1)
    }
}

/// Mirror axis.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transpose {
    Horizontal,
    Vertical,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Rotate {
    pub degrees: f64,
}

impl Rotate {
    pub fn new(degrees: f64) -> Self {
        Self {
            degrees: degrees.rem_euclid(360.0),
        }
    }

    pub fn is_no_op(&self) -> bool {
        self.degrees == 0.0
    }

    /// Whether this angle is a multiple of 90 (cheap, lossless paths).
    pub fn is_quarter_turn(&self) -> bool {
        self.degrees % 90.0 == 0.0
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ColorReduce {
    #[default]
    None,
    Gray,
    Bitonal,
}

impl ColorReduce {
    pub fn is_no_op(&self) -> bool {
        matches!(self, ColorReduce::None)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Sharpen {
    pub amount: f64,
}

impl Sharpen {
    pub fn new(amount: f64) -> Self {
        Self {
            amount: amount.max(0.0),
        }
    }

    pub fn is_no_op(&self) -> bool {
        self.amount <= 0.0
    }
}

/// One entry of an operation list, in canonical order.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Operation {
    Crop(Crop),
    Scale(Scale),
    Transpose(Transpose),
    Rotate(Rotate),
    ColorReduce(ColorReduce),
    Sharpen(Sharpen),
}

impl Operation {
    pub fn is_no_op(&self) -> bool {
        match self {
            Operation::Crop(op) => op.is_no_op(),
            Operation::Scale(op) => op.is_no_op(),
            Operation::Transpose(_) => false,
            Operation::Rotate(op) => op.is_no_op(),
            Operation::ColorReduce(op) => op.is_no_op(),
            Operation::Sharpen(op) => op.is_no_op(),
        }
    }
}

/// An immutable derivative request: source identifier, target format, and
/// at most one operation per kind.
///
/// Construction is a value chain - each `with_*` consumes and returns the
/// list, so no partially-built chain is ever observable by a backend.
/// Iteration always yields the canonical application order
/// crop -> scale -> transpose -> rotate -> color-reduce -> sharpen,
/// regardless of construction order. (Normalization and the 8-bit clamp are
/// pipeline-level steps, not request operations.)
#[derive(Clone, Debug, PartialEq)]
pub struct OperationList {
    identifier: String,
    format: Format,
    preserve_metadata: bool,
    crop: Option<Crop>,
    scale: Option<Scale>,
    transpose: Option<Transpose>,
    rotate: Option<Rotate>,
    color: Option<ColorReduce>,
    sharpen: Option<Sharpen>,
}

impl OperationList {
    pub fn new(identifier: impl Into<String>, format: Format) -> Self {
        Self {
            identifier: identifier.into(),
            format,
            preserve_metadata: false,
            crop: None,
            scale: None,
            transpose: None,
            rotate: None,
            color: None,
            sharpen: None,
        }
    }

    pub fn with_crop(mut self, crop: Crop) -> Self {
        self.crop = Some(crop);
        self
    }

    pub fn with_scale(mut self, scale: Scale) -> Self {
        self.scale = Some(scale);
        self
    }

    pub fn with_transpose(mut self, transpose: Transpose) -> Self {
        self.transpose = Some(transpose);
        self
    }

    pub fn with_rotate(mut self, rotate: Rotate) -> Self {
        self.rotate = Some(rotate);
        self
    }

    pub fn with_color_reduce(mut self, color: ColorReduce) -> Self {
        self.color = Some(color);
        self
    }

    pub fn with_sharpen(mut self, sharpen: Sharpen) -> Self {
        self.sharpen = Some(sharpen);
        self
    }

    pub fn with_preserved_metadata(mut self) -> Self {
        self.preserve_metadata = true;
        self
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn format(&self) -> Format {
        self.format
    }

    pub fn preserve_metadata(&self) -> bool {
        self.preserve_metadata
    }

    pub fn crop(&self) -> Option<&Crop> {
        self.crop.as_ref()
    }

    pub fn scale(&self) -> Option<&Scale> {
        self.scale.as_ref()
    }

    pub fn rotate(&self) -> Option<&Rotate> {
        self.rotate.as_ref()
    }

    /// Operations in canonical application order, skipping absent kinds.
    pub fn iter(&self) -> impl Iterator<Item = Operation> + '_ {
        let ops = [
            self.crop.map(Operation::Crop),
            self.scale.map(Operation::Scale),
            self.transpose.map(Operation::Transpose),
            self.rotate.map(Operation::Rotate),
            self.color.map(Operation::ColorReduce),
            self.sharpen.map(Operation::Sharpen),
        ];
        ops.into_iter().flatten()
    }

    /// True when applying this list to a source of `source_format` would
    /// change nothing; callers use this for stream-through shortcuts.
    pub fn is_no_op(&self, source_format: Format) -> bool {
        self.format == source_format && self.iter().all(|op| op.is_no_op())
    }

    /// The size this request resolves to for the given full source size.
    pub fn resolved_size(&self, full: Dimensions) -> Dimensions {
        let after_crop = match &self.crop {
            Some(crop) => crop.rectangle(full).size(),
            None => full,
        };
        match &self.scale {
            Some(scale) => scale.resolve(after_crop),
            None => after_crop,
        }
    }
}
