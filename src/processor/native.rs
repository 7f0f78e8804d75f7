// src/processor/native.rs
//
// The in-process backend: codec router (mozjpeg, zune-png, libwebp, image
// crate), fast_image_resize scaling, and the canonical operation pipeline.

use crate::config::ProcessorConfig;
use crate::error::{CasabaError, Result};
use crate::geometry::{Dimensions, Orientation, SourceGeometry};
use crate::info::compliance::{ProcessorFeature, Quality};
use crate::ops::{
    ColorReduce, Filter, Format, Operation, OperationList, Rotate, Transpose,
};
use crate::processor::{check_dimensions, Processor};
use crate::source::{extract_exif, extract_icc_profile, read_orientation, Source};
use crate::writer;
use fast_image_resize::{self as fir, MulDiv, PixelType, ResizeOptions};
use image::{DynamicImage, GrayImage, ImageReader, Rgba, RgbaImage, RgbImage};
use mozjpeg::Decompress;
use std::collections::HashSet;
use std::io::{Cursor, Write};
use tracing::debug;
use webp::{BitstreamFeatures, Decoder as WebPDecoder};
use zune_core::colorspace::ColorSpace;
use zune_core::options::DecoderOptions;
use zune_png::PngDecoder;

/// In-process raster backend. Handles every source format except JP2.
#[derive(Clone, Debug)]
pub struct NativeProcessor {
    config: ProcessorConfig,
}

impl NativeProcessor {
    pub fn new(config: ProcessorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }
}

const WRITABLE_FORMATS: [Format; 6] = [
    Format::Jpg,
    Format::Png,
    Format::Webp,
    Format::Gif,
    Format::Tif,
    Format::Bmp,
];

impl Processor for NativeProcessor {
    fn output_formats(&self, source_format: Format) -> HashSet<Format> {
        match source_format {
            Format::Jp2 => HashSet::new(),
            _ => WRITABLE_FORMATS.into_iter().collect(),
        }
    }

    fn describe(&self, source: &Source) -> Result<SourceGeometry> {
        let data = source.load()?;
        let format = source.format()?;
        if format == Format::Jp2 {
            return Err(CasabaError::unsupported_source_format("jp2"));
        }

        let (width, height) = ImageReader::new(Cursor::new(data.as_slice()))
            .with_guessed_format()
            .map_err(|e| CasabaError::decode_failed(format!("format probe failed: {e}")))?
            .into_dimensions()
            .map_err(|e| CasabaError::decode_failed(format!("dimension probe failed: {e}")))?;
        check_dimensions(width, height)?;

        let orientation = match format {
            Format::Jpg | Format::Tif => read_orientation(&data),
            _ => Orientation::Rotate0,
        };

        Ok(SourceGeometry::new(format, Dimensions::new(width, height))
            .with_orientation(orientation))
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

        // Stream-through: identity request in the source's own format.
        if ops.is_no_op(geometry.format) && geometry.orientation == Orientation::Rotate0 {
            sink.write_all(&data)
                .map_err(|e| CasabaError::source_io("sink", e))?;
            return Ok(());
        }

        let icc = if ops.preserve_metadata() {
            extract_icc_profile(&data)
        } else {
            None
        };

        let img = decode(&data, geometry.format)?;
        let img = orient(img, geometry.orientation);
        let virtual_size = Dimensions::new(img.width(), img.height());

        let img = if self.config.normalize {
            normalize(img)
        } else {
            img
        };

        let img = match ops.crop() {
            Some(crop) if !crop.is_no_op() => {
                let rect = crop.rectangle(virtual_size);
                img.crop_imm(rect.x, rect.y, rect.width, rect.height)
            }
            _ => img,
        };

        let img = finish_pipeline(img, ops, &self.config, None)?;
        let mut encoded = writer::encode(&img, ops.format(), &self.config, icc.as_deref())?;

        // EXIF survives only JPEG-to-JPEG, copied verbatim.
        if ops.preserve_metadata() && ops.format() == Format::Jpg {
            if let Some(exif) = extract_exif(&data) {
                encoded = writer::embed_exif_jpeg(encoded, &exif)?;
            }
        }
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

/// Run the post-crop stages of the canonical order on an already-cropped
/// raster: scale, transpose, rotate, color reduce, sharpen, 8-bit clamp.
///
/// `scale_target` overrides the scale resolution basis. The OpenJPEG
/// backend needs this: its raster is already reduced by a power of two, so
/// a percent scale must resolve against the full-resolution crop size, not
/// against what the tool handed back.
pub(crate) fn finish_pipeline(
    mut img: DynamicImage,
    ops: &OperationList,
    config: &ProcessorConfig,
    scale_target: Option<Dimensions>,
) -> Result<DynamicImage> {
    if let Some(scale) = ops.scale() {
        let input = Dimensions::new(img.width(), img.height());
        let target = scale_target.unwrap_or_else(|| scale.resolve(input));
        if target != input {
            img = resize_to(img, target, scale.filter)?;
        }
    }

    for op in ops.iter() {
        match op {
            Operation::Transpose(t) => {
                img = match t {
                    Transpose::Horizontal => img.fliph(),
                    Transpose::Vertical => img.flipv(),
                };
            }
            Operation::Rotate(rotate) if !rotate.is_no_op() => {
                img = apply_rotate(img, &rotate, config, ops.format())?;
            }
            Operation::ColorReduce(color) => {
                img = apply_color_reduce(img, color);
            }
            Operation::Sharpen(sharpen) if !sharpen.is_no_op() => {
                img = unsharp(img, sharpen.amount);
            }
            _ => {}
        }
    }

    if config.sharpen > 0.0 {
        img = unsharp(img, config.sharpen);
    }

    // Everything downstream expects 8 bits per sample.
    let img = match img {
        DynamicImage::ImageRgb8(_)
        | DynamicImage::ImageRgba8(_)
        | DynamicImage::ImageLuma8(_)
        | DynamicImage::ImageLumaA8(_) => img,
        _ if img.color().has_alpha() => DynamicImage::ImageRgba8(img.to_rgba8()),
        _ => DynamicImage::ImageRgb8(img.to_rgb8()),
    };
    Ok(img)
}

// =============================================================================
// DECODE ROUTER
// =============================================================================

/// Decode by declared format, routing each format to its fastest codec.
pub(crate) fn decode(data: &[u8], format: Format) -> Result<DynamicImage> {
    let img = match format {
        Format::Jpg => decode_jpeg_mozjpeg(data)?,
        Format::Png => decode_png_zune(data)?,
        Format::Webp => decode_webp_libwebp(data)?,
        Format::Gif | Format::Tif | Format::Bmp => decode_with_image_crate(data)?,
        Format::Jp2 => return Err(CasabaError::unsupported_source_format("jp2")),
    };
    check_dimensions(img.width(), img.height())?;
    Ok(img)
}

/// Decode JPEG using mozjpeg (backed by libjpeg-turbo).
/// Significantly faster than the image crate's pure-Rust decoder.
pub(crate) fn decode_jpeg_mozjpeg(data: &[u8]) -> Result<DynamicImage> {
    if !data.windows(2).any(|pair| pair == [0xFF, 0xD9]) {
        return Err(CasabaError::decode_failed("mozjpeg: missing JPEG EOI marker"));
    }

    let decompress = Decompress::new_mem(data)
        .map_err(|e| CasabaError::decode_failed(format!("mozjpeg init failed: {e:?}")))?;
    let mut decompress = decompress
        .rgb()
        .map_err(|e| CasabaError::decode_failed(format!("mozjpeg rgb failed: {e:?}")))?;

    let width = decompress.width() as u32;
    let height = decompress.height() as u32;
    check_dimensions(width, height)?;

    let pixels: Vec<[u8; 3]> = decompress
        .read_scanlines()
        .map_err(|e| CasabaError::decode_failed(format!("mozjpeg scanlines failed: {e:?}")))?;
    let flat: Vec<u8> = pixels.into_iter().flatten().collect();

    RgbImage::from_raw(width, height, flat)
        .map(DynamicImage::ImageRgb8)
        .ok_or_else(|| CasabaError::decode_failed("mozjpeg: raw buffer size mismatch"))
}

/// Decode PNG using zune-png. 16-bit inputs are stripped to 8 bits.
pub(crate) fn decode_png_zune(data: &[u8]) -> Result<DynamicImage> {
    let options = DecoderOptions::default().png_set_strip_to_8bit(true);
    let mut decoder = PngDecoder::new_with_options(data, options);
    let pixels = decoder
        .decode()
        .map_err(|e| CasabaError::decode_failed(format!("png: decode failed: {e}")))?;

    let info = decoder
        .get_info()
        .ok_or_else(|| CasabaError::decode_failed("png: missing header info"))?;
    let width = info.width as u32;
    let height = info.height as u32;
    check_dimensions(width, height)?;

    let buf = match pixels {
        zune_core::result::DecodingResult::U8(v) => v,
        _ => return Err(CasabaError::decode_failed("png: unexpected non-U8 buffer")),
    };

    let colorspace = decoder
        .get_colorspace()
        .ok_or_else(|| CasabaError::decode_failed("png: missing colorspace"))?;

    match colorspace {
        ColorSpace::RGB => RgbImage::from_raw(width, height, buf)
            .map(DynamicImage::ImageRgb8)
            .ok_or_else(|| CasabaError::decode_failed("png: failed to build RGB image")),
        ColorSpace::RGBA | ColorSpace::BGRA | ColorSpace::ARGB => {
            RgbaImage::from_raw(width, height, buf)
                .map(DynamicImage::ImageRgba8)
                .ok_or_else(|| CasabaError::decode_failed("png: failed to build RGBA image"))
        }
        ColorSpace::Luma => GrayImage::from_raw(width, height, buf)
            .map(DynamicImage::ImageLuma8)
            .ok_or_else(|| CasabaError::decode_failed("png: failed to build Luma image")),
        ColorSpace::LumaA => image::GrayAlphaImage::from_raw(width, height, buf)
            .map(DynamicImage::ImageLumaA8)
            .ok_or_else(|| CasabaError::decode_failed("png: failed to build LumaA image")),
        other => Err(CasabaError::decode_failed(format!(
            "png: unsupported colorspace {other:?}"
        ))),
    }
}

/// Decode WebP using libwebp. Animated files fall back to the image crate.
pub(crate) fn decode_webp_libwebp(data: &[u8]) -> Result<DynamicImage> {
    let features = BitstreamFeatures::new(data)
        .ok_or_else(|| CasabaError::decode_failed("webp: failed to read bitstream features"))?;

    if features.has_animation() {
        return image::load_from_memory(data)
            .map_err(|e| CasabaError::decode_failed(format!("webp (animated): {e}")));
    }

    let decoder = WebPDecoder::new(data);
    let decoded = decoder
        .decode()
        .ok_or_else(|| CasabaError::decode_failed("webp: decode failed"))?;
    Ok(decoded.to_image())
}

fn decode_with_image_crate(data: &[u8]) -> Result<DynamicImage> {
    image::load_from_memory(data)
        .map_err(|e| CasabaError::decode_failed(format!("decode failed: {e}")))
}

// =============================================================================
// PIPELINE STAGES
// =============================================================================

/// Bake an embedded orientation correction into the raster so all later
/// geometry works on the virtual size.
pub(crate) fn orient(img: DynamicImage, orientation: Orientation) -> DynamicImage {
    match orientation {
        Orientation::Rotate0 => img,
        Orientation::Rotate90 => img.rotate90(),
        Orientation::Rotate180 => img.rotate180(),
        Orientation::Rotate270 => img.rotate270(),
    }
}

/// Linear contrast stretch: remap the observed sample range to the full
/// 8-bit range. Applied before cropping so region intensity stays relative
/// to the whole image.
pub(crate) fn normalize(img: DynamicImage) -> DynamicImage {
    let rgb = img.to_rgb8();
    let (mut min, mut max) = (u8::MAX, u8::MIN);
    for &sample in rgb.as_raw() {
        min = min.min(sample);
        max = max.max(sample);
    }
    if min == 0 && max == 255 || min >= max {
        return DynamicImage::ImageRgb8(rgb);
    }
    let range = (max - min) as f32;
    let mut out = rgb;
    for sample in out.iter_mut() {
        *sample = (((*sample - min) as f32 / range) * 255.0).round() as u8;
    }
    DynamicImage::ImageRgb8(out)
}

fn fir_filter(filter: Filter) -> fir::FilterType {
    match filter {
        Filter::Box => fir::FilterType::Box,
        Filter::Bilinear => fir::FilterType::Bilinear,
        Filter::Bicubic => fir::FilterType::CatmullRom,
        Filter::Mitchell => fir::FilterType::Mitchell,
        Filter::Lanczos3 => fir::FilterType::Lanczos3,
    }
}

/// Resize via fast_image_resize, premultiplying alpha where needed.
pub(crate) fn resize_to(
    img: DynamicImage,
    target: Dimensions,
    filter: Filter,
) -> Result<DynamicImage> {
    if target.width == 0 || target.height == 0 {
        return Err(CasabaError::invalid_argument(
            "scale",
            format!("{}x{}", target.width, target.height),
            "resolved dimensions must be positive",
        ));
    }

    // RGB and RGBA buffers hand their storage to fir directly; anything
    // else converts to RGBA first.
    let (pixel_type, src_width, src_height, src_pixels) = match img {
        DynamicImage::ImageRgb8(rgb) => {
            let (w, h) = rgb.dimensions();
            (PixelType::U8x3, w, h, rgb.into_raw())
        }
        DynamicImage::ImageRgba8(rgba) => {
            let (w, h) = rgba.dimensions();
            (PixelType::U8x4, w, h, rgba.into_raw())
        }
        other => {
            let rgba = other.to_rgba8();
            let (w, h) = rgba.dimensions();
            (PixelType::U8x4, w, h, rgba.into_raw())
        }
    };

    let mut src_pixels = src_pixels;
    let mut src_image =
        fir::images::Image::from_slice_u8(src_width, src_height, src_pixels.as_mut_slice(), pixel_type)
            .map_err(|e| CasabaError::decode_failed(format!("fir source image: {e:?}")))?;
    let mut dst_image = fir::images::Image::new(target.width, target.height, pixel_type);

    let needs_premultiply = pixel_type == PixelType::U8x4;
    let mul_div = MulDiv::default();
    if needs_premultiply {
        mul_div
            .multiply_alpha_inplace(&mut src_image)
            .map_err(|e| CasabaError::decode_failed(format!("premultiply: {e}")))?;
    }

    let options = ResizeOptions::new().resize_alg(fir::ResizeAlg::Convolution(fir_filter(filter)));
    let mut resizer = fir::Resizer::new();
    resizer
        .resize(&src_image, &mut dst_image, &options)
        .map_err(|e| CasabaError::decode_failed(format!("fir resize: {e:?}")))?;

    if needs_premultiply {
        mul_div
            .divide_alpha_inplace(&mut dst_image)
            .map_err(|e| CasabaError::decode_failed(format!("unpremultiply: {e}")))?;
    }

    let dst_pixels = dst_image.into_vec();
    match pixel_type {
        PixelType::U8x3 => RgbImage::from_raw(target.width, target.height, dst_pixels)
            .map(DynamicImage::ImageRgb8)
            .ok_or_else(|| CasabaError::decode_failed("resize output buffer mismatch")),
        _ => RgbaImage::from_raw(target.width, target.height, dst_pixels)
            .map(DynamicImage::ImageRgba8)
            .ok_or_else(|| CasabaError::decode_failed("resize output buffer mismatch")),
    }
}

/// Parse a background color string: `#rrggbb` or a small named set.
/// Unrecognized values fall back to black.
pub(crate) fn parse_background(color: &str) -> Rgba<u8> {
    let color = color.trim();
    if let Some(hex) = color.strip_prefix('#') {
        if hex.len() == 6 {
            if let Ok(value) = u32::from_str_radix(hex, 16) {
                return Rgba([(value >> 16) as u8, (value >> 8) as u8, value as u8, 255]);
            }
        }
    }
    match color.to_lowercase().as_str() {
        "white" => Rgba([255, 255, 255, 255]),
        "red" => Rgba([255, 0, 0, 255]),
        "green" => Rgba([0, 128, 0, 255]),
        "blue" => Rgba([0, 0, 255, 255]),
        "gray" | "grey" => Rgba([128, 128, 128, 255]),
        "transparent" => Rgba([0, 0, 0, 0]),
        _ => Rgba([0, 0, 0, 255]),
    }
}

fn apply_rotate(
    img: DynamicImage,
    rotate: &Rotate,
    config: &ProcessorConfig,
    output_format: Format,
) -> Result<DynamicImage> {
    if rotate.is_quarter_turn() {
        return Ok(match rotate.degrees as u32 {
            90 => img.rotate90(),
            180 => img.rotate180(),
            270 => img.rotate270(),
            _ => img,
        });
    }

    let background = if output_format.supports_transparency() {
        Rgba([0, 0, 0, 0])
    } else {
        parse_background(&config.background_color)
    };
    debug!(degrees = rotate.degrees, "arbitrary rotation");
    Ok(rotate_arbitrary(&img, rotate.degrees, background))
}

/// Rotate by an arbitrary angle onto an expanded canvas, sampling the source
/// bilinearly through the inverse transform and filling corners with
/// `background`.
pub(crate) fn rotate_arbitrary(img: &DynamicImage, degrees: f64, background: Rgba<u8>) -> DynamicImage {
    let src = img.to_rgba8();
    let (w, h) = (src.width() as f64, src.height() as f64);
    let theta = degrees.to_radians();
    let (sin, cos) = theta.sin_cos();

    let out_w = (w * cos.abs() + h * sin.abs()).ceil() as u32;
    let out_h = (w * sin.abs() + h * cos.abs()).ceil() as u32;
    let (cx_src, cy_src) = (w / 2.0, h / 2.0);
    let (cx_dst, cy_dst) = (out_w as f64 / 2.0, out_h as f64 / 2.0);

    let mut out = RgbaImage::from_pixel(out_w, out_h, background);
    for dy in 0..out_h {
        for dx in 0..out_w {
            // Inverse rotation of the destination pixel center
            let rx = dx as f64 + 0.5 - cx_dst;
            let ry = dy as f64 + 0.5 - cy_dst;
            let sx = rx * cos + ry * sin + cx_src - 0.5;
            let sy = -rx * sin + ry * cos + cy_src - 0.5;
            if let Some(pixel) = sample_bilinear(&src, sx, sy) {
                out.put_pixel(dx, dy, pixel);
            }
        }
    }
    DynamicImage::ImageRgba8(out)
}

fn sample_bilinear(src: &RgbaImage, x: f64, y: f64) -> Option<Rgba<u8>> {
    let (w, h) = (src.width() as i64, src.height() as i64);
    let x0 = x.floor() as i64;
    let y0 = y.floor() as i64;
    if x0 < -1 || y0 < -1 || x0 >= w || y0 >= h {
        return None;
    }
    let fx = x - x0 as f64;
    let fy = y - y0 as f64;

    let fetch = |px: i64, py: i64| -> [f64; 4] {
        let px = px.clamp(0, w - 1) as u32;
        let py = py.clamp(0, h - 1) as u32;
        let p = src.get_pixel(px, py).0;
        [p[0] as f64, p[1] as f64, p[2] as f64, p[3] as f64]
    };

    let p00 = fetch(x0, y0);
    let p10 = fetch(x0 + 1, y0);
    let p01 = fetch(x0, y0 + 1);
    let p11 = fetch(x0 + 1, y0 + 1);

    let mut out = [0u8; 4];
    for c in 0..4 {
        let top = p00[c] * (1.0 - fx) + p10[c] * fx;
        let bottom = p01[c] * (1.0 - fx) + p11[c] * fx;
        out[c] = (top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8;
    }
    Some(Rgba(out))
}

fn apply_color_reduce(img: DynamicImage, color: ColorReduce) -> DynamicImage {
    match color {
        ColorReduce::None => img,
        ColorReduce::Gray => DynamicImage::ImageLuma8(img.to_luma8()),
        ColorReduce::Bitonal => {
            let mut gray = img.to_luma8();
            for pixel in gray.pixels_mut() {
                pixel.0[0] = if pixel.0[0] >= 128 { 255 } else { 0 };
            }
            DynamicImage::ImageLuma8(gray)
        }
    }
}

/// Unsharp mask with sigma derived from the requested amount.
fn unsharp(img: DynamicImage, amount: f64) -> DynamicImage {
    let sigma = (amount as f32).clamp(0.1, 10.0);
    img.unsharpen(sigma, 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::{Crop, Scale, Sharpen};

    fn test_image(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
        }))
    }

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let mut buf = Vec::new();
        test_image(width, height)
            .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        buf
    }

    fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
        writer::encode_jpeg(&test_image(width, height), 85, None).unwrap()
    }

    #[test]
    fn describe_reports_dimensions_and_format() {
        let processor = NativeProcessor::new(ProcessorConfig::default());
        let source = Source::from_bytes(png_bytes(120, 80));
        let geometry = processor.describe(&source).unwrap();
        assert_eq!(geometry.format, Format::Png);
        assert_eq!(geometry.virtual_size(), Dimensions::new(120, 80));
    }

    #[test]
    fn describe_rejects_jp2() {
        let processor = NativeProcessor::new(ProcessorConfig::default());
        let jp2_sig = vec![
            0x00, 0x00, 0x00, 0x0C, 0x6A, 0x50, 0x20, 0x20, 0x0D, 0x0A, 0x87, 0x0A,
        ];
        let err = processor.describe(&Source::from_bytes(jp2_sig)).unwrap_err();
        assert!(matches!(err, CasabaError::UnsupportedSourceFormat { .. }));
    }

    #[test]
    fn render_applies_crop_and_scale() {
        let processor = NativeProcessor::new(ProcessorConfig::default());
        let source = Source::from_bytes(png_bytes(200, 100));
        let geometry = processor.describe(&source).unwrap();

        let ops = OperationList::new("x", Format::Png)
            .with_crop(Crop::percent(0.0, 0.0, 0.5, 0.5))
            .with_scale(Scale::fit_width(50));

        let mut sink = Vec::new();
        processor.render(&source, &ops, &geometry, &mut sink).unwrap();
        let out = image::load_from_memory(&sink).unwrap();
        assert_eq!((out.width(), out.height()), (50, 25));
    }

    #[test]
    fn no_op_request_streams_source_bytes_through() {
        let processor = NativeProcessor::new(ProcessorConfig::default());
        let png = png_bytes(10, 10);
        let source = Source::from_bytes(png.clone());
        let geometry = processor.describe(&source).unwrap();

        let ops = OperationList::new("x", Format::Png);
        let mut sink = Vec::new();
        processor.render(&source, &ops, &geometry, &mut sink).unwrap();
        assert_eq!(sink, png);
    }

    #[test]
    fn render_rejects_unsupported_output() {
        let processor = NativeProcessor::new(ProcessorConfig::default());
        let source = Source::from_bytes(png_bytes(10, 10));
        let geometry = processor.describe(&source).unwrap();
        let ops = OperationList::new("x", Format::Jp2);
        let err = processor
            .render(&source, &ops, &geometry, &mut Vec::new())
            .unwrap_err();
        assert!(matches!(err, CasabaError::UnsupportedOutputFormat { .. }));
    }

    #[test]
    fn quarter_rotation_swaps_dimensions() {
        let processor = NativeProcessor::new(ProcessorConfig::default());
        let source = Source::from_bytes(jpeg_bytes(100, 40));
        let geometry = processor.describe(&source).unwrap();
        let ops = OperationList::new("x", Format::Jpg).with_rotate(Rotate::new(90.0));

        let mut sink = Vec::new();
        processor.render(&source, &ops, &geometry, &mut sink).unwrap();
        let out = image::load_from_memory(&sink).unwrap();
        assert_eq!((out.width(), out.height()), (40, 100));
    }

    #[test]
    fn arbitrary_rotation_expands_canvas() {
        let img = test_image(100, 50);
        let rotated = rotate_arbitrary(&img, 45.0, Rgba([0, 0, 0, 255]));
        // 45 degrees: both axes grow to ceil((100+50)/sqrt(2)) = 107
        assert_eq!(rotated.width(), 107);
        assert_eq!(rotated.height(), 107);
    }

    #[test]
    fn arbitrary_rotation_fills_corners_with_background() {
        let img = test_image(40, 40);
        let rotated = rotate_arbitrary(&img, 45.0, Rgba([255, 0, 0, 255]));
        let corner = rotated.to_rgba8().get_pixel(0, 0).0;
        assert_eq!(corner, [255, 0, 0, 255]);
    }

    #[test]
    fn gray_and_bitonal_reduce_channels() {
        let gray = apply_color_reduce(test_image(10, 10), ColorReduce::Gray);
        assert!(matches!(gray, DynamicImage::ImageLuma8(_)));

        let bitonal = apply_color_reduce(test_image(10, 10), ColorReduce::Bitonal);
        let luma = bitonal.to_luma8();
        assert!(luma.pixels().all(|p| p.0[0] == 0 || p.0[0] == 255));
    }

    #[test]
    fn normalize_stretches_sample_range() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_fn(4, 1, |x, _| {
            image::Rgb([100 + (x as u8) * 10; 3])
        }));
        let out = normalize(img).to_rgb8();
        let samples: Vec<u8> = out.pixels().map(|p| p.0[0]).collect();
        assert_eq!(samples.first(), Some(&0));
        assert_eq!(samples.last(), Some(&255));
    }

    #[test]
    fn resize_preserves_aspect_content() {
        let resized = resize_to(test_image(200, 100), Dimensions::new(50, 25), Filter::Lanczos3)
            .unwrap();
        assert_eq!((resized.width(), resized.height()), (50, 25));
    }

    #[test]
    fn resize_rejects_zero_target() {
        let err = resize_to(test_image(10, 10), Dimensions::new(0, 5), Filter::Lanczos3)
            .unwrap_err();
        assert!(matches!(err, CasabaError::InvalidArgument { .. }));
    }

    #[test]
    fn background_parsing() {
        assert_eq!(parse_background("#ff8000"), Rgba([255, 128, 0, 255]));
        assert_eq!(parse_background("white"), Rgba([255, 255, 255, 255]));
        assert_eq!(parse_background("transparent"), Rgba([0, 0, 0, 0]));
        assert_eq!(parse_background("no-such-color"), Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn sharpen_keeps_dimensions() {
        let processor = NativeProcessor::new(ProcessorConfig::default());
        let source = Source::from_bytes(png_bytes(30, 30));
        let geometry = processor.describe(&source).unwrap();
        let ops = OperationList::new("x", Format::Png).with_sharpen(Sharpen::new(1.0));
        let mut sink = Vec::new();
        processor.render(&source, &ops, &geometry, &mut sink).unwrap();
        let out = image::load_from_memory(&sink).unwrap();
        assert_eq!((out.width(), out.height()), (30, 30));
    }

    #[test]
    fn mozjpeg_rejects_truncated_jpeg() {
        let err = decode_jpeg_mozjpeg(&[0xFF, 0xD8, 0x00]).unwrap_err();
        assert!(matches!(err, CasabaError::DecodeFailed { .. }));
    }

    #[test]
    fn decode_router_covers_png_and_jpeg() {
        let png = decode(&png_bytes(8, 6), Format::Png).unwrap();
        assert_eq!((png.width(), png.height()), (8, 6));
        let jpg = decode(&jpeg_bytes(8, 6), Format::Jpg).unwrap();
        assert_eq!((jpg.width(), jpg.height()), (8, 6));
    }
}
