// src/writer.rs
//
// Encoder operations: JPEG (mozjpeg), PNG (image + oxipng), WebP, plus the
// image-crate formats (GIF, TIFF, BMP), with ICC profile re-embedding.

use crate::config::ProcessorConfig;
use crate::error::{CasabaError, Result};
use crate::ops::Format;
use image::{DynamicImage, ImageFormat};
use img_parts::{jpeg::Jpeg, png::Png, webp::WebP, ImageEXIF, ImageICC};
use mozjpeg::{ColorSpace, Compress, ScanMode};
use std::borrow::Cow;
use std::io::Cursor;

/// Encode `img` as `format`, re-embedding `icc` where the container
/// supports it. The single exit point of every render path.
pub fn encode(
    img: &DynamicImage,
    format: Format,
    config: &ProcessorConfig,
    icc: Option<&[u8]>,
) -> Result<Vec<u8>> {
    match format {
        Format::Jpg => encode_jpeg(img, config.jpeg_quality, icc),
        Format::Png => encode_png(img, icc),
        Format::Webp => encode_webp(img, config.webp_quality, icc),
        Format::Gif => encode_with_image_crate(img, ImageFormat::Gif, "gif"),
        Format::Tif => encode_with_image_crate(img, ImageFormat::Tiff, "tif"),
        Format::Bmp => encode_with_image_crate(img, ImageFormat::Bmp, "bmp"),
        Format::Jp2 => Err(CasabaError::unsupported_output_format("jp2")),
    }
}

/// Encode to JPEG using mozjpeg with Web-optimized settings.
pub fn encode_jpeg(img: &DynamicImage, quality: u8, icc: Option<&[u8]>) -> Result<Vec<u8>> {
    let quality = quality.min(100);

    // Zero-copy when the pipeline already produced RGB8
    let rgb: Cow<'_, image::RgbImage> = match img {
        DynamicImage::ImageRgb8(rgb_img) => Cow::Borrowed(rgb_img),
        _ => Cow::Owned(img.to_rgb8()),
    };
    let (w, h) = rgb.dimensions();
    let pixels: &[u8] = rgb.as_raw();

    if w == 0 || h == 0 {
        return Err(CasabaError::encode_failed(
            "jpeg",
            "width or height is zero",
        ));
    }

    let mut comp = Compress::new(ColorSpace::JCS_RGB);
    comp.set_size(w as usize, h as usize);
    comp.set_color_space(ColorSpace::JCS_YCbCr);
    comp.set_quality(quality as f32);
    comp.set_chroma_sampling_pixel_sizes((2, 2), (2, 2));
    comp.set_progressive_mode();
    comp.set_optimize_coding(true);
    comp.set_optimize_scans(true);
    comp.set_scan_optimization_mode(ScanMode::AllComponentsTogether);

    let estimated_size = (w as usize * h as usize * 3 / 10).max(4096);
    let mut output = Vec::with_capacity(estimated_size);
    {
        let mut writer = comp
            .start_compress(&mut output)
            .map_err(|e| CasabaError::encode_failed("jpeg", format!("mozjpeg start: {e:?}")))?;

        let stride = w as usize * 3;
        for row in pixels.chunks(stride) {
            writer.write_scanlines(row).map_err(|e| {
                CasabaError::encode_failed("jpeg", format!("mozjpeg scanlines: {e:?}"))
            })?;
        }

        writer
            .finish()
            .map_err(|e| CasabaError::encode_failed("jpeg", format!("mozjpeg finish: {e:?}")))?;
    }

    if let Some(icc_data) = icc {
        embed_icc_jpeg(output, icc_data)
    } else {
        Ok(output)
    }
}

/// Embed ICC profile into JPEG as an APP2 segment using img-parts.
pub fn embed_icc_jpeg(jpeg_data: Vec<u8>, icc: &[u8]) -> Result<Vec<u8>> {
    use img_parts::jpeg::{markers::APP2, JpegSegment};
    use img_parts::Bytes;

    let mut jpeg = Jpeg::from_bytes(Bytes::from(jpeg_data))
        .map_err(|e| CasabaError::decode_failed(format!("failed to parse JPEG for ICC: {e}")))?;

    let mut marker_data = Vec::with_capacity(14 + icc.len());
    marker_data.extend_from_slice(b"ICC_PROFILE\0");
    marker_data.push(1);
    marker_data.push(1);
    marker_data.extend_from_slice(icc);

    let segment = JpegSegment::new_with_contents(APP2, Bytes::from(marker_data));
    jpeg.segments_mut().insert(0, segment);

    let mut output = Vec::new();
    jpeg.encoder()
        .write_to(&mut output)
        .map_err(|e| CasabaError::encode_failed("jpeg", format!("write with ICC: {e}")))?;
    Ok(output)
}

/// Re-attach a raw EXIF segment to an encoded JPEG, verbatim.
pub fn embed_exif_jpeg(jpeg_data: Vec<u8>, exif: &[u8]) -> Result<Vec<u8>> {
    use img_parts::Bytes;

    let mut jpeg = Jpeg::from_bytes(Bytes::from(jpeg_data))
        .map_err(|e| CasabaError::decode_failed(format!("failed to parse JPEG for EXIF: {e}")))?;
    jpeg.set_exif(Some(Bytes::from(exif.to_vec())));

    let mut output = Vec::new();
    jpeg.encoder()
        .write_to(&mut output)
        .map_err(|e| CasabaError::encode_failed("jpeg", format!("write with EXIF: {e}")))?;
    Ok(output)
}

/// Encode to PNG, then losslessly recompress with oxipng.
pub fn encode_png(img: &DynamicImage, icc: Option<&[u8]>) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .map_err(|e| CasabaError::encode_failed("png", format!("PNG encode failed: {e}")))?;

    let mut options = oxipng::Options::from_preset(2);
    // Keep metadata; in particular do not strip ICC
    options.strip = oxipng::StripChunks::None;

    let optimized = oxipng::optimize_from_memory(&buf, &options)
        .map_err(|e| CasabaError::encode_failed("png", format!("oxipng failed: {e}")))?;

    if let Some(icc_data) = icc {
        embed_icc_png(optimized, icc_data)
    } else {
        Ok(optimized)
    }
}

/// Embed ICC profile into PNG as an iCCP chunk using img-parts.
pub fn embed_icc_png(png_data: Vec<u8>, icc: &[u8]) -> Result<Vec<u8>> {
    use img_parts::Bytes;

    let mut png = Png::from_bytes(Bytes::from(png_data))
        .map_err(|e| CasabaError::decode_failed(format!("failed to parse PNG for ICC: {e}")))?;
    png.set_icc_profile(Some(Bytes::from(icc.to_vec())));

    let mut output = Vec::new();
    png.encoder()
        .write_to(&mut output)
        .map_err(|e| CasabaError::encode_failed("png", format!("write with ICC: {e}")))?;
    Ok(output)
}

/// Encode to WebP. Sources with alpha keep it; everything else goes through
/// the smaller RGB path.
pub fn encode_webp(img: &DynamicImage, quality: u8, icc: Option<&[u8]>) -> Result<Vec<u8>> {
    let has_alpha = img.color().has_alpha();

    let encoded = if has_alpha {
        let rgba: Cow<'_, image::RgbaImage> = match img {
            DynamicImage::ImageRgba8(rgba_img) => Cow::Borrowed(rgba_img),
            _ => Cow::Owned(img.to_rgba8()),
        };
        let (w, h) = rgba.dimensions();
        encode_webp_config(webp::Encoder::from_rgba(&rgba, w, h), quality)?
    } else {
        let rgb: Cow<'_, image::RgbImage> = match img {
            DynamicImage::ImageRgb8(rgb_img) => Cow::Borrowed(rgb_img),
            _ => Cow::Owned(img.to_rgb8()),
        };
        let (w, h) = rgb.dimensions();
        encode_webp_config(webp::Encoder::from_rgb(&rgb, w, h), quality)?
    };

    if let Some(icc_data) = icc {
        embed_icc_webp(encoded, icc_data)
    } else {
        Ok(encoded)
    }
}

fn encode_webp_config(encoder: webp::Encoder<'_>, quality: u8) -> Result<Vec<u8>> {
    let mut config = webp::WebPConfig::new()
        .map_err(|_| CasabaError::encode_failed("webp", "failed to create WebPConfig"))?;
    config.quality = quality.min(100) as f32;
    config.method = 4;
    config.pass = 1;
    config.autofilter = 1;

    let mem = encoder
        .encode_advanced(&config)
        .map_err(|e| CasabaError::encode_failed("webp", format!("WebP encode failed: {e:?}")))?;
    Ok(mem.to_vec())
}

/// Embed ICC profile into WebP as an ICCP chunk using img-parts.
pub fn embed_icc_webp(webp_data: Vec<u8>, icc: &[u8]) -> Result<Vec<u8>> {
    use img_parts::Bytes;

    let mut webp = WebP::from_bytes(Bytes::from(webp_data))
        .map_err(|e| CasabaError::decode_failed(format!("failed to parse WebP for ICC: {e}")))?;
    webp.set_icc_profile(Some(Bytes::from(icc.to_vec())));

    let mut output = Vec::new();
    webp.encoder()
        .write_to(&mut output)
        .map_err(|e| CasabaError::encode_failed("webp", format!("write with ICC: {e}")))?;
    Ok(output)
}

/// Formats the image crate encodes directly. GIF quantizes; TIFF and BMP
/// pass pixels through. These containers carry no ICC here.
fn encode_with_image_crate(
    img: &DynamicImage,
    format: ImageFormat,
    name: &'static str,
) -> Result<Vec<u8>> {
    // The BMP and GIF encoders reject some color types the pipeline can
    // produce (e.g. 16-bit gray); flatten to 8-bit first.
    let img = match img {
        DynamicImage::ImageRgb8(_) | DynamicImage::ImageRgba8(_) | DynamicImage::ImageLuma8(_) => {
            Cow::Borrowed(img)
        }
        _ if img.color().has_alpha() => Cow::Owned(DynamicImage::ImageRgba8(img.to_rgba8())),
        _ => Cow::Owned(DynamicImage::ImageRgb8(img.to_rgb8())),
    };
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), format)
        .map_err(|e| CasabaError::encode_failed(name, format!("{name} encode failed: {e}")))?;
    Ok(buf)
}
