// End-to-end tests against the native backend: describe a source, apply an
// operation list, and check the encoded result. The delegate backends are
// covered by their own unit tests; nothing here shells out.

use casaba::{
    CasabaError, ColorReduce, Crop, Dimensions, Format, ImageInfo, OperationList, Processor,
    ProcessorConfig, Rotate, Scale, Source,
};
use image::{DynamicImage, GenericImageView, RgbImage};
use std::io::Cursor;

fn gradient_image(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    }))
}

fn encode_png(img: &DynamicImage) -> Vec<u8> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .unwrap();
    buf
}

fn native() -> casaba::NativeProcessor {
    casaba::NativeProcessor::new(ProcessorConfig::default())
}

#[test]
fn describe_reports_png_geometry() {
    let source = Source::from_bytes(encode_png(&gradient_image(320, 240)));
    let geometry = native().describe(&source).unwrap();
    assert_eq!(geometry.format, Format::Png);
    assert_eq!(geometry.full_size(), Dimensions::new(320, 240));
    assert_eq!(geometry.virtual_size(), Dimensions::new(320, 240));
}

#[test]
fn crop_and_scale_render_to_png() {
    let processor = native();
    let source = Source::from_bytes(encode_png(&gradient_image(200, 100)));
    let geometry = processor.describe(&source).unwrap();

    let ops = OperationList::new("cats/001", Format::Png)
        .with_crop(Crop::percent(0.0, 0.0, 0.5, 0.5))
        .with_scale(Scale::fit_width(50));

    let mut out = Vec::new();
    processor.render(&source, &ops, &geometry, &mut out).unwrap();

    let result = image::load_from_memory(&out).unwrap();
    assert_eq!(result.dimensions(), (50, 25));
    assert_eq!(
        image::guess_format(&out).unwrap(),
        image::ImageFormat::Png
    );
}

#[test]
fn no_op_request_streams_source_bytes_through() {
    let processor = native();
    let bytes = encode_png(&gradient_image(64, 64));
    let source = Source::from_bytes(bytes.clone());
    let geometry = processor.describe(&source).unwrap();

    let ops = OperationList::new("x", Format::Png)
        .with_crop(Crop::full())
        .with_scale(Scale::full());

    let mut out = Vec::new();
    processor.render(&source, &ops, &geometry, &mut out).unwrap();
    assert_eq!(out, bytes);
}

#[test]
fn format_change_defeats_stream_through() {
    let processor = native();
    let bytes = encode_png(&gradient_image(64, 64));
    let source = Source::from_bytes(bytes.clone());
    let geometry = processor.describe(&source).unwrap();

    let ops = OperationList::new("x", Format::Jpg);
    let mut out = Vec::new();
    processor.render(&source, &ops, &geometry, &mut out).unwrap();
    assert_ne!(out, bytes);
    assert_eq!(
        image::guess_format(&out).unwrap(),
        image::ImageFormat::Jpeg
    );
}

// Minimal EXIF body carrying Orientation=6 (rotate 90 CW to display):
// little-endian TIFF header, one IFD entry, no next IFD.
fn exif_orientation_6() -> Vec<u8> {
    vec![
        0x49, 0x49, 0x2A, 0x00, // "II*\0"
        0x08, 0x00, 0x00, 0x00, // IFD offset
        0x01, 0x00, // entry count
        0x12, 0x01, // tag 0x0112 Orientation
        0x03, 0x00, // type SHORT
        0x01, 0x00, 0x00, 0x00, // count
        0x06, 0x00, 0x00, 0x00, // value 6
        0x00, 0x00, 0x00, 0x00, // next IFD
    ]
}

#[test]
fn exif_oriented_jpeg_renders_at_virtual_size() {
    let jpeg = casaba::writer::encode_jpeg(&gradient_image(100, 40), 85, None).unwrap();
    let jpeg = casaba::writer::embed_exif_jpeg(jpeg, &exif_orientation_6()).unwrap();

    let processor = native();
    let source = Source::from_bytes(jpeg);
    let geometry = processor.describe(&source).unwrap();

    // Raw decode is 100x40; the orientation swaps the reported size.
    assert_eq!(geometry.full_size(), Dimensions::new(100, 40));
    assert_eq!(geometry.virtual_size(), Dimensions::new(40, 100));

    // An identity request still re-encodes: the correction is baked in.
    let ops = OperationList::new("x", Format::Jpg);
    let mut out = Vec::new();
    processor.render(&source, &ops, &geometry, &mut out).unwrap();
    let result = image::load_from_memory(&out).unwrap();
    assert_eq!(result.dimensions(), (40, 100));
}

#[test]
fn quarter_rotation_swaps_output_dimensions() {
    let processor = native();
    let source = Source::from_bytes(encode_png(&gradient_image(120, 80)));
    let geometry = processor.describe(&source).unwrap();

    let ops = OperationList::new("x", Format::Png).with_rotate(Rotate::new(90.0));
    let mut out = Vec::new();
    processor.render(&source, &ops, &geometry, &mut out).unwrap();

    let result = image::load_from_memory(&out).unwrap();
    assert_eq!(result.dimensions(), (80, 120));
}

#[test]
fn arbitrary_rotation_expands_the_canvas() {
    let processor = native();
    let source = Source::from_bytes(encode_png(&gradient_image(100, 50)));
    let geometry = processor.describe(&source).unwrap();

    let ops = OperationList::new("x", Format::Png).with_rotate(Rotate::new(45.0));
    let mut out = Vec::new();
    processor.render(&source, &ops, &geometry, &mut out).unwrap();

    let result = image::load_from_memory(&out).unwrap();
    let (w, h) = result.dimensions();
    assert!(w > 100 && h > 50);
}

#[test]
fn bitonal_output_contains_only_black_and_white() {
    let processor = native();
    let source = Source::from_bytes(encode_png(&gradient_image(32, 32)));
    let geometry = processor.describe(&source).unwrap();

    let ops = OperationList::new("x", Format::Png).with_color_reduce(ColorReduce::Bitonal);
    let mut out = Vec::new();
    processor.render(&source, &ops, &geometry, &mut out).unwrap();

    let result = image::load_from_memory(&out).unwrap().to_luma8();
    assert!(result.pixels().all(|p| p.0[0] == 0 || p.0[0] == 255));
}

#[test]
fn gray_output_is_single_channel() {
    let processor = native();
    let source = Source::from_bytes(encode_png(&gradient_image(32, 32)));
    let geometry = processor.describe(&source).unwrap();

    let ops = OperationList::new("x", Format::Png).with_color_reduce(ColorReduce::Gray);
    let mut out = Vec::new();
    processor.render(&source, &ops, &geometry, &mut out).unwrap();

    let result = image::load_from_memory(&out).unwrap();
    assert!(matches!(result, DynamicImage::ImageLuma8(_)));
}

#[test]
fn jp2_output_is_rejected_as_recoverable() {
    let processor = native();
    let source = Source::from_bytes(encode_png(&gradient_image(16, 16)));
    let geometry = processor.describe(&source).unwrap();

    let ops = OperationList::new("x", Format::Jp2);
    let mut out = Vec::new();
    let err = processor
        .render(&source, &ops, &geometry, &mut out)
        .unwrap_err();
    assert!(matches!(err, CasabaError::UnsupportedOutputFormat { .. }));
    assert!(err.is_recoverable());
}

#[test]
fn info_document_for_described_source() {
    let processor = native();
    let source = Source::from_bytes(encode_png(&gradient_image(2048, 1536)));
    let geometry = processor.describe(&source).unwrap();

    let info = ImageInfo::for_source(
        "http://example.org/iiif/cats%2F001",
        &geometry,
        &processor,
        &ProcessorConfig::default(),
        serde_json::Map::new(),
    );

    assert_eq!((info.width, info.height), (2048, 1536));

    // Ascending power-of-two ladder, stopping before either axis drops
    // below the 64 px floor.
    let sizes: Vec<(u32, u32)> = info.sizes.iter().map(|s| (s.width, s.height)).collect();
    assert_eq!(
        sizes,
        vec![(128, 96), (256, 192), (512, 384), (1024, 768)]
    );

    // Untiled source: one synthetic tile near the configured minimum.
    assert_eq!(info.tiles.len(), 1);
    assert_eq!((info.tiles[0].width, info.tiles[0].height), (1024, 768));
    assert_eq!(info.tiles[0].scale_factors, vec![1, 2, 4, 8, 16]);

    // The native backend covers everything level 2 requires.
    let value = serde_json::to_value(&info).unwrap();
    assert_eq!(
        value["profile"][0],
        "http://iiif.io/api/image/2/level2.json"
    );
}

#[test]
fn sizes_in_info_document_are_strictly_ascending() {
    let processor = native();
    let source = Source::from_bytes(encode_png(&gradient_image(3000, 2000)));
    let geometry = processor.describe(&source).unwrap();

    let info = ImageInfo::for_source(
        "http://example.org/x",
        &geometry,
        &processor,
        &ProcessorConfig::default(),
        serde_json::Map::new(),
    );
    for pair in info.sizes.windows(2) {
        assert!(pair[0].width < pair[1].width);
        assert!(pair[0].height < pair[1].height);
    }
    for size in &info.sizes {
        assert!(size.width >= 64 && size.height >= 64);
    }
}
