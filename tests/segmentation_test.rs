use std::io::Cursor;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use image::{ImageFormat, Rgb, RgbImage};

use prompt_seg_rs::mocks::MockPromptModel;
use prompt_seg_rs::prompt::{decode_b64_json, Prompt, PromptKind, PromptSpec};
use prompt_seg_rs::segmentation::segment_image;
use prompt_seg_rs::PromptSegError;

fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let mut img = RgbImage::new(width, height);
    for (x, y, px) in img.enumerate_pixels_mut() {
        *px = Rgb([(x * 3 % 256) as u8, (y * 5 % 256) as u8, 90]);
    }
    let mut buffer = Cursor::new(Vec::new());
    img.write_to(&mut buffer, ImageFormat::Png).unwrap();
    buffer.into_inner()
}

/// Decode CLI-shaped base64 payloads into a spec, the way the segment
/// runner assembles its request.
fn spec_from_b64(
    kind: PromptKind,
    points: Option<&str>,
    labels: Option<&str>,
    bbox: Option<&str>,
) -> PromptSpec {
    PromptSpec {
        kind,
        points: decode_b64_json("points", points).unwrap(),
        labels: decode_b64_json("labels", labels).unwrap(),
        bbox: decode_b64_json("bbox", bbox).unwrap(),
    }
}

#[test]
fn single_point_without_labels_succeeds() {
    let model = MockPromptModel::with_region(2, 2, 6, 6);
    let payload = BASE64.encode("[[10, 10]]");
    let spec = spec_from_b64(PromptKind::Point, Some(&payload), None, None);

    let png = segment_image(&model, &png_bytes(24, 20), &spec).unwrap();
    let out = image::load_from_memory(&png).unwrap();

    // never larger than the source in either dimension
    assert!(out.width() <= 24);
    assert!(out.height() <= 20);

    // absent labels defaulted to foreground
    assert_eq!(
        model.recorded_prompts(),
        vec![Prompt::Points {
            points: vec![[10.0, 10.0]],
            labels: vec![1],
        }]
    );
}

#[test]
fn labels_are_coerced_into_binary() {
    let model = MockPromptModel::with_region(0, 0, 4, 4);
    let points = BASE64.encode("[[1, 1], [2, 2], [3, 3]]");
    let labels = BASE64.encode("[-1, 0, 9]");
    let spec = spec_from_b64(PromptKind::Point, Some(&points), Some(&labels), None);

    segment_image(&model, &png_bytes(16, 16), &spec).unwrap();

    let recorded = model.recorded_prompts();
    let Prompt::Points { labels, .. } = &recorded[0] else {
        panic!("expected a point prompt");
    };
    assert_eq!(labels, &vec![0, 0, 1]);
}

#[test]
fn label_count_mismatch_is_fatal() {
    let model = MockPromptModel::with_region(0, 0, 4, 4);
    let points = BASE64.encode("[[1, 1], [2, 2]]");
    let labels = BASE64.encode("[1]");
    let spec = spec_from_b64(PromptKind::Point, Some(&points), Some(&labels), None);

    let err = segment_image(&model, &png_bytes(16, 16), &spec).unwrap_err();
    assert!(matches!(
        err,
        PromptSegError::Validation { field: "labels", .. }
    ));
    assert!(model.recorded_prompts().is_empty());
}

#[test]
fn box_prompt_is_normalized_and_clamped() {
    let model = MockPromptModel::with_region(0, 0, 8, 8);
    // corners swapped and spilling past the image
    let bbox = BASE64.encode("[40.0, -2.0, 4.0, 99.0]");
    let spec = spec_from_b64(PromptKind::Box, None, None, Some(&bbox));

    segment_image(&model, &png_bytes(32, 24), &spec).unwrap();

    assert_eq!(
        model.recorded_prompts(),
        vec![Prompt::Box {
            x_min: 4.0,
            y_min: 0.0,
            x_max: 31.0,
            y_max: 23.0,
        }]
    );
}

#[test]
fn missing_bbox_for_box_kind_is_fatal() {
    let model = MockPromptModel::with_region(0, 0, 8, 8);
    let spec = spec_from_b64(PromptKind::Box, None, None, None);

    let err = segment_image(&model, &png_bytes(32, 24), &spec).unwrap_err();
    assert!(matches!(
        err,
        PromptSegError::Validation { field: "bbox", .. }
    ));
}

#[test]
fn malformed_payload_is_a_decode_error() {
    let err = decode_b64_json::<Vec<Vec<f64>>>("points", Some("!!!")).unwrap_err();
    assert!(matches!(err, PromptSegError::Decode { field: "points", .. }));
}

#[test]
fn result_is_png_encoded() {
    let model = MockPromptModel::with_region(1, 1, 3, 3);
    let spec = PromptSpec::point(vec![vec![2.0, 2.0]], None);

    let bytes = segment_image(&model, &png_bytes(8, 8), &spec).unwrap();
    assert_eq!(
        image::guess_format(&bytes).unwrap(),
        ImageFormat::Png
    );
}
