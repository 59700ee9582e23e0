use image::{
    codecs::png::PngEncoder, ColorType, DynamicImage, ImageEncoder, ImageResult, Rgb, RgbImage,
};
use imageproc::{drawing::draw_hollow_rect_mut, rect::Rect};
use indexmap::IndexMap;

use crate::detector::{BoundingBox, Detection};

const OUTLINE: Rgb<u8> = Rgb([255, 0, 0]);
const STROKE_WIDTH: i32 = 2;

pub fn camera_key(index: usize) -> String {
    format!("camera_{index}")
}

/// Exact, case-sensitive label match.
pub fn count_label(detections: &[Detection], label: &str) -> usize {
    detections.iter().filter(|d| d.label == label).count()
}

/// Target count per camera, keyed `camera_{i}` in input order.
pub fn count_by_camera(detections: &[Vec<Detection>], label: &str) -> IndexMap<String, usize> {
    detections
        .iter()
        .enumerate()
        .map(|(i, dets)| (camera_key(i), count_label(dets, label)))
        .collect()
}

/// Draws a red outline around every `label` detection onto an RGB copy of `image`.
pub fn annotate(image: &DynamicImage, detections: &[Detection], label: &str) -> RgbImage {
    let mut canvas = image.to_rgb8();
    for detection in detections.iter().filter(|d| d.label == label) {
        outline(&mut canvas, &detection.bbox);
    }
    canvas
}

fn outline(canvas: &mut RgbImage, bbox: &BoundingBox) {
    let x1 = bbox.x1.round() as i32;
    let y1 = bbox.y1.round() as i32;
    let x2 = bbox.x2.round() as i32;
    let y2 = bbox.y2.round() as i32;
    for inset in 0..STROKE_WIDTH {
        let width = x2 - x1 + 1 - 2 * inset;
        let height = y2 - y1 + 1 - 2 * inset;
        if width <= 0 || height <= 0 {
            break;
        }
        let rect = Rect::at(x1 + inset, y1 + inset).of_size(width as u32, height as u32);
        draw_hollow_rect_mut(canvas, rect, OUTLINE);
    }
}

pub fn encode_png(image: &RgbImage) -> ImageResult<Vec<u8>> {
    let mut out = vec![];
    PngEncoder::new(&mut out).write_image(
        image.as_raw(),
        image.width(),
        image.height(),
        ColorType::Rgb8,
    )?;
    Ok(out)
}
