use anyhow::{bail, Result};
use image::DynamicImage;
use serde::{Deserialize, Serialize};

mod labels;
mod yolo;

pub use yolo::YoloDetector;

/// Detections scoring below this never leave the detector.
pub const CONFIDENCE_THRESHOLD: f32 = 0.5;

/// Axis-aligned box in source image pixel coordinates.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).max(0.0)
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let overlap = BoundingBox {
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
            x2: self.x2.min(other.x2),
            y2: self.y2.min(other.y2),
        }
        .area();
        let union = self.area() + other.area() - overlap;
        if union <= 0.0 {
            0.0
        } else {
            overlap / union
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Detection {
    pub label: String,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

/// An object detection model.
///
/// Implementations receive the whole batch in one call and must return exactly one
/// detection list per input image, in input order. Inference takes `&self` so a single
/// loaded model can serve concurrent requests.
pub trait Detector: Send + Sync {
    /// Backend identifier, for logs.
    fn name(&self) -> &'static str;

    fn detect(
        &self,
        images: &[DynamicImage],
        confidence_threshold: f32,
    ) -> Result<Vec<Vec<Detection>>>;
}

/// Runs the detector once over the full batch at the fixed confidence threshold.
pub fn detect_batch(
    detector: &dyn Detector,
    images: &[DynamicImage],
) -> Result<Vec<Vec<Detection>>> {
    let detections = detector.detect(images, CONFIDENCE_THRESHOLD)?;
    if detections.len() != images.len() {
        bail!(
            "detector {} returned {} results for {} images",
            detector.name(),
            detections.len(),
            images.len()
        );
    }
    Ok(detections)
}
