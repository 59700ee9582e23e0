use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use image::{imageops::FilterType, DynamicImage};
use log::debug;
use tract_onnx::prelude::*;

use super::{labels::label_for, BoundingBox, Detection, Detector};

/// YOLOv8 ONNX export run through tract.
///
/// Expects input `[1, 3, S, S]` (RGB scaled to 0..1) and output `[1, 4 + C, N]` where each of the
/// `N` candidate columns holds `cx, cy, w, h` in input pixels followed by `C` class scores.
pub struct YoloDetector {
    model: TypedRunnableModel<TypedModel>,
    input_size: u32,
    iou_threshold: f32,
}

impl YoloDetector {
    pub fn load<P: AsRef<Path>>(
        model_path: P,
        input_size: u32,
        iou_threshold: f32,
    ) -> Result<Self> {
        let model_path = model_path.as_ref();
        let size = input_size as usize;
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, size, size)),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            model,
            input_size,
            iou_threshold,
        })
    }

    fn build_input(&self, image: &DynamicImage) -> Tensor {
        let size = self.input_size;
        let resized = image::imageops::resize(&image.to_rgb8(), size, size, FilterType::Triangle);
        tract_ndarray::Array4::from_shape_fn(
            (1, 3, size as usize, size as usize),
            |(_, channel, y, x)| resized.get_pixel(x as u32, y as u32)[channel] as f32 / 255.0,
        )
        .into_tensor()
    }

    fn detect_one(
        &self,
        image: &DynamicImage,
        confidence_threshold: f32,
    ) -> Result<Vec<Detection>> {
        let input = self.build_input(image);
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        if view.ndim() != 3 || view.shape()[0] != 1 || view.shape()[1] <= 4 {
            bail!("unexpected model output shape {:?}", view.shape());
        }
        let candidates = view.index_axis(tract_ndarray::Axis(0), 0);
        let candidates = candidates
            .into_dimensionality::<tract_ndarray::Ix2>()
            .context("model output was not two dimensional per image")?;

        let decoded = decode_candidates(
            &candidates,
            (image.width(), image.height()),
            self.input_size,
            confidence_threshold,
        );
        Ok(non_max_suppression(decoded, self.iou_threshold))
    }
}

impl Detector for YoloDetector {
    fn name(&self) -> &'static str {
        "yolov8-tract"
    }

    // the plan is compiled for a batch of one, so the batch is walked here in a single call
    fn detect(
        &self,
        images: &[DynamicImage],
        confidence_threshold: f32,
    ) -> Result<Vec<Vec<Detection>>> {
        images
            .iter()
            .enumerate()
            .map(|(i, image)| {
                let detections = self
                    .detect_one(image, confidence_threshold)
                    .with_context(|| format!("image {i}"))?;
                debug!("image {i}: {} detections", detections.len());
                Ok(detections)
            })
            .collect()
    }
}

/// Turns a `[4 + C, N]` candidate matrix into detections in source image coordinates.
fn decode_candidates(
    candidates: &tract_ndarray::ArrayView2<f32>,
    (width, height): (u32, u32),
    input_size: u32,
    confidence_threshold: f32,
) -> Vec<Detection> {
    let rows = candidates.shape()[0];
    let sx = width as f32 / input_size as f32;
    let sy = height as f32 / input_size as f32;
    let (max_x, max_y) = (width as f32, height as f32);

    let mut out = vec![];
    for column in candidates.columns() {
        let Some((class_id, score)) = (4..rows)
            .map(|row| (row - 4, column[row]))
            .max_by(|a, b| a.1.total_cmp(&b.1))
        else {
            continue;
        };
        if score < confidence_threshold {
            continue;
        }
        let (cx, cy, w, h) = (column[0], column[1], column[2], column[3]);
        out.push(Detection {
            label: label_for(class_id),
            confidence: score,
            bbox: BoundingBox {
                x1: ((cx - w / 2.0) * sx).clamp(0.0, max_x),
                y1: ((cy - h / 2.0) * sy).clamp(0.0, max_y),
                x2: ((cx + w / 2.0) * sx).clamp(0.0, max_x),
                y2: ((cy + h / 2.0) * sy).clamp(0.0, max_y),
            },
        });
    }
    out
}

/// Greedy per-label suppression, highest confidence first.
fn non_max_suppression(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    let mut kept: Vec<Detection> = Vec::with_capacity(detections.len());
    for candidate in detections {
        let suppressed = kept
            .iter()
            .any(|k| k.label == candidate.label && k.bbox.iou(&candidate.bbox) > iou_threshold);
        if !suppressed {
            kept.push(candidate);
        }
    }
    kept
}
