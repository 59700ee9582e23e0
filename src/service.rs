use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use indexmap::IndexMap;
use log::debug;

use crate::{
    config::ResponseMode,
    detector::{detect_batch, Detector},
    input::DetectionRequest,
    render::{annotate, count_by_camera, encode_png},
};

/// The resolve → detect → aggregate pipeline around one loaded model.
///
/// The model is loaded once at startup and never replaced. `None` means loading failed; the
/// service still answers health checks but every detection fails.
pub struct DetectionService {
    detector: Option<Arc<dyn Detector>>,
    target_label: String,
    mode: ResponseMode,
}

pub struct DetectionOutcome {
    pub counts: IndexMap<String, usize>,
    /// PNG bytes per camera, present in annotated mode.
    pub processed_images: Option<Vec<Vec<u8>>>,
}

impl DetectionService {
    pub fn new(
        detector: Option<Arc<dyn Detector>>,
        target_label: impl Into<String>,
        mode: ResponseMode,
    ) -> Self {
        Self {
            detector,
            target_label: target_label.into(),
            mode,
        }
    }

    pub fn model_loaded(&self) -> bool {
        self.detector.is_some()
    }

    pub fn mode(&self) -> ResponseMode {
        self.mode
    }

    /// Blocking; callers on the async runtime go through `spawn_blocking`.
    pub fn process(&self, request: &DetectionRequest) -> Result<DetectionOutcome> {
        let detector = self
            .detector
            .as_deref()
            .ok_or_else(|| anyhow!("detection model is not loaded"))?;

        let images = request.resolve()?;
        let detections = detect_batch(detector, &images)?;
        let counts = count_by_camera(&detections, &self.target_label);
        for (camera, count) in &counts {
            debug!("{camera}: {count} {}", self.target_label);
        }

        let processed_images = match self.mode {
            ResponseMode::Basic => None,
            ResponseMode::Annotated => Some(
                images
                    .iter()
                    .zip(&detections)
                    .enumerate()
                    .map(|(i, (image, dets))| {
                        encode_png(&annotate(image, dets, &self.target_label))
                            .with_context(|| format!("failed to encode annotated image {i}"))
                    })
                    .collect::<Result<Vec<_>>>()?,
            ),
        };

        Ok(DetectionOutcome {
            counts,
            processed_images,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::testing::{detection, ScriptedDetector};
    use crate::input::tests::data_uri;

    fn request(n: usize) -> DetectionRequest {
        DetectionRequest {
            images: Some((0..n).map(|i| data_uri(10 + i as u32, 8)).collect()),
            path_list: None,
        }
    }

    fn service(detector: Arc<ScriptedDetector>, mode: ResponseMode) -> DetectionService {
        DetectionService::new(Some(detector as Arc<dyn Detector>), "person", mode)
    }

    #[test]
    fn counts_targets_per_camera() {
        let detector = Arc::new(ScriptedDetector::new(vec![
            vec![
                detection("person", 0.9, (0.0, 0.0, 4.0, 4.0)),
                detection("chair", 0.8, (1.0, 1.0, 3.0, 3.0)),
                detection("person", 0.55, (2.0, 2.0, 6.0, 6.0)),
            ],
            vec![detection("dog", 0.9, (0.0, 0.0, 4.0, 4.0))],
            vec![detection("person", 0.3, (0.0, 0.0, 4.0, 4.0))],
        ]));
        let outcome = service(detector.clone(), ResponseMode::Basic)
            .process(&request(3))
            .unwrap();
        let pairs: Vec<_> = outcome.counts.iter().map(|(k, v)| (k.as_str(), *v)).collect();
        assert_eq!(pairs, vec![("camera_0", 2), ("camera_1", 0), ("camera_2", 0)]);
        assert!(outcome.processed_images.is_none());
        assert_eq!(detector.calls(), 1);
    }

    #[test]
    fn annotated_mode_returns_one_png_per_image() {
        let detector = Arc::new(ScriptedDetector::new(vec![vec![detection(
            "person",
            0.9,
            (1.0, 1.0, 5.0, 5.0),
        )]]));
        let outcome = service(detector, ResponseMode::Annotated)
            .process(&request(2))
            .unwrap();
        let processed = outcome.processed_images.unwrap();
        assert_eq!(processed.len(), 2);
        for (i, png) in processed.iter().enumerate() {
            let decoded = image::load_from_memory(png).unwrap();
            assert_eq!((decoded.width(), decoded.height()), (10 + i as u32, 8));
        }
    }

    #[test]
    fn custom_target_label() {
        let detector: Arc<dyn Detector> = Arc::new(ScriptedDetector::new(vec![vec![
            detection("car", 0.9, (0.0, 0.0, 4.0, 4.0)),
            detection("person", 0.9, (0.0, 0.0, 4.0, 4.0)),
        ]]));
        let outcome = DetectionService::new(Some(detector), "car", ResponseMode::Basic)
            .process(&request(1))
            .unwrap();
        assert_eq!(outcome.counts["camera_0"], 1);
    }

    #[test]
    fn unloaded_model_fails_without_resolving() {
        let service = DetectionService::new(None, "person", ResponseMode::Basic);
        assert!(!service.model_loaded());
        let err = service.process(&DetectionRequest::default()).err().unwrap();
        assert_eq!(err.to_string(), "detection model is not loaded");
    }

    #[test]
    fn decode_failure_skips_detector() {
        let detector = Arc::new(ScriptedDetector::new(vec![]));
        let bad = DetectionRequest {
            images: Some(vec!["no comma here".to_string()]),
            path_list: None,
        };
        assert!(service(detector.clone(), ResponseMode::Basic).process(&bad).is_err());
        assert_eq!(detector.calls(), 0);
    }
}
