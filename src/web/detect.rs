use std::{sync::Arc, time::Instant};

use axum::{
    extract::{rejection::JsonRejection, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use indexmap::IndexMap;
use log::{error, info};
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, Histogram, IntCounter,
    IntCounterVec,
};
use serde::Serialize;
use serde_json::json;
use serde_with::{base64::Base64, serde_as};

use crate::{input::DetectionRequest, service::DetectionService};

use super::error::ClientInputError;

lazy_static::lazy_static! {
    static ref DETECT_REQUESTS: IntCounterVec = register_int_counter_vec!("camcount_detect_requests", "detect requests by outcome", &["outcome"]).unwrap();
    static ref DETECT_IMAGES: IntCounter = register_int_counter!("camcount_detect_images", "images run through the detector").unwrap();
    static ref DETECT_TARGETS: IntCounter = register_int_counter!("camcount_detect_targets", "target detections counted").unwrap();
    static ref DETECT_LATENCY: Histogram = register_histogram!("camcount_detect_latency_ms", "ms spent resolving, detecting and rendering", vec![10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0]).unwrap();
}

#[serde_as]
#[derive(Serialize)]
pub struct AnnotatedResponse {
    pub results: IndexMap<String, usize>,
    #[serde_as(as = "Vec<Base64>")]
    pub processed_images: Vec<Vec<u8>>,
}

pub async fn detect(
    State(service): State<Arc<DetectionService>>,
    body: Result<Json<DetectionRequest>, JsonRejection>,
) -> Result<Response, ClientInputError> {
    let result = run(service, body).await;
    DETECT_REQUESTS
        .with_label_values(&[if result.is_ok() { "ok" } else { "error" }])
        .inc();
    if let Err(e) = &result {
        error!("detect failed: {e}");
    }
    result
}

async fn run(
    service: Arc<DetectionService>,
    body: Result<Json<DetectionRequest>, JsonRejection>,
) -> Result<Response, ClientInputError> {
    let Json(request) = body?;
    let start = Instant::now();

    let outcome = tokio::task::spawn_blocking(move || service.process(&request))
        .await
        .map_err(|e| ClientInputError(format!("detection task failed: {e}")))??;

    let ms = start.elapsed().as_secs_f64() * 1000.0;
    let targets: usize = outcome.counts.values().sum();
    DETECT_LATENCY.observe(ms);
    DETECT_IMAGES.inc_by(outcome.counts.len() as u64);
    DETECT_TARGETS.inc_by(targets as u64);
    info!(
        "detected {targets} targets across {} images in {ms:.02} ms",
        outcome.counts.len()
    );

    Ok(match outcome.processed_images {
        None => Json(outcome.counts).into_response(),
        Some(processed_images) => Json(AnnotatedResponse {
            results: outcome.counts,
            processed_images,
        })
        .into_response(),
    })
}

pub async fn preflight() -> impl IntoResponse {
    (
        [
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
            (header::ACCESS_CONTROL_ALLOW_METHODS, "*"),
            (header::ACCESS_CONTROL_ALLOW_HEADERS, "*"),
        ],
        Json(json!({ "message": "OK" })),
    )
}
