use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    routing::{self, MethodRouter},
    Router,
};
use tower_http::cors::CorsLayer;

use crate::{config::ResponseMode, service::DetectionService};

mod detect;
mod error;
mod health;

pub fn route(service: Arc<DetectionService>, max_body_bytes: usize) -> Router {
    let mut health: MethodRouter<Arc<DetectionService>> = routing::get(health::health);
    let mut detect: MethodRouter<Arc<DetectionService>> =
        routing::post(detect::detect).layer(DefaultBodyLimit::max(max_body_bytes));
    if service.mode() == ResponseMode::Annotated {
        // the preflight handler is added after the layer so CorsLayer does not swallow it
        health = health.layer(CorsLayer::permissive());
        detect = detect
            .layer(CorsLayer::permissive())
            .options(detect::preflight);
    }
    Router::new()
        .route("/health", health)
        .route("/detect", detect)
        .with_state(service)
}
