use std::sync::Arc;

use axum::{extract::State, Json};
use serde::Serialize;

use crate::service::DetectionService;

#[derive(Serialize)]
pub struct Health {
    pub status: &'static str,
    pub model_loaded: bool,
}

pub async fn health(State(service): State<Arc<DetectionService>>) -> Json<Health> {
    Json(Health {
        status: "healthy",
        model_loaded: service.model_loaded(),
    })
}
