use std::{
    net::SocketAddr,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

const CONFIG_ENV: &str = "CAMCOUNT_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "./config.yaml";

fn default_web_bind() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8000))
}

fn default_model_path() -> PathBuf {
    "./yolov8n.onnx".into()
}

fn default_model_input_size() -> u32 {
    640
}

fn default_iou_threshold() -> f32 {
    0.7
}

fn default_max_body_bytes() -> usize {
    64 * 1024 * 1024
}

fn default_target_label() -> String {
    "person".to_string()
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Config {
    #[serde(default = "default_web_bind")]
    pub web_bind: SocketAddr,
    #[serde(default)]
    pub prometheus_bind: Option<SocketAddr>,
    #[serde(default = "default_model_path")]
    pub model_path: PathBuf,
    #[serde(default = "default_model_input_size")]
    pub model_input_size: u32,
    // non-max suppression overlap, applied per class inside the detector
    #[serde(default = "default_iou_threshold")]
    pub iou_threshold: f32,
    #[serde(default = "default_target_label")]
    pub target_label: String,
    // one full-frame PNG data URI per camera easily exceeds axum's 2 MB default
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    #[serde(default)]
    pub response_mode: ResponseMode,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            web_bind: default_web_bind(),
            prometheus_bind: None,
            model_path: default_model_path(),
            model_input_size: default_model_input_size(),
            iou_threshold: default_iou_threshold(),
            target_label: default_target_label(),
            max_body_bytes: default_max_body_bytes(),
            response_mode: ResponseMode::default(),
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResponseMode {
    /// Counts only, keyed by camera.
    Basic,
    /// Counts plus a base64 PNG per camera with target detections outlined.
    #[default]
    Annotated,
}

impl Config {
    /// Loads the config from `explicit`, else `$CAMCOUNT_CONFIG`, else `./config.yaml`.
    ///
    /// Only the implicit default path may be absent, in which case every field takes its default.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let named = explicit.map(Path::to_path_buf).or_else(|| {
            std::env::var(CONFIG_ENV)
                .ok()
                .filter(|x| !x.is_empty())
                .map(PathBuf::from)
        });
        match named {
            Some(path) => Self::from_file(&path),
            None => {
                let path = Path::new(DEFAULT_CONFIG_PATH);
                if path.exists() {
                    Self::from_file(path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("failed to parse config file {}", path.display()))
    }

    pub fn parse(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(raw)?)
    }
}
