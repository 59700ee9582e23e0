use std::{net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};

use axum_util::logger::{LoggerConfig, LoggerLayer};
use clap::Parser;
use config::Config;
use detector::{Detector, YoloDetector};
use log::{error, info, Level};
use service::DetectionService;

mod config;
mod detector;
mod input;
mod render;
mod service;
mod web;

lazy_static::lazy_static! {
    static ref ARGS: Args = Args::parse();
}

/// Camera person counter
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Path to the YAML config, overrides CAMCOUNT_CONFIG
    #[clap(short, long)]
    config: Option<PathBuf>,
    /// Loads the model, reports whether it loaded and exits
    #[clap(long)]
    check_model: bool,
}

fn load_detector(config: &Config) -> Option<Arc<dyn Detector>> {
    match YoloDetector::load(
        &config.model_path,
        config.model_input_size,
        config.iou_threshold,
    ) {
        Ok(detector) => {
            info!(
                "loaded {} model from {}",
                detector.name(),
                config.model_path.display()
            );
            Some(Arc::new(detector))
        }
        Err(e) => {
            error!("failed to load detection model: {e:#}");
            None
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    lazy_static::initialize(&ARGS);

    env_logger::Builder::new()
        .parse_env(env_logger::Env::default().default_filter_or("info"))
        .init();

    let config = Config::load(ARGS.config.as_deref())?;

    let detector = load_detector(&config);
    if ARGS.check_model {
        if detector.is_none() {
            anyhow::bail!("model {} did not load", config.model_path.display());
        }
        return Ok(());
    }

    if let Some(prometheus_bind) = config.prometheus_bind {
        prometheus_exporter::start(prometheus_bind)?;
    }

    let service = Arc::new(DetectionService::new(
        detector,
        config.target_label.clone(),
        config.response_mode,
    ));

    loop {
        let logger = LoggerLayer::new(LoggerConfig {
            log_level_filter: Arc::new(|x| {
                if x == "/health" {
                    Level::Debug
                } else {
                    Level::Info
                }
            }),
            honor_xff: true,
            metric_name: "camcount_web_responses".to_string(),
        });
        let app = web::route(service.clone(), config.max_body_bytes).layer(logger);
        info!(
            "listening @ {} ({:?} responses)",
            config.web_bind, config.response_mode
        );
        let served = axum::Server::bind(&config.web_bind)
            .serve(app.into_make_service_with_connect_info::<SocketAddr>())
            .await;
        if let Err(e) = served {
            error!("failed to start api server: {:?}", e);
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
}
