pub mod balance;
pub mod config;
pub mod error;
pub mod health;
pub mod readingcheck;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::Config;
use crate::meter::OpenWbSource;
use crate::readings::ReadingStore;
use crate::repo::ConfigRepository;

/// Shared service state: one reading store and one config repository for the
/// life of the process.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<ReadingStore>,
    pub config_repo: Arc<ConfigRepository>,
    pub settings: Arc<Config>,
}

impl AppState {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let source = OpenWbSource::new(Duration::from_secs(cfg.meter.http_timeout_seconds))?;
        Ok(Self {
            store: Arc::new(ReadingStore::new(Arc::new(source))),
            config_repo: Arc::new(ConfigRepository::new(cfg.storage.config_file.clone())),
            settings: Arc::new(cfg.clone()),
        })
    }
}

pub fn router(state: AppState, cfg: &Config) -> Router {
    let v1 = Router::new()
        .route("/balance", get(balance::get_balance))
        .route("/config", get(config::get_config).put(config::put_config))
        .route("/health", get(health::health))
        .layer(TimeoutLayer::new(Duration::from_secs(
            cfg.server.request_timeout_secs,
        )))
        // the history walk carries its own, longer timeout
        .route("/readingcheck", post(readingcheck::run_readingcheck))
        .with_state(state);

    Router::new()
        .nest("/api/v1", v1)
        .layer(
            ServiceBuilder::new()
                .layer(axum::extract::DefaultBodyLimit::max(1024 * 1024))
                .layer(TraceLayer::new_for_http()),
        )
}
