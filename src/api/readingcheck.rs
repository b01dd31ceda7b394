use axum::{extract::State, Json};
use std::time::Duration;
use tokio::time::timeout;
use tracing::info;

use crate::domain::{merge_repairs, Repair};
use crate::scanner::check_readings;

use super::error::ApiError;
use super::AppState;

/// Walks the full reading history, merges the resulting repair into the
/// stored one and persists it. The scan visits every day since installation,
/// so it runs under its own timeout.
pub async fn run_readingcheck(
    State(state): State<AppState>,
) -> Result<Json<Repair>, ApiError> {
    let mut config = state.config_repo.load().await;

    let scan_budget = Duration::from_secs(state.settings.meter.scan_timeout_seconds);
    let scanned = timeout(scan_budget, check_readings(&state.store, &config))
        .await
        .map_err(|_| {
            ApiError::ServiceUnavailable("reading check did not finish in time".to_string())
        })??;

    let merged = merge_repairs(&config.repair, &scanned);
    info!(
        new_blacklisted = scanned.blacklist.len(),
        new_adjustments = scanned.adjustments.len(),
        total_blacklisted = merged.blacklist.len(),
        total_adjustments = merged.adjustments.len(),
        "reading check merged"
    );

    config.repair = merged.clone();
    state.config_repo.save(&config).await?;

    Ok(Json(merged))
}
