use axum::{extract::State, http::StatusCode, Json};

use crate::config::MeterConfig;

use super::error::ApiError;
use super::AppState;

pub async fn get_config(State(state): State<AppState>) -> Json<MeterConfig> {
    Json(state.config_repo.load().await)
}

pub async fn put_config(
    State(state): State<AppState>,
    Json(config): Json<MeterConfig>,
) -> Result<StatusCode, ApiError> {
    if config.wallbox_host.is_empty() {
        return Err(ApiError::BadRequest("wallbox host must not be empty".to_string()));
    }
    if !config.buy_prices.windows(2).all(|w| w[0].date <= w[1].date) {
        return Err(ApiError::BadRequest(
            "buy prices must be ordered by date".to_string(),
        ));
    }

    state.config_repo.save(&config).await?;
    Ok(StatusCode::NO_CONTENT)
}
