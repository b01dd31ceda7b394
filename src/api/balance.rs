use axum::{
    extract::{Query, State},
    Json,
};
use chrono::{Duration, Local, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::balance::calculate_balance;
use crate::domain::{Balance, Reading};

use super::error::ApiError;
use super::AppState;

#[derive(Debug, Deserialize)]
pub struct BalanceQuery {
    /// First day of the range, inclusive. Defaults to today.
    pub from: Option<NaiveDate>,
    /// Last day of the range, inclusive. Defaults to today.
    pub to: Option<NaiveDate>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceResponse {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub start_reading: Reading,
    pub end_reading: Reading,
    pub balance: Balance,
}

/// Balance over an inclusive day range: readings are taken at the start of
/// `from` and at the start of the day after `to`.
pub async fn get_balance(
    State(state): State<AppState>,
    Query(query): Query<BalanceQuery>,
) -> Result<Json<BalanceResponse>, ApiError> {
    let today = Local::now().date_naive();
    let from = query.from.unwrap_or(today);
    let to = query.to.unwrap_or(today);

    if from > to {
        return Err(ApiError::BadRequest("from must not be after to".to_string()));
    }

    let config = state.config_repo.load().await;

    let from_instant = from.and_time(NaiveTime::MIN);
    let end_exclusive = (to + Duration::days(1)).and_time(NaiveTime::MIN);

    let balance =
        calculate_balance(&state.store, from_instant, end_exclusive, &config).await?;

    let start_reading = state
        .store
        .start_of_day_reading(from, &config)
        .await?
        .ok_or(crate::error::Error::DataUnavailable)?;
    let end_reading = state
        .store
        .start_of_day_reading(end_exclusive.date(), &config)
        .await?
        .ok_or(crate::error::Error::DataUnavailable)?;

    Ok(Json(BalanceResponse {
        from,
        to,
        start_reading,
        end_reading,
        balance,
    }))
}
