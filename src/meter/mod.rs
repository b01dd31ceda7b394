use async_trait::async_trait;
use chrono::NaiveDate;

use crate::config::MeterConfig;
use crate::domain::Reading;

pub mod openwb;

pub use openwb::OpenWbSource;

/// Source of raw meter readings, one local calendar day at a time.
///
/// Implementations return readings ordered by ascending timestamp and an
/// empty vector when the day is unavailable, for whatever reason: callers
/// treat "no data" uniformly whether caused by network, a missing log file
/// or a parse failure.
#[async_trait]
pub trait ReadingSource: Send + Sync {
    async fn fetch_day(&self, day: NaiveDate, config: &MeterConfig) -> Vec<Reading>;
}
