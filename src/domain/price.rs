use chrono::{NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

/// One entry of the buying price schedule, effective from `date` (inclusive)
/// until the next entry takes over.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuyPrice {
    pub date: NaiveDateTime,
    /// Currency per kWh.
    pub unit_price: f64,
    pub base_price_per_year: f64,
}

impl BuyPrice {
    /// Fallback used when no schedule entry predates an instant.
    pub fn zero() -> Self {
        Self {
            date: NaiveDateTime::new(
                chrono::NaiveDate::from_ymd_opt(1970, 1, 1).expect("epoch date"),
                NaiveTime::MIN,
            ),
            unit_price: 0.0,
            base_price_per_year: 0.0,
        }
    }
}

/// Monetary outcome over a date range. Derived, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Balance {
    pub selling_income: f64,
    pub savings: f64,
    pub buying_unit_costs: f64,
    pub buying_base_costs: f64,
}
