use chrono::NaiveDateTime;
use futures::future::try_join_all;

use crate::config::MeterConfig;
use crate::domain::{Balance, BuyPrice, Energy, Reading};
use crate::error::{Error, Result};
use crate::readings::ReadingStore;

const DAYS_PER_YEAR: f64 = 365.0;
const SECONDS_PER_DAY: f64 = 86_400.0;

/// Derives the monetary balance over `[from, to)` in start-of-day readings.
///
/// The range is split into segments at every buy-price change inside
/// `(from, to]`, each segment is priced with the schedule entry in effect at
/// its start, and the segment results are summed. Fails when any boundary
/// reading cannot be resolved: a partial balance would be silently wrong.
pub async fn calculate_balance(
    store: &ReadingStore,
    from: NaiveDateTime,
    to: NaiveDateTime,
    config: &MeterConfig,
) -> Result<Balance> {
    let from_reading = store.start_of_day_reading(from.date(), config).await?;
    let to_reading = store.start_of_day_reading(to.date(), config).await?;

    // price changes inside the range introduce additional checkpoints; the
    // day fetches behind them are independent, so issue them concurrently
    let price_changes: Vec<&BuyPrice> = config
        .buy_prices
        .iter()
        .filter(|price| price.date > from && price.date <= to)
        .collect();
    let intermediates = try_join_all(
        price_changes
            .iter()
            .map(|price| store.start_of_day_reading(price.date.date(), config)),
    )
    .await?;

    let mut boundary_readings: Vec<Option<Reading>> = Vec::with_capacity(intermediates.len() + 2);
    boundary_readings.push(from_reading);
    boundary_readings.extend(intermediates);
    boundary_readings.push(to_reading);

    let mut checkpoints: Vec<Reading> = boundary_readings
        .into_iter()
        .collect::<Option<Vec<_>>>()
        .ok_or(Error::DataUnavailable)?;
    checkpoints.sort_by_key(|reading| reading.date_time);

    let mut selling_income = 0.0;
    let mut savings = 0.0;
    let mut buying_unit_costs = 0.0;
    let mut buying_base_costs = 0.0;

    for segment in checkpoints.windows(2) {
        let energy = Energy::from_readings(&segment[0], &segment[1]);
        let buy_price = config
            .buy_prices
            .iter()
            .rev()
            .find(|price| price.date <= segment[0].date_time)
            .cloned()
            .unwrap_or_else(BuyPrice::zero);

        selling_income += energy.grid_out * config.sell_price;
        savings += (energy.direct_pv_consumption() + energy.battery_out) * buy_price.unit_price;
        buying_unit_costs += energy.grid_in * buy_price.unit_price;

        let segment_days =
            (segment[1].date_time - segment[0].date_time).num_seconds() as f64 / SECONDS_PER_DAY;
        buying_base_costs += buy_price.base_price_per_year * (segment_days / DAYS_PER_YEAR);
    }

    Ok(Balance {
        selling_income: round_cents(selling_income),
        savings: round_cents(savings),
        buying_unit_costs: round_cents(buying_unit_costs),
        // pro-rated fractional-day accumulation is kept precise
        buying_base_costs,
    })
}

fn round_cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meter::testing::{date, dt, FakeSource};
    use std::sync::Arc;

    fn boundary_reading(day: &str, values: [f64; 6]) -> Reading {
        Reading {
            date_time: dt(&format!("{day}T00:00:00")),
            grid_in: values[0],
            grid_out: values[1],
            pv: values[2],
            wallbox: values[3],
            battery_in: values[4],
            battery_out: values[5],
            battery_soc: 50.0,
        }
    }

    fn seeded_store() -> ReadingStore {
        let source = FakeSource::new();
        source.set_day(
            date("2024-08-01"),
            vec![boundary_reading("2024-08-01", [10.0, 20.0, 30.0, 40.0, 50.0, 60.0])],
        );
        source.set_day(
            date("2024-08-11"),
            vec![boundary_reading("2024-08-11", [11.0, 240.0, 350.0, 60.0, 80.0, 85.0])],
        );
        source.set_day(
            date("2024-09-01"),
            vec![boundary_reading("2024-09-01", [13.0, 670.0, 1030.0, 110.0, 150.0, 150.0])],
        );
        ReadingStore::new(Arc::new(source))
    }

    fn base_config() -> MeterConfig {
        MeterConfig {
            installation_date: Some(dt("2024-08-01T00:00:00")),
            sell_price: 0.08,
            ..MeterConfig::default()
        }
    }

    #[tokio::test]
    async fn constant_price_over_the_whole_period() {
        let store = seeded_store();
        let mut config = base_config();
        config.buy_prices = vec![BuyPrice {
            date: dt("2024-08-01T00:00:00"),
            unit_price: 0.25,
            base_price_per_year: 150.0,
        }];

        let balance = calculate_balance(
            &store,
            dt("2024-08-01T00:00:00"),
            dt("2024-09-01T00:00:00"),
            &config,
        )
        .await
        .unwrap();

        assert_eq!(balance.selling_income, 650.0 * 0.08);
        assert_eq!(balance.savings, (90.0 + 1000.0 - 650.0 - 100.0) * 0.25);
        assert_eq!(balance.buying_unit_costs, 3.0 * 0.25);
        let expected_base = 150.0 * (31.0 / 365.0);
        assert!((balance.buying_base_costs - expected_base).abs() < 1e-9);
    }

    #[tokio::test]
    async fn price_change_splits_the_period() {
        let store = seeded_store();
        let mut config = base_config();
        config.buy_prices = vec![
            BuyPrice {
                date: dt("2024-07-01T00:00:00"),
                unit_price: 0.25,
                base_price_per_year: 150.0,
            },
            BuyPrice {
                date: dt("2024-08-11T00:00:00"),
                unit_price: 0.30,
                base_price_per_year: 150.0,
            },
        ];

        let balance = calculate_balance(
            &store,
            dt("2024-08-01T00:00:00"),
            dt("2024-09-01T00:00:00"),
            &config,
        )
        .await
        .unwrap();

        assert_eq!(balance.selling_income, 650.0 * 0.08);
        let expected_savings =
            (25.0 + 320.0 - 220.0 - 30.0) * 0.25 + (65.0 + 680.0 - 430.0 - 70.0) * 0.30;
        assert_eq!(balance.savings, round_cents(expected_savings));
        assert_eq!(balance.buying_unit_costs, 1.0 * 0.25 + 2.0 * 0.30);
    }

    #[tokio::test]
    async fn no_price_entry_before_the_segment_falls_back_to_zero() {
        let store = seeded_store();
        let mut config = base_config();
        config.buy_prices = vec![];

        let balance = calculate_balance(
            &store,
            dt("2024-08-01T00:00:00"),
            dt("2024-09-01T00:00:00"),
            &config,
        )
        .await
        .unwrap();

        assert_eq!(balance.selling_income, 650.0 * 0.08);
        assert_eq!(balance.savings, 0.0);
        assert_eq!(balance.buying_unit_costs, 0.0);
        assert_eq!(balance.buying_base_costs, 0.0);
    }

    #[tokio::test]
    async fn unresolved_boundary_reading_fails() {
        let store = ReadingStore::new(Arc::new(FakeSource::new()));
        let config = base_config();

        let result = calculate_balance(
            &store,
            dt("2024-08-01T00:00:00"),
            dt("2024-09-01T00:00:00"),
            &config,
        )
        .await;

        assert!(matches!(result, Err(Error::DataUnavailable)));
    }
}
