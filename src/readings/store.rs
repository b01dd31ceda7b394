use chrono::{Duration, Local, NaiveDate, NaiveTime};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use crate::config::MeterConfig;
use crate::domain::{correct_reading, DayReadings, Reading};
use crate::error::{Error, Result};
use crate::meter::ReadingSource;

/// Data newer than this is considered volatile and refetched on access.
const STALE_AFTER_MINUTES: i64 = 5;

/// Process-wide reading state: the per-day cache of reconciled boundary
/// readings plus the memoized first-ever and last-known readings.
///
/// One instance lives for the life of the service; tests construct isolated
/// instances around a fake source.
pub struct ReadingStore {
    source: Arc<dyn ReadingSource>,
    cache: RwLock<HashMap<NaiveDate, DayReadings>>,
    /// One fetch in flight per calendar day, so concurrent requests do not
    /// race duplicate upstream fetches.
    inflight: Mutex<HashMap<NaiveDate, Arc<Mutex<()>>>>,
    first_reading: RwLock<Option<Reading>>,
    last_reading: RwLock<Option<Reading>>,
}

impl ReadingStore {
    pub fn new(source: Arc<dyn ReadingSource>) -> Self {
        Self {
            source,
            cache: RwLock::new(HashMap::new()),
            inflight: Mutex::new(HashMap::new()),
            first_reading: RwLock::new(None),
            last_reading: RwLock::new(None),
        }
    }

    pub fn source(&self) -> &dyn ReadingSource {
        self.source.as_ref()
    }

    /// The repaired reading in effect at the start of `day`.
    ///
    /// Days before the installation date resolve to the first-ever reading,
    /// days after today (or after the last known reading) to the last known
    /// reading. Otherwise the day's own cache entry is used, falling back to
    /// the previous day's end-of-day value for days without readings. The
    /// result passes through the repair document; a blacklisted boundary
    /// resolves to `None`.
    pub async fn start_of_day_reading(
        &self,
        day: NaiveDate,
        config: &MeterConfig,
    ) -> Result<Option<Reading>> {
        let installation = config
            .installation_date
            .ok_or(Error::Configuration("installation date is not set"))?;
        let installation_day = installation.date();
        let today = Local::now().date_naive();

        let last_known = *self.last_reading.read().await;
        let after_last_known =
            last_known.is_some_and(|last| day.and_time(NaiveTime::MIN) > last.date_time);

        let reading = if day < installation_day {
            self.first_reading(installation_day, config).await
        } else if day > today || after_last_known {
            self.last_reading(installation_day, config).await
        } else if let Some(readings) = self.day_readings(day, config).await {
            Some(readings.start_of_day)
        } else if let Some(previous) = day.pred_opt() {
            self.day_readings(previous, config)
                .await
                .map(|readings| readings.end_of_day)
        } else {
            None
        };

        Ok(reading.and_then(|r| correct_reading(&r, &config.repair)))
    }

    /// First reading ever recorded, found by scanning forward from the
    /// installation date until a non-empty day appears. Past data never
    /// changes, so the result is memoized for the process lifetime.
    pub async fn first_reading(
        &self,
        min_date: NaiveDate,
        config: &MeterConfig,
    ) -> Option<Reading> {
        if let Some(reading) = *self.first_reading.read().await {
            return Some(reading);
        }

        let today = Local::now().date_naive();
        let mut day = min_date;
        while day <= today {
            if let Some(readings) = self.day_readings(day, config).await {
                let first = readings.start_of_day;
                *self.first_reading.write().await = Some(first);
                debug!(day = %day, "first reading located");
                return Some(first);
            }
            day = day.succ_opt()?;
        }

        None
    }

    /// Most recent reading, found by scanning backward from today down to
    /// `min_date`. Refreshed at most every five minutes; when the refresh
    /// finds nothing the previous value is kept.
    pub async fn last_reading(&self, min_date: NaiveDate, config: &MeterConfig) -> Option<Reading> {
        let now = Local::now().naive_local();
        if let Some(reading) = *self.last_reading.read().await {
            if now - reading.date_time < Duration::minutes(STALE_AFTER_MINUTES) {
                return Some(reading);
            }
        }

        let mut day = Local::now().date_naive();
        while day >= min_date {
            if let Some(readings) = self.day_readings(day, config).await {
                let last = readings.end_of_day;
                *self.last_reading.write().await = Some(last);
                return Some(last);
            }
            day = day.pred_opt()?;
        }

        *self.last_reading.read().await
    }

    /// The cached boundary readings of one day.
    ///
    /// Entries for past days are immutable and always served from the cache.
    /// Today's entry is served as long as its end-of-day reading is less
    /// than five minutes old, refetched otherwise; a refetch that yields
    /// nothing keeps the stale entry rather than dropping it.
    pub async fn day_readings(
        &self,
        day: NaiveDate,
        config: &MeterConfig,
    ) -> Option<DayReadings> {
        if let Some(cached) = self.fresh_cache_entry(day).await {
            return Some(cached);
        }

        let gate = {
            let mut inflight = self.inflight.lock().await;
            inflight
                .entry(day)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        let resolved = {
            let _fetching = gate.lock().await;

            // Another request may have completed the fetch while we waited.
            if let Some(cached) = self.fresh_cache_entry(day).await {
                Some(cached)
            } else {
                let readings = self.source.fetch_day(day, config).await;
                if let (Some(first), Some(last)) = (readings.first(), readings.last()) {
                    let entry = DayReadings {
                        start_of_day: *first,
                        end_of_day: *last,
                    };
                    self.cache.write().await.insert(day, entry);
                    Some(entry)
                } else {
                    // Prefer a stale value over nothing when the refetch
                    // came up empty.
                    self.cache.read().await.get(&day).copied()
                }
            }
        };

        // Past days are served from the cache and never re-enter the gate;
        // dropping the entry keeps the map from growing one key per day
        // ever fetched. Waiters holding a clone of the gate are unaffected.
        self.inflight.lock().await.remove(&day);

        resolved
    }

    async fn fresh_cache_entry(&self, day: NaiveDate) -> Option<DayReadings> {
        let cached = *self.cache.read().await.get(&day)?;
        let today = Local::now().date_naive();
        let now = Local::now().naive_local();
        if day < today || now - cached.end_of_day.date_time < Duration::minutes(STALE_AFTER_MINUTES) {
            Some(cached)
        } else {
            None
        }
    }
}
