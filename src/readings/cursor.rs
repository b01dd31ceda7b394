use chrono::{Local, NaiveDate, NaiveDateTime, NaiveTime};
use std::collections::VecDeque;

use crate::config::MeterConfig;
use crate::domain::Reading;
use crate::error::{Error, Result};
use crate::meter::ReadingSource;

/// Lazy day-spanning cursor over raw readings, oldest first.
///
/// Readings come straight from the source, unfiltered and unrepaired, so the
/// repair scanner sees exact day-boundary values. The cursor is finite: it
/// ends after the last day before tomorrow. Cancellation is simply dropping
/// the cursor.
pub struct ForwardCursor<'a> {
    source: &'a dyn ReadingSource,
    config: &'a MeterConfig,
    from: NaiveDateTime,
    current_day: NaiveDate,
    /// Last day the cursor will visit (today at construction time).
    max_day: NaiveDate,
    buffer: VecDeque<Reading>,
}

impl<'a> ForwardCursor<'a> {
    pub fn new(
        source: &'a dyn ReadingSource,
        config: &'a MeterConfig,
        from: NaiveDateTime,
    ) -> Result<Self> {
        let today = Local::now().date_naive();
        let max_start = today
            .succ_opt()
            .map(|tomorrow| tomorrow.and_time(NaiveTime::MIN));
        if max_start.is_some_and(|max| from > max) {
            return Err(Error::Range("start date is in the future"));
        }

        Ok(Self {
            source,
            config,
            from,
            current_day: from.date(),
            max_day: today,
            buffer: VecDeque::new(),
        })
    }

    pub async fn next(&mut self) -> Option<Reading> {
        loop {
            if let Some(reading) = self.buffer.pop_front() {
                return Some(reading);
            }
            if self.current_day > self.max_day {
                return None;
            }

            let readings = self.source.fetch_day(self.current_day, self.config).await;
            self.buffer
                .extend(readings.into_iter().filter(|r| r.date_time >= self.from));
            self.current_day = self.current_day.succ_opt()?;
        }
    }
}

/// Like [`ForwardCursor`] but newest first, bounded below by `min_day`.
pub struct BackwardCursor<'a> {
    source: &'a dyn ReadingSource,
    config: &'a MeterConfig,
    from: NaiveDateTime,
    current_day: NaiveDate,
    min_day: NaiveDate,
    buffer: VecDeque<Reading>,
    done: bool,
}

impl<'a> BackwardCursor<'a> {
    pub fn new(
        source: &'a dyn ReadingSource,
        config: &'a MeterConfig,
        from: NaiveDateTime,
        min_day: NaiveDate,
    ) -> Result<Self> {
        if from < min_day.and_time(NaiveTime::MIN) {
            return Err(Error::Range("start date is before the minimum date"));
        }

        Ok(Self {
            source,
            config,
            from,
            current_day: from.date(),
            min_day,
            buffer: VecDeque::new(),
            done: false,
        })
    }

    pub async fn next(&mut self) -> Option<Reading> {
        loop {
            if let Some(reading) = self.buffer.pop_front() {
                return Some(reading);
            }
            if self.done || self.current_day < self.min_day {
                return None;
            }

            let readings = self.source.fetch_day(self.current_day, self.config).await;
            self.buffer.extend(
                readings
                    .into_iter()
                    .rev()
                    .filter(|r| r.date_time <= self.from),
            );
            match self.current_day.pred_opt() {
                Some(previous) => self.current_day = previous,
                None => self.done = true,
            }
        }
    }
}
