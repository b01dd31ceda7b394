use std::collections::VecDeque;
use tracing::{debug, info};

use crate::config::MeterConfig;
use crate::domain::{
    check_inconsistent, correct_reading, Reading, ReadingAdjustment, ReadingField,
    ReadingInconsistency, Repair,
};
use crate::error::{Error, Result};
use crate::readings::{ForwardCursor, ReadingStore};

/// Empirical threshold separating "counter reset to zero" from "counter
/// jumped backward": the post-discontinuity rate of increase must stay
/// within this factor of the historical rate to count as a reset. Taken
/// over from field observation, not derived.
pub const RESET_RATE_FACTOR: f64 = 2.0;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// What to do with the current lookahead window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanStep {
    /// R1,R2 consistent (or a discontinuity was recorded): slide by one.
    Scanning,
    /// R2 is a single bad sample: blacklist it, resume at R3.
    SkipOne,
    /// R2 and R3 are bad samples: blacklist both, resume at R4.
    SkipTwo,
    /// Genuine discontinuity: record an adjustment anchored at R2.
    RecordReset,
}

/// Walks the whole reading history forward from the installation date and
/// produces a repair document for every inconsistency found.
///
/// A four-reading lookahead window distinguishes transient single-sample
/// glitches (blacklisted) from genuine counter discontinuities (adjusted).
/// Days without readings are simply skipped; the scan never fails on gaps.
pub async fn check_readings(store: &ReadingStore, config: &MeterConfig) -> Result<Repair> {
    let installation = config
        .installation_date
        .ok_or(Error::Configuration("installation date is not set"))?;

    let mut cursor = ForwardCursor::new(store.source(), config, installation)?;
    let mut repair = Repair::default();

    let mut window: VecDeque<Reading> = VecDeque::with_capacity(4);
    refill(&mut window, &mut cursor).await;

    while window.len() >= 2 {
        let step = match check_inconsistent(&window[0], &window[1]) {
            None => ScanStep::Scanning,
            Some(inconsistency) => {
                let step = classify(&window);
                if step == ScanStep::RecordReset {
                    let adjustment =
                        make_adjustment(&inconsistency, store, config, &repair).await;
                    debug!(at = %adjustment.date_time, "recording counter discontinuity");
                    repair.adjustments.push(adjustment);
                }
                step
            }
        };

        match step {
            ScanStep::Scanning | ScanStep::RecordReset => {
                window.pop_front();
            }
            ScanStep::SkipOne => {
                repair.blacklist.push(window[1].local_iso());
                window.pop_front();
                window.pop_front();
            }
            ScanStep::SkipTwo => {
                repair.blacklist.push(window[1].local_iso());
                repair.blacklist.push(window[2].local_iso());
                window.pop_front();
                window.pop_front();
                window.pop_front();
            }
        }

        refill(&mut window, &mut cursor).await;
    }

    info!(
        blacklisted = repair.blacklist.len(),
        adjustments = repair.adjustments.len(),
        "reading check finished"
    );

    Ok(repair)
}

async fn refill(window: &mut VecDeque<Reading>, cursor: &mut ForwardCursor<'_>) {
    while window.len() < 4 {
        match cursor.next().await {
            Some(reading) => window.push_back(reading),
            None => break,
        }
    }
}

/// R1,R2 are inconsistent. If R1,R3 agree the window holds one bad sample;
/// if R1,R4 agree it holds two; otherwise the discontinuity is real.
fn classify(window: &VecDeque<Reading>) -> ScanStep {
    if window.len() >= 3 && check_inconsistent(&window[0], &window[2]).is_none() {
        return ScanStep::SkipOne;
    }
    if window.len() >= 4 && check_inconsistent(&window[0], &window[3]).is_none() {
        return ScanStep::SkipTwo;
    }
    ScanStep::RecordReset
}

async fn make_adjustment(
    inconsistency: &ReadingInconsistency,
    store: &ReadingStore,
    config: &MeterConfig,
    repair: &Repair,
) -> ReadingAdjustment {
    let mut adjustment = ReadingAdjustment::new(
        inconsistency.second.date_time,
        inconsistency.first,
        inconsistency.second,
    );

    for field in ReadingField::ALL {
        if inconsistency.is_decreased(field) {
            *adjustment.delta_mut(field) =
                field_adjustment(field, inconsistency, store, config, repair).await;
        }
    }

    adjustment
}

/// Decides per field whether the discontinuity was a hard reset to zero or
/// a backward jump, by comparing the daily rate of increase before and
/// after the break.
///
/// Rates close to each other mean the counter restarted from zero and kept
/// counting at its usual pace: the adjustment re-bases all later readings
/// by R1's repaired value. Rates far apart mean the counter jumped to some
/// non-zero value: the adjustment bridges the gap directly.
async fn field_adjustment(
    field: ReadingField,
    inconsistency: &ReadingInconsistency,
    store: &ReadingStore,
    config: &MeterConfig,
    repair: &Repair,
) -> f64 {
    let installation_day = match config.installation_date {
        Some(installation) => installation.date(),
        None => return 0.0,
    };

    let repaired = |reading: &Reading| correct_reading(reading, repair).unwrap_or(*reading);

    let first_ever = match store.first_reading(installation_day, config).await {
        Some(reading) => repaired(&reading),
        None => return 0.0,
    };
    let first = repaired(&inconsistency.first);
    let second = repaired(&inconsistency.second);

    // IEEE semantics are intentional here: a zero-length history yields an
    // infinite or NaN rate, which fails the reset comparison and falls
    // through to the backward-jump branch.
    let history_seconds = (first.date_time - first_ever.date_time).num_seconds() as f64;
    let up_to_date_rate =
        (first.field(field) - first_ever.field(field)) * SECONDS_PER_DAY / history_seconds;

    let break_seconds =
        (inconsistency.second.date_time - inconsistency.first.date_time).num_seconds() as f64;
    let resetted_rate = inconsistency.second.field(field) * SECONDS_PER_DAY / break_seconds;

    let is_reset = (resetted_rate - up_to_date_rate).abs() < up_to_date_rate * RESET_RATE_FACTOR;

    if is_reset {
        first.field(field)
    } else {
        first.field(field) - second.field(field)
    }
}
