use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::reading::{Reading, ReadingField};

/// Counter decreases smaller than this are treated as measurement noise.
pub const CONSISTENCY_TOLERANCE: f64 = 0.001;

/// An additive correction valid for every reading at or after `date_time`.
///
/// The two raw readings that triggered the adjustment are kept so a repair
/// document stays auditable after the fact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadingAdjustment {
    pub date_time: NaiveDateTime,
    pub grid_in: f64,
    pub grid_out: f64,
    pub pv: f64,
    pub wallbox: f64,
    pub battery_in: f64,
    pub battery_out: f64,
    pub readings: Vec<Reading>,
}

impl ReadingAdjustment {
    pub fn new(date_time: NaiveDateTime, first: Reading, second: Reading) -> Self {
        Self {
            date_time,
            grid_in: 0.0,
            grid_out: 0.0,
            pv: 0.0,
            wallbox: 0.0,
            battery_in: 0.0,
            battery_out: 0.0,
            readings: vec![first, second],
        }
    }

    pub fn delta(&self, field: ReadingField) -> f64 {
        match field {
            ReadingField::GridIn => self.grid_in,
            ReadingField::GridOut => self.grid_out,
            ReadingField::Pv => self.pv,
            ReadingField::Wallbox => self.wallbox,
            ReadingField::BatteryIn => self.battery_in,
            ReadingField::BatteryOut => self.battery_out,
        }
    }

    pub fn delta_mut(&mut self, field: ReadingField) -> &mut f64 {
        match field {
            ReadingField::GridIn => &mut self.grid_in,
            ReadingField::GridOut => &mut self.grid_out,
            ReadingField::Pv => &mut self.pv,
            ReadingField::Wallbox => &mut self.wallbox,
            ReadingField::BatteryIn => &mut self.battery_in,
            ReadingField::BatteryOut => &mut self.battery_out,
        }
    }
}

/// Accumulated corrections for a reading history: excluded timestamps plus
/// additive adjustments, both kept sorted for deterministic replay.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Repair {
    #[serde(default)]
    pub blacklist: Vec<String>,
    #[serde(default)]
    pub adjustments: Vec<ReadingAdjustment>,
}

/// Two time-ordered readings where at least one cumulative counter went
/// backwards, with a flag per affected counter.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadingInconsistency {
    pub first: Reading,
    pub second: Reading,
    decreased: [bool; 6],
}

impl ReadingInconsistency {
    pub fn is_decreased(&self, field: ReadingField) -> bool {
        self.decreased[field as usize]
    }
}

/// Flags every cumulative counter that decreased beyond tolerance between
/// two time-ordered readings, the signature of a counter reset or backward
/// jump. Returns `None` when all counters are non-decreasing.
pub fn check_inconsistent(first: &Reading, second: &Reading) -> Option<ReadingInconsistency> {
    let mut decreased = [false; 6];
    for field in ReadingField::ALL {
        decreased[field as usize] =
            second.field(field) - first.field(field) < -CONSISTENCY_TOLERANCE;
    }

    if decreased.iter().any(|d| *d) {
        Some(ReadingInconsistency {
            first: *first,
            second: *second,
            decreased,
        })
    } else {
        None
    }
}

/// Applies a repair document to one reading.
///
/// Returns `None` when the reading's local timestamp is blacklisted;
/// otherwise a copy with every adjustment dated at or before the reading
/// added field by field. The deltas are independent per field, so the sum
/// does not depend on application order.
pub fn correct_reading(reading: &Reading, repair: &Repair) -> Option<Reading> {
    let key = reading.local_iso();
    if repair.blacklist.iter().any(|entry| *entry == key) {
        return None;
    }

    let mut corrected = *reading;
    for adjustment in &repair.adjustments {
        if adjustment.date_time > reading.date_time {
            continue;
        }
        for field in ReadingField::ALL {
            *corrected.field_mut(field) += adjustment.delta(field);
        }
    }

    Some(corrected)
}

/// Merges a newly produced repair into an existing one: set union of the
/// blacklists, union of the adjustments deduplicated by exact timestamp,
/// both re-sorted.
pub fn merge_repairs(base: &Repair, incoming: &Repair) -> Repair {
    let mut blacklist = base.blacklist.clone();
    for entry in &incoming.blacklist {
        if !blacklist.contains(entry) {
            blacklist.push(entry.clone());
        }
    }
    blacklist.sort();

    let mut adjustments = base.adjustments.clone();
    for adjustment in &incoming.adjustments {
        if !adjustments.iter().any(|a| a.date_time == adjustment.date_time) {
            adjustments.push(adjustment.clone());
        }
    }
    adjustments.sort_by_key(|a| a.date_time);

    Repair {
        blacklist,
        adjustments,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rstest::rstest;

    fn reading(minute: u32, pv: f64) -> Reading {
        Reading {
            date_time: NaiveDate::from_ymd_opt(2024, 8, 1)
                .unwrap()
                .and_hms_opt(12, minute, 0)
                .unwrap(),
            grid_in: 10.0,
            grid_out: 20.0,
            pv,
            wallbox: 30.0,
            battery_in: 40.0,
            battery_out: 50.0,
            battery_soc: 75.0,
        }
    }

    #[test]
    fn non_decreasing_counters_are_consistent() {
        let first = reading(0, 100.0);
        let second = reading(5, 100.5);

        assert!(check_inconsistent(&first, &second).is_none());
    }

    #[rstest]
    #[case(0.001, false)] // exactly at tolerance: still consistent
    #[case(0.0011, true)]
    #[case(25.0, true)]
    fn tolerance_boundary(#[case] decrease: f64, #[case] flagged: bool) {
        let first = reading(0, 100.0);
        let second = reading(5, 100.0 - decrease);

        assert_eq!(check_inconsistent(&first, &second).is_some(), flagged);
    }

    #[test]
    fn flags_exactly_the_decreased_fields() {
        let first = reading(0, 100.0);
        let mut second = reading(5, 50.0);
        second.battery_out = 12.0;

        let inconsistency = check_inconsistent(&first, &second).expect("must be inconsistent");
        assert!(inconsistency.is_decreased(ReadingField::Pv));
        assert!(inconsistency.is_decreased(ReadingField::BatteryOut));
        for field in [
            ReadingField::GridIn,
            ReadingField::GridOut,
            ReadingField::Wallbox,
            ReadingField::BatteryIn,
        ] {
            assert!(!inconsistency.is_decreased(field));
        }
    }

    #[test]
    fn blacklisted_reading_is_dropped() {
        let target = reading(0, 100.0);
        let repair = Repair {
            blacklist: vec!["2024-08-01T12:00:00".to_string()],
            adjustments: vec![],
        };

        assert!(correct_reading(&target, &repair).is_none());
        assert!(correct_reading(&reading(5, 100.0), &repair).is_some());
    }

    #[test]
    fn adjustments_before_the_reading_accumulate() {
        let target = reading(10, 100.0);

        let mut early = ReadingAdjustment::new(reading(0, 0.0).date_time, target, target);
        early.pv = 30.0;
        early.grid_in = 1.0;
        let mut at_reading = ReadingAdjustment::new(target.date_time, target, target);
        at_reading.pv = 5.0;
        let mut later = ReadingAdjustment::new(reading(20, 0.0).date_time, target, target);
        later.pv = 1000.0;

        let repair = Repair {
            blacklist: vec![],
            adjustments: vec![early, at_reading, later],
        };

        let corrected = correct_reading(&target, &repair).unwrap();
        assert_eq!(corrected.pv, 135.0);
        assert_eq!(corrected.grid_in, 11.0);
        assert_eq!(corrected.grid_out, 20.0);
        // non-counter fields are untouched
        assert_eq!(corrected.battery_soc, 75.0);
    }

    #[test]
    fn merge_is_idempotent() {
        let mut adjustment = ReadingAdjustment::new(
            reading(5, 0.0).date_time,
            reading(0, 100.0),
            reading(5, 0.0),
        );
        adjustment.pv = 100.0;
        let repair = Repair {
            blacklist: vec!["2024-08-01T12:00:00".to_string(), "2024-08-01T12:10:00".to_string()],
            adjustments: vec![adjustment],
        };

        assert_eq!(merge_repairs(&repair, &repair), repair);
    }

    #[test]
    fn merge_unions_and_sorts() {
        let base = Repair {
            blacklist: vec!["2024-08-02T00:00:00".to_string()],
            adjustments: vec![ReadingAdjustment::new(
                reading(30, 0.0).date_time,
                reading(0, 100.0),
                reading(30, 0.0),
            )],
        };
        let incoming = Repair {
            blacklist: vec![
                "2024-08-01T00:00:00".to_string(),
                "2024-08-02T00:00:00".to_string(),
            ],
            adjustments: vec![
                ReadingAdjustment::new(
                    reading(30, 0.0).date_time,
                    reading(0, 100.0),
                    reading(30, 0.0),
                ),
                ReadingAdjustment::new(
                    reading(10, 0.0).date_time,
                    reading(0, 100.0),
                    reading(10, 0.0),
                ),
            ],
        };

        let merged = merge_repairs(&base, &incoming);
        assert_eq!(
            merged.blacklist,
            vec![
                "2024-08-01T00:00:00".to_string(),
                "2024-08-02T00:00:00".to_string(),
            ]
        );
        assert_eq!(merged.adjustments.len(), 2);
        assert!(merged.adjustments[0].date_time < merged.adjustments[1].date_time);
    }
}
