use chrono::{NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

/// The six cumulative energy counters reported by the controller.
///
/// Each counter is monotonically non-decreasing within one counter epoch,
/// i.e. until the device resets it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReadingField {
    GridIn,
    GridOut,
    Pv,
    Wallbox,
    BatteryIn,
    BatteryOut,
}

impl ReadingField {
    pub const ALL: [ReadingField; 6] = [
        ReadingField::GridIn,
        ReadingField::GridOut,
        ReadingField::Pv,
        ReadingField::Wallbox,
        ReadingField::BatteryIn,
        ReadingField::BatteryOut,
    ];
}

/// One timestamped meter sample: six cumulative counters in kWh plus the
/// instantaneous battery state of charge in percent.
///
/// Timestamps are local wall-clock times, matching the controller's daily
/// log files which carry no zone information.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reading {
    pub date_time: NaiveDateTime,
    pub grid_in: f64,
    pub grid_out: f64,
    pub pv: f64,
    pub wallbox: f64,
    pub battery_in: f64,
    pub battery_out: f64,
    pub battery_soc: f64,
}

impl Reading {
    pub fn field(&self, field: ReadingField) -> f64 {
        match field {
            ReadingField::GridIn => self.grid_in,
            ReadingField::GridOut => self.grid_out,
            ReadingField::Pv => self.pv,
            ReadingField::Wallbox => self.wallbox,
            ReadingField::BatteryIn => self.battery_in,
            ReadingField::BatteryOut => self.battery_out,
        }
    }

    pub fn field_mut(&mut self, field: ReadingField) -> &mut f64 {
        match field {
            ReadingField::GridIn => &mut self.grid_in,
            ReadingField::GridOut => &mut self.grid_out,
            ReadingField::Pv => &mut self.pv,
            ReadingField::Wallbox => &mut self.wallbox,
            ReadingField::BatteryIn => &mut self.battery_in,
            ReadingField::BatteryOut => &mut self.battery_out,
        }
    }

    /// Local ISO timestamp without zone, the key format used by the repair
    /// blacklist.
    pub fn local_iso(&self) -> String {
        // Sub-second precision never appears in the logs; truncate anyway so
        // the blacklist key is stable.
        self.date_time
            .with_nanosecond(0)
            .unwrap_or(self.date_time)
            .format("%Y-%m-%dT%H:%M:%S")
            .to_string()
    }
}

/// Boundary summary of one local calendar day: its first and last reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DayReadings {
    pub start_of_day: Reading,
    pub end_of_day: Reading,
}
