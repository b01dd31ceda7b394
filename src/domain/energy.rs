use chrono::NaiveDateTime;
use serde::Serialize;

use super::reading::Reading;

/// Energy flows between two readings: per-counter deltas plus quantities
/// derived from them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Energy {
    pub from: NaiveDateTime,
    pub to: NaiveDateTime,
    pub grid_in: f64,
    pub grid_out: f64,
    pub pv: f64,
    pub wallbox: f64,
    pub battery_in: f64,
    pub battery_out: f64,
    pub battery_soc: f64,
}

impl Energy {
    pub fn from_readings(from: &Reading, to: &Reading) -> Self {
        Self {
            from: from.date_time,
            to: to.date_time,
            grid_in: to.grid_in - from.grid_in,
            grid_out: to.grid_out - from.grid_out,
            pv: to.pv - from.pv,
            wallbox: to.wallbox - from.wallbox,
            battery_in: to.battery_in - from.battery_in,
            battery_out: to.battery_out - from.battery_out,
            battery_soc: to.battery_soc - from.battery_soc,
        }
    }

    /// PV production consumed on site without passing through grid or battery.
    pub fn direct_pv_consumption(&self) -> f64 {
        self.pv - self.grid_out - self.battery_in
    }

    /// Total consumption of the household including the wallbox.
    pub fn home(&self) -> f64 {
        self.grid_in + self.battery_out + self.direct_pv_consumption()
    }

    pub fn house(&self) -> f64 {
        self.home() - self.wallbox
    }

    pub fn self_sufficiency(&self) -> f64 {
        (self.direct_pv_consumption() + self.battery_out) / self.home()
    }

    pub fn self_consumption(&self) -> f64 {
        1.0 - self.grid_out / self.pv
    }

    /// Diagnostic only. A segment spanning a repaired-but-imperfect boundary
    /// can legitimately fail this, so it is never enforced as an invariant.
    pub fn is_plausible(&self) -> bool {
        self.grid_in >= 0.0
            && self.grid_out >= 0.0
            && self.pv >= 0.0
            && self.wallbox >= 0.0
            && self.battery_in >= 0.0
            && self.battery_out >= 0.0
            && self.house() >= 0.0
            && self.self_sufficiency() >= 0.0
            && self.self_sufficiency() <= 1.0
            && self.self_consumption() >= 0.0
            && self.self_consumption() <= 1.0
    }
}
