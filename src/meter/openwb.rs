use anyhow::Result;
use async_trait::async_trait;
use chrono::{Local, NaiveDate, TimeZone};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::MeterConfig;
use crate::domain::Reading;

use super::ReadingSource;

/// Fetches daily meter logs from an openWB controller.
///
/// Controllers before software version 2 expose a line-oriented CSV log,
/// newer ones a structured JSON log; both are selected by the configured
/// `wallbox_version`.
#[derive(Clone)]
pub struct OpenWbSource {
    client: reqwest::Client,
}

impl OpenWbSource {
    pub fn new(timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static("meter-balance/0.2"));
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()?;
        Ok(Self { client })
    }

    fn daily_log_url(day: NaiveDate, config: &MeterConfig) -> String {
        let file_stem = day.format("%Y%m%d");
        if config.wallbox_version >= 2 {
            format!(
                "http://{}/openWB/data/daily_log/{}.json",
                config.wallbox_host, file_stem
            )
        } else {
            format!(
                "http://{}/openWB/web/logging/data/daily/{}.csv",
                config.wallbox_host, file_stem
            )
        }
    }
}

#[async_trait]
impl ReadingSource for OpenWbSource {
    async fn fetch_day(&self, day: NaiveDate, config: &MeterConfig) -> Vec<Reading> {
        let url = Self::daily_log_url(day, config);

        let response = match self.client.get(&url).send().await {
            Ok(response) => response,
            Err(err) => {
                debug!(%url, %err, "daily log unreachable");
                return Vec::new();
            }
        };

        if !response.status().is_success() {
            debug!(%url, status = %response.status(), "daily log not found");
            return Vec::new();
        }

        let text = match response.text().await {
            Ok(text) => text,
            Err(err) => {
                warn!(%url, %err, "could not read daily log body");
                return Vec::new();
            }
        };

        debug!(%url, bytes = text.len(), "daily log fetched");

        if config.wallbox_version >= 2 {
            match parse_json(&text) {
                Ok(readings) => readings,
                Err(err) => {
                    warn!(%url, %err, "could not parse daily log");
                    Vec::new()
                }
            }
        } else {
            parse_csv(day, &text)
        }
    }
}

/// Line-oriented log of the v1 controller. Column 0 encodes the time as
/// HHMM, columns 1,2,3,4 carry grid in/out, pv and wallbox, columns 8 and 9
/// battery in/out (all watt values, divided by 1000), column 20 the battery
/// SoC in percent. Lines too short to carry all columns are discarded, as
/// are lines with unparseable cells.
pub(crate) fn parse_csv(day: NaiveDate, text: &str) -> Vec<Reading> {
    text.lines()
        .filter(|line| line.len() > 20)
        .filter_map(|line| parse_csv_line(day, line))
        .collect()
}

fn parse_csv_line(day: NaiveDate, line: &str) -> Option<Reading> {
    let cells: Vec<&str> = line.split(',').collect();
    if cells.len() <= 20 {
        return None;
    }

    // checked slicing: the time cell may carry arbitrary bytes on a
    // corrupted line, including multibyte characters
    let hour: u32 = cells[0].get(0..2)?.parse().ok()?;
    let minute: u32 = cells[0].get(2..4)?.parse().ok()?;
    let date_time = day.and_hms_opt(hour, minute, 0)?;

    let kilo = |cell: &str| cell.trim().parse::<f64>().ok().map(|watts| watts / 1000.0);

    Some(Reading {
        date_time,
        grid_in: kilo(cells[1])?,
        grid_out: kilo(cells[2])?,
        pv: kilo(cells[3])?,
        wallbox: kilo(cells[4])?,
        battery_in: kilo(cells[8])?,
        battery_out: kilo(cells[9])?,
        battery_soc: cells[20].trim().parse().ok()?,
    })
}

#[derive(Debug, Deserialize)]
struct DailyLog {
    #[serde(default)]
    entries: Vec<LogEntry>,
}

#[derive(Debug, Deserialize)]
struct LogEntry {
    timestamp: i64,
    #[serde(default)]
    counter: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pv: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    cp: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    bat: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
struct DeviceBlock {
    #[serde(default)]
    imported: f64,
    #[serde(default)]
    exported: f64,
    #[serde(default)]
    soc: f64,
}

/// Structured log of the v2 controller. Each entry holds per-device blocks
/// keyed by device id; the controller already aggregates devices of one
/// category, so only the first block of each category is consulted.
pub(crate) fn parse_json(text: &str) -> Result<Vec<Reading>, serde_json::Error> {
    let log: DailyLog = serde_json::from_str(text)?;

    let readings = log
        .entries
        .into_iter()
        .filter_map(|entry| {
            let date_time = Local
                .timestamp_opt(entry.timestamp, 0)
                .single()?
                .naive_local();

            let counter = first_device(&entry.counter);
            let pv = first_device(&entry.pv);
            let cp = first_device(&entry.cp);
            let bat = first_device(&entry.bat);

            Some(Reading {
                date_time,
                grid_in: counter.imported / 1000.0,
                grid_out: counter.exported / 1000.0,
                pv: pv.exported / 1000.0,
                wallbox: cp.imported / 1000.0,
                battery_in: bat.imported / 1000.0,
                battery_out: bat.exported / 1000.0,
                battery_soc: bat.soc,
            })
        })
        .collect();

    Ok(readings)
}

fn first_device(blocks: &serde_json::Map<String, serde_json::Value>) -> DeviceBlock {
    blocks
        .values()
        .next()
        .and_then(|value| serde_json::from_value(value.clone()).ok())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meter::testing::date;

    #[test]
    fn parses_csv_lines() {
        let text = "\
0005,1500,200,3000,400,0,0,0,500,600,0,0,0,0,0,0,0,0,0,0,77\n\
0010,1600,210,3100,410,0,0,0,510,610,0,0,0,0,0,0,0,0,0,0,76\n";

        let readings = parse_csv(date("2024-08-01"), text);

        assert_eq!(readings.len(), 2);
        assert_eq!(readings[0].date_time, date("2024-08-01").and_hms_opt(0, 5, 0).unwrap());
        assert_eq!(readings[0].grid_in, 1.5);
        assert_eq!(readings[0].grid_out, 0.2);
        assert_eq!(readings[0].pv, 3.0);
        assert_eq!(readings[0].wallbox, 0.4);
        assert_eq!(readings[0].battery_in, 0.5);
        assert_eq!(readings[0].battery_out, 0.6);
        assert_eq!(readings[0].battery_soc, 77.0);
        assert_eq!(readings[1].date_time, date("2024-08-01").and_hms_opt(0, 10, 0).unwrap());
    }

    #[test]
    fn discards_short_and_malformed_csv_lines() {
        let text = "\
too short\n\
0005,1500,200,3000,400,0,0,0,500,600,0,0,0,0,0,0,0,0,0,0,77\n\
xxxx,not,numbers,at,all,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0\n\
0日05,1500,200,3000,400,0,0,0,500,600,0,0,0,0,0,0,0,0,0,0,77\n";

        let readings = parse_csv(date("2024-08-01"), text);
        assert_eq!(readings.len(), 1);
    }

    #[test]
    fn parses_json_entries_first_device_per_category() {
        let timestamp = 1_722_500_000_i64;
        let text = format!(
            r#"{{"entries":[{{
                "timestamp": {timestamp},
                "counter": {{"c1": {{"imported": 1500, "exported": 200}}, "c2": {{"imported": 9999, "exported": 9999}}}},
                "pv": {{"p1": {{"exported": 3000}}}},
                "cp": {{"cp1": {{"imported": 400}}}},
                "bat": {{"b1": {{"imported": 500, "exported": 600, "soc": 77}}}}
            }}]}}"#
        );

        let readings = parse_json(&text).unwrap();
        assert_eq!(readings.len(), 1);

        let expected_time = Local.timestamp_opt(timestamp, 0).unwrap().naive_local();
        assert_eq!(readings[0].date_time, expected_time);
        assert_eq!(readings[0].grid_in, 1.5);
        assert_eq!(readings[0].grid_out, 0.2);
        assert_eq!(readings[0].pv, 3.0);
        assert_eq!(readings[0].wallbox, 0.4);
        assert_eq!(readings[0].battery_in, 0.5);
        assert_eq!(readings[0].battery_out, 0.6);
        assert_eq!(readings[0].battery_soc, 77.0);
    }

    #[test]
    fn missing_device_categories_default_to_zero() {
        let text = r#"{"entries":[{"timestamp": 1722500000}]}"#;
        let readings = parse_json(text).unwrap();

        assert_eq!(readings.len(), 1);
        assert_eq!(readings[0].grid_in, 0.0);
        assert_eq!(readings[0].battery_soc, 0.0);
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(parse_json("{ not json").is_err());
    }

    #[test]
    fn url_selection_by_version() {
        let mut config = MeterConfig {
            wallbox_host: "openwb".to_string(),
            wallbox_version: 2,
            ..MeterConfig::default()
        };
        let day = date("2024-08-01");

        assert_eq!(
            OpenWbSource::daily_log_url(day, &config),
            "http://openwb/openWB/data/daily_log/20240801.json"
        );

        config.wallbox_version = 1;
        assert_eq!(
            OpenWbSource::daily_log_url(day, &config),
            "http://openwb/openWB/web/logging/data/daily/20240801.csv"
        );
    }
}
