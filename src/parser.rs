use std::path::{Path, PathBuf};

use chrono::{NaiveDate, NaiveTime, Timelike};
use log::debug;
use serde::Deserialize;
use serde_json::Value;

use crate::problem::{Minutes, TrainSchedule};

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("could not read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("malformed schedule: {0}")]
    Json(#[from] serde_json::Error),
    #[error("expected a list of trains or an object keyed by train id")]
    Shape,
    #[error("train record without a train_id")]
    MissingId,
    #[error("train {train_id}: cannot read time {value:?}")]
    Time { train_id: String, value: String },
}

/// An upstream provider of schedule records for one section.
pub trait ScheduleSource {
    fn schedules(&self) -> Result<Vec<TrainSchedule>, ParseError>;
}

/// Schedules stored as a JSON file.
#[derive(Clone, Debug)]
pub struct JsonFileSource {
    path: PathBuf,
}

impl JsonFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        JsonFileSource { path: path.into() }
    }
}

impl ScheduleSource for JsonFileSource {
    fn schedules(&self) -> Result<Vec<TrainSchedule>, ParseError> {
        read_json_file(&self.path)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Number(serde_json::Number),
    Text(String),
}

impl Scalar {
    fn into_string(self) -> String {
        match self {
            Scalar::Number(n) => n.to_string(),
            Scalar::Text(s) => s,
        }
    }
}

#[derive(Deserialize)]
struct RawTrain {
    #[serde(default)]
    train_id: Option<Scalar>,
    #[serde(default)]
    entry_time: Option<Scalar>,
    #[serde(default)]
    exit_time: Option<Scalar>,
    #[serde(default)]
    entry_platform: Option<Scalar>,
    #[serde(default)]
    exit_platform: Option<Scalar>,
    #[serde(default)]
    journey_date: Option<NaiveDate>,
}

pub fn read_json_file(path: impl AsRef<Path>) -> Result<Vec<TrainSchedule>, ParseError> {
    let path = path.as_ref();
    let json = std::fs::read_to_string(path).map_err(|source| ParseError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let schedules = read_json_str(&json)?;
    debug!("Read {} train records from {}", schedules.len(), path.display());
    Ok(schedules)
}

/// Accepts a list of train records, or an object mapping train ids to records. Input order is
/// kept in both cases.
pub fn read_json_str(json: &str) -> Result<Vec<TrainSchedule>, ParseError> {
    match serde_json::from_str::<Value>(json)? {
        Value::Array(items) => items
            .into_iter()
            .map(|item| convert(serde_json::from_value(item)?, None))
            .collect(),
        Value::Object(map) => map
            .into_iter()
            .map(|(id, item)| convert(serde_json::from_value(item)?, Some(id)))
            .collect(),
        _ => Err(ParseError::Shape),
    }
}

fn convert(raw: RawTrain, key: Option<String>) -> Result<TrainSchedule, ParseError> {
    let train_id = raw
        .train_id
        .map(Scalar::into_string)
        .or(key)
        .ok_or(ParseError::MissingId)?;
    let entry_time = raw.entry_time.map(|t| parse_time(&train_id, t)).transpose()?;
    let exit_time = raw.exit_time.map(|t| parse_time(&train_id, t)).transpose()?;
    Ok(TrainSchedule {
        entry_platform: raw.entry_platform.map(Scalar::into_string),
        exit_platform: raw.exit_platform.map(Scalar::into_string),
        journey_date: raw.journey_date,
        entry_time,
        exit_time,
        train_id,
    })
}

fn parse_time(train_id: &str, value: Scalar) -> Result<Minutes, ParseError> {
    let bad = |value: String| ParseError::Time {
        train_id: train_id.to_string(),
        value,
    };
    match value {
        Scalar::Number(n) => whole_number(&n)
            .and_then(|m| Minutes::try_from(m).ok())
            .ok_or_else(|| bad(n.to_string())),
        Scalar::Text(s) => parse_clock(&s).ok_or_else(|| bad(s)),
    }
}

/// Minutes may arrive as `360.0`; only whole values are times.
fn whole_number(n: &serde_json::Number) -> Option<i64> {
    n.as_i64().or_else(|| {
        n.as_f64()
            .filter(|f| f.fract() == 0.0 && f.abs() <= i64::MAX as f64)
            .map(|f| f as i64)
    })
}

/// `"HH:MM"` (or `"HH:MM:SS"`, seconds dropped) to minutes since midnight.
pub fn parse_clock(s: &str) -> Option<Minutes> {
    let s = s.trim();
    let time = NaiveTime::parse_from_str(s, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
        .ok()?;
    Some((time.hour() * 60 + time.minute()) as Minutes)
}

pub fn format_clock(minutes: Minutes) -> String {
    format!("{:02}:{:02}", minutes.div_euclid(60), minutes.rem_euclid(60))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_input_with_mixed_time_formats() {
        let schedules = read_json_str(
            r#"[
                {"train_id": "12951", "entry_time": "06:00", "exit_time": 420, "entry_platform": 1},
                {"train_id": 12952, "entry_time": 362, "exit_time": "07:02",
                 "journey_date": "2024-03-01"}
            ]"#,
        )
        .unwrap();
        assert_eq!(schedules.len(), 2);
        assert_eq!(schedules[0].entry_time, Some(360));
        assert_eq!(schedules[0].entry_platform.as_deref(), Some("1"));
        assert_eq!(schedules[1].train_id, "12952");
        assert_eq!(schedules[1].exit_time, Some(422));
        assert_eq!(
            schedules[1].journey_date,
            NaiveDate::from_ymd_opt(2024, 3, 1)
        );
    }

    #[test]
    fn object_input_keeps_key_order() {
        let schedules = read_json_str(
            r#"{
                "Z1": {"entry_time": 500, "exit_time": 560},
                "A1": {"entry_time": 400},
                "M1": {"entry_time": 450, "exit_time": 510, "train_id": "override"}
            }"#,
        )
        .unwrap();
        let ids: Vec<_> = schedules.iter().map(|s| s.train_id.as_str()).collect();
        assert_eq!(ids, vec!["Z1", "A1", "override"]);
        assert!(!schedules[1].is_complete());
    }

    #[test]
    fn whole_float_minutes_are_times() {
        let schedules =
            read_json_str(r#"[{"train_id": "A", "entry_time": 360.0, "exit_time": 4.2e2}]"#)
                .unwrap();
        assert_eq!(schedules[0].entry_time, Some(360));
        assert_eq!(schedules[0].exit_time, Some(420));

        let fractional = read_json_str(r#"[{"train_id": "A", "entry_time": 360.5}]"#);
        assert!(matches!(
            fractional,
            Err(ParseError::Time { train_id, value }) if train_id == "A" && value == "360.5"
        ));
        let huge = read_json_str(r#"[{"train_id": "A", "entry_time": 1e30}]"#);
        assert!(matches!(huge, Err(ParseError::Time { .. })));
    }

    #[test]
    fn malformed_inputs_are_reported() {
        assert!(matches!(read_json_str("42"), Err(ParseError::Shape)));
        assert!(matches!(
            read_json_str(r#"[{"entry_time": 1}]"#),
            Err(ParseError::MissingId)
        ));
        assert!(matches!(
            read_json_str(r#"[{"train_id": "A", "entry_time": "25:99"}]"#),
            Err(ParseError::Time { .. })
        ));
        assert!(matches!(read_json_str("[1, 2"), Err(ParseError::Json(_))));
    }

    #[test]
    fn clock_round_trip_for_edges() {
        assert_eq!(parse_clock("00:00"), Some(0));
        assert_eq!(parse_clock("23:59"), Some(1439));
        assert_eq!(parse_clock(" 07:05:30 "), Some(425));
        assert_eq!(format_clock(425), "07:05");
        assert_eq!(format_clock(1439), "23:59");
    }
}
