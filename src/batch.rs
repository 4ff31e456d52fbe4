use crate::sensor::Reading;
use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;

/// Timestamp resolution of a batch, as understood by the `/write` endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Precision {
    Nanoseconds,
    Microseconds,
    Milliseconds,
    #[default]
    Seconds,
}

impl Precision {
    pub fn as_str(self) -> &'static str {
        match self {
            Precision::Nanoseconds => "ns",
            Precision::Microseconds => "u",
            Precision::Milliseconds => "ms",
            Precision::Seconds => "s",
        }
    }

    /// Truncates `timestamp` to this precision, in units since the Unix epoch.
    pub fn timestamp(self, timestamp: &DateTime<Utc>) -> i64 {
        match self {
            Precision::Nanoseconds => timestamp
                .timestamp_nanos_opt()
                .unwrap_or_else(|| timestamp.timestamp_micros().saturating_mul(1000)),
            Precision::Microseconds => timestamp.timestamp_micros(),
            Precision::Milliseconds => timestamp.timestamp_millis(),
            Precision::Seconds => timestamp.timestamp(),
        }
    }
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Precision {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim() {
            "ns" | "n" => Ok(Precision::Nanoseconds),
            "u" | "us" => Ok(Precision::Microseconds),
            "ms" => Ok(Precision::Milliseconds),
            "s" => Ok(Precision::Seconds),
            other => Err(anyhow!("unknown precision {other:?} (expected ns, u, ms or s)")),
        }
    }
}

/// One line-protocol point: `<measurement>,sensor=<id> value=<value> <ts>`.
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    pub measurement: String,
    pub sensor: String,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

/// Points gathered during one sampling cycle, bound for one database.
#[derive(Debug, Clone)]
pub struct Batch {
    database: String,
    precision: Precision,
    points: Vec<Point>,
}

impl Batch {
    pub fn new(database: impl Into<String>, precision: Precision) -> Self {
        Self {
            database: database.into(),
            precision,
            points: Vec::new(),
        }
    }

    /// Appends `reading` as a `datapoint` point stamped with the current time.
    pub fn add(&mut self, reading: &Reading, datapoint: &str) {
        self.add_at(reading, datapoint, Utc::now());
    }

    pub fn add_at(&mut self, reading: &Reading, datapoint: &str, timestamp: DateTime<Utc>) {
        self.points.push(Point {
            measurement: datapoint.to_string(),
            sensor: reading.sensor_id.clone(),
            value: reading.value,
            timestamp,
        });
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn precision(&self) -> Precision {
        self.precision
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}
