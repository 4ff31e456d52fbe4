//! One-wire sensor discovery and `w1_slave` parsing.
//!
//! The kernel `w1_therm` driver exposes each sensor as
//! `/sys/bus/w1/devices/<family>-<serial>/w1_slave`. The file holds two
//! lines; the second ends with ` t=<millidegrees>`:
//!
//! ```text
//! 72 01 4b 46 7f ff 0e 10 57 : crc=57 YES
//! 72 01 4b 46 7f ff 0e 10 57 t=23125
//! ```

use crate::error::ParseError;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use regex::Regex;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub const DEFAULT_DEVICES_DIR: &str = "/sys/bus/w1/devices";
const SLAVE_FILE: &str = "w1_slave";

const NAME_PATTERN: &str = r"[0-9a-f]{2}-[0-9a-f]+";
const TEMPERATURE_PATTERN: &str = r" t=([0-9]+)";

/// One temperature sample from one sensor.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub sensor_id: String,
    /// Degrees Celsius.
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

pub struct SensorReader {
    devices_dir: PathBuf,
    name_re: Regex,
    temp_re: Regex,
}

impl SensorReader {
    pub fn new(devices_dir: impl Into<PathBuf>) -> Result<Self> {
        Ok(Self {
            devices_dir: devices_dir.into(),
            name_re: Regex::new(NAME_PATTERN).context("compile sensor name pattern")?,
            temp_re: Regex::new(TEMPERATURE_PATTERN).context("compile temperature pattern")?,
        })
    }

    pub fn devices_dir(&self) -> &Path {
        &self.devices_dir
    }

    /// Lists `<devices_dir>/*-*/w1_slave`, sorted.
    ///
    /// A missing bus directory means the driver is not loaded and yields no
    /// sensors. Any other traversal failure is returned.
    pub fn discover_sensors(&self) -> io::Result<Vec<PathBuf>> {
        let entries = match fs::read_dir(&self.devices_dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err),
        };

        let mut sensors = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_name().to_string_lossy().contains('-') {
                continue;
            }
            let slave = entry.path().join(SLAVE_FILE);
            if slave.exists() {
                sensors.push(slave);
            }
        }
        sensors.sort();
        Ok(sensors)
    }

    pub fn parse_sensor(&self, path: &Path) -> Result<Reading, ParseError> {
        let path_str = path.to_string_lossy();
        let sensor_id = self
            .name_re
            .find(&path_str)
            .map(|m| m.as_str().to_string())
            .ok_or_else(|| ParseError::NameNotFound {
                path: path.to_path_buf(),
            })?;

        let content = fs::read_to_string(path).map_err(|source| ParseError::ReadFailed {
            path: path.to_path_buf(),
            source,
        })?;

        let raw = self
            .temp_re
            .captures(&content)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
            .ok_or_else(|| ParseError::TemperatureNotFound {
                path: path.to_path_buf(),
                content: content.clone(),
            })?;

        let millidegrees = raw
            .parse::<i64>()
            .map_err(|_| ParseError::InvalidNumber {
                path: path.to_path_buf(),
                raw: raw.to_string(),
            })?;

        Ok(Reading {
            sensor_id,
            value: millidegrees as f64 / 1000.0,
            timestamp: Utc::now(),
        })
    }
}
