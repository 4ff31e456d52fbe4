//! Error types for sensor parsing, delivery and line-protocol decoding.

use std::path::PathBuf;
use thiserror::Error;

/// Why a single sensor produced no reading this cycle.
#[derive(Error, Debug)]
pub enum ParseError {
    /// The device path carries no `ff-xxxxxxxx` style sensor id.
    #[error("could not extract sensor name from {}", .path.display())]
    NameNotFound { path: PathBuf },

    /// The sensor file could not be read.
    #[error("failed to read sensor file {}: {source}", .path.display())]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file has no ` t=<digits>` marker (usually a CRC failure or a bus glitch).
    #[error("could not extract temperature from {}: {content:?}", .path.display())]
    TemperatureNotFound { path: PathBuf, content: String },

    #[error("invalid temperature value {raw:?} in {}", .path.display())]
    InvalidNumber { path: PathBuf, raw: String },
}

/// Failure to hand a batch to the database.
#[derive(Error, Debug)]
pub enum DeliveryError {
    /// Connect, transport or timeout failure.
    #[error("database unreachable: {0}")]
    Unreachable(#[from] reqwest::Error),

    /// The database answered with a non-success status.
    #[error("database rejected write ({status}): {message}")]
    Rejected {
        status: reqwest::StatusCode,
        message: String,
    },
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum LineProtocolError {
    #[error("empty line")]
    Empty,

    #[error("missing field set")]
    MissingFields,

    #[error("malformed tag {0:?}")]
    MalformedTag(String),

    #[error("malformed field {0:?}")]
    MalformedField(String),

    #[error("invalid timestamp {0:?}")]
    InvalidTimestamp(String),
}
