//! One-wire temperature sampler with an InfluxDB writer and an hourly
//! line-protocol spool for batches the database does not take.

pub mod batch;
pub mod cli;
pub mod config;
pub mod delivery;
pub mod driver;
pub mod error;
pub mod line_protocol;
pub mod sensor;
pub mod spool;

pub use config::Config;
pub use driver::{CycleDriver, CycleOutcome};
