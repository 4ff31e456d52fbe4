use crate::batch::Precision;
use clap::Parser;
use std::path::PathBuf;

/// Flags override the `TEMP_LOGGER_*` environment; anything left unset keeps
/// the environment value or the built-in default.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "temperature-logger",
    version,
    about = "Samples one-wire temperature sensors into InfluxDB"
)]
pub struct Cli {
    /// InfluxDB host
    #[arg(long)]
    pub host: Option<String>,
    /// InfluxDB port
    #[arg(long)]
    pub port: Option<u16>,
    /// InfluxDB database
    #[arg(long)]
    pub database: Option<String>,
    /// InfluxDB measurement name
    #[arg(long)]
    pub datapoint: Option<String>,
    /// Spool directory for batches the database did not accept (empty disables)
    #[arg(long)]
    pub spool: Option<String>,
    /// Seconds to sleep between measurements
    #[arg(long)]
    pub sleep: Option<u64>,
    /// One-wire bus device directory
    #[arg(long)]
    pub devices_dir: Option<PathBuf>,
    /// Timestamp precision: ns, u, ms or s
    #[arg(long)]
    pub precision: Option<Precision>,
}
