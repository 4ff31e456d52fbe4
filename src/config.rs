use crate::batch::Precision;
use crate::cli::Cli;
use crate::sensor::DEFAULT_DEVICES_DIR;
use anyhow::{anyhow, Context, Result};
use dotenvy::dotenv;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub influx_host: String,
    pub influx_port: u16,
    pub database: String,
    pub datapoint: String,
    pub precision: Precision,
    pub http_timeout: Duration,

    /// `None` disables spooling; failed batches are then dropped.
    pub spool_dir: Option<PathBuf>,
    pub devices_dir: PathBuf,
    pub sleep: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            influx_host: "127.0.0.1".to_string(),
            influx_port: 8086,
            database: "temperature".to_string(),
            datapoint: "temp".to_string(),
            precision: Precision::Seconds,
            http_timeout: Duration::from_secs(10),
            spool_dir: None,
            devices_dir: PathBuf::from(DEFAULT_DEVICES_DIR),
            sleep: Duration::from_secs(20),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();
        let defaults = Self::default();

        let influx_host = env_string("TEMP_LOGGER_INFLUX_HOST", Some(defaults.influx_host))?;
        let influx_port = env_u64(
            "TEMP_LOGGER_INFLUX_PORT",
            Some(u64::from(defaults.influx_port)),
        )?;
        let influx_port = u16::try_from(influx_port)
            .map_err(|_| anyhow!("TEMP_LOGGER_INFLUX_PORT out of range: {influx_port}"))?;
        let database = env_string("TEMP_LOGGER_DATABASE", Some(defaults.database))?;
        let datapoint = env_string("TEMP_LOGGER_DATAPOINT", Some(defaults.datapoint))?;
        let precision = match env_optional("TEMP_LOGGER_PRECISION") {
            Some(raw) => raw
                .parse::<Precision>()
                .context("invalid TEMP_LOGGER_PRECISION")?,
            None => defaults.precision,
        };
        let http_timeout = Duration::from_secs(env_u64(
            "TEMP_LOGGER_HTTP_TIMEOUT_SECONDS",
            Some(defaults.http_timeout.as_secs()),
        )?);

        let spool_dir = env_optional("TEMP_LOGGER_SPOOL_DIR").map(PathBuf::from);
        let devices_dir = PathBuf::from(env_string(
            "TEMP_LOGGER_W1_DEVICES_DIR",
            Some(DEFAULT_DEVICES_DIR.to_string()),
        )?);
        let sleep = Duration::from_secs(env_u64(
            "TEMP_LOGGER_SLEEP_SECONDS",
            Some(defaults.sleep.as_secs()),
        )?);

        Ok(Self {
            influx_host,
            influx_port,
            database,
            datapoint,
            precision,
            http_timeout,
            spool_dir,
            devices_dir,
            sleep,
        })
    }

    /// Flags given on the command line win over the environment.
    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(host) = non_empty(cli.host.as_deref()) {
            self.influx_host = host.to_string();
        }
        if let Some(port) = cli.port {
            self.influx_port = port;
        }
        if let Some(database) = non_empty(cli.database.as_deref()) {
            self.database = database.to_string();
        }
        if let Some(datapoint) = non_empty(cli.datapoint.as_deref()) {
            self.datapoint = datapoint.to_string();
        }
        if let Some(precision) = cli.precision {
            self.precision = precision;
        }
        // An explicit empty `--spool ""` turns spooling off.
        if let Some(spool) = cli.spool.as_deref() {
            self.spool_dir = non_empty(Some(spool)).map(PathBuf::from);
        }
        if let Some(dir) = cli.devices_dir.as_ref() {
            self.devices_dir = dir.clone();
        }
        if let Some(secs) = cli.sleep {
            self.sleep = Duration::from_secs(secs);
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn env_string(key: &str, default: Option<String>) -> Result<String> {
    match env::var(key) {
        Ok(value) => Ok(value.trim().to_string()),
        Err(_) => default.ok_or_else(|| anyhow!("missing env var {key}")),
    }
}

fn env_u64(key: &str, default: Option<u64>) -> Result<u64> {
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse::<u64>()
            .with_context(|| format!("invalid {key}")),
        Err(_) => default.ok_or_else(|| anyhow!("missing env var {key}")),
    }
}

fn env_optional(key: &str) -> Option<String> {
    env::var(key).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::sync::{Mutex, OnceLock};

    const ENV_KEYS: [&str; 9] = [
        "TEMP_LOGGER_INFLUX_HOST",
        "TEMP_LOGGER_INFLUX_PORT",
        "TEMP_LOGGER_DATABASE",
        "TEMP_LOGGER_DATAPOINT",
        "TEMP_LOGGER_PRECISION",
        "TEMP_LOGGER_HTTP_TIMEOUT_SECONDS",
        "TEMP_LOGGER_SPOOL_DIR",
        "TEMP_LOGGER_W1_DEVICES_DIR",
        "TEMP_LOGGER_SLEEP_SECONDS",
    ];

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    /// Runs `f` with exactly `vars` set among the logger's variables, then
    /// restores whatever the process had before.
    fn with_env<T>(vars: &[(&str, &str)], f: impl FnOnce() -> T) -> T {
        let lock = ENV_LOCK.get_or_init(|| Mutex::new(()));
        let _guard = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let previous: Vec<(&str, Option<String>)> =
            ENV_KEYS.iter().map(|key| (*key, env::var(key).ok())).collect();
        for key in ENV_KEYS {
            env::remove_var(key);
        }
        for (key, value) in vars {
            env::set_var(key, value);
        }
        let result = f();
        for (key, value) in previous {
            match value {
                Some(value) => env::set_var(key, value),
                None => env::remove_var(key),
            }
        }
        result
    }

    #[test]
    fn from_env_reads_every_variable() {
        let config = with_env(
            &[
                ("TEMP_LOGGER_INFLUX_HOST", " influx.lan "),
                ("TEMP_LOGGER_INFLUX_PORT", "9086"),
                ("TEMP_LOGGER_DATABASE", "house"),
                ("TEMP_LOGGER_DATAPOINT", "cellar"),
                ("TEMP_LOGGER_PRECISION", "ms"),
                ("TEMP_LOGGER_HTTP_TIMEOUT_SECONDS", "3"),
                ("TEMP_LOGGER_SPOOL_DIR", "/var/spool/temperature"),
                ("TEMP_LOGGER_W1_DEVICES_DIR", "/tmp/w1"),
                ("TEMP_LOGGER_SLEEP_SECONDS", "60"),
            ],
            Config::from_env,
        )
        .unwrap();

        assert_eq!(config.influx_host, "influx.lan");
        assert_eq!(config.influx_port, 9086);
        assert_eq!(config.database, "house");
        assert_eq!(config.datapoint, "cellar");
        assert_eq!(config.precision, Precision::Milliseconds);
        assert_eq!(config.http_timeout, Duration::from_secs(3));
        assert_eq!(
            config.spool_dir,
            Some(PathBuf::from("/var/spool/temperature"))
        );
        assert_eq!(config.devices_dir, PathBuf::from("/tmp/w1"));
        assert_eq!(config.sleep, Duration::from_secs(60));
    }

    #[test]
    fn from_env_without_variables_uses_defaults() {
        let config = with_env(&[], Config::from_env).unwrap();
        let defaults = Config::default();
        assert_eq!(config.influx_host, defaults.influx_host);
        assert_eq!(config.influx_port, defaults.influx_port);
        assert_eq!(config.database, defaults.database);
        assert_eq!(config.precision, defaults.precision);
        assert!(config.spool_dir.is_none());
        assert_eq!(config.sleep, defaults.sleep);
    }

    #[test]
    fn malformed_sleep_is_an_error() {
        let err = with_env(&[("TEMP_LOGGER_SLEEP_SECONDS", "abc")], Config::from_env)
            .unwrap_err();
        assert!(
            err.to_string().contains("TEMP_LOGGER_SLEEP_SECONDS"),
            "unexpected error: {err:#}"
        );
    }

    #[test]
    fn out_of_range_port_is_an_error() {
        let err = with_env(&[("TEMP_LOGGER_INFLUX_PORT", "70000")], Config::from_env)
            .unwrap_err();
        assert!(err.to_string().contains("out of range"), "unexpected error: {err:#}");
    }

    #[test]
    fn unknown_precision_is_an_error() {
        let err = with_env(&[("TEMP_LOGGER_PRECISION", "minutes")], Config::from_env)
            .unwrap_err();
        assert!(
            err.to_string().contains("TEMP_LOGGER_PRECISION"),
            "unexpected error: {err:#}"
        );
    }

    #[test]
    fn empty_spool_env_disables_spooling() {
        let config = with_env(&[("TEMP_LOGGER_SPOOL_DIR", "  ")], Config::from_env).unwrap();
        assert!(config.spool_dir.is_none());
    }

    #[test]
    fn cli_flags_override_env() {
        let mut config = with_env(
            &[
                ("TEMP_LOGGER_INFLUX_HOST", "env-host"),
                ("TEMP_LOGGER_INFLUX_PORT", "8087"),
                ("TEMP_LOGGER_DATABASE", "env-db"),
                ("TEMP_LOGGER_SPOOL_DIR", "/var/spool/env"),
                ("TEMP_LOGGER_SLEEP_SECONDS", "30"),
            ],
            Config::from_env,
        )
        .unwrap();
        let cli = Cli::parse_from([
            "temperature-logger",
            "--host",
            "cli-host",
            "--spool",
            "",
            "--sleep",
            "5",
        ]);
        config.apply_cli(&cli);

        assert_eq!(config.influx_host, "cli-host");
        assert!(config.spool_dir.is_none());
        assert_eq!(config.sleep, Duration::from_secs(5));
        // Not given on the command line.
        assert_eq!(config.influx_port, 8087);
        assert_eq!(config.database, "env-db");
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.influx_host, "127.0.0.1");
        assert_eq!(config.influx_port, 8086);
        assert_eq!(config.database, "temperature");
        assert_eq!(config.datapoint, "temp");
        assert_eq!(config.precision, Precision::Seconds);
        assert!(config.spool_dir.is_none());
        assert_eq!(config.devices_dir, PathBuf::from("/sys/bus/w1/devices"));
        assert_eq!(config.sleep, Duration::from_secs(20));
    }

    #[test]
    fn cli_flags_override_config() {
        let cli = Cli::parse_from([
            "temperature-logger",
            "--host",
            "influx.lan",
            "--port",
            "9086",
            "--database",
            "house",
            "--datapoint",
            "cellar",
            "--spool",
            "/var/spool/temperature",
            "--sleep",
            "5",
            "--precision",
            "ms",
        ]);
        let mut config = Config::default();
        config.apply_cli(&cli);

        assert_eq!(config.influx_host, "influx.lan");
        assert_eq!(config.influx_port, 9086);
        assert_eq!(config.database, "house");
        assert_eq!(config.datapoint, "cellar");
        assert_eq!(
            config.spool_dir,
            Some(PathBuf::from("/var/spool/temperature"))
        );
        assert_eq!(config.sleep, Duration::from_secs(5));
        assert_eq!(config.precision, Precision::Milliseconds);
    }

    #[test]
    fn empty_spool_flag_disables_spooling() {
        let cli = Cli::parse_from(["temperature-logger", "--spool", ""]);
        let mut config = Config {
            spool_dir: Some(PathBuf::from("/tmp/spool")),
            ..Config::default()
        };
        config.apply_cli(&cli);
        assert!(config.spool_dir.is_none());
    }

    #[test]
    fn absent_flags_keep_config() {
        let cli = Cli::parse_from(["temperature-logger"]);
        let mut config = Config {
            influx_host: "db.local".to_string(),
            ..Config::default()
        };
        config.apply_cli(&cli);
        assert_eq!(config.influx_host, "db.local");
        assert_eq!(config.sleep, Duration::from_secs(20));
    }
}
