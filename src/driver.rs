//! The sampling loop: read every sensor, write the batch, spool on failure,
//! sleep, repeat.

use crate::batch::{Batch, Precision};
use crate::config::Config;
use crate::delivery::DeliveryClient;
use crate::sensor::SensorReader;
use crate::spool::SpoolWriter;
use anyhow::{Context, Result};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    Delivered { points: usize },
    Spooled { points: usize, path: PathBuf },
    /// Delivery failed and the batch could not be (or was not configured to be) spooled.
    Dropped { points: usize },
}

pub struct CycleDriver {
    config: Config,
    sensors: Arc<SensorReader>,
    client: DeliveryClient,
    spool: Option<SpoolWriter>,
}

impl CycleDriver {
    pub fn new(config: Config) -> Result<Self> {
        let sensors = Arc::new(SensorReader::new(config.devices_dir.clone())?);
        let client =
            DeliveryClient::new(&config.influx_host, config.influx_port, config.http_timeout)
                .context("failed to create InfluxDB client")?;
        let spool = config.spool_dir.clone().map(SpoolWriter::new);
        Ok(Self {
            config,
            sensors,
            client,
            spool,
        })
    }

    /// Reads every discovered sensor into a fresh batch on the calling thread.
    pub fn collect(&self) -> Result<Batch> {
        collect_batch(
            &self.sensors,
            &self.config.database,
            self.config.precision,
            &self.config.datapoint,
        )
    }

    pub async fn run_cycle(&self) -> Result<CycleOutcome> {
        // `w1_slave` reads block for the sensor conversion time (~750ms each).
        let sensors = Arc::clone(&self.sensors);
        let database = self.config.database.clone();
        let datapoint = self.config.datapoint.clone();
        let precision = self.config.precision;
        let batch = tokio::task::spawn_blocking(move || {
            collect_batch(&sensors, &database, precision, &datapoint)
        })
        .await
        .context("sensor read task failed")??;
        let points = batch.len();

        let err = match self.client.deliver(&batch).await {
            Ok(()) => {
                tracing::info!(points, database = %batch.database(), "batch written");
                return Ok(CycleOutcome::Delivered { points });
            }
            Err(err) => err,
        };
        tracing::warn!(points, error = %err, "failed to write batch");

        let Some(spool) = self.spool.as_ref() else {
            tracing::warn!(points, "no spool directory configured; dropping batch");
            return Ok(CycleOutcome::Dropped { points });
        };

        match spool.spool(&batch) {
            Ok(Some(path)) => {
                tracing::info!(points, path = %path.display(), "batch spooled");
                Ok(CycleOutcome::Spooled { points, path })
            }
            Ok(None) => Ok(CycleOutcome::Dropped { points }),
            Err(err) => {
                tracing::error!(
                    points,
                    dir = %spool.dir().display(),
                    "failed to spool batch; dropping: {err:#}"
                );
                Ok(CycleOutcome::Dropped { points })
            }
        }
    }

    /// Runs cycles until `shutdown` fires. Only a fatal cycle error ends the
    /// loop early.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        tracing::info!(
            url = %self.client.write_url(),
            database = %self.config.database,
            spool = ?self.config.spool_dir,
            sleep_secs = self.config.sleep.as_secs(),
            "temperature logger started"
        );

        while !shutdown.is_cancelled() {
            self.run_cycle().await?;

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.config.sleep) => {}
            }
        }

        tracing::info!("temperature logger stopped");
        Ok(())
    }
}

/// Sensors that fail to parse are logged and left out. Failing to list the
/// bus directory is fatal.
fn collect_batch(
    sensors: &SensorReader,
    database: &str,
    precision: Precision,
    datapoint: &str,
) -> Result<Batch> {
    let mut batch = Batch::new(database, precision);

    let paths = sensors.discover_sensors().with_context(|| {
        format!(
            "error reading sensor directories under {}",
            sensors.devices_dir().display()
        )
    })?;

    for path in &paths {
        match sensors.parse_sensor(path) {
            Ok(reading) => {
                tracing::debug!(
                    sensor = %reading.sensor_id,
                    value = reading.value,
                    "sensor read"
                );
                batch.add(&reading, datapoint);
            }
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "skipping sensor");
            }
        }
    }

    if paths.is_empty() {
        tracing::debug!(dir = %sensors.devices_dir().display(), "no sensors found");
    }
    Ok(batch)
}

/// Resolves once `signal` fires. If its handler could not be installed the
/// error is logged and this never resolves, so a broken handler cannot stop
/// the loop.
pub async fn wait_for_signal<F>(name: &str, signal: F)
where
    F: Future<Output = std::io::Result<()>>,
{
    if let Err(err) = signal.await {
        tracing::error!(signal = name, error = %err, "failed to install signal handler");
        std::future::pending::<()>().await;
    }
}
