use anyhow::Result;
use clap::Parser;
use temperature_logger::cli::Cli;
use temperature_logger::driver::wait_for_signal;
use temperature_logger::{Config, CycleDriver};
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;

fn init_tracing() -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,temperature_logger=info".into());
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .try_init()
        .map_err(|err| anyhow::anyhow!(err.to_string()))?;
    Ok(())
}

async fn shutdown_signal() {
    let terminate = async {
        signal(SignalKind::terminate())?.recv().await;
        Ok::<(), std::io::Error>(())
    };
    tokio::select! {
        _ = wait_for_signal("SIGINT", tokio::signal::ctrl_c()) => {}
        _ = wait_for_signal("SIGTERM", terminate) => {}
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = Config::from_env()?;
    config.apply_cli(&cli);
    init_tracing()?;

    let driver = CycleDriver::new(config)?;

    let shutdown = CancellationToken::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        tracing::info!("shutdown signal received");
        trigger.cancel();
    });

    driver.run(shutdown).await
}
