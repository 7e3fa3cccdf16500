use color_eyre::{eyre::eyre, Result};
use rovercontroller::actuator::MqttSink;
use rovercontroller::config::RoverConfig;
use rovercontroller::controller::EvdevSource;
use rovercontroller::pairing::Bluetoothctl;
use rovercontroller::service::run_session;
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;

    let config_path = RoverConfig::resolve_path()?;
    let config = RoverConfig::load(&config_path).await?;
    setup_logging(config.log_level()?);
    info!("Loaded configuration from {}", config_path.display());

    info!(
        "Starting rovercontroller for {} controller at {}",
        config.controller_type, config.controller_address
    );

    let pairing = Bluetoothctl::new(Duration::from_millis(config.pairing.settle_ms));
    let actuator = config.actuator.clone();

    run_session(
        &config,
        &pairing,
        |profile| {
            let source = EvdevSource::discover(profile)?;
            info!("Using controller: {}", source.name());
            Ok(source)
        },
        |cancel| MqttSink::connect(&actuator, cancel),
        shutdown_signal(),
    )
    .await
    .map_err(|e| eyre!("Controller session failed: {}", e))?;

    info!("Terminated cleanly");
    Ok(())
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    Ok(())
}

/// `RUST_LOG`, when it names a plain level, overrides the configured one
fn setup_logging(configured: Level) {
    let level = std::env::var("RUST_LOG")
        .ok()
        .and_then(|value| Level::from_str(&value).ok())
        .unwrap_or(configured);

    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}

/// Resolves on Ctrl-C or, on unix, SIGTERM from the service manager
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl-C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
