use anyhow::Context;
use bot_monitor::{
    config::get_config,
    fleet_file::FleetFile,
    provider::EngineMetricsProvider,
    shutdown::StopSignal,
    telemetry::{spawn_host_sampler, ProcessTelemetry},
    Monitor,
};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, level_filters::LevelFilter, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if it exists
    dotenvy::dotenv().ok();

    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .init();

    info!("Starting bot monitor");

    let config = get_config().context("invalid monitor configuration")?;
    let fleet_path =
        std::env::var("MONITOR_FLEET_FILE").unwrap_or_else(|_| "fleet.json".to_string());
    info!(fleet_file = %fleet_path, "Configuration loaded successfully");

    let fleet = Arc::new(FleetFile::new(fleet_path));
    let telemetry = Arc::new(ProcessTelemetry::new());
    let provider = EngineMetricsProvider::new(fleet.clone(), fleet, telemetry.clone())
        .with_timeout(config.provider_timeout)
        .with_base_capital(config.base_capital_usd)
        .with_request_recorder(telemetry.clone());

    let shutdown = StopSignal::new();
    let sampler = spawn_host_sampler(telemetry, config.host_sample_interval, shutdown.clone());
    let monitor = Monitor::new(config.clone(), Arc::new(provider))?
        .with_parent_shutdown(shutdown.clone());

    if let Some(mut alerts) = monitor.subscribe_alerts() {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.triggered() => break,
                    received = alerts.recv() => match received {
                        Ok(alert) => warn!(
                            alert_id = %alert.id,
                            bot_id = alert.bot_id.as_deref().unwrap_or("-"),
                            severity = alert.severity.as_str(),
                            "{}: {}", alert.title, alert.message
                        ),
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(skipped, "Alert subscriber lagged")
                        }
                        Err(RecvError::Closed) => break,
                    },
                }
            }
        });
    }

    monitor.start().await?;
    info!("Bot monitor running, press Ctrl+C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("Shutdown signal received");

    shutdown.trigger();
    monitor.stop().await?;
    if let Err(e) = sampler.await {
        warn!(error = %e, "Host sampler ended abnormally");
    }

    let stats = monitor.alert_stats().await;
    info!(
        total = stats.total,
        active = stats.active,
        critical = stats.critical,
        "Bot monitor stopped"
    );
    Ok(())
}
