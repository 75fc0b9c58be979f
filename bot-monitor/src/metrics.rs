use axum::{http::StatusCode, response::Response, routing::get, Router};
use prometheus::{Counter, Encoder, Gauge, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder};
use shared_models::error::{MonitorError, Result};
use shared_models::{PortfolioMetrics, SystemMetrics};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

/// Prometheus export of the monitor's own view of the fleet.
pub struct Metrics {
    pub portfolio_value: Gauge,
    pub total_pnl: Gauge,
    pub daily_pnl: Gauge,
    pub active_bots: Gauge,
    pub active_alerts: Gauge,
    pub critical_alerts: Gauge,
    pub host_cpu: Gauge,
    pub alerts_raised: Counter,
    pub tick_duration: HistogramVec,
    registry: Registry,
}

impl Metrics {
    pub fn new(metrics_port: Option<u16>) -> Result<Arc<Self>> {
        let registry = Registry::new();

        let portfolio_value = Gauge::with_opts(Opts::new(
            "monitor_portfolio_value_usd",
            "Aggregate portfolio value in USD",
        ))?;
        let total_pnl = Gauge::with_opts(Opts::new(
            "monitor_total_pnl_usd",
            "Total profit and loss across all bots",
        ))?;
        let daily_pnl = Gauge::with_opts(Opts::new(
            "monitor_daily_pnl_usd",
            "Daily profit and loss across all bots",
        ))?;
        let active_bots = Gauge::with_opts(Opts::new(
            "monitor_active_bots",
            "Bots currently in the running state",
        ))?;
        let active_alerts = Gauge::with_opts(Opts::new(
            "monitor_active_alerts",
            "Unresolved alerts",
        ))?;
        let critical_alerts = Gauge::with_opts(Opts::new(
            "monitor_critical_alerts",
            "Unresolved critical alerts",
        ))?;
        let host_cpu = Gauge::with_opts(Opts::new(
            "monitor_host_cpu_percent",
            "Host CPU usage",
        ))?;
        let alerts_raised = Counter::with_opts(Opts::new(
            "monitor_alerts_raised_total",
            "Alerts created by rule evaluation",
        ))?;
        let tick_duration = HistogramVec::new(
            HistogramOpts::new("monitor_tick_seconds", "Duration of periodic monitor ticks")
                .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
            &["task"],
        )?;

        registry.register(Box::new(portfolio_value.clone()))?;
        registry.register(Box::new(total_pnl.clone()))?;
        registry.register(Box::new(daily_pnl.clone()))?;
        registry.register(Box::new(active_bots.clone()))?;
        registry.register(Box::new(active_alerts.clone()))?;
        registry.register(Box::new(critical_alerts.clone()))?;
        registry.register(Box::new(host_cpu.clone()))?;
        registry.register(Box::new(alerts_raised.clone()))?;
        registry.register(Box::new(tick_duration.clone()))?;

        let metrics = Arc::new(Self {
            portfolio_value,
            total_pnl,
            daily_pnl,
            active_bots,
            active_alerts,
            critical_alerts,
            host_cpu,
            alerts_raised,
            tick_duration,
            registry,
        });

        // Start Prometheus HTTP server if port is specified
        if let Some(port) = metrics_port {
            let metrics_clone = metrics.clone();
            tokio::spawn(async move {
                if let Err(e) = start_metrics_server(port, metrics_clone).await {
                    error!("Failed to start metrics server: {}", e);
                }
            });
        }

        Ok(metrics)
    }

    pub fn update_portfolio(&self, portfolio: &PortfolioMetrics) {
        self.portfolio_value.set(portfolio.total_value);
        self.total_pnl.set(portfolio.total_pnl);
        self.daily_pnl.set(portfolio.daily_pnl);
        self.active_bots.set(portfolio.active_bots as f64);
    }

    pub fn update_system(&self, system: &SystemMetrics) {
        self.host_cpu.set(system.cpu_usage);
    }

    pub fn update_alerts(&self, active: usize, critical: usize, raised: usize) {
        self.active_alerts.set(active as f64);
        self.critical_alerts.set(critical as f64);
        self.alerts_raised.inc_by(raised as f64);
    }

    pub fn record_tick(&self, task: &str, duration_seconds: f64) {
        self.tick_duration
            .with_label_values(&[task])
            .observe(duration_seconds);
    }

    pub fn render(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| MonitorError::Metrics(e.to_string()))
    }
}

// Prometheus HTTP server for metrics export
async fn start_metrics_server(port: u16, metrics: Arc<Metrics>) -> Result<()> {
    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(metrics);

    let listener = TcpListener::bind(format!("0.0.0.0:{}", port))
        .await
        .map_err(|e| MonitorError::Network(format!("Failed to bind metrics server: {}", e)))?;

    info!("Metrics server listening on http://0.0.0.0:{}/metrics", port);

    axum::serve(listener, app)
        .await
        .map_err(|e| MonitorError::Network(format!("Metrics server failed: {}", e)))?;

    Ok(())
}

async fn metrics_handler(
    axum::extract::State(metrics): axum::extract::State<Arc<Metrics>>,
) -> std::result::Result<Response<String>, StatusCode> {
    let output = metrics.render().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Response::builder()
        .header("content-type", "text/plain; version=0.0.4")
        .body(output)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}
