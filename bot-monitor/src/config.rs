use serde::{Deserialize, Serialize};
use shared_models::error::{MonitorError, Result};
use shared_models::PerformanceThresholds;
use std::env;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    pub collection_interval: Duration,
    pub health_check_interval: Duration,
    pub alert_check_interval: Duration,
    pub dashboard_refresh_interval: Duration,
    pub metrics_retention: Duration,
    pub alert_retention: Duration,
    pub provider_timeout: Duration,
    pub host_sample_interval: Duration,
    pub thresholds: PerformanceThresholds,
    pub enable_realtime_alerts: bool,
    pub enable_dashboard: bool,
    pub enable_metrics_export: bool,
    pub enable_profiling: bool,
    pub metrics_port: Option<u16>,
    pub max_chart_points: usize,
    pub max_recent_alerts: usize,
    pub max_alert_history: usize,
    pub base_capital_usd: f64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            collection_interval: Duration::from_secs(30),
            health_check_interval: Duration::from_secs(60),
            alert_check_interval: Duration::from_secs(30),
            dashboard_refresh_interval: Duration::from_secs(5),
            metrics_retention: Duration::from_secs(24 * 60 * 60),
            alert_retention: Duration::from_secs(7 * 24 * 60 * 60),
            provider_timeout: Duration::from_secs(10),
            host_sample_interval: Duration::from_secs(5),
            thresholds: PerformanceThresholds::default(),
            enable_realtime_alerts: true,
            enable_dashboard: true,
            enable_metrics_export: false,
            enable_profiling: false,
            metrics_port: None,
            max_chart_points: 100,
            max_recent_alerts: 10,
            max_alert_history: 1_000,
            base_capital_usd: 100_000.0,
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> Result<T> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| MonitorError::Config(format!("{} has an invalid value: {}", key, raw))),
        Err(_) => Ok(default),
    }
}

fn env_secs(key: &str, default: Duration) -> Result<Duration> {
    env_or(key, default.as_secs()).map(Duration::from_secs)
}

/// An unset port means no listener; a set one has to parse.
fn env_port(key: &str) -> Result<Option<u16>> {
    env::var(key)
        .ok()
        .map(|raw| {
            raw.trim()
                .parse()
                .map_err(|_| MonitorError::Config(format!("{} is not a valid port: {}", key, raw)))
        })
        .transpose()
}

fn env_flag(key: &str, default: bool) -> Result<bool> {
    match env::var(key) {
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(MonitorError::Config(format!("{} must be a boolean, got {}", key, raw))),
        },
        Err(_) => Ok(default),
    }
}

impl MonitorConfig {
    /// Reads every setting from the environment, falling back to the
    /// defaults for anything unset.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let t = defaults.thresholds.clone();

        Ok(MonitorConfig {
            collection_interval: env_secs("MONITOR_COLLECTION_INTERVAL_SECS", defaults.collection_interval)?,
            health_check_interval: env_secs("MONITOR_HEALTH_CHECK_INTERVAL_SECS", defaults.health_check_interval)?,
            alert_check_interval: env_secs("MONITOR_ALERT_CHECK_INTERVAL_SECS", defaults.alert_check_interval)?,
            dashboard_refresh_interval: env_secs("MONITOR_DASHBOARD_REFRESH_SECS", defaults.dashboard_refresh_interval)?,
            metrics_retention: env_secs("MONITOR_METRICS_RETENTION_SECS", defaults.metrics_retention)?,
            alert_retention: env_secs("MONITOR_ALERT_RETENTION_SECS", defaults.alert_retention)?,
            provider_timeout: env_secs("MONITOR_PROVIDER_TIMEOUT_SECS", defaults.provider_timeout)?,
            host_sample_interval: env_secs("MONITOR_HOST_SAMPLE_SECS", defaults.host_sample_interval)?,
            thresholds: PerformanceThresholds {
                min_win_rate: env_or("THRESHOLD_MIN_WIN_RATE", t.min_win_rate)?,
                max_drawdown: env_or("THRESHOLD_MAX_DRAWDOWN", t.max_drawdown)?,
                min_sharpe_ratio: env_or("THRESHOLD_MIN_SHARPE", t.min_sharpe_ratio)?,
                min_order_fill_rate: env_or("THRESHOLD_MIN_FILL_RATE", t.min_order_fill_rate)?,
                max_slippage: env_or("THRESHOLD_MAX_SLIPPAGE", t.max_slippage)?,
                max_execution_time_ms: env_or("THRESHOLD_MAX_EXECUTION_MS", t.max_execution_time_ms)?,
                max_cpu_usage: env_or("THRESHOLD_MAX_CPU", t.max_cpu_usage)?,
                max_memory_usage: env_or("THRESHOLD_MAX_MEMORY", t.max_memory_usage)?,
            },
            enable_realtime_alerts: env_flag("MONITOR_REALTIME_ALERTS", defaults.enable_realtime_alerts)?,
            enable_dashboard: env_flag("MONITOR_DASHBOARD", defaults.enable_dashboard)?,
            enable_metrics_export: env_flag("MONITOR_METRICS_EXPORT", defaults.enable_metrics_export)?,
            enable_profiling: env_flag("MONITOR_PROFILING", defaults.enable_profiling)?,
            metrics_port: env_port("METRICS_PORT")?,
            max_chart_points: env_or("MONITOR_MAX_CHART_POINTS", defaults.max_chart_points)?,
            max_recent_alerts: env_or("MONITOR_MAX_RECENT_ALERTS", defaults.max_recent_alerts)?,
            max_alert_history: env_or("MONITOR_MAX_ALERT_HISTORY", defaults.max_alert_history)?,
            base_capital_usd: env_or("MONITOR_BASE_CAPITAL", defaults.base_capital_usd)?,
        })
    }

    pub fn validate(self) -> Result<Self> {
        macro_rules! ensure {
            ($cond:expr, $msg:literal) => {
                if !$cond {
                    return Err(MonitorError::Config($msg.into()));
                }
            };
        }

        ensure!(!self.collection_interval.is_zero(), "collection_interval must be > 0");
        ensure!(!self.health_check_interval.is_zero(), "health_check_interval must be > 0");
        ensure!(!self.alert_check_interval.is_zero(), "alert_check_interval must be > 0");
        ensure!(
            !self.dashboard_refresh_interval.is_zero(),
            "dashboard_refresh_interval must be > 0"
        );
        ensure!(!self.provider_timeout.is_zero(), "provider_timeout must be > 0");
        ensure!(!self.host_sample_interval.is_zero(), "host_sample_interval must be > 0");
        ensure!(
            self.metrics_retention >= self.collection_interval,
            "metrics_retention must cover at least one collection interval"
        );
        ensure!(
            (0.0..=1.0).contains(&self.thresholds.min_win_rate),
            "min_win_rate must be in [0,1]"
        );
        ensure!(
            (0.0..=1.0).contains(&self.thresholds.min_order_fill_rate),
            "min_order_fill_rate must be in [0,1]"
        );
        ensure!(self.thresholds.max_drawdown > 0.0, "max_drawdown must be > 0");
        ensure!(self.max_chart_points > 0, "max_chart_points must be > 0");
        ensure!(self.max_alert_history > 0, "max_alert_history must be > 0");
        ensure!(self.base_capital_usd > 0.0, "base_capital must be > 0");

        if let Some(port) = self.metrics_port {
            ensure!(port > 1024, "metrics_port must be > 1024");
        }

        Ok(self)
    }

    /// Number of snapshots a bot's history may hold.
    pub fn history_capacity(&self) -> usize {
        let interval = self.collection_interval.as_millis().max(1);
        ((self.metrics_retention.as_millis() / interval) as usize).max(1)
    }
}

use once_cell::sync::OnceCell;

static CONFIG_CELL: OnceCell<MonitorConfig> = OnceCell::new();

pub fn get_config() -> Result<&'static MonitorConfig> {
    CONFIG_CELL.get_or_try_init(|| MonitorConfig::from_env().and_then(|config| config.validate()))
}
