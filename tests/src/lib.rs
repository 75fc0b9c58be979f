//! Fake collaborators and fixtures for driving the monitor end to end.

use async_trait::async_trait;
use bot_monitor::config::MonitorConfig;
use bot_monitor::provider::{
    BotDescriptor, BotRoster, EngineMetricsProvider, HostTelemetry, ReportedPerformance,
    RiskSource,
};
use bot_monitor::sink::MemorySink;
use bot_monitor::Monitor;
use chrono::Utc;
use shared_models::error::{MonitorError, Result};
use shared_models::{BotRiskMetrics, BotState, BotSystemMetrics, SystemMetrics, TradingMetrics};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Roster whose contents tests rewrite between ticks. Each call bumps
/// `calls`, and `total_pnl` of every bot is set to the call number so
/// successive snapshots are distinguishable.
#[derive(Default)]
pub struct FakeRoster {
    bots: Mutex<Vec<BotDescriptor>>,
    pub calls: AtomicU64,
    pub fail: AtomicBool,
    delay: Mutex<Option<Duration>>,
}

impl FakeRoster {
    pub fn with_bots(bots: Vec<BotDescriptor>) -> Arc<Self> {
        let roster = Self::default();
        *roster.bots.lock().unwrap() = bots;
        Arc::new(roster)
    }

    pub fn set_bots(&self, bots: Vec<BotDescriptor>) {
        *self.bots.lock().unwrap() = bots;
    }

    pub fn update(&self, bot_id: &str, f: impl FnOnce(&mut BotDescriptor)) {
        if let Some(bot) = self.bots.lock().unwrap().iter_mut().find(|b| b.bot_id == bot_id) {
            f(bot);
        }
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BotRoster for FakeRoster {
    async fn list_bots(&self) -> Result<Vec<BotDescriptor>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(MonitorError::Provider("trading engine unreachable".into()));
        }
        let mut bots = self.bots.lock().unwrap().clone();
        for bot in &mut bots {
            if let Some(performance) = bot.performance.as_mut() {
                performance.total_pnl = call as f64;
            }
        }
        Ok(bots)
    }
}

#[derive(Default)]
pub struct FakeRisk {
    scores: Mutex<HashMap<String, BotRiskMetrics>>,
}

impl FakeRisk {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set(&self, bot_id: &str, risk: BotRiskMetrics) {
        self.scores.lock().unwrap().insert(bot_id.to_string(), risk);
    }
}

#[async_trait]
impl RiskSource for FakeRisk {
    async fn risk_metrics(&self, bot_id: &str) -> Result<Option<BotRiskMetrics>> {
        Ok(self.scores.lock().unwrap().get(bot_id).cloned())
    }
}

pub struct FakeTelemetry {
    pub cpu_usage: Mutex<f64>,
}

impl FakeTelemetry {
    pub fn new(cpu_usage: f64) -> Arc<Self> {
        Arc::new(Self {
            cpu_usage: Mutex::new(cpu_usage),
        })
    }
}

#[async_trait]
impl HostTelemetry for FakeTelemetry {
    async fn sample(&self) -> Result<SystemMetrics> {
        Ok(SystemMetrics {
            cpu_usage: *self.cpu_usage.lock().unwrap(),
            cpu_cores: 8,
            memory_usage: 40.0,
            timestamp: Some(Utc::now()),
            ..Default::default()
        })
    }
}

/// A bot that breaches nothing under default thresholds.
pub fn healthy_bot(bot_id: &str) -> BotDescriptor {
    BotDescriptor {
        bot_id: bot_id.to_string(),
        name: format!("{} grid", bot_id),
        strategy: "grid".to_string(),
        asset: "BTC".to_string(),
        state: BotState::Running,
        performance: Some(ReportedPerformance {
            total_trades: 120,
            winning_trades: 78,
            losing_trades: 42,
            win_rate: 0.65,
            profit_factor: 1.8,
            sharpe_ratio: 1.4,
            max_drawdown: 0.08,
            total_return: 0.03,
            volatility: 0.15,
            total_pnl: 0.0,
            daily_pnl: 12.5,
        }),
        trading: Some(TradingMetrics {
            orders_placed: 100,
            orders_filled: 95,
            fill_rate: 0.95,
            avg_execution_time_ms: 120.0,
            avg_slippage: 0.002,
            total_volume: 50_000.0,
            ..Default::default()
        }),
        system: Some(BotSystemMetrics {
            cpu_usage: 50.0,
            memory_usage_mb: 256.0,
            memory_limit_mb: 1_024.0,
            task_count: 4,
            error_count: 2,
            uptime_secs: 3_600,
            ..Default::default()
        }),
    }
}

pub fn risk(score: u8) -> BotRiskMetrics {
    BotRiskMetrics {
        var_95: 500.0,
        var_99: 800.0,
        risk_score: score,
        exposure: 0.3,
        leverage: 1.0,
        ..Default::default()
    }
}

pub struct Harness {
    pub monitor: Monitor,
    pub roster: Arc<FakeRoster>,
    pub risk: Arc<FakeRisk>,
    pub telemetry: Arc<FakeTelemetry>,
    pub sink: Arc<MemorySink>,
}

/// Wires a monitor to fresh fakes holding `bots`, each with risk score 40.
pub fn harness(config: MonitorConfig, bots: Vec<BotDescriptor>) -> Result<Harness> {
    let risk_source = FakeRisk::new();
    for bot in &bots {
        risk_source.set(&bot.bot_id, risk(40));
    }
    let roster = FakeRoster::with_bots(bots);
    let telemetry = FakeTelemetry::new(35.0);
    let sink = Arc::new(MemorySink::new());

    let provider = EngineMetricsProvider::new(roster.clone(), risk_source.clone(), telemetry.clone())
        .with_timeout(config.provider_timeout)
        .with_base_capital(config.base_capital_usd);
    let monitor = Monitor::with_sink(config, Arc::new(provider), sink.clone())?;

    Ok(Harness {
        monitor,
        roster,
        risk: risk_source,
        telemetry,
        sink,
    })
}

/// One-second ticks and a three-entry history.
pub fn fast_config() -> MonitorConfig {
    MonitorConfig {
        collection_interval: Duration::from_secs(1),
        health_check_interval: Duration::from_secs(1),
        alert_check_interval: Duration::from_secs(1),
        dashboard_refresh_interval: Duration::from_secs(1),
        metrics_retention: Duration::from_secs(3),
        ..MonitorConfig::default()
    }
}
