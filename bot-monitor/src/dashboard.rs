use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared_models::error::Result;
use shared_models::{
    Alert, AlertSeverity, BotMetrics, BotState, HealthStatus, PortfolioMetrics, SystemMetrics,
};
use std::collections::VecDeque;
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DashboardOverview {
    pub total_bots: u32,
    pub running_bots: u32,
    pub paused_bots: u32,
    pub error_bots: u32,
    pub total_value: f64,
    pub total_pnl: f64,
    pub daily_pnl: f64,
    pub total_return: f64,
    pub active_alerts: u32,
    pub critical_alerts: u32,
    pub system_health: HealthStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BotSummary {
    pub bot_id: String,
    pub name: String,
    pub strategy: String,
    pub state: BotState,
    pub health: HealthStatus,
    pub total_pnl: f64,
    pub win_rate: f64,
    pub total_trades: u64,
    pub risk_score: Option<u8>,
    pub active_alerts: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemStatus {
    pub metrics: SystemMetrics,
    pub health: HealthStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartPoint {
    pub timestamp: DateTime<Utc>,
    pub portfolio_value: f64,
    pub total_pnl: f64,
    pub daily_pnl: f64,
    pub drawdown: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskDistribution {
    pub low: u32,
    pub medium: u32,
    pub high: u32,
    pub critical: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskDashboardMetrics {
    pub var_95: f64,
    pub var_99: f64,
    pub max_drawdown: f64,
    pub sharpe_ratio: f64,
    pub risk_distribution: RiskDistribution,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TradingActivitySummary {
    pub orders_placed: u64,
    pub orders_filled: u64,
    pub orders_cancelled: u64,
    pub orders_failed: u64,
    pub total_volume: f64,
    pub total_fees: f64,
    pub avg_fill_rate: f64,
}

/// Read model handed to display consumers. Replaced on every refresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardData {
    pub last_updated: DateTime<Utc>,
    pub overview: DashboardOverview,
    pub bot_summaries: Vec<BotSummary>,
    pub portfolio: PortfolioMetrics,
    pub system_status: SystemStatus,
    pub recent_alerts: Vec<Alert>,
    pub performance_chart: Vec<ChartPoint>,
    pub risk_metrics: RiskDashboardMetrics,
    pub trading_activity: TradingActivitySummary,
}

impl DashboardData {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

pub fn overview(
    bots: &[BotMetrics],
    portfolio: &PortfolioMetrics,
    alerts: &[Alert],
) -> DashboardOverview {
    let count = |state: BotState| bots.iter().filter(|b| b.state == state).count() as u32;
    let active_alerts = alerts.iter().filter(|a| a.is_active()).count() as u32;
    let critical_alerts = alerts
        .iter()
        .filter(|a| a.is_active() && a.severity == AlertSeverity::Critical)
        .count() as u32;

    let system_health = if critical_alerts > 0 {
        HealthStatus::Critical
    } else if active_alerts > 5 {
        HealthStatus::Warning
    } else {
        HealthStatus::Healthy
    };

    DashboardOverview {
        total_bots: bots.len() as u32,
        running_bots: count(BotState::Running),
        paused_bots: count(BotState::Paused),
        error_bots: count(BotState::Error),
        total_value: portfolio.total_value,
        total_pnl: portfolio.total_pnl,
        daily_pnl: portfolio.daily_pnl,
        total_return: portfolio.total_return,
        active_alerts,
        critical_alerts,
        system_health,
    }
}

pub fn bot_summaries(bots: &[BotMetrics], alerts: &[Alert]) -> Vec<BotSummary> {
    bots.iter()
        .map(|bot| {
            let perf = bot.performance.as_ref();
            BotSummary {
                bot_id: bot.bot_id.clone(),
                name: bot.name.clone(),
                strategy: bot.strategy.clone(),
                state: bot.state,
                health: bot.health.overall,
                total_pnl: perf.map_or(0.0, |p| p.total_pnl),
                win_rate: perf.map_or(0.0, |p| p.win_rate),
                total_trades: perf.map_or(0, |p| p.total_trades),
                risk_score: bot.risk.as_ref().map(|r| r.risk_score),
                active_alerts: alerts
                    .iter()
                    .filter(|a| a.is_active() && a.bot_id.as_deref() == Some(bot.bot_id.as_str()))
                    .count() as u32,
            }
        })
        .collect()
}

pub fn system_status(system: &SystemMetrics) -> SystemStatus {
    let health = if system.cpu_usage > 90.0 || system.error_rate > 10.0 {
        HealthStatus::Critical
    } else if system.cpu_usage > 80.0 || system.error_rate > 5.0 {
        HealthStatus::Warning
    } else {
        HealthStatus::Healthy
    };
    SystemStatus {
        metrics: system.clone(),
        health,
    }
}

pub fn risk_metrics(bots: &[BotMetrics], portfolio: &PortfolioMetrics) -> RiskDashboardMetrics {
    let mut distribution = RiskDistribution::default();
    let mut var_99 = 0.0;
    for risk in bots.iter().filter_map(|b| b.risk.as_ref()) {
        var_99 += risk.var_99;
        match risk.risk_score {
            0..=29 => distribution.low += 1,
            30..=59 => distribution.medium += 1,
            60..=79 => distribution.high += 1,
            _ => distribution.critical += 1,
        }
    }

    RiskDashboardMetrics {
        var_95: portfolio.var_95,
        var_99,
        max_drawdown: portfolio.max_drawdown,
        sharpe_ratio: portfolio.sharpe_ratio,
        risk_distribution: distribution,
    }
}

pub fn trading_activity(bots: &[BotMetrics]) -> TradingActivitySummary {
    let mut summary = TradingActivitySummary::default();
    let mut fill_rates = 0.0;
    let mut reporting = 0u32;

    for trading in bots.iter().filter_map(|b| b.trading.as_ref()) {
        summary.orders_placed += trading.orders_placed;
        summary.orders_filled += trading.orders_filled;
        summary.orders_cancelled += trading.orders_cancelled;
        summary.orders_failed += trading.orders_failed;
        summary.total_volume += trading.total_volume;
        summary.total_fees += trading.total_fees;
        fill_rates += trading.fill_rate;
        reporting += 1;
    }

    if reporting > 0 {
        summary.avg_fill_rate = fill_rates / reporting as f64;
    }
    summary
}

/// Folds monitor state into `DashboardData`. The only state kept between
/// refreshes is the performance chart.
pub struct DashboardAggregator {
    chart: VecDeque<ChartPoint>,
    max_chart_points: usize,
    max_recent_alerts: usize,
}

impl Default for DashboardAggregator {
    fn default() -> Self {
        Self::new(100, 10)
    }
}

impl DashboardAggregator {
    pub fn new(max_chart_points: usize, max_recent_alerts: usize) -> Self {
        Self {
            chart: VecDeque::with_capacity(max_chart_points.min(4_096)),
            max_chart_points: max_chart_points.max(1),
            max_recent_alerts,
        }
    }

    fn push_chart_point(&mut self, point: ChartPoint) {
        self.chart.push_back(point);
        while self.chart.len() > self.max_chart_points {
            self.chart.pop_front();
        }
    }

    /// `alerts` is taken in caller order; the first `max_recent_alerts`
    /// become the recent list without re-sorting.
    pub fn refresh(
        &mut self,
        bots: &[BotMetrics],
        portfolio: &PortfolioMetrics,
        system: &SystemMetrics,
        alerts: &[Alert],
    ) -> DashboardData {
        let now = Utc::now();
        self.push_chart_point(ChartPoint {
            timestamp: now,
            portfolio_value: portfolio.total_value,
            total_pnl: portfolio.total_pnl,
            daily_pnl: portfolio.daily_pnl,
            drawdown: portfolio.max_drawdown,
        });

        let data = DashboardData {
            last_updated: now,
            overview: overview(bots, portfolio, alerts),
            bot_summaries: bot_summaries(bots, alerts),
            portfolio: portfolio.clone(),
            system_status: system_status(system),
            recent_alerts: alerts.iter().take(self.max_recent_alerts).cloned().collect(),
            performance_chart: self.chart.iter().cloned().collect(),
            risk_metrics: risk_metrics(bots, portfolio),
            trading_activity: trading_activity(bots),
        };

        debug!(
            bots = data.overview.total_bots,
            active_alerts = data.overview.active_alerts,
            chart_points = data.performance_chart.len(),
            "Dashboard refreshed"
        );
        data
    }
}
