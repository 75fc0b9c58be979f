pub mod error;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// Bot lifecycle as reported by the trading engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BotState {
    Running,
    Paused,
    Stopped,
    Error,
}

impl BotState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BotState::Running => "running",
            BotState::Paused => "paused",
            BotState::Stopped => "stopped",
            BotState::Error => "error",
        }
    }
}

impl std::fmt::Display for BotState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// Per-bot metric sub-records
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BotPerformance {
    pub total_trades: u64,
    pub winning_trades: u64,
    pub losing_trades: u64,
    pub win_rate: f64,
    pub profit_factor: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub calmar_ratio: f64,
    pub max_drawdown: f64,
    pub current_drawdown: f64,
    pub total_return: f64,
    pub annualized_return: f64,
    pub volatility: f64,
    pub beta: f64,
    pub alpha: f64,
    pub total_pnl: f64,
    pub daily_pnl: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BotRiskMetrics {
    pub var_95: f64,
    pub var_99: f64,
    pub expected_shortfall: f64,
    /// 0 (no risk) to 100 (maximum risk)
    pub risk_score: u8,
    pub exposure: f64,
    pub leverage: f64,
    pub concentration_risk: f64,
    pub correlation_risk: f64,
    pub liquidity_risk: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TradingMetrics {
    pub orders_placed: u64,
    pub orders_filled: u64,
    pub orders_cancelled: u64,
    pub orders_failed: u64,
    pub fill_rate: f64,
    pub avg_execution_time_ms: f64,
    pub avg_slippage: f64,
    pub total_volume: f64,
    pub total_fees: f64,
    pub last_trade_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BotSystemMetrics {
    pub cpu_usage: f64,
    pub memory_usage_mb: f64,
    pub memory_limit_mb: f64,
    pub task_count: u32,
    pub api_calls: u64,
    pub error_count: u64,
    pub last_error_at: Option<DateTime<Utc>>,
    pub uptime_secs: u64,
}

impl BotSystemMetrics {
    /// Memory in use as a percentage of the bot's memory limit. Zero when no
    /// limit is reported.
    pub fn memory_usage_percent(&self) -> f64 {
        if self.memory_limit_mb > 0.0 {
            self.memory_usage_mb / self.memory_limit_mb * 100.0
        } else {
            0.0
        }
    }
}

// Health classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Warning,
    Critical,
    #[default]
    Unknown,
}

impl HealthStatus {
    /// Position in the worst-of order. `Unknown` has no rank and never
    /// degrades an aggregate.
    pub fn rank(&self) -> Option<u8> {
        match self {
            HealthStatus::Healthy => Some(0),
            HealthStatus::Warning => Some(1),
            HealthStatus::Critical => Some(2),
            HealthStatus::Unknown => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Warning => "warning",
            HealthStatus::Critical => "critical",
            HealthStatus::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthIndicators {
    pub performance: HealthStatus,
    pub risk: HealthStatus,
    pub trading: HealthStatus,
    pub system: HealthStatus,
    pub overall: HealthStatus,
    pub last_check: DateTime<Utc>,
}

impl Default for HealthIndicators {
    fn default() -> Self {
        Self {
            performance: HealthStatus::Unknown,
            risk: HealthStatus::Unknown,
            trading: HealthStatus::Unknown,
            system: HealthStatus::Unknown,
            overall: HealthStatus::Unknown,
            last_check: Utc::now(),
        }
    }
}

/// Current view of one bot. Replaced wholesale on every collection tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BotMetrics {
    pub bot_id: String,
    pub name: String,
    pub strategy: String,
    pub asset: String,
    pub state: BotState,
    pub timestamp: DateTime<Utc>,
    pub performance: Option<BotPerformance>,
    pub risk: Option<BotRiskMetrics>,
    pub trading: Option<TradingMetrics>,
    pub system: Option<BotSystemMetrics>,
    pub health: HealthIndicators,
}

/// Immutable copy of one bot's sub-records at a collection tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSnapshot {
    pub timestamp: DateTime<Utc>,
    pub performance: Option<BotPerformance>,
    pub risk: Option<BotRiskMetrics>,
    pub trading: Option<TradingMetrics>,
    pub system: Option<BotSystemMetrics>,
}

impl From<&BotMetrics> for PerformanceSnapshot {
    fn from(metrics: &BotMetrics) -> Self {
        Self {
            timestamp: metrics.timestamp,
            performance: metrics.performance.clone(),
            risk: metrics.risk.clone(),
            trading: metrics.trading.clone(),
            system: metrics.system.clone(),
        }
    }
}

// Alerts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertType {
    Performance,
    Risk,
    Trading,
    System,
    Health,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Info,
    Warning,
    High,
    Critical,
}

impl AlertSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSeverity::Info => "info",
            AlertSeverity::Warning => "warning",
            AlertSeverity::High => "high",
            AlertSeverity::Critical => "critical",
        }
    }
}

/// A threshold breach. The same record lives in the global store and in
/// the owning bot's list; both copies carry identical flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub alert_type: AlertType,
    pub severity: AlertSeverity,
    pub title: String,
    pub message: String,
    pub bot_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub acknowledged: bool,
    pub resolved: bool,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Alert {
    pub fn is_active(&self) -> bool {
        !self.resolved
    }
}

// Portfolio and host
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StrategyBreakdown {
    pub bot_count: u32,
    pub total_pnl: f64,
    pub avg_return: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PortfolioMetrics {
    pub total_value: f64,
    pub total_pnl: f64,
    pub daily_pnl: f64,
    pub total_return: f64,
    pub sharpe_ratio: f64,
    pub max_drawdown: f64,
    pub var_95: f64,
    pub active_bots: u32,
    pub total_bots: u32,
    pub strategy_breakdown: HashMap<String, StrategyBreakdown>,
    pub asset_breakdown: HashMap<String, f64>,
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemMetrics {
    pub cpu_usage: f64,
    pub cpu_cores: u32,
    pub memory_usage: f64,
    pub disk_usage: f64,
    pub network_rx_bytes: u64,
    pub network_tx_bytes: u64,
    pub task_count: u32,
    pub api_request_rate: f64,
    pub error_rate: f64,
    pub avg_response_time_ms: f64,
    pub timestamp: Option<DateTime<Utc>>,
}

/// Bounds that parameterize the alert rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceThresholds {
    pub min_win_rate: f64,
    pub max_drawdown: f64,
    pub min_sharpe_ratio: f64,
    pub min_order_fill_rate: f64,
    pub max_slippage: f64,
    pub max_execution_time_ms: f64,
    pub max_cpu_usage: f64,
    pub max_memory_usage: f64,
}

impl Default for PerformanceThresholds {
    fn default() -> Self {
        Self {
            min_win_rate: 0.4,
            max_drawdown: 0.2,
            min_sharpe_ratio: 0.5,
            min_order_fill_rate: 0.9,
            max_slippage: 0.01,
            max_execution_time_ms: 1_000.0,
            max_cpu_usage: 80.0,
            max_memory_usage: 85.0,
        }
    }
}
