//! Health classification from fixed metric bands.

use chrono::Utc;
use shared_models::{
    BotMetrics, BotPerformance, BotRiskMetrics, BotSystemMetrics, HealthIndicators, HealthStatus,
    TradingMetrics,
};

/// Worst-of reduction. `Critical` short-circuits; `Unknown` is ignored, so an
/// all-unknown input still reduces to `Healthy`.
pub fn worst_of<I>(statuses: I) -> HealthStatus
where
    I: IntoIterator<Item = HealthStatus>,
{
    let mut overall = HealthStatus::Healthy;
    for status in statuses {
        if status == HealthStatus::Critical {
            return HealthStatus::Critical;
        }
        if status.rank() > overall.rank() {
            overall = status;
        }
    }
    overall
}

pub fn performance_health(performance: Option<&BotPerformance>) -> HealthStatus {
    match performance {
        Some(p) if p.win_rate > 0.6 => HealthStatus::Healthy,
        Some(p) if p.win_rate > 0.4 => HealthStatus::Warning,
        Some(_) => HealthStatus::Critical,
        None => HealthStatus::Unknown,
    }
}

pub fn risk_health(risk: Option<&BotRiskMetrics>) -> HealthStatus {
    match risk {
        Some(r) if r.risk_score < 50 => HealthStatus::Healthy,
        Some(r) if r.risk_score < 80 => HealthStatus::Warning,
        Some(_) => HealthStatus::Critical,
        None => HealthStatus::Unknown,
    }
}

pub fn trading_health(trading: Option<&TradingMetrics>) -> HealthStatus {
    match trading {
        Some(t) if t.fill_rate > 0.9 => HealthStatus::Healthy,
        Some(t) if t.fill_rate > 0.7 => HealthStatus::Warning,
        Some(_) => HealthStatus::Critical,
        None => HealthStatus::Unknown,
    }
}

pub fn system_health(system: Option<&BotSystemMetrics>) -> HealthStatus {
    match system {
        Some(s) if s.cpu_usage < 70.0 && s.error_count < 5 => HealthStatus::Healthy,
        Some(s) if s.cpu_usage < 90.0 && s.error_count < 20 => HealthStatus::Warning,
        Some(_) => HealthStatus::Critical,
        None => HealthStatus::Unknown,
    }
}

pub fn evaluate(metrics: &BotMetrics) -> HealthIndicators {
    let performance = performance_health(metrics.performance.as_ref());
    let risk = risk_health(metrics.risk.as_ref());
    let trading = trading_health(metrics.trading.as_ref());
    let system = system_health(metrics.system.as_ref());

    HealthIndicators {
        performance,
        risk,
        trading,
        system,
        overall: worst_of([performance, risk, trading, system]),
        last_check: Utc::now(),
    }
}
