use crate::sink::{LogLevel, LogSink, TracingSink};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use shared_models::error::{MonitorError, Result};
use shared_models::{
    Alert, AlertSeverity, AlertType, BotMetrics, HealthStatus, PerformanceThresholds,
};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tracing::debug;
use uuid::Uuid;

pub const RISK_SCORE_ALERT_LEVEL: u8 = 80;
pub const VAR_95_ALERT_LEVEL: f64 = 10_000.0;
pub const ERROR_COUNT_ALERT_LEVEL: u64 = 10;

const REALTIME_CHANNEL_CAPACITY: usize = 256;

/// A rule breach before it becomes a stored alert.
#[derive(Debug, Clone)]
pub struct Breach {
    pub alert_type: AlertType,
    pub severity: AlertSeverity,
    pub title: &'static str,
    pub message: String,
    pub metadata: HashMap<String, Value>,
}

fn breach(
    alert_type: AlertType,
    severity: AlertSeverity,
    title: &'static str,
    message: String,
    metadata: &[(&str, Value)],
) -> Breach {
    Breach {
        alert_type,
        severity,
        title,
        message,
        metadata: metadata
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect(),
    }
}

/// Every rule the bot is currently breaching. Pure; no deduplication.
pub fn check_rules(bot: &BotMetrics, t: &PerformanceThresholds) -> Vec<Breach> {
    let mut breaches = Vec::new();
    let id = &bot.bot_id;

    if let Some(perf) = &bot.performance {
        if perf.win_rate < t.min_win_rate {
            breaches.push(breach(
                AlertType::Performance,
                AlertSeverity::Warning,
                "Low Win Rate",
                format!(
                    "Bot {} win rate {:.2}% is below {:.2}%",
                    id,
                    perf.win_rate * 100.0,
                    t.min_win_rate * 100.0
                ),
                &[("win_rate", json!(perf.win_rate)), ("threshold", json!(t.min_win_rate))],
            ));
        }
        if perf.current_drawdown > t.max_drawdown {
            breaches.push(breach(
                AlertType::Performance,
                AlertSeverity::High,
                "High Drawdown",
                format!(
                    "Bot {} drawdown {:.2}% exceeds {:.2}%",
                    id,
                    perf.current_drawdown * 100.0,
                    t.max_drawdown * 100.0
                ),
                &[
                    ("current_drawdown", json!(perf.current_drawdown)),
                    ("max_drawdown", json!(perf.max_drawdown)),
                    ("threshold", json!(t.max_drawdown)),
                ],
            ));
        }
        if perf.sharpe_ratio < t.min_sharpe_ratio {
            breaches.push(breach(
                AlertType::Performance,
                AlertSeverity::Warning,
                "Low Sharpe Ratio",
                format!(
                    "Bot {} Sharpe ratio {:.2} is below {:.2}",
                    id, perf.sharpe_ratio, t.min_sharpe_ratio
                ),
                &[("sharpe_ratio", json!(perf.sharpe_ratio)), ("threshold", json!(t.min_sharpe_ratio))],
            ));
        }
    }

    if let Some(risk) = &bot.risk {
        if risk.risk_score > RISK_SCORE_ALERT_LEVEL {
            breaches.push(breach(
                AlertType::Risk,
                AlertSeverity::High,
                "High Risk Score",
                format!(
                    "Bot {} risk score {} exceeds {}",
                    id, risk.risk_score, RISK_SCORE_ALERT_LEVEL
                ),
                &[("risk_score", json!(risk.risk_score)), ("threshold", json!(RISK_SCORE_ALERT_LEVEL))],
            ));
        }
        if risk.var_95 > VAR_95_ALERT_LEVEL {
            breaches.push(breach(
                AlertType::Risk,
                AlertSeverity::Warning,
                "High Value at Risk",
                format!(
                    "Bot {} VaR95 {:.2} exceeds {:.2}",
                    id, risk.var_95, VAR_95_ALERT_LEVEL
                ),
                &[
                    ("var_95", json!(risk.var_95)),
                    ("var_99", json!(risk.var_99)),
                    ("threshold", json!(VAR_95_ALERT_LEVEL)),
                ],
            ));
        }
    }

    if let Some(trading) = &bot.trading {
        if trading.fill_rate < t.min_order_fill_rate {
            breaches.push(breach(
                AlertType::Trading,
                AlertSeverity::Warning,
                "Low Order Fill Rate",
                format!(
                    "Bot {} fill rate {:.2}% is below {:.2}%",
                    id,
                    trading.fill_rate * 100.0,
                    t.min_order_fill_rate * 100.0
                ),
                &[
                    ("fill_rate", json!(trading.fill_rate)),
                    ("orders_placed", json!(trading.orders_placed)),
                    ("orders_filled", json!(trading.orders_filled)),
                    ("threshold", json!(t.min_order_fill_rate)),
                ],
            ));
        }
        if trading.avg_slippage > t.max_slippage {
            breaches.push(breach(
                AlertType::Trading,
                AlertSeverity::Warning,
                "High Slippage",
                format!(
                    "Bot {} average slippage {:.4} exceeds {:.4}",
                    id, trading.avg_slippage, t.max_slippage
                ),
                &[("avg_slippage", json!(trading.avg_slippage)), ("threshold", json!(t.max_slippage))],
            ));
        }
        if trading.avg_execution_time_ms > t.max_execution_time_ms {
            breaches.push(breach(
                AlertType::Trading,
                AlertSeverity::Warning,
                "Slow Order Execution",
                format!(
                    "Bot {} average execution {:.0}ms exceeds {:.0}ms",
                    id, trading.avg_execution_time_ms, t.max_execution_time_ms
                ),
                &[
                    ("avg_execution_time_ms", json!(trading.avg_execution_time_ms)),
                    ("threshold", json!(t.max_execution_time_ms)),
                ],
            ));
        }
    }

    if let Some(system) = &bot.system {
        if system.cpu_usage > t.max_cpu_usage {
            breaches.push(breach(
                AlertType::System,
                AlertSeverity::Warning,
                "High CPU Usage",
                format!(
                    "Bot {} CPU usage {:.1}% exceeds {:.1}%",
                    id, system.cpu_usage, t.max_cpu_usage
                ),
                &[("cpu_usage", json!(system.cpu_usage)), ("threshold", json!(t.max_cpu_usage))],
            ));
        }
        let memory_pct = system.memory_usage_percent();
        if memory_pct > t.max_memory_usage {
            breaches.push(breach(
                AlertType::System,
                AlertSeverity::Warning,
                "High Memory Usage",
                format!(
                    "Bot {} memory usage {:.1}% exceeds {:.1}%",
                    id, memory_pct, t.max_memory_usage
                ),
                &[
                    ("memory_usage_percent", json!(memory_pct)),
                    ("memory_usage_mb", json!(system.memory_usage_mb)),
                    ("threshold", json!(t.max_memory_usage)),
                ],
            ));
        }
        if system.error_count > ERROR_COUNT_ALERT_LEVEL {
            breaches.push(breach(
                AlertType::System,
                AlertSeverity::High,
                "High Error Count",
                format!(
                    "Bot {} reported {} errors, above {}",
                    id, system.error_count, ERROR_COUNT_ALERT_LEVEL
                ),
                &[("error_count", json!(system.error_count)), ("threshold", json!(ERROR_COUNT_ALERT_LEVEL))],
            ));
        }
    }

    if bot.health.overall == HealthStatus::Critical {
        breaches.push(breach(
            AlertType::Health,
            AlertSeverity::Critical,
            "Critical Health Status",
            format!("Bot {} overall health is critical", id),
            &[
                ("performance", json!(bot.health.performance)),
                ("risk", json!(bot.health.risk)),
                ("trading", json!(bot.health.trading)),
                ("system", json!(bot.health.system)),
            ],
        ));
    }

    breaches
}

#[derive(Debug, Default)]
struct AlertStore {
    alerts: HashMap<String, Alert>,
    bot_alerts: HashMap<String, Vec<Alert>>,
    history: VecDeque<Alert>,
}

impl AlertStore {
    /// Copies the flags of `alert` onto its per-bot and history copies.
    fn mirror(&mut self, alert: &Alert) {
        let copies = alert
            .bot_id
            .as_ref()
            .and_then(|bot_id| self.bot_alerts.get_mut(bot_id))
            .into_iter()
            .flat_map(|list| list.iter_mut())
            .chain(self.history.iter_mut());
        for copy in copies.filter(|copy| copy.id == alert.id) {
            copy.acknowledged = alert.acknowledged;
            copy.acknowledged_at = alert.acknowledged_at;
            copy.resolved = alert.resolved;
            copy.resolved_at = alert.resolved_at;
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AlertStats {
    pub total: usize,
    pub active: usize,
    pub acknowledged: usize,
    pub critical: usize,
}

/// Owns every alert record and its lifecycle:
/// active -> acknowledged (optional) -> resolved (terminal).
pub struct AlertEngine {
    store: RwLock<AlertStore>,
    max_history: usize,
    realtime: Option<broadcast::Sender<Alert>>,
    sink: Arc<dyn LogSink>,
}

impl Default for AlertEngine {
    fn default() -> Self {
        Self::new(1_000, false)
    }
}

impl AlertEngine {
    pub fn new(max_history: usize, realtime: bool) -> Self {
        Self {
            store: RwLock::new(AlertStore::default()),
            max_history: max_history.max(1),
            realtime: realtime.then(|| broadcast::channel(REALTIME_CHANNEL_CAPACITY).0),
            sink: Arc::new(TracingSink),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Receiver for newly created alerts; `None` when realtime alerts are off.
    pub fn subscribe(&self) -> Option<broadcast::Receiver<Alert>> {
        self.realtime.as_ref().map(|tx| tx.subscribe())
    }

    /// Runs every rule for every bot and stores one new alert per breach.
    pub async fn evaluate(
        &self,
        bots: &[BotMetrics],
        thresholds: &PerformanceThresholds,
    ) -> Vec<Alert> {
        let now = Utc::now();
        let created: Vec<Alert> = bots
            .iter()
            .flat_map(|bot| {
                check_rules(bot, thresholds)
                    .into_iter()
                    .map(move |b| new_alert(b, Some(bot.bot_id.clone()), now))
            })
            .collect();

        for alert in &created {
            self.record(alert.clone()).await;
        }
        created
    }

    /// Stores an externally built alert as-is.
    pub async fn record(&self, alert: Alert) {
        {
            let mut store = self.store.write().await;
            if let Some(bot_id) = &alert.bot_id {
                store
                    .bot_alerts
                    .entry(bot_id.clone())
                    .or_default()
                    .push(alert.clone());
            }
            store.history.push_back(alert.clone());
            while store.history.len() > self.max_history {
                store.history.pop_front();
            }
            store.alerts.insert(alert.id.clone(), alert.clone());
        }

        let level = match alert.severity {
            AlertSeverity::Info => LogLevel::Info,
            AlertSeverity::Warning => LogLevel::Warn,
            AlertSeverity::High | AlertSeverity::Critical => LogLevel::Error,
        };
        self.sink.log(
            level,
            &alert.title,
            &[
                ("alert_id", json!(alert.id)),
                ("bot_id", json!(alert.bot_id)),
                ("severity", json!(alert.severity)),
                ("message", json!(alert.message)),
            ],
        );

        if let Some(tx) = &self.realtime {
            // No subscribers is fine.
            let _ = tx.send(alert);
        }
    }

    pub async fn acknowledge(&self, alert_id: &str) -> Result<()> {
        let mut store = self.store.write().await;
        let alert = store
            .alerts
            .get_mut(alert_id)
            .ok_or_else(|| MonitorError::alert_not_found(alert_id))?;

        if alert.resolved {
            return Ok(());
        }
        if !alert.acknowledged {
            alert.acknowledged = true;
            alert.acknowledged_at = Some(Utc::now());
        }
        let snapshot = alert.clone();
        store.mirror(&snapshot);
        debug!(alert_id, "Alert acknowledged");
        Ok(())
    }

    pub async fn resolve(&self, alert_id: &str) -> Result<()> {
        let mut store = self.store.write().await;
        let alert = store
            .alerts
            .get_mut(alert_id)
            .ok_or_else(|| MonitorError::alert_not_found(alert_id))?;

        let now = Utc::now();
        alert.resolved = true;
        alert.acknowledged = true;
        alert.resolved_at.get_or_insert(now);
        alert.acknowledged_at.get_or_insert(now);
        let snapshot = alert.clone();
        store.mirror(&snapshot);
        debug!(alert_id, "Alert resolved");
        Ok(())
    }

    pub async fn get(&self, alert_id: &str) -> Result<Alert> {
        self.store
            .read()
            .await
            .alerts
            .get(alert_id)
            .cloned()
            .ok_or_else(|| MonitorError::alert_not_found(alert_id))
    }

    /// Unresolved alerts, newest first, optionally for a single bot.
    pub async fn list_active(&self, bot_id: Option<&str>) -> Vec<Alert> {
        let store = self.store.read().await;
        let mut active: Vec<Alert> = store
            .alerts
            .values()
            .filter(|a| a.is_active())
            .filter(|a| bot_id.map_or(true, |id| a.bot_id.as_deref() == Some(id)))
            .cloned()
            .collect();
        active.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        active
    }

    pub async fn bot_alerts(&self, bot_id: &str) -> Vec<Alert> {
        self.store
            .read()
            .await
            .bot_alerts
            .get(bot_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Newest history entries first.
    pub async fn list_history(&self, limit: usize) -> Vec<Alert> {
        self.store
            .read()
            .await
            .history
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect()
    }

    pub async fn stats(&self) -> AlertStats {
        let store = self.store.read().await;
        store.alerts.values().fold(
            AlertStats {
                total: store.alerts.len(),
                ..Default::default()
            },
            |mut stats, alert| {
                if alert.is_active() {
                    stats.active += 1;
                    if alert.severity == AlertSeverity::Critical {
                        stats.critical += 1;
                    }
                }
                if alert.acknowledged {
                    stats.acknowledged += 1;
                }
                stats
            },
        )
    }

    /// Drops resolved alerts created more than `retention` ago. Returns how
    /// many records left the global store.
    pub async fn cleanup(&self, retention: Duration) -> usize {
        let retention = chrono::Duration::from_std(retention)
            .unwrap_or_else(|_| chrono::Duration::days(365 * 100));
        self.cleanup_before(Utc::now() - retention).await
    }

    /// Retention is judged on creation time. Unresolved alerts always stay
    /// in the store and per-bot lists; history keeps only entries created
    /// at or after `cutoff`.
    pub async fn cleanup_before(&self, cutoff: DateTime<Utc>) -> usize {
        let expired = |a: &Alert| a.resolved && a.created_at < cutoff;

        let mut store = self.store.write().await;
        let before = store.alerts.len();
        store.alerts.retain(|_, a| !expired(a));
        for list in store.bot_alerts.values_mut() {
            list.retain(|a| !expired(a));
        }
        store.bot_alerts.retain(|_, list| !list.is_empty());
        store.history.retain(|a| a.created_at >= cutoff);

        let removed = before - store.alerts.len();
        if removed > 0 {
            debug!(removed, "Expired alerts cleaned up");
        }
        removed
    }
}

fn new_alert(breach: Breach, bot_id: Option<String>, created_at: DateTime<Utc>) -> Alert {
    Alert {
        id: Uuid::new_v4().to_string(),
        alert_type: breach.alert_type,
        severity: breach.severity,
        title: breach.title.to_string(),
        message: breach.message,
        bot_id,
        created_at,
        acknowledged: false,
        resolved: false,
        acknowledged_at: None,
        resolved_at: None,
        metadata: breach.metadata,
    }
}
