use crate::alert_engine::{AlertEngine, AlertStats};
use crate::config::MonitorConfig;
use crate::dashboard::{DashboardAggregator, DashboardData};
use crate::health;
use crate::metrics::Metrics;
use crate::provider::MetricsProvider;
use crate::shutdown::StopSignal;
use crate::sink::{LogLevel, LogSink, TracingSink};
use serde_json::json;
use shared_models::error::{MonitorError, Result};
use shared_models::{
    Alert, BotMetrics, HealthIndicators, PerformanceSnapshot, PortfolioMetrics, SystemMetrics,
};
use std::collections::{HashMap, HashSet, VecDeque};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

/// Current metrics, per-bot history and the portfolio/host figures. Guarded
/// by one lock.
#[derive(Default)]
struct MetricsTable {
    bots: HashMap<String, BotMetrics>,
    history: HashMap<String, VecDeque<PerformanceSnapshot>>,
    portfolio: PortfolioMetrics,
    system: SystemMetrics,
}

struct DashboardState {
    aggregator: DashboardAggregator,
    latest: Option<DashboardData>,
}

/// State shared between the query API and the periodic tasks. No method
/// holds two of these locks at once.
struct Shared {
    config: MonitorConfig,
    provider: Arc<dyn MetricsProvider>,
    sink: Arc<dyn LogSink>,
    table: RwLock<MetricsTable>,
    alerts: AlertEngine,
    dashboard: RwLock<DashboardState>,
    metrics: Option<Arc<Metrics>>,
    history_capacity: usize,
}

impl Shared {
    async fn collect(&self, stop: Option<&StopSignal>) -> Result<usize> {
        let bots = match self.provider.collect_bots().await {
            Ok(bots) => bots,
            Err(e) => {
                self.sink.log(
                    LogLevel::Warn,
                    "Bot metrics collection failed, skipping tick",
                    &[("error", json!(e.to_string()))],
                );
                return Err(e);
            }
        };

        if stop.is_some_and(|s| s.is_triggered()) {
            debug!("Monitor stopped during collection, discarding results");
            return Ok(0);
        }

        let collected = bots.len();
        {
            let mut table = self.table.write().await;
            let live: HashSet<&str> = bots.iter().map(|b| b.bot_id.as_str()).collect();
            table.bots.retain(|id, _| live.contains(id.as_str()));
            table.history.retain(|id, _| live.contains(id.as_str()));

            for bot in &bots {
                let mut bot = bot.clone();
                if let Some(previous) = table.bots.get(&bot.bot_id) {
                    bot.health = previous.health.clone();
                }
                let history = table.history.entry(bot.bot_id.clone()).or_default();
                history.push_back(PerformanceSnapshot::from(&bot));
                while history.len() > self.history_capacity {
                    history.pop_front();
                }
                table.bots.insert(bot.bot_id.clone(), bot);
            }
        }

        match self.provider.collect_portfolio(&bots).await {
            Ok(portfolio) => {
                if let Some(metrics) = &self.metrics {
                    metrics.update_portfolio(&portfolio);
                }
                self.table.write().await.portfolio = portfolio;
            }
            Err(e) => self.sink.log(
                LogLevel::Warn,
                "Portfolio metrics unavailable",
                &[("error", json!(e.to_string()))],
            ),
        }

        match self.provider.collect_system().await {
            Ok(system) => {
                if let Some(metrics) = &self.metrics {
                    metrics.update_system(&system);
                }
                self.table.write().await.system = system;
            }
            Err(e) => self.sink.log(
                LogLevel::Warn,
                "Host telemetry unavailable, skipping system update",
                &[("error", json!(e.to_string()))],
            ),
        }

        debug!(bots = collected, "Metrics collected");
        Ok(collected)
    }

    async fn check_health(&self) -> usize {
        let mut table = self.table.write().await;
        for bot in table.bots.values_mut() {
            bot.health = health::evaluate(bot);
        }
        table.bots.len()
    }

    async fn evaluate_alerts(&self) -> usize {
        let bots = self.sorted_bots().await;
        let created = self.alerts.evaluate(&bots, &self.config.thresholds).await;
        self.alerts.cleanup(self.config.alert_retention).await;

        if let Some(metrics) = &self.metrics {
            let stats = self.alerts.stats().await;
            metrics.update_alerts(stats.active, stats.critical, created.len());
        }
        created.len()
    }

    async fn refresh_dashboard(&self) -> DashboardData {
        let (bots, portfolio, system) = {
            let table = self.table.read().await;
            let mut bots: Vec<BotMetrics> = table.bots.values().cloned().collect();
            bots.sort_by(|a, b| a.bot_id.cmp(&b.bot_id));
            (bots, table.portfolio.clone(), table.system.clone())
        };
        let active = self.alerts.list_active(None).await;

        let mut dashboard = self.dashboard.write().await;
        let data = dashboard
            .aggregator
            .refresh(&bots, &portfolio, &system, &active);
        dashboard.latest = Some(data.clone());
        data
    }

    async fn sorted_bots(&self) -> Vec<BotMetrics> {
        let table = self.table.read().await;
        let mut bots: Vec<BotMetrics> = table.bots.values().cloned().collect();
        bots.sort_by(|a, b| a.bot_id.cmp(&b.bot_id));
        bots
    }

    fn observe_tick(&self, task: &'static str, elapsed: Duration) {
        if !self.config.enable_profiling {
            return;
        }
        self.sink.log(
            LogLevel::Debug,
            "Tick profiled",
            &[
                ("task", json!(task)),
                ("elapsed_ms", json!(elapsed.as_secs_f64() * 1_000.0)),
            ],
        );
        if let Some(metrics) = &self.metrics {
            metrics.record_tick(task, elapsed.as_secs_f64());
        }
    }
}

async fn parent_stopped(parent: Option<&StopSignal>) {
    match parent {
        Some(parent) => parent.triggered().await,
        None => std::future::pending().await,
    }
}

/// Runs `tick` every `period` until either signal fires. Each tick runs in
/// its own task so a panic ends only that iteration.
fn spawn_periodic<F, Fut>(
    shared: Arc<Shared>,
    task: &'static str,
    period: Duration,
    stop: StopSignal,
    parent: Option<StopSignal>,
    tick: F,
) -> JoinHandle<()>
where
    F: Fn(Arc<Shared>, StopSignal) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = stop.triggered() => break,
                _ = parent_stopped(parent.as_ref()) => break,
                _ = ticker.tick() => {}
            }

            let started = Instant::now();
            match tokio::spawn(tick(Arc::clone(&shared), stop.clone())).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => shared.sink.log(
                    LogLevel::Warn,
                    "Periodic tick failed",
                    &[("task", json!(task)), ("error", json!(e.to_string()))],
                ),
                Err(e) => shared.sink.log(
                    LogLevel::Error,
                    "Periodic tick panicked",
                    &[("task", json!(task)), ("error", json!(e.to_string()))],
                ),
            }
            shared.observe_tick(task, started.elapsed());
        }

        debug!(task, "Periodic task stopped");
    })
}

struct Running {
    stop: StopSignal,
    handles: Vec<JoinHandle<()>>,
}

impl Running {
    fn finished(&self) -> bool {
        self.handles.iter().all(|h| h.is_finished())
    }
}

/// Fleet monitor: owns the metrics table and alert store, runs the periodic
/// collection, health, alert and dashboard tasks, and answers queries.
pub struct Monitor {
    shared: Arc<Shared>,
    lifecycle: Mutex<Option<Running>>,
    parent: Option<StopSignal>,
}

impl Monitor {
    pub fn new(config: MonitorConfig, provider: Arc<dyn MetricsProvider>) -> Result<Self> {
        Self::with_sink(config, provider, Arc::new(TracingSink))
    }

    /// Must be called inside a tokio runtime when metrics export is enabled
    /// with a port, since the exporter is spawned here.
    pub fn with_sink(
        config: MonitorConfig,
        provider: Arc<dyn MetricsProvider>,
        sink: Arc<dyn LogSink>,
    ) -> Result<Self> {
        let config = config.validate()?;
        let metrics = if config.enable_metrics_export {
            Some(Metrics::new(config.metrics_port)?)
        } else {
            None
        };

        let alerts = AlertEngine::new(config.max_alert_history, config.enable_realtime_alerts)
            .with_sink(Arc::clone(&sink));
        let dashboard = DashboardState {
            aggregator: DashboardAggregator::new(config.max_chart_points, config.max_recent_alerts),
            latest: None,
        };

        Ok(Self {
            shared: Arc::new(Shared {
                history_capacity: config.history_capacity(),
                config,
                provider,
                sink,
                table: RwLock::new(MetricsTable::default()),
                alerts,
                dashboard: RwLock::new(dashboard),
                metrics,
            }),
            lifecycle: Mutex::new(None),
            parent: None,
        })
    }

    /// Ties the periodic tasks to an enclosing shutdown signal as well.
    pub fn with_parent_shutdown(mut self, parent: StopSignal) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.shared.config
    }

    pub fn metrics(&self) -> Option<Arc<Metrics>> {
        self.shared.metrics.clone()
    }

    pub async fn start(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock().await;
        if lifecycle.as_ref().is_some_and(|running| !running.finished()) {
            return Err(MonitorError::AlreadyRunning);
        }
        if self.parent.as_ref().is_some_and(StopSignal::is_triggered) {
            return Err(MonitorError::ShuttingDown);
        }

        let config = &self.shared.config;
        let stop = StopSignal::new();
        let mut handles = vec![
            spawn_periodic(
                Arc::clone(&self.shared),
                "collection",
                config.collection_interval,
                stop.clone(),
                self.parent.clone(),
                |shared, stop| async move { shared.collect(Some(&stop)).await.map(|_| ()) },
            ),
            spawn_periodic(
                Arc::clone(&self.shared),
                "health",
                config.health_check_interval,
                stop.clone(),
                self.parent.clone(),
                |shared, _| async move {
                    shared.check_health().await;
                    Ok(())
                },
            ),
            spawn_periodic(
                Arc::clone(&self.shared),
                "alerts",
                config.alert_check_interval,
                stop.clone(),
                self.parent.clone(),
                |shared, _| async move {
                    shared.evaluate_alerts().await;
                    Ok(())
                },
            ),
        ];
        if config.enable_dashboard {
            handles.push(spawn_periodic(
                Arc::clone(&self.shared),
                "dashboard",
                config.dashboard_refresh_interval,
                stop.clone(),
                self.parent.clone(),
                |shared, _| async move {
                    shared.refresh_dashboard().await;
                    Ok(())
                },
            ));
        }

        info!(tasks = handles.len(), "Bot monitor started");
        self.shared.sink.log(
            LogLevel::Info,
            "Monitor started",
            &[
                ("tasks", json!(handles.len())),
                ("history_capacity", json!(self.shared.history_capacity)),
            ],
        );
        *lifecycle = Some(Running { stop, handles });
        Ok(())
    }

    /// Idempotent. Waits for the tasks to wind down; a provider call already
    /// in flight finishes and its result is dropped.
    pub async fn stop(&self) -> Result<()> {
        let running = self.lifecycle.lock().await.take();
        let Some(running) = running else {
            return Ok(());
        };

        running.stop.trigger();
        for handle in running.handles {
            if let Err(e) = handle.await {
                self.shared.sink.log(
                    LogLevel::Error,
                    "Periodic task ended abnormally",
                    &[("error", json!(e.to_string()))],
                );
            }
        }

        info!("Bot monitor stopped");
        self.shared.sink.log(LogLevel::Info, "Monitor stopped", &[]);
        Ok(())
    }

    pub async fn is_running(&self) -> bool {
        self.lifecycle
            .lock()
            .await
            .as_ref()
            .is_some_and(|running| !running.finished())
    }

    // Manual ticks. The periodic tasks run exactly these.

    pub async fn collect_once(&self) -> Result<usize> {
        self.shared.collect(None).await
    }

    pub async fn check_health_once(&self) -> usize {
        self.shared.check_health().await
    }

    pub async fn evaluate_alerts_once(&self) -> usize {
        self.shared.evaluate_alerts().await
    }

    pub async fn refresh_dashboard_once(&self) -> DashboardData {
        self.shared.refresh_dashboard().await
    }

    // Queries

    pub async fn get_bot_metrics(&self, bot_id: &str) -> Result<BotMetrics> {
        self.shared
            .table
            .read()
            .await
            .bots
            .get(bot_id)
            .cloned()
            .ok_or_else(|| MonitorError::bot_not_found(bot_id))
    }

    pub async fn get_all_bot_metrics(&self) -> HashMap<String, BotMetrics> {
        self.shared.table.read().await.bots.clone()
    }

    pub async fn get_bot_health(&self, bot_id: &str) -> Result<HealthIndicators> {
        self.get_bot_metrics(bot_id).await.map(|bot| bot.health)
    }

    pub async fn get_portfolio_metrics(&self) -> PortfolioMetrics {
        self.shared.table.read().await.portfolio.clone()
    }

    pub async fn get_system_metrics(&self) -> SystemMetrics {
        self.shared.table.read().await.system.clone()
    }

    pub async fn get_performance_history(&self, bot_id: &str) -> Result<Vec<PerformanceSnapshot>> {
        self.shared
            .table
            .read()
            .await
            .history
            .get(bot_id)
            .map(|history| history.iter().cloned().collect())
            .ok_or_else(|| MonitorError::history_not_found(bot_id))
    }

    pub async fn get_dashboard_data(&self) -> Option<DashboardData> {
        self.shared.dashboard.read().await.latest.clone()
    }

    pub async fn get_dashboard_json(&self) -> Result<String> {
        self.get_dashboard_data()
            .await
            .ok_or(MonitorError::NotFound {
                kind: "dashboard",
                id: "current".into(),
            })?
            .to_json()
    }

    pub async fn get_active_alerts(&self) -> Vec<Alert> {
        self.shared.alerts.list_active(None).await
    }

    /// Every alert raised for `bot_id`, resolved ones included.
    pub async fn get_bot_alerts(&self, bot_id: &str) -> Vec<Alert> {
        self.shared.alerts.bot_alerts(bot_id).await
    }

    pub async fn get_alert_history(&self, limit: usize) -> Vec<Alert> {
        self.shared.alerts.list_history(limit).await
    }

    pub async fn alert_stats(&self) -> AlertStats {
        self.shared.alerts.stats().await
    }

    pub fn subscribe_alerts(&self) -> Option<broadcast::Receiver<Alert>> {
        self.shared.alerts.subscribe()
    }

    pub async fn acknowledge_alert(&self, alert_id: &str) -> Result<()> {
        self.shared.alerts.acknowledge(alert_id).await
    }

    pub async fn resolve_alert(&self, alert_id: &str) -> Result<()> {
        self.shared.alerts.resolve(alert_id).await
    }
}
