use crate::telemetry::ProcessTelemetry;
use async_trait::async_trait;
use chrono::Utc;
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use shared_models::error::{MonitorError, Result};
use shared_models::{
    BotMetrics, BotPerformance, BotRiskMetrics, BotState, BotSystemMetrics, HealthIndicators,
    PortfolioMetrics, StrategyBreakdown, SystemMetrics, TradingMetrics,
};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Figures the trading engine reports for a bot. Ratios it does not report
/// are filled in by the approximations below.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportedPerformance {
    pub total_trades: u64,
    pub winning_trades: u64,
    pub losing_trades: u64,
    pub win_rate: f64,
    pub profit_factor: f64,
    pub sharpe_ratio: f64,
    pub max_drawdown: f64,
    pub total_return: f64,
    pub volatility: f64,
    pub total_pnl: f64,
    pub daily_pnl: f64,
}

/// One entry of the trading engine's bot roster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotDescriptor {
    pub bot_id: String,
    pub name: String,
    pub strategy: String,
    pub asset: String,
    pub state: BotState,
    pub performance: Option<ReportedPerformance>,
    pub trading: Option<TradingMetrics>,
    pub system: Option<BotSystemMetrics>,
}

#[async_trait]
pub trait BotRoster: Send + Sync {
    async fn list_bots(&self) -> Result<Vec<BotDescriptor>>;
}

/// Risk-manager lookup. `Ok(None)` means no figures exist for the bot yet.
#[async_trait]
pub trait RiskSource: Send + Sync {
    async fn risk_metrics(&self, bot_id: &str) -> Result<Option<BotRiskMetrics>>;
}

#[async_trait]
pub trait HostTelemetry: Send + Sync {
    async fn sample(&self) -> Result<SystemMetrics>;
}

/// Everything the orchestrator needs from a collection tick.
#[async_trait]
pub trait MetricsProvider: Send + Sync {
    async fn collect_bots(&self) -> Result<Vec<BotMetrics>>;

    async fn collect_bot(&self, bot_id: &str) -> Result<BotMetrics> {
        self.collect_bots()
            .await?
            .into_iter()
            .find(|bot| bot.bot_id == bot_id)
            .ok_or_else(|| MonitorError::bot_not_found(bot_id))
    }

    async fn collect_portfolio(&self, bots: &[BotMetrics]) -> Result<PortfolioMetrics>;

    async fn collect_system(&self) -> Result<SystemMetrics>;
}

/// Fixed-constant approximations for ratios the engine does not report.
/// These are NOT ground truth; consumers may rely on the exact constants.
pub mod approx {
    pub const SORTINO_OVER_SHARPE: f64 = 1.1;
    pub const CURRENT_OVER_MAX_DRAWDOWN: f64 = 0.7;
    pub const PERIODS_PER_YEAR: f64 = 12.0;
    pub const MARKET_VOLATILITY: f64 = 0.2;
    pub const MARKET_RETURN: f64 = 0.08;

    /// Approximation: Sortino ≈ 1.1 × Sharpe.
    pub fn sortino(sharpe: f64) -> f64 {
        sharpe * SORTINO_OVER_SHARPE
    }

    /// Approximation: current drawdown ≈ 0.7 × max drawdown.
    pub fn current_drawdown(max_drawdown: f64) -> f64 {
        max_drawdown * CURRENT_OVER_MAX_DRAWDOWN
    }

    /// Approximation: treats the reported return as one monthly period.
    pub fn annualized_return(total_return: f64) -> f64 {
        total_return * PERIODS_PER_YEAR
    }

    /// Approximation: beta ≈ bot volatility / reference market volatility.
    pub fn beta(volatility: f64) -> f64 {
        volatility / MARKET_VOLATILITY
    }

    /// Approximation: alpha ≈ annualized return − beta × reference market return.
    pub fn alpha(annualized_return: f64, beta: f64) -> f64 {
        annualized_return - beta * MARKET_RETURN
    }

    /// Approximation: Calmar ≈ annualized return / max drawdown, zero without drawdown.
    pub fn calmar(annualized_return: f64, max_drawdown: f64) -> f64 {
        if max_drawdown > 0.0 {
            annualized_return / max_drawdown
        } else {
            0.0
        }
    }
}

pub fn derive_performance(reported: &ReportedPerformance) -> BotPerformance {
    let annualized_return = approx::annualized_return(reported.total_return);
    let beta = approx::beta(reported.volatility);

    BotPerformance {
        total_trades: reported.total_trades,
        winning_trades: reported.winning_trades,
        losing_trades: reported.losing_trades,
        win_rate: reported.win_rate,
        profit_factor: reported.profit_factor,
        sharpe_ratio: reported.sharpe_ratio,
        sortino_ratio: approx::sortino(reported.sharpe_ratio),
        calmar_ratio: approx::calmar(annualized_return, reported.max_drawdown),
        max_drawdown: reported.max_drawdown,
        current_drawdown: approx::current_drawdown(reported.max_drawdown),
        total_return: reported.total_return,
        annualized_return,
        volatility: reported.volatility,
        beta,
        alpha: approx::alpha(annualized_return, beta),
        total_pnl: reported.total_pnl,
        daily_pnl: reported.daily_pnl,
    }
}

/// Recomputes the fill rate from order counts when the engine reported any.
fn normalize_trading(mut trading: TradingMetrics) -> TradingMetrics {
    if trading.orders_placed > 0 {
        trading.fill_rate = trading.orders_filled as f64 / trading.orders_placed as f64;
    }
    trading
}

pub fn aggregate_portfolio(bots: &[BotMetrics], base_capital: f64) -> PortfolioMetrics {
    let mut portfolio = PortfolioMetrics {
        total_bots: bots.len() as u32,
        timestamp: Some(Utc::now()),
        ..Default::default()
    };

    let mut sharpe_sum = 0.0;
    let mut sharpe_count = 0u32;
    let mut return_sums: HashMap<String, (f64, u32)> = HashMap::new();

    for bot in bots {
        if bot.state == BotState::Running {
            portfolio.active_bots += 1;
        }

        let breakdown = portfolio
            .strategy_breakdown
            .entry(bot.strategy.clone())
            .or_insert_with(StrategyBreakdown::default);
        breakdown.bot_count += 1;

        if let Some(perf) = &bot.performance {
            portfolio.total_pnl += perf.total_pnl;
            portfolio.daily_pnl += perf.daily_pnl;
            portfolio.max_drawdown = portfolio.max_drawdown.max(perf.max_drawdown);
            sharpe_sum += perf.sharpe_ratio;
            sharpe_count += 1;

            breakdown.total_pnl += perf.total_pnl;
            let entry = return_sums.entry(bot.strategy.clone()).or_insert((0.0, 0));
            entry.0 += perf.total_return;
            entry.1 += 1;

            *portfolio.asset_breakdown.entry(bot.asset.clone()).or_insert(0.0) += perf.total_pnl;
        }

        if let Some(risk) = &bot.risk {
            portfolio.var_95 += risk.var_95;
        }
    }

    for (strategy, (sum, count)) in return_sums {
        if let Some(breakdown) = portfolio.strategy_breakdown.get_mut(&strategy) {
            breakdown.avg_return = sum / count as f64;
        }
    }

    if sharpe_count > 0 {
        portfolio.sharpe_ratio = sharpe_sum / sharpe_count as f64;
    }
    portfolio.total_value = base_capital + portfolio.total_pnl;
    if base_capital > 0.0 {
        portfolio.total_return = portfolio.total_pnl / base_capital;
    }

    portfolio
}

async fn bounded<T, F>(what: &str, limit: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| MonitorError::Timeout(format!("{} exceeded {:?}", what, limit)))?
}

/// Metrics provider backed by the trading engine, risk manager and host
/// telemetry collaborators.
pub struct EngineMetricsProvider {
    roster: Arc<dyn BotRoster>,
    risk: Arc<dyn RiskSource>,
    telemetry: Arc<dyn HostTelemetry>,
    timeout: Duration,
    base_capital: f64,
    requests: Option<Arc<ProcessTelemetry>>,
}

impl EngineMetricsProvider {
    pub fn new(
        roster: Arc<dyn BotRoster>,
        risk: Arc<dyn RiskSource>,
        telemetry: Arc<dyn HostTelemetry>,
    ) -> Self {
        Self {
            roster,
            risk,
            telemetry,
            timeout: Duration::from_secs(10),
            base_capital: 100_000.0,
            requests: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_base_capital(mut self, base_capital: f64) -> Self {
        self.base_capital = base_capital;
        self
    }

    /// Times every roster and risk call into `telemetry`, feeding its
    /// request and error rates.
    pub fn with_request_recorder(mut self, telemetry: Arc<ProcessTelemetry>) -> Self {
        self.requests = Some(telemetry);
        self
    }

    async fn call<T, F>(&self, what: &str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let started = Instant::now();
        let outcome = bounded(what, self.timeout, fut).await;
        if let Some(requests) = &self.requests {
            requests.record_request(started.elapsed(), outcome.is_err());
        }
        outcome
    }

    async fn lookup_risk(&self, bot_id: &str) -> Option<BotRiskMetrics> {
        match self.call("risk lookup", self.risk.risk_metrics(bot_id)).await {
            Ok(risk) => risk,
            Err(e) => {
                debug!(bot_id, error = %e, "Risk metrics unavailable, omitting");
                None
            }
        }
    }
}

#[async_trait]
impl MetricsProvider for EngineMetricsProvider {
    async fn collect_bots(&self) -> Result<Vec<BotMetrics>> {
        let roster = self.call("bot roster", self.roster.list_bots()).await?;
        let now = Utc::now();

        // Lookups run concurrently so one slow risk manager costs at most
        // one timeout per tick.
        let risks = join_all(roster.iter().map(|bot| self.lookup_risk(&bot.bot_id))).await;

        let mut bots = Vec::with_capacity(roster.len());
        for (bot, risk) in roster.into_iter().zip(risks) {
            bots.push(BotMetrics {
                performance: bot.performance.as_ref().map(derive_performance),
                trading: bot.trading.map(normalize_trading),
                system: bot.system,
                risk,
                bot_id: bot.bot_id,
                name: bot.name,
                strategy: bot.strategy,
                asset: bot.asset,
                state: bot.state,
                timestamp: now,
                health: HealthIndicators::default(),
            });
        }
        Ok(bots)
    }

    async fn collect_portfolio(&self, bots: &[BotMetrics]) -> Result<PortfolioMetrics> {
        Ok(aggregate_portfolio(bots, self.base_capital))
    }

    async fn collect_system(&self) -> Result<SystemMetrics> {
        let mut system = bounded("host telemetry", self.timeout, self.telemetry.sample()).await?;
        if system.timestamp.is_none() {
            system.timestamp = Some(Utc::now());
        }
        if system.cpu_usage > 100.0 {
            warn!(cpu = system.cpu_usage, "Host telemetry reported CPU above 100%");
        }
        Ok(system)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedRoster(Vec<BotDescriptor>);

    #[async_trait]
    impl BotRoster for FixedRoster {
        async fn list_bots(&self) -> Result<Vec<BotDescriptor>> {
            Ok(self.0.clone())
        }
    }

    struct FailingRisk;

    #[async_trait]
    impl RiskSource for FailingRisk {
        async fn risk_metrics(&self, _bot_id: &str) -> Result<Option<BotRiskMetrics>> {
            Err(MonitorError::Provider("risk manager offline".into()))
        }
    }

    struct HangingRisk;

    #[async_trait]
    impl RiskSource for HangingRisk {
        async fn risk_metrics(&self, _bot_id: &str) -> Result<Option<BotRiskMetrics>> {
            tokio::time::sleep(Duration::from_secs(3_600)).await;
            Ok(None)
        }
    }

    struct SlowTelemetry;

    #[async_trait]
    impl HostTelemetry for SlowTelemetry {
        async fn sample(&self) -> Result<SystemMetrics> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(SystemMetrics::default())
        }
    }

    fn descriptor(id: &str, strategy: &str) -> BotDescriptor {
        BotDescriptor {
            bot_id: id.into(),
            name: format!("{} bot", id),
            strategy: strategy.into(),
            asset: "ETH".into(),
            state: BotState::Running,
            performance: Some(ReportedPerformance {
                total_trades: 10,
                win_rate: 0.5,
                sharpe_ratio: 2.0,
                max_drawdown: 0.1,
                total_return: 0.05,
                volatility: 0.3,
                total_pnl: 500.0,
                daily_pnl: 20.0,
                ..Default::default()
            }),
            trading: Some(TradingMetrics {
                orders_placed: 10,
                orders_filled: 8,
                ..Default::default()
            }),
            system: None,
        }
    }

    fn provider(bots: Vec<BotDescriptor>) -> EngineMetricsProvider {
        EngineMetricsProvider::new(
            Arc::new(FixedRoster(bots)),
            Arc::new(FailingRisk),
            Arc::new(SlowTelemetry),
        )
        .with_timeout(Duration::from_millis(50))
    }

    #[test]
    fn approximations_use_fixed_constants() {
        let perf = derive_performance(&ReportedPerformance {
            sharpe_ratio: 2.0,
            max_drawdown: 0.1,
            total_return: 0.05,
            volatility: 0.3,
            ..Default::default()
        });
        assert!((perf.sortino_ratio - 2.2).abs() < 1e-9);
        assert!((perf.current_drawdown - 0.07).abs() < 1e-9);
        assert!((perf.annualized_return - 0.6).abs() < 1e-9);
        assert!((perf.beta - 1.5).abs() < 1e-9);
        assert!((perf.alpha - (0.6 - 1.5 * 0.08)).abs() < 1e-9);
        assert!((perf.calmar_ratio - 6.0).abs() < 1e-9);
        assert_eq!(approx::calmar(0.6, 0.0), 0.0);
    }

    #[tokio::test]
    async fn risk_failure_omits_only_the_risk_record() {
        let bots = provider(vec![descriptor("bot-1", "grid")]).collect_bots().await.unwrap();
        assert_eq!(bots.len(), 1);
        assert!(bots[0].risk.is_none());
        assert!(bots[0].performance.is_some());
        let trading = bots[0].trading.as_ref().unwrap();
        assert!((trading.fill_rate - 0.8).abs() < 1e-9);
    }

    #[tokio::test]
    async fn collect_bot_reports_not_found() {
        let err = provider(vec![descriptor("bot-1", "grid")])
            .collect_bot("bot-9")
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test(start_paused = true)]
    async fn slow_telemetry_times_out() {
        let err = provider(vec![]).collect_system().await.unwrap_err();
        assert!(matches!(err, MonitorError::Timeout(_)));
    }

    #[tokio::test]
    async fn portfolio_aggregates_by_strategy_and_asset() {
        let provider = provider(vec![descriptor("bot-1", "grid"), descriptor("bot-2", "grid")])
            .with_base_capital(10_000.0);
        let bots = provider.collect_bots().await.unwrap();
        let portfolio = provider.collect_portfolio(&bots).await.unwrap();

        assert_eq!(portfolio.total_bots, 2);
        assert_eq!(portfolio.active_bots, 2);
        assert!((portfolio.total_pnl - 1_000.0).abs() < 1e-9);
        assert!((portfolio.total_value - 11_000.0).abs() < 1e-9);
        assert!((portfolio.total_return - 0.1).abs() < 1e-9);
        assert!((portfolio.sharpe_ratio - 2.0).abs() < 1e-9);
        assert_eq!(portfolio.strategy_breakdown["grid"].bot_count, 2);
        assert!((portfolio.strategy_breakdown["grid"].avg_return - 0.05).abs() < 1e-9);
        assert!((portfolio.asset_breakdown["ETH"] - 1_000.0).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn hung_risk_manager_costs_one_timeout_per_tick() {
        let bots: Vec<BotDescriptor> = (0..10).map(|i| descriptor(&format!("bot-{}", i), "grid")).collect();
        let provider = EngineMetricsProvider::new(
            Arc::new(FixedRoster(bots)),
            Arc::new(HangingRisk),
            Arc::new(SlowTelemetry),
        )
        .with_timeout(Duration::from_secs(10));

        let started = tokio::time::Instant::now();
        let collected = provider.collect_bots().await.unwrap();
        assert_eq!(collected.len(), 10);
        assert!(collected.iter().all(|b| b.risk.is_none()));
        assert!(started.elapsed() < Duration::from_secs(15));
    }

    #[tokio::test]
    async fn request_recorder_counts_calls_and_failures() {
        let telemetry = Arc::new(ProcessTelemetry::new());
        let provider = provider(vec![descriptor("bot-1", "grid"), descriptor("bot-2", "grid")])
            .with_request_recorder(Arc::clone(&telemetry));
        provider.collect_bots().await.unwrap();

        // One roster call plus two failing risk lookups.
        let sample = telemetry.sample().await.unwrap();
        assert!(sample.api_request_rate > 0.0);
        assert!(sample.error_rate > 0.0);
        assert!((sample.error_rate / sample.api_request_rate - 2.0 / 3.0).abs() < 1e-9);
    }
}
