use bot_monitor::config::MonitorConfig;
use shared_models::error::{MonitorError, Result};
use std::sync::atomic::Ordering;
use std::time::Duration;
use tests::{fast_config, harness, healthy_bot};

#[tokio::test]
async fn second_start_is_rejected_and_restart_works() -> Result<()> {
    let h = harness(fast_config(), vec![healthy_bot("bot-1")])?;

    h.monitor.start().await?;
    assert!(matches!(h.monitor.start().await, Err(MonitorError::AlreadyRunning)));

    h.monitor.stop().await?;
    h.monitor.start().await?;
    assert!(h.monitor.is_running().await);
    h.monitor.stop().await?;
    h.monitor.stop().await?;
    assert!(!h.monitor.is_running().await);
    Ok(())
}

#[tokio::test]
async fn history_caps_at_retention_over_interval() -> Result<()> {
    let config = MonitorConfig::default();
    assert_eq!(config.history_capacity(), 2_880);
    let h = harness(config, vec![healthy_bot("bot-1")])?;

    for _ in 0..2_880 {
        h.monitor.collect_once().await?;
    }
    let history = h.monitor.get_performance_history("bot-1").await?;
    assert_eq!(history.len(), 2_880);
    assert_eq!(history[0].performance.as_ref().unwrap().total_pnl, 1.0);

    // The 2,881st snapshot evicts the oldest.
    h.monitor.collect_once().await?;
    let history = h.monitor.get_performance_history("bot-1").await?;
    assert_eq!(history.len(), 2_880);
    assert_eq!(history[0].performance.as_ref().unwrap().total_pnl, 2.0);
    assert_eq!(history[2_879].performance.as_ref().unwrap().total_pnl, 2_881.0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn running_monitor_fills_dashboard() -> Result<()> {
    let mut slow = healthy_bot("bot-2");
    slow.trading.as_mut().unwrap().avg_execution_time_ms = 2_500.0;
    let h = harness(fast_config(), vec![healthy_bot("bot-1"), slow])?;

    h.monitor.start().await?;
    tokio::time::sleep(Duration::from_millis(3_500)).await;
    h.monitor.stop().await?;

    assert!(h.roster.calls() >= 3);
    assert_eq!(h.monitor.get_performance_history("bot-1").await?.len(), 3);

    let portfolio = h.monitor.get_portfolio_metrics().await;
    assert_eq!(portfolio.total_bots, 2);
    assert_eq!(portfolio.active_bots, 2);
    assert_eq!(h.monitor.get_system_metrics().await.cpu_usage, 35.0);

    let dashboard = h.monitor.get_dashboard_data().await.expect("dashboard refreshed");
    assert_eq!(dashboard.overview.total_bots, 2);
    assert!(!dashboard.performance_chart.is_empty());
    assert!(dashboard
        .recent_alerts
        .iter()
        .any(|a| a.title == "Slow Order Execution"));

    let json: serde_json::Value = serde_json::from_str(&h.monitor.get_dashboard_json().await?)?;
    assert!(json.get("overview").is_some());
    assert!(json.get("bot_summaries").is_some());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn results_arriving_after_stop_are_discarded() -> Result<()> {
    let h = harness(fast_config(), vec![healthy_bot("bot-1")])?;
    h.roster.set_delay(Duration::from_secs(2));

    h.monitor.start().await?;
    // First collection tick fires at 1s and is still waiting on the roster.
    tokio::time::sleep(Duration::from_millis(1_500)).await;
    assert_eq!(h.roster.calls(), 1);

    h.monitor.stop().await?;
    assert!(h.monitor.get_all_bot_metrics().await.is_empty());
    assert!(h.monitor.get_bot_metrics("bot-1").await.unwrap_err().is_not_found());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn unreachable_roster_is_logged_and_loop_continues() -> Result<()> {
    let h = harness(fast_config(), vec![healthy_bot("bot-1")])?;
    h.roster.fail.store(true, Ordering::SeqCst);

    h.monitor.start().await?;
    tokio::time::sleep(Duration::from_millis(2_500)).await;
    assert!(h.sink.contains("Bot metrics collection failed, skipping tick"));
    assert!(h.sink.contains("Periodic tick failed"));

    h.roster.fail.store(false, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_secs(1)).await;
    h.monitor.stop().await?;

    assert!(h.monitor.get_bot_metrics("bot-1").await.is_ok());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn slow_roster_times_out() -> Result<()> {
    let config = MonitorConfig {
        provider_timeout: Duration::from_secs(2),
        ..fast_config()
    };
    let h = harness(config, vec![healthy_bot("bot-1")])?;
    h.roster.set_delay(Duration::from_secs(30));

    assert!(matches!(
        h.monitor.collect_once().await,
        Err(MonitorError::Timeout(_))
    ));
    Ok(())
}

#[tokio::test]
async fn invalid_config_is_rejected() {
    let config = MonitorConfig {
        collection_interval: Duration::ZERO,
        ..MonitorConfig::default()
    };
    assert!(matches!(
        harness(config, vec![]),
        Err(MonitorError::Config(_))
    ));
}
