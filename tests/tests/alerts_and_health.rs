use shared_models::error::Result;
use shared_models::{AlertSeverity, AlertType, HealthStatus};
use tests::{harness, healthy_bot, risk};

#[tokio::test]
async fn low_win_rate_raises_one_alert_until_resolved() -> Result<()> {
    let mut bot = healthy_bot("bot-1");
    bot.performance.as_mut().unwrap().win_rate = 0.35;
    let h = harness(Default::default(), vec![bot])?;
    let mut realtime = h.monitor.subscribe_alerts().expect("realtime alerts enabled");

    h.monitor.collect_once().await?;
    assert_eq!(h.monitor.evaluate_alerts_once().await, 1);

    let active = h.monitor.get_active_alerts().await;
    assert_eq!(active.len(), 1);
    let alert = &active[0];
    assert_eq!(alert.alert_type, AlertType::Performance);
    assert_eq!(alert.severity, AlertSeverity::Warning);
    assert_eq!(alert.title, "Low Win Rate");
    assert_eq!(alert.bot_id.as_deref(), Some("bot-1"));
    assert_eq!(alert.metadata["threshold"], serde_json::json!(0.4));

    let pushed = realtime.recv().await.expect("alert broadcast");
    assert_eq!(pushed.id, alert.id);

    h.monitor.acknowledge_alert(&alert.id).await?;
    assert!(h.monitor.get_bot_alerts("bot-1").await[0].acknowledged);

    h.monitor.resolve_alert(&alert.id).await?;
    assert!(h.monitor.get_active_alerts().await.is_empty());
    let per_bot = h.monitor.get_bot_alerts("bot-1").await;
    assert_eq!(per_bot.len(), 1);
    assert!(per_bot[0].resolved && per_bot[0].acknowledged);
    assert!(per_bot[0].resolved_at.is_some());

    let history = h.monitor.get_alert_history(10).await;
    assert_eq!(history.len(), 1);
    assert!(history[0].resolved);
    assert!(history[0].resolved_at.is_some());
    Ok(())
}

#[tokio::test]
async fn healthy_inputs_give_healthy_overall() -> Result<()> {
    let h = harness(Default::default(), vec![healthy_bot("bot-1")])?;
    h.monitor.collect_once().await?;
    h.monitor.check_health_once().await;

    let health = h.monitor.get_bot_health("bot-1").await?;
    assert_eq!(health.performance, HealthStatus::Healthy);
    assert_eq!(health.risk, HealthStatus::Healthy);
    assert_eq!(health.trading, HealthStatus::Healthy);
    assert_eq!(health.system, HealthStatus::Healthy);
    assert_eq!(health.overall, HealthStatus::Healthy);

    assert_eq!(h.monitor.evaluate_alerts_once().await, 0);
    Ok(())
}

#[tokio::test]
async fn critical_risk_dominates_overall_health() -> Result<()> {
    let h = harness(Default::default(), vec![healthy_bot("bot-1")])?;
    h.risk.set("bot-1", risk(82));
    h.monitor.collect_once().await?;
    h.monitor.check_health_once().await;

    let health = h.monitor.get_bot_health("bot-1").await?;
    assert_eq!(health.risk, HealthStatus::Critical);
    assert_eq!(health.performance, HealthStatus::Healthy);
    assert_eq!(health.overall, HealthStatus::Critical);

    h.monitor.evaluate_alerts_once().await;
    let titles: Vec<String> = h
        .monitor
        .get_active_alerts()
        .await
        .into_iter()
        .map(|a| a.title)
        .collect();
    assert!(titles.contains(&"High Risk Score".to_string()));
    assert!(titles.contains(&"Critical Health Status".to_string()));

    let stats = h.monitor.alert_stats().await;
    assert_eq!(stats.active, 2);
    assert_eq!(stats.critical, 1);
    Ok(())
}

#[tokio::test]
async fn acknowledging_unknown_alert_is_not_found() -> Result<()> {
    let mut bot = healthy_bot("bot-1");
    bot.performance.as_mut().unwrap().win_rate = 0.35;
    let h = harness(Default::default(), vec![bot])?;
    h.monitor.collect_once().await?;
    h.monitor.evaluate_alerts_once().await;
    let before = h.monitor.get_active_alerts().await;

    let err = h.monitor.acknowledge_alert("nonexistent-id").await.unwrap_err();
    assert!(err.is_not_found());
    assert!(h.monitor.resolve_alert("nonexistent-id").await.unwrap_err().is_not_found());

    assert_eq!(h.monitor.get_active_alerts().await, before);
    Ok(())
}

#[tokio::test]
async fn missing_risk_figures_leave_risk_health_unknown() -> Result<()> {
    let h = harness(Default::default(), vec![healthy_bot("bot-1"), healthy_bot("bot-2")])?;
    h.monitor.collect_once().await?;

    // bot-9 is unknown to the risk manager; bot-2 has left the roster.
    h.roster.set_bots(vec![healthy_bot("bot-1"), healthy_bot("bot-9")]);
    h.monitor.collect_once().await?;
    h.monitor.check_health_once().await;

    let bot = h.monitor.get_bot_metrics("bot-9").await?;
    assert!(bot.risk.is_none());
    assert_eq!(bot.health.risk, HealthStatus::Unknown);
    assert_eq!(bot.health.overall, HealthStatus::Healthy);
    assert!(h.monitor.get_bot_metrics("bot-2").await.unwrap_err().is_not_found());
    Ok(())
}
