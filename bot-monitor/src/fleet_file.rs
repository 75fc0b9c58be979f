use crate::provider::{BotDescriptor, BotRoster, RiskSource};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shared_models::error::{MonitorError, Result};
use shared_models::BotRiskMetrics;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::debug;

/// On-disk fleet state as exported by the trading engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FleetSnapshot {
    #[serde(default)]
    pub bots: Vec<BotDescriptor>,
    #[serde(default)]
    pub risk: HashMap<String, BotRiskMetrics>,
}

/// Roster and risk source that re-reads a JSON snapshot on every call, so
/// the engine can rewrite the file between ticks.
pub struct FleetFile {
    path: PathBuf,
}

impl FleetFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub async fn load(&self) -> Result<FleetSnapshot> {
        let raw = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            MonitorError::Provider(format!("Failed to read {}: {}", self.path.display(), e))
        })?;
        let snapshot: FleetSnapshot = serde_json::from_str(&raw)?;
        debug!(path = %self.path.display(), bots = snapshot.bots.len(), "Fleet snapshot loaded");
        Ok(snapshot)
    }
}

#[async_trait]
impl BotRoster for FleetFile {
    async fn list_bots(&self) -> Result<Vec<BotDescriptor>> {
        Ok(self.load().await?.bots)
    }
}

#[async_trait]
impl RiskSource for FleetFile {
    async fn risk_metrics(&self, bot_id: &str) -> Result<Option<BotRiskMetrics>> {
        Ok(self.load().await?.risk.remove(bot_id))
    }
}
