use thiserror::Error;

#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },
    #[error("Monitor is already running")]
    AlreadyRunning,
    #[error("Monitor is shutting down")]
    ShuttingDown,
    #[error("Serialization Error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("Configuration Error: {0}")]
    Config(String),
    #[error("Provider Error: {0}")]
    Provider(String),
    #[error("Timeout: {0}")]
    Timeout(String),
    #[error("Network Error: {0}")]
    Network(String),
    #[error("Metrics Error: {0}")]
    Metrics(String),
}

impl MonitorError {
    pub fn bot_not_found(id: impl Into<String>) -> Self {
        MonitorError::NotFound { kind: "bot", id: id.into() }
    }

    pub fn alert_not_found(id: impl Into<String>) -> Self {
        MonitorError::NotFound { kind: "alert", id: id.into() }
    }

    pub fn history_not_found(id: impl Into<String>) -> Self {
        MonitorError::NotFound { kind: "history", id: id.into() }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, MonitorError::NotFound { .. })
    }
}

impl From<prometheus::Error> for MonitorError {
    fn from(error: prometheus::Error) -> Self {
        MonitorError::Metrics(error.to_string())
    }
}

pub type Result<T, E = MonitorError> = std::result::Result<T, E>;
