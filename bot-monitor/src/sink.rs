use serde_json::Value;
use std::sync::Mutex;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// Structured log destination for monitor events. Implementations must not
/// block the caller and must swallow their own failures.
pub trait LogSink: Send + Sync {
    fn log(&self, level: LogLevel, message: &str, fields: &[(&str, Value)]);
}

fn render_fields(fields: &[(&str, Value)]) -> String {
    let map: serde_json::Map<String, Value> = fields
        .iter()
        .map(|(k, v)| ((*k).to_string(), v.clone()))
        .collect();
    Value::Object(map).to_string()
}

/// Forwards to the process-wide `tracing` subscriber.
#[derive(Debug, Default, Clone)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn log(&self, level: LogLevel, message: &str, fields: &[(&str, Value)]) {
        let fields = render_fields(fields);
        match level {
            LogLevel::Debug => debug!(target: "bot_monitor", %fields, "{}", message),
            LogLevel::Info => info!(target: "bot_monitor", %fields, "{}", message),
            LogLevel::Warn => warn!(target: "bot_monitor", %fields, "{}", message),
            LogLevel::Error => error!(target: "bot_monitor", %fields, "{}", message),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    pub level: LogLevel,
    pub message: String,
    pub fields: Value,
}

/// Keeps every record in memory. Used by tests and embedding hosts.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<LogRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<LogRecord> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn contains(&self, message: &str) -> bool {
        self.records().iter().any(|r| r.message == message)
    }
}

impl LogSink for MemorySink {
    fn log(&self, level: LogLevel, message: &str, fields: &[(&str, Value)]) {
        let record = LogRecord {
            level,
            message: message.to_string(),
            fields: Value::Object(
                fields
                    .iter()
                    .map(|(k, v)| ((*k).to_string(), v.clone()))
                    .collect(),
            ),
        };
        // A poisoned lock only loses the record.
        if let Ok(mut records) = self.records.lock() {
            records.push(record);
        }
    }
}
