pub mod alert_engine;
pub mod config;
pub mod dashboard;
pub mod fleet_file;
pub mod health;
pub mod metrics;
pub mod monitor;
pub mod provider;
pub mod shutdown;
pub mod sink;
pub mod telemetry;

pub use monitor::Monitor;
