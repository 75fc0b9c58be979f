use crate::provider::HostTelemetry;
use crate::shutdown::StopSignal;
use async_trait::async_trait;
use chrono::Utc;
use shared_models::error::Result;
use shared_models::SystemMetrics;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use sysinfo::{Disks, Networks, System};
use tokio::task::JoinHandle;
use tracing::debug;

/// Host figures pushed in by whatever samples the machine.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostSample {
    pub cpu_usage: f64,
    pub memory_usage: f64,
    pub disk_usage: f64,
    pub network_rx_bytes: u64,
    pub network_tx_bytes: u64,
    pub task_count: u32,
}

/// Samples this machine through `sysinfo`. CPU usage is measured between
/// consecutive calls, so the first sample reports 0.
pub struct HostSampler {
    system: System,
    networks: Networks,
    disks: Disks,
}

impl Default for HostSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl HostSampler {
    pub fn new() -> Self {
        Self {
            system: System::new(),
            networks: Networks::new_with_refreshed_list(),
            disks: Disks::new_with_refreshed_list(),
        }
    }

    pub fn sample(&mut self) -> HostSample {
        self.system.refresh_cpu();
        self.system.refresh_memory();
        self.system.refresh_processes();
        self.networks.refresh();
        self.disks.refresh();

        let total_memory = self.system.total_memory();
        let memory_usage = if total_memory > 0 {
            self.system.used_memory() as f64 / total_memory as f64 * 100.0
        } else {
            0.0
        };

        let (total_space, available_space) = self
            .disks
            .iter()
            .fold((0u64, 0u64), |(total, free), disk| {
                (total + disk.total_space(), free + disk.available_space())
            });
        let disk_usage = if total_space > 0 {
            total_space.saturating_sub(available_space) as f64 / total_space as f64 * 100.0
        } else {
            0.0
        };

        let (network_rx_bytes, network_tx_bytes) = self
            .networks
            .iter()
            .fold((0u64, 0u64), |(rx, tx), (_, data)| {
                (rx + data.total_received(), tx + data.total_transmitted())
            });

        HostSample {
            cpu_usage: self.system.global_cpu_info().cpu_usage() as f64,
            memory_usage,
            disk_usage,
            network_rx_bytes,
            network_tx_bytes,
            task_count: self.system.processes().len() as u32,
        }
    }
}

/// Telemetry for the monitoring process: request and error rates are
/// measured here, host utilisation comes from the last pushed sample.
pub struct ProcessTelemetry {
    requests: AtomicU64,
    errors: AtomicU64,
    response_time_us: AtomicU64,
    window: Mutex<(Instant, u64, u64)>,
    host: Mutex<HostSample>,
}

impl Default for ProcessTelemetry {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessTelemetry {
    pub fn new() -> Self {
        Self {
            requests: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            response_time_us: AtomicU64::new(0),
            window: Mutex::new((Instant::now(), 0, 0)),
            host: Mutex::new(HostSample::default()),
        }
    }

    pub fn record_request(&self, elapsed: Duration, failed: bool) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.response_time_us
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
        if failed {
            self.errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn update_host(&self, sample: HostSample) {
        if let Ok(mut host) = self.host.lock() {
            *host = sample;
        }
    }
}

/// Pushes a fresh `HostSample` into `telemetry` every `interval` until
/// `stop` fires.
pub fn spawn_host_sampler(
    telemetry: Arc<ProcessTelemetry>,
    interval: Duration,
    stop: StopSignal,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut sampler = HostSampler::new();
        loop {
            let sample = sampler.sample();
            debug!(cpu = sample.cpu_usage, memory = sample.memory_usage, "Host sampled");
            telemetry.update_host(sample);

            if stop.sleep_or_stop(interval).await {
                break;
            }
        }
    })
}

#[async_trait]
impl HostTelemetry for ProcessTelemetry {
    async fn sample(&self) -> Result<SystemMetrics> {
        let host = self.host.lock().map(|h| *h).unwrap_or_default();

        // Rates are per second over the window since the previous sample.
        // Counters are read under the window lock so concurrent samples see
        // monotonic values.
        let (requests, request_rate, error_rate) = match self.window.lock() {
            Ok(mut window) => {
                let requests = self.requests.load(Ordering::Relaxed);
                let errors = self.errors.load(Ordering::Relaxed);
                let elapsed = window.0.elapsed().as_secs_f64().max(1e-3);
                let rates = (
                    requests.saturating_sub(window.1) as f64 / elapsed,
                    errors.saturating_sub(window.2) as f64 / elapsed,
                );
                *window = (Instant::now(), requests, errors);
                (requests, rates.0, rates.1)
            }
            Err(_) => (self.requests.load(Ordering::Relaxed), 0.0, 0.0),
        };
        let total_us = self.response_time_us.load(Ordering::Relaxed);

        Ok(SystemMetrics {
            cpu_usage: host.cpu_usage,
            cpu_cores: num_cpus::get() as u32,
            memory_usage: host.memory_usage,
            disk_usage: host.disk_usage,
            network_rx_bytes: host.network_rx_bytes,
            network_tx_bytes: host.network_tx_bytes,
            task_count: host.task_count,
            api_request_rate: request_rate,
            error_rate,
            avg_response_time_ms: if requests > 0 {
                total_us as f64 / requests as f64 / 1_000.0
            } else {
                0.0
            },
            timestamp: Some(Utc::now()),
        })
    }
}
