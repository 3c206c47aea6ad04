//! Normalizes raw provider readings into the fixed shapes viewers receive.
//!
//! Every query here is total: a provider failure is logged and replaced with
//! the reading's default, so one unsupported sensor never takes the rest of a
//! snapshot down with it.

use crate::error::Result;
use crate::metrics::data::{
    round2, DiskReading, Fixed2, NetworkReading, ProcessSample, StaticHostInfo, GIB,
};
use crate::metrics::traits::MetricsProvider;
use std::sync::Arc;
use tracing::debug;

/// Longest process name sent to viewers, in characters.
pub const PROCESS_NAME_MAX_CHARS: usize = 25;

/// Failure-isolating view over a [`MetricsProvider`].
#[derive(Clone)]
pub struct MetricSource {
    provider: Arc<dyn MetricsProvider>,
}

fn or_default<T: Default>(metric: &str, reading: Result<T>) -> T {
    reading.unwrap_or_else(|e| {
        debug!("{} unavailable, using default: {}", metric, e);
        T::default()
    })
}

impl MetricSource {
    pub fn new(provider: Arc<dyn MetricsProvider>) -> Self {
        Self { provider }
    }

    /// Overall CPU load percent, `0` on failure.
    pub async fn cpu_load(&self) -> f64 {
        round2(or_default("cpu load", self.provider.cpu_load().await))
    }

    /// Percent of memory actively in use, `0` on failure.
    pub async fn memory(&self) -> f64 {
        let percent = self
            .provider
            .memory()
            .await
            .map(|mem| mem.active as f64 / mem.total as f64 * 100.0);
        round2(or_default("memory", percent))
    }

    /// Main CPU sensor in Celsius, `0` when absent or on failure.
    pub async fn temperature(&self) -> f64 {
        let temp = self.provider.temperature().await.map(|t| t.main.unwrap_or(0.0));
        round2(or_default("temperature", temp))
    }

    /// Usage of the first reported filesystem.
    pub async fn disk_usage(&self) -> DiskReading {
        let reading = self.provider.file_systems().await.map(|list| {
            list.first()
                .map(|fs| DiskReading::from_bytes(fs.size, fs.used))
                .unwrap_or_else(|| {
                    debug!("no filesystems reported");
                    DiskReading::default()
                })
        });
        or_default("disk usage", reading)
    }

    /// Throughput of the first reported interface.
    pub async fn network_throughput(&self) -> NetworkReading {
        let reading = self.provider.network_stats().await.map(|list| {
            list.first()
                .map(|net| NetworkReading::from_bytes_per_sec(net.rx_sec, net.tx_sec))
                .unwrap_or_default()
        });
        or_default("network throughput", reading)
    }

    /// The `n` heaviest CPU consumers, heaviest first.
    ///
    /// Empty on failure, never partial.
    pub async fn top_processes(&self, n: usize) -> Vec<ProcessSample> {
        let reading = self.provider.processes().await.map(|mut list| {
            list.sort_by(|a, b| b.cpu.total_cmp(&a.cpu));
            list.into_iter()
                .take(n)
                .map(|p| ProcessSample {
                    pid: p.pid,
                    name: p.name.chars().take(PROCESS_NAME_MAX_CHARS).collect(),
                    cpu: Fixed2::new(p.cpu),
                    mem: Fixed2::new(p.mem),
                })
                .collect()
        });
        or_default("process list", reading)
    }

    /// Seconds since boot.
    pub fn uptime(&self) -> u64 {
        self.provider.uptime()
    }

    /// Host identity; fields the provider cannot supply read `unknown`.
    pub async fn static_info(&self) -> StaticHostInfo {
        match self.provider.host_description().await {
            Ok(host) => StaticHostInfo {
                hostname: host.hostname,
                platform: host.platform,
                arch: host.arch,
                cpu_model: host.cpu_model,
                cpu_cores: host.cpu_cores,
                total_memory: Fixed2::new(host.total_memory as f64 / GIB),
            },
            Err(e) => {
                debug!("host description unavailable: {}", e);
                StaticHostInfo {
                    hostname: "unknown".to_string(),
                    platform: std::env::consts::OS.to_string(),
                    arch: std::env::consts::ARCH.to_string(),
                    cpu_model: "unknown".to_string(),
                    cpu_cores: 0,
                    total_memory: Fixed2::ZERO,
                }
            }
        }
    }
}
