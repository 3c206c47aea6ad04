//! Assembles one [`Snapshot`] per tick.

use crate::metrics::data::{Snapshot, StaticHostInfo};
use crate::metrics::source::MetricSource;
use crate::metrics::traits::MetricsProvider;
use crate::TOP_PROCESS_COUNT;
use chrono::Utc;
use std::sync::Arc;

/// Gathers every metric class into an immutable snapshot.
#[derive(Clone)]
pub struct SnapshotComposer {
    source: MetricSource,
}

impl SnapshotComposer {
    pub fn new(provider: Arc<dyn MetricsProvider>) -> Self {
        Self {
            source: MetricSource::new(provider),
        }
    }

    pub fn source(&self) -> &MetricSource {
        &self.source
    }

    /// Compose a snapshot from every metric source.
    ///
    /// The queries are independent reads and run concurrently. Each one
    /// falls back to its default on failure, so this always completes.
    pub async fn compose(&self) -> Snapshot {
        let (cpu, ram, temp, disk, network, processes) = tokio::join!(
            self.source.cpu_load(),
            self.source.memory(),
            self.source.temperature(),
            self.source.disk_usage(),
            self.source.network_throughput(),
            self.source.top_processes(TOP_PROCESS_COUNT),
        );

        Snapshot {
            timestamp: Utc::now(),
            cpu,
            ram,
            temp,
            disk,
            network,
            processes,
            uptime: self.source.uptime(),
        }
    }

    /// Host identity for the `system-info` greeting.
    pub async fn static_info(&self) -> StaticHostInfo {
        self.source.static_info().await
    }
}
