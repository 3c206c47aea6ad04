//! Deterministic provider for unit tests.

use crate::error::Result;
use crate::metrics::traits::{
    FsStats, HostDescription, MemoryStats, MetricsProvider, NetStats, ProcStats, TemperatureStats,
};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Reports the call number as CPU load, so tick order is visible in
/// snapshots. Can be told to panic on one call to simulate a defect.
pub(crate) struct StubProvider {
    cpu_calls: AtomicUsize,
    panic_on_call: Option<usize>,
}

impl StubProvider {
    pub(crate) fn new() -> Self {
        Self {
            cpu_calls: AtomicUsize::new(0),
            panic_on_call: None,
        }
    }

    pub(crate) fn panicking_on(call: usize) -> Self {
        Self {
            cpu_calls: AtomicUsize::new(0),
            panic_on_call: Some(call),
        }
    }

    /// Number of compositions started so far.
    pub(crate) fn calls(&self) -> usize {
        self.cpu_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MetricsProvider for StubProvider {
    async fn cpu_load(&self) -> Result<f64> {
        let call = self.cpu_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.panic_on_call == Some(call) {
            panic!("simulated provider defect on call {call}");
        }
        Ok(call as f64)
    }

    async fn memory(&self) -> Result<MemoryStats> {
        Ok(MemoryStats {
            total: 1000,
            active: 250,
        })
    }

    async fn temperature(&self) -> Result<TemperatureStats> {
        Ok(TemperatureStats { main: Some(40.0) })
    }

    async fn file_systems(&self) -> Result<Vec<FsStats>> {
        Ok(vec![FsStats {
            mount: "/".to_string(),
            size: 1 << 30,
            used: 1 << 29,
        }])
    }

    async fn network_stats(&self) -> Result<Vec<NetStats>> {
        Ok(vec![NetStats {
            iface: "eth0".to_string(),
            rx_sec: 1024.0,
            tx_sec: 1024.0,
        }])
    }

    async fn processes(&self) -> Result<Vec<ProcStats>> {
        Ok(Vec::new())
    }

    async fn host_description(&self) -> Result<HostDescription> {
        Ok(HostDescription {
            hostname: "stub-host".to_string(),
            platform: "linux".to_string(),
            arch: "x86_64".to_string(),
            cpu_model: "Stub CPU".to_string(),
            cpu_cores: 2,
            total_memory: 2 << 30,
        })
    }

    fn uptime(&self) -> u64 {
        1
    }
}
