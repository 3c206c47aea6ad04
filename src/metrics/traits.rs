//! Traits for the raw host metric provider.

use crate::error::Result;
use async_trait::async_trait;

/// Memory totals in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryStats {
    pub total: u64,
    /// Memory actively in use (total minus what the kernel can reclaim)
    pub active: u64,
}

/// Temperature sensors as reported by the platform.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TemperatureStats {
    /// Main CPU package sensor in Celsius, if one is exposed
    pub main: Option<f64>,
}

/// One mounted filesystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsStats {
    pub mount: String,
    /// Size in bytes
    pub size: u64,
    /// Used bytes
    pub used: u64,
}

/// Throughput of one network interface.
#[derive(Debug, Clone, PartialEq)]
pub struct NetStats {
    pub iface: String,
    /// Received bytes per second
    pub rx_sec: f64,
    /// Transmitted bytes per second
    pub tx_sec: f64,
}

/// One running process.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcStats {
    pub pid: u32,
    pub name: String,
    /// CPU usage percent of the whole machine
    pub cpu: f64,
    /// Memory usage percent of total memory
    pub mem: f64,
}

/// Identity of the host, read once.
#[derive(Debug, Clone, PartialEq)]
pub struct HostDescription {
    pub hostname: String,
    pub platform: String,
    pub arch: String,
    pub cpu_model: String,
    pub cpu_cores: usize,
    /// Total memory in bytes
    pub total_memory: u64,
}

/// Point-in-time access to host metrics.
///
/// Each query is independent and may fail on its own; callers must not
/// assume that one failing query says anything about the others. Lists are
/// returned in the order the platform reports them.
#[async_trait]
pub trait MetricsProvider: Send + Sync {
    /// Overall CPU load percent.
    async fn cpu_load(&self) -> Result<f64>;

    async fn memory(&self) -> Result<MemoryStats>;

    async fn temperature(&self) -> Result<TemperatureStats>;

    /// All mounted filesystems.
    async fn file_systems(&self) -> Result<Vec<FsStats>>;

    /// All network interfaces with their current throughput.
    async fn network_stats(&self) -> Result<Vec<NetStats>>;

    /// Every running process, unsorted.
    async fn processes(&self) -> Result<Vec<ProcStats>>;

    /// Static host identity.
    async fn host_description(&self) -> Result<HostDescription>;

    /// Seconds since boot. Always read fresh.
    fn uptime(&self) -> u64;
}
