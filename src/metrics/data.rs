//! Data structures sent to viewers.
//!
//! Every record here has a fixed shape: a reading whose source failed is
//! defaulted, never omitted.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Bytes per GiB.
pub const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Round to two decimal places, mapping non-finite input to zero.
pub fn round2(value: f64) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }
    let rounded = (value * 100.0).round() / 100.0;
    // avoid "-0.00"
    if rounded == 0.0 {
        0.0
    } else {
        rounded
    }
}

/// A value fixed to two decimal places.
///
/// Rounded once at construction and serialized as a string such as `"40.00"`.
/// Deserialization accepts either a string or a bare number.
#[derive(Debug, Clone, Copy, Default, PartialEq, PartialOrd)]
pub struct Fixed2(f64);

impl Fixed2 {
    /// Zero, the default for any failed reading.
    pub const ZERO: Fixed2 = Fixed2(0.0);

    pub fn new(value: f64) -> Self {
        Self(round2(value))
    }
}

impl From<f64> for Fixed2 {
    fn from(value: f64) -> Self {
        Self::new(value)
    }
}

impl fmt::Display for Fixed2 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl Serialize for Fixed2 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Fixed2 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Text(String),
            Number(f64),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Number(n) => Ok(Fixed2::new(n)),
            Repr::Text(s) => s
                .trim()
                .parse::<f64>()
                .map(Fixed2::new)
                .map_err(serde::de::Error::custom),
        }
    }
}

/// Host facts that cannot change while the process runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaticHostInfo {
    pub hostname: String,
    /// Operating system family, e.g. `linux`, `macos`
    pub platform: String,
    /// CPU architecture, e.g. `x86_64`, `aarch64`
    pub arch: String,
    /// Brand string of the first logical CPU
    pub cpu_model: String,
    /// Logical core count
    pub cpu_cores: usize,
    /// Total memory in GiB
    pub total_memory: Fixed2,
}

/// Usage of the first reported filesystem, in GiB.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiskReading {
    pub total: Fixed2,
    pub used: Fixed2,
    pub available: Fixed2,
    pub use_percent: Fixed2,
}

impl DiskReading {
    /// Build a reading from raw byte counts.
    ///
    /// A zero-sized filesystem reports zero percent.
    pub fn from_bytes(size: u64, used: u64) -> Self {
        let size_f = size as f64;
        let used_f = used as f64;
        let use_percent = if size == 0 {
            0.0
        } else {
            used_f / size_f * 100.0
        };

        Self {
            total: Fixed2::new(size_f / GIB),
            used: Fixed2::new(used_f / GIB),
            available: Fixed2::new(size.saturating_sub(used) as f64 / GIB),
            use_percent: Fixed2::new(use_percent),
        }
    }
}

/// Throughput of the first reported interface, in KB/s.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkReading {
    pub rx: Fixed2,
    pub tx: Fixed2,
}

impl NetworkReading {
    pub fn from_bytes_per_sec(rx_sec: f64, tx_sec: f64) -> Self {
        Self {
            rx: Fixed2::new(rx_sec / 1024.0),
            tx: Fixed2::new(tx_sec / 1024.0),
        }
    }
}

/// One entry of the top-processes table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessSample {
    pub pid: u32,
    pub name: String,
    /// CPU usage percent
    pub cpu: Fixed2,
    /// Memory usage percent
    pub mem: Fixed2,
}

/// A complete reading of the host at one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// When the snapshot was composed
    #[serde(serialize_with = "serialize_instant")]
    pub timestamp: DateTime<Utc>,
    /// CPU load percent
    pub cpu: f64,
    /// Memory in use percent (`active / total * 100`)
    pub ram: f64,
    /// Main CPU sensor in degrees Celsius, `0` when unavailable
    pub temp: f64,
    pub disk: DiskReading,
    pub network: NetworkReading,
    /// Up to five heaviest CPU consumers, descending
    pub processes: Vec<ProcessSample>,
    /// Host uptime in seconds
    pub uptime: u64,
}

fn serialize_instant<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Millis, true))
}
