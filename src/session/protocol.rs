//! Messages pushed to a subscriber.
//!
//! Each frame is a JSON object `{"event": <name>, "data": <payload>}`.

use crate::error::Result;
use crate::metrics::data::{Snapshot, StaticHostInfo};
use serde::{Deserialize, Serialize};

/// Event name of the one-time greeting.
pub const SYSTEM_INFO_EVENT: &str = "system-info";
/// Event name of the per-tick reading.
pub const PERFORMANCE_DATA_EVENT: &str = "performance-data";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerMessage {
    /// Sent once, immediately after the subscriber connects
    SystemInfo(StaticHostInfo),
    /// Sent once per sampling tick
    PerformanceData(Snapshot),
}

impl ServerMessage {
    pub fn event(&self) -> &'static str {
        match self {
            Self::SystemInfo(_) => SYSTEM_INFO_EVENT,
            Self::PerformanceData(_) => PERFORMANCE_DATA_EVENT,
        }
    }

    /// Encode as a JSON text frame.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}
