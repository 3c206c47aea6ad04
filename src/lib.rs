//! # Server Monitor - live host telemetry over WebSocket
//!
//! Samples CPU, memory, disk, network, temperature and the busiest processes
//! once per second and streams them to every connected browser viewer. The
//! local server can optionally be exposed through a public tunnel.
//!
//! ## Features
//!
//! - **Shared sampling**: one sampler per process, running only while someone watches
//! - **Fault-tolerant metrics**: a failing metric source degrades to a default value
//! - **WebSocket streaming**: `system-info` once, then `performance-data` per tick
//! - **Public URL**: optional localtunnel exposure that never blocks local serving
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use server_monitor::{start_web_server, SysinfoProvider, TelemetryHub, WebConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let hub = TelemetryHub::new(Arc::new(SysinfoProvider::new())).await;
//!     start_web_server(WebConfig::default(), Arc::new(hub)).await?;
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod metrics;
pub mod session;
pub mod tunnel;
pub mod web;

// Re-export public API
pub use error::{Result, SystemError};
pub use metrics::{
    DiskReading, Fixed2, MetricSource, MetricsProvider, NetworkReading, ProcessSample, Snapshot,
    SnapshotComposer, StaticHostInfo, SysinfoProvider,
};
pub use session::{ServerMessage, Session, SessionState, Subscriber, Subscription, TelemetryHub};
pub use tunnel::{
    expose_publicly, LocalTunnel, TunnelConfig, TunnelEvent, TunnelHandle, TunnelProvider,
    TunnelRequest,
};
pub use web::{start_web_server, WebConfig};

/// The default web server port
pub const DEFAULT_WEB_PORT: u16 = 3000;

/// Interval between telemetry snapshots in milliseconds
pub const SAMPLE_INTERVAL_MS: u64 = 1000;

/// Number of processes reported per snapshot
pub const TOP_PROCESS_COUNT: usize = 5;
