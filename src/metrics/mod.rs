//! Host metrics: raw provider access, per-metric normalization, and snapshot
//! composition.
//!
//! The [`MetricsProvider`] trait is the seam to the operating system; the
//! [`MetricSource`] adapter turns its fallible readings into fixed-shape
//! values, and the [`SnapshotComposer`] gathers them once per tick.

pub mod collector;
pub mod composer;
pub mod data;
pub mod source;
pub mod traits;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used items
pub use collector::SysinfoProvider;
pub use composer::SnapshotComposer;
pub use data::{DiskReading, Fixed2, NetworkReading, ProcessSample, Snapshot, StaticHostInfo};
pub use source::MetricSource;
pub use traits::MetricsProvider;
