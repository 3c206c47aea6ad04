//! Shared sampling task and snapshot fan-out.
//!
//! One sampler composes a snapshot per tick and broadcasts it to every
//! attached subscription. The sampler only runs while at least one
//! [`Subscription`] is alive: the first subscription starts it and dropping
//! the last one aborts it.

use crate::metrics::composer::SnapshotComposer;
use crate::metrics::data::{Snapshot, StaticHostInfo};
use crate::metrics::traits::MetricsProvider;
use crate::SAMPLE_INTERVAL_MS;
use futures_util::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tracing::{debug, error, info};

/// Snapshots buffered per subscriber before a slow one starts skipping.
const SNAPSHOT_BUFFER: usize = 16;

#[derive(Default)]
struct SamplerSlot {
    subscribers: usize,
    task: Option<JoinHandle<()>>,
}

struct SamplerControl {
    slot: Mutex<SamplerSlot>,
    composer: SnapshotComposer,
    snapshots: broadcast::Sender<Arc<Snapshot>>,
    cadence: Duration,
    ticks: AtomicU64,
}

impl SamplerControl {
    fn lock_slot(&self) -> MutexGuard<'_, SamplerSlot> {
        // the slot holds plain counters, so a poisoned lock is still usable
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Point-in-time view of the hub, for health reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct HubStats {
    pub subscribers: usize,
    pub sampling: bool,
    pub ticks: u64,
}

/// Owns the sampler and hands out subscriptions to it.
pub struct TelemetryHub {
    control: Arc<SamplerControl>,
    host_info: Arc<StaticHostInfo>,
    shutdown: watch::Sender<bool>,
}

impl TelemetryHub {
    /// Create a hub sampling at the default one-second cadence.
    pub async fn new(provider: Arc<dyn MetricsProvider>) -> Self {
        Self::with_cadence(provider, Duration::from_millis(SAMPLE_INTERVAL_MS)).await
    }

    /// Create a hub with a custom cadence.
    ///
    /// Host identity is read here, once, and reused for every subscriber.
    pub async fn with_cadence(provider: Arc<dyn MetricsProvider>, cadence: Duration) -> Self {
        let composer = SnapshotComposer::new(provider);
        let host_info = Arc::new(composer.static_info().await);
        let (snapshots, _) = broadcast::channel(SNAPSHOT_BUFFER);
        let (shutdown, _) = watch::channel(false);

        info!(
            "Telemetry hub ready for {} ({} cores, {} GiB)",
            host_info.hostname, host_info.cpu_cores, host_info.total_memory
        );

        Self {
            control: Arc::new(SamplerControl {
                slot: Mutex::new(SamplerSlot::default()),
                composer,
                snapshots,
                cadence,
                ticks: AtomicU64::new(0),
            }),
            host_info,
            shutdown,
        }
    }

    pub fn host_info(&self) -> Arc<StaticHostInfo> {
        Arc::clone(&self.host_info)
    }

    pub fn composer(&self) -> &SnapshotComposer {
        &self.control.composer
    }

    pub fn cadence(&self) -> Duration {
        self.control.cadence
    }

    /// Attach to the snapshot stream, starting the sampler if it is idle.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn subscribe(&self) -> Subscription {
        let receiver = self.control.snapshots.subscribe();

        let mut slot = self.control.lock_slot();
        slot.subscribers += 1;
        if slot.task.is_none() {
            debug!("First subscriber attached, starting sampler");
            slot.task = Some(tokio::spawn(run_sampler(Arc::clone(&self.control))));
        }
        drop(slot);

        Subscription {
            stream: BroadcastStream::new(receiver),
            control: Arc::clone(&self.control),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.control.lock_slot().subscribers
    }

    /// Whether the sampler task is currently alive.
    pub fn is_sampling(&self) -> bool {
        self.control.lock_slot().task.is_some()
    }

    pub fn stats(&self) -> HubStats {
        let slot = self.control.lock_slot();
        HubStats {
            subscribers: slot.subscribers,
            sampling: slot.task.is_some(),
            ticks: self.control.ticks.load(Ordering::Relaxed),
        }
    }

    /// Ask every session to close.
    pub fn shutdown(&self) {
        info!("Closing all telemetry sessions");
        self.shutdown.send_replace(true);
    }

    /// Receiver that flips to `true` when [`shutdown`](Self::shutdown) is called.
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }
}

async fn run_sampler(control: Arc<SamplerControl>) {
    let mut ticker = time::interval(control.cadence);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        let composed = AssertUnwindSafe(control.composer.compose())
            .catch_unwind()
            .await;

        match composed {
            Ok(snapshot) => {
                let tick = control.ticks.fetch_add(1, Ordering::Relaxed) + 1;
                match control.snapshots.send(Arc::new(snapshot)) {
                    Ok(receivers) => debug!("Tick {} delivered to {} subscribers", tick, receivers),
                    Err(_) => debug!("Tick {} had no subscribers", tick),
                }
            }
            Err(_) => error!("Snapshot composition failed, skipping tick"),
        }
    }
}

/// A live attachment to the hub's snapshot stream.
///
/// Dropping it detaches; dropping the last one stops the sampler.
pub struct Subscription {
    stream: BroadcastStream<Arc<Snapshot>>,
    control: Arc<SamplerControl>,
}

impl Subscription {
    /// Next snapshot, in tick order.
    ///
    /// A subscriber that falls more than the buffer behind skips ahead to the
    /// oldest retained snapshot.
    pub async fn recv(&mut self) -> Option<Arc<Snapshot>> {
        loop {
            match self.stream.next().await? {
                Ok(snapshot) => return Some(snapshot),
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    debug!("Subscriber lagged, skipped {} snapshots", skipped);
                }
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let mut slot = self.control.lock_slot();
        slot.subscribers = slot.subscribers.saturating_sub(1);
        if slot.subscribers == 0 {
            if let Some(task) = slot.task.take() {
                task.abort();
                debug!("Last subscriber detached, sampler stopped");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::testing::StubProvider;

    const CADENCE: Duration = Duration::from_millis(SAMPLE_INTERVAL_MS);

    async fn hub(provider: Arc<StubProvider>) -> TelemetryHub {
        TelemetryHub::with_cadence(provider, CADENCE).await
    }

    #[tokio::test(start_paused = true)]
    async fn test_sampler_idle_without_subscribers() {
        let provider = Arc::new(StubProvider::new());
        let hub = hub(provider.clone()).await;

        time::sleep(CADENCE * 5).await;
        assert!(!hub.is_sampling());
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sampler_follows_subscriber_presence() {
        let provider = Arc::new(StubProvider::new());
        let hub = hub(provider.clone()).await;

        let mut first = hub.subscribe();
        let second = hub.subscribe();
        assert!(hub.is_sampling());
        assert_eq!(hub.subscriber_count(), 2);

        first.recv().await.unwrap();
        drop(second);
        assert!(hub.is_sampling());

        drop(first);
        assert!(!hub.is_sampling());
        assert_eq!(hub.subscriber_count(), 0);

        let calls = provider.calls();
        time::sleep(CADENCE * 5).await;
        assert_eq!(provider.calls(), calls);
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshots_arrive_in_tick_order() {
        let provider = Arc::new(StubProvider::new());
        let hub = hub(provider).await;

        let mut sub = hub.subscribe();
        let mut seen = Vec::new();
        for _ in 0..4 {
            seen.push(sub.recv().await.unwrap().cpu);
        }
        assert_eq!(seen, vec![1.0, 2.0, 3.0, 4.0]);
        assert!(hub.stats().ticks >= 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lagging_subscriber_skips_ahead() {
        let hub = hub(Arc::new(StubProvider::new())).await;
        let mut slow = hub.subscribe();

        time::sleep(CADENCE * (SNAPSHOT_BUFFER as u32 * 2)).await;
        assert!(hub.stats().ticks > SNAPSHOT_BUFFER as u64);

        let resumed = slow.recv().await.unwrap();
        assert!(resumed.cpu > 1.0);

        let mut last = resumed.cpu;
        for _ in 0..3 {
            let next = slow.recv().await.unwrap();
            assert!(next.cpu > last);
            last = next.cpu;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_composition_defect_skips_tick() {
        let provider = Arc::new(StubProvider::panicking_on(2));
        let hub = hub(provider).await;

        let mut sub = hub.subscribe();
        let first = sub.recv().await.unwrap();
        let next = sub.recv().await.unwrap();

        assert_eq!(first.cpu, 1.0);
        assert_eq!(next.cpu, 3.0);
        assert!(hub.is_sampling());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_signal() {
        let hub = hub(Arc::new(StubProvider::new())).await;
        let mut signal = hub.shutdown_signal();
        assert!(!*signal.borrow());

        hub.shutdown();
        signal.changed().await.unwrap();
        assert!(*signal.borrow());
    }
}
