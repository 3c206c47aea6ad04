//! Shared state handed to every request handler.

use crate::session::TelemetryHub;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<TelemetryHub>,
    connections: Arc<AtomicUsize>,
    max_connections: usize,
}

impl AppState {
    pub fn new(hub: Arc<TelemetryHub>, max_connections: usize) -> Self {
        Self {
            hub,
            connections: Arc::new(AtomicUsize::new(0)),
            max_connections,
        }
    }

    /// Number of open WebSocket connections, including ones still upgrading.
    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    /// Reserve a connection slot, or `None` when the cap is reached.
    pub fn try_acquire(&self) -> Option<ConnectionSlot> {
        self.connections
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |open| {
                (open < self.max_connections).then_some(open + 1)
            })
            .ok()
            .map(|_| ConnectionSlot {
                connections: Arc::clone(&self.connections),
            })
    }
}

/// Held for the lifetime of one WebSocket connection.
pub struct ConnectionSlot {
    connections: Arc<AtomicUsize>,
}

impl Drop for ConnectionSlot {
    fn drop(&mut self) {
        self.connections.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::testing::StubProvider;

    #[tokio::test]
    async fn test_connection_cap() {
        let hub = Arc::new(TelemetryHub::new(Arc::new(StubProvider::new())).await);
        let state = AppState::new(hub, 2);

        let a = state.try_acquire().unwrap();
        let _b = state.try_acquire().unwrap();
        assert!(state.try_acquire().is_none());
        assert_eq!(state.connection_count(), 2);

        drop(a);
        assert!(state.try_acquire().is_some());
        assert_eq!(state.connection_count(), 1);
    }
}
