//! Lifecycle of one subscriber connection.

use crate::error::{Result, SystemError};
use crate::session::hub::{Subscription, TelemetryHub};
use crate::session::protocol::ServerMessage;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Somewhere session messages can be pushed.
#[async_trait]
pub trait Subscriber: Send {
    /// Push one message to the peer.
    ///
    /// Returns [`SystemError::Delivery`] once the peer is gone; any other
    /// error is treated as a problem with this one message.
    async fn deliver(&mut self, message: &ServerMessage) -> Result<()>;
}

/// In-process subscriber fed through a channel.
#[async_trait]
impl Subscriber for mpsc::UnboundedSender<ServerMessage> {
    async fn deliver(&mut self, message: &ServerMessage) -> Result<()> {
        self.send(message.clone())
            .map_err(|_| SystemError::delivery_error("subscriber channel closed"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Active,
    Closed,
}

/// What a finished session did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    pub id: Uuid,
    pub greeted: bool,
    pub snapshots_delivered: usize,
}

/// One subscriber's view of the telemetry stream.
///
/// Holds at most one [`Subscription`]; it is taken when the session becomes
/// active and released when the session closes.
pub struct Session {
    id: Uuid,
    state: SessionState,
    hub: Arc<TelemetryHub>,
    subscription: Option<Subscription>,
    greeted: bool,
    delivered: usize,
}

impl Session {
    pub fn new(hub: Arc<TelemetryHub>) -> Self {
        let id = Uuid::new_v4();
        info!("Subscriber connected: {}", id);
        Self {
            id,
            state: SessionState::Connecting,
            hub,
            subscription: None,
            greeted: false,
            delivered: 0,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Greet the subscriber with host identity and attach to the stream.
    ///
    /// Only valid from `Connecting`; a failed greeting closes the session.
    pub async fn activate<S>(&mut self, subscriber: &mut S) -> Result<()>
    where
        S: Subscriber + ?Sized,
    {
        if self.state != SessionState::Connecting {
            return Err(SystemError::delivery_error(format!(
                "session {} cannot activate from {:?}",
                self.id, self.state
            )));
        }

        let greeting = ServerMessage::SystemInfo((*self.hub.host_info()).clone());
        if let Err(e) = subscriber.deliver(&greeting).await {
            self.close();
            return Err(e);
        }
        self.greeted = true;

        self.subscription = Some(self.hub.subscribe());
        self.state = SessionState::Active;
        Ok(())
    }

    /// Release the subscription. Returns `false` if already closed.
    pub fn close(&mut self) -> bool {
        if self.state == SessionState::Closed {
            return false;
        }
        self.state = SessionState::Closed;
        self.subscription.take();
        info!(
            "Subscriber disconnected: {} ({} snapshots delivered)",
            self.id, self.delivered
        );
        true
    }

    /// Drive the session until the peer disconnects, delivery fails, or the
    /// hub shuts down.
    pub async fn run<S, F>(mut self, subscriber: &mut S, disconnected: F) -> SessionReport
    where
        S: Subscriber + ?Sized,
        F: Future<Output = ()> + Send,
    {
        if let Err(e) = self.activate(subscriber).await {
            debug!("Session {} ended before activation: {}", self.id, e);
            return self.finish();
        }

        tokio::pin!(disconnected);
        let mut shutdown = self.hub.shutdown_signal();

        while let Some(subscription) = self.subscription.as_mut() {
            tokio::select! {
                biased;
                _ = &mut disconnected => {
                    debug!("Session {} peer went away", self.id);
                    break;
                }
                _ = shutdown_requested(&mut shutdown) => {
                    debug!("Session {} closed by shutdown", self.id);
                    break;
                }
                next = subscription.recv() => {
                    let Some(snapshot) = next else { break };
                    let message = ServerMessage::PerformanceData((*snapshot).clone());
                    match subscriber.deliver(&message).await {
                        Ok(()) => self.delivered += 1,
                        Err(e) if e.is_disconnect() => {
                            debug!("Session {} delivery failed: {}", self.id, e);
                            break;
                        }
                        Err(e) => warn!("Session {} skipped a tick: {}", self.id, e),
                    }
                }
            }
        }

        self.finish()
    }

    fn finish(mut self) -> SessionReport {
        self.close();
        SessionReport {
            id: self.id,
            greeted: self.greeted,
            snapshots_delivered: self.delivered,
        }
    }
}

async fn shutdown_requested(signal: &mut watch::Receiver<bool>) {
    let _ = signal.wait_for(|stop| *stop).await;
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}
