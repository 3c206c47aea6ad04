//! Optional public exposure of the local listener through a tunnel service.
//!
//! A [`TunnelProvider`] negotiates a public URL for a local port and hands
//! back a [`TunnelHandle`]. The handle reports asynchronous [`TunnelEvent`]s;
//! they are only logged, the tunnel is never re-established automatically.

pub mod localtunnel;

pub use localtunnel::LocalTunnel;

use crate::error::Result;
use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

/// Default tunnel service.
pub const DEFAULT_TUNNEL_HOST: &str = "https://localtunnel.me";

const SUBDOMAIN_PREFIX: &str = "monitor-";
const SUBDOMAIN_SUFFIX_LEN: usize = 6;
const SUBDOMAIN_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// What to expose, and under which name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelRequest {
    pub port: u16,
    pub subdomain: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TunnelEvent {
    /// The tunnel is gone; no further events follow
    Closed,
    Error(String),
}

/// A live tunnel.
///
/// Dropping the handle closes the tunnel.
#[derive(Debug)]
pub struct TunnelHandle {
    url: String,
    events: Option<mpsc::UnboundedReceiver<TunnelEvent>>,
    shutdown: watch::Sender<bool>,
}

impl TunnelHandle {
    pub fn new(
        url: impl Into<String>,
        events: mpsc::UnboundedReceiver<TunnelEvent>,
        shutdown: watch::Sender<bool>,
    ) -> Self {
        Self {
            url: url.into(),
            events: Some(events),
            shutdown,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Take the event stream. Returns `None` after the first call.
    pub fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<TunnelEvent>> {
        self.events.take()
    }

    pub fn close(&self) {
        self.shutdown.send_replace(true);
    }

    pub fn is_closed(&self) -> bool {
        *self.shutdown.borrow()
    }
}

impl Drop for TunnelHandle {
    fn drop(&mut self) {
        self.close();
    }
}

#[async_trait]
pub trait TunnelProvider: Send + Sync {
    /// Human-readable service name for logs.
    fn name(&self) -> &str;

    /// Negotiate a public URL for `request.port`.
    async fn open(&self, request: TunnelRequest) -> Result<TunnelHandle>;
}

/// Tunnel settings from the command line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TunnelConfig {
    pub enabled: bool,
    pub host: String,
    /// Requested subdomain; a random `monitor-xxxxxx` name when unset
    pub subdomain: Option<String>,
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: DEFAULT_TUNNEL_HOST.to_string(),
            subdomain: None,
        }
    }
}

impl TunnelConfig {
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_subdomain(mut self, subdomain: Option<String>) -> Self {
        self.subdomain = subdomain;
        self
    }

    pub fn request(&self, port: u16) -> TunnelRequest {
        TunnelRequest {
            port,
            subdomain: self.subdomain.clone().unwrap_or_else(random_subdomain),
        }
    }
}

/// `monitor-` followed by six random lowercase alphanumerics.
pub fn random_subdomain() -> String {
    let mut rng = rand::rng();
    let suffix: String = (0..SUBDOMAIN_SUFFIX_LEN)
        .map(|_| SUBDOMAIN_ALPHABET[rng.random_range(0..SUBDOMAIN_ALPHABET.len())] as char)
        .collect();
    format!("{}{}", SUBDOMAIN_PREFIX, suffix)
}

/// Open a tunnel and log the outcome. Events on the returned handle are
/// logged by a background task.
///
/// Callers should treat an error as non-fatal and keep serving locally.
pub async fn expose_publicly(
    provider: &dyn TunnelProvider,
    request: TunnelRequest,
) -> Result<TunnelHandle> {
    info!(
        "Opening {} tunnel for port {} as '{}'",
        provider.name(),
        request.port,
        request.subdomain
    );

    match provider.open(request).await {
        Ok(mut handle) => {
            info!("Public URL: {}", handle.url());
            if let Some(events) = handle.take_events() {
                tokio::spawn(log_tunnel_events(events));
            }
            Ok(handle)
        }
        Err(e) => {
            error!("Failed to open public tunnel: {}", e);
            Err(e)
        }
    }
}

async fn log_tunnel_events(mut events: mpsc::UnboundedReceiver<TunnelEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            TunnelEvent::Error(message) => error!("Tunnel error: {}", message),
            TunnelEvent::Closed => {
                warn!("Public tunnel closed");
                break;
            }
        }
    }
}
