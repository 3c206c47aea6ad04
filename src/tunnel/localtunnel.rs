//! Client for the localtunnel service.
//!
//! The service hands out a lease (`GET {host}/{subdomain}`) naming a TCP port
//! on the tunnel server and how many connections it accepts. Each of those
//! connections carries proxied requests and is piped to the local listener.

use crate::error::{Result, SystemError};
use crate::tunnel::{TunnelEvent, TunnelHandle, TunnelProvider, TunnelRequest};
use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;
use std::time::Duration;
use tokio::io;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tracing::{debug, info};

const LOCAL_RETRY_DELAY: Duration = Duration::from_secs(1);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, Deserialize)]
struct Lease {
    id: String,
    #[serde(default)]
    ip: Option<String>,
    port: u16,
    #[serde(default)]
    max_conn_count: Option<usize>,
    url: String,
}

#[derive(Debug, Deserialize)]
struct LeaseRefusal {
    message: String,
}

pub struct LocalTunnel {
    client: reqwest::Client,
    host: Url,
    local_host: String,
}

impl LocalTunnel {
    pub fn new(host: &str) -> Result<Self> {
        let host = Url::parse(host).map_err(|e| {
            SystemError::config_error(format!("Invalid tunnel host {}: {}", host, e))
        })?;
        if host.host_str().is_none() {
            return Err(SystemError::config_error(format!(
                "Tunnel host {} has no hostname",
                host
            )));
        }
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;

        Ok(Self {
            client,
            host,
            local_host: "127.0.0.1".to_string(),
        })
    }

    /// Address proxied connections are forwarded to.
    pub fn with_local_host(mut self, local_host: impl Into<String>) -> Self {
        self.local_host = local_host.into();
        self
    }

    async fn request_lease(&self, subdomain: &str) -> Result<Lease> {
        let url = self.host.join(subdomain).map_err(|e| {
            SystemError::tunnel_error(format!("Invalid subdomain {}: {}", subdomain, e))
        })?;
        debug!("Requesting tunnel lease from {}", url);

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let reason = response
                .json::<LeaseRefusal>()
                .await
                .map(|r| r.message)
                .unwrap_or_else(|_| status.to_string());
            return Err(SystemError::tunnel_error(format!(
                "Tunnel server refused lease: {}",
                reason
            )));
        }

        Ok(response.json::<Lease>().await?)
    }

    fn remote_host(&self, lease: &Lease) -> String {
        lease
            .ip
            .clone()
            .or_else(|| self.host.host_str().map(str::to_string))
            .unwrap_or_default()
    }
}

#[async_trait]
impl TunnelProvider for LocalTunnel {
    fn name(&self) -> &str {
        "localtunnel"
    }

    async fn open(&self, request: TunnelRequest) -> Result<TunnelHandle> {
        let lease = self.request_lease(&request.subdomain).await?;
        let remote = format!("{}:{}", self.remote_host(&lease), lease.port);
        let local = format!("{}:{}", self.local_host, request.port);
        let workers = lease.max_conn_count.unwrap_or(1).max(1);

        info!(
            "Tunnel lease '{}' granted, {} connections to {}",
            lease.id, workers, remote
        );

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut pool = JoinSet::new();
        for worker in 0..workers {
            pool.spawn(run_worker(
                worker,
                remote.clone(),
                local.clone(),
                events_tx.clone(),
                shutdown_rx.clone(),
            ));
        }

        tokio::spawn(async move {
            while pool.join_next().await.is_some() {}
            debug!("All tunnel connections retired");
            let _ = events_tx.send(TunnelEvent::Closed);
        });

        Ok(TunnelHandle::new(lease.url, events_rx, shutdown_tx))
    }
}

/// Keep one connection to the tunnel server open, replacing it whenever it
/// finishes. Retires on the first failed remote connect or on shutdown.
async fn run_worker(
    worker: usize,
    remote: String,
    local: String,
    events: mpsc::UnboundedSender<TunnelEvent>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let connected = tokio::select! {
            _ = closed(&mut shutdown) => return,
            connected = TcpStream::connect(&remote) => connected,
        };

        let remote_stream = match connected {
            Ok(stream) => stream,
            Err(e) => {
                let _ = events.send(TunnelEvent::Error(format!(
                    "connection {} to {} failed: {}",
                    worker, remote, e
                )));
                return;
            }
        };

        tokio::select! {
            _ = closed(&mut shutdown) => return,
            result = pipe(remote_stream, &local) => match result {
                Ok((up, down)) => debug!(
                    "Tunnel connection {} finished ({} bytes up, {} down)",
                    worker, up, down
                ),
                Err(e) => debug!("Tunnel connection {} dropped: {}", worker, e),
            },
        }
    }
}

async fn closed(signal: &mut watch::Receiver<bool>) {
    let _ = signal.wait_for(|stop| *stop).await;
}

async fn pipe(mut remote: TcpStream, local: &str) -> Result<(u64, u64)> {
    let mut local_stream = loop {
        match TcpStream::connect(local).await {
            Ok(stream) => break stream,
            Err(e) => {
                debug!("Local connect to {} failed, retrying: {}", local, e);
                tokio::time::sleep(LOCAL_RETRY_DELAY).await;
            }
        }
    };

    Ok(io::copy_bidirectional(&mut remote, &mut local_stream).await?)
}
