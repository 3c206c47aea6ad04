use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use server_monitor::tunnel::{expose_publicly, TunnelRequest};
use server_monitor::{
    web, LocalTunnel, ServerMessage, SnapshotComposer, SysinfoProvider, SystemError, TelemetryHub,
    TunnelHandle, TunnelProvider, WebConfig,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;

const WAIT: Duration = Duration::from_secs(10);

struct BrokenTunnel;

#[async_trait]
impl TunnelProvider for BrokenTunnel {
    fn name(&self) -> &str {
        "broken"
    }

    async fn open(&self, _request: TunnelRequest) -> server_monitor::Result<TunnelHandle> {
        Err(SystemError::tunnel_error("negotiation failed"))
    }
}

async fn start_server(
    config: WebConfig,
) -> (SocketAddr, Arc<TelemetryHub>, JoinHandle<server_monitor::Result<()>>) {
    let hub = Arc::new(
        TelemetryHub::with_cadence(
            Arc::new(SysinfoProvider::new()),
            Duration::from_millis(200),
        )
        .await,
    );
    let config = config.with_host("127.0.0.1").with_port(0).with_static_path(None);
    let listener = web::bind(&config).await.expect("Should bind listener");
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(web::serve(listener, config, hub.clone()));
    (addr, hub, server)
}

async fn next_frame<S>(ws: &mut S) -> ServerMessage
where
    S: futures_util::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        let frame = timeout(WAIT, ws.next())
            .await
            .expect("Should receive a frame in time")
            .expect("Stream should stay open")
            .expect("Frame should be valid");
        if let Message::Text(text) = frame {
            return ServerMessage::from_json(&text).expect("Should parse frame");
        }
    }
}

#[tokio::test]
async fn test_subscriber_receives_info_then_snapshots() {
    let (addr, hub, _server) = start_server(WebConfig::default()).await;

    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{}/ws", addr))
        .await
        .expect("Should connect");

    match next_frame(&mut ws).await {
        ServerMessage::SystemInfo(info) => {
            assert!(!info.hostname.is_empty());
            assert!(info.cpu_cores > 0);
        }
        other => panic!("expected system-info first, got {}", other.event()),
    }

    for _ in 0..2 {
        match next_frame(&mut ws).await {
            ServerMessage::PerformanceData(snapshot) => {
                assert!(snapshot.processes.len() <= 5);
                assert!(snapshot.ram >= 0.0 && snapshot.ram <= 100.0);
            }
            other => panic!("expected performance-data, got {}", other.event()),
        }
    }
    assert!(hub.is_sampling());

    ws.send(Message::Close(None)).await.unwrap();
    timeout(WAIT, async {
        while hub.is_sampling() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("Sampler should stop after the last subscriber leaves");
}

#[tokio::test]
async fn test_tunnel_failure_does_not_stop_serving() {
    let (addr, _hub, _server) = start_server(WebConfig::default()).await;

    let request = TunnelRequest {
        port: addr.port(),
        subdomain: "monitor-test00".to_string(),
    };
    assert!(expose_publicly(&BrokenTunnel, request.clone()).await.is_err());

    // an unreachable tunnel service fails the same way
    let provider = LocalTunnel::new("http://127.0.0.1:9").unwrap();
    assert!(expose_publicly(&provider, request).await.is_err());

    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{}/ws", addr))
        .await
        .expect("Should still serve locally");
    assert!(matches!(next_frame(&mut ws).await, ServerMessage::SystemInfo(_)));
    assert!(matches!(
        next_frame(&mut ws).await,
        ServerMessage::PerformanceData(_)
    ));
}

#[tokio::test]
async fn test_connection_cap_rejects_extra_subscribers() {
    let config = WebConfig::default().with_max_websocket_connections(1);
    let (addr, _hub, _server) = start_server(config).await;
    let url = format!("ws://{}/ws", addr);

    let (mut first, _) = tokio_tungstenite::connect_async(url.as_str()).await.unwrap();
    assert!(matches!(next_frame(&mut first).await, ServerMessage::SystemInfo(_)));

    let rejected = tokio_tungstenite::connect_async(url.as_str()).await;
    match rejected {
        Err(e) => assert!(e.to_string().contains("503"), "unexpected error: {}", e),
        Ok(_) => panic!("expected the handshake to be refused"),
    }
}

#[tokio::test]
async fn test_shutdown_closes_subscribers_and_server() {
    let (addr, hub, server) = start_server(WebConfig::default()).await;

    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{}/ws", addr))
        .await
        .unwrap();
    assert!(matches!(next_frame(&mut ws).await, ServerMessage::SystemInfo(_)));

    hub.shutdown();

    // the socket ends with a close frame or EOF
    let ended = timeout(WAIT, async {
        while let Some(Ok(frame)) = ws.next().await {
            if frame.is_close() {
                break;
            }
        }
    })
    .await;
    assert!(ended.is_ok());

    let result = timeout(WAIT, server).await.expect("Server should stop");
    assert!(result.unwrap().is_ok());
    assert_eq!(hub.subscriber_count(), 0);
}

#[tokio::test]
async fn test_health_endpoint() {
    let (addr, _hub, _server) = start_server(WebConfig::default()).await;

    let body: serde_json::Value = reqwest::get(format!("http://{}/api/health", addr))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["status"], "ok");
    assert_eq!(body["subscribers"], 0);
    assert_eq!(body["sampling"], false);
}

#[tokio::test]
async fn test_real_provider_composes_full_snapshot() {
    let composer = SnapshotComposer::new(Arc::new(SysinfoProvider::new()));

    let first = composer.compose().await;
    tokio::time::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL).await;
    let second = composer.compose().await;

    assert!(second.timestamp >= first.timestamp);
    assert!(second.cpu >= 0.0);
    assert!(second.processes.len() <= 5);
    for process in &second.processes {
        assert!(process.name.chars().count() <= 25);
    }

    let json = serde_json::to_value(&second).unwrap();
    for field in ["timestamp", "cpu", "ram", "temp", "disk", "network", "processes", "uptime"] {
        assert!(json.get(field).is_some(), "missing {}", field);
    }
}
