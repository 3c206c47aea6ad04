//! HTTP handlers for API endpoints.

use crate::metrics::Snapshot;
use crate::web::state::AppState;
use axum::extract::State;
use axum::response::{Html, Json};
use serde_json::json;

/// Compose one snapshot on demand.
pub async fn get_snapshot(State(state): State<AppState>) -> Json<Snapshot> {
    Json(state.hub.composer().compose().await)
}

/// Health check endpoint.
pub async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    let stats = state.hub.stats();
    Json(json!({
        "status": "ok",
        "service": "server-monitor",
        "version": env!("CARGO_PKG_VERSION"),
        "hostname": state.hub.host_info().hostname,
        "subscribers": stats.subscribers,
        "connections": state.connection_count(),
        "sampling": stats.sampling,
        "ticks": stats.ticks,
        "cadenceMs": state.hub.cadence().as_millis() as u64,
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// Minimal viewer used when no static directory is available.
pub async fn default_index() -> Html<&'static str> {
    Html(DEFAULT_INDEX_HTML)
}

const DEFAULT_INDEX_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Server Monitor</title>
    <style>
        body {
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
            background: #10141a;
            color: #d8dee9;
            margin: 0;
            padding: 24px;
        }
        h1 { font-size: 1.6rem; margin: 0 0 4px; }
        #host { color: #8fa1b3; margin-bottom: 24px; }
        .grid {
            display: grid;
            grid-template-columns: repeat(auto-fit, minmax(180px, 1fr));
            gap: 16px;
            margin-bottom: 24px;
        }
        .card { background: #1b222c; border-radius: 8px; padding: 16px; }
        .card h3 { font-size: 0.8rem; text-transform: uppercase; color: #8fa1b3; margin: 0 0 8px; }
        .value { font-size: 1.6rem; font-weight: 600; }
        table { width: 100%; border-collapse: collapse; background: #1b222c; border-radius: 8px; }
        th, td { text-align: left; padding: 8px 12px; border-bottom: 1px solid #2a3340; }
        #status { position: fixed; top: 12px; right: 16px; font-size: 0.8rem; }
        .online { color: #a3be8c; }
        .offline { color: #bf616a; }
    </style>
</head>
<body>
    <div id="status" class="offline">disconnected</div>
    <h1>Server Monitor</h1>
    <div id="host">waiting for host information...</div>

    <div class="grid">
        <div class="card"><h3>CPU</h3><div class="value" id="cpu">--</div></div>
        <div class="card"><h3>Memory</h3><div class="value" id="ram">--</div></div>
        <div class="card"><h3>Temperature</h3><div class="value" id="temp">--</div></div>
        <div class="card"><h3>Disk</h3><div class="value" id="disk">--</div></div>
        <div class="card"><h3>Network</h3><div class="value" id="net">--</div></div>
        <div class="card"><h3>Uptime</h3><div class="value" id="uptime">--</div></div>
    </div>

    <table>
        <thead><tr><th>PID</th><th>Process</th><th>CPU %</th><th>Mem %</th></tr></thead>
        <tbody id="processes"></tbody>
    </table>

    <script>
        function formatUptime(seconds) {
            const d = Math.floor(seconds / 86400);
            const h = Math.floor((seconds % 86400) / 3600);
            const m = Math.floor((seconds % 3600) / 60);
            return (d ? d + 'd ' : '') + h + 'h ' + m + 'm';
        }

        function render(event, data) {
            if (event === 'system-info') {
                document.getElementById('host').textContent =
                    data.hostname + ' | ' + data.platform + '/' + data.arch + ' | ' +
                    data.cpuModel + ' (' + data.cpuCores + ' cores) | ' + data.totalMemory + ' GiB';
                return;
            }
            if (event !== 'performance-data') return;
            document.getElementById('cpu').textContent = data.cpu.toFixed(1) + '%';
            document.getElementById('ram').textContent = data.ram.toFixed(1) + '%';
            document.getElementById('temp').textContent = data.temp ? data.temp.toFixed(1) + '°C' : 'n/a';
            document.getElementById('disk').textContent = data.disk.usePercent + '%';
            document.getElementById('net').textContent =
                '↓' + data.network.rx + ' ↑' + data.network.tx + ' KB/s';
            document.getElementById('uptime').textContent = formatUptime(data.uptime);
            document.getElementById('processes').innerHTML = data.processes.map(p =>
                '<tr><td>' + p.pid + '</td><td>' + p.name.replace(/</g, '&lt;') +
                '</td><td>' + p.cpu + '</td><td>' + p.mem + '</td></tr>').join('');
        }

        function connect() {
            const scheme = location.protocol === 'https:' ? 'wss://' : 'ws://';
            const ws = new WebSocket(scheme + location.host + '/ws');
            const status = document.getElementById('status');
            ws.onopen = () => { status.textContent = 'live'; status.className = 'online'; };
            ws.onmessage = (msg) => {
                const frame = JSON.parse(msg.data);
                render(frame.event, frame.data);
            };
            ws.onclose = () => {
                status.textContent = 'disconnected';
                status.className = 'offline';
                setTimeout(connect, 2000);
            };
        }

        connect();
    </script>
</body>
</html>
"#;
