//! Server Monitor binary
//!
//! Serves live host telemetry to browser viewers and optionally publishes the
//! dashboard through a public tunnel.

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use server_monitor::tunnel::{self, DEFAULT_TUNNEL_HOST};
use server_monitor::{
    web, LocalTunnel, Snapshot, SnapshotComposer, SysinfoProvider, TelemetryHub, TunnelConfig,
    TunnelHandle, WebConfig, DEFAULT_WEB_PORT,
};
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "server_monitor")]
#[command(about = "Live host telemetry over WebSocket")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(long_about = "Streams CPU, memory, disk, network, temperature and top processes to browser viewers, optionally through a public tunnel")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Web server bind address
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Web server port
    #[arg(short, long, default_value_t = DEFAULT_WEB_PORT)]
    port: u16,

    /// Log connection details and per-tick activity
    #[arg(short, long)]
    verbose: bool,

    /// Enable trace-level logging
    #[arg(short, long)]
    debug: bool,

    /// Only log warnings and errors
    #[arg(short, long, conflicts_with_all = ["verbose", "debug"])]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the web server (default)
    Serve(ServeArgs),

    /// Print a single telemetry snapshot and exit
    Snapshot(SnapshotArgs),

    /// Show static host information
    Info,
}

#[derive(Args)]
struct ServeArgs {
    /// Directory served as the viewer
    #[arg(long, default_value = "public")]
    static_dir: String,

    /// Disable CORS headers
    #[arg(long)]
    no_cors: bool,

    /// Maximum WebSocket connections
    #[arg(long, default_value_t = 100)]
    max_connections: usize,

    /// Do not open a public tunnel
    #[arg(long)]
    no_tunnel: bool,

    /// Tunnel service base URL
    #[arg(long, default_value = DEFAULT_TUNNEL_HOST)]
    tunnel_host: String,

    /// Requested public subdomain (random `monitor-xxxxxx` when omitted)
    #[arg(long)]
    subdomain: Option<String>,
}

impl Default for ServeArgs {
    fn default() -> Self {
        Self {
            static_dir: "public".to_string(),
            no_cors: false,
            max_connections: 100,
            no_tunnel: false,
            tunnel_host: DEFAULT_TUNNEL_HOST.to_string(),
            subdomain: None,
        }
    }
}

#[derive(Args)]
struct SnapshotArgs {
    /// Output format: json or pretty
    #[arg(short, long, default_value = "pretty")]
    format: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logging(&cli)?;

    match &cli.command {
        Some(Commands::Serve(args)) => {
            print_banner();
            serve_command(&cli, args).await?;
        }
        Some(Commands::Snapshot(args)) => {
            snapshot_command(args).await?;
        }
        Some(Commands::Info) => {
            info_command().await?;
        }
        None => {
            print_banner();
            serve_command(&cli, &ServeArgs::default()).await?;
        }
    }

    Ok(())
}

fn default_level(cli: &Cli) -> &'static str {
    if cli.debug {
        "trace"
    } else if cli.verbose {
        "debug"
    } else if cli.quiet {
        "warn"
    } else {
        "info"
    }
}

fn init_logging(cli: &Cli) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level(cli)));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to install log subscriber")?;

    Ok(())
}

fn print_banner() {
    println!("Server Monitor");
    println!("   Version: {}", env!("CARGO_PKG_VERSION"));
    println!();
}

async fn serve_command(cli: &Cli, args: &ServeArgs) -> anyhow::Result<()> {
    let web_config = WebConfig::new(&cli.host, cli.port)
        .with_static_path(Some(args.static_dir.clone()))
        .with_cors(!args.no_cors)
        .with_max_websocket_connections(args.max_connections);
    let tunnel_config = TunnelConfig::default()
        .with_enabled(!args.no_tunnel)
        .with_host(&args.tunnel_host)
        .with_subdomain(args.subdomain.clone());

    info!("Web server configuration:");
    info!("  - Bind address: {}", web_config.bind_address());
    info!("  - CORS enabled: {}", web_config.enable_cors);
    info!(
        "  - Max WebSocket connections: {}",
        web_config.max_websocket_connections
    );

    let hub = Arc::new(TelemetryHub::new(Arc::new(SysinfoProvider::new())).await);

    let listener = web::bind(&web_config).await?;
    let port = listener.local_addr()?.port();
    let mut server = tokio::spawn(web::serve(listener, web_config, hub.clone()));

    let tunnel = if tunnel_config.enabled {
        open_tunnel(&tunnel_config, &cli.host, port).await
    } else {
        info!("Public tunnel disabled");
        None
    };

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                warn!("Failed to listen for Ctrl-C: {}", e);
            }
            info!("Shutting down");
        }
        finished = &mut server => {
            // the server only stops on its own when it fails
            if let Some(handle) = &tunnel {
                handle.close();
            }
            return finished.context("web server task panicked")?.map_err(Into::into);
        }
    }

    hub.shutdown();
    if let Some(handle) = tunnel {
        handle.close();
    }
    server.await.context("web server task panicked")??;

    Ok(())
}

/// Open the public tunnel. Any failure is logged and local serving goes on.
async fn open_tunnel(config: &TunnelConfig, bind_host: &str, port: u16) -> Option<TunnelHandle> {
    let local_host = match bind_host.parse::<IpAddr>() {
        Ok(ip) if !ip.is_unspecified() => bind_host.to_string(),
        _ => "127.0.0.1".to_string(),
    };

    let provider = match LocalTunnel::new(&config.host) {
        Ok(provider) => provider.with_local_host(local_host),
        Err(e) => {
            error!("Public tunnel unavailable: {}", e);
            return None;
        }
    };

    tunnel::expose_publicly(&provider, config.request(port))
        .await
        .ok()
}

/// Compose twice so CPU figures cover a real measurement window.
async fn sample_once() -> Snapshot {
    let composer = SnapshotComposer::new(Arc::new(SysinfoProvider::new()));
    composer.compose().await;
    tokio::time::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL).await;
    composer.compose().await
}

async fn snapshot_command(args: &SnapshotArgs) -> anyhow::Result<()> {
    let snapshot = sample_once().await;

    match args.format.as_str() {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        }
        "pretty" => {
            print_pretty_snapshot(&snapshot);
        }
        other => {
            anyhow::bail!("Unsupported format: {}. Use 'json' or 'pretty'", other);
        }
    }

    Ok(())
}

async fn info_command() -> anyhow::Result<()> {
    let composer = SnapshotComposer::new(Arc::new(SysinfoProvider::new()));
    let host = composer.static_info().await;

    println!("Host Information");
    println!("================");
    println!("  Hostname: {}", host.hostname);
    println!("  Platform: {} ({})", host.platform, host.arch);
    println!("  CPU: {} ({} cores)", host.cpu_model, host.cpu_cores);
    println!("  Memory: {} GiB total", host.total_memory);
    println!("  Uptime: {} seconds", composer.source().uptime());

    Ok(())
}

fn print_pretty_snapshot(snapshot: &Snapshot) {
    println!(
        "System Snapshot ({})",
        snapshot.timestamp.format("%Y-%m-%d %H:%M:%S UTC")
    );
    println!("==========================================");
    println!("  CPU: {:.1}%", snapshot.cpu);
    println!("  Memory: {:.1}%", snapshot.ram);
    if snapshot.temp > 0.0 {
        println!("  Temperature: {:.1}°C", snapshot.temp);
    } else {
        println!("  Temperature: n/a");
    }
    println!(
        "  Disk: {} / {} GiB ({}% used)",
        snapshot.disk.used, snapshot.disk.total, snapshot.disk.use_percent
    );
    println!(
        "  Network: rx {} KB/s, tx {} KB/s",
        snapshot.network.rx, snapshot.network.tx
    );
    println!("  Uptime: {} seconds", snapshot.uptime);
    println!();

    println!("Top processes:");
    for process in &snapshot.processes {
        println!(
            "  {:>7}  {:<25}  cpu {:>6}%  mem {:>6}%",
            process.pid, process.name, process.cpu, process.mem
        );
    }
}
