use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{fmt, EnvFilter};

use landrop_core::advertise::advertise_presence;
use landrop_core::api::ApiServer;
use landrop_core::scanner::MdnsDiscovery;
use landrop_core::{
    NodeConfig, PeerRegistry, PeerScanner, SystemInfo, TransferReceiver, TransferSender,
};

#[derive(Parser, Debug)]
#[command(name = "landrop", version, about = "LAN peer-to-peer file sharing")]
struct Cli {
    /// Set log level: error,warn,info,debug,trace
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Data directory for node state
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the full node: discovery, transfer receiver, HTTP API
    Serve {
        /// Port for the HTTP control surface
        #[arg(long)]
        http_port: Option<u16>,

        /// Port for inbound transfers
        #[arg(long)]
        transfer_port: Option<u16>,

        /// Directory where received files land
        #[arg(long)]
        receive_dir: Option<PathBuf>,
    },

    /// Show this node's identity and capabilities
    Info,

    /// Browse the local network once and print what answered
    Discover {
        /// Browse window in seconds
        #[arg(long, default_value_t = 5)]
        timeout: u64,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Send a file to a peer found on the network
    Send {
        /// Peer id to send to
        #[arg(long)]
        peer: String,

        /// File to send
        #[arg(long)]
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    fmt()
        .with_env_filter(EnvFilter::new(&cli.log_level))
        .with_target(false)
        .init();

    // Determine data directory
    let data_dir = cli.data_dir.unwrap_or_else(|| {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".landrop")
    });

    let mut cfg = NodeConfig::load_or_default(&data_dir);

    match cli.cmd {
        Commands::Serve {
            http_port,
            transfer_port,
            receive_dir,
        } => {
            if let Some(port) = http_port {
                cfg.http_port = port;
            }
            if let Some(port) = transfer_port {
                cfg.transfer_port = port;
            }
            if let Some(dir) = receive_dir {
                cfg.receive_dir = dir;
            }
            serve(cfg).await
        }

        Commands::Info => {
            cfg.ensure_dirs()?;
            let info = SystemInfo::load_or_probe(&cfg.data_dir)?;
            println!("{}", serde_json::to_string_pretty(&info)?);
            Ok(())
        }

        Commands::Discover { timeout, json } => discover(&cfg, timeout, json).await,

        Commands::Send { peer, file } => send(&cfg, &peer, &file).await,
    }
}

async fn serve(cfg: NodeConfig) -> Result<()> {
    cfg.ensure_dirs().context("creating data directories")?;
    let info = SystemInfo::load_or_probe(&cfg.data_dir).context("initializing system info")?;
    tracing::info!(hostname = %info.hostname, peer_id = %info.peer_id, "node initialized");

    let registry = Arc::new(PeerRegistry::new());
    let discovery = Arc::new(MdnsDiscovery::new(cfg.service_type.clone()));
    let scanner = Arc::new(PeerScanner::new(
        registry.clone(),
        discovery,
        info.peer_id.clone(),
        cfg.scan_timeout(),
        cfg.scan_interval(),
    ));
    let sender = TransferSender::new(registry.clone(), &cfg);

    // Presence advertiser, held open until ctrl-c.
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    {
        let cfg = cfg.clone();
        let info = info.clone();
        tokio::spawn(async move {
            advertise_presence(&cfg, &info, shutdown_rx).await;
        });
    }

    // Periodic peer scanning.
    {
        let scanner = scanner.clone();
        tokio::spawn(async move {
            scanner.run_periodic().await;
        });
    }

    // Inbound transfer streams.
    let receiver = TransferReceiver::new(cfg.receive_dir.clone());
    let transfer_listener = tokio::net::TcpListener::bind(("0.0.0.0", cfg.transfer_port))
        .await
        .with_context(|| format!("binding transfer port {}", cfg.transfer_port))?;
    tracing::info!(port = cfg.transfer_port, "transfer receiver listening");
    tokio::spawn(async move {
        receiver.serve(transfer_listener).await;
    });

    // HTTP control surface.
    let api = Arc::new(ApiServer::new(registry, scanner, sender, info));
    let http_listener = tokio::net::TcpListener::bind(("0.0.0.0", cfg.http_port))
        .await
        .with_context(|| format!("binding http port {}", cfg.http_port))?;
    tracing::info!(port = cfg.http_port, "http api listening");
    tokio::spawn(async move {
        api.serve(http_listener).await;
    });

    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    tracing::info!("shutting down");
    let _ = shutdown_tx.send(true);
    // Give the advertiser a moment to withdraw its record.
    tokio::time::sleep(Duration::from_millis(200)).await;
    Ok(())
}

async fn discover(cfg: &NodeConfig, timeout: u64, json: bool) -> Result<()> {
    let services = tokio::task::spawn_blocking({
        let service_type = cfg.service_type.clone();
        move || mdns_core::discover::browse_within(&service_type, Duration::from_secs(timeout))
    })
    .await??;

    if json {
        println!("{}", serde_json::to_string_pretty(&services)?);
    } else {
        println!("Discovered {} node(s):", services.len());
        for svc in services {
            println!("\n  {} @ {}:{}", svc.instance_name, svc.host_name, svc.port);
            for addr in &svc.addresses {
                println!("    address: {}", addr);
            }
            for (k, v) in &svc.properties {
                println!("    {} = {}", k, v);
            }
        }
    }

    Ok(())
}

async fn send(cfg: &NodeConfig, peer_id: &str, file: &Path) -> Result<()> {
    cfg.ensure_dirs()?;
    let info = SystemInfo::load_or_probe(&cfg.data_dir)?;

    let registry = Arc::new(PeerRegistry::new());
    let discovery = Arc::new(MdnsDiscovery::new(cfg.service_type.clone()));
    let scanner = PeerScanner::new(
        registry.clone(),
        discovery,
        info.peer_id.clone(),
        cfg.scan_timeout(),
        cfg.scan_interval(),
    );

    println!("Scanning for peers...");
    scanner.scan().await;

    let peer = registry
        .lookup(peer_id)
        .with_context(|| format!("peer not found on the local network: {peer_id}"))?;

    let file_name = file
        .file_name()
        .and_then(|n| n.to_str())
        .context("file has no usable name")?
        .to_string();

    println!(
        "Sending {} to {} ({}:{})...",
        file_name, peer.hostname, peer.ip, peer.port
    );

    let sender = TransferSender::new(registry.clone(), cfg);
    let result = sender.transfer(&peer, file, &file_name).await?;
    println!(
        "✓ {} ({} bytes received by peer)",
        result.message, result.bytes_received
    );
    Ok(())
}
