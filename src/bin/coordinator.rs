use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use pulsewire::{Config, Coordinator, Header, Metrics, UdpTransport};
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "UDP liveness coordinator")]
struct Args {
    /// Path to a TOML config file (takes precedence over PULSEWIRE_CONFIG)
    #[arg(long)]
    config: Option<PathBuf>,

    /// UDP port to listen on, overriding the config file
    #[arg(long)]
    port: Option<u16>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(long)]
    verbose: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let default_filter = if args.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut cfg = match &args.config {
        Some(path) => Config::from_path(path)?,
        None => Config::load()?,
    };
    if let Some(port) = args.port {
        cfg.net.port = port;
    }

    let bind = SocketAddr::from((Ipv4Addr::UNSPECIFIED, cfg.net.port));
    let transport = UdpTransport::bind(bind, cfg.net.recv_buffer_bytes)?;
    info!(
        addr = %transport.local_addr()?,
        max_peers = cfg.registry.max_peers,
        keepalive_ms = cfg.keepalive.interval_ms,
        threshold = cfg.keepalive.failure_threshold,
        "coordinator listening"
    );
    for header in Header::all() {
        debug!(byte = %(header.as_byte() as char), name = %header, "wire header");
    }

    let metrics = Arc::new(Metrics::new()?);
    let mut coordinator = Coordinator::new(transport, &cfg, metrics);
    if let Err(err) = coordinator.run() {
        error!(error = %err, "event loop failed");
        return Err(err.into());
    }
    Ok(())
}
