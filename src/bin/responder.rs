use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use clap::Parser;
use pulsewire::{Config, Header, Responder, UdpTransport, DEFAULT_PORT};
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Peer responder for the pulsewire coordinator")]
struct Args {
    /// Numeric peer id announced to the coordinator
    #[arg(long)]
    id: u32,

    /// Coordinator address to announce to
    #[arg(long, default_value_t = SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT)))]
    coordinator: SocketAddr,

    /// UDP port to bind
    #[arg(long, default_value_t = 1306)]
    port: u16,

    /// Path to a TOML config file (takes precedence over PULSEWIRE_CONFIG)
    #[arg(long)]
    config: Option<PathBuf>,

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

    let cfg = match &args.config {
        Some(path) => Config::from_path(path)?,
        None => Config::load()?,
    };

    let bind = SocketAddr::from((Ipv4Addr::UNSPECIFIED, args.port));
    let transport = UdpTransport::bind(bind, cfg.net.recv_buffer_bytes)?;
    info!(
        addr = %transport.local_addr()?,
        id = args.id,
        coordinator = %args.coordinator,
        "responder listening"
    );
    for header in Header::all() {
        debug!(byte = %(header.as_byte() as char), name = %header, "wire header");
    }

    let mut responder = Responder::new(transport, &cfg, args.id, args.coordinator);
    if let Err(err) = responder.run() {
        error!(error = %err, "event loop failed");
        return Err(err.into());
    }
    Ok(())
}
