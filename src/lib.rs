// Pulsewire liveness public library surface.
// Numan Thabit 2026

pub mod config;

pub mod wire;

pub mod api;

pub mod io;

pub mod metrics;

pub mod registry;

pub mod probe;

pub mod monitor;

pub mod coordinator;

pub mod responder;

pub use config::{Config, ConfigError, DEFAULT_PORT};

pub use wire::{Header, Message, WireError, PING_TOKEN_LEN};

pub use api::{Datagram, LoopError, Transport};

pub use registry::{PeerId, PeerRecord, PeerStatus, Registry, Upsert};

pub use probe::{ping_token, ProbeState, RttSample};

pub use monitor::{KeepaliveMonitor, ProbeTarget, SweepReport};

pub use coordinator::Coordinator;

pub use responder::Responder;

pub use io::udp::{UdpError, UdpTransport};

pub use metrics::{Metrics, MetricsError};
