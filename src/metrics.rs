// Numan Thabit 2026
// metrics.rs - Prometheus counters for the liveness loop
use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Registry};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),
}

#[derive(Debug, Clone)]
pub struct Metrics {
    registry: Registry,
    pub datagrams_rx: IntCounterVec,
    pub datagrams_tx: IntCounter,
    pub send_failures: IntCounter,
    pub parse_failures: IntCounter,
    pub registry_full_drops: IntCounter,
    pub pings_sent: IntCounter,
    pub stray_pongs: IntCounter,
    pub keepalive_requests: IntCounter,
    pub peer_down_transitions: IntCounter,
    pub peers_tracked: IntGauge,
    pub peers_live: IntGauge,
    pub rtt_seconds: Histogram,
}

impl Metrics {
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new_custom(Some("pulsewire".into()), None)?;

        macro_rules! register_counter {
            ($name:expr, $help:expr) => {{
                let counter = IntCounter::new($name, $help)?;
                registry.register(Box::new(counter.clone()))?;
                counter
            }};
        }

        macro_rules! register_counter_vec {
            ($name:expr, $help:expr, $labels:expr) => {{
                let counter = IntCounterVec::new(prometheus::Opts::new($name, $help), $labels)?;
                registry.register(Box::new(counter.clone()))?;
                counter
            }};
        }

        macro_rules! register_gauge {
            ($name:expr, $help:expr) => {{
                let gauge = IntGauge::new($name, $help)?;
                registry.register(Box::new(gauge.clone()))?;
                gauge
            }};
        }

        macro_rules! register_histogram {
            ($name:expr, $help:expr, $buckets:expr) => {{
                let opts = HistogramOpts::new($name, $help).buckets($buckets.to_vec());
                let hist = Histogram::with_opts(opts)?;
                registry.register(Box::new(hist.clone()))?;
                hist
            }};
        }

        let datagrams_rx = register_counter_vec!(
            "datagrams_rx_total",
            "Datagrams received, by decoded header",
            &["header"]
        );
        let datagrams_tx = register_counter!("datagrams_tx_total", "Datagrams sent");
        let send_failures = register_counter!("send_failures_total", "Datagram sends that errored");
        let parse_failures = register_counter!(
            "parse_failures_total",
            "Datagrams dropped as malformed (bad header or hello id)"
        );
        let registry_full_drops = register_counter!(
            "registry_full_drops_total",
            "HELLOs dropped because the registry was at capacity"
        );
        let pings_sent = register_counter!("pings_sent_total", "Latency probe PINGs issued");
        let stray_pongs = register_counter!(
            "stray_pongs_total",
            "PONGs received with no outstanding probe"
        );
        let keepalive_requests =
            register_counter!("keepalive_requests_total", "Keepalive REQUESTs issued");
        let peer_down_transitions = register_counter!(
            "peer_down_transitions_total",
            "Peers marked down by the failure threshold"
        );
        let peers_tracked = register_gauge!("peers_tracked", "Peers currently in the registry");
        let peers_live = register_gauge!("peers_live", "Tracked peers currently up");
        let rtt_seconds = register_histogram!(
            "rtt_seconds",
            "Round-trip time of completed latency probes",
            &[0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
        );

        Ok(Self {
            registry,
            datagrams_rx,
            datagrams_tx,
            send_failures,
            parse_failures,
            registry_full_drops,
            pings_sent,
            stray_pongs,
            keepalive_requests,
            peer_down_transitions,
            peers_tracked,
            peers_live,
            rtt_seconds,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn gather(&self) -> Vec<prometheus::proto::MetricFamily> {
        self.registry.gather()
    }
}
