// Keepalive monitor: per-peer probe cadence and failure threshold.
// Numan Thabit 2026

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use crate::config::Keepalive;
use crate::registry::{PeerId, Registry};

/// A REQUEST the sweep decided to send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeTarget {
    pub peer: PeerId,
    pub addr: SocketAddr,
}

/// Outcome of one keepalive pass. The sweep has already mutated the
/// registry; the caller performs the sends and reports the transitions.
#[derive(Debug, Default)]
pub struct SweepReport {
    /// Peers owed a REQUEST this pass.
    pub probes: Vec<ProbeTarget>,
    /// Peers that crossed the failure threshold and went down.
    pub downed: Vec<PeerId>,
}

/// Applies the keepalive policy: probe every up peer once per interval and
/// mark it down after `failure_threshold` probes without a reply.
#[derive(Debug, Clone)]
pub struct KeepaliveMonitor {
    interval: Duration,
    failure_threshold: u32,
}

impl KeepaliveMonitor {
    pub fn new(cfg: &Keepalive) -> Self {
        Self {
            interval: cfg.interval(),
            failure_threshold: cfg.failure_threshold,
        }
    }

    /// One pass over the up peers.
    ///
    /// Fires on every interval elapse whether or not earlier REQUESTs were
    /// answered; the counter reads "probes sent since last success", with
    /// no first-probe/retry distinction. A slow but alive peer therefore
    /// goes down after threshold * interval of silence. The REQUEST is
    /// still owed on the pass that downs the peer (probe first, then
    /// count), and the counter restarts at zero for the down state.
    pub fn sweep(&self, registry: &mut Registry, now: Instant) -> SweepReport {
        let mut report = SweepReport::default();
        for rec in registry.iter_mut() {
            if !rec.is_up() {
                continue;
            }
            if now.duration_since(rec.last_probe_time) < self.interval {
                continue;
            }
            report.probes.push(ProbeTarget {
                peer: rec.id,
                addr: rec.addr,
            });
            rec.last_probe_time = now;
            rec.consecutive_failures += 1;
            if rec.consecutive_failures >= self.failure_threshold {
                rec.mark_down();
                report.downed.push(rec.id);
            }
        }
        report
    }
}
