// Ping probe: single-flight RTT measurement over PING/PONG.
// Numan Thabit 2026

use std::time::{Duration, Instant};

use rand::distributions::{Alphanumeric, DistString};
use rand::Rng;

use crate::registry::PeerId;
use crate::wire::PING_TOKEN_LEN;

/// The one latency probe that may be outstanding at any time.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Flight {
    peer: PeerId,
    token: String,
    started_at: Instant,
}

/// A completed RTT measurement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RttSample {
    /// Peer the PING was sent to.
    pub peer: PeerId,
    /// Token the PING carried.
    pub token: String,
    /// Time between the PING send and the PONG receipt.
    pub rtt: Duration,
}

/// Probe bookkeeping for the whole registry: one global flight slot, not
/// one per peer.
///
/// Known limitations, preserved deliberately: arming while a flight is
/// outstanding silently overwrites it (the earlier PONG, if it ever comes,
/// is measured against the wrong start or counts as stray), and a lost
/// PONG leaves the slot armed until the next PING overwrites it; there is
/// no expiry.
#[derive(Debug, Default)]
pub struct ProbeState {
    flight: Option<Flight>,
}

impl ProbeState {
    pub fn new() -> Self {
        Self { flight: None }
    }

    /// Arms the probe for a freshly sent PING, overwriting any outstanding
    /// flight.
    pub fn arm(&mut self, peer: PeerId, token: String, now: Instant) {
        self.flight = Some(Flight {
            peer,
            token,
            started_at: now,
        });
    }

    /// `true` while a PONG is expected.
    pub fn awaiting(&self) -> bool {
        self.flight.is_some()
    }

    /// Completes the outstanding probe against a PONG received at `now`.
    /// `None` means the PONG is stray: nothing was outstanding.
    pub fn complete(&mut self, now: Instant) -> Option<RttSample> {
        self.flight.take().map(|flight| RttSample {
            peer: flight.peer,
            token: flight.token,
            rtt: now.duration_since(flight.started_at),
        })
    }
}

/// Draws the fixed-length alphanumeric token a PING carries.
pub fn ping_token<R: Rng>(rng: &mut R) -> String {
    Alphanumeric.sample_string(rng, PING_TOKEN_LEN)
}
