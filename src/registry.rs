// Peer registry: bounded table of tracked peers and their liveness state.
// Numan Thabit 2026

use std::fmt;
use std::net::SocketAddr;
use std::time::Instant;

use rand::Rng;
use tracing::info;

/// Identifier a peer announces in its HELLO payload.
pub type PeerId = u32;

/// Liveness status of a tracked peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerStatus {
    Up,
    Down,
}

impl fmt::Display for PeerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeerStatus::Up => f.write_str("up"),
            PeerStatus::Down => f.write_str("down"),
        }
    }
}

/// One tracked peer.
///
/// `consecutive_failures` counts REQUEST probes sent since the last reply.
/// It only moves while the peer is up and resets to zero on every status
/// transition, in either direction.
#[derive(Debug, Clone)]
pub struct PeerRecord {
    pub id: PeerId,
    pub addr: SocketAddr,
    pub status: PeerStatus,
    pub consecutive_failures: u32,
    /// When the keepalive monitor last probed this peer (or the HELLO that
    /// created/refreshed it, so fresh registrations are not probed at once).
    pub last_probe_time: Instant,
}

impl PeerRecord {
    fn new(id: PeerId, addr: SocketAddr, now: Instant) -> Self {
        Self {
            id,
            addr,
            status: PeerStatus::Up,
            consecutive_failures: 0,
            last_probe_time: now,
        }
    }

    /// Resets the failure counter and marks the peer up: the reaction to
    /// any RESPONSE, HELLO, or PONG from its address, and the only way a
    /// down peer comes back. Returns `true` when a down peer was revived.
    pub fn revive(&mut self) -> bool {
        self.consecutive_failures = 0;
        let was_down = self.status == PeerStatus::Down;
        self.status = PeerStatus::Up;
        was_down
    }

    /// Marks the peer down, resetting the failure counter.
    pub fn mark_down(&mut self) {
        self.status = PeerStatus::Down;
        self.consecutive_failures = 0;
    }

    pub fn is_up(&self) -> bool {
        self.status == PeerStatus::Up
    }
}

/// Result of a HELLO upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    /// New record created.
    Inserted,
    /// Existing id refreshed: address updated, peer revived.
    Refreshed,
    /// Registry at capacity; the HELLO was dropped.
    Full,
}

/// Bounded peer table.
///
/// Insertion order is stable and records are never removed (down is a
/// status, not deletion). Lookups are linear scans, which is exactly right
/// for a table capped at a handful of entries.
#[derive(Debug)]
pub struct Registry {
    peers: Vec<PeerRecord>,
    capacity: usize,
}

impl Registry {
    pub fn new(capacity: usize) -> Self {
        Self {
            peers: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Registers or refreshes a peer from a HELLO.
    ///
    /// A known id gets its address updated and the peer revived; an unseen
    /// id is inserted while capacity remains. At capacity the HELLO is
    /// dropped and existing entries stay untouched.
    pub fn upsert_from_hello(&mut self, id: PeerId, addr: SocketAddr, now: Instant) -> Upsert {
        if let Some(rec) = self.peers.iter_mut().find(|rec| rec.id == id) {
            rec.addr = addr;
            rec.revive();
            rec.last_probe_time = now;
            return Upsert::Refreshed;
        }
        if self.peers.len() >= self.capacity {
            return Upsert::Full;
        }
        self.peers.push(PeerRecord::new(id, addr, now));
        Upsert::Inserted
    }

    /// First record matching the sender address, if any. Attributes inbound
    /// RESPONSE/PONG/HELLO datagrams to a tracked peer.
    pub fn find_by_addr_mut(&mut self, addr: SocketAddr) -> Option<&mut PeerRecord> {
        self.peers.iter_mut().find(|rec| rec.addr == addr)
    }

    pub fn get(&self, id: PeerId) -> Option<&PeerRecord> {
        self.peers.iter().find(|rec| rec.id == id)
    }

    /// Records in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &PeerRecord> {
        self.peers.iter()
    }

    /// Mutable walk in insertion order; the keepalive sweep lives on this.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut PeerRecord> {
        self.peers.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn live_count(&self) -> usize {
        self.peers.iter().filter(|rec| rec.is_up()).count()
    }

    /// Uniform draw over the *currently* up subset; none when no peer is up.
    pub fn random_live_peer<R: Rng>(&self, rng: &mut R) -> Option<&PeerRecord> {
        let live = self.live_count();
        if live == 0 {
            return None;
        }
        let target = rng.gen_range(0..live);
        self.peers.iter().filter(|rec| rec.is_up()).nth(target)
    }

    /// Logs one line per record, the diagnostic registry snapshot.
    pub fn log_snapshot(&self) {
        info!(
            peers = self.peers.len(),
            live = self.live_count(),
            "registry snapshot"
        );
        for rec in &self.peers {
            info!(
                peer = rec.id,
                addr = %rec.addr,
                status = %rec.status,
                failures = rec.consecutive_failures,
                "tracked peer"
            );
        }
    }
}
