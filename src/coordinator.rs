// coordinator.rs - liveness event loop: timers first, then at most one datagram
// Numan Thabit 2026

use std::net::SocketAddr;
use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, warn};

use crate::api::{Datagram, LoopError, Transport};
use crate::config::Config;
use crate::metrics::Metrics;
use crate::monitor::KeepaliveMonitor;
use crate::probe::{ping_token, ProbeState};
use crate::registry::{Registry, Upsert};
use crate::wire::{Header, Message};

/// The coordinator role: registers announced peers, probes their liveness
/// and samples RTT, all on one thread.
///
/// The coordinator never answers PING or REQUEST; it watches peers and is
/// not watched itself. State changes come only from inbound datagrams and
/// the two timers, so [`tick`](Coordinator::tick) with a fixed `now` is
/// deterministic given the transport contents and the RNG.
pub struct Coordinator<T, R = StdRng>
where
    T: Transport,
    R: Rng,
{
    transport: T,
    registry: Registry,
    monitor: KeepaliveMonitor,
    probe: ProbeState,
    next_ping_at: Option<Instant>,
    ping_interval: RangeInclusive<Duration>,
    poll_timeout: Duration,
    rng: R,
    metrics: Arc<Metrics>,
}

impl<T: Transport> Coordinator<T> {
    pub fn new(transport: T, cfg: &Config, metrics: Arc<Metrics>) -> Self {
        Self::with_rng(transport, cfg, metrics, StdRng::from_entropy())
    }
}

impl<T, R> Coordinator<T, R>
where
    T: Transport,
    R: Rng,
{
    /// Builds a coordinator with a caller-supplied RNG, which drives peer
    /// selection, token generation and the ping interval draw.
    pub fn with_rng(transport: T, cfg: &Config, metrics: Arc<Metrics>, rng: R) -> Self {
        Self {
            transport,
            registry: Registry::new(cfg.registry.max_peers),
            monitor: KeepaliveMonitor::new(&cfg.keepalive),
            probe: ProbeState::new(),
            next_ping_at: None,
            ping_interval: cfg.ping.interval_range(),
            poll_timeout: cfg.net.poll_timeout(),
            rng,
            metrics,
        }
    }

    /// Peers currently tracked.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Drives the loop until the readiness poll fails. Send and receive
    /// errors are logged and survived; a poll failure is fatal.
    pub fn run(&mut self) -> Result<(), LoopError<T::Error>> {
        info!(
            poll_timeout_ms = self.poll_timeout.as_millis() as u64,
            capacity = self.registry.capacity(),
            "coordinator loop running"
        );
        loop {
            let readable = self
                .transport
                .poll_readable(self.poll_timeout)
                .map_err(LoopError::Poll)?;
            self.tick(Instant::now(), readable);
        }
    }

    /// One loop iteration: fire due timers, then consume at most one
    /// datagram if `readable` says the socket has traffic. `now` is sampled
    /// once per iteration so the ping timer, the keepalive sweep and the
    /// dispatch all share a clock.
    pub fn tick(&mut self, now: Instant, readable: bool) {
        self.run_ping_timer(now);
        self.run_keepalive(now);
        if readable {
            self.receive_one(now);
        }
    }

    fn run_ping_timer(&mut self, now: Instant) {
        match self.next_ping_at {
            None => self.schedule_next_ping(now),
            Some(due) if now >= due => {
                self.fire_ping(now);
                self.schedule_next_ping(now);
            }
            Some(_) => {}
        }
    }

    /// Picks a random up peer and sends it a tokened PING. The probe slot
    /// is armed before the send so a PONG racing the send failure path is
    /// still matched.
    fn fire_ping(&mut self, now: Instant) {
        let target = self
            .registry
            .random_live_peer(&mut self.rng)
            .map(|peer| (peer.id, peer.addr));
        let Some((peer, addr)) = target else {
            debug!("ping timer fired with no live peers");
            return;
        };
        let token = ping_token(&mut self.rng);
        info!(peer, addr = %addr, token = %token, "sending latency probe");
        self.probe.arm(peer, token.clone(), now);
        self.send(Message::ping(&token), addr);
        self.metrics.pings_sent.inc();
    }

    // The interval is redrawn on every firing, peers or not.
    fn schedule_next_ping(&mut self, now: Instant) {
        let delay = self.rng.gen_range(self.ping_interval.clone());
        self.next_ping_at = Some(now + delay);
    }

    fn run_keepalive(&mut self, now: Instant) {
        let report = self.monitor.sweep(&mut self.registry, now);
        for target in &report.probes {
            debug!(peer = target.peer, addr = %target.addr, "sending keepalive request");
            self.send(Message::request(), target.addr);
            self.metrics.keepalive_requests.inc();
        }
        for &peer in &report.downed {
            warn!(peer, "peer exceeded failure threshold, marked down");
            self.metrics.peer_down_transitions.inc();
        }
        if !report.downed.is_empty() {
            self.registry.log_snapshot();
            self.sync_gauges();
        }
    }

    fn receive_one(&mut self, now: Instant) {
        match self.transport.recv_one() {
            Ok(Some(datagram)) => self.dispatch(datagram, now),
            Ok(None) => {}
            Err(err) => warn!(error = %err, "receive failed"),
        }
    }

    fn dispatch(&mut self, datagram: Datagram, now: Instant) {
        let Datagram { bytes, from } = datagram;
        let message = match Message::decode(&bytes) {
            Ok(message) => message,
            Err(err) => {
                warn!(from = %from, error = %err, "dropping undecodable datagram");
                self.metrics.parse_failures.inc();
                return;
            }
        };
        self.metrics
            .datagrams_rx
            .with_label_values(&[&message.header.to_string()])
            .inc();
        match message.header {
            Header::Hello => self.on_hello(&message, from, now),
            Header::Ping => debug!(from = %from, "ignoring ping, coordinators are not probed"),
            Header::Pong => self.on_pong(&message, from, now),
            Header::Request => debug!(from = %from, "ignoring keepalive request"),
            Header::Response => self.revive_from(from, "response"),
        }
    }

    fn on_hello(&mut self, message: &Message, from: SocketAddr, now: Instant) {
        let id = match message.payload_str().and_then(|s| s.parse().ok()) {
            Some(id) => id,
            None => {
                warn!(from = %from, "dropping hello with unparseable peer id");
                self.metrics.parse_failures.inc();
                return;
            }
        };
        match self.registry.upsert_from_hello(id, from, now) {
            Upsert::Inserted => info!(peer = id, addr = %from, "peer registered"),
            Upsert::Refreshed => info!(peer = id, addr = %from, "peer refreshed by hello"),
            Upsert::Full => {
                warn!(
                    peer = id,
                    addr = %from,
                    capacity = self.registry.capacity(),
                    "registry full, dropping hello"
                );
                self.metrics.registry_full_drops.inc();
            }
        }
        // Even a dropped HELLO proves its sender alive: an already-tracked
        // address is revived and its probe clock refreshed at capacity too.
        if let Some(record) = self.registry.find_by_addr_mut(from) {
            record.revive();
            record.last_probe_time = now;
        }
        self.registry.log_snapshot();
        self.sync_gauges();
    }

    fn on_pong(&mut self, message: &Message, from: SocketAddr, now: Instant) {
        match self.probe.complete(now) {
            Some(sample) => {
                info!(
                    peer = sample.peer,
                    token = %sample.token,
                    payload = %String::from_utf8_lossy(&message.payload),
                    rtt_ms = sample.rtt.as_millis() as u64,
                    "latency probe completed"
                );
                self.metrics.rtt_seconds.observe(sample.rtt.as_secs_f64());
            }
            None => {
                debug!(from = %from, "stray pong, no probe in flight");
                self.metrics.stray_pongs.inc();
            }
        }
        self.revive_from(from, "pong");
    }

    /// Any RESPONSE or PONG from a tracked address proves the peer alive.
    /// Unlike a HELLO this does not touch `last_probe_time`, so a revived
    /// peer rejoins the keepalive cycle on its old clock.
    fn revive_from(&mut self, from: SocketAddr, via: &str) {
        match self.registry.find_by_addr_mut(from) {
            Some(record) => {
                let peer = record.id;
                if record.revive() {
                    info!(peer, addr = %from, via, "peer revived");
                    self.registry.log_snapshot();
                }
                self.sync_gauges();
            }
            None => debug!(from = %from, via, "reply from unknown address"),
        }
    }

    fn send(&mut self, message: Message, dst: SocketAddr) {
        match self.transport.send_to(message.encode(), dst) {
            Ok(()) => self.metrics.datagrams_tx.inc(),
            Err(err) => {
                warn!(dst = %dst, error = %err, "send failed");
                self.metrics.send_failures.inc();
            }
        }
    }

    fn sync_gauges(&self) {
        self.metrics.peers_tracked.set(self.registry.len() as i64);
        self.metrics.peers_live.set(self.registry.live_count() as i64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::PING_TOKEN_LEN;
    use bytes::Bytes;
    use std::collections::VecDeque;
    use thiserror::Error;

    #[derive(Debug, Error)]
    enum TestTransportError {
        #[error("poll failed")]
        Poll,
        #[error("send failed")]
        Send,
        #[error("recv failed")]
        Recv,
    }

    #[derive(Default)]
    struct TestTransport {
        sent: Vec<(SocketAddr, Bytes)>,
        inbound: VecDeque<Datagram>,
        fail_poll: bool,
        fail_send: bool,
        fail_recv: bool,
    }

    impl TestTransport {
        fn push_inbound(&mut self, bytes: impl Into<Bytes>, from: SocketAddr) {
            self.inbound.push_back(Datagram {
                bytes: bytes.into(),
                from,
            });
        }
    }

    impl Transport for TestTransport {
        type Error = TestTransportError;

        fn poll_readable(&mut self, _timeout: Duration) -> Result<bool, Self::Error> {
            if self.fail_poll {
                return Err(TestTransportError::Poll);
            }
            Ok(!self.inbound.is_empty())
        }

        fn send_to(&mut self, payload: Bytes, dst: SocketAddr) -> Result<(), Self::Error> {
            if self.fail_send {
                return Err(TestTransportError::Send);
            }
            self.sent.push((dst, payload));
            Ok(())
        }

        fn recv_one(&mut self) -> Result<Option<Datagram>, Self::Error> {
            if self.fail_recv {
                return Err(TestTransportError::Recv);
            }
            Ok(self.inbound.pop_front())
        }
    }

    fn addr(s: &str) -> SocketAddr {
        s.parse().expect("addr")
    }

    fn coordinator(cfg: &Config) -> (Coordinator<TestTransport, StdRng>, Arc<Metrics>) {
        let metrics = Arc::new(Metrics::new().expect("metrics"));
        let coordinator = Coordinator::with_rng(
            TestTransport::default(),
            cfg,
            metrics.clone(),
            StdRng::seed_from_u64(7),
        );
        (coordinator, metrics)
    }

    fn deliver(c: &mut Coordinator<TestTransport, StdRng>, message: Message, from: SocketAddr, now: Instant) {
        c.transport.push_inbound(message.encode(), from);
        c.tick(now, true);
    }

    #[test]
    fn first_tick_schedules_ping_without_firing() {
        let cfg = Config::default();
        let (mut c, _) = coordinator(&cfg);
        let t0 = Instant::now();

        c.tick(t0, false);

        assert!(c.transport.sent.is_empty());
        let delay = c.next_ping_at.expect("scheduled").duration_since(t0);
        assert!((1500..=2550).contains(&delay.as_millis()));
    }

    #[test]
    fn hello_registers_peer_without_reply() {
        let cfg = Config::default();
        let (mut c, metrics) = coordinator(&cfg);
        let t0 = Instant::now();
        let peer_addr = addr("10.0.0.1:1307");

        deliver(&mut c, Message::hello(7), peer_addr, t0);

        let record = c.registry.get(7).expect("registered");
        assert_eq!(record.addr, peer_addr);
        assert!(record.is_up());
        assert_eq!(record.consecutive_failures, 0);
        assert!(c.transport.sent.is_empty());
        assert_eq!(metrics.peers_tracked.get(), 1);
        assert_eq!(metrics.peers_live.get(), 1);
    }

    #[test]
    fn silent_peer_goes_down_and_response_revives_it() {
        let cfg = Config::default();
        let (mut c, metrics) = coordinator(&cfg);
        let t0 = Instant::now();
        let peer_addr = addr("10.0.0.1:1307");

        deliver(&mut c, Message::hello(7), peer_addr, t0);

        // Three silent keepalive intervals, one request each.
        let mut now = t0;
        for expected_failures in 1..=3u32 {
            now += Duration::from_millis(270);
            c.tick(now, false);
            let record = c.registry.get(7).expect("tracked");
            if expected_failures < 3 {
                assert!(record.is_up());
                assert_eq!(record.consecutive_failures, expected_failures);
            }
        }

        // The third unanswered request crosses the threshold.
        let record = c.registry.get(7).expect("tracked");
        assert!(!record.is_up());
        assert_eq!(record.consecutive_failures, 0);
        assert_eq!(metrics.peer_down_transitions.get(), 1);
        assert_eq!(metrics.peers_live.get(), 0);
        assert_eq!(c.transport.sent.len(), 3);
        for (dst, payload) in &c.transport.sent {
            assert_eq!(*dst, peer_addr);
            let message = Message::decode(payload).expect("sent frame decodes");
            assert_eq!(message.header, Header::Request);
        }

        // Down peers are left alone by the sweep.
        now += Duration::from_millis(270);
        c.tick(now, false);
        assert_eq!(c.transport.sent.len(), 3);

        // A late RESPONSE from the same address brings the peer back.
        now += Duration::from_millis(10);
        deliver(&mut c, Message::response(), peer_addr, now);
        let record = c.registry.get(7).expect("tracked");
        assert!(record.is_up());
        assert_eq!(record.consecutive_failures, 0);
        assert_eq!(metrics.peers_live.get(), 1);
    }

    #[test]
    fn ping_fires_probe_and_pong_completes_it() {
        let cfg = Config::default();
        let (mut c, metrics) = coordinator(&cfg);
        let t0 = Instant::now();
        let peer_addr = addr("192.168.1.20:1306");

        deliver(&mut c, Message::hello(3), peer_addr, t0);

        // Past the widest possible ping interval the timer must have fired.
        let fire_at = t0 + Duration::from_millis(2600);
        c.tick(fire_at, false);

        let (dst, payload) = &c.transport.sent[0];
        assert_eq!(*dst, peer_addr);
        let ping = Message::decode(payload).expect("ping decodes");
        assert_eq!(ping.header, Header::Ping);
        let token = ping.payload_str().expect("ascii token").to_owned();
        assert_eq!(token.len(), PING_TOKEN_LEN);
        assert!(token.bytes().all(|b| b.is_ascii_alphanumeric()));
        assert!(c.probe.awaiting());
        assert_eq!(metrics.pings_sent.get(), 1);

        // The keepalive sweep also ran this tick; only the ping and the
        // request may have been sent.
        assert_eq!(c.transport.sent.len(), 2);

        deliver(
            &mut c,
            Message::pong(4, token.as_bytes()),
            peer_addr,
            fire_at + Duration::from_millis(42),
        );

        assert!(!c.probe.awaiting());
        assert_eq!(metrics.rtt_seconds.get_sample_count(), 1);
        assert!((metrics.rtt_seconds.get_sample_sum() - 0.042).abs() < 1e-9);
        let record = c.registry.get(3).expect("tracked");
        assert!(record.is_up());
        assert_eq!(record.consecutive_failures, 0);
    }

    #[test]
    fn stray_pong_is_counted_but_still_revives_sender() {
        let cfg = Config::default();
        let (mut c, metrics) = coordinator(&cfg);
        let t0 = Instant::now();
        let peer_addr = addr("10.0.0.9:1306");

        deliver(&mut c, Message::hello(9), peer_addr, t0);
        c.registry.find_by_addr_mut(peer_addr).expect("tracked").consecutive_failures = 2;

        deliver(
            &mut c,
            Message::pong(1, b"notatoken"),
            peer_addr,
            t0 + Duration::from_millis(5),
        );

        assert_eq!(metrics.stray_pongs.get(), 1);
        assert_eq!(metrics.rtt_seconds.get_sample_count(), 0);
        let record = c.registry.get(9).expect("tracked");
        assert_eq!(record.consecutive_failures, 0);
    }

    #[test]
    fn hello_revives_downed_peer() {
        let cfg = Config::default();
        let (mut c, _) = coordinator(&cfg);
        let t0 = Instant::now();
        let peer_addr = addr("10.0.0.2:1306");

        deliver(&mut c, Message::hello(2), peer_addr, t0);
        c.registry.find_by_addr_mut(peer_addr).expect("tracked").mark_down();

        let later = t0 + Duration::from_millis(50);
        deliver(&mut c, Message::hello(2), peer_addr, later);

        let record = c.registry.get(2).expect("tracked");
        assert!(record.is_up());
        assert_eq!(record.last_probe_time, later);
    }

    #[test]
    fn never_answers_pings_or_requests() {
        let cfg = Config::default();
        let (mut c, _) = coordinator(&cfg);
        let t0 = Instant::now();
        let peer_addr = addr("10.0.0.3:1306");

        deliver(&mut c, Message::hello(3), peer_addr, t0);
        deliver(
            &mut c,
            Message::ping("abcdefghijklm"),
            peer_addr,
            t0 + Duration::from_millis(1),
        );
        deliver(
            &mut c,
            Message::request(),
            peer_addr,
            t0 + Duration::from_millis(2),
        );

        assert!(c.transport.sent.is_empty());
    }

    #[test]
    fn hello_is_dropped_when_registry_is_full() {
        let cfg = Config::from_toml_str("[registry]\nmax_peers = 1\n").expect("config");
        let (mut c, metrics) = coordinator(&cfg);
        let t0 = Instant::now();

        deliver(&mut c, Message::hello(1), addr("10.0.0.1:1306"), t0);
        deliver(
            &mut c,
            Message::hello(2),
            addr("10.0.0.2:1306"),
            t0 + Duration::from_millis(1),
        );

        assert_eq!(c.registry.len(), 1);
        assert!(c.registry.get(2).is_none());
        assert_eq!(metrics.registry_full_drops.get(), 1);
    }

    #[test]
    fn consumes_at_most_one_datagram_per_tick() {
        let cfg = Config::default();
        let (mut c, _) = coordinator(&cfg);
        let t0 = Instant::now();

        c.transport
            .push_inbound(Message::hello(1).encode(), addr("10.0.0.1:1306"));
        c.transport
            .push_inbound(Message::hello(2).encode(), addr("10.0.0.2:1306"));

        c.tick(t0, true);
        assert_eq!(c.registry.len(), 1);

        c.tick(t0 + Duration::from_millis(1), true);
        assert_eq!(c.registry.len(), 2);
    }

    #[test]
    fn malformed_datagrams_are_dropped_without_state_change() {
        let cfg = Config::default();
        let (mut c, metrics) = coordinator(&cfg);
        let t0 = Instant::now();
        let from = addr("10.0.0.1:1306");

        c.transport.push_inbound(&b"zoops"[..], from);
        c.tick(t0, true);
        c.transport.push_inbound(&b""[..], from);
        c.tick(t0 + Duration::from_millis(1), true);
        deliver(
            &mut c,
            Message::new(Header::Hello, &b"seven"[..]),
            from,
            t0 + Duration::from_millis(2),
        );

        assert!(c.registry.is_empty());
        assert_eq!(metrics.parse_failures.get(), 3);
        assert!(c.transport.sent.is_empty());
    }

    #[test]
    fn ping_timer_redraws_even_with_no_live_peers() {
        let cfg = Config::default();
        let (mut c, metrics) = coordinator(&cfg);
        let t0 = Instant::now();

        c.tick(t0, false);
        let first = c.next_ping_at.expect("scheduled");

        let fire_at = first + Duration::from_millis(1);
        c.tick(fire_at, false);

        let redrawn = c.next_ping_at.expect("rescheduled");
        assert!(redrawn > fire_at);
        assert!(c.transport.sent.is_empty());
        assert_eq!(metrics.pings_sent.get(), 0);
    }

    #[test]
    fn full_registry_hello_still_revives_tracked_sender() {
        let cfg = Config::from_toml_str("[registry]\nmax_peers = 1\n").expect("config");
        let (mut c, metrics) = coordinator(&cfg);
        let t0 = Instant::now();
        let peer_addr = addr("10.0.0.1:1306");

        deliver(&mut c, Message::hello(1), peer_addr, t0);
        let record = c.registry.find_by_addr_mut(peer_addr).expect("tracked");
        record.mark_down();

        // A new id from the same address is dropped for capacity, but the
        // sender is a tracked peer and its HELLO still proves it alive.
        let later = t0 + Duration::from_millis(500);
        deliver(&mut c, Message::hello(2), peer_addr, later);

        assert_eq!(c.registry.len(), 1);
        assert_eq!(metrics.registry_full_drops.get(), 1);
        let record = c.registry.get(1).expect("tracked");
        assert!(record.is_up());
        assert_eq!(record.consecutive_failures, 0);
        assert_eq!(record.last_probe_time, later);
        assert_eq!(metrics.peers_live.get(), 1);
    }

    #[test]
    fn failed_request_send_still_counts_the_probe() {
        let cfg = Config::default();
        let (mut c, metrics) = coordinator(&cfg);
        let t0 = Instant::now();
        let peer_addr = addr("10.0.0.1:1307");

        deliver(&mut c, Message::hello(7), peer_addr, t0);
        c.transport.fail_send = true;

        // The counter reads "probes attempted", so a peer behind a broken
        // socket still crosses the threshold on schedule.
        let mut now = t0;
        for expected_failures in 1..=2u32 {
            now += Duration::from_millis(270);
            c.tick(now, false);
            let record = c.registry.get(7).expect("tracked");
            assert!(record.is_up());
            assert_eq!(record.consecutive_failures, expected_failures);
        }
        now += Duration::from_millis(270);
        c.tick(now, false);

        let record = c.registry.get(7).expect("tracked");
        assert!(!record.is_up());
        assert_eq!(record.consecutive_failures, 0);
        assert!(c.transport.sent.is_empty(), "every send errored");
        assert_eq!(metrics.send_failures.get(), 3);
        assert_eq!(metrics.keepalive_requests.get(), 3);
        assert_eq!(metrics.datagrams_tx.get(), 0);
    }

    #[test]
    fn receive_failure_is_survived() {
        let cfg = Config::default();
        let (mut c, _) = coordinator(&cfg);
        let t0 = Instant::now();
        let peer_addr = addr("10.0.0.1:1307");

        c.transport.fail_recv = true;
        c.transport.push_inbound(Message::hello(7).encode(), peer_addr);
        c.tick(t0, true);
        assert!(c.registry.is_empty(), "errored receive consumed nothing");

        // The datagram is still queued once the socket recovers.
        c.transport.fail_recv = false;
        c.tick(t0 + Duration::from_millis(1), true);
        assert!(c.registry.get(7).expect("registered").is_up());
    }

    #[test]
    fn run_stops_when_poll_fails() {
        let cfg = Config::default();
        let (mut c, _) = coordinator(&cfg);
        c.transport.fail_poll = true;

        let err = c.run().expect_err("poll failure is fatal");
        assert!(matches!(err, LoopError::Poll(TestTransportError::Poll)));
    }
}
