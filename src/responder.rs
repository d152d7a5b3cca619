// responder.rs - the watched end: announce, echo probes, answer keepalives
// Numan Thabit 2026

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, warn};

use crate::api::{Datagram, LoopError, Transport};
use crate::config::Config;
use crate::wire::{Header, Message};

/// The responder role: announces itself to one coordinator and answers
/// whatever probes arrive.
///
/// Mirror image of the coordinator loop with the policy stripped out. The
/// responder keeps no registry; every PING is echoed and every REQUEST is
/// answered, addressed to the datagram's sender rather than the configured
/// coordinator so a rebound coordinator socket still gets its reply.
pub struct Responder<T, R = StdRng>
where
    T: Transport,
    R: Rng,
{
    transport: T,
    id: u32,
    coordinator: SocketAddr,
    hello_interval: Duration,
    poll_timeout: Duration,
    next_hello_at: Option<Instant>,
    rng: R,
}

impl<T: Transport> Responder<T> {
    pub fn new(transport: T, cfg: &Config, id: u32, coordinator: SocketAddr) -> Self {
        Self::with_rng(transport, cfg, id, coordinator, StdRng::from_entropy())
    }
}

impl<T, R> Responder<T, R>
where
    T: Transport,
    R: Rng,
{
    /// Builds a responder with a caller-supplied RNG, which draws the
    /// status digit prefixed to each PONG.
    pub fn with_rng(
        transport: T,
        cfg: &Config,
        id: u32,
        coordinator: SocketAddr,
        rng: R,
    ) -> Self {
        Self {
            transport,
            id,
            coordinator,
            hello_interval: cfg.hello.interval(),
            poll_timeout: cfg.net.poll_timeout(),
            next_hello_at: None,
            rng,
        }
    }

    /// Drives the loop until the readiness poll fails.
    pub fn run(&mut self) -> Result<(), LoopError<T::Error>> {
        info!(
            id = self.id,
            coordinator = %self.coordinator,
            hello_interval_ms = self.hello_interval.as_millis() as u64,
            "responder loop running"
        );
        loop {
            let readable = self
                .transport
                .poll_readable(self.poll_timeout)
                .map_err(LoopError::Poll)?;
            self.tick(Instant::now(), readable);
        }
    }

    /// One loop iteration: announce if due, then consume at most one
    /// datagram. The first tick always announces.
    pub fn tick(&mut self, now: Instant, readable: bool) {
        self.run_hello_timer(now);
        if readable {
            self.receive_one();
        }
    }

    fn run_hello_timer(&mut self, now: Instant) {
        let due = match self.next_hello_at {
            None => true,
            Some(at) => now >= at,
        };
        if !due {
            return;
        }
        debug!(id = self.id, coordinator = %self.coordinator, "announcing");
        self.send(Message::hello(self.id), self.coordinator);
        self.next_hello_at = Some(now + self.hello_interval);
    }

    fn receive_one(&mut self) {
        match self.transport.recv_one() {
            Ok(Some(datagram)) => self.dispatch(datagram),
            Ok(None) => {}
            Err(err) => warn!(error = %err, "receive failed"),
        }
    }

    fn dispatch(&mut self, datagram: Datagram) {
        let Datagram { bytes, from } = datagram;
        let message = match Message::decode(&bytes) {
            Ok(message) => message,
            Err(err) => {
                warn!(from = %from, error = %err, "dropping undecodable datagram");
                return;
            }
        };
        match message.header {
            Header::Ping => {
                let digit = self.rng.gen_range(0..10u8);
                debug!(
                    from = %from,
                    digit,
                    token = %String::from_utf8_lossy(&message.payload),
                    "echoing probe"
                );
                self.send(Message::pong(digit, &message.payload), from);
            }
            Header::Request => {
                debug!(from = %from, "answering keepalive request");
                self.send(Message::response(), from);
            }
            other => debug!(from = %from, header = %other, "ignoring datagram"),
        }
    }

    fn send(&mut self, message: Message, dst: SocketAddr) {
        if let Err(err) = self.transport.send_to(message.encode(), dst) {
            warn!(dst = %dst, error = %err, "send failed");
        }
    }
}
