// Transport seam between the event loops and the datagram socket.
// Numan Thabit 2026

use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use thiserror::Error;

/// One received datagram together with its sender address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datagram {
    pub bytes: Bytes,
    pub from: SocketAddr,
}

/// Datagram transport as seen by the coordinator and responder loops.
///
/// Implementations never block except in [`Transport::poll_readable`],
/// whose timeout bounds the loops' reaction latency.
pub trait Transport {
    /// Error type returned by the transport.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Waits up to `timeout` for the socket to become readable.
    ///
    /// A failure here is the one fatal condition for the loop driving the
    /// transport; every other transport error is logged and survived.
    fn poll_readable(&mut self, timeout: Duration) -> Result<bool, Self::Error>;

    /// Sends one datagram, fire-and-forget.
    fn send_to(&mut self, payload: Bytes, dst: SocketAddr) -> Result<(), Self::Error>;

    /// Receives at most one datagram. `None` when nothing is queued.
    fn recv_one(&mut self) -> Result<Option<Datagram>, Self::Error>;
}

/// Fatal event-loop failure.
#[derive(Debug, Error)]
pub enum LoopError<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    /// The readiness poll itself failed; the loop cannot continue.
    #[error("readiness poll failed: {0}")]
    Poll(#[source] E),
}
