// io/udp.rs - nonblocking UDP socket with poll(2) readiness
// Numan Thabit 2026

use std::io;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::os::fd::AsRawFd;
use std::time::Duration;

use bytes::Bytes;
use nix::poll::{poll, PollFd, PollFlags};
use socket2::{Domain, Protocol, Socket, Type};
use thiserror::Error;

use crate::api::{Datagram, Transport};

#[derive(Debug, Error)]
pub enum UdpError {
    /// Socket could not be created or bound.
    #[error("failed to bind udp socket on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    /// Plain socket IO failure.
    #[error("udp io error: {0}")]
    Io(#[from] io::Error),
}

/// Nonblocking UDP socket shared by both roles.
///
/// Readiness comes from `poll(2)` with a millisecond timeout; the receive
/// path pulls at most one datagram per call into the sized buffer.
#[derive(Debug)]
pub struct UdpTransport {
    socket: UdpSocket,
    recv_buf: Vec<u8>,
}

impl UdpTransport {
    /// Binds a nonblocking datagram socket on `local`.
    pub fn bind<A: ToSocketAddrs>(local: A, recv_buffer_bytes: usize) -> Result<Self, UdpError> {
        let local_addr = local
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "missing local address"))?;

        let domain = Domain::for_address(local_addr);
        let socket = Socket::new(domain, Type::DGRAM.nonblocking(), Some(Protocol::UDP)).map_err(
            |source| UdpError::Bind {
                addr: local_addr,
                source,
            },
        )?;
        socket
            .bind(&local_addr.into())
            .map_err(|source| UdpError::Bind {
                addr: local_addr,
                source,
            })?;

        Ok(Self {
            socket: socket.into(),
            recv_buf: vec![0u8; recv_buffer_bytes],
        })
    }

    /// Address the socket is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, UdpError> {
        Ok(self.socket.local_addr()?)
    }
}

impl Transport for UdpTransport {
    type Error = UdpError;

    fn poll_readable(&mut self, timeout: Duration) -> Result<bool, UdpError> {
        let mut fds = [PollFd::new(self.socket.as_raw_fd(), PollFlags::POLLIN)];
        let timeout_ms = i32::try_from(timeout.as_millis()).unwrap_or(i32::MAX);
        let ready = poll(&mut fds, timeout_ms)
            .map_err(|errno| io::Error::from_raw_os_error(errno as i32))?;
        if ready == 0 {
            return Ok(false);
        }
        // Error conditions count as readable so the recv path surfaces them
        // instead of the loop spinning on an instantly-ready poll.
        Ok(fds[0].revents().map_or(false, |events| {
            events.intersects(PollFlags::POLLIN | PollFlags::POLLERR | PollFlags::POLLHUP)
        }))
    }

    fn send_to(&mut self, payload: Bytes, dst: SocketAddr) -> Result<(), UdpError> {
        self.socket.send_to(&payload, dst)?;
        Ok(())
    }

    fn recv_one(&mut self) -> Result<Option<Datagram>, UdpError> {
        match self.socket.recv_from(&mut self.recv_buf) {
            Ok((len, from)) => Ok(Some(Datagram {
                bytes: Bytes::copy_from_slice(&self.recv_buf[..len]),
                from,
            })),
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(err) => Err(UdpError::Io(err)),
        }
    }
}
