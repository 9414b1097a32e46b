//! UDP radio bridge — receives radio frames forwarded over UDP.
//!
//! The transceiver itself is driven by a packet forwarder that writes
//! each received frame as one datagram. The socket is non-blocking so
//! `has_data` is a cheap poll from the ingest loop.

use std::io;
use std::net::{SocketAddr, UdpSocket};

use anyhow::{Context, Result};

use loragate_services::Radio;

pub struct UdpRadio {
    socket: UdpSocket,
}

impl UdpRadio {
    pub fn bind(addr: &str) -> Result<Self> {
        let socket =
            UdpSocket::bind(addr).with_context(|| format!("failed to bind radio socket {addr}"))?;
        socket
            .set_nonblocking(true)
            .context("failed to make radio socket non-blocking")?;
        Ok(Self { socket })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}

impl Radio for UdpRadio {
    fn has_data(&mut self) -> bool {
        let mut probe = [0u8; 1];
        match self.socket.peek_from(&mut probe) {
            Ok(_) => true,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => false,
            // Let read() surface the error.
            Err(_) => true,
        }
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let (len, from) = self.socket.recv_from(buf)?;
        tracing::trace!(%from, len, "radio frame");
        Ok(len)
    }
}
