//! Transport abstraction.
//!
//! A transport hands the session a connected duplex byte stream. The
//! session owns the streams afterwards: the dispatcher thread reads, the
//! outgoing channel writes. `disconnect` must unblock a reader stuck in
//! `read` so the dispatcher can exit.

use std::io::{Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};

/// The two halves of a connected link.
pub struct Duplex {
    pub reader: Box<dyn Read + Send>,
    pub writer: Box<dyn Write + Send>,
}

pub trait Transport: Send {
    /// Blocks until the physical link is up and returns its streams.
    fn connect(&mut self) -> std::io::Result<Duplex>;

    /// Tears the link down, unblocking any pending read.
    fn disconnect(&mut self);

    /// Whether the host side may tear the link down itself. When false the
    /// session sends SOFT_CLOSE on the wire instead and lets the board
    /// drop the link.
    fn can_close(&self) -> bool {
        true
    }
}

/// TCP transport, typically to a network-attached board or an emulator.
pub struct TcpTransport {
    addr: String,
    stream: Option<TcpStream>,
}

impl TcpTransport {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            stream: None,
        }
    }
}

impl Transport for TcpTransport {
    fn connect(&mut self) -> std::io::Result<Duplex> {
        let addr = self
            .addr
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, "no address"))?;
        let stream = TcpStream::connect(addr)?;
        // Commands are tiny; batching already coalesces them.
        stream.set_nodelay(true)?;
        let reader = stream.try_clone()?;
        let writer = stream.try_clone()?;
        self.stream = Some(stream);
        log::debug!("connected to {}", self.addr);
        Ok(Duplex {
            reader: Box::new(reader),
            writer: Box::new(writer),
        })
    }

    fn disconnect(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
        }
    }
}
