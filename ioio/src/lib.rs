//! Host-side driver for the IOIO I/O expansion board.
//!
//! The board hangs off a byte-oriented duplex stream (USB accessory,
//! Bluetooth RFCOMM or TCP) and exposes its pins and peripheral modules as
//! virtual resources. This crate multiplexes any number of open resources
//! over the single stream: a session speaks the binary command/event
//! protocol from [`ioio_protocol`], allocates pins and modules out of the
//! board's capability table, and hands the application typed facades.
//!
//! ```text
//!  application threads                    dispatcher thread
//!  ┌───────────────┐                      ┌───────────────┐
//!  │ DigitalOutput │─┐                 ┌──│  event bus    │
//!  │ AnalogInput   │ │  ┌───────────┐  │  └───────┬───────┘
//!  │ Uart, Spi, …  │ ├─►│ outgoing  │  │          ▼
//!  └───────────────┘ │  │ channel   │  │  per-resource state
//!        ▲           │  └─────┬─────┘  │  (queues, condvars)
//!        └── open_* ─┘        ▼        │
//!  ┌───────────────┐      transport ───┘
//!  │     Ioio      │   (duplex stream)
//!  └───────────────┘
//! ```
//!
//! Blocking model: everything is plain threads and locks. Writers share
//! the outgoing channel; exactly one dispatcher thread reads. Blocking
//! calls wake on their data, on disconnect/soft reset, or when explicitly
//! interrupted.
//!
//! ```no_run
//! use ioio::{Ioio, TcpTransport};
//! use ioio::peripheral::DigitalOutputMode;
//!
//! fn main() -> Result<(), ioio::Error> {
//!     let ioio = Ioio::new(Box::new(TcpTransport::new("192.168.0.5:4545")));
//!     ioio.wait_for_connect()?;
//!     let led = ioio.open_digital_output(0, DigitalOutputMode::Normal, false)?;
//!     led.write(true)?;
//!     ioio.sync()?;
//!     Ok(())
//! }
//! ```

pub mod board;
mod error;
mod link;
pub mod peripheral;
mod resource;
mod session;
pub mod transport;

pub use error::{Error, Result};
pub use session::{Ioio, Versions};
pub use transport::{Duplex, TcpTransport, Transport};

// Wire-level configuration enums reused by the facade APIs.
pub use ioio_protocol::{
    IncapClock, IncapMode, Parity, PullMode, SequencerEventKind, SpiRate, TwiRate,
};
