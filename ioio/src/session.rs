//! Board session: connection state machine and peripheral constructors.
//!
//! A session starts in `Init`. `wait_for_connect` opens the transport,
//! spawns the dispatcher and drives the handshake: the board announces
//! itself with ESTABLISH_CONNECTION, we answer with CHECK_INTERFACE and
//! the board's verdict moves the session to `Connected` or leaves it
//! `Incompatible`. A lost transport at any point is terminal (`Dead`).

use std::sync::Arc;
use std::thread::JoinHandle;

use ioio_protocol as proto;
use parking_lot::{Condvar, Mutex};

use crate::board::{capabilities, Capabilities, HardwareVersion};
use crate::error::{Error, Result};
use crate::link::outgoing::OutgoingChannel;
use crate::link::{incoming, Bus, SyncWaiter};
use crate::peripheral::{
    AnalogInput, CapSense, DigitalInput, DigitalOutput, DigitalOutputMode, IcspMaster,
    PulseInput, PwmOutput, Sequencer, SpiConfig, SpiMaster, TwiMaster, Uart,
};
use crate::resource::ResourceManager;
use crate::transport::Transport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Status {
    Init,
    Connected,
    Incompatible,
    Dead,
}

/// Version strings reported by the board during the handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versions {
    pub hardware: String,
    pub bootloader: String,
    pub firmware: String,
}

struct SharedState {
    status: Status,
    hello: Option<Hello>,
    caps: Option<&'static Capabilities>,
    interface_ok: Option<bool>,
    /// Set once the dispatcher has exited and every waiter is released.
    torn_down: bool,
}

#[derive(Clone)]
struct Hello {
    hardware: [u8; 8],
    bootloader: [u8; 8],
    firmware: [u8; 8],
    version: Option<HardwareVersion>,
}

/// Session-level state shared with the dispatcher thread. The dispatcher
/// only ever takes this lock for short signal updates and never while
/// holding any other lock.
pub(crate) struct Shared {
    state: Mutex<SharedState>,
    cond: Condvar,
}

impl Shared {
    fn new() -> Self {
        Self {
            state: Mutex::new(SharedState {
                status: Status::Init,
                hello: None,
                caps: None,
                interface_ok: None,
                torn_down: false,
            }),
            cond: Condvar::new(),
        }
    }

    /// Called by the dispatcher on ESTABLISH_CONNECTION. Returns the
    /// capability table when the hardware id is known.
    pub(crate) fn establish(
        &self,
        hardware: [u8; 8],
        bootloader: [u8; 8],
        firmware: [u8; 8],
    ) -> Option<&'static Capabilities> {
        let version = HardwareVersion::from_id(&hardware);
        let caps = version.map(capabilities);
        let mut state = self.state.lock();
        state.hello = Some(Hello {
            hardware,
            bootloader,
            firmware,
            version,
        });
        state.caps = caps;
        self.cond.notify_all();
        caps
    }

    pub(crate) fn interface_response(&self, supported: bool) {
        let mut state = self.state.lock();
        state.interface_ok = Some(supported);
        self.cond.notify_all();
    }

    /// Dispatcher exit: terminal state, everything signalled.
    pub(crate) fn mark_dead(&self) {
        let mut state = self.state.lock();
        state.status = Status::Dead;
        state.torn_down = true;
        self.cond.notify_all();
    }

    pub(crate) fn require_connected(&self) -> Result<&'static Capabilities> {
        let state = self.state.lock();
        match state.status {
            Status::Connected => Ok(state.caps.expect("connected without capabilities")),
            Status::Init => Err(Error::IllegalState("not connected yet".into())),
            Status::Incompatible => Err(Error::IllegalState("board is incompatible".into())),
            Status::Dead => Err(Error::ConnectionLost),
        }
    }

    fn wait_hello(&self) -> Result<Hello> {
        let mut state = self.state.lock();
        loop {
            if let Some(hello) = &state.hello {
                return Ok(hello.clone());
            }
            if state.status == Status::Dead {
                return Err(Error::ConnectionLost);
            }
            self.cond.wait(&mut state);
        }
    }

    fn wait_interface(&self) -> Result<bool> {
        let mut state = self.state.lock();
        loop {
            if let Some(ok) = state.interface_ok {
                return Ok(ok);
            }
            if state.status == Status::Dead {
                return Err(Error::ConnectionLost);
            }
            self.cond.wait(&mut state);
        }
    }

    fn set_status(&self, status: Status) {
        let mut state = self.state.lock();
        // Dead is terminal.
        if state.status != Status::Dead {
            state.status = status;
        }
        self.cond.notify_all();
    }

    fn status(&self) -> Status {
        self.state.lock().status
    }
}

/// Everything the facades and the dispatcher share.
pub(crate) struct Core {
    pub outgoing: OutgoingChannel,
    pub bus: Bus,
    pub resources: ResourceManager,
    pub shared: Shared,
}

impl Core {
    pub(crate) fn caps(&self) -> Result<&'static Capabilities> {
        self.shared.require_connected()
    }
}

/// A driver session over one board.
///
/// All methods take `&self`; wrap the session in an [`Arc`] to use it from
/// several threads. Writes from one thread reach the wire in program
/// order; writes from different threads interleave at command boundaries.
pub struct Ioio {
    core: Arc<Core>,
    transport: Mutex<Box<dyn Transport>>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl Ioio {
    pub fn new(transport: Box<dyn Transport>) -> Self {
        Self {
            core: Arc::new(Core {
                outgoing: OutgoingChannel::new(),
                bus: Bus::new(),
                resources: ResourceManager::new(),
                shared: Shared::new(),
            }),
            transport: Mutex::new(transport),
            dispatcher: Mutex::new(None),
        }
    }

    /// Drives the session from `Init` to `Connected`.
    ///
    /// Blocks for the transport, the board's ESTABLISH_CONNECTION and the
    /// CHECK_INTERFACE verdict. An unknown board model or a rejected
    /// interface id leaves the session `Incompatible`; a transport failure
    /// leaves it `Dead`.
    pub fn wait_for_connect(&self) -> Result<()> {
        match self.core.shared.status() {
            Status::Init => {}
            Status::Connected => return Ok(()),
            Status::Incompatible => {
                return Err(Error::IllegalState("board is incompatible".into()))
            }
            Status::Dead => return Err(Error::ConnectionLost),
        }

        let duplex = match self.transport.lock().connect() {
            Ok(duplex) => duplex,
            Err(err) => {
                log::warn!("transport connect failed: {err}");
                self.core.shared.mark_dead();
                return Err(Error::ConnectionLost);
            }
        };
        self.core.outgoing.attach(duplex.writer);
        *self.dispatcher.lock() = Some(incoming::spawn(self.core.clone(), duplex.reader));

        let hello = self.core.shared.wait_hello()?;
        if hello.version.is_none() {
            self.core.shared.set_status(Status::Incompatible);
            let id = String::from_utf8_lossy(&hello.hardware).into_owned();
            log::warn!("unknown hardware id {id:?}");
            return Err(Error::Incompatible(format!("unknown hardware id {id:?}")));
        }

        self.core.outgoing.send_with(proto::encode_check_interface)?;
        if !self.core.shared.wait_interface()? {
            self.core.shared.set_status(Status::Incompatible);
            log::warn!("board rejected interface id");
            return Err(Error::Incompatible(
                "firmware does not implement IOIO0005".into(),
            ));
        }

        self.core.shared.set_status(Status::Connected);
        log::info!(
            "connected: hardware {} firmware {}",
            String::from_utf8_lossy(&hello.hardware),
            String::from_utf8_lossy(&hello.firmware),
        );
        Ok(())
    }

    /// Version ids captured at handshake.
    pub fn versions(&self) -> Result<Versions> {
        let state = self.core.shared.state.lock();
        match &state.hello {
            Some(hello) => Ok(Versions {
                hardware: String::from_utf8_lossy(&hello.hardware).into_owned(),
                bootloader: String::from_utf8_lossy(&hello.bootloader).into_owned(),
                firmware: String::from_utf8_lossy(&hello.firmware).into_owned(),
            }),
            None => Err(Error::IllegalState("not connected yet".into())),
        }
    }

    /// Tears the session down. Safe to call in any state and more than
    /// once. Waiters are released once the dispatcher observes the closed
    /// stream; use [`Ioio::wait_for_disconnect`] to wait for that.
    pub fn disconnect(&self) {
        if self.core.shared.status() == Status::Dead && self.state_torn_down() {
            return;
        }
        let mut transport = self.transport.lock();
        if transport.can_close() {
            transport.disconnect();
        } else {
            // The device drops the link when it sees SOFT_CLOSE.
            let _ = self.core.outgoing.send_with(proto::encode_soft_close);
        }
        self.core.outgoing.poison();
        self.core.shared.set_status(Status::Dead);
    }

    fn state_torn_down(&self) -> bool {
        self.core.shared.state.lock().torn_down
    }

    /// Blocks until the dispatcher has exited and all waiters are
    /// released.
    pub fn wait_for_disconnect(&self) {
        let mut state = self.core.shared.state.lock();
        while !state.torn_down {
            self.core.shared.cond.wait(&mut state);
        }
    }

    /// Asks the board to drop every open module while keeping the
    /// connection. Open facades observe this as an implicit close.
    pub fn soft_reset(&self) -> Result<()> {
        self.core.caps()?;
        self.core.outgoing.send_with(proto::encode_soft_reset)
    }

    /// Reboots the board. The connection will drop as a side effect.
    pub fn hard_reset(&self) -> Result<()> {
        self.core.caps()?;
        self.core.outgoing.send_with(proto::encode_hard_reset)
    }

    /// Round-trip barrier: returns once the board has processed every
    /// command this thread sent before the call.
    pub fn sync(&self) -> Result<()> {
        self.core.caps()?;
        let waiter = Arc::new(SyncWaiter::new());
        self.core.bus.push_sync(waiter.clone());
        if let Err(err) = self.core.outgoing.send_with(proto::encode_sync) {
            self.core.bus.fail_syncs();
            return Err(err);
        }
        waiter.wait()
    }

    /// Defers transport flushes until the matching [`Ioio::end_batch`],
    /// coalescing everything sent in between into one write.
    pub fn begin_batch(&self) {
        self.core.outgoing.begin_batch();
    }

    pub fn end_batch(&self) -> Result<()> {
        self.core.outgoing.end_batch()
    }

    pub fn open_digital_output(
        &self,
        pin: u8,
        mode: DigitalOutputMode,
        start_value: bool,
    ) -> Result<DigitalOutput> {
        DigitalOutput::open(self.core.clone(), pin, mode, start_value)
    }

    pub fn open_digital_input(&self, pin: u8, pull: proto::PullMode) -> Result<DigitalInput> {
        DigitalInput::open(self.core.clone(), pin, pull)
    }

    pub fn open_analog_input(&self, pin: u8) -> Result<AnalogInput> {
        AnalogInput::open(self.core.clone(), pin)
    }

    pub fn open_pwm_output(
        &self,
        pin: u8,
        mode: DigitalOutputMode,
        freq_hz: f32,
    ) -> Result<PwmOutput> {
        PwmOutput::open(self.core.clone(), pin, mode, freq_hz)
    }

    /// `rx`/`tx` may be `None` for a transmit- or receive-only UART.
    pub fn open_uart(
        &self,
        rx: Option<u8>,
        tx: Option<u8>,
        baud: u32,
        parity: proto::Parity,
        two_stop_bits: bool,
    ) -> Result<Uart> {
        Uart::open(self.core.clone(), rx, tx, baud, parity, two_stop_bits)
    }

    pub fn open_spi_master(
        &self,
        miso: u8,
        mosi: u8,
        clk: u8,
        slave_select: &[u8],
        config: SpiConfig,
    ) -> Result<SpiMaster> {
        SpiMaster::open(self.core.clone(), miso, mosi, clk, slave_select, config)
    }

    /// `module` names one of the board's fixed TWI pin pairs.
    pub fn open_twi_master(
        &self,
        module: u8,
        rate: proto::TwiRate,
        smbus_levels: bool,
    ) -> Result<TwiMaster> {
        TwiMaster::open(self.core.clone(), module, rate, smbus_levels)
    }

    pub fn open_icsp_master(&self) -> Result<IcspMaster> {
        IcspMaster::open(self.core.clone())
    }

    pub fn open_pulse_input(
        &self,
        pin: u8,
        mode: proto::IncapMode,
        clock: proto::IncapClock,
        double_precision: bool,
    ) -> Result<PulseInput> {
        PulseInput::open(self.core.clone(), pin, mode, clock, double_precision)
    }

    pub fn open_capsense(&self, pin: u8) -> Result<CapSense> {
        CapSense::open(self.core.clone(), pin)
    }

    /// `config` is the per-channel configuration block (at most 68 bytes);
    /// its length fixes the cue size for [`Sequencer::push`].
    pub fn open_sequencer(&self, config: &[u8]) -> Result<Sequencer> {
        Sequencer::open(self.core.clone(), config)
    }
}

impl Drop for Ioio {
    fn drop(&mut self) {
        self.disconnect();
        if let Some(handle) = self.dispatcher.lock().take() {
            let _ = handle.join();
        }
    }
}
