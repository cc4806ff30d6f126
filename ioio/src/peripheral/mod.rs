//! Peripheral facades and their per-resource state.
//!
//! Every facade owns a state object registered on the event bus under its
//! resource descriptor. The dispatcher thread calls into that state with
//! decoded updates; application threads block on the state's condition
//! variable. Handlers never block and never touch session-level locks.
//!
//! Waits are released by (in order of precedence) the awaited data, the
//! resource leaving its open state (close, soft reset, disconnect), or an
//! explicit interrupt.

pub mod analog;
pub mod capsense;
pub mod digital;
mod flow;
pub mod icsp;
pub mod incap;
pub mod pwm;
pub mod sequencer;
pub mod spi;
pub mod twi;
pub mod uart;

pub use analog::AnalogInput;
pub use capsense::CapSense;
pub use digital::{DigitalInput, DigitalOutput, DigitalOutputMode};
pub use icsp::IcspMaster;
pub use incap::PulseInput;
pub use pwm::PwmOutput;
pub use sequencer::Sequencer;
pub use spi::{SpiConfig, SpiMaster};
pub use twi::TwiMaster;
pub use uart::{Uart, UartReader, UartWriter};

use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::error::{Error, Result};
use crate::link::{Listener, Notice, Update};

/// Where a resource is in its life. Everything except `Open` is final.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Lifecycle {
    Open,
    /// Closed by its owner.
    Closed,
    /// Implicitly closed because the board wiped its modules.
    SoftReset,
    Disconnected,
}

impl Lifecycle {
    pub(crate) fn check(self) -> Result<()> {
        match self {
            Lifecycle::Open => Ok(()),
            Lifecycle::Closed => Err(Error::IllegalState("resource is closed".into())),
            Lifecycle::SoftReset => Err(Error::IllegalState(
                "resource was released by a soft reset".into(),
            )),
            Lifecycle::Disconnected => Err(Error::ConnectionLost),
        }
    }

    pub(crate) fn from_notice(notice: Notice) -> Self {
        match notice {
            Notice::SoftReset => Lifecycle::SoftReset,
            Notice::Disconnected => Lifecycle::Disconnected,
        }
    }
}

pub(crate) struct Guarded<T> {
    pub life: Lifecycle,
    pub gen: u64,
    pub data: T,
}

/// Mutex + condvar around one resource's data, with the lifecycle and
/// interrupt bookkeeping every peripheral needs.
pub(crate) struct Monitor<T> {
    inner: Mutex<Guarded<T>>,
    cond: Condvar,
}

impl<T> Monitor<T> {
    pub fn new(data: T) -> Self {
        Self {
            inner: Mutex::new(Guarded {
                life: Lifecycle::Open,
                gen: 0,
                data,
            }),
            cond: Condvar::new(),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, Guarded<T>> {
        self.inner.lock()
    }

    pub fn wait(&self, guard: &mut MutexGuard<'_, Guarded<T>>) {
        self.cond.wait(guard);
    }

    pub fn notify_all(&self) {
        self.cond.notify_all();
    }

    /// Mutates the data and wakes every waiter. Dispatcher-side entry.
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        let mut guard = self.inner.lock();
        f(&mut guard.data);
        self.cond.notify_all();
    }

    /// Moves an open resource to a final state and wakes every waiter.
    pub fn terminate(&self, life: Lifecycle) {
        let mut guard = self.inner.lock();
        if guard.life == Lifecycle::Open {
            guard.life = life;
            self.cond.notify_all();
        }
    }

    /// Claims the close transition. False when the resource already left
    /// `Open` (double close, soft reset, disconnect) and the caller must
    /// not touch the wire or the pools.
    pub fn begin_close(&self) -> bool {
        let mut guard = self.inner.lock();
        if guard.life != Lifecycle::Open {
            return false;
        }
        guard.life = Lifecycle::Closed;
        self.cond.notify_all();
        true
    }

    /// Cancels current waiters; they fail with [`Error::Interrupted`].
    pub fn interrupt(&self) {
        let mut guard = self.inner.lock();
        guard.gen += 1;
        self.cond.notify_all();
    }

    pub fn check_open(&self) -> Result<()> {
        self.inner.lock().life.check()
    }

    /// Blocks until `ready` yields a value. Data that is already present
    /// is delivered even if the resource has since left `Open`.
    pub fn wait_for<R>(&self, mut ready: impl FnMut(&mut T) -> Option<R>) -> Result<R> {
        let mut guard = self.inner.lock();
        let gen = guard.gen;
        loop {
            if let Some(value) = ready(&mut guard.data) {
                return Ok(value);
            }
            guard.life.check()?;
            if guard.gen != gen {
                return Err(Error::Interrupted);
            }
            self.cond.wait(&mut guard);
        }
    }
}

pub(crate) use flow::FlowControl;

/// One-shot completion for request/response peripherals (SPI, TWI).
/// Responses are matched to requests strictly in FIFO order, so a slot is
/// completed exactly once, by whoever pops it off the pending queue.
pub(crate) struct ReplySlot {
    state: Mutex<Option<Result<Vec<u8>>>>,
    cond: Condvar,
}

impl ReplySlot {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(None),
            cond: Condvar::new(),
        }
    }

    pub fn complete(&self, result: Result<Vec<u8>>) {
        let mut state = self.state.lock();
        if state.is_none() {
            *state = Some(result);
            self.cond.notify_all();
        }
    }

    pub fn wait(&self) -> Result<Vec<u8>> {
        let mut state = self.state.lock();
        while state.is_none() {
            self.cond.wait(&mut state);
        }
        state.clone().unwrap()
    }
}

/// State for pins that produce no events (outputs). Registered on the bus
/// anyway so lifecycle notices reach the facade.
pub(crate) struct PlainState(pub Monitor<()>);

impl PlainState {
    pub fn new() -> Self {
        Self(Monitor::new(()))
    }
}

impl Listener for PlainState {
    fn update(&self, _update: Update<'_>) {}

    fn notice(&self, notice: Notice) {
        self.0.terminate(Lifecycle::from_notice(notice));
    }
}
