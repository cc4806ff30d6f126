//! The two halves of the wire: the serialised outgoing channel and the
//! single-reader incoming dispatcher, glued together by an event bus keyed
//! by resource descriptor.
//!
//! The bus holds no back-references into facades; peripherals register a
//! listener when they open and unregister when they close, and the
//! dispatcher looks listeners up per event.

pub mod incoming;
pub mod outgoing;

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use ioio_protocol::SequencerEventKind;
use parking_lot::{Condvar, Mutex};

use crate::error::{Error, Result};
use crate::resource::ResourceId;

/// Lifecycle signal delivered to every registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    /// The board wiped all open modules; the session stays up. Descriptors
    /// have already been returned to the resource manager.
    SoftReset,
    /// The transport is gone; the session is terminal.
    Disconnected,
}

/// A decoded event routed to one resource's listener.
pub enum Update<'a> {
    DigitalIn(bool),
    /// Whether the pin is part of the board's analog sampling set, derived
    /// from format-frame membership changes.
    AnalogSampling(bool),
    AnalogIn(u16),
    /// Bytes remaining in the module's firmware TX buffer.
    TxStatus(u16),
    UartData(&'a [u8]),
    SpiData { ss_pin: u8, data: &'a [u8] },
    /// `None` means the slave aborted the transaction.
    TwiReply(Option<&'a [u8]>),
    IcspResult(u16),
    Incap(u32),
    CapSense(u16),
    Sequencer { kind: SequencerEventKind, slots: u8 },
}

/// Implemented by per-resource state objects. Handlers run on the
/// dispatcher thread and must not block.
pub trait Listener: Send + Sync {
    fn update(&self, update: Update<'_>);
    fn notice(&self, notice: Notice);
}

/// Central registry: one listener per open resource, plus the FIFO of
/// threads blocked in `sync`.
#[derive(Default)]
pub struct Bus {
    listeners: Mutex<HashMap<ResourceId, Arc<dyn Listener>>>,
    sync_queue: Mutex<VecDeque<Arc<SyncWaiter>>>,
}

impl Bus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, id: ResourceId, listener: Arc<dyn Listener>) {
        self.listeners.lock().insert(id, listener);
    }

    pub fn unregister(&self, id: ResourceId) {
        self.listeners.lock().remove(&id);
    }

    /// Routes `update` to the listener for `id`. Returns false when nobody
    /// is registered (stale event after a close; dropped silently).
    pub fn dispatch(&self, id: ResourceId, update: Update<'_>) -> bool {
        let listener = self.listeners.lock().get(&id).cloned();
        match listener {
            Some(listener) => {
                listener.update(update);
                true
            }
            None => {
                log::trace!("no listener for {id:?}");
                false
            }
        }
    }

    /// Delivers `notice` to every listener. Both notices imply the
    /// resources are closed, so the registry is cleared afterwards.
    pub fn broadcast(&self, notice: Notice) {
        let listeners: Vec<Arc<dyn Listener>> = {
            let mut map = self.listeners.lock();
            let all = map.values().cloned().collect();
            map.clear();
            all
        };
        for listener in listeners {
            listener.notice(notice);
        }
    }

    pub fn push_sync(&self, waiter: Arc<SyncWaiter>) {
        self.sync_queue.lock().push_back(waiter);
    }

    /// A SYNC echo always answers the oldest outstanding request.
    pub fn complete_sync(&self) {
        let head = self.sync_queue.lock().pop_front();
        match head {
            Some(waiter) => waiter.complete(Ok(())),
            None => log::warn!("unsolicited SYNC echo"),
        }
    }

    pub fn fail_syncs(&self) {
        let drained: Vec<_> = self.sync_queue.lock().drain(..).collect();
        for waiter in drained {
            waiter.complete(Err(Error::ConnectionLost));
        }
    }
}

/// One-shot completion used for SYNC round trips.
pub struct SyncWaiter {
    state: Mutex<Option<Result<()>>>,
    cond: Condvar,
}

impl SyncWaiter {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(None),
            cond: Condvar::new(),
        }
    }

    pub fn complete(&self, result: Result<()>) {
        let mut state = self.state.lock();
        if state.is_none() {
            *state = Some(result);
            self.cond.notify_all();
        }
    }

    pub fn wait(&self) -> Result<()> {
        let mut state = self.state.lock();
        while state.is_none() {
            self.cond.wait(&mut state);
        }
        state.clone().unwrap()
    }
}

impl Default for SyncWaiter {
    fn default() -> Self {
        Self::new()
    }
}
