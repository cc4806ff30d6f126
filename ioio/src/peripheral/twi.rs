//! TWI (I2C) bus master.
//!
//! Like SPI, responses are matched to requests in FIFO order per module.
//! A slave that does not acknowledge surfaces as
//! [`Error::TransactionAborted`](crate::Error::TransactionAborted) rather
//! than as data.

use std::collections::VecDeque;
use std::sync::Arc;

use ioio_protocol as proto;
use proto::TwiRate;

use super::{FlowControl, Lifecycle, Monitor, ReplySlot};
use crate::error::{Error, Result};
use crate::link::{Listener, Notice, Update};
use crate::resource::{Request, ResourceId, ResourceKind};
use crate::session::Core;

struct TwiState {
    pending: Monitor<VecDeque<Arc<ReplySlot>>>,
    flow: FlowControl,
}

impl TwiState {
    fn shutdown(&self, life: Lifecycle) -> bool {
        let (was_open, drained): (bool, Vec<_>) = {
            let mut guard = self.pending.lock();
            let was_open = guard.life == Lifecycle::Open;
            if was_open {
                guard.life = life;
            }
            let drained = guard.data.drain(..).collect();
            self.pending.notify_all();
            (was_open, drained)
        };
        let err = life.check().expect_err("shutdown to a final state");
        for slot in drained {
            slot.complete(Err(err.clone()));
        }
        self.flow.terminate(life);
        was_open
    }
}

impl Listener for TwiState {
    fn update(&self, update: Update<'_>) {
        match update {
            Update::TwiReply(reply) => {
                let head = self.pending.lock().data.pop_front();
                match head {
                    Some(slot) => slot.complete(match reply {
                        Some(data) => Ok(data.to_vec()),
                        None => Err(Error::TransactionAborted),
                    }),
                    None => log::warn!("TWI result with no pending request"),
                }
            }
            Update::TxStatus(remaining) => self.flow.report(remaining),
            _ => {}
        }
    }

    fn notice(&self, notice: Notice) {
        self.shutdown(Lifecycle::from_notice(notice));
    }
}

/// A TWI master on one of the board's fixed pin pairs.
pub struct TwiMaster {
    core: Arc<Core>,
    state: Arc<TwiState>,
    keys: Vec<ResourceId>,
    twi: u8,
}

impl TwiMaster {
    pub(crate) fn open(
        core: Arc<Core>,
        module: u8,
        rate: TwiRate,
        smbus_levels: bool,
    ) -> Result<Self> {
        let caps = core.caps()?;
        let Some(&(sda, scl)) = caps.twi_pins.get(module as usize) else {
            return Err(Error::IllegalArgument(format!("no TWI module {module}")));
        };

        let keys = core.resources.alloc(&[
            Request::Fixed(ResourceKind::Twi, module),
            Request::Fixed(ResourceKind::Pin, sda),
            Request::Fixed(ResourceKind::Pin, scl),
        ])?;
        let state = Arc::new(TwiState {
            pending: Monitor::new(VecDeque::new()),
            flow: FlowControl::new(caps.twi_tx_buffer),
        });
        core.bus.register(keys[0], state.clone());

        let sent = core
            .outgoing
            .send_with(|out| proto::encode_i2c_configure_master(module, rate, smbus_levels, out));
        if let Err(err) = sent {
            core.bus.unregister(keys[0]);
            for &key in &keys {
                core.resources.free(key);
            }
            return Err(err);
        }
        Ok(Self {
            core,
            state,
            keys,
            twi: module,
        })
    }

    /// Writes `write` to `address`, then reads `read.len()` bytes, as one
    /// bus transaction. Returns the number of bytes read.
    pub fn write_read(
        &self,
        address: u16,
        ten_bit_addr: bool,
        write: &[u8],
        read: &mut [u8],
    ) -> Result<usize> {
        if write.len() > proto::MAX_I2C_WRITE || read.len() > proto::MAX_I2C_WRITE {
            return Err(Error::IllegalArgument(format!(
                "write/read sizes exceed {} bytes",
                proto::MAX_I2C_WRITE
            )));
        }
        let max_addr = if ten_bit_addr { 0x3FF } else { 0x7F };
        if address > max_addr {
            return Err(Error::IllegalArgument(format!(
                "address {address:#x} exceeds {max_addr:#x}"
            )));
        }

        self.state.flow.acquire(write.len())?;
        let slot = Arc::new(ReplySlot::new());
        {
            let mut guard = self.state.pending.lock();
            guard.life.check()?;
            guard.data.push_back(slot.clone());
            let sent = self.core.outgoing.send_with(|out| {
                proto::encode_i2c_write_read(self.twi, address, ten_bit_addr, read.len(), write, out)
            });
            if let Err(err) = sent {
                guard.data.pop_back();
                return Err(err);
            }
        }

        let data = slot.wait()?;
        let n = read.len().min(data.len());
        read[..n].copy_from_slice(&data[..n]);
        Ok(n)
    }

    pub fn close(self) -> Result<()> {
        self.close_inner()
    }

    fn close_inner(&self) -> Result<()> {
        if !self.state.shutdown(Lifecycle::Closed) {
            return Ok(());
        }
        self.core.bus.unregister(self.keys[0]);
        let result = self
            .core
            .outgoing
            .send_with(|out| proto::encode_i2c_close(self.twi, out));
        for &key in &self.keys {
            self.core.resources.free(key);
        }
        result
    }
}

impl Drop for TwiMaster {
    fn drop(&mut self) {
        let _ = self.close_inner();
    }
}
