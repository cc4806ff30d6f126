//! SPI bus master.
//!
//! Transactions are strictly ordered per module: the nth SPI_DATA event
//! always answers the nth outstanding request, so pending requests live in
//! a FIFO and the request is put on the wire while the queue lock is held.

use std::collections::VecDeque;
use std::sync::Arc;

use ioio_protocol as proto;
use proto::{PullMode, SpiPinMode, SpiRate};

use super::{FlowControl, Lifecycle, Monitor, ReplySlot};
use crate::error::{Error, Result};
use crate::link::{Listener, Notice, Update};
use crate::resource::{Request, ResourceId, ResourceKind};
use crate::session::Core;

#[derive(Debug, Clone, Copy)]
pub struct SpiConfig {
    pub rate: SpiRate,
    /// Sample MISO on the trailing clock edge.
    pub sample_on_trailing: bool,
    /// Idle the clock high instead of low.
    pub invert_clk: bool,
}

impl SpiConfig {
    pub fn new(rate: SpiRate) -> Self {
        Self {
            rate,
            sample_on_trailing: true,
            invert_clk: false,
        }
    }
}

struct SpiState {
    pending: Monitor<VecDeque<Arc<ReplySlot>>>,
    flow: FlowControl,
}

impl SpiState {
    /// Moves to a final state, failing every pending transaction. Returns
    /// false when the state had already left `Open`.
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

impl Listener for SpiState {
    fn update(&self, update: Update<'_>) {
        match update {
            Update::SpiData { ss_pin: _, data } => {
                let head = self.pending.lock().data.pop_front();
                match head {
                    Some(slot) => slot.complete(Ok(data.to_vec())),
                    None => log::warn!("SPI response with no pending request"),
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

/// An SPI master with a fixed set of slave-select pins.
pub struct SpiMaster {
    core: Arc<Core>,
    state: Arc<SpiState>,
    keys: Vec<ResourceId>,
    spi: u8,
    miso: u8,
    mosi: u8,
    clk: u8,
    ss_pins: Vec<u8>,
}

impl SpiMaster {
    pub(crate) fn open(
        core: Arc<Core>,
        miso: u8,
        mosi: u8,
        clk: u8,
        slave_select: &[u8],
        config: SpiConfig,
    ) -> Result<Self> {
        let caps = core.caps()?;
        if !caps.peripheral_in_pins.contains(&miso) {
            return Err(Error::IllegalArgument(format!(
                "pin {miso} cannot be a peripheral input"
            )));
        }
        for pin in [mosi, clk] {
            if !caps.peripheral_out_pins.contains(&pin) {
                return Err(Error::IllegalArgument(format!(
                    "pin {pin} cannot be a peripheral output"
                )));
            }
        }
        if slave_select.is_empty() {
            return Err(Error::IllegalArgument("no slave-select pins".into()));
        }

        let mut requests = vec![
            Request::Pooled(ResourceKind::Spi),
            Request::Fixed(ResourceKind::Pin, miso),
            Request::Fixed(ResourceKind::Pin, mosi),
            Request::Fixed(ResourceKind::Pin, clk),
        ];
        requests.extend(
            slave_select
                .iter()
                .map(|&pin| Request::Fixed(ResourceKind::Pin, pin)),
        );
        let keys = core.resources.alloc(&requests)?;
        let spi = keys[0].id;

        let state = Arc::new(SpiState {
            pending: Monitor::new(VecDeque::new()),
            flow: FlowControl::new(caps.spi_tx_buffer),
        });
        core.bus.register(keys[0], state.clone());

        let sent = core.outgoing.batch(|| {
            core.outgoing
                .send_with(|out| proto::encode_set_pin_digital_in(miso, PullMode::Floating, out))?;
            core.outgoing
                .send_with(|out| proto::encode_set_pin_spi(miso, spi, SpiPinMode::Miso, out))?;
            core.outgoing
                .send_with(|out| proto::encode_set_pin_digital_out(mosi, false, true, out))?;
            core.outgoing
                .send_with(|out| proto::encode_set_pin_spi(mosi, spi, SpiPinMode::Mosi, out))?;
            core.outgoing.send_with(|out| {
                proto::encode_set_pin_digital_out(clk, false, config.invert_clk, out)
            })?;
            core.outgoing
                .send_with(|out| proto::encode_set_pin_spi(clk, spi, SpiPinMode::Clk, out))?;
            for &pin in slave_select {
                // Slave selects idle deasserted (high).
                core.outgoing
                    .send_with(|out| proto::encode_set_pin_digital_out(pin, false, true, out))?;
            }
            core.outgoing.send_with(|out| {
                proto::encode_spi_configure_master(
                    spi,
                    config.rate,
                    config.sample_on_trailing,
                    config.invert_clk,
                    out,
                )
            })
        });
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
            spi,
            miso,
            mosi,
            clk,
            ss_pins: slave_select.to_vec(),
        })
    }

    /// Runs one transaction against `slave` (an index into the
    /// slave-select pins given at open).
    ///
    /// The transaction clocks `total` bytes: `write` is transmitted (then
    /// zero padding), and the final `read.len()` bytes of the slave's
    /// output come back into `read`.
    pub fn write_read(
        &self,
        slave: usize,
        write: &[u8],
        total: usize,
        read: &mut [u8],
    ) -> Result<()> {
        let ss_pin = *self
            .ss_pins
            .get(slave)
            .ok_or_else(|| Error::IllegalArgument(format!("no slave {slave}")))?;
        if total == 0 || total > proto::MAX_SPI_TOTAL {
            return Err(Error::IllegalArgument(format!(
                "transaction size {total} outside 1..={}",
                proto::MAX_SPI_TOTAL
            )));
        }
        if write.len() > total || read.len() > total {
            return Err(Error::IllegalArgument(
                "write/read sizes exceed the transaction size".into(),
            ));
        }

        self.state.flow.acquire(total)?;
        let slot = Arc::new(ReplySlot::new());
        {
            let mut guard = self.state.pending.lock();
            guard.life.check()?;
            guard.data.push_back(slot.clone());
            // Sent under the queue lock so wire order equals FIFO order.
            let sent = self.core.outgoing.send_with(|out| {
                proto::encode_spi_master_request(self.spi, ss_pin, write, total, read.len(), out)
            });
            if let Err(err) = sent {
                guard.data.pop_back();
                return Err(err);
            }
        }

        let data = slot.wait()?;
        let n = read.len().min(data.len());
        read[..n].copy_from_slice(&data[..n]);
        Ok(())
    }

    pub fn close(self) -> Result<()> {
        self.close_inner()
    }

    fn close_inner(&self) -> Result<()> {
        if !self.state.shutdown(Lifecycle::Closed) {
            return Ok(());
        }
        self.core.bus.unregister(self.keys[0]);
        let result = self.core.outgoing.batch(|| {
            self.core
                .outgoing
                .send_with(|out| proto::encode_spi_close(self.spi, out))?;
            for pin in [self.miso, self.mosi, self.clk]
                .into_iter()
                .chain(self.ss_pins.iter().copied())
            {
                self.core.outgoing.send_with(|out| {
                    proto::encode_set_pin_digital_in(pin, PullMode::Floating, out)
                })?;
            }
            Ok(())
        });
        for &key in &self.keys {
            self.core.resources.free(key);
        }
        result
    }
}

impl Drop for SpiMaster {
    fn drop(&mut self) {
        let _ = self.close_inner();
    }
}
