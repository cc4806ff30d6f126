//! ICSP master for programming a target PIC.
//!
//! SIX instructions stream through the firmware's ICSP buffer under flow
//! control; REGOUT reads come back as VISI register values in request
//! order.

use std::collections::VecDeque;
use std::sync::Arc;

use ioio_protocol as proto;

use super::{FlowControl, Lifecycle, Monitor};
use crate::error::Result;
use crate::link::{Listener, Notice, Update};
use crate::resource::{Request, ResourceId, ResourceKind};
use crate::session::Core;

/// Bytes of ICSP buffer one SIX instruction occupies.
const SIX_COST: usize = 4;

struct IcspState {
    visi: Monitor<VecDeque<u16>>,
    flow: FlowControl,
}

impl Listener for IcspState {
    fn update(&self, update: Update<'_>) {
        match update {
            Update::IcspResult(visi) => self.visi.update(|queue| queue.push_back(visi)),
            Update::TxStatus(remaining) => self.flow.report(remaining),
            _ => {}
        }
    }

    fn notice(&self, notice: Notice) {
        let life = Lifecycle::from_notice(notice);
        self.visi.terminate(life);
        self.flow.terminate(life);
    }
}

pub struct IcspMaster {
    core: Arc<Core>,
    state: Arc<IcspState>,
    keys: Vec<ResourceId>,
}

impl IcspMaster {
    pub(crate) fn open(core: Arc<Core>) -> Result<Self> {
        let caps = core.caps()?;
        let (pgc, pgd, mclr) = caps.icsp_pins;
        let keys = core.resources.alloc(&[
            Request::Fixed(ResourceKind::Icsp, 0),
            Request::Fixed(ResourceKind::Pin, pgc),
            Request::Fixed(ResourceKind::Pin, pgd),
            Request::Fixed(ResourceKind::Pin, mclr),
        ])?;
        let state = Arc::new(IcspState {
            visi: Monitor::new(VecDeque::new()),
            flow: FlowControl::new(caps.icsp_tx_buffer),
        });
        core.bus.register(keys[0], state.clone());

        let sent = core
            .outgoing
            .send_with(|out| proto::encode_icsp_config(true, out));
        if let Err(err) = sent {
            core.bus.unregister(keys[0]);
            for &key in &keys {
                core.resources.free(key);
            }
            return Err(err);
        }
        Ok(Self { core, state, keys })
    }

    /// Puts the target into programming mode.
    pub fn enter_programming(&self) -> Result<()> {
        self.state.visi.check_open()?;
        self.core
            .outgoing
            .send_with(proto::encode_icsp_prog_enter)
    }

    pub fn exit_programming(&self) -> Result<()> {
        self.state.visi.check_open()?;
        self.core.outgoing.send_with(proto::encode_icsp_prog_exit)
    }

    /// Executes a 24-bit instruction on the target.
    pub fn six(&self, instruction: u32) -> Result<()> {
        self.state.flow.acquire(SIX_COST)?;
        self.core
            .outgoing
            .send_with(|out| proto::encode_icsp_six(instruction, out))
    }

    /// Requests the target's VISI register and blocks for the result.
    pub fn regout(&self) -> Result<u16> {
        self.state.visi.check_open()?;
        self.core.outgoing.send_with(proto::encode_icsp_regout)?;
        self.state.visi.wait_for(|queue| queue.pop_front())
    }

    /// Cancels a blocked [`IcspMaster::regout`].
    pub fn interrupt(&self) {
        self.state.visi.interrupt();
        self.state.flow.interrupt();
    }

    pub fn close(self) -> Result<()> {
        self.close_inner()
    }

    fn close_inner(&self) -> Result<()> {
        if !self.state.visi.begin_close() {
            return Ok(());
        }
        self.state.flow.terminate(Lifecycle::Closed);
        self.core.bus.unregister(self.keys[0]);
        let result = self
            .core
            .outgoing
            .send_with(|out| proto::encode_icsp_config(false, out));
        for &key in &self.keys {
            self.core.resources.free(key);
        }
        result
    }
}

impl Drop for IcspMaster {
    fn drop(&mut self) {
        let _ = self.close_inner();
    }
}
