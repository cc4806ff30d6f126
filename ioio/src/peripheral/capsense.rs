//! Capacitive sensing.

use std::sync::Arc;

use ioio_protocol as proto;
use proto::PullMode;

use super::{Lifecycle, Monitor};
use crate::error::{Error, Result};
use crate::link::{Listener, Notice, Update};
use crate::resource::{Request, ResourceId, ResourceKind};
use crate::session::Core;

struct CapSenseState {
    reading: Monitor<Option<u16>>,
}

impl Listener for CapSenseState {
    fn update(&self, update: Update<'_>) {
        if let Update::CapSense(value) = update {
            self.reading.update(|reading| *reading = Some(value));
        }
    }

    fn notice(&self, notice: Notice) {
        self.reading.terminate(Lifecycle::from_notice(notice));
    }
}

/// A capacitance reading on one of the touch-capable pins.
pub struct CapSense {
    core: Arc<Core>,
    state: Arc<CapSenseState>,
    key: ResourceId,
    pin: u8,
}

impl CapSense {
    pub(crate) fn open(core: Arc<Core>, pin: u8) -> Result<Self> {
        let caps = core.caps()?;
        if !caps.capsense_pins.contains(&pin) {
            return Err(Error::IllegalArgument(format!(
                "pin {pin} cannot do capacitive sensing"
            )));
        }
        let key = core.resources.alloc(&[Request::Fixed(ResourceKind::Pin, pin)])?[0];
        let state = Arc::new(CapSenseState {
            reading: Monitor::new(None),
        });
        core.bus.register(key, state.clone());

        let sent = core.outgoing.batch(|| {
            core.outgoing
                .send_with(|out| proto::encode_set_pin_capsense(pin, out))?;
            core.outgoing
                .send_with(|out| proto::encode_set_capsense_sampling(pin, true, out))
        });
        if let Err(err) = sent {
            core.bus.unregister(key);
            core.resources.free(key);
            return Err(err);
        }
        Ok(Self {
            core,
            state,
            key,
            pin,
        })
    }

    pub fn pin(&self) -> u8 {
        self.pin
    }

    /// Latest raw 10-bit reading; blocks until the first report.
    pub fn read_raw(&self) -> Result<u16> {
        self.state.reading.wait_for(|reading| *reading)
    }

    /// Latest reading as a unitless capacitance estimate.
    pub fn read(&self) -> Result<f32> {
        Ok(f32::from(self.read_raw()?))
    }

    pub fn interrupt(&self) {
        self.state.reading.interrupt();
    }

    pub fn close(self) -> Result<()> {
        self.close_inner()
    }

    fn close_inner(&self) -> Result<()> {
        if !self.state.reading.begin_close() {
            return Ok(());
        }
        self.core.bus.unregister(self.key);
        let result = self.core.outgoing.batch(|| {
            self.core
                .outgoing
                .send_with(|out| proto::encode_set_capsense_sampling(self.pin, false, out))?;
            self.core.outgoing.send_with(|out| {
                proto::encode_set_pin_digital_in(self.pin, PullMode::Floating, out)
            })
        });
        self.core.resources.free(self.key);
        result
    }
}

impl Drop for CapSense {
    fn drop(&mut self) {
        let _ = self.close_inner();
    }
}
