//! Analog input pins.
//!
//! The board streams samples for the set of pins enabled via
//! SET_ANALOG_IN_SAMPLING. Membership changes come back as format frames;
//! the dispatcher turns those into per-pin sampling on/off updates.

use std::sync::Arc;

use ioio_protocol as proto;

use super::{Lifecycle, Monitor};
use crate::error::{Error, Result};
use crate::link::{Listener, Notice, Update};
use crate::resource::{Request, ResourceId, ResourceKind};
use crate::session::Core;

#[derive(Default)]
struct AnalogData {
    /// Confirmed member of the board's sampling set.
    sampling: bool,
    value: Option<u16>,
}

struct AnalogState {
    monitor: Monitor<AnalogData>,
}

impl Listener for AnalogState {
    fn update(&self, update: Update<'_>) {
        match update {
            Update::AnalogSampling(on) => self.monitor.update(|data| data.sampling = on),
            Update::AnalogIn(value) => self.monitor.update(|data| data.value = Some(value)),
            _ => {}
        }
    }

    fn notice(&self, notice: Notice) {
        self.monitor.terminate(Lifecycle::from_notice(notice));
    }
}

/// A 10-bit analog input.
pub struct AnalogInput {
    core: Arc<Core>,
    state: Arc<AnalogState>,
    key: ResourceId,
    pin: u8,
    reference_voltage: f32,
}

impl std::fmt::Debug for AnalogInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalogInput")
            .field("key", &self.key)
            .field("pin", &self.pin)
            .field("reference_voltage", &self.reference_voltage)
            .finish()
    }
}

impl AnalogInput {
    pub(crate) fn open(core: Arc<Core>, pin: u8) -> Result<Self> {
        let caps = core.caps()?;
        if !caps.analog_pins.contains(&pin) {
            return Err(Error::IllegalArgument(format!(
                "pin {pin} is not analog-capable"
            )));
        }
        let key = core.resources.alloc(&[Request::Fixed(ResourceKind::Pin, pin)])?[0];
        let state = Arc::new(AnalogState {
            monitor: Monitor::new(AnalogData::default()),
        });
        core.bus.register(key, state.clone());

        let sent = core.outgoing.batch(|| {
            core.outgoing
                .send_with(|out| proto::encode_set_pin_analog_in(pin, out))?;
            core.outgoing
                .send_with(|out| proto::encode_set_analog_in_sampling(pin, true, out))
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
            reference_voltage: caps.reference_voltage,
        })
    }

    pub fn pin(&self) -> u8 {
        self.pin
    }

    /// Latest raw sample (0..=1023); blocks until the first one arrives.
    pub fn read_raw(&self) -> Result<u16> {
        self.state.monitor.wait_for(|data| data.value)
    }

    /// Latest sample scaled to 0.0..=1.0.
    pub fn read(&self) -> Result<f32> {
        Ok(f32::from(self.read_raw()?) / 1023.0)
    }

    /// Latest sample in volts, scaled by the board reference.
    pub fn voltage(&self) -> Result<f32> {
        Ok(self.read()? * self.reference_voltage)
    }

    /// Whether the board currently reports this pin in its sampling set.
    pub fn is_sampling(&self) -> bool {
        self.state.monitor.lock().data.sampling
    }

    /// Blocks until the board's sampling-set membership equals `sampling`.
    pub fn wait_sampling(&self, sampling: bool) -> Result<()> {
        self.state
            .monitor
            .wait_for(|data| (data.sampling == sampling).then_some(()))
    }

    pub fn interrupt(&self) {
        self.state.monitor.interrupt();
    }

    pub fn close(self) -> Result<()> {
        self.close_inner()
    }

    fn close_inner(&self) -> Result<()> {
        if !self.state.monitor.begin_close() {
            return Ok(());
        }
        self.core.bus.unregister(self.key);
        let result = self
            .core
            .outgoing
            .send_with(|out| proto::encode_set_analog_in_sampling(self.pin, false, out));
        self.core.resources.free(self.key);
        result
    }
}

impl Drop for AnalogInput {
    fn drop(&mut self) {
        let _ = self.close_inner();
    }
}
