//! Pulse and frequency measurement via the input-capture modules.

use std::collections::VecDeque;
use std::sync::Arc;

use ioio_protocol as proto;
use proto::{IncapClock, IncapMode, PullMode};

use super::{Lifecycle, Monitor};
use crate::error::{Error, Result};
use crate::link::{Listener, Notice, Update};
use crate::resource::{Request, ResourceId, ResourceKind};
use crate::session::Core;

/// Readings the host buffers before dropping the oldest.
const READING_BACKLOG: usize = 32;

struct IncapState {
    readings: Monitor<VecDeque<u32>>,
}

impl Listener for IncapState {
    fn update(&self, update: Update<'_>) {
        if let Update::Incap(value) = update {
            self.readings.update(|queue| {
                if queue.len() == READING_BACKLOG {
                    queue.pop_front();
                }
                queue.push_back(value);
            });
        }
    }

    fn notice(&self, notice: Notice) {
        self.readings.terminate(Lifecycle::from_notice(notice));
    }
}

/// Measures pulse widths or signal frequency on a pin.
pub struct PulseInput {
    core: Arc<Core>,
    state: Arc<IncapState>,
    keys: Vec<ResourceId>,
    pin: u8,
    incap: u8,
    mode: IncapMode,
    clock: IncapClock,
}

impl PulseInput {
    pub(crate) fn open(
        core: Arc<Core>,
        pin: u8,
        mode: IncapMode,
        clock: IncapClock,
        double_precision: bool,
    ) -> Result<Self> {
        let caps = core.caps()?;
        if !caps.peripheral_in_pins.contains(&pin) {
            return Err(Error::IllegalArgument(format!(
                "pin {pin} cannot be a peripheral input"
            )));
        }
        let kind = if double_precision {
            ResourceKind::IncapDouble
        } else {
            ResourceKind::IncapSingle
        };
        let keys = core
            .resources
            .alloc(&[Request::Pooled(kind), Request::Fixed(ResourceKind::Pin, pin)])?;
        let incap = keys[0].id;

        let state = Arc::new(IncapState {
            readings: Monitor::new(VecDeque::new()),
        });
        core.bus.register(keys[0], state.clone());

        let sent = core.outgoing.batch(|| {
            core.outgoing
                .send_with(|out| proto::encode_set_pin_digital_in(pin, PullMode::Floating, out))?;
            core.outgoing
                .send_with(|out| proto::encode_set_pin_incap(pin, incap, true, out))?;
            core.outgoing.send_with(|out| {
                proto::encode_incap_configure(incap, double_precision, mode, clock, out)
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
            pin,
            incap,
            mode,
            clock,
        })
    }

    pub fn pin(&self) -> u8 {
        self.pin
    }

    /// Next raw capture value, in ticks of the configured clock.
    pub fn wait_raw(&self) -> Result<u32> {
        self.state.readings.wait_for(|queue| queue.pop_front())
    }

    /// Next pulse duration in seconds. Only valid in the pulse modes.
    pub fn wait_pulse(&self) -> Result<f32> {
        match self.mode {
            IncapMode::PositivePulse | IncapMode::NegativePulse => {}
            _ => {
                return Err(Error::IllegalState(
                    "pulse duration requires a pulse mode".into(),
                ))
            }
        }
        Ok(self.wait_raw()? as f32 / self.clock.hertz() as f32)
    }

    /// Next frequency reading in hertz. Only valid in the frequency
    /// modes; the capture value spans 1, 4 or 16 periods of the input.
    pub fn wait_frequency(&self) -> Result<f32> {
        let scaling = match self.mode {
            IncapMode::Frequency => 1.0,
            IncapMode::FrequencyDiv4 => 4.0,
            IncapMode::FrequencyDiv16 => 16.0,
            _ => {
                return Err(Error::IllegalState(
                    "frequency requires a frequency mode".into(),
                ))
            }
        };
        let ticks = self.wait_raw()?;
        if ticks == 0 {
            return Err(Error::Protocol("zero-length capture".into()));
        }
        Ok(self.clock.hertz() as f32 * scaling / ticks as f32)
    }

    /// Cancels blocked waits.
    pub fn interrupt(&self) {
        self.state.readings.interrupt();
    }

    pub fn close(self) -> Result<()> {
        self.close_inner()
    }

    fn close_inner(&self) -> Result<()> {
        if !self.state.readings.begin_close() {
            return Ok(());
        }
        self.core.bus.unregister(self.keys[0]);
        let result = self.core.outgoing.batch(|| {
            self.core
                .outgoing
                .send_with(|out| proto::encode_incap_close(self.incap, out))?;
            self.core.outgoing.send_with(|out| {
                proto::encode_set_pin_digital_in(self.pin, PullMode::Floating, out)
            })
        });
        for &key in &self.keys {
            self.core.resources.free(key);
        }
        result
    }
}

impl Drop for PulseInput {
    fn drop(&mut self) {
        let _ = self.close_inner();
    }
}
