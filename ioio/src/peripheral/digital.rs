//! Digital output and input pins.

use std::sync::Arc;

use ioio_protocol as proto;
use proto::PullMode;

use super::{Lifecycle, Monitor, PlainState};
use crate::error::Result;
use crate::link::{Listener, Notice, Update};
use crate::resource::{Request, ResourceId, ResourceKind};
use crate::session::Core;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DigitalOutputMode {
    #[default]
    Normal,
    OpenDrain,
}

impl DigitalOutputMode {
    pub(crate) fn is_open_drain(self) -> bool {
        matches!(self, DigitalOutputMode::OpenDrain)
    }
}

/// A pin driven by the host. Closing it reverts the pin to a floating
/// input.
pub struct DigitalOutput {
    core: Arc<Core>,
    state: Arc<PlainState>,
    key: ResourceId,
    pin: u8,
}

impl std::fmt::Debug for DigitalOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DigitalOutput")
            .field("key", &self.key)
            .field("pin", &self.pin)
            .finish()
    }
}

impl DigitalOutput {
    pub(crate) fn open(
        core: Arc<Core>,
        pin: u8,
        mode: DigitalOutputMode,
        start_value: bool,
    ) -> Result<Self> {
        core.caps()?;
        let key = core.resources.alloc(&[Request::Fixed(ResourceKind::Pin, pin)])?[0];
        let state = Arc::new(PlainState::new());
        core.bus.register(key, state.clone());

        let sent = core.outgoing.send_with(|out| {
            proto::encode_set_pin_digital_out(pin, mode.is_open_drain(), start_value, out)
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

    pub fn write(&self, value: bool) -> Result<()> {
        self.state.0.check_open()?;
        self.core
            .outgoing
            .send_with(|out| proto::encode_set_digital_out_level(self.pin, value, out))
    }

    pub fn close(self) -> Result<()> {
        self.close_inner()
    }

    fn close_inner(&self) -> Result<()> {
        if !self.state.0.begin_close() {
            return Ok(());
        }
        self.core.bus.unregister(self.key);
        let result = self.core.outgoing.send_with(|out| {
            proto::encode_set_pin_digital_in(self.pin, PullMode::Floating, out)
        });
        self.core.resources.free(self.key);
        result
    }
}

impl Drop for DigitalOutput {
    fn drop(&mut self) {
        let _ = self.close_inner();
    }
}

#[derive(Default)]
struct InputData {
    level: bool,
    /// False until the first report for this pin arrives.
    initialized: bool,
}

struct InputState {
    monitor: Monitor<InputData>,
}

impl Listener for InputState {
    fn update(&self, update: Update<'_>) {
        if let Update::DigitalIn(level) = update {
            self.monitor.update(|data| {
                data.level = level;
                data.initialized = true;
            });
        }
    }

    fn notice(&self, notice: Notice) {
        self.monitor.terminate(Lifecycle::from_notice(notice));
    }
}

/// A pin sampled by the board. Change notifications keep [`read`] and
/// [`wait_for_value`] current.
///
/// [`read`]: DigitalInput::read
/// [`wait_for_value`]: DigitalInput::wait_for_value
pub struct DigitalInput {
    core: Arc<Core>,
    state: Arc<InputState>,
    key: ResourceId,
    pin: u8,
}

impl std::fmt::Debug for DigitalInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DigitalInput")
            .field("key", &self.key)
            .field("pin", &self.pin)
            .finish()
    }
}

impl DigitalInput {
    pub(crate) fn open(core: Arc<Core>, pin: u8, pull: PullMode) -> Result<Self> {
        core.caps()?;
        let key = core.resources.alloc(&[Request::Fixed(ResourceKind::Pin, pin)])?[0];
        let state = Arc::new(InputState {
            monitor: Monitor::new(InputData::default()),
        });
        core.bus.register(key, state.clone());

        let sent = core.outgoing.batch(|| {
            core.outgoing
                .send_with(|out| proto::encode_set_pin_digital_in(pin, pull, out))?;
            core.outgoing
                .send_with(|out| proto::encode_set_change_notify(pin, true, out))
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

    /// Last sampled level; blocks until the first report arrives.
    pub fn read(&self) -> Result<bool> {
        self.state
            .monitor
            .wait_for(|data| data.initialized.then_some(data.level))
    }

    /// Blocks until the sampled level equals `level`.
    pub fn wait_for_value(&self, level: bool) -> Result<()> {
        self.state
            .monitor
            .wait_for(|data| (data.initialized && data.level == level).then_some(()))
    }

    /// Cancels blocked `read`/`wait_for_value` calls with
    /// [`Error::Interrupted`](crate::Error::Interrupted).
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
        let result = self.core.outgoing.batch(|| {
            self.core
                .outgoing
                .send_with(|out| proto::encode_set_change_notify(self.pin, false, out))?;
            self.core.outgoing.send_with(|out| {
                proto::encode_set_pin_digital_in(self.pin, PullMode::Floating, out)
            })
        });
        self.core.resources.free(self.key);
        result
    }
}

impl Drop for DigitalInput {
    fn drop(&mut self) {
        let _ = self.close_inner();
    }
}
