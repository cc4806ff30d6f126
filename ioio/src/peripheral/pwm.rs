//! PWM outputs.
//!
//! A PWM output claims its pin plus an output-compare module. The period
//! is derived from the 16 MHz peripheral clock: the smallest prescaler
//! whose 16-bit period register can represent the requested frequency
//! wins, which maximises duty-cycle resolution.

use std::sync::Arc;

use ioio_protocol as proto;
use proto::{PullMode, TimerScale};

use super::{DigitalOutputMode, PlainState};
use crate::error::{Error, Result};
use crate::resource::{Request, ResourceId, ResourceKind};
use crate::session::Core;

const BASE_HZ: f32 = 16_000_000.0;

pub struct PwmOutput {
    core: Arc<Core>,
    state: Arc<PlainState>,
    pin_key: ResourceId,
    module_key: ResourceId,
    pin: u8,
    pwm_num: u8,
    scale: TimerScale,
    /// Period in prescaled ticks (the wire carries `period_ticks - 1`).
    period_ticks: u32,
}

impl PwmOutput {
    pub(crate) fn open(
        core: Arc<Core>,
        pin: u8,
        mode: DigitalOutputMode,
        freq_hz: f32,
    ) -> Result<Self> {
        let caps = core.caps()?;
        if !caps.peripheral_out_pins.contains(&pin) {
            return Err(Error::IllegalArgument(format!(
                "pin {pin} cannot drive peripheral output"
            )));
        }
        let (scale, period_ticks) = pick_scale(freq_hz)?;

        let keys = core.resources.alloc(&[
            Request::Fixed(ResourceKind::Pin, pin),
            Request::Pooled(ResourceKind::Outcompare),
        ])?;
        let (pin_key, module_key) = (keys[0], keys[1]);
        let pwm_num = module_key.id;
        let state = Arc::new(PlainState::new());
        core.bus.register(pin_key, state.clone());

        let sent = core.outgoing.batch(|| {
            core.outgoing.send_with(|out| {
                proto::encode_set_pin_digital_out(pin, mode.is_open_drain(), false, out)
            })?;
            core.outgoing
                .send_with(|out| proto::encode_set_pin_pwm(pin, pwm_num, true, out))?;
            core.outgoing.send_with(|out| {
                proto::encode_set_pwm_period(pwm_num, scale, (period_ticks - 1) as u16, out)
            })
        });
        if let Err(err) = sent {
            core.bus.unregister(pin_key);
            core.resources.free(pin_key);
            core.resources.free(module_key);
            return Err(err);
        }
        Ok(Self {
            core,
            state,
            pin_key,
            module_key,
            pin,
            pwm_num,
            scale,
            period_ticks,
        })
    }

    pub fn pin(&self) -> u8 {
        self.pin
    }

    /// Sets the high fraction of the period, 0.0..=1.0.
    pub fn set_duty_cycle(&self, duty: f32) -> Result<()> {
        if !(0.0..=1.0).contains(&duty) {
            return Err(Error::IllegalArgument(format!(
                "duty cycle {duty} outside 0..=1"
            )));
        }
        let quarter_ticks = (duty * self.period_ticks as f32 * 4.0).round() as u32;
        self.send_duty(quarter_ticks)
    }

    /// Sets the pulse width in microseconds, with quarter-tick
    /// resolution.
    pub fn set_pulse_width_us(&self, width_us: f32) -> Result<()> {
        if width_us < 0.0 {
            return Err(Error::IllegalArgument("negative pulse width".into()));
        }
        let ticks_per_us = BASE_HZ / self.scale.divisor() as f32 / 1_000_000.0;
        let quarter_ticks = (width_us * ticks_per_us * 4.0).round() as u32;
        if quarter_ticks > self.period_ticks * 4 {
            return Err(Error::IllegalArgument(format!(
                "pulse width {width_us} us exceeds the period"
            )));
        }
        self.send_duty(quarter_ticks)
    }

    fn send_duty(&self, quarter_ticks: u32) -> Result<()> {
        self.state.0.check_open()?;
        let duty = (quarter_ticks >> 2).min(self.period_ticks) as u16;
        let fraction = (quarter_ticks & 3) as u8;
        self.core
            .outgoing
            .send_with(|out| proto::encode_set_pwm_duty_cycle(self.pwm_num, duty, fraction, out))
    }

    pub fn close(self) -> Result<()> {
        self.close_inner()
    }

    fn close_inner(&self) -> Result<()> {
        if !self.state.0.begin_close() {
            return Ok(());
        }
        self.core.bus.unregister(self.pin_key);
        let result = self.core.outgoing.batch(|| {
            self.core
                .outgoing
                .send_with(|out| proto::encode_set_pin_pwm(self.pin, 0, false, out))?;
            self.core.outgoing.send_with(|out| {
                proto::encode_set_pin_digital_in(self.pin, PullMode::Floating, out)
            })
        });
        self.core.resources.free(self.pin_key);
        self.core.resources.free(self.module_key);
        result
    }
}

impl Drop for PwmOutput {
    fn drop(&mut self) {
        let _ = self.close_inner();
    }
}

/// Smallest prescaler whose period register can express `freq_hz`.
fn pick_scale(freq_hz: f32) -> Result<(TimerScale, u32)> {
    if !(freq_hz > 0.0) {
        return Err(Error::IllegalArgument(format!("bad frequency {freq_hz}")));
    }
    if freq_hz > BASE_HZ {
        return Err(Error::IllegalArgument(format!(
            "frequency {freq_hz} Hz is too high"
        )));
    }
    for scale in TimerScale::ALL {
        let ticks = (BASE_HZ / scale.divisor() as f32 / freq_hz).round() as u32;
        if ticks >= 1 && ticks <= 0x10000 {
            return Ok((scale, ticks));
        }
    }
    Err(Error::IllegalArgument(format!(
        "frequency {freq_hz} Hz is too low"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scale_selection() {
        assert_eq!(pick_scale(1000.0).unwrap(), (TimerScale::X1, 16_000));
        // 100 Hz needs 160k ticks: first fits at 8x.
        assert_eq!(pick_scale(100.0).unwrap(), (TimerScale::X8, 20_000));
        // 1 Hz: 16M ticks, fits at 256x.
        assert_eq!(pick_scale(1.0).unwrap(), (TimerScale::X256, 62_500));
        assert!(pick_scale(0.5).is_err());
        assert!(pick_scale(0.0).is_err());
        assert!(pick_scale(20_000_000.0).is_err());
    }
}
