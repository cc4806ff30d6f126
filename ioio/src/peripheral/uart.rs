//! UART master.
//!
//! Received bytes queue up per module until the application drains them.
//! Transmission is metered by the firmware's TX buffer reports and chunked
//! at the 64-byte wire limit.

use std::collections::VecDeque;
use std::sync::Arc;

use ioio_protocol as proto;
use proto::{Parity, PullMode};

use super::{FlowControl, Lifecycle, Monitor};
use crate::error::{Error, Result};
use crate::link::{Listener, Notice, Update};
use crate::resource::{Request, ResourceId, ResourceKind};
use crate::session::Core;

struct UartState {
    rx: Monitor<VecDeque<u8>>,
    flow: FlowControl,
}

impl Listener for UartState {
    fn update(&self, update: Update<'_>) {
        match update {
            Update::UartData(data) => self.rx.update(|queue| queue.extend(data)),
            Update::TxStatus(remaining) => self.flow.report(remaining),
            _ => {}
        }
    }

    fn notice(&self, notice: Notice) {
        let life = Lifecycle::from_notice(notice);
        self.rx.terminate(life);
        self.flow.terminate(life);
    }
}

/// A UART with optional RX and TX sides.
///
/// [`Uart::read`] and [`Uart::write`] take `&self`; use
/// [`Uart::reader`]/[`Uart::writer`] for handles implementing
/// [`std::io::Read`] and [`std::io::Write`].
pub struct Uart {
    core: Arc<Core>,
    state: Arc<UartState>,
    key: ResourceId,
    uart: u8,
    rx_pin: Option<u8>,
    tx_pin: Option<u8>,
}

impl Uart {
    pub(crate) fn open(
        core: Arc<Core>,
        rx: Option<u8>,
        tx: Option<u8>,
        baud: u32,
        parity: Parity,
        two_stop_bits: bool,
    ) -> Result<Self> {
        let caps = core.caps()?;
        if rx.is_none() && tx.is_none() {
            return Err(Error::IllegalArgument("UART needs at least one pin".into()));
        }
        if let Some(pin) = rx {
            if !caps.peripheral_in_pins.contains(&pin) {
                return Err(Error::IllegalArgument(format!(
                    "pin {pin} cannot be a peripheral input"
                )));
            }
        }
        if let Some(pin) = tx {
            if !caps.peripheral_out_pins.contains(&pin) {
                return Err(Error::IllegalArgument(format!(
                    "pin {pin} cannot be a peripheral output"
                )));
            }
        }
        let (rate, speed4x) = baud_divisor(baud)?;

        let mut requests = vec![Request::Pooled(ResourceKind::Uart)];
        requests.extend(rx.map(|pin| Request::Fixed(ResourceKind::Pin, pin)));
        requests.extend(tx.map(|pin| Request::Fixed(ResourceKind::Pin, pin)));
        let keys = core.resources.alloc(&requests)?;
        let key = keys[0];
        let uart = key.id;

        let state = Arc::new(UartState {
            rx: Monitor::new(VecDeque::new()),
            flow: FlowControl::new(caps.uart_tx_buffer),
        });
        core.bus.register(key, state.clone());

        let sent = core.outgoing.batch(|| {
            if let Some(pin) = rx {
                core.outgoing
                    .send_with(|out| proto::encode_set_pin_digital_in(pin, PullMode::Floating, out))?;
                core.outgoing
                    .send_with(|out| proto::encode_set_pin_uart(pin, uart, false, true, out))?;
            }
            if let Some(pin) = tx {
                // TX idles high.
                core.outgoing
                    .send_with(|out| proto::encode_set_pin_digital_out(pin, false, true, out))?;
                core.outgoing
                    .send_with(|out| proto::encode_set_pin_uart(pin, uart, true, true, out))?;
            }
            core.outgoing.send_with(|out| {
                proto::encode_uart_config(uart, rate, speed4x, two_stop_bits, parity, out)
            })
        });
        if let Err(err) = sent {
            core.bus.unregister(key);
            for &k in &keys {
                core.resources.free(k);
            }
            return Err(err);
        }
        Ok(Self {
            core,
            state,
            key,
            uart,
            rx_pin: rx,
            tx_pin: tx,
        })
    }

    /// Reads at least one byte, blocking while the queue is empty. After a
    /// close or soft reset a drained queue reads as end-of-stream (0).
    pub fn read(&self, buf: &mut [u8]) -> Result<usize> {
        read_some(&self.state, buf)
    }

    /// Writes the whole buffer, blocking on TX credit as needed.
    pub fn write(&self, data: &[u8]) -> Result<()> {
        write_all(&self.core, &self.state, self.uart, data)
    }

    pub fn reader(&self) -> UartReader {
        UartReader {
            state: self.state.clone(),
        }
    }

    pub fn writer(&self) -> UartWriter {
        UartWriter {
            core: self.core.clone(),
            state: self.state.clone(),
            uart: self.uart,
        }
    }

    /// Cancels blocked reads and writes with
    /// [`Error::Interrupted`](crate::Error::Interrupted).
    pub fn interrupt(&self) {
        self.state.rx.interrupt();
        self.state.flow.interrupt();
    }

    pub fn close(self) -> Result<()> {
        self.close_inner()
    }

    fn close_inner(&self) -> Result<()> {
        if !self.state.rx.begin_close() {
            return Ok(());
        }
        self.state.flow.terminate(Lifecycle::Closed);
        self.core.bus.unregister(self.key);
        let result = self.core.outgoing.batch(|| {
            self.core
                .outgoing
                .send_with(|out| proto::encode_uart_close(self.uart, out))?;
            for pin in [self.rx_pin, self.tx_pin].into_iter().flatten() {
                self.core.outgoing.send_with(|out| {
                    proto::encode_set_pin_digital_in(pin, PullMode::Floating, out)
                })?;
            }
            Ok(())
        });
        self.core.resources.free(self.key);
        for pin in [self.rx_pin, self.tx_pin].into_iter().flatten() {
            self.core
                .resources
                .free(ResourceId::new(ResourceKind::Pin, pin));
        }
        result
    }
}

impl Drop for Uart {
    fn drop(&mut self) {
        let _ = self.close_inner();
    }
}

fn read_some(state: &UartState, buf: &mut [u8]) -> Result<usize> {
    if buf.is_empty() {
        return Ok(0);
    }
    let mut guard = state.rx.lock();
    let gen = guard.gen;
    loop {
        if !guard.data.is_empty() {
            let n = buf.len().min(guard.data.len());
            for slot in buf.iter_mut().take(n) {
                *slot = guard.data.pop_front().unwrap();
            }
            return Ok(n);
        }
        match guard.life {
            Lifecycle::Open => {}
            Lifecycle::Closed | Lifecycle::SoftReset => return Ok(0),
            Lifecycle::Disconnected => return Err(Error::ConnectionLost),
        }
        if guard.gen != gen {
            return Err(Error::Interrupted);
        }
        state.rx.wait(&mut guard);
    }
}

fn write_all(core: &Core, state: &UartState, uart: u8, data: &[u8]) -> Result<()> {
    let mut rest = data;
    while !rest.is_empty() {
        let want = rest.len().min(proto::MAX_UART_DATA);
        let taken = state.flow.acquire_up_to(want)?;
        core.outgoing
            .send_with(|out| proto::encode_uart_data(uart, &rest[..taken], out))?;
        rest = &rest[taken..];
    }
    Ok(())
}

/// [`std::io::Read`] adapter over the RX queue.
pub struct UartReader {
    state: Arc<UartState>,
}

impl std::io::Read for UartReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        read_some(&self.state, buf).map_err(Into::into)
    }
}

/// [`std::io::Write`] adapter gated by TX flow control.
pub struct UartWriter {
    core: Arc<Core>,
    state: Arc<UartState>,
    uart: u8,
}

impl std::io::Write for UartWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        write_all(&self.core, &self.state, self.uart, buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Picks the 4x divisor when it fits 16 bits, the 1x divisor otherwise.
fn baud_divisor(baud: u32) -> Result<(u16, bool)> {
    if baud == 0 {
        return Err(Error::IllegalArgument("baud rate 0".into()));
    }
    let rate4x = (4_000_000.0 / baud as f32).round() as i64 - 1;
    if rate4x <= 0xFFFF {
        return Ok((rate4x.max(0) as u16, true));
    }
    let rate1x = (1_000_000.0 / baud as f32).round() as i64 - 1;
    if rate1x <= 0xFFFF {
        return Ok((rate1x as u16, false));
    }
    Err(Error::IllegalArgument(format!("baud rate {baud} too low")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn divisor_prefers_4x() {
        assert_eq!(baud_divisor(38_400).unwrap(), (103, true));
        assert_eq!(baud_divisor(115_200).unwrap(), (34, true));
        // 50 baud overflows the 4x divisor.
        assert_eq!(baud_divisor(50).unwrap(), (19_999, false));
        assert!(baud_divisor(10).is_err());
        assert!(baud_divisor(0).is_err());
    }
}
