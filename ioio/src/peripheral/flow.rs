//! Outbound flow control.
//!
//! The firmware buffers outgoing module data (UART TX, SPI and TWI
//! requests, ICSP instructions) and periodically reports how much buffer
//! space remains. The host keeps a local credit: writes consume it and
//! block when it runs out, TX status reports replace it. The credit never
//! exceeds the module's buffer size and never goes below zero.

use super::{Lifecycle, Monitor};
use crate::error::Result;

pub(crate) struct FlowControl {
    credit: Monitor<usize>,
}

impl FlowControl {
    pub fn new(capacity: usize) -> Self {
        Self {
            credit: Monitor::new(capacity),
        }
    }

    /// Takes between 1 and `want` bytes of credit, blocking while none is
    /// available. Used by byte-stream writers that may send partial
    /// chunks.
    pub fn acquire_up_to(&self, want: usize) -> Result<usize> {
        self.credit.wait_for(|credit| {
            if *credit == 0 {
                return None;
            }
            let taken = want.min(*credit);
            *credit -= taken;
            Some(taken)
        })
    }

    /// Takes exactly `amount` bytes of credit, blocking until they fit.
    /// Used by transactional peripherals whose requests are indivisible.
    /// `amount` must not exceed the module buffer size.
    pub fn acquire(&self, amount: usize) -> Result<()> {
        self.credit.wait_for(|credit| {
            if *credit < amount {
                return None;
            }
            *credit -= amount;
            Some(())
        })
    }

    /// TX status report: the firmware's word on remaining buffer space.
    pub fn report(&self, remaining: u16) {
        self.credit.update(|credit| *credit = remaining as usize);
    }

    pub fn terminate(&self, life: Lifecycle) {
        self.credit.terminate(life);
    }

    pub fn interrupt(&self) {
        self.credit.interrupt();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn acquire_consumes_credit() {
        let flow = FlowControl::new(8);
        flow.acquire(5).unwrap();
        assert_eq!(flow.acquire_up_to(10).unwrap(), 3);
    }

    #[test]
    fn report_replaces_credit() {
        let flow = FlowControl::new(8);
        flow.acquire(8).unwrap();
        flow.report(6);
        assert_eq!(flow.acquire_up_to(10).unwrap(), 6);
    }

    #[test]
    fn blocked_writer_wakes_on_report() {
        let flow = Arc::new(FlowControl::new(4));
        flow.acquire(4).unwrap();

        let writer = {
            let flow = flow.clone();
            thread::spawn(move || flow.acquire(2))
        };
        thread::sleep(Duration::from_millis(20));
        flow.report(4);
        writer.join().unwrap().unwrap();
    }

    #[test]
    fn terminate_releases_blocked_writers() {
        let flow = Arc::new(FlowControl::new(1));
        flow.acquire(1).unwrap();

        let writer = {
            let flow = flow.clone();
            thread::spawn(move || flow.acquire(1))
        };
        thread::sleep(Duration::from_millis(20));
        flow.terminate(Lifecycle::Disconnected);
        assert_eq!(writer.join().unwrap(), Err(Error::ConnectionLost));
    }
}
