//! Allocation of pins and peripheral modules.
//!
//! Every open peripheral holds one or more descriptors; a descriptor has
//! at most one live owner at any time. Allocation of a set of descriptors
//! is all-or-nothing so a failed open never leaks partial claims.
//!
//! The manager carries its own lock (not the session's) because the
//! dispatcher returns descriptors to the pools while handling a soft reset
//! and must not touch session-level locks.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::board::Capabilities;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Pin,
    Outcompare,
    Uart,
    Spi,
    Twi,
    Icsp,
    IncapSingle,
    IncapDouble,
    Sequencer,
}

/// A (kind, id) descriptor naming one scarce board resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceId {
    pub kind: ResourceKind,
    pub id: u8,
}

impl ResourceId {
    pub fn new(kind: ResourceKind, id: u8) -> Self {
        Self { kind, id }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Request {
    /// Claim a caller-chosen id (pins, TWI modules).
    Fixed(ResourceKind, u8),
    /// Claim the lowest free id of the kind's pool.
    Pooled(ResourceKind),
}

struct Pool {
    ids: Vec<u8>,
    used: Vec<bool>,
}

impl Pool {
    fn new(ids: impl IntoIterator<Item = u8>) -> Self {
        let ids: Vec<u8> = ids.into_iter().collect();
        let used = vec![false; ids.len()];
        Self { ids, used }
    }
}

#[derive(Default)]
pub struct ResourceManager {
    pools: Mutex<HashMap<ResourceKind, Pool>>,
}

impl ResourceManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sizes the pools from the board's capability table. Called once when
    /// the handshake resolves the hardware model.
    pub fn configure(&self, caps: &Capabilities) {
        let mut pools = self.pools.lock();
        pools.clear();
        pools.insert(ResourceKind::Pin, Pool::new(0..caps.num_pins));
        pools.insert(
            ResourceKind::Outcompare,
            Pool::new(caps.pwm_modules.iter().copied()),
        );
        pools.insert(
            ResourceKind::Uart,
            Pool::new(caps.uart_modules.iter().copied()),
        );
        pools.insert(
            ResourceKind::Spi,
            Pool::new(caps.spi_modules.iter().copied()),
        );
        pools.insert(ResourceKind::Twi, Pool::new(0..caps.num_twi_modules()));
        pools.insert(ResourceKind::Icsp, Pool::new([0]));
        pools.insert(
            ResourceKind::IncapSingle,
            Pool::new(caps.incap_single_modules.iter().copied()),
        );
        pools.insert(
            ResourceKind::IncapDouble,
            Pool::new(caps.incap_double_modules.iter().copied()),
        );
        pools.insert(
            ResourceKind::Sequencer,
            Pool::new(caps.sequencer_modules.iter().copied()),
        );
    }

    /// Atomically claims every requested descriptor. On any failure nothing
    /// is claimed and the error names the first unsatisfiable request.
    pub fn alloc(&self, requests: &[Request]) -> Result<Vec<ResourceId>> {
        let mut pools = self.pools.lock();
        let mut chosen: Vec<(ResourceKind, usize)> = Vec::with_capacity(requests.len());

        for request in requests {
            let pick = match *request {
                Request::Fixed(kind, id) => {
                    let pool = pools
                        .get(&kind)
                        .ok_or_else(|| Error::IllegalState("not connected".into()))?;
                    let index = pool.ids.iter().position(|&candidate| candidate == id);
                    match index {
                        Some(index)
                            if !pool.used[index]
                                && !chosen.contains(&(kind, index)) =>
                        {
                            (kind, index)
                        }
                        _ => {
                            return Err(Error::OutOfResource(format!(
                                "{kind:?} {id} unavailable"
                            )))
                        }
                    }
                }
                Request::Pooled(kind) => {
                    let pool = pools
                        .get(&kind)
                        .ok_or_else(|| Error::IllegalState("not connected".into()))?;
                    let index = (0..pool.ids.len())
                        .find(|&index| !pool.used[index] && !chosen.contains(&(kind, index)));
                    match index {
                        Some(index) => (kind, index),
                        None => {
                            return Err(Error::OutOfResource(format!("{kind:?} pool exhausted")))
                        }
                    }
                }
            };
            chosen.push(pick);
        }

        let mut result = Vec::with_capacity(chosen.len());
        for (kind, index) in chosen {
            let pool = pools.get_mut(&kind).unwrap();
            pool.used[index] = true;
            result.push(ResourceId::new(kind, pool.ids[index]));
        }
        Ok(result)
    }

    pub fn free(&self, resource: ResourceId) {
        let mut pools = self.pools.lock();
        if let Some(pool) = pools.get_mut(&resource.kind) {
            if let Some(index) = pool.ids.iter().position(|&id| id == resource.id) {
                pool.used[index] = false;
            }
        }
    }

    /// Returns every descriptor to its pool (soft reset).
    pub fn reset(&self) {
        let mut pools = self.pools.lock();
        for pool in pools.values_mut() {
            pool.used.fill(false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::{capabilities, HardwareVersion};

    fn manager() -> ResourceManager {
        let rm = ResourceManager::new();
        rm.configure(capabilities(HardwareVersion::Ioio0003));
        rm
    }

    #[test]
    fn pin_alloc_and_free() {
        let rm = manager();
        let got = rm.alloc(&[Request::Fixed(ResourceKind::Pin, 13)]).unwrap();
        assert_eq!(got, vec![ResourceId::new(ResourceKind::Pin, 13)]);
        assert!(rm.alloc(&[Request::Fixed(ResourceKind::Pin, 13)]).is_err());
        rm.free(got[0]);
        rm.alloc(&[Request::Fixed(ResourceKind::Pin, 13)]).unwrap();
    }

    #[test]
    fn out_of_range_pin_is_out_of_resource() {
        let rm = manager();
        assert!(matches!(
            rm.alloc(&[Request::Fixed(ResourceKind::Pin, 120)]),
            Err(Error::OutOfResource(_))
        ));
    }

    #[test]
    fn pooled_alloc_takes_lowest_free() {
        let rm = manager();
        let a = rm.alloc(&[Request::Pooled(ResourceKind::Uart)]).unwrap();
        let b = rm.alloc(&[Request::Pooled(ResourceKind::Uart)]).unwrap();
        assert_eq!(a[0].id, 0);
        assert_eq!(b[0].id, 1);
        rm.free(a[0]);
        let c = rm.alloc(&[Request::Pooled(ResourceKind::Uart)]).unwrap();
        assert_eq!(c[0].id, 0);
    }

    #[test]
    fn double_capture_pool_uses_even_modules() {
        let rm = manager();
        let a = rm
            .alloc(&[Request::Pooled(ResourceKind::IncapDouble)])
            .unwrap();
        let b = rm
            .alloc(&[Request::Pooled(ResourceKind::IncapDouble)])
            .unwrap();
        assert_eq!((a[0].id, b[0].id), (0, 2));
    }

    #[test]
    fn alloc_is_atomic() {
        let rm = manager();
        // Second request collides with the first: nothing may be claimed.
        let err = rm.alloc(&[
            Request::Fixed(ResourceKind::Pin, 7),
            Request::Fixed(ResourceKind::Pin, 7),
        ]);
        assert!(err.is_err());
        rm.alloc(&[Request::Fixed(ResourceKind::Pin, 7)]).unwrap();
    }

    #[test]
    fn pool_exhaustion() {
        let rm = manager();
        for _ in 0..3 {
            rm.alloc(&[Request::Pooled(ResourceKind::Spi)]).unwrap();
        }
        assert!(matches!(
            rm.alloc(&[Request::Pooled(ResourceKind::Spi)]),
            Err(Error::OutOfResource(_))
        ));
    }

    #[test]
    fn reset_returns_everything() {
        let rm = manager();
        rm.alloc(&[
            Request::Fixed(ResourceKind::Pin, 3),
            Request::Pooled(ResourceKind::Outcompare),
        ])
        .unwrap();
        rm.reset();
        rm.alloc(&[
            Request::Fixed(ResourceKind::Pin, 3),
            Request::Pooled(ResourceKind::Outcompare),
        ])
        .unwrap();
    }
}
