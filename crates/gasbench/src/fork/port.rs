use std::{collections::BTreeSet, net::TcpListener, ops::RangeInclusive, sync::Arc};

use parking_lot::Mutex;
use tracing::trace;

use crate::{constants::fork::LOCAL_HOST, ForkError};

/// Hands out ports from a fixed range, never the same port twice while it is held.
///
/// Reservation and the check that nothing else listens on the port happen under one lock, so
/// concurrent session creation cannot race for a port.
#[derive(Debug)]
pub struct PortAllocator {
    range: RangeInclusive<u16>,
    reserved: Mutex<BTreeSet<u16>>,
}

impl PortAllocator {
    /// Create an allocator over `range`.
    pub fn new(range: RangeInclusive<u16>) -> Arc<Self> {
        Arc::new(Self { range, reserved: Mutex::new(BTreeSet::new()) })
    }

    /// Reserve the lowest free port. The port is released when the lease is dropped unless the
    /// lease is [kept](PortLease::keep).
    pub fn reserve(self: &Arc<Self>) -> Result<PortLease, ForkError> {
        let mut reserved = self.reserved.lock();
        for port in self.range.clone() {
            if reserved.contains(&port) {
                continue;
            }
            // Something outside this process may hold the port.
            if TcpListener::bind((LOCAL_HOST, port)).is_err() {
                trace!(port, "port in use");
                continue;
            }
            reserved.insert(port);
            return Ok(PortLease { port, allocator: Some(Arc::clone(self)) });
        }
        Err(ForkError::NoFreePort { start: *self.range.start(), end: *self.range.end() })
    }

    /// Return a port to the pool.
    pub fn release(&self, port: u16) {
        self.reserved.lock().remove(&port);
    }

    /// Whether `port` is currently held.
    pub fn is_reserved(&self, port: u16) -> bool {
        self.reserved.lock().contains(&port)
    }

    /// Number of ports currently held.
    pub fn reserved_count(&self) -> usize {
        self.reserved.lock().len()
    }
}

/// A reserved port, released on drop.
#[derive(Debug)]
pub struct PortLease {
    port: u16,
    allocator: Option<Arc<PortAllocator>>,
}

impl PortLease {
    /// The reserved port.
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Keep the port reserved past the lease. It must later be returned with
    /// [`PortAllocator::release`].
    pub fn keep(mut self) -> u16 {
        self.allocator = None;
        self.port
    }
}

impl Drop for PortLease {
    fn drop(&mut self) {
        if let Some(allocator) = self.allocator.take() {
            allocator.release(self.port);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn free_range(len: u16) -> RangeInclusive<u16> {
        // Ask the OS for a free port and use the range starting at it.
        let listener = TcpListener::bind((LOCAL_HOST, 0)).unwrap();
        let start = listener.local_addr().unwrap().port();
        drop(listener);
        start..=start.saturating_add(len - 1)
    }

    #[test]
    fn test_lease_is_released_on_drop() {
        let allocator = PortAllocator::new(free_range(1));
        let lease = allocator.reserve().unwrap();
        let port = lease.port();
        assert!(allocator.is_reserved(port));
        drop(lease);
        assert!(!allocator.is_reserved(port));
    }

    #[test]
    fn test_kept_lease_stays_reserved() {
        let allocator = PortAllocator::new(free_range(1));
        let port = allocator.reserve().unwrap().keep();
        assert!(allocator.is_reserved(port));
        assert!(matches!(allocator.reserve(), Err(ForkError::NoFreePort { .. })));
        allocator.release(port);
        assert_eq!(allocator.reserved_count(), 0);
    }

    #[test]
    fn test_bound_port_is_skipped() {
        let listener = TcpListener::bind((LOCAL_HOST, 0)).unwrap();
        let busy = listener.local_addr().unwrap().port();
        let allocator = PortAllocator::new(busy..=busy);
        assert!(matches!(
            allocator.reserve(),
            Err(ForkError::NoFreePort { start, end }) if start == busy && end == busy
        ));
    }
}
