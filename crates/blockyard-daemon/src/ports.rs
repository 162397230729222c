//! Host port allocation by bounded linear probing

use crate::error::{SupervisorError, SupervisorResult};
use std::collections::HashSet;
use std::net::{IpAddr, SocketAddr, TcpListener};
use std::sync::Mutex;
use tracing::debug;

/// Hands out locally free TCP ports starting from a preferred value.
///
/// A port is free when nothing else is bound to it and no live run of ours
/// holds it; the second check covers servers that have not bound yet.
#[derive(Debug)]
pub struct PortAllocator {
    host: IpAddr,
    preferred: u16,
    window: u16,
    reserved: Mutex<HashSet<u16>>,
}

impl PortAllocator {
    pub fn new(host: IpAddr, preferred: u16, window: u16) -> Self {
        Self {
            host,
            preferred,
            window: window.max(1),
            reserved: Mutex::new(HashSet::new()),
        }
    }

    /// Inclusive probe range
    pub fn range(&self) -> (u16, u16) {
        let end = self.preferred.saturating_add(self.window - 1);
        (self.preferred, end)
    }

    /// Reserve the first free port in the window
    pub fn allocate(&self) -> SupervisorResult<u16> {
        let (start, end) = self.range();
        let mut reserved = self
            .reserved
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        for port in start..=end {
            if reserved.contains(&port) {
                continue;
            }
            if self.is_bindable(port) {
                reserved.insert(port);
                debug!(port, "Port allocated");
                return Ok(port);
            }
            debug!(port, "Port busy, probing next");
        }

        Err(SupervisorError::PortsExhausted { start, end })
    }

    /// Return a port to the pool; unknown ports are ignored
    pub fn release(&self, port: u16) {
        let mut reserved = self
            .reserved
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if reserved.remove(&port) {
            debug!(port, "Port released");
        }
    }

    fn is_bindable(&self, port: u16) -> bool {
        TcpListener::bind(SocketAddr::new(self.host, port)).is_ok()
    }
}
