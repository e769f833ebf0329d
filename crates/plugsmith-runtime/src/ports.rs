//! Port allocation for backend base URLs

use std::collections::BTreeSet;

/// Default first port handed to a backend
pub const DEFAULT_BASE_PORT: u16 = 13000;

/// Hands out ports starting at a base. Released ports go on a free-list and
/// the lowest one is reused before a new port is minted.
#[derive(Debug, Clone)]
pub struct PortAllocator {
    base: u16,
    /// Next port to mint, `None` once `u16::MAX` has been handed out
    next: Option<u16>,
    free: BTreeSet<u16>,
}

impl Default for PortAllocator {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_PORT)
    }
}

impl PortAllocator {
    pub fn new(base: u16) -> Self {
        Self {
            base,
            next: Some(base),
            free: BTreeSet::new(),
        }
    }

    /// Returns None once the port range is exhausted
    pub fn allocate(&mut self) -> Option<u16> {
        if let Some(port) = self.free.pop_first() {
            return Some(port);
        }
        let port = self.next?;
        self.next = port.checked_add(1);
        Some(port)
    }

    /// Return a port for reuse. Ports never handed out are ignored.
    pub fn release(&mut self, port: u16) {
        let minted = port >= self.base && self.next.is_none_or(|next| port < next);
        if minted {
            self.free.insert(port);
        }
    }

    pub fn free_count(&self) -> usize {
        self.free.len()
    }
}
