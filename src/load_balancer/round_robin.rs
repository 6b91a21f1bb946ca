//! Round-robin load balancing strategy.

use std::sync::{Arc, Mutex};

use crate::load_balancer::backend::BackendDescriptor;

/// Round-robin selector.
/// Stores the cursor position behind a mutex so every call observes and
/// advances a distinct value.
#[derive(Debug, Default)]
pub struct RoundRobin {
    cursor: Mutex<usize>,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inspect the backend at the cursor, then advance the cursor by one.
    ///
    /// Returns that backend's address if it is free. A busy backend yields
    /// `None` even when others are idle.
    pub fn next_server(&self, backends: &[Arc<BackendDescriptor>]) -> Option<String> {
        if backends.is_empty() {
            return None;
        }

        let mut cursor = self.cursor.lock().unwrap_or_else(|e| e.into_inner());
        let backend = &backends[*cursor];
        let address = backend.is_free().then(|| backend.address.clone());
        *cursor = (*cursor + 1) % backends.len();

        address
    }

    /// Current cursor position.
    pub fn cursor(&self) -> usize {
        *self.cursor.lock().unwrap_or_else(|e| e.into_inner())
    }
}
