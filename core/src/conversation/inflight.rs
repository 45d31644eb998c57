//! One turn at a time per conversation.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use uuid::Uuid;

/// Set of conversations with a turn in progress.
#[derive(Debug, Clone, Default)]
pub struct InFlight {
    active: Arc<Mutex<HashSet<Uuid>>>,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim a conversation. `None` when a turn is already running for it.
    pub fn try_acquire(&self, id: Uuid) -> Option<InFlightGuard> {
        let mut active = self.active.lock().unwrap_or_else(|p| p.into_inner());
        if !active.insert(id) {
            return None;
        }
        Some(InFlightGuard {
            id,
            active: self.active.clone(),
        })
    }

    pub fn is_busy(&self, id: Uuid) -> bool {
        self.active
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .contains(&id)
    }
}

/// Releases the conversation when dropped, including on cancellation.
#[derive(Debug)]
pub struct InFlightGuard {
    id: Uuid,
    active: Arc<Mutex<HashSet<Uuid>>>,
}

impl InFlightGuard {
    pub fn id(&self) -> Uuid {
        self.id
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.active
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .remove(&self.id);
    }
}
