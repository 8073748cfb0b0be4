//! Process-wide single-slot flags ("an indexing run is active", "a search is
//! in flight").
//!
//! The flag packs a generation counter and an active bit into one atomic
//! word. Every acquisition starts a new generation, so a ticket from a
//! cancelled run never observes a later run as its own.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct RunFlag {
    state: AtomicU64,
}

const ACTIVE: u64 = 1;

impl RunFlag {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn is_active(&self) -> bool {
        self.state.load(Ordering::Acquire) & ACTIVE == ACTIVE
    }

    /// Claims the slot, or `None` when it is already taken.
    pub fn try_acquire(self: &Arc<Self>) -> Option<RunGuard> {
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            if current & ACTIVE == ACTIVE {
                return None;
            }
            let generation = (current >> 1) + 1;
            let next = (generation << 1) | ACTIVE;
            match self
                .state
                .compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => {
                    return Some(RunGuard {
                        ticket: RunTicket { flag: Arc::clone(self), generation },
                    })
                }
                Err(seen) => current = seen,
            }
        }
    }

    /// Clears the active bit. Returns false if nothing was active.
    pub fn cancel(&self) -> bool {
        self.state.fetch_and(!ACTIVE, Ordering::AcqRel) & ACTIVE == ACTIVE
    }

    fn release(&self, generation: u64) {
        let live = (generation << 1) | ACTIVE;
        let _ = self
            .state
            .compare_exchange(live, generation << 1, Ordering::AcqRel, Ordering::Acquire);
    }
}

/// Cheap, cloneable view of one acquisition; polled by crawl tasks.
#[derive(Debug, Clone)]
pub struct RunTicket {
    flag: Arc<RunFlag>,
    generation: u64,
}

impl RunTicket {
    pub fn is_live(&self) -> bool {
        self.flag.state.load(Ordering::Acquire) == (self.generation << 1) | ACTIVE
    }
}

/// Holds the slot until dropped, on every exit path.
#[derive(Debug)]
pub struct RunGuard {
    ticket: RunTicket,
}

impl RunGuard {
    pub fn ticket(&self) -> RunTicket {
        self.ticket.clone()
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.ticket.flag.release(self.ticket.generation);
    }
}
