//! Worker lifecycle state.
//!
//! Install and activate are driven by the host (the CLI, or whatever embeds
//! the router), never by the router itself. This module only records where
//! the worker is and the two flags the host consults: whether a waiting
//! generation may activate immediately, and whether open clients have been
//! claimed.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::watch;

/// Where the worker is in its install → activate sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Created, no lifecycle event seen yet.
    Parsed,
    Installing,
    /// Installed and waiting for activation.
    Installed,
    Activating,
    Activated,
    /// Install failed; this worker will never activate.
    Redundant,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Parsed => "parsed",
            Self::Installing => "installing",
            Self::Installed => "installed",
            Self::Activating => "activating",
            Self::Activated => "activated",
            Self::Redundant => "redundant",
        };
        f.write_str(name)
    }
}

/// Observable lifecycle state plus the skip-waiting and clients-claimed flags.
pub struct Lifecycle {
    state: watch::Sender<WorkerState>,
    skip_waiting: AtomicBool,
    clients_claimed: AtomicBool,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        let (state, _) = watch::channel(WorkerState::Parsed);
        Self {
            state,
            skip_waiting: AtomicBool::new(false),
            clients_claimed: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> WorkerState {
        *self.state.borrow()
    }

    /// Moves to `next`.
    pub fn transition(&self, next: WorkerState) {
        let previous = self.state.send_replace(next);
        tracing::debug!(from = %previous, to = %next, "lifecycle transition");
    }

    /// Lets a waiting generation activate without waiting for old clients.
    pub fn skip_waiting(&self) {
        self.skip_waiting.store(true, Ordering::Release);
    }

    pub fn is_skip_waiting(&self) -> bool {
        self.skip_waiting.load(Ordering::Acquire)
    }

    /// `true` when installed and allowed to activate right away.
    pub fn should_activate(&self) -> bool {
        self.state() == WorkerState::Installed && self.is_skip_waiting()
    }

    /// Takes control of every open client without waiting for a navigation.
    pub fn claim_clients(&self) {
        self.clients_claimed.store(true, Ordering::Release);
    }

    pub fn clients_claimed(&self) -> bool {
        self.clients_claimed.load(Ordering::Acquire)
    }
}
