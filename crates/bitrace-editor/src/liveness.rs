//! Liveness guard shared between an editor instance and its deferred
//! completions.
//!
//! The instance holds a [`LivenessSource`]; every job it hands out
//! carries a [`LivenessToken`]. Revoking the source (on teardown, or by
//! dropping it) makes every outstanding token report dead, and
//! completions check their token before touching any state.

use std::cell::Cell;
use std::rc::Rc;

/// Owner side of the guard.
#[derive(Debug)]
pub struct LivenessSource {
    alive: Rc<Cell<bool>>,
}

impl LivenessSource {
    /// A live source.
    #[must_use]
    pub fn new() -> Self {
        Self {
            alive: Rc::new(Cell::new(true)),
        }
    }

    /// A token observing this source.
    #[must_use]
    pub fn token(&self) -> LivenessToken {
        LivenessToken {
            alive: Rc::clone(&self.alive),
        }
    }

    /// Mark every token dead. Irreversible.
    pub fn revoke(&self) {
        self.alive.set(false);
    }

    /// Whether [`revoke`](Self::revoke) has not been called.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.alive.get()
    }
}

impl Default for LivenessSource {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for LivenessSource {
    fn drop(&mut self) {
        self.revoke();
    }
}

/// Observer side of the guard, carried by deferred jobs.
#[derive(Debug, Clone)]
pub struct LivenessToken {
    alive: Rc<Cell<bool>>,
}

impl LivenessToken {
    /// Whether the issuing source is still alive.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.alive.get()
    }
}
