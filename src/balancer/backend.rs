//! A single backend server: its address, liveness, and in-flight count.

use std::ops::Deref;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// One configured backend.
///
/// `alive` is written only by the health prober; `in_flight` moves in
/// lock-step with [`InFlightGuard`] lifetimes.
#[derive(Debug)]
pub struct Backend {
    /// host:port of the backend.
    pub addr: String,
    alive: AtomicBool,
    in_flight: AtomicUsize,
}

impl Backend {
    /// Creates a backend that is considered dead until its first probe.
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            alive: AtomicBool::new(false),
            in_flight: AtomicUsize::new(0),
        }
    }

    /// Whether the most recent health probe succeeded.
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Relaxed)
    }

    pub fn set_alive(&self, alive: bool) {
        self.alive.store(alive, Ordering::Relaxed);
    }

    /// Number of proxied requests currently outstanding.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Relaxed)
    }

    /// Accounts for one accepted dispatch. The returned guard decrements the
    /// count when dropped, whatever path the request takes out.
    pub(crate) fn begin_request(self: &Arc<Self>) -> InFlightGuard {
        self.in_flight.fetch_add(1, Ordering::Relaxed);
        InFlightGuard {
            backend: Arc::clone(self),
        }
    }
}

/// RAII handle for one in-flight request against a backend.
#[derive(Debug)]
pub struct InFlightGuard {
    backend: Arc<Backend>,
}

impl Deref for InFlightGuard {
    type Target = Backend;

    fn deref(&self) -> &Self::Target {
        &self.backend
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.backend.in_flight.fetch_sub(1, Ordering::Relaxed);
    }
}
