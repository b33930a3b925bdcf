//! Backend registry and least-connections selection.

use std::sync::{Arc, Mutex, PoisonError};

use super::backend::{Backend, InFlightGuard};

/// The fixed set of backends, in registry order.
#[derive(Debug)]
pub struct BackendPool {
    backends: Vec<Arc<Backend>>,
    // Held across the scan + increment so concurrent dispatches observe
    // each other's in-flight counts.
    select_lock: Mutex<()>,
}

impl BackendPool {
    pub fn new<I, S>(addrs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            backends: addrs
                .into_iter()
                .map(|addr| Arc::new(Backend::new(addr)))
                .collect(),
            select_lock: Mutex::new(()),
        }
    }

    /// Picks the live backend with the fewest in-flight requests, ties
    /// broken by registry order, and accounts for the new request. Returns
    /// `None` when no backend is alive.
    pub fn select(&self) -> Option<InFlightGuard> {
        let _lock = self.select_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let backend = self
            .backends
            .iter()
            .filter(|backend| backend.is_alive())
            .min_by_key(|backend| backend.in_flight())?;
        Some(backend.begin_request())
    }

    /// All backends, alive or not.
    pub fn backends(&self) -> &[Arc<Backend>] {
        &self.backends
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn live_pool(count: usize) -> BackendPool {
        let pool = BackendPool::new((0..count).map(|i| format!("127.0.0.1:{}", 8080 + i)));
        for backend in pool.backends() {
            backend.set_alive(true);
        }
        pool
    }

    #[test]
    fn picks_least_loaded_backend() {
        let pool = live_pool(3);
        let _first = pool.select().unwrap(); // backend 0
        let second = pool.select().unwrap();
        assert_eq!(second.addr, pool.backends()[1].addr);

        // backend 2 is now the only idle one
        let third = pool.select().unwrap();
        assert_eq!(third.addr, pool.backends()[2].addr);
    }

    #[test]
    fn ties_break_by_registry_order() {
        let pool = live_pool(3);
        let guard = pool.select().unwrap();
        assert_eq!(guard.addr, pool.backends()[0].addr);
        drop(guard);

        // all idle again: the first backend wins the tie every time
        let guard = pool.select().unwrap();
        assert_eq!(guard.addr, pool.backends()[0].addr);
    }

    #[test]
    fn dead_backends_are_skipped() {
        let pool = live_pool(3);
        pool.backends()[0].set_alive(false);
        let guard = pool.select().unwrap();
        assert_eq!(guard.addr, pool.backends()[1].addr);
    }

    #[test]
    fn empty_live_set_yields_none() {
        let pool = live_pool(2);
        for backend in pool.backends() {
            backend.set_alive(false);
        }
        assert!(pool.select().is_none());
    }

    #[test]
    fn released_backend_becomes_eligible_again() {
        let pool = live_pool(2);
        let first = pool.select().unwrap();
        assert_eq!(first.addr, pool.backends()[0].addr);
        drop(first);

        let next = pool.select().unwrap();
        assert_eq!(next.addr, pool.backends()[0].addr);
        assert_eq!(pool.backends()[1].in_flight(), 0);
    }
}
