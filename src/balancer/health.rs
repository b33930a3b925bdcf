//! Active health probing.
//!
//! Each backend gets its own periodic probe task; task launches are
//! staggered so the pool is not probed in one synchronous burst. A probe is
//! `GET {scheme}://{addr}/health` under the configured deadline, and only a
//! 200 marks the backend alive; timeouts, transport errors and any other
//! status mark it dead.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use super::backend::Backend;
use super::pool::BackendPool;
use crate::config::BalancerConfig;

/// Periodic liveness prober; the only writer of backend `alive` flags.
pub struct HealthProber {
    pool: Arc<BackendPool>,
    client: reqwest::Client,
    scheme: &'static str,
    timeout: Duration,
    interval: Duration,
    stagger: Duration,
}

impl HealthProber {
    pub fn new(pool: Arc<BackendPool>, client: reqwest::Client, config: &BalancerConfig) -> Self {
        Self {
            pool,
            client,
            scheme: config.scheme(),
            timeout: config.timeout,
            interval: config.probe_interval,
            stagger: config.probe_stagger,
        }
    }

    /// One synchronous pass over the whole pool, so the first dispatch after
    /// startup sees the true live set.
    pub async fn initial_pass(&self) {
        for backend in self.pool.backends() {
            probe(&self.client, self.scheme, self.timeout, backend).await;
        }
    }

    /// Spawns one periodic probe task per backend, each offset from the
    /// previous by the configured stagger.
    pub fn spawn(self) {
        for (i, backend) in self.pool.backends().iter().cloned().enumerate() {
            let client = self.client.clone();
            let scheme = self.scheme;
            let timeout = self.timeout;
            let interval = self.interval;
            let delay = self.stagger * (i as u32 + 1);
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                loop {
                    tokio::time::sleep(interval).await;
                    probe(&client, scheme, timeout, &backend).await;
                }
            });
        }
    }
}

async fn probe(client: &reqwest::Client, scheme: &str, timeout: Duration, backend: &Backend) {
    let url = format!("{}://{}/health", scheme, backend.addr);
    let was_alive = backend.is_alive();
    let alive = match client.get(&url).timeout(timeout).send().await {
        Ok(response) => response.status() == reqwest::StatusCode::OK,
        Err(err) => {
            debug!(addr = %backend.addr, error = %err, "health probe failed");
            false
        }
    };
    backend.set_alive(alive);
    if alive == was_alive {
        debug!(addr = %backend.addr, alive, "health probe");
    } else {
        info!(addr = %backend.addr, alive, "backend liveness changed");
    }
}
