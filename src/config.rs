//! Balancer configuration.
//!
//! All fields have defaults so a bare invocation is runnable; the CLI layer
//! overrides whatever flags were given. The configuration is immutable once
//! the process is wired up.

use std::time::Duration;

/// Runtime configuration for the load balancer.
#[derive(Debug, Clone)]
pub struct BalancerConfig {
    /// Listener port.
    pub port: u16,

    /// Deadline for every outbound request, probes included.
    pub timeout: Duration,

    /// Talk to backends over HTTPS instead of HTTP.
    pub https: bool,

    /// Annotate responses with an `lb-from` header naming the chosen
    /// backend.
    pub trace: bool,

    /// Backend addresses (host:port), in registry order.
    pub backends: Vec<String>,

    /// Delay between health probes of a single backend.
    pub probe_interval: Duration,

    /// Launch offset between consecutive backends' probe tasks.
    pub probe_stagger: Duration,
}

impl Default for BalancerConfig {
    fn default() -> Self {
        Self {
            port: 8090,
            timeout: Duration::from_secs(3),
            https: false,
            trace: false,
            backends: vec![
                "server1:8080".to_string(),
                "server2:8080".to_string(),
                "server3:8080".to_string(),
            ],
            probe_interval: Duration::from_secs(10),
            probe_stagger: Duration::from_millis(100),
        }
    }
}

impl BalancerConfig {
    /// URL scheme for all outbound traffic.
    pub fn scheme(&self) -> &'static str {
        if self.https {
            "https"
        } else {
            "http"
        }
    }
}
