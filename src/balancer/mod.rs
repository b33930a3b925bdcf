//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound request
//!     → proxy.rs dispatch (pick a live backend, least in-flight first)
//!     → pool.rs (selection + in-flight increment under one lock)
//!     → proxy.rs forward (rewrite scheme/host, stream request and response)
//!     → client, with an optional `lb-from` trace header
//!
//! Every probe_interval:
//!     health.rs probes GET /health on each backend
//!     → backend.rs alive flag (the only writer of liveness)
//! ```
//!
//! # Design Decisions
//! - The backend set is fixed at startup; only liveness and in-flight
//!   counts change at runtime.
//! - In-flight accounting is RAII: the guard releases on every exit path.
//! - Unhealthy backends are excluded from selection, nothing else.

pub mod backend;
pub mod health;
pub mod pool;
pub mod proxy;

pub use backend::Backend;
pub use health::HealthProber;
pub use pool::BackendPool;
pub use proxy::ProxyState;
