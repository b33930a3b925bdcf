//! Shoal: two loosely coupled subsystems sharing one process and nothing
//! else.
//!
//! ```text
//!                  ┌──────────────────────────────────────────────┐
//!                  │                  BALANCER                    │
//!  Client ─────────┼─▶ server ─▶ dispatch ─▶ pool ─▶ forward ─────┼──▶ Backends
//!                  │                 ▲                            │
//!                  │                 │ alive flags                │
//!                  │            health prober (periodic GET)      │
//!                  └──────────────────────────────────────────────┘
//!
//!                  ┌──────────────────────────────────────────────┐
//!                  │                  DATASTORE                   │
//!  Db handle ──────┼─▶ writer loop ──▶ active segment file        │
//!       │          │       │                                      │
//!       │          │       └─▶ index loop ◀── merger (background) │
//!       └──────────┼─▶ lookup ─▶ segment file read                │
//!                  └──────────────────────────────────────────────┘
//! ```
//!
//! The balancer spreads inbound HTTP requests over a fixed pool of
//! health-checked backends under the least-connections policy. The datastore
//! is an append-only, segmented, hash-indexed key/value log with a single
//! writer, online segmentation and background compaction.

pub mod balancer;
pub mod config;
pub mod datastore;
pub mod server;

pub use config::BalancerConfig;
pub use datastore::{Db, StoreError};
