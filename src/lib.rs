//! aioreq – fire a fixed `GET / HTTP/1.0` request at many TCP endpoints at
//! once and collect every response body-and-all, in input order.
//!
//! This crate exports
//!  * `core`    – endpoints, sessions and the concurrent coordinator
//!  * `config`  – TOML + environment driven configuration
//!  * `server`  – a deliberately slow demo server to talk to
//!  * `logging` / `metrics` – ambient tracing setup and process counters
//!
//! All sessions of a batch are polled by one task; a batch of `m` requests
//! against a server that serves `k` at a time with delay `d` takes about
//! `ceil(m / k) * d`.

// ───────────────────────────────────────────────────────────
// Public modules
// ───────────────────────────────────────────────────────────
pub mod config;
pub mod core;
pub mod logging;
pub mod metrics;
pub mod server;

// ───────────────────────────────────────────────────────────
// Re-exports
// ───────────────────────────────────────────────────────────
pub use crate::config::{load_config, ClientConfig, Config, FailurePolicy};
pub use crate::core::coordinator::Coordinator;
pub use crate::core::endpoint::Endpoint;
pub use crate::core::error::{BatchError, RequestError};
pub use crate::core::session::{Session, SessionState, REQUEST_LINE};
pub use crate::core::{get_request, get_requests};
