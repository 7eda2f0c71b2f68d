//! Caller-side bridge to the calendar worker process.
//!
//! The worker is spawned with piped stdio and spoken to over
//! line-delimited JSON-RPC, strictly one request at a time. See
//! [`WorkerBridge`] for lifecycle and failure semantics.

mod env;
mod worker_bridge;

pub use env::create_worker_env;
pub use worker_bridge::BridgeError;
pub use worker_bridge::WorkerBridge;
pub use worker_bridge::INVOKE_TIMEOUT;
