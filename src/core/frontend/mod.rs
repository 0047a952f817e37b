//! The decoupled fetch frontend.
//!
//! The branch prediction unit drives a fetch-target producer whose basic
//! blocks flow through per-thread fetch target queues into the fetch
//! engine, which turns them into the speculative instruction stream
//! consumed by decode.

/// The fetch engine (target production, fetching, squash, drain).
pub mod fetch;
/// Basic blocks and the fetch target queue.
pub mod ftq;
/// SMT fetch-thread selection policies.
pub mod policy;
