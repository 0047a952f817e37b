//! Decoupled instruction-fetch frontend model.
//!
//! This crate implements the speculative fetch frontend of an out-of-order,
//! optionally SMT CPU performance model. It provides:
//! 1. **Branch prediction:** BTB, RAS, direction and indirect predictors
//!    composed by a branch prediction unit with per-branch recovery history.
//! 2. **Fetch targets:** a BPU-driven producer that emits basic blocks into
//!    per-thread fetch target queues, decoupled from the instruction stream.
//! 3. **Fetch engine:** cache-line buffering, translation handshake,
//!    pre-decode, micro-op expansion, and per-thread fetch queues.
//! 4. **Recovery:** squash and drain handling that keeps every frontend
//!    buffer consistent with the youngest surviving sequence number.
//! 5. **Simulation plumbing:** cycle-indexed time buffers and a deterministic
//!    deferred-event queue.

/// Common types and constants (addresses, ids, PC state, faults).
pub mod common;
/// Frontend configuration (defaults, enums, hierarchical config structures).
pub mod config;
/// Fetch engine, fetch target queue, and SMT fetch policies.
pub mod core;
/// Static-instruction model and the pre-decode contract.
pub mod isa;
/// Instruction-port and translation contracts.
pub mod mem;
/// Cycle-driven simulation plumbing (time buffers, deferred events).
pub mod sim;
/// Frontend statistics collection.
pub mod stats;

/// Root configuration type; use `FrontendConfig::default()` or deserialize from JSON.
pub use crate::config::FrontendConfig;
/// The fetch engine; owns the FTQ, the BPU, and all per-thread fetch state.
pub use crate::core::frontend::fetch::Fetch;
/// The branch prediction unit.
pub use crate::core::units::bpu::BPredUnit;
