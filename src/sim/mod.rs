//! Cycle-driven simulation plumbing.
//!
//! The frontend is a cooperative, single-threaded cycle model: `tick()` is
//! invoked once per simulated cycle and all apparent asynchrony (cache
//! responses, translation completions, retries) is delivered by a
//! deterministic event scheduler at specific future cycles. This module
//! provides:
//! 1. **Time buffers:** cycle-indexed rings modeling delayed wires between
//!    pipeline stages.
//! 2. **Deferred events:** a min-heap scheduler with stable intra-cycle
//!    ordering.
//! 3. **Signal groups:** the per-thread backward-communication structures.

/// Backward-wire signal groups and the fetch-to-decode bundle.
pub mod comm;
/// Deterministic deferred-event queue.
pub mod events;
/// Cycle-indexed ring buffers for delayed wires.
pub mod timebuf;

pub use self::comm::{CommitComm, DecodeComm, FetchBundle, IewComm, TimeComm};
pub use self::events::{EventQueue, FrontendEvent};
pub use self::timebuf::TimeBuffer;
