//! Common types and constants shared across the frontend.
//!
//! This module defines the scalar types the rest of the crate builds on:
//! 1. **Identifiers:** thread ids and dynamic-instruction sequence numbers.
//! 2. **Addresses:** virtual instruction addresses and PC state.
//! 3. **Faults:** fetch-visible faults and configuration errors.

/// Fault and configuration error definitions.
pub mod error;
/// Architectural program counter state.
pub mod pcstate;

pub use self::error::{ConfigError, Fault};
pub use self::pcstate::PcState;

/// A virtual instruction address.
pub type Addr = u64;

/// Monotonically increasing sequence number tagging every dynamic
/// instruction, including speculative ones.
pub type InstSeqNum = u64;

/// Small integer index identifying a hardware thread.
pub type ThreadId = usize;

/// A simulated clock cycle count.
pub type Cycle = u64;

/// Maximum number of SMT threads the frontend is sized for.
///
/// Per-thread arrays are statically sized by this; the configured
/// `num_threads` may be smaller but never larger.
pub const MAX_THREADS: usize = 4;

/// Sentinel thread id returned when no thread is eligible.
pub const INVALID_THREAD_ID: ThreadId = usize::MAX;

/// Fixed instruction word size in bytes.
pub const INST_BYTES: u64 = 4;

/// Sentinel address used for open-ended basic blocks and corrupted
/// return-address predictions.
pub const MAX_ADDR: Addr = u64::MAX;
