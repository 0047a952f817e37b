//! Backward-wire signal groups and the fetch-to-decode bundle.
//!
//! Downstream stages talk to fetch through a shared, delayed time buffer of
//! `TimeComm` records; fetch talks to decode through a time buffer of
//! `FetchBundle` records. Entry-per-thread arrays are sized statically.

use crate::common::{Addr, InstSeqNum, MAX_THREADS};
use crate::isa::{DynInst, StaticInst};

/// Signals from decode to fetch for one thread.
#[derive(Clone, Debug, Default)]
pub struct DecodeComm {
    /// Decode found a pre-decode mismatch and requests a squash.
    pub squash: bool,
    /// Youngest surviving sequence number for the squash.
    pub squash_seq_num: InstSeqNum,
    /// Redirect PC for the squash.
    pub squash_pc: Addr,
    /// Resolved direction of the mispredicted branch.
    pub branch_taken: bool,
    /// PC of the mispredicted branch.
    pub branch_pc: Addr,
    /// The pre-decoded instruction that exposed the mismatch.
    pub mispredict_inst: Option<StaticInst>,
    /// Decode is backpressured; fetch must hold instructions.
    pub block: bool,
    /// Backpressure released.
    pub unblock: bool,
}

/// Occupancy counts from the issue/execute stages for one thread.
///
/// Consumed by the count-based SMT fetch policies.
#[derive(Clone, Copy, Debug, Default)]
pub struct IewComm {
    /// Instruction queue occupancy.
    pub iq_count: u64,
    /// Load/store queue occupancy.
    pub lsq_count: u64,
    /// Outstanding unresolved branches.
    pub branch_count: u64,
}

/// Signals from commit to fetch for one thread.
#[derive(Clone, Debug, Default)]
pub struct CommitComm {
    /// Commit detected a misprediction or trap and requests a squash.
    pub squash: bool,
    /// Youngest surviving sequence number for the squash.
    pub squash_seq_num: InstSeqNum,
    /// Redirect PC for the squash.
    pub squash_pc: Addr,
    /// The squash stems from a mispredicted branch (not a trap).
    pub branch_mispredict: bool,
    /// Resolved direction of the mispredicted branch.
    pub branch_taken: bool,
    /// PC of the mispredicted branch.
    pub branch_pc: Addr,
    /// The mispredicting instruction, when known.
    pub mispredict_inst: Option<StaticInst>,
    /// All instructions up to this sequence number have committed;
    /// the BPU may retire matching history.
    pub done_seq_num: Option<InstSeqNum>,
}

/// One cycle of backward signals, all threads, all stages.
#[derive(Clone, Debug, Default)]
pub struct TimeComm {
    /// Per-thread decode signals.
    pub decode: [DecodeComm; MAX_THREADS],
    /// Per-thread issue/execute occupancy.
    pub iew: [IewComm; MAX_THREADS],
    /// Per-thread commit signals.
    pub commit: [CommitComm; MAX_THREADS],
}

/// One cycle of instructions from fetch to decode.
#[derive(Clone, Debug, Default)]
pub struct FetchBundle {
    /// Delivered instructions, all threads interleaved, per-thread order
    /// strictly increasing in sequence number.
    pub insts: Vec<DynInst>,
}

impl FetchBundle {
    /// Number of delivered instructions.
    #[inline]
    pub fn len(&self) -> usize {
        self.insts.len()
    }

    /// Whether the bundle is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.insts.is_empty()
    }
}
