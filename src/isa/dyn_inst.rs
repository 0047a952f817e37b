//! Dynamic instruction handles.
//!
//! A `DynInst` is one speculatively fetched instruction on its way to
//! decode: the static flags plus the sequencing and prediction state the
//! backend needs to track, resolve, and possibly squash it.

use crate::common::{Fault, InstSeqNum, PcState, ThreadId};

use super::static_inst::StaticInst;

/// One dynamically created (possibly speculative) instruction.
#[derive(Clone, Debug)]
pub struct DynInst {
    /// Global sequence number; unique and monotonically increasing.
    pub seq_num: InstSeqNum,
    /// Owning hardware thread.
    pub tid: ThreadId,
    /// PC (and micro-PC) this instruction was fetched at.
    pub pc: PcState,
    /// Predicted next PC.
    pub pred_pc: PcState,
    /// Whether the terminal branch of the block predicted taken.
    pub pred_taken: bool,
    /// Pre-decoded instruction flags.
    pub static_inst: StaticInst,
    /// Fault carried by this instruction, if any. Fault carriers are NOPs.
    pub fault: Option<Fault>,
}

impl DynInst {
    /// Whether this instruction carries a fault.
    #[inline]
    pub fn is_faulted(&self) -> bool {
        self.fault.is_some()
    }
}
