//! Direction predictors.
//!
//! The direction predictor decides taken/not-taken for conditional
//! branches. The BPU treats it as an opaque capability set: every lookup
//! produces an owned history token which is later consumed by exactly one
//! of `update` (the branch resolved) or `squash` (the lookup was
//! speculative and got rolled back). Concrete variants are selected at
//! construction and dispatched through an enum, avoiding vtable lookups in
//! the prediction path.

use crate::common::{Addr, MAX_THREADS, ThreadId};
use crate::config::{BpuConfig, DirectionKind};
use crate::isa::StaticInst;

/// History token for a GShare lookup.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GShareHistory {
    /// Global history register before the speculative shift.
    ghr: u64,
    /// The direction this lookup predicted.
    pred_taken: bool,
}

/// History token for a bimodal lookup.
///
/// Bimodal keeps no speculative state, so the token only records the
/// prediction for bookkeeping.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BimodalHistory {
    pred_taken: bool,
}

/// Owned direction-predictor history, one variant per implementation.
///
/// Storing the token inline (instead of an opaque pointer) makes the
/// free-exactly-once rule a property of the type system: the token moves
/// into `update` or `squash` and cannot be used twice.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DirHistory {
    /// Token from the GShare predictor.
    GShare(GShareHistory),
    /// Token from the bimodal predictor.
    Bimodal(BimodalHistory),
}

impl DirHistory {
    /// The direction recorded at lookup time.
    pub fn pred_taken(&self) -> bool {
        match self {
            DirHistory::GShare(h) => h.pred_taken,
            DirHistory::Bimodal(h) => h.pred_taken,
        }
    }
}

/// Global-history predictor hashing the PC with a speculative GHR.
pub struct GShare {
    /// Per-thread global history registers, updated speculatively at
    /// lookup and repaired from tokens on squash.
    ghr: [u64; MAX_THREADS],
    /// Pattern history table of 2-bit saturating counters.
    pht: Vec<u8>,
    /// Index mask (table size - 1).
    mask: u64,
    /// Low PC bits ignored by indexing.
    inst_shift: usize,
}

impl GShare {
    fn new(table_bits: usize, inst_shift: usize) -> Self {
        let size = 1usize << table_bits;
        Self {
            ghr: [0; MAX_THREADS],
            pht: vec![1; size],
            mask: size as u64 - 1,
            inst_shift,
        }
    }

    fn index(&self, pc: Addr, ghr: u64) -> usize {
        (((pc >> self.inst_shift) ^ ghr) & self.mask) as usize
    }

    fn train(&mut self, pc: Addr, ghr: u64, taken: bool) {
        let idx = self.index(pc, ghr);
        let counter = self.pht[idx];
        if taken && counter < 3 {
            self.pht[idx] = counter + 1;
        } else if !taken && counter > 0 {
            self.pht[idx] = counter - 1;
        }
    }

    fn lookup(&mut self, tid: ThreadId, pc: Addr) -> (bool, GShareHistory) {
        let ghr = self.ghr[tid];
        let taken = self.pht[self.index(pc, ghr)] >= 2;
        self.ghr[tid] = (ghr << 1) | u64::from(taken);
        (
            taken,
            GShareHistory {
                ghr,
                pred_taken: taken,
            },
        )
    }

    fn uncond_branch(&mut self, tid: ThreadId) -> GShareHistory {
        let ghr = self.ghr[tid];
        self.ghr[tid] = (ghr << 1) | 1;
        GShareHistory {
            ghr,
            pred_taken: true,
        }
    }

    fn btb_update(&mut self, tid: ThreadId, history: &mut GShareHistory) {
        // The BTB miss forced a not-taken assumption; repair the
        // speculative history bit to match.
        self.ghr[tid] = history.ghr << 1;
        history.pred_taken = false;
    }

    fn update(
        &mut self,
        tid: ThreadId,
        pc: Addr,
        taken: bool,
        history: GShareHistory,
        squashed: bool,
        cond: bool,
    ) {
        if squashed {
            self.ghr[tid] = (history.ghr << 1) | u64::from(taken);
        }
        if cond {
            self.train(pc, history.ghr, taken);
        }
    }

    fn squash(&mut self, tid: ThreadId, history: GShareHistory) {
        self.ghr[tid] = history.ghr;
    }

    fn reset(&mut self) {
        self.ghr = [0; MAX_THREADS];
        for c in &mut self.pht {
            *c = 1;
        }
    }
}

/// Per-PC 2-bit saturating counters, no global history.
pub struct Bimodal {
    pht: Vec<u8>,
    mask: u64,
    inst_shift: usize,
}

impl Bimodal {
    fn new(table_bits: usize, inst_shift: usize) -> Self {
        let size = 1usize << table_bits;
        Self {
            pht: vec![1; size],
            mask: size as u64 - 1,
            inst_shift,
        }
    }

    fn index(&self, pc: Addr) -> usize {
        ((pc >> self.inst_shift) & self.mask) as usize
    }

    fn lookup(&self, pc: Addr) -> (bool, BimodalHistory) {
        let taken = self.pht[self.index(pc)] >= 2;
        (taken, BimodalHistory { pred_taken: taken })
    }

    fn update(&mut self, pc: Addr, taken: bool, cond: bool) {
        if !cond {
            return;
        }
        let idx = self.index(pc);
        let counter = self.pht[idx];
        if taken && counter < 3 {
            self.pht[idx] = counter + 1;
        } else if !taken && counter > 0 {
            self.pht[idx] = counter - 1;
        }
    }

    fn reset(&mut self) {
        for c in &mut self.pht {
            *c = 1;
        }
    }
}

/// Enum dispatch over the configured direction predictor.
pub enum DirectionPredictor {
    /// Global-history predictor.
    GShare(GShare),
    /// Per-PC counters.
    Bimodal(Bimodal),
}

impl DirectionPredictor {
    /// Creates the configured direction predictor.
    pub fn new(config: &BpuConfig) -> Self {
        match config.direction {
            DirectionKind::GShare => {
                Self::GShare(GShare::new(config.dir_table_bits, config.inst_shift))
            }
            DirectionKind::Bimodal => {
                Self::Bimodal(Bimodal::new(config.dir_table_bits, config.inst_shift))
            }
        }
    }

    /// Looks up the direction for a conditional branch at `pc`.
    ///
    /// Returns the prediction and an owned history token. Any speculative
    /// internal state (global history) is updated as part of the lookup.
    pub fn lookup(&mut self, tid: ThreadId, pc: Addr) -> (bool, DirHistory) {
        match self {
            Self::GShare(p) => {
                let (taken, h) = p.lookup(tid, pc);
                (taken, DirHistory::GShare(h))
            }
            Self::Bimodal(p) => {
                let (taken, h) = p.lookup(pc);
                (taken, DirHistory::Bimodal(h))
            }
        }
    }

    /// Biased lookup for unconditional control flow.
    pub fn uncond_branch(&mut self, tid: ThreadId, _pc: Addr) -> DirHistory {
        match self {
            Self::GShare(p) => DirHistory::GShare(p.uncond_branch(tid)),
            Self::Bimodal(_) => DirHistory::Bimodal(BimodalHistory { pred_taken: true }),
        }
    }

    /// Notifies the predictor that a BTB miss forced not-taken.
    pub fn btb_update(&mut self, tid: ThreadId, _pc: Addr, history: &mut DirHistory) {
        match (self, history) {
            (Self::GShare(p), DirHistory::GShare(h)) => p.btb_update(tid, h),
            (Self::Bimodal(_), DirHistory::Bimodal(h)) => h.pred_taken = false,
            _ => debug_assert!(false, "direction history variant mismatch"),
        }
    }

    /// Resolves a lookup, consuming its token.
    ///
    /// `squashed` marks the mispredict-repair path: the speculative history
    /// is rewritten with the actual outcome before training.
    pub fn update(
        &mut self,
        tid: ThreadId,
        pc: Addr,
        taken: bool,
        history: DirHistory,
        squashed: bool,
        inst: &StaticInst,
        _corr_target: Addr,
    ) {
        match (self, history) {
            (Self::GShare(p), DirHistory::GShare(h)) => {
                p.update(tid, pc, taken, h, squashed, inst.cond)
            }
            (Self::Bimodal(p), DirHistory::Bimodal(_)) => p.update(pc, taken, inst.cond),
            _ => debug_assert!(false, "direction history variant mismatch"),
        }
    }

    /// Rolls a speculative lookup back, consuming its token.
    pub fn squash(&mut self, tid: ThreadId, history: DirHistory) {
        match (self, history) {
            (Self::GShare(p), DirHistory::GShare(h)) => p.squash(tid, h),
            (Self::Bimodal(_), DirHistory::Bimodal(_)) => {}
            _ => debug_assert!(false, "direction history variant mismatch"),
        }
    }

    /// Clears all internal state.
    pub fn reset(&mut self) {
        match self {
            Self::GShare(p) => p.reset(),
            Self::Bimodal(p) => p.reset(),
        }
    }
}
