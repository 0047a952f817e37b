//! Indirect target predictor.
//!
//! Predicts targets for register-indirect branches by hashing the branch
//! PC with a per-thread path history register over a tagged target table.
//! Like the direction predictor, every lookup yields an owned token which
//! is consumed by exactly one of `update` or `squash`, restoring the path
//! history on mis-speculation.

use crate::common::{Addr, MAX_THREADS, ThreadId};

/// An entry in the indirect target table.
#[derive(Clone, Copy, Default)]
struct IndirectEntry {
    tag: Addr,
    tid: ThreadId,
    target: Addr,
    valid: bool,
}

/// History token for one indirect lookup.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IndirectHistory {
    /// Path history register before the speculative shift.
    path: u64,
    /// Whether the table provided a target.
    pub hit: bool,
}

/// Tagged indirect-target table with per-thread path history.
pub struct IndirectPredictor {
    table: Vec<IndirectEntry>,
    mask: u64,
    inst_shift: usize,
    /// Per-thread path history, shifted speculatively at lookup.
    path: [u64; MAX_THREADS],
}

impl IndirectPredictor {
    /// Creates a predictor with `entries` slots (power of two, validated
    /// by the owning configuration).
    pub fn new(entries: usize, inst_shift: usize) -> Self {
        Self {
            table: vec![IndirectEntry::default(); entries.max(1)],
            mask: entries.max(1) as u64 - 1,
            inst_shift,
            path: [0; MAX_THREADS],
        }
    }

    fn index(&self, pc: Addr, path: u64) -> usize {
        (((pc >> self.inst_shift) ^ path) & self.mask) as usize
    }

    /// Looks up a target for the indirect branch at `pc`.
    ///
    /// The path history is folded with the branch address speculatively;
    /// the token restores it on squash.
    pub fn lookup(&mut self, tid: ThreadId, pc: Addr) -> (Option<Addr>, IndirectHistory) {
        let path = self.path[tid];
        let e = &self.table[self.index(pc, path)];
        let target = if e.valid && e.tag == pc && e.tid == tid {
            Some(e.target)
        } else {
            None
        };
        self.path[tid] = (path << 4) ^ (pc >> self.inst_shift);
        (
            target,
            IndirectHistory {
                path,
                hit: target.is_some(),
            },
        )
    }

    /// Resolves a lookup with the actual target, consuming its token.
    pub fn update(
        &mut self,
        tid: ThreadId,
        pc: Addr,
        target: Addr,
        history: IndirectHistory,
        squashed: bool,
    ) {
        if squashed {
            self.path[tid] = (history.path << 4) ^ (pc >> self.inst_shift);
        }
        let idx = self.index(pc, history.path);
        self.table[idx] = IndirectEntry {
            tag: pc,
            tid,
            target,
            valid: true,
        };
    }

    /// Rolls a speculative lookup back, consuming its token.
    pub fn squash(&mut self, tid: ThreadId, history: IndirectHistory) {
        self.path[tid] = history.path;
    }

    /// Clears the table and all path histories.
    pub fn reset(&mut self) {
        for e in &mut self.table {
            e.valid = false;
        }
        self.path = [0; MAX_THREADS];
    }
}
