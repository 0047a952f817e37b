//! Branch Target Buffer (BTB).
//!
//! The BTB is a direct-mapped cache that stores target addresses for
//! control flow instructions, shared across SMT threads with the thread id
//! folded into the index and checked on hit. Each entry also caches the
//! pre-decoded instruction so the fetch-target producer can classify a
//! branch it has never decoded.

use crate::common::{Addr, ConfigError, MAX_THREADS, PcState, ThreadId};
use crate::isa::StaticInst;

/// An entry in the Branch Target Buffer.
#[derive(Clone, Copy, Default)]
struct BtbEntry {
    /// The tag used to verify if this entry corresponds to the requested PC.
    tag: Addr,
    /// Owning thread.
    tid: ThreadId,
    /// The predicted target.
    target: PcState,
    /// Pre-decoded hint for the branch at this PC.
    inst: StaticInst,
    /// Indicates if this entry contains valid data.
    valid: bool,
}

/// Branch Target Buffer structure.
pub struct Btb {
    /// The table of BTB entries.
    table: Vec<BtbEntry>,
    /// Index mask (entries - 1).
    idx_mask: usize,
    /// Tag mask ((1 << tag_bits) - 1).
    tag_mask: Addr,
    /// Low PC bits ignored by indexing.
    inst_shift: usize,
    /// Shift applied to the PC to extract the tag.
    tag_shift: usize,
    /// Shift applied to the thread id when hashing it into the index.
    tid_shift: usize,
}

impl Btb {
    /// Creates a new Branch Target Buffer.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::NotPowerOfTwo` when `num_entries` is not a
    /// power of two.
    pub fn new(
        num_entries: usize,
        tag_bits: usize,
        inst_shift: usize,
    ) -> Result<Self, ConfigError> {
        if !num_entries.is_power_of_two() {
            return Err(ConfigError::NotPowerOfTwo("btb_entries", num_entries));
        }
        let log2_entries = num_entries.trailing_zeros() as usize;
        let log2_threads = MAX_THREADS.trailing_zeros() as usize;
        Ok(Self {
            table: vec![BtbEntry::default(); num_entries],
            idx_mask: num_entries - 1,
            tag_mask: (1u64 << tag_bits) - 1,
            inst_shift,
            tag_shift: inst_shift + log2_entries,
            tid_shift: log2_entries.saturating_sub(log2_threads),
        })
    }

    /// Calculates the index into the table for a given PC and thread.
    ///
    /// The thread id is XOR-folded into the upper index bits so SMT
    /// threads spread across the table instead of aliasing.
    fn index(&self, pc: Addr, tid: ThreadId) -> usize {
        (((pc >> self.inst_shift) as usize) ^ (tid << self.tid_shift)) & self.idx_mask
    }

    fn tag(&self, pc: Addr) -> Addr {
        (pc >> self.tag_shift) & self.tag_mask
    }

    /// Whether a matching entry exists for `pc` on `tid`.
    pub fn valid(&self, tid: ThreadId, pc: Addr) -> bool {
        let e = &self.table[self.index(pc, tid)];
        e.valid && e.tag == self.tag(pc) && e.tid == tid
    }

    /// Looks up the predicted target for `pc` on `tid`.
    pub fn lookup(&self, tid: ThreadId, pc: Addr) -> Option<PcState> {
        let e = &self.table[self.index(pc, tid)];
        if e.valid && e.tag == self.tag(pc) && e.tid == tid {
            Some(e.target)
        } else {
            None
        }
    }

    /// Looks up the cached pre-decode hint for `pc` on `tid`.
    ///
    /// Only branches that hit in the BTB carry this information; the
    /// decoupled producer relies on it because nothing has been decoded at
    /// prediction time.
    pub fn lookup_inst(&self, tid: ThreadId, pc: Addr) -> Option<StaticInst> {
        let e = &self.table[self.index(pc, tid)];
        if e.valid && e.tag == self.tag(pc) && e.tid == tid {
            Some(e.inst)
        } else {
            None
        }
    }

    /// Installs or overwrites the entry for `pc` on `tid`.
    pub fn update(&mut self, tid: ThreadId, pc: Addr, target: PcState, inst: StaticInst) {
        let idx = self.index(pc, tid);
        self.table[idx] = BtbEntry {
            tag: self.tag(pc),
            tid,
            target,
            inst,
            valid: true,
        };
    }

    /// Invalidates every entry.
    pub fn reset(&mut self) {
        for e in &mut self.table {
            e.valid = false;
        }
    }

    /// Invalidates entries in the index range `[start, end)`.
    ///
    /// Used by warm-up studies to cold a slice of the table.
    pub fn reset_range(&mut self, start: usize, end: usize) {
        let end = end.min(self.table.len());
        for e in &mut self.table[start.min(end)..end] {
            e.valid = false;
        }
    }
}
