//! Frontend statistics collection.
//!
//! This module tracks performance counters for the fetch frontend. It
//! provides:
//! 1. **Fetch activity:** instructions, branches, and cache lines fetched.
//! 2. **Stall profile:** cycles lost to each wait state of the fetch engine.
//! 3. **Recovery:** squash cycles and dropped in-flight accesses.
//! 4. **Branch prediction:** lookups, hit rates, and per-provider outcomes.

/// Fetch engine statistics.
#[derive(Clone, Debug, Default)]
pub struct FetchStats {
    /// Instructions delivered into the fetch queues.
    pub insts: u64,
    /// Branches fetched.
    pub branches: u64,
    /// Branches fetched with a predicted-taken terminal target.
    pub predicted_branches: u64,
    /// Cache lines (fetch buffers) filled.
    pub cache_lines: u64,
    /// Cycles in which fetch produced at least one instruction.
    pub fetch_cycles: u64,
    /// Total cycles ticked.
    pub cycles: u64,

    /// Cycles spent squashing.
    pub squash_cycles: u64,
    /// Cycles stalled waiting for address translation.
    pub tlb_cycles: u64,
    /// Cycles stalled on an outstanding I-cache access.
    pub icache_stall_cycles: u64,
    /// Cycles stalled waiting for the I-cache port to accept a retry.
    pub icache_wait_retry_cycles: u64,
    /// Cycles stalled with an empty fetch target queue.
    pub ftq_stall_cycles: u64,
    /// Cycles with no active thread able to fetch.
    pub idle_cycles: u64,
    /// Cycles blocked by downstream backpressure.
    pub blocked_cycles: u64,
    /// Cycles stalled on a pending trap.
    pub pending_trap_cycles: u64,
    /// Cycles stalled on a pending quiesce.
    pub pending_quiesce_cycles: u64,
    /// Cycles stalled waiting for a drain to complete.
    pub pending_drain_cycles: u64,
    /// Cycles lost to any other wait state.
    pub misc_stall_cycles: u64,

    /// Outstanding I-cache accesses dropped by a squash.
    pub icache_squashes: u64,
    /// Outstanding translations dropped by a squash.
    pub tlb_squashes: u64,
}

impl FetchStats {
    /// Instructions fetched per ticked cycle.
    pub fn rate(&self) -> f64 {
        if self.cycles == 0 {
            0.0
        } else {
            self.insts as f64 / self.cycles as f64
        }
    }

    /// Fraction of ticked cycles that produced no instructions.
    pub fn idle_rate(&self) -> f64 {
        if self.cycles == 0 {
            0.0
        } else {
            1.0 - self.fetch_cycles as f64 / self.cycles as f64
        }
    }

    /// Branches fetched per ticked cycle.
    pub fn branch_rate(&self) -> f64 {
        if self.cycles == 0 {
            0.0
        } else {
            self.branches as f64 / self.cycles as f64
        }
    }
}

/// Branch prediction unit statistics.
#[derive(Clone, Debug, Default)]
pub struct BpuStats {
    /// Predictions requested.
    pub lookups: u64,
    /// Conditional branches predicted.
    pub cond_predicted: u64,
    /// Conditional branches predicted taken.
    pub cond_predicted_taken: u64,

    /// BTB probes.
    pub btb_lookups: u64,
    /// BTB probes that hit.
    pub btb_hits: u64,
    /// Branches predicted taken whose target missed in the BTB.
    pub pred_taken_btb_miss: u64,

    /// Indirect target lookups.
    pub indirect_lookups: u64,
    /// Indirect target lookups that hit.
    pub indirect_hits: u64,

    /// Returns whose target came from the RAS.
    pub ras_used: u64,
    /// Returns that found the RAS empty.
    pub ras_underflows: u64,

    /// History entries retired at commit.
    pub committed: u64,
    /// History entries removed by squashes.
    pub squashed: u64,
    /// Squashes that corrected a mispredicted branch.
    pub corrected: u64,
}

impl BpuStats {
    /// Ratio of BTB hits to BTB probes.
    pub fn btb_hit_ratio(&self) -> f64 {
        if self.btb_lookups == 0 {
            0.0
        } else {
            self.btb_hits as f64 / self.btb_lookups as f64
        }
    }
}
