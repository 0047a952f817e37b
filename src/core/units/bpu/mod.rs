//! Branch Prediction Unit (BPU).
//!
//! The BPU composes the BTB, the RAS, the direction predictor, and the
//! indirect target predictor behind one `predict` call, and keeps one
//! `PredictorHistory` record per predicted branch until the branch either
//! commits or is squashed. It provides:
//! 1. **Prediction:** direction plus target, with provider priority
//!    RAS > indirect predictor > BTB and configurable BTB fallback.
//! 2. **Commit:** retiring history in sequence-number order and training
//!    the sub-predictors.
//! 3. **Squash:** rolling every sub-predictor back to its pre-lookup state,
//!    with optional correction of the mispredicting branch.
//! 4. **Reconciliation:** replacing BTB-hinted instruction information once
//!    pre-decode reveals the true opcode.

/// Branch Target Buffer.
pub mod btb;
/// Direction predictors (GShare, bimodal) behind the capability contract.
pub mod direction;
/// Indirect target predictor.
pub mod indirect;
/// Return Address Stack.
pub mod ras;

use std::collections::VecDeque;

use log::trace;

use crate::common::{Addr, ConfigError, InstSeqNum, PcState, ThreadId};
use crate::config::BpuConfig;
use crate::isa::{BranchClass, StaticInst};
use crate::stats::BpuStats;

use self::btb::Btb;
use self::direction::{DirHistory, DirectionPredictor};
use self::indirect::{IndirectHistory, IndirectPredictor};
use self::ras::{Ras, RasHistory};

/// Per-branch record kept from prediction until commit or squash.
///
/// The sub-predictor tokens live inline as owned values; each is consumed
/// exactly once, by the commit update or by the squash restore.
#[derive(Clone, Debug)]
pub struct PredictorHistory {
    /// Sequence number of the predicted branch.
    pub seq_num: InstSeqNum,
    /// PC of the predicted branch.
    pub pc: Addr,
    /// Owning thread.
    pub tid: ThreadId,
    /// Final direction decision of the BPU.
    pub pred_taken: bool,
    /// Branch classification at prediction time.
    pub class: BranchClass,
    /// The (possibly BTB-hinted) static instruction.
    pub inst: StaticInst,
    /// Predicted next PC; corrected on a mispredict squash.
    pub target: Addr,

    bp_history: Option<DirHistory>,
    indirect_history: Option<IndirectHistory>,
    ras_history: Option<RasHistory>,

    /// The RAS provided the target.
    pub used_ras: bool,
    /// The branch was a call (RAS was pushed).
    pub was_call: bool,
    /// The branch was a return.
    pub was_return: bool,
    /// The branch was register-indirect.
    pub was_indirect: bool,
    /// The branch was unconditional.
    pub was_uncond: bool,
    /// Predicted taken with a BTB-provided target.
    pub was_pred_taken_btb_hit: bool,
    /// Wanted to predict taken but no provider had a target.
    pub was_pred_taken_btb_miss: bool,
}

/// The branch prediction unit.
pub struct BPredUnit {
    btb: Btb,
    direction: DirectionPredictor,
    indirect: IndirectPredictor,
    /// One return-address stack per thread.
    ras: Vec<Ras>,
    /// Per-thread history, youngest entry at the front.
    pred_hist: Vec<VecDeque<PredictorHistory>>,
    /// Fall back to the BTB when the RAS or indirect predictor has no
    /// target; otherwise force not-taken.
    fallback_btb: bool,
    /// Prediction statistics.
    pub stats: BpuStats,
}

impl BPredUnit {
    /// Creates a BPU from the configuration.
    ///
    /// # Errors
    ///
    /// Propagates `ConfigError` from sub-predictor construction (e.g. a
    /// non-power-of-two BTB).
    pub fn new(config: &BpuConfig) -> Result<Self, ConfigError> {
        if !config.indirect_entries.is_power_of_two() {
            return Err(ConfigError::NotPowerOfTwo(
                "indirect_entries",
                config.indirect_entries,
            ));
        }
        if config.ras_size == 0 {
            return Err(ConfigError::ZeroParam("ras_size"));
        }
        Ok(Self {
            btb: Btb::new(config.btb_entries, config.btb_tag_bits, config.inst_shift)?,
            direction: DirectionPredictor::new(config),
            indirect: IndirectPredictor::new(config.indirect_entries, config.inst_shift),
            ras: (0..crate::common::MAX_THREADS)
                .map(|_| Ras::new(config.ras_size))
                .collect(),
            pred_hist: (0..crate::common::MAX_THREADS)
                .map(|_| VecDeque::new())
                .collect(),
            fallback_btb: config.fallback_btb,
            stats: BpuStats::default(),
        })
    }

    /// Predicts direction and target for the branch at `pc`.
    ///
    /// Advances `pc` to the predicted successor (target if taken, next
    /// sequential otherwise), records a `PredictorHistory` entry, and
    /// returns the predicted direction.
    pub fn predict(
        &mut self,
        inst: &StaticInst,
        seq_num: InstSeqNum,
        pc: &mut PcState,
        tid: ThreadId,
    ) -> bool {
        debug_assert!(inst.control, "predict called on a non-control instruction");

        let branch_pc = pc.inst_addr();
        let class = inst.branch_class();
        self.stats.lookups += 1;

        // Direction first. Unconditional control is taken by definition but
        // still threads a history token through the direction predictor so
        // global history stays in sync.
        let mut pred_taken;
        let mut bp_history;
        if inst.is_uncond() {
            pred_taken = true;
            bp_history = self.direction.uncond_branch(tid, branch_pc);
        } else {
            let (taken, h) = self.direction.lookup(tid, branch_pc);
            pred_taken = taken;
            bp_history = h;
            self.stats.cond_predicted += 1;
            if taken {
                self.stats.cond_predicted_taken += 1;
            }
        }

        let mut hist = PredictorHistory {
            seq_num,
            pc: branch_pc,
            tid,
            pred_taken,
            class,
            inst: *inst,
            target: 0,
            bp_history: None,
            indirect_history: None,
            ras_history: None,
            used_ras: false,
            was_call: false,
            was_return: false,
            was_indirect: inst.indirect,
            was_uncond: inst.is_uncond(),
            was_pred_taken_btb_hit: false,
            was_pred_taken_btb_miss: false,
        };

        // Target, by provider priority: RAS for returns, then the indirect
        // predictor, then the BTB for direct branches.
        let mut target: Option<Addr> = None;
        if pred_taken {
            if inst.ret {
                hist.was_return = true;
                let (addr, token) = self.ras[tid].pop();
                let corrupted = token.corrupted();
                hist.ras_history = Some(token);
                if corrupted {
                    self.stats.ras_underflows += 1;
                    target = self.fallback_target(tid, branch_pc);
                } else {
                    hist.used_ras = true;
                    self.stats.ras_used += 1;
                    target = Some(addr);
                }
            } else if inst.indirect {
                self.stats.indirect_lookups += 1;
                let (t, token) = self.indirect.lookup(tid, branch_pc);
                hist.indirect_history = Some(token);
                if t.is_some() {
                    self.stats.indirect_hits += 1;
                    target = t;
                } else {
                    target = self.fallback_target(tid, branch_pc);
                }
            } else {
                self.stats.btb_lookups += 1;
                if let Some(t) = self.btb.lookup(tid, branch_pc) {
                    self.stats.btb_hits += 1;
                    hist.was_pred_taken_btb_hit = true;
                    target = Some(t.inst_addr());
                }
            }

            if target.is_none() {
                // No provider has a target; the only consistent prediction
                // is not-taken. Downstream resolution will correct us.
                pred_taken = false;
                hist.was_pred_taken_btb_miss = true;
                self.stats.pred_taken_btb_miss += 1;
                self.direction.btb_update(tid, branch_pc, &mut bp_history);
            }
        }
        hist.pred_taken = pred_taken;
        hist.bp_history = Some(bp_history);

        if inst.call && pred_taken {
            hist.was_call = true;
            let token = self.ras[tid].push(pc.next_inst_addr());
            debug_assert!(hist.ras_history.is_none());
            hist.ras_history = Some(token);
        }

        if pred_taken {
            // Target is present whenever pred_taken survived.
            if let Some(t) = target {
                pc.set(t);
            }
        } else {
            pc.advance();
        }
        hist.target = pc.inst_addr();

        trace!(
            "[tid:{}] predict sn:{} pc:{:#x} {:?} taken:{} target:{:#x}",
            tid, seq_num, branch_pc, class, pred_taken, hist.target
        );

        debug_assert!(
            self.pred_hist[tid]
                .front()
                .map_or(true, |f| f.seq_num < seq_num),
            "predictor history must stay ordered"
        );
        self.pred_hist[tid].push_front(hist);
        pred_taken
    }

    /// BTB fallback used when the preferred provider has no target.
    fn fallback_target(&mut self, tid: ThreadId, pc: Addr) -> Option<Addr> {
        if !self.fallback_btb {
            return None;
        }
        self.stats.btb_lookups += 1;
        let t = self.btb.lookup(tid, pc);
        if t.is_some() {
            self.stats.btb_hits += 1;
        }
        t.map(|p| p.inst_addr())
    }

    /// Retires history entries with `seq_num <= done_sn`, training the
    /// sub-predictors with the (now architectural) outcomes.
    pub fn update(&mut self, done_sn: InstSeqNum, tid: ThreadId) {
        while self.pred_hist[tid]
            .back()
            .map_or(false, |e| e.seq_num <= done_sn)
        {
            match self.pred_hist[tid].pop_back() {
                Some(entry) => self.commit_entry(entry),
                None => break,
            }
        }
    }

    fn commit_entry(&mut self, entry: PredictorHistory) {
        trace!(
            "[tid:{}] commit sn:{} pc:{:#x} taken:{}",
            entry.tid, entry.seq_num, entry.pc, entry.pred_taken
        );
        if let Some(h) = entry.bp_history {
            self.direction.update(
                entry.tid,
                entry.pc,
                entry.pred_taken,
                h,
                false,
                &entry.inst,
                entry.target,
            );
        }
        if let Some(h) = entry.indirect_history {
            if entry.pred_taken {
                self.indirect
                    .update(entry.tid, entry.pc, entry.target, h, false);
            }
        }
        // A committed call/return keeps its RAS effect; the token is simply
        // dropped.
        self.stats.committed += 1;
    }

    /// Squashes every history entry younger than `squashed_sn`, restoring
    /// sub-predictor state.
    pub fn squash(&mut self, squashed_sn: InstSeqNum, tid: ThreadId) {
        while self.pred_hist[tid]
            .front()
            .map_or(false, |e| e.seq_num > squashed_sn)
        {
            if let Some(entry) = self.pred_hist[tid].pop_front() {
                self.squash_entry(entry);
            }
        }
    }

    fn squash_entry(&mut self, entry: PredictorHistory) {
        trace!(
            "[tid:{}] squash sn:{} pc:{:#x}",
            entry.tid, entry.seq_num, entry.pc
        );
        if let Some(token) = entry.ras_history {
            self.ras[entry.tid].restore(token);
        }
        if let Some(h) = entry.indirect_history {
            self.indirect.squash(entry.tid, h);
        }
        if let Some(h) = entry.bp_history {
            self.direction.squash(entry.tid, h);
        }
        self.stats.squashed += 1;
    }

    /// Squashes younger entries and corrects the mispredicting branch at
    /// `squashed_sn` with its resolved outcome.
    ///
    /// The corrected entry is trained through the `squashed = true` update
    /// path and then popped; the BTB learns `corr_target` whenever the
    /// branch was actually taken.
    pub fn squash_with_correction(
        &mut self,
        squashed_sn: InstSeqNum,
        corr_target: Addr,
        actually_taken: bool,
        tid: ThreadId,
        inst: Option<&StaticInst>,
        pc: Addr,
    ) {
        self.squash(squashed_sn, tid);
        self.stats.corrected += 1;

        let matches = self.pred_hist[tid]
            .front()
            .map_or(false, |e| e.seq_num == squashed_sn);
        if matches {
            let mut entry = match self.pred_hist[tid].pop_front() {
                Some(e) => e,
                None => return,
            };
            entry.target = corr_target;

            // Undo speculative RAS motion that never architecturally
            // happened: a not-taken call must not leave its push, a
            // not-taken return must not lose an entry.
            if let Some(token) = entry.ras_history.take() {
                if !actually_taken && (entry.was_call || entry.was_return) {
                    self.ras[tid].restore(token);
                }
            }

            if let Some(h) = entry.bp_history.take() {
                let static_inst = inst.copied().unwrap_or(entry.inst);
                self.direction.update(
                    tid,
                    entry.pc,
                    actually_taken,
                    h,
                    true,
                    &static_inst,
                    corr_target,
                );
            }
            if let Some(h) = entry.indirect_history.take() {
                if actually_taken {
                    self.indirect.update(tid, entry.pc, corr_target, h, true);
                } else {
                    self.indirect.squash(tid, h);
                }
            }

            if actually_taken {
                let static_inst = inst.copied().unwrap_or(entry.inst);
                self.btb
                    .update(tid, entry.pc, PcState::new(corr_target), static_inst);
            }
        } else if actually_taken {
            // The branch was never predicted (typically a cold BTB): teach
            // the BTB so the decoupled producer can find it next time.
            if let Some(static_inst) = inst {
                self.btb
                    .update(tid, pc, PcState::new(corr_target), *static_inst);
            }
        }
    }

    /// Reconciles a history entry with the true pre-decoded instruction.
    ///
    /// Returns `false` when the predicted and actual instruction classes
    /// are irreconcilable (different indirection, call, or return shape);
    /// the caller must then squash from decode.
    pub fn update_static_inst(
        &mut self,
        seq_num: InstSeqNum,
        inst: &StaticInst,
        tid: ThreadId,
    ) -> bool {
        let entry = self.pred_hist[tid]
            .iter_mut()
            .find(|e| e.seq_num == seq_num);
        let entry = match entry {
            Some(e) => e,
            None => return true,
        };
        let old = entry.inst;
        if old.indirect != inst.indirect || old.call != inst.call || old.ret != inst.ret {
            return false;
        }
        entry.inst = *inst;
        entry.class = inst.branch_class();
        true
    }

    /// Whether the BTB holds an entry for `pc` on `tid`.
    pub fn btb_valid(&self, tid: ThreadId, pc: Addr) -> bool {
        self.btb.valid(tid, pc)
    }

    /// BTB target lookup, for the fetch-target producer.
    pub fn btb_lookup(&self, tid: ThreadId, pc: Addr) -> Option<PcState> {
        self.btb.lookup(tid, pc)
    }

    /// BTB pre-decode hint lookup, for the fetch-target producer.
    pub fn btb_lookup_inst(&self, tid: ThreadId, pc: Addr) -> Option<StaticInst> {
        self.btb.lookup_inst(tid, pc)
    }

    /// Number of outstanding history entries for `tid`.
    pub fn history_len(&self, tid: ThreadId) -> usize {
        self.pred_hist[tid].len()
    }

    /// Sequence number of the youngest outstanding entry for `tid`.
    pub fn youngest_seq_num(&self, tid: ThreadId) -> Option<InstSeqNum> {
        self.pred_hist[tid].front().map(|e| e.seq_num)
    }

    /// The current top of `tid`'s return address stack.
    pub fn ras_top(&self, tid: ThreadId) -> Option<Addr> {
        self.ras[tid].top()
    }

    /// Invalidates all predictor state.
    ///
    /// Equivalent to a BTB reset plus direction/indirect resets. Must not
    /// be called with outstanding history.
    pub fn mem_invalidate(&mut self) {
        self.drain_sanity_check();
        self.btb.reset();
        self.direction.reset();
        self.indirect.reset();
        for ras in &mut self.ras {
            ras.reset();
        }
    }

    /// Invalidates a BTB index range, for warm-up studies.
    pub fn reset_btb_range(&mut self, start: usize, end: usize) {
        self.btb.reset_range(start, end);
    }

    /// Verifies that no speculative history survived a drain.
    ///
    /// Fatal in debug builds only.
    pub fn drain_sanity_check(&self) {
        for (tid, hist) in self.pred_hist.iter().enumerate() {
            debug_assert!(
                hist.is_empty(),
                "thread {} drained with {} live history entries",
                tid,
                hist.len()
            );
        }
    }
}
