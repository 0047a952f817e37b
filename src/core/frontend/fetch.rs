//! The fetch engine.
//!
//! Fetch runs once per cycle and, in order: delivers due deferred events,
//! processes backward signals (squashes, backpressure, commit updates),
//! lets the BPU-driven producer extend the fetch target queues, fetches
//! instructions for the selected thread from the front basic block, and
//! hands completed instructions to decode over the time-buffered wire.
//!
//! Every thread carries its own small state machine; wait states park the
//! thread until an event (cache response, translation completion, retry)
//! moves it forward. A squash at any point resets the thread's queues,
//! buffers, and predictor history to the youngest surviving sequence
//! number.

use std::collections::VecDeque;

use log::{debug, trace};

use crate::common::{
    Addr, Cycle, Fault, INST_BYTES, INVALID_THREAD_ID, InstSeqNum, MAX_THREADS, PcState, ThreadId,
};
use crate::config::FrontendConfig;
use crate::core::units::bpu::BPredUnit;
use crate::isa::{DynInst, InstDecoder, StaticInst};
use crate::mem::{FetchPacket, FetchRequest, InstMmu, InstPort};
use crate::sim::{EventQueue, FetchBundle, FrontendEvent, TimeBuffer, TimeComm};
use crate::stats::FetchStats;

use super::ftq::{BasicBlock, Ftq};
use super::policy::SmtFetchPolicy;

/// Sequence numbers reserved per block instruction, leaving room for
/// macro-op expansion inside the block's window.
const SEQ_NUMS_PER_INST: u64 = 4;

/// Per-thread fetch state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ThreadStatus {
    /// Ready to fetch.
    Running,
    /// Not participating in fetch.
    Idle,
    /// Squash processed this cycle; resumes next cycle.
    Squashing,
    /// Held back by downstream backpressure.
    Blocked,
    /// Actively fetching this cycle.
    Fetching,
    /// A faulting instruction was delivered; waiting for the trap squash.
    TrapPending,
    /// Parked on a quiesce until woken.
    QuiescePending,
    /// Waiting for address translation.
    ItlbWait,
    /// Waiting for the I-cache response.
    IcacheWaitResponse,
    /// Waiting for the I-cache port to accept a retry.
    IcacheWaitRetry,
    /// Cache response arrived; resumes next cycle.
    IcacheAccessComplete,
    /// No fetch target available.
    FtqEmpty,
    /// The fetch PC does not map to fetchable memory.
    NoGoodAddr,
}

/// Per-thread fetch target queue state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FtqStatus {
    /// Producing targets.
    Active,
    /// Purged by a squash this cycle.
    Squash,
    /// At capacity.
    Full,
    /// Thread not participating.
    Inactive,
}

/// Sources of fetch stalls signalled from downstream.
#[derive(Clone, Copy, Debug, Default)]
struct Stalls {
    decode: bool,
    drain: bool,
}

/// One thread's fetch buffer: a cache-line-sized window of bytes.
struct FetchBuffer {
    data: Box<[u8]>,
    pc: Addr,
    valid: bool,
}

impl FetchBuffer {
    fn new(size: usize) -> Self {
        Self {
            data: vec![0; size].into_boxed_slice(),
            pc: 0,
            valid: false,
        }
    }

    fn covers(&self, aligned: Addr) -> bool {
        self.valid && self.pc == aligned
    }
}

/// The fetch stage of the decoupled frontend.
pub struct Fetch {
    // Composition.
    /// The branch prediction unit driving the fetch-target producer.
    pub bpu: BPredUnit,
    decoders: Vec<Box<dyn InstDecoder>>,
    mmu: Box<dyn InstMmu>,
    icache_port: Box<dyn InstPort>,

    // Configuration.
    fetch_width: usize,
    decode_width: usize,
    fetch_queue_size: usize,
    fetch_buffer_size: usize,
    fetch_buffer_mask: Addr,
    max_bb_insts: u64,
    num_threads: usize,
    policy: SmtFetchPolicy,
    decode_to_fetch_delay: u64,
    iew_to_fetch_delay: u64,
    commit_to_fetch_delay: u64,

    // Per-thread state.
    fetch_status: [ThreadStatus; MAX_THREADS],
    ftq_status: [FtqStatus; MAX_THREADS],
    ftq: Vec<Ftq>,
    /// The decoupled PC the producer runs ahead with.
    bpu_pc: [PcState; MAX_THREADS],
    /// The architectural fetch PC.
    pc: [PcState; MAX_THREADS],
    macroop: [Option<StaticInst>; MAX_THREADS],
    fetch_buffer: Vec<FetchBuffer>,
    prefetch_buffer: Vec<FetchBuffer>,
    fetch_queue: Vec<VecDeque<DynInst>>,
    stalls: [Stalls; MAX_THREADS],
    /// Outstanding demand request (id, aligned vaddr).
    outstanding_req: [Option<(u64, Addr)>; MAX_THREADS],
    /// Outstanding pipelined prefetch (id, aligned vaddr).
    prefetch_req: [Option<(u64, Addr)>; MAX_THREADS],
    /// Squash generation; in-flight work carries the generation it was
    /// issued under and is dropped when stale.
    squash_gen: [u64; MAX_THREADS],
    issue_pipelined_ifetch: [bool; MAX_THREADS],

    // Global state.
    active_threads: Vec<ThreadId>,
    priority_list: VecDeque<ThreadId>,
    retry_pkt: Option<FetchPacket>,
    retry_tid: ThreadId,
    cache_blocked: bool,
    next_req_id: u64,
    /// Allocator for basic-block sequence windows; never reused.
    next_bb_seq: InstSeqNum,
    num_inst: usize,
    wrote_to_time_buffer: bool,
    cycle: Cycle,

    events: EventQueue,
    backwards: TimeBuffer<TimeComm>,
    to_decode: TimeBuffer<FetchBundle>,

    /// Fetch statistics.
    pub stats: FetchStats,
}

impl Fetch {
    /// Creates the fetch stage from a validated configuration and its
    /// external collaborators.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` for invalid parameters or when fewer decoders
    /// than threads are supplied.
    pub fn new(
        config: &FrontendConfig,
        decoders: Vec<Box<dyn InstDecoder>>,
        mmu: Box<dyn InstMmu>,
        icache_port: Box<dyn InstPort>,
    ) -> Result<Self, crate::common::ConfigError> {
        config.validate()?;
        if decoders.len() < config.fetch.num_threads {
            return Err(crate::common::ConfigError::ZeroParam("decoders"));
        }
        let fb_size = config.fetch.fetch_buffer_size;
        let backward_depth = (config.delays.max_backward() + 1) as usize;
        Ok(Self {
            bpu: BPredUnit::new(&config.bpu)?,
            decoders,
            mmu,
            icache_port,
            fetch_width: config.fetch.fetch_width,
            decode_width: config.fetch.decode_width,
            fetch_queue_size: config.fetch.fetch_queue_size,
            fetch_buffer_size: fb_size,
            fetch_buffer_mask: fb_size as Addr - 1,
            max_bb_insts: config.fetch.max_bb_insts,
            num_threads: config.fetch.num_threads,
            policy: config.fetch.policy,
            decode_to_fetch_delay: config.delays.decode_to_fetch,
            iew_to_fetch_delay: config.delays.iew_to_fetch,
            commit_to_fetch_delay: config.delays.commit_to_fetch,
            fetch_status: [ThreadStatus::Idle; MAX_THREADS],
            ftq_status: [FtqStatus::Inactive; MAX_THREADS],
            ftq: (0..MAX_THREADS).map(|_| Ftq::new(config.fetch.ftq_size)).collect(),
            bpu_pc: [PcState::default(); MAX_THREADS],
            pc: [PcState::default(); MAX_THREADS],
            macroop: [None; MAX_THREADS],
            fetch_buffer: (0..MAX_THREADS).map(|_| FetchBuffer::new(fb_size)).collect(),
            prefetch_buffer: (0..MAX_THREADS).map(|_| FetchBuffer::new(fb_size)).collect(),
            fetch_queue: (0..MAX_THREADS).map(|_| VecDeque::new()).collect(),
            stalls: [Stalls::default(); MAX_THREADS],
            outstanding_req: [None; MAX_THREADS],
            prefetch_req: [None; MAX_THREADS],
            squash_gen: [0; MAX_THREADS],
            issue_pipelined_ifetch: [false; MAX_THREADS],
            active_threads: Vec::new(),
            priority_list: VecDeque::new(),
            retry_pkt: None,
            retry_tid: INVALID_THREAD_ID,
            cache_blocked: false,
            next_req_id: 1,
            next_bb_seq: 0,
            num_inst: 0,
            wrote_to_time_buffer: false,
            cycle: 0,
            events: EventQueue::new(),
            backwards: TimeBuffer::new(backward_depth),
            to_decode: TimeBuffer::new(2),
            stats: FetchStats::default(),
        })
    }

    /// Activates `tid` fetching from `addr`.
    pub fn start_thread(&mut self, tid: ThreadId, addr: Addr) {
        debug_assert!(tid < self.num_threads);
        self.pc[tid] = PcState::new(addr);
        self.bpu_pc[tid] = PcState::new(addr);
        self.fetch_status[tid] = ThreadStatus::Running;
        self.ftq_status[tid] = FtqStatus::Active;
        if !self.active_threads.contains(&tid) {
            self.active_threads.push(tid);
            self.priority_list.push_back(tid);
        }
    }

    /// Removes a drained thread from the fetch rotation.
    pub fn deactivate_thread(&mut self, tid: ThreadId) {
        self.active_threads.retain(|&t| t != tid);
        self.priority_list.retain(|&t| t != tid);
        self.fetch_status[tid] = ThreadStatus::Idle;
        self.ftq_status[tid] = FtqStatus::Inactive;
    }

    /// Parks `tid` until [`Fetch::wake_from_quiesce`].
    pub fn quiesce(&mut self, tid: ThreadId) {
        self.fetch_status[tid] = ThreadStatus::QuiescePending;
    }

    /// Wakes every quiesced thread.
    pub fn wake_from_quiesce(&mut self) {
        for tid in 0..self.num_threads {
            if self.fetch_status[tid] == ThreadStatus::QuiescePending {
                self.fetch_status[tid] = ThreadStatus::Running;
            }
        }
    }

    /// Aligns an address to the start of a fetch buffer block.
    #[inline]
    pub fn fetch_buffer_align(&self, addr: Addr) -> Addr {
        addr & !self.fetch_buffer_mask
    }

    /// The per-thread status, for the embedding simulator and tests.
    pub fn status(&self, tid: ThreadId) -> ThreadStatus {
        self.fetch_status[tid]
    }

    /// The per-thread FTQ status.
    pub fn ftq_status(&self, tid: ThreadId) -> FtqStatus {
        self.ftq_status[tid]
    }

    /// The architectural fetch PC of `tid`.
    pub fn pc(&self, tid: ThreadId) -> PcState {
        self.pc[tid]
    }

    /// The producer's decoupled PC for `tid`.
    pub fn bpu_pc(&self, tid: ThreadId) -> PcState {
        self.bpu_pc[tid]
    }

    /// Number of basic blocks queued for `tid`.
    pub fn ftq_len(&self, tid: ThreadId) -> usize {
        self.ftq[tid].len()
    }

    /// Number of instructions queued for decode from `tid`.
    pub fn fetch_queue_len(&self, tid: ThreadId) -> usize {
        self.fetch_queue[tid].len()
    }

    /// Instructions waiting in `tid`'s fetch queue.
    pub fn fetch_queue(&self, tid: ThreadId) -> impl Iterator<Item = &DynInst> {
        self.fetch_queue[tid].iter()
    }

    /// The backward-signal slot downstream stages write this cycle.
    pub fn signals_mut(&mut self) -> &mut TimeComm {
        self.backwards.now_mut()
    }

    /// The instruction bundle decode receives this cycle (written by the
    /// previous `tick`).
    pub fn from_fetch(&self) -> &FetchBundle {
        self.to_decode.at(1)
    }

    /// Whether the last tick put instructions on the decode wire; the
    /// embedding CPU uses this for activity tracking.
    pub fn wrote_to_time_buffer(&self) -> bool {
        self.wrote_to_time_buffer
    }

    /// Runs one cycle of the fetch stage.
    pub fn tick(&mut self) {
        self.cycle += 1;
        self.stats.cycles += 1;
        self.num_inst = 0;
        self.wrote_to_time_buffer = false;
        let mut status_change = false;

        // Deferred events land before any same-cycle consumer runs.
        self.process_events();

        for tid in self.active_threads.clone() {
            status_change |= self.check_signals_and_update(tid);
        }

        self.produce_fetch_targets(&mut status_change);
        self.fetch(&mut status_change);
        if self.num_inst > 0 {
            self.stats.fetch_cycles += 1;
        }

        for tid in 0..self.num_threads {
            if self.issue_pipelined_ifetch[tid] {
                self.issue_pipelined_ifetch[tid] = false;
                self.pipeline_icache_accesses(tid);
            }
        }

        self.send_to_decode();
        self.profile_stalls();

        self.backwards.advance();
        self.to_decode.advance();
    }

    // ------------------------------------------------------------------
    // Backward signals
    // ------------------------------------------------------------------

    /// Checks all input signals for `tid` and updates its status.
    ///
    /// Returns whether the status changed.
    fn check_signals_and_update(&mut self, tid: ThreadId) -> bool {
        let commit = self.backwards.at(self.commit_to_fetch_delay).commit[tid].clone();
        let decode = self.backwards.at(self.decode_to_fetch_delay).decode[tid].clone();

        // Commit retires predictor history even when nothing is squashed.
        if let Some(done) = commit.done_seq_num {
            self.bpu.update(done, tid);
        }

        if decode.block {
            self.stalls[tid].decode = true;
        }
        if decode.unblock {
            self.stalls[tid].decode = false;
        }

        // A commit-level squash overrides everything younger.
        if commit.squash {
            self.squash(
                commit.squash_pc,
                commit.squash_seq_num,
                commit.mispredict_inst.as_ref(),
                commit.branch_mispredict,
                commit.branch_taken,
                commit.branch_pc,
                tid,
            );
            return true;
        }

        if decode.squash {
            self.squash_from_decode(
                decode.squash_pc,
                decode.squash_seq_num,
                decode.mispredict_inst.as_ref(),
                decode.branch_taken,
                decode.branch_pc,
                tid,
            );
            return true;
        }

        if self.fetch_status[tid] == ThreadStatus::Squashing {
            self.fetch_status[tid] = ThreadStatus::Running;
            return true;
        }

        if self.stalls[tid].decode {
            if matches!(
                self.fetch_status[tid],
                ThreadStatus::Running | ThreadStatus::FtqEmpty | ThreadStatus::IcacheAccessComplete
            ) {
                self.fetch_status[tid] = ThreadStatus::Blocked;
                return true;
            }
        } else if self.fetch_status[tid] == ThreadStatus::Blocked {
            self.fetch_status[tid] = ThreadStatus::Running;
            return true;
        }

        false
    }

    // ------------------------------------------------------------------
    // Squash and drain
    // ------------------------------------------------------------------

    /// Squash actions shared by every recovery source.
    fn do_squash(&mut self, new_pc: Addr, tid: ThreadId) {
        debug!("[tid:{}] squash, redirecting to {:#x}", tid, new_pc);
        self.pc[tid] = PcState::new(new_pc);
        self.macroop[tid] = None;
        self.decoders[tid].reset();

        // The buffer survives only if the redirect lands inside it.
        let aligned = self.fetch_buffer_align(new_pc);
        if self.fetch_buffer[tid].valid && self.fetch_buffer[tid].pc != aligned {
            self.fetch_buffer[tid].valid = false;
        }
        self.prefetch_buffer[tid].valid = false;

        // Abandon in-flight work. Responses for old requests are dropped on
        // arrival; pending translations die by generation.
        self.outstanding_req[tid] = None;
        self.prefetch_req[tid] = None;
        self.squash_gen[tid] += 1;
        if self.retry_tid == tid {
            self.retry_pkt = None;
            self.retry_tid = INVALID_THREAD_ID;
            self.cache_blocked = false;
        }

        self.do_ftq_squash(new_pc, tid);
        self.fetch_queue[tid].clear();

        self.fetch_status[tid] = ThreadStatus::Squashing;
        self.stats.squash_cycles += 1;
    }

    /// Squash from commit: clears all frontend state younger than
    /// `squash_seq_num` and redirects `tid` to `new_pc`.
    ///
    /// `mispredict` distinguishes branch corrections (which teach the BPU
    /// the resolved outcome) from trap squashes.
    pub fn squash(
        &mut self,
        new_pc: Addr,
        squash_seq_num: InstSeqNum,
        squash_inst: Option<&StaticInst>,
        mispredict: bool,
        branch_taken: bool,
        branch_pc: Addr,
        tid: ThreadId,
    ) {
        self.do_squash(new_pc, tid);
        if mispredict {
            self.bpu.squash_with_correction(
                squash_seq_num,
                new_pc,
                branch_taken,
                tid,
                squash_inst,
                branch_pc,
            );
        } else {
            self.bpu.squash(squash_seq_num, tid);
        }
    }

    /// Squash from decode: reconciles the pre-decoded instruction with the
    /// predictor history first, then squashes with correction.
    pub fn squash_from_decode(
        &mut self,
        new_pc: Addr,
        squash_seq_num: InstSeqNum,
        inst: Option<&StaticInst>,
        branch_taken: bool,
        branch_pc: Addr,
        tid: ThreadId,
    ) {
        if let Some(i) = inst {
            // An irreconcilable type mismatch still squashes; the history
            // entry keeps its original class and learns the corrected
            // target below.
            let _ = self.bpu.update_static_inst(squash_seq_num, i, tid);
        }
        self.do_squash(new_pc, tid);
        self.bpu
            .squash_with_correction(squash_seq_num, new_pc, branch_taken, tid, inst, branch_pc);
    }

    /// Purges `tid`'s FTQ and resets the producer PC, leaving the fetch
    /// queue untouched.
    pub fn do_ftq_squash(&mut self, new_pc: Addr, tid: ThreadId) {
        self.ftq[tid].purge();
        self.bpu_pc[tid] = PcState::new(new_pc);
        self.ftq_status[tid] = FtqStatus::Squash;
    }

    /// Stalls fetch for `tid` until the pipeline drains.
    pub fn drain_stall(&mut self, tid: ThreadId) {
        self.stalls[tid].drain = true;
    }

    /// Resumes fetching after a drain.
    pub fn drain_resume(&mut self) {
        for tid in 0..self.num_threads {
            self.stalls[tid].drain = false;
        }
    }

    /// Whether every thread has quiesced all outstanding fetch work.
    pub fn is_drained(&self) -> bool {
        if self.retry_pkt.is_some() || !self.events.is_empty() {
            return false;
        }
        (0..self.num_threads).all(|tid| {
            self.fetch_queue[tid].is_empty()
                && self.outstanding_req[tid].is_none()
                && self.prefetch_req[tid].is_none()
                && !matches!(
                    self.fetch_status[tid],
                    ThreadStatus::ItlbWait
                        | ThreadStatus::IcacheWaitResponse
                        | ThreadStatus::IcacheWaitRetry
                )
        })
    }

    /// Verifies drain integrity. Fatal in debug builds only.
    pub fn drain_sanity_check(&self) {
        debug_assert!(self.is_drained(), "drain sanity check failed");
        for tid in 0..self.num_threads {
            debug_assert!(
                self.fetch_queue[tid].is_empty(),
                "thread {} drained with queued instructions",
                tid
            );
        }
    }

    // ------------------------------------------------------------------
    // FTQ production (the decoupled BPU-driven producer)
    // ------------------------------------------------------------------

    /// Extends every active thread's FTQ by up to `fetch_width` BTB probes.
    fn produce_fetch_targets(&mut self, status_change: &mut bool) {
        for tid in self.active_threads.clone() {
            if self.stalls[tid].drain || self.ftq_status[tid] == FtqStatus::Inactive {
                continue;
            }
            if self.fetch_status[tid] == ThreadStatus::Squashing {
                // The redirect takes effect next cycle.
                continue;
            }
            self.ftq_status[tid] = FtqStatus::Active;

            let mut probes = 0;
            while probes < self.fetch_width {
                if self.ftq[tid].is_full() {
                    self.ftq_status[tid] = FtqStatus::Full;
                    break;
                }

                // Make sure an open block exists at the producer PC.
                let need_open = self.ftq[tid].back().map_or(true, BasicBlock::is_sealed);
                if need_open {
                    let window = self.max_bb_insts * SEQ_NUMS_PER_INST + 1;
                    let bb = BasicBlock::new(tid, self.bpu_pc[tid], self.next_bb_seq, window);
                    trace!(
                        "[tid:{}] FTQ open block at {:#x} window [{}, {})",
                        tid,
                        bb.start_address(),
                        bb.start_seq_num,
                        bb.br_seq_num
                    );
                    self.next_bb_seq += window;
                    self.ftq[tid].push_back(bb);
                    if self.fetch_status[tid] == ThreadStatus::FtqEmpty {
                        self.fetch_status[tid] = ThreadStatus::Running;
                        *status_change = true;
                    }
                }

                probes += 1;
                let addr = self.bpu_pc[tid].inst_addr();

                // Size cap: seal as a fall-through block and reopen.
                let (start, insts_so_far) = {
                    let back = self.ftq[tid].back().map(|b| b.start_address());
                    let start = match back {
                        Some(s) => s,
                        None => break,
                    };
                    (start, (addr - start) / INST_BYTES)
                };
                if insts_so_far >= self.max_bb_insts {
                    let end = PcState::new(addr - INST_BYTES);
                    if let Some(back) = self.ftq[tid].back_mut() {
                        back.add_terminal_no_branch(end, PcState::new(addr));
                    }
                    trace!(
                        "[tid:{}] FTQ cap-seal block [{:#x}, {:#x}]",
                        tid, start, addr
                    );
                    continue;
                }

                // BTB probe: a hit means a known branch terminates here.
                if let Some(hint) = self.bpu.btb_lookup_inst(tid, addr) {
                    let br_seq = match self.ftq[tid].back() {
                        Some(b) => b.br_seq_num,
                        None => break,
                    };
                    let branch_pc = self.bpu_pc[tid];
                    let mut pred_pc = branch_pc;
                    let taken = self.bpu.predict(&hint, br_seq, &mut pred_pc, tid);
                    if let Some(back) = self.ftq[tid].back_mut() {
                        back.add_terminal(branch_pc, taken, pred_pc);
                    }
                    self.bpu_pc[tid] = pred_pc;
                } else {
                    self.bpu_pc[tid].advance();
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Fetching
    // ------------------------------------------------------------------

    /// Computes the successor PC for an issued instruction.
    ///
    /// Mid-macro-op expansion advances the micro-PC; the terminal
    /// instruction of a sealed block adopts the block's predicted
    /// successor; everything else falls through sequentially. Returns
    /// whether the adopted successor is a predicted-taken branch target.
    fn search_btb_and_update_next_pc(
        block: &BasicBlock,
        inst: &StaticInst,
        pc: &mut PcState,
    ) -> bool {
        if !inst.last_microop {
            pc.advance_micro();
            return false;
        }
        if block.is_terminal(pc.inst_addr()) {
            if let Some(pred) = block.pred_pc {
                *pc = pred;
                return block.is_branch && block.taken;
            }
        }
        pc.advance();
        false
    }

    /// Fetches instructions for the selected thread.
    fn fetch(&mut self, status_change: &mut bool) {
        let tid = self.get_fetching_thread();
        if tid == INVALID_THREAD_ID {
            return;
        }

        match self.fetch_status[tid] {
            ThreadStatus::IcacheAccessComplete => {
                self.fetch_status[tid] = ThreadStatus::Fetching;
                *status_change = true;
            }
            ThreadStatus::Running | ThreadStatus::Idle => {
                self.fetch_status[tid] = ThreadStatus::Fetching;
            }
            _ => return,
        }

        let mut pc = self.pc[tid];

        while self.num_inst < self.fetch_width
            && self.fetch_queue[tid].len() < self.fetch_queue_size
        {
            // Front block bookkeeping.
            let (sealed, exceeded) = match self.ftq[tid].front() {
                Some(front) => (front.is_sealed(), front.has_exceeded(pc.inst_addr())),
                None => {
                    self.fetch_status[tid] = ThreadStatus::FtqEmpty;
                    *status_change = true;
                    break;
                }
            };
            if exceeded {
                // Stale block (the producer resealed behind us); drop it.
                self.ftq[tid].pop_front();
                continue;
            }
            // Never decode past the producer frontier of an open block.
            if !sealed
                && self.macroop[tid].is_none()
                && pc.inst_addr() >= self.bpu_pc[tid].inst_addr()
            {
                break;
            }

            // Buffer management.
            let fetch_addr = self.fetch_buffer_align(pc.inst_addr());
            if self.macroop[tid].is_none() && !self.fetch_buffer[tid].covers(fetch_addr) {
                if self.prefetch_buffer[tid].covers(fetch_addr) {
                    let (a, b) = (&mut self.fetch_buffer[tid], &mut self.prefetch_buffer[tid]);
                    std::mem::swap(a, b);
                    self.prefetch_buffer[tid].valid = false;
                    continue;
                }
                self.pc[tid] = pc;
                self.fetch_cache_line(fetch_addr, tid);
                *status_change = true;
                return;
            }

            // Decode one instruction or expand the next micro-op.
            let issue_inst = match self.macroop[tid] {
                Some(mac) => mac.microop(pc.micro_pc()),
                None => {
                    let offset = (pc.inst_addr() - fetch_addr) as usize;
                    let mut word = [0u8; INST_BYTES as usize];
                    word.copy_from_slice(
                        &self.fetch_buffer[tid].data[offset..offset + INST_BYTES as usize],
                    );
                    let decoder = &mut self.decoders[tid];
                    decoder.more_bytes(&pc, fetch_addr, &word);
                    if !decoder.instruction_ready() {
                        break;
                    }
                    let static_inst = match decoder.decode(&mut pc) {
                        Some(i) => i,
                        None => break,
                    };
                    if static_inst.is_macroop() {
                        self.macroop[tid] = Some(static_inst);
                        static_inst.microop(pc.micro_pc())
                    } else {
                        static_inst
                    }
                }
            };
            let last_micro = issue_inst.last_microop;

            // Sequence number from the block's reserved window.
            let (is_terminal, seq_num) = {
                let front = match self.ftq[tid].front_mut() {
                    Some(f) => f,
                    None => break,
                };
                let terminal = front.is_terminal(pc.inst_addr());
                let seq = if terminal && last_micro {
                    Some(front.br_seq_num)
                } else {
                    front.next_seq_num()
                };
                match seq {
                    Some(s) => (terminal, s),
                    // Window exhausted: wait for the producer to seal.
                    None => break,
                }
            };

            // Successor PC and instruction construction.
            let (next_pc, pred_taken) = {
                let front = match self.ftq[tid].front() {
                    Some(f) => f,
                    None => break,
                };
                let mut next = pc;
                let taken = Self::search_btb_and_update_next_pc(front, &issue_inst, &mut next);
                (next, taken)
            };

            let inst = DynInst {
                seq_num,
                tid,
                pc,
                pred_pc: next_pc,
                pred_taken,
                static_inst: issue_inst,
                fault: None,
            };
            trace!(
                "[tid:{}] fetch sn:{} pc:{:#x}.{} -> {:#x}",
                tid,
                seq_num,
                pc.inst_addr(),
                pc.micro_pc(),
                next_pc.inst_addr()
            );
            self.fetch_queue[tid].push_back(inst);
            self.num_inst += 1;
            self.stats.insts += 1;
            if issue_inst.control {
                self.stats.branches += 1;
                if pred_taken {
                    self.stats.predicted_branches += 1;
                }
            }

            if last_micro {
                self.macroop[tid] = None;
            }
            let block_done = is_terminal && last_micro;
            pc = next_pc;
            if block_done {
                self.ftq[tid].pop_front();
            }
        }

        self.pc[tid] = pc;
        if self.fetch_status[tid] == ThreadStatus::Fetching {
            self.fetch_status[tid] = ThreadStatus::Running;
        }
    }

    /// Returns the thread to fetch this cycle under the configured policy.
    fn get_fetching_thread(&mut self) -> ThreadId {
        match self.policy {
            SmtFetchPolicy::SingleThread => {
                let tid = 0;
                if self.active_threads.contains(&tid) && self.thread_ready(tid) {
                    tid
                } else {
                    INVALID_THREAD_ID
                }
            }
            SmtFetchPolicy::RoundRobin => self.round_robin(),
            SmtFetchPolicy::IqCount => self.min_count_thread(|c| c.iq_count),
            SmtFetchPolicy::LsqCount => self.min_count_thread(|c| c.lsq_count),
            SmtFetchPolicy::BranchCount => {
                let mut best = INVALID_THREAD_ID;
                let mut best_count = u64::MAX;
                for &tid in &self.active_threads {
                    if !self.thread_ready(tid) {
                        continue;
                    }
                    let count = self.bpu.history_len(tid) as u64;
                    if count < best_count {
                        best_count = count;
                        best = tid;
                    }
                }
                best
            }
        }
    }

    fn thread_ready(&self, tid: ThreadId) -> bool {
        !self.stalls[tid].drain
            && matches!(
                self.fetch_status[tid],
                ThreadStatus::Running | ThreadStatus::IcacheAccessComplete | ThreadStatus::Idle
            )
    }

    fn round_robin(&mut self) -> ThreadId {
        let pos = self
            .priority_list
            .iter()
            .position(|&t| self.thread_ready(t));
        match pos.and_then(|i| self.priority_list.remove(i)) {
            Some(tid) => {
                self.priority_list.push_back(tid);
                tid
            }
            None => INVALID_THREAD_ID,
        }
    }

    fn min_count_thread(&self, count: impl Fn(&crate::sim::IewComm) -> u64) -> ThreadId {
        let wire = self.backwards.at(self.iew_to_fetch_delay);
        let mut best = INVALID_THREAD_ID;
        let mut best_count = u64::MAX;
        for &tid in &self.active_threads {
            if !self.thread_ready(tid) {
                continue;
            }
            let c = count(&wire.iew[tid]);
            if c < best_count {
                best_count = c;
                best = tid;
            }
        }
        best
    }

    // ------------------------------------------------------------------
    // Translation and I-cache handshake
    // ------------------------------------------------------------------

    /// Issues the translation for the fetch buffer at `fetch_addr`.
    fn fetch_cache_line(&mut self, fetch_addr: Addr, tid: ThreadId) {
        let req = FetchRequest {
            id: self.next_req_id,
            tid,
            vaddr: fetch_addr,
            size: self.fetch_buffer_size,
        };
        self.next_req_id += 1;
        let gen = self.squash_gen[tid];

        trace!("[tid:{}] fetching cache line {:#x}", tid, fetch_addr);
        let outcome = self.mmu.translate_timing(&req);
        if outcome.delay == 0 {
            self.finish_translation(tid, gen, req, outcome.result);
        } else {
            self.fetch_status[tid] = ThreadStatus::ItlbWait;
            self.events.schedule(
                self.cycle + outcome.delay,
                FrontendEvent::TranslationComplete {
                    tid,
                    gen,
                    req,
                    result: outcome.result,
                },
            );
        }
    }

    /// Consumes a finished translation: sends the memory request on
    /// success, defers a fault NOP on failure.
    fn finish_translation(
        &mut self,
        tid: ThreadId,
        gen: u64,
        req: FetchRequest,
        result: Result<Addr, Fault>,
    ) {
        if gen != self.squash_gen[tid] {
            self.stats.tlb_squashes += 1;
            return;
        }
        match result {
            Ok(paddr) => {
                if !self.icache_port.is_mem_addr(paddr) {
                    debug!("[tid:{}] address {:#x} is outside memory", tid, paddr);
                    self.fetch_status[tid] = ThreadStatus::NoGoodAddr;
                    return;
                }
                let pkt = FetchPacket::request(req, paddr);
                if self.cache_blocked {
                    self.retry_pkt = Some(pkt);
                    self.retry_tid = tid;
                    self.fetch_status[tid] = ThreadStatus::IcacheWaitRetry;
                    return;
                }
                if self.icache_port.send_timing_req(&pkt) {
                    self.outstanding_req[tid] = Some((req.id, req.vaddr));
                    self.fetch_status[tid] = ThreadStatus::IcacheWaitResponse;
                    self.issue_pipelined_ifetch[tid] = true;
                } else {
                    self.cache_blocked = true;
                    self.retry_pkt = Some(pkt);
                    self.retry_tid = tid;
                    self.fetch_status[tid] = ThreadStatus::IcacheWaitRetry;
                }
            }
            Err(fault) => {
                // The fault rides on a NOP delivered next cycle.
                self.fetch_status[tid] = ThreadStatus::ItlbWait;
                self.events.schedule(
                    self.cycle + 1,
                    FrontendEvent::FinishTranslation {
                        tid,
                        gen,
                        fault,
                        vaddr: req.vaddr,
                    },
                );
            }
        }
    }

    /// Injects the fault-carrying NOP scheduled by a failed translation.
    fn deliver_fault(&mut self, tid: ThreadId, gen: u64, fault: Fault, vaddr: Addr) {
        if gen != self.squash_gen[tid] {
            self.stats.tlb_squashes += 1;
            return;
        }
        debug!(
            "[tid:{}] translation fault at {:#x}: {}",
            tid, vaddr, fault
        );
        let seq_num = match self.ftq[tid].front_mut().and_then(BasicBlock::next_seq_num) {
            Some(s) => s,
            None => {
                // No open window; reserve a fresh one for the carrier.
                let sn = self.next_bb_seq + 1;
                self.next_bb_seq += 2;
                sn
            }
        };
        let pc = self.pc[tid];
        let inst = DynInst {
            seq_num,
            tid,
            pc,
            pred_pc: pc,
            pred_taken: false,
            static_inst: StaticInst::nop(),
            fault: Some(fault),
        };
        self.fetch_queue[tid].push_back(inst);
        self.fetch_status[tid] = ThreadStatus::TrapPending;
    }

    fn process_events(&mut self) {
        while let Some(event) = self.events.pop_due(self.cycle) {
            match event {
                FrontendEvent::TranslationComplete {
                    tid,
                    gen,
                    req,
                    result,
                } => self.finish_translation(tid, gen, req, result),
                FrontendEvent::FinishTranslation {
                    tid,
                    gen,
                    fault,
                    vaddr,
                } => self.deliver_fault(tid, gen, fault, vaddr),
            }
        }
    }

    /// Receives a response from the instruction port.
    ///
    /// Responses for requests abandoned by a squash are dropped and
    /// counted.
    pub fn recv_timing_resp(&mut self, pkt: FetchPacket) {
        let tid = pkt.req.tid;
        let fill = |buffer: &mut FetchBuffer, pkt: &FetchPacket, aligned: Addr| {
            if let Some(data) = &pkt.data {
                let n = data.len().min(buffer.data.len());
                buffer.data[..n].copy_from_slice(&data[..n]);
            }
            buffer.pc = aligned;
            buffer.valid = true;
        };

        if self.outstanding_req[tid] == Some((pkt.req.id, pkt.req.vaddr)) {
            fill(&mut self.fetch_buffer[tid], &pkt, pkt.req.vaddr);
            self.outstanding_req[tid] = None;
            self.stats.cache_lines += 1;
            if self.fetch_status[tid] == ThreadStatus::IcacheWaitResponse {
                self.fetch_status[tid] = ThreadStatus::IcacheAccessComplete;
            }
        } else if self.prefetch_req[tid].map(|(id, _)| id) == Some(pkt.req.id) {
            fill(&mut self.prefetch_buffer[tid], &pkt, pkt.req.vaddr);
            self.prefetch_req[tid] = None;
            self.stats.cache_lines += 1;
        } else {
            self.stats.icache_squashes += 1;
        }
    }

    /// Re-sends the stashed packet after the port signalled a retry.
    pub fn recv_req_retry(&mut self) {
        let pkt = match self.retry_pkt.take() {
            Some(p) => p,
            None => {
                self.cache_blocked = false;
                return;
            }
        };
        let tid = self.retry_tid;
        if self.icache_port.send_timing_req(&pkt) {
            self.outstanding_req[tid] = Some((pkt.req.id, pkt.req.vaddr));
            self.fetch_status[tid] = ThreadStatus::IcacheWaitResponse;
            self.cache_blocked = false;
            self.retry_tid = INVALID_THREAD_ID;
        } else {
            self.retry_pkt = Some(pkt);
        }
    }

    /// Prefetches the line the thread will want after its outstanding
    /// demand access.
    ///
    /// Issued only when translation completes inline; a prefetch never
    /// blocks the port or parks the thread.
    fn pipeline_icache_accesses(&mut self, tid: ThreadId) {
        if self.cache_blocked
            || self.prefetch_req[tid].is_some()
            || self.prefetch_buffer[tid].valid
        {
            return;
        }
        let demand_line = match self.outstanding_req[tid] {
            Some((_, vaddr)) => vaddr,
            None => return,
        };
        let next_addr = {
            let next_in_line = demand_line + self.fetch_buffer_size as Addr;
            match self.ftq[tid].front() {
                Some(b)
                    if b.is_sealed()
                        && b.end_address() >= demand_line
                        && b.end_address() < next_in_line =>
                {
                    match b.pred_pc {
                        Some(p) => self.fetch_buffer_align(p.inst_addr()),
                        None => next_in_line,
                    }
                }
                _ => next_in_line,
            }
        };
        if next_addr == demand_line {
            return;
        }

        let req = FetchRequest {
            id: self.next_req_id,
            tid,
            vaddr: next_addr,
            size: self.fetch_buffer_size,
        };
        self.next_req_id += 1;
        let outcome = self.mmu.translate_timing(&req);
        if outcome.delay != 0 {
            return;
        }
        if let Ok(paddr) = outcome.result {
            if !self.icache_port.is_mem_addr(paddr) {
                return;
            }
            let pkt = FetchPacket::request(req, paddr);
            if self.icache_port.send_timing_req(&pkt) {
                trace!("[tid:{}] pipelined prefetch of {:#x}", tid, next_addr);
                self.prefetch_req[tid] = Some((req.id, next_addr));
            }
        }
    }

    // ------------------------------------------------------------------
    // Delivery and profiling
    // ------------------------------------------------------------------

    /// Moves up to `decode_width` instructions onto the decode wire,
    /// interleaving ready threads fairly.
    fn send_to_decode(&mut self) {
        let mut bundle = FetchBundle::default();
        let threads = self.active_threads.clone();
        let mut progressed = true;
        while bundle.len() < self.decode_width && progressed {
            progressed = false;
            for &tid in &threads {
                if bundle.len() >= self.decode_width {
                    break;
                }
                if self.stalls[tid].decode {
                    continue;
                }
                if let Some(inst) = self.fetch_queue[tid].pop_front() {
                    bundle.insts.push(inst);
                    progressed = true;
                }
            }
        }
        if !bundle.is_empty() {
            self.wrote_to_time_buffer = true;
        }
        *self.to_decode.now_mut() = bundle;
    }

    /// Attributes this cycle's wait states to the stall counters.
    fn profile_stalls(&mut self) {
        for &tid in &self.active_threads {
            match self.fetch_status[tid] {
                ThreadStatus::ItlbWait => self.stats.tlb_cycles += 1,
                ThreadStatus::IcacheWaitResponse => self.stats.icache_stall_cycles += 1,
                ThreadStatus::IcacheWaitRetry => self.stats.icache_wait_retry_cycles += 1,
                ThreadStatus::FtqEmpty => self.stats.ftq_stall_cycles += 1,
                ThreadStatus::Blocked => self.stats.blocked_cycles += 1,
                ThreadStatus::TrapPending => self.stats.pending_trap_cycles += 1,
                ThreadStatus::QuiescePending => self.stats.pending_quiesce_cycles += 1,
                ThreadStatus::Idle => self.stats.idle_cycles += 1,
                ThreadStatus::NoGoodAddr => self.stats.misc_stall_cycles += 1,
                _ => {}
            }
            if self.stalls[tid].drain {
                self.stats.pending_drain_cycles += 1;
            }
        }
    }
}
