//! The `TestContext` harness.
//!
//! Wires a `Fetch` instance to the mock memory, MMU, and program decoder,
//! and drives the per-cycle protocol: deliver ready memory responses, tick
//! the fetch engine, collect what it handed to decode.

use frontsim::FrontendConfig;
use frontsim::common::{Addr, InstSeqNum, PcState, ThreadId};
use frontsim::core::frontend::fetch::Fetch;
use frontsim::isa::{DynInst, InstDecoder, StaticInst};

use crate::common::mocks::memory::TimingInstMem;
use crate::common::mocks::mmu::TableMmu;
use crate::common::mocks::program::Program;

pub struct TestContext {
    pub fetch: Fetch,
    pub mem: TimingInstMem,
    pub mmu: TableMmu,
    pub program: Program,
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

impl TestContext {
    /// A context with the default configuration.
    pub fn new() -> Self {
        Self::with_config(FrontendConfig::default())
    }

    /// A context with an explicit configuration.
    pub fn with_config(config: FrontendConfig) -> Self {
        let _ = env_logger::builder().is_test(true).try_init();

        let mem = TimingInstMem::new(1);
        let mmu = TableMmu::new(0);
        let program = Program::new();
        let decoders: Vec<Box<dyn InstDecoder>> = (0..config.fetch.num_threads)
            .map(|_| Box::new(program.decoder()) as Box<dyn InstDecoder>)
            .collect();
        let fetch = Fetch::new(
            &config,
            decoders,
            Box::new(mmu.clone()),
            Box::new(mem.clone()),
        )
        .expect("valid test configuration");

        Self {
            fetch,
            mem,
            mmu,
            program,
        }
    }

    /// Runs one cycle: deliver ready responses, tick, return the decode
    /// bundle the tick produced.
    pub fn cycle(&mut self) -> Vec<DynInst> {
        for pkt in self.mem.take_ready() {
            self.fetch.recv_timing_resp(pkt);
        }
        self.fetch.tick();
        self.mem.advance();
        self.fetch.from_fetch().insts.clone()
    }

    /// Runs `n` cycles, discarding output.
    pub fn run(&mut self, n: usize) {
        for _ in 0..n {
            self.cycle();
        }
    }

    /// Runs until `n` instructions have been collected, panicking after
    /// `max_cycles`.
    pub fn collect_insts(&mut self, n: usize, max_cycles: usize) -> Vec<DynInst> {
        let mut collected = Vec::new();
        for _ in 0..max_cycles {
            collected.extend(self.cycle());
            if collected.len() >= n {
                return collected;
            }
        }
        panic!(
            "collected only {} of {} instructions in {} cycles",
            collected.len(),
            n,
            max_cycles
        );
    }

    /// Installs a resolved branch into the BTB, as a downstream correction
    /// of a never-predicted branch would.
    pub fn install_branch(&mut self, tid: ThreadId, pc: Addr, target: Addr, inst: StaticInst) {
        self.fetch
            .bpu
            .squash_with_correction(0, target, true, tid, Some(&inst), pc);
    }

    /// Trains the direction predictor toward taken for the branch at `pc`,
    /// installing the BTB entry as a side effect.
    pub fn train_taken(
        &mut self,
        tid: ThreadId,
        pc: Addr,
        target: Addr,
        inst: StaticInst,
        rounds: u64,
    ) {
        for round in 0..rounds {
            let sn: InstSeqNum = round + 1;
            let mut pred_pc = PcState::new(pc);
            self.fetch.bpu.predict(&inst, sn, &mut pred_pc, tid);
            self.fetch
                .bpu
                .squash_with_correction(sn, target, true, tid, Some(&inst), pc);
        }
    }

    /// Signals a commit-level trap squash (no branch correction).
    pub fn commit_trap_squash(&mut self, tid: ThreadId, seq_num: InstSeqNum, redirect: Addr) {
        let commit = &mut self.fetch.signals_mut().commit[tid];
        commit.squash = true;
        commit.squash_seq_num = seq_num;
        commit.squash_pc = redirect;
        commit.branch_mispredict = false;
    }

    /// Signals a commit-level branch-mispredict squash.
    pub fn commit_mispredict(
        &mut self,
        tid: ThreadId,
        seq_num: InstSeqNum,
        redirect: Addr,
        branch_pc: Addr,
        taken: bool,
        inst: StaticInst,
    ) {
        let commit = &mut self.fetch.signals_mut().commit[tid];
        commit.squash = true;
        commit.squash_seq_num = seq_num;
        commit.squash_pc = redirect;
        commit.branch_mispredict = true;
        commit.branch_taken = taken;
        commit.branch_pc = branch_pc;
        commit.mispredict_inst = Some(inst);
    }

    /// Signals commit progress so the BPU retires history.
    pub fn commit_done(&mut self, tid: ThreadId, seq_num: InstSeqNum) {
        self.fetch.signals_mut().commit[tid].done_seq_num = Some(seq_num);
    }

    /// Signals decode backpressure.
    pub fn decode_block(&mut self, tid: ThreadId) {
        self.fetch.signals_mut().decode[tid].block = true;
    }

    /// Releases decode backpressure.
    pub fn decode_unblock(&mut self, tid: ThreadId) {
        self.fetch.signals_mut().decode[tid].unblock = true;
    }

    /// Signals a decode-detected mispredict squash.
    pub fn decode_squash(
        &mut self,
        tid: ThreadId,
        seq_num: InstSeqNum,
        redirect: Addr,
        branch_pc: Addr,
        taken: bool,
        inst: StaticInst,
    ) {
        let decode = &mut self.fetch.signals_mut().decode[tid];
        decode.squash = true;
        decode.squash_seq_num = seq_num;
        decode.squash_pc = redirect;
        decode.branch_taken = taken;
        decode.branch_pc = branch_pc;
        decode.mispredict_inst = Some(inst);
    }

    /// Reports IQ/LSQ occupancy for the SMT policies.
    pub fn report_iew_counts(&mut self, tid: ThreadId, iq: u64, lsq: u64) {
        let iew = &mut self.fetch.signals_mut().iew[tid];
        iew.iq_count = iq;
        iew.lsq_count = lsq;
    }
}
