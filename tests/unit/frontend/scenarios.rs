//! End-to-end fetch scenarios.
//!
//! Each test drives the full frontend (producer, FTQ, fetch engine,
//! predictors, mock memory and MMU) through a small program and checks the
//! delivered instruction stream and the recovery behavior.

use frontsim::FrontendConfig;
use frontsim::config::DirectionKind;
use frontsim::core::frontend::fetch::ThreadStatus;
use frontsim::isa::StaticInst;

use crate::common::harness::TestContext;

/// Bimodal direction keeps the scenarios deterministic: cold counters
/// predict not-taken, two taken resolutions flip them.
fn config() -> FrontendConfig {
    let mut config = FrontendConfig::default();
    config.bpu.direction = DirectionKind::Bimodal;
    config
}

// ══════════════════════════════════════════════════════════
// S1. Linear fall-through
// ══════════════════════════════════════════════════════════

#[test]
fn linear_fall_through_fills_width_per_tick() {
    let mut ctx = TestContext::with_config(config());
    ctx.program.load(0x1000, &[StaticInst::op(); 8]);
    ctx.fetch.start_thread(0, 0x1000);

    let mut productive = Vec::new();
    let mut collected = Vec::new();
    for _ in 0..10 {
        let out = ctx.cycle();
        assert!(ctx.fetch.ftq_len(0) <= 1, "one open block suffices");
        if !out.is_empty() {
            productive.push(out.len());
        }
        collected.extend(out);
        if collected.len() >= 8 {
            break;
        }
    }

    assert_eq!(productive, vec![4, 4], "two productive ticks of fetch_width");
    let seqs: Vec<_> = collected.iter().map(|i| i.seq_num).collect();
    assert_eq!(seqs, vec![1, 2, 3, 4, 5, 6, 7, 8]);
    assert_eq!(collected[0].pc.inst_addr(), 0x1000);
    assert_eq!(collected[7].pc.inst_addr(), 0x101C);
}

// ══════════════════════════════════════════════════════════
// S2. Correctly predicted taken branch
// ══════════════════════════════════════════════════════════

#[test]
fn predicted_taken_branch_seals_block_and_redirects() {
    let mut ctx = TestContext::with_config(config());
    let br = StaticInst::direct_cond(0x1100);
    ctx.train_taken(0, 0x1010, 0x1100, br, 2);
    ctx.program.set(0x1010, br);

    ctx.fetch.start_thread(0, 0x1000);
    let collected = ctx.collect_insts(6, 20);

    let branch = collected
        .iter()
        .find(|i| i.pc.inst_addr() == 0x1010)
        .expect("branch fetched");
    assert!(branch.pred_taken);
    assert_eq!(branch.pred_pc.inst_addr(), 0x1100, "block adopts pred_pc");

    let successor = collected
        .iter()
        .find(|i| i.seq_num > branch.seq_num)
        .expect("target fetched");
    assert_eq!(
        successor.pc.inst_addr(),
        0x1100,
        "next block starts at the predicted target"
    );
    assert_eq!(ctx.fetch.stats.squash_cycles, 0, "no squash needed");
}

// ══════════════════════════════════════════════════════════
// S3. Mispredicted direction, corrected from commit
// ══════════════════════════════════════════════════════════

#[test]
fn commit_mispredict_squash_restores_and_teaches_btb() {
    let mut ctx = TestContext::with_config(config());
    let br = StaticInst::direct_cond(0x1200);
    // The BTB knows the branch; the cold bimodal counter says not-taken.
    ctx.install_branch(0, 0x1020, 0x1200, br);
    ctx.program.set(0x1020, br);

    ctx.fetch.start_thread(0, 0x1000);
    let collected = ctx.collect_insts(9, 20);
    let branch = collected
        .iter()
        .find(|i| i.pc.inst_addr() == 0x1020)
        .expect("branch fetched");
    assert!(!branch.pred_taken, "predicted not-taken");
    let branch_sn = branch.seq_num;

    // Commit resolves the branch as taken to 0x1200.
    ctx.commit_mispredict(0, branch_sn, 0x1200, 0x1020, true, br);
    ctx.cycle(); // signal in flight
    ctx.cycle(); // squash processed

    assert_eq!(ctx.fetch.fetch_queue_len(0), 0);
    assert_eq!(ctx.fetch.ftq_len(0), 0);
    assert_eq!(ctx.fetch.pc(0).inst_addr(), 0x1200);
    assert_eq!(
        ctx.fetch.bpu.history_len(0),
        0,
        "no history younger than the squash survives"
    );
    assert_eq!(
        ctx.fetch.bpu.btb_lookup(0, 0x1020).map(|p| p.inst_addr()),
        Some(0x1200),
        "BTB learned the resolved target"
    );

    // Fetch resumes from the redirect.
    let resumed = ctx.collect_insts(1, 10);
    assert_eq!(resumed[0].pc.inst_addr(), 0x1200);
    assert!(resumed[0].seq_num > branch_sn);
}

// ══════════════════════════════════════════════════════════
// S4. RAS call/return pair with speculative recovery
// ══════════════════════════════════════════════════════════

#[test]
fn ras_push_pop_and_bit_exact_recovery() {
    let mut ctx = TestContext::with_config(config());
    let call = StaticInst::call_direct(0x3000);
    let ret = StaticInst::ret();
    ctx.install_branch(0, 0x2000, 0x3000, call);
    ctx.install_branch(0, 0x3008, 0x2004, ret);
    ctx.program.set(0x2000, call);
    ctx.program.set(0x3008, ret);

    ctx.fetch.start_thread(0, 0x2000);
    ctx.cycle();

    // One producer tick predicts both: call pushed 0x2004, return popped it.
    assert_eq!(ctx.fetch.bpu.history_len(0), 2);
    assert_eq!(ctx.fetch.bpu.ras_top(0), None, "push then pop");

    let ret_sn = ctx.fetch.bpu.youngest_seq_num(0).expect("return predicted");

    // Squashing the return alone re-materializes the pushed entry.
    ctx.fetch.bpu.squash(ret_sn - 1, 0);
    assert_eq!(ctx.fetch.bpu.ras_top(0), Some(0x2004));

    // Squashing past the call restores the pre-call TOS.
    ctx.fetch.bpu.squash(0, 0);
    assert_eq!(ctx.fetch.bpu.ras_top(0), None);
    assert_eq!(ctx.fetch.bpu.history_len(0), 0);
}

#[test]
fn ras_predicts_return_target_through_fetch() {
    let mut ctx = TestContext::with_config(config());
    let call = StaticInst::call_direct(0x3000);
    let ret = StaticInst::ret();
    ctx.install_branch(0, 0x2000, 0x3000, call);
    ctx.install_branch(0, 0x3008, 0x9999_0000, ret);
    ctx.program.set(0x2000, call);
    ctx.program.set(0x3008, ret);

    ctx.fetch.start_thread(0, 0x2000);
    let collected = ctx.collect_insts(5, 20);

    let ret_inst = collected
        .iter()
        .find(|i| i.pc.inst_addr() == 0x3008)
        .expect("return fetched");
    assert!(ret_inst.pred_taken);
    assert_eq!(
        ret_inst.pred_pc.inst_addr(),
        0x2004,
        "return target comes from the RAS, not the stale BTB entry"
    );
}

// ══════════════════════════════════════════════════════════
// S5. Translation fault becomes a fault-carrying NOP
// ══════════════════════════════════════════════════════════

#[test]
fn translation_fault_injects_single_nop() {
    let mut ctx = TestContext::with_config(config());
    ctx.mmu.add_fault_range(0xDEAD_0000, 0xDEB0_0000);

    ctx.fetch.start_thread(0, 0xDEAD_BEEF);
    let first = ctx.cycle();
    assert!(first.is_empty(), "fault is deferred one cycle");
    assert_eq!(ctx.fetch.status(0), ThreadStatus::ItlbWait);

    let second = ctx.cycle();
    assert_eq!(second.len(), 1, "exactly the fault NOP is delivered");
    let nop = &second[0];
    assert!(nop.static_inst.nop);
    assert!(nop.is_faulted());
    assert_eq!(ctx.fetch.status(0), ThreadStatus::TrapPending);
    assert_eq!(ctx.mem.accepted(), 0, "no real bytes were requested");
    assert_eq!(ctx.mmu.translations(), 1, "one translation was attempted");

    // The downstream trap squash restores the thread.
    ctx.commit_trap_squash(0, 0, 0x1000);
    ctx.cycle();
    ctx.cycle();
    assert_eq!(ctx.fetch.fetch_queue_len(0), 0);
    assert_eq!(ctx.fetch.pc(0).inst_addr(), 0x1000);

    let resumed = ctx.collect_insts(4, 10);
    assert_eq!(resumed[0].pc.inst_addr(), 0x1000);
    assert!(resumed.iter().all(|i| !i.is_faulted()));
}

// ══════════════════════════════════════════════════════════
// S3b. Commit progress retires predictor history
// ══════════════════════════════════════════════════════════

#[test]
fn commit_done_retires_branch_history() {
    let mut ctx = TestContext::with_config(config());
    let br = StaticInst::direct_cond(0x1200);
    ctx.install_branch(0, 0x1010, 0x1200, br);
    ctx.program.set(0x1010, br);

    ctx.fetch.start_thread(0, 0x1000);
    let collected = ctx.collect_insts(5, 20);
    let branch = collected
        .iter()
        .find(|i| i.pc.inst_addr() == 0x1010)
        .expect("branch fetched");
    assert!(ctx.fetch.bpu.history_len(0) >= 1);

    ctx.commit_done(0, branch.seq_num);
    ctx.cycle();
    ctx.cycle();

    assert!(
        ctx.fetch
            .bpu
            .youngest_seq_num(0)
            .map_or(true, |s| s > branch.seq_num),
        "retired history must not linger"
    );
    assert!(ctx.fetch.bpu.stats.committed >= 1);
}

// ══════════════════════════════════════════════════════════
// S6. I-cache retry protocol
// ══════════════════════════════════════════════════════════

#[test]
fn icache_retry_resends_stashed_packet() {
    let mut ctx = TestContext::with_config(config());
    ctx.mem.set_blocked(true);

    ctx.fetch.start_thread(0, 0x1000);
    ctx.cycle();
    assert_eq!(ctx.fetch.status(0), ThreadStatus::IcacheWaitRetry);
    assert_eq!(ctx.mem.rejected(), 1);

    ctx.mem.set_blocked(false);
    ctx.fetch.recv_req_retry();
    assert_eq!(ctx.fetch.status(0), ThreadStatus::IcacheWaitResponse);
    assert_eq!(ctx.mem.accepted(), 1);

    let collected = ctx.collect_insts(4, 10);
    let seqs: Vec<_> = collected.iter().map(|i| i.seq_num).collect();
    assert_eq!(seqs, vec![1, 2, 3, 4]);
}
