//! Squash and recovery tests.
//!
//! Covers the three recovery entry points (commit, decode, FTQ-only) and
//! the bookkeeping every squash path owes: dropped in-flight accesses,
//! generation-filtered translations, and post-squash cleanliness.

use frontsim::FrontendConfig;
use frontsim::config::DirectionKind;
use frontsim::core::frontend::fetch::ThreadStatus;
use frontsim::isa::StaticInst;

use crate::common::harness::TestContext;

fn config() -> FrontendConfig {
    let mut config = FrontendConfig::default();
    config.bpu.direction = DirectionKind::Bimodal;
    config
}

// ══════════════════════════════════════════════════════════
// 1. Nothing younger than the squash survives
// ══════════════════════════════════════════════════════════

#[test]
fn no_younger_state_survives_a_commit_squash() {
    let mut ctx = TestContext::with_config(config());
    ctx.fetch.start_thread(0, 0x1000);
    let collected = ctx.collect_insts(8, 20);
    let squash_sn = collected[3].seq_num;

    ctx.commit_trap_squash(0, squash_sn, 0x4000);
    ctx.cycle();
    ctx.cycle();

    assert_eq!(ctx.fetch.fetch_queue_len(0), 0);
    assert_eq!(ctx.fetch.ftq_len(0), 0);
    assert_eq!(ctx.fetch.pc(0).inst_addr(), 0x4000);
    assert!(ctx.fetch.bpu.youngest_seq_num(0).map_or(true, |s| s <= squash_sn));

    // Everything fetched afterwards is younger than anything before.
    let max_before = collected.iter().map(|i| i.seq_num).max().unwrap();
    let resumed = ctx.collect_insts(4, 10);
    assert!(resumed.iter().all(|i| i.seq_num > max_before));
    assert!(resumed.iter().all(|i| i.pc.inst_addr() >= 0x4000));
}

// ══════════════════════════════════════════════════════════
// 2. In-flight accesses are dropped, not consumed
// ══════════════════════════════════════════════════════════

#[test]
fn squash_drops_late_icache_response() {
    let mut ctx = TestContext::with_config(config());
    ctx.mem.set_latency(4);
    ctx.fetch.start_thread(0, 0x1000);

    ctx.cycle(); // request issued, response far away
    assert_eq!(ctx.fetch.status(0), ThreadStatus::IcacheWaitResponse);

    ctx.commit_trap_squash(0, 0, 0x8000);
    ctx.cycle();
    ctx.cycle(); // squash processed before the response lands

    ctx.run(4); // the stale responses arrive and are dropped
    // Both the demand access and its pipelined prefetch were abandoned.
    assert_eq!(ctx.fetch.stats.icache_squashes, 2);
    // The thread refetches from the redirect.
    let resumed = ctx.collect_insts(1, 10);
    assert_eq!(resumed[0].pc.inst_addr(), 0x8000);
}

#[test]
fn squash_drops_pending_translation() {
    let mut ctx = TestContext::with_config(config());
    ctx.mmu.set_delay(5);
    ctx.fetch.start_thread(0, 0x1000);

    ctx.cycle();
    assert_eq!(ctx.fetch.status(0), ThreadStatus::ItlbWait);

    ctx.commit_trap_squash(0, 0, 0x8000);
    ctx.cycle();
    ctx.cycle();

    ctx.run(5); // the stale translation completes into a bumped generation
    assert_eq!(ctx.fetch.stats.tlb_squashes, 1);
}

// ══════════════════════════════════════════════════════════
// 3. Decode-sourced squash reconciles the static instruction
// ══════════════════════════════════════════════════════════

#[test]
fn decode_squash_corrects_predicted_branch() {
    let mut ctx = TestContext::with_config(config());
    let hinted = StaticInst::direct_cond(0x1200);
    ctx.install_branch(0, 0x1010, 0x1200, hinted);
    ctx.program.set(0x1010, hinted);
    ctx.fetch.start_thread(0, 0x1000);

    let collected = ctx.collect_insts(5, 20);
    let branch = collected
        .iter()
        .find(|i| i.pc.inst_addr() == 0x1010)
        .expect("branch fetched");

    // Pre-decode discovered the true target differs.
    let actual = StaticInst::direct_cond(0x2200);
    ctx.decode_squash(0, branch.seq_num, 0x2200, 0x1010, true, actual);
    ctx.cycle();
    ctx.cycle();

    assert_eq!(ctx.fetch.pc(0).inst_addr(), 0x2200);
    assert_eq!(ctx.fetch.fetch_queue_len(0), 0);
    assert_eq!(
        ctx.fetch.bpu.btb_lookup(0, 0x1010).map(|p| p.inst_addr()),
        Some(0x2200),
        "decode correction retargets the BTB"
    );
}

// ══════════════════════════════════════════════════════════
// 4. FTQ-only squash leaves issued instructions alone
// ══════════════════════════════════════════════════════════

#[test]
fn ftq_squash_preserves_fetch_queue() {
    // Decode narrower than fetch, so the fetch queue backs up.
    let mut config = config();
    config.fetch.decode_width = 2;
    let mut ctx = TestContext::with_config(config);
    ctx.fetch.start_thread(0, 0x1000);
    ctx.run(4);
    let queued = ctx.fetch.fetch_queue_len(0);
    assert!(queued > 0, "test needs queued instructions");

    ctx.fetch.do_ftq_squash(0x9000, 0);
    assert_eq!(ctx.fetch.ftq_len(0), 0);
    assert_eq!(ctx.fetch.bpu_pc(0).inst_addr(), 0x9000);
    assert_eq!(
        ctx.fetch.fetch_queue_len(0),
        queued,
        "issued instructions are untouched"
    );
}

// ══════════════════════════════════════════════════════════
// 5. Squash resets the macro-op expander
// ══════════════════════════════════════════════════════════

#[test]
fn squash_mid_macro_op_resumes_cleanly() {
    let mut config = config();
    config.fetch.fetch_width = 2;
    let mut ctx = TestContext::with_config(config);
    ctx.program.set(0x1004, StaticInst::macro_op(4));
    ctx.fetch.start_thread(0, 0x1000);

    // Width 2 guarantees the 4-micro-op expansion spans cycles.
    let collected = ctx.collect_insts(3, 20);
    assert_eq!(collected[2].pc.inst_addr(), 0x1004);
    assert_eq!(collected[2].pc.micro_pc(), 1);

    ctx.commit_trap_squash(0, collected[0].seq_num, 0x1000);
    ctx.cycle();
    ctx.cycle();

    // The expander restarted; fetch begins again at micro-PC zero.
    let resumed = ctx.collect_insts(2, 10);
    assert_eq!(resumed[0].pc.inst_addr(), 0x1000);
    assert_eq!(resumed[0].pc.micro_pc(), 0);
}
