//! SMT fetch policy tests.

use frontsim::FrontendConfig;
use frontsim::config::DirectionKind;
use frontsim::core::frontend::policy::SmtFetchPolicy;

use crate::common::harness::TestContext;

fn config(policy: SmtFetchPolicy) -> FrontendConfig {
    let mut config = FrontendConfig::default();
    config.bpu.direction = DirectionKind::Bimodal;
    config.fetch.num_threads = 2;
    config.fetch.policy = policy;
    config
}

// ══════════════════════════════════════════════════════════
// 1. Round robin
// ══════════════════════════════════════════════════════════

#[test]
fn round_robin_interleaves_threads() {
    let mut ctx = TestContext::with_config(config(SmtFetchPolicy::RoundRobin));
    ctx.fetch.start_thread(0, 0x1000);
    ctx.fetch.start_thread(1, 0x8000);

    let collected = ctx.collect_insts(24, 40);
    let t0 = collected.iter().filter(|i| i.tid == 0).count();
    let t1 = collected.iter().filter(|i| i.tid == 1).count();
    assert!(t0 > 0 && t1 > 0, "both threads make progress");
    let diff = t0.abs_diff(t1);
    assert!(diff <= 8, "rotation keeps threads roughly balanced: {t0} vs {t1}");
}

#[test]
fn round_robin_per_thread_order_is_preserved() {
    let mut ctx = TestContext::with_config(config(SmtFetchPolicy::RoundRobin));
    ctx.fetch.start_thread(0, 0x1000);
    ctx.fetch.start_thread(1, 0x8000);

    let collected = ctx.collect_insts(24, 40);
    for tid in 0..2 {
        let mut last = 0;
        for inst in collected.iter().filter(|i| i.tid == tid) {
            assert!(inst.seq_num > last, "thread {tid} order violated");
            last = inst.seq_num;
        }
    }
}

// ══════════════════════════════════════════════════════════
// 2. Single thread
// ══════════════════════════════════════════════════════════

#[test]
fn single_thread_policy_only_fetches_thread_zero() {
    let mut ctx = TestContext::with_config(config(SmtFetchPolicy::SingleThread));
    ctx.fetch.start_thread(0, 0x1000);
    ctx.fetch.start_thread(1, 0x8000);

    let collected = ctx.collect_insts(12, 20);
    assert!(collected.iter().all(|i| i.tid == 0));
}

// ══════════════════════════════════════════════════════════
// 3. Count-based policies
// ══════════════════════════════════════════════════════════

#[test]
fn iq_count_prefers_the_emptier_thread() {
    let mut ctx = TestContext::with_config(config(SmtFetchPolicy::IqCount));
    ctx.fetch.start_thread(0, 0x1000);
    ctx.fetch.start_thread(1, 0x8000);

    // Thread 0 reports a deep IQ every cycle; thread 1 stays empty.
    let mut collected = Vec::new();
    for _ in 0..12 {
        ctx.report_iew_counts(0, 32, 0);
        ctx.report_iew_counts(1, 0, 0);
        collected.extend(ctx.cycle());
    }
    let t1 = collected.iter().filter(|i| i.tid == 1).count();
    let t0 = collected.iter().filter(|i| i.tid == 0).count();
    assert!(t1 > t0, "the emptier thread should dominate: {t0} vs {t1}");
}

#[test]
fn lsq_count_prefers_the_emptier_thread() {
    let mut ctx = TestContext::with_config(config(SmtFetchPolicy::LsqCount));
    ctx.fetch.start_thread(0, 0x1000);
    ctx.fetch.start_thread(1, 0x8000);

    let mut collected = Vec::new();
    for _ in 0..12 {
        ctx.report_iew_counts(0, 0, 0);
        ctx.report_iew_counts(1, 0, 16);
        collected.extend(ctx.cycle());
    }
    let t0 = collected.iter().filter(|i| i.tid == 0).count();
    let t1 = collected.iter().filter(|i| i.tid == 1).count();
    assert!(t0 > t1, "the emptier thread should dominate: {t0} vs {t1}");
}
