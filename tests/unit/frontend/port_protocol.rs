//! Port protocol tests against a mockall port.
//!
//! Verifies the exact request/retry handshake the fetch engine drives on
//! the instruction port.

use mockall::Sequence;

use frontsim::FrontendConfig;
use frontsim::core::frontend::fetch::{Fetch, ThreadStatus};
use frontsim::isa::InstDecoder;

use crate::common::mocks::mmu::TableMmu;
use crate::common::mocks::port::MockPort;
use crate::common::mocks::program::Program;

fn build_fetch(port: MockPort) -> Fetch {
    let config = FrontendConfig::default();
    let program = Program::new();
    let decoders: Vec<Box<dyn InstDecoder>> = vec![Box::new(program.decoder())];
    Fetch::new(
        &config,
        decoders,
        Box::new(TableMmu::new(0)),
        Box::new(port),
    )
    .expect("valid configuration")
}

// ══════════════════════════════════════════════════════════
// 1. Rejected request is stashed and re-sent on retry
// ══════════════════════════════════════════════════════════

#[test]
fn rejected_request_is_resent_on_retry() {
    let mut port = MockPort::new();
    let mut seq = Sequence::new();
    port.expect_is_mem_addr().return_const(true);
    port.expect_send_timing_req()
        .times(1)
        .in_sequence(&mut seq)
        .withf(|pkt| pkt.req.vaddr == 0x1000)
        .return_const(false);
    port.expect_send_timing_req()
        .times(1)
        .in_sequence(&mut seq)
        .withf(|pkt| pkt.req.vaddr == 0x1000)
        .return_const(true);

    let mut fetch = build_fetch(port);
    fetch.start_thread(0, 0x1000);
    fetch.tick();
    assert_eq!(fetch.status(0), ThreadStatus::IcacheWaitRetry);

    fetch.recv_req_retry();
    assert_eq!(fetch.status(0), ThreadStatus::IcacheWaitResponse);
}

// ══════════════════════════════════════════════════════════
// 2. Unfetchable addresses never produce a packet
// ══════════════════════════════════════════════════════════

#[test]
fn bad_address_parks_without_a_request() {
    let mut port = MockPort::new();
    port.expect_is_mem_addr().return_const(false);
    port.expect_send_timing_req().times(0);

    let mut fetch = build_fetch(port);
    fetch.start_thread(0, 0xFFFF_0000);
    fetch.tick();
    assert_eq!(fetch.status(0), ThreadStatus::NoGoodAddr);
}

// ══════════════════════════════════════════════════════════
// 3. Aligned request covers one fetch buffer
// ══════════════════════════════════════════════════════════

#[test]
fn requests_are_buffer_aligned_and_sized() {
    let mut port = MockPort::new();
    let mut seq = Sequence::new();
    port.expect_is_mem_addr().return_const(true);
    // The demand request covers the aligned buffer; the pipelined prefetch
    // follows with the next line.
    port.expect_send_timing_req()
        .times(1)
        .in_sequence(&mut seq)
        .withf(|pkt| pkt.req.vaddr == 0x1040 && pkt.req.size == 64 && pkt.data.is_none())
        .return_const(true);
    port.expect_send_timing_req()
        .times(1)
        .in_sequence(&mut seq)
        .withf(|pkt| pkt.req.vaddr == 0x1080 && pkt.req.size == 64)
        .return_const(true);

    let mut fetch = build_fetch(port);
    // An unaligned start PC still fetches its aligned buffer.
    fetch.start_thread(0, 0x105C);
    fetch.tick();
    assert_eq!(fetch.status(0), ThreadStatus::IcacheWaitResponse);
}
