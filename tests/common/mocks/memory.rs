//! Timing instruction memory behind the port contract.
//!
//! Accepts fetch packets, synthesizes their payload, and makes responses
//! available after a configurable latency. The handle is clonable so the
//! harness can keep inspecting and steering the memory after the fetch
//! engine has taken ownership of the port.

use std::sync::{Arc, Mutex};

use frontsim::common::{Addr, Cycle};
use frontsim::mem::{FetchPacket, InstPort};

struct MemState {
    now: Cycle,
    latency: Cycle,
    /// While set, `send_timing_req` rejects every packet.
    blocked: bool,
    /// Addresses at or above this limit are not fetchable memory.
    mem_limit: Addr,
    /// (ready_at, response) pairs waiting for delivery.
    pending: Vec<(Cycle, FetchPacket)>,
    /// Requests accepted, for assertions.
    accepted: u64,
    /// Requests rejected while blocked.
    rejected: u64,
}

/// Clonable handle to the timing instruction memory.
#[derive(Clone)]
pub struct TimingInstMem {
    state: Arc<Mutex<MemState>>,
}

impl TimingInstMem {
    pub fn new(latency: Cycle) -> Self {
        Self {
            state: Arc::new(Mutex::new(MemState {
                now: 0,
                latency,
                blocked: false,
                mem_limit: Addr::MAX,
                pending: Vec::new(),
                accepted: 0,
                rejected: 0,
            })),
        }
    }

    /// Blocks or unblocks the port.
    pub fn set_blocked(&self, blocked: bool) {
        self.state.lock().unwrap().blocked = blocked;
    }

    /// Changes the response latency for subsequent requests.
    pub fn set_latency(&self, latency: Cycle) {
        self.state.lock().unwrap().latency = latency;
    }

    /// Marks addresses at or above `limit` as unfetchable.
    pub fn set_mem_limit(&self, limit: Addr) {
        self.state.lock().unwrap().mem_limit = limit;
    }

    /// Number of requests the port accepted.
    pub fn accepted(&self) -> u64 {
        self.state.lock().unwrap().accepted
    }

    /// Number of requests rejected while blocked.
    pub fn rejected(&self) -> u64 {
        self.state.lock().unwrap().rejected
    }

    /// Advances the memory clock by one cycle.
    pub fn advance(&self) {
        self.state.lock().unwrap().now += 1;
    }

    /// Removes and returns every response that is ready for delivery.
    pub fn take_ready(&self) -> Vec<FetchPacket> {
        let mut state = self.state.lock().unwrap();
        let now = state.now;
        let mut ready = Vec::new();
        let mut still_pending = Vec::new();
        for (at, pkt) in state.pending.drain(..) {
            if at <= now {
                ready.push(pkt);
            } else {
                still_pending.push((at, pkt));
            }
        }
        state.pending = still_pending;
        ready
    }
}

impl InstPort for TimingInstMem {
    fn send_timing_req(&mut self, pkt: &FetchPacket) -> bool {
        let mut state = self.state.lock().unwrap();
        if state.blocked {
            state.rejected += 1;
            return false;
        }
        state.accepted += 1;
        let response = FetchPacket {
            req: pkt.req,
            paddr: pkt.paddr,
            data: Some(vec![0; pkt.req.size]),
        };
        let ready_at = state.now + state.latency;
        state.pending.push((ready_at, response));
        true
    }

    fn is_mem_addr(&self, paddr: Addr) -> bool {
        paddr < self.state.lock().unwrap().mem_limit
    }
}
