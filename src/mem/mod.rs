//! Instruction-port and translation contracts.
//!
//! The memory subsystem below the instruction port is an external
//! collaborator; the frontend only depends on the request/response protocol
//! defined here:
//! 1. **Requests and packets:** the units exchanged with the I-cache port.
//! 2. **`InstPort`:** the non-blocking timing port. A rejected send is
//!    stashed and re-issued on `recv_req_retry`.
//! 3. **`InstMmu`:** the translation contract, returning a self-contained
//!    outcome that the fetch engine consumes (inline when immediate,
//!    through a scheduled event when delayed).

use crate::common::{Addr, Cycle, Fault, ThreadId};

/// A fetch-buffer fill request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FetchRequest {
    /// Request id; responses are matched against the outstanding id.
    pub id: u64,
    /// Requesting thread.
    pub tid: ThreadId,
    /// Fetch-buffer-aligned virtual address.
    pub vaddr: Addr,
    /// Number of bytes requested (one fetch buffer).
    pub size: usize,
}

/// A packet exchanged with the instruction port.
///
/// Outbound packets carry no data; the port answers with the same request
/// and the filled payload.
#[derive(Clone, Debug)]
pub struct FetchPacket {
    /// The originating request.
    pub req: FetchRequest,
    /// Translated physical address.
    pub paddr: Addr,
    /// Response payload; `None` on the request leg.
    pub data: Option<Vec<u8>>,
}

impl FetchPacket {
    /// Builds the request leg of a packet.
    pub fn request(req: FetchRequest, paddr: Addr) -> Self {
        Self {
            req,
            paddr,
            data: None,
        }
    }
}

/// Non-blocking timing port into the instruction memory system.
///
/// `send_timing_req` returning `false` means the port is momentarily
/// blocked; the caller keeps the packet and re-sends it when the port
/// signals a retry. Responses are delivered back to the fetch engine by
/// the owner of the port (`Fetch::recv_timing_resp`).
pub trait InstPort {
    /// Attempts to issue a request. `false` = blocked, retry later.
    fn send_timing_req(&mut self, pkt: &FetchPacket) -> bool;

    /// Whether `paddr` maps to fetchable memory.
    ///
    /// Addresses outside fetchable memory park the thread instead of
    /// producing a packet.
    fn is_mem_addr(&self, _paddr: Addr) -> bool {
        true
    }
}

/// Outcome of a timing instruction-address translation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TranslationOutcome {
    /// Cycles until the translation completes. Zero completes inline.
    pub delay: Cycle,
    /// Physical address on success, fault otherwise.
    pub result: Result<Addr, Fault>,
}

impl TranslationOutcome {
    /// An immediate successful translation.
    pub fn hit(paddr: Addr) -> Self {
        Self {
            delay: 0,
            result: Ok(paddr),
        }
    }

    /// A successful translation completing after `delay` cycles.
    pub fn delayed(delay: Cycle, paddr: Addr) -> Self {
        Self {
            delay,
            result: Ok(paddr),
        }
    }

    /// A faulting translation completing after `delay` cycles.
    pub fn fault(delay: Cycle, fault: Fault) -> Self {
        Self {
            delay,
            result: Err(fault),
        }
    }
}

/// Timing translation contract for instruction fetches.
pub trait InstMmu {
    /// Starts translating `req.vaddr` in execute mode.
    fn translate_timing(&mut self, req: &FetchRequest) -> TranslationOutcome;
}
