//! The pre-decode contract between fetch and the decoder.
//!
//! Fetch feeds the decoder raw bytes one instruction word at a time and
//! asks for a pre-decoded `StaticInst` back. The decoder is an external
//! collaborator; only this contract matters to the frontend.

use crate::common::{Addr, PcState};

use super::static_inst::StaticInst;

/// Byte-consuming instruction pre-decoder.
///
/// The protocol per instruction word:
/// 1. `more_bytes` with the word at `fetch_addr`.
/// 2. `instruction_ready`: false means the decoder wants further words
///    (e.g. a split encoding) before it can produce anything.
/// 3. `decode`: `None` means more bytes are still needed; `Some` may be a
///    macro-op whose micro-ops the fetch engine expands via
///    [`StaticInst::microop`].
///
/// `reset` discards any partially assembled state; fetch calls it on every
/// squash.
pub trait InstDecoder {
    /// Supplies the instruction word fetched from `fetch_addr` for `pc`.
    fn more_bytes(&mut self, pc: &PcState, fetch_addr: Addr, data: &[u8]);

    /// Whether a full instruction has been assembled.
    fn instruction_ready(&self) -> bool;

    /// Produces the pre-decoded instruction at `pc`, if ready.
    fn decode(&mut self, pc: &mut PcState) -> Option<StaticInst>;

    /// Discards partially assembled state.
    fn reset(&mut self);
}
