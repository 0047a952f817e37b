//! Architectural program counter state.
//!
//! A `PcState` carries the macro-instruction address together with a
//! micro-PC for instructions that expand into multiple internal operations.
//! Copies are deep copies; the type is plain data.

use super::{Addr, INST_BYTES};

/// Program counter state with micro-op position.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PcState {
    addr: Addr,
    micro_pc: u16,
}

impl PcState {
    /// Creates a PC at the given instruction address, micro-PC zero.
    pub fn new(addr: Addr) -> Self {
        Self { addr, micro_pc: 0 }
    }

    /// The macro-instruction address.
    #[inline]
    pub fn inst_addr(&self) -> Addr {
        self.addr
    }

    /// The micro-op index within the current macro instruction.
    #[inline]
    pub fn micro_pc(&self) -> u16 {
        self.micro_pc
    }

    /// Address of the next sequential macro instruction.
    #[inline]
    pub fn next_inst_addr(&self) -> Addr {
        self.addr.wrapping_add(INST_BYTES)
    }

    /// Advances to the next sequential macro instruction, resetting the
    /// micro-PC.
    pub fn advance(&mut self) {
        self.addr = self.next_inst_addr();
        self.micro_pc = 0;
    }

    /// Advances to the next micro-op of the current macro instruction.
    pub fn advance_micro(&mut self) {
        self.micro_pc += 1;
    }

    /// Resets to the given address, micro-PC zero.
    pub fn set(&mut self, addr: Addr) {
        self.addr = addr;
        self.micro_pc = 0;
    }
}

impl From<Addr> for PcState {
    fn from(addr: Addr) -> Self {
        Self::new(addr)
    }
}
