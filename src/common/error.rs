//! Fault and configuration error definitions.
//!
//! This module defines the error surface of the frontend:
//! 1. **Faults:** fetch-visible translation faults, carried through the
//!    pipeline on a NOP and reconciled by a downstream squash.
//! 2. **Configuration errors:** construction-time parameter problems that
//!    abort initialization.

use std::fmt;

use super::Addr;

/// A fault raised while fetching.
///
/// Faults never abort the simulation: the fetch engine wraps them in a
/// single NOP instruction and keeps the thread parked until a downstream
/// stage takes the trap and squashes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Fault {
    /// Instruction address misaligned.
    ///
    /// Raised when the fetch PC is not aligned to the instruction size.
    /// The associated value is the misaligned address.
    InstAddrMisaligned(Addr),

    /// Instruction access fault.
    ///
    /// Raised when an instruction fetch violates memory protection.
    /// The associated value is the faulting virtual address.
    InstAccessFault(Addr),

    /// Instruction page fault.
    ///
    /// Raised when translation of the fetch address misses in the page
    /// tables. The associated value is the faulting virtual address.
    InstPageFault(Addr),
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fault::InstAddrMisaligned(addr) => {
                write!(f, "InstAddrMisaligned({:#x})", addr)
            }
            Fault::InstAccessFault(addr) => write!(f, "InstAccessFault({:#x})", addr),
            Fault::InstPageFault(addr) => write!(f, "InstPageFault({:#x})", addr),
        }
    }
}

impl std::error::Error for Fault {}

/// A construction-time configuration problem.
///
/// Returned by component constructors when a parameter cannot describe
/// real hardware (non-power-of-two table sizes, zero widths, more threads
/// than the frontend is sized for). These are fatal: initialization stops.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// A table size that must be a power of two is not.
    ///
    /// The associated values are the parameter name and the offending size.
    NotPowerOfTwo(&'static str, usize),

    /// A width or capacity parameter is zero.
    ZeroParam(&'static str),

    /// More threads configured than `MAX_THREADS`.
    TooManyThreads(usize),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::NotPowerOfTwo(name, size) => {
                write!(f, "{} must be a power of two, got {}", name, size)
            }
            ConfigError::ZeroParam(name) => write!(f, "{} must be non-zero", name),
            ConfigError::TooManyThreads(n) => {
                write!(
                    f,
                    "num_threads {} exceeds the supported maximum {}",
                    n,
                    super::MAX_THREADS
                )
            }
        }
    }
}

impl std::error::Error for ConfigError {}
