//! Static-instruction model and the pre-decode contract.
//!
//! The frontend does not interpret real machine encodings; it works with
//! pre-decoded flag bundles. This module provides:
//! 1. **StaticInst:** the flag bundle describing one (macro) instruction.
//! 2. **BranchClass:** control-flow classification derived from the flags.
//! 3. **DynInst:** the dynamic handle delivered to decode.
//! 4. **InstDecoder:** the byte-consuming pre-decode contract.

/// The pre-decode contract between fetch and the decoder.
pub mod decoder;
/// Dynamic instruction handles.
pub mod dyn_inst;
/// Static-instruction flags and branch classification.
pub mod static_inst;

pub use self::decoder::InstDecoder;
pub use self::dyn_inst::DynInst;
pub use self::static_inst::{BranchClass, StaticInst};
