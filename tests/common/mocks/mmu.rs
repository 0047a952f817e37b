//! Table-driven MMU with configurable latency and fault ranges.
//!
//! Translates identity (physical = virtual) with a fixed delay, except for
//! configured fault ranges. The handle is clonable so tests can adjust the
//! behavior after the fetch engine has taken ownership.

use std::sync::{Arc, Mutex};

use frontsim::common::{Addr, Cycle, Fault};
use frontsim::mem::{FetchRequest, InstMmu, TranslationOutcome};

struct MmuState {
    delay: Cycle,
    /// Half-open [start, end) ranges that raise a page fault.
    faults: Vec<(Addr, Addr)>,
    translations: u64,
}

/// Clonable handle to the table MMU.
#[derive(Clone)]
pub struct TableMmu {
    state: Arc<Mutex<MmuState>>,
}

impl TableMmu {
    pub fn new(delay: Cycle) -> Self {
        Self {
            state: Arc::new(Mutex::new(MmuState {
                delay,
                faults: Vec::new(),
                translations: 0,
            })),
        }
    }

    /// Makes `[start, end)` raise an instruction page fault.
    pub fn add_fault_range(&self, start: Addr, end: Addr) {
        self.state.lock().unwrap().faults.push((start, end));
    }

    /// Changes the translation delay.
    pub fn set_delay(&self, delay: Cycle) {
        self.state.lock().unwrap().delay = delay;
    }

    /// Number of translations requested.
    pub fn translations(&self) -> u64 {
        self.state.lock().unwrap().translations
    }
}

impl InstMmu for TableMmu {
    fn translate_timing(&mut self, req: &FetchRequest) -> TranslationOutcome {
        let mut state = self.state.lock().unwrap();
        state.translations += 1;
        let faulted = state
            .faults
            .iter()
            .any(|&(start, end)| req.vaddr >= start && req.vaddr < end);
        if faulted {
            TranslationOutcome::fault(state.delay, Fault::InstPageFault(req.vaddr))
        } else {
            TranslationOutcome {
                delay: state.delay,
                result: Ok(req.vaddr),
            }
        }
    }
}
