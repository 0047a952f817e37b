//! Return Address Stack (RAS).
//!
//! The RAS is a specialized predictor for function return addresses. It
//! operates as a bounded circular stack, pushed on calls and popped on
//! returns. Every speculative push or pop produces a recovery token
//! recording enough state to restore the stack bit-exactly when the
//! operation is squashed.

use crate::common::{Addr, MAX_ADDR};

/// What a speculative RAS operation did, for exact undo.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RasAction {
    /// A push; `overwritten` is the slot value the push clobbered.
    Pushed { overwritten: Addr },
    /// A pop; the popped value stays in place, only pointers moved.
    Popped,
    /// A pop against an empty stack; the prediction is garbage.
    Underflow,
}

/// Recovery token for one speculative RAS operation.
///
/// Produced by [`Ras::push`] and [`Ras::pop`]; consumed exactly once by
/// [`Ras::restore`] (on squash) or dropped (on commit).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RasHistory {
    action: RasAction,
    tos: usize,
    used: usize,
}

impl RasHistory {
    /// Whether the operation underflowed, corrupting the prediction.
    #[inline]
    pub fn corrupted(&self) -> bool {
        self.action == RasAction::Underflow
    }
}

/// Bounded circular return-address stack for one thread.
pub struct Ras {
    stack: Vec<Addr>,
    /// Index of the top entry.
    tos: usize,
    /// Number of live entries.
    used: usize,
    capacity: usize,
}

impl Ras {
    /// Creates an empty stack with `capacity` slots.
    pub fn new(capacity: usize) -> Self {
        Self {
            stack: vec![0; capacity.max(1)],
            tos: 0,
            used: 0,
            capacity: capacity.max(1),
        }
    }

    /// Number of live entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.used
    }

    /// Whether the stack holds no live entries.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.used == 0
    }

    /// The top entry without modifying state.
    pub fn top(&self) -> Option<Addr> {
        if self.used == 0 {
            None
        } else {
            Some(self.stack[self.tos])
        }
    }

    /// Speculatively pushes a return address.
    ///
    /// When the stack is full the eldest entry is silently discarded. The
    /// returned token restores the pointer and the overwritten slot.
    pub fn push(&mut self, addr: Addr) -> RasHistory {
        let tos_before = self.tos;
        let used_before = self.used;
        let slot = if self.used == 0 { self.tos } else { (self.tos + 1) % self.capacity };
        let overwritten = self.stack[slot];
        self.stack[slot] = addr;
        self.tos = slot;
        self.used = (self.used + 1).min(self.capacity);
        RasHistory {
            action: RasAction::Pushed { overwritten },
            tos: tos_before,
            used: used_before,
        }
    }

    /// Speculatively pops the predicted return target.
    ///
    /// Underflow yields the sentinel address and a token flagged corrupted;
    /// the caller decides how to predict in that case.
    pub fn pop(&mut self) -> (Addr, RasHistory) {
        if self.used == 0 {
            return (
                MAX_ADDR,
                RasHistory {
                    action: RasAction::Underflow,
                    tos: self.tos,
                    used: 0,
                },
            );
        }
        let token = RasHistory {
            action: RasAction::Popped,
            tos: self.tos,
            used: self.used,
        };
        let addr = self.stack[self.tos];
        self.tos = (self.tos + self.capacity - 1) % self.capacity;
        self.used -= 1;
        (addr, token)
    }

    /// Undoes the operation described by `history`.
    pub fn restore(&mut self, history: RasHistory) {
        match history.action {
            RasAction::Pushed { overwritten } => {
                let slot = if history.used == 0 {
                    history.tos
                } else {
                    (history.tos + 1) % self.capacity
                };
                self.stack[slot] = overwritten;
            }
            RasAction::Popped | RasAction::Underflow => {}
        }
        self.tos = history.tos;
        self.used = history.used;
    }

    /// Discards every entry.
    pub fn reset(&mut self) {
        self.tos = 0;
        self.used = 0;
    }
}
