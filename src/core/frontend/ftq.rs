//! Basic blocks and the fetch target queue (FTQ).
//!
//! The FTQ decouples the branch prediction unit from the fetch engine:
//! the producer walks a speculative PC and appends basic blocks, the
//! consumer drains them in prediction order. Both sides run on the same
//! simulation thread, so the queue is plain owned data with the producer
//! operating on the back and the consumer on the front.

use std::collections::VecDeque;

use crate::common::{Addr, InstSeqNum, MAX_ADDR, PcState, ThreadId};

/// A run of sequentially fetched instructions ended by a predicted branch
/// or a size cap.
///
/// A block is *open* while the producer is still extending it (its end is
/// the sentinel address) and *sealed* once a terminal instruction is known.
/// Each block reserves a window of sequence numbers at creation;
/// instructions fetched from the block draw from that window, and the
/// terminal instruction takes the upper bound itself.
#[derive(Clone, Debug)]
pub struct BasicBlock {
    /// Owning thread.
    pub tid: ThreadId,
    /// First PC of the block.
    pub start_pc: PcState,
    /// Terminal PC; `None` while the block is open.
    pub end_pc: Option<PcState>,
    /// Lower bound of the reserved sequence-number window (exclusive).
    pub start_seq_num: InstSeqNum,
    /// Upper bound of the reserved window; the terminal instruction's
    /// sequence number.
    pub br_seq_num: InstSeqNum,
    /// Offset of the next intra-block sequence number to hand out.
    seq_iter: InstSeqNum,
    /// The terminal instruction is a branch (not a size-cap seal).
    pub is_branch: bool,
    /// The terminal branch was predicted taken.
    pub taken: bool,
    /// Predicted successor of the block.
    pub pred_pc: Option<PcState>,
}

impl BasicBlock {
    /// Opens a new block at `start_pc` reserving `window` sequence numbers.
    pub fn new(tid: ThreadId, start_pc: PcState, start_seq_num: InstSeqNum, window: u64) -> Self {
        Self {
            tid,
            start_pc,
            end_pc: None,
            start_seq_num,
            br_seq_num: start_seq_num + window,
            seq_iter: 0,
            is_branch: false,
            taken: false,
            pred_pc: None,
        }
    }

    /// First address of the block.
    #[inline]
    pub fn start_address(&self) -> Addr {
        self.start_pc.inst_addr()
    }

    /// Terminal address, or the sentinel while the block is open.
    #[inline]
    pub fn end_address(&self) -> Addr {
        self.end_pc.map_or(MAX_ADDR, |pc| pc.inst_addr())
    }

    /// Whether the producer has sealed the block.
    #[inline]
    pub fn is_sealed(&self) -> bool {
        self.end_pc.is_some()
    }

    /// Whether `addr` lies inside the block (terminal exclusive).
    pub fn is_in_bb(&self, addr: Addr) -> bool {
        addr >= self.start_address() && addr < self.end_address()
    }

    /// Whether `addr` is the terminal address.
    pub fn is_terminal(&self, addr: Addr) -> bool {
        addr == self.end_address()
    }

    /// Whether `addr` is the terminal address of a branch-sealed block.
    pub fn is_terminal_branch(&self, addr: Addr) -> bool {
        self.is_terminal(addr) && self.is_branch
    }

    /// Whether `addr` ran past the terminal address.
    pub fn has_exceeded(&self, addr: Addr) -> bool {
        addr > self.end_address()
    }

    /// Draws the next intra-block sequence number.
    ///
    /// Returns `None` when the reserved window is exhausted; the caller
    /// treats that as a block boundary.
    pub fn next_seq_num(&mut self) -> Option<InstSeqNum> {
        if self.start_seq_num + self.seq_iter + 1 >= self.br_seq_num {
            return None;
        }
        self.seq_iter += 1;
        Some(self.start_seq_num + self.seq_iter)
    }

    /// Sequence numbers still available in the window (terminal excluded).
    pub fn remaining_seq_nums(&self) -> u64 {
        (self.br_seq_num - self.start_seq_num).saturating_sub(self.seq_iter + 1)
    }

    /// Seals the block with a terminal branch.
    pub fn add_terminal(&mut self, br_pc: PcState, taken: bool, pred_pc: PcState) {
        self.end_pc = Some(br_pc);
        self.is_branch = true;
        self.taken = taken;
        self.pred_pc = Some(pred_pc);
    }

    /// Seals the block at a size cap; control falls through sequentially.
    pub fn add_terminal_no_branch(&mut self, end_pc: PcState, pred_pc: PcState) {
        self.end_pc = Some(end_pc);
        self.is_branch = false;
        self.taken = false;
        self.pred_pc = Some(pred_pc);
    }
}

/// Bounded per-thread queue of basic blocks, producer at the back,
/// consumer at the front.
pub struct Ftq {
    blocks: VecDeque<BasicBlock>,
    capacity: usize,
}

impl Ftq {
    /// Creates an empty queue holding at most `capacity` blocks.
    pub fn new(capacity: usize) -> Self {
        Self {
            blocks: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Number of queued blocks.
    #[inline]
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Whether no blocks are queued.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Whether the queue is at capacity.
    #[inline]
    pub fn is_full(&self) -> bool {
        self.blocks.len() >= self.capacity
    }

    /// Appends a freshly opened block.
    ///
    /// Sequence windows must be ordered: each new block starts strictly
    /// after every block already queued.
    pub fn push_back(&mut self, block: BasicBlock) {
        debug_assert!(!self.is_full());
        debug_assert!(
            self.blocks
                .back()
                .map_or(true, |b| block.start_seq_num >= b.br_seq_num),
            "FTQ blocks must be ordered by sequence window"
        );
        self.blocks.push_back(block);
    }

    /// The block being consumed.
    pub fn front(&self) -> Option<&BasicBlock> {
        self.blocks.front()
    }

    /// Mutable access to the block being consumed.
    pub fn front_mut(&mut self) -> Option<&mut BasicBlock> {
        self.blocks.front_mut()
    }

    /// Mutable access to the block being produced.
    pub fn back_mut(&mut self) -> Option<&mut BasicBlock> {
        self.blocks.back_mut()
    }

    /// The block being produced.
    pub fn back(&self) -> Option<&BasicBlock> {
        self.blocks.back()
    }

    /// Retires the consumed front block.
    pub fn pop_front(&mut self) -> Option<BasicBlock> {
        self.blocks.pop_front()
    }

    /// Discards every queued block.
    pub fn purge(&mut self) {
        self.blocks.clear();
    }

    /// Iterates the queued blocks front to back.
    pub fn iter(&self) -> impl Iterator<Item = &BasicBlock> {
        self.blocks.iter()
    }
}
