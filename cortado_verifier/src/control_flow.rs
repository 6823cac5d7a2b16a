//! # Bytecode Map and Branch Discovery
//!
//! A per-pc `u32` bitfield records which offsets are branch targets or exception-range starts,
//! which targets are queued for walking, and which recorded frame belongs to each target. One
//! pass over the bytecode (advancing by instruction length) marks every branch and switch
//! target; a second pass over the exception table marks range starts and handler entries.
//!
//! The two walk queues of the synthesis pass are ring buffers of pcs; queue membership is
//! deduplicated by the `ON_*_QUEUE` bits in the map.

use cortado_romclass::ExceptionTableEntry;

use crate::error::{ErrorDetail, ErrorKind, Result};
use crate::frame::Frame;
use crate::opcodes::{
    self, ACTION_CONDITIONAL, ACTION_GOTO, ACTION_SWITCH, Bytecode,
};

/// At least one instruction branches to this pc.
pub const BRANCH_TARGET: u32 = 0x01;
/// This pc starts an exception range.
pub const BRANCH_EXCEPTION_START: u32 = 0x02;
/// Queued for a first walk.
pub const BRANCH_ON_UNWALKED_QUEUE: u32 = 0x04;
/// Queued for a repeat walk after widening.
pub const BRANCH_ON_REWALK_QUEUE: u32 = 0x08;
/// Shift of the recorded-frame index within a map entry.
pub const BRANCH_INDEX_SHIFT: u32 = 4;

/// Per-pc flags and recorded-frame indices for one method.
#[derive(Debug, Default)]
pub struct BytecodeMap {
    entries: Vec<u32>,
}

impl BytecodeMap {
    /// Create a map for a method of the given code length.
    #[must_use]
    pub fn new(code_length: u32) -> Self {
        Self {
            entries: vec![0; code_length as usize],
        }
    }

    /// Clear and resize for the next method, reusing the allocation.
    pub fn reset(&mut self, code_length: u32) {
        self.entries.clear();
        self.entries.resize(code_length as usize, 0);
    }

    /// Set flag bits at a pc.
    pub fn mark(&mut self, pc: u32, flags: u32) {
        if let Some(entry) = self.entries.get_mut(pc as usize) {
            *entry |= flags;
        }
    }

    /// Clear flag bits at a pc.
    pub fn clear(&mut self, pc: u32, flags: u32) {
        if let Some(entry) = self.entries.get_mut(pc as usize) {
            *entry &= !flags;
        }
    }

    /// Test whether all of the given flag bits are set at a pc.
    #[must_use]
    pub fn test(&self, pc: u32, flags: u32) -> bool {
        self.entries
            .get(pc as usize)
            .is_some_and(|entry| entry & flags == flags)
    }

    /// Associate a recorded-frame index with a branch-target pc.
    pub fn set_frame_index(&mut self, pc: u32, index: usize) {
        if let Some(entry) = self.entries.get_mut(pc as usize) {
            let flags = *entry & ((1 << BRANCH_INDEX_SHIFT) - 1);
            *entry = flags | (u32::try_from(index).unwrap_or(0) << BRANCH_INDEX_SHIFT);
        }
    }

    /// The recorded-frame index at a branch-target pc.
    #[must_use]
    pub fn frame_index(&self, pc: u32) -> Option<usize> {
        let entry = *self.entries.get(pc as usize)?;
        if entry & BRANCH_TARGET == 0 {
            return None;
        }
        Some((entry >> BRANCH_INDEX_SHIFT) as usize)
    }
}

/// The dense table of recorded frames, one slot per branch target, in pc order.
///
/// A slot with no frame is a branch target that has never been reached.
#[derive(Debug, Default)]
pub struct StackMaps {
    slots: Vec<MapSlot>,
}

/// One recorded frame anchored at a branch-target pc.
#[derive(Debug)]
pub struct MapSlot {
    /// The pc this slot is anchored at.
    pub pc: u32,
    /// The recorded frame; `None` until the target is first reached.
    pub frame: Option<Frame>,
}

impl StackMaps {
    /// Create slots for branch targets at the given pcs (ascending).
    #[must_use]
    pub fn with_targets(pcs: &[u32]) -> Self {
        Self {
            slots: pcs.iter().map(|pc| MapSlot { pc: *pc, frame: None }).collect(),
        }
    }

    /// The number of slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// `true` when the method has no branch targets.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// The slot at an index.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&MapSlot> {
        self.slots.get(index)
    }

    /// Mutable access to the slot at an index.
    #[must_use]
    pub fn get_mut(&mut self, index: usize) -> Option<&mut MapSlot> {
        self.slots.get_mut(index)
    }

    /// Append a slot; used by the stack-map decoder, which discovers anchors in pc order.
    pub fn push(&mut self, pc: u32, frame: Frame) -> usize {
        let index = self.slots.len();
        self.slots.push(MapSlot {
            pc,
            frame: Some(frame),
        });
        index
    }

    /// Iterate over the slots in pc order.
    pub fn iter(&self) -> impl Iterator<Item = &MapSlot> {
        self.slots.iter()
    }

    /// Drop all slots, keeping the allocation.
    pub fn reset(&mut self) {
        self.slots.clear();
    }
}

/// Walk the bytecode once and mark every branch target, then mark exception ranges and
/// handlers. Returns the branch-target pcs in ascending order; the map's frame indices refer
/// to a [`StackMaps`] built from exactly this list.
///
/// # Errors
/// Fails with `BadBytecode` for invalid opcodes or branch targets outside the method.
pub fn discover_branch_targets(
    bytecode: &Bytecode<'_>,
    exception_table: &[ExceptionTableEntry],
    map: &mut BytecodeMap,
) -> Result<Vec<u32>> {
    let mut pc = 0;
    while pc < bytecode.len() {
        let opcode = bytecode.opcode(pc)?;
        match opcodes::action(opcode) {
            ACTION_CONDITIONAL => {
                map.mark(bytecode.branch_target(pc)?, BRANCH_TARGET);
            }
            ACTION_GOTO => {
                let target = if opcode == opcodes::GOTO {
                    bytecode.branch_target(pc)?
                } else {
                    bytecode.wide_branch_target(pc)?
                };
                map.mark(target, BRANCH_TARGET);
            }
            ACTION_SWITCH => {
                let targets = bytecode.switch_targets(pc)?;
                map.mark(targets.default, BRANCH_TARGET);
                for target in targets.targets {
                    map.mark(target, BRANCH_TARGET);
                }
            }
            _ => {}
        }
        pc = bytecode.next_pc(pc)?;
    }

    for handler in exception_table {
        let start = u32::from(handler.range_pc.start);
        let handler_pc = u32::from(handler.handler_pc);
        if start != handler_pc {
            map.mark(start, BRANCH_EXCEPTION_START);
        }
        if handler_pc >= bytecode.len() {
            return Err(ErrorDetail::new(ErrorKind::BadBytecode).at(handler_pc).into());
        }
        map.mark(handler_pc, BRANCH_TARGET);
    }

    let mut targets = Vec::new();
    for pc in 0..bytecode.len() {
        if map.test(pc, BRANCH_TARGET) {
            map.set_frame_index(pc, targets.len());
            targets.push(pc);
        }
    }
    Ok(targets)
}

/// A ring buffer of branch-target pcs awaiting a walk.
///
/// Sized to hold every branch target plus one; idempotency is enforced by the caller through
/// the `ON_*_QUEUE` bits, so the buffer can never overflow.
#[derive(Debug)]
pub struct WalkQueue {
    buffer: Vec<u32>,
    head: usize,
    tail: usize,
}

impl WalkQueue {
    /// Create a queue able to hold `targets` entries.
    #[must_use]
    pub fn new(targets: usize) -> Self {
        Self {
            buffer: vec![0; targets + 1],
            head: 0,
            tail: 0,
        }
    }

    /// Append a pc.
    pub fn push(&mut self, pc: u32) {
        self.buffer[self.tail] = pc;
        self.tail = (self.tail + 1) % self.buffer.len();
        debug_assert_ne!(self.tail, self.head);
    }

    /// Remove and return the oldest pc.
    pub fn pop(&mut self) -> Option<u32> {
        if self.head == self.tail {
            return None;
        }
        let pc = self.buffer[self.head];
        self.head = (self.head + 1) % self.buffer.len();
        Some(pc)
    }

    /// `true` when no pcs are queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.head == self.tail
    }
}
