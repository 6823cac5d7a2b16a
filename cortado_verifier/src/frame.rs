//! # Abstract Frame
//!
//! The per-method frame holding local variable and operand stack type words during simulation,
//! anchored at a bytecode offset. Wide values (`long`, `double`) occupy two consecutive slots
//! with the second slot always `top`; a store into either half of a live pair widens the other
//! half to `top`.
//!
//! The frame also carries the `uninitialized_this` flag: whether any slot still holds the
//! receiver of a constructor before its chained `<init>` call.

use crate::error::{ErrorDetail, ErrorKind, Result};
use crate::lattice::{Merge, TypeEnv, merge_types};
use crate::types::TypeWord;

/// A snapshot of locals and operand stack at a bytecode offset.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    /// The bytecode offset this frame is anchored at.
    pub pc: u32,
    /// Whether any slot still holds the uninitialized receiver of a constructor.
    pub uninitialized_this: bool,
    /// Local variable slots; always `max_locals` long, unused slots hold `top`.
    pub locals: Vec<TypeWord>,
    /// Operand stack slots, top of stack last.
    pub stack: Vec<TypeWord>,
    max_stack: usize,
}

/// The result of merging a frame into a recorded target.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct MergeOutcome {
    /// Whether any target slot widened; a widened target must be rewalked.
    pub changed: bool,
}

impl Frame {
    /// Create a frame with all locals `top` and an empty stack.
    #[must_use]
    pub fn new(max_locals: usize, max_stack: usize) -> Self {
        Self {
            pc: 0,
            uninitialized_this: false,
            locals: vec![TypeWord::top(); max_locals],
            stack: Vec::with_capacity(max_stack),
            max_stack,
        }
    }

    /// The maximum operand stack depth.
    #[must_use]
    pub fn max_stack(&self) -> usize {
        self.max_stack
    }

    /// The current operand stack depth.
    #[must_use]
    pub fn stack_depth(&self) -> usize {
        self.stack.len()
    }

    /// `true` when the operand stack is empty.
    #[must_use]
    pub fn is_stack_empty(&self) -> bool {
        self.stack.is_empty()
    }

    /// Push one slot.
    ///
    /// # Errors
    /// Fails with `StackOverflow` beyond `max_stack`.
    pub fn push(&mut self, word: TypeWord) -> Result<()> {
        if self.stack.len() >= self.max_stack {
            return Err(ErrorDetail::new(ErrorKind::StackOverflow).into());
        }
        self.stack.push(word);
        Ok(())
    }

    /// Push a wide value as the pair `(word, top)`.
    ///
    /// # Errors
    /// Fails with `StackOverflow` if two slots do not fit.
    pub fn push_pair(&mut self, word: TypeWord) -> Result<()> {
        debug_assert!(word.is_wide());
        if self.stack.len() + 2 > self.max_stack {
            return Err(ErrorDetail::new(ErrorKind::StackOverflow).into());
        }
        self.stack.push(word);
        self.stack.push(TypeWord::top());
        Ok(())
    }

    /// Pop one slot.
    ///
    /// # Errors
    /// Fails with `StackUnderflow` on an empty stack.
    pub fn pop(&mut self) -> Result<TypeWord> {
        self.stack
            .pop()
            .ok_or_else(|| ErrorDetail::new(ErrorKind::StackUnderflow).into())
    }

    /// Pop one slot that must hold exactly the given base type.
    ///
    /// # Errors
    /// Fails with `IncompatibleType` carrying the expected and found types.
    pub fn pop_expect(&mut self, expected: TypeWord) -> Result<TypeWord> {
        let found = self.pop()?;
        if found != expected {
            return Err(ErrorDetail::new(ErrorKind::IncompatibleType)
                .slot(self.locals.len() + self.stack.len())
                .expected(expected)
                .found(found)
                .into());
        }
        Ok(found)
    }

    /// Pop a wide pair: the `top` half, then a slot holding exactly `expected`.
    ///
    /// # Errors
    /// Fails with `IncompatibleType`; the companion half is carried as auxiliary data when the
    /// mismatch is on the second slot.
    pub fn pop_pair_expect(&mut self, expected: TypeWord) -> Result<()> {
        debug_assert!(expected.is_wide());
        let high = self.pop()?;
        if !high.is_top() {
            return Err(ErrorDetail::new(ErrorKind::IncompatibleType)
                .slot(self.locals.len() + self.stack.len())
                .expected(TypeWord::top())
                .found(high)
                .temp(expected)
                .into());
        }
        self.pop_expect(expected)?;
        Ok(())
    }

    /// Pop one slot that must not be `top` (a category-1 value or either reference kind).
    ///
    /// # Errors
    /// Fails with `WrongTopType` when the top of stack is `top` or a wide scalar.
    pub fn pop_category1(&mut self) -> Result<TypeWord> {
        let word = self.pop()?;
        if word.is_top() || word.is_wide() {
            return Err(ErrorDetail::new(ErrorKind::WrongTopType)
                .slot(self.locals.len() + self.stack.len())
                .found(word)
                .into());
        }
        Ok(word)
    }

    /// Pop one slot that must be an initialized reference.
    ///
    /// # Errors
    /// Fails with `IncompatibleType` for base or uninitialized values.
    pub fn pop_reference(&mut self) -> Result<TypeWord> {
        let word = self.pop()?;
        if !word.is_reference() {
            return Err(ErrorDetail::new(ErrorKind::IncompatibleType)
                .slot(self.locals.len() + self.stack.len())
                .found(word)
                .into());
        }
        Ok(word)
    }

    /// Pop one slot that may be a reference or an uninitialized value.
    ///
    /// # Errors
    /// Fails with `IncompatibleType` for base values.
    pub fn pop_reference_or_uninit(&mut self) -> Result<TypeWord> {
        let word = self.pop()?;
        if !word.is_reference_or_uninit() {
            return Err(ErrorDetail::new(ErrorKind::IncompatibleType)
                .slot(self.locals.len() + self.stack.len())
                .found(word)
                .into());
        }
        Ok(word)
    }

    /// The slot at the top of the stack.
    ///
    /// # Errors
    /// Fails with `StackUnderflow` on an empty stack.
    pub fn peek(&self) -> Result<TypeWord> {
        self.stack
            .last()
            .copied()
            .ok_or_else(|| ErrorDetail::new(ErrorKind::StackUnderflow).into())
    }

    /// The slot at the given depth from the top; depth 0 is the top of stack.
    ///
    /// # Errors
    /// Fails with `StackUnderflow` when the depth exceeds the stack.
    pub fn peek_at(&self, depth: usize) -> Result<TypeWord> {
        let len = self.stack.len();
        if depth >= len {
            return Err(ErrorDetail::new(ErrorKind::StackUnderflow).into());
        }
        Ok(self.stack[len - 1 - depth])
    }

    /// Empty the operand stack.
    pub fn clear_stack(&mut self) {
        self.stack.clear();
    }

    /// The type at a local variable index.
    ///
    /// # Errors
    /// Fails with `BadBytecode` on an out-of-range index.
    pub fn get_local(&self, index: u16) -> Result<TypeWord> {
        self.locals
            .get(index as usize)
            .copied()
            .ok_or_else(|| ErrorDetail::new(ErrorKind::BadBytecode).slot(index as usize).into())
    }

    /// The wide pair at a local variable index; the second slot must be `top`.
    ///
    /// # Errors
    /// Fails with `IncompatibleType` carrying the companion half as auxiliary data.
    pub fn get_local_pair(&self, index: u16, expected: TypeWord) -> Result<TypeWord> {
        debug_assert!(expected.is_wide());
        let low = self.get_local(index)?;
        let high = self.get_local(index.saturating_add(1))?;
        if low != expected || !high.is_top() {
            return Err(ErrorDetail::new(ErrorKind::IncompatibleType)
                .slot(index as usize)
                .expected(expected)
                .found(low)
                .temp(high)
                .into());
        }
        Ok(low)
    }

    /// Write a local slot, widening a preceding wide value whose pair this write destroys.
    ///
    /// # Errors
    /// Fails with `BadBytecode` on an out-of-range index.
    pub fn set_local(&mut self, index: u16, word: TypeWord) -> Result<()> {
        let index = index as usize;
        if index >= self.locals.len() {
            return Err(ErrorDetail::new(ErrorKind::BadBytecode).slot(index).into());
        }
        self.locals[index] = word;
        // Overwriting the second half of a live long/double orphans the first half.
        if index > 0 && self.locals[index - 1].is_wide() {
            self.locals[index - 1] = TypeWord::top();
        }
        Ok(())
    }

    /// Write a wide pair to consecutive local slots.
    ///
    /// # Errors
    /// Fails with `BadBytecode` if the pair does not fit.
    pub fn set_local_pair(&mut self, index: u16, word: TypeWord) -> Result<()> {
        debug_assert!(word.is_wide());
        let second = index.saturating_add(1);
        if (second as usize) >= self.locals.len() {
            return Err(ErrorDetail::new(ErrorKind::BadBytecode)
                .slot(index as usize)
                .into());
        }
        self.set_local(index, word)?;
        self.locals[second as usize] = TypeWord::top();
        Ok(())
    }

    /// Rewrite every slot equal to `uninitialized` with `initialized`, in locals and on the
    /// operand stack. Called when an `<init>` completes.
    pub fn initialize_object(&mut self, uninitialized: TypeWord, initialized: TypeWord) {
        for slot in self.locals.iter_mut().chain(self.stack.iter_mut()) {
            if *slot == uninitialized {
                *slot = initialized;
            }
        }
    }

    /// `true` if any slot holds the given word.
    #[must_use]
    pub fn contains(&self, word: TypeWord) -> bool {
        self.locals.iter().chain(self.stack.iter()).any(|slot| *slot == word)
    }

    /// Merge this live frame into a recorded target frame, slot-wise.
    ///
    /// Locals widen toward `top`; operand stack slots must remain reference-compatible.
    /// The `uninitialized_this` constraint joins by OR: a path that may still hold the
    /// uninitialized receiver keeps the constraint alive at the join.
    ///
    /// # Errors
    /// Fails with `StackSizeMismatch` when depths differ and `IncompatibleType` for an operand
    /// stack slot that cannot merge.
    pub fn merge_into(&self, target: &mut Frame, env: &mut TypeEnv<'_>) -> Result<MergeOutcome> {
        if self.stack.len() != target.stack.len() {
            return Err(ErrorDetail::new(ErrorKind::StackSizeMismatch)
                .at(target.pc)
                .into());
        }

        let mut changed = false;

        if self.uninitialized_this && !target.uninitialized_this {
            target.uninitialized_this = true;
            changed = true;
        }

        let locals_len = self.locals.len().min(target.locals.len());
        for index in 0..locals_len {
            let source = self.locals[index];
            let recorded = target.locals[index];
            if source == recorded {
                continue;
            }
            // A base or uninitialized value that disagrees widens the local to top; the local
            // simply becomes unusable on the joined path.
            if source.is_base()
                || source.is_special()
                || recorded.is_base()
                || recorded.is_special()
            {
                if !recorded.is_top() {
                    target.locals[index] = TypeWord::top();
                    changed = true;
                }
                continue;
            }
            match merge_types(env, recorded, source)? {
                Merge::Unchanged => {}
                Merge::Widened(widened) => {
                    if widened != recorded {
                        target.locals[index] = widened;
                        changed = true;
                    }
                }
            }
        }

        for index in 0..self.stack.len() {
            let source = self.stack[index];
            let recorded = target.stack[index];
            if source == recorded {
                continue;
            }
            // Operand stack slots must stay usable: only references merge.
            if !source.is_reference() || !recorded.is_reference() {
                return Err(ErrorDetail::new(ErrorKind::IncompatibleType)
                    .at(target.pc)
                    .slot(target.locals.len() + index)
                    .expected(recorded)
                    .found(source)
                    .into());
            }
            match merge_types(env, recorded, source)? {
                Merge::Unchanged => {}
                Merge::Widened(widened) => {
                    if widened != recorded {
                        target.stack[index] = widened;
                        changed = true;
                    }
                }
            }
        }

        Ok(MergeOutcome { changed })
    }
}
