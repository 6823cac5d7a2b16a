//! # Linear Stack-Map Checking (Pass B)
//!
//! One pass over the bytecode in order, simulating each instruction against the live frame.
//! At every map point the live frame must be slot-wise assignable to the recorded frame, and
//! the recorded frame is then adopted inline so the rest of the simulation runs on the
//! declared state. Between map points the per-opcode contracts are the same as the synthesis
//! pass applies; there is no merging here, only matching.
//!
//! The recorded frames come either from the decoded `StackMapTable` or from the synthesis
//! pass; the checker does not care which.

use crate::control_flow::{BytecodeMap, StackMaps};
use crate::diagnostics::VerificationTrace;
use crate::error::{ErrorDetail, ErrorKind, Result};
use crate::frame::Frame;
use crate::handlers::{self, Control, MethodContext};
use crate::lattice::{TypeEnv, is_assignable};
use crate::opcodes::{self, Bytecode};
use crate::types::TypeWord;

/// Check the method against its recorded frames.
///
/// # Errors
/// Fails with the first contract violation: a frame mismatch at a map point, a branch to a
/// pc without a recorded frame, unreachable code without a frame, or any per-opcode failure.
pub fn verify_bytecodes(
    ctx: &MethodContext<'_>,
    env: &mut TypeEnv<'_>,
    map: &BytecodeMap,
    stack_maps: &StackMaps,
    trace: &mut VerificationTrace,
) -> Result<()> {
    let bytecode = Bytecode::new(&ctx.method.code);
    if bytecode.is_empty() {
        return Err(ErrorDetail::new(ErrorKind::UnexpectedEOF).at(0).into());
    }

    check_handler_classes(ctx, env, bytecode.len())?;

    let mut live: Option<Frame> = Some(ctx.entry_frame()?);
    let mut pc: u32 = 0;
    // Cursor over the recorded frames in pc order; a slot the walk passes without landing on
    // is anchored inside an instruction.
    let mut slot_cursor = 0usize;

    while pc < bytecode.len() {
        while let Some(slot) = stack_maps.get(slot_cursor) {
            if slot.pc > pc {
                break;
            }
            if slot.pc < pc {
                return Err(ErrorDetail::new(ErrorKind::WrongStackmapFrame)
                    .at(slot.pc)
                    .target_frame(slot_cursor)
                    .into());
            }
            // A map point at this pc: match and adopt.
            match (&mut live, &slot.frame) {
                (Some(frame), Some(recorded)) => {
                    match_frame(env, frame, recorded, slot_cursor)?;
                    *frame = recorded.clone();
                    trace.log_anchor(pc, frame);
                }
                (None, Some(recorded)) => {
                    let mut frame = recorded.clone();
                    frame.pc = pc;
                    trace.log_anchor(pc, &frame);
                    live = Some(frame);
                }
                (Some(_), None) => {
                    return Err(ErrorDetail::new(ErrorKind::ExpectStackMapFrame).at(pc).into());
                }
                (None, None) => {
                    return Err(ErrorDetail::new(ErrorKind::DeadCode).at(pc).into());
                }
            }
            slot_cursor += 1;
        }

        let Some(frame) = live.as_mut() else {
            return Err(ErrorDetail::new(ErrorKind::DeadCode).at(pc).into());
        };

        // Every instruction inside an exception range must reach the handler's declared frame
        // with one thrown reference on the stack.
        check_covering_handlers(ctx, env, map, stack_maps, frame, pc)?;

        let opcode = bytecode.opcode(pc)?;
        trace.log_instruction(pc, opcodes::mnemonic(opcode), frame);

        let step = handlers::execute(ctx, env, &bytecode, frame, pc)?;

        match &step.control {
            Control::Fall => {}
            Control::Conditional(target) => {
                match_branch_target(env, map, stack_maps, frame, *target)?;
            }
            Control::Goto(target) => {
                match_branch_target(env, map, stack_maps, frame, *target)?;
                live = None;
            }
            Control::Switch(targets) => {
                match_branch_target(env, map, stack_maps, frame, targets.default)?;
                for target in &targets.targets {
                    match_branch_target(env, map, stack_maps, frame, *target)?;
                }
                live = None;
            }
            Control::Return | Control::Throw => {
                live = None;
            }
        }

        pc = step.next_pc;
    }

    if live.is_some() {
        return Err(ErrorDetail::new(ErrorKind::NoStackmapFrame)
            .at(bytecode.len())
            .into());
    }
    Ok(())
}

/// Match the live frame against a recorded frame.
///
/// Identical slots pass; a recorded `top` accepts anything (widening); otherwise the live
/// slot must be assignable to the recorded slot. The `uninitialized_this` constraint is a
/// subset relation: the live frame may not forget it.
fn match_frame(
    env: &mut TypeEnv<'_>,
    live: &Frame,
    recorded: &Frame,
    frame_index: usize,
) -> Result<()> {
    if live.stack.len() != recorded.stack.len() {
        return Err(ErrorDetail::new(ErrorKind::StackSizeMismatch)
            .target_frame(frame_index)
            .into());
    }
    if live.uninitialized_this && !recorded.uninitialized_this {
        return Err(ErrorDetail::new(ErrorKind::FramesIncompatibleType)
            .target_frame(frame_index)
            .into());
    }

    let locals_len = live.locals.len().min(recorded.locals.len());
    for slot in 0..locals_len {
        match_slot(env, live.locals[slot], recorded.locals[slot], slot, frame_index)?;
    }
    for slot in 0..live.stack.len() {
        match_slot(
            env,
            live.stack[slot],
            recorded.stack[slot],
            live.locals.len() + slot,
            frame_index,
        )?;
    }
    Ok(())
}

fn match_slot(
    env: &mut TypeEnv<'_>,
    found: TypeWord,
    expected: TypeWord,
    slot: usize,
    frame_index: usize,
) -> Result<()> {
    if found == expected || expected.is_top() {
        return Ok(());
    }
    if is_assignable(env, found, expected)?.is_compatible() {
        return Ok(());
    }
    Err(ErrorDetail::new(ErrorKind::FramesIncompatibleType)
        .slot(slot)
        .target_frame(frame_index)
        .expected(expected)
        .found(found)
        .into())
}

/// A branch target must own a recorded frame the live frame matches; the live frame then
/// continues unchanged on the fall-through path.
fn match_branch_target(
    env: &mut TypeEnv<'_>,
    map: &BytecodeMap,
    stack_maps: &StackMaps,
    live: &Frame,
    target: u32,
) -> Result<()> {
    let Some(index) = map.frame_index(target) else {
        return Err(ErrorDetail::new(ErrorKind::ExpectStackMapFrame).at(target).into());
    };
    let recorded = stack_maps
        .get(index)
        .and_then(|slot| slot.frame.as_ref())
        .ok_or_else(|| ErrorDetail::new(ErrorKind::ExpectStackMapFrame).at(target))?;
    match_frame(env, live, recorded, index)
}

/// Every declared catch class must be throwable, and handler pcs must be inside the method.
fn check_handler_classes(
    ctx: &MethodContext<'_>,
    env: &mut TypeEnv<'_>,
    code_length: u32,
) -> Result<()> {
    let throwable = TypeWord::java_lang_throwable();
    for handler in &ctx.method.exception_table {
        if handler.range_pc.start >= handler.range_pc.end
            || u32::from(handler.range_pc.end) > code_length
            || u32::from(handler.handler_pc) >= code_length
        {
            return Err(ErrorDetail::new(ErrorKind::BadBytecode)
                .at(u32::from(handler.handler_pc))
                .into());
        }
        if handler.catch_type != 0 {
            let class_name = ctx.class.constant_pool.try_get_class(handler.catch_type)?;
            let word = TypeWord::from_class_name(env.names, class_name)?;
            if !is_assignable(env, word, throwable)?.is_compatible() {
                return Err(ErrorDetail::new(ErrorKind::IncompatibleType)
                    .at(u32::from(handler.handler_pc))
                    .expected(throwable)
                    .found(word)
                    .into());
            }
        }
    }
    Ok(())
}

/// Check the handler-entry state for every handler covering this pc: the current locals with
/// a single thrown reference must match the handler's declared frame.
fn check_covering_handlers(
    ctx: &MethodContext<'_>,
    env: &mut TypeEnv<'_>,
    map: &BytecodeMap,
    stack_maps: &StackMaps,
    live: &Frame,
    pc: u32,
) -> Result<()> {
    for handler in &ctx.method.exception_table {
        let covered =
            u32::from(handler.range_pc.start) <= pc && pc < u32::from(handler.range_pc.end);
        if !covered {
            continue;
        }

        let catch_word = if handler.catch_type == 0 {
            TypeWord::java_lang_throwable()
        } else {
            let class_name = ctx.class.constant_pool.try_get_class(handler.catch_type)?;
            TypeWord::from_class_name(env.names, class_name)?
        };

        let mut thrown = live.clone();
        thrown.clear_stack();
        thrown.push(catch_word)?;
        match_branch_target(env, map, stack_maps, &thrown, u32::from(handler.handler_pc))?;
    }
    Ok(())
}
