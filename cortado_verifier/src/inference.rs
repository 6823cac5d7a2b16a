//! # Stack-Map Synthesis (Pass A)
//!
//! Abstract interpretation over the control-flow graph. A single live frame walks straight-
//! line code; at every branch target the live state merges into the target's recorded frame,
//! widening slot-wise toward the lattice join. Widened targets requeue until fixpoint.
//!
//! The walk is driven by two ring-buffer queues: `unwalked` holds targets that have a frame
//! but were never simulated, `rewalk` holds targets whose frame widened after they were
//! walked. Queue membership is deduplicated through the bytecode-map bits. Termination
//! follows from the lattice's bounded height: every requeue is preceded by a strict widening.
//!
//! The synthesised frames are exactly what the linear checker consumes in place of a declared
//! `StackMapTable`.

use crate::control_flow::{
    BRANCH_EXCEPTION_START, BRANCH_ON_REWALK_QUEUE, BRANCH_ON_UNWALKED_QUEUE, BytecodeMap,
    StackMaps, WalkQueue, discover_branch_targets,
};
use crate::error::{ErrorDetail, ErrorKind, Result};
use crate::frame::Frame;
use crate::handlers::{self, Control, MethodContext};
use crate::lattice::TypeEnv;
use crate::opcodes::{self, Bytecode};
use crate::types::TypeWord;

/// Build the recorded frame at every branch target of the method.
///
/// On return, `stack_maps` holds one slot per branch target in pc order; targets that turned
/// out to be unreachable keep an empty slot.
///
/// # Errors
/// Fails with the first contract violation found while simulating, or with
/// `NoStackmapFrame` when a non-terminator runs off the end of the bytecode.
pub fn synthesize_stack_maps(
    ctx: &MethodContext<'_>,
    env: &mut TypeEnv<'_>,
    map: &mut BytecodeMap,
    stack_maps: &mut StackMaps,
) -> Result<()> {
    let bytecode = Bytecode::new(&ctx.method.code);
    if bytecode.is_empty() {
        return Err(ErrorDetail::new(ErrorKind::UnexpectedEOF).at(0).into());
    }

    map.reset(bytecode.len());
    let targets = discover_branch_targets(&bytecode, &ctx.method.exception_table, map)?;
    *stack_maps = StackMaps::with_targets(&targets);

    let mut unwalked = WalkQueue::new(targets.len());
    let mut rewalk = WalkQueue::new(targets.len());

    let mut live = ctx.entry_frame()?;
    let mut pc: u32 = 0;
    let mut walk_start = pc;

    // A loop head at pc 0 must record the entry state before any back edge folds into it.
    if map.frame_index(0).is_some() {
        merge_into_target(env, map, stack_maps, &mut unwalked, &mut rewalk, &live, 0)?;
    }

    loop {
        // Falling into a branch target ends the straight-line walk: the state folds into the
        // target's frame and simulation resumes from whatever the queues hold.
        if pc != walk_start && map.frame_index(pc).is_some() {
            merge_into_target(env, map, stack_maps, &mut unwalked, &mut rewalk, &live, pc)?;
            match next_queued(map, stack_maps, &mut unwalked, &mut rewalk, &mut live)? {
                Some(next) => {
                    pc = next;
                    walk_start = pc;
                    continue;
                }
                None => return Ok(()),
            }
        }

        let opcode = bytecode.opcode(pc)?;

        // Entering an exception range: the range-entry state is a predecessor of the handler
        // even when the first covered instruction cannot raise.
        if map.test(pc, BRANCH_EXCEPTION_START) {
            sweep_exception_handlers(
                ctx, env, map, stack_maps, &mut unwalked, &mut rewalk, &live, pc,
            )?;
        }

        let step = handlers::execute(ctx, env, &bytecode, &mut live, pc)?;

        // Raising instructions and local stores expose the post-instruction locals to every
        // covering handler.
        if opcodes::can_raise(opcode) || is_local_store(&bytecode, pc, opcode)? {
            sweep_exception_handlers(
                ctx, env, map, stack_maps, &mut unwalked, &mut rewalk, &live, pc,
            )?;
        }

        let mut terminated = false;
        match &step.control {
            Control::Fall => {}
            Control::Conditional(target) => {
                merge_into_target(env, map, stack_maps, &mut unwalked, &mut rewalk, &live, *target)?;
            }
            Control::Goto(target) => {
                merge_into_target(env, map, stack_maps, &mut unwalked, &mut rewalk, &live, *target)?;
                terminated = true;
            }
            Control::Switch(targets) => {
                merge_into_target(
                    env, map, stack_maps, &mut unwalked, &mut rewalk, &live, targets.default,
                )?;
                for target in &targets.targets {
                    merge_into_target(
                        env, map, stack_maps, &mut unwalked, &mut rewalk, &live, *target,
                    )?;
                }
                terminated = true;
            }
            Control::Return | Control::Throw => terminated = true,
        }

        if terminated {
            match next_queued(map, stack_maps, &mut unwalked, &mut rewalk, &mut live)? {
                Some(next) => {
                    pc = next;
                    walk_start = pc;
                }
                None => return Ok(()),
            }
        } else {
            if step.next_pc >= bytecode.len() {
                return Err(ErrorDetail::new(ErrorKind::NoStackmapFrame).at(pc).into());
            }
            pc = step.next_pc;
        }
    }
}

/// Merge the live frame into a branch target's recorded frame, queueing the target for a
/// (re)walk when its state is new or widened.
#[expect(clippy::too_many_arguments)]
fn merge_into_target(
    env: &mut TypeEnv<'_>,
    map: &mut BytecodeMap,
    stack_maps: &mut StackMaps,
    unwalked: &mut WalkQueue,
    rewalk: &mut WalkQueue,
    live: &Frame,
    target: u32,
) -> Result<()> {
    let index = map
        .frame_index(target)
        .ok_or_else(|| ErrorDetail::new(ErrorKind::ExpectStackMapFrame).at(target))?;
    let slot = stack_maps
        .get_mut(index)
        .ok_or_else(|| ErrorDetail::new(ErrorKind::ExpectStackMapFrame).at(target))?;

    match &mut slot.frame {
        None => {
            let mut recorded = live.clone();
            recorded.pc = target;
            slot.frame = Some(recorded);
            if !map.test(target, BRANCH_ON_UNWALKED_QUEUE) {
                map.mark(target, BRANCH_ON_UNWALKED_QUEUE);
                unwalked.push(target);
            }
        }
        Some(recorded) => {
            let outcome = live.merge_into(recorded, env)?;
            if outcome.changed
                && !map.test(target, BRANCH_ON_UNWALKED_QUEUE)
                && !map.test(target, BRANCH_ON_REWALK_QUEUE)
            {
                map.mark(target, BRANCH_ON_REWALK_QUEUE);
                rewalk.push(target);
            }
        }
    }
    Ok(())
}

/// Merge the current locals, under a single thrown reference, into every handler covering
/// this pc.
#[expect(clippy::too_many_arguments)]
fn sweep_exception_handlers(
    ctx: &MethodContext<'_>,
    env: &mut TypeEnv<'_>,
    map: &mut BytecodeMap,
    stack_maps: &mut StackMaps,
    unwalked: &mut WalkQueue,
    rewalk: &mut WalkQueue,
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

        // The operand stack of the try body is irrelevant at the handler: one thrown
        // reference replaces it.
        let mut thrown = live.clone();
        thrown.clear_stack();
        thrown.push(catch_word)?;
        merge_into_target(
            env,
            map,
            stack_maps,
            unwalked,
            rewalk,
            &thrown,
            u32::from(handler.handler_pc),
        )?;
    }
    Ok(())
}

/// Pop the next target to walk, unwalked first, and load its recorded frame.
fn next_queued(
    map: &mut BytecodeMap,
    stack_maps: &StackMaps,
    unwalked: &mut WalkQueue,
    rewalk: &mut WalkQueue,
    live: &mut Frame,
) -> Result<Option<u32>> {
    let target = if let Some(target) = unwalked.pop() {
        map.clear(target, BRANCH_ON_UNWALKED_QUEUE);
        target
    } else if let Some(target) = rewalk.pop() {
        map.clear(target, BRANCH_ON_REWALK_QUEUE);
        target
    } else {
        return Ok(None);
    };

    let frame = map
        .frame_index(target)
        .and_then(|index| stack_maps.get(index))
        .and_then(|slot| slot.frame.as_ref())
        .ok_or_else(|| ErrorDetail::new(ErrorKind::ExpectStackMapFrame).at(target))?;
    *live = frame.clone();
    Ok(Some(target))
}

/// Local stores change a slot's type, which covering handlers must observe.
fn is_local_store(bytecode: &Bytecode<'_>, pc: u32, opcode: u8) -> Result<bool> {
    Ok(match opcode {
        opcodes::ISTORE..=opcodes::ASTORE_3 => true,
        opcodes::WIDE => matches!(
            bytecode.read_u8(pc + 1)?,
            opcodes::ISTORE
                | opcodes::LSTORE
                | opcodes::FSTORE
                | opcodes::DSTORE
                | opcodes::ASTORE
        ),
        _ => false,
    })
}
