//! # StackMapTable Decoding
//!
//! Decodes the delta-encoded `StackMapTable` attribute into full frames anchored at absolute
//! pcs, writing each into the stack-map slot table and marking its pc in the bytecode map.
//! The attribute bytes come straight from the ROM class; all multibyte fields are big-endian.
//!
//! Locals deltas are checked before they are applied: a `CHOP` below the argument floor or an
//! `APPEND` past `max_locals` fails without mutating the running locals.

use crate::control_flow::{BRANCH_TARGET, BytecodeMap, StackMaps};
use crate::error::{ErrorDetail, ErrorKind, Result};
use crate::frame::Frame;
use crate::handlers::MethodContext;
use crate::lattice::TypeEnv;
use crate::opcodes::Bytecode;
use crate::types::TypeWord;

const SAME_MAX: u8 = 63;
const SAME_LOCALS_1_STACK_MIN: u8 = 64;
const SAME_LOCALS_1_STACK_MAX: u8 = 127;
const SAME_LOCALS_1_STACK_EXTENDED: u8 = 247;
const CHOP_MIN: u8 = 248;
const CHOP_MAX: u8 = 250;
const SAME_EXTENDED: u8 = 251;
const APPEND_MIN: u8 = 252;
const APPEND_MAX: u8 = 254;
const FULL: u8 = 255;

/// Decode a raw `StackMapTable` attribute into frames.
///
/// Each decoded frame lands in a fresh slot of `stack_maps` and its pc is flagged as a branch
/// target in `map`.
///
/// # Errors
/// Fails with the dedicated locals/stack overflow kinds, `WrongStackmapFrame` for a pc past
/// the end of the method, and `UnexpectedEOF`/`BadBytecode` for malformed attribute bytes.
pub fn decode_stack_map_table(
    ctx: &MethodContext<'_>,
    env: &mut TypeEnv<'_>,
    raw: &[u8],
    entry_frame: &Frame,
    code_length: u32,
    map: &mut BytecodeMap,
    stack_maps: &mut StackMaps,
) -> Result<()> {
    let reader = Bytecode::new(raw);
    let mut at: u32 = 0;

    let entry_count = reader.read_u16(at)?;
    at += 2;

    let max_locals = ctx.method.max_locals as usize;
    let max_stack = ctx.method.max_stack as usize;
    let argument_floor = argument_slots(ctx);

    // The running locals start as the method arguments; each frame's deltas apply on top.
    let mut locals: Vec<TypeWord> = entry_frame.locals[..argument_floor].to_vec();
    let mut pc: Option<u32> = None;

    for _ in 0..entry_count {
        let tag = reader.read_u8(at)?;
        at += 1;

        let delta;
        let mut stack: Vec<TypeWord> = Vec::new();

        match tag {
            0..=SAME_MAX => {
                delta = u32::from(tag);
            }
            SAME_LOCALS_1_STACK_MIN..=SAME_LOCALS_1_STACK_MAX => {
                delta = u32::from(tag - SAME_LOCALS_1_STACK_MIN);
                at = push_stack_element(ctx, env, &reader, at, &mut stack, max_stack)?;
            }
            SAME_LOCALS_1_STACK_EXTENDED => {
                delta = u32::from(reader.read_u16(at)?);
                at += 2;
                at = push_stack_element(ctx, env, &reader, at, &mut stack, max_stack)?;
            }
            CHOP_MIN..=CHOP_MAX => {
                delta = u32::from(reader.read_u16(at)?);
                at += 2;
                let chopped = usize::from(251 - tag);
                chop_locals(&mut locals, chopped)?;
            }
            SAME_EXTENDED => {
                delta = u32::from(reader.read_u16(at)?);
                at += 2;
            }
            APPEND_MIN..=APPEND_MAX => {
                delta = u32::from(reader.read_u16(at)?);
                at += 2;
                let appended = usize::from(tag - 251);
                for _ in 0..appended {
                    let (next_at, word) = parse_element(ctx, env, &reader, at)?;
                    at = next_at;
                    let needed = if word.is_wide() { 2 } else { 1 };
                    if locals.len() + needed > max_locals {
                        return Err(
                            ErrorDetail::new(ErrorKind::StackMapFrameLocalsOverflow).into()
                        );
                    }
                    locals.push(word);
                    if word.is_wide() {
                        locals.push(TypeWord::top());
                    }
                }
            }
            FULL => {
                delta = u32::from(reader.read_u16(at)?);
                at += 2;

                let local_count = reader.read_u16(at)?;
                at += 2;
                locals.clear();
                for _ in 0..local_count {
                    let (next_at, word) = parse_element(ctx, env, &reader, at)?;
                    at = next_at;
                    let needed = if word.is_wide() { 2 } else { 1 };
                    if locals.len() + needed > max_locals {
                        return Err(
                            ErrorDetail::new(ErrorKind::StackMapFrameLocalsOverflow).into()
                        );
                    }
                    locals.push(word);
                    if word.is_wide() {
                        locals.push(TypeWord::top());
                    }
                }

                let stack_count = reader.read_u16(at)?;
                at += 2;
                for _ in 0..stack_count {
                    let (next_at, word) = parse_element(ctx, env, &reader, at)?;
                    at = next_at;
                    let needed = if word.is_wide() { 2 } else { 1 };
                    if stack.len() + needed > max_stack {
                        return Err(
                            ErrorDetail::new(ErrorKind::StackMapFrameStackOverflow).into()
                        );
                    }
                    stack.push(word);
                    if word.is_wide() {
                        stack.push(TypeWord::top());
                    }
                }
            }
            _ => return Err(ErrorDetail::new(ErrorKind::BadBytecode).into()),
        }

        let frame_pc = match pc {
            None => delta,
            Some(previous) => previous
                .checked_add(delta)
                .and_then(|sum| sum.checked_add(1))
                .ok_or_else(|| ErrorDetail::new(ErrorKind::WrongStackmapFrame))?,
        };
        if frame_pc >= code_length {
            return Err(ErrorDetail::new(ErrorKind::WrongStackmapFrame)
                .at(frame_pc)
                .into());
        }
        pc = Some(frame_pc);

        let mut frame = Frame::new(max_locals, max_stack);
        frame.pc = frame_pc;
        frame.locals[..locals.len()].copy_from_slice(&locals);
        for word in &stack {
            frame.push(*word)?;
        }
        frame.uninitialized_this = frame
            .locals
            .iter()
            .chain(frame.stack.iter())
            .any(|word| matches!(word.kind(), crate::types::TypeKind::UninitThis { .. }));

        let index = stack_maps.push(frame_pc, frame);
        map.mark(frame_pc, BRANCH_TARGET);
        map.set_frame_index(frame_pc, index);
    }

    Ok(())
}

/// Remove `count` locals from the end, where a wide pair counts as one local.
fn chop_locals(locals: &mut Vec<TypeWord>, count: usize) -> Result<()> {
    for _ in 0..count {
        // Check before shrinking: a chop past empty locals never mutates state.
        let wide_pair = locals.len() >= 2
            && locals[locals.len() - 2].is_wide()
            && locals[locals.len() - 1].is_top();
        let needed = if wide_pair { 2 } else { 1 };
        if locals.len() < needed {
            return Err(ErrorDetail::new(ErrorKind::StackMapFrameLocalsUnderflow).into());
        }
        locals.truncate(locals.len() - needed);
    }
    Ok(())
}

fn argument_slots(ctx: &MethodContext<'_>) -> usize {
    ctx.argument_types
        .iter()
        .map(|word| if word.is_wide() { 2 } else { 1 })
        .sum()
}

fn push_stack_element(
    ctx: &MethodContext<'_>,
    env: &mut TypeEnv<'_>,
    reader: &Bytecode<'_>,
    at: u32,
    stack: &mut Vec<TypeWord>,
    max_stack: usize,
) -> Result<u32> {
    let (next_at, word) = parse_element(ctx, env, reader, at)?;
    let needed = if word.is_wide() { 2 } else { 1 };
    if stack.len() + needed > max_stack {
        return Err(ErrorDetail::new(ErrorKind::StackMapFrameStackOverflow).into());
    }
    stack.push(word);
    if word.is_wide() {
        stack.push(TypeWord::top());
    }
    Ok(next_at)
}

/// Decode one `verification_type_info` entry into a type word.
fn parse_element(
    ctx: &MethodContext<'_>,
    env: &mut TypeEnv<'_>,
    reader: &Bytecode<'_>,
    at: u32,
) -> Result<(u32, TypeWord)> {
    let tag = reader.read_u8(at)?;
    let at = at + 1;
    match tag {
        0 => Ok((at, TypeWord::top())),
        1 => Ok((at, TypeWord::int())),
        2 => Ok((at, TypeWord::float())),
        3 => Ok((at, TypeWord::double())),
        4 => Ok((at, TypeWord::long())),
        5 => Ok((at, TypeWord::null())),
        6 => Ok((at, TypeWord::uninit_this(ctx.this_class))),
        7 => {
            let index = reader.read_u16(at)?;
            let class_name = ctx.class.constant_pool.try_get_class(index)?;
            let word = TypeWord::from_class_name(env.names, class_name)?;
            Ok((at + 2, word))
        }
        8 => {
            let offset = reader.read_u16(at)?;
            Ok((at + 2, TypeWord::uninit_new(u32::from(offset))))
        }
        _ => Err(ErrorDetail::new(ErrorKind::BadBytecode).into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VerifierConfig;
    use crate::names::{ClassIndex, ClassNames};
    use crate::resolver::LinkRecords;
    use crate::test_support::{MockResolver, demo_class, static_method};
    use cortado_romclass::{ConstantPool, RomClass};

    struct Fixture {
        class: RomClass,
        names: ClassNames,
        resolver: MockResolver,
        config: VerifierConfig,
        link_records: LinkRecords,
    }

    impl Fixture {
        fn new(descriptor: &str, max_stack: u16, max_locals: u16, pool: ConstantPool) -> Self {
            // A long straight-line body; only its length matters to the decoder.
            let code = vec![0x00; 400];
            Self {
                class: demo_class(
                    52,
                    pool,
                    vec![static_method("run", descriptor, max_stack, max_locals, &code)],
                ),
                names: ClassNames::new(),
                resolver: MockResolver::new(),
                config: VerifierConfig::default(),
                link_records: LinkRecords::new(),
            }
        }

        fn decode(&mut self, raw: &[u8]) -> Result<(StackMaps, BytecodeMap)> {
            let ctx = MethodContext::new(&self.class, &self.class.methods[0], &mut self.names)?;
            let entry_frame = ctx.entry_frame()?;
            let mut env = TypeEnv::new(
                &mut self.names,
                &self.resolver,
                &self.config,
                &mut self.link_records,
            );
            let mut map = BytecodeMap::new(400);
            let mut stack_maps = StackMaps::default();
            decode_stack_map_table(
                &ctx,
                &mut env,
                raw,
                &entry_frame,
                400,
                &mut map,
                &mut stack_maps,
            )?;
            Ok((stack_maps, map))
        }
    }

    fn attribute(frames: &[&[u8]]) -> Vec<u8> {
        let mut raw = Vec::new();
        raw.extend_from_slice(&u16::try_from(frames.len()).expect("count").to_be_bytes());
        for frame in frames {
            raw.extend_from_slice(frame);
        }
        raw
    }

    #[test]
    fn test_same_frame() -> Result<()> {
        let mut fixture = Fixture::new("(I)V", 2, 2, ConstantPool::new());
        // SAME at delta 10, then SAME at +5+1
        let raw = attribute(&[&[10], &[5]]);
        let (maps, map) = fixture.decode(&raw)?;
        assert_eq!(maps.len(), 2);
        assert_eq!(maps.get(0).map(|slot| slot.pc), Some(10));
        assert_eq!(maps.get(1).map(|slot| slot.pc), Some(16));
        assert_eq!(map.frame_index(10), Some(0));
        assert_eq!(map.frame_index(16), Some(1));
        let frame = maps.get(0).and_then(|slot| slot.frame.as_ref()).expect("frame");
        assert_eq!(frame.locals[0], TypeWord::int());
        assert!(frame.is_stack_empty());
        Ok(())
    }

    #[test]
    fn test_same_locals_one_stack() -> Result<()> {
        let mut fixture = Fixture::new("()V", 2, 1, ConstantPool::new());
        // tag 64+3: delta 3, one Integer stack element
        let raw = attribute(&[&[67, 1]]);
        let (maps, _) = fixture.decode(&raw)?;
        let frame = maps.get(0).and_then(|slot| slot.frame.as_ref()).expect("frame");
        assert_eq!(frame.pc, 3);
        assert_eq!(frame.stack_depth(), 1);
        Ok(())
    }

    #[test]
    fn test_extended_and_append_round_trip() -> Result<()> {
        let mut pool = ConstantPool::new();
        let class_index = pool.add_class("java/lang/String").expect("class");
        let mut fixture = Fixture::new("()V", 2, 4, pool);

        // SAME_EXTENDED pc=300, then APPEND 2 [Integer, Object(#class)] at pc 305
        let extended = [SAME_EXTENDED, 0x01, 0x2c];
        let append = [
            253,
            0,
            4,
            1, // Integer
            7,
            0,
            u8::try_from(class_index).expect("index"), // Object
        ];
        let raw = attribute(&[&extended, &append]);
        let (maps, _) = fixture.decode(&raw)?;
        assert_eq!(maps.len(), 2);
        assert_eq!(maps.get(0).map(|slot| slot.pc), Some(300));
        assert_eq!(maps.get(1).map(|slot| slot.pc), Some(305));

        let first = maps.get(0).and_then(|slot| slot.frame.as_ref()).expect("first");
        let second = maps.get(1).and_then(|slot| slot.frame.as_ref()).expect("second");
        assert_eq!(second.locals[0], TypeWord::int());
        assert_eq!(second.locals[1], TypeWord::object(ClassIndex::STRING, 0));
        // The second frame differs from the first only by the two appended locals.
        assert_eq!(&first.locals[2..], &second.locals[2..]);
        assert!(first.is_stack_empty() && second.is_stack_empty());
        Ok(())
    }

    #[test]
    fn test_chop_removes_wide_pair_as_one() -> Result<()> {
        let mut fixture = Fixture::new("(IJ)V", 2, 4, ConstantPool::new());
        // CHOP 1 removes the long pair, leaving the int
        let raw = attribute(&[&[250, 0, 8]]);
        let (maps, _) = fixture.decode(&raw)?;
        let frame = maps.get(0).and_then(|slot| slot.frame.as_ref()).expect("frame");
        assert_eq!(frame.locals[0], TypeWord::int());
        assert_eq!(frame.locals[1], TypeWord::top());
        assert_eq!(frame.locals[2], TypeWord::top());
        Ok(())
    }

    #[test]
    fn test_chop_underflow() {
        let mut fixture = Fixture::new("()V", 2, 2, ConstantPool::new());
        // Nothing to chop in a static no-arg method
        let raw = attribute(&[&[248, 0, 8]]);
        let error = fixture.decode(&raw).expect_err("underflow");
        assert_eq!(error.kind(), Some(ErrorKind::StackMapFrameLocalsUnderflow));
    }

    #[test]
    fn test_append_overflow() {
        let mut fixture = Fixture::new("()V", 2, 1, ConstantPool::new());
        // APPEND 2 ints into a single-slot locals area
        let raw = attribute(&[&[253, 0, 4, 1, 1]]);
        let error = fixture.decode(&raw).expect_err("overflow");
        assert_eq!(error.kind(), Some(ErrorKind::StackMapFrameLocalsOverflow));
    }

    #[test]
    fn test_stack_overflow() {
        let mut fixture = Fixture::new("()V", 0, 1, ConstantPool::new());
        let raw = attribute(&[&[64, 1]]);
        let error = fixture.decode(&raw).expect_err("overflow");
        assert_eq!(error.kind(), Some(ErrorKind::StackMapFrameStackOverflow));
    }

    #[test]
    fn test_full_frame() -> Result<()> {
        let mut fixture = Fixture::new("()V", 3, 3, ConstantPool::new());
        // FULL at pc 20: locals [long], stack [null]
        let raw = attribute(&[&[FULL, 0, 20, 0, 1, 4, 0, 1, 5]]);
        let (maps, _) = fixture.decode(&raw)?;
        let frame = maps.get(0).and_then(|slot| slot.frame.as_ref()).expect("frame");
        assert_eq!(frame.locals[0], TypeWord::long());
        assert_eq!(frame.locals[1], TypeWord::top());
        assert_eq!(frame.stack_depth(), 1);
        Ok(())
    }

    #[test]
    fn test_uninitialized_this_flag() -> Result<()> {
        let mut fixture = Fixture::new("()V", 2, 2, ConstantPool::new());
        // FULL at pc 4: locals [uninitializedThis], empty stack
        let raw = attribute(&[&[FULL, 0, 4, 0, 1, 6, 0, 0]]);
        let (maps, _) = fixture.decode(&raw)?;
        let frame = maps.get(0).and_then(|slot| slot.frame.as_ref()).expect("frame");
        assert!(frame.uninitialized_this);
        Ok(())
    }

    #[test]
    fn test_pc_past_end() {
        let mut fixture = Fixture::new("()V", 2, 1, ConstantPool::new());
        let raw = attribute(&[&[FULL, 0x7f, 0xff, 0, 0, 0, 0]]);
        let error = fixture.decode(&raw).expect_err("pc");
        assert_eq!(error.kind(), Some(ErrorKind::WrongStackmapFrame));
    }

    #[test]
    fn test_truncated_attribute() {
        let mut fixture = Fixture::new("()V", 2, 1, ConstantPool::new());
        let raw = attribute(&[&[SAME_LOCALS_1_STACK_EXTENDED, 0]]);
        let error = fixture.decode(&raw).expect_err("truncated");
        assert_eq!(error.kind(), Some(ErrorKind::UnexpectedEOF));
    }

    #[test]
    fn test_invalid_frame_tag() {
        let mut fixture = Fixture::new("()V", 2, 1, ConstantPool::new());
        let raw = attribute(&[&[200]]);
        let error = fixture.decode(&raw).expect_err("tag");
        assert_eq!(error.kind(), Some(ErrorKind::BadBytecode));
    }
}
