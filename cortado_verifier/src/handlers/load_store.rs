//! # Load and Store Handlers
//!
//! Local variable loads and stores (including the wide-index forms), `iinc`, and the array
//! load/store family. `baload`/`bastore` accept both `byte[]` and `boolean[]` array
//! references; the two kinds share bytecodes.

use crate::error::{ErrorDetail, ErrorKind, Result};
use crate::frame::Frame;
use crate::opcodes as op;
use crate::types::{BaseKind, TypeKind, TypeWord};

/// Load an `int` local onto the stack.
///
/// # Errors
/// Fails with `IncompatibleType` when the local does not hold an `int`.
pub fn handle_iload(frame: &mut Frame, index: u16) -> Result<()> {
    expect_local(frame, index, TypeWord::int())?;
    frame.push(TypeWord::int())
}

/// Load a `long` pair from consecutive locals.
///
/// # Errors
/// Fails with `IncompatibleType` when the pair is broken.
pub fn handle_lload(frame: &mut Frame, index: u16) -> Result<()> {
    frame.get_local_pair(index, TypeWord::long())?;
    frame.push_pair(TypeWord::long())
}

/// Load a `float` local onto the stack.
///
/// # Errors
/// Fails with `IncompatibleType` when the local does not hold a `float`.
pub fn handle_fload(frame: &mut Frame, index: u16) -> Result<()> {
    expect_local(frame, index, TypeWord::float())?;
    frame.push(TypeWord::float())
}

/// Load a `double` pair from consecutive locals.
///
/// # Errors
/// Fails with `IncompatibleType` when the pair is broken.
pub fn handle_dload(frame: &mut Frame, index: u16) -> Result<()> {
    frame.get_local_pair(index, TypeWord::double())?;
    frame.push_pair(TypeWord::double())
}

/// Load a reference local onto the stack. Uninitialized references load fine; `top` and base
/// scalars do not.
///
/// # Errors
/// Fails with `IncompatibleType` for a non-reference local.
pub fn handle_aload(frame: &mut Frame, index: u16) -> Result<()> {
    let word = frame.get_local(index)?;
    if !word.is_reference_or_uninit() || word.is_top() {
        return Err(ErrorDetail::new(ErrorKind::IncompatibleType)
            .slot(index as usize)
            .found(word)
            .into());
    }
    frame.push(word)
}

/// Store an `int` into a local.
///
/// # Errors
/// Fails with `IncompatibleType` when the stack top is not an `int`.
pub fn handle_istore(frame: &mut Frame, index: u16) -> Result<()> {
    frame.pop_expect(TypeWord::int())?;
    frame.set_local(index, TypeWord::int())
}

/// Store a `long` pair into consecutive locals.
///
/// # Errors
/// Fails with `IncompatibleType` when the stack does not hold a `long` pair.
pub fn handle_lstore(frame: &mut Frame, index: u16) -> Result<()> {
    frame.pop_pair_expect(TypeWord::long())?;
    frame.set_local_pair(index, TypeWord::long())
}

/// Store a `float` into a local.
///
/// # Errors
/// Fails with `IncompatibleType` when the stack top is not a `float`.
pub fn handle_fstore(frame: &mut Frame, index: u16) -> Result<()> {
    frame.pop_expect(TypeWord::float())?;
    frame.set_local(index, TypeWord::float())
}

/// Store a `double` pair into consecutive locals.
///
/// # Errors
/// Fails with `IncompatibleType` when the stack does not hold a `double` pair.
pub fn handle_dstore(frame: &mut Frame, index: u16) -> Result<()> {
    frame.pop_pair_expect(TypeWord::double())?;
    frame.set_local_pair(index, TypeWord::double())
}

/// Store a reference or uninitialized value into a local.
///
/// # Errors
/// Fails with `IncompatibleType` for base values.
pub fn handle_astore(frame: &mut Frame, index: u16) -> Result<()> {
    let word = frame.pop_reference_or_uninit()?;
    frame.set_local(index, word)
}

/// `iinc`: the local must already hold an `int`; no stack effect.
///
/// # Errors
/// Fails with `IncompatibleType` when the local does not hold an `int`.
pub fn handle_iinc(frame: &mut Frame, index: u16) -> Result<()> {
    expect_local(frame, index, TypeWord::int())
}

/// The array-load family (`iaload` .. `saload`).
///
/// Pops an `int` index and an array reference of the matching element kind, then pushes the
/// element. `aaload` pushes the component one dimension down; loading from `null` pushes
/// `null`.
///
/// # Errors
/// Fails with `InvalidArrayReference` for non-array operands and `IncompatibleType` for
/// element kind mismatches.
pub fn handle_array_load(frame: &mut Frame, opcode: u8) -> Result<()> {
    frame.pop_expect(TypeWord::int())?;
    let array = frame.pop_reference()?;

    match opcode {
        op::AALOAD => match array.kind() {
            TypeKind::Null => frame.push(TypeWord::null()),
            TypeKind::Object { arity, .. } if arity > 0 => {
                frame.push(array.with_arity(arity - 1))
            }
            TypeKind::BaseArray { arity, .. } if arity > 1 => {
                frame.push(array.with_arity(arity - 1))
            }
            _ => Err(ErrorDetail::new(ErrorKind::InvalidArrayReference)
                .found(array)
                .into()),
        },
        op::LALOAD => {
            expect_base_array(array, BaseKind::Long, false)?;
            frame.push_pair(TypeWord::long())
        }
        op::DALOAD => {
            expect_base_array(array, BaseKind::Double, false)?;
            frame.push_pair(TypeWord::double())
        }
        op::FALOAD => {
            expect_base_array(array, BaseKind::Float, false)?;
            frame.push(TypeWord::float())
        }
        op::IALOAD => {
            expect_base_array(array, BaseKind::Int, false)?;
            frame.push(TypeWord::int())
        }
        op::BALOAD => {
            expect_base_array(array, BaseKind::Byte, true)?;
            frame.push(TypeWord::int())
        }
        op::CALOAD => {
            expect_base_array(array, BaseKind::Char, false)?;
            frame.push(TypeWord::int())
        }
        op::SALOAD => {
            expect_base_array(array, BaseKind::Short, false)?;
            frame.push(TypeWord::int())
        }
        _ => Err(ErrorDetail::new(ErrorKind::BadBytecode).into()),
    }
}

/// The array-store family (`iastore` .. `sastore`).
///
/// Pops the value, an `int` index, and an array reference of the matching element kind. For
/// `aastore` the static check is only that the value is a reference; element assignability is
/// a runtime store check.
///
/// # Errors
/// Fails with `InvalidArrayReference` for non-array operands and `IncompatibleType` for
/// value or element kind mismatches.
pub fn handle_array_store(frame: &mut Frame, opcode: u8) -> Result<()> {
    match opcode {
        op::AASTORE => {
            frame.pop_reference()?;
            frame.pop_expect(TypeWord::int())?;
            let array = frame.pop_reference()?;
            match array.kind() {
                TypeKind::Null => Ok(()),
                TypeKind::Object { arity, .. } if arity > 0 => Ok(()),
                TypeKind::BaseArray { arity, .. } if arity > 1 => Ok(()),
                _ => Err(ErrorDetail::new(ErrorKind::InvalidArrayReference)
                    .found(array)
                    .into()),
            }
        }
        op::LASTORE => {
            frame.pop_pair_expect(TypeWord::long())?;
            frame.pop_expect(TypeWord::int())?;
            expect_base_array(frame.pop_reference()?, BaseKind::Long, false)
        }
        op::DASTORE => {
            frame.pop_pair_expect(TypeWord::double())?;
            frame.pop_expect(TypeWord::int())?;
            expect_base_array(frame.pop_reference()?, BaseKind::Double, false)
        }
        op::FASTORE => {
            frame.pop_expect(TypeWord::float())?;
            frame.pop_expect(TypeWord::int())?;
            expect_base_array(frame.pop_reference()?, BaseKind::Float, false)
        }
        op::IASTORE => {
            frame.pop_expect(TypeWord::int())?;
            frame.pop_expect(TypeWord::int())?;
            expect_base_array(frame.pop_reference()?, BaseKind::Int, false)
        }
        op::BASTORE => {
            frame.pop_expect(TypeWord::int())?;
            frame.pop_expect(TypeWord::int())?;
            expect_base_array(frame.pop_reference()?, BaseKind::Byte, true)
        }
        op::CASTORE => {
            frame.pop_expect(TypeWord::int())?;
            frame.pop_expect(TypeWord::int())?;
            expect_base_array(frame.pop_reference()?, BaseKind::Char, false)
        }
        op::SASTORE => {
            frame.pop_expect(TypeWord::int())?;
            frame.pop_expect(TypeWord::int())?;
            expect_base_array(frame.pop_reference()?, BaseKind::Short, false)
        }
        _ => Err(ErrorDetail::new(ErrorKind::BadBytecode).into()),
    }
}

fn expect_local(frame: &mut Frame, index: u16, expected: TypeWord) -> Result<()> {
    let found = frame.get_local(index)?;
    if found != expected {
        return Err(ErrorDetail::new(ErrorKind::IncompatibleType)
            .slot(index as usize)
            .expected(expected)
            .found(found)
            .into());
    }
    Ok(())
}

/// Check a one-dimensional base array reference; `null` always passes. With `or_boolean`,
/// `boolean[]` passes the `byte[]` check.
fn expect_base_array(array: TypeWord, kind: BaseKind, or_boolean: bool) -> Result<()> {
    match array.kind() {
        TypeKind::Null => Ok(()),
        TypeKind::BaseArray { kind: found, arity: 1 }
            if found == kind || (or_boolean && found == BaseKind::Boolean) =>
        {
            Ok(())
        }
        _ => Err(ErrorDetail::new(ErrorKind::InvalidArrayReference)
            .expected(TypeWord::base_array(kind, 1))
            .found(array)
            .into()),
    }
}
