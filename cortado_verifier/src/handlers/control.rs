//! # Control Transfer Handlers
//!
//! Operand effects of branches, switches, returns, and `athrow`. Where control goes is the
//! passes' concern; these functions only check and consume operands.

use crate::error::{ErrorDetail, ErrorKind, Result};
use crate::frame::Frame;
use crate::handlers::MethodContext;
use crate::lattice::{TypeEnv, is_assignable};
use crate::opcodes as op;
use crate::types::TypeWord;

/// `ifeq` .. `ifle`: pop an `int` condition.
///
/// # Errors
/// Fails with `IncompatibleType` for a non-`int` condition.
pub fn handle_if_int(frame: &mut Frame) -> Result<()> {
    frame.pop_expect(TypeWord::int())?;
    Ok(())
}

/// `if_icmp*`: pop two `int` operands.
///
/// # Errors
/// Fails with `IncompatibleType` for non-`int` operands.
pub fn handle_if_icmp(frame: &mut Frame) -> Result<()> {
    frame.pop_expect(TypeWord::int())?;
    frame.pop_expect(TypeWord::int())?;
    Ok(())
}

/// `if_acmpeq`/`if_acmpne`: pop two references.
///
/// # Errors
/// Fails with `IncompatibleType` for non-reference operands.
pub fn handle_if_acmp(frame: &mut Frame) -> Result<()> {
    frame.pop_reference()?;
    frame.pop_reference()?;
    Ok(())
}

/// `ifnull`/`ifnonnull`: pop one reference.
///
/// # Errors
/// Fails with `IncompatibleType` for a non-reference operand.
pub fn handle_if_reference(frame: &mut Frame) -> Result<()> {
    frame.pop_reference()?;
    Ok(())
}

/// `tableswitch`/`lookupswitch`: pop the `int` selector.
///
/// # Errors
/// Fails with `IncompatibleType` for a non-`int` selector.
pub fn handle_switch(frame: &mut Frame) -> Result<()> {
    frame.pop_expect(TypeWord::int())?;
    Ok(())
}

/// The `*return` family.
///
/// The opcode must agree with the declared return type, the operand must be present and
/// compatible, and a constructor must have initialized its receiver by the time it returns.
///
/// # Errors
/// Fails with `WrongReturnType` for a declaration mismatch, `InitNotCallInit` for a
/// constructor returning with `this` still uninitialized.
pub fn handle_return(
    ctx: &MethodContext<'_>,
    env: &mut TypeEnv<'_>,
    frame: &mut Frame,
    opcode: u8,
) -> Result<()> {
    match opcode {
        op::RETURN => {
            if ctx.return_type.is_some() {
                return Err(ErrorDetail::new(ErrorKind::WrongReturnType).into());
            }
            if ctx.method.is_constructor() && frame.uninitialized_this {
                return Err(ErrorDetail::new(ErrorKind::InitNotCallInit).into());
            }
            Ok(())
        }
        op::IRETURN => expect_base_return(ctx, frame, TypeWord::int()),
        op::FRETURN => expect_base_return(ctx, frame, TypeWord::float()),
        op::LRETURN => expect_wide_return(ctx, frame, TypeWord::long()),
        op::DRETURN => expect_wide_return(ctx, frame, TypeWord::double()),
        op::ARETURN => {
            let Some(declared) = ctx.return_type.filter(|word| word.is_reference()) else {
                return Err(ErrorDetail::new(ErrorKind::WrongReturnType).into());
            };
            let value = frame.pop_reference()?;
            if !is_assignable(env, value, declared)?.is_compatible() {
                return Err(ErrorDetail::new(ErrorKind::WrongReturnType)
                    .expected(declared)
                    .found(value)
                    .into());
            }
            Ok(())
        }
        _ => Err(ErrorDetail::new(ErrorKind::BadBytecode).into()),
    }
}

fn expect_base_return(ctx: &MethodContext<'_>, frame: &mut Frame, expected: TypeWord) -> Result<()> {
    if ctx.return_type != Some(expected) {
        return Err(ErrorDetail::new(ErrorKind::WrongReturnType)
            .expected(expected)
            .into());
    }
    frame.pop_expect(expected)?;
    Ok(())
}

fn expect_wide_return(ctx: &MethodContext<'_>, frame: &mut Frame, expected: TypeWord) -> Result<()> {
    if ctx.return_type != Some(expected) {
        return Err(ErrorDetail::new(ErrorKind::WrongReturnType)
            .expected(expected)
            .into());
    }
    frame.pop_pair_expect(expected)?;
    Ok(())
}

/// `athrow`: pop a reference assignable to `java/lang/Throwable`.
///
/// # Errors
/// Fails with `IncompatibleType` when the operand is not throwable.
pub fn handle_athrow(env: &mut TypeEnv<'_>, frame: &mut Frame) -> Result<()> {
    let value = frame.pop_reference()?;
    let throwable = TypeWord::java_lang_throwable();
    if !is_assignable(env, value, throwable)?.is_compatible() {
        return Err(ErrorDetail::new(ErrorKind::IncompatibleType)
            .expected(throwable)
            .found(value)
            .into());
    }
    Ok(())
}
