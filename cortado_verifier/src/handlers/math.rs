//! # Arithmetic Handlers
//!
//! Binary and unary arithmetic, shifts, and bitwise operations. Long shifts take an `int`
//! shift distance over a `long` pair.

use crate::error::{ErrorDetail, ErrorKind, Result};
use crate::frame::Frame;
use crate::opcodes as op;
use crate::types::TypeWord;

/// Dispatch `iadd` .. `lxor`.
///
/// # Errors
/// Fails with `IncompatibleType` when operand types do not match the opcode.
pub fn handle_arithmetic(frame: &mut Frame, opcode: u8) -> Result<()> {
    match opcode {
        // int binary
        op::IADD | op::ISUB | op::IMUL | op::IDIV | op::IREM | op::ISHL | op::ISHR
        | op::IUSHR | op::IAND | op::IOR | op::IXOR => {
            frame.pop_expect(TypeWord::int())?;
            frame.pop_expect(TypeWord::int())?;
            frame.push(TypeWord::int())
        }
        // long binary
        op::LADD | op::LSUB | op::LMUL | op::LDIV | op::LREM | op::LAND | op::LOR | op::LXOR => {
            frame.pop_pair_expect(TypeWord::long())?;
            frame.pop_pair_expect(TypeWord::long())?;
            frame.push_pair(TypeWord::long())
        }
        // long shifts take an int distance
        op::LSHL | op::LSHR | op::LUSHR => {
            frame.pop_expect(TypeWord::int())?;
            frame.pop_pair_expect(TypeWord::long())?;
            frame.push_pair(TypeWord::long())
        }
        // float binary
        op::FADD | op::FSUB | op::FMUL | op::FDIV | op::FREM => {
            frame.pop_expect(TypeWord::float())?;
            frame.pop_expect(TypeWord::float())?;
            frame.push(TypeWord::float())
        }
        // double binary
        op::DADD | op::DSUB | op::DMUL | op::DDIV | op::DREM => {
            frame.pop_pair_expect(TypeWord::double())?;
            frame.pop_pair_expect(TypeWord::double())?;
            frame.push_pair(TypeWord::double())
        }
        // negations
        op::INEG => {
            frame.pop_expect(TypeWord::int())?;
            frame.push(TypeWord::int())
        }
        op::LNEG => {
            frame.pop_pair_expect(TypeWord::long())?;
            frame.push_pair(TypeWord::long())
        }
        op::FNEG => {
            frame.pop_expect(TypeWord::float())?;
            frame.push(TypeWord::float())
        }
        op::DNEG => {
            frame.pop_pair_expect(TypeWord::double())?;
            frame.push_pair(TypeWord::double())
        }
        _ => Err(ErrorDetail::new(ErrorKind::BadBytecode).into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iadd() {
        let mut frame = Frame::new(0, 2);
        frame.push(TypeWord::int()).expect("a");
        frame.push(TypeWord::int()).expect("b");
        handle_arithmetic(&mut frame, op::IADD).expect("iadd");
        assert_eq!(frame.pop().expect("sum"), TypeWord::int());
        assert!(frame.is_stack_empty());
    }

    #[test]
    fn test_iadd_rejects_float() {
        let mut frame = Frame::new(0, 2);
        frame.push(TypeWord::int()).expect("a");
        frame.push(TypeWord::float()).expect("b");
        let error = handle_arithmetic(&mut frame, op::IADD).expect_err("mixed");
        assert_eq!(error.kind(), Some(ErrorKind::IncompatibleType));
    }

    #[test]
    fn test_ladd_pairs() {
        let mut frame = Frame::new(0, 4);
        frame.push_pair(TypeWord::long()).expect("a");
        frame.push_pair(TypeWord::long()).expect("b");
        handle_arithmetic(&mut frame, op::LADD).expect("ladd");
        assert_eq!(frame.stack_depth(), 2);
        frame.pop_pair_expect(TypeWord::long()).expect("sum");
    }

    #[test]
    fn test_lshl_takes_int_distance() {
        let mut frame = Frame::new(0, 3);
        frame.push_pair(TypeWord::long()).expect("value");
        frame.push(TypeWord::int()).expect("distance");
        handle_arithmetic(&mut frame, op::LSHL).expect("lshl");
        frame.pop_pair_expect(TypeWord::long()).expect("result");
    }

    #[test]
    fn test_dneg() {
        let mut frame = Frame::new(0, 2);
        frame.push_pair(TypeWord::double()).expect("value");
        handle_arithmetic(&mut frame, op::DNEG).expect("dneg");
        frame.pop_pair_expect(TypeWord::double()).expect("result");
    }
}
