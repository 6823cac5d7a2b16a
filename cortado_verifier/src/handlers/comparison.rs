//! # Comparison Handlers
//!
//! `lcmp` and the floating comparisons: pop two operands of the source kind, push an `int`.

use crate::error::{ErrorDetail, ErrorKind, Result};
use crate::frame::Frame;
use crate::opcodes as op;
use crate::types::TypeWord;

/// Dispatch `lcmp` .. `dcmpg`.
///
/// # Errors
/// Fails with `IncompatibleType` when the operands do not match the opcode.
pub fn handle_comparison(frame: &mut Frame, opcode: u8) -> Result<()> {
    match opcode {
        op::LCMP => {
            frame.pop_pair_expect(TypeWord::long())?;
            frame.pop_pair_expect(TypeWord::long())?;
            frame.push(TypeWord::int())
        }
        op::FCMPL | op::FCMPG => {
            frame.pop_expect(TypeWord::float())?;
            frame.pop_expect(TypeWord::float())?;
            frame.push(TypeWord::int())
        }
        op::DCMPL | op::DCMPG => {
            frame.pop_pair_expect(TypeWord::double())?;
            frame.pop_pair_expect(TypeWord::double())?;
            frame.push(TypeWord::int())
        }
        _ => Err(ErrorDetail::new(ErrorKind::BadBytecode).into()),
    }
}
