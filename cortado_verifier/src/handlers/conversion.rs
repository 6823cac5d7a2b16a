//! # Conversion Handlers
//!
//! `i2l` through `i2s`: pop the source kind, push the destination kind.

use crate::error::{ErrorDetail, ErrorKind, Result};
use crate::frame::Frame;
use crate::opcodes as op;
use crate::types::TypeWord;

/// Dispatch `i2l` .. `i2s`.
///
/// # Errors
/// Fails with `IncompatibleType` when the operand does not match the source kind.
pub fn handle_conversion(frame: &mut Frame, opcode: u8) -> Result<()> {
    match opcode {
        op::I2L => {
            frame.pop_expect(TypeWord::int())?;
            frame.push_pair(TypeWord::long())
        }
        op::I2F => {
            frame.pop_expect(TypeWord::int())?;
            frame.push(TypeWord::float())
        }
        op::I2D => {
            frame.pop_expect(TypeWord::int())?;
            frame.push_pair(TypeWord::double())
        }
        op::L2I => {
            frame.pop_pair_expect(TypeWord::long())?;
            frame.push(TypeWord::int())
        }
        op::L2F => {
            frame.pop_pair_expect(TypeWord::long())?;
            frame.push(TypeWord::float())
        }
        op::L2D => {
            frame.pop_pair_expect(TypeWord::long())?;
            frame.push_pair(TypeWord::double())
        }
        op::F2I => {
            frame.pop_expect(TypeWord::float())?;
            frame.push(TypeWord::int())
        }
        op::F2L => {
            frame.pop_expect(TypeWord::float())?;
            frame.push_pair(TypeWord::long())
        }
        op::F2D => {
            frame.pop_expect(TypeWord::float())?;
            frame.push_pair(TypeWord::double())
        }
        op::D2I => {
            frame.pop_pair_expect(TypeWord::double())?;
            frame.push(TypeWord::int())
        }
        op::D2L => {
            frame.pop_pair_expect(TypeWord::double())?;
            frame.push_pair(TypeWord::long())
        }
        op::D2F => {
            frame.pop_pair_expect(TypeWord::double())?;
            frame.push(TypeWord::float())
        }
        op::I2B | op::I2C | op::I2S => {
            frame.pop_expect(TypeWord::int())?;
            frame.push(TypeWord::int())
        }
        _ => Err(ErrorDetail::new(ErrorKind::BadBytecode).into()),
    }
}
