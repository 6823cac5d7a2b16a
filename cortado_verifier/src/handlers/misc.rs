//! # Constant Loading
//!
//! `ldc`, `ldc_w`, and `ldc2_w`. The pushed type follows the constant kind; loadable class,
//! method-type, and method-handle constants push the corresponding well-known reference.

use cortado_romclass::{Constant, FieldType};

use crate::error::{ErrorDetail, ErrorKind, Result};
use crate::frame::Frame;
use crate::handlers::MethodContext;
use crate::lattice::TypeEnv;
use crate::names::ClassIndex;
use crate::types::TypeWord;

/// `ldc`/`ldc_w`: push a category-1 loadable constant.
///
/// # Errors
/// Fails with `BadBytecode` for constants that are not category-1 loadable.
pub fn handle_ldc(
    ctx: &MethodContext<'_>,
    env: &mut TypeEnv<'_>,
    frame: &mut Frame,
    index: u16,
) -> Result<()> {
    match ctx.class.constant_pool.try_get(index)? {
        Constant::Integer(_) => frame.push(TypeWord::int()),
        Constant::Float(_) => frame.push(TypeWord::float()),
        Constant::String(_) => frame.push(TypeWord::object(ClassIndex::STRING, 0)),
        Constant::Class(_) => frame.push(TypeWord::object(ClassIndex::CLASS, 0)),
        Constant::MethodType(_) => frame.push(TypeWord::object(ClassIndex::METHOD_TYPE, 0)),
        Constant::MethodHandle { .. } => {
            frame.push(TypeWord::object(ClassIndex::METHOD_HANDLE, 0))
        }
        Constant::Dynamic {
            name_and_type_index,
            ..
        } => {
            let (_, descriptor) = ctx
                .class
                .constant_pool
                .try_get_name_and_type(*name_and_type_index)?;
            let field_type = FieldType::parse(descriptor)?;
            let word = TypeWord::from_field_type(env.names, &field_type)?;
            if word.is_wide() {
                return Err(ErrorDetail::new(ErrorKind::BadBytecode).into());
            }
            frame.push(word)
        }
        _ => Err(ErrorDetail::new(ErrorKind::BadBytecode).into()),
    }
}

/// `ldc2_w`: push a `long` or `double` pair.
///
/// # Errors
/// Fails with `BadBytecode` for constants that are not category-2 loadable.
pub fn handle_ldc2(
    ctx: &MethodContext<'_>,
    env: &mut TypeEnv<'_>,
    frame: &mut Frame,
    index: u16,
) -> Result<()> {
    match ctx.class.constant_pool.try_get(index)? {
        Constant::Long(_) => frame.push_pair(TypeWord::long()),
        Constant::Double(_) => frame.push_pair(TypeWord::double()),
        Constant::Dynamic {
            name_and_type_index,
            ..
        } => {
            let (_, descriptor) = ctx
                .class
                .constant_pool
                .try_get_name_and_type(*name_and_type_index)?;
            let field_type = FieldType::parse(descriptor)?;
            let word = TypeWord::from_field_type(env.names, &field_type)?;
            if !word.is_wide() {
                return Err(ErrorDetail::new(ErrorKind::BadBytecode).into());
            }
            frame.push_pair(word)
        }
        _ => Err(ErrorDetail::new(ErrorKind::BadBytecode).into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VerifierConfig;
    use crate::names::ClassNames;
    use crate::resolver::LinkRecords;
    use crate::test_support::{MockResolver, demo_class, static_method};
    use cortado_romclass::ConstantPool;

    fn load(constant: Constant, wide: bool) -> Result<Frame> {
        let mut pool = ConstantPool::new();
        let index = pool.add(constant)?;
        let class = demo_class(
            52,
            pool,
            vec![static_method("run", "()V", 2, 0, &[0xb1])],
        );
        let mut names = ClassNames::new();
        let resolver = MockResolver::new();
        let config = VerifierConfig::default();
        let mut link_records = LinkRecords::new();
        let ctx = MethodContext::new(&class, &class.methods[0], &mut names)?;
        let mut env = TypeEnv::new(&mut names, &resolver, &config, &mut link_records);
        let mut frame = Frame::new(0, 2);
        if wide {
            handle_ldc2(&ctx, &mut env, &mut frame, index)?;
        } else {
            handle_ldc(&ctx, &mut env, &mut frame, index)?;
        }
        Ok(frame)
    }

    #[test]
    fn test_ldc_int_and_string() -> Result<()> {
        let mut frame = load(Constant::Integer(7), false)?;
        assert_eq!(frame.pop()?, TypeWord::int());

        let mut pool_frame = load(Constant::String(1), false)?;
        assert_eq!(
            pool_frame.pop()?,
            TypeWord::object(ClassIndex::STRING, 0)
        );
        Ok(())
    }

    #[test]
    fn test_ldc_rejects_long() {
        let error = load(Constant::Long(1), false).expect_err("wide in ldc");
        assert_eq!(error.kind(), Some(ErrorKind::BadBytecode));
    }

    #[test]
    fn test_ldc2_long() -> Result<()> {
        let mut frame = load(Constant::Long(1), true)?;
        frame.pop_pair_expect(TypeWord::long())?;
        Ok(())
    }

    #[test]
    fn test_ldc2_rejects_int() {
        let error = load(Constant::Integer(1), true).expect_err("narrow in ldc2");
        assert_eq!(error.kind(), Some(ErrorKind::BadBytecode));
    }
}
