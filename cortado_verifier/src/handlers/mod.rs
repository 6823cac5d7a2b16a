//! # Instruction Handlers
//!
//! Per-instruction-group effect functions shared by both verification passes. The synthesis
//! pass and the linear checker apply identical per-opcode contracts; they differ only in what
//! happens at control transfers (merging versus matching), which is the passes' business, not
//! the handlers'.
//!
//! [`execute`] decodes the operands of the instruction at a pc straight from the bytecode,
//! applies its effect to the live frame, and reports how control leaves the instruction.

pub mod comparison;
pub mod control;
pub mod conversion;
pub mod load_store;
pub mod math;
pub mod misc;
pub mod references;
pub mod stack;

use cortado_romclass::{FieldType, RomClass, RomMethod};

use crate::error::{ErrorDetail, ErrorKind, Result, VerifyError};
use crate::frame::Frame;
use crate::lattice::TypeEnv;
use crate::names::{ClassIndex, ClassNames};
use crate::opcodes::{self, Bytecode, SwitchTargets};
use crate::types::TypeWord;

/// How control leaves an instruction.
#[derive(Clone, Debug, PartialEq)]
pub enum Control {
    /// Straight-line flow to the next instruction.
    Fall,
    /// Conditional branch: the target, plus fall-through.
    Conditional(u32),
    /// Unconditional branch.
    Goto(u32),
    /// `tableswitch` / `lookupswitch`: default and case targets; no fall-through.
    Switch(SwitchTargets),
    /// A `*return`.
    Return,
    /// `athrow`.
    Throw,
}

/// The outcome of simulating one instruction.
#[derive(Clone, Debug, PartialEq)]
pub struct Step {
    /// The pc of the next sequential instruction.
    pub next_pc: u32,
    /// How control leaves this instruction.
    pub control: Control,
}

/// Per-method constants shared by both passes: the enclosing class, the interned receiver and
/// return types, and the argument words derived from the signature.
#[derive(Debug)]
pub struct MethodContext<'a> {
    /// The class being verified.
    pub class: &'a RomClass,
    /// The method being verified.
    pub method: &'a RomMethod,
    /// Interned index of the enclosing class.
    pub this_class: ClassIndex,
    /// Interned index of the direct superclass, if any.
    pub super_class: Option<ClassIndex>,
    /// The return type word; `None` for void.
    pub return_type: Option<TypeWord>,
    /// Argument words in slot order, receiver first for instance methods. Wide arguments
    /// contribute a single entry here and two slots in the entry frame.
    pub argument_types: Vec<TypeWord>,
}

impl<'a> MethodContext<'a> {
    /// Build the per-method context, checking the declared argument count against the parsed
    /// signature.
    ///
    /// # Errors
    /// Fails with `ArgumentsMismatch` when `arg_count` disagrees with the descriptor, and
    /// propagates descriptor parse failures.
    pub fn new(
        class: &'a RomClass,
        method: &'a RomMethod,
        names: &mut ClassNames,
    ) -> Result<Self> {
        let this_class = names.intern(&class.name)?;
        let super_class = match &class.super_name {
            Some(name) => Some(names.intern(name)?),
            None => None,
        };

        let (parameters, return_field) = FieldType::parse_method_descriptor(&method.descriptor)?;
        let return_type = match &return_field {
            Some(field_type) => Some(TypeWord::from_field_type(names, field_type)?),
            None => None,
        };

        let mut argument_types = Vec::with_capacity(parameters.len() + 1);
        let mut slots = 0u16;
        if !method.is_static() {
            let receiver = if method.is_constructor() && class.super_name.is_some() {
                TypeWord::uninit_this(this_class)
            } else {
                TypeWord::object(this_class, 0)
            };
            argument_types.push(receiver);
            slots += 1;
        }
        for parameter in &parameters {
            let word = TypeWord::from_field_type(names, parameter)?;
            argument_types.push(word);
            slots = slots.saturating_add(if word.is_wide() { 2 } else { 1 });
        }

        if slots != method.arg_count {
            return Err(ErrorDetail::new(ErrorKind::ArgumentsMismatch)
                .callee(class.name.clone(), method.name.clone(), method.descriptor.clone())
                .into());
        }
        if u32::from(slots) > u32::from(method.max_locals) {
            return Err(ErrorDetail::new(ErrorKind::ArgumentsMismatch)
                .callee(class.name.clone(), method.name.clone(), method.descriptor.clone())
                .into());
        }

        Ok(Self {
            class,
            method,
            this_class,
            super_class,
            return_type,
            argument_types,
        })
    }

    /// The frame at method entry: arguments in locals, empty stack, `uninitialized_this` set
    /// for constructors of every class except `java/lang/Object`.
    ///
    /// # Errors
    /// Fails only if the argument slots exceed `max_locals`, which `new` already rejected.
    pub fn entry_frame(&self) -> Result<Frame> {
        let mut frame = Frame::new(
            self.method.max_locals as usize,
            self.method.max_stack as usize,
        );
        let mut index: u16 = 0;
        for word in &self.argument_types {
            if word.is_wide() {
                frame.set_local_pair(index, *word)?;
                index += 2;
            } else {
                frame.set_local(index, *word)?;
                index += 1;
            }
        }
        frame.uninitialized_this = self
            .argument_types
            .first()
            .is_some_and(|word| word.is_special());
        Ok(frame)
    }
}

/// Simulate the instruction at `pc` against `frame`.
///
/// # Errors
/// Any contract violation fails with a latched [`ErrorDetail`]; the detail's pc is filled in
/// here so handlers never need to know where they are.
pub fn execute(
    ctx: &MethodContext<'_>,
    env: &mut TypeEnv<'_>,
    bytecode: &Bytecode<'_>,
    frame: &mut Frame,
    pc: u32,
) -> Result<Step> {
    dispatch(ctx, env, bytecode, frame, pc).map_err(|error| match error {
        VerifyError::Verification(mut detail) => {
            if detail.pc.is_none() {
                detail.pc = Some(pc);
            }
            VerifyError::Verification(detail)
        }
        other => other,
    })
}

#[expect(clippy::too_many_lines)]
fn dispatch(
    ctx: &MethodContext<'_>,
    env: &mut TypeEnv<'_>,
    bytecode: &Bytecode<'_>,
    frame: &mut Frame,
    pc: u32,
) -> Result<Step> {
    use opcodes as op;

    let opcode = bytecode.opcode(pc)?;
    let next_pc = bytecode.next_pc(pc)?;
    let mut control = Control::Fall;

    match opcode {
        op::NOP => {}

        // Constants
        op::ACONST_NULL => frame.push(TypeWord::null())?,
        op::ICONST_M1..=op::ICONST_5 | op::BIPUSH | op::SIPUSH => frame.push(TypeWord::int())?,
        op::LCONST_0 | op::LCONST_1 => frame.push_pair(TypeWord::long())?,
        op::FCONST_0..=op::FCONST_2 => frame.push(TypeWord::float())?,
        op::DCONST_0 | op::DCONST_1 => frame.push_pair(TypeWord::double())?,
        op::LDC => misc::handle_ldc(ctx, env, frame, u16::from(bytecode.read_u8(pc + 1)?))?,
        op::LDC_W => misc::handle_ldc(ctx, env, frame, bytecode.read_u16(pc + 1)?)?,
        op::LDC2_W => misc::handle_ldc2(ctx, env, frame, bytecode.read_u16(pc + 1)?)?,

        // Loads
        op::ILOAD => load_store::handle_iload(frame, u16::from(bytecode.read_u8(pc + 1)?))?,
        op::LLOAD => load_store::handle_lload(frame, u16::from(bytecode.read_u8(pc + 1)?))?,
        op::FLOAD => load_store::handle_fload(frame, u16::from(bytecode.read_u8(pc + 1)?))?,
        op::DLOAD => load_store::handle_dload(frame, u16::from(bytecode.read_u8(pc + 1)?))?,
        op::ALOAD => load_store::handle_aload(frame, u16::from(bytecode.read_u8(pc + 1)?))?,
        op::ILOAD_0..=op::ALOAD_3 => {
            let packed = opcode - op::ILOAD_0;
            let index = u16::from(packed % 4);
            match packed / 4 {
                0 => load_store::handle_iload(frame, index)?,
                1 => load_store::handle_lload(frame, index)?,
                2 => load_store::handle_fload(frame, index)?,
                3 => load_store::handle_dload(frame, index)?,
                _ => load_store::handle_aload(frame, index)?,
            }
        }

        // Array loads
        op::IALOAD..=op::SALOAD => load_store::handle_array_load(frame, opcode)?,

        // Stores
        op::ISTORE => load_store::handle_istore(frame, u16::from(bytecode.read_u8(pc + 1)?))?,
        op::LSTORE => load_store::handle_lstore(frame, u16::from(bytecode.read_u8(pc + 1)?))?,
        op::FSTORE => load_store::handle_fstore(frame, u16::from(bytecode.read_u8(pc + 1)?))?,
        op::DSTORE => load_store::handle_dstore(frame, u16::from(bytecode.read_u8(pc + 1)?))?,
        op::ASTORE => load_store::handle_astore(frame, u16::from(bytecode.read_u8(pc + 1)?))?,
        op::ISTORE_0..=op::ASTORE_3 => {
            let packed = opcode - op::ISTORE_0;
            let index = u16::from(packed % 4);
            match packed / 4 {
                0 => load_store::handle_istore(frame, index)?,
                1 => load_store::handle_lstore(frame, index)?,
                2 => load_store::handle_fstore(frame, index)?,
                3 => load_store::handle_dstore(frame, index)?,
                _ => load_store::handle_astore(frame, index)?,
            }
        }

        // Array stores
        op::IASTORE..=op::SASTORE => load_store::handle_array_store(frame, opcode)?,

        // Operand stack shuffles
        op::POP..=op::SWAP => stack::handle_stack_op(frame, opcode)?,

        // Arithmetic
        op::IADD..=op::LXOR => math::handle_arithmetic(frame, opcode)?,
        op::IINC => load_store::handle_iinc(frame, u16::from(bytecode.read_u8(pc + 1)?))?,

        // Conversions
        op::I2L..=op::I2S => conversion::handle_conversion(frame, opcode)?,

        // Long and floating comparisons
        op::LCMP..=op::DCMPG => comparison::handle_comparison(frame, opcode)?,

        // Branches
        op::IFEQ..=op::IFLE => {
            control::handle_if_int(frame)?;
            control = Control::Conditional(bytecode.branch_target(pc)?);
        }
        op::IF_ICMPEQ..=op::IF_ICMPLE => {
            control::handle_if_icmp(frame)?;
            control = Control::Conditional(bytecode.branch_target(pc)?);
        }
        op::IF_ACMPEQ | op::IF_ACMPNE => {
            control::handle_if_acmp(frame)?;
            control = Control::Conditional(bytecode.branch_target(pc)?);
        }
        op::IFNULL | op::IFNONNULL => {
            control::handle_if_reference(frame)?;
            control = Control::Conditional(bytecode.branch_target(pc)?);
        }
        op::GOTO => control = Control::Goto(bytecode.branch_target(pc)?),
        op::GOTO_W => control = Control::Goto(bytecode.wide_branch_target(pc)?),
        op::TABLESWITCH | op::LOOKUPSWITCH => {
            control::handle_switch(frame)?;
            control = Control::Switch(bytecode.switch_targets(pc)?);
        }

        // Returns
        op::IRETURN..=op::RETURN => {
            control::handle_return(ctx, env, frame, opcode)?;
            control = Control::Return;
        }

        // Field access
        op::GETSTATIC | op::PUTSTATIC | op::GETFIELD | op::PUTFIELD => {
            references::handle_field_access(ctx, env, frame, opcode, bytecode.read_u16(pc + 1)?)?;
        }

        // Calls
        op::INVOKEVIRTUAL => {
            references::handle_invokevirtual(ctx, env, frame, bytecode.read_u16(pc + 1)?)?;
        }
        op::INVOKESPECIAL => {
            references::handle_invokespecial(
                ctx,
                env,
                frame,
                bytecode,
                bytecode.read_u16(pc + 1)?,
            )?;
        }
        op::INVOKESTATIC => {
            references::handle_invokestatic(ctx, env, frame, bytecode.read_u16(pc + 1)?)?;
        }
        op::INVOKEINTERFACE => {
            let count = bytecode.read_u8(pc + 3)?;
            let reserved = bytecode.read_u8(pc + 4)?;
            references::handle_invokeinterface(
                ctx,
                env,
                frame,
                bytecode.read_u16(pc + 1)?,
                count,
                reserved,
            )?;
        }
        op::INVOKEDYNAMIC => {
            // Only the 2-byte constant pool index form; the trailing bytes must be zero.
            if bytecode.read_u16(pc + 3)? != 0 {
                return Err(ErrorDetail::new(ErrorKind::BadBytecode).into());
            }
            references::handle_invokedynamic(ctx, env, frame, bytecode.read_u16(pc + 1)?)?;
        }

        // Object and array creation
        op::NEW => references::handle_new(ctx, frame, pc, bytecode.read_u16(pc + 1)?)?,
        op::NEWARRAY => references::handle_newarray(frame, bytecode.read_u8(pc + 1)?)?,
        op::ANEWARRAY => {
            references::handle_anewarray(ctx, env, frame, bytecode.read_u16(pc + 1)?)?;
        }
        op::MULTIANEWARRAY => {
            references::handle_multianewarray(
                ctx,
                env,
                frame,
                bytecode.read_u16(pc + 1)?,
                bytecode.read_u8(pc + 3)?,
            )?;
        }
        op::ARRAYLENGTH => references::handle_arraylength(frame)?,

        // Casts and checks
        op::CHECKCAST => references::handle_checkcast(ctx, env, frame, bytecode.read_u16(pc + 1)?)?,
        op::INSTANCEOF => references::handle_instanceof(ctx, frame, bytecode.read_u16(pc + 1)?)?,

        // Exceptions and monitors
        op::ATHROW => {
            control::handle_athrow(env, frame)?;
            control = Control::Throw;
        }
        op::MONITORENTER | op::MONITOREXIT => {
            frame.pop_reference_or_uninit()?;
        }

        // Wide-index forms
        op::WIDE => {
            let sub = bytecode.read_u8(pc + 1)?;
            let index = bytecode.read_u16(pc + 2)?;
            match sub {
                op::ILOAD => load_store::handle_iload(frame, index)?,
                op::LLOAD => load_store::handle_lload(frame, index)?,
                op::FLOAD => load_store::handle_fload(frame, index)?,
                op::DLOAD => load_store::handle_dload(frame, index)?,
                op::ALOAD => load_store::handle_aload(frame, index)?,
                op::ISTORE => load_store::handle_istore(frame, index)?,
                op::LSTORE => load_store::handle_lstore(frame, index)?,
                op::FSTORE => load_store::handle_fstore(frame, index)?,
                op::DSTORE => load_store::handle_dstore(frame, index)?,
                op::ASTORE => load_store::handle_astore(frame, index)?,
                op::IINC => load_store::handle_iinc(frame, index)?,
                _ => return Err(ErrorDetail::new(ErrorKind::BadBytecode).into()),
            }
        }

        // jsr/ret and anything undefined
        _ => return Err(ErrorDetail::new(ErrorKind::BadBytecode).into()),
    }

    Ok(Step { next_pc, control })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VerifierConfig;
    use crate::resolver::LinkRecords;
    use crate::test_support::{MockResolver, demo_class, instance_method, static_method};
    use cortado_romclass::ConstantPool;

    fn run(descriptor: &str, max_stack: u16, max_locals: u16, code: &[u8]) -> Result<Frame> {
        let class = demo_class(
            52,
            ConstantPool::new(),
            vec![static_method("run", descriptor, max_stack, max_locals, code)],
        );
        let mut names = ClassNames::new();
        let resolver = MockResolver::new();
        let config = VerifierConfig::default();
        let mut link_records = LinkRecords::new();
        let ctx = MethodContext::new(&class, &class.methods[0], &mut names)?;
        let mut env = TypeEnv::new(&mut names, &resolver, &config, &mut link_records);
        let bytecode = Bytecode::new(&class.methods[0].code);
        let mut frame = ctx.entry_frame()?;
        let mut pc = 0;
        while pc < bytecode.len() {
            let step = execute(&ctx, &mut env, &bytecode, &mut frame, pc)?;
            if !matches!(step.control, Control::Fall | Control::Conditional(_)) {
                break;
            }
            pc = step.next_pc;
        }
        Ok(frame)
    }

    #[test]
    fn test_linear_arithmetic() -> Result<()> {
        // iconst_1; iconst_2; iadd; ireturn
        let frame = run("()I", 2, 0, &[0x04, 0x05, 0x60, 0xac])?;
        assert!(frame.is_stack_empty());
        Ok(())
    }

    #[test]
    fn test_entry_frame_for_constructor() -> Result<()> {
        let class = demo_class(
            52,
            ConstantPool::new(),
            vec![instance_method("<init>", "()V", 1, 1, &[0xb1])],
        );
        let mut names = ClassNames::new();
        let ctx = MethodContext::new(&class, &class.methods[0], &mut names)?;
        let frame = ctx.entry_frame()?;
        assert!(frame.uninitialized_this);
        assert!(frame.get_local(0)?.is_special());
        Ok(())
    }

    #[test]
    fn test_argument_count_mismatch() {
        let class = demo_class(52, ConstantPool::new(), {
            let mut method = static_method("run", "(II)V", 0, 2, &[0xb1]);
            method.arg_count = 1; // descriptor says 2
            vec![method]
        });
        let mut names = ClassNames::new();
        let error = MethodContext::new(&class, &class.methods[0], &mut names).expect_err("count");
        assert_eq!(error.kind(), Some(ErrorKind::ArgumentsMismatch));
    }

    #[test]
    fn test_wide_slot_overwrite_reports_top() {
        // lconst_0; lstore_1; iconst_0; istore_1; iload_2; ireturn  (scenario: slot 2 is top)
        let error = run("()I", 2, 3, &[0x09, 0x40, 0x03, 0x3c, 0x1c, 0xac]).expect_err("top");
        let detail = error.detail().expect("detail");
        assert_eq!(detail.kind, ErrorKind::IncompatibleType);
        assert_eq!(detail.pc, Some(4));
        assert_eq!(detail.expected, Some(TypeWord::int()));
        assert_eq!(detail.found, Some(TypeWord::top()));
        assert_eq!(detail.frame_position, Some(2));
    }

    #[test]
    fn test_invalid_opcode_reports_pc() {
        let error = run("()V", 0, 0, &[0x00, 0xcb]).expect_err("invalid");
        let detail = error.detail().expect("detail");
        assert_eq!(detail.kind, ErrorKind::BadBytecode);
        assert_eq!(detail.pc, Some(1));
    }
}
