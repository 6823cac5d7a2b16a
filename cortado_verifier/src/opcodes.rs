//! # Instruction Tables and Bytecode Reading
//!
//! Static per-opcode tables (instruction length, branch action, exception-raising flag) and a
//! bounds-checked big-endian reader over raw method bytecode. The simulators drive everything
//! from these tables; there is no decoded instruction object.

use byteorder::{BigEndian, ByteOrder};

use crate::error::{ErrorDetail, ErrorKind, Result};

// Constants
pub const NOP: u8 = 0x00;
pub const ACONST_NULL: u8 = 0x01;
pub const ICONST_M1: u8 = 0x02;
pub const ICONST_0: u8 = 0x03;
pub const ICONST_5: u8 = 0x08;
pub const LCONST_0: u8 = 0x09;
pub const LCONST_1: u8 = 0x0a;
pub const FCONST_0: u8 = 0x0b;
pub const FCONST_2: u8 = 0x0d;
pub const DCONST_0: u8 = 0x0e;
pub const DCONST_1: u8 = 0x0f;
pub const BIPUSH: u8 = 0x10;
pub const SIPUSH: u8 = 0x11;
pub const LDC: u8 = 0x12;
pub const LDC_W: u8 = 0x13;
pub const LDC2_W: u8 = 0x14;
pub const ILOAD: u8 = 0x15;
pub const LLOAD: u8 = 0x16;
pub const FLOAD: u8 = 0x17;
pub const DLOAD: u8 = 0x18;
pub const ALOAD: u8 = 0x19;
pub const ILOAD_0: u8 = 0x1a;
pub const LLOAD_0: u8 = 0x1e;
pub const FLOAD_0: u8 = 0x22;
pub const DLOAD_0: u8 = 0x26;
pub const ALOAD_0: u8 = 0x2a;
pub const ALOAD_3: u8 = 0x2d;
pub const IALOAD: u8 = 0x2e;
pub const LALOAD: u8 = 0x2f;
pub const FALOAD: u8 = 0x30;
pub const DALOAD: u8 = 0x31;
pub const AALOAD: u8 = 0x32;
pub const BALOAD: u8 = 0x33;
pub const CALOAD: u8 = 0x34;
pub const SALOAD: u8 = 0x35;
pub const ISTORE: u8 = 0x36;
pub const LSTORE: u8 = 0x37;
pub const FSTORE: u8 = 0x38;
pub const DSTORE: u8 = 0x39;
pub const ASTORE: u8 = 0x3a;
pub const ISTORE_0: u8 = 0x3b;
pub const LSTORE_0: u8 = 0x3f;
pub const FSTORE_0: u8 = 0x43;
pub const DSTORE_0: u8 = 0x47;
pub const ASTORE_0: u8 = 0x4b;
pub const ASTORE_3: u8 = 0x4e;
pub const IASTORE: u8 = 0x4f;
pub const LASTORE: u8 = 0x50;
pub const FASTORE: u8 = 0x51;
pub const DASTORE: u8 = 0x52;
pub const AASTORE: u8 = 0x53;
pub const BASTORE: u8 = 0x54;
pub const CASTORE: u8 = 0x55;
pub const SASTORE: u8 = 0x56;
pub const POP: u8 = 0x57;
pub const POP2: u8 = 0x58;
pub const DUP: u8 = 0x59;
pub const DUP_X1: u8 = 0x5a;
pub const DUP_X2: u8 = 0x5b;
pub const DUP2: u8 = 0x5c;
pub const DUP2_X1: u8 = 0x5d;
pub const DUP2_X2: u8 = 0x5e;
pub const SWAP: u8 = 0x5f;
pub const IADD: u8 = 0x60;
pub const LADD: u8 = 0x61;
pub const FADD: u8 = 0x62;
pub const DADD: u8 = 0x63;
pub const ISUB: u8 = 0x64;
pub const LSUB: u8 = 0x65;
pub const FSUB: u8 = 0x66;
pub const DSUB: u8 = 0x67;
pub const IMUL: u8 = 0x68;
pub const LMUL: u8 = 0x69;
pub const FMUL: u8 = 0x6a;
pub const DMUL: u8 = 0x6b;
pub const IDIV: u8 = 0x6c;
pub const LDIV: u8 = 0x6d;
pub const FDIV: u8 = 0x6e;
pub const DDIV: u8 = 0x6f;
pub const IREM: u8 = 0x70;
pub const LREM: u8 = 0x71;
pub const FREM: u8 = 0x72;
pub const DREM: u8 = 0x73;
pub const INEG: u8 = 0x74;
pub const LNEG: u8 = 0x75;
pub const FNEG: u8 = 0x76;
pub const DNEG: u8 = 0x77;
pub const ISHL: u8 = 0x78;
pub const LSHL: u8 = 0x79;
pub const ISHR: u8 = 0x7a;
pub const LSHR: u8 = 0x7b;
pub const IUSHR: u8 = 0x7c;
pub const LUSHR: u8 = 0x7d;
pub const IAND: u8 = 0x7e;
pub const LAND: u8 = 0x7f;
pub const IOR: u8 = 0x80;
pub const LOR: u8 = 0x81;
pub const IXOR: u8 = 0x82;
pub const LXOR: u8 = 0x83;
pub const IINC: u8 = 0x84;
pub const I2L: u8 = 0x85;
pub const I2F: u8 = 0x86;
pub const I2D: u8 = 0x87;
pub const L2I: u8 = 0x88;
pub const L2F: u8 = 0x89;
pub const L2D: u8 = 0x8a;
pub const F2I: u8 = 0x8b;
pub const F2L: u8 = 0x8c;
pub const F2D: u8 = 0x8d;
pub const D2I: u8 = 0x8e;
pub const D2L: u8 = 0x8f;
pub const D2F: u8 = 0x90;
pub const I2B: u8 = 0x91;
pub const I2C: u8 = 0x92;
pub const I2S: u8 = 0x93;
pub const LCMP: u8 = 0x94;
pub const FCMPL: u8 = 0x95;
pub const FCMPG: u8 = 0x96;
pub const DCMPL: u8 = 0x97;
pub const DCMPG: u8 = 0x98;
pub const IFEQ: u8 = 0x99;
pub const IFNE: u8 = 0x9a;
pub const IFLT: u8 = 0x9b;
pub const IFGE: u8 = 0x9c;
pub const IFGT: u8 = 0x9d;
pub const IFLE: u8 = 0x9e;
pub const IF_ICMPEQ: u8 = 0x9f;
pub const IF_ICMPLE: u8 = 0xa4;
pub const IF_ACMPEQ: u8 = 0xa5;
pub const IF_ACMPNE: u8 = 0xa6;
pub const GOTO: u8 = 0xa7;
pub const JSR: u8 = 0xa8;
pub const RET: u8 = 0xa9;
pub const TABLESWITCH: u8 = 0xaa;
pub const LOOKUPSWITCH: u8 = 0xab;
pub const IRETURN: u8 = 0xac;
pub const LRETURN: u8 = 0xad;
pub const FRETURN: u8 = 0xae;
pub const DRETURN: u8 = 0xaf;
pub const ARETURN: u8 = 0xb0;
pub const RETURN: u8 = 0xb1;
pub const GETSTATIC: u8 = 0xb2;
pub const PUTSTATIC: u8 = 0xb3;
pub const GETFIELD: u8 = 0xb4;
pub const PUTFIELD: u8 = 0xb5;
pub const INVOKEVIRTUAL: u8 = 0xb6;
pub const INVOKESPECIAL: u8 = 0xb7;
pub const INVOKESTATIC: u8 = 0xb8;
pub const INVOKEINTERFACE: u8 = 0xb9;
pub const INVOKEDYNAMIC: u8 = 0xba;
pub const NEW: u8 = 0xbb;
pub const NEWARRAY: u8 = 0xbc;
pub const ANEWARRAY: u8 = 0xbd;
pub const ARRAYLENGTH: u8 = 0xbe;
pub const ATHROW: u8 = 0xbf;
pub const CHECKCAST: u8 = 0xc0;
pub const INSTANCEOF: u8 = 0xc1;
pub const MONITORENTER: u8 = 0xc2;
pub const MONITOREXIT: u8 = 0xc3;
pub const WIDE: u8 = 0xc4;
pub const MULTIANEWARRAY: u8 = 0xc5;
pub const IFNULL: u8 = 0xc6;
pub const IFNONNULL: u8 = 0xc7;
pub const GOTO_W: u8 = 0xc8;
pub const JSR_W: u8 = 0xc9;

/// Branch action nibble in [`SIZE_AND_BRANCH_ACTION`].
pub const ACTION_NONE: u8 = 0;
/// Conditional branch: one target plus fall-through.
pub const ACTION_CONDITIONAL: u8 = 1;
/// Unconditional `goto` / `goto_w`.
pub const ACTION_GOTO: u8 = 2;
/// `tableswitch` / `lookupswitch`.
pub const ACTION_SWITCH: u8 = 5;

/// Low 3 bits: instruction length (0 for variable-length or invalid opcodes).
/// High nibble: branch action.
pub static SIZE_AND_BRANCH_ACTION: [u8; 256] = build_size_and_branch_table();

/// `true` for opcodes that can raise an exception, used to decide which instructions inside an
/// exception range must merge into the handler.
pub static RAISES_EXCEPTION: [bool; 256] = build_raises_table();

const fn build_size_and_branch_table() -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut opcode = 0usize;
    while opcode < 256 {
        #[expect(clippy::cast_possible_truncation)]
        let op = opcode as u8;
        table[opcode] = (branch_action(op) << 4) | base_length(op);
        opcode += 1;
    }
    table
}

const fn build_raises_table() -> [bool; 256] {
    let mut table = [false; 256];
    let mut opcode = 0usize;
    while opcode < 256 {
        #[expect(clippy::cast_possible_truncation)]
        let op = opcode as u8;
        table[opcode] = raises_exception(op);
        opcode += 1;
    }
    table
}

const fn base_length(opcode: u8) -> u8 {
    match opcode {
        BIPUSH | LDC | ILOAD | LLOAD | FLOAD | DLOAD | ALOAD | ISTORE | LSTORE | FSTORE
        | DSTORE | ASTORE | NEWARRAY | RET => 2,
        SIPUSH | LDC_W | LDC2_W | IINC | IFEQ..=IF_ACMPNE | GOTO | JSR | GETSTATIC
        | PUTSTATIC | GETFIELD | PUTFIELD | INVOKEVIRTUAL | INVOKESPECIAL | INVOKESTATIC
        | NEW | ANEWARRAY | CHECKCAST | INSTANCEOF | IFNULL | IFNONNULL => 3,
        MULTIANEWARRAY => 4,
        INVOKEINTERFACE | INVOKEDYNAMIC | GOTO_W | JSR_W => 5,
        // Variable-length: operand padding / wide prefix; decoded per instruction.
        TABLESWITCH | LOOKUPSWITCH | WIDE => 0,
        NOP..=LDC2_W | ILOAD_0..=SASTORE | POP..=LXOR | I2L..=IF_ACMPNE | IRETURN..=RETURN
        | ARRAYLENGTH | ATHROW | MONITORENTER | MONITOREXIT => 1,
        _ => 0,
    }
}

const fn branch_action(opcode: u8) -> u8 {
    match opcode {
        IFEQ..=IF_ACMPNE | IFNULL | IFNONNULL => ACTION_CONDITIONAL,
        GOTO | GOTO_W => ACTION_GOTO,
        TABLESWITCH | LOOKUPSWITCH => ACTION_SWITCH,
        _ => ACTION_NONE,
    }
}

const fn raises_exception(opcode: u8) -> bool {
    matches!(
        opcode,
        LDC | LDC_W
            | IALOAD..=SALOAD
            | IASTORE..=SASTORE
            | IDIV
            | LDIV
            | IREM
            | LREM
            | GETSTATIC..=INVOKEDYNAMIC
            | NEW..=ATHROW
            | CHECKCAST
            | INSTANCEOF
            | MONITORENTER
            | MONITOREXIT
            | MULTIANEWARRAY
    )
}

/// The branch action of an opcode.
#[must_use]
pub fn action(opcode: u8) -> u8 {
    SIZE_AND_BRANCH_ACTION[opcode as usize] >> 4
}

/// `true` for opcodes that can raise an exception.
#[must_use]
pub fn can_raise(opcode: u8) -> bool {
    RAISES_EXCEPTION[opcode as usize]
}

/// Decoded targets of a `tableswitch` or `lookupswitch`.
#[derive(Clone, Debug, PartialEq)]
pub struct SwitchTargets {
    /// Absolute pc of the default target.
    pub default: u32,
    /// Absolute pcs of the case targets, in table order.
    pub targets: Vec<u32>,
}

/// A bounds-checked big-endian reader over raw method bytecode.
#[derive(Debug)]
pub struct Bytecode<'a> {
    code: &'a [u8],
}

impl<'a> Bytecode<'a> {
    /// Wrap a method's code array.
    #[must_use]
    pub fn new(code: &'a [u8]) -> Self {
        Self { code }
    }

    /// The code length in bytes.
    #[must_use]
    pub fn len(&self) -> u32 {
        u32::try_from(self.code.len()).unwrap_or(u32::MAX)
    }

    /// `true` for an empty code array.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    fn slice(&self, at: u32, bytes: usize) -> Result<&[u8]> {
        let start = at as usize;
        self.code
            .get(start..start.saturating_add(bytes))
            .ok_or_else(|| ErrorDetail::new(ErrorKind::UnexpectedEOF).at(at).into())
    }

    /// The opcode at a pc.
    ///
    /// # Errors
    /// Fails with `UnexpectedEOF` past the end of the code.
    pub fn opcode(&self, pc: u32) -> Result<u8> {
        Ok(self.slice(pc, 1)?[0])
    }

    /// An unsigned byte operand.
    ///
    /// # Errors
    /// Fails with `UnexpectedEOF` past the end of the code.
    pub fn read_u8(&self, at: u32) -> Result<u8> {
        Ok(self.slice(at, 1)?[0])
    }

    /// A signed byte operand.
    ///
    /// # Errors
    /// Fails with `UnexpectedEOF` past the end of the code.
    #[expect(clippy::cast_possible_wrap)]
    pub fn read_i8(&self, at: u32) -> Result<i8> {
        Ok(self.slice(at, 1)?[0] as i8)
    }

    /// A big-endian unsigned 16-bit operand.
    ///
    /// # Errors
    /// Fails with `UnexpectedEOF` past the end of the code.
    pub fn read_u16(&self, at: u32) -> Result<u16> {
        Ok(BigEndian::read_u16(self.slice(at, 2)?))
    }

    /// A big-endian signed 16-bit operand.
    ///
    /// # Errors
    /// Fails with `UnexpectedEOF` past the end of the code.
    pub fn read_i16(&self, at: u32) -> Result<i16> {
        Ok(BigEndian::read_i16(self.slice(at, 2)?))
    }

    /// A big-endian signed 32-bit operand.
    ///
    /// # Errors
    /// Fails with `UnexpectedEOF` past the end of the code.
    pub fn read_i32(&self, at: u32) -> Result<i32> {
        Ok(BigEndian::read_i32(self.slice(at, 4)?))
    }

    /// The full length of the instruction at a pc, including variable-length forms.
    ///
    /// # Errors
    /// Fails with `BadBytecode` for invalid opcodes or a malformed switch, `UnexpectedEOF`
    /// for an instruction truncated by the end of the code.
    pub fn instruction_length(&self, pc: u32) -> Result<u32> {
        let opcode = self.opcode(pc)?;
        match opcode {
            WIDE => {
                let sub = self.read_u8(pc + 1)?;
                match sub {
                    IINC => Ok(6),
                    ILOAD | LLOAD | FLOAD | DLOAD | ALOAD | ISTORE | LSTORE | FSTORE | DSTORE
                    | ASTORE | RET => Ok(4),
                    _ => Err(ErrorDetail::new(ErrorKind::BadBytecode).at(pc).into()),
                }
            }
            TABLESWITCH => {
                let operands = align4(pc + 1);
                let low = self.read_i32(operands + 4)?;
                let high = self.read_i32(operands + 8)?;
                if high < low {
                    return Err(ErrorDetail::new(ErrorKind::BadBytecode).at(pc).into());
                }
                let count = u32::try_from(i64::from(high) - i64::from(low) + 1)
                    .map_err(|_| ErrorDetail::new(ErrorKind::BadBytecode).at(pc))?;
                let length = (operands - pc)
                    .checked_add(12)
                    .and_then(|len| len.checked_add(count.checked_mul(4)?))
                    .ok_or_else(|| ErrorDetail::new(ErrorKind::BadBytecode).at(pc))?;
                Ok(length)
            }
            LOOKUPSWITCH => {
                let operands = align4(pc + 1);
                let npairs = self.read_i32(operands + 4)?;
                if npairs < 0 {
                    return Err(ErrorDetail::new(ErrorKind::BadBytecode).at(pc).into());
                }
                #[expect(clippy::cast_sign_loss)]
                let count = npairs as u32;
                let length = (operands - pc)
                    .checked_add(8)
                    .and_then(|len| len.checked_add(count.checked_mul(8)?))
                    .ok_or_else(|| ErrorDetail::new(ErrorKind::BadBytecode).at(pc))?;
                Ok(length)
            }
            _ => {
                let length = SIZE_AND_BRANCH_ACTION[opcode as usize] & 0x07;
                if length == 0 {
                    return Err(ErrorDetail::new(ErrorKind::BadBytecode).at(pc).into());
                }
                Ok(u32::from(length))
            }
        }
    }

    /// The pc of the next instruction.
    ///
    /// # Errors
    /// Fails with `UnexpectedEOF` if the instruction runs past the end of the code.
    pub fn next_pc(&self, pc: u32) -> Result<u32> {
        let next = pc + self.instruction_length(pc)?;
        if next > self.len() {
            return Err(ErrorDetail::new(ErrorKind::UnexpectedEOF).at(pc).into());
        }
        Ok(next)
    }

    /// The absolute target of a 16-bit relative branch.
    ///
    /// # Errors
    /// Fails with `BadBytecode` for a target outside the method.
    pub fn branch_target(&self, pc: u32) -> Result<u32> {
        let offset = self.read_i16(pc + 1)?;
        self.absolute_target(pc, i32::from(offset))
    }

    /// The absolute target of a 32-bit relative branch (`goto_w`).
    ///
    /// # Errors
    /// Fails with `BadBytecode` for a target outside the method.
    pub fn wide_branch_target(&self, pc: u32) -> Result<u32> {
        let offset = self.read_i32(pc + 1)?;
        self.absolute_target(pc, offset)
    }

    fn absolute_target(&self, pc: u32, offset: i32) -> Result<u32> {
        let target = i64::from(pc) + i64::from(offset);
        if target < 0 || target >= i64::from(self.len()) {
            return Err(ErrorDetail::new(ErrorKind::BadBytecode).at(pc).into());
        }
        Ok(u32::try_from(target)?)
    }

    /// Decode the targets of the `tableswitch` or `lookupswitch` at a pc.
    ///
    /// # Errors
    /// Fails with `BadBytecode` for malformed tables or out-of-range targets.
    pub fn switch_targets(&self, pc: u32) -> Result<SwitchTargets> {
        let opcode = self.opcode(pc)?;
        let operands = align4(pc + 1);
        let default = self.absolute_target(pc, self.read_i32(operands)?)?;
        let mut targets = Vec::new();
        match opcode {
            TABLESWITCH => {
                let low = self.read_i32(operands + 4)?;
                let high = self.read_i32(operands + 8)?;
                if high < low {
                    return Err(ErrorDetail::new(ErrorKind::BadBytecode).at(pc).into());
                }
                let count = u32::try_from(i64::from(high) - i64::from(low) + 1)
                    .map_err(|_| ErrorDetail::new(ErrorKind::BadBytecode).at(pc))?;
                targets.reserve(count as usize);
                for case in 0..count {
                    let at = operands + 12 + case * 4;
                    targets.push(self.absolute_target(pc, self.read_i32(at)?)?);
                }
            }
            LOOKUPSWITCH => {
                let npairs = self.read_i32(operands + 4)?;
                if npairs < 0 {
                    return Err(ErrorDetail::new(ErrorKind::BadBytecode).at(pc).into());
                }
                #[expect(clippy::cast_sign_loss)]
                let count = npairs as u32;
                targets.reserve(count as usize);
                for pair in 0..count {
                    let at = operands + 8 + pair * 8 + 4;
                    targets.push(self.absolute_target(pc, self.read_i32(at)?)?);
                }
            }
            _ => return Err(ErrorDetail::new(ErrorKind::BadBytecode).at(pc).into()),
        }
        Ok(SwitchTargets { default, targets })
    }
}

fn align4(at: u32) -> u32 {
    (at + 3) & !3
}

/// The mnemonic for an opcode, for diagnostics.
#[must_use]
pub fn mnemonic(opcode: u8) -> &'static str {
    MNEMONICS[opcode as usize]
}

#[rustfmt::skip]
static MNEMONICS: [&str; 256] = [
    "nop", "aconst_null", "iconst_m1", "iconst_0", "iconst_1", "iconst_2", "iconst_3", "iconst_4",
    "iconst_5", "lconst_0", "lconst_1", "fconst_0", "fconst_1", "fconst_2", "dconst_0", "dconst_1",
    "bipush", "sipush", "ldc", "ldc_w", "ldc2_w", "iload", "lload", "fload",
    "dload", "aload", "iload_0", "iload_1", "iload_2", "iload_3", "lload_0", "lload_1",
    "lload_2", "lload_3", "fload_0", "fload_1", "fload_2", "fload_3", "dload_0", "dload_1",
    "dload_2", "dload_3", "aload_0", "aload_1", "aload_2", "aload_3", "iaload", "laload",
    "faload", "daload", "aaload", "baload", "caload", "saload", "istore", "lstore",
    "fstore", "dstore", "astore", "istore_0", "istore_1", "istore_2", "istore_3", "lstore_0",
    "lstore_1", "lstore_2", "lstore_3", "fstore_0", "fstore_1", "fstore_2", "fstore_3", "dstore_0",
    "dstore_1", "dstore_2", "dstore_3", "astore_0", "astore_1", "astore_2", "astore_3", "iastore",
    "lastore", "fastore", "dastore", "aastore", "bastore", "castore", "sastore", "pop",
    "pop2", "dup", "dup_x1", "dup_x2", "dup2", "dup2_x1", "dup2_x2", "swap",
    "iadd", "ladd", "fadd", "dadd", "isub", "lsub", "fsub", "dsub",
    "imul", "lmul", "fmul", "dmul", "idiv", "ldiv", "fdiv", "ddiv",
    "irem", "lrem", "frem", "drem", "ineg", "lneg", "fneg", "dneg",
    "ishl", "lshl", "ishr", "lshr", "iushr", "lushr", "iand", "land",
    "ior", "lor", "ixor", "lxor", "iinc", "i2l", "i2f", "i2d",
    "l2i", "l2f", "l2d", "f2i", "f2l", "f2d", "d2i", "d2l",
    "d2f", "i2b", "i2c", "i2s", "lcmp", "fcmpl", "fcmpg", "dcmpl",
    "dcmpg", "ifeq", "ifne", "iflt", "ifge", "ifgt", "ifle", "if_icmpeq",
    "if_icmpne", "if_icmplt", "if_icmpge", "if_icmpgt", "if_icmple", "if_acmpeq", "if_acmpne", "goto",
    "jsr", "ret", "tableswitch", "lookupswitch", "ireturn", "lreturn", "freturn", "dreturn",
    "areturn", "return", "getstatic", "putstatic", "getfield", "putfield", "invokevirtual", "invokespecial",
    "invokestatic", "invokeinterface", "invokedynamic", "new", "newarray", "anewarray", "arraylength", "athrow",
    "checkcast", "instanceof", "monitorenter", "monitorexit", "wide", "multianewarray", "ifnull", "ifnonnull",
    "goto_w", "jsr_w", "0xca", "0xcb", "0xcc", "0xcd", "0xce", "0xcf",
    "0xd0", "0xd1", "0xd2", "0xd3", "0xd4", "0xd5", "0xd6", "0xd7",
    "0xd8", "0xd9", "0xda", "0xdb", "0xdc", "0xdd", "0xde", "0xdf",
    "0xe0", "0xe1", "0xe2", "0xe3", "0xe4", "0xe5", "0xe6", "0xe7",
    "0xe8", "0xe9", "0xea", "0xeb", "0xec", "0xed", "0xee", "0xef",
    "0xf0", "0xf1", "0xf2", "0xf3", "0xf4", "0xf5", "0xf6", "0xf7",
    "0xf8", "0xf9", "0xfa", "0xfb", "0xfc", "0xfd", "0xfe", "0xff",
];
