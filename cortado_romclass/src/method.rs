use crate::flags::MethodAccessFlags;
use std::fmt;
use std::ops::Range;

/// An exception handler record from a method's exception table.
///
/// See: <https://docs.oracle.com/javase/specs/jvms/se25/html/jvms-4.html#jvms-4.7.3>
#[derive(Clone, Debug, PartialEq)]
pub struct ExceptionTableEntry {
    /// The bytecode range `[start_pc, end_pc)` the handler covers.
    pub range_pc: Range<u16>,
    /// The bytecode offset of the handler.
    pub handler_pc: u16,
    /// Constant pool index of the caught class, or 0 to catch everything.
    pub catch_type: u16,
}

/// A method record of a ROM class.
///
/// The bytecode and the optional `StackMapTable` attribute are kept as raw big-endian byte
/// regions, exactly as they appear on disk; the verifier decodes them itself with endian-aware
/// readers. Everything else has already been pulled out of the class file by the upstream
/// static verifier.
#[derive(Clone, Debug, PartialEq)]
pub struct RomMethod {
    /// The method name.
    pub name: String,
    /// The method descriptor, e.g. `(ILjava/lang/String;)V`.
    pub descriptor: String,
    /// Access and property flags.
    pub access_flags: MethodAccessFlags,
    /// Maximum operand stack depth.
    pub max_stack: u16,
    /// Number of local variable slots.
    pub max_locals: u16,
    /// Declared argument slot count, including the receiver for instance methods.
    pub arg_count: u16,
    /// Raw bytecode, big-endian multibyte operands.
    pub code: Vec<u8>,
    /// Exception handler records.
    pub exception_table: Vec<ExceptionTableEntry>,
    /// Raw `StackMapTable` attribute payload (entry count followed by the frames), if present.
    pub stack_map_table: Option<Vec<u8>>,
}

impl RomMethod {
    /// Return `true` if the method is an instance initialiser.
    #[must_use]
    pub fn is_constructor(&self) -> bool {
        self.name == "<init>"
    }

    /// Return `true` if the method has no receiver.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.access_flags.contains(MethodAccessFlags::STATIC)
    }

    /// Return `true` if the method carries no bytecode to verify.
    #[must_use]
    pub fn is_native_or_abstract(&self) -> bool {
        self.access_flags
            .intersects(MethodAccessFlags::NATIVE | MethodAccessFlags::ABSTRACT)
    }
}

impl fmt::Display for RomMethod {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}{}", self.name, self.descriptor)
    }
}
