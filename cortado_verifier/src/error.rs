//! Error handling for the cortado bytecode verifier
//!
//! A verification failure is captured as a structured [`ErrorDetail`]: the failure kind, the
//! bytecode offset, the offending slot, the expected and found types, and (for call-site
//! failures) the callee method triple. The detail is latched at the first failure and carried
//! up unchanged so the caller can format a diagnostic naming the exact frame position, even
//! though the live frame is gone by then.

use crate::types::TypeWord;

/// cortado verifier result type
///
/// This is a type alias for the standard library's [`Result`](core::result::Result) type with the
/// error type defaulting to [`VerifyError`].
pub type Result<T, E = VerifyError> = core::result::Result<T, E>;

/// The kind of a verification failure.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    /// `StackMapTable` decoding removed more locals than exist.
    StackMapFrameLocalsUnderflow,
    /// `StackMapTable` decoding appended locals beyond `max_locals`.
    StackMapFrameLocalsOverflow,
    /// `StackMapTable` decoding pushed beyond `max_stack`.
    StackMapFrameStackOverflow,
    /// Simulation pushed beyond `max_stack`.
    StackOverflow,
    /// Simulation popped an empty operand stack.
    StackUnderflow,
    /// A slot held a type the instruction cannot accept.
    IncompatibleType,
    /// Frame depths differ at a map point.
    StackSizeMismatch,
    /// A live frame slot is not assignable to the recorded frame slot.
    FramesIncompatibleType,
    /// A branch targets a pc that has no recorded frame.
    ExpectStackMapFrame,
    /// A declared frame is anchored at a pc that is not an instruction boundary.
    WrongStackmapFrame,
    /// A non-terminator reached the end of the bytecode without a map.
    NoStackmapFrame,
    /// An instruction is unreachable and has no recorded frame.
    DeadCode,
    /// The declared argument count disagrees with the method signature.
    ArgumentsMismatch,
    /// A return instruction does not match the declared return type.
    WrongReturnType,
    /// `invokespecial <init>` receiver was not an uninitialized type.
    BadInitObject,
    /// `invokespecial <init>` named a class other than the one the receiver requires.
    WrongInitMethod,
    /// `invokespecial` on a method the receiver type does not permit.
    BadInvokeSpecial,
    /// Protected member access from outside the permitted classes.
    BadAccessProtected,
    /// A constructor returned with `this` still uninitialized.
    InitNotCallInit,
    /// Array construction would exceed the arity field maximum.
    ArrayArityOverflow,
    /// Array operand has the wrong dimension count.
    ArrayDimensionMismatch,
    /// Array opcode found a non-array operand.
    InvalidArrayReference,
    /// The top of stack held an unexpected type.
    WrongTopType,
    /// Malformed or unsupported instruction.
    BadBytecode,
    /// The bytecode ended in the middle of an instruction.
    UnexpectedEOF,
    /// A class relationship must be recorded and re-checked at link time; deferred, not fatal.
    ClassRelationshipRecordRequired,
}

impl ErrorKind {
    /// Short description used when rendering diagnostics.
    #[must_use]
    pub fn message(&self) -> &'static str {
        match self {
            ErrorKind::StackMapFrameLocalsUnderflow => "stack map frame locals underflow",
            ErrorKind::StackMapFrameLocalsOverflow => "stack map frame locals overflow",
            ErrorKind::StackMapFrameStackOverflow => "stack map frame stack overflow",
            ErrorKind::StackOverflow => "operand stack overflow",
            ErrorKind::StackUnderflow => "operand stack underflow",
            ErrorKind::IncompatibleType => "incompatible type",
            ErrorKind::StackSizeMismatch => "stack size mismatch at map point",
            ErrorKind::FramesIncompatibleType => "frames have incompatible types",
            ErrorKind::ExpectStackMapFrame => "expected a stack map frame at branch target",
            ErrorKind::WrongStackmapFrame => "stack map frame at wrong pc",
            ErrorKind::NoStackmapFrame => "no stack map frame at end of bytecode",
            ErrorKind::DeadCode => "unreachable code without a stack map frame",
            ErrorKind::ArgumentsMismatch => "argument count does not match signature",
            ErrorKind::WrongReturnType => "wrong return type",
            ErrorKind::BadInitObject => "receiver of <init> is not an uninitialized object",
            ErrorKind::WrongInitMethod => "<init> called on the wrong class",
            ErrorKind::BadInvokeSpecial => "invalid invokespecial target",
            ErrorKind::BadAccessProtected => "illegal protected member access",
            ErrorKind::InitNotCallInit => "constructor returned without calling <init>",
            ErrorKind::ArrayArityOverflow => "array dimension count overflow",
            ErrorKind::ArrayDimensionMismatch => "array dimension mismatch",
            ErrorKind::InvalidArrayReference => "expected an array reference",
            ErrorKind::WrongTopType => "unexpected type on top of stack",
            ErrorKind::BadBytecode => "malformed bytecode",
            ErrorKind::UnexpectedEOF => "unexpected end of bytecode",
            ErrorKind::ClassRelationshipRecordRequired => "class relationship record required",
        }
    }

    /// Return `true` if the kind is fatal to the current method.
    ///
    /// `ClassRelationshipRecordRequired` is a deferred verdict, not a failure.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        !matches!(self, ErrorKind::ClassRelationshipRecordRequired)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

/// The callee triple captured for call-site failures.
///
/// Captured before the final error code is set so the eventual message can name the callee even
/// though the call has been popped from the live frame.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MethodTriple {
    /// Internal name of the class owning the member.
    pub class_name: String,
    /// Member name.
    pub name: String,
    /// Member descriptor.
    pub descriptor: String,
}

impl std::fmt::Display for MethodTriple {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}{}", self.class_name, self.name, self.descriptor)
    }
}

/// A latched record of the first verification failure.
#[derive(Clone, Debug, PartialEq)]
pub struct ErrorDetail {
    /// The failure kind.
    pub kind: ErrorKind,
    /// Bytecode offset of the failing instruction, when known.
    pub pc: Option<u32>,
    /// Slot index on the live frame (locals first, then operand stack).
    pub frame_position: Option<usize>,
    /// Index of the recorded frame involved in a map mismatch.
    pub target_frame_index: Option<usize>,
    /// The type the instruction or recorded frame required.
    pub expected: Option<TypeWord>,
    /// The type actually found.
    pub found: Option<TypeWord>,
    /// Auxiliary type slot, e.g. the companion half of a wide type when the failure is on the
    /// second slot of a long/double pair.
    pub temp_data: Option<TypeWord>,
    /// The callee triple for invoke and argument failures.
    pub method_triple: Option<MethodTriple>,
}

impl ErrorDetail {
    /// Create a detail record for a failure kind.
    #[must_use]
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            pc: None,
            frame_position: None,
            target_frame_index: None,
            expected: None,
            found: None,
            temp_data: None,
            method_triple: None,
        }
    }

    /// Set the bytecode offset.
    #[must_use]
    pub fn at(mut self, pc: u32) -> Self {
        self.pc = Some(pc);
        self
    }

    /// Set the slot index on the live frame.
    #[must_use]
    pub fn slot(mut self, frame_position: usize) -> Self {
        self.frame_position = Some(frame_position);
        self
    }

    /// Set the recorded frame index.
    #[must_use]
    pub fn target_frame(mut self, index: usize) -> Self {
        self.target_frame_index = Some(index);
        self
    }

    /// Set the expected type.
    #[must_use]
    pub fn expected(mut self, expected: TypeWord) -> Self {
        self.expected = Some(expected);
        self
    }

    /// Set the found type.
    #[must_use]
    pub fn found(mut self, found: TypeWord) -> Self {
        self.found = Some(found);
        self
    }

    /// Set the auxiliary type slot.
    #[must_use]
    pub fn temp(mut self, temp_data: TypeWord) -> Self {
        self.temp_data = Some(temp_data);
        self
    }

    /// Set the callee triple.
    #[must_use]
    pub fn callee(
        mut self,
        class_name: impl Into<String>,
        name: impl Into<String>,
        descriptor: impl Into<String>,
    ) -> Self {
        self.method_triple = Some(MethodTriple {
            class_name: class_name.into(),
            name: name.into(),
            descriptor: descriptor.into(),
        });
        self
    }
}

impl std::fmt::Display for ErrorDetail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(pc) = self.pc {
            write!(f, ", pc={pc}")?;
        }
        if let Some(slot) = self.frame_position {
            write!(f, ", slot={slot}")?;
        }
        if let Some(index) = self.target_frame_index {
            write!(f, ", frame={index}")?;
        }
        if let Some(expected) = self.expected {
            write!(f, ", expected={expected:?}")?;
        }
        if let Some(found) = self.found {
            write!(f, ", found={found:?}")?;
        }
        if let Some(triple) = &self.method_triple {
            write!(f, ", callee={triple}")?;
        }
        Ok(())
    }
}

/// Errors that can occur when verifying a method
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum VerifyError {
    /// Indicates a verification failure with a latched detail record.
    #[error("VerifyError: {0}")]
    Verification(ErrorDetail),
    /// A class required by an assignability query could not be loaded.
    #[error("ClassLoadingError: {0}")]
    ClassLoading(String),
    /// The resolver ran out of memory; distinct from every verification kind.
    #[error("OutOfMemoryError during verification")]
    OutOfMemory,
    /// An error surfaced by the ROM class model.
    #[error(transparent)]
    RomClass(#[from] cortado_romclass::Error),
    /// An error occurred while trying to convert a number
    #[error(transparent)]
    TryFromIntError(#[from] std::num::TryFromIntError),
}

impl VerifyError {
    /// The latched error detail, if this is a verification failure.
    #[must_use]
    pub fn detail(&self) -> Option<&ErrorDetail> {
        match self {
            VerifyError::Verification(detail) => Some(detail),
            _ => None,
        }
    }

    /// The failure kind, if this is a verification failure.
    #[must_use]
    pub fn kind(&self) -> Option<ErrorKind> {
        self.detail().map(|detail| detail.kind)
    }
}

impl From<ErrorDetail> for VerifyError {
    fn from(detail: ErrorDetail) -> Self {
        VerifyError::Verification(detail)
    }
}

impl From<ErrorKind> for VerifyError {
    fn from(kind: ErrorKind) -> Self {
        VerifyError::Verification(ErrorDetail::new(kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detail_builder() {
        let detail = ErrorDetail::new(ErrorKind::IncompatibleType)
            .at(42)
            .slot(2)
            .expected(TypeWord::int())
            .found(TypeWord::top());
        assert_eq!(detail.kind, ErrorKind::IncompatibleType);
        assert_eq!(detail.pc, Some(42));
        assert_eq!(detail.frame_position, Some(2));
        assert_eq!(detail.expected, Some(TypeWord::int()));
        assert_eq!(detail.found, Some(TypeWord::top()));
    }

    #[test]
    fn test_fatal_kinds() {
        assert!(ErrorKind::IncompatibleType.is_fatal());
        assert!(ErrorKind::StackUnderflow.is_fatal());
        assert!(!ErrorKind::ClassRelationshipRecordRequired.is_fatal());
    }

    #[test]
    fn test_error_from_kind() {
        let error = VerifyError::from(ErrorKind::StackUnderflow);
        assert_eq!(error.kind(), Some(ErrorKind::StackUnderflow));
    }

    #[test]
    fn test_display_names_callee() {
        let detail = ErrorDetail::new(ErrorKind::ArgumentsMismatch).at(7).callee(
            "java/lang/String",
            "charAt",
            "(I)C",
        );
        let rendered = VerifyError::from(detail).to_string();
        assert!(rendered.contains("pc=7"));
        assert!(rendered.contains("java/lang/String.charAt(I)C"));
    }

    #[test]
    fn test_oom_is_distinct() {
        let error = VerifyError::OutOfMemory;
        assert_eq!(error.kind(), None);
        assert!(error.detail().is_none());
    }
}
