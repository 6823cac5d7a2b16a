//! Error handling for the cortado ROM class model
//!
//! This module provides the error types and result alias used throughout the ROM class model.

/// cortado ROM class result type
///
/// This is a type alias for the standard library's [`Result`](core::result::Result) type with the
/// error type defaulting to [`Error`].
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Errors that can occur when accessing a ROM class
///
/// The ROM class is produced by an upstream static verifier and is structurally sound by
/// construction; these errors cover the residual failure modes of typed access (wrong constant
/// kind at an index, malformed descriptors for names synthesised at verify time, and the like).
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum Error {
    /// Invalid base type code in a descriptor
    #[error("Invalid base type code {0}")]
    InvalidBaseTypeCode(char),
    /// Invalid constant pool index
    #[error("Invalid constant pool index {0}")]
    InvalidConstantPoolIndex(u16),
    /// The constant at an index is not of the requested kind
    #[error("Invalid constant pool index type {0}")]
    InvalidConstantPoolIndexType(u16),
    /// Invalid field type descriptor
    #[error("Invalid field type descriptor {0}")]
    InvalidFieldTypeDescriptor(String),
    /// An error occurred while parsing a method descriptor
    #[error("Invalid method descriptor: {0}")]
    InvalidMethodDescriptor(String),
    /// An error occurred while trying to convert a number
    #[error(transparent)]
    TryFromIntError(#[from] std::num::TryFromIntError),
}
