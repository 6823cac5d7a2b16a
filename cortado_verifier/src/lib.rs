//! # cortado bytecode verifier
//!
//! A two-pass, per-method bytecode verifier for JVM-family class files, operating on the
//! read-only [`cortado_romclass`] model:
//!
//! 1. **Stack-map synthesis** (`inference`): iterative dataflow over the control-flow graph
//!    builds an abstract frame at every branch target by merging predecessors until fixpoint.
//!    Used when a method has no `StackMapTable`, or when the attribute is ignored.
//! 2. **Linear checking** (`checker`): a single pass simulates every instruction and, at each
//!    map point, matches the live frame against the recorded frame — declared by the class
//!    file or synthesised by pass 1.
//!
//! Around the passes: a packed type-word lattice with a pluggable [`ClassResolver`] for
//! hierarchy queries, deferred relationship recording for link-time rechecking, a structured
//! error-detail record latched at the first failure, and a driver with the legacy
//! synthesis retry for pre-`StackMapTable` classes.
//!
//! # Usage
//!
//! ```rust,ignore
//! use cortado_verifier::{Verifier, VerifierConfig};
//!
//! let verifier = Verifier::new(VerifierConfig::parse("verify:verbose")?);
//! let outcome = verifier.verify_class(&rom_class, &resolver)?;
//! if let Some(failure) = outcome.first_error() {
//!     eprintln!("{failure:?}");
//! }
//! ```

#![forbid(unsafe_code)]
#![allow(dead_code)]
#![deny(clippy::pedantic)]
#![deny(clippy::unwrap_in_result)]
#![deny(clippy::unwrap_used)]

mod checker;
mod config;
mod control_flow;
mod diagnostics;
mod driver;
mod error;
mod frame;
mod handlers;
mod inference;
mod lattice;
mod names;
mod opcodes;
mod resolver;
mod stackmap;
#[cfg(test)]
pub(crate) mod test_support;
mod types;

pub use config::{InvalidOption, VerifierConfig, VerifierFlags};
pub use diagnostics::{TraceEntry, VerificationTrace, render_detail};
pub use driver::{ClassVerification, MethodVerification, VerificationPath, Verifier};
pub use error::{ErrorDetail, ErrorKind, MethodTriple, Result, VerifyError};
pub use frame::Frame;
pub use lattice::{
    Assignable, Merge, TypeEnv, is_assignable, is_class_assignable, merge_classes, merge_types,
};
pub use names::{
    CLONEABLE_CLASS_NAME, ClassIndex, ClassNames, SERIALIZABLE_CLASS_NAME,
    WELL_KNOWN_CLASS_NAMES,
};
pub use resolver::{
    ClassInfo, ClassResolver, LinkRecords, Resolution, ResolverError, ResolverResult,
};
pub use types::{BaseKind, MAX_ARITY, TypeKind, TypeWord};
