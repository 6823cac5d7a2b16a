//! # cortado ROM class model
//!
//! The read-only, pre-parsed class representation consumed by the cortado bytecode verifier.
//!
//! A [`RomClass`] is the result of class file parsing and structural verification done upstream:
//! a constant pool with typed accessors, field and method descriptors, access flags, and a
//! method table. Method bytecode and the optional `StackMapTable` attribute are carried as raw
//! big-endian byte regions; the verifier decodes those itself with endian-aware readers so the
//! same code runs on little-endian hosts.
//!
//! This crate deliberately does *not* parse class files; it models the contract between the
//! static verifier and the bytecode verifier.

#![forbid(unsafe_code)]
#![allow(dead_code)]
#![deny(clippy::pedantic)]
#![deny(clippy::unwrap_in_result)]
#![deny(clippy::unwrap_used)]

mod base_type;
mod class;
mod constant;
mod constant_pool;
mod descriptor;
mod error;
mod flags;
mod method;

pub use base_type::BaseType;
pub use class::{RomClass, STACK_MAP_MAJOR_VERSION};
pub use constant::Constant;
pub use constant_pool::ConstantPool;
pub use descriptor::FieldType;
pub use error::{Error, Result};
pub use flags::{ClassAccessFlags, MethodAccessFlags};
pub use method::{ExceptionTableEntry, RomMethod};
