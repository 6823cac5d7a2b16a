//! # Class-Name Interning
//!
//! Maps internal class names to the dense indices stored inside packed type words. The table is
//! append-only and per class: it is rebuilt for every class verified, with the well-known
//! classes preloaded at fixed indices before any per-method work.

use ahash::RandomState;
use indexmap::IndexSet;
use std::sync::Arc;

use crate::error::Result;

/// Internal name of `java/lang/Cloneable`, one of the two array marker interfaces.
pub const CLONEABLE_CLASS_NAME: &str = "java/lang/Cloneable";

/// Internal name of `java/io/Serializable`, the other array marker interface.
pub const SERIALIZABLE_CLASS_NAME: &str = "java/io/Serializable";

/// The classes preloaded at indices 0..6, in this order.
pub const WELL_KNOWN_CLASS_NAMES: [&str; 6] = [
    "java/lang/Object",
    "java/lang/String",
    "java/lang/Throwable",
    "java/lang/Class",
    "java/lang/invoke/MethodType",
    "java/lang/invoke/MethodHandle",
];

/// A dense index into the class-name table.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ClassIndex(u32);

impl ClassIndex {
    /// `java/lang/Object`
    pub const OBJECT: ClassIndex = ClassIndex(0);
    /// `java/lang/String`
    pub const STRING: ClassIndex = ClassIndex(1);
    /// `java/lang/Throwable`
    pub const THROWABLE: ClassIndex = ClassIndex(2);
    /// `java/lang/Class`
    pub const CLASS: ClassIndex = ClassIndex(3);
    /// `java/lang/invoke/MethodType`
    pub const METHOD_TYPE: ClassIndex = ClassIndex(4);
    /// `java/lang/invoke/MethodHandle`
    pub const METHOD_HANDLE: ClassIndex = ClassIndex(5);

    /// Create an index from its raw value.
    #[must_use]
    pub fn new(index: u32) -> Self {
        Self(index)
    }

    /// The raw index value.
    #[must_use]
    pub fn as_u32(self) -> u32 {
        self.0
    }
}

/// The growable, append-only class-name table.
///
/// Lookup and insertion share one hashed probe; indices are stable for the lifetime of the
/// table. Names are reference-counted so type formatting and the resolver can share them
/// without copying.
#[derive(Debug)]
pub struct ClassNames {
    names: IndexSet<Arc<str>, RandomState>,
}

impl ClassNames {
    /// Create a table with the well-known classes preloaded at indices 0..6.
    #[must_use]
    pub fn new() -> Self {
        let mut names = IndexSet::with_capacity_and_hasher(16, RandomState::new());
        for name in WELL_KNOWN_CLASS_NAMES {
            names.insert(Arc::from(name));
        }
        Self { names }
    }

    /// Intern a class name, returning its dense index.
    ///
    /// # Errors
    /// Returns an error if the table exceeds the `u32` index space.
    pub fn intern(&mut self, name: &str) -> Result<ClassIndex> {
        if let Some(index) = self.names.get_index_of(name) {
            return Ok(ClassIndex(u32::try_from(index)?));
        }
        let (index, _) = self.names.insert_full(Arc::from(name));
        Ok(ClassIndex(u32::try_from(index)?))
    }

    /// Look up a previously interned name.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<ClassIndex> {
        self.names
            .get_index_of(name)
            .and_then(|index| u32::try_from(index).ok())
            .map(ClassIndex)
    }

    /// The name at an index; `<unresolved>` if the index was never interned.
    #[must_use]
    pub fn name(&self, index: ClassIndex) -> &str {
        self.names
            .get_index(index.0 as usize)
            .map_or("<unresolved>", |name| name.as_ref())
    }

    /// The shared name at an index, if interned.
    #[must_use]
    pub fn shared_name(&self, index: ClassIndex) -> Option<Arc<str>> {
        self.names.get_index(index.0 as usize).cloned()
    }

    /// The number of interned names.
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Always `false`: the well-known classes are preloaded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl Default for ClassNames {
    fn default() -> Self {
        Self::new()
    }
}
