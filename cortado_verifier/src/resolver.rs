//! # Class Resolution Interface
//!
//! The verifier never loads classes itself; every hierarchy question goes through the
//! [`ClassResolver`] trait. A resolver may answer from loaded classes, decline because a class
//! is inaccessible, or report that a class is not yet loaded — in which case the query is
//! recorded for a link-time recheck instead of forcing a load.
//!
//! Calling into the resolver is the only point at which control leaves the verifier; it may
//! block arbitrarily. A resolver that transitively re-enters verification must do so on a
//! separate verifier instance or after the current class completes.

use cortado_romclass::ClassAccessFlags;
use hashbrown::HashSet;

use crate::error::VerifyError;

/// Result alias for resolver calls.
pub type ResolverResult<T> = core::result::Result<T, ResolverError>;

/// Errors a resolver can raise.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ResolverError {
    /// The resolver ran out of memory; callers abort class preparation.
    #[error("out of memory while resolving a class")]
    OutOfMemory,
    /// Class loading failed for the named class.
    #[error("failed to load class {0}")]
    LoadFailed(String),
}

impl From<ResolverError> for VerifyError {
    fn from(error: ResolverError) -> Self {
        match error {
            ResolverError::OutOfMemory => VerifyError::OutOfMemory,
            ResolverError::LoadFailed(name) => VerifyError::ClassLoading(name),
        }
    }
}

/// The outcome of a class query.
#[derive(Clone, Debug, PartialEq)]
pub enum Resolution {
    /// The class is loaded; hierarchy data is available.
    Loaded(ClassInfo),
    /// The class exists but the current context may not use it.
    Inaccessible,
    /// The class has not been loaded; the query should be deferred to link time.
    NotYetLoaded,
}

/// Hierarchy data for a loaded class.
///
/// The superchain runs from the class itself up to `java/lang/Object`, so
/// `superchain.len() == depth + 1` and subtype tests are constant-time.
#[derive(Clone, Debug, PartialEq)]
pub struct ClassInfo {
    modifiers: ClassAccessFlags,
    superchain: Vec<String>,
}

impl ClassInfo {
    /// Create hierarchy data from modifiers and a self-to-Object superchain.
    ///
    /// The chain must be non-empty and start with the class's own name.
    #[must_use]
    pub fn new(modifiers: ClassAccessFlags, superchain: Vec<String>) -> Self {
        debug_assert!(!superchain.is_empty());
        Self {
            modifiers,
            superchain,
        }
    }

    /// The class's own internal name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.superchain.first().map_or("", String::as_str)
    }

    /// The class modifiers.
    #[must_use]
    pub fn modifiers(&self) -> ClassAccessFlags {
        self.modifiers
    }

    /// Depth in the hierarchy; 0 for `java/lang/Object`.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.superchain.len().saturating_sub(1)
    }

    /// The superchain from the class itself up to `java/lang/Object`.
    #[must_use]
    pub fn superchain(&self) -> &[String] {
        &self.superchain
    }

    /// The direct superclass name; `None` for `java/lang/Object`.
    #[must_use]
    pub fn superclass(&self) -> Option<&str> {
        self.superchain.get(1).map(String::as_str)
    }

    /// `true` if the class is an interface.
    #[must_use]
    pub fn is_interface(&self) -> bool {
        self.modifiers.contains(ClassAccessFlags::INTERFACE)
    }

    /// Constant-time test over superchain and depth: is `self` the same class as `other` or
    /// one of its superclasses?
    #[must_use]
    pub fn is_same_or_superclass_of(&self, other: &ClassInfo) -> bool {
        let Some(gap) = other.depth().checked_sub(self.depth()) else {
            return false;
        };
        other
            .superchain
            .get(gap)
            .is_some_and(|name| name == self.name())
    }
}

/// The class-hierarchy oracle the verifier consults.
pub trait ClassResolver {
    /// Resolve a class by internal name.
    ///
    /// May block on class loading. Returning [`Resolution::NotYetLoaded`] defers the query to
    /// link time via the relationship record table.
    ///
    /// # Errors
    /// Returns an error if loading fails or memory is exhausted.
    fn get_class(&self, name: &str) -> ResolverResult<Resolution>;

    /// Whether the named member, found by walking the declaring class and its superclasses,
    /// is actually declared `protected`.
    ///
    /// The default assumes it is, which keeps the protected-access check conservative for
    /// resolvers that do not expose member tables.
    ///
    /// # Errors
    /// Returns an error if the walk requires a class that cannot be loaded.
    fn is_protected_member(
        &self,
        _class_name: &str,
        _member_name: &str,
        _descriptor: &str,
    ) -> ResolverResult<bool> {
        Ok(true)
    }
}

/// The per-class table of deferred `(subclass, superclass)` relationship queries.
///
/// Every pair recorded here will be posed to the resolver again at class link time; a negative
/// answer there produces the same error a direct negative answer would have produced during
/// verification.
#[derive(Debug, Default)]
pub struct LinkRecords {
    records: HashSet<(String, String), ahash::RandomState>,
}

impl LinkRecords {
    /// Create an empty record table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a deferred relationship query. Returns `true` if the pair is new.
    pub fn record(&mut self, subclass: &str, superclass: &str) -> bool {
        self.records
            .insert((subclass.to_string(), superclass.to_string()))
    }

    /// `true` when no queries were deferred.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// The number of deferred queries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// `true` if the pair was deferred.
    #[must_use]
    pub fn contains(&self, subclass: &str, superclass: &str) -> bool {
        self.records
            .contains(&(subclass.to_string(), superclass.to_string()))
    }

    /// Iterate over the deferred pairs.
    pub fn iter(&self) -> impl Iterator<Item = &(String, String)> {
        self.records.iter()
    }

    /// Drain the table into an owned list.
    #[must_use]
    pub fn take(&mut self) -> Vec<(String, String)> {
        self.records.drain().collect()
    }

    /// Forget all deferred queries.
    pub fn clear(&mut self) {
        self.records.clear();
    }
}
