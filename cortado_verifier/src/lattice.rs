//! # Type Lattice
//!
//! Subtype and join queries over packed type words: `is_assignable` decides whether one
//! abstract type may stand in for another, and `merge_types` computes the slot-wise least
//! upper bound used at control-flow joins.
//!
//! Both consult the [`ClassResolver`] for hierarchy data. When the relationship verifier is
//! enabled (or a class is simply not loaded yet), queries that would force a class load are
//! instead recorded in the [`LinkRecords`] table and answered optimistically; the recorded
//! query is posed again at link time, and a negative answer there produces the same error a
//! direct negative answer would have produced here.

use crate::config::VerifierConfig;
use crate::error::Result;
use crate::names::{
    CLONEABLE_CLASS_NAME, ClassIndex, ClassNames, SERIALIZABLE_CLASS_NAME,
};
use crate::resolver::{ClassInfo, ClassResolver, LinkRecords, Resolution};
use crate::types::{TypeKind, TypeWord};

/// The verdict of an assignability query.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Assignable {
    /// The source type may stand in for the target type.
    Yes,
    /// The types are incompatible.
    No,
    /// The query was deferred: a `(subclass, superclass)` pair was recorded for link time and
    /// the answer is optimistically positive until then.
    NeedsLinkRecord,
}

impl Assignable {
    /// `true` unless the verdict is a definite `No`.
    #[must_use]
    pub fn is_compatible(self) -> bool {
        !matches!(self, Assignable::No)
    }
}

/// The lattice's view of shared verification state: the name table, the resolver, the option
/// flags, and the deferred-query table.
///
/// Threaded explicitly through every lattice and simulation call; there is no global state.
pub struct TypeEnv<'a> {
    pub names: &'a mut ClassNames,
    pub resolver: &'a dyn ClassResolver,
    pub config: &'a VerifierConfig,
    pub link_records: &'a mut LinkRecords,
}

impl std::fmt::Debug for TypeEnv<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeEnv")
            .field("names", &self.names.len())
            .field("link_records", &self.link_records.len())
            .finish_non_exhaustive()
    }
}

impl<'a> TypeEnv<'a> {
    /// Create a lattice environment over shared verification state.
    pub fn new(
        names: &'a mut ClassNames,
        resolver: &'a dyn ClassResolver,
        config: &'a VerifierConfig,
        link_records: &'a mut LinkRecords,
    ) -> Self {
        Self {
            names,
            resolver,
            config,
            link_records,
        }
    }

    /// Resolve hierarchy data for an interned class.
    ///
    /// `Ok(None)` means the class is not yet loaded and the query must be deferred.
    fn class_info(&mut self, class: ClassIndex) -> Result<Option<ClassInfo>> {
        let name = self.names.name(class).to_string();
        match self.resolver.get_class(&name)? {
            Resolution::Loaded(info) => Ok(Some(info)),
            Resolution::Inaccessible => Err(crate::error::VerifyError::ClassLoading(name)),
            Resolution::NotYetLoaded => Ok(None),
        }
    }

    /// Record a deferred relationship query.
    fn defer(&mut self, source: TypeWord, target: TypeWord) -> Assignable {
        let subclass = self.describe(source);
        let superclass = self.describe(target);
        self.link_records.record(&subclass, &superclass);
        Assignable::NeedsLinkRecord
    }

    fn describe(&self, word: TypeWord) -> String {
        word.class_index()
            .map_or_else(|| word.format(self.names), |class| {
                self.names.name(class).to_string()
            })
    }
}

/// Decide whether `source` may stand in for `target`.
///
/// The rules run in order; class loading happens only in the final interface and subclass
/// checks, and only when the relationship verifier is disabled. For assignments, interfaces
/// are treated like `java/lang/Object`.
///
/// # Errors
/// Returns an error if the resolver fails or runs out of memory.
pub fn is_assignable(env: &mut TypeEnv<'_>, source: TypeWord, target: TypeWord) -> Result<Assignable> {
    assignable(env, source, target, true)
}

/// The receiver variant of [`is_assignable`]: an interface target is not a free pass, the
/// source class must actually sit under the target in the superclass chain.
///
/// Used for `getfield`/`putfield`/`invokevirtual`/`invokespecial` receivers, where the
/// declared class names a concrete class the receiver must descend from.
///
/// # Errors
/// Returns an error if the resolver fails or runs out of memory.
pub fn is_class_assignable(
    env: &mut TypeEnv<'_>,
    source: TypeWord,
    target: TypeWord,
) -> Result<Assignable> {
    assignable(env, source, target, false)
}

fn assignable(
    env: &mut TypeEnv<'_>,
    source: TypeWord,
    target: TypeWord,
    interface_permissive: bool,
) -> Result<Assignable> {
    // Identical words are trivially assignable.
    if source == target {
        return Ok(Assignable::Yes);
    }

    // null is assignable to every reference.
    if source.is_null() {
        return Ok(if target.is_reference() {
            Assignable::Yes
        } else {
            Assignable::No
        });
    }

    // Base types and uninitialized values only match themselves.
    if source.is_base() || source.is_special() {
        return Ok(Assignable::No);
    }

    if target == TypeWord::java_lang_object() {
        return Ok(Assignable::Yes);
    }

    // Only null is assignable to null, and nothing further matches a non-reference target.
    if target.is_null() || target.is_base() || target.is_special() {
        return Ok(Assignable::No);
    }

    let source_arity = source.arity();
    let target_arity = target.arity();

    if target_arity > source_arity {
        return Ok(Assignable::No);
    }

    if target_arity < source_arity {
        // Casting away arity: the target element class must be Object or one of the two
        // array marker interfaces.
        if matches!(target.kind(), TypeKind::BaseArray { .. }) {
            return Ok(Assignable::No);
        }
        let Some(target_class) = target.class_index() else {
            return Ok(Assignable::No);
        };
        if target_class == ClassIndex::OBJECT {
            return Ok(Assignable::Yes);
        }
        let target_name = env.names.name(target_class);
        if target_name == CLONEABLE_CLASS_NAME || target_name == SERIALIZABLE_CLASS_NAME {
            return interface_query(env, source, target, target_class);
        }
        return Ok(Assignable::No);
    }

    // Equal arity: base-element arrays must have been identical.
    if matches!(source.kind(), TypeKind::BaseArray { .. })
        || matches!(target.kind(), TypeKind::BaseArray { .. })
    {
        return Ok(Assignable::No);
    }

    let Some(target_class) = target.class_index() else {
        return Ok(Assignable::No);
    };
    if target_class == ClassIndex::OBJECT {
        return Ok(Assignable::Yes);
    }
    let Some(source_class) = source.class_index() else {
        return Ok(Assignable::No);
    };

    if env.config.class_relationship_verifier() {
        return Ok(env.defer(source, target));
    }

    let Some(target_info) = env.class_info(target_class)? else {
        return Ok(env.defer(source, target));
    };
    if interface_permissive && target_info.is_interface() {
        return Ok(Assignable::Yes);
    }

    let Some(source_info) = env.class_info(source_class)? else {
        return Ok(env.defer(source, target));
    };
    Ok(if target_info.is_same_or_superclass_of(&source_info) {
        Assignable::Yes
    } else {
        Assignable::No
    })
}

/// Answer whether the target class is an interface, deferring when it cannot be loaded.
fn interface_query(
    env: &mut TypeEnv<'_>,
    source: TypeWord,
    target: TypeWord,
    target_class: ClassIndex,
) -> Result<Assignable> {
    if env.config.class_relationship_verifier() {
        return Ok(env.defer(source, target));
    }
    match env.class_info(target_class)? {
        Some(info) if info.is_interface() => Ok(Assignable::Yes),
        Some(_) => Ok(Assignable::No),
        None => Ok(env.defer(source, target)),
    }
}

/// The outcome of merging a source type into a recorded target slot.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Merge {
    /// The target slot already covers the source.
    Unchanged,
    /// The target slot must widen to the given type; the owner needs a rewalk.
    Widened(TypeWord),
}

/// Merge a source reference into a recorded target reference slot, computing the least upper
/// bound in the class hierarchy.
///
/// Both operands must be reference words (`null`, objects, or base arrays); base scalars and
/// uninitialized tags are widened to `top` by the frame merge before this is reached.
///
/// # Errors
/// Returns an error if the resolver fails or runs out of memory.
pub fn merge_types(env: &mut TypeEnv<'_>, target: TypeWord, source: TypeWord) -> Result<Merge> {
    // Equal or already-covering targets need no change; a deferred answer is optimistic by
    // construction, the recorded pair settles it at link time.
    if is_assignable(env, source, target)?.is_compatible() {
        return Ok(Merge::Unchanged);
    }

    // null always loses to an object.
    if target.is_null() {
        return Ok(Merge::Widened(source));
    }

    // Base-element arrays decay to object arrays one dimension down.
    let source = decay_base_array(source);
    let target = decay_base_array(target);

    let source_arity = source.arity();
    let target_arity = target.arity();

    if source_arity != target_arity {
        // Different arity joins at Object with the minimum arity.
        let arity = source_arity.min(target_arity);
        return Ok(Merge::Widened(TypeWord::object(ClassIndex::OBJECT, arity)));
    }

    let (Some(source_class), Some(target_class)) = (source.class_index(), target.class_index())
    else {
        return Ok(Merge::Widened(TypeWord::object(
            ClassIndex::OBJECT,
            source_arity,
        )));
    };

    let common = merge_classes(env, source_class, target_class)?;
    Ok(Merge::Widened(TypeWord::object(common, source_arity)))
}

/// Walk both superchains to the meeting class.
///
/// Keeps the deeper chain stepping until depths match, then steps both until the names agree.
/// A recoverable load failure joins at `java/lang/Object`.
///
/// # Errors
/// Returns an error if the resolver reports memory exhaustion.
pub fn merge_classes(
    env: &mut TypeEnv<'_>,
    first: ClassIndex,
    second: ClassIndex,
) -> Result<ClassIndex> {
    if first == second {
        return Ok(first);
    }

    if env.config.class_relationship_verifier() {
        // Joining without loads is not possible; record the pair and fall back to the safe
        // upper bound, which the link-time recheck refines.
        let subclass = env.names.name(first).to_string();
        let superclass = env.names.name(second).to_string();
        env.link_records.record(&subclass, &superclass);
        return Ok(ClassIndex::OBJECT);
    }

    let (Some(first_info), Some(second_info)) =
        (env.class_info(first)?, env.class_info(second)?)
    else {
        return Ok(ClassIndex::OBJECT);
    };

    let first_chain = first_info.superchain();
    let second_chain = second_info.superchain();

    // Walk both chains from the Object end; the last matching name is the meeting class.
    let mut matched: Option<&str> = None;
    let mut first_at = first_chain.len();
    let mut second_at = second_chain.len();
    while first_at > 0 && second_at > 0 && first_chain[first_at - 1] == second_chain[second_at - 1]
    {
        matched = Some(&first_chain[first_at - 1]);
        first_at -= 1;
        second_at -= 1;
    }

    match matched {
        Some(name) => env.names.intern(name),
        None => Ok(ClassIndex::OBJECT),
    }
}

fn decay_base_array(word: TypeWord) -> TypeWord {
    match word.kind() {
        TypeKind::BaseArray { arity, .. } => {
            TypeWord::object(ClassIndex::OBJECT, arity.saturating_sub(1))
        }
        _ => word,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockResolver;
    use crate::types::BaseKind;

    struct Env {
        names: ClassNames,
        resolver: MockResolver,
        config: VerifierConfig,
        link_records: LinkRecords,
    }

    impl Env {
        fn new() -> Self {
            Self {
                names: ClassNames::new(),
                resolver: MockResolver::new(),
                config: VerifierConfig::default(),
                link_records: LinkRecords::new(),
            }
        }

        fn recording() -> Self {
            let mut env = Self::new();
            env.config = VerifierConfig::default().with_class_relationship_verifier(true);
            env
        }

        fn env(&mut self) -> TypeEnv<'_> {
            TypeEnv::new(
                &mut self.names,
                &self.resolver,
                &self.config,
                &mut self.link_records,
            )
        }

        fn word(&mut self, class_name: &str) -> TypeWord {
            let class = self.names.intern(class_name).expect("intern");
            TypeWord::object(class, 0)
        }
    }

    #[test]
    fn test_reflexive() -> Result<()> {
        let mut fixture = Env::new();
        let string = fixture.word("java/lang/String");
        let mut env = fixture.env();
        assert_eq!(is_assignable(&mut env, string, string)?, Assignable::Yes);
        assert_eq!(
            is_assignable(&mut env, TypeWord::int(), TypeWord::int())?,
            Assignable::Yes
        );
        Ok(())
    }

    #[test]
    fn test_null_to_reference() -> Result<()> {
        let mut fixture = Env::new();
        let string = fixture.word("java/lang/String");
        let mut env = fixture.env();
        assert_eq!(
            is_assignable(&mut env, TypeWord::null(), string)?,
            Assignable::Yes
        );
        assert_eq!(
            is_assignable(&mut env, TypeWord::null(), TypeWord::base_array(BaseKind::Int, 1))?,
            Assignable::Yes
        );
        assert_eq!(
            is_assignable(&mut env, TypeWord::null(), TypeWord::int())?,
            Assignable::No
        );
        assert_eq!(
            is_assignable(&mut env, string, TypeWord::null())?,
            Assignable::No
        );
        Ok(())
    }

    #[test]
    fn test_base_and_special_only_match_themselves() -> Result<()> {
        let mut fixture = Env::new();
        let object = TypeWord::java_lang_object();
        let mut env = fixture.env();
        assert_eq!(
            is_assignable(&mut env, TypeWord::int(), object)?,
            Assignable::No
        );
        assert_eq!(
            is_assignable(&mut env, TypeWord::uninit_new(4), object)?,
            Assignable::No
        );
        assert_eq!(
            is_assignable(&mut env, TypeWord::uninit_this(ClassIndex::OBJECT), object)?,
            Assignable::No
        );
        Ok(())
    }

    #[test]
    fn test_everything_reaches_object() -> Result<()> {
        let mut fixture = Env::new();
        let string = fixture.word("java/lang/String");
        let object = TypeWord::java_lang_object();
        let mut env = fixture.env();
        assert_eq!(is_assignable(&mut env, string, object)?, Assignable::Yes);
        assert_eq!(
            is_assignable(&mut env, TypeWord::base_array(BaseKind::Int, 1), object)?,
            Assignable::Yes
        );
        Ok(())
    }

    #[test]
    fn test_subclass_via_superchain() -> Result<()> {
        let mut fixture = Env::new();
        let exception = fixture.word("java/lang/Exception");
        let throwable = fixture.word("java/lang/Throwable");
        let string = fixture.word("java/lang/String");
        let mut env = fixture.env();
        assert_eq!(
            is_assignable(&mut env, exception, throwable)?,
            Assignable::Yes
        );
        assert_eq!(
            is_assignable(&mut env, throwable, exception)?,
            Assignable::No
        );
        assert_eq!(is_assignable(&mut env, string, throwable)?, Assignable::No);
        Ok(())
    }

    #[test]
    fn test_transitive_through_hierarchy() -> Result<()> {
        let mut fixture = Env::new();
        let sub = fixture.word("com/example/SubWidget");
        let widget = fixture.word("com/example/Widget");
        let object = TypeWord::java_lang_object();
        let mut env = fixture.env();
        assert_eq!(is_assignable(&mut env, sub, widget)?, Assignable::Yes);
        assert_eq!(is_assignable(&mut env, widget, object)?, Assignable::Yes);
        assert_eq!(is_assignable(&mut env, sub, object)?, Assignable::Yes);
        Ok(())
    }

    #[test]
    fn test_array_arity_rules() -> Result<()> {
        let mut fixture = Env::new();
        let string_1 = {
            let class = fixture.names.intern("java/lang/String").expect("intern");
            TypeWord::object(class, 1)
        };
        let string_2 = string_1.with_arity(2);
        let object_1 = TypeWord::object(ClassIndex::OBJECT, 1);
        let mut env = fixture.env();

        // Higher-arity targets never accept lower-arity sources.
        assert_eq!(is_assignable(&mut env, string_1, string_2)?, Assignable::No);
        // Object at lower arity accepts any deeper array.
        assert_eq!(is_assignable(&mut env, string_2, object_1)?, Assignable::Yes);
        // Covariance at equal arity.
        assert_eq!(is_assignable(&mut env, string_1, object_1)?, Assignable::Yes);
        // Base arrays only match themselves.
        let ints = TypeWord::base_array(BaseKind::Int, 1);
        let floats = TypeWord::base_array(BaseKind::Float, 1);
        assert_eq!(is_assignable(&mut env, ints, floats)?, Assignable::No);
        assert_eq!(is_assignable(&mut env, ints, string_1)?, Assignable::No);
        Ok(())
    }

    #[test]
    fn test_arrays_implement_marker_interfaces() -> Result<()> {
        let mut fixture = Env::new();
        let cloneable = fixture.word(CLONEABLE_CLASS_NAME);
        let serializable = fixture.word(SERIALIZABLE_CLASS_NAME);
        let ints = TypeWord::base_array(BaseKind::Int, 1);
        let mut env = fixture.env();
        assert_eq!(is_assignable(&mut env, ints, cloneable)?, Assignable::Yes);
        assert_eq!(
            is_assignable(&mut env, ints, serializable)?,
            Assignable::Yes
        );
        Ok(())
    }

    #[test]
    fn test_interface_target_is_permissive() -> Result<()> {
        let mut fixture = Env::new();
        let string = fixture.word("java/lang/String");
        let runnable = fixture.word("java/lang/Runnable");
        let mut env = fixture.env();
        assert_eq!(is_assignable(&mut env, string, runnable)?, Assignable::Yes);
        Ok(())
    }

    #[test]
    fn test_class_assignable_is_strict_about_interfaces() -> Result<()> {
        let mut fixture = Env::new();
        let object = fixture.word("java/lang/Object");
        let char_sequence = fixture.word("java/lang/CharSequence");
        let mut env = fixture.env();
        // The assignment rule treats the interface like Object.
        assert_eq!(
            is_assignable(&mut env, object, char_sequence)?,
            Assignable::Yes
        );
        // The receiver rule needs a real superclass relationship.
        assert_eq!(
            is_class_assignable(&mut env, object, char_sequence)?,
            Assignable::No
        );
        // Plain subclassing still passes the receiver rule.
        let exception = fixture.word("java/lang/Exception");
        let throwable = fixture.word("java/lang/Throwable");
        let mut env = fixture.env();
        assert_eq!(
            is_class_assignable(&mut env, exception, throwable)?,
            Assignable::Yes
        );
        Ok(())
    }

    #[test]
    fn test_record_only_defers() -> Result<()> {
        let mut fixture = Env::recording();
        let sub = fixture.word("com/example/SubWidget");
        let widget = fixture.word("com/example/Widget");
        let mut env = fixture.env();
        assert_eq!(
            is_assignable(&mut env, sub, widget)?,
            Assignable::NeedsLinkRecord
        );
        assert!(fixture
            .link_records
            .contains("com/example/SubWidget", "com/example/Widget"));
        Ok(())
    }

    #[test]
    fn test_merge_identical_unchanged() -> Result<()> {
        let mut fixture = Env::new();
        let string = fixture.word("java/lang/String");
        let mut env = fixture.env();
        assert_eq!(merge_types(&mut env, string, string)?, Merge::Unchanged);
        Ok(())
    }

    #[test]
    fn test_merge_null_adopts_source() -> Result<()> {
        let mut fixture = Env::new();
        let string = fixture.word("java/lang/String");
        let mut env = fixture.env();
        assert_eq!(
            merge_types(&mut env, TypeWord::null(), string)?,
            Merge::Widened(string)
        );
        // null into a reference slot needs no widening
        assert_eq!(merge_types(&mut env, string, TypeWord::null())?, Merge::Unchanged);
        Ok(())
    }

    #[test]
    fn test_merge_siblings_to_common_parent() -> Result<()> {
        let mut fixture = Env::new();
        let string = fixture.word("java/lang/String");
        let integer = fixture.word("java/lang/Integer");
        let mut env = fixture.env();
        assert_eq!(
            merge_types(&mut env, string, integer)?,
            Merge::Widened(TypeWord::java_lang_object())
        );
        Ok(())
    }

    #[test]
    fn test_merge_subclass_into_superclass_slot() -> Result<()> {
        let mut fixture = Env::new();
        let exception = fixture.word("java/lang/Exception");
        let throwable = fixture.word("java/lang/Throwable");
        let mut env = fixture.env();
        // Subclass source is covered by the superclass slot.
        assert_eq!(merge_types(&mut env, throwable, exception)?, Merge::Unchanged);
        // Superclass source widens the subclass slot.
        assert_eq!(
            merge_types(&mut env, exception, throwable)?,
            Merge::Widened(throwable)
        );
        Ok(())
    }

    #[test]
    fn test_merge_arity_mismatch() -> Result<()> {
        let mut fixture = Env::new();
        let string_2 = {
            let class = fixture.names.intern("java/lang/String").expect("intern");
            TypeWord::object(class, 2)
        };
        let string_1 = string_2.with_arity(1);
        let mut env = fixture.env();
        // String[][] merges into a String[] slot at Object[]... minimum arity is 1.
        assert_eq!(
            merge_types(&mut env, string_1, string_2)?,
            Merge::Widened(TypeWord::object(ClassIndex::OBJECT, 1))
        );
        Ok(())
    }

    #[test]
    fn test_merge_base_arrays_decay() -> Result<()> {
        let mut fixture = Env::new();
        let ints = TypeWord::base_array(BaseKind::Int, 1);
        let floats = TypeWord::base_array(BaseKind::Float, 1);
        let mut env = fixture.env();
        assert_eq!(
            merge_types(&mut env, ints, floats)?,
            Merge::Widened(TypeWord::java_lang_object())
        );
        let ints_2 = TypeWord::base_array(BaseKind::Int, 2);
        let floats_2 = TypeWord::base_array(BaseKind::Float, 2);
        assert_eq!(
            merge_types(&mut env, ints_2, floats_2)?,
            Merge::Widened(TypeWord::object(ClassIndex::OBJECT, 1))
        );
        Ok(())
    }

    #[test]
    fn test_merge_classes_meeting_point() -> Result<()> {
        let mut fixture = Env::new();
        let exception = fixture.names.intern("java/lang/Exception").expect("intern");
        let error = fixture.names.intern("java/lang/Error").expect("intern");
        let mut env = fixture.env();
        let common = merge_classes(&mut env, exception, error)?;
        assert_eq!(env.names.name(common), "java/lang/Throwable");
        Ok(())
    }

    #[test]
    fn test_merge_classes_is_associative_over_one_hierarchy() -> Result<()> {
        let mut fixture = Env::new();
        let runtime = fixture
            .names
            .intern("java/lang/RuntimeException")
            .expect("intern");
        let exception = fixture.names.intern("java/lang/Exception").expect("intern");
        let error = fixture.names.intern("java/lang/Error").expect("intern");
        let mut env = fixture.env();

        let left = {
            let ab = merge_classes(&mut env, runtime, exception)?;
            merge_classes(&mut env, ab, error)?
        };
        let right = {
            let bc = merge_classes(&mut env, exception, error)?;
            merge_classes(&mut env, runtime, bc)?
        };
        assert_eq!(left, right);
        assert_eq!(env.names.name(left), "java/lang/Throwable");
        Ok(())
    }
}
