//! # Packed Type Words
//!
//! A [`TypeWord`] encodes one abstract verification type in a single `u64` for cache density:
//! base-type bits in the low byte, tag bits for base arrays and the two uninitialized states,
//! a class-name index in the middle bits, and the array dimension count in the high bits.
//!
//! Code never picks the word apart by hand; [`TypeWord::kind`] unpacks it into the
//! [`TypeKind`] tagged sum for matching, and the constructors pack it back. The invariants:
//!
//! - `null` is assignable to every reference type
//! - `top` is the join of incompatible types and the second half of every long/double slot
//! - a word with an uninitialized tag merges only with itself

use std::fmt;

use cortado_romclass::{BaseType, FieldType};

use crate::error::{ErrorKind, Result, VerifyError};
use crate::names::{ClassIndex, ClassNames};

/// Maximum array dimension count the arity field can carry.
pub const MAX_ARITY: u16 = 255;

const BASE_MASK: u64 = 0x00ff;
const BASE_TOP: u64 = 1;
const BASE_INT: u64 = 2;
const BASE_FLOAT: u64 = 3;
const BASE_LONG: u64 = 4;
const BASE_DOUBLE: u64 = 5;
const BASE_NULL: u64 = 6;
const BASE_BYTE: u64 = 7;
const BASE_CHAR: u64 = 8;
const BASE_SHORT: u64 = 9;
const BASE_BOOL: u64 = 10;

const TAG_BASE_ARRAY: u64 = 1 << 8;
const TAG_UNINIT_NEW: u64 = 1 << 9;
const TAG_UNINIT_THIS: u64 = 1 << 10;
const TAG_MASK: u64 = TAG_BASE_ARRAY | TAG_UNINIT_NEW | TAG_UNINIT_THIS;

const INDEX_SHIFT: u32 = 16;
const INDEX_MASK: u64 = 0xffff_ffff << INDEX_SHIFT;
const ARITY_SHIFT: u32 = 48;

/// The primitive kinds a base scalar or base-array element can have.
///
/// `boolean`, `byte`, `char`, and `short` only occur as array element kinds; as scalars they
/// are all `int` for verification purposes.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum BaseKind {
    Int,
    Float,
    Long,
    Double,
    Byte,
    Char,
    Short,
    Boolean,
}

impl BaseKind {
    fn code(self) -> u64 {
        match self {
            BaseKind::Int => BASE_INT,
            BaseKind::Float => BASE_FLOAT,
            BaseKind::Long => BASE_LONG,
            BaseKind::Double => BASE_DOUBLE,
            BaseKind::Byte => BASE_BYTE,
            BaseKind::Char => BASE_CHAR,
            BaseKind::Short => BASE_SHORT,
            BaseKind::Boolean => BASE_BOOL,
        }
    }

    fn from_code(code: u64) -> Option<Self> {
        match code {
            BASE_INT => Some(BaseKind::Int),
            BASE_FLOAT => Some(BaseKind::Float),
            BASE_LONG => Some(BaseKind::Long),
            BASE_DOUBLE => Some(BaseKind::Double),
            BASE_BYTE => Some(BaseKind::Byte),
            BASE_CHAR => Some(BaseKind::Char),
            BASE_SHORT => Some(BaseKind::Short),
            BASE_BOOL => Some(BaseKind::Boolean),
            _ => None,
        }
    }

    /// The `BaseKind` of a descriptor base type.
    #[must_use]
    pub fn from_base_type(base: BaseType) -> Self {
        match base {
            BaseType::Boolean => BaseKind::Boolean,
            BaseType::Byte => BaseKind::Byte,
            BaseType::Char => BaseKind::Char,
            BaseType::Double => BaseKind::Double,
            BaseType::Float => BaseKind::Float,
            BaseType::Int => BaseKind::Int,
            BaseType::Long => BaseKind::Long,
            BaseType::Short => BaseKind::Short,
        }
    }

    fn descriptor_name(self) -> &'static str {
        match self {
            BaseKind::Int => "int",
            BaseKind::Float => "float",
            BaseKind::Long => "long",
            BaseKind::Double => "double",
            BaseKind::Byte => "byte",
            BaseKind::Char => "char",
            BaseKind::Short => "short",
            BaseKind::Boolean => "boolean",
        }
    }
}

/// The unpacked view of a [`TypeWord`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TypeKind {
    /// The lattice supremum; also the second slot of every long/double pair.
    Top,
    /// The type of the `null` reference.
    Null,
    /// `int` (also `boolean`, `byte`, `char`, `short` as scalars).
    Int,
    /// `float`.
    Float,
    /// `long`; occupies two slots, the second always `Top`.
    Long,
    /// `double`; occupies two slots, the second always `Top`.
    Double,
    /// An array whose innermost element is a primitive.
    BaseArray { kind: BaseKind, arity: u16 },
    /// An object reference, or an array of objects when `arity > 0`.
    Object { class: ClassIndex, arity: u16 },
    /// The result of a `new` at the given bytecode offset, not yet initialized.
    UninitNew { pc: u32 },
    /// The receiver of a constructor frame before the chained `<init>` call.
    UninitThis { class: ClassIndex },
}

/// One abstract type, packed into a machine word.
#[derive(Clone, Copy, Eq, Hash, PartialEq)]
pub struct TypeWord(u64);

impl TypeWord {
    /// The lattice supremum.
    #[must_use]
    pub fn top() -> Self {
        Self(BASE_TOP)
    }

    /// The `null` reference type.
    #[must_use]
    pub fn null() -> Self {
        Self(BASE_NULL)
    }

    /// The `int` scalar.
    #[must_use]
    pub fn int() -> Self {
        Self(BASE_INT)
    }

    /// The `float` scalar.
    #[must_use]
    pub fn float() -> Self {
        Self(BASE_FLOAT)
    }

    /// The `long` scalar (first slot of the pair).
    #[must_use]
    pub fn long() -> Self {
        Self(BASE_LONG)
    }

    /// The `double` scalar (first slot of the pair).
    #[must_use]
    pub fn double() -> Self {
        Self(BASE_DOUBLE)
    }

    /// An object reference at the given arity (0 for a plain reference).
    #[must_use]
    pub fn object(class: ClassIndex, arity: u16) -> Self {
        Self((u64::from(arity) << ARITY_SHIFT) | (u64::from(class.as_u32()) << INDEX_SHIFT))
    }

    /// `java/lang/Object` at arity 0.
    #[must_use]
    pub fn java_lang_object() -> Self {
        Self::object(ClassIndex::OBJECT, 0)
    }

    /// `java/lang/Throwable` at arity 0.
    #[must_use]
    pub fn java_lang_throwable() -> Self {
        Self::object(ClassIndex::THROWABLE, 0)
    }

    /// An array of a primitive element kind; `arity` must be at least 1.
    #[must_use]
    pub fn base_array(kind: BaseKind, arity: u16) -> Self {
        debug_assert!(arity >= 1);
        Self((u64::from(arity) << ARITY_SHIFT) | TAG_BASE_ARRAY | kind.code())
    }

    /// The uninitialized result of a `new` at the given bytecode offset.
    #[must_use]
    pub fn uninit_new(pc: u32) -> Self {
        Self(TAG_UNINIT_NEW | (u64::from(pc) << INDEX_SHIFT))
    }

    /// The uninitialized `this` of a constructor frame.
    #[must_use]
    pub fn uninit_this(class: ClassIndex) -> Self {
        Self(TAG_UNINIT_THIS | (u64::from(class.as_u32()) << INDEX_SHIFT))
    }

    /// Unpack the word for matching.
    #[must_use]
    pub fn kind(self) -> TypeKind {
        let arity = self.arity();
        if self.0 & TAG_UNINIT_NEW != 0 {
            return TypeKind::UninitNew { pc: self.index() };
        }
        if self.0 & TAG_UNINIT_THIS != 0 {
            return TypeKind::UninitThis {
                class: ClassIndex::new(self.index()),
            };
        }
        if self.0 & TAG_BASE_ARRAY != 0 {
            let kind = BaseKind::from_code(self.0 & BASE_MASK).unwrap_or(BaseKind::Int);
            return TypeKind::BaseArray { kind, arity };
        }
        match self.0 & BASE_MASK {
            BASE_TOP => TypeKind::Top,
            BASE_NULL => TypeKind::Null,
            BASE_INT => TypeKind::Int,
            BASE_FLOAT => TypeKind::Float,
            BASE_LONG => TypeKind::Long,
            BASE_DOUBLE => TypeKind::Double,
            _ => TypeKind::Object {
                class: ClassIndex::new(self.index()),
                arity,
            },
        }
    }

    fn index(self) -> u32 {
        let value = (self.0 & INDEX_MASK) >> INDEX_SHIFT;
        u32::try_from(value).unwrap_or(u32::MAX)
    }

    /// The array dimension count; 0 for non-array types.
    #[must_use]
    pub fn arity(self) -> u16 {
        u16::try_from(self.0 >> ARITY_SHIFT).unwrap_or(0)
    }

    /// `true` for the lattice supremum.
    #[must_use]
    pub fn is_top(self) -> bool {
        self.0 == BASE_TOP
    }

    /// `true` for the `null` reference type.
    #[must_use]
    pub fn is_null(self) -> bool {
        self.0 == BASE_NULL
    }

    /// `true` for `top` or a primitive scalar.
    #[must_use]
    pub fn is_base(self) -> bool {
        let code = self.0 & BASE_MASK;
        self.0 & TAG_MASK == 0 && code != 0 && code != BASE_NULL
    }

    /// `true` when either uninitialized tag is set.
    #[must_use]
    pub fn is_special(self) -> bool {
        self.0 & (TAG_UNINIT_NEW | TAG_UNINIT_THIS) != 0
    }

    /// `true` for an initialized reference: an object, an array, or `null`.
    #[must_use]
    pub fn is_reference(self) -> bool {
        !self.is_base() && !self.is_special()
    }

    /// `true` for a reference or an uninitialized type (anything `astore` accepts).
    #[must_use]
    pub fn is_reference_or_uninit(self) -> bool {
        !self.is_base()
    }

    /// `true` for a `long` or `double` scalar.
    #[must_use]
    pub fn is_wide(self) -> bool {
        self.0 == BASE_LONG || self.0 == BASE_DOUBLE
    }

    /// `true` for any array type.
    #[must_use]
    pub fn is_array(self) -> bool {
        self.0 & TAG_BASE_ARRAY != 0 || (self.is_reference() && self.arity() > 0)
    }

    /// The interned class index for objects and uninitialized `this`.
    #[must_use]
    pub fn class_index(self) -> Option<ClassIndex> {
        match self.kind() {
            TypeKind::Object { class, .. } | TypeKind::UninitThis { class } => Some(class),
            _ => None,
        }
    }

    /// The `new` offset for an uninitialized object.
    #[must_use]
    pub fn new_pc(self) -> Option<u32> {
        match self.kind() {
            TypeKind::UninitNew { pc } => Some(pc),
            _ => None,
        }
    }

    /// The same word with a different arity; only meaningful for objects and base arrays.
    #[must_use]
    pub fn with_arity(self, arity: u16) -> Self {
        Self((self.0 & !(u64::from(u16::MAX) << ARITY_SHIFT)) | (u64::from(arity) << ARITY_SHIFT))
    }

    /// The element type one dimension down, or `None` for non-arrays.
    ///
    /// A base array at arity 1 has no expressible component word (its element is a primitive);
    /// callers use [`TypeWord::kind`] for that case.
    #[must_use]
    pub fn array_component(self) -> Option<TypeWord> {
        match self.kind() {
            TypeKind::Object { arity, .. } if arity > 0 => Some(self.with_arity(arity - 1)),
            TypeKind::BaseArray { arity, .. } if arity > 1 => Some(self.with_arity(arity - 1)),
            _ => None,
        }
    }

    /// Convert a parsed descriptor type to a type word, interning object names.
    ///
    /// # Errors
    /// Returns an error if an array exceeds [`MAX_ARITY`] or interning fails.
    pub fn from_field_type(names: &mut ClassNames, field_type: &FieldType) -> Result<Self> {
        match field_type {
            FieldType::Base(base) => Ok(match base {
                BaseType::Boolean
                | BaseType::Byte
                | BaseType::Short
                | BaseType::Char
                | BaseType::Int => Self::int(),
                BaseType::Float => Self::float(),
                BaseType::Long => Self::long(),
                BaseType::Double => Self::double(),
            }),
            FieldType::Object(class_name) => {
                let class = names.intern(class_name)?;
                Ok(Self::object(class, 0))
            }
            FieldType::Array(_) => {
                let arity = u16::try_from(field_type.dimensions())
                    .ok()
                    .filter(|arity| *arity <= MAX_ARITY)
                    .ok_or_else(|| VerifyError::from(ErrorKind::ArrayArityOverflow))?;
                match field_type.element_type() {
                    FieldType::Base(base) => {
                        Ok(Self::base_array(BaseKind::from_base_type(*base), arity))
                    }
                    FieldType::Object(class_name) => {
                        let class = names.intern(class_name)?;
                        Ok(Self::object(class, arity))
                    }
                    FieldType::Array(_) => Err(VerifyError::from(ErrorKind::BadBytecode)),
                }
            }
        }
    }

    /// Convert a constant pool class name to a type word.
    ///
    /// Class constants name either a plain class (`java/lang/String`) or, for array classes, a
    /// descriptor (`[I`, `[[Ljava/lang/String;`).
    ///
    /// # Errors
    /// Returns an error if an array descriptor is malformed or interning fails.
    pub fn from_class_name(names: &mut ClassNames, class_name: &str) -> Result<Self> {
        if class_name.starts_with('[') {
            let field_type = FieldType::parse(class_name)?;
            Self::from_field_type(names, &field_type)
        } else {
            let class = names.intern(class_name)?;
            Ok(Self::object(class, 0))
        }
    }

    /// Render the word with class names resolved, for diagnostics.
    #[must_use]
    pub fn format(self, names: &ClassNames) -> String {
        match self.kind() {
            TypeKind::Top => "top".to_string(),
            TypeKind::Null => "null".to_string(),
            TypeKind::Int => "int".to_string(),
            TypeKind::Float => "float".to_string(),
            TypeKind::Long => "long".to_string(),
            TypeKind::Double => "double".to_string(),
            TypeKind::BaseArray { kind, arity } => {
                format!("{}{}", kind.descriptor_name(), "[]".repeat(arity as usize))
            }
            TypeKind::Object { class, arity } => {
                format!("{}{}", names.name(class), "[]".repeat(arity as usize))
            }
            TypeKind::UninitNew { pc } => format!("uninitialized({pc})"),
            TypeKind::UninitThis { class } => {
                format!("uninitializedThis({})", names.name(class))
            }
        }
    }
}

impl fmt::Debug for TypeWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind() {
            TypeKind::Top => write!(f, "top"),
            TypeKind::Null => write!(f, "null"),
            TypeKind::Int => write!(f, "int"),
            TypeKind::Float => write!(f, "float"),
            TypeKind::Long => write!(f, "long"),
            TypeKind::Double => write!(f, "double"),
            TypeKind::BaseArray { kind, arity } => write!(f, "{kind:?}[{arity}]"),
            TypeKind::Object { class, arity } => {
                write!(f, "object(#{})[{arity}]", class.as_u32())
            }
            TypeKind::UninitNew { pc } => write!(f, "uninitialized({pc})"),
            TypeKind::UninitThis { class } => {
                write!(f, "uninitializedThis(#{})", class.as_u32())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_singletons_are_distinct() {
        let words = [
            TypeWord::top(),
            TypeWord::null(),
            TypeWord::int(),
            TypeWord::float(),
            TypeWord::long(),
            TypeWord::double(),
        ];
        for (i, a) in words.iter().enumerate() {
            for (j, b) in words.iter().enumerate() {
                assert_eq!(a == b, i == j);
            }
        }
    }

    #[test]
    fn test_object_round_trip() {
        let word = TypeWord::object(ClassIndex::STRING, 2);
        assert_eq!(
            word.kind(),
            TypeKind::Object {
                class: ClassIndex::STRING,
                arity: 2
            }
        );
        assert_eq!(word.arity(), 2);
        assert_eq!(word.class_index(), Some(ClassIndex::STRING));
        assert!(word.is_reference());
        assert!(word.is_array());
    }

    #[test]
    fn test_base_array_round_trip() {
        let word = TypeWord::base_array(BaseKind::Byte, 1);
        assert_eq!(
            word.kind(),
            TypeKind::BaseArray {
                kind: BaseKind::Byte,
                arity: 1
            }
        );
        assert!(word.is_reference());
        assert!(word.is_array());
        assert!(!word.is_base());
    }

    #[test]
    fn test_uninitialized_tags() {
        let new = TypeWord::uninit_new(17);
        assert_eq!(new.kind(), TypeKind::UninitNew { pc: 17 });
        assert!(new.is_special());
        assert!(!new.is_reference());
        assert!(new.is_reference_or_uninit());

        let this = TypeWord::uninit_this(ClassIndex::new(7));
        assert_eq!(
            this.kind(),
            TypeKind::UninitThis {
                class: ClassIndex::new(7)
            }
        );
        assert!(this.is_special());
        // A new at pc 0 and uninitialized-this must never collide.
        assert_ne!(TypeWord::uninit_new(0), TypeWord::uninit_this(ClassIndex::new(0)));
    }

    #[test]
    fn test_predicates() {
        assert!(TypeWord::top().is_base());
        assert!(TypeWord::int().is_base());
        assert!(TypeWord::long().is_wide());
        assert!(TypeWord::double().is_wide());
        assert!(!TypeWord::int().is_wide());
        assert!(TypeWord::null().is_reference());
        assert!(!TypeWord::null().is_base());
        assert!(TypeWord::java_lang_object().is_reference());
        assert!(!TypeWord::java_lang_object().is_array());
    }

    #[test]
    fn test_array_component() {
        let strings = TypeWord::object(ClassIndex::STRING, 2);
        let component = strings.array_component().expect("component");
        assert_eq!(component, TypeWord::object(ClassIndex::STRING, 1));

        let ints = TypeWord::base_array(BaseKind::Int, 1);
        assert_eq!(ints.array_component(), None);
        assert_eq!(TypeWord::java_lang_object().array_component(), None);
    }

    #[test]
    fn test_from_field_type() -> Result<()> {
        let mut names = ClassNames::new();
        assert_eq!(
            TypeWord::from_field_type(&mut names, &FieldType::parse("I")?)?,
            TypeWord::int()
        );
        assert_eq!(
            TypeWord::from_field_type(&mut names, &FieldType::parse("Z")?)?,
            TypeWord::int()
        );
        assert_eq!(
            TypeWord::from_field_type(&mut names, &FieldType::parse("Ljava/lang/String;")?)?,
            TypeWord::object(ClassIndex::STRING, 0)
        );
        assert_eq!(
            TypeWord::from_field_type(&mut names, &FieldType::parse("[[Ljava/lang/String;")?)?,
            TypeWord::object(ClassIndex::STRING, 2)
        );
        assert_eq!(
            TypeWord::from_field_type(&mut names, &FieldType::parse("[Z")?)?,
            TypeWord::base_array(BaseKind::Boolean, 1)
        );
        Ok(())
    }

    #[test]
    fn test_from_class_name() -> Result<()> {
        let mut names = ClassNames::new();
        assert_eq!(
            TypeWord::from_class_name(&mut names, "java/lang/String")?,
            TypeWord::object(ClassIndex::STRING, 0)
        );
        assert_eq!(
            TypeWord::from_class_name(&mut names, "[I")?,
            TypeWord::base_array(BaseKind::Int, 1)
        );
        Ok(())
    }

    #[test]
    fn test_format() -> Result<()> {
        let mut names = ClassNames::new();
        let string_array = TypeWord::from_class_name(&mut names, "[Ljava/lang/String;")?;
        assert_eq!(string_array.format(&names), "java/lang/String[]");
        assert_eq!(TypeWord::top().format(&names), "top");
        assert_eq!(
            TypeWord::base_array(BaseKind::Int, 2).format(&names),
            "int[][]"
        );
        assert_eq!(TypeWord::uninit_new(3).format(&names), "uninitialized(3)");
        Ok(())
    }
}
