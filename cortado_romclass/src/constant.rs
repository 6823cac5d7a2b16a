use std::fmt;

/// A constant pool entry.
///
/// Only the constant kinds the bytecode verifier consumes are modelled; the upstream static
/// verifier has already checked structural validity (tag ranges, index bounds, UTF-8 shape).
///
/// See: <https://docs.oracle.com/javase/specs/jvms/se25/html/jvms-4.html#jvms-4.4>
#[derive(Clone, Debug, PartialEq)]
pub enum Constant {
    Utf8(String),
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    Class(u16),  // Name index (Utf8)
    String(u16), // String index (Utf8)
    FieldRef {
        class_index: u16,
        name_and_type_index: u16,
    },
    MethodRef {
        class_index: u16,
        name_and_type_index: u16,
    },
    InterfaceMethodRef {
        class_index: u16,
        name_and_type_index: u16,
    },
    NameAndType {
        name_index: u16,
        descriptor_index: u16,
    },
    MethodHandle {
        reference_kind: u8,
        reference_index: u16,
    },
    MethodType(u16), // Descriptor index (Utf8)
    Dynamic {
        bootstrap_method_attr_index: u16,
        name_and_type_index: u16,
    },
    InvokeDynamic {
        bootstrap_method_attr_index: u16,
        name_and_type_index: u16,
    },
}

impl Constant {
    /// Get the tag of the `Constant`.
    #[must_use]
    pub fn tag(&self) -> u8 {
        match self {
            Constant::Utf8(_) => 1,
            Constant::Integer(_) => 3,
            Constant::Float(_) => 4,
            Constant::Long(_) => 5,
            Constant::Double(_) => 6,
            Constant::Class { .. } => 7,
            Constant::String { .. } => 8,
            Constant::FieldRef { .. } => 9,
            Constant::MethodRef { .. } => 10,
            Constant::InterfaceMethodRef { .. } => 11,
            Constant::NameAndType { .. } => 12,
            Constant::MethodHandle { .. } => 15,
            Constant::MethodType { .. } => 16,
            Constant::Dynamic { .. } => 17,
            Constant::InvokeDynamic { .. } => 18,
        }
    }

    /// Return `true` if the constant occupies two constant pool slots.
    ///
    /// See: <https://docs.oracle.com/javase/specs/jvms/se25/html/jvms-4.html#jvms-4.4.5>
    #[must_use]
    pub fn is_wide(&self) -> bool {
        matches!(self, Constant::Long(_) | Constant::Double(_))
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Constant::Utf8(value) => write!(f, "Utf8 {value}"),
            Constant::Integer(value) => write!(f, "Integer {value}"),
            Constant::Float(value) => write!(f, "Float {value}"),
            Constant::Long(value) => write!(f, "Long {value}"),
            Constant::Double(value) => write!(f, "Double {value}"),
            Constant::Class(index) => write!(f, "Class #{index}"),
            Constant::String(index) => write!(f, "String #{index}"),
            Constant::FieldRef {
                class_index,
                name_and_type_index,
            } => write!(f, "Fieldref #{class_index}.#{name_and_type_index}"),
            Constant::MethodRef {
                class_index,
                name_and_type_index,
            } => write!(f, "Methodref #{class_index}.#{name_and_type_index}"),
            Constant::InterfaceMethodRef {
                class_index,
                name_and_type_index,
            } => write!(f, "InterfaceMethodref #{class_index}.#{name_and_type_index}"),
            Constant::NameAndType {
                name_index,
                descriptor_index,
            } => write!(f, "NameAndType #{name_index}:#{descriptor_index}"),
            Constant::MethodHandle {
                reference_kind,
                reference_index,
            } => write!(f, "MethodHandle {reference_kind}:#{reference_index}"),
            Constant::MethodType(index) => write!(f, "MethodType #{index}"),
            Constant::Dynamic {
                bootstrap_method_attr_index,
                name_and_type_index,
            } => write!(f, "Dynamic #{bootstrap_method_attr_index}:#{name_and_type_index}"),
            Constant::InvokeDynamic {
                bootstrap_method_attr_index,
                name_and_type_index,
            } => write!(
                f,
                "InvokeDynamic #{bootstrap_method_attr_index}:#{name_and_type_index}"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags() {
        assert_eq!(Constant::Utf8("a".to_string()).tag(), 1);
        assert_eq!(Constant::Class(1).tag(), 7);
        assert_eq!(
            Constant::MethodRef {
                class_index: 1,
                name_and_type_index: 2
            }
            .tag(),
            10
        );
        assert_eq!(
            Constant::InvokeDynamic {
                bootstrap_method_attr_index: 0,
                name_and_type_index: 2
            }
            .tag(),
            18
        );
    }

    #[test]
    fn test_is_wide() {
        assert!(Constant::Long(1).is_wide());
        assert!(Constant::Double(1.0).is_wide());
        assert!(!Constant::Integer(1).is_wide());
        assert!(!Constant::Utf8("a".to_string()).is_wide());
    }

    #[test]
    fn test_display() {
        assert_eq!(Constant::Class(3).to_string(), "Class #3");
        assert_eq!(
            Constant::NameAndType {
                name_index: 1,
                descriptor_index: 2
            }
            .to_string(),
            "NameAndType #1:#2"
        );
    }
}
