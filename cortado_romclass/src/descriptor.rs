use crate::Error::{InvalidFieldTypeDescriptor, InvalidMethodDescriptor};
use crate::base_type::BaseType;
use crate::error::Result;
use std::fmt;
use std::iter::Peekable;
use std::str::Chars;

/// A parsed field type from a descriptor.
///
/// See: <https://docs.oracle.com/javase/specs/jvms/se25/html/jvms-4.html#jvms-4.3.2>
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum FieldType {
    Base(BaseType),
    Object(String),
    Array(Box<FieldType>),
}

impl FieldType {
    /// Return the descriptor for the `FieldType`.
    #[must_use]
    pub fn descriptor(&self) -> String {
        match self {
            FieldType::Base(base_type) => base_type.code().to_string(),
            FieldType::Object(class_name) => format!("L{class_name};"),
            FieldType::Array(component_type) => format!("[{}", component_type.descriptor()),
        }
    }

    /// Return `true` if the type occupies two local/stack slots.
    #[must_use]
    pub fn is_wide(&self) -> bool {
        matches!(self, FieldType::Base(base) if base.is_wide())
    }

    /// Return the array dimension count; 0 for non-array types.
    #[must_use]
    pub fn dimensions(&self) -> usize {
        match self {
            FieldType::Array(component) => 1 + component.dimensions(),
            _ => 0,
        }
    }

    /// Return the innermost element type of an array; `self` for non-arrays.
    #[must_use]
    pub fn element_type(&self) -> &FieldType {
        match self {
            FieldType::Array(component) => component.element_type(),
            _ => self,
        }
    }

    /// Parse a single field type descriptor.
    ///
    /// # Errors
    /// Returns an error if the descriptor is malformed or has trailing characters.
    pub fn parse(descriptor: &str) -> Result<FieldType> {
        let mut chars = descriptor.chars().peekable();
        let field_type = Self::parse_from(descriptor, &mut chars)?;
        if chars.next().is_some() {
            return Err(InvalidFieldTypeDescriptor(descriptor.to_string()));
        }
        Ok(field_type)
    }

    fn parse_from(descriptor: &str, chars: &mut Peekable<Chars<'_>>) -> Result<FieldType> {
        let Some(code) = chars.next() else {
            return Err(InvalidFieldTypeDescriptor(descriptor.to_string()));
        };
        let field_type = match code {
            'L' => {
                let mut class_name = String::new();
                loop {
                    match chars.next() {
                        Some(';') => break,
                        Some(ch) => class_name.push(ch),
                        None => {
                            return Err(InvalidFieldTypeDescriptor(descriptor.to_string()));
                        }
                    }
                }
                if class_name.is_empty() {
                    return Err(InvalidFieldTypeDescriptor(descriptor.to_string()));
                }
                FieldType::Object(class_name)
            }
            '[' => {
                let component_type = Self::parse_from(descriptor, chars)?;
                FieldType::Array(component_type.into())
            }
            _ => {
                let Ok(base_type) = BaseType::parse(code) else {
                    return Err(InvalidFieldTypeDescriptor(descriptor.to_string()));
                };
                FieldType::Base(base_type)
            }
        };

        Ok(field_type)
    }

    /// Parse a method descriptor into parameter types and an optional return type.
    ///
    /// The descriptor has the form `(` *parameters* `)` *return*, where `V` as the return
    /// descriptor means a `void` method.
    ///
    /// See: <https://docs.oracle.com/javase/specs/jvms/se25/html/jvms-4.html#jvms-4.3.3>
    ///
    /// # Errors
    /// Returns an error if the descriptor cannot be parsed.
    pub fn parse_method_descriptor(
        descriptor: &str,
    ) -> Result<(Vec<FieldType>, Option<FieldType>)> {
        let mut chars = descriptor.chars().peekable();
        let mut parameters = Vec::new();

        if chars.next() != Some('(') {
            return Err(InvalidMethodDescriptor(descriptor.to_string()));
        }

        loop {
            match chars.peek() {
                Some(')') => {
                    chars.next();
                    break;
                }
                Some(_) => parameters.push(Self::parse_from(descriptor, &mut chars)?),
                None => return Err(InvalidMethodDescriptor(descriptor.to_string())),
            }
        }

        let return_type = match chars.peek() {
            Some('V') => {
                chars.next();
                None
            }
            Some(_) => Some(Self::parse_from(descriptor, &mut chars)?),
            None => return Err(InvalidMethodDescriptor(descriptor.to_string())),
        };

        if chars.next().is_some() {
            return Err(InvalidMethodDescriptor(descriptor.to_string()));
        }

        Ok((parameters, return_type))
    }

    /// Number of local variable slots the parameters of a method descriptor occupy.
    ///
    /// Wide types count for two slots; the receiver is not included.
    ///
    /// # Errors
    /// Returns an error if the descriptor cannot be parsed.
    pub fn parameter_slots(descriptor: &str) -> Result<u16> {
        let (parameters, _) = Self::parse_method_descriptor(descriptor)?;
        let mut slots = 0u16;
        for parameter in &parameters {
            slots = slots.saturating_add(if parameter.is_wide() { 2 } else { 1 });
        }
        Ok(slots)
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FieldType::Base(base_type) => write!(f, "{base_type}"),
            FieldType::Object(class_name) => write!(f, "{class_name}"),
            FieldType::Array(component_type) => write!(f, "{component_type}[]"),
        }
    }
}
