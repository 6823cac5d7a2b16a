use crate::Error::{InvalidConstantPoolIndex, InvalidConstantPoolIndexType};
use crate::constant::Constant;
use crate::error::Result;
use std::fmt;

/// The constant pool of a ROM class.
///
/// Entries are indexed starting at 1; `Long` and `Double` constants occupy two slots, with the
/// following slot unusable, matching the on-disk layout.
///
/// See: <https://docs.oracle.com/javase/specs/jvms/se25/html/jvms-4.html#jvms-4.4>
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConstantPool {
    entries: Vec<Entry>,
}

#[derive(Clone, Debug, PartialEq)]
enum Entry {
    Constant(Constant),
    Placeholder,
}

impl ConstantPool {
    /// Create a new, empty constant pool.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a constant to the pool and return its index.
    ///
    /// Wide constants (`Long`, `Double`) consume an extra placeholder slot.
    ///
    /// # Errors
    /// Returns an error if the pool would exceed the `u16` index space.
    pub fn add(&mut self, constant: Constant) -> Result<u16> {
        let wide = constant.is_wide();
        let index = u16::try_from(self.entries.len() + 1)?;
        self.entries.push(Entry::Constant(constant));
        if wide {
            self.entries.push(Entry::Placeholder);
        }
        Ok(index)
    }

    /// Add a UTF-8 constant to the pool.
    ///
    /// # Errors
    /// Returns an error if the pool would exceed the `u16` index space.
    pub fn add_utf8<S: AsRef<str>>(&mut self, value: S) -> Result<u16> {
        self.add(Constant::Utf8(value.as_ref().to_string()))
    }

    /// Add a class constant (and its name) to the pool.
    ///
    /// # Errors
    /// Returns an error if the pool would exceed the `u16` index space.
    pub fn add_class<S: AsRef<str>>(&mut self, name: S) -> Result<u16> {
        let name_index = self.add_utf8(name)?;
        self.add(Constant::Class(name_index))
    }

    /// Add a field reference (with class, name, and descriptor) to the pool.
    ///
    /// # Errors
    /// Returns an error if the pool would exceed the `u16` index space.
    pub fn add_field_ref<S: AsRef<str>>(
        &mut self,
        class_name: S,
        name: S,
        descriptor: S,
    ) -> Result<u16> {
        let class_index = self.add_class(class_name)?;
        let name_and_type_index = self.add_name_and_type(name, descriptor)?;
        self.add(Constant::FieldRef {
            class_index,
            name_and_type_index,
        })
    }

    /// Add a method reference (with class, name, and descriptor) to the pool.
    ///
    /// # Errors
    /// Returns an error if the pool would exceed the `u16` index space.
    pub fn add_method_ref<S: AsRef<str>>(
        &mut self,
        class_name: S,
        name: S,
        descriptor: S,
    ) -> Result<u16> {
        let class_index = self.add_class(class_name)?;
        let name_and_type_index = self.add_name_and_type(name, descriptor)?;
        self.add(Constant::MethodRef {
            class_index,
            name_and_type_index,
        })
    }

    /// Add an interface method reference to the pool.
    ///
    /// # Errors
    /// Returns an error if the pool would exceed the `u16` index space.
    pub fn add_interface_method_ref<S: AsRef<str>>(
        &mut self,
        class_name: S,
        name: S,
        descriptor: S,
    ) -> Result<u16> {
        let class_index = self.add_class(class_name)?;
        let name_and_type_index = self.add_name_and_type(name, descriptor)?;
        self.add(Constant::InterfaceMethodRef {
            class_index,
            name_and_type_index,
        })
    }

    /// Add a name-and-type constant to the pool.
    ///
    /// # Errors
    /// Returns an error if the pool would exceed the `u16` index space.
    pub fn add_name_and_type<S: AsRef<str>>(&mut self, name: S, descriptor: S) -> Result<u16> {
        let name_index = self.add_utf8(name)?;
        let descriptor_index = self.add_utf8(descriptor)?;
        self.add(Constant::NameAndType {
            name_index,
            descriptor_index,
        })
    }

    /// Add an invoke-dynamic constant (with name and descriptor) to the pool.
    ///
    /// # Errors
    /// Returns an error if the pool would exceed the `u16` index space.
    pub fn add_invoke_dynamic<S: AsRef<str>>(&mut self, name: S, descriptor: S) -> Result<u16> {
        let name_and_type_index = self.add_name_and_type(name, descriptor)?;
        self.add(Constant::InvokeDynamic {
            bootstrap_method_attr_index: 0,
            name_and_type_index,
        })
    }

    /// Get the constant at an index.
    ///
    /// # Errors
    /// Returns an error if the index is out of bounds or refers to the unusable slot after a
    /// wide constant.
    pub fn try_get(&self, index: u16) -> Result<&Constant> {
        let slot = index
            .checked_sub(1)
            .map(usize::from)
            .and_then(|slot| self.entries.get(slot));
        match slot {
            Some(Entry::Constant(constant)) => Ok(constant),
            Some(Entry::Placeholder) | None => Err(InvalidConstantPoolIndex(index)),
        }
    }

    /// Get the UTF-8 string at an index.
    ///
    /// # Errors
    /// Returns an error if the index is invalid or the constant is not `Utf8`.
    pub fn try_get_utf8(&self, index: u16) -> Result<&str> {
        match self.try_get(index)? {
            Constant::Utf8(value) => Ok(value),
            _ => Err(InvalidConstantPoolIndexType(index)),
        }
    }

    /// Get the class name referenced by the `Class` constant at an index.
    ///
    /// # Errors
    /// Returns an error if the index is invalid or the constant is not `Class`.
    pub fn try_get_class(&self, index: u16) -> Result<&str> {
        match self.try_get(index)? {
            Constant::Class(name_index) => self.try_get_utf8(*name_index),
            _ => Err(InvalidConstantPoolIndexType(index)),
        }
    }

    /// Get the raw class and name-and-type indices of the `FieldRef` at an index.
    ///
    /// # Errors
    /// Returns an error if the index is invalid or the constant is not `FieldRef`.
    pub fn try_get_field_ref(&self, index: u16) -> Result<(u16, u16)> {
        match self.try_get(index)? {
            Constant::FieldRef {
                class_index,
                name_and_type_index,
            } => Ok((*class_index, *name_and_type_index)),
            _ => Err(InvalidConstantPoolIndexType(index)),
        }
    }

    /// Get the raw class and name-and-type indices of a `MethodRef` or `InterfaceMethodRef`.
    ///
    /// # Errors
    /// Returns an error if the index is invalid or the constant is neither method reference kind.
    pub fn try_get_method_ref(&self, index: u16) -> Result<(u16, u16)> {
        match self.try_get(index)? {
            Constant::MethodRef {
                class_index,
                name_and_type_index,
            }
            | Constant::InterfaceMethodRef {
                class_index,
                name_and_type_index,
            } => Ok((*class_index, *name_and_type_index)),
            _ => Err(InvalidConstantPoolIndexType(index)),
        }
    }

    /// Get the name and descriptor strings of the `NameAndType` at an index.
    ///
    /// # Errors
    /// Returns an error if the index is invalid or the constant is not `NameAndType`.
    pub fn try_get_name_and_type(&self, index: u16) -> Result<(&str, &str)> {
        match self.try_get(index)? {
            Constant::NameAndType {
                name_index,
                descriptor_index,
            } => Ok((
                self.try_get_utf8(*name_index)?,
                self.try_get_utf8(*descriptor_index)?,
            )),
            _ => Err(InvalidConstantPoolIndexType(index)),
        }
    }

    /// Get the name-and-type descriptor of the `InvokeDynamic` constant at an index.
    ///
    /// # Errors
    /// Returns an error if the index is invalid or the constant is not `InvokeDynamic`.
    pub fn try_get_invoke_dynamic(&self, index: u16) -> Result<(&str, &str)> {
        match self.try_get(index)? {
            Constant::InvokeDynamic {
                name_and_type_index,
                ..
            } => self.try_get_name_and_type(*name_and_type_index),
            _ => Err(InvalidConstantPoolIndexType(index)),
        }
    }

    /// The number of slots in the pool, including unusable wide-constant slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Return `true` if the pool has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Display for ConstantPool {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (slot, entry) in self.entries.iter().enumerate() {
            if let Entry::Constant(constant) = entry {
                writeln!(f, "#{}: {constant}", slot + 1)?;
            }
        }
        Ok(())
    }
}
