use crate::constant_pool::ConstantPool;
use crate::flags::ClassAccessFlags;
use crate::method::RomMethod;
use std::fmt;

/// Class file major version that introduced the `StackMapTable` attribute (Java 6).
pub const STACK_MAP_MAJOR_VERSION: u16 = 50;

/// A read-only, pre-parsed class: the unit of work handed to the verifier.
///
/// The ROM class is the output of the upstream static verifier; its constant pool is
/// structurally sound, its names are valid, and its byte regions (method code, stack map
/// attributes) are bounds-checked but otherwise uninterpreted.
#[derive(Clone, Debug, PartialEq)]
pub struct RomClass {
    /// The internal class name, e.g. `java/lang/String`.
    pub name: String,
    /// The internal superclass name; `None` only for `java/lang/Object`.
    pub super_name: Option<String>,
    /// Access and property flags.
    pub access_flags: ClassAccessFlags,
    /// Class file major version.
    pub major_version: u16,
    /// Class file minor version.
    pub minor_version: u16,
    /// The constant pool.
    pub constant_pool: ConstantPool,
    /// Names of directly implemented interfaces.
    pub interfaces: Vec<String>,
    /// The method table.
    pub methods: Vec<RomMethod>,
}

impl RomClass {
    /// Return `true` if the class is an interface.
    #[must_use]
    pub fn is_interface(&self) -> bool {
        self.access_flags.contains(ClassAccessFlags::INTERFACE)
    }

    /// Return `true` if the class predates the `StackMapTable` attribute.
    #[must_use]
    pub fn predates_stack_maps(&self) -> bool {
        self.major_version < STACK_MAP_MAJOR_VERSION
    }

    /// The package prefix of the class name, without the trailing `/`.
    ///
    /// Returns the empty string for classes in the default package.
    #[must_use]
    pub fn package_name(&self) -> &str {
        match self.name.rfind('/') {
            Some(index) => &self.name[..index],
            None => "",
        }
    }
}

impl fmt::Display for RomClass {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} (version {}.{}, {} methods)",
            self.name,
            self.major_version,
            self.minor_version,
            self.methods.len()
        )
    }
}
