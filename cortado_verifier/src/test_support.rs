//! Shared fixtures for unit tests: a resolver over a small fixed hierarchy and helpers that
//! assemble ROM classes around hand-written bytecode.

use cortado_romclass::{
    ClassAccessFlags, ConstantPool, ExceptionTableEntry, MethodAccessFlags, RomClass, RomMethod,
};

use crate::resolver::{ClassInfo, ClassResolver, Resolution, ResolverResult};

/// A resolver over a fixed test hierarchy.
///
/// Unknown classes resolve as `NotYetLoaded` so tests exercise the deferred-record path by
/// naming a class outside the table.
pub struct MockResolver {
    classes: Vec<ClassInfo>,
}

impl MockResolver {
    pub fn new() -> Self {
        let class = |interface: bool, chain: &[&str]| {
            let modifiers = if interface {
                ClassAccessFlags::PUBLIC | ClassAccessFlags::INTERFACE | ClassAccessFlags::ABSTRACT
            } else {
                ClassAccessFlags::PUBLIC
            };
            ClassInfo::new(modifiers, chain.iter().map(ToString::to_string).collect())
        };

        let classes = vec![
            class(false, &["java/lang/Object"]),
            class(false, &["java/lang/String", "java/lang/Object"]),
            class(false, &["java/lang/Integer", "java/lang/Number", "java/lang/Object"]),
            class(false, &["java/lang/Number", "java/lang/Object"]),
            class(false, &["java/lang/Throwable", "java/lang/Object"]),
            class(false, &["java/lang/Exception", "java/lang/Throwable", "java/lang/Object"]),
            class(false, &[
                "java/lang/RuntimeException",
                "java/lang/Exception",
                "java/lang/Throwable",
                "java/lang/Object",
            ]),
            class(false, &["java/lang/Error", "java/lang/Throwable", "java/lang/Object"]),
            class(false, &["java/lang/Class", "java/lang/Object"]),
            class(false, &["java/lang/invoke/MethodType", "java/lang/Object"]),
            class(false, &["java/lang/invoke/MethodHandle", "java/lang/Object"]),
            class(true, &["java/lang/Cloneable", "java/lang/Object"]),
            class(true, &["java/io/Serializable", "java/lang/Object"]),
            class(true, &["java/lang/Runnable", "java/lang/Object"]),
            class(true, &["java/lang/CharSequence", "java/lang/Object"]),
            class(false, &["com/example/Widget", "java/lang/Object"]),
            class(false, &["com/example/SubWidget", "com/example/Widget", "java/lang/Object"]),
            class(false, &["com/example/Demo", "java/lang/Object"]),
        ];

        Self { classes }
    }
}

impl Default for MockResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl ClassResolver for MockResolver {
    fn get_class(&self, name: &str) -> ResolverResult<Resolution> {
        Ok(self
            .classes
            .iter()
            .find(|info| info.name() == name)
            .map_or(Resolution::NotYetLoaded, |info| {
                Resolution::Loaded(info.clone())
            }))
    }
}

/// Build a static method with the given descriptor and bytecode.
pub fn static_method(name: &str, descriptor: &str, max_stack: u16, max_locals: u16, code: &[u8]) -> RomMethod {
    RomMethod {
        name: name.to_string(),
        descriptor: descriptor.to_string(),
        access_flags: MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
        max_stack,
        max_locals,
        arg_count: cortado_romclass::FieldType::parameter_slots(descriptor).unwrap_or(0),
        code: code.to_vec(),
        exception_table: Vec::new(),
        stack_map_table: None,
    }
}

/// Build an instance method (receiver included in `arg_count`).
pub fn instance_method(
    name: &str,
    descriptor: &str,
    max_stack: u16,
    max_locals: u16,
    code: &[u8],
) -> RomMethod {
    RomMethod {
        name: name.to_string(),
        descriptor: descriptor.to_string(),
        access_flags: MethodAccessFlags::PUBLIC,
        max_stack,
        max_locals,
        arg_count: cortado_romclass::FieldType::parameter_slots(descriptor)
            .unwrap_or(0)
            .saturating_add(1),
        code: code.to_vec(),
        exception_table: Vec::new(),
        stack_map_table: None,
    }
}

/// Attach an exception handler to a method.
pub fn with_handler(mut method: RomMethod, start: u16, end: u16, handler: u16, catch_type: u16) -> RomMethod {
    method.exception_table.push(ExceptionTableEntry {
        range_pc: start..end,
        handler_pc: handler,
        catch_type,
    });
    method
}

/// Wrap methods in a `com/example/Demo` class at the given major version.
pub fn demo_class(major_version: u16, constant_pool: ConstantPool, methods: Vec<RomMethod>) -> RomClass {
    RomClass {
        name: "com/example/Demo".to_string(),
        super_name: Some("java/lang/Object".to_string()),
        access_flags: ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
        major_version,
        minor_version: 0,
        constant_pool,
        interfaces: Vec::new(),
        methods,
    }
}
