//! # Reference Instruction Handlers
//!
//! Field access, the invoke family, object and array creation, casts, and the
//! protected-member access check. These are the only handlers that read the constant pool and
//! consult the class hierarchy.

use cortado_romclass::{FieldType, RomClass};
use smallvec::SmallVec;

use crate::error::{ErrorDetail, ErrorKind, MethodTriple, Result, VerifyError};
use crate::frame::Frame;
use crate::handlers::MethodContext;
use crate::lattice::{TypeEnv, is_assignable, is_class_assignable};
use crate::opcodes::{self as op, Bytecode};
use crate::resolver::Resolution;
use crate::types::{MAX_ARITY, TypeKind, TypeWord};

/// Resolves member references out of a ROM class constant pool.
pub struct ConstantPoolResolver<'a> {
    class: &'a RomClass,
}

impl<'a> ConstantPoolResolver<'a> {
    /// Wrap a class's constant pool.
    #[must_use]
    pub fn new(class: &'a RomClass) -> Self {
        Self { class }
    }

    /// The class name at a `Class` constant.
    ///
    /// # Errors
    /// Fails when the index is not a `Class` constant.
    pub fn resolve_class(&self, index: u16) -> Result<&'a str> {
        Ok(self.class.constant_pool.try_get_class(index)?)
    }

    /// The `(class, name, descriptor)` triple of a field reference.
    ///
    /// # Errors
    /// Fails when the index is not a `FieldRef` constant.
    pub fn resolve_field(&self, index: u16) -> Result<(&'a str, &'a str, &'a str)> {
        let (class_index, name_and_type_index) =
            self.class.constant_pool.try_get_field_ref(index)?;
        let class_name = self.class.constant_pool.try_get_class(class_index)?;
        let (name, descriptor) = self
            .class
            .constant_pool
            .try_get_name_and_type(name_and_type_index)?;
        Ok((class_name, name, descriptor))
    }

    /// The `(class, name, descriptor)` triple of a method or interface-method reference.
    ///
    /// # Errors
    /// Fails when the index is not a method reference constant.
    pub fn resolve_method(&self, index: u16) -> Result<(&'a str, &'a str, &'a str)> {
        let (class_index, name_and_type_index) =
            self.class.constant_pool.try_get_method_ref(index)?;
        let class_name = self.class.constant_pool.try_get_class(class_index)?;
        let (name, descriptor) = self
            .class
            .constant_pool
            .try_get_name_and_type(name_and_type_index)?;
        Ok((class_name, name, descriptor))
    }

    /// The `(name, descriptor)` of an `InvokeDynamic` call site.
    ///
    /// # Errors
    /// Fails when the index is not an `InvokeDynamic` constant.
    pub fn resolve_invoke_dynamic(&self, index: u16) -> Result<(&'a str, &'a str)> {
        Ok(self.class.constant_pool.try_get_invoke_dynamic(index)?)
    }
}

impl std::fmt::Debug for ConstantPoolResolver<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConstantPoolResolver")
            .field("class", &self.class.name)
            .finish()
    }
}

/// `new`: push the uninitialized result, tagged with this pc.
///
/// # Errors
/// Fails when the constant pool entry is not a class.
pub fn handle_new(ctx: &MethodContext<'_>, frame: &mut Frame, pc: u32, index: u16) -> Result<()> {
    ConstantPoolResolver::new(ctx.class).resolve_class(index)?;
    frame.push(TypeWord::uninit_new(pc))
}

/// `newarray`: pop the count, push a one-dimensional primitive array.
///
/// # Errors
/// Fails with `BadBytecode` for an invalid array type code.
pub fn handle_newarray(frame: &mut Frame, atype: u8) -> Result<()> {
    use crate::types::BaseKind;
    let kind = match atype {
        4 => BaseKind::Boolean,
        5 => BaseKind::Char,
        6 => BaseKind::Float,
        7 => BaseKind::Double,
        8 => BaseKind::Byte,
        9 => BaseKind::Short,
        10 => BaseKind::Int,
        11 => BaseKind::Long,
        _ => return Err(ErrorDetail::new(ErrorKind::BadBytecode).into()),
    };
    frame.pop_expect(TypeWord::int())?;
    frame.push(TypeWord::base_array(kind, 1))
}

/// `anewarray`: pop the count, push an array one dimension deeper than the element class.
///
/// # Errors
/// Fails with `ArrayArityOverflow` at the arity field maximum.
pub fn handle_anewarray(
    ctx: &MethodContext<'_>,
    env: &mut TypeEnv<'_>,
    frame: &mut Frame,
    index: u16,
) -> Result<()> {
    let class_name = ConstantPoolResolver::new(ctx.class).resolve_class(index)?;
    frame.pop_expect(TypeWord::int())?;
    let element = TypeWord::from_class_name(env.names, class_name)?;
    let arity = element.arity();
    if arity >= MAX_ARITY {
        return Err(ErrorDetail::new(ErrorKind::ArrayArityOverflow)
            .found(element)
            .into());
    }
    frame.push(element.with_arity(arity + 1))
}

/// `multianewarray`: pop one `int` per dimension, push the named array class.
///
/// # Errors
/// Fails with `ArrayDimensionMismatch` when the class has fewer dimensions than requested.
pub fn handle_multianewarray(
    ctx: &MethodContext<'_>,
    env: &mut TypeEnv<'_>,
    frame: &mut Frame,
    index: u16,
    dimensions: u8,
) -> Result<()> {
    let class_name = ConstantPoolResolver::new(ctx.class).resolve_class(index)?;
    if dimensions == 0 {
        return Err(ErrorDetail::new(ErrorKind::BadBytecode).into());
    }
    let word = TypeWord::from_class_name(env.names, class_name)?;
    if word.arity() < u16::from(dimensions) {
        return Err(ErrorDetail::new(ErrorKind::ArrayDimensionMismatch)
            .found(word)
            .into());
    }
    for _ in 0..dimensions {
        frame.pop_expect(TypeWord::int())?;
    }
    frame.push(word)
}

/// `arraylength`: pop an array reference, push `int`.
///
/// # Errors
/// Fails with `InvalidArrayReference` for a non-array operand.
pub fn handle_arraylength(frame: &mut Frame) -> Result<()> {
    let array = frame.pop_reference()?;
    if !array.is_null() && !array.is_array() {
        return Err(ErrorDetail::new(ErrorKind::InvalidArrayReference)
            .found(array)
            .into());
    }
    frame.push(TypeWord::int())
}

/// `checkcast`: pop a reference, push the named type at its declared arity.
///
/// # Errors
/// Fails for non-reference operands or a malformed array class name.
pub fn handle_checkcast(
    ctx: &MethodContext<'_>,
    env: &mut TypeEnv<'_>,
    frame: &mut Frame,
    index: u16,
) -> Result<()> {
    let class_name = ConstantPoolResolver::new(ctx.class).resolve_class(index)?;
    frame.pop_reference()?;
    let word = TypeWord::from_class_name(env.names, class_name)?;
    frame.push(word)
}

/// `instanceof`: pop a reference, push `int`.
///
/// # Errors
/// Fails for non-reference operands.
pub fn handle_instanceof(ctx: &MethodContext<'_>, frame: &mut Frame, index: u16) -> Result<()> {
    ConstantPoolResolver::new(ctx.class).resolve_class(index)?;
    frame.pop_reference()?;
    frame.push(TypeWord::int())
}

/// `getstatic` / `putstatic` / `getfield` / `putfield`.
///
/// # Errors
/// Fails with `IncompatibleType` for value or receiver mismatches and `BadAccessProtected`
/// per the protected-member rules; the field triple is attached to every failure.
pub fn handle_field_access(
    ctx: &MethodContext<'_>,
    env: &mut TypeEnv<'_>,
    frame: &mut Frame,
    opcode: u8,
    index: u16,
) -> Result<()> {
    let (class_name, name, descriptor) = ConstantPoolResolver::new(ctx.class).resolve_field(index)?;
    let result = field_access(ctx, env, frame, opcode, class_name, name, descriptor);
    with_callee(result, class_name, name, descriptor)
}

fn field_access(
    ctx: &MethodContext<'_>,
    env: &mut TypeEnv<'_>,
    frame: &mut Frame,
    opcode: u8,
    class_name: &str,
    name: &str,
    descriptor: &str,
) -> Result<()> {
    let field_type = FieldType::parse(descriptor)?;
    let field_word = TypeWord::from_field_type(env.names, &field_type)?;

    match opcode {
        op::GETSTATIC => push_value(frame, field_word),
        op::PUTSTATIC => pop_value(env, frame, field_word),
        op::GETFIELD => {
            check_receiver(ctx, env, frame, class_name, name, descriptor)?;
            push_value(frame, field_word)
        }
        op::PUTFIELD => {
            pop_value(env, frame, field_word)?;
            check_receiver(ctx, env, frame, class_name, name, descriptor)
        }
        _ => Err(ErrorDetail::new(ErrorKind::BadBytecode).into()),
    }
}

/// `invokevirtual`: pop arguments and a receiver assignable to the declared class.
///
/// # Errors
/// Fails with `IncompatibleType` for argument or receiver mismatches; the callee triple is
/// attached to every failure.
pub fn handle_invokevirtual(
    ctx: &MethodContext<'_>,
    env: &mut TypeEnv<'_>,
    frame: &mut Frame,
    index: u16,
) -> Result<()> {
    let (class_name, name, descriptor) = ConstantPoolResolver::new(ctx.class).resolve_method(index)?;
    let result = (|| {
        let (parameters, return_field) = FieldType::parse_method_descriptor(descriptor)?;
        pop_arguments(env, frame, &parameters)?;
        check_receiver(ctx, env, frame, class_name, name, descriptor)?;
        push_return(env, frame, return_field.as_ref())
    })();
    with_callee(result, class_name, name, descriptor)
}

/// `invokestatic`: pop arguments, push the return type.
///
/// # Errors
/// Fails with `IncompatibleType` for argument mismatches; the callee triple is attached.
pub fn handle_invokestatic(
    ctx: &MethodContext<'_>,
    env: &mut TypeEnv<'_>,
    frame: &mut Frame,
    index: u16,
) -> Result<()> {
    let (class_name, name, descriptor) = ConstantPoolResolver::new(ctx.class).resolve_method(index)?;
    let result = (|| {
        let (parameters, return_field) = FieldType::parse_method_descriptor(descriptor)?;
        pop_arguments(env, frame, &parameters)?;
        push_return(env, frame, return_field.as_ref())
    })();
    with_callee(result, class_name, name, descriptor)
}

/// `invokeinterface`: the receiver check is relaxed to "any initialized reference".
///
/// # Errors
/// Fails with `BadBytecode` when the count operand disagrees with the descriptor or the
/// reserved byte is non-zero.
pub fn handle_invokeinterface(
    ctx: &MethodContext<'_>,
    env: &mut TypeEnv<'_>,
    frame: &mut Frame,
    index: u16,
    count: u8,
    reserved: u8,
) -> Result<()> {
    let (class_name, name, descriptor) = ConstantPoolResolver::new(ctx.class).resolve_method(index)?;
    let result = (|| {
        if reserved != 0 {
            return Err(ErrorDetail::new(ErrorKind::BadBytecode).into());
        }
        let (parameters, return_field) = FieldType::parse_method_descriptor(descriptor)?;
        let argument_slots = FieldType::parameter_slots(descriptor)?;
        if u16::from(count) != argument_slots.saturating_add(1) {
            return Err(ErrorDetail::new(ErrorKind::BadBytecode).into());
        }
        pop_arguments(env, frame, &parameters)?;
        frame.pop_reference()?;
        push_return(env, frame, return_field.as_ref())
    })();
    with_callee(result, class_name, name, descriptor)
}

/// `invokedynamic`: no receiver; pop arguments per the call-site descriptor.
///
/// # Errors
/// Fails with `IncompatibleType` for argument mismatches; the call-site name stands in for
/// the callee class in the attached triple.
pub fn handle_invokedynamic(
    ctx: &MethodContext<'_>,
    env: &mut TypeEnv<'_>,
    frame: &mut Frame,
    index: u16,
) -> Result<()> {
    let (name, descriptor) = ConstantPoolResolver::new(ctx.class).resolve_invoke_dynamic(index)?;
    let result = (|| {
        let (parameters, return_field) = FieldType::parse_method_descriptor(descriptor)?;
        pop_arguments(env, frame, &parameters)?;
        push_return(env, frame, return_field.as_ref())
    })();
    with_callee(result, "", name, descriptor)
}

/// `invokespecial`: `<init>` consumes an uninitialized receiver and initializes every alias
/// of it; other targets behave like `invokevirtual` with the extra current-class constraint.
///
/// # Errors
/// Fails with `BadInitObject`, `WrongInitMethod`, or `BadInvokeSpecial` per the constructor
/// and receiver contracts.
pub fn handle_invokespecial(
    ctx: &MethodContext<'_>,
    env: &mut TypeEnv<'_>,
    frame: &mut Frame,
    bytecode: &Bytecode<'_>,
    index: u16,
) -> Result<()> {
    let (class_name, name, descriptor) = ConstantPoolResolver::new(ctx.class).resolve_method(index)?;
    let result = if name == "<init>" {
        invoke_init(ctx, env, frame, bytecode, class_name, descriptor)
    } else {
        invoke_special_method(ctx, env, frame, class_name, name, descriptor)
    };
    with_callee(result, class_name, name, descriptor)
}

fn invoke_init(
    ctx: &MethodContext<'_>,
    env: &mut TypeEnv<'_>,
    frame: &mut Frame,
    bytecode: &Bytecode<'_>,
    class_name: &str,
    descriptor: &str,
) -> Result<()> {
    let (parameters, return_field) = FieldType::parse_method_descriptor(descriptor)?;
    if return_field.is_some() {
        return Err(ErrorDetail::new(ErrorKind::BadBytecode).into());
    }
    pop_arguments(env, frame, &parameters)?;

    let receiver = frame.pop()?;
    match receiver.kind() {
        TypeKind::UninitNew { pc } => {
            // The tagged pc must point at the `new` whose class the <init> belongs to.
            if bytecode.opcode(pc)? != op::NEW {
                return Err(ErrorDetail::new(ErrorKind::BadInitObject).found(receiver).into());
            }
            let new_index = bytecode.read_u16(pc + 1)?;
            let new_class_name = ctx.class.constant_pool.try_get_class(new_index)?;
            if new_class_name != class_name {
                return Err(ErrorDetail::new(ErrorKind::WrongInitMethod)
                    .found(receiver)
                    .into());
            }
            let initialized = TypeWord::from_class_name(env.names, new_class_name)?;
            frame.initialize_object(receiver, initialized);
            Ok(())
        }
        TypeKind::UninitThis { .. } => {
            let permitted = class_name == ctx.class.name
                || ctx.class.super_name.as_deref() == Some(class_name);
            if !permitted {
                return Err(ErrorDetail::new(ErrorKind::WrongInitMethod)
                    .found(receiver)
                    .into());
            }
            frame.initialize_object(receiver, TypeWord::object(ctx.this_class, 0));
            frame.uninitialized_this = false;
            Ok(())
        }
        _ => Err(ErrorDetail::new(ErrorKind::BadInitObject).found(receiver).into()),
    }
}

fn invoke_special_method(
    ctx: &MethodContext<'_>,
    env: &mut TypeEnv<'_>,
    frame: &mut Frame,
    class_name: &str,
    name: &str,
    descriptor: &str,
) -> Result<()> {
    let (parameters, return_field) = FieldType::parse_method_descriptor(descriptor)?;
    pop_arguments(env, frame, &parameters)?;

    let receiver = frame.pop_reference()?;
    let declared = TypeWord::from_class_name(env.names, class_name)?;
    if !is_class_assignable(env, receiver, declared)?.is_compatible() {
        return Err(ErrorDetail::new(ErrorKind::IncompatibleType)
            .expected(declared)
            .found(receiver)
            .into());
    }
    // invokespecial reaches only the current class, its private methods, or a superclass
    // method; the receiver must therefore also fit the current class.
    let current = TypeWord::object(ctx.this_class, 0);
    if !is_class_assignable(env, receiver, current)?.is_compatible() {
        return Err(ErrorDetail::new(ErrorKind::BadInvokeSpecial)
            .expected(current)
            .found(receiver)
            .into());
    }
    protected_access(ctx, env, receiver, class_name, name, descriptor)?;
    push_return(env, frame, return_field.as_ref())
}

/// Pop and check declared arguments, rightmost first.
fn pop_arguments(
    env: &mut TypeEnv<'_>,
    frame: &mut Frame,
    parameters: &[FieldType],
) -> Result<()> {
    let mut words: SmallVec<[TypeWord; 8]> = SmallVec::with_capacity(parameters.len());
    for parameter in parameters {
        words.push(TypeWord::from_field_type(env.names, parameter)?);
    }
    for &declared in words.iter().rev() {
        if declared.is_wide() {
            frame.pop_pair_expect(declared)?;
        } else if declared.is_base() {
            frame.pop_expect(declared)?;
        } else {
            let found = frame.pop_reference()?;
            if !is_assignable(env, found, declared)?.is_compatible() {
                return Err(ErrorDetail::new(ErrorKind::IncompatibleType)
                    .expected(declared)
                    .found(found)
                    .into());
            }
        }
    }
    Ok(())
}

/// Pop the receiver and check it against the declared class, then the protected rules.
fn check_receiver(
    ctx: &MethodContext<'_>,
    env: &mut TypeEnv<'_>,
    frame: &mut Frame,
    class_name: &str,
    member_name: &str,
    member_descriptor: &str,
) -> Result<()> {
    let receiver = frame.pop_reference()?;
    let declared = TypeWord::from_class_name(env.names, class_name)?;
    if !is_class_assignable(env, receiver, declared)?.is_compatible() {
        return Err(ErrorDetail::new(ErrorKind::IncompatibleType)
            .expected(declared)
            .found(receiver)
            .into());
    }
    protected_access(ctx, env, receiver, class_name, member_name, member_descriptor)
}

/// The protected-member access check.
///
/// Accept when the check is disabled, the receiver is an array, the declaring class is not
/// the current class or one of its superclasses, the declaring class shares the current
/// package, or the member turns out not to be protected. Otherwise the receiver's static
/// type must fit the current class.
fn protected_access(
    ctx: &MethodContext<'_>,
    env: &mut TypeEnv<'_>,
    receiver: TypeWord,
    class_name: &str,
    member_name: &str,
    member_descriptor: &str,
) -> Result<()> {
    if !env.config.protected_access_check() {
        return Ok(());
    }
    // Arrays have no package.
    if receiver.arity() > 0 {
        return Ok(());
    }
    if ctx.class.name == class_name {
        return Ok(());
    }
    // The rules constrain only protected members of the current class's own superclasses;
    // protected members of unrelated classes are left to the access check at resolution.
    let Resolution::Loaded(current_info) = env.resolver.get_class(&ctx.class.name)? else {
        return Ok(());
    };
    let Resolution::Loaded(declaring_info) = env.resolver.get_class(class_name)? else {
        return Ok(());
    };
    if !declaring_info.is_same_or_superclass_of(&current_info) {
        return Ok(());
    }
    if same_package(&ctx.class.name, class_name) {
        return Ok(());
    }
    if !env
        .resolver
        .is_protected_member(class_name, member_name, member_descriptor)?
    {
        return Ok(());
    }
    let current = TypeWord::object(ctx.this_class, 0);
    if is_assignable(env, receiver, current)?.is_compatible() {
        Ok(())
    } else {
        Err(ErrorDetail::new(ErrorKind::BadAccessProtected)
            .expected(current)
            .found(receiver)
            .into())
    }
}

fn same_package(first: &str, second: &str) -> bool {
    let package = |name: &str| name.rfind('/').map_or(0, |index| index);
    let (first_end, second_end) = (package(first), package(second));
    first_end == second_end && first[..first_end] == second[..second_end]
}

fn push_value(frame: &mut Frame, word: TypeWord) -> Result<()> {
    if word.is_wide() {
        frame.push_pair(word)
    } else {
        frame.push(word)
    }
}

fn pop_value(env: &mut TypeEnv<'_>, frame: &mut Frame, declared: TypeWord) -> Result<()> {
    if declared.is_wide() {
        frame.pop_pair_expect(declared)?;
    } else if declared.is_base() {
        frame.pop_expect(declared)?;
    } else {
        let found = frame.pop_reference()?;
        if !is_assignable(env, found, declared)?.is_compatible() {
            return Err(ErrorDetail::new(ErrorKind::IncompatibleType)
                .expected(declared)
                .found(found)
                .into());
        }
    }
    Ok(())
}

fn push_return(
    env: &mut TypeEnv<'_>,
    frame: &mut Frame,
    return_field: Option<&FieldType>,
) -> Result<()> {
    match return_field {
        Some(field_type) => {
            let word = TypeWord::from_field_type(env.names, field_type)?;
            push_value(frame, word)
        }
        None => Ok(()),
    }
}

fn with_callee<T>(result: Result<T>, class_name: &str, name: &str, descriptor: &str) -> Result<T> {
    result.map_err(|error| match error {
        VerifyError::Verification(mut detail) => {
            if detail.method_triple.is_none() {
                detail.method_triple = Some(MethodTriple {
                    class_name: class_name.to_string(),
                    name: name.to_string(),
                    descriptor: descriptor.to_string(),
                });
            }
            VerifyError::Verification(detail)
        }
        other => other,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VerifierConfig;
    use crate::names::{ClassIndex, ClassNames};
    use crate::resolver::LinkRecords;
    use crate::test_support::{MockResolver, demo_class, static_method};
    use cortado_romclass::ConstantPool;

    struct Fixture {
        class: RomClass,
        names: ClassNames,
        resolver: MockResolver,
        config: VerifierConfig,
        link_records: LinkRecords,
    }

    impl Fixture {
        fn new(pool: ConstantPool) -> Self {
            Self {
                class: demo_class(52, pool, vec![static_method("run", "()V", 4, 4, &[0xb1])]),
                names: ClassNames::new(),
                resolver: MockResolver::new(),
                config: VerifierConfig::default(),
                link_records: LinkRecords::new(),
            }
        }

        fn with_protected_checks(pool: ConstantPool) -> Self {
            let mut fixture = Self::new(pool);
            fixture.config = VerifierConfig::default().with_protected_access_check(true);
            fixture
        }
    }

    macro_rules! parts {
        ($fixture:expr) => {{
            let ctx = MethodContext::new(&$fixture.class, &$fixture.class.methods[0], &mut $fixture.names)
                .expect("context");
            let env = TypeEnv::new(
                &mut $fixture.names,
                &$fixture.resolver,
                &$fixture.config,
                &mut $fixture.link_records,
            );
            (ctx, env)
        }};
    }

    #[test]
    fn test_new_pushes_tagged_word() {
        let mut pool = ConstantPool::new();
        let class_index = pool.add_class("java/lang/String").expect("class");
        let mut fixture = Fixture::new(pool);
        let (ctx, _env) = parts!(fixture);
        let mut frame = Frame::new(0, 2);
        handle_new(&ctx, &mut frame, 7, class_index).expect("new");
        assert_eq!(frame.pop().expect("value"), TypeWord::uninit_new(7));
    }

    #[test]
    fn test_newarray() {
        let mut frame = Frame::new(0, 2);
        frame.push(TypeWord::int()).expect("count");
        handle_newarray(&mut frame, 10).expect("int array");
        assert_eq!(
            frame.pop().expect("value"),
            TypeWord::base_array(crate::types::BaseKind::Int, 1)
        );

        let mut frame = Frame::new(0, 2);
        frame.push(TypeWord::int()).expect("count");
        let error = handle_newarray(&mut frame, 3).expect_err("bad code");
        assert_eq!(error.kind(), Some(ErrorKind::BadBytecode));
    }

    #[test]
    fn test_anewarray_deepens_arity() {
        let mut pool = ConstantPool::new();
        let class_index = pool.add_class("java/lang/String").expect("class");
        let mut fixture = Fixture::new(pool);
        let (ctx, mut env) = parts!(fixture);
        let mut frame = Frame::new(0, 2);
        frame.push(TypeWord::int()).expect("count");
        handle_anewarray(&ctx, &mut env, &mut frame, class_index).expect("anewarray");
        let word = frame.pop().expect("value");
        assert_eq!(word.arity(), 1);
        assert_eq!(word.class_index(), Some(ClassIndex::STRING));
    }

    #[test]
    fn test_anewarray_at_arity_ceiling() {
        let mut pool = ConstantPool::new();
        let deep = format!("{}Ljava/lang/String;", "[".repeat(MAX_ARITY as usize));
        let class_index = pool.add_class(deep.as_str()).expect("class");
        let mut fixture = Fixture::new(pool);
        let (ctx, mut env) = parts!(fixture);
        let mut frame = Frame::new(0, 2);
        frame.push(TypeWord::int()).expect("count");
        let error = handle_anewarray(&ctx, &mut env, &mut frame, class_index).expect_err("ceiling");
        assert_eq!(error.kind(), Some(ErrorKind::ArrayArityOverflow));
    }

    #[test]
    fn test_multianewarray_dimension_check() {
        let mut pool = ConstantPool::new();
        let class_index = pool.add_class("[[Ljava/lang/String;").expect("class");
        let mut fixture = Fixture::new(pool);
        let (ctx, mut env) = parts!(fixture);

        let mut frame = Frame::new(0, 3);
        frame.push(TypeWord::int()).expect("d1");
        frame.push(TypeWord::int()).expect("d2");
        handle_multianewarray(&ctx, &mut env, &mut frame, class_index, 2).expect("multi");
        assert_eq!(frame.pop().expect("value").arity(), 2);

        let mut frame = Frame::new(0, 4);
        for _ in 0..3 {
            frame.push(TypeWord::int()).expect("dim");
        }
        let error =
            handle_multianewarray(&ctx, &mut env, &mut frame, class_index, 3).expect_err("deep");
        assert_eq!(error.kind(), Some(ErrorKind::ArrayDimensionMismatch));
    }

    #[test]
    fn test_arraylength() {
        let mut frame = Frame::new(0, 2);
        frame
            .push(TypeWord::base_array(crate::types::BaseKind::Int, 1))
            .expect("array");
        handle_arraylength(&mut frame).expect("length");
        assert_eq!(frame.pop().expect("value"), TypeWord::int());

        let mut frame = Frame::new(0, 2);
        frame.push(TypeWord::object(ClassIndex::STRING, 0)).expect("not array");
        let error = handle_arraylength(&mut frame).expect_err("length");
        assert_eq!(error.kind(), Some(ErrorKind::InvalidArrayReference));
    }

    #[test]
    fn test_getfield_checks_receiver() {
        let mut pool = ConstantPool::new();
        let field = pool
            .add_field_ref("com/example/Widget", "size", "I")
            .expect("field");
        let mut fixture = Fixture::new(pool);
        let (ctx, mut env) = parts!(fixture);

        let widget = TypeWord::object(env.names.intern("com/example/Widget").expect("intern"), 0);
        let mut frame = Frame::new(0, 2);
        frame.push(widget).expect("receiver");
        handle_field_access(&ctx, &mut env, &mut frame, op::GETFIELD, field).expect("getfield");
        assert_eq!(frame.pop().expect("value"), TypeWord::int());

        let mut frame = Frame::new(0, 2);
        frame.push(TypeWord::object(ClassIndex::STRING, 0)).expect("receiver");
        let error = handle_field_access(&ctx, &mut env, &mut frame, op::GETFIELD, field)
            .expect_err("wrong receiver");
        let detail = error.detail().expect("detail");
        assert_eq!(detail.kind, ErrorKind::IncompatibleType);
        assert_eq!(
            detail.method_triple.as_ref().map(|t| t.name.as_str()),
            Some("size")
        );
    }

    #[test]
    fn test_putfield_pops_value_then_receiver() {
        let mut pool = ConstantPool::new();
        let field = pool
            .add_field_ref("com/example/Widget", "label", "Ljava/lang/String;")
            .expect("field");
        let mut fixture = Fixture::new(pool);
        let (ctx, mut env) = parts!(fixture);

        let widget = TypeWord::object(env.names.intern("com/example/Widget").expect("intern"), 0);
        let mut frame = Frame::new(0, 2);
        frame.push(widget).expect("receiver");
        frame.push(TypeWord::object(ClassIndex::STRING, 0)).expect("value");
        handle_field_access(&ctx, &mut env, &mut frame, op::PUTFIELD, field).expect("putfield");
        assert!(frame.is_stack_empty());
    }

    #[test]
    fn test_putstatic_rejects_wrong_value() {
        let mut pool = ConstantPool::new();
        let field = pool
            .add_field_ref("com/example/Widget", "count", "J")
            .expect("field");
        let mut fixture = Fixture::new(pool);
        let (ctx, mut env) = parts!(fixture);

        let mut frame = Frame::new(0, 2);
        frame.push(TypeWord::int()).expect("value");
        let error = handle_field_access(&ctx, &mut env, &mut frame, op::PUTSTATIC, field)
            .expect_err("narrow value");
        assert_eq!(error.kind(), Some(ErrorKind::IncompatibleType));
    }

    #[test]
    fn test_invokevirtual_pops_args_and_receiver() {
        let mut pool = ConstantPool::new();
        let method = pool
            .add_method_ref("java/lang/String", "indexOf", "(I)I")
            .expect("method");
        let mut fixture = Fixture::new(pool);
        let (ctx, mut env) = parts!(fixture);

        let mut frame = Frame::new(0, 3);
        frame.push(TypeWord::object(ClassIndex::STRING, 0)).expect("receiver");
        frame.push(TypeWord::int()).expect("arg");
        handle_invokevirtual(&ctx, &mut env, &mut frame, method).expect("invoke");
        assert_eq!(frame.pop().expect("return"), TypeWord::int());
        assert!(frame.is_stack_empty());
    }

    #[test]
    fn test_invokevirtual_argument_mismatch_names_callee() {
        let mut pool = ConstantPool::new();
        let method = pool
            .add_method_ref("java/lang/String", "indexOf", "(I)I")
            .expect("method");
        let mut fixture = Fixture::new(pool);
        let (ctx, mut env) = parts!(fixture);

        let mut frame = Frame::new(0, 3);
        frame.push(TypeWord::object(ClassIndex::STRING, 0)).expect("receiver");
        frame.push(TypeWord::float()).expect("arg");
        let error =
            handle_invokevirtual(&ctx, &mut env, &mut frame, method).expect_err("arg type");
        let detail = error.detail().expect("detail");
        assert_eq!(detail.kind, ErrorKind::IncompatibleType);
        let triple = detail.method_triple.as_ref().expect("triple");
        assert_eq!(triple.class_name, "java/lang/String");
        assert_eq!(triple.name, "indexOf");
        assert_eq!(triple.descriptor, "(I)I");
    }

    #[test]
    fn test_invokeinterface_count_check() {
        let mut pool = ConstantPool::new();
        let method = pool
            .add_interface_method_ref("java/lang/CharSequence", "charAt", "(I)C")
            .expect("method");
        let mut fixture = Fixture::new(pool);
        let (ctx, mut env) = parts!(fixture);

        let mut frame = Frame::new(0, 3);
        frame.push(TypeWord::object(ClassIndex::STRING, 0)).expect("receiver");
        frame.push(TypeWord::int()).expect("arg");
        handle_invokeinterface(&ctx, &mut env, &mut frame, method, 2, 0).expect("invoke");
        assert_eq!(frame.pop().expect("return"), TypeWord::int());

        let mut frame = Frame::new(0, 3);
        frame.push(TypeWord::object(ClassIndex::STRING, 0)).expect("receiver");
        frame.push(TypeWord::int()).expect("arg");
        let error = handle_invokeinterface(&ctx, &mut env, &mut frame, method, 3, 0)
            .expect_err("count");
        assert_eq!(error.kind(), Some(ErrorKind::BadBytecode));
    }

    #[test]
    fn test_invokedynamic() {
        let mut pool = ConstantPool::new();
        let call_site = pool
            .add_invoke_dynamic("apply", "(I)Ljava/lang/Object;")
            .expect("indy");
        let mut fixture = Fixture::new(pool);
        let (ctx, mut env) = parts!(fixture);

        let mut frame = Frame::new(0, 2);
        frame.push(TypeWord::int()).expect("arg");
        handle_invokedynamic(&ctx, &mut env, &mut frame, call_site).expect("invoke");
        assert_eq!(frame.pop().expect("return"), TypeWord::java_lang_object());
    }

    #[test]
    fn test_init_on_new_rewrites_aliases() {
        let mut pool = ConstantPool::new();
        let init = pool
            .add_method_ref("java/lang/String", "<init>", "()V")
            .expect("init");
        let new_class = pool.add_class("java/lang/String").expect("class");
        let mut fixture = Fixture::new(pool);
        let (ctx, mut env) = parts!(fixture);

        // new at pc 0, then dup: two aliases of uninitialized(0)
        let code = [op::NEW, 0, u8::try_from(new_class).expect("index"), op::DUP, 0xb1];
        let bytecode = Bytecode::new(&code);
        let mut frame = Frame::new(1, 3);
        let uninit = TypeWord::uninit_new(0);
        frame.push(uninit).expect("a");
        frame.push(uninit).expect("b");
        frame.set_local(0, uninit).expect("local");

        handle_invokespecial(&ctx, &mut env, &mut frame, &bytecode, init).expect("init");
        let string = TypeWord::object(ClassIndex::STRING, 0);
        assert_eq!(frame.pop().expect("alias"), string);
        assert_eq!(frame.get_local(0).expect("local"), string);
        assert!(!frame.contains(uninit));
    }

    #[test]
    fn test_init_wrong_class_rejected() {
        let mut pool = ConstantPool::new();
        let init = pool
            .add_method_ref("java/lang/Integer", "<init>", "()V")
            .expect("init");
        let new_class = pool.add_class("java/lang/String").expect("class");
        let mut fixture = Fixture::new(pool);
        let (ctx, mut env) = parts!(fixture);

        let code = [op::NEW, 0, u8::try_from(new_class).expect("index"), 0xb1];
        let bytecode = Bytecode::new(&code);
        let mut frame = Frame::new(0, 2);
        frame.push(TypeWord::uninit_new(0)).expect("receiver");

        let error =
            handle_invokespecial(&ctx, &mut env, &mut frame, &bytecode, init).expect_err("class");
        assert_eq!(error.kind(), Some(ErrorKind::WrongInitMethod));
    }

    #[test]
    fn test_init_requires_uninitialized_receiver() {
        let mut pool = ConstantPool::new();
        let init = pool
            .add_method_ref("java/lang/String", "<init>", "()V")
            .expect("init");
        let mut fixture = Fixture::new(pool);
        let (ctx, mut env) = parts!(fixture);

        let bytecode = Bytecode::new(&[0xb1]);
        let mut frame = Frame::new(0, 2);
        frame.push(TypeWord::object(ClassIndex::STRING, 0)).expect("receiver");

        let error = handle_invokespecial(&ctx, &mut env, &mut frame, &bytecode, init)
            .expect_err("initialized");
        assert_eq!(error.kind(), Some(ErrorKind::BadInitObject));
    }

    #[test]
    fn test_init_on_this_clears_flag() {
        let mut pool = ConstantPool::new();
        let init = pool
            .add_method_ref("java/lang/Object", "<init>", "()V")
            .expect("init");
        let mut fixture = Fixture::new(pool);
        let (ctx, mut env) = parts!(fixture);

        let bytecode = Bytecode::new(&[0xb1]);
        let mut frame = Frame::new(1, 2);
        let uninit = TypeWord::uninit_this(ctx.this_class);
        frame.set_local(0, uninit).expect("local");
        frame.push(uninit).expect("receiver");
        frame.uninitialized_this = true;

        handle_invokespecial(&ctx, &mut env, &mut frame, &bytecode, init).expect("super init");
        assert!(!frame.uninitialized_this);
        assert_eq!(
            frame.get_local(0).expect("local"),
            TypeWord::object(ctx.this_class, 0)
        );
    }

    #[test]
    fn test_init_on_this_rejects_unrelated_class() {
        let mut pool = ConstantPool::new();
        let init = pool
            .add_method_ref("java/lang/String", "<init>", "()V")
            .expect("init");
        let mut fixture = Fixture::new(pool);
        let (ctx, mut env) = parts!(fixture);

        let bytecode = Bytecode::new(&[0xb1]);
        let mut frame = Frame::new(0, 2);
        frame.push(TypeWord::uninit_this(ctx.this_class)).expect("receiver");
        frame.uninitialized_this = true;

        let error = handle_invokespecial(&ctx, &mut env, &mut frame, &bytecode, init)
            .expect_err("unrelated");
        assert_eq!(error.kind(), Some(ErrorKind::WrongInitMethod));
    }

    #[test]
    fn test_protected_access_requires_subclass_receiver() {
        let mut pool = ConstantPool::new();
        let field = pool
            .add_field_ref("java/lang/Object", "guard", "I")
            .expect("field");
        let mut fixture = Fixture::with_protected_checks(pool);
        let (ctx, mut env) = parts!(fixture);

        // Receiver of an unrelated class: rejected.
        let mut frame = Frame::new(0, 2);
        frame.push(TypeWord::object(ClassIndex::STRING, 0)).expect("receiver");
        let error = handle_field_access(&ctx, &mut env, &mut frame, op::GETFIELD, field)
            .expect_err("protected");
        assert_eq!(error.kind(), Some(ErrorKind::BadAccessProtected));

        // Receiver of the current class: accepted.
        let mut frame = Frame::new(0, 2);
        frame.push(TypeWord::object(ctx.this_class, 0)).expect("receiver");
        handle_field_access(&ctx, &mut env, &mut frame, op::GETFIELD, field).expect("own receiver");
    }

    #[test]
    fn test_protected_member_of_unrelated_class_permitted() {
        let mut pool = ConstantPool::new();
        let field = pool
            .add_field_ref("java/lang/String", "guard", "I")
            .expect("field");
        let mut fixture = Fixture::with_protected_checks(pool);
        let (ctx, mut env) = parts!(fixture);

        // java/lang/String is not a superclass of the current class, so the protected rules
        // do not apply; resolution-time access checking owns this case.
        let mut frame = Frame::new(0, 2);
        frame.push(TypeWord::object(ClassIndex::STRING, 0)).expect("receiver");
        handle_field_access(&ctx, &mut env, &mut frame, op::GETFIELD, field)
            .expect("unrelated declaring class");
        assert_eq!(frame.pop().expect("value"), TypeWord::int());
    }

    #[test]
    fn test_same_package() {
        assert!(same_package("java/lang/String", "java/lang/Integer"));
        assert!(!same_package("java/lang/String", "java/io/File"));
        assert!(same_package("Simple", "Other"));
        assert!(!same_package("Simple", "java/lang/String"));
    }
}
