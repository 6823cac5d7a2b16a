//! # Per-Class Verification Driver
//!
//! Orchestrates the two passes for every method of a class: decode-and-check when a
//! `StackMapTable` is declared, synthesis-then-check otherwise, with the legacy retry (rerun
//! through synthesis) when a declared-map check fails on a class that predates the attribute.
//!
//! The driver owns the shared state of §resource handling: the per-class name table, the
//! deferred relationship records, and the per-method buffers that are reused (rather than
//! reallocated) from method to method. All of it lives behind one mutex so verification of a
//! class is a single critical section.

use parking_lot::Mutex;
use tracing::{debug, info};

use cortado_romclass::{RomClass, RomMethod};

use crate::checker::verify_bytecodes;
use crate::config::VerifierConfig;
use crate::control_flow::{BytecodeMap, StackMaps};
use crate::diagnostics::VerificationTrace;
use crate::error::{ErrorDetail, Result, VerifyError};
use crate::handlers::MethodContext;
use crate::inference::synthesize_stack_maps;
use crate::lattice::TypeEnv;
use crate::names::ClassNames;
use crate::resolver::{ClassResolver, LinkRecords};
use crate::stackmap::decode_stack_map_table;

/// Which pipeline verified a method.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum VerificationPath {
    /// Declared `StackMapTable` frames checked linearly.
    DeclaredMaps,
    /// Frames synthesised by dataflow, then checked linearly.
    Synthesis,
    /// Declared-map checking failed; the method re-verified through synthesis.
    SynthesisFallback,
    /// Native or abstract method; nothing to verify.
    Skipped,
}

/// The outcome for one method.
#[derive(Debug)]
pub struct MethodVerification {
    /// `name` + `descriptor` of the method.
    pub method: String,
    /// The pipeline that produced the outcome.
    pub path: VerificationPath,
    /// The latched first failure, if the method did not verify.
    pub error: Option<ErrorDetail>,
}

impl MethodVerification {
    /// `true` when the method verified.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// The outcome for a class: one entry per method, plus the deferred relationship queries.
#[derive(Debug)]
pub struct ClassVerification {
    /// The class name.
    pub class_name: String,
    /// Per-method outcomes, in method-table order.
    pub methods: Vec<MethodVerification>,
    /// Deferred `(subclass, superclass)` queries to replay at link time. Non-empty means the
    /// class requires a link-time recheck.
    pub link_records: Vec<(String, String)>,
}

impl ClassVerification {
    /// `true` when every method verified.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.methods.iter().all(MethodVerification::is_ok)
    }

    /// `true` when any deferred query must be replayed at link time.
    #[must_use]
    pub fn requires_link_recheck(&self) -> bool {
        !self.link_records.is_empty()
    }

    /// The first failing method's outcome, if any.
    #[must_use]
    pub fn first_error(&self) -> Option<&MethodVerification> {
        self.methods.iter().find(|outcome| !outcome.is_ok())
    }
}

/// Per-method buffers, reused across the methods of a class.
#[derive(Debug, Default)]
struct Buffers {
    map: BytecodeMap,
    stack_maps: StackMaps,
}

/// The bytecode verifier.
///
/// One `Verifier` holds the process-wide verification state behind a single mutex; verifying
/// a class locks it for the duration. A [`ClassResolver`] that transitively needs another
/// class verified must run that nested verification on a separate `Verifier` (or after this
/// class completes) — re-entering the same instance from inside a resolver call deadlocks.
#[derive(Debug)]
pub struct Verifier {
    config: VerifierConfig,
    buffers: Mutex<Buffers>,
}

impl Verifier {
    /// Create a verifier with the given configuration.
    #[must_use]
    pub fn new(config: VerifierConfig) -> Self {
        Self {
            config,
            buffers: Mutex::new(Buffers::default()),
        }
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &VerifierConfig {
        &self.config
    }

    /// Whether a class from the given origin should be verified at all.
    #[must_use]
    pub fn should_verify(&self, bootstrap: bool) -> bool {
        self.config.should_verify(bootstrap)
    }

    /// Verify every method of a class.
    ///
    /// Verification failures are collected per method; the per-class result also carries the
    /// deferred relationship queries accumulated by the type lattice.
    ///
    /// # Errors
    /// Returns an error only for environmental failures: a class that cannot be loaded
    /// mid-query, or resolver memory exhaustion. Per-method verification failures are part of
    /// the returned [`ClassVerification`].
    pub fn verify_class(
        &self,
        class: &RomClass,
        resolver: &dyn ClassResolver,
    ) -> Result<ClassVerification> {
        let mut buffers = self.buffers.lock();

        // Name table and relationship records are per class; well-known indices preload.
        let mut names = ClassNames::new();
        let mut link_records = LinkRecords::new();

        let mut methods = Vec::with_capacity(class.methods.len());
        for method in &class.methods {
            let outcome = self.verify_method(
                class,
                method,
                resolver,
                &mut names,
                &mut link_records,
                &mut buffers,
            )?;
            if self.config.verbose() {
                info!(
                    class = %class.name,
                    method = %method,
                    path = ?outcome.path,
                    ok = outcome.is_ok(),
                    "verified method"
                );
            } else {
                debug!(
                    class = %class.name,
                    method = %method,
                    path = ?outcome.path,
                    ok = outcome.is_ok(),
                    "verified method"
                );
            }
            methods.push(outcome);
        }

        Ok(ClassVerification {
            class_name: class.name.clone(),
            methods,
            link_records: link_records.take(),
        })
    }

    fn verify_method(
        &self,
        class: &RomClass,
        method: &RomMethod,
        resolver: &dyn ClassResolver,
        names: &mut ClassNames,
        link_records: &mut LinkRecords,
        buffers: &mut Buffers,
    ) -> Result<MethodVerification> {
        if method.is_native_or_abstract() {
            return Ok(MethodVerification {
                method: method.to_string(),
                path: VerificationPath::Skipped,
                error: None,
            });
        }

        let declared_maps = method.stack_map_table.as_deref().filter(|_| {
            !self.config.ignore_stack_maps()
                && self.config.exclude_attribute.as_deref() != Some("StackMapTable")
        });

        let (path, result) = match declared_maps {
            Some(raw) => {
                let result =
                    self.run_declared(class, method, resolver, names, link_records, buffers, raw);
                match result {
                    Err(VerifyError::Verification(detail))
                        if detail.kind.is_fatal()
                            && !self.config.no_fallback()
                            && class.predates_stack_maps() =>
                    {
                        // Legacy classes may carry stale maps: drop the declared frames and
                        // re-verify from scratch.
                        debug!(class = %class.name, method = %method, "retrying via synthesis");
                        let retry = self.run_synthesis(
                            class,
                            method,
                            resolver,
                            names,
                            link_records,
                            buffers,
                        );
                        (VerificationPath::SynthesisFallback, retry)
                    }
                    other => (VerificationPath::DeclaredMaps, other),
                }
            }
            None => {
                let result =
                    self.run_synthesis(class, method, resolver, names, link_records, buffers);
                (VerificationPath::Synthesis, result)
            }
        };

        match result {
            Ok(()) => Ok(MethodVerification {
                method: method.to_string(),
                path,
                error: None,
            }),
            Err(VerifyError::Verification(detail)) => Ok(MethodVerification {
                method: method.to_string(),
                path,
                error: Some(detail),
            }),
            Err(environmental) => Err(environmental),
        }
    }

    #[expect(clippy::too_many_arguments)]
    fn run_declared(
        &self,
        class: &RomClass,
        method: &RomMethod,
        resolver: &dyn ClassResolver,
        names: &mut ClassNames,
        link_records: &mut LinkRecords,
        buffers: &mut Buffers,
        raw: &[u8],
    ) -> Result<()> {
        let ctx = MethodContext::new(class, method, names)?;
        let entry_frame = ctx.entry_frame()?;
        let code_length = u32::try_from(method.code.len())?;

        buffers.map.reset(code_length);
        buffers.stack_maps.reset();

        let mut env = TypeEnv::new(names, resolver, &self.config, link_records);
        decode_stack_map_table(
            &ctx,
            &mut env,
            raw,
            &entry_frame,
            code_length,
            &mut buffers.map,
            &mut buffers.stack_maps,
        )?;

        let mut trace = VerificationTrace::new(self.config.verbose());
        let result = verify_bytecodes(&ctx, &mut env, &buffers.map, &buffers.stack_maps, &mut trace);
        if trace.is_enabled() {
            debug!(class = %class.name, method = %method, trace = %trace.format(env.names), "declared-map check");
        }
        result
    }

    fn run_synthesis(
        &self,
        class: &RomClass,
        method: &RomMethod,
        resolver: &dyn ClassResolver,
        names: &mut ClassNames,
        link_records: &mut LinkRecords,
        buffers: &mut Buffers,
    ) -> Result<()> {
        let ctx = MethodContext::new(class, method, names)?;

        let mut env = TypeEnv::new(names, resolver, &self.config, link_records);
        synthesize_stack_maps(&ctx, &mut env, &mut buffers.map, &mut buffers.stack_maps)?;

        let mut trace = VerificationTrace::new(self.config.verbose());
        let result = verify_bytecodes(&ctx, &mut env, &buffers.map, &buffers.stack_maps, &mut trace);
        if trace.is_enabled() {
            debug!(class = %class.name, method = %method, trace = %trace.format(env.names), "synthesis check");
        }
        result
    }
}
