//! # Verifier Configuration
//!
//! Options controlling pass selection, fallback behaviour, and diagnostic output, plus the
//! `verify[:opt[,opt]*]` command-line grammar that produces them.
//!
//! # Example
//!
//! ```rust,ignore
//! use cortado_verifier::VerifierConfig;
//!
//! let config = VerifierConfig::parse("verify:ignorestackmaps,verbose")?;
//! let strict = VerifierConfig::default().with_no_fallback(true);
//! ```

use bitflags::bitflags;
use std::fmt;

bitflags! {
    /// Boolean options for the verifier configuration.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct VerifierFlags: u16 {
        /// Force stack-map synthesis even when a `StackMapTable` is present.
        const IGNORE_STACK_MAPS = 0x0001;
        /// Disable the synthesis retry after a checking-pass failure.
        const NO_FALLBACK = 0x0002;
        /// Enable the local-liveness optimisation in the frame merge.
        const OPTIMIZE = 0x0004;
        /// Enable the protected-member access check.
        const DO_PROTECTED_ACCESS_CHECK = 0x0008;
        /// Treat bootclasspath classes as fully resolved.
        const BOOTCLASSPATH_STATIC = 0x0010;
        /// Defer class loading during assignability: record relationships for link time.
        const CLASS_RELATIONSHIP_VERIFIER = 0x0020;
        /// With relationship recording, do not consult the shared-class cache.
        const IGNORE_SHARED_CACHE = 0x0040;
        /// Emit per-method progress output.
        const VERBOSE_VERIFICATION = 0x0080;
        /// Capture extended detail on verification failures.
        const VERIFY_ERROR_DETAILS = 0x0100;
        /// Do not verify bootclasspath classes.
        const SKIP_BOOTSTRAP_CLASSES = 0x0200;
    }
}

/// Error produced when the option grammar cannot be parsed.
#[derive(Debug, thiserror::Error, PartialEq)]
#[error("Invalid verify option: {0}")]
pub struct InvalidOption(pub String);

/// Main verifier configuration.
///
/// Flags select pass behaviour; `exclude_attribute` names an optional ROM class attribute the
/// verifier skips entirely.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VerifierConfig {
    /// Boolean option flags.
    pub flags: VerifierFlags,
    /// Name of an optional attribute to ignore, if any.
    pub exclude_attribute: Option<String>,
}

impl VerifierConfig {
    /// Creates a new configuration with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses the `verify[:opt[,opt]*]` command-line grammar.
    ///
    /// A bare `verify` resets any previously accumulated options.
    ///
    /// # Errors
    ///
    /// Returns an error if the text does not start with `verify` or names an unknown option.
    pub fn parse(text: &str) -> Result<Self, InvalidOption> {
        let mut config = Self::default();
        config.apply(text)?;
        Ok(config)
    }

    /// Applies one `verify[:opt[,opt]*]` argument on top of the current configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the text does not start with `verify` or names an unknown option.
    pub fn apply(&mut self, text: &str) -> Result<(), InvalidOption> {
        let options = match text.strip_prefix("verify") {
            Some("") => {
                // bare `verify` resets prior settings
                *self = Self::default();
                return Ok(());
            }
            Some(rest) => rest
                .strip_prefix(':')
                .ok_or_else(|| InvalidOption(text.to_string()))?,
            None => return Err(InvalidOption(text.to_string())),
        };

        for option in options.split(',') {
            match option {
                "ignorestackmaps" => self.flags |= VerifierFlags::IGNORE_STACK_MAPS,
                "nofallback" => self.flags |= VerifierFlags::NO_FALLBACK,
                "opt" => self.flags |= VerifierFlags::OPTIMIZE,
                "doProtectedAccessCheck" => {
                    self.flags |= VerifierFlags::DO_PROTECTED_ACCESS_CHECK;
                }
                "bootclasspathstatic" => self.flags |= VerifierFlags::BOOTCLASSPATH_STATIC,
                "classRelationshipVerifier" => {
                    self.flags |= VerifierFlags::CLASS_RELATIONSHIP_VERIFIER;
                }
                "classRelationshipVerifierIgnoreSCC" => {
                    self.flags |= VerifierFlags::CLASS_RELATIONSHIP_VERIFIER
                        | VerifierFlags::IGNORE_SHARED_CACHE;
                }
                "verbose" => self.flags |= VerifierFlags::VERBOSE_VERIFICATION,
                "errorDetails" => self.flags |= VerifierFlags::VERIFY_ERROR_DETAILS,
                "skipbootstrapclasses" => self.flags |= VerifierFlags::SKIP_BOOTSTRAP_CLASSES,
                _ => {
                    if let Some(name) = option.strip_prefix("exclude_attribute=") {
                        if name.is_empty() {
                            return Err(InvalidOption(option.to_string()));
                        }
                        self.exclude_attribute = Some(name.to_string());
                    } else {
                        return Err(InvalidOption(option.to_string()));
                    }
                }
            }
        }

        Ok(())
    }

    /// Sets or clears forced stack-map synthesis.
    #[must_use]
    pub fn with_ignore_stack_maps(mut self, ignore: bool) -> Self {
        self.flags.set(VerifierFlags::IGNORE_STACK_MAPS, ignore);
        self
    }

    /// Sets or clears the fallback disable flag.
    #[must_use]
    pub fn with_no_fallback(mut self, no_fallback: bool) -> Self {
        self.flags.set(VerifierFlags::NO_FALLBACK, no_fallback);
        self
    }

    /// Enables or disables the protected-member access check.
    #[must_use]
    pub fn with_protected_access_check(mut self, check: bool) -> Self {
        self.flags
            .set(VerifierFlags::DO_PROTECTED_ACCESS_CHECK, check);
        self
    }

    /// Enables or disables deferred class-relationship recording.
    #[must_use]
    pub fn with_class_relationship_verifier(mut self, record: bool) -> Self {
        self.flags
            .set(VerifierFlags::CLASS_RELATIONSHIP_VERIFIER, record);
        self
    }

    /// Enables or disables verbose per-method output.
    #[must_use]
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.flags.set(VerifierFlags::VERBOSE_VERIFICATION, verbose);
        self
    }

    /// Returns whether stack-map synthesis is forced.
    #[must_use]
    pub fn ignore_stack_maps(&self) -> bool {
        self.flags.contains(VerifierFlags::IGNORE_STACK_MAPS)
    }

    /// Returns whether the synthesis retry is disabled.
    #[must_use]
    pub fn no_fallback(&self) -> bool {
        self.flags.contains(VerifierFlags::NO_FALLBACK)
    }

    /// Returns whether the local-liveness merge optimisation is enabled.
    #[must_use]
    pub fn optimize(&self) -> bool {
        self.flags.contains(VerifierFlags::OPTIMIZE)
    }

    /// Returns whether protected-member accesses are checked.
    #[must_use]
    pub fn protected_access_check(&self) -> bool {
        self.flags.contains(VerifierFlags::DO_PROTECTED_ACCESS_CHECK)
    }

    /// Returns whether assignability queries defer to link-time records.
    #[must_use]
    pub fn class_relationship_verifier(&self) -> bool {
        self.flags.contains(VerifierFlags::CLASS_RELATIONSHIP_VERIFIER)
    }

    /// Returns whether bootclasspath classes are treated as fully resolved.
    ///
    /// Advisory to the embedding resolver: with this set it should never answer
    /// `NotYetLoaded` for a bootclasspath class.
    #[must_use]
    pub fn bootclasspath_static(&self) -> bool {
        self.flags.contains(VerifierFlags::BOOTCLASSPATH_STATIC)
    }

    /// Returns whether the shared-class cache is bypassed during relationship recording.
    #[must_use]
    pub fn ignore_shared_cache(&self) -> bool {
        self.flags.contains(VerifierFlags::IGNORE_SHARED_CACHE)
    }

    /// Returns whether verbose output is enabled.
    #[must_use]
    pub fn verbose(&self) -> bool {
        self.flags.contains(VerifierFlags::VERBOSE_VERIFICATION)
    }

    /// Returns whether extended failure detail is captured.
    #[must_use]
    pub fn error_details(&self) -> bool {
        self.flags.contains(VerifierFlags::VERIFY_ERROR_DETAILS)
    }

    /// Checks whether a class from the given origin should be verified at all.
    #[must_use]
    pub fn should_verify(&self, bootstrap: bool) -> bool {
        !(bootstrap && self.flags.contains(VerifierFlags::SKIP_BOOTSTRAP_CLASSES))
    }
}

impl fmt::Display for VerifierConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "verify({:#06x})", self.flags.bits())
    }
}
