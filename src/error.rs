//! Error taxonomy (§7).
//!
//! Mirrors how the teacher crate aggregates per-concern error enums into
//! one outer [`Error`] via hand-written `Display` and `From` impls
//! (`wasmi::v2::Error` over `GlobalError`/`MemoryError`/...), rather than
//! reaching for a derive-macro error crate.
//!
//! `TransientSamplingFailure` from §7 is deliberately not a variant here:
//! the policy is that it is always resolved internally by widening to
//! uniform sampling (see `sampler::OperandSampler`) and only ever surfaces
//! as a `log::debug!` line, never as a value the caller has to handle.

use core::fmt;
use core::fmt::Display;

/// An invalid or contradictory [`crate::config::Config`] value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError {
    pub field: &'static str,
    pub reason: &'static str,
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "invalid config field `{}`: {}", self.field, self.reason)
    }
}

/// A dropped record from the extracted-rule corpus: an unparseable line or
/// a reference to an opcode absent from [`rulegen_core::InstructionTable`].
/// Non-fatal: the record is skipped and a counter incremented (§7).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleLoadError {
    pub line: usize,
    pub reason: alloc::string::String,
}

impl Display for RuleLoadError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "failed to load rule at line {}: {}", self.line, self.reason)
    }
}

/// Failure of one of the §3 invariants. Fatal: surfaces as a crash for the
/// differential-testing harness to capture, since it means the generator
/// itself produced an inconsistent module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InternalInvariantError {
    pub invariant: &'static str,
    pub detail: alloc::string::String,
}

impl Display for InternalInvariantError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "internal invariant `{}` violated: {}",
            self.invariant, self.detail
        )
    }
}

/// An error that may occur while configuring, loading rules for, or
/// running the generator.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    Config(ConfigError),
    RuleLoad(RuleLoadError),
    InternalInvariant(InternalInvariantError),
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Config(error) => Display::fmt(error, f),
            Error::RuleLoad(error) => Display::fmt(error, f),
            Error::InternalInvariant(error) => Display::fmt(error, f),
        }
    }
}

impl From<ConfigError> for Error {
    fn from(error: ConfigError) -> Self {
        Self::Config(error)
    }
}

impl From<RuleLoadError> for Error {
    fn from(error: RuleLoadError) -> Self {
        Self::RuleLoad(error)
    }
}

impl From<InternalInvariantError> for Error {
    fn from(error: InternalInvariantError) -> Self {
        Self::InternalInvariant(error)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

#[cfg(feature = "std")]
impl std::error::Error for ConfigError {}

#[cfg(feature = "std")]
impl std::error::Error for RuleLoadError {}

#[cfg(feature = "std")]
impl std::error::Error for InternalInvariantError {}

pub type Result<T> = core::result::Result<T, Error>;
