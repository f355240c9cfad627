//! Error types for the Morphix core library
//!
//! Two distinct error families live here, following the engine's design rule:
//! resolution-dependent outcomes (no capability found, a leaf action failed,
//! every cascade candidate exhausted) are ordinary recoverable values of
//! [`Error`], while [`ChainError`] marks an internal invariant violation during
//! chain synthesis or capability registration. A `ChainError` is always a
//! configuration bug, never a data-dependent outcome.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for Morphix resolution and execution
#[derive(Error, Debug)]
pub enum Error {
    /// The extension matched at least one capability, but none of them
    /// (leaf or synthesized chain) produces the requested type.
    #[error(
        "{location} cannot be parsed as a {desired}: no capability producing that type is \
         registered for extension {extension}. Types reachable from this extension: {reachable_types:?}"
    )]
    NoCapabilityForType {
        location: String,
        extension: String,
        desired: String,
        reachable_types: Vec<String>,
    },

    /// The requested type is producible, but not from this extension.
    #[error(
        "{location} cannot be parsed as a {desired}: no capability supporting extension \
         {extension} is registered for that type. Extensions that do yield it: {supported_extensions:?}"
    )]
    NoCapabilityForExtension {
        location: String,
        extension: String,
        desired: String,
        supported_extensions: Vec<String>,
    },

    /// Neither the extension nor the type matched any registered capability.
    #[error("{location} cannot be parsed as a {desired}: no capability matches on either axis")]
    NoCapabilityAtAll { location: String, desired: String },

    /// An internal invariant was violated while synthesizing a chain or
    /// registering a capability.
    #[error("chain construction failed: {0}")]
    ChainConstruction(#[from] ChainError),

    /// A leaf capability action failed while executing a plan.
    #[error("capability '{capability}' failed while processing {location}: {source}")]
    Execution {
        capability: String,
        location: String,
        #[source]
        source: anyhow::Error,
    },

    /// A mandatory child of a composite object was absent when the plan
    /// was built.
    #[error("capability '{capability}' requires child '{child}' which is absent from {location}")]
    MissingChild {
        capability: String,
        location: String,
        child: String,
    },

    /// A capability action returned a value that does not satisfy the
    /// requested type. This signals a buggy leaf capability, not a
    /// resolution-time failure.
    #[error(
        "capability '{capability}' returned a value that is not a valid {expected} (got: {actual})"
    )]
    WrongResultType {
        capability: String,
        expected: String,
        actual: String,
    },

    /// Every candidate pipeline failed, either while building its plan or
    /// while executing it. Attempts are listed in attempt order.
    #[error(
        "all candidates failed to parse {location} as a {desired}:\n{attempts}"
    )]
    CascadeExhausted {
        location: String,
        desired: String,
        attempts: CascadeAttempts,
    },
}

/// Convenience type alias for Results using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Invariant violations during chain synthesis and capability registration.
///
/// These never depend on the data being parsed; they indicate a
/// misconfigured capability set and should surface loudly to the caller
/// performing the registration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    /// The chain's last element is generic; nothing can be appended after it.
    #[error("cannot extend a chain whose last element is generic")]
    AppendAfterGeneric,

    /// Two adjacent elements have incompatible types under the chain's
    /// strictness mode.
    #[error("cannot link step producing '{from}' to step consuming '{to}'")]
    Incompatible { from: String, to: String },

    /// A lenient operand cannot take part in a strict concatenation; only the
    /// strict-to-lenient downgrade is allowed.
    #[error("cannot combine a lenient chain into a strict one")]
    StrictnessUpgrade,

    /// A chain must contain at least one step.
    #[error("a chain must contain at least one step")]
    EmptyChain,

    /// A parsing chain over a parser with several declared output types needs
    /// an explicit chosen type.
    #[error(
        "parser '{parser}' declares several output types; an explicit chosen type is required"
    )]
    MultipleSupportedTypes { parser: String },

    /// A capability guard must accept the all-wildcard query to be
    /// registrable.
    #[error("guard of capability '{capability}' rejects the all-wildcard query")]
    GuardRejectsWildcard { capability: String },

    /// A converter's input type can never be the wildcard.
    #[error("converter '{capability}' declares a wildcard input type")]
    WildcardInput { capability: String },

    /// Wildcard may only appear in a declared type set as its sole element.
    #[error("capability '{capability}' mixes the wildcard with concrete declared types")]
    WildcardAmongOthers { capability: String },

    /// Declared type sets and extension sets must be non-empty.
    #[error("capability '{capability}' declares no {what}")]
    EmptyDeclaration { capability: String, what: String },

    /// Extensions must start with '.' and contain exactly one '.', or be the
    /// reserved multifile extension.
    #[error("invalid extension '{extension}' for capability '{capability}'")]
    InvalidExtension {
        capability: String,
        extension: String,
    },
}

/// Which phase of a cascade candidate failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttemptPhase {
    /// Building the candidate's execution plan failed.
    Build,
    /// Executing the candidate's plan failed.
    Execute,
}

impl fmt::Display for AttemptPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptPhase::Build => write!(f, "build"),
            AttemptPhase::Execute => write!(f, "execute"),
        }
    }
}

/// One failed cascade candidate, individually inspectable.
#[derive(Debug, Clone)]
pub struct CascadeAttempt {
    /// Identifier of the candidate capability that was tried.
    pub capability: String,
    /// Whether plan building or plan execution failed.
    pub phase: AttemptPhase,
    /// The error the candidate failed with.
    pub error: Arc<Error>,
}

/// Ordered list of cascade attempts, rendered one per line.
#[derive(Debug, Clone, Default)]
pub struct CascadeAttempts(pub Vec<CascadeAttempt>);

impl fmt::Display for CascadeAttempts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, attempt) in self.0.iter().enumerate() {
            writeln!(
                f,
                "  {}. [{}] '{}': {}",
                i + 1,
                attempt.phase,
                attempt.capability,
                attempt.error
            )?;
        }
        Ok(())
    }
}
