//! Morphix Core - Typed parsing through registered capability chains
//!
//! This crate resolves "parse this located object as that type" requests
//! against a registry of parsers and converters. Missing direct parsers are
//! compensated by synthesizing parser-plus-converter pipelines, candidates
//! are ranked by match quality and pipeline length, and execution cascades
//! through them until one succeeds.
//!
//! # Main Components
//!
//! - **Error Handling**: Recoverable resolution errors vs. configuration
//!   bugs, using `thiserror` and `anyhow`
//! - **Type Graph**: A declared subtype relation driving strict and lenient
//!   matching
//! - **Registries**: Capability storage with eager conversion-chain
//!   synthesis at registration time
//! - **Plans and Cascades**: Resolution yields an executable plan tree with
//!   ordered fallback across candidates
//!
//! # Example
//!
//! ```no_run
//! use morphix_core::{
//!     CapabilityRegistry, DesiredType, ExecutionContext, LocatedObject, Resolver, Result,
//!     StrictMode, TypeDescriptor, TypeGraph,
//! };
//!
//! fn example() -> Result<()> {
//!     let registry = CapabilityRegistry::new("demo", StrictMode::Strict, TypeGraph::new());
//!     let resolver = Resolver::new(registry);
//!     let object = LocatedObject::atomic("./value.num", ".num", "42");
//!     let desired = DesiredType::Single(TypeDescriptor::named("Int"));
//!     let _value = resolver.parse(&object, &desired, &ExecutionContext::new())?;
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod resolution;

// Re-export main types for convenience
pub use error::{AttemptPhase, CascadeAttempt, CascadeAttempts, ChainError, Error, Result};
pub use resolution::{
    // Matching primitives
    MatchOutcome, StrictMode, TypeDescriptor, TypeGraph,

    // Inputs
    LocatedKind, LocatedObject, MULTIFILE_EXT,

    // Capabilities
    ChildRequest, Converter, Parser, ParsingCapability,

    // Chains
    ConversionChain, ParsingChain,

    // Registry and resolution
    CapabilityQuery, CapabilityRegistry, DesiredType, Resolver,

    // Execution
    CascadePlan, ChildValues, ExecMode, ExecutablePlan, ExecutionContext, PlanNode,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
