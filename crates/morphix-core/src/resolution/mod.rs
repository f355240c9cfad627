//! The resolution engine
//!
//! Everything between "here is a file and the type I want" and "here is the
//! value" lives in this module tree:
//!
//! - [`descriptor`]: type descriptors, the declared subtype graph and the
//!   exact/approximate match outcome
//! - [`located`]: located objects and extension rules
//! - [`capability`]: leaf converters and parsers, plus the capability trait
//! - [`chain`]: conversion chains and parser-plus-chain pipelines
//! - [`registry`]: capability storage, eager chain synthesis and ranked
//!   queries
//! - [`resolver`]: the query entry point producing executable plans
//! - [`plan`]: plan trees, execution context and child memoization
//! - [`cascade`]: ordered fallback over several candidate pipelines

pub mod capability;
pub mod cascade;
pub mod chain;
pub mod descriptor;
pub mod located;
pub mod plan;
pub mod registry;
pub mod resolver;

pub use capability::{
    AssembleAction, AtomicAction, ChildRequest, ChildrenFn, Converter, ConverterAction,
    ConverterGuard, Parser, ParserGuard, ParsingCapability,
};
pub use cascade::{CascadeCandidate, CascadePlan};
pub use chain::{ConversionChain, ParsingChain};
pub use descriptor::{MatchOutcome, StrictMode, TypeDescriptor, TypeGraph, ValueChecker};
pub use located::{check_extension, LocatedKind, LocatedObject, MULTIFILE_EXT};
pub use plan::{ChildValues, ExecMode, ExecutablePlan, ExecutionContext, PlanNode};
pub use registry::{CapabilityQuery, CapabilityRegistry, ConverterRegistry, ParserStore};
pub use resolver::{DesiredType, Resolver};
