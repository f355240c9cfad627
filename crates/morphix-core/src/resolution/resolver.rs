//! Resolution entry point
//!
//! The [`Resolver`] wraps a finished [`CapabilityRegistry`] and turns
//! located-object-plus-desired-type requests into executable plans: a single
//! pipeline when exactly one capability matches, a cascade when several do,
//! and a precise "why not" error when none does.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::error::{Error, Result};

use super::cascade::{CascadeCandidate, CascadePlan};
use super::descriptor::{TypeDescriptor, TypeGraph};
use super::located::LocatedObject;
use super::plan::{ExecutablePlan, ExecutionContext, PlanNode};
use super::registry::CapabilityRegistry;

/// What the caller wants out of an object: one type, or any of several
/// alternatives tried in order of preference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DesiredType {
    Single(TypeDescriptor),
    OneOf(Vec<TypeDescriptor>),
}

impl DesiredType {
    pub fn alternatives(&self) -> &[TypeDescriptor] {
        match self {
            DesiredType::Single(t) => std::slice::from_ref(t),
            DesiredType::OneOf(ts) => ts,
        }
    }
}

impl From<TypeDescriptor> for DesiredType {
    fn from(t: TypeDescriptor) -> Self {
        DesiredType::Single(t)
    }
}

impl fmt::Display for DesiredType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DesiredType::Single(t) => write!(f, "{}", t),
            DesiredType::OneOf(ts) => {
                let names: Vec<String> = ts.iter().map(|t| t.to_string()).collect();
                write!(f, "one of [{}]", names.join(", "))
            }
        }
    }
}

/// Read-only view over a registry that resolves requests into plans.
///
/// Cheap to clone; cascades keep a copy so they can build fallback plans
/// lazily.
#[derive(Clone)]
pub struct Resolver {
    registry: Arc<CapabilityRegistry>,
}

impl fmt::Debug for Resolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver")
            .field("registry", &self.registry.name())
            .finish()
    }
}

impl Resolver {
    /// Freeze a registry for querying. Later registrations require building
    /// a new resolver.
    pub fn new(registry: CapabilityRegistry) -> Self {
        Resolver {
            registry: Arc::new(registry),
        }
    }

    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    pub(crate) fn graph(&self) -> Arc<TypeGraph> {
        self.registry.graph_arc()
    }

    /// Resolve a request into an executable plan.
    ///
    /// Alternatives of a one-of request are resolved independently and
    /// their candidates pooled, each remembering which alternative it was
    /// matched for. One overall candidate yields a single pipeline; more
    /// yield a cascade, best candidate first.
    pub fn resolve(&self, object: &LocatedObject, desired: &DesiredType) -> Result<ExecutablePlan> {
        let ext = object.extension();
        let alternatives = desired.alternatives();
        let mut candidates: Vec<CascadeCandidate> = Vec::new();
        let mut misses: Vec<Error> = Vec::new();

        for alt in alternatives {
            match self.candidates_for(object, alt, ext) {
                Ok(found) => candidates.extend(found),
                Err(err) => {
                    if alternatives.len() > 1 {
                        log::warn!(
                            "no capability for alternative {} of {}: {}",
                            alt,
                            object.location,
                            err
                        );
                    }
                    misses.push(err);
                }
            }
        }

        if candidates.is_empty() {
            return Err(match misses.len() {
                1 => misses.into_iter().next().unwrap(),
                _ => Error::NoCapabilityAtAll {
                    location: object.location.clone(),
                    desired: desired.to_string(),
                },
            });
        }

        log::debug!(
            "{} candidate(s) to parse {} as {}",
            candidates.len(),
            object.location,
            desired
        );
        if candidates.len() == 1 {
            let (alt, capability) = candidates.into_iter().next().unwrap();
            let plan = PlanNode::new(self, capability, alt, object)?;
            Ok(ExecutablePlan::Single(plan))
        } else {
            let cascade =
                CascadePlan::new(self.clone(), object, desired.to_string(), candidates)?;
            Ok(ExecutablePlan::Cascade(cascade))
        }
    }

    /// Resolve and execute in one go.
    pub fn parse(
        &self,
        object: &LocatedObject,
        desired: &DesiredType,
        ctx: &ExecutionContext,
    ) -> Result<Value> {
        let mut plan = self.resolve(object, desired)?;
        plan.execute(ctx)
    }

    /// Candidates for one alternative, best first, or a diagnosis of which
    /// axis failed.
    fn candidates_for(
        &self,
        object: &LocatedObject,
        desired: &TypeDescriptor,
        ext: &str,
    ) -> Result<Vec<CascadeCandidate>> {
        let q = self
            .registry
            .find_all_matching(self.registry.strict(), Some(desired), Some(ext));
        if q.has_match() {
            return Ok(q
                .ranked_best_first()
                .into_iter()
                .map(|c| (desired.clone(), c))
                .collect());
        }

        if !q.ext_only.is_empty() {
            Err(Error::NoCapabilityForType {
                location: object.location.clone(),
                extension: ext.to_string(),
                desired: desired.to_string(),
                reachable_types: self.registry.types_for_extension(ext),
            })
        } else if !q.type_only.is_empty() {
            Err(Error::NoCapabilityForExtension {
                location: object.location.clone(),
                extension: ext.to_string(),
                desired: desired.to_string(),
                supported_extensions: self.registry.extensions_for_type(desired),
            })
        } else {
            Err(Error::NoCapabilityAtAll {
                location: object.location.clone(),
                desired: desired.to_string(),
            })
        }
    }
}
