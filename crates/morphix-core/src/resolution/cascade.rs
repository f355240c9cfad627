//! Cascading execution over ranked candidate pipelines
//!
//! When several capabilities can serve a request, the resolver wraps them in
//! a [`CascadePlan`]: candidates are tried best first, and a candidate that
//! fails to build its plan or fails during execution is recorded and the
//! next one takes over. Once every candidate has failed the cascade is
//! exhausted and reports every attempt it made, in order.
//!
//! Copyright (c) 2026 Morphix Team
//! Licensed under the MIT OR Apache-2.0 license

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::error::{AttemptPhase, CascadeAttempt, CascadeAttempts, Error, Result};

use super::capability::ParsingCapability;
use super::descriptor::TypeDescriptor;
use super::located::LocatedObject;
use super::plan::{ExecutionContext, PlanNode};
use super::resolver::Resolver;

/// One ranked candidate: the desired type it was matched for (alternatives
/// of a one-of request keep their own origin type) and the capability.
pub type CascadeCandidate = (TypeDescriptor, Arc<dyn ParsingCapability>);

enum CascadeState {
    Active { index: usize, plan: Box<PlanNode> },
    Exhausted,
}

/// Tries candidate pipelines in order until one succeeds.
///
/// Construction already activates the first candidate whose plan builds;
/// build failures count as attempts just like execution failures. After
/// exhaustion every further `execute` call returns the same aggregate error.
pub struct CascadePlan {
    object: LocatedObject,
    desired_label: String,
    resolver: Resolver,
    candidates: Vec<CascadeCandidate>,
    state: CascadeState,
    attempts: Vec<CascadeAttempt>,
}

impl fmt::Debug for CascadePlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CascadePlan")
            .field("location", &self.object.location)
            .field("desired", &self.desired_label)
            .field("candidates", &self.describe())
            .field("attempts", &self.attempts.len())
            .finish()
    }
}

impl CascadePlan {
    /// Build a cascade over `candidates`, best first. Fails immediately when
    /// no candidate can build its plan.
    pub fn new(
        resolver: Resolver,
        object: &LocatedObject,
        desired_label: String,
        candidates: Vec<CascadeCandidate>,
    ) -> Result<Self> {
        let mut cascade = CascadePlan {
            object: object.clone(),
            desired_label,
            resolver,
            candidates,
            state: CascadeState::Exhausted,
            attempts: Vec::new(),
        };
        cascade.advance(0)?;
        Ok(cascade)
    }

    /// Identifier of the capability currently holding the plan, if any.
    pub fn active_capability(&self) -> Option<String> {
        match &self.state {
            CascadeState::Active { plan, .. } => Some(plan.capability_id()),
            CascadeState::Exhausted => None,
        }
    }

    /// Every failed attempt so far, in the order they were made.
    pub fn attempts(&self) -> &[CascadeAttempt] {
        &self.attempts
    }

    pub fn describe(&self) -> String {
        let ids: Vec<String> = self.candidates.iter().map(|(_, c)| c.id()).collect();
        format!("cascade[{}]", ids.join(" | "))
    }

    pub fn execute(&mut self, ctx: &ExecutionContext) -> Result<Value> {
        loop {
            let (index, plan) = match &mut self.state {
                CascadeState::Exhausted => return Err(self.exhausted_error()),
                CascadeState::Active { index, plan } => (*index, plan),
            };
            match plan.execute(ctx) {
                Ok(value) => return Ok(value),
                Err(err) => {
                    let capability = plan.capability_id();
                    log::warn!(
                        "'{}' failed on {}, falling back to next candidate: {}",
                        capability,
                        self.object.location,
                        err
                    );
                    self.attempts.push(CascadeAttempt {
                        capability,
                        phase: AttemptPhase::Execute,
                        error: Arc::new(err),
                    });
                    self.advance(index + 1)?;
                }
            }
        }
    }

    /// Activate the first candidate from `start` whose plan builds,
    /// recording build failures along the way.
    fn advance(&mut self, start: usize) -> Result<()> {
        for i in start..self.candidates.len() {
            let (desired, capability) = &self.candidates[i];
            match PlanNode::new(
                &self.resolver,
                Arc::clone(capability),
                desired.clone(),
                &self.object,
            ) {
                Ok(plan) => {
                    log::debug!(
                        "cascade for {} activated candidate {} '{}'",
                        self.object.location,
                        i,
                        capability.id()
                    );
                    self.state = CascadeState::Active {
                        index: i,
                        plan: Box::new(plan),
                    };
                    return Ok(());
                }
                Err(err) => {
                    log::warn!(
                        "candidate '{}' cannot build a plan for {}: {}",
                        capability.id(),
                        self.object.location,
                        err
                    );
                    self.attempts.push(CascadeAttempt {
                        capability: capability.id(),
                        phase: AttemptPhase::Build,
                        error: Arc::new(err),
                    });
                }
            }
        }
        self.state = CascadeState::Exhausted;
        Err(self.exhausted_error())
    }

    fn exhausted_error(&self) -> Error {
        Error::CascadeExhausted {
            location: self.object.location.clone(),
            desired: self.desired_label.clone(),
            attempts: CascadeAttempts(self.attempts.clone()),
        }
    }
}
