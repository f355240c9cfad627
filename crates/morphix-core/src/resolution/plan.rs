//! Execution plans
//!
//! Resolution produces a plan before any leaf action runs. A [`PlanNode`]
//! binds one capability to one located object, with the plans for any
//! composite children resolved recursively up front, so a plan that builds
//! successfully has every capability it will ever need already picked.
//! Execution then walks the tree, checks every produced value against the
//! requested type, and never consults the registries again.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::error::{Error, Result};

use super::capability::ParsingCapability;
use super::cascade::CascadePlan;
use super::descriptor::{TypeDescriptor, TypeGraph};
use super::located::LocatedObject;
use super::resolver::Resolver;

/// When composite children are executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecMode {
    /// All children run, in name order, before the parent assembles.
    #[default]
    Eager,
    /// A child runs the first time the assembling action asks for it.
    Lazy,
}

/// Options and mode shared by every node of an executing plan.
///
/// Options are keyed by capability id; a capability sees only its own
/// section.
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    mode: ExecMode,
    options: BTreeMap<String, serde_json::Map<String, Value>>,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mode(mut self, mode: ExecMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_options(
        mut self,
        capability_id: impl Into<String>,
        options: serde_json::Map<String, Value>,
    ) -> Self {
        self.options.insert(capability_id.into(), options);
        self
    }

    pub fn mode(&self) -> ExecMode {
        self.mode
    }

    /// The option section for one capability; empty when none was provided.
    pub fn options_for(&self, capability_id: &str) -> serde_json::Map<String, Value> {
        self.options.get(capability_id).cloned().unwrap_or_default()
    }
}

/// Memoizing accessor over a node's child plans, handed to assembling
/// actions. Each child executes at most once per parent execution; in eager
/// mode they have all run before the assembler is called.
pub struct ChildValues<'a> {
    owner: &'a str,
    location: &'a str,
    plans: &'a mut BTreeMap<String, ExecutablePlan>,
    cache: BTreeMap<String, Value>,
    ctx: &'a ExecutionContext,
}

impl<'a> ChildValues<'a> {
    pub(crate) fn new(
        owner: &'a str,
        location: &'a str,
        plans: &'a mut BTreeMap<String, ExecutablePlan>,
        ctx: &'a ExecutionContext,
    ) -> Self {
        ChildValues {
            owner,
            location,
            plans,
            cache: BTreeMap::new(),
            ctx,
        }
    }

    /// Names of the children that resolved to a plan, in order.
    pub fn names(&self) -> Vec<String> {
        self.plans.keys().cloned().collect()
    }

    pub fn ctx(&self) -> &ExecutionContext {
        self.ctx
    }

    /// The value of one child, executing its plan on first access. `None`
    /// when no plan exists under that name (an optional child that was
    /// absent).
    pub fn get(&mut self, name: &str) -> Result<Option<Value>> {
        if let Some(v) = self.cache.get(name) {
            return Ok(Some(v.clone()));
        }
        let plan = match self.plans.get_mut(name) {
            None => return Ok(None),
            Some(p) => p,
        };
        let value = plan.execute(self.ctx)?;
        self.cache.insert(name.to_string(), value.clone());
        Ok(Some(value))
    }

    /// Like [`get`](Self::get) but absence is an error.
    pub fn require(&mut self, name: &str) -> Result<Value> {
        self.get(name)?.ok_or_else(|| Error::MissingChild {
            capability: self.owner.to_string(),
            location: self.location.to_string(),
            child: name.to_string(),
        })
    }

    pub(crate) fn materialize_all(&mut self) -> Result<()> {
        for name in self.names() {
            self.get(&name)?;
        }
        Ok(())
    }
}

/// One capability bound to one located object, children pre-resolved.
pub struct PlanNode {
    desired_type: TypeDescriptor,
    object: LocatedObject,
    capability: Arc<dyn ParsingCapability>,
    children: BTreeMap<String, ExecutablePlan>,
    graph: Arc<TypeGraph>,
}

impl fmt::Debug for PlanNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlanNode")
            .field("capability", &self.capability.id())
            .field("desired_type", &self.desired_type)
            .field("location", &self.object.location)
            .field("children", &self.children.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl PlanNode {
    /// Bind `capability` to `object`, resolving child plans recursively.
    /// Fails when a mandatory child is absent or a child cannot be resolved.
    pub fn new(
        resolver: &Resolver,
        capability: Arc<dyn ParsingCapability>,
        desired_type: TypeDescriptor,
        object: &LocatedObject,
    ) -> Result<Self> {
        let children = capability.build_children(resolver, &desired_type, object)?;
        Ok(PlanNode {
            desired_type,
            object: object.clone(),
            capability,
            children,
            graph: resolver.graph(),
        })
    }

    pub fn capability_id(&self) -> String {
        self.capability.id()
    }

    pub fn desired_type(&self) -> &TypeDescriptor {
        &self.desired_type
    }

    pub fn location(&self) -> &str {
        &self.object.location
    }

    /// Run the capability and verify the produced value satisfies the
    /// desired type.
    pub fn execute(&mut self, ctx: &ExecutionContext) -> Result<Value> {
        let capability = Arc::clone(&self.capability);
        let id = capability.id();
        log::debug!(
            "executing '{}' on {} for type {}",
            id,
            self.object.location,
            self.desired_type
        );
        let mut children = ChildValues::new(&id, &self.object.location, &mut self.children, ctx);
        if ctx.mode() == ExecMode::Eager {
            children.materialize_all()?;
        }
        let value = capability.run(&self.desired_type, &self.object, &mut children, ctx)?;
        if !self.graph.value_satisfies(&self.desired_type, &value) {
            return Err(Error::WrongResultType {
                capability: id,
                expected: self.desired_type.to_string(),
                actual: describe_value(&value),
            });
        }
        Ok(value)
    }
}

/// A ready-to-run resolution outcome: either a single pipeline or a cascade
/// over several candidates.
pub enum ExecutablePlan {
    Single(PlanNode),
    Cascade(CascadePlan),
}

impl fmt::Debug for ExecutablePlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutablePlan::Single(node) => node.fmt(f),
            ExecutablePlan::Cascade(c) => c.fmt(f),
        }
    }
}

impl ExecutablePlan {
    pub fn execute(&mut self, ctx: &ExecutionContext) -> Result<Value> {
        match self {
            ExecutablePlan::Single(node) => node.execute(ctx),
            ExecutablePlan::Cascade(cascade) => cascade.execute(ctx),
        }
    }

    /// Identifier of the active capability, for diagnostics.
    pub fn capability_id(&self) -> String {
        match self {
            ExecutablePlan::Single(node) => node.capability_id(),
            ExecutablePlan::Cascade(cascade) => cascade.describe(),
        }
    }
}

/// Short rendering of a value for error messages.
pub(crate) fn describe_value(value: &Value) -> String {
    let kind = match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    };
    let mut rendered = value.to_string();
    if rendered.len() > 80 {
        rendered.truncate(77);
        rendered.push_str("...");
    }
    format!("{} {}", kind, rendered)
}
