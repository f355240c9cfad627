//! Type descriptors and the declared subtype graph
//!
//! Morphix does not inspect runtime values to decide compatibility. Every
//! type a capability can consume or produce is a [`TypeDescriptor`], and the
//! subtype relation between named types is an explicit directed graph
//! ([`TypeGraph`]) populated by the application at configuration time.
//! Matching against declared types is where every resolution decision starts,
//! so the four-way exact/approximate branching lives here.
//!
//! Copyright (c) 2026 Morphix Team
//! Licensed under the MIT OR Apache-2.0 license

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A declared type in the resolution universe.
///
/// `Wildcard` is the "any object" sentinel: every named type is a subtype of
/// it, and a capability producing `Wildcard` is *generic* (it claims it can
/// produce whatever the caller asks for).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TypeDescriptor {
    /// Matches any type; the top of the subtype graph.
    Wildcard,
    /// A concrete named type.
    Named(String),
}

impl TypeDescriptor {
    /// Shorthand for a named descriptor.
    pub fn named(name: impl Into<String>) -> Self {
        TypeDescriptor::Named(name.into())
    }

    pub fn is_wildcard(&self) -> bool {
        matches!(self, TypeDescriptor::Wildcard)
    }

    /// The name of a named descriptor, or `None` for the wildcard.
    pub fn name(&self) -> Option<&str> {
        match self {
            TypeDescriptor::Wildcard => None,
            TypeDescriptor::Named(n) => Some(n),
        }
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeDescriptor::Wildcard => write!(f, "*"),
            TypeDescriptor::Named(n) => write!(f, "{}", n),
        }
    }
}

/// Whether matching tolerates declared subtypes of the requested type.
///
/// In strict mode a capability producing `Int` only serves requests for
/// exactly `Int`. In lenient mode it also serves requests for any declared
/// supertype of `Int`, at a lower rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StrictMode {
    Strict,
    Lenient,
}

impl StrictMode {
    pub fn is_strict(&self) -> bool {
        matches!(self, StrictMode::Strict)
    }
}

impl fmt::Display for StrictMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrictMode::Strict => write!(f, "strict"),
            StrictMode::Lenient => write!(f, "lenient"),
        }
    }
}

/// Outcome of matching a capability's declaration against a query.
///
/// A query axis left unspecified (the caller does not care) always counts as
/// an exact match on that axis. Ranking uses the two exactness flags:
/// exact/exact beats approximate matches, which beat generic ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOutcome {
    NoMatch,
    Match { input_exact: bool, output_exact: bool },
}

impl MatchOutcome {
    pub fn exact() -> Self {
        MatchOutcome::Match {
            input_exact: true,
            output_exact: true,
        }
    }

    pub fn matched(&self) -> bool {
        matches!(self, MatchOutcome::Match { .. })
    }

    pub fn is_exact(&self) -> bool {
        matches!(
            self,
            MatchOutcome::Match {
                input_exact: true,
                output_exact: true,
            }
        )
    }
}

/// Optional runtime check that a value is a well-formed instance of a named
/// type. Types without a registered checker accept any value.
pub type ValueChecker = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// The declared subtype graph plus per-type value checkers.
///
/// The graph stores the transitive closure of declared `sub <: super` edges,
/// so `is_subtype` is a plain set lookup. Edges are expected to be declared
/// before any capability registration; declaring them lazily mid-query is out
/// of contract.
#[derive(Default)]
pub struct TypeGraph {
    supers: HashMap<String, BTreeSet<String>>,
    checkers: HashMap<String, ValueChecker>,
}

impl Clone for TypeGraph {
    fn clone(&self) -> Self {
        TypeGraph {
            supers: self.supers.clone(),
            checkers: self.checkers.clone(),
        }
    }
}

impl fmt::Debug for TypeGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeGraph")
            .field("supers", &self.supers)
            .field("checkers", &self.checkers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl TypeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare `sub` as a strict subtype of `sup` and update the closure.
    pub fn register_subtype(&mut self, sub: impl Into<String>, sup: impl Into<String>) {
        let sub = sub.into();
        let sup = sup.into();
        if sub == sup {
            return;
        }
        let mut gained: BTreeSet<String> = self
            .supers
            .get(&sup)
            .cloned()
            .unwrap_or_default();
        gained.insert(sup);

        self.supers.entry(sub.clone()).or_default().extend(gained.clone());

        // Propagate to everything already below `sub`.
        let below: Vec<String> = self
            .supers
            .iter()
            .filter(|(_, ups)| ups.contains(&sub))
            .map(|(t, _)| t.clone())
            .collect();
        for t in below {
            self.supers.entry(t).or_default().extend(gained.clone());
        }
    }

    /// Attach a runtime well-formedness check to a named type.
    pub fn register_checker(
        &mut self,
        name: impl Into<String>,
        checker: impl Fn(&Value) -> bool + Send + Sync + 'static,
    ) {
        self.checkers.insert(name.into(), Arc::new(checker));
    }

    /// Is `a` a subtype of `b`? Reflexive; everything is a subtype of the
    /// wildcard, and the wildcard is a subtype of nothing else.
    pub fn is_subtype(&self, a: &TypeDescriptor, b: &TypeDescriptor) -> bool {
        if a == b || b.is_wildcard() {
            return true;
        }
        match (a, b) {
            (TypeDescriptor::Named(an), TypeDescriptor::Named(bn)) => self
                .supers
                .get(an)
                .map(|ups| ups.contains(bn))
                .unwrap_or(false),
            _ => false,
        }
    }

    /// All declared strict subtypes of a named type.
    pub fn subtypes_of(&self, t: &TypeDescriptor) -> Vec<TypeDescriptor> {
        match t {
            TypeDescriptor::Wildcard => self
                .supers
                .keys()
                .map(|n| TypeDescriptor::named(n.clone()))
                .collect(),
            TypeDescriptor::Named(n) => self
                .supers
                .iter()
                .filter(|(_, ups)| ups.contains(n))
                .map(|(sub, _)| TypeDescriptor::named(sub.clone()))
                .collect(),
        }
    }

    /// Match one declared output type against one requested type.
    ///
    /// An unspecified or wildcard request always matches exactly ("whatever
    /// this capability naturally yields"). A declared wildcard matches every
    /// request exactly (the generic capability promises to produce whatever
    /// is asked). Otherwise equality is exact and, in lenient mode only,
    /// `declared <: requested` is an approximate match.
    pub fn matches(
        &self,
        strict: StrictMode,
        declared: &TypeDescriptor,
        requested: Option<&TypeDescriptor>,
    ) -> MatchOutcome {
        let requested = match requested {
            None => return MatchOutcome::exact(),
            Some(r) => r,
        };
        if declared.is_wildcard() || requested.is_wildcard() || declared == requested {
            return MatchOutcome::exact();
        }
        if !strict.is_strict() && self.is_subtype(declared, requested) {
            return MatchOutcome::Match {
                input_exact: true,
                output_exact: false,
            };
        }
        MatchOutcome::NoMatch
    }

    /// Does `value` satisfy the declared type? The wildcard and types without
    /// a registered checker accept everything.
    pub fn value_satisfies(&self, t: &TypeDescriptor, value: &Value) -> bool {
        match t {
            TypeDescriptor::Wildcard => true,
            TypeDescriptor::Named(n) => match self.checkers.get(n) {
                Some(check) => check(value),
                None => true,
            },
        }
    }
}
