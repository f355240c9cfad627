//! Chain algebra: conversion chains and parsing chains
//!
//! A [`ConversionChain`] is an ordered pipeline of converters whose adjacent
//! types line up under the chain's strictness mode. The registry synthesizes
//! chains eagerly at registration time, so the append/prepend/concat rules
//! here decide which pipelines exist at all. A [`ParsingChain`] glues a
//! parser, restricted to one of its declared output types, to a conversion
//! chain, and presents the pair as a single capability.
//!
//! Copyright (c) 2026 Morphix Team
//! Licensed under the MIT OR Apache-2.0 license

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::error::{ChainError, Result};

use super::capability::{match_declaration, Converter, ParsingCapability};
use super::descriptor::{MatchOutcome, StrictMode, TypeDescriptor, TypeGraph};
use super::located::LocatedObject;
use super::plan::{ChildValues, ExecutablePlan, ExecutionContext};
use super::resolver::Resolver;

/// An ordered, non-empty pipeline of converters.
///
/// The strictness mode is fixed at construction and governs every adjacency
/// check for the chain's whole life. The effective input type is the first
/// step's input; the effective output type is the last step's output, so a
/// chain ending in a generic converter is itself generic.
#[derive(Clone)]
pub struct ConversionChain {
    steps: Vec<Arc<Converter>>,
    strict: StrictMode,
    from_type: TypeDescriptor,
    to_type: TypeDescriptor,
}

impl fmt::Debug for ConversionChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ConversionChain<{}: {} -> {} ({})>",
            self.id(),
            self.from_type,
            self.to_type,
            self.strict
        )
    }
}

impl ConversionChain {
    /// A chain holding a single converter.
    pub fn single(converter: Arc<Converter>, strict: StrictMode) -> Self {
        ConversionChain {
            from_type: converter.from_type().clone(),
            to_type: converter.to_type().clone(),
            steps: vec![converter],
            strict,
        }
    }

    pub fn id(&self) -> String {
        self.steps
            .iter()
            .map(|s| s.id().to_string())
            .collect::<Vec<_>>()
            .join(" -> ")
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn strict(&self) -> StrictMode {
        self.strict
    }

    pub fn from_type(&self) -> &TypeDescriptor {
        &self.from_type
    }

    pub fn to_type(&self) -> &TypeDescriptor {
        &self.to_type
    }

    pub fn is_generic(&self) -> bool {
        self.to_type.is_wildcard()
    }

    pub fn steps(&self) -> &[Arc<Converter>] {
        &self.steps
    }

    /// Match the chain against a query. A singleton chain defers to its
    /// leaf converter so guards keep working; longer chains match on their
    /// effective input/output types (guards were honored at every junction
    /// when the chain was synthesized).
    pub fn match_against(
        &self,
        graph: &TypeGraph,
        strict: StrictMode,
        from: Option<&TypeDescriptor>,
        to: Option<&TypeDescriptor>,
    ) -> MatchOutcome {
        if self.steps.len() == 1 {
            return self.steps[0].match_against(graph, strict, from, to);
        }
        let output = |lenient_ok: bool| -> Option<bool> {
            match to {
                None => Some(true),
                Some(t) => {
                    if self.is_generic() || *t == self.to_type {
                        Some(true)
                    } else if lenient_ok && graph.is_subtype(&self.to_type, t) {
                        Some(false)
                    } else {
                        None
                    }
                }
            }
        };
        let lenient = !strict.is_strict();
        let input_exact = match from {
            None => true,
            Some(f) => f.is_wildcard() || *f == self.from_type,
        };
        if input_exact {
            if let Some(output_exact) = output(lenient) {
                return MatchOutcome::Match {
                    input_exact: true,
                    output_exact,
                };
            }
        }
        if lenient {
            let input_ok = match from {
                None => true,
                Some(f) => graph.is_subtype(f, &self.from_type),
            };
            if input_ok {
                if let Some(output_exact) = output(true) {
                    return MatchOutcome::Match {
                        input_exact: false,
                        output_exact,
                    };
                }
            }
        }
        MatchOutcome::NoMatch
    }

    /// Append one converter, keeping the chain's strictness. Fails when the
    /// chain already ends in a generic step or the types do not line up.
    pub fn append(
        &mut self,
        converter: Arc<Converter>,
        graph: &TypeGraph,
    ) -> std::result::Result<(), ChainError> {
        if self.is_generic() {
            return Err(ChainError::AppendAfterGeneric);
        }
        if !converter
            .match_against(graph, self.strict, Some(&self.to_type), None)
            .matched()
        {
            return Err(ChainError::Incompatible {
                from: self.to_type.to_string(),
                to: converter.from_type().to_string(),
            });
        }
        self.to_type = converter.to_type().clone();
        self.steps.push(converter);
        Ok(())
    }

    /// Prepend one converter, keeping the chain's strictness.
    pub fn prepend(
        &mut self,
        converter: Arc<Converter>,
        graph: &TypeGraph,
    ) -> std::result::Result<(), ChainError> {
        if converter.is_generic() {
            return Err(ChainError::AppendAfterGeneric);
        }
        let first = &self.steps[0];
        if !first
            .match_against(graph, self.strict, Some(converter.to_type()), None)
            .matched()
        {
            return Err(ChainError::Incompatible {
                from: converter.to_type().to_string(),
                to: first.from_type().to_string(),
            });
        }
        self.from_type = converter.from_type().clone();
        self.steps.insert(0, converter);
        Ok(())
    }

    /// Concatenate two chains under the given strictness. A strict result
    /// requires both operands strict; a lenient result accepts either kind
    /// (the strict-to-lenient downgrade is the only mode change allowed).
    pub fn concat(
        left: &ConversionChain,
        right: &ConversionChain,
        strict: StrictMode,
        graph: &TypeGraph,
    ) -> std::result::Result<ConversionChain, ChainError> {
        if strict.is_strict() && (!left.strict.is_strict() || !right.strict.is_strict()) {
            return Err(ChainError::StrictnessUpgrade);
        }
        let mut out = ConversionChain {
            steps: left.steps.clone(),
            strict,
            from_type: left.from_type.clone(),
            to_type: left.to_type.clone(),
        };
        for step in &right.steps {
            out.append(Arc::clone(step), graph)?;
        }
        Ok(out)
    }

    /// A copy of this chain without its first step. Used when combining a
    /// chain ending at some type with another chain starting there.
    pub fn remove_first(&self) -> std::result::Result<ConversionChain, ChainError> {
        if self.steps.len() < 2 {
            return Err(ChainError::EmptyChain);
        }
        let steps: Vec<Arc<Converter>> = self.steps[1..].to_vec();
        Ok(ConversionChain {
            from_type: steps[0].from_type().clone(),
            to_type: self.to_type.clone(),
            steps,
            strict: self.strict,
        })
    }

    /// Can this chain follow `left`? The types must line up and, when `left`
    /// is generic, `left` must be able to produce this chain's input.
    pub fn can_be_appended_to(
        &self,
        left: &ConversionChain,
        strict: StrictMode,
        graph: &TypeGraph,
    ) -> bool {
        if !self
            .match_against(graph, strict, Some(left.to_type()), None)
            .matched()
        {
            return false;
        }
        if left.is_generic() {
            left.match_against(graph, strict, None, Some(&self.from_type))
                .matched()
        } else {
            true
        }
    }

    /// Would appending `right` after this chain ever produce something this
    /// chain cannot already reach? Generalizes the converter pair rule over
    /// every leaf pair.
    pub fn worth_appending(&self, right: &ConversionChain, graph: &TypeGraph) -> bool {
        self.steps
            .iter()
            .all(|l| right.steps.iter().all(|r| l.worth_chaining_with(r, graph)))
    }

    /// Run the pipeline. Intermediate steps convert to their own declared
    /// output; the final step receives the caller's desired type.
    pub fn convert(
        &self,
        desired: &TypeDescriptor,
        mut value: Value,
        location: &str,
        ctx: &ExecutionContext,
    ) -> Result<Value> {
        let last = self.steps.len() - 1;
        for (i, step) in self.steps.iter().enumerate() {
            let target = if i == last { desired } else { step.to_type() };
            value = step.convert(target, value, location, ctx)?;
        }
        Ok(value)
    }
}

/// Would completing `parser`, restricted to `produced`, with `chain` yield
/// anything valuable? Every leaf converter must pass the pair rule against
/// the parser's restricted output.
pub(crate) fn worth_completing_parser(
    parser: &dyn ParsingCapability,
    produced: &TypeDescriptor,
    chain: &ConversionChain,
    graph: &TypeGraph,
) -> bool {
    if !parser.can_chain() {
        return false;
    }
    chain.steps().iter().all(|c| {
        if !produced.is_wildcard() && c.to_type().is_wildcard() {
            true
        } else {
            !graph.is_subtype(produced, c.to_type())
        }
    })
}

/// A parser restricted to one declared output type, followed by a conversion
/// chain. Declares the chain's output as its sole supported type and the
/// parser's extensions as its own.
pub struct ParsingChain {
    parser: Arc<dyn ParsingCapability>,
    produced_type: TypeDescriptor,
    chain: ConversionChain,
}

impl fmt::Debug for ParsingChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ParsingChain<{}>", self.id())
    }
}

impl ParsingChain {
    /// Build a parsing chain. When `produced` is `None` the parser must
    /// declare exactly one output type. `strict` governs the junction check
    /// between the parser's output and the chain's input; the chain keeps
    /// its own internal mode.
    pub fn new(
        parser: Arc<dyn ParsingCapability>,
        produced: Option<TypeDescriptor>,
        chain: ConversionChain,
        strict: StrictMode,
        graph: &TypeGraph,
    ) -> std::result::Result<Self, ChainError> {
        let produced_type = match produced {
            Some(t) => t,
            None => {
                let types = parser.supported_types();
                if types.len() != 1 {
                    return Err(ChainError::MultipleSupportedTypes {
                        parser: parser.id(),
                    });
                }
                types.into_iter().next().unwrap()
            }
        };
        if !chain
            .match_against(graph, strict, Some(&produced_type), None)
            .matched()
        {
            return Err(ChainError::Incompatible {
                from: produced_type.to_string(),
                to: chain.from_type().to_string(),
            });
        }
        Ok(ParsingChain {
            parser,
            produced_type,
            chain,
        })
    }

    pub fn produced_type(&self) -> &TypeDescriptor {
        &self.produced_type
    }

    pub fn conversion(&self) -> &ConversionChain {
        &self.chain
    }
}

impl ParsingCapability for ParsingChain {
    fn id(&self) -> String {
        format!("{} -> {}", self.parser.id(), self.chain.id())
    }

    fn supported_types(&self) -> Vec<TypeDescriptor> {
        vec![self.chain.to_type().clone()]
    }

    fn supported_extensions(&self) -> Vec<String> {
        self.parser.supported_extensions()
    }

    fn can_chain(&self) -> bool {
        self.parser.can_chain()
    }

    fn chain_len(&self) -> usize {
        self.parser.chain_len() + self.chain.len()
    }

    fn match_query(
        &self,
        graph: &TypeGraph,
        strict: StrictMode,
        desired: Option<&TypeDescriptor>,
        ext: Option<&str>,
    ) -> MatchOutcome {
        match_declaration(
            graph,
            strict,
            &[self.chain.to_type().clone()],
            &self.parser.supported_extensions(),
            None,
            desired,
            ext,
        )
    }

    fn build_children(
        &self,
        resolver: &Resolver,
        _desired: &TypeDescriptor,
        object: &LocatedObject,
    ) -> Result<BTreeMap<String, ExecutablePlan>> {
        // Children serve the parser stage, which only ever produces the
        // restricted type.
        self.parser
            .build_children(resolver, &self.produced_type, object)
    }

    fn run(
        &self,
        desired: &TypeDescriptor,
        object: &LocatedObject,
        children: &mut ChildValues<'_>,
        ctx: &ExecutionContext,
    ) -> Result<Value> {
        let parsed = self
            .parser
            .run(&self.produced_type, object, children, ctx)?;
        self.chain.convert(desired, parsed, &object.location, ctx)
    }
}
