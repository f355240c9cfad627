//! Capability registries and query-time ranking
//!
//! Converters are stored as conversion chains in four buckets
//! (generic/specific crossed with strict/lenient), and every registration
//! eagerly synthesizes all new chains reachable by appending, prepending and
//! head-to-tail combining the newcomer with what is already there. Parsers
//! live in two buckets (generic/specific). A query merges both sides:
//! parsers that miss the requested type get completed with conversion chains
//! into synthesized parsing chains, and everything is ranked exact over
//! approximate over generic, shorter pipelines over longer ones.
//!
//! Every returned bucket is ordered worst first, best last.
//!
//! Copyright (c) 2026 Morphix Team
//! Licensed under the MIT OR Apache-2.0 license

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use crate::error::{ChainError, Result};

use super::capability::{Converter, Parser, ParsingCapability};
use super::chain::{worth_completing_parser, ConversionChain, ParsingChain};
use super::descriptor::{StrictMode, TypeDescriptor, TypeGraph};

/// Conversion chain store with eager synthesis at registration time.
#[derive(Clone, Default)]
pub struct ConverterRegistry {
    generic: Vec<ConversionChain>,
    generic_lenient: Vec<ConversionChain>,
    specific: Vec<ConversionChain>,
    specific_lenient: Vec<ConversionChain>,
}

impl fmt::Debug for ConverterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConverterRegistry")
            .field("generic", &self.generic.len())
            .field("generic_lenient", &self.generic_lenient.len())
            .field("specific", &self.specific.len())
            .field("specific_lenient", &self.specific_lenient.len())
            .finish()
    }
}

impl ConverterRegistry {
    /// Register one converter and synthesize every chain it newly enables.
    /// `strict` is the registry-level mode: a strict registry never builds
    /// lenient chains.
    pub fn register(
        &mut self,
        converter: Arc<Converter>,
        strict: StrictMode,
        graph: &TypeGraph,
    ) -> Result<()> {
        if !converter.guard_accepts_wildcard(StrictMode::Strict) {
            return Err(ChainError::GuardRejectsWildcard {
                capability: converter.id().to_string(),
            }
            .into());
        }

        let (generic, generic_lenient, specific, specific_lenient) =
            self.create_all_new_chains(converter, strict, graph)?;
        log::debug!(
            "registration created {} generic / {} lenient-generic / {} specific / {} lenient-specific chains",
            generic.len(),
            generic_lenient.len(),
            specific.len(),
            specific_lenient.len()
        );
        self.generic.extend(generic);
        self.generic_lenient.extend(generic_lenient);
        self.specific.extend(specific);
        self.specific_lenient.extend(specific_lenient);

        // Keep every bucket sorted longest first, so queries come out worst
        // first, best last.
        for bucket in [
            &mut self.generic,
            &mut self.generic_lenient,
            &mut self.specific,
            &mut self.specific_lenient,
        ] {
            bucket.sort_by(|a, b| b.len().cmp(&a.len()));
        }
        Ok(())
    }

    /// All chains that become possible once `converter` joins the store:
    /// the singleton, extensions of existing specific chains at either end,
    /// head-to-tail combinations of those, and insertions in front of
    /// existing generic chains.
    #[allow(clippy::type_complexity)]
    fn create_all_new_chains(
        &self,
        converter: Arc<Converter>,
        strict: StrictMode,
        graph: &TypeGraph,
    ) -> Result<(
        Vec<ConversionChain>,
        Vec<ConversionChain>,
        Vec<ConversionChain>,
        Vec<ConversionChain>,
    )> {
        let lenient_registry = !strict.is_strict();
        let single = ConversionChain::single(Arc::clone(&converter), StrictMode::Strict);

        let mut generic = Vec::new();
        let mut generic_lenient = Vec::new();
        let mut specific = Vec::new();
        let mut specific_lenient = Vec::new();

        if converter.is_generic() {
            generic.push(single.clone());
        } else {
            specific.push(single.clone());
        }

        // (1) extend existing specific chains at either end.
        let mut at_end = Vec::new();
        let mut at_end_ln = Vec::new();
        let mut at_beginning = Vec::new();
        let mut at_beginning_ln = Vec::new();

        if lenient_registry {
            for existing in &self.specific_lenient {
                if single.can_be_appended_to(existing, StrictMode::Lenient, graph)
                    && existing.worth_appending(&single, graph)
                {
                    at_end_ln.push(ConversionChain::concat(
                        existing,
                        &single,
                        StrictMode::Lenient,
                        graph,
                    )?);
                }
                if existing.can_be_appended_to(&single, StrictMode::Lenient, graph)
                    && single.worth_appending(existing, graph)
                {
                    at_beginning_ln.push(ConversionChain::concat(
                        &single,
                        existing,
                        StrictMode::Lenient,
                        graph,
                    )?);
                }
            }
        }

        for existing in &self.specific {
            if single.can_be_appended_to(existing, StrictMode::Strict, graph) {
                if existing.worth_appending(&single, graph) {
                    at_end.push(ConversionChain::concat(
                        existing,
                        &single,
                        StrictMode::Strict,
                        graph,
                    )?);
                }
            } else if lenient_registry
                && single.can_be_appended_to(existing, StrictMode::Lenient, graph)
                && existing.worth_appending(&single, graph)
            {
                at_end_ln.push(ConversionChain::concat(
                    existing,
                    &single,
                    StrictMode::Lenient,
                    graph,
                )?);
            }

            if existing.can_be_appended_to(&single, StrictMode::Strict, graph) {
                if single.worth_appending(existing, graph) {
                    at_beginning.push(ConversionChain::concat(
                        &single,
                        existing,
                        StrictMode::Strict,
                        graph,
                    )?);
                }
            } else if lenient_registry
                && existing.can_be_appended_to(&single, StrictMode::Lenient, graph)
                && single.worth_appending(existing, graph)
            {
                at_beginning_ln.push(ConversionChain::concat(
                    &single,
                    existing,
                    StrictMode::Lenient,
                    graph,
                )?);
            }
        }

        if converter.is_generic() {
            generic.extend(at_end.iter().cloned());
            generic_lenient.extend(at_end_ln.iter().cloned());
        } else {
            specific.extend(at_end.iter().cloned());
            specific_lenient.extend(at_end_ln.iter().cloned());
        }
        specific.extend(at_beginning.iter().cloned());
        specific_lenient.extend(at_beginning_ln.iter().cloned());

        // (2) combine the new heads and tails: a chain ending at the
        // converter, plus a chain starting with it (minus that duplicated
        // first step).
        for a in &at_end {
            for b in &at_beginning {
                let tail = b.remove_first()?;
                if tail.can_be_appended_to(a, StrictMode::Strict, graph)
                    && a.worth_appending(&tail, graph)
                {
                    specific.push(ConversionChain::concat(a, &tail, StrictMode::Strict, graph)?);
                }
            }
            for b in &at_beginning_ln {
                let tail = b.remove_first()?;
                if tail.can_be_appended_to(a, StrictMode::Lenient, graph)
                    && a.worth_appending(&tail, graph)
                {
                    specific_lenient.push(ConversionChain::concat(
                        a,
                        &tail,
                        StrictMode::Lenient,
                        graph,
                    )?);
                }
            }
        }
        for a in &at_end_ln {
            for b in at_beginning_ln.iter().chain(at_beginning.iter()) {
                let tail = b.remove_first()?;
                if tail.can_be_appended_to(a, StrictMode::Lenient, graph)
                    && a.worth_appending(&tail, graph)
                {
                    specific_lenient.push(ConversionChain::concat(
                        a,
                        &tail,
                        StrictMode::Lenient,
                        graph,
                    )?);
                }
            }
        }

        // (3) a specific newcomer can also slot in front of existing generic
        // chains. Generic-on-generic pairs are never built.
        if !converter.is_generic() {
            let mut before_generic = Vec::new();
            let mut before_generic_ln = Vec::new();
            for existing in &self.generic {
                if existing.can_be_appended_to(&single, StrictMode::Strict, graph) {
                    if single.worth_appending(existing, graph) {
                        before_generic.push(ConversionChain::concat(
                            &single,
                            existing,
                            StrictMode::Strict,
                            graph,
                        )?);
                    }
                } else if lenient_registry
                    && existing.can_be_appended_to(&single, StrictMode::Lenient, graph)
                    && single.worth_appending(existing, graph)
                {
                    before_generic_ln.push(ConversionChain::concat(
                        &single,
                        existing,
                        StrictMode::Lenient,
                        graph,
                    )?);
                }
            }
            if lenient_registry {
                for existing in &self.generic_lenient {
                    if existing.can_be_appended_to(&single, StrictMode::Lenient, graph)
                        && single.worth_appending(existing, graph)
                    {
                        before_generic_ln.push(ConversionChain::concat(
                            &single,
                            existing,
                            StrictMode::Lenient,
                            graph,
                        )?);
                    }
                }
            }
            generic.extend(before_generic.iter().cloned());
            generic_lenient.extend(before_generic_ln.iter().cloned());

            for a in &at_end {
                for b in &before_generic {
                    let tail = b.remove_first()?;
                    if tail.can_be_appended_to(a, StrictMode::Strict, graph)
                        && a.worth_appending(&tail, graph)
                    {
                        generic.push(ConversionChain::concat(
                            a,
                            &tail,
                            StrictMode::Strict,
                            graph,
                        )?);
                    }
                }
                for b in &before_generic_ln {
                    let tail = b.remove_first()?;
                    if tail.can_be_appended_to(a, StrictMode::Lenient, graph)
                        && a.worth_appending(&tail, graph)
                    {
                        generic_lenient.push(ConversionChain::concat(
                            a,
                            &tail,
                            StrictMode::Lenient,
                            graph,
                        )?);
                    }
                }
            }
            for a in &at_end_ln {
                for b in before_generic_ln.iter().chain(before_generic.iter()) {
                    let tail = b.remove_first()?;
                    if tail.can_be_appended_to(a, StrictMode::Lenient, graph)
                        && a.worth_appending(&tail, graph)
                    {
                        generic_lenient.push(ConversionChain::concat(
                            a,
                            &tail,
                            StrictMode::Lenient,
                            graph,
                        )?);
                    }
                }
            }
        }

        Ok((generic, generic_lenient, specific, specific_lenient))
    }

    /// Find chains matching a query, bucketed by output-type match quality:
    /// `(generic, approximate, exact)`, each worst first.
    ///
    /// A request axis left `None` means "don't care". A `to` of the wildcard
    /// means "able to produce anything", so only generic chains qualify and
    /// they count as exact.
    pub fn find_chains(
        &self,
        graph: &TypeGraph,
        strict: StrictMode,
        from: Option<&TypeDescriptor>,
        to: Option<&TypeDescriptor>,
    ) -> (
        Vec<ConversionChain>,
        Vec<ConversionChain>,
        Vec<ConversionChain>,
    ) {
        if from.is_none() && to.is_none() {
            let mut generic = self.generic_lenient.clone();
            generic.extend(self.generic.iter().cloned());
            let mut exact = self.specific_lenient.clone();
            exact.extend(self.specific.iter().cloned());
            return (generic, Vec::new(), exact);
        }

        let wants_anything = to.map(|t| t.is_wildcard()).unwrap_or(false);
        let mut generic = Vec::new();
        let mut approx = Vec::new();
        let mut exact = Vec::new();

        for c in self.generic_lenient.iter().chain(self.generic.iter()) {
            if c.match_against(graph, strict, from, to).matched() {
                if wants_anything {
                    exact.push(c.clone());
                } else {
                    generic.push(c.clone());
                }
            }
        }
        for c in self.specific_lenient.iter().chain(self.specific.iter()) {
            let outcome = c.match_against(graph, strict, from, to);
            if let super::descriptor::MatchOutcome::Match { output_exact, .. } = outcome {
                if !wants_anything {
                    if output_exact {
                        exact.push(c.clone());
                    } else {
                        approx.push(c.clone());
                    }
                }
            }
        }
        (generic, approx, exact)
    }

    pub fn chain_count(&self) -> usize {
        self.generic.len()
            + self.generic_lenient.len()
            + self.specific.len()
            + self.specific_lenient.len()
    }
}

/// Parser store: generic parsers in one bucket, specific ones in another.
#[derive(Clone, Default)]
pub struct ParserStore {
    generic: Vec<Arc<dyn ParsingCapability>>,
    specific: Vec<Arc<dyn ParsingCapability>>,
}

impl fmt::Debug for ParserStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParserStore")
            .field("generic", &self.generic.len())
            .field("specific", &self.specific.len())
            .finish()
    }
}

impl ParserStore {
    pub fn register(
        &mut self,
        parser: Arc<dyn ParsingCapability>,
        graph: &TypeGraph,
    ) -> Result<()> {
        if !parser
            .match_query(graph, StrictMode::Strict, None, None)
            .is_exact()
        {
            return Err(ChainError::GuardRejectsWildcard {
                capability: parser.id(),
            }
            .into());
        }
        if parser.is_generic() {
            self.generic.push(parser);
        } else {
            self.specific.push(parser);
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.generic.len() + self.specific.len()
    }

    pub fn is_empty(&self) -> bool {
        self.generic.is_empty() && self.specific.is_empty()
    }

    /// Classify every parser against the query. Matching buckets are worst
    /// first; the three remainder lists feed completion and diagnostics.
    fn find(
        &self,
        graph: &TypeGraph,
        strict: StrictMode,
        desired: Option<&TypeDescriptor>,
        ext: Option<&str>,
    ) -> CapabilityQuery {
        let mut q = CapabilityQuery::default();

        let wildcard_request = desired.map(|d| d.is_wildcard()).unwrap_or(false);
        for p in &self.generic {
            if p.match_query(graph, strict, desired, ext).matched() {
                if wildcard_request {
                    // A wildcard request means "whatever this extension
                    // yields", so extension supporters all match exactly.
                    q.exact.push(Arc::clone(p));
                } else {
                    q.generic.push(Arc::clone(p));
                }
            } else {
                // A generic parser always matches on the type axis.
                q.type_only.push(Arc::clone(p));
            }
        }
        for p in &self.specific {
            match p.match_query(graph, strict, desired, ext) {
                super::descriptor::MatchOutcome::Match { output_exact, .. } => {
                    if output_exact {
                        q.exact.push(Arc::clone(p));
                    } else {
                        q.approx.push(Arc::clone(p));
                    }
                }
                super::descriptor::MatchOutcome::NoMatch => {
                    if p.match_query(graph, strict, None, ext).matched() {
                        q.ext_only.push(Arc::clone(p));
                    } else if p.match_query(graph, strict, desired, None).matched() {
                        q.type_only.push(Arc::clone(p));
                    } else {
                        q.no_match.push(Arc::clone(p));
                    }
                }
            }
        }
        q
    }
}

/// Result of a capability query: three matching buckets ordered worst first,
/// best last, plus the remainders used for completion and for building
/// "nothing found" diagnostics.
#[derive(Default)]
pub struct CapabilityQuery {
    /// Generic capabilities serving the request.
    pub generic: Vec<Arc<dyn ParsingCapability>>,
    /// Capabilities producing a declared subtype of the request.
    pub approx: Vec<Arc<dyn ParsingCapability>>,
    /// Capabilities producing exactly the request.
    pub exact: Vec<Arc<dyn ParsingCapability>>,
    /// Matched the extension but not the type.
    pub ext_only: Vec<Arc<dyn ParsingCapability>>,
    /// Matched the type but not the extension.
    pub type_only: Vec<Arc<dyn ParsingCapability>>,
    /// Matched neither axis.
    pub no_match: Vec<Arc<dyn ParsingCapability>>,
}

impl fmt::Debug for CapabilityQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ids = |v: &Vec<Arc<dyn ParsingCapability>>| {
            v.iter().map(|p| p.id()).collect::<Vec<_>>()
        };
        f.debug_struct("CapabilityQuery")
            .field("generic", &ids(&self.generic))
            .field("approx", &ids(&self.approx))
            .field("exact", &ids(&self.exact))
            .field("ext_only", &ids(&self.ext_only))
            .field("type_only", &ids(&self.type_only))
            .field("no_match", &ids(&self.no_match))
            .finish()
    }
}

impl CapabilityQuery {
    /// All matching capabilities, worst first: generic, then approximate,
    /// then exact.
    pub fn all_matching(&self) -> Vec<Arc<dyn ParsingCapability>> {
        let mut all = self.generic.clone();
        all.extend(self.approx.iter().cloned());
        all.extend(self.exact.iter().cloned());
        all
    }

    /// All matching capabilities, best first.
    pub fn ranked_best_first(&self) -> Vec<Arc<dyn ParsingCapability>> {
        let mut all: Vec<_> = self.exact.iter().rev().cloned().collect();
        all.extend(self.approx.iter().rev().cloned());
        all.extend(self.generic.iter().rev().cloned());
        all
    }

    pub fn has_match(&self) -> bool {
        !(self.generic.is_empty() && self.approx.is_empty() && self.exact.is_empty())
    }
}

/// The combined registry: parsers, converters and the type graph, under one
/// registry-level strictness mode.
///
/// Cloning a registry is a structural copy: both copies share the already
/// registered capabilities, but later registrations on one are invisible to
/// the other.
#[derive(Clone)]
pub struct CapabilityRegistry {
    name: String,
    strict: StrictMode,
    graph: Arc<TypeGraph>,
    parsers: ParserStore,
    converters: ConverterRegistry,
}

impl fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapabilityRegistry")
            .field("name", &self.name)
            .field("strict", &self.strict)
            .field("parsers", &self.parsers)
            .field("converters", &self.converters)
            .finish()
    }
}

impl CapabilityRegistry {
    pub fn new(name: impl Into<String>, strict: StrictMode, graph: TypeGraph) -> Self {
        CapabilityRegistry {
            name: name.into(),
            strict,
            graph: Arc::new(graph),
            parsers: ParserStore::default(),
            converters: ConverterRegistry::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn strict(&self) -> StrictMode {
        self.strict
    }

    pub fn graph(&self) -> &TypeGraph {
        &self.graph
    }

    pub(crate) fn graph_arc(&self) -> Arc<TypeGraph> {
        Arc::clone(&self.graph)
    }

    /// Mutate the type graph. Copy-on-write, so clones made earlier keep
    /// their view.
    pub fn graph_mut(&mut self) -> &mut TypeGraph {
        Arc::make_mut(&mut self.graph)
    }

    pub fn register_parser(&mut self, parser: Parser) -> Result<()> {
        self.register_parser_capability(Arc::new(parser))
    }

    pub fn register_parser_capability(
        &mut self,
        parser: Arc<dyn ParsingCapability>,
    ) -> Result<()> {
        log::debug!("[{}] registering parser '{}'", self.name, parser.id());
        self.parsers.register(parser, &self.graph)
    }

    pub fn register_parsers(&mut self, parsers: Vec<Parser>) -> Result<()> {
        for p in parsers {
            self.register_parser(p)?;
        }
        Ok(())
    }

    pub fn register_converter(&mut self, converter: Converter) -> Result<()> {
        log::debug!("[{}] registering converter '{}'", self.name, converter.id());
        self.converters
            .register(Arc::new(converter), self.strict, &self.graph)
    }

    pub fn register_converters(&mut self, converters: Vec<Converter>) -> Result<()> {
        for c in converters {
            self.register_converter(c)?;
        }
        Ok(())
    }

    pub fn parser_count(&self) -> usize {
        self.parsers.len()
    }

    pub fn chain_count(&self) -> usize {
        self.converters.chain_count()
    }

    /// Conversion chains able to produce `to` from `from`, bucketed
    /// `(generic, approximate, exact)`.
    pub fn find_conversion_chains(
        &self,
        from: Option<&TypeDescriptor>,
        to: Option<&TypeDescriptor>,
    ) -> (
        Vec<ConversionChain>,
        Vec<ConversionChain>,
        Vec<ConversionChain>,
    ) {
        self.converters.find_chains(&self.graph, self.strict, from, to)
    }

    /// The central query: every capability able to serve this
    /// extension/type pair, with parsers completed by conversion chains.
    /// Either axis may be left unspecified. Matching buckets are worst
    /// first, best last; within a bucket shorter pipelines rank higher.
    pub fn find_all_matching(
        &self,
        strict: StrictMode,
        desired: Option<&TypeDescriptor>,
        ext: Option<&str>,
    ) -> CapabilityQuery {
        let mut q = self.parsers.find(&self.graph, strict, desired, ext);

        // Parsers worth completing with a conversion chain: everything that
        // matched the extension. When the type axis is unconstrained even
        // the exact matches get completed, since a chain reaches types the
        // parser alone does not.
        let mut to_complete: Vec<Arc<dyn ParsingCapability>> = q.ext_only.clone();
        to_complete.extend(q.generic.iter().cloned());
        to_complete.extend(q.approx.iter().cloned());
        if desired.is_none() {
            to_complete.extend(q.exact.iter().cloned());
        }

        let (conv_generic, conv_approx, conv_exact) =
            self.converters.find_chains(&self.graph, self.strict, None, desired);

        // Synthesized chains are prepended so direct parser matches keep
        // their better (later) position; chains over lenient junctions are
        // gathered separately and prepended last of all.
        let mut pre_generic_ln = Vec::new();
        let mut pre_approx_ln = Vec::new();
        let mut pre_exact_ln = Vec::new();
        for parser in to_complete.iter().rev() {
            for typ in parser.supported_types() {
                let built = self.complete_parser(
                    parser,
                    &typ,
                    desired,
                    &conv_generic,
                    &conv_approx,
                    &conv_exact,
                );
                prepend(&mut q.generic, built.generic);
                prepend(&mut q.approx, built.approx);
                prepend(&mut q.exact, built.exact);
                prepend(&mut pre_generic_ln, built.generic_lenient);
                prepend(&mut pre_approx_ln, built.approx_lenient);
                prepend(&mut pre_exact_ln, built.exact_lenient);
            }
        }
        prepend(&mut q.generic, pre_generic_ln);
        prepend(&mut q.approx, pre_approx_ln);
        prepend(&mut q.exact, pre_exact_ln);

        // Parsers matching neither axis can still become type matches once
        // completed with a chain.
        let mut all_conv: Vec<&ConversionChain> = conv_generic
            .iter()
            .chain(conv_approx.iter())
            .chain(conv_exact.iter())
            .collect();
        all_conv.reverse();
        let mut rescued = Vec::new();
        for parser in q.no_match.iter().rev() {
            for typ in parser.supported_types() {
                for chain in &all_conv {
                    if chain
                        .match_against(&self.graph, self.strict, Some(&typ), desired)
                        .matched()
                        && worth_completing_parser(parser.as_ref(), &typ, chain, &self.graph)
                    {
                        if let Ok(pc) = ParsingChain::new(
                            Arc::clone(parser),
                            Some(typ.clone()),
                            (*chain).clone(),
                            self.strict,
                            &self.graph,
                        ) {
                            rescued.push(Arc::new(pc) as Arc<dyn ParsingCapability>);
                        }
                    }
                }
            }
        }
        prepend(&mut q.type_only, rescued);

        // Stable sort longest first: within equal quality, shorter pipelines
        // end up later, i.e. preferred.
        q.generic.sort_by(|a, b| b.chain_len().cmp(&a.chain_len()));
        q.approx.sort_by(|a, b| b.chain_len().cmp(&a.chain_len()));
        q.exact.sort_by(|a, b| b.chain_len().cmp(&a.chain_len()));

        q
    }

    /// Complete one parser, restricted to one of its declared types, with
    /// every applicable conversion chain.
    fn complete_parser(
        &self,
        parser: &Arc<dyn ParsingCapability>,
        produced: &TypeDescriptor,
        desired: Option<&TypeDescriptor>,
        conv_generic: &[ConversionChain],
        conv_approx: &[ConversionChain],
        conv_exact: &[ConversionChain],
    ) -> CompletedChains {
        let mut out = CompletedChains::default();
        let lenient_registry = !self.strict.is_strict();

        let mut try_bucket =
            |chains: &[ConversionChain],
             strict_dst: &mut Vec<Arc<dyn ParsingCapability>>,
             lenient_dst: &mut Vec<Arc<dyn ParsingCapability>>| {
                for chain in chains {
                    let junction = if chain
                        .match_against(&self.graph, StrictMode::Strict, Some(produced), desired)
                        .matched()
                    {
                        Some(StrictMode::Strict)
                    } else if lenient_registry
                        && chain
                            .match_against(
                                &self.graph,
                                StrictMode::Lenient,
                                Some(produced),
                                desired,
                            )
                            .matched()
                    {
                        Some(StrictMode::Lenient)
                    } else {
                        None
                    };
                    let junction = match junction {
                        None => continue,
                        Some(j) => j,
                    };
                    if !worth_completing_parser(parser.as_ref(), produced, chain, &self.graph) {
                        continue;
                    }
                    if let Ok(pc) = ParsingChain::new(
                        Arc::clone(parser),
                        Some(produced.clone()),
                        chain.clone(),
                        junction,
                        &self.graph,
                    ) {
                        let pc = Arc::new(pc) as Arc<dyn ParsingCapability>;
                        match junction {
                            StrictMode::Strict => strict_dst.push(pc),
                            StrictMode::Lenient => lenient_dst.push(pc),
                        }
                    }
                }
            };

        // Completing an already generic parser with a generic chain adds
        // nothing it cannot do alone.
        if !produced.is_wildcard() {
            try_bucket(conv_generic, &mut out.generic, &mut out.generic_lenient);
        }
        try_bucket(conv_approx, &mut out.approx, &mut out.approx_lenient);
        try_bucket(conv_exact, &mut out.exact, &mut out.exact_lenient);
        out
    }

    /// Extensions from which the given type is reachable. Diagnostic helper
    /// behind the "wrong extension" error.
    pub fn extensions_for_type(&self, desired: &TypeDescriptor) -> Vec<String> {
        let q = self.find_all_matching(self.strict, Some(desired), None);
        let mut exts = BTreeSet::new();
        for p in q.all_matching() {
            exts.extend(p.supported_extensions());
        }
        exts.into_iter().collect()
    }

    /// Types reachable from the given extension. Diagnostic helper behind
    /// the "wrong type" error.
    pub fn types_for_extension(&self, ext: &str) -> Vec<String> {
        let q = self.find_all_matching(self.strict, None, Some(ext));
        let mut types = BTreeSet::new();
        for p in q.all_matching() {
            for t in p.supported_types() {
                types.insert(t.to_string());
            }
        }
        types.into_iter().collect()
    }
}

#[derive(Default)]
struct CompletedChains {
    generic: Vec<Arc<dyn ParsingCapability>>,
    generic_lenient: Vec<Arc<dyn ParsingCapability>>,
    approx: Vec<Arc<dyn ParsingCapability>>,
    approx_lenient: Vec<Arc<dyn ParsingCapability>>,
    exact: Vec<Arc<dyn ParsingCapability>>,
    exact_lenient: Vec<Arc<dyn ParsingCapability>>,
}

fn prepend<T>(dst: &mut Vec<T>, mut src: Vec<T>) {
    if src.is_empty() {
        return;
    }
    src.extend(dst.drain(..));
    *dst = src;
}
