//! Leaf capabilities: converters and parsers
//!
//! A [`Converter`] turns a value of one declared type into a value of
//! another. A [`Parser`] turns a located object into a value, either from an
//! atomic object's contents or by assembling the results of its children.
//! Everything queryable by the registries goes through the
//! [`ParsingCapability`] trait, which is also implemented by synthesized
//! parsing chains.
//!
//! Copyright (c) 2026 Morphix Team
//! Licensed under the MIT OR Apache-2.0 license

use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value;

use crate::error::{ChainError, Error, Result};

use super::descriptor::{MatchOutcome, StrictMode, TypeDescriptor, TypeGraph};
use super::located::{check_extension, LocatedObject, MULTIFILE_EXT};
use super::plan::{ChildValues, ExecutablePlan, ExecutionContext};
use super::resolver::{DesiredType, Resolver};

/// Action of a converter: receives the finally desired type (useful for
/// generic converters), the input value and the execution context.
pub type ConverterAction =
    Box<dyn Fn(&TypeDescriptor, Value, &ExecutionContext) -> anyhow::Result<Value> + Send + Sync>;

/// Action of an atomic parser: turns the object's raw contents into a value.
pub type AtomicAction = Box<
    dyn Fn(&TypeDescriptor, &LocatedObject, &ExecutionContext) -> anyhow::Result<Value>
        + Send
        + Sync,
>;

/// Declares which children a composite parser wants for a given desired type
/// and object.
pub type ChildrenFn = Box<
    dyn Fn(&TypeDescriptor, &LocatedObject) -> anyhow::Result<BTreeMap<String, ChildRequest>>
        + Send
        + Sync,
>;

/// Assembles a composite parser's result out of its children's values.
pub type AssembleAction = Box<
    dyn Fn(
            &TypeDescriptor,
            &LocatedObject,
            &mut ChildValues<'_>,
            &ExecutionContext,
        ) -> anyhow::Result<Value>
        + Send
        + Sync,
>;

/// Extra converter-side matching restriction. Must accept the all-wildcard
/// query `(strict, None, None)` or registration is refused.
pub type ConverterGuard =
    Box<dyn Fn(StrictMode, Option<&TypeDescriptor>, Option<&TypeDescriptor>) -> bool + Send + Sync>;

/// Extra parser-side matching restriction over the desired type. Must accept
/// the unspecified query or registration is refused.
pub type ParserGuard = Box<dyn Fn(StrictMode, Option<&TypeDescriptor>) -> bool + Send + Sync>;

/// What a composite parser wants for one named child.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildRequest {
    pub desired_type: TypeDescriptor,
    /// An absent required child fails plan building; an absent optional one
    /// is skipped.
    pub required: bool,
}

impl ChildRequest {
    pub fn required(desired_type: TypeDescriptor) -> Self {
        ChildRequest {
            desired_type,
            required: true,
        }
    }

    pub fn optional(desired_type: TypeDescriptor) -> Self {
        ChildRequest {
            desired_type,
            required: false,
        }
    }
}

/// A registered value-to-value conversion.
///
/// The input type is always concrete; a wildcard output type marks the
/// converter as *generic*, meaning it promises to produce whatever concrete
/// type the caller asks for.
pub struct Converter {
    id: String,
    from_type: TypeDescriptor,
    to_type: TypeDescriptor,
    can_chain: bool,
    guard: Option<ConverterGuard>,
    action: ConverterAction,
}

impl fmt::Debug for Converter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Converter<{}: {} -> {}>", self.id, self.from_type, self.to_type)
    }
}

impl Converter {
    pub fn new(
        id: impl Into<String>,
        from_type: TypeDescriptor,
        to_type: TypeDescriptor,
        action: ConverterAction,
    ) -> std::result::Result<Self, ChainError> {
        let id = id.into();
        if from_type.is_wildcard() {
            return Err(ChainError::WildcardInput { capability: id });
        }
        Ok(Converter {
            id,
            from_type,
            to_type,
            can_chain: true,
            guard: None,
            action,
        })
    }

    /// Restrict matching beyond the declared types.
    pub fn with_guard(mut self, guard: ConverterGuard) -> Self {
        self.guard = Some(guard);
        self
    }

    /// Forbid using this converter as the left element of a chain.
    pub fn terminal(mut self) -> Self {
        self.can_chain = false;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
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

    pub fn can_chain(&self) -> bool {
        self.can_chain
    }

    pub(crate) fn guard_accepts_wildcard(&self, strict: StrictMode) -> bool {
        match &self.guard {
            Some(g) => g(strict, None, None),
            None => true,
        }
    }

    /// Match this converter's declaration against a query, where either axis
    /// may be left unspecified. This is the four-way exact/approximate
    /// branching every chain decision is built on.
    pub fn match_against(
        &self,
        graph: &TypeGraph,
        strict: StrictMode,
        from: Option<&TypeDescriptor>,
        to: Option<&TypeDescriptor>,
    ) -> MatchOutcome {
        if let Some(guard) = &self.guard {
            if !guard(strict, from, to) {
                return MatchOutcome::NoMatch;
            }
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

    /// Would chaining `right` after `self` ever improve on what `self`
    /// already produces? Appending is pointless when the pair can only move
    /// sideways or backwards in the subtype graph, except that a generic
    /// right-hand side is always considered valuable.
    pub fn worth_chaining_with(&self, right: &Converter, graph: &TypeGraph) -> bool {
        if !self.can_chain {
            false
        } else if !self.to_type.is_wildcard() && right.to_type.is_wildcard() {
            true
        } else if graph.is_subtype(&self.from_type, &right.to_type)
            || graph.is_subtype(&self.to_type, &right.to_type)
            || graph.is_subtype(&self.from_type, &right.from_type)
        {
            false
        } else {
            true
        }
    }

    /// Run the conversion.
    pub fn convert(
        &self,
        desired: &TypeDescriptor,
        value: Value,
        location: &str,
        ctx: &ExecutionContext,
    ) -> Result<Value> {
        (self.action)(desired, value, ctx).map_err(|source| Error::Execution {
            capability: self.id.clone(),
            location: location.to_string(),
            source,
        })
    }
}

/// How a parser consumes its located object.
pub enum ParserKind {
    /// Parses an atomic object's contents directly.
    Atomic { action: AtomicAction },
    /// Declares child requirements, then assembles the children's values.
    Composite {
        children: ChildrenFn,
        assemble: AssembleAction,
    },
}

/// A registered object-to-value capability.
pub struct Parser {
    id: String,
    supported_types: Vec<TypeDescriptor>,
    supported_extensions: Vec<String>,
    can_chain: bool,
    guard: Option<ParserGuard>,
    kind: ParserKind,
}

impl fmt::Debug for Parser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Parser<{}: {:?} -> {:?}>",
            self.id, self.supported_extensions, self.supported_types
        )
    }
}

impl Parser {
    /// A parser over atomic objects with the given extensions.
    pub fn atomic(
        id: impl Into<String>,
        supported_types: Vec<TypeDescriptor>,
        supported_extensions: Vec<String>,
        action: AtomicAction,
    ) -> std::result::Result<Self, ChainError> {
        let id = id.into();
        validate_declared_types(&id, &supported_types)?;
        if supported_extensions.is_empty() {
            return Err(ChainError::EmptyDeclaration {
                capability: id,
                what: "extensions".to_string(),
            });
        }
        for ext in &supported_extensions {
            check_extension(&id, ext, false)?;
        }
        Ok(Parser {
            id,
            supported_types,
            supported_extensions,
            can_chain: true,
            guard: None,
            kind: ParserKind::Atomic { action },
        })
    }

    /// A parser over composite objects. Always declared on the multifile
    /// pseudo-extension.
    pub fn composite(
        id: impl Into<String>,
        supported_types: Vec<TypeDescriptor>,
        children: ChildrenFn,
        assemble: AssembleAction,
    ) -> std::result::Result<Self, ChainError> {
        let id = id.into();
        validate_declared_types(&id, &supported_types)?;
        Ok(Parser {
            id,
            supported_types,
            supported_extensions: vec![MULTIFILE_EXT.to_string()],
            can_chain: true,
            guard: None,
            kind: ParserKind::Composite { children, assemble },
        })
    }

    pub fn with_guard(mut self, guard: ParserGuard) -> Self {
        self.guard = Some(guard);
        self
    }

    /// Forbid completing this parser with converter chains.
    pub fn terminal(mut self) -> Self {
        self.can_chain = false;
        self
    }
}

fn validate_declared_types(
    id: &str,
    types: &[TypeDescriptor],
) -> std::result::Result<(), ChainError> {
    if types.is_empty() {
        return Err(ChainError::EmptyDeclaration {
            capability: id.to_string(),
            what: "types".to_string(),
        });
    }
    if types.len() > 1 && types.iter().any(|t| t.is_wildcard()) {
        return Err(ChainError::WildcardAmongOthers {
            capability: id.to_string(),
        });
    }
    Ok(())
}

/// Anything the registries can hand out: a leaf parser or a synthesized
/// parsing chain.
pub trait ParsingCapability: Send + Sync {
    fn id(&self) -> String;

    fn supported_types(&self) -> Vec<TypeDescriptor>;

    fn supported_extensions(&self) -> Vec<String>;

    fn is_generic(&self) -> bool {
        self.supported_types().iter().any(|t| t.is_wildcard())
    }

    fn can_chain(&self) -> bool {
        true
    }

    /// Number of leaf steps; used to rank shorter pipelines above longer
    /// ones.
    fn chain_len(&self) -> usize {
        1
    }

    /// Match the declaration against a query where either axis may be
    /// unspecified.
    fn match_query(
        &self,
        graph: &TypeGraph,
        strict: StrictMode,
        desired: Option<&TypeDescriptor>,
        ext: Option<&str>,
    ) -> MatchOutcome;

    /// Resolve the plans for any children this capability needs for the
    /// given object. Leaf atomic capabilities return an empty map.
    fn build_children(
        &self,
        resolver: &Resolver,
        desired: &TypeDescriptor,
        object: &LocatedObject,
    ) -> Result<BTreeMap<String, ExecutablePlan>>;

    /// Produce the value for the object, given executed or executable child
    /// plans.
    fn run(
        &self,
        desired: &TypeDescriptor,
        object: &LocatedObject,
        children: &mut ChildValues<'_>,
        ctx: &ExecutionContext,
    ) -> Result<Value>;
}

/// Shared declaration matcher for parsers and parsing chains.
pub(crate) fn match_declaration(
    graph: &TypeGraph,
    strict: StrictMode,
    supported_types: &[TypeDescriptor],
    supported_extensions: &[String],
    guard: Option<&ParserGuard>,
    desired: Option<&TypeDescriptor>,
    ext: Option<&str>,
) -> MatchOutcome {
    if let Some(guard) = guard {
        if !guard(strict, desired) {
            return MatchOutcome::NoMatch;
        }
    }
    if let Some(ext) = ext {
        if !supported_extensions.iter().any(|e| e == ext) {
            return MatchOutcome::NoMatch;
        }
    }
    let desired = match desired {
        None => return MatchOutcome::exact(),
        Some(d) => d,
    };
    // A wildcard request means "whatever this extension naturally yields";
    // any capability that supports the extension matches exactly.
    if desired.is_wildcard() {
        return MatchOutcome::exact();
    }
    if supported_types.iter().any(|t| t.is_wildcard() || t == desired) {
        return MatchOutcome::exact();
    }
    if !strict.is_strict() && supported_types.iter().any(|t| graph.is_subtype(t, desired)) {
        return MatchOutcome::Match {
            input_exact: true,
            output_exact: false,
        };
    }
    MatchOutcome::NoMatch
}

impl ParsingCapability for Parser {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn supported_types(&self) -> Vec<TypeDescriptor> {
        self.supported_types.clone()
    }

    fn supported_extensions(&self) -> Vec<String> {
        self.supported_extensions.clone()
    }

    fn can_chain(&self) -> bool {
        self.can_chain
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
            &self.supported_types,
            &self.supported_extensions,
            self.guard.as_ref(),
            desired,
            ext,
        )
    }

    fn build_children(
        &self,
        resolver: &Resolver,
        desired: &TypeDescriptor,
        object: &LocatedObject,
    ) -> Result<BTreeMap<String, ExecutablePlan>> {
        let children_fn = match &self.kind {
            ParserKind::Atomic { .. } => return Ok(BTreeMap::new()),
            ParserKind::Composite { children, .. } => children,
        };
        let requests = children_fn(desired, object).map_err(|source| Error::Execution {
            capability: self.id.clone(),
            location: object.location.clone(),
            source,
        })?;
        let mut plans = BTreeMap::new();
        for (name, request) in requests {
            match object.child(&name) {
                Some(child) => {
                    let plan =
                        resolver.resolve(child, &DesiredType::Single(request.desired_type))?;
                    plans.insert(name, plan);
                }
                None if request.required => {
                    return Err(Error::MissingChild {
                        capability: self.id.clone(),
                        location: object.location.clone(),
                        child: name,
                    });
                }
                None => {
                    log::debug!(
                        "optional child '{}' absent from {}, skipping",
                        name,
                        object.location
                    );
                }
            }
        }
        Ok(plans)
    }

    fn run(
        &self,
        desired: &TypeDescriptor,
        object: &LocatedObject,
        children: &mut ChildValues<'_>,
        ctx: &ExecutionContext,
    ) -> Result<Value> {
        let result = match &self.kind {
            ParserKind::Atomic { action } => action(desired, object, ctx),
            ParserKind::Composite { assemble, .. } => assemble(desired, object, children, ctx),
        };
        result.map_err(|source| Error::Execution {
            capability: self.id.clone(),
            location: object.location.clone(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn graph() -> TypeGraph {
        let mut g = TypeGraph::new();
        g.register_subtype("Int", "Number");
        g
    }

    fn int_to_str() -> Converter {
        Converter::new(
            "int_to_str",
            TypeDescriptor::named("Int"),
            TypeDescriptor::named("Str"),
            Box::new(|_, v, _| Ok(json!(v.to_string()))),
        )
        .unwrap()
    }

    #[test]
    fn test_converter_rejects_wildcard_input() {
        let err = Converter::new(
            "bad",
            TypeDescriptor::Wildcard,
            TypeDescriptor::named("Str"),
            Box::new(|_, v, _| Ok(v)),
        )
        .unwrap_err();
        assert!(matches!(err, ChainError::WildcardInput { .. }));
    }

    #[test]
    fn test_converter_match_exact_and_joker() {
        let g = graph();
        let c = int_to_str();
        let int = TypeDescriptor::named("Int");
        let str_t = TypeDescriptor::named("Str");
        assert!(c
            .match_against(&g, StrictMode::Strict, Some(&int), Some(&str_t))
            .is_exact());
        // Unspecified axes are exact.
        assert!(c.match_against(&g, StrictMode::Strict, None, None).is_exact());
        // Wildcard input query matches exactly too.
        assert!(c
            .match_against(&g, StrictMode::Strict, Some(&TypeDescriptor::Wildcard), None)
            .is_exact());
    }

    #[test]
    fn test_converter_match_lenient_input() {
        let mut g = graph();
        g.register_subtype("SmallInt", "Int");
        let c = int_to_str();
        let small = TypeDescriptor::named("SmallInt");
        assert_eq!(
            c.match_against(&g, StrictMode::Strict, Some(&small), None),
            MatchOutcome::NoMatch
        );
        assert_eq!(
            c.match_against(&g, StrictMode::Lenient, Some(&small), None),
            MatchOutcome::Match {
                input_exact: false,
                output_exact: true,
            }
        );
    }

    #[test]
    fn test_converter_match_lenient_output() {
        let mut g = graph();
        g.register_subtype("Str", "Text");
        let c = int_to_str();
        let int = TypeDescriptor::named("Int");
        let text = TypeDescriptor::named("Text");
        assert_eq!(
            c.match_against(&g, StrictMode::Strict, Some(&int), Some(&text)),
            MatchOutcome::NoMatch
        );
        assert_eq!(
            c.match_against(&g, StrictMode::Lenient, Some(&int), Some(&text)),
            MatchOutcome::Match {
                input_exact: true,
                output_exact: false,
            }
        );
    }

    #[test]
    fn test_generic_converter_matches_any_output_exactly() {
        let g = graph();
        let c = Converter::new(
            "to_anything",
            TypeDescriptor::named("Str"),
            TypeDescriptor::Wildcard,
            Box::new(|_, v, _| Ok(v)),
        )
        .unwrap();
        assert!(c
            .match_against(
                &g,
                StrictMode::Strict,
                Some(&TypeDescriptor::named("Str")),
                Some(&TypeDescriptor::named("Bool")),
            )
            .is_exact());
    }

    #[test]
    fn test_worth_chaining_rejects_backwards_pairs() {
        let g = graph();
        let up = Converter::new(
            "int_to_number",
            TypeDescriptor::named("Int"),
            TypeDescriptor::named("Number"),
            Box::new(|_, v, _| Ok(v)),
        )
        .unwrap();
        let down = Converter::new(
            "number_to_int",
            TypeDescriptor::named("Number"),
            TypeDescriptor::named("Int"),
            Box::new(|_, v, _| Ok(v)),
        )
        .unwrap();
        // Going Int -> Number -> Int lands where we started.
        assert!(!up.worth_chaining_with(&down, &g));
        // A generic right-hand side is always worth it.
        let generic = Converter::new(
            "generic",
            TypeDescriptor::named("Number"),
            TypeDescriptor::Wildcard,
            Box::new(|_, v, _| Ok(v)),
        )
        .unwrap();
        assert!(up.worth_chaining_with(&generic, &g));
        // A terminal converter never chains.
        let terminal = int_to_str().terminal();
        assert!(!terminal.worth_chaining_with(&generic, &g));
    }

    #[test]
    fn test_parser_declaration_validation() {
        let err = Parser::atomic(
            "p",
            vec![TypeDescriptor::Wildcard, TypeDescriptor::named("Int")],
            vec![".num".to_string()],
            Box::new(|_, _, _| Ok(json!(null))),
        )
        .unwrap_err();
        assert!(matches!(err, ChainError::WildcardAmongOthers { .. }));

        let err = Parser::atomic(
            "p",
            vec![TypeDescriptor::named("Int")],
            vec!["num".to_string()],
            Box::new(|_, _, _| Ok(json!(null))),
        )
        .unwrap_err();
        assert!(matches!(err, ChainError::InvalidExtension { .. }));
    }

    #[test]
    fn test_parser_match_wildcard_desired_is_exact() {
        let g = graph();
        let p = Parser::atomic(
            "num_parser",
            vec![TypeDescriptor::named("Int")],
            vec![".num".to_string()],
            Box::new(|_, _, _| Ok(json!(0))),
        )
        .unwrap();
        let out = p.match_query(
            &g,
            StrictMode::Strict,
            Some(&TypeDescriptor::Wildcard),
            Some(".num"),
        );
        assert!(out.is_exact());
        // Unsupported extension blocks the match entirely.
        let out = p.match_query(
            &g,
            StrictMode::Strict,
            Some(&TypeDescriptor::Wildcard),
            Some(".json"),
        );
        assert_eq!(out, MatchOutcome::NoMatch);
    }

    #[test]
    fn test_parser_match_lenient_type() {
        let g = graph();
        let p = Parser::atomic(
            "num_parser",
            vec![TypeDescriptor::named("Int")],
            vec![".num".to_string()],
            Box::new(|_, _, _| Ok(json!(0))),
        )
        .unwrap();
        let number = TypeDescriptor::named("Number");
        assert_eq!(
            p.match_query(&g, StrictMode::Strict, Some(&number), Some(".num")),
            MatchOutcome::NoMatch
        );
        assert_eq!(
            p.match_query(&g, StrictMode::Lenient, Some(&number), Some(".num")),
            MatchOutcome::Match {
                input_exact: true,
                output_exact: false,
            }
        );
    }

    #[test]
    fn test_parser_guard_restricts_match() {
        let g = graph();
        let p = Parser::atomic(
            "guarded",
            vec![TypeDescriptor::named("Int")],
            vec![".num".to_string()],
            Box::new(|_, _, _| Ok(json!(0))),
        )
        .unwrap()
        .with_guard(Box::new(|_, desired| {
            desired.map_or(true, |d| d != &TypeDescriptor::named("Int"))
        }));
        let int = TypeDescriptor::named("Int");
        assert_eq!(
            p.match_query(&g, StrictMode::Strict, Some(&int), Some(".num")),
            MatchOutcome::NoMatch
        );
        assert!(p
            .match_query(&g, StrictMode::Strict, None, Some(".num"))
            .matched());
    }
}
