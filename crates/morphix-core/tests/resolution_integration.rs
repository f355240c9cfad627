//! End-to-end tests for resolution, chain synthesis, cascades and plans


use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde_json::json;

use morphix_core::{
    CapabilityRegistry, ChildRequest, DesiredType, Error, ExecMode, ExecutablePlan,
    ExecutionContext, LocatedObject, Parser, Resolver, StrictMode, TypeDescriptor,
};

use test_support::*;

#[test]
fn test_parser_completed_with_two_step_chain() {
    // .num yields Int; Bool is only reachable through Int -> Str -> Bool.
    let resolver = Resolver::new(standard_registry(StrictMode::Strict));
    let obj = LocatedObject::atomic("./flags/active.num", ".num", "1");

    let mut plan = resolver
        .resolve(&obj, &DesiredType::Single(bool_t()))
        .unwrap();
    assert_eq!(
        plan.capability_id(),
        "num_parser -> int_to_str -> str_to_bool"
    );
    let value = plan.execute(&ExecutionContext::new()).unwrap();
    assert_eq!(value, json!(true));

    let obj = LocatedObject::atomic("./flags/inactive.num", ".num", "0");
    let value = resolver
        .parse(&obj, &DesiredType::Single(bool_t()), &ExecutionContext::new())
        .unwrap();
    assert_eq!(value, json!(false));
}

#[test]
fn test_single_candidate_failure_is_not_wrapped_in_a_cascade() {
    let resolver = Resolver::new(standard_registry(StrictMode::Strict));
    // 7 parses as Int and renders as "7", which str_to_bool rejects.
    let obj = LocatedObject::atomic("./flags/odd.num", ".num", "7");
    let err = resolver
        .parse(&obj, &DesiredType::Single(bool_t()), &ExecutionContext::new())
        .unwrap_err();
    match err {
        Error::Execution { capability, .. } => assert_eq!(capability, "str_to_bool"),
        other => panic!("expected execution error, got {other}"),
    }
}

#[test]
fn test_ranking_exact_over_approx_over_generic() {
    let mut reg = CapabilityRegistry::new("rank", StrictMode::Lenient, number_graph());
    reg.register_parser(num_parser()).unwrap(); // Int: approx for Number
    reg.register_parser(
        Parser::atomic(
            "number_parser",
            vec![TypeDescriptor::named("Number")],
            vec![".num".to_string()],
            Box::new(|_, _, _| Ok(json!(0))),
        )
        .unwrap(),
    )
    .unwrap();
    reg.register_parser(
        Parser::atomic(
            "any_parser",
            vec![TypeDescriptor::Wildcard],
            vec![".num".to_string()],
            Box::new(|_, _, _| Ok(json!(0))),
        )
        .unwrap(),
    )
    .unwrap();

    let q = reg.find_all_matching(
        StrictMode::Lenient,
        Some(&TypeDescriptor::named("Number")),
        Some(".num"),
    );
    let best: Vec<String> = q.ranked_best_first().iter().map(|p| p.id()).collect();
    assert_eq!(best[0], "number_parser");
    assert_eq!(best[1], "num_parser");
    assert_eq!(best.last().unwrap(), "any_parser");
}

#[test]
fn test_best_first_ranking_reverses_the_matching_order() {
    for mode in [StrictMode::Strict, StrictMode::Lenient] {
        let mut reg = CapabilityRegistry::new("rank", mode, number_graph());
        reg.register_parser(num_parser()).unwrap();
        reg.register_parser(
            Parser::atomic(
                "number_parser",
                vec![TypeDescriptor::named("Number")],
                vec![".num".to_string()],
                Box::new(|_, obj, _| {
                    let n: i64 = obj.contents().unwrap_or("").trim().parse()?;
                    Ok(json!(n))
                }),
            )
            .unwrap(),
        )
        .unwrap();
        reg.register_parser(
            Parser::atomic(
                "any_parser",
                vec![TypeDescriptor::Wildcard],
                vec![".num".to_string()],
                Box::new(|_, _, _| Ok(json!(0))),
            )
            .unwrap(),
        )
        .unwrap();
        reg.register_converters(vec![int_to_str(), str_to_bool()])
            .unwrap();

        let number = TypeDescriptor::named("Number");
        let q = reg.find_all_matching(mode, Some(&number), Some(".num"));
        let mut worst_first: Vec<String> = q.all_matching().iter().map(|p| p.id()).collect();
        let best_first: Vec<String> = q.ranked_best_first().iter().map(|p| p.id()).collect();
        worst_first.reverse();
        assert_eq!(worst_first, best_first, "ranking mismatch in {mode} mode");

        let mut deduped = best_first.clone();
        deduped.sort();
        deduped.dedup();
        assert_eq!(
            deduped.len(),
            best_first.len(),
            "duplicate candidates in {mode} mode"
        );

        // The resolver tries candidates in exactly this best-first order.
        let resolver = Resolver::new(reg);
        let obj = LocatedObject::atomic("./v.num", ".num", "3");
        match resolver
            .resolve(&obj, &DesiredType::Single(number))
            .unwrap()
        {
            ExecutablePlan::Cascade(c) => {
                assert_eq!(c.active_capability().as_deref(), Some(best_first[0].as_str()))
            }
            ExecutablePlan::Single(node) => assert_eq!(node.capability_id(), best_first[0]),
        }
    }
}

#[test]
fn test_lenient_requests_for_supertypes_succeed_where_exact_ones_do() {
    // Int is a declared subtype of Number: anything parseable as an Int must
    // be parseable as a Number in lenient mode, with the same value.
    let resolver = Resolver::new(standard_registry(StrictMode::Lenient));
    let obj = LocatedObject::atomic("./v.num", ".num", "9");
    let ctx = ExecutionContext::new();

    let as_int = resolver
        .parse(&obj, &DesiredType::Single(int()), &ctx)
        .unwrap();
    assert_eq!(as_int, json!(9));
    let as_number = resolver
        .parse(&obj, &DesiredType::Single(TypeDescriptor::named("Number")), &ctx)
        .unwrap();
    assert_eq!(as_number, as_int);

    // A strict registry refuses the supertype request outright.
    let strict = Resolver::new(standard_registry(StrictMode::Strict));
    let err = strict
        .resolve(&obj, &DesiredType::Single(TypeDescriptor::named("Number")))
        .unwrap_err();
    assert!(matches!(err, Error::NoCapabilityForType { .. }));
}

#[test]
fn test_candidates_do_not_depend_on_registration_order() {
    let candidate_ids = |parser_first: bool, converters_swapped: bool| {
        let mut reg = CapabilityRegistry::new("order", StrictMode::Strict, number_graph());
        let convs = if converters_swapped {
            vec![str_to_bool(), int_to_str()]
        } else {
            vec![int_to_str(), str_to_bool()]
        };
        if parser_first {
            reg.register_parser(num_parser()).unwrap();
            reg.register_converters(convs).unwrap();
        } else {
            reg.register_converters(convs).unwrap();
            reg.register_parser(num_parser()).unwrap();
        }
        let q = reg.find_all_matching(StrictMode::Strict, Some(&bool_t()), Some(".num"));
        // No duplicates within any bucket.
        for bucket in [&q.generic, &q.approx, &q.exact] {
            let mut ids: Vec<String> = bucket.iter().map(|p| p.id()).collect();
            let before = ids.len();
            ids.sort();
            ids.dedup();
            assert_eq!(before, ids.len(), "duplicate candidates in a bucket");
        }
        let mut ids: Vec<String> = q.all_matching().iter().map(|p| p.id()).collect();
        ids.sort();
        ids
    };

    let baseline = candidate_ids(true, false);
    assert!(!baseline.is_empty());
    assert_eq!(baseline, candidate_ids(true, true));
    assert_eq!(baseline, candidate_ids(false, false));
    assert_eq!(baseline, candidate_ids(false, true));
}

#[test]
fn test_cascade_falls_through_failures_to_success() {
    let mut reg = CapabilityRegistry::new("cascade", StrictMode::Strict, number_graph());
    // Registered first means ranked last: the two failing parsers are tried
    // before the working one.
    reg.register_parser(num_parser()).unwrap();
    reg.register_parser(failing_parser("broken_a")).unwrap();
    reg.register_parser(failing_parser("broken_b")).unwrap();
    let resolver = Resolver::new(reg);

    let obj = LocatedObject::atomic("./v.num", ".num", "5");
    let plan = resolver
        .resolve(&obj, &DesiredType::Single(int()))
        .unwrap();
    let mut cascade = match plan {
        ExecutablePlan::Cascade(c) => c,
        other => panic!("expected cascade, got {other:?}"),
    };
    assert_eq!(cascade.active_capability().as_deref(), Some("broken_b"));

    let value = cascade.execute(&ExecutionContext::new()).unwrap();
    assert_eq!(value, json!(5));
    let attempted: Vec<&str> = cascade
        .attempts()
        .iter()
        .map(|a| a.capability.as_str())
        .collect();
    assert_eq!(attempted, vec!["broken_b", "broken_a"]);
}

#[test]
fn test_exhausted_cascade_reports_every_attempt() {
    let mut reg = CapabilityRegistry::new("cascade", StrictMode::Strict, number_graph());
    reg.register_parser(failing_parser("broken_a")).unwrap();
    reg.register_parser(failing_parser("broken_b")).unwrap();
    let resolver = Resolver::new(reg);

    let obj = LocatedObject::atomic("./v.num", ".num", "5");
    let err = resolver
        .parse(&obj, &DesiredType::Single(int()), &ExecutionContext::new())
        .unwrap_err();
    match err {
        Error::CascadeExhausted { attempts, .. } => {
            let names: Vec<&str> = attempts.0.iter().map(|a| a.capability.as_str()).collect();
            assert_eq!(names, vec!["broken_b", "broken_a"]);
        }
        other => panic!("expected exhausted cascade, got {other}"),
    }
}

#[test]
fn test_wrong_result_type_flags_the_lying_capability() {
    let mut reg = CapabilityRegistry::new("liar", StrictMode::Strict, number_graph());
    reg.register_parser(
        Parser::atomic(
            "lying_parser",
            vec![int()],
            vec![".num".to_string()],
            Box::new(|_, _, _| Ok(json!("not an int"))),
        )
        .unwrap(),
    )
    .unwrap();
    let resolver = Resolver::new(reg);

    let obj = LocatedObject::atomic("./v.num", ".num", "5");
    let err = resolver
        .parse(&obj, &DesiredType::Single(int()), &ExecutionContext::new())
        .unwrap_err();
    match err {
        Error::WrongResultType {
            capability,
            expected,
            ..
        } => {
            assert_eq!(capability, "lying_parser");
            assert_eq!(expected, "Int");
        }
        other => panic!("expected wrong-result-type, got {other}"),
    }
}

#[test]
fn test_composite_assembly_with_optional_child() {
    let mut reg = CapabilityRegistry::new("pairs", StrictMode::Strict, number_graph());
    reg.register_parser(num_parser()).unwrap();
    reg.register_parser(pair_parser()).unwrap();
    let resolver = Resolver::new(reg);
    let desired = DesiredType::Single(TypeDescriptor::named("Pair"));

    let full = resolver
        .parse(&pair_object("1", Some("2")), &desired, &ExecutionContext::new())
        .unwrap();
    assert_eq!(full, json!({ "a": 1, "b": 2 }));

    // The optional child may be absent.
    let partial = resolver
        .parse(&pair_object("1", None), &desired, &ExecutionContext::new())
        .unwrap();
    assert_eq!(partial, json!({ "a": 1, "b": null }));
}

#[test]
fn test_missing_mandatory_child_fails_plan_building() {
    let mut reg = CapabilityRegistry::new("pairs", StrictMode::Strict, number_graph());
    reg.register_parser(num_parser()).unwrap();
    reg.register_parser(pair_parser()).unwrap();
    let resolver = Resolver::new(reg);

    let empty = LocatedObject::composite("./pair", Default::default());
    let err = resolver
        .resolve(&empty, &DesiredType::Single(TypeDescriptor::named("Pair")))
        .unwrap_err();
    match err {
        Error::MissingChild { child, .. } => assert_eq!(child, "a"),
        other => panic!("expected missing child, got {other}"),
    }
}

#[test]
fn test_lazy_and_eager_modes_agree_on_the_result() {
    let mut reg = CapabilityRegistry::new("pairs", StrictMode::Strict, number_graph());
    reg.register_parser(num_parser()).unwrap();
    reg.register_parser(pair_parser()).unwrap();
    let resolver = Resolver::new(reg);
    let desired = DesiredType::Single(TypeDescriptor::named("Pair"));
    let obj = pair_object("3", Some("4"));

    let eager = resolver
        .parse(&obj, &desired, &ExecutionContext::new().with_mode(ExecMode::Eager))
        .unwrap();
    let lazy = resolver
        .parse(&obj, &desired, &ExecutionContext::new().with_mode(ExecMode::Lazy))
        .unwrap();
    assert_eq!(eager, lazy);
}

#[test]
fn test_lazy_mode_skips_children_the_assembler_never_asks_for() {
    let counter = Arc::new(AtomicUsize::new(0));
    let mut reg = CapabilityRegistry::new("lazy", StrictMode::Strict, number_graph());
    reg.register_parser(counting_num_parser("counting_num", Arc::clone(&counter)))
        .unwrap();
    reg.register_parser(
        Parser::composite(
            "first_only",
            vec![TypeDescriptor::named("Pair")],
            Box::new(|_, _| {
                let mut children = std::collections::BTreeMap::new();
                children.insert("a".to_string(), ChildRequest::required(int()));
                children.insert("b".to_string(), ChildRequest::optional(int()));
                Ok(children)
            }),
            Box::new(|_, _, children, _| {
                let a = children.require("a")?;
                Ok(json!({ "a": a }))
            }),
        )
        .unwrap(),
    )
    .unwrap();
    let resolver = Resolver::new(reg);
    let desired = DesiredType::Single(TypeDescriptor::named("Pair"));
    let obj = pair_object("3", Some("4"));

    resolver
        .parse(&obj, &desired, &ExecutionContext::new().with_mode(ExecMode::Lazy))
        .unwrap();
    assert_eq!(counter.load(Ordering::SeqCst), 1, "only child 'a' should run");

    counter.store(0, Ordering::SeqCst);
    resolver
        .parse(&obj, &desired, &ExecutionContext::new().with_mode(ExecMode::Eager))
        .unwrap();
    assert_eq!(counter.load(Ordering::SeqCst), 2, "eager mode runs both children");
}

#[test]
fn test_one_of_cascades_across_alternatives() {
    let resolver = Resolver::new(standard_registry(StrictMode::Strict));
    // "7" is not a boolean rendering, so the Bool alternative fails at
    // execution and the Str alternative takes over.
    let obj = LocatedObject::atomic("./v.num", ".num", "7");
    let desired = DesiredType::OneOf(vec![bool_t(), str_t()]);
    let value = resolver
        .parse(&obj, &desired, &ExecutionContext::new())
        .unwrap();
    assert_eq!(value, json!("7"));
}

#[test]
fn test_wildcard_desired_type_takes_the_natural_parse() {
    let resolver = Resolver::new(standard_registry(StrictMode::Strict));
    let obj = LocatedObject::atomic("./v.num", ".num", "12");
    let value = resolver
        .parse(
            &obj,
            &DesiredType::Single(TypeDescriptor::Wildcard),
            &ExecutionContext::new(),
        )
        .unwrap();
    assert_eq!(value, json!(12));
}

#[test]
fn test_assembler_receives_execution_options() {
    let mut reg = CapabilityRegistry::new("opts", StrictMode::Strict, number_graph());
    reg.register_parser(num_parser()).unwrap();
    reg.register_parser(
        Parser::composite(
            "scaled_pair",
            vec![TypeDescriptor::named("Pair")],
            Box::new(|_, _| {
                let mut children = std::collections::BTreeMap::new();
                children.insert("a".to_string(), ChildRequest::required(int()));
                Ok(children)
            }),
            Box::new(|_, _, children, ctx| {
                let scale = ctx
                    .options_for("scaled_pair")
                    .get("scale")
                    .and_then(|v| v.as_i64())
                    .unwrap_or(1);
                let a = children.require("a")?.as_i64().unwrap_or(0);
                Ok(json!({ "a": a * scale }))
            }),
        )
        .unwrap(),
    )
    .unwrap();
    let resolver = Resolver::new(reg);

    let mut opts = serde_json::Map::new();
    opts.insert("scale".to_string(), json!(10));
    let ctx = ExecutionContext::new().with_options("scaled_pair", opts);
    let value = resolver
        .parse(
            &pair_object("4", None),
            &DesiredType::Single(TypeDescriptor::named("Pair")),
            &ctx,
        )
        .unwrap();
    assert_eq!(value, json!({ "a": 40 }));
}

#[test]
fn test_execution_options_reach_the_capability() {
    let mut reg = CapabilityRegistry::new("opts", StrictMode::Strict, number_graph());
    reg.register_parser(
        Parser::atomic(
            "offset_parser",
            vec![int()],
            vec![".num".to_string()],
            Box::new(|_, obj, ctx| {
                let offset = ctx
                    .options_for("offset_parser")
                    .get("offset")
                    .and_then(|v| v.as_i64())
                    .unwrap_or(0);
                let n: i64 = obj.contents().unwrap_or("").trim().parse()?;
                Ok(json!(n + offset))
            }),
        )
        .unwrap(),
    )
    .unwrap();
    let resolver = Resolver::new(reg);
    let obj = LocatedObject::atomic("./v.num", ".num", "40");

    let mut opts = serde_json::Map::new();
    opts.insert("offset".to_string(), json!(2));
    let ctx = ExecutionContext::new().with_options("offset_parser", opts);
    let value = resolver
        .parse(&obj, &DesiredType::Single(int()), &ctx)
        .unwrap();
    assert_eq!(value, json!(42));
}
