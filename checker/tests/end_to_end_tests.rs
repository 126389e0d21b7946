// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

mod common;

use common::{
    diamond, loop_with_error, loop_with_two_errors, num, options, run_cegar, x, Exploration,
    Verdict,
};
use predicate_cpa::cfa::{CfaBuilder, EdgeKind};
use predicate_cpa::cpa::PredicateCpa;
use predicate_cpa::expression::{Expression, ExpressionTrait};
use predicate_cpa::precision::Predicate;
use predicate_cpa::refiner::RefinementResult;

#[test]
fn unreachable_error_is_proved_after_one_refinement() {
    common::init_logging();
    let fixture = loop_with_error(0);
    let mut cpa = PredicateCpa::with_bounded_solver(fixture.cfa, options(""));
    let (verdict, refinements) = run_cegar(&mut cpa, 5).unwrap();
    assert!(matches!(verdict, Verdict::Safe));
    assert_eq!(refinements, 1);
    let is_one = Predicate::try_new(x().equals(num(1))).unwrap();
    assert!(cpa
        .get_initial_precision(fixture.entry)
        .has_predicate_at(fixture.head, &is_one));
}

#[test]
fn reachable_error_is_reported() {
    let fixture = loop_with_error(1);
    let mut cpa = PredicateCpa::with_bounded_solver(fixture.cfa, options(""));
    let (verdict, refinements) = run_cegar(&mut cpa, 5).unwrap();
    assert_eq!(refinements, 0);
    match verdict {
        Verdict::Unsafe(path) => {
            assert!(!path.is_imprecise);
            assert_eq!(path.edges, vec![fixture.init_edge, fixture.error_edge]);
        }
        Verdict::Safe => panic!("the error location is reachable"),
    }
}

#[test]
fn each_error_gets_its_own_predicate() {
    for abstraction_type in &["boolean", "cartesian"] {
        let fixture = loop_with_two_errors();
        let mut cpa = PredicateCpa::with_bounded_solver(
            fixture.cfa,
            options(&format!("--abstraction_type {}", abstraction_type)),
        );
        let (verdict, refinements) = run_cegar(&mut cpa, 5).unwrap();
        assert!(matches!(verdict, Verdict::Safe));
        assert_eq!(refinements, 2);
        let precision = cpa.get_initial_precision(fixture.entry);
        assert_eq!(precision.predicates_at(fixture.head).len(), 2);
        assert_eq!(cpa.statistics().spurious_counterexamples, 2);
    }
}

#[test]
fn programs_without_errors_need_no_refinement() {
    let fixture = diamond();
    let mut cpa = PredicateCpa::with_bounded_solver(fixture.cfa, options(""));
    let (verdict, refinements) = run_cegar(&mut cpa, 0).unwrap();
    assert!(matches!(verdict, Verdict::Safe));
    assert_eq!(refinements, 0);
    assert_eq!(cpa.statistics().refinements, 0);
}

#[test]
fn errors_behind_straight_line_code_are_found() {
    // y := 3; x := y + 2; if (x == 5) error
    let mut builder = CfaBuilder::new();
    let entry = builder.add_function_entry("main");
    let assigned_y = builder.add_node("main");
    let assigned_x = builder.add_node("main");
    let exit = builder.add_node("main");
    let error = builder.add_error_node("main");
    let y = Expression::int_variable("y");
    builder.add_edge(
        entry,
        assigned_y,
        EdgeKind::Statement {
            target: y.clone(),
            value: num(3),
        },
    );
    builder.add_edge(
        assigned_y,
        assigned_x,
        EdgeKind::Statement {
            target: x(),
            value: y.addition(num(2)),
        },
    );
    let (error_edge, _) = builder.add_branch(assigned_x, x().equals(num(5)), error, exit);
    let mut cpa = PredicateCpa::with_bounded_solver(builder.build(entry), options("--sat_check 1"));
    let (verdict, refinements) = run_cegar(&mut cpa, 2).unwrap();
    assert_eq!(refinements, 0);
    match verdict {
        Verdict::Unsafe(path) => assert_eq!(path.edges.last(), Some(&error_edge)),
        Verdict::Safe => panic!("x is 5 at the branch"),
    }
}

#[test]
fn refinement_resumes_below_the_returned_root() {
    let fixture = loop_with_error(0);
    let mut cpa = PredicateCpa::with_bounded_solver(fixture.cfa.clone(), options(""));
    let mut exploration = Exploration::start(&mut cpa);
    let entry_node = exploration.arg.root().unwrap();
    let target = exploration
        .run(&mut cpa)
        .unwrap()
        .expect("the error location is reached before refinement");
    let path = exploration.arg.path_to(target).unwrap();
    let root = match cpa.perform_refinement(&exploration.arg, &path).unwrap() {
        RefinementResult::Spurious { root, .. } => root,
        other => panic!("expected a spurious counterexample, got {:?}", other),
    };
    assert_ne!(root, entry_node);
    assert_eq!(exploration.arg.parents(root), vec![entry_node]);
    let abstractions_before = cpa.statistics().abstractions;

    exploration.restart_from(&mut cpa, root);
    assert!(!exploration.arg.contains(root));
    assert!(!exploration.arg.contains(target));
    assert_eq!(exploration.arg.root(), Some(entry_node));
    assert_eq!(exploration.arg.node_count(), 1);

    assert_eq!(exploration.run(&mut cpa).unwrap(), None);
    assert_eq!(exploration.arg.root(), Some(entry_node));
    assert!(cpa.statistics().abstractions > abstractions_before);
    let heads = exploration.arg.children(entry_node);
    assert_eq!(heads.len(), 1);
    let (head, edge) = heads[0];
    assert_eq!(edge, fixture.init_edge);
    let head_state = &exploration.arg.node(head).unwrap().state;
    assert_eq!(
        cpa.abstraction_formula(head_state),
        Some(x().equals(num(1)).logical_not())
    );
}

#[test]
fn errors_beyond_the_solver_range_are_found() {
    // int x; if (x > 100) error
    let mut builder = CfaBuilder::new();
    let entry = builder.add_function_entry("main");
    let declared = builder.add_node("main");
    let exit = builder.add_node("main");
    let error = builder.add_error_node("main");
    let declaration = builder.add_edge(
        entry,
        declared,
        EdgeKind::Declaration {
            variable: x(),
            initializer: None,
        },
    );
    let (error_edge, _) = builder.add_branch(declared, x().greater_than(num(100)), error, exit);
    let mut cpa = PredicateCpa::with_bounded_solver(builder.build(entry), options(""));
    let (verdict, refinements) = run_cegar(&mut cpa, 2).unwrap();
    assert_eq!(refinements, 0);
    match verdict {
        Verdict::Unsafe(path) => {
            assert!(!path.is_imprecise);
            assert_eq!(path.edges, vec![declaration, error_edge]);
        }
        Verdict::Safe => panic!("x == 101 reaches the error location"),
    }
}

#[test]
fn statistics_are_reported_as_json() {
    let fixture = loop_with_error(0);
    let mut cpa = PredicateCpa::with_bounded_solver(fixture.cfa, options(""));
    run_cegar(&mut cpa, 5).unwrap();
    let json = cpa.statistics_as_json().unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["refinements"], 1);
    assert_eq!(value["spurious_counterexamples"], 1);
    assert!(value["abstractions"].as_u64().unwrap() > 0);
}
