// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

mod common;

use common::{diamond, loop_with_error, non_abstraction, num, options, x};
use predicate_cpa::abstract_state::PredicateState;
use predicate_cpa::cfa::{CfaBuilder, EdgeKind};
use predicate_cpa::cpa::PredicateCpa;
use predicate_cpa::error::CpaError;
use predicate_cpa::expression::{Expression, ExpressionTrait, ExpressionType};
use predicate_cpa::precision::Predicate;
use std::rc::Rc;

#[test]
fn loop_heads_get_abstraction_states() {
    common::init_logging();
    let fixture = loop_with_error(0);
    let mut cpa = PredicateCpa::with_bounded_solver(fixture.cfa.clone(), options(""));
    let precision = cpa.get_initial_precision(cpa.cfa().entry());
    let initial = cpa.get_initial_state(fixture.entry);
    assert_eq!(cpa.get_initial_state(fixture.entry), initial);

    let successors = cpa
        .get_abstract_successors_for_edge(&initial, &precision, fixture.init_edge)
        .unwrap();
    assert_eq!(successors.len(), 1);
    let id = match &successors[0] {
        PredicateState::Abstraction(id) => *id,
        other => panic!("expected an abstraction state, got {:?}", other),
    };
    let state = cpa.abstraction(id);
    assert_eq!(state.location, fixture.head);
    assert_eq!(state.abstraction, Expression::make_true());
    assert_eq!(state.previous, initial.owner());
    let x1 = Expression::indexed_variable(&Rc::from("x"), ExpressionType::Integer, 1);
    assert_eq!(state.formula_before_abstraction.formula(), &x1.equals(num(0)));
    assert_eq!(cpa.statistics().abstractions, 1);
    assert_eq!(cpa.location_of(&successors[0]), Some(fixture.head));
}

#[test]
fn successors_follow_the_leaving_edges_in_order() {
    let fixture = loop_with_error(0);
    let mut cpa = PredicateCpa::with_bounded_solver(fixture.cfa.clone(), options(""));
    let precision = cpa.get_initial_precision(cpa.cfa().entry());
    let initial = cpa.get_initial_state(fixture.entry);
    let head = cpa
        .get_abstract_successors_for_edge(&initial, &precision, fixture.init_edge)
        .unwrap()
        .remove(0);

    let successors = cpa.get_abstract_successors(&head, &precision).unwrap();
    let edges: Vec<_> = successors.iter().map(|(edge, _)| *edge).collect();
    assert_eq!(edges, vec![fixture.error_edge, fixture.stay_edge]);
    assert!(successors[0].1.is_abstraction_state());
    assert!(cpa.is_target(&successors[0].1));
    let body = non_abstraction(&successors[1].1);
    assert_eq!(body.location, fixture.body);
    assert_eq!(body.size_since_abstraction, 1);
    assert_eq!(Some(body.owner), head.owner());
    assert!(!body.is_merged());
}

#[test]
fn false_abstractions_have_no_successor() {
    let fixture = loop_with_error(0);
    let mut cpa = PredicateCpa::with_bounded_solver(fixture.cfa.clone(), options(""));
    let is_one = Predicate::try_new(x().equals(num(1))).unwrap();
    let (precision, _) = cpa
        .get_initial_precision(cpa.cfa().entry())
        .refine(vec![(fixture.head, is_one)]);
    let initial = cpa.get_initial_state(fixture.entry);
    let head = cpa
        .get_abstract_successors_for_edge(&initial, &precision, fixture.init_edge)
        .unwrap()
        .remove(0);
    assert_eq!(
        cpa.abstraction_formula(&head),
        Some(x().equals(num(1)).logical_not())
    );
    let successors = cpa
        .get_abstract_successors_for_edge(&head, &precision, fixture.error_edge)
        .unwrap();
    assert!(successors.is_empty());
    assert_eq!(cpa.statistics().infeasible_abstractions, 1);
}

#[test]
fn path_formulas_are_memoized() {
    let fixture = diamond();
    let mut cpa = PredicateCpa::with_bounded_solver(fixture.cfa.clone(), options(""));
    let precision = cpa.get_initial_precision(cpa.cfa().entry());
    let initial = cpa.get_initial_state(fixture.entry);
    let first = cpa
        .get_abstract_successors_for_edge(&initial, &precision, fixture.then_edge)
        .unwrap();
    assert_eq!(cpa.statistics().path_formula_cache_hits, 0);
    let second = cpa
        .get_abstract_successors_for_edge(&initial, &precision, fixture.then_edge)
        .unwrap();
    assert_eq!(cpa.statistics().path_formula_cache_hits, 1);
    assert_eq!(first, second);
}

#[test]
fn satisfiability_checks_prune_infeasible_blocks() {
    let fixture = loop_with_error(0);
    let mut cpa = PredicateCpa::with_bounded_solver(
        fixture.cfa.clone(),
        options("--no_loop_head_abstraction --no_target_abstraction --sat_check 1"),
    );
    let precision = cpa.get_initial_precision(cpa.cfa().entry());
    let initial = cpa.get_initial_state(fixture.entry);
    let head = cpa
        .get_abstract_successors_for_edge(&initial, &precision, fixture.init_edge)
        .unwrap()
        .remove(0);
    assert!(!head.is_abstraction_state());
    let successors = cpa
        .get_abstract_successors_for_edge(&head, &precision, fixture.error_edge)
        .unwrap();
    assert!(successors.is_empty());
    assert_eq!(cpa.statistics().sat_checks, 2);
    assert_eq!(cpa.statistics().unsat_sat_checks, 1);
    assert_eq!(cpa.statistics().abstractions, 0);
}

#[test]
fn without_checks_infeasible_blocks_survive() {
    let fixture = loop_with_error(0);
    let mut cpa = PredicateCpa::with_bounded_solver(
        fixture.cfa.clone(),
        options("--no_loop_head_abstraction --no_target_abstraction"),
    );
    let precision = cpa.get_initial_precision(cpa.cfa().entry());
    let initial = cpa.get_initial_state(fixture.entry);
    let head = cpa
        .get_abstract_successors_for_edge(&initial, &precision, fixture.init_edge)
        .unwrap()
        .remove(0);
    let error = cpa
        .get_abstract_successors_for_edge(&head, &precision, fixture.error_edge)
        .unwrap()
        .remove(0);
    assert!(cpa.is_target(&error));
    assert_eq!(non_abstraction(&error).size_since_abstraction, 2);
    assert_eq!(cpa.statistics().sat_checks, 0);
}

#[test]
fn block_size_triggers_abstraction() {
    let fixture = diamond();
    let mut cpa = PredicateCpa::with_bounded_solver(
        fixture.cfa.clone(),
        options("--no_loop_head_abstraction --block_size 2"),
    );
    let precision = cpa.get_initial_precision(cpa.cfa().entry());
    let initial = cpa.get_initial_state(fixture.entry);
    let left = cpa
        .get_abstract_successors_for_edge(&initial, &precision, fixture.then_edge)
        .unwrap()
        .remove(0);
    assert!(!left.is_abstraction_state());
    let join = cpa
        .get_abstract_successors_for_edge(&left, &precision, fixture.left_edge)
        .unwrap()
        .remove(0);
    assert!(join.is_abstraction_state());
    assert_eq!(cpa.statistics().max_block_size, 2);
}

#[test]
fn top_and_bottom_have_no_successors() {
    let fixture = loop_with_error(0);
    let mut cpa = PredicateCpa::with_bounded_solver(fixture.cfa.clone(), options(""));
    let precision = cpa.get_initial_precision(cpa.cfa().entry());
    assert!(matches!(
        cpa.get_abstract_successors_for_edge(&PredicateState::Top, &precision, fixture.init_edge),
        Err(CpaError::UnexpectedState(..))
    ));
    assert!(matches!(
        cpa.get_abstract_successors(&PredicateState::Top, &precision),
        Err(CpaError::UnexpectedState(..))
    ));
    assert_eq!(
        cpa.get_abstract_successors_for_edge(&PredicateState::Bottom, &precision, fixture.init_edge)
            .unwrap(),
        Vec::new()
    );
    assert!(cpa
        .get_abstract_successors(&PredicateState::Bottom, &precision)
        .unwrap()
        .is_empty());
}

#[test]
fn opaque_edges_fail_the_analysis() {
    let mut builder = CfaBuilder::new();
    let entry = builder.add_function_entry("main");
    let exit = builder.add_node("main");
    let opaque = builder.add_edge(
        entry,
        exit,
        EdgeKind::Opaque {
            description: String::from("asm!(\"nop\")"),
        },
    );
    let mut cpa = PredicateCpa::with_bounded_solver(builder.build(entry), options(""));
    let precision = cpa.get_initial_precision(cpa.cfa().entry());
    let initial = cpa.get_initial_state(entry);
    assert!(matches!(
        cpa.get_abstract_successors_for_edge(&initial, &precision, opaque),
        Err(CpaError::UnrecognizedEdge { .. })
    ));
}

#[test]
fn state_formulas_conjoin_the_owner() {
    let fixture = diamond();
    let mut cpa = PredicateCpa::with_bounded_solver(fixture.cfa.clone(), options(""));
    let precision = cpa.get_initial_precision(cpa.cfa().entry());
    let initial = cpa.get_initial_state(fixture.entry);
    let left = cpa
        .get_abstract_successors_for_edge(&initial, &precision, fixture.then_edge)
        .unwrap()
        .remove(0);
    assert_eq!(
        &cpa.state_formula(&left),
        non_abstraction(&left).path_formula.formula()
    );
    assert_eq!(cpa.state_formula(&initial), Expression::make_true());
    assert_eq!(cpa.state_formula(&PredicateState::Bottom), Expression::make_false());
}
