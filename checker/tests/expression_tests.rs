// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

mod common;

use common::{num, x, y};
use predicate_cpa::expression::{Expression, ExpressionTrait, ExpressionType};
use predicate_cpa::path_formula::{PathFormula, SsaMap};
use std::rc::Rc;

fn indexed(name: &str, index: u32) -> Rc<Expression> {
    Expression::indexed_variable(&Rc::from(name), ExpressionType::Integer, index)
}

#[test]
fn constants_simplify_away() {
    let atom = x().less_than(num(3));
    assert_eq!(atom.and(Expression::make_true()), atom);
    assert_eq!(Expression::make_true().and(atom.clone()), atom);
    assert_eq!(atom.and(Expression::make_false()), Expression::make_false());
    assert_eq!(atom.or(Expression::make_true()), Expression::make_true());
    assert_eq!(Expression::make_false().or(atom.clone()), atom);
    assert_eq!(atom.logical_not().logical_not(), atom);
    assert_eq!(atom.and(atom.clone()), atom);
    assert_eq!(Expression::conjunction(Vec::new()), Expression::make_true());
    assert_eq!(Expression::disjunction(Vec::new()), Expression::make_false());
}

#[test]
fn display_shows_ssa_indices() {
    let formula = indexed("x", 2).equals(indexed("y", 0).addition(num(1)));
    assert_eq!(formula.to_string(), "(x@2 == (y@0 + 1))");
    assert_eq!(x().greater_or_equal(num(0)).to_string(), "(x >= 0)");
}

#[test]
fn instantiate_uses_latest_index() {
    let (ssa, _) = SsaMap::default().with_fresh_index(&Rc::from("x"), ExpressionType::Integer);
    let (ssa, index) = ssa.with_fresh_index(&Rc::from("x"), ExpressionType::Integer);
    assert_eq!(index, 2);
    let formula = x().less_than(y());
    let instantiated = formula.instantiate(&ssa);
    assert_eq!(instantiated, indexed("x", 2).less_than(indexed("y", 0)));
    assert_eq!(instantiated.uninstantiate(), formula);
}

#[test]
fn atoms_are_normalized_to_one_polarity() {
    assert_eq!(
        x().equals(num(1)).logical_not().normalized_atom(),
        x().equals(num(1))
    );
    assert_eq!(x().not_equals(num(1)).normalized_atom(), x().equals(num(1)));
    assert_eq!(x().greater_than(num(0)).normalized_atom(), num(0).less_than(x()));
    assert_eq!(
        x().greater_or_equal(num(0)).normalized_atom(),
        num(0).less_or_equal(x())
    );
}

#[test]
fn atoms_and_variables_are_collected_once() {
    let a = x().equals(num(1));
    let b = y().less_than(x());
    let formula = a.and(b.clone()).or(a.clone().logical_not());
    assert_eq!(formula.atoms(), vec![a, b]);
    let variables: Vec<Rc<Expression>> = formula.variables().into_iter().collect();
    assert_eq!(variables, vec![x(), y()]);
}

#[test]
fn conjuncts_flatten_nested_conjunctions() {
    let a = x().equals(num(1));
    let b = y().equals(num(2));
    let c = x().less_than(y());
    let formula = a.and(b.clone()).and(c.clone());
    assert_eq!(formula.conjuncts(), vec![a, b, c]);
}

#[test]
fn program_counter_variables_are_recognized() {
    let name = Expression::program_counter_name(7);
    assert_eq!(name.as_ref(), "__pc_7");
    let pc = Expression::indexed_variable(&name, ExpressionType::Bool, 1);
    assert!(pc.is_program_counter());
    assert!(pc.is_atom());
    assert!(!x().is_program_counter());
}

#[test]
fn disjunction_of_path_formulas_unifies_indices() {
    let name: Rc<str> = Rc::from("x");
    let (ssa1, _) = SsaMap::default().with_fresh_index(&name, ExpressionType::Integer);
    let (ssa2, _) = ssa1.with_fresh_index(&name, ExpressionType::Integer);
    let left = PathFormula::new(indexed("x", 1).equals(num(1)), ssa1);
    let right = PathFormula::new(indexed("x", 2).equals(num(2)), ssa2.clone());

    let merged = left.or(&right);
    assert_eq!(merged.ssa(), &ssa2);
    let expected = indexed("x", 1)
        .equals(num(1))
        .and(indexed("x", 2).equals(indexed("x", 1)))
        .or(indexed("x", 2).equals(num(2)));
    assert_eq!(merged.formula(), &expected);
}

#[test]
fn disjunction_covers_variables_missing_on_one_side() {
    let name: Rc<str> = Rc::from("y");
    let (ssa, _) = SsaMap::default().with_fresh_index(&name, ExpressionType::Integer);
    let written = PathFormula::new(indexed("y", 1).equals(num(5)), ssa.clone());
    let untouched = PathFormula::empty(SsaMap::default());

    let merged = untouched.or(&written);
    assert_eq!(merged.ssa(), &ssa);
    assert_eq!(
        merged.formula(),
        &indexed("y", 1)
            .equals(indexed("y", 0))
            .or(indexed("y", 1).equals(num(5)))
    );
}

#[test]
fn equal_path_formulas_hash_alike() {
    use std::collections::HashSet;
    let ssa = SsaMap::default();
    let a = PathFormula::new(x().instantiate(&ssa).equals(num(1)), ssa.clone());
    let b = PathFormula::new(indexed("x", 0).equals(num(1)), ssa);
    assert_eq!(a, b);
    let set: HashSet<PathFormula> = vec![a, b].into_iter().collect();
    assert_eq!(set.len(), 1);
}
