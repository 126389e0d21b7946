// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.
//
// Predicate abstraction over control-flow automata, refined from spurious counterexamples.
// An external worklist driver owns the exploration. This crate supplies the abstract states,
// the lattice, the transfer relation, the merge operator and the refiner, plus the formula
// algebra they are built on.

#[macro_use]
extern crate log;

pub mod abstract_domain;
pub mod abstract_state;
pub mod arg;
pub mod bounded_solver;
pub mod cache;
pub mod cfa;
pub mod cpa;
pub mod error;
pub mod expression;
pub mod formula_manager;
pub mod k_limits;
pub mod merge_operator;
pub mod options;
pub mod path_formula;
pub mod precision;
pub mod refiner;
pub mod smt_solver;
pub mod statistics;
pub mod transfer_relation;
#[cfg(feature = "z3")]
pub mod z3_solver;
