// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

use crate::abstract_state::PredicateState;
use crate::cache::AnalysisCache;
use crate::expression::ExpressionTrait;
use crate::formula_manager::FormulaManager;
use crate::options::Options;

use log_derive::{logfn, logfn_inputs};
use std::rc::Rc;

/// The lattice of predicate states. Path sensitive merging is done by the merge operator, so
/// join only has to satisfy the interface of a fixed point driver.
#[derive(Clone, Debug)]
pub struct PredicateAbstractDomain {
    symbolic_coverage_check: bool,
}

impl PredicateAbstractDomain {
    pub fn new(options: &Options) -> PredicateAbstractDomain {
        PredicateAbstractDomain {
            symbolic_coverage_check: options.symbolic_coverage_check,
        }
    }

    /// Bottom is the identity. Any other pair of states joins to Top.
    pub fn join(&self, a: &PredicateState, b: &PredicateState) -> PredicateState {
        match (a, b) {
            (PredicateState::Bottom, other) | (other, PredicateState::Bottom) => other.clone(),
            _ => PredicateState::Top,
        }
    }

    /// True if every concrete state represented by `a` is also represented by `b`, as far as
    /// can be established cheaply.
    #[logfn_inputs(TRACE)]
    #[logfn(TRACE)]
    pub fn partial_order<M: FormulaManager>(
        &self,
        manager: &M,
        cache: &AnalysisCache,
        a: &PredicateState,
        b: &PredicateState,
    ) -> bool {
        match (a, b) {
            (PredicateState::Bottom, _) | (_, PredicateState::Top) => true,
            (_, PredicateState::Bottom) | (PredicateState::Top, _) => false,
            (PredicateState::Abstraction(a), PredicateState::Abstraction(b)) => {
                a == b
                    || manager.implies(
                        &cache.arena.get(*a).abstraction,
                        &cache.arena.get(*b).abstraction,
                    )
            }
            (PredicateState::NonAbstraction(a), PredicateState::Abstraction(b)) => {
                if !self.symbolic_coverage_check {
                    return false;
                }
                let owner = cache.arena.get(a.owner);
                let covering = cache.arena.get(*b);
                let antecedent = owner
                    .abstraction
                    .instantiate(owner.ssa())
                    .and(a.path_formula.formula().clone());
                let consequent = covering.abstraction.instantiate(a.path_formula.ssa());
                manager.implies(&antecedent, &consequent)
            }
            (PredicateState::Abstraction(_), PredicateState::NonAbstraction(_)) => false,
            (PredicateState::NonAbstraction(a), PredicateState::NonAbstraction(b)) => {
                Rc::ptr_eq(a, b) || a == b || b.absorbs(a)
            }
        }
    }
}
