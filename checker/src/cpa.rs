// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

use crate::abstract_domain::PredicateAbstractDomain;
use crate::abstract_state::{AbstractionId, AbstractionState, PredicateState};
use crate::arg::{Arg, ArgPath};
use crate::bounded_solver::BoundedSolver;
use crate::cache::AnalysisCache;
use crate::cfa::{Cfa, EdgeId, Location};
use crate::error::CpaResult;
use crate::expression::{Expression, ExpressionTrait};
use crate::formula_manager::{FormulaManager, SolverFormulaManager};
use crate::merge_operator::PredicateMergeOperator;
use crate::options::Options;
use crate::path_formula::{PathFormula, SsaMap};
use crate::precision::{AbstractionPolicy, PredicatePrecision};
use crate::refiner::{PredicateRefiner, RefinementResult};
use crate::statistics::PredicateStatistics;
use crate::transfer_relation::{self, PredicateTransferRelation};

use std::fmt::{Debug, Formatter, Result};
use std::rc::Rc;

/// The formula manager used when no native solver is available.
pub type BoundedFormulaManager = SolverFormulaManager<Rc<Expression>, BoundedSolver>;

/// Predicate abstraction with counterexample guided refinement, packaged as the operations a
/// worklist driver needs.
pub struct PredicateCpa<M: FormulaManager> {
    cfa: Cfa,
    options: Options,
    manager: M,
    domain: PredicateAbstractDomain,
    transfer_relation: PredicateTransferRelation,
    merge_operator: PredicateMergeOperator,
    refiner: PredicateRefiner,
    cache: AnalysisCache,
    initial_precision: PredicatePrecision,
}

impl<M: FormulaManager> Debug for PredicateCpa<M> {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        f.debug_struct("PredicateCpa")
            .field("cfa", &self.cfa)
            .field("manager", &self.manager)
            .field("cache", &self.cache)
            .finish()
    }
}

impl PredicateCpa<BoundedFormulaManager> {
    /// An analysis backed by the bounded solver, configured by `options`.
    pub fn with_bounded_solver(cfa: Cfa, options: Options) -> Self {
        let manager = SolverFormulaManager::new(
            BoundedSolver::new(options.solver_range),
            options.abstraction_type,
        );
        PredicateCpa::new(cfa, options, manager)
    }
}

impl<M: FormulaManager> PredicateCpa<M> {
    pub fn new(cfa: Cfa, options: Options, manager: M) -> PredicateCpa<M> {
        let initial_precision = PredicatePrecision::new(AbstractionPolicy::from_options(&options));
        PredicateCpa {
            domain: PredicateAbstractDomain::new(&options),
            transfer_relation: PredicateTransferRelation::new(&options),
            merge_operator: PredicateMergeOperator::new(&options),
            refiner: PredicateRefiner::new(),
            cache: AnalysisCache::new(),
            cfa,
            options,
            manager,
            initial_precision,
        }
    }

    pub fn cfa(&self) -> &Cfa {
        &self.cfa
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn manager(&self) -> &M {
        &self.manager
    }

    /// The abstraction state with abstraction true at `location`. Repeated calls for the same
    /// location return the same state.
    pub fn get_initial_state(&mut self, location: Location) -> PredicateState {
        if let Some(state) = self.cache.initial_state(location) {
            return state.clone();
        }
        let id = self.cache.arena.allocate(
            location,
            self.manager.make_true(),
            PathFormula::empty(SsaMap::default()),
            None,
        );
        let state = PredicateState::Abstraction(id);
        self.cache.set_initial_state(location, state.clone());
        state
    }

    /// The precision that exploration starts from. It is the same for every location.
    pub fn get_initial_precision(&self, _location: Location) -> PredicatePrecision {
        self.initial_precision.clone()
    }

    /// Replaces the precision that exploration starts from.
    pub fn set_initial_precision(&mut self, precision: PredicatePrecision) {
        self.initial_precision = precision;
    }

    pub fn get_abstract_successors(
        &mut self,
        state: &PredicateState,
        precision: &PredicatePrecision,
    ) -> CpaResult<Vec<(EdgeId, PredicateState)>> {
        self.transfer_relation.get_abstract_successors(
            &self.cfa,
            &self.manager,
            &mut self.cache,
            state,
            precision,
        )
    }

    pub fn get_abstract_successors_for_edge(
        &mut self,
        state: &PredicateState,
        precision: &PredicatePrecision,
        edge: EdgeId,
    ) -> CpaResult<Vec<PredicateState>> {
        self.transfer_relation.get_abstract_successors_for_edge(
            &self.cfa,
            &self.manager,
            &mut self.cache,
            state,
            precision,
            edge,
        )
    }

    pub fn merge(&mut self, s1: &PredicateState, s2: &PredicateState) -> PredicateState {
        self.merge_operator
            .merge(&self.manager, &mut self.cache, s1, s2)
    }

    pub fn join(&self, a: &PredicateState, b: &PredicateState) -> PredicateState {
        self.domain.join(a, b)
    }

    pub fn partial_order(&self, a: &PredicateState, b: &PredicateState) -> bool {
        self.domain.partial_order(&self.manager, &self.cache, a, b)
    }

    /// Analyzes the path from the root of `arg` to an error state. A spurious path also
    /// widens the initial precision, so that explorations started later use the new predicates.
    pub fn perform_refinement(
        &mut self,
        arg: &Arg,
        error_path: &ArgPath,
    ) -> CpaResult<RefinementResult> {
        let result = self.refiner.perform_refinement(
            &self.cfa,
            &self.manager,
            &mut self.cache,
            arg,
            &self.initial_precision,
            error_path,
        )?;
        if let RefinementResult::Spurious { precision, .. } = &result {
            self.initial_precision = self.initial_precision.join(precision);
        }
        Ok(result)
    }

    pub fn location_of(&self, state: &PredicateState) -> Option<Location> {
        transfer_relation::location_of(&self.cache, state)
    }

    /// True if `state` is at an error location.
    pub fn is_target(&self, state: &PredicateState) -> bool {
        self.location_of(state)
            .map_or(false, |location| self.cfa.node(location).is_error)
    }

    pub fn abstraction(&self, id: AbstractionId) -> &AbstractionState {
        self.cache.arena.get(id)
    }

    /// The abstraction formula of an abstraction state, or of the state that owns a
    /// non-abstraction state.
    pub fn abstraction_formula(&self, state: &PredicateState) -> Option<Rc<Expression>> {
        state
            .owner()
            .map(|id| self.cache.arena.get(id).abstraction.clone())
    }

    /// The formula describing the concrete states of `state`, over SSA indexed variables.
    pub fn state_formula(&self, state: &PredicateState) -> Rc<Expression> {
        match state {
            PredicateState::Top => Expression::make_true(),
            PredicateState::Bottom => Expression::make_false(),
            PredicateState::Abstraction(id) => {
                let abstraction = self.cache.arena.get(*id);
                abstraction.abstraction.instantiate(abstraction.ssa())
            }
            PredicateState::NonAbstraction(s) => {
                let owner = self.cache.arena.get(s.owner);
                owner
                    .abstraction
                    .instantiate(owner.ssa())
                    .and(s.path_formula.formula().clone())
            }
        }
    }

    pub fn statistics(&self) -> &PredicateStatistics {
        &self.cache.statistics
    }

    pub fn statistics_as_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.cache.statistics)
    }
}
