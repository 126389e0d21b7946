// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

use crate::abstract_state::{NonAbstractionState, PredicateState};
use crate::cache::AnalysisCache;
use crate::cfa::{Cfa, EdgeId, Location};
use crate::error::{CpaError, CpaResult};
use crate::formula_manager::FormulaManager;
use crate::options::Options;
use crate::path_formula::PathFormula;
use crate::precision::PredicatePrecision;

use log_derive::logfn_inputs;
use mirai_annotations::*;
use std::rc::Rc;
use std::time::Instant;

/// Computes the successors of predicate states along CFA edges. This is the only place where
/// abstraction states are created.
#[derive(Clone, Debug)]
pub struct PredicateTransferRelation {
    /// Check satisfiability every this many edges of a block. 0 disables the check.
    sat_check: usize,
}

impl PredicateTransferRelation {
    pub fn new(options: &Options) -> PredicateTransferRelation {
        PredicateTransferRelation {
            sat_check: options.sat_check,
        }
    }

    /// The successors of `state` along every edge leaving its location, each paired with the
    /// edge that produced it.
    pub fn get_abstract_successors<M: FormulaManager>(
        &self,
        cfa: &Cfa,
        manager: &M,
        cache: &mut AnalysisCache,
        state: &PredicateState,
        precision: &PredicatePrecision,
    ) -> CpaResult<Vec<(EdgeId, PredicateState)>> {
        let location = match location_of(cache, state) {
            Some(location) => location,
            None if *state == PredicateState::Bottom => return Ok(Vec::new()),
            None => return Err(CpaError::UnexpectedState(format!("{:?}", state))),
        };
        let mut result = Vec::new();
        for edge in cfa.leaving_edges(location) {
            for successor in
                self.get_abstract_successors_for_edge(cfa, manager, cache, state, precision, edge)?
            {
                result.push((edge, successor));
            }
        }
        Ok(result)
    }

    /// The successors of `state` along `edge`. The result is empty if the edge is infeasible
    /// and has at most one element otherwise.
    #[logfn_inputs(TRACE)]
    pub fn get_abstract_successors_for_edge<M: FormulaManager>(
        &self,
        cfa: &Cfa,
        manager: &M,
        cache: &mut AnalysisCache,
        state: &PredicateState,
        precision: &PredicatePrecision,
        edge: EdgeId,
    ) -> CpaResult<Vec<PredicateState>> {
        let (owner, path_formula, size) = match state {
            PredicateState::Top => {
                return Err(CpaError::UnexpectedState(String::from("Top")));
            }
            PredicateState::Bottom => return Ok(Vec::new()),
            PredicateState::Abstraction(id) => {
                (*id, cache.arena.get(*id).fresh_path_formula(), 0)
            }
            PredicateState::NonAbstraction(s) => {
                (s.owner, s.path_formula.clone(), s.size_since_abstraction)
            }
        };
        let source = cfa.edge_source(edge);
        let target = cfa.edge_target(edge);
        precondition!(location_of(cache, state) == Some(source));
        let start = Instant::now();

        let threshold_reached = precision.policy().threshold_reached(size);
        let is_abstraction_location = precision.is_abstraction_location(
            cfa.node(target),
            cfa.is_call_site(target),
            threshold_reached,
        );
        let path_formula =
            self.successor_path_formula(cfa, manager, cache, &path_formula, source, edge)?;
        let size = size + 1;

        if !is_abstraction_location {
            let infeasible = self.sat_check > 0 && size % self.sat_check == 0 && {
                cache.statistics.sat_checks += 1;
                let owner_state = cache.arena.get(owner);
                manager.unsat(&owner_state.abstraction, owner_state.ssa(), &path_formula)
            };
            cache.statistics.non_abstraction_time += start.elapsed();
            if infeasible {
                debug!("block of {:?} is infeasible at {:?}", owner, target);
                cache.statistics.unsat_sat_checks += 1;
                return Ok(Vec::new());
            }
            return Ok(vec![PredicateState::NonAbstraction(Rc::new(
                NonAbstractionState {
                    owner,
                    location: target,
                    path_formula,
                    size_since_abstraction: size,
                    merges_into: None,
                    absorbed: None,
                },
            ))]);
        }

        let predicates = precision.predicates_at(target);
        let owner_state = cache.arena.get(owner);
        let abstraction = manager.compute_abstraction(
            &owner_state.abstraction,
            owner_state.ssa(),
            &path_formula,
            &predicates,
        )?;
        cache
            .statistics
            .record_abstraction(size, predicates.len(), start.elapsed());
        if manager.is_false(&abstraction) {
            debug!("abstraction at {:?} is false", target);
            cache.statistics.infeasible_abstractions += 1;
            return Ok(Vec::new());
        }
        let id = cache
            .arena
            .allocate(target, abstraction, path_formula, Some(owner));
        trace!("new abstraction state {:?}", cache.arena.get(id));
        Ok(vec![PredicateState::Abstraction(id)])
    }

    /// Extends `path_formula` along `edge`, reusing earlier results for the same formula and edge.
    fn successor_path_formula<M: FormulaManager>(
        &self,
        cfa: &Cfa,
        manager: &M,
        cache: &mut AnalysisCache,
        path_formula: &PathFormula,
        source: Location,
        edge: EdgeId,
    ) -> CpaResult<PathFormula> {
        if let Some(successor) = cache.cached_path_formula(path_formula, edge) {
            return Ok(successor);
        }
        let successor = manager.conjoin_edge(path_formula, source, edge, cfa.edge(edge))?;
        cache.cache_path_formula(path_formula.clone(), edge, successor.clone());
        Ok(successor)
    }
}

/// The CFA location of `state`, if it has one.
pub fn location_of(cache: &AnalysisCache, state: &PredicateState) -> Option<Location> {
    match state {
        PredicateState::Abstraction(id) => Some(cache.arena.get(*id).location),
        PredicateState::NonAbstraction(s) => Some(s.location),
        PredicateState::Top | PredicateState::Bottom => None,
    }
}
