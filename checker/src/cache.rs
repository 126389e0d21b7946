// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

use crate::abstract_state::{AbstractionArena, AbstractionId, NonAbstractionState, PredicateState};
use crate::cfa::{EdgeId, Location};
use crate::path_formula::PathFormula;
use crate::statistics::PredicateStatistics;

use std::collections::HashMap;
use std::fmt::{Debug, Formatter, Result};
use std::rc::Rc;

type MergeTable =
    HashMap<Rc<NonAbstractionState>, HashMap<Rc<NonAbstractionState>, Rc<NonAbstractionState>>>;

/// The mutable state shared by the components of one analysis run. Entries are keyed by state
/// content and arena ids and are never evicted.
#[derive(Default)]
pub struct AnalysisCache {
    pub arena: AbstractionArena,
    path_formulas: HashMap<(PathFormula, EdgeId), PathFormula>,
    merges: HashMap<AbstractionId, MergeTable>,
    initial_states: HashMap<Location, PredicateState>,
    pub statistics: PredicateStatistics,
}

impl Debug for AnalysisCache {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        write!(
            f,
            "AnalysisCache({:?}, {} path formulas, {} merge owners)",
            self.arena,
            self.path_formulas.len(),
            self.merges.len()
        )
    }
}

impl AnalysisCache {
    pub fn new() -> AnalysisCache {
        AnalysisCache::default()
    }

    /// The successor of `path_formula` along `edge`, if it has been computed before.
    pub fn cached_path_formula(
        &mut self,
        path_formula: &PathFormula,
        edge: EdgeId,
    ) -> Option<PathFormula> {
        let result = self.path_formulas.get(&(path_formula.clone(), edge)).cloned();
        if result.is_some() {
            trace!("path formula cache hit for {:?}", edge);
            self.statistics.path_formula_cache_hits += 1;
        }
        result
    }

    pub fn cache_path_formula(
        &mut self,
        path_formula: PathFormula,
        edge: EdgeId,
        successor: PathFormula,
    ) {
        self.path_formulas.insert((path_formula, edge), successor);
    }

    pub fn cached_merge(
        &mut self,
        owner: AbstractionId,
        s1: &Rc<NonAbstractionState>,
        s2: &Rc<NonAbstractionState>,
    ) -> Option<Rc<NonAbstractionState>> {
        let result = self.merges.get(&owner)?.get(s1)?.get(s2).cloned();
        if result.is_some() {
            trace!("merge cache hit for owner {:?}", owner);
            self.statistics.merge_cache_hits += 1;
        }
        result
    }

    pub fn cache_merge(
        &mut self,
        owner: AbstractionId,
        s1: Rc<NonAbstractionState>,
        s2: Rc<NonAbstractionState>,
        merged: Rc<NonAbstractionState>,
    ) {
        self.merges
            .entry(owner)
            .or_default()
            .entry(s1)
            .or_default()
            .insert(s2, merged);
    }

    pub fn initial_state(&self, location: Location) -> Option<&PredicateState> {
        self.initial_states.get(&location)
    }

    pub fn set_initial_state(&mut self, location: Location, state: PredicateState) {
        self.initial_states.insert(location, state);
    }
}
