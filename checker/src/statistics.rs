// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

use serde::Serialize;
use std::time::Duration;

/// Counters collected while exploring and refining. They are only reported, never consulted.
#[derive(Serialize, Clone, Debug, Default, Eq, PartialEq)]
pub struct PredicateStatistics {
    pub abstractions: usize,
    /// Abstractions that came out false and pruned their branch.
    pub infeasible_abstractions: usize,
    pub sat_checks: usize,
    /// Satisfiability checks that pruned their branch.
    pub unsat_sat_checks: usize,
    pub max_block_size: usize,
    pub max_predicates_per_abstraction: usize,
    pub abstraction_time: Duration,
    pub non_abstraction_time: Duration,
    pub path_formula_cache_hits: usize,
    pub merges: usize,
    pub merge_cache_hits: usize,
    pub refinements: usize,
    pub spurious_counterexamples: usize,
    pub real_counterexamples: usize,
    pub refinement_time: Duration,
}

impl PredicateStatistics {
    pub fn record_abstraction(&mut self, block_size: usize, predicates: usize, time: Duration) {
        self.abstractions += 1;
        self.max_block_size = self.max_block_size.max(block_size);
        self.max_predicates_per_abstraction = self.max_predicates_per_abstraction.max(predicates);
        self.abstraction_time += time;
    }
}
