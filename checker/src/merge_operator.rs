// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

use crate::abstract_state::{NonAbstractionState, PredicateState};
use crate::cache::AnalysisCache;
use crate::formula_manager::FormulaManager;
use crate::options::{MergeType, Options};

use log_derive::logfn_inputs;
use std::rc::Rc;

/// Joins non-abstraction states of the same block that reach the same location.
/// Abstraction states are never merged.
#[derive(Clone, Debug)]
pub struct PredicateMergeOperator {
    merge_type: MergeType,
}

impl PredicateMergeOperator {
    pub fn new(options: &Options) -> PredicateMergeOperator {
        PredicateMergeOperator {
            merge_type: options.merge_type,
        }
    }

    /// Returns the merge of `s1` into `s2`, or `s2` itself if the two states may not be merged.
    /// Merging the same pair twice yields the same state object.
    #[logfn_inputs(TRACE)]
    pub fn merge<M: FormulaManager>(
        &self,
        manager: &M,
        cache: &mut AnalysisCache,
        s1: &PredicateState,
        s2: &PredicateState,
    ) -> PredicateState {
        if self.merge_type == MergeType::Sep {
            return s2.clone();
        }
        let (a, b) = match (s1, s2) {
            (PredicateState::NonAbstraction(a), PredicateState::NonAbstraction(b))
                if a.owner == b.owner && a.location == b.location =>
            {
                (a, b)
            }
            _ => return s2.clone(),
        };
        if a == b {
            return s2.clone();
        }
        if let Some(merged) = cache.cached_merge(a.owner, a, b) {
            return PredicateState::NonAbstraction(merged);
        }
        let merged = Rc::new(NonAbstractionState {
            owner: a.owner,
            location: a.location,
            path_formula: manager.make_or_path_formulas(&a.path_formula, &b.path_formula),
            size_since_abstraction: a.size_since_abstraction.max(b.size_since_abstraction),
            merges_into: Some(a.clone()),
            absorbed: Some(b.clone()),
        });
        debug!("merged into {:?}", merged);
        cache.statistics.merges += 1;
        cache.cache_merge(a.owner, a.clone(), b.clone(), merged.clone());
        PredicateState::NonAbstraction(merged)
    }
}
