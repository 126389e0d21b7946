// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

use crate::cfa::{CfaNode, Location};
use crate::error::{CpaError, CpaResult};
use crate::expression::{Expression, ExpressionTrait, ExpressionType};
use crate::options::{Options, ThresholdCombination};

use itertools::Itertools;
use log_derive::logfn_inputs;
use rpds::{HashTrieMap, HashTrieSet};
use serde::Serialize;
use std::fmt::{Debug, Formatter, Result};
use std::rc::Rc;

/// A boolean atom over variables without SSA indices, used as a basis element for abstraction.
#[derive(Serialize, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct Predicate(Rc<Expression>);

impl Debug for Predicate {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        self.0.fmt(f)
    }
}

impl Predicate {
    /// Fails unless `expression` is boolean, mentions at least one variable and has no SSA indices.
    pub fn try_new(expression: Rc<Expression>) -> CpaResult<Predicate> {
        let variables = expression.variables();
        let unindexed = variables
            .iter()
            .all(|v| matches!(v.as_ref(), Expression::Variable { index: None, .. }));
        if expression.infer_type() != ExpressionType::Bool || variables.is_empty() || !unindexed {
            return Err(CpaError::InvalidPredicate(expression.to_string()));
        }
        Ok(Predicate(expression))
    }

    pub fn expression(&self) -> &Rc<Expression> {
        &self.0
    }
}

/// Which locations are abstraction locations, independently of the predicates in use.
#[derive(Clone, Debug)]
pub struct AbstractionPolicy {
    pub at_loop_heads: bool,
    pub at_function_entries: bool,
    pub at_function_returns: bool,
    pub at_call_sites: bool,
    /// Error locations are abstraction locations regardless of the other triggers.
    pub at_targets: bool,
    /// 0 means that the block size never triggers abstraction.
    pub block_size: usize,
    pub threshold_combination: ThresholdCombination,
}

impl Default for AbstractionPolicy {
    fn default() -> Self {
        AbstractionPolicy::from_options(&Options::default())
    }
}

impl AbstractionPolicy {
    pub fn from_options(options: &Options) -> AbstractionPolicy {
        AbstractionPolicy {
            at_loop_heads: options.abstract_at_loop_heads,
            at_function_entries: options.abstract_at_function_entries,
            at_function_returns: options.abstract_at_function_returns,
            at_call_sites: options.abstract_at_call_sites,
            at_targets: options.abstract_at_targets,
            block_size: options.block_size,
            threshold_combination: options.threshold_combination,
        }
    }

    /// True if a block that already has `size_since_abstraction` edges is complete once one more
    /// edge is added.
    pub fn threshold_reached(&self, size_since_abstraction: usize) -> bool {
        self.block_size > 0 && size_since_abstraction + 1 >= self.block_size
    }

    fn is_structural_abstraction_location(&self, node: &CfaNode, is_call_site: bool) -> bool {
        (self.at_loop_heads && node.is_loop_head)
            || (self.at_function_entries && node.is_function_entry)
            || (self.at_function_returns && node.has_entering_summary_edge)
            || (self.at_call_sites && is_call_site)
    }
}

/// An immutable map from locations to the predicates used for abstraction there. Locations that
/// are not mapped use the global predicates.
#[derive(Clone)]
pub struct PredicatePrecision {
    location_predicates: HashTrieMap<Location, HashTrieSet<Predicate>>,
    global_predicates: HashTrieSet<Predicate>,
    policy: Rc<AbstractionPolicy>,
}

impl Debug for PredicatePrecision {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        let mut map = f.debug_map();
        for (location, predicates) in self.location_predicates.iter().sorted_by_key(|(l, _)| **l) {
            map.entry(location, &predicates.iter().sorted().collect::<Vec<_>>());
        }
        map.entry(
            &"global",
            &self.global_predicates.iter().sorted().collect::<Vec<_>>(),
        );
        map.finish()
    }
}

impl PredicatePrecision {
    pub fn new(policy: AbstractionPolicy) -> PredicatePrecision {
        PredicatePrecision {
            location_predicates: HashTrieMap::new(),
            global_predicates: HashTrieSet::new(),
            policy: Rc::new(policy),
        }
    }

    /// A precision that uses `predicates` everywhere.
    pub fn with_global_predicates<I: IntoIterator<Item = Predicate>>(
        policy: AbstractionPolicy,
        predicates: I,
    ) -> PredicatePrecision {
        let mut result = PredicatePrecision::new(policy);
        for predicate in predicates {
            result.global_predicates.insert_mut(predicate);
        }
        result
    }

    pub fn policy(&self) -> &AbstractionPolicy {
        &self.policy
    }

    /// The predicates that apply at `location`, in a deterministic order.
    pub fn predicates_at(&self, location: Location) -> Vec<Predicate> {
        self.predicate_set_at(location).iter().cloned().sorted().collect()
    }

    fn predicate_set_at(&self, location: Location) -> &HashTrieSet<Predicate> {
        self.location_predicates
            .get(&location)
            .unwrap_or(&self.global_predicates)
    }

    pub fn has_predicate_at(&self, location: Location, predicate: &Predicate) -> bool {
        self.predicate_set_at(location).contains(predicate)
    }

    /// Decides if the state reaching `node` must be abstracted.
    pub fn is_abstraction_location(
        &self,
        node: &CfaNode,
        is_call_site: bool,
        threshold_reached: bool,
    ) -> bool {
        if self.policy.at_targets && node.is_error {
            return true;
        }
        let structural = self.policy.is_structural_abstraction_location(node, is_call_site);
        match self.policy.threshold_combination {
            ThresholdCombination::Or => structural || threshold_reached,
            ThresholdCombination::And if self.policy.block_size == 0 => structural,
            ThresholdCombination::And => structural && threshold_reached,
        }
    }

    /// Returns a precision that also has the given predicates at the given locations, and
    /// whether any of them was not already in use there. A location that gets its first own
    /// predicates keeps the global ones as well.
    #[logfn_inputs(TRACE)]
    pub fn refine<I>(&self, new_predicates: I) -> (PredicatePrecision, bool)
    where
        I: IntoIterator<Item = (Location, Predicate)> + Debug,
    {
        let mut location_predicates = self.location_predicates.clone();
        let mut changed = false;
        for (location, predicate) in new_predicates {
            let predicates = location_predicates
                .get(&location)
                .unwrap_or(&self.global_predicates);
            if predicates.contains(&predicate) {
                continue;
            }
            debug!("new predicate {:?} at {:?}", predicate, location);
            changed = true;
            let predicates = predicates.insert(predicate);
            location_predicates.insert_mut(location, predicates);
        }
        let result = PredicatePrecision {
            location_predicates,
            global_predicates: self.global_predicates.clone(),
            policy: self.policy.clone(),
        };
        (result, changed)
    }

    /// The union of both precisions, per location and globally.
    #[must_use]
    pub fn join(&self, other: &PredicatePrecision) -> PredicatePrecision {
        let mut location_predicates = self.location_predicates.clone();
        for (location, predicates) in other.location_predicates.iter() {
            let mut union = location_predicates
                .get(location)
                .unwrap_or(&self.global_predicates)
                .clone();
            for predicate in predicates.iter() {
                union.insert_mut(predicate.clone());
            }
            location_predicates.insert_mut(*location, union);
        }
        let mut global_predicates = self.global_predicates.clone();
        for predicate in other.global_predicates.iter() {
            global_predicates.insert_mut(predicate.clone());
        }
        PredicatePrecision {
            location_predicates,
            global_predicates,
            policy: self.policy.clone(),
        }
    }

    /// The number of (location, predicate) pairs plus the number of global predicates.
    pub fn predicate_count(&self) -> usize {
        self.location_predicates
            .values()
            .map(|p| p.size())
            .sum::<usize>()
            + self.global_predicates.size()
    }
}
