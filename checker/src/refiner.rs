// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

use crate::abstract_state::{AbstractionId, PredicateState};
use crate::arg::{Arg, ArgNodeId, ArgPath};
use crate::cache::AnalysisCache;
use crate::cfa::{Cfa, EdgeId, EdgeKind, Location};
use crate::error::{CpaError, CpaResult};
use crate::expression::{Expression, ExpressionType};
use crate::formula_manager::FormulaManager;
use crate::path_formula::PathFormula;
use crate::precision::PredicatePrecision;

use log_derive::logfn_inputs;
use mirai_annotations::*;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::rc::Rc;
use std::time::Instant;

/// The outcome of analyzing an error path.
#[derive(Clone, Debug)]
pub enum RefinementResult {
    /// The path is infeasible. Everything below `root` must be removed from the explored-state
    /// graph and explored again with `precision`.
    Spurious {
        precision: PredicatePrecision,
        root: ArgNodeId,
    },
    /// The path is feasible and the program is unsafe.
    Real { target_path: TargetPath },
}

/// A feasible path from the root of the explored-state graph to a target state.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct TargetPath {
    pub nodes: Vec<ArgNodeId>,
    pub edges: Vec<EdgeId>,
    /// True if some branch could not be resolved from the solver model. The path then ends in
    /// the target state but need not be the one the model describes.
    pub is_imprecise: bool,
}

/// Decides whether error paths are feasible and, if they are not, finds the predicates that
/// rule them out.
#[derive(Clone, Debug, Default)]
pub struct PredicateRefiner {
    /// The abstraction locations of the path handled by the previous refinement.
    last_abstraction_path: Option<Vec<Location>>,
}

impl PredicateRefiner {
    pub fn new() -> PredicateRefiner {
        PredicateRefiner::default()
    }

    #[logfn_inputs(DEBUG)]
    pub fn perform_refinement<M: FormulaManager>(
        &mut self,
        cfa: &Cfa,
        manager: &M,
        cache: &mut AnalysisCache,
        arg: &Arg,
        precision: &PredicatePrecision,
        error_path: &ArgPath,
    ) -> CpaResult<RefinementResult> {
        let start = Instant::now();
        let result = self.refine(cfa, manager, cache, arg, precision, error_path);
        let statistics = &mut cache.statistics;
        statistics.refinements += 1;
        statistics.refinement_time += start.elapsed();
        match &result {
            Ok(RefinementResult::Spurious { .. }) => statistics.spurious_counterexamples += 1,
            Ok(RefinementResult::Real { .. }) => statistics.real_counterexamples += 1,
            Err(..) => {}
        }
        result
    }

    fn refine<M: FormulaManager>(
        &mut self,
        cfa: &Cfa,
        manager: &M,
        cache: &AnalysisCache,
        arg: &Arg,
        precision: &PredicatePrecision,
        error_path: &ArgPath,
    ) -> CpaResult<RefinementResult> {
        let abstraction_nodes = Self::abstraction_nodes(cache, arg, error_path)?;
        let blocks = Self::blocks(cache, arg, error_path, &abstraction_nodes)?;
        let info = manager.build_counterexample_trace(&blocks)?;

        if !info.is_spurious {
            info!("error path is feasible");
            let target_path = Self::target_path(cfa, arg, error_path, info.extract_model())?;
            return Ok(RefinementResult::Real { target_path });
        }

        let locations: Vec<Location> = abstraction_nodes
            .iter()
            .map(|(_, id)| cache.arena.get(*id).location)
            .collect();
        let mut new_predicates = Vec::new();
        let mut root = None;
        for (block, ((node, _), location)) in abstraction_nodes.iter().zip(&locations).enumerate() {
            for predicate in info.predicates_for(block) {
                if root.is_none() && !precision.has_predicate_at(*location, predicate) {
                    root = Some(*node);
                }
                new_predicates.push((*location, predicate.clone()));
            }
        }
        let (refined, changed) = precision.refine(new_predicates);
        verify!(changed == root.is_some());

        let root = match root {
            Some(root) => root,
            None if self.last_abstraction_path.as_ref() != Some(&locations) => {
                info!("no new predicates, but the abstraction path changed");
                abstraction_nodes
                    .get(1)
                    .or_else(|| abstraction_nodes.first())
                    .map(|(node, _)| *node)
                    .ok_or_else(|| {
                        CpaError::InvalidErrorPath(String::from("no abstraction states"))
                    })?
            }
            None => {
                return Err(CpaError::RefinementFailed {
                    path: format!("{:?}", locations),
                });
            }
        };
        info!(
            "error path is spurious, refining below {:?} with {} predicates",
            root,
            refined.predicate_count()
        );
        self.last_abstraction_path = Some(locations);
        Ok(RefinementResult::Spurious {
            precision: refined,
            root,
        })
    }

    /// The abstraction states on the path, each with its node. The first one must be initial
    /// and every other one must continue the trace of its predecessor.
    fn abstraction_nodes(
        cache: &AnalysisCache,
        arg: &Arg,
        error_path: &ArgPath,
    ) -> CpaResult<Vec<(ArgNodeId, AbstractionId)>> {
        let mut result: Vec<(ArgNodeId, AbstractionId)> = Vec::new();
        for node in error_path.nodes() {
            let arg_node = arg.node(node).ok_or_else(|| {
                CpaError::InvalidErrorPath(format!("{:?} is not in the graph", node))
            })?;
            if let PredicateState::Abstraction(id) = arg_node.state {
                let previous = cache.arena.get(id).previous;
                if previous != result.last().map(|(_, p)| *p) {
                    return Err(CpaError::InvalidErrorPath(format!(
                        "{:?} does not follow {:?}",
                        id, previous
                    )));
                }
                result.push((node, id));
            }
        }
        if result.is_empty() {
            return Err(CpaError::InvalidErrorPath(String::from(
                "the path has no abstraction states",
            )));
        }
        Ok(result)
    }

    /// The path formula of every block on the path, in order, including the unfinished block
    /// that ends in the last state.
    fn blocks(
        cache: &AnalysisCache,
        arg: &Arg,
        error_path: &ArgPath,
        abstraction_nodes: &[(ArgNodeId, AbstractionId)],
    ) -> CpaResult<Vec<PathFormula>> {
        let mut blocks: Vec<PathFormula> = abstraction_nodes
            .iter()
            .map(|(_, id)| cache.arena.get(*id).formula_before_abstraction.clone())
            .collect();
        let last = error_path
            .last()
            .and_then(|n| arg.node(n))
            .ok_or_else(|| CpaError::InvalidErrorPath(String::from("empty path")))?;
        if let PredicateState::NonAbstraction(state) = &last.state {
            let owner = abstraction_nodes.last().map(|(_, id)| *id);
            if owner != Some(state.owner) {
                return Err(CpaError::InvalidErrorPath(format!(
                    "the last state belongs to {:?}",
                    state.owner
                )));
            }
            blocks.push(state.path_formula.clone());
        }
        Ok(blocks)
    }

    /// Walks from the root of `arg` to the target of `error_path`, resolving each two way branch
    /// with the value of its program counter variable in `model`.
    fn target_path(
        cfa: &Cfa,
        arg: &Arg,
        error_path: &ArgPath,
        model: &BTreeMap<Rc<Expression>, bool>,
    ) -> CpaResult<TargetPath> {
        let (root, target) = match (arg.root(), error_path.last()) {
            (Some(root), Some(target)) => (root, target),
            _ => return Err(CpaError::InvalidErrorPath(String::from("empty path"))),
        };
        let on_error_path: HashSet<ArgNodeId> = error_path.nodes().collect();
        let mut visits: HashMap<Location, u32> = HashMap::new();
        let mut result = TargetPath {
            nodes: vec![root],
            edges: Vec::new(),
            is_imprecise: false,
        };
        let mut current = root;
        for _ in 0..arg.node_count() {
            if current == target {
                return Ok(result);
            }
            let children = arg.children(current);
            let location = arg.node(current).map(|n| n.location);
            let choice = match (children.len(), location) {
                (1, _) => Some(children[0]),
                (2, Some(location)) => {
                    let visit = visits.get(&location).copied().unwrap_or(0) + 1;
                    let pc = Expression::indexed_variable(
                        &Expression::program_counter_name(location.index()),
                        ExpressionType::Bool,
                        visit,
                    );
                    model.get(&pc).and_then(|value| {
                        children.iter().copied().find(|(_, edge)| {
                            matches!(cfa.edge(*edge).kind,
                                EdgeKind::Assume { truth_assumption, .. } if truth_assumption == *value)
                        })
                    })
                }
                _ => None,
            };
            let (next, edge) = match choice {
                Some(choice) => choice,
                None if children.is_empty() => {
                    warn!("{:?} has no children, using the error path", current);
                    return Ok(Self::imprecise_path(error_path));
                }
                None => {
                    warn!(
                        "cannot resolve the branch at {:?} from the model, guessing",
                        current
                    );
                    result.is_imprecise = true;
                    children
                        .iter()
                        .copied()
                        .find(|(child, _)| on_error_path.contains(child))
                        .unwrap_or(children[0])
                }
            };
            if let (Some(location), EdgeKind::Assume { .. }) = (location, &cfa.edge(edge).kind) {
                *visits.entry(location).or_insert(0) += 1;
            }
            result.nodes.push(next);
            result.edges.push(edge);
            current = next;
        }
        if current == target {
            return Ok(result);
        }
        warn!("walk from the root did not reach {:?}, using the error path", target);
        Ok(Self::imprecise_path(error_path))
    }

    fn imprecise_path(error_path: &ArgPath) -> TargetPath {
        TargetPath {
            nodes: error_path.nodes().collect(),
            edges: error_path.elements.iter().filter_map(|(_, e)| *e).collect(),
            is_imprecise: true,
        }
    }
}
