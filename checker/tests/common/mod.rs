// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

// Shared fixtures. Not every test file uses every helper.
#![allow(dead_code)]

use predicate_cpa::abstract_state::PredicateState;
use predicate_cpa::arg::{Arg, ArgNodeId};
use predicate_cpa::cfa::{Cfa, CfaBuilder, EdgeId, EdgeKind, Location};
use predicate_cpa::cpa::{BoundedFormulaManager, PredicateCpa};
use predicate_cpa::bounded_solver::BoundedSolver;
use predicate_cpa::error::CpaResult;
use predicate_cpa::expression::{Expression, ExpressionTrait};
use predicate_cpa::formula_manager::{FormulaManager, SolverFormulaManager};
use predicate_cpa::options::{AbstractionType, Options};
use predicate_cpa::refiner::{RefinementResult, TargetPath};

use std::collections::VecDeque;
use std::rc::Rc;

pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::new().filter("PREDICATE_CPA_LOG"))
        .is_test(true)
        .try_init();
}

pub fn x() -> Rc<Expression> {
    Expression::int_variable("x")
}

pub fn y() -> Rc<Expression> {
    Expression::int_variable("y")
}

pub fn num(value: i128) -> Rc<Expression> {
    Expression::numeral(value)
}

pub fn manager() -> BoundedFormulaManager {
    SolverFormulaManager::new(BoundedSolver::default(), AbstractionType::Boolean)
}

pub fn cartesian_manager() -> BoundedFormulaManager {
    SolverFormulaManager::new(BoundedSolver::default(), AbstractionType::Cartesian)
}

pub fn options(args: &str) -> Options {
    let mut options = Options::default();
    let rest = options.parse_from_str(args).expect("valid options");
    assert!(rest.is_empty());
    options
}

/// x := initial; loop { if (x == 1) error; }
pub struct LoopFixture {
    pub cfa: Cfa,
    pub entry: Location,
    pub head: Location,
    pub body: Location,
    pub error: Location,
    pub init_edge: EdgeId,
    pub error_edge: EdgeId,
    pub stay_edge: EdgeId,
    pub back_edge: EdgeId,
}

pub fn loop_with_error(initial: i128) -> LoopFixture {
    let mut builder = CfaBuilder::new();
    let entry = builder.add_function_entry("main");
    let head = builder.add_node("main");
    let body = builder.add_node("main");
    let error = builder.add_error_node("main");
    let init_edge = builder.add_edge(
        entry,
        head,
        EdgeKind::Declaration {
            variable: x(),
            initializer: Some(num(initial)),
        },
    );
    let (error_edge, stay_edge) = builder.add_branch(head, x().equals(num(1)), error, body);
    let back_edge = builder.add_edge(body, head, EdgeKind::Blank);
    LoopFixture {
        cfa: builder.build(entry),
        entry,
        head,
        body,
        error,
        init_edge,
        error_edge,
        stay_edge,
        back_edge,
    }
}

/// x := 0; loop { if (x == 1) error; if (x == 2) error; }
pub struct TwoErrorFixture {
    pub cfa: Cfa,
    pub entry: Location,
    pub head: Location,
    pub middle: Location,
    pub first_error: Location,
    pub second_error: Location,
}

pub fn loop_with_two_errors() -> TwoErrorFixture {
    let mut builder = CfaBuilder::new();
    let entry = builder.add_function_entry("main");
    let head = builder.add_node("main");
    let middle = builder.add_node("main");
    let first_error = builder.add_error_node("main");
    let second_error = builder.add_error_node("main");
    builder.add_edge(
        entry,
        head,
        EdgeKind::Declaration {
            variable: x(),
            initializer: Some(num(0)),
        },
    );
    builder.add_branch(head, x().equals(num(1)), first_error, middle);
    builder.add_branch(middle, x().equals(num(2)), second_error, head);
    TwoErrorFixture {
        cfa: builder.build(entry),
        entry,
        head,
        middle,
        first_error,
        second_error,
    }
}

/// if (x > 0) {} else {}; loop { x := x - 1; }
pub struct DiamondFixture {
    pub cfa: Cfa,
    pub entry: Location,
    pub left: Location,
    pub right: Location,
    pub join: Location,
    pub then_edge: EdgeId,
    pub else_edge: EdgeId,
    pub left_edge: EdgeId,
    pub right_edge: EdgeId,
    pub loop_edge: EdgeId,
}

pub fn diamond() -> DiamondFixture {
    let mut builder = CfaBuilder::new();
    let entry = builder.add_function_entry("main");
    let left = builder.add_node("main");
    let right = builder.add_node("main");
    let join = builder.add_node("main");
    let (then_edge, else_edge) = builder.add_branch(entry, x().greater_than(num(0)), left, right);
    let left_edge = builder.add_edge(left, join, EdgeKind::Blank);
    let right_edge = builder.add_edge(right, join, EdgeKind::Blank);
    let loop_edge = builder.add_edge(
        join,
        join,
        EdgeKind::Statement {
            target: x(),
            value: x().subtract(num(1)),
        },
    );
    DiamondFixture {
        cfa: builder.build(entry),
        entry,
        left,
        right,
        join,
        then_edge,
        else_edge,
        left_edge,
        right_edge,
        loop_edge,
    }
}

/// A breadth first worklist exploration from the entry of the CFA. It stops at target states
/// and keeps its graph between runs, so that it can resume below a refinement root.
pub struct Exploration {
    pub arg: Arg,
    pub target: Option<ArgNodeId>,
    reached: Vec<ArgNodeId>,
    waitlist: VecDeque<ArgNodeId>,
    /// (node, coverer): a successor of node was dropped because coverer covers it.
    covered: Vec<(ArgNodeId, ArgNodeId)>,
    steps: usize,
}

impl Exploration {
    pub fn start<M: FormulaManager>(cpa: &mut PredicateCpa<M>) -> Exploration {
        let mut exploration = Exploration {
            arg: Arg::new(),
            target: None,
            reached: Vec::new(),
            waitlist: VecDeque::new(),
            covered: Vec::new(),
            steps: 0,
        };
        exploration.add_root(cpa);
        exploration
    }

    fn add_root<M: FormulaManager>(&mut self, cpa: &mut PredicateCpa<M>) {
        let entry = cpa.cfa().entry();
        let initial = cpa.get_initial_state(entry);
        let root = self.arg.add_root(initial, entry);
        self.reached.push(root);
        self.waitlist.push_back(root);
    }

    /// Explores until a target state is popped or nothing is left to explore.
    pub fn run<M: FormulaManager>(
        &mut self,
        cpa: &mut PredicateCpa<M>,
    ) -> CpaResult<Option<ArgNodeId>> {
        self.target = None;
        while let Some(node) = self.waitlist.pop_front() {
            self.steps += 1;
            assert!(self.steps < 10_000, "exploration does not terminate");
            let (state, location) = match self.arg.node(node) {
                Some(n) => (n.state.clone(), n.location),
                None => continue,
            };
            if cpa.is_target(&state) {
                self.target = Some(node);
                return Ok(self.target);
            }
            let precision = cpa.get_initial_precision(location);
            for (edge, successor) in cpa.get_abstract_successors(&state, &precision)? {
                if !self.arg.contains(node) {
                    break;
                }
                self.add_successor(cpa, node, edge, successor);
            }
        }
        Ok(None)
    }

    /// Removes `root` and everything below it, then queues the surviving parents again so that
    /// they are expanded with the current precision.
    pub fn restart_from<M: FormulaManager>(&mut self, cpa: &mut PredicateCpa<M>, root: ArgNodeId) {
        let parents = self.arg.remove_subtree(root);
        self.prune();
        self.target = None;
        if self.arg.root().is_none() {
            self.covered.clear();
            self.add_root(cpa);
            return;
        }
        for parent in parents {
            if !self.waitlist.contains(&parent) {
                self.waitlist.push_back(parent);
            }
        }
    }

    fn add_successor<M: FormulaManager>(
        &mut self,
        cpa: &mut PredicateCpa<M>,
        node: ArgNodeId,
        edge: EdgeId,
        successor: PredicateState,
    ) {
        let location = cpa.location_of(&successor).expect("successor without location");
        for r in self.reached.clone() {
            let reached_state = match self.arg.node(r) {
                Some(n) if n.location == location => n.state.clone(),
                _ => continue,
            };
            let merged = cpa.merge(&successor, &reached_state);
            if merged == reached_state {
                continue;
            }
            for (child, _) in self.arg.children(r) {
                self.arg.remove_subtree(child);
            }
            self.prune();
            if !self.arg.contains(r) {
                continue;
            }
            self.arg.replace_state(r, merged);
            if self.arg.contains(node) {
                self.arg.add_edge(node, r, edge);
            }
            self.waitlist.push_back(r);
        }
        let arg = &self.arg;
        let coverer = self.reached.iter().copied().find(|r| match arg.node(*r) {
            Some(n) if n.location == location => cpa.partial_order(&successor, &n.state),
            _ => false,
        });
        if !self.arg.contains(node) {
            return;
        }
        match coverer {
            Some(coverer) => self.covered.push((node, coverer)),
            None => {
                let child = self.arg.add_child(node, edge, successor, location);
                self.reached.push(child);
                self.waitlist.push_back(child);
            }
        }
    }

    /// Forgets removed nodes. Nodes whose successors were covered by a removed node are queued
    /// again. Runs before any node is added, since removed indices get reused.
    fn prune(&mut self) {
        let arg = &self.arg;
        self.reached.retain(|r| arg.contains(*r));
        self.waitlist.retain(|w| arg.contains(*w));
        let (kept, lost): (Vec<_>, Vec<_>) = self
            .covered
            .drain(..)
            .partition(|(_, coverer)| arg.contains(*coverer));
        self.covered = kept
            .into_iter()
            .filter(|(node, _)| arg.contains(*node))
            .collect();
        for (node, _) in lost {
            if arg.contains(node) && !self.waitlist.contains(&node) {
                self.waitlist.push_back(node);
            }
        }
    }
}

/// Explores from scratch with the current precision until the first target state.
pub fn explore<M: FormulaManager>(cpa: &mut PredicateCpa<M>) -> CpaResult<Exploration> {
    let mut exploration = Exploration::start(cpa);
    exploration.run(cpa)?;
    Ok(exploration)
}

#[derive(Debug)]
pub enum Verdict {
    Safe,
    Unsafe(TargetPath),
}

/// Explores and refines until the program is proved safe or a feasible error path is found.
/// After a spurious counterexample only the part of the graph below the refinement root is
/// explored again. Returns the verdict and the number of spurious counterexamples on the way.
pub fn run_cegar<M: FormulaManager>(
    cpa: &mut PredicateCpa<M>,
    max_refinements: usize,
) -> CpaResult<(Verdict, usize)> {
    let mut exploration = Exploration::start(cpa);
    for refinements in 0..=max_refinements {
        let target = match exploration.run(cpa)? {
            None => return Ok((Verdict::Safe, refinements)),
            Some(target) => target,
        };
        let path = exploration.arg.path_to(target)?;
        match cpa.perform_refinement(&exploration.arg, &path)? {
            RefinementResult::Real { target_path } => {
                return Ok((Verdict::Unsafe(target_path), refinements));
            }
            RefinementResult::Spurious { root, .. } => exploration.restart_from(cpa, root),
        }
    }
    panic!("no verdict after {} refinements", max_refinements)
}

/// The non-abstraction state of a given state, for tests that know what they get.
pub fn non_abstraction(state: &PredicateState) -> Rc<predicate_cpa::abstract_state::NonAbstractionState> {
    state
        .as_non_abstraction()
        .expect("a non-abstraction state")
        .clone()
}
