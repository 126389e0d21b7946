// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

use crate::cfa::{CfaEdge, EdgeId, EdgeKind, Location};
use crate::error::{CpaError, CpaResult};
use crate::expression::{Expression, ExpressionTrait, ExpressionType};
use crate::k_limits;
use crate::options::AbstractionType;
use crate::path_formula::{PathFormula, SsaMap};
use crate::precision::Predicate;
use crate::smt_solver::{SmtResult, SmtSolver};

use itertools::Itertools;
use log_derive::{logfn, logfn_inputs};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Debug, Formatter, Result};
use std::marker::PhantomData;
use std::rc::Rc;

/// What the formula algebra found out about an abstract counterexample.
#[derive(Clone, Debug, Default)]
pub struct CounterexampleTraceInfo {
    /// True if the concrete semantics of the path is unsatisfiable.
    pub is_spurious: bool,
    /// For a spurious path, the predicates that hold at the end of each block and
    /// rule out the rest of the path. The last block never gets predicates.
    pub predicates_per_block: Vec<Vec<Predicate>>,
    /// For a feasible path, the values of the program-counter variables in a satisfying assignment.
    pub model: BTreeMap<Rc<Expression>, bool>,
}

impl CounterexampleTraceInfo {
    pub fn predicates_for(&self, block: usize) -> &[Predicate] {
        self.predicates_per_block
            .get(block)
            .map(|p| p.as_slice())
            .unwrap_or(&[])
    }

    /// The assignment of named boolean terms that makes the path feasible.
    pub fn extract_model(&self) -> &BTreeMap<Rc<Expression>, bool> {
        &self.model
    }
}

/// The operations the analysis needs from the formula algebra. Abstraction formulas are
/// boolean combinations of predicates without SSA indices. Path formulas carry indices.
pub trait FormulaManager: Debug {
    fn make_true(&self) -> Rc<Expression> {
        Expression::make_true()
    }

    fn make_false(&self) -> Rc<Expression> {
        Expression::make_false()
    }

    fn make_and(&self, left: &Rc<Expression>, right: &Rc<Expression>) -> Rc<Expression> {
        left.and(right.clone())
    }

    fn make_or(&self, left: &Rc<Expression>, right: &Rc<Expression>) -> Rc<Expression> {
        left.or(right.clone())
    }

    /// The disjunction of two path formulas over a common SSA map.
    fn make_or_path_formulas(&self, left: &PathFormula, right: &PathFormula) -> PathFormula {
        left.or(right)
    }

    /// Extends `path_formula` with the transition of `edge`, which leaves `source`.
    fn conjoin_edge(
        &self,
        path_formula: &PathFormula,
        source: Location,
        edge: EdgeId,
        cfa_edge: &CfaEdge,
    ) -> CpaResult<PathFormula>;

    /// The strongest boolean combination of `predicates` (instantiated at the end of
    /// `path_formula`) implied by `prior` (instantiated with `prior_ssa`) and `path_formula`.
    fn compute_abstraction(
        &self,
        prior: &Rc<Expression>,
        prior_ssa: &SsaMap,
        path_formula: &PathFormula,
        predicates: &[Predicate],
    ) -> CpaResult<Rc<Expression>>;

    fn is_false(&self, abstraction: &Rc<Expression>) -> bool {
        abstraction.as_bool_if_known() == Some(false)
    }

    /// True if `abstraction` (instantiated with `abstraction_ssa`) and `path_formula` are
    /// known to be contradictory.
    fn unsat(
        &self,
        abstraction: &Rc<Expression>,
        abstraction_ssa: &SsaMap,
        path_formula: &PathFormula,
    ) -> bool;

    /// True if `antecedent => consequent` is known to be valid.
    fn implies(&self, antecedent: &Rc<Expression>, consequent: &Rc<Expression>) -> bool;

    /// Checks the conjunction of the given blocks, each of which continues the SSA map of its
    /// predecessor.
    fn build_counterexample_trace(&self, blocks: &[PathFormula])
        -> CpaResult<CounterexampleTraceInfo>;
}

/// A formula manager that answers every question by asking an SMT solver.
pub struct SolverFormulaManager<E, S: SmtSolver<E>> {
    solver: S,
    abstraction_type: AbstractionType,
    phantom: PhantomData<E>,
}

impl<E, S: SmtSolver<E>> Debug for SolverFormulaManager<E, S> {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        write!(f, "SolverFormulaManager({:?})", self.abstraction_type)
    }
}

impl<E, S: SmtSolver<E>> SolverFormulaManager<E, S> {
    pub fn new(solver: S, abstraction_type: AbstractionType) -> SolverFormulaManager<E, S> {
        SolverFormulaManager {
            solver,
            abstraction_type,
            phantom: PhantomData,
        }
    }

    pub fn solver(&self) -> &S {
        &self.solver
    }

    fn check(&self, formula: &Rc<Expression>) -> SmtResult {
        match formula.as_bool_if_known() {
            Some(true) => SmtResult::Satisfiable,
            Some(false) => SmtResult::Unsatisfiable,
            None => self
                .solver
                .solve_expression(&self.solver.get_as_smt_predicate(formula)),
        }
    }

    fn is_unsat(&self, formula: &Rc<Expression>) -> bool {
        self.check(formula) == SmtResult::Unsatisfiable
    }

    /// target := value, with value read before target gets its new index.
    fn assign(
        path_formula: &PathFormula,
        read_ssa: &SsaMap,
        target: &Rc<Expression>,
        value: &Rc<Expression>,
    ) -> CpaResult<PathFormula> {
        let (name, var_type) = Self::variable_parts(target)?;
        let value = value.instantiate(read_ssa);
        let (ssa, index) = path_formula.ssa().with_fresh_index(&name, var_type);
        Ok(path_formula.conjoin(
            Expression::indexed_variable(&name, var_type, index).equals(value),
            ssa,
        ))
    }

    fn variable_parts(variable: &Rc<Expression>) -> CpaResult<(Rc<str>, ExpressionType)> {
        match variable.as_ref() {
            Expression::Variable { name, var_type, .. } => Ok((name.clone(), *var_type)),
            _ => Err(CpaError::UnrecognizedEdge {
                edge: variable.to_string(),
                description: String::from("the target of a write must be a variable"),
            }),
        }
    }

    fn boolean_abstraction(
        &self,
        formula: &Rc<Expression>,
        predicates: &[(Rc<Expression>, Rc<Expression>)],
    ) -> Rc<Expression> {
        let smt_predicates: Vec<E> = predicates
            .iter()
            .map(|(_, instantiated)| self.solver.get_as_smt_predicate(instantiated))
            .collect();
        let mut cubes = Vec::new();
        self.solver.set_backtrack_position();
        self.solver
            .assert(&self.solver.get_as_smt_predicate(formula));
        let result = loop {
            match self.solver.solve() {
                SmtResult::Unsatisfiable => break Expression::disjunction(cubes),
                SmtResult::Undefined => {
                    warn!("solver gave up during boolean abstraction, using true");
                    break Expression::make_true();
                }
                SmtResult::Satisfiable => {
                    if cubes.len() >= k_limits::MAX_ABSTRACTION_CUBES {
                        warn!(
                            "boolean abstraction exceeded {} cubes, using true",
                            k_limits::MAX_ABSTRACTION_CUBES
                        );
                        break Expression::make_true();
                    }
                    let mut cube = Expression::make_true();
                    let mut instantiated_cube = Expression::make_true();
                    for ((predicate, instantiated), smt_predicate) in
                        predicates.iter().zip(smt_predicates.iter())
                    {
                        match self.solver.get_model_bool(smt_predicate) {
                            Some(true) => {
                                cube = cube.and(predicate.clone());
                                instantiated_cube = instantiated_cube.and(instantiated.clone());
                            }
                            Some(false) => {
                                cube = cube.and(predicate.logical_not());
                                instantiated_cube =
                                    instantiated_cube.and(instantiated.logical_not());
                            }
                            None => {}
                        }
                    }
                    trace!("abstraction cube {}", cube);
                    cubes.push(cube);
                    let blocking_clause = self
                        .solver
                        .invert_predicate(&self.solver.get_as_smt_predicate(&instantiated_cube));
                    self.solver.assert(&blocking_clause);
                }
            }
        };
        self.solver.backtrack();
        result
    }

    fn cartesian_abstraction(
        &self,
        formula: &Rc<Expression>,
        predicates: &[(Rc<Expression>, Rc<Expression>)],
    ) -> Rc<Expression> {
        if self.is_unsat(formula) {
            return Expression::make_false();
        }
        let mut result = Expression::make_true();
        for (predicate, instantiated) in predicates {
            if self.is_unsat(&formula.and(instantiated.logical_not())) {
                result = result.and(predicate.clone());
            } else if self.is_unsat(&formula.and(instantiated.clone())) {
                result = result.and(predicate.logical_not());
            }
        }
        result
    }

    /// Finds predicates over the variables that `prefix` and `suffix` share, such that the
    /// prefix implies them and they contradict the suffix. Candidates are the atoms of either side.
    #[logfn_inputs(TRACE)]
    fn interpolation_predicates(
        &self,
        prefix: &Rc<Expression>,
        suffix: &Rc<Expression>,
    ) -> CpaResult<Vec<Predicate>> {
        let prefix_variables = prefix.variables();
        let shared: BTreeSet<Rc<Expression>> = suffix
            .variables()
            .into_iter()
            .filter(|v| prefix_variables.contains(v) && !v.is_program_counter())
            .collect();
        if shared.is_empty() || self.is_unsat(prefix) {
            return Ok(Vec::new());
        }
        let candidates: Vec<Rc<Expression>> = prefix
            .atoms()
            .into_iter()
            .chain(suffix.atoms())
            .filter(|atom| {
                let variables = atom.variables();
                !variables.is_empty() && variables.iter().all(|v| shared.contains(v))
            })
            .unique()
            .take(k_limits::MAX_INTERPOLATION_ATOMS)
            .collect();
        let mut literals = Vec::new();
        for atom in candidates {
            if self.is_unsat(&prefix.and(atom.logical_not())) {
                literals.push(atom);
            } else if self.is_unsat(&prefix.and(atom.clone())) {
                literals.push(atom.logical_not());
            }
        }
        let contradicts_suffix = |literals: &[Rc<Expression>]| {
            self.is_unsat(&Expression::conjunction(literals.iter().cloned()).and(suffix.clone()))
        };
        if !contradicts_suffix(&literals) {
            warn!("no interpolant among the atoms of {} and {}", prefix, suffix);
            return Ok(Vec::new());
        }
        let mut i = 0;
        while i < literals.len() {
            let mut without = literals.clone();
            without.remove(i);
            if contradicts_suffix(&without) {
                literals = without;
            } else {
                i += 1;
            }
        }
        let predicates: Vec<Predicate> = literals
            .iter()
            .map(|literal| Predicate::try_new(literal.normalized_atom().uninstantiate()))
            .collect::<CpaResult<_>>()?;
        Ok(predicates.into_iter().unique().collect())
    }
}

impl<E, S: SmtSolver<E>> FormulaManager for SolverFormulaManager<E, S> {
    #[logfn_inputs(TRACE)]
    fn conjoin_edge(
        &self,
        path_formula: &PathFormula,
        source: Location,
        edge: EdgeId,
        cfa_edge: &CfaEdge,
    ) -> CpaResult<PathFormula> {
        match &cfa_edge.kind {
            EdgeKind::Blank | EdgeKind::CallToReturn | EdgeKind::FunctionReturn { result: None } => {
                Ok(path_formula.clone())
            }
            EdgeKind::Declaration {
                variable,
                initializer,
            } => {
                let (name, var_type) = Self::variable_parts(variable)?;
                let value = initializer.as_ref().map(|i| i.instantiate(path_formula.ssa()));
                let (ssa, index) = path_formula.ssa().with_fresh_index(&name, var_type);
                let declared = Expression::indexed_variable(&name, var_type, index);
                Ok(match value {
                    Some(value) => path_formula.conjoin(declared.equals(value), ssa),
                    None => PathFormula::new(path_formula.formula().clone(), ssa),
                })
            }
            EdgeKind::Statement { target, value }
            | EdgeKind::FunctionReturn {
                result: Some((target, value)),
            } => Self::assign(path_formula, path_formula.ssa(), target, value),
            EdgeKind::Assume {
                condition,
                truth_assumption,
            } => {
                let condition = condition.instantiate(path_formula.ssa());
                let pc_name = Expression::program_counter_name(source.index());
                let (ssa, index) = path_formula
                    .ssa()
                    .with_fresh_index(&pc_name, ExpressionType::Bool);
                let pc = Expression::indexed_variable(&pc_name, ExpressionType::Bool, index);
                let (condition, pc) = if *truth_assumption {
                    (condition, pc)
                } else {
                    (condition.logical_not(), pc.logical_not())
                };
                Ok(path_formula.conjoin(condition.and(pc), ssa))
            }
            EdgeKind::FunctionCall { arguments } => {
                let read_ssa = path_formula.ssa().clone();
                arguments
                    .iter()
                    .try_fold(path_formula.clone(), |formula, (parameter, argument)| {
                        Self::assign(&formula, &read_ssa, parameter, argument)
                    })
            }
            EdgeKind::Opaque { description } => Err(CpaError::UnrecognizedEdge {
                edge: format!("{:?}", edge),
                description: description.clone(),
            }),
        }
    }

    #[logfn_inputs(TRACE)]
    #[logfn(TRACE)]
    fn compute_abstraction(
        &self,
        prior: &Rc<Expression>,
        prior_ssa: &SsaMap,
        path_formula: &PathFormula,
        predicates: &[Predicate],
    ) -> CpaResult<Rc<Expression>> {
        let formula = prior
            .instantiate(prior_ssa)
            .and(path_formula.formula().clone());
        if predicates.is_empty() {
            return Ok(if self.is_unsat(&formula) {
                Expression::make_false()
            } else {
                Expression::make_true()
            });
        }
        let predicates: Vec<(Rc<Expression>, Rc<Expression>)> = predicates
            .iter()
            .map(|p| {
                (
                    p.expression().clone(),
                    p.expression().instantiate(path_formula.ssa()),
                )
            })
            .collect();
        Ok(match self.abstraction_type {
            AbstractionType::Boolean => self.boolean_abstraction(&formula, &predicates),
            AbstractionType::Cartesian => self.cartesian_abstraction(&formula, &predicates),
        })
    }

    #[logfn_inputs(TRACE)]
    fn unsat(
        &self,
        abstraction: &Rc<Expression>,
        abstraction_ssa: &SsaMap,
        path_formula: &PathFormula,
    ) -> bool {
        let formula = abstraction
            .instantiate(abstraction_ssa)
            .and(path_formula.formula().clone());
        match self.check(&formula) {
            SmtResult::Unsatisfiable => true,
            SmtResult::Satisfiable => false,
            SmtResult::Undefined => {
                warn!("solver gave up on satisfiability check, assuming satisfiable");
                false
            }
        }
    }

    #[logfn_inputs(TRACE)]
    fn implies(&self, antecedent: &Rc<Expression>, consequent: &Rc<Expression>) -> bool {
        if antecedent == consequent
            || antecedent.as_bool_if_known() == Some(false)
            || consequent.as_bool_if_known() == Some(true)
        {
            return true;
        }
        match self.check(&antecedent.and(consequent.logical_not())) {
            SmtResult::Unsatisfiable => true,
            SmtResult::Satisfiable => false,
            SmtResult::Undefined => {
                warn!(
                    "solver gave up on {} => {}, assuming no implication",
                    antecedent, consequent
                );
                false
            }
        }
    }

    #[logfn_inputs(TRACE)]
    fn build_counterexample_trace(
        &self,
        blocks: &[PathFormula],
    ) -> CpaResult<CounterexampleTraceInfo> {
        let formulas: Vec<Rc<Expression>> = blocks.iter().map(|b| b.formula().clone()).collect();
        let whole = Expression::conjunction(formulas.iter().cloned());
        self.solver.set_backtrack_position();
        self.solver
            .assert(&self.solver.get_as_smt_predicate(&whole));
        let result = self.solver.solve();
        let mut model = BTreeMap::new();
        if result == SmtResult::Satisfiable {
            for variable in whole.variables() {
                if !variable.is_program_counter() {
                    continue;
                }
                if let Some(value) = self
                    .solver
                    .get_model_bool(&self.solver.get_as_smt_predicate(&variable))
                {
                    model.insert(variable, value);
                }
            }
            debug!("feasible counterexample, model:\n{}", self.solver.get_model_as_string());
        }
        self.solver.backtrack();
        match result {
            SmtResult::Satisfiable => Ok(CounterexampleTraceInfo {
                is_spurious: false,
                predicates_per_block: vec![Vec::new(); blocks.len()],
                model,
            }),
            SmtResult::Unsatisfiable => {
                let mut predicates_per_block = Vec::with_capacity(blocks.len());
                for cut in 0..blocks.len() {
                    if cut + 1 == blocks.len() {
                        predicates_per_block.push(Vec::new());
                        continue;
                    }
                    let prefix = Expression::conjunction(formulas[..=cut].iter().cloned());
                    let suffix = Expression::conjunction(formulas[cut + 1..].iter().cloned());
                    predicates_per_block.push(self.interpolation_predicates(&prefix, &suffix)?);
                }
                Ok(CounterexampleTraceInfo {
                    is_spurious: true,
                    predicates_per_block,
                    model,
                })
            }
            SmtResult::Undefined => Err(CpaError::SolverUndefined {
                query: "counterexample trace",
            }),
        }
    }
}
