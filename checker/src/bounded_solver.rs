// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

use crate::expression::{Expression, ExpressionTrait, ExpressionType};
use crate::k_limits;
use crate::smt_solver::{SmtResult, SmtSolver};

use itertools::Itertools;
use log_derive::logfn_inputs;
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Debug, Formatter, Result};
use std::rc::Rc;

/// The value of a variable in a satisfying assignment.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i128),
}

type Assignment = BTreeMap<Rc<Expression>, Value>;

/// A solver that needs no native library. Conjuncts of the form `v == t` are eliminated by
/// substitution and the remaining variables are decided by backtracking search with
/// propagation. An integer variable is searched over a domain that is known to be complete
/// when one exists:
///
/// * if every integer comparison is a difference constraint (x op c, x - y op c), any solution
///   can be shifted into a box bounded by the sum of the constants;
/// * if every comparison that mentions the variable is linear in it and has no other free
///   variables, only the values around the points where a comparison changes its truth matter.
///
/// Otherwise the variable ranges over [-range, range]. If such a cut off search finds no model,
/// the answer is SmtResult::Undefined, never Unsatisfiable. Search that exceeds
/// k_limits::MAX_BOUNDED_SOLVER_STEPS yields SmtResult::Undefined as well.
pub struct BoundedSolver {
    range: i128,
    scopes: RefCell<Vec<Vec<Rc<Expression>>>>,
    model: RefCell<Option<Assignment>>,
    steps: Cell<u64>,
    cut_off: Cell<bool>,
}

impl Debug for BoundedSolver {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        write!(f, "BoundedSolver[-{0}, {0}]", self.range)
    }
}

impl Default for BoundedSolver {
    fn default() -> Self {
        BoundedSolver::new(k_limits::DEFAULT_SOLVER_RANGE)
    }
}

/// The part of a query that is left to search, after definitions have been eliminated.
struct Query {
    conjuncts: Vec<Rc<Expression>>,
    variables: Vec<Rc<Expression>>,
    /// Integer comparisons, each with the variables it mentions.
    atoms: Vec<(Rc<Expression>, BTreeSet<Rc<Expression>>)>,
    /// Bound on the magnitude of some solution, if the comparisons are difference constraints.
    difference_bound: Option<i128>,
}

impl Query {
    fn new(conjuncts: Vec<Rc<Expression>>) -> Query {
        let variables = conjuncts
            .iter()
            .flat_map(|c| c.variables())
            .unique()
            .sorted_by_key(|v| match v.as_ref() {
                Expression::Variable { name, index, .. } => (index.unwrap_or(0), name.clone()),
                _ => (0, Rc::from("")),
            })
            .collect();
        let mut atoms = Vec::new();
        for conjunct in &conjuncts {
            integer_atoms(conjunct, &mut atoms);
        }
        let difference_bound = difference_bound(&atoms);
        let atoms = atoms
            .into_iter()
            .unique()
            .map(|atom| {
                let variables = atom.variables();
                (atom, variables)
            })
            .collect();
        Query {
            conjuncts,
            variables,
            atoms,
            difference_bound,
        }
    }

    /// The values around which the truth of the comparisons that mention `variable` can change,
    /// or None if one of them is not linear in `variable` or has another unassigned variable.
    fn critical_values(
        &self,
        variable: &Rc<Expression>,
        assignment: &Assignment,
    ) -> Option<Vec<i128>> {
        let mut values = vec![0];
        for (atom, variables) in &self.atoms {
            if !variables.contains(variable) {
                continue;
            }
            let term = comparison_term(atom, assignment)?;
            if term.coefficients.keys().any(|v| v != variable) {
                return None;
            }
            let a = match term.coefficients.get(variable) {
                Some(a) => *a,
                None => continue,
            };
            // a * x + k against 0 changes at x = -k / a
            let (numerator, denominator) = if a < 0 {
                (term.constant, -a)
            } else {
                (term.constant.saturating_neg(), a)
            };
            let floor = numerator.div_euclid(denominator);
            values.extend(floor.saturating_sub(1)..=floor.saturating_add(2));
        }
        Some(values)
    }
}

impl BoundedSolver {
    pub fn new(range: i128) -> BoundedSolver {
        BoundedSolver {
            range: range.abs(),
            scopes: RefCell::new(vec![Vec::new()]),
            model: RefCell::new(None),
            steps: Cell::new(0),
            cut_off: Cell::new(false),
        }
    }

    /// Small magnitudes first, so that models stay readable.
    fn domain(
        &self,
        query: &Query,
        variable: &Rc<Expression>,
        assignment: &Assignment,
    ) -> Box<dyn Iterator<Item = Value>> {
        if variable.infer_type() == ExpressionType::Bool {
            return Box::new(vec![Value::Bool(false), Value::Bool(true)].into_iter());
        }
        if let Some(bound) = query.difference_bound {
            return Box::new(symmetric_range(bound).map(Value::Int));
        }
        if let Some(values) = query.critical_values(variable, assignment) {
            let values = values
                .into_iter()
                .unique()
                .sorted_by_key(|v| (v.saturating_abs(), *v < 0))
                .map(Value::Int)
                .collect::<Vec<_>>();
            return Box::new(values.into_iter());
        }
        trace!("searching {} within [-{}, {}] only", variable, self.range, self.range);
        self.cut_off.set(true);
        Box::new(symmetric_range(self.range).map(Value::Int))
    }

    /// Returns Some(true) and leaves a model in `assignment` if the conjuncts can be satisfied
    /// by extending it, Some(false) if they cannot and None if the step budget ran out.
    fn search(&self, query: &Query, assignment: &mut Assignment) -> Option<bool> {
        self.steps.set(self.steps.get() + 1);
        if self.steps.get() > k_limits::MAX_BOUNDED_SOLVER_STEPS {
            return None;
        }
        let mut propagated = Vec::new();
        let consistent = propagate(&query.conjuncts, assignment, &mut propagated);
        let result = if !consistent {
            Some(false)
        } else if let Some(variable) = query
            .variables
            .iter()
            .find(|v| !assignment.contains_key(*v))
        {
            let mut result = Some(false);
            for value in self.domain(query, variable, assignment) {
                assignment.insert(variable.clone(), value);
                match self.search(query, assignment) {
                    Some(true) => return Some(true),
                    Some(false) => {}
                    None => {
                        result = None;
                        break;
                    }
                }
            }
            assignment.remove(variable);
            result
        } else {
            Some(true)
        };
        if result != Some(true) {
            for variable in propagated {
                assignment.remove(&variable);
            }
        }
        result
    }
}

/// 0, 1, -1, 2, -2, ... bound, -bound
fn symmetric_range(bound: i128) -> impl Iterator<Item = i128> {
    std::iter::once(0).chain((1..=bound).flat_map(|i| [i, -i]))
}

/// Removes conjuncts of the form `v == t`, where v does not occur in t, by substituting t for v
/// in the other conjuncts. Returns what is left and the definitions in order of elimination.
fn eliminate_definitions(
    mut conjuncts: Vec<Rc<Expression>>,
) -> (Vec<Rc<Expression>>, Vec<(Rc<Expression>, Rc<Expression>)>) {
    let mut definitions = Vec::new();
    loop {
        let found = conjuncts
            .iter()
            .enumerate()
            .find_map(|(i, c)| definition(c).map(|d| (i, d)));
        let (position, (variable, term)) = match found {
            Some(found) => found,
            None => break,
        };
        conjuncts.remove(position);
        conjuncts = conjuncts
            .iter()
            .flat_map(|c| c.substitute(&variable, &term).conjuncts())
            .collect();
        definitions.push((variable, term));
    }
    (conjuncts, definitions)
}

fn definition(conjunct: &Rc<Expression>) -> Option<(Rc<Expression>, Rc<Expression>)> {
    let defines = |variable: &Rc<Expression>, term: &Rc<Expression>| {
        matches!(variable.as_ref(), Expression::Variable { .. })
            && !term.variables().contains(variable)
    };
    match conjunct.as_ref() {
        Expression::Equals { left, right } if defines(left, right) => {
            Some((left.clone(), right.clone()))
        }
        Expression::Equals { left, right } if defines(right, left) => {
            Some((right.clone(), left.clone()))
        }
        _ => None,
    }
}

/// Collects the integer comparisons of `expression`, looking through its boolean structure.
fn integer_atoms(expression: &Rc<Expression>, atoms: &mut Vec<Rc<Expression>>) {
    match expression.as_ref() {
        Expression::And { left, right } | Expression::Or { left, right } => {
            integer_atoms(left, atoms);
            integer_atoms(right, atoms);
        }
        Expression::Equals { left, right } | Expression::Ne { left, right }
            if left.infer_type() == ExpressionType::Bool =>
        {
            integer_atoms(left, atoms);
            integer_atoms(right, atoms);
        }
        Expression::LogicalNot { operand } => integer_atoms(operand, atoms),
        Expression::Equals { .. }
        | Expression::Ne { .. }
        | Expression::LessThan { .. }
        | Expression::LessOrEqual { .. }
        | Expression::GreaterThan { .. }
        | Expression::GreaterOrEqual { .. } => atoms.push(expression.clone()),
        _ => {}
    }
}

/// If every comparison is a difference constraint, returns a bound B such that a satisfiable
/// formula has a model with every integer in [-B, B].
fn difference_bound(atoms: &[Rc<Expression>]) -> Option<i128> {
    let unassigned = Assignment::new();
    let mut bound: i128 = 1;
    for atom in atoms {
        let term = comparison_term(atom, &unassigned)?;
        let coefficients = term.coefficients.values().copied().collect::<Vec<_>>();
        let is_difference = match coefficients.as_slice() {
            [] => true,
            [a] => a.abs() == 1,
            [a, b] => a.abs() == 1 && a + b == 0,
            _ => false,
        };
        if !is_difference {
            return None;
        }
        // a strict or negated comparison moves the constant by one
        let weight = term.constant.saturating_abs().saturating_add(1);
        bound = bound.saturating_add(weight.saturating_mul(2));
    }
    Some(bound)
}

/// A linear integer term: the sum of coefficient * variable, plus a constant.
#[derive(Default)]
struct LinearTerm {
    coefficients: BTreeMap<Rc<Expression>, i128>,
    constant: i128,
}

impl LinearTerm {
    fn constant(value: i128) -> LinearTerm {
        LinearTerm {
            coefficients: BTreeMap::new(),
            constant: value,
        }
    }

    fn variable(variable: Rc<Expression>) -> LinearTerm {
        let mut coefficients = BTreeMap::new();
        coefficients.insert(variable, 1);
        LinearTerm {
            coefficients,
            constant: 0,
        }
    }

    /// self + factor * other
    fn combine(mut self, other: LinearTerm, factor: i128) -> LinearTerm {
        for (variable, coefficient) in other.coefficients {
            let entry = self.coefficients.entry(variable).or_insert(0);
            *entry = entry.saturating_add(coefficient.saturating_mul(factor));
        }
        self.coefficients.retain(|_, c| *c != 0);
        self.constant = self
            .constant
            .saturating_add(other.constant.saturating_mul(factor));
        self
    }

    fn scale(self, factor: i128) -> LinearTerm {
        LinearTerm::default().combine(self, factor)
    }
}

/// The linear form of `expression`, with assigned variables replaced by their values,
/// or None if it is not linear.
fn linear_form(expression: &Rc<Expression>, assignment: &Assignment) -> Option<LinearTerm> {
    match expression.as_ref() {
        Expression::Numeral(n) => Some(LinearTerm::constant(*n)),
        Expression::Variable {
            var_type: ExpressionType::Integer,
            ..
        } => match assignment.get(expression) {
            Some(Value::Int(i)) => Some(LinearTerm::constant(*i)),
            Some(Value::Bool(..)) => None,
            None => Some(LinearTerm::variable(expression.clone())),
        },
        Expression::Add { left, right } => {
            Some(linear_form(left, assignment)?.combine(linear_form(right, assignment)?, 1))
        }
        Expression::Sub { left, right } => {
            Some(linear_form(left, assignment)?.combine(linear_form(right, assignment)?, -1))
        }
        Expression::Neg { operand } => Some(linear_form(operand, assignment)?.scale(-1)),
        Expression::Mul { left, right } => {
            let left = linear_form(left, assignment)?;
            let right = linear_form(right, assignment)?;
            if left.coefficients.is_empty() {
                Some(right.scale(left.constant))
            } else if right.coefficients.is_empty() {
                Some(left.scale(right.constant))
            } else {
                None
            }
        }
        _ => None,
    }
}

/// left - right for an integer comparison between left and right.
fn comparison_term(atom: &Rc<Expression>, assignment: &Assignment) -> Option<LinearTerm> {
    match atom.as_ref() {
        Expression::Equals { left, right }
        | Expression::Ne { left, right }
        | Expression::LessThan { left, right }
        | Expression::LessOrEqual { left, right }
        | Expression::GreaterThan { left, right }
        | Expression::GreaterOrEqual { left, right } => {
            Some(linear_form(left, assignment)?.combine(linear_form(right, assignment)?, -1))
        }
        _ => None,
    }
}

/// Assigns every variable whose value is forced by a conjunct, until nothing changes.
/// Returns false if some conjunct evaluates to false.
fn propagate(
    conjuncts: &[Rc<Expression>],
    assignment: &mut Assignment,
    propagated: &mut Vec<Rc<Expression>>,
) -> bool {
    loop {
        let mut changed = false;
        for conjunct in conjuncts {
            match evaluate(conjunct, assignment, false) {
                Some(Value::Bool(false)) => return false,
                Some(_) => {}
                None => {
                    if let Some((variable, value)) = forced_value(conjunct, assignment) {
                        assignment.insert(variable.clone(), value);
                        propagated.push(variable);
                        changed = true;
                    }
                }
            }
        }
        if !changed {
            return true;
        }
    }
}

/// If `conjunct` is a literal over an unassigned boolean variable, or an equality between an
/// unassigned variable and a term that can be evaluated, returns the variable and its value.
fn forced_value(
    conjunct: &Rc<Expression>,
    assignment: &Assignment,
) -> Option<(Rc<Expression>, Value)> {
    let unassigned = |e: &Rc<Expression>| {
        matches!(e.as_ref(), Expression::Variable { .. }) && !assignment.contains_key(e)
    };
    match conjunct.as_ref() {
        Expression::Variable { .. } if unassigned(conjunct) => {
            Some((conjunct.clone(), Value::Bool(true)))
        }
        Expression::LogicalNot { operand } if unassigned(operand) => {
            Some((operand.clone(), Value::Bool(false)))
        }
        Expression::Equals { left, right } => {
            if unassigned(left) {
                evaluate(right, assignment, false).map(|v| (left.clone(), v))
            } else if unassigned(right) {
                evaluate(left, assignment, false).map(|v| (right.clone(), v))
            } else {
                None
            }
        }
        _ => None,
    }
}

/// Evaluates `expression` under `assignment`. Unassigned variables make the result unknown
/// unless `complete` is set, in which case they default to 0 and false.
fn evaluate(expression: &Rc<Expression>, assignment: &Assignment, complete: bool) -> Option<Value> {
    let int = |e: &Rc<Expression>| match evaluate(e, assignment, complete) {
        Some(Value::Int(i)) => Some(i),
        _ => None,
    };
    let boolean = |e: &Rc<Expression>| match evaluate(e, assignment, complete) {
        Some(Value::Bool(b)) => Some(b),
        _ => None,
    };
    let compare = |left: &Rc<Expression>, right: &Rc<Expression>, op: fn(i128, i128) -> bool| {
        Some(Value::Bool(op(int(left)?, int(right)?)))
    };
    match expression.as_ref() {
        Expression::True => Some(Value::Bool(true)),
        Expression::False => Some(Value::Bool(false)),
        Expression::Numeral(n) => Some(Value::Int(*n)),
        Expression::Variable { var_type, .. } => match assignment.get(expression) {
            Some(value) => Some(*value),
            None if complete => Some(match var_type {
                ExpressionType::Bool => Value::Bool(false),
                ExpressionType::Integer => Value::Int(0),
            }),
            None => None,
        },
        Expression::Add { left, right } => Some(Value::Int(int(left)?.saturating_add(int(right)?))),
        Expression::Sub { left, right } => Some(Value::Int(int(left)?.saturating_sub(int(right)?))),
        Expression::Mul { left, right } => Some(Value::Int(int(left)?.saturating_mul(int(right)?))),
        Expression::Neg { operand } => Some(Value::Int(int(operand)?.saturating_neg())),
        Expression::Equals { left, right } => {
            let l = evaluate(left, assignment, complete)?;
            let r = evaluate(right, assignment, complete)?;
            Some(Value::Bool(l == r))
        }
        Expression::Ne { left, right } => {
            let l = evaluate(left, assignment, complete)?;
            let r = evaluate(right, assignment, complete)?;
            Some(Value::Bool(l != r))
        }
        Expression::LessThan { left, right } => compare(left, right, |l, r| l < r),
        Expression::LessOrEqual { left, right } => compare(left, right, |l, r| l <= r),
        Expression::GreaterThan { left, right } => compare(left, right, |l, r| l > r),
        Expression::GreaterOrEqual { left, right } => compare(left, right, |l, r| l >= r),
        Expression::And { left, right } => match (boolean(left), boolean(right)) {
            (Some(false), _) | (_, Some(false)) => Some(Value::Bool(false)),
            (Some(true), Some(true)) => Some(Value::Bool(true)),
            _ => None,
        },
        Expression::Or { left, right } => match (boolean(left), boolean(right)) {
            (Some(true), _) | (_, Some(true)) => Some(Value::Bool(true)),
            (Some(false), Some(false)) => Some(Value::Bool(false)),
            _ => None,
        },
        Expression::LogicalNot { operand } => Some(Value::Bool(!boolean(operand)?)),
    }
}

impl SmtSolver<Rc<Expression>> for BoundedSolver {
    fn as_debug_string(&self, expression: &Rc<Expression>) -> String {
        expression.to_string()
    }

    fn assert(&self, expression: &Rc<Expression>) {
        if let Some(scope) = self.scopes.borrow_mut().last_mut() {
            scope.push(expression.clone());
        }
    }

    fn backtrack(&self) {
        let mut scopes = self.scopes.borrow_mut();
        if scopes.len() > 1 {
            scopes.pop();
        }
    }

    fn get_as_smt_predicate(&self, expression: &Expression) -> Rc<Expression> {
        Rc::new(expression.clone())
    }

    fn get_model_bool(&self, expression: &Rc<Expression>) -> Option<bool> {
        let model = self.model.borrow();
        match evaluate(expression, model.as_ref()?, true) {
            Some(Value::Bool(b)) => Some(b),
            _ => None,
        }
    }

    fn get_model_as_string(&self) -> String {
        match self.model.borrow().as_ref() {
            Some(model) => model
                .iter()
                .map(|(variable, value)| match value {
                    Value::Bool(b) => format!("{} -> {}", variable, b),
                    Value::Int(i) => format!("{} -> {}", variable, i),
                })
                .join("\n"),
            None => String::from("no model"),
        }
    }

    fn get_solver_state_as_string(&self) -> String {
        self.scopes
            .borrow()
            .iter()
            .flatten()
            .map(|e| format!("(assert {})", e))
            .join("\n")
    }

    fn invert_predicate(&self, expression: &Rc<Expression>) -> Rc<Expression> {
        expression.logical_not()
    }

    fn set_backtrack_position(&self) {
        self.scopes.borrow_mut().push(Vec::new());
    }

    #[logfn_inputs(TRACE)]
    fn solve(&self) -> SmtResult {
        let conjuncts: Vec<Rc<Expression>> = self
            .scopes
            .borrow()
            .iter()
            .flatten()
            .flat_map(|e| e.conjuncts())
            .collect();
        let (conjuncts, definitions) = eliminate_definitions(conjuncts);
        let query = Query::new(conjuncts);
        self.steps.set(0);
        self.cut_off.set(false);
        let mut assignment = Assignment::new();
        let result = self.search(&query, &mut assignment);
        trace!("bounded search took {} steps", self.steps.get());
        match result {
            Some(true) => {
                for (variable, term) in definitions.iter().rev() {
                    if let Some(value) = evaluate(term, &assignment, true) {
                        assignment.insert(variable.clone(), value);
                    }
                }
                *self.model.borrow_mut() = Some(assignment);
                SmtResult::Satisfiable
            }
            Some(false) if !self.cut_off.get() => {
                *self.model.borrow_mut() = None;
                SmtResult::Unsatisfiable
            }
            Some(false) => {
                debug!(
                    "no model with free integers in [-{0}, {0}], giving up",
                    self.range
                );
                *self.model.borrow_mut() = None;
                SmtResult::Undefined
            }
            None => {
                *self.model.borrow_mut() = None;
                SmtResult::Undefined
            }
        }
    }
}
