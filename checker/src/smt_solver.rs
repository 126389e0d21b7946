// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

use crate::expression::Expression;

use mirai_annotations::{get_model_field, precondition, set_model_field};
use serde::{Deserialize, Serialize};

/// The answer to a satisfiability query.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum SmtResult {
    /// A model exists and can be read back with get_model_bool.
    Satisfiable,
    /// No model exists.
    Unsatisfiable,
    /// The solver could not decide the query, because it ran out of time or steps or because
    /// its search was incomplete. The formula manager falls back to a conservative answer.
    Undefined,
}

/// A solver that path formulas, abstractions and counterexample traces are checked with.
/// Queries are formed by asserting formulas into a stack of scopes. The formula manager opens a
/// scope for every query and closes it afterwards, so that the solver holds no state between
/// operations.
pub trait SmtSolver<E> {
    /// A printable form of `expression`, for logging.
    fn as_debug_string(&self, expression: &E) -> String;

    /// Conjoins `expression` to the innermost scope.
    fn assert(&self, expression: &E);

    /// Drops the innermost scope and everything asserted into it.
    fn backtrack(&self) {
        precondition!(get_model_field!(&self, number_of_backtracks, 0) > 0);
    }

    /// Translates a formula with SSA indexed variables into the solver's own terms.
    fn get_as_smt_predicate(&self, expression: &Expression) -> E;

    /// The value the last model gives to a boolean term, with variables the model does not
    /// mention completed arbitrarily. Only meaningful after solve returned Satisfiable.
    fn get_model_bool(&self, expression: &E) -> Option<bool>;

    /// The last model, one variable per line. Only meaningful after solve returned Satisfiable.
    fn get_model_as_string(&self) -> String;

    /// Everything asserted in the open scopes.
    fn get_solver_state_as_string(&self) -> String;

    /// The negation of `expression`.
    fn invert_predicate(&self, expression: &E) -> E;

    /// Opens a scope. A matching backtrack restores the assertions to what they are now.
    fn set_backtrack_position(&self) {
        precondition!(get_model_field!(&self, number_of_backtracks, 0) < 1000);
        set_model_field!(
            &self,
            number_of_backtracks,
            get_model_field!(&self, number_of_backtracks, 0) + 1
        );
    }

    /// Decides the conjunction of everything asserted in the open scopes.
    fn solve(&self) -> SmtResult;

    /// Decides `expression` together with the open scopes, leaving the scopes as they were.
    fn solve_expression(&self, expression: &E) -> SmtResult {
        self.set_backtrack_position();
        self.assert(expression);
        let result = self.solve();
        self.backtrack();
        result
    }
}
