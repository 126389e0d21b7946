// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.
//

use crate::expression::{Expression, ExpressionType};
use crate::smt_solver::SmtResult;
use crate::smt_solver::SmtSolver;

use lazy_static::lazy_static;
use log_derive::*;
use std::ffi::{CStr, CString};
use std::fmt::{Debug, Formatter, Result};
use std::sync::Mutex;

pub type Z3ExpressionType = z3_sys::Z3_ast;

lazy_static! {
    static ref Z3_MUTEX: Mutex<()> = Mutex::new(());
}

pub struct Z3Solver {
    z3_context: z3_sys::Z3_context,
    z3_solver: z3_sys::Z3_solver,
    bool_sort: z3_sys::Z3_sort,
    int_sort: z3_sys::Z3_sort,
}

impl Debug for Z3Solver {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        "Z3Solver".fmt(f)
    }
}

fn c_string(s: &str) -> CString {
    CString::new(s).unwrap_or_default()
}

impl Z3Solver {
    #[logfn_inputs(TRACE)]
    pub fn new() -> Z3Solver {
        unsafe {
            let _guard = Z3_MUTEX.lock().unwrap();
            let z3_sys_cfg = z3_sys::Z3_mk_config();
            let time_out = c_string("timeout").into_raw();
            let ms = c_string("100").into_raw();
            z3_sys::Z3_set_param_value(z3_sys_cfg, time_out, ms);

            let z3_context = z3_sys::Z3_mk_context(z3_sys_cfg);
            let z3_solver = z3_sys::Z3_mk_solver(z3_context);
            let bool_sort = z3_sys::Z3_mk_bool_sort(z3_context);
            let int_sort = z3_sys::Z3_mk_int_sort(z3_context);

            Z3Solver {
                z3_context,
                z3_solver,
                bool_sort,
                int_sort,
            }
        }
    }
}

impl Default for Z3Solver {
    #[logfn_inputs(TRACE)]
    fn default() -> Self {
        Z3Solver::new()
    }
}

impl SmtSolver<Z3ExpressionType> for Z3Solver {
    #[logfn_inputs(TRACE)]
    fn as_debug_string(&self, expression: &Z3ExpressionType) -> String {
        let _guard = Z3_MUTEX.lock().unwrap();
        unsafe { self.to_string_helper(z3_sys::Z3_ast_to_string(self.z3_context, *expression)) }
    }

    #[logfn_inputs(TRACE)]
    fn assert(&self, expression: &Z3ExpressionType) {
        let _guard = Z3_MUTEX.lock().unwrap();
        unsafe {
            z3_sys::Z3_solver_assert(self.z3_context, self.z3_solver, *expression);
        }
    }

    #[logfn_inputs(TRACE)]
    fn backtrack(&self) {
        let _guard = Z3_MUTEX.lock().unwrap();
        unsafe {
            z3_sys::Z3_solver_pop(self.z3_context, self.z3_solver, 1);
        }
    }

    #[logfn_inputs(TRACE)]
    fn get_as_smt_predicate(&self, expression: &Expression) -> Z3ExpressionType {
        let _guard = Z3_MUTEX.lock().unwrap();
        self.get_as_z3_ast(expression)
    }

    #[logfn_inputs(TRACE)]
    fn get_model_bool(&self, expression: &Z3ExpressionType) -> Option<bool> {
        let _guard = Z3_MUTEX.lock().unwrap();
        unsafe {
            let model = z3_sys::Z3_solver_get_model(self.z3_context, self.z3_solver);
            if model.is_null() {
                return None;
            }
            let mut value = std::ptr::null_mut();
            if !z3_sys::Z3_model_eval(self.z3_context, model, *expression, true, &mut value) {
                return None;
            }
            match z3_sys::Z3_get_bool_value(self.z3_context, value) {
                z3_sys::Z3_L_TRUE => Some(true),
                z3_sys::Z3_L_FALSE => Some(false),
                _ => None,
            }
        }
    }

    #[logfn_inputs(TRACE)]
    fn get_model_as_string(&self) -> String {
        let _guard = Z3_MUTEX.lock().unwrap();
        unsafe {
            let model = z3_sys::Z3_solver_get_model(self.z3_context, self.z3_solver);
            self.to_string_helper(z3_sys::Z3_model_to_string(self.z3_context, model))
        }
    }

    #[logfn_inputs(TRACE)]
    fn get_solver_state_as_string(&self) -> String {
        let _guard = Z3_MUTEX.lock().unwrap();
        unsafe {
            self.to_string_helper(z3_sys::Z3_solver_to_string(
                self.z3_context,
                self.z3_solver,
            ))
        }
    }

    #[logfn_inputs(TRACE)]
    fn invert_predicate(&self, expression: &Z3ExpressionType) -> Z3ExpressionType {
        unsafe { z3_sys::Z3_mk_not(self.z3_context, *expression) }
    }

    #[logfn_inputs(TRACE)]
    fn set_backtrack_position(&self) {
        let _guard = Z3_MUTEX.lock().unwrap();
        unsafe {
            z3_sys::Z3_solver_push(self.z3_context, self.z3_solver);
        }
    }

    #[logfn_inputs(TRACE)]
    fn solve(&self) -> SmtResult {
        let _guard = Z3_MUTEX.lock().unwrap();
        unsafe {
            match z3_sys::Z3_solver_check(self.z3_context, self.z3_solver) {
                z3_sys::Z3_L_TRUE => SmtResult::Satisfiable,
                z3_sys::Z3_L_FALSE => SmtResult::Unsatisfiable,
                _ => SmtResult::Undefined,
            }
        }
    }
}

impl Z3Solver {
    unsafe fn to_string_helper(&self, debug_str_bytes: z3_sys::Z3_string) -> String {
        CStr::from_ptr(debug_str_bytes)
            .to_string_lossy()
            .into_owned()
    }

    fn get_as_z3_ast(&self, expression: &Expression) -> z3_sys::Z3_ast {
        use self::Expression::*;
        unsafe {
            match expression {
                True => z3_sys::Z3_mk_true(self.z3_context),
                False => z3_sys::Z3_mk_false(self.z3_context),
                Numeral(value) => {
                    let numeral = c_string(&value.to_string());
                    z3_sys::Z3_mk_numeral(self.z3_context, numeral.as_ptr(), self.int_sort)
                }
                Variable { var_type, .. } => {
                    let sort = match var_type {
                        ExpressionType::Bool => self.bool_sort,
                        ExpressionType::Integer => self.int_sort,
                    };
                    let name = c_string(&expression.to_string());
                    let symbol = z3_sys::Z3_mk_string_symbol(self.z3_context, name.as_ptr());
                    z3_sys::Z3_mk_const(self.z3_context, symbol, sort)
                }
                Add { left, right } => self.nary(z3_sys::Z3_mk_add, left, right),
                Sub { left, right } => self.nary(z3_sys::Z3_mk_sub, left, right),
                Mul { left, right } => self.nary(z3_sys::Z3_mk_mul, left, right),
                And { left, right } => self.nary(z3_sys::Z3_mk_and, left, right),
                Or { left, right } => self.nary(z3_sys::Z3_mk_or, left, right),
                Neg { operand } => {
                    z3_sys::Z3_mk_unary_minus(self.z3_context, self.get_as_z3_ast(operand))
                }
                LogicalNot { operand } => {
                    z3_sys::Z3_mk_not(self.z3_context, self.get_as_z3_ast(operand))
                }
                Equals { left, right } => self.binary(z3_sys::Z3_mk_eq, left, right),
                Ne { left, right } => z3_sys::Z3_mk_not(
                    self.z3_context,
                    self.binary(z3_sys::Z3_mk_eq, left, right),
                ),
                LessThan { left, right } => self.binary(z3_sys::Z3_mk_lt, left, right),
                LessOrEqual { left, right } => self.binary(z3_sys::Z3_mk_le, left, right),
                GreaterThan { left, right } => self.binary(z3_sys::Z3_mk_gt, left, right),
                GreaterOrEqual { left, right } => self.binary(z3_sys::Z3_mk_ge, left, right),
            }
        }
    }

    fn binary(
        &self,
        make: unsafe extern "C" fn(
            z3_sys::Z3_context,
            z3_sys::Z3_ast,
            z3_sys::Z3_ast,
        ) -> z3_sys::Z3_ast,
        left: &Expression,
        right: &Expression,
    ) -> z3_sys::Z3_ast {
        let left_ast = self.get_as_z3_ast(left);
        let right_ast = self.get_as_z3_ast(right);
        unsafe { make(self.z3_context, left_ast, right_ast) }
    }

    fn nary(
        &self,
        make: unsafe extern "C" fn(
            z3_sys::Z3_context,
            ::std::os::raw::c_uint,
            *const z3_sys::Z3_ast,
        ) -> z3_sys::Z3_ast,
        left: &Expression,
        right: &Expression,
    ) -> z3_sys::Z3_ast {
        let operands = [self.get_as_z3_ast(left), self.get_as_z3_ast(right)];
        unsafe { make(self.z3_context, 2, operands.as_ptr()) }
    }
}
