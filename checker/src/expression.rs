// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

use crate::path_formula::SsaMap;

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt::{Debug, Display, Formatter, Result};
use std::rc::Rc;

/// The name prefix of the boolean variables that record which branch of an assume edge was taken.
pub const PROGRAM_COUNTER_PREFIX: &str = "__pc_";

/// The sort of a variable or of the value of an expression.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum ExpressionType {
    Bool,
    Integer,
}

/// A term of the formula language. Program statements on CFA edges use variables without an
/// SSA index. Path formulas use the same variables with the index of the write they refer to.
#[derive(Serialize, Deserialize, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum Expression {
    True,

    False,

    /// An integer literal.
    Numeral(i128),

    /// A program variable. `index` is None in statements and predicates and Some(i) in path formulas.
    Variable {
        name: Rc<str>,
        var_type: ExpressionType,
        index: Option<u32>,
    },

    /// left + right
    Add {
        left: Rc<Expression>,
        right: Rc<Expression>,
    },

    /// left - right
    Sub {
        left: Rc<Expression>,
        right: Rc<Expression>,
    },

    /// left * right
    Mul {
        left: Rc<Expression>,
        right: Rc<Expression>,
    },

    /// -operand
    Neg { operand: Rc<Expression> },

    /// left == right
    Equals {
        left: Rc<Expression>,
        right: Rc<Expression>,
    },

    /// left != right
    Ne {
        left: Rc<Expression>,
        right: Rc<Expression>,
    },

    /// left < right
    LessThan {
        left: Rc<Expression>,
        right: Rc<Expression>,
    },

    /// left <= right
    LessOrEqual {
        left: Rc<Expression>,
        right: Rc<Expression>,
    },

    /// left > right
    GreaterThan {
        left: Rc<Expression>,
        right: Rc<Expression>,
    },

    /// left >= right
    GreaterOrEqual {
        left: Rc<Expression>,
        right: Rc<Expression>,
    },

    /// left && right
    And {
        left: Rc<Expression>,
        right: Rc<Expression>,
    },

    /// left || right
    Or {
        left: Rc<Expression>,
        right: Rc<Expression>,
    },

    /// !operand
    LogicalNot { operand: Rc<Expression> },
}

impl Debug for Expression {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        Display::fmt(self, f)
    }
}

impl Display for Expression {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        match self {
            Expression::True => f.write_str("true"),
            Expression::False => f.write_str("false"),
            Expression::Numeral(n) => write!(f, "{}", n),
            Expression::Variable {
                name,
                index: Some(index),
                ..
            } => write!(f, "{}@{}", name, index),
            Expression::Variable { name, .. } => f.write_str(name),
            Expression::Add { left, right } => write!(f, "({} + {})", left, right),
            Expression::Sub { left, right } => write!(f, "({} - {})", left, right),
            Expression::Mul { left, right } => write!(f, "({} * {})", left, right),
            Expression::Neg { operand } => write!(f, "-{}", operand),
            Expression::Equals { left, right } => write!(f, "({} == {})", left, right),
            Expression::Ne { left, right } => write!(f, "({} != {})", left, right),
            Expression::LessThan { left, right } => write!(f, "({} < {})", left, right),
            Expression::LessOrEqual { left, right } => write!(f, "({} <= {})", left, right),
            Expression::GreaterThan { left, right } => write!(f, "({} > {})", left, right),
            Expression::GreaterOrEqual { left, right } => write!(f, "({} >= {})", left, right),
            Expression::And { left, right } => write!(f, "({} && {})", left, right),
            Expression::Or { left, right } => write!(f, "({} || {})", left, right),
            Expression::LogicalNot { operand } => write!(f, "!{}", operand),
        }
    }
}

/// Constructors
impl Expression {
    pub fn make_true() -> Rc<Expression> {
        Rc::new(Expression::True)
    }

    pub fn make_false() -> Rc<Expression> {
        Rc::new(Expression::False)
    }

    pub fn numeral(value: i128) -> Rc<Expression> {
        Rc::new(Expression::Numeral(value))
    }

    pub fn int_variable(name: &str) -> Rc<Expression> {
        Rc::new(Expression::Variable {
            name: Rc::from(name),
            var_type: ExpressionType::Integer,
            index: None,
        })
    }

    pub fn bool_variable(name: &str) -> Rc<Expression> {
        Rc::new(Expression::Variable {
            name: Rc::from(name),
            var_type: ExpressionType::Bool,
            index: None,
        })
    }

    /// The indexed variable with the given name, sort and SSA index.
    pub fn indexed_variable(name: &Rc<str>, var_type: ExpressionType, index: u32) -> Rc<Expression> {
        Rc::new(Expression::Variable {
            name: name.clone(),
            var_type,
            index: Some(index),
        })
    }

    /// The name of the program-counter variable of the given CFA location.
    pub fn program_counter_name(location: usize) -> Rc<str> {
        Rc::from(format!("{}{}", PROGRAM_COUNTER_PREFIX, location))
    }

    /// Conjoins all of the given expressions. The empty conjunction is true.
    pub fn conjunction<I: IntoIterator<Item = Rc<Expression>>>(operands: I) -> Rc<Expression> {
        operands
            .into_iter()
            .fold(Expression::make_true(), |acc, e| acc.and(e))
    }

    /// Disjoins all of the given expressions. The empty disjunction is false.
    pub fn disjunction<I: IntoIterator<Item = Rc<Expression>>>(operands: I) -> Rc<Expression> {
        operands
            .into_iter()
            .fold(Expression::make_false(), |acc, e| acc.or(e))
    }

    /// Returns the sort of the value of this expression.
    pub fn infer_type(&self) -> ExpressionType {
        match self {
            Expression::Numeral(..)
            | Expression::Add { .. }
            | Expression::Sub { .. }
            | Expression::Mul { .. }
            | Expression::Neg { .. } => ExpressionType::Integer,
            Expression::Variable { var_type, .. } => *var_type,
            _ => ExpressionType::Bool,
        }
    }

    /// True if this is a comparison or a boolean variable, i.e. something with no boolean structure.
    pub fn is_atom(&self) -> bool {
        match self {
            Expression::Equals { .. }
            | Expression::Ne { .. }
            | Expression::LessThan { .. }
            | Expression::LessOrEqual { .. }
            | Expression::GreaterThan { .. }
            | Expression::GreaterOrEqual { .. } => true,
            Expression::Variable { var_type, .. } => *var_type == ExpressionType::Bool,
            _ => false,
        }
    }

    /// True if this is a program-counter variable.
    pub fn is_program_counter(&self) -> bool {
        matches!(self, Expression::Variable { name, .. } if name.starts_with(PROGRAM_COUNTER_PREFIX))
    }
}

/// Operations on shared expressions. Constructors simplify constant operands away.
pub trait ExpressionTrait: Sized {
    fn and(&self, other: Rc<Expression>) -> Rc<Expression>;
    fn or(&self, other: Rc<Expression>) -> Rc<Expression>;
    fn logical_not(&self) -> Rc<Expression>;
    fn implies(&self, other: Rc<Expression>) -> Rc<Expression>;
    fn equals(&self, other: Rc<Expression>) -> Rc<Expression>;
    fn not_equals(&self, other: Rc<Expression>) -> Rc<Expression>;
    fn less_than(&self, other: Rc<Expression>) -> Rc<Expression>;
    fn less_or_equal(&self, other: Rc<Expression>) -> Rc<Expression>;
    fn greater_than(&self, other: Rc<Expression>) -> Rc<Expression>;
    fn greater_or_equal(&self, other: Rc<Expression>) -> Rc<Expression>;
    fn addition(&self, other: Rc<Expression>) -> Rc<Expression>;
    fn subtract(&self, other: Rc<Expression>) -> Rc<Expression>;
    fn multiply(&self, other: Rc<Expression>) -> Rc<Expression>;
    fn negate(&self) -> Rc<Expression>;
    fn as_bool_if_known(&self) -> Option<bool>;
    fn instantiate(&self, ssa: &SsaMap) -> Rc<Expression>;
    fn uninstantiate(&self) -> Rc<Expression>;
    fn variables(&self) -> BTreeSet<Rc<Expression>>;
    fn atoms(&self) -> Vec<Rc<Expression>>;
    fn normalized_atom(&self) -> Rc<Expression>;
    fn conjuncts(&self) -> Vec<Rc<Expression>>;
    fn substitute(
        &self,
        variable: &Rc<Expression>,
        replacement: &Rc<Expression>,
    ) -> Rc<Expression>;
}

impl ExpressionTrait for Rc<Expression> {
    fn and(&self, other: Rc<Expression>) -> Rc<Expression> {
        match (self.as_bool_if_known(), other.as_bool_if_known()) {
            (Some(false), _) | (_, Some(false)) => Expression::make_false(),
            (Some(true), _) => other,
            (_, Some(true)) => self.clone(),
            _ if *self == other => other,
            _ => Rc::new(Expression::And {
                left: self.clone(),
                right: other,
            }),
        }
    }

    fn or(&self, other: Rc<Expression>) -> Rc<Expression> {
        match (self.as_bool_if_known(), other.as_bool_if_known()) {
            (Some(true), _) | (_, Some(true)) => Expression::make_true(),
            (Some(false), _) => other,
            (_, Some(false)) => self.clone(),
            _ if *self == other => other,
            _ => Rc::new(Expression::Or {
                left: self.clone(),
                right: other,
            }),
        }
    }

    fn logical_not(&self) -> Rc<Expression> {
        match self.as_ref() {
            Expression::True => Expression::make_false(),
            Expression::False => Expression::make_true(),
            Expression::LogicalNot { operand } => operand.clone(),
            _ => Rc::new(Expression::LogicalNot {
                operand: self.clone(),
            }),
        }
    }

    fn implies(&self, other: Rc<Expression>) -> Rc<Expression> {
        self.logical_not().or(other)
    }

    fn equals(&self, other: Rc<Expression>) -> Rc<Expression> {
        Rc::new(Expression::Equals {
            left: self.clone(),
            right: other,
        })
    }

    fn not_equals(&self, other: Rc<Expression>) -> Rc<Expression> {
        Rc::new(Expression::Ne {
            left: self.clone(),
            right: other,
        })
    }

    fn less_than(&self, other: Rc<Expression>) -> Rc<Expression> {
        Rc::new(Expression::LessThan {
            left: self.clone(),
            right: other,
        })
    }

    fn less_or_equal(&self, other: Rc<Expression>) -> Rc<Expression> {
        Rc::new(Expression::LessOrEqual {
            left: self.clone(),
            right: other,
        })
    }

    fn greater_than(&self, other: Rc<Expression>) -> Rc<Expression> {
        Rc::new(Expression::GreaterThan {
            left: self.clone(),
            right: other,
        })
    }

    fn greater_or_equal(&self, other: Rc<Expression>) -> Rc<Expression> {
        Rc::new(Expression::GreaterOrEqual {
            left: self.clone(),
            right: other,
        })
    }

    fn addition(&self, other: Rc<Expression>) -> Rc<Expression> {
        Rc::new(Expression::Add {
            left: self.clone(),
            right: other,
        })
    }

    fn subtract(&self, other: Rc<Expression>) -> Rc<Expression> {
        Rc::new(Expression::Sub {
            left: self.clone(),
            right: other,
        })
    }

    fn multiply(&self, other: Rc<Expression>) -> Rc<Expression> {
        Rc::new(Expression::Mul {
            left: self.clone(),
            right: other,
        })
    }

    fn negate(&self) -> Rc<Expression> {
        Rc::new(Expression::Neg {
            operand: self.clone(),
        })
    }

    fn as_bool_if_known(&self) -> Option<bool> {
        match self.as_ref() {
            Expression::True => Some(true),
            Expression::False => Some(false),
            _ => None,
        }
    }

    /// Replaces every un-indexed variable with its current version in `ssa`.
    /// Variables that already carry an index are left alone.
    fn instantiate(&self, ssa: &SsaMap) -> Rc<Expression> {
        self.rebuild(&|e| match e {
            Expression::Variable {
                name,
                var_type,
                index: None,
            } => Some(Expression::indexed_variable(
                name,
                *var_type,
                ssa.index_of(name),
            )),
            _ => None,
        })
    }

    /// Strips the SSA index from every variable.
    fn uninstantiate(&self) -> Rc<Expression> {
        self.rebuild(&|e| match e {
            Expression::Variable {
                name,
                var_type,
                index: Some(..),
            } => Some(Rc::new(Expression::Variable {
                name: name.clone(),
                var_type: *var_type,
                index: None,
            })),
            _ => None,
        })
    }

    /// The set of variables (with their indices) that occur in this expression.
    fn variables(&self) -> BTreeSet<Rc<Expression>> {
        let mut result = BTreeSet::new();
        self.visit(&mut |e| {
            if let Expression::Variable { .. } = e.as_ref() {
                result.insert(e.clone());
            }
        });
        result
    }

    /// The atoms of this expression, without duplicates, in order of first occurrence.
    fn atoms(&self) -> Vec<Rc<Expression>> {
        let mut result = Vec::new();
        self.visit(&mut |e| {
            if e.is_atom() {
                result.push(e.clone());
            }
        });
        result.into_iter().unique().collect()
    }

    /// Strips negations and rewrites the comparison into one of ==, < and <=, so that
    /// an atom and its negation turn into the same predicate.
    fn normalized_atom(&self) -> Rc<Expression> {
        match self.as_ref() {
            Expression::LogicalNot { operand } => operand.normalized_atom(),
            Expression::Ne { left, right } => left.equals(right.clone()),
            Expression::GreaterThan { left, right } => right.less_than(left.clone()),
            Expression::GreaterOrEqual { left, right } => right.less_or_equal(left.clone()),
            _ => self.clone(),
        }
    }

    /// The operands of the top level conjunction of this expression.
    fn conjuncts(&self) -> Vec<Rc<Expression>> {
        let mut result = Vec::new();
        let mut pending = vec![self.clone()];
        while let Some(e) = pending.pop() {
            match e.as_ref() {
                Expression::And { left, right } => {
                    pending.push(right.clone());
                    pending.push(left.clone());
                }
                Expression::True => {}
                _ => result.push(e),
            }
        }
        result
    }

    /// Replaces every occurrence of `variable` with `replacement`.
    fn substitute(
        &self,
        variable: &Rc<Expression>,
        replacement: &Rc<Expression>,
    ) -> Rc<Expression> {
        self.rebuild(&|e| {
            if e == variable.as_ref() {
                Some(replacement.clone())
            } else {
                None
            }
        })
    }
}

/// Traversal helpers
trait ExpressionTraversal {
    fn rebuild(&self, replace: &dyn Fn(&Expression) -> Option<Rc<Expression>>) -> Rc<Expression>;
    fn visit(&self, visitor: &mut dyn FnMut(&Rc<Expression>));
}

impl ExpressionTraversal for Rc<Expression> {
    fn rebuild(&self, replace: &dyn Fn(&Expression) -> Option<Rc<Expression>>) -> Rc<Expression> {
        if let Some(replacement) = replace(self) {
            return replacement;
        }
        let binary = |left: &Rc<Expression>,
                      right: &Rc<Expression>,
                      make: fn(Rc<Expression>, Rc<Expression>) -> Expression| {
            Rc::new(make(left.rebuild(replace), right.rebuild(replace)))
        };
        match self.as_ref() {
            Expression::True
            | Expression::False
            | Expression::Numeral(..)
            | Expression::Variable { .. } => self.clone(),
            Expression::Add { left, right } => {
                binary(left, right, |left, right| Expression::Add { left, right })
            }
            Expression::Sub { left, right } => {
                binary(left, right, |left, right| Expression::Sub { left, right })
            }
            Expression::Mul { left, right } => {
                binary(left, right, |left, right| Expression::Mul { left, right })
            }
            Expression::Neg { operand } => Rc::new(Expression::Neg {
                operand: operand.rebuild(replace),
            }),
            Expression::Equals { left, right } => {
                binary(left, right, |left, right| Expression::Equals { left, right })
            }
            Expression::Ne { left, right } => {
                binary(left, right, |left, right| Expression::Ne { left, right })
            }
            Expression::LessThan { left, right } => {
                binary(left, right, |left, right| Expression::LessThan { left, right })
            }
            Expression::LessOrEqual { left, right } => {
                binary(left, right, |left, right| Expression::LessOrEqual {
                    left,
                    right,
                })
            }
            Expression::GreaterThan { left, right } => {
                binary(left, right, |left, right| Expression::GreaterThan {
                    left,
                    right,
                })
            }
            Expression::GreaterOrEqual { left, right } => {
                binary(left, right, |left, right| Expression::GreaterOrEqual {
                    left,
                    right,
                })
            }
            Expression::And { left, right } => {
                binary(left, right, |left, right| Expression::And { left, right })
            }
            Expression::Or { left, right } => {
                binary(left, right, |left, right| Expression::Or { left, right })
            }
            Expression::LogicalNot { operand } => Rc::new(Expression::LogicalNot {
                operand: operand.rebuild(replace),
            }),
        }
    }

    fn visit(&self, visitor: &mut dyn FnMut(&Rc<Expression>)) {
        visitor(self);
        match self.as_ref() {
            Expression::True
            | Expression::False
            | Expression::Numeral(..)
            | Expression::Variable { .. } => {}
            Expression::Neg { operand } | Expression::LogicalNot { operand } => {
                operand.visit(visitor)
            }
            Expression::Add { left, right }
            | Expression::Sub { left, right }
            | Expression::Mul { left, right }
            | Expression::Equals { left, right }
            | Expression::Ne { left, right }
            | Expression::LessThan { left, right }
            | Expression::LessOrEqual { left, right }
            | Expression::GreaterThan { left, right }
            | Expression::GreaterOrEqual { left, right }
            | Expression::And { left, right }
            | Expression::Or { left, right } => {
                left.visit(visitor);
                right.visit(visitor);
            }
        }
    }
}
