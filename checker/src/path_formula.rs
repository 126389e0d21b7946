// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

use crate::expression::{Expression, ExpressionTrait, ExpressionType};

use rpds::RedBlackTreeMap;
use std::fmt::{Debug, Formatter, Result};
use std::hash::{Hash, Hasher};
use std::rc::Rc;

/// Maps every variable written on a path to the index of its most recent write.
/// Variables that have not been written have index 0.
#[derive(Clone, Default, Eq, PartialEq)]
pub struct SsaMap {
    indices: RedBlackTreeMap<Rc<str>, (u32, ExpressionType)>,
}

impl Debug for SsaMap {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        f.debug_map()
            .entries(self.indices.iter().map(|(k, (i, _))| (k, i)))
            .finish()
    }
}

impl Hash for SsaMap {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.indices.size().hash(state);
        for (name, (index, _)) in self.indices.iter() {
            name.hash(state);
            index.hash(state);
        }
    }
}

impl SsaMap {
    /// The index of the latest write to `name`.
    pub fn index_of(&self, name: &str) -> u32 {
        self.indices.get(name).map(|(i, _)| *i).unwrap_or(0)
    }

    /// Returns a map where `name` has a new index, along with the new index.
    #[must_use]
    pub fn with_fresh_index(&self, name: &Rc<str>, var_type: ExpressionType) -> (SsaMap, u32) {
        let index = self.index_of(name) + 1;
        let indices = self.indices.insert(name.clone(), (index, var_type));
        (SsaMap { indices }, index)
    }

    /// Iterates over (name, index, sort) triples in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&Rc<str>, u32, ExpressionType)> {
        self.indices.iter().map(|(n, (i, t))| (n, *i, *t))
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// A symbolic formula for the transitions since the last abstraction together with the SSA map
/// that holds after those transitions.
#[derive(Clone, Eq, PartialEq, Hash)]
pub struct PathFormula {
    formula: Rc<Expression>,
    ssa: SsaMap,
}

impl Debug for PathFormula {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        write!(f, "{} {:?}", self.formula, self.ssa)
    }
}

impl PathFormula {
    pub fn new(formula: Rc<Expression>, ssa: SsaMap) -> PathFormula {
        PathFormula { formula, ssa }
    }

    /// The formula `true`, continuing the variable numbering of `ssa`.
    pub fn empty(ssa: SsaMap) -> PathFormula {
        PathFormula {
            formula: Expression::make_true(),
            ssa,
        }
    }

    pub fn formula(&self) -> &Rc<Expression> {
        &self.formula
    }

    pub fn ssa(&self) -> &SsaMap {
        &self.ssa
    }

    /// Conjoins `expression`, which must already be instantiated, and installs `ssa`.
    #[must_use]
    pub fn conjoin(&self, expression: Rc<Expression>, ssa: SsaMap) -> PathFormula {
        PathFormula {
            formula: self.formula.and(expression),
            ssa,
        }
    }

    /// Disjoins two path formulas. When a variable has different indices in the two maps, the
    /// result uses the larger one and the disjunct with the smaller index is extended with an
    /// equality that carries the old value over to the new index.
    #[must_use]
    pub fn or(&self, other: &PathFormula) -> PathFormula {
        let mut left_equalities = Vec::new();
        let mut right_equalities = Vec::new();
        let mut ssa = self.ssa.clone();
        for (name, other_index, var_type) in other.ssa.iter() {
            let self_index = self.ssa.index_of(name);
            if self_index < other_index {
                left_equalities.push(Self::equate(name, var_type, other_index, self_index));
                ssa.indices.insert_mut(name.clone(), (other_index, var_type));
            } else if other_index < self_index {
                right_equalities.push(Self::equate(name, var_type, self_index, other_index));
            }
        }
        for (name, self_index, var_type) in self.ssa.iter() {
            if other.ssa.indices.get(name.as_ref()).is_none() && self_index > 0 {
                right_equalities.push(Self::equate(name, var_type, self_index, 0));
            }
        }
        let left = Expression::conjunction(
            std::iter::once(self.formula.clone()).chain(left_equalities),
        );
        let right = Expression::conjunction(
            std::iter::once(other.formula.clone()).chain(right_equalities),
        );
        PathFormula {
            formula: left.or(right),
            ssa,
        }
    }

    fn equate(name: &Rc<str>, var_type: ExpressionType, high: u32, low: u32) -> Rc<Expression> {
        Expression::indexed_variable(name, var_type, high).equals(Expression::indexed_variable(
            name, var_type, low,
        ))
    }
}
