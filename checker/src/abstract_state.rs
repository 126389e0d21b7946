// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

use crate::cfa::Location;
use crate::expression::Expression;
use crate::path_formula::{PathFormula, SsaMap};

use mirai_annotations::*;
use std::fmt::{Debug, Formatter, Result};
use std::hash::{Hash, Hasher};
use std::rc::Rc;

/// Identifies an abstraction state. Ids are handed out in creation order and never reused.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct AbstractionId(usize);

impl AbstractionId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// A state at which the path formula has been summarized by a boolean combination of predicates.
#[derive(Clone)]
pub struct AbstractionState {
    pub id: AbstractionId,
    pub location: Location,
    /// The abstraction, over predicates without SSA indices.
    pub abstraction: Rc<Expression>,
    /// The path formula of the block that ends here, kept to rebuild counterexamples.
    pub formula_before_abstraction: PathFormula,
    /// The abstraction state that starts the block ending here. None only for initial states.
    pub previous: Option<AbstractionId>,
}

impl Debug for AbstractionState {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        write!(
            f,
            "A{}@{:?}: {}",
            self.id.0,
            self.location.index(),
            self.abstraction
        )
    }
}

impl AbstractionState {
    /// The SSA map that instantiates the abstraction of this state.
    pub fn ssa(&self) -> &SsaMap {
        self.formula_before_abstraction.ssa()
    }

    /// The path formula that the first block after this state starts from.
    pub fn fresh_path_formula(&self) -> PathFormula {
        PathFormula::empty(self.ssa().clone())
    }
}

/// Owns every abstraction state created during one analysis run.
#[derive(Default)]
pub struct AbstractionArena {
    states: Vec<AbstractionState>,
}

impl Debug for AbstractionArena {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        write!(f, "AbstractionArena({} states)", self.states.len())
    }
}

impl AbstractionArena {
    pub fn allocate(
        &mut self,
        location: Location,
        abstraction: Rc<Expression>,
        formula_before_abstraction: PathFormula,
        previous: Option<AbstractionId>,
    ) -> AbstractionId {
        precondition!(previous.map_or(true, |p| p.0 < self.states.len()));
        let id = AbstractionId(self.states.len());
        self.states.push(AbstractionState {
            id,
            location,
            abstraction,
            formula_before_abstraction,
            previous,
        });
        id
    }

    /// Ids only come from this arena, so lookups cannot fail.
    pub fn get(&self, id: AbstractionId) -> &AbstractionState {
        &self.states[id.0]
    }

    /// The chain of abstraction states ending in `id`, starting with an initial state.
    pub fn trace(&self, id: AbstractionId) -> Vec<AbstractionId> {
        let mut result = vec![id];
        let mut current = self.get(id);
        while let Some(previous) = current.previous {
            verify!(previous < current.id);
            result.push(previous);
            current = self.get(previous);
        }
        result.reverse();
        result
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

/// A state inside a block: the abstraction that started the block plus the path formula since then.
#[derive(Clone)]
pub struct NonAbstractionState {
    pub owner: AbstractionId,
    pub location: Location,
    pub path_formula: PathFormula,
    pub size_since_abstraction: usize,
    /// For merged states, the first input of the merge.
    pub merges_into: Option<Rc<NonAbstractionState>>,
    /// For merged states, the second input of the merge.
    pub absorbed: Option<Rc<NonAbstractionState>>,
}

impl Debug for NonAbstractionState {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        write!(
            f,
            "N(A{})@{:?}[{}]: {:?}",
            self.owner.0,
            self.location.index(),
            self.size_since_abstraction,
            self.path_formula
        )
    }
}

impl PartialEq for NonAbstractionState {
    fn eq(&self, other: &Self) -> bool {
        self.owner == other.owner
            && self.location == other.location
            && self.size_since_abstraction == other.size_since_abstraction
            && self.path_formula == other.path_formula
    }
}

impl Eq for NonAbstractionState {}

impl Hash for NonAbstractionState {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.owner.hash(state);
        self.location.hash(state);
        self.size_since_abstraction.hash(state);
        self.path_formula.hash(state);
    }
}

impl NonAbstractionState {
    pub fn is_merged(&self) -> bool {
        self.merges_into.is_some()
    }

    /// True if `other` was an input of the merge that produced this state.
    pub fn absorbs(&self, other: &NonAbstractionState) -> bool {
        let absorbs = |input: &Option<Rc<NonAbstractionState>>| {
            input
                .as_ref()
                .map_or(false, |s| std::ptr::eq(s.as_ref(), other) || s.as_ref() == other)
        };
        absorbs(&self.merges_into) || absorbs(&self.absorbed)
    }
}

/// An element of the predicate abstraction lattice.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum PredicateState {
    /// Covers every state.
    Top,
    /// Stands for no concrete state at all.
    Bottom,
    Abstraction(AbstractionId),
    NonAbstraction(Rc<NonAbstractionState>),
}

impl PredicateState {
    pub fn is_abstraction_state(&self) -> bool {
        matches!(self, PredicateState::Abstraction(..))
    }

    /// The abstraction state that owns this state, i.e. the state itself for abstraction states.
    pub fn owner(&self) -> Option<AbstractionId> {
        match self {
            PredicateState::Abstraction(id) => Some(*id),
            PredicateState::NonAbstraction(state) => Some(state.owner),
            PredicateState::Top | PredicateState::Bottom => None,
        }
    }

    pub fn as_non_abstraction(&self) -> Option<&Rc<NonAbstractionState>> {
        match self {
            PredicateState::NonAbstraction(state) => Some(state),
            _ => None,
        }
    }
}
