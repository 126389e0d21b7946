// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

use thiserror::Error;

/// The conditions that end an analysis run. Infeasible branches and spurious counterexamples
/// are not errors and never show up here.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CpaError {
    /// A CFA edge has no symbolic translation.
    #[error("unrecognized edge {edge}: {description}")]
    UnrecognizedEdge { edge: String, description: String },

    /// Two consecutive refinements of the same abstraction path produced no new predicates.
    #[error("refinement failed: no new predicates for repeated error path {path}")]
    RefinementFailed { path: String },

    /// The solver gave up on a query for which there is no safe default answer.
    #[error("solver could not decide the {query}")]
    SolverUndefined { query: &'static str },

    #[error("invalid error path: {0}")]
    InvalidErrorPath(String),

    #[error("unexpected abstract state: {0}")]
    UnexpectedState(String),

    /// A formula that is meant to become a predicate is not a boolean atom over unindexed variables.
    #[error("{0} cannot be used as a predicate")]
    InvalidPredicate(String),

    #[error("invalid configuration: {0}")]
    Configuration(String),
}

pub type CpaResult<T> = Result<T, CpaError>;
