// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

use crate::expression::Expression;

use petgraph::algo::dominators;
use petgraph::graph::{DiGraph, EdgeIndex, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Formatter, Result};
use std::rc::Rc;

/// A program location.
pub type Location = NodeIndex;

/// A CFA edge.
pub type EdgeId = EdgeIndex;

/// A node of a control-flow automaton.
#[derive(Serialize, Deserialize, Clone, Debug, Eq, PartialEq)]
pub struct CfaNode {
    pub function_name: Rc<str>,
    /// The target of a back edge, i.e. a node that dominates one of its predecessors.
    pub is_loop_head: bool,
    pub is_function_entry: bool,
    /// True if this node is the return site of a call, i.e. it is entered by a summary edge.
    pub has_entering_summary_edge: bool,
    /// Reaching this node is a property violation.
    pub is_error: bool,
}

/// The statement that labels a CFA edge. Variables occurring in edges have no SSA index.
#[derive(Serialize, Deserialize, Clone, Debug, Eq, PartialEq)]
pub enum EdgeKind {
    /// No effect.
    Blank,

    /// A local or global variable comes into scope, optionally with an initial value.
    Declaration {
        variable: Rc<Expression>,
        initializer: Option<Rc<Expression>>,
    },

    /// target := value
    Statement {
        target: Rc<Expression>,
        value: Rc<Expression>,
    },

    /// Control flows along this edge only if condition evaluates to truth_assumption.
    Assume {
        condition: Rc<Expression>,
        truth_assumption: bool,
    },

    /// Binds each formal parameter of the callee to the value of the corresponding argument.
    FunctionCall {
        arguments: Vec<(Rc<Expression>, Rc<Expression>)>,
    },

    /// Returns to the caller, optionally assigning the returned value to a caller variable.
    FunctionReturn {
        result: Option<(Rc<Expression>, Rc<Expression>)>,
    },

    /// The summary edge from a call site to its return site.
    CallToReturn,

    /// A statement the front end could not express, such as inline assembly.
    Opaque { description: String },
}

/// An edge of a control-flow automaton.
#[derive(Serialize, Deserialize, Clone, Debug, Eq, PartialEq)]
pub struct CfaEdge {
    pub kind: EdgeKind,
}

/// A control-flow automaton for a whole program.
#[derive(Clone)]
pub struct Cfa {
    graph: DiGraph<CfaNode, CfaEdge>,
    entry: Location,
}

impl Debug for Cfa {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        write!(
            f,
            "Cfa({} nodes, {} edges)",
            self.graph.node_count(),
            self.graph.edge_count()
        )
    }
}

impl Cfa {
    pub fn entry(&self) -> Location {
        self.entry
    }

    pub fn node(&self, location: Location) -> &CfaNode {
        &self.graph[location]
    }

    pub fn edge(&self, edge: EdgeId) -> &CfaEdge {
        &self.graph[edge]
    }

    pub fn edge_source(&self, edge: EdgeId) -> Location {
        self.endpoints(edge).0
    }

    pub fn edge_target(&self, edge: EdgeId) -> Location {
        self.endpoints(edge).1
    }

    fn endpoints(&self, edge: EdgeId) -> (Location, Location) {
        self.graph
            .edge_endpoints(edge)
            .unwrap_or_else(|| panic!("{:?} does not belong to this CFA", edge))
    }

    /// The edges leaving `location` in the order they were added.
    pub fn leaving_edges(&self, location: Location) -> Vec<EdgeId> {
        let mut edges: Vec<EdgeId> = self
            .graph
            .edges_directed(location, Direction::Outgoing)
            .map(|e| e.id())
            .collect();
        edges.sort();
        edges
    }

    /// The edge from `source` to `target`, if there is one.
    pub fn edge_between(&self, source: Location, target: Location) -> Option<EdgeId> {
        self.graph.find_edge(source, target)
    }

    /// True if a function call edge leaves `location`.
    pub fn is_call_site(&self, location: Location) -> bool {
        self.graph
            .edges_directed(location, Direction::Outgoing)
            .any(|e| matches!(e.weight().kind, EdgeKind::FunctionCall { .. }))
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }
}

/// Assembles a Cfa and derives the structural node flags once all edges are known.
#[derive(Debug, Default)]
pub struct CfaBuilder {
    graph: DiGraph<CfaNode, CfaEdge>,
}

impl CfaBuilder {
    pub fn new() -> CfaBuilder {
        CfaBuilder::default()
    }

    /// Adds the entry node of a function.
    pub fn add_function_entry(&mut self, function_name: &str) -> Location {
        let location = self.add_node(function_name);
        self.graph[location].is_function_entry = true;
        location
    }

    pub fn add_node(&mut self, function_name: &str) -> Location {
        self.graph.add_node(CfaNode {
            function_name: Rc::from(function_name),
            is_loop_head: false,
            is_function_entry: false,
            has_entering_summary_edge: false,
            is_error: false,
        })
    }

    pub fn add_error_node(&mut self, function_name: &str) -> Location {
        let location = self.add_node(function_name);
        self.graph[location].is_error = true;
        location
    }

    pub fn add_edge(&mut self, source: Location, target: Location, kind: EdgeKind) -> EdgeId {
        self.graph.add_edge(source, target, CfaEdge { kind })
    }

    /// Adds the pair of assume edges for a branch on `condition` and returns (then, else).
    pub fn add_branch(
        &mut self,
        source: Location,
        condition: Rc<Expression>,
        then_target: Location,
        else_target: Location,
    ) -> (EdgeId, EdgeId) {
        let then_edge = self.add_edge(
            source,
            then_target,
            EdgeKind::Assume {
                condition: condition.clone(),
                truth_assumption: true,
            },
        );
        let else_edge = self.add_edge(
            source,
            else_target,
            EdgeKind::Assume {
                condition,
                truth_assumption: false,
            },
        );
        (then_edge, else_edge)
    }

    /// Marks loop heads and call return sites and returns the finished automaton.
    pub fn build(mut self, entry: Location) -> Cfa {
        let dominators = dominators::simple_fast(&self.graph, entry);
        let mut loop_heads = Vec::new();
        let mut return_sites = Vec::new();
        for edge in self.graph.edge_references() {
            let (source, target) = (edge.source(), edge.target());
            if let Some(mut source_dominators) = dominators.dominators(source) {
                if source_dominators.any(|d| d == target) {
                    loop_heads.push(target);
                }
            }
            if edge.weight().kind == EdgeKind::CallToReturn {
                return_sites.push(target);
            }
        }
        for location in loop_heads {
            trace!("loop head {:?}", location);
            self.graph[location].is_loop_head = true;
        }
        for location in return_sites {
            self.graph[location].has_entering_summary_edge = true;
        }
        Cfa {
            graph: self.graph,
            entry,
        }
    }
}
