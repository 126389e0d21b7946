// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

use crate::abstract_state::PredicateState;
use crate::cfa::{EdgeId, Location};
use crate::error::{CpaError, CpaResult};

use itertools::Itertools;
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::{Dfs, EdgeRef};
use petgraph::Direction;
use std::collections::HashSet;
use std::fmt::{Debug, Formatter, Result};

/// Identifies a node of the explored-state graph.
pub type ArgNodeId = NodeIndex;

#[derive(Clone, Debug)]
pub struct ArgNode {
    pub state: PredicateState,
    pub location: Location,
}

/// The graph of explored states, with edges labelled by the CFA edges that produced them.
/// Nodes keep their ids when other nodes are removed.
#[derive(Default)]
pub struct Arg {
    graph: StableDiGraph<ArgNode, EdgeId>,
    root: Option<ArgNodeId>,
}

impl Debug for Arg {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        write!(
            f,
            "Arg({} nodes, root {:?})",
            self.graph.node_count(),
            self.root
        )
    }
}

impl Arg {
    pub fn new() -> Arg {
        Arg::default()
    }

    pub fn add_root(&mut self, state: PredicateState, location: Location) -> ArgNodeId {
        let root = self.graph.add_node(ArgNode { state, location });
        self.root = Some(root);
        root
    }

    pub fn add_child(
        &mut self,
        parent: ArgNodeId,
        edge: EdgeId,
        state: PredicateState,
        location: Location,
    ) -> ArgNodeId {
        let child = self.graph.add_node(ArgNode { state, location });
        self.graph.add_edge(parent, child, edge);
        child
    }

    /// Adds another parent to `child`, for example when a merged state replaces an earlier one.
    pub fn add_edge(&mut self, parent: ArgNodeId, child: ArgNodeId, edge: EdgeId) {
        if !self
            .graph
            .edges_directed(parent, Direction::Outgoing)
            .any(|e| e.target() == child && *e.weight() == edge)
        {
            self.graph.add_edge(parent, child, edge);
        }
    }

    /// Replaces the state of `id`, for example with the result of merging another state into it.
    /// The children of `id` are not touched.
    pub fn replace_state(&mut self, id: ArgNodeId, state: PredicateState) {
        if let Some(node) = self.graph.node_weight_mut(id) {
            node.state = state;
        }
    }

    pub fn root(&self) -> Option<ArgNodeId> {
        self.root
    }

    pub fn node(&self, id: ArgNodeId) -> Option<&ArgNode> {
        self.graph.node_weight(id)
    }

    pub fn contains(&self, id: ArgNodeId) -> bool {
        self.graph.contains_node(id)
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// The children of `id` with the edges leading to them, in creation order.
    pub fn children(&self, id: ArgNodeId) -> Vec<(ArgNodeId, EdgeId)> {
        self.graph
            .edges_directed(id, Direction::Outgoing)
            .map(|e| (e.target(), *e.weight()))
            .sorted()
            .collect()
    }

    /// The parents of `id`, in creation order.
    pub fn parents(&self, id: ArgNodeId) -> Vec<ArgNodeId> {
        self.graph
            .neighbors_directed(id, Direction::Incoming)
            .sorted()
            .dedup()
            .collect()
    }

    /// The parents of `id` with the edges leading from them, in creation order.
    pub fn incoming(&self, id: ArgNodeId) -> Vec<(ArgNodeId, EdgeId)> {
        self.graph
            .edges_directed(id, Direction::Incoming)
            .map(|e| (e.source(), *e.weight()))
            .sorted()
            .collect()
    }

    /// The path from the root to `target` that always follows the oldest parent.
    pub fn path_to(&self, target: ArgNodeId) -> CpaResult<ArgPath> {
        let root = self
            .root
            .ok_or_else(|| CpaError::InvalidErrorPath(String::from("the graph has no root")))?;
        let mut elements = vec![(target, None)];
        let mut current = target;
        while current != root {
            if elements.len() > self.graph.node_count() {
                return Err(CpaError::InvalidErrorPath(format!(
                    "{:?} lies on a cycle",
                    target
                )));
            }
            let edge = self
                .graph
                .edges_directed(current, Direction::Incoming)
                .min_by_key(|e| e.source())
                .ok_or_else(|| {
                    CpaError::InvalidErrorPath(format!("{:?} is not reachable from the root", target))
                })?;
            current = edge.source();
            elements.push((current, Some(*edge.weight())));
        }
        elements.reverse();
        Ok(ArgPath { elements })
    }

    /// Removes `root` and everything reachable from it. Returns the remaining nodes that lost
    /// a child, so that they can be explored again.
    pub fn remove_subtree(&mut self, root: ArgNodeId) -> Vec<ArgNodeId> {
        if !self.contains(root) {
            return Vec::new();
        }
        let mut removed = HashSet::new();
        let mut dfs = Dfs::new(&self.graph, root);
        while let Some(node) = dfs.next(&self.graph) {
            removed.insert(node);
        }
        let survivors: Vec<ArgNodeId> = removed
            .iter()
            .flat_map(|n| self.graph.neighbors_directed(*n, Direction::Incoming))
            .filter(|n| !removed.contains(n))
            .sorted()
            .dedup()
            .collect();
        for node in &removed {
            self.graph.remove_node(*node);
        }
        if self.root.map_or(false, |r| removed.contains(&r)) {
            self.root = None;
        }
        debug!("removed {} nodes below {:?}", removed.len(), root);
        survivors
    }
}

/// A path through the explored-state graph. Each node is paired with the CFA edge that leads
/// to the next node, the last node with None.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ArgPath {
    pub elements: Vec<(ArgNodeId, Option<EdgeId>)>,
}

impl ArgPath {
    pub fn nodes(&self) -> impl Iterator<Item = ArgNodeId> + '_ {
        self.elements.iter().map(|(n, _)| *n)
    }

    pub fn last(&self) -> Option<ArgNodeId> {
        self.elements.last().map(|(n, _)| *n)
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}
