//! Unit dependency graph with cycle detection.
//!
//! An edge `A -> B` means unit A's schema references a type owned by unit B
//! (inferred during discovery) or that A declares `dependsOn = [B]`. Cycles
//! are found with a three-color depth-first traversal; the first back-edge
//! names the unit where the cycle closes.

use crate::error::{Error, Result};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

/// Directed graph over unit names, in insertion order
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    nodes: Vec<String>,
    index: HashMap<String, usize>,
    edges: Vec<Vec<usize>>,
}

impl DependencyGraph {
    /// Creates an empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node if missing and returns its index
    pub fn add_node(&mut self, unit: &str) -> usize {
        if let Some(&i) = self.index.get(unit) {
            return i;
        }
        let i = self.nodes.len();
        self.nodes.push(unit.to_string());
        self.index.insert(unit.to_string(), i);
        self.edges.push(Vec::new());
        i
    }

    /// Adds the edge `from -> to`, creating nodes as needed
    pub fn add_edge(&mut self, from: &str, to: &str) {
        let from = self.add_node(from);
        let to = self.add_node(to);
        if !self.edges[from].contains(&to) {
            self.edges[from].push(to);
        }
    }

    /// Returns the direct dependencies of `unit`
    pub fn dependencies(&self, unit: &str) -> Vec<&str> {
        self.index
            .get(unit)
            .map(|&i| self.edges[i].iter().map(|&j| self.nodes[j].as_str()).collect())
            .unwrap_or_default()
    }

    /// Number of nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if the graph has no nodes
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Checks for cycles and returns a topological order in which every unit
    /// comes after the units it depends on.
    ///
    /// Roots are visited in insertion order, so the result is stable.
    pub fn resolve(&self) -> Result<Vec<String>> {
        let mut marks = vec![Mark::Unvisited; self.nodes.len()];
        let mut order = Vec::with_capacity(self.nodes.len());

        for start in 0..self.nodes.len() {
            if marks[start] != Mark::Unvisited {
                continue;
            }

            // (node, next edge to follow)
            let mut stack = vec![(start, 0usize)];
            marks[start] = Mark::InProgress;

            while let Some(frame) = stack.last_mut() {
                let (node, next) = *frame;
                if let Some(&target) = self.edges[node].get(next) {
                    frame.1 += 1;
                    match marks[target] {
                        Mark::Unvisited => {
                            marks[target] = Mark::InProgress;
                            stack.push((target, 0));
                        }
                        Mark::InProgress => {
                            return Err(Error::cyclic_dependency(&self.nodes[target]));
                        }
                        Mark::Done => {}
                    }
                } else {
                    marks[node] = Mark::Done;
                    order.push(self.nodes[node].clone());
                    stack.pop();
                }
            }
        }

        Ok(order)
    }
}
