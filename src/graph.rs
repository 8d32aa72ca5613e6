// SPDX-FileCopyrightText: 2025-2026 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

//! The relationship dependency graph: nodes are resources, directed edges
//! go from a resource to each `belongs_to` target. Used to detect cycles
//! and to compute a safe order in which resources may be brought up
//! (leaves — resources depending on nothing — first).

use std::collections::{BTreeMap, BTreeSet};

use crate::{error::OrmError, schema::ResourceSchema};

/// Pre-built edge map over a set of schemas, keyed by resource name.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    edges: BTreeMap<String, BTreeSet<String>>
}

impl DependencyGraph {
    /// Build the graph from a resource-name-keyed slice of schemas. A
    /// `belongs_to` relationship whose target is not present in `schemas`
    /// is simply not added as an edge — cross-resource existence is the
    /// validator's job, not the graph's.
    pub fn build(schemas: &[&ResourceSchema]) -> Self {
        let known: BTreeSet<&str> = schemas.iter().map(|s| s.name.as_str()).collect();
        let mut edges = BTreeMap::new();
        for schema in schemas {
            let targets: BTreeSet<String> = schema
                .belongs_to()
                .map(|r| r.target_resource.clone())
                .filter(|target| known.contains(target.as_str()))
                .collect();
            edges.insert(schema.name.clone(), targets);
        }
        Self { edges }
    }

    /// Resources this resource directly depends on (its `belongs_to`
    /// targets).
    pub fn dependencies(&self, resource: &str) -> Vec<String> {
        self.edges
            .get(resource)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Resources that directly depend on this resource.
    pub fn dependents(&self, resource: &str) -> Vec<String> {
        self.edges
            .iter()
            .filter(|(_, targets)| targets.contains(resource))
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Detect every directed cycle via DFS with a `visited`/`on_stack`
    /// pair. Self-edges count as a one-node cycle. Each reported cycle is
    /// the path from the revisited node back to itself.
    pub fn detect_cycles(&self) -> Vec<Vec<String>> {
        let mut visited = BTreeSet::new();
        let mut cycles = Vec::new();
        for node in self.edges.keys() {
            if !visited.contains(node) {
                let mut on_stack = Vec::new();
                let mut on_stack_set = BTreeSet::new();
                self.dfs(node, &mut visited, &mut on_stack, &mut on_stack_set, &mut cycles);
            }
        }
        cycles
    }

    fn dfs(
        &self,
        node: &str,
        visited: &mut BTreeSet<String>,
        on_stack: &mut Vec<String>,
        on_stack_set: &mut BTreeSet<String>,
        cycles: &mut Vec<Vec<String>>
    ) {
        visited.insert(node.to_string());
        on_stack.push(node.to_string());
        on_stack_set.insert(node.to_string());

        if let Some(targets) = self.edges.get(node) {
            for target in targets {
                if on_stack_set.contains(target) {
                    let start = on_stack.iter().position(|n| n == target).unwrap_or(0);
                    let mut cycle: Vec<String> = on_stack[start..].to_vec();
                    cycle.push(target.clone());
                    cycles.push(cycle);
                } else if !visited.contains(target) {
                    self.dfs(target, visited, on_stack, on_stack_set, cycles);
                }
            }
        }

        on_stack.pop();
        on_stack_set.remove(node);
    }

    /// Kahn's algorithm over out-degree: a resource with no remaining
    /// dependencies can emerge, so leaves come first. Fails with
    /// [`OrmError::CycleDetected`] if the result omits any node.
    pub fn topological_sort(&self) -> Result<Vec<String>, OrmError> {
        let mut remaining: BTreeMap<String, BTreeSet<String>> = self.edges.clone();
        let mut order = Vec::with_capacity(remaining.len());

        loop {
            let ready: Vec<String> = remaining
                .iter()
                .filter(|(_, deps)| deps.is_empty())
                .map(|(name, _)| name.clone())
                .collect();
            if ready.is_empty() {
                break;
            }
            for name in &ready {
                remaining.remove(name);
            }
            for deps in remaining.values_mut() {
                for name in &ready {
                    deps.remove(name);
                }
            }
            order.extend(ready);
        }

        if order.len() != self.edges.len() {
            return Err(OrmError::CycleDetected {
                cycles: self.detect_cycles()
            });
        }
        Ok(order)
    }
}
