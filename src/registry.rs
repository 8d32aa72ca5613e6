// SPDX-FileCopyrightText: 2025-2026 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

//! Thread-safe schema registry: one reader-writer lock guarding a
//! name-keyed map of [`ResourceSchema`]. Registration is
//! forward-reference-tolerant — `register` only runs
//! [`crate::validator::validate_structural`], so a resource may name a
//! `belongs_to` target that hasn't been registered yet. Cross-resource
//! checks are deferred to [`Registry::validate_all`], run once every
//! schema is in place.

use std::collections::BTreeMap;

use tokio::sync::RwLock;

use crate::{
    ast::ResourceNode,
    builder::{self, Warnings},
    error::OrmError,
    graph::DependencyGraph,
    schema::ResourceSchema,
    validator
};

/// Snapshot of registry-wide counts, computed outside the lock once the
/// snapshot is taken.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stats {
    /// Number of registered resources.
    pub resource_count: usize,
    /// Total fields across every resource.
    pub field_count: usize,
    /// Total relationships across every resource.
    pub relationship_count: usize,
    /// Total hooks across every resource.
    pub hook_count: usize
}

/// A report of how resources depend on each other.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DependencyReport {
    /// Direct `belongs_to` targets, per resource.
    pub dependencies: BTreeMap<String, Vec<String>>,
    /// Resources that directly depend on each resource.
    pub dependents: BTreeMap<String, Vec<String>>
}

/// The schema registry.
#[derive(Debug, Default)]
pub struct Registry {
    schemas: RwLock<BTreeMap<String, ResourceSchema>>
}

impl Registry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Translate an upstream [`ResourceNode`] into a [`ResourceSchema`],
    /// without registering it. Exposed so callers can inspect build
    /// warnings before deciding to register.
    pub fn build_schema(node: &ResourceNode) -> Result<(ResourceSchema, Warnings), OrmError> {
        builder::build(node)
    }

    /// Register a schema. Rejects a duplicate name. Runs
    /// [`validator::validate_structural`] after insertion and rolls the
    /// insertion back if that fails, so a rejected schema never remains
    /// observable.
    pub async fn register(&self, schema: ResourceSchema) -> Result<(), OrmError> {
        let mut guard = self.schemas.write().await;
        if guard.contains_key(&schema.name) {
            return Err(OrmError::Registry(format!("resource {} is already registered", schema.name)));
        }
        let name = schema.name.clone();
        guard.insert(name.clone(), schema);

        if let Some(inserted) = guard.get(&name) {
            if let Err(err) = validator::validate_structural(inserted) {
                guard.remove(&name);
                return Err(err);
            }
        }
        Ok(())
    }

    /// Look up a schema by name.
    pub async fn get(&self, name: &str) -> Option<ResourceSchema> {
        self.schemas.read().await.get(name).cloned()
    }

    /// Every registered resource name, in sorted order.
    pub async fn list(&self) -> Vec<String> {
        self.schemas.read().await.keys().cloned().collect()
    }

    /// A defensive copy of every registered schema; external mutation of
    /// the returned vector cannot corrupt the registry's own state.
    pub async fn all(&self) -> Vec<ResourceSchema> {
        self.schemas.read().await.values().cloned().collect()
    }

    /// Number of registered resources.
    pub async fn count(&self) -> usize {
        self.schemas.read().await.len()
    }

    /// Whether a resource by this name is registered.
    pub async fn exists(&self, name: &str) -> bool {
        self.schemas.read().await.contains_key(name)
    }

    /// Remove every registered schema.
    pub async fn clear(&self) {
        self.schemas.write().await.clear();
    }

    /// Cross-resource validation over the whole registered set: cycle
    /// detection over `belongs_to` edges, then per-resource target
    /// resolution, primary-key presence, and FK type coherence.
    pub async fn validate_all(&self) -> Result<(), OrmError> {
        let guard = self.schemas.read().await;
        let schemas: Vec<&ResourceSchema> = guard.values().collect();

        let graph = DependencyGraph::build(&schemas);
        let cycles = graph.detect_cycles();
        if !cycles.is_empty() {
            return Err(OrmError::CycleDetected { cycles });
        }

        for schema in &schemas {
            validator::validate_all(schema, |name| guard.get(name))?;
        }
        Ok(())
    }

    /// A topological order (leaves first) over the registered resources.
    /// Fails with [`OrmError::CycleDetected`] if the graph is cyclic.
    pub async fn dependency_order(&self) -> Result<Vec<String>, OrmError> {
        let guard = self.schemas.read().await;
        let schemas: Vec<&ResourceSchema> = guard.values().collect();
        DependencyGraph::build(&schemas).topological_sort()
    }

    /// Direct dependents/dependencies for every resource.
    pub async fn analyze_dependencies(&self) -> DependencyReport {
        let guard = self.schemas.read().await;
        let schemas: Vec<&ResourceSchema> = guard.values().collect();
        let graph = DependencyGraph::build(&schemas);

        let mut report = DependencyReport::default();
        for schema in &schemas {
            report.dependencies.insert(schema.name.clone(), graph.dependencies(&schema.name));
            report.dependents.insert(schema.name.clone(), graph.dependents(&schema.name));
        }
        report
    }

    /// Snapshot counts under the read lock, then compute totals without
    /// holding it.
    pub async fn stats(&self) -> Stats {
        let snapshot: Vec<ResourceSchema> = {
            let guard = self.schemas.read().await;
            guard.values().cloned().collect()
        };

        Stats {
            resource_count: snapshot.len(),
            field_count: snapshot.iter().map(|s| s.fields.len()).sum(),
            relationship_count: snapshot.iter().map(|s| s.relationships.len()).sum(),
            hook_count: snapshot.iter().map(|s| s.hooks.values().map(Vec::len).sum::<usize>()).sum()
        }
    }
}
