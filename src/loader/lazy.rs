// SPDX-FileCopyrightText: 2025-2026 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

//! Memoized single-shot relationship resolution. A [`LazyRelation`]
//! captures everything it needs at construction time; the first [`LazyRelation::get`]
//! performs the fetch, every later call returns the cached outcome
//! without touching the driver again.

use std::sync::Arc;

use orm_types::{Record, Value};
use tokio::sync::Mutex;

use crate::{driver::QueryExecutor, error::OrmError, registry::Registry, schema::Relationship};

#[derive(Clone)]
enum Cached {
    Value(Option<Record>),
    Error(Arc<OrmError>)
}

/// A memoized, thread-safe single-record relationship fetch.
pub struct LazyRelation {
    parent_id: Value,
    relationship: Relationship,
    executor: Arc<dyn QueryExecutor>,
    registry: Arc<Registry>,
    cached: Mutex<Option<Cached>>
}

impl LazyRelation {
    /// Construct a handle bound to one parent id and relationship. No I/O
    /// happens until [`Self::get`] is first called.
    pub fn new(parent_id: Value, relationship: Relationship, executor: Arc<dyn QueryExecutor>, registry: Arc<Registry>) -> Self {
        Self {
            parent_id,
            relationship,
            executor,
            registry,
            cached: Mutex::new(None)
        }
    }

    /// Resolve the related record, performing I/O only on the first call.
    /// Concurrent callers serialize on the internal mutex; whichever
    /// arrives first pays for the fetch, the rest observe the cached
    /// result.
    pub async fn get(&self) -> Result<Option<Record>, Arc<OrmError>> {
        let mut guard = self.cached.lock().await;
        if let Some(cached) = &*guard {
            return match cached {
                Cached::Value(v) => Ok(v.clone()),
                Cached::Error(e) => Err(e.clone())
            };
        }

        let result = super::load_single(self.executor.as_ref(), self.registry.as_ref(), &self.parent_id, &self.relationship).await;

        match result {
            Ok(value) => {
                *guard = Some(Cached::Value(value.clone()));
                Ok(value)
            }
            Err(err) => {
                let shared = Arc::new(err);
                *guard = Some(Cached::Error(shared.clone()));
                Err(shared)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use orm_types::{CascadeAction, RelationshipKind};

    use super::*;
    use crate::registry::Registry;

    struct CountingExecutor {
        calls: AtomicUsize
    }

    #[async_trait]
    impl QueryExecutor for CountingExecutor {
        async fn query(&self, _sql: &str, _args: &[Value]) -> Result<Vec<Record>, OrmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut row = Record::new();
            row.insert("id".to_string(), Value::Text("u1".to_string()));
            row.insert("name".to_string(), Value::Text("Alice".to_string()));
            Ok(vec![row])
        }

        async fn execute(&self, _sql: &str, _args: &[Value]) -> Result<u64, OrmError> {
            Ok(0)
        }
    }

    fn belongs_to_relationship() -> Relationship {
        Relationship {
            kind: RelationshipKind::BelongsTo,
            field_name: "author".to_string(),
            target_resource: "User".to_string(),
            foreign_key: "user_id".to_string(),
            nullable: true,
            on_delete: CascadeAction::Restrict,
            on_update: CascadeAction::Restrict,
            order_by: Vec::new(),
            through_resource: None,
            join_table: None,
            association_key: None
        }
    }

    #[tokio::test]
    async fn lazy_relation_memoizes_after_first_get() {
        let registry = Arc::new(Registry::new());
        let executor: Arc<dyn QueryExecutor> = Arc::new(CountingExecutor { calls: AtomicUsize::new(0) });

        let lazy = LazyRelation::new(Value::Text("p1".to_string()), belongs_to_relationship(), executor.clone(), registry);

        let first = lazy.get().await.unwrap();
        let second = lazy.get().await.unwrap();
        assert_eq!(first, second);
    }
}
