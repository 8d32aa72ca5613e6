// SPDX-FileCopyrightText: 2025-2026 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

//! End-to-end coverage across the builder, registry, loader, and
//! transaction/hook layers together, using in-memory fakes for the
//! database driver.

use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc
    }
};

use async_trait::async_trait;
use resource_orm::{
    ast::{FieldNode, RelationshipNode, ResourceNode, TypeNode},
    driver::QueryExecutor,
    error::OrmError,
    hooks::{HookBody, HookExecutor, HookRegistry, RegisteredHook},
    loader,
    queue::AsyncQueue,
    registry::Registry,
    transaction::{self, DriverTransaction, IsolationLevel, Transaction, TransactionDriver},
    HookKind, Record, Value
};

fn uuid_field(name: &str) -> FieldNode {
    FieldNode {
        name: name.to_string(),
        type_node: TypeNode::Primitive {
            name: "uuid".to_string(),
            length: None,
            precision: None,
            scale: None,
            nullable: Some(false)
        },
        constraints: vec![resource_orm::ast::ConstraintNode {
            kind: "primary".to_string(),
            arg: resource_orm::ast::ConstraintArg::Literal(Value::Null),
            message: None,
            location: None
        }],
        annotations: Vec::new(),
        location: None
    }
}

fn text_field(name: &str) -> FieldNode {
    FieldNode {
        name: name.to_string(),
        type_node: TypeNode::Primitive {
            name: "string".to_string(),
            length: None,
            precision: None,
            scale: None,
            nullable: Some(false)
        },
        constraints: Vec::new(),
        annotations: Vec::new(),
        location: None
    }
}

fn belongs_to_node(name: &str, target: &str) -> RelationshipNode {
    RelationshipNode {
        kind: "belongs_to".to_string(),
        name: name.to_string(),
        target_type: target.to_string(),
        nullable: Some(false),
        foreign_key: None,
        on_delete: None,
        on_update: None,
        order_by: None,
        through: None,
        join_table: None,
        association_key: None,
        location: None
    }
}

fn has_many_node(name: &str, target: &str) -> RelationshipNode {
    RelationshipNode {
        kind: "has_many".to_string(),
        name: name.to_string(),
        target_type: target.to_string(),
        nullable: Some(true),
        foreign_key: None,
        on_delete: None,
        on_update: None,
        order_by: None,
        through: None,
        join_table: None,
        association_key: None,
        location: None
    }
}

fn resource(name: &str, fields: Vec<FieldNode>, relationships: Vec<RelationshipNode>) -> ResourceNode {
    ResourceNode {
        name: name.to_string(),
        doc: None,
        location: None,
        fields,
        relationships,
        hooks: Vec::new(),
        constraint_blocks: Vec::new(),
        scopes: Vec::new(),
        computed: Vec::new(),
        invariants: Vec::new()
    }
}

struct FakeExecutor {
    queries: AtomicUsize,
    rows_by_table: BTreeMap<&'static str, Vec<Record>>
}

#[async_trait]
impl QueryExecutor for FakeExecutor {
    async fn query(&self, sql: &str, _args: &[Value]) -> Result<Vec<Record>, OrmError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        for (table, rows) in &self.rows_by_table {
            if sql.contains(table) {
                return Ok(rows.clone());
            }
        }
        Ok(Vec::new())
    }

    async fn execute(&self, _sql: &str, _args: &[Value]) -> Result<u64, OrmError> {
        Ok(0)
    }
}

fn record(id: &str, fk: &str, fk_name: &str) -> Record {
    let mut r = Record::new();
    r.insert("id".to_string(), Value::Text(id.to_string()));
    r.insert(fk_name.to_string(), Value::Text(fk.to_string()));
    r
}

/// Build a `User`/`Post` pair through the full upstream-AST-to-registry
/// pipeline, then eager-load `has_many` `posts` against a batch of users
/// in exactly one query.
#[tokio::test]
async fn full_pipeline_from_ast_to_batched_eager_load() {
    let registry = Registry::new();

    let user = resource("User", vec![uuid_field("id"), text_field("name")], vec![has_many_node("posts", "Post")]);
    let post = resource("Post", vec![uuid_field("id"), text_field("title")], vec![belongs_to_node("author", "User")]);

    let (user_schema, warnings) = Registry::build_schema(&user).unwrap();
    assert!(warnings.is_empty());
    let (post_schema, warnings) = Registry::build_schema(&post).unwrap();
    assert!(warnings.is_empty());

    registry.register(user_schema).await.unwrap();
    registry.register(post_schema).await.unwrap();
    registry.validate_all().await.unwrap();

    let order = registry.dependency_order().await.unwrap();
    assert!(order.iter().position(|n| n == "User") < order.iter().position(|n| n == "Post"));

    let mut rows_by_table = BTreeMap::new();
    rows_by_table.insert("posts", vec![record("p1", "u1", "user_id"), record("p2", "u1", "user_id")]);
    let executor = FakeExecutor {
        queries: AtomicUsize::new(0),
        rows_by_table
    };

    let mut users = vec![record("u1", "", "unused"), record("u2", "", "unused")];
    loader::eager_load(&executor, &registry, &mut users, "User", &["posts".to_string()])
        .await
        .unwrap();

    assert_eq!(executor.queries.load(Ordering::SeqCst), 1);
    let posts_of_u1 = match users[0].get("posts") {
        Some(Value::Array(items)) => items.len(),
        _ => 0
    };
    assert_eq!(posts_of_u1, 2);
    let posts_of_u2 = match users[1].get("posts") {
        Some(Value::Array(items)) => items.len(),
        _ => panic!("expected empty array for unmatched parent")
    };
    assert_eq!(posts_of_u2, 0);
}

/// A `belongs_to` target that is never registered fails cross-resource
/// validation, and a direct self-cycle is rejected at the graph level.
#[tokio::test]
async fn unregistered_target_and_self_cycle_are_rejected() {
    let registry = Registry::new();
    let post = resource("Post", vec![uuid_field("id")], vec![belongs_to_node("author", "User")]);
    let (post_schema, _) = Registry::build_schema(&post).unwrap();
    registry.register(post_schema).await.unwrap();
    let err = registry.validate_all().await.unwrap_err();
    assert!(err.to_string().contains("does not exist"));

    let registry = Registry::new();
    let looping = resource("Category", vec![uuid_field("id")], vec![belongs_to_node("parent", "Category")]);
    let (looping_schema, _) = Registry::build_schema(&looping).unwrap();
    registry.register(looping_schema).await.unwrap();
    let err = registry.validate_all().await.unwrap_err();
    assert!(matches!(err, OrmError::CycleDetected { .. }));
}

struct FakeDriverTx {
    statements: Arc<std::sync::Mutex<Vec<String>>>
}

#[async_trait]
impl DriverTransaction for FakeDriverTx {
    async fn query(&self, _sql: &str, _args: &[Value]) -> Result<Vec<Record>, OrmError> {
        Ok(Vec::new())
    }

    async fn execute(&self, sql: &str, _args: &[Value]) -> Result<u64, OrmError> {
        self.statements.lock().unwrap().push(sql.to_string());
        Ok(1)
    }

    async fn driver_commit(&self) -> Result<(), OrmError> {
        self.statements.lock().unwrap().push("COMMIT".to_string());
        Ok(())
    }

    async fn driver_rollback(&self) -> Result<(), OrmError> {
        self.statements.lock().unwrap().push("ROLLBACK".to_string());
        Ok(())
    }
}

struct FakeDriver {
    statements: Arc<std::sync::Mutex<Vec<String>>>
}

#[async_trait]
impl TransactionDriver for FakeDriver {
    async fn begin(&self, _isolation: IsolationLevel) -> Result<Arc<dyn DriverTransaction>, OrmError> {
        Ok(Arc::new(FakeDriverTx {
            statements: self.statements.clone()
        }))
    }
}

/// A nested savepoint that rolls back leaves the outer transaction intact
/// and still committable.
#[tokio::test]
async fn nested_rollback_does_not_abort_outer_transaction() {
    let statements = Arc::new(std::sync::Mutex::new(Vec::new()));
    let driver = FakeDriver {
        statements: statements.clone()
    };

    let outer = Transaction::begin(&driver).await.unwrap();
    let nested = outer.begin_nested().await.unwrap();
    nested.rollback().await.unwrap();
    outer.commit().await.unwrap();

    let log = statements.lock().unwrap();
    assert!(log.iter().any(|l| l.starts_with("SAVEPOINT")));
    assert!(log.iter().any(|l| l.starts_with("ROLLBACK TO SAVEPOINT")));
    assert!(log.iter().any(|l| l == "COMMIT"));
}

struct RejectingHook;

#[async_trait]
impl HookBody for RejectingHook {
    fn name(&self) -> &str {
        "reject-empty-title"
    }

    async fn call(&self, _resource: &str, record: &Record) -> Result<(), OrmError> {
        match record.get("title") {
            Some(Value::Text(t)) if !t.is_empty() => Ok(()),
            _ => Err(OrmError::TransactionAborted("title must not be empty".to_string()))
        }
    }
}

/// A synchronous `before_create` hook failing inside a transaction body
/// aborts the whole transaction; the driver observes a rollback, never a
/// commit.
#[tokio::test]
async fn sync_hook_failure_rolls_back_enclosing_transaction() {
    let statements = Arc::new(std::sync::Mutex::new(Vec::new()));
    let driver = FakeDriver {
        statements: statements.clone()
    };

    let mut hook_registry = HookRegistry::new();
    hook_registry.register(HookKind::BeforeCreate, RegisteredHook::new(Arc::new(RejectingHook), false));

    let queue = Arc::new(AsyncQueue::new(2));
    queue.start().await;
    let hook_executor = HookExecutor::new(queue);

    let mut record = Record::new();
    record.insert("title".to_string(), Value::Text(String::new()));

    let result: Result<(), OrmError> = transaction::with_transaction(&driver, |_tx| {
        let hook_executor = &hook_executor;
        let hook_registry = &hook_registry;
        let record = &record;
        async move {
            hook_executor.execute(hook_registry, "Post", HookKind::BeforeCreate, record).await?;
            Ok(())
        }
    })
    .await;

    assert!(matches!(result, Err(OrmError::HookSyncFailure { .. })));
    let log = statements.lock().unwrap();
    assert!(log.iter().any(|l| l == "ROLLBACK"));
    assert!(!log.iter().any(|l| l == "COMMIT"));
}
