// SPDX-FileCopyrightText: 2025-2026 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

//! The relationship loader: batched eager loading across
//! `belongs_to`/`has_one`/`has_many`/`has_many_through`, recursive nested
//! includes, a circular-reference/depth guard, and lazy single-record
//! resolution.
//!
//! N+1 prevention is the point of this module — eager-loading one
//! relationship against any number of parent records issues exactly one
//! query at that depth.

mod batch;
mod context;
mod lazy;

use orm_types::{Record, RelationshipKind, Value};

pub use self::{batch::parse_include, context::LoadContext, lazy::LazyRelation};
use crate::{driver::{quote_identifier, QueryExecutor}, error::OrmError, registry::Registry};

/// Attach one or more relationships (given as include paths, e.g.
/// `"author"` or `"comments.author"`) to every record in `records`. Each
/// top-level relationship costs exactly one query at this depth,
/// regardless of how many records are being hydrated.
pub async fn eager_load(
    executor: &dyn QueryExecutor,
    registry: &Registry,
    records: &mut [Record],
    resource: &str,
    includes: &[String]
) -> Result<(), OrmError> {
    let load_ctx = LoadContext::default();
    eager_load_with_context(executor, registry, records, resource, includes, &load_ctx).await
}

/// The recursive entry point used both by [`eager_load`] and by nested
/// include traversal: honors the shared [`LoadContext`]'s depth cap and
/// visited-set cycle guard.
pub async fn eager_load_with_context(
    executor: &dyn QueryExecutor,
    registry: &Registry,
    records: &mut [Record],
    resource: &str,
    includes: &[String],
    load_ctx: &LoadContext
) -> Result<(), OrmError> {
    if records.is_empty() || includes.is_empty() {
        return Ok(());
    }

    load_ctx.enter_depth().await?;
    if load_ctx.mark_visited(resource).await {
        load_ctx.exit_depth().await;
        return Ok(());
    }

    let result = eager_load_inner(executor, registry, records, resource, includes, load_ctx).await;

    load_ctx.unmark_visited(resource).await;
    load_ctx.exit_depth().await;
    result
}

async fn eager_load_inner(
    executor: &dyn QueryExecutor,
    registry: &Registry,
    records: &mut [Record],
    resource: &str,
    includes: &[String],
    load_ctx: &LoadContext
) -> Result<(), OrmError> {
    let Some(schema) = registry.get(resource).await else {
        return Err(OrmError::Registry(format!("resource {resource} is not registered")));
    };

    for include in includes {
        let (head, tail) = parse_include(include);
        let Some(relationship) = schema.relationship(&head) else {
            return Err(OrmError::UnknownRelationship {
                resource: resource.to_string(),
                name: head
            });
        };
        batch::load_relationship(executor, registry, resource, relationship, records, &tail, load_ctx).await?;
    }

    Ok(())
}

/// Lazy single-record fetch for one relationship against one parent id.
/// Returns `Err(NoRecords)` when the relationship is non-nullable and no
/// row matched — eager loads tolerate sparse data, point lookups do not.
pub async fn load_single(
    executor: &dyn QueryExecutor,
    registry: &Registry,
    parent_id: &Value,
    relationship: &crate::schema::Relationship
) -> Result<Option<Record>, OrmError> {
    let Some(target_schema) = registry.get(&relationship.target_resource).await else {
        return Err(OrmError::UnknownRelationship {
            resource: relationship.target_resource.clone(),
            name: relationship.field_name.clone()
        });
    };

    let record = match relationship.kind {
        RelationshipKind::BelongsTo => {
            let Some(id) = parent_id.stringify_id() else {
                return Ok(None);
            };
            let sql = format!(
                "SELECT * FROM {} WHERE {} = $1",
                quote_identifier(&target_schema.table_name),
                quote_identifier("id")
            );
            executor.query(&sql, &[Value::Text(id)]).await?.into_iter().next()
        }
        RelationshipKind::HasOne => {
            let Some(id) = parent_id.stringify_id() else {
                return Ok(None);
            };
            let sql = format!(
                "SELECT * FROM {} WHERE {} = $1",
                quote_identifier(&target_schema.table_name),
                quote_identifier(&relationship.foreign_key)
            );
            executor.query(&sql, &[Value::Text(id)]).await?.into_iter().next()
        }
        other => {
            return Err(OrmError::InvalidRelationType {
                name: relationship.field_name.clone(),
                expected: match other {
                    RelationshipKind::BelongsTo => "belongs_to",
                    RelationshipKind::HasOne => "has_one",
                    _ => "belongs_to or has_one"
                }
            });
        }
    };

    if record.is_none() && !relationship.nullable {
        return Err(OrmError::NoRecords {
            relationship: relationship.field_name.clone()
        });
    }

    Ok(record)
}
