// SPDX-FileCopyrightText: 2025-2026 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

//! Batched relationship loading: one query per requested relationship per
//! depth, regardless of how many parent records are being hydrated. This
//! is what keeps eager loading from degenerating into N+1 queries.

use std::collections::{BTreeMap, BTreeSet};

use orm_types::{Record, RelationshipKind, Value};

use super::context::LoadContext;
use crate::{
    driver::{quote_identifier, QueryExecutor},
    error::OrmError,
    registry::Registry,
    schema::Relationship
};

/// Split an include path on its first `.`: `"author.posts.comments"` ->
/// (`"author"`, `["posts.comments"]`). A leaf path like `"author"` yields
/// an empty tail. Empty input yields an empty head and no tail.
pub fn parse_include(include: &str) -> (String, Vec<String>) {
    if include.is_empty() {
        return (String::new(), Vec::new());
    }
    match include.split_once('.') {
        Some((head, tail)) => (head.to_string(), vec![tail.to_string()]),
        None => (include.to_string(), Vec::new())
    }
}

fn order_by_sql(relationship: &Relationship) -> String {
    if relationship.order_by.is_empty() {
        return String::new();
    }
    let clauses: Vec<String> = relationship
        .order_by
        .iter()
        .map(|clause| format!("{} {}", quote_identifier(&clause.column), clause.direction.as_sql()))
        .collect();
    format!(" ORDER BY {}", clauses.join(", "))
}

/// Attach a `belongs_to` relationship to every parent record in one
/// query: collect distinct non-null FK values, fetch every referenced
/// target row, then attach by stringified id. Parents with a null FK get
/// an explicit `Value::Null` when the relationship is nullable.
pub async fn load_belongs_to(
    executor: &dyn QueryExecutor,
    target_table: &str,
    relationship: &Relationship,
    records: &mut [Record]
) -> Result<(), OrmError> {
    let ids: BTreeSet<String> = records
        .iter()
        .filter_map(|r| r.get(&relationship.foreign_key))
        .filter_map(Value::stringify_id)
        .collect();

    if ids.is_empty() {
        return Ok(());
    }

    let id_list: Vec<Value> = ids.iter().map(|id| Value::Text(id.clone())).collect();
    let sql = format!(
        "SELECT * FROM {} WHERE {} = ANY($1)",
        quote_identifier(target_table),
        quote_identifier("id")
    );
    let rows = executor.query(&sql, &[Value::Array(id_list)]).await?;

    let by_id: BTreeMap<String, Record> = rows
        .into_iter()
        .filter_map(|row| row.get("id").and_then(Value::stringify_id).map(|id| (id, row)))
        .collect();

    for record in records.iter_mut() {
        let fk = record.get(&relationship.foreign_key).cloned().unwrap_or(Value::Null);
        let attached = match fk.stringify_id() {
            Some(id) => by_id.get(&id).cloned().map(Value::Map).unwrap_or(Value::Null),
            None => Value::Null
        };
        record.insert(relationship.field_name.clone(), attached);
    }

    Ok(())
}

/// Attach a `has_many` relationship: one query grouping child rows by FK,
/// attaching an empty array (never null) to parents with no children.
pub async fn load_has_many(
    executor: &dyn QueryExecutor,
    target_table: &str,
    relationship: &Relationship,
    parent_primary_key: &str,
    records: &mut [Record]
) -> Result<(), OrmError> {
    let ids: BTreeSet<String> = records
        .iter()
        .filter_map(|r| r.get(parent_primary_key))
        .filter_map(Value::stringify_id)
        .collect();

    if ids.is_empty() {
        return Ok(());
    }

    for record in records.iter_mut() {
        record.insert(relationship.field_name.clone(), Value::Array(Vec::new()));
    }

    let id_list: Vec<Value> = ids.iter().map(|id| Value::Text(id.clone())).collect();
    let sql = format!(
        "SELECT * FROM {} WHERE {} = ANY($1){}",
        quote_identifier(target_table),
        quote_identifier(&relationship.foreign_key),
        order_by_sql(relationship)
    );
    let rows = executor.query(&sql, &[Value::Array(id_list)]).await?;

    let mut grouped: BTreeMap<String, Vec<Value>> = BTreeMap::new();
    for row in rows {
        if let Some(fk) = row.get(&relationship.foreign_key).and_then(Value::stringify_id) {
            grouped.entry(fk).or_default().push(Value::Map(row));
        }
    }

    for record in records.iter_mut() {
        let Some(parent_id) = record.get(parent_primary_key).and_then(Value::stringify_id) else {
            continue;
        };
        if let Some(children) = grouped.remove(&parent_id) {
            record.insert(relationship.field_name.clone(), Value::Array(children));
        }
    }

    Ok(())
}

/// Attach a `has_one` relationship: same batching as `has_many`, but the
/// underlying query constrains to at most one row per parent via
/// `DISTINCT ON`. Nullable `has_one` on a parent with no id becomes an
/// explicit `Value::Null`.
pub async fn load_has_one(
    executor: &dyn QueryExecutor,
    target_table: &str,
    relationship: &Relationship,
    parent_primary_key: &str,
    records: &mut [Record]
) -> Result<(), OrmError> {
    let ids: BTreeSet<String> = records
        .iter()
        .filter_map(|r| r.get(parent_primary_key))
        .filter_map(Value::stringify_id)
        .collect();

    if ids.is_empty() {
        return Ok(());
    }

    let fk_quoted = quote_identifier(&relationship.foreign_key);
    let id_list: Vec<Value> = ids.iter().map(|id| Value::Text(id.clone())).collect();
    let sql = format!(
        "SELECT DISTINCT ON ({fk_quoted}) * FROM {} WHERE {fk_quoted} = ANY($1) ORDER BY {fk_quoted}, {}",
        quote_identifier(target_table),
        quote_identifier("id")
    );
    let rows = executor.query(&sql, &[Value::Array(id_list)]).await?;

    let by_fk: BTreeMap<String, Record> = rows
        .into_iter()
        .filter_map(|row| row.get(&relationship.foreign_key).and_then(Value::stringify_id).map(|fk| (fk, row)))
        .collect();

    for record in records.iter_mut() {
        let parent_id = record.get(parent_primary_key).and_then(Value::stringify_id);
        let attached = parent_id
            .as_ref()
            .and_then(|id| by_fk.get(id))
            .cloned()
            .map(Value::Map)
            .unwrap_or(Value::Null);
        record.insert(relationship.field_name.clone(), attached);
    }

    Ok(())
}

/// Attach a `has_many_through` relationship via a three-way join. The
/// synthetic `__parent_id` column used for grouping is stripped from
/// every returned child record before attachment.
pub async fn load_has_many_through(
    executor: &dyn QueryExecutor,
    target_table: &str,
    relationship: &Relationship,
    parent_primary_key: &str,
    records: &mut [Record]
) -> Result<(), OrmError> {
    let ids: BTreeSet<String> = records
        .iter()
        .filter_map(|r| r.get(parent_primary_key))
        .filter_map(Value::stringify_id)
        .collect();

    if ids.is_empty() {
        return Ok(());
    }

    for record in records.iter_mut() {
        record.insert(relationship.field_name.clone(), Value::Array(Vec::new()));
    }

    let join_table = relationship
        .join_table
        .as_deref()
        .ok_or_else(|| OrmError::InvalidRelationType {
            name: relationship.field_name.clone(),
            expected: "has_many_through with a join table"
        })?;
    let association_key = relationship
        .association_key
        .as_deref()
        .ok_or_else(|| OrmError::InvalidRelationType {
            name: relationship.field_name.clone(),
            expected: "has_many_through with an association key"
        })?;

    let sql = format!(
        "SELECT t.*, j.{} AS __parent_id FROM {} t INNER JOIN {} j ON t.{} = j.{} WHERE j.{} = ANY($1){}",
        quote_identifier(&relationship.foreign_key),
        quote_identifier(target_table),
        quote_identifier(join_table),
        quote_identifier("id"),
        quote_identifier(association_key),
        quote_identifier(&relationship.foreign_key),
        order_by_sql(relationship)
    );
    let id_list: Vec<Value> = ids.iter().map(|id| Value::Text(id.clone())).collect();
    let rows = executor.query(&sql, &[Value::Array(id_list)]).await?;

    let mut grouped: BTreeMap<String, Vec<Value>> = BTreeMap::new();
    for mut row in rows {
        let Some(parent_id) = row.remove("__parent_id").and_then(|v| v.stringify_id()) else {
            continue;
        };
        grouped.entry(parent_id).or_default().push(Value::Map(row));
    }

    for record in records.iter_mut() {
        let Some(parent_id) = record.get(parent_primary_key).and_then(Value::stringify_id) else {
            continue;
        };
        if let Some(children) = grouped.remove(&parent_id) {
            record.insert(relationship.field_name.clone(), Value::Array(children));
        }
    }

    Ok(())
}

/// Dispatch one relationship's batching algorithm by kind, then recurse
/// into the tail of the include path against the union of distinct child
/// records it attached.
pub async fn load_relationship(
    executor: &dyn QueryExecutor,
    registry: &Registry,
    parent_schema_name: &str,
    relationship: &Relationship,
    records: &mut [Record],
    tail: &[String],
    load_ctx: &LoadContext
) -> Result<(), OrmError> {
    let Some(target_schema) = registry.get(&relationship.target_resource).await else {
        return Err(OrmError::UnknownRelationship {
            resource: parent_schema_name.to_string(),
            name: relationship.field_name.clone()
        });
    };
    let parent_schema = registry.get(parent_schema_name).await;
    let parent_primary_key = parent_schema
        .as_ref()
        .and_then(|s| s.primary_field())
        .map(|f| f.name.clone())
        .unwrap_or_else(|| "id".to_string());

    match relationship.kind {
        RelationshipKind::BelongsTo => {
            load_belongs_to(executor, &target_schema.table_name, relationship, records).await?;
        }
        RelationshipKind::HasMany => {
            load_has_many(executor, &target_schema.table_name, relationship, &parent_primary_key, records).await?;
        }
        RelationshipKind::HasOne => {
            load_has_one(executor, &target_schema.table_name, relationship, &parent_primary_key, records).await?;
        }
        RelationshipKind::HasManyThrough => {
            load_has_many_through(executor, &target_schema.table_name, relationship, &parent_primary_key, records).await?;
        }
    }

    if tail.is_empty() {
        return Ok(());
    }

    let mut children: Vec<Record> = Vec::new();
    let mut seen_ids = BTreeSet::new();
    let target_primary_key = target_schema.primary_field().map(|f| f.name.clone()).unwrap_or_else(|| "id".to_string());

    for record in records.iter() {
        match record.get(&relationship.field_name) {
            Some(Value::Array(items)) => {
                for item in items {
                    if let Value::Map(child) = item {
                        if let Some(id) = child.get(&target_primary_key).and_then(Value::stringify_id) {
                            if seen_ids.insert(id) {
                                children.push(child.clone());
                            }
                        }
                    }
                }
            }
            Some(Value::Map(child)) => {
                if let Some(id) = child.get(&target_primary_key).and_then(Value::stringify_id) {
                    if seen_ids.insert(id) {
                        children.push(child.clone());
                    }
                }
            }
            _ => {}
        }
    }

    if children.is_empty() {
        return Ok(());
    }

    Box::pin(super::eager_load_with_context(
        executor,
        registry,
        &mut children,
        &relationship.target_resource,
        tail,
        load_ctx
    ))
    .await?;

    // Reattach the now-enriched children back onto their parents by id.
    let enriched_by_id: BTreeMap<String, Record> = children
        .into_iter()
        .filter_map(|c| c.get(&target_primary_key).and_then(Value::stringify_id).map(|id| (id, c)))
        .collect();

    for record in records.iter_mut() {
        match record.get_mut(&relationship.field_name) {
            Some(Value::Array(items)) => {
                for item in items.iter_mut() {
                    if let Value::Map(child) = item {
                        if let Some(id) = child.get(&target_primary_key).and_then(Value::stringify_id) {
                            if let Some(enriched) = enriched_by_id.get(&id) {
                                *child = enriched.clone();
                            }
                        }
                    }
                }
            }
            Some(value @ Value::Map(_)) => {
                if let Value::Map(child) = value {
                    if let Some(id) = child.get(&target_primary_key).and_then(Value::stringify_id) {
                        if let Some(enriched) = enriched_by_id.get(&id) {
                            *value = Value::Map(enriched.clone());
                        }
                    }
                }
            }
            _ => {}
        }
    }

    Ok(())
}
