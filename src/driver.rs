// SPDX-FileCopyrightText: 2025-2026 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

//! The minimal surface this core expects from a downstream database
//! driver: parameterized query/execute returning already-scanned
//! [`Record`](orm_types::Record)s, plus identifier quoting. Everything
//! else — connection pooling, migrations, dialect-specific SQL beyond
//! Postgres-style `$N` binding — is the driver's own concern.
//!
//! The [`QueryExecutor`] trait itself has no feature gate: any driver can
//! implement it. The `postgres` feature only adds a concrete
//! [`sqlx`]-backed implementation.

use async_trait::async_trait;
use orm_types::{Record, Value};

use crate::error::OrmError;

/// Parameterized query/execute against a relational backend. Row scanning
/// (including the byte-slice-to-string normalization some drivers apply
/// to text columns) happens inside the implementation; callers only see
/// fully materialized [`Record`]s.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Run a query, returning every row as a `column name -> value` record.
    async fn query(&self, sql: &str, args: &[Value]) -> Result<Vec<Record>, OrmError>;

    /// Run a statement that doesn't return rows, returning the affected
    /// row count.
    async fn execute(&self, sql: &str, args: &[Value]) -> Result<u64, OrmError>;
}

/// Identifier quoting, mandatory for every table/column name interpolated
/// into a query string built by this core.
pub fn quote_identifier(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

#[cfg(feature = "postgres")]
mod postgres {
    use std::error::Error as StdError;

    use async_trait::async_trait;
    use orm_types::{Record, Value};
    use sqlx::{Column, PgPool, Row as SqlxRow, ValueRef};

    use super::QueryExecutor;
    use crate::error::OrmError;

    /// [`QueryExecutor`] backed by a `sqlx` Postgres connection pool.
    pub struct PostgresExecutor {
        pool: PgPool
    }

    impl PostgresExecutor {
        /// Wrap an already-established pool.
        pub const fn new(pool: PgPool) -> Self {
            Self { pool }
        }

        fn scan_row(row: &sqlx::postgres::PgRow) -> Record {
            let mut record = Record::new();
            for (idx, column) in row.columns().iter().enumerate() {
                let name = column.name().to_string();
                let value = scan_value(row, idx);
                record.insert(name, value);
            }
            record
        }
    }

    fn scan_value(row: &sqlx::postgres::PgRow, idx: usize) -> Value {
        let raw = row.try_get_raw(idx);
        let Ok(raw) = raw else {
            return Value::Null;
        };
        if raw.is_null() {
            return Value::Null;
        }
        if let Ok(v) = row.try_get::<uuid::Uuid, _>(idx) {
            return Value::Uuid(v);
        }
        if let Ok(v) = row.try_get::<chrono::DateTime<chrono::Utc>, _>(idx) {
            return Value::Timestamp(v);
        }
        if let Ok(v) = row.try_get::<i64, _>(idx) {
            return Value::Int(v);
        }
        if let Ok(v) = row.try_get::<f64, _>(idx) {
            return Value::Float(v);
        }
        if let Ok(v) = row.try_get::<bool, _>(idx) {
            return Value::Bool(v);
        }
        if let Ok(v) = row.try_get::<Vec<u8>, _>(idx) {
            return Value::Text(String::from_utf8_lossy(&v).into_owned());
        }
        row.try_get::<String, _>(idx).map(Value::Text).unwrap_or(Value::Null)
    }

    #[async_trait]
    impl QueryExecutor for PostgresExecutor {
        async fn query(&self, sql: &str, args: &[Value]) -> Result<Vec<Record>, OrmError> {
            let mut query = sqlx::query(sql);
            for arg in args {
                query = bind_value(query, arg);
            }
            let rows = query
                .fetch_all(&self.pool)
                .await
                .map_err(|e| OrmError::Driver(Box::new(e) as Box<dyn StdError + Send + Sync>))?;
            Ok(rows.iter().map(PostgresExecutor::scan_row).collect())
        }

        async fn execute(&self, sql: &str, args: &[Value]) -> Result<u64, OrmError> {
            let mut query = sqlx::query(sql);
            for arg in args {
                query = bind_value(query, arg);
            }
            let result = query
                .execute(&self.pool)
                .await
                .map_err(|e| OrmError::Driver(Box::new(e) as Box<dyn StdError + Send + Sync>))?;
            Ok(result.rows_affected())
        }
    }

    fn bind_value<'q>(
        query: sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>,
        value: &'q Value
    ) -> sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments> {
        match value {
            Value::Null => query.bind(Option::<i64>::None),
            Value::Bool(b) => query.bind(*b),
            Value::Int(i) => query.bind(*i),
            Value::Float(f) => query.bind(*f),
            Value::Text(s) => query.bind(s.as_str()),
            Value::Timestamp(t) => query.bind(*t),
            Value::Uuid(u) => query.bind(*u),
            Value::Array(items) => {
                let uuids: Option<Vec<uuid::Uuid>> = items
                    .iter()
                    .map(|v| if let Value::Uuid(u) = v { Some(*u) } else { None })
                    .collect();
                match uuids {
                    Some(uuids) => query.bind(uuids),
                    None => {
                        let strings: Vec<String> = items.iter().map(|v| v.stringify_id().unwrap_or_default()).collect();
                        query.bind(strings)
                    }
                }
            }
            Value::Map(record) => query.bind(value_to_json(&Value::Map(record.clone())))
        }
    }

    fn value_to_json(value: &Value) -> serde_json::Value {
        match value {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::json!(i),
            Value::Float(f) => serde_json::json!(f),
            Value::Text(s) => serde_json::Value::String(s.clone()),
            Value::Timestamp(t) => serde_json::Value::String(t.to_rfc3339()),
            Value::Uuid(u) => serde_json::Value::String(u.to_string()),
            Value::Array(items) => serde_json::Value::Array(items.iter().map(value_to_json).collect()),
            Value::Map(record) => {
                serde_json::Value::Object(record.iter().map(|(k, v)| (k.clone(), value_to_json(v))).collect())
            }
        }
    }
}

#[cfg(feature = "postgres")]
pub use postgres::PostgresExecutor;
