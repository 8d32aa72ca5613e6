// SPDX-FileCopyrightText: 2025-2026 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

//! Dynamic record value.
//!
//! Records are string-keyed maps of dynamically typed [`Value`]s rather
//! than per-resource generated structs, because the schema set itself is
//! data-defined and type-erased at runtime (spec-level design note:
//! "Dynamic records vs. static types" — back records with a tagged-union
//! value type rather than per-resource structs).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// A dynamically typed value stored in a [`Record`].
///
/// `Array`/`Map` recurse, matching the composite shapes a [`TypeSpec`](crate::types::TypeSpec)
/// can describe (array, hash, struct).
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Absence of a value. Nil values pass through deep-copy untouched.
    Null,
    /// Boolean.
    Bool(bool),
    /// Signed integer (covers `int`/`bigint`).
    Int(i64),
    /// Floating point (covers `float`/`decimal`, which the core does not
    /// itself perform arbitrary-precision arithmetic on).
    Float(f64),
    /// Text (covers `string`/`text`/`markdown`/`email`/`url`/`phone`/`enum`).
    Text(String),
    /// Timestamp, copied by value — trusted to be immutable.
    Timestamp(DateTime<Utc>),
    /// UUID, copied by value — trusted to be immutable.
    Uuid(Uuid),
    /// A heterogeneous ordered sequence.
    Array(Vec<Value>),
    /// A nested record (struct/hash/json shape).
    Map(Record)
}

impl Value {
    /// Recursively clone this value such that a subsequent mutation of the
    /// original (or of a sibling clone) can never be observed through this
    /// clone.
    ///
    /// Primitives, timestamps, and UUIDs are copied by value since they are
    /// trusted to be immutable; `Array`/`Map` recurse element-wise into a
    /// freshly allocated backing store. This is what gives an async hook's
    /// enqueued snapshot its isolation from later synchronous mutation.
    pub fn deep_copy(&self) -> Self {
        match self {
            Self::Null => Self::Null,
            Self::Bool(b) => Self::Bool(*b),
            Self::Int(i) => Self::Int(*i),
            Self::Float(f) => Self::Float(*f),
            Self::Text(s) => Self::Text(s.clone()),
            Self::Timestamp(t) => Self::Timestamp(*t),
            Self::Uuid(u) => Self::Uuid(*u),
            Self::Array(items) => Self::Array(items.iter().map(Value::deep_copy).collect()),
            Self::Map(record) => Self::Map(deep_copy_record(record))
        }
    }

    /// The id this value represents, if it is an int/text/uuid scalar
    /// stringified for use as a batching map key (the loader dedups
    /// foreign-key values by their stringified form).
    pub fn stringify_id(&self) -> Option<String> {
        match self {
            Self::Int(i) => Some(i.to_string()),
            Self::Text(s) => Some(s.clone()),
            Self::Uuid(u) => Some(u.to_string()),
            Self::Null => None,
            _ => None
        }
    }

    /// Whether this value is `Null`.
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Self::Int(i)
                } else {
                    Self::Float(n.as_f64().unwrap_or_default())
                }
            }
            serde_json::Value::String(s) => Self::Text(s),
            serde_json::Value::Array(items) => {
                Self::Array(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => {
                Self::Map(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

/// A string-keyed dynamic record: the uniform representation every loader
/// and hook contract operates on.
///
/// Field iteration order follows `BTreeMap`'s key order, which gives
/// deterministic output independent of insertion order — useful for
/// reproducible query-parameter logging and test assertions.
pub type Record = BTreeMap<String, Value>;

/// Recursively clone a [`Record`], isolating the clone from subsequent
/// mutation of the original by the caller or by later hooks in the same
/// chain.
pub fn deep_copy_record(record: &Record) -> Record {
    record
        .iter()
        .map(|(k, v)| (k.clone(), v.deep_copy()))
        .collect()
}
