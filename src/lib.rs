// SPDX-FileCopyrightText: 2025-2026 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

//! Runtime core of a resource-oriented ORM.
//!
//! Three tightly coupled subsystems live here:
//!
//! - [`schema`]/[`builder`]/[`validator`]/[`graph`]/[`registry`] — ingest
//!   validated upstream schema descriptions ([`ast`]) into a topologically
//!   ordered, cycle-checked graph of resources.
//! - [`loader`] — batches joined fetches across `belongs_to`/`has_one`/
//!   `has_many`/`has_many_through` to avoid N+1 queries, with recursive
//!   nested eager loading and lazy single-record resolution.
//! - [`transaction`]/[`hooks`]/[`queue`] — savepoint-based nested
//!   transactions, deadlock-aware retry, and a lifecycle hook engine that
//!   runs synchronous hooks in order while deferring async hooks to a
//!   bounded worker pool over deep-copied records.
//!
//! DSL parsing, SQL-dialect specifics beyond Postgres-style parameter
//! binding, HTTP routing, and persistence itself are external
//! collaborators: [`ast`] defines the shape the upstream compiler hands in,
//! [`driver`] defines the shape the downstream database driver exposes.
//!
//! # Quick start
//!
//! ```rust,ignore
//! use resource_orm::{registry::Registry, ast::ResourceNode};
//!
//! let registry = Registry::new();
//! registry.register(Registry::build_schema(&resource_node)?)?;
//! registry.validate_all()?;
//! let order = registry.dependency_order()?;
//! ```

#![warn(missing_docs, rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod ast;
pub mod builder;
#[cfg(feature = "postgres")]
pub mod driver;
pub mod error;
pub mod graph;
pub mod hooks;
pub mod loader;
pub mod queue;
pub mod registry;
pub mod schema;
pub mod transaction;
pub mod validator;

pub use error::OrmError;
pub use orm_types::{
    CascadeAction, Constraint, ConstraintKind, HookKind, OrderByClause, Primitive,
    RelationshipKind, Record, SortDirection, TypeSpec, Value
};
