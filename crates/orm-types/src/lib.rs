// SPDX-FileCopyrightText: 2025-2026 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

//! Type model and dynamic record value shared by `resource-orm`.
//!
//! This crate is dependency-light by design: it defines the *data* the
//! runtime core operates on, not the machinery (registry, loader,
//! transactions, hooks) that operates on it.
//!
//! # Overview
//!
//! - [`value`] — the dynamic, tagged-union [`Value`] and [`Record`] that
//!   back every schema-described row, since the schema set itself is
//!   data-defined at runtime rather than known at compile time.
//! - [`types`] — the type model: [`Primitive`], [`TypeSpec`],
//!   [`Constraint`]/[`ConstraintKind`], [`CascadeAction`],
//!   [`RelationshipKind`], [`HookKind`], and [`SortDirection`].

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod types;
pub mod value;

pub use types::{
    CascadeAction, Constraint, ConstraintKind, HookKind, OrderByClause, Primitive,
    RelationshipKind, SortDirection, TypeSpec
};
pub use value::{deep_copy_record, Record, Value};
