// SPDX-FileCopyrightText: 2025-2026 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

//! In-memory schema model: [`ResourceSchema`] and everything it's built
//! from. These types are the output of [`crate::builder`] and the input to
//! [`crate::validator`], [`crate::graph`], and [`crate::loader`].

use std::{collections::BTreeMap, fmt};

use convert_case::{Case, Casing};
use orm_types::{CascadeAction, Constraint, HookKind, OrderByClause, RelationshipKind, TypeSpec};

/// Where a schema element came from in the upstream source, for
/// diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SourceLocation {
    /// Source file or module path, as reported by the upstream compiler.
    pub file: String,
    /// 1-based line number.
    pub line: u32,
    /// 1-based column number.
    pub column: u32
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

/// A single field on a resource.
///
/// Mutable only during build; once the enclosing [`ResourceSchema`] is
/// registered, callers should treat a `Field` as frozen — the registry
/// never exposes a mutable reference to a registered schema.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    /// Field name.
    pub name: String,
    /// The field's type.
    pub type_spec: TypeSpec,
    /// Constraints, in declaration order.
    pub constraints: Vec<Constraint>,
    /// Annotations (upstream markers not modeled as constraints, e.g.
    /// documentation tags).
    pub annotations: Vec<String>,
    /// Nested struct fields, when `type_spec` is a `Struct` and the
    /// upstream source also attached per-component field metadata
    /// (constraints/annotations) rather than leaving the struct opaque.
    pub nested: Vec<Field>
}

impl Field {
    /// Whether this field carries the `primary` constraint.
    pub fn is_primary(&self) -> bool {
        self.constraints
            .iter()
            .any(|c| c.kind == orm_types::ConstraintKind::Primary)
    }

    /// Whether this field carries a `Default` constraint.
    pub fn has_default(&self) -> bool {
        self.constraints
            .iter()
            .any(|c| c.kind == orm_types::ConstraintKind::Default)
    }

    /// Whether this field is required (non-nullable, no default).
    pub fn is_required(&self) -> bool {
        !self.type_spec.nullable() && !self.has_default()
    }
}

/// A relationship from this resource to another.
#[derive(Debug, Clone, PartialEq)]
pub struct Relationship {
    /// Which kind of relationship this is.
    pub kind: RelationshipKind,
    /// Name the relationship is keyed under on the parent record.
    pub field_name: String,
    /// The related resource's name.
    pub target_resource: String,
    /// Foreign key column name.
    pub foreign_key: String,
    /// Whether the relationship (and, for `belongs_to`, the foreign key)
    /// may be null.
    pub nullable: bool,
    /// Action to take on the target's deletion.
    pub on_delete: CascadeAction,
    /// Action to take on the target's update.
    pub on_update: CascadeAction,
    /// Parsed `ORDER BY` clauses applied when loading this relationship.
    pub order_by: Vec<OrderByClause>,
    /// For `HasManyThrough`: the join-table resource, if the upstream
    /// source named one explicitly rather than only a join table string.
    pub through_resource: Option<String>,
    /// For `HasManyThrough`: the join table name.
    pub join_table: Option<String>,
    /// For `HasManyThrough`: the column on the join table referencing the
    /// target's primary key.
    pub association_key: Option<String>
}

impl Relationship {
    /// Default foreign key for a `belongs_to` relationship: `snake(target)_id`.
    pub fn default_belongs_to_fk(target_resource: &str) -> String {
        format!("{}_id", target_resource.to_case(Case::Snake))
    }

    /// Default foreign key for `has_one`/`has_many`: `snake(parent)_id`.
    pub fn default_has_fk(parent_resource: &str) -> String {
        format!("{}_id", parent_resource.to_case(Case::Snake))
    }

    /// Default join table name for `has_many_through`:
    /// `snake(parent)_snake(target)s`.
    pub fn default_join_table(parent_resource: &str, target_resource: &str) -> String {
        format!(
            "{}_{}s",
            parent_resource.to_case(Case::Snake),
            target_resource.to_case(Case::Snake)
        )
    }

    /// Default association key for `has_many_through`: `snake(target)_id`.
    pub fn default_association_key(target_resource: &str) -> String {
        format!("{}_id", target_resource.to_case(Case::Snake))
    }
}

/// A lifecycle hook attached to a resource.
#[derive(Debug, Clone)]
pub struct Hook {
    /// Which lifecycle event this hook runs on.
    pub kind: HookKind,
    /// Whether this hook must run inside the active transaction.
    pub transactional: bool,
    /// Whether this hook runs on the async worker pool rather than
    /// synchronously in the caller's chain.
    pub is_async: bool,
    /// The executable body. Carries a stable per-hook name for log/error
    /// messages and test assertions (ordering laws key on this).
    pub name: String
}

/// A named, reusable query scope (e.g. `published`, `active`).
#[derive(Debug, Clone)]
pub struct Scope {
    /// Scope name.
    pub name: String,
    /// Documentation, if any.
    pub doc: Option<String>
}

/// A field computed from others rather than stored directly.
#[derive(Debug, Clone)]
pub struct ComputedField {
    /// Field name.
    pub name: String,
    /// The computed value's type.
    pub type_spec: TypeSpec,
    /// Documentation, if any.
    pub doc: Option<String>
}

/// A named group of constraints that span multiple fields (e.g. a
/// check constraint referencing two columns).
#[derive(Debug, Clone)]
pub struct ConstraintBlock {
    /// Block name.
    pub name: String,
    /// Fields this block's constraint(s) reference.
    pub fields: Vec<String>,
    /// Description of the invariant being enforced.
    pub description: String
}

/// A validated, named entity: the unit the registry stores and the
/// loader/transaction/hook layers operate against.
///
/// Invariant: every `ResourceSchema` has exactly one field annotated
/// `primary`, and that field is non-nullable — enforced by
/// [`crate::validator`] before a schema is accepted into the registry.
#[derive(Debug, Clone)]
pub struct ResourceSchema {
    /// Resource name, as declared upstream.
    pub name: String,
    /// Table name; derived as the snake_case plural of `name` unless the
    /// upstream source set one explicitly.
    pub table_name: String,
    /// Fields, kept ordered by name.
    pub fields: Vec<Field>,
    /// Relationships, in declaration order.
    pub relationships: Vec<Relationship>,
    /// Hooks, indexed by kind.
    pub hooks: BTreeMap<HookKind, Vec<Hook>>,
    /// Named query scopes.
    pub scopes: Vec<Scope>,
    /// Computed (non-stored) fields.
    pub computed_fields: Vec<ComputedField>,
    /// Multi-field constraint blocks.
    pub constraint_blocks: Vec<ConstraintBlock>,
    /// Free-form documented invariants the upstream source declared that
    /// this core does not itself interpret (kept for downstream tooling).
    pub invariants: Vec<String>,
    /// Documentation string, if any.
    pub doc: Option<String>,
    /// Where this resource was declared.
    pub location: Option<SourceLocation>
}

impl ResourceSchema {
    /// Derive the default table name: snake_case, naively pluralized by
    /// appending `s` (matching the teacher's `{snake}s` convention for
    /// relation target tables).
    pub fn default_table_name(resource_name: &str) -> String {
        format!("{}s", resource_name.to_case(Case::Snake))
    }

    /// The field carrying the `primary` constraint, if exactly one exists.
    ///
    /// Returns `None` both when there is no primary field and when there
    /// is more than one — callers that need to distinguish those cases use
    /// [`Self::primary_field_count`] first, which is what the validator
    /// does to produce a precise diagnostic.
    pub fn primary_field(&self) -> Option<&Field> {
        let mut found = None;
        for field in &self.fields {
            if field.is_primary() {
                if found.is_some() {
                    return None;
                }
                found = Some(field);
            }
        }
        found
    }

    /// How many fields carry the `primary` constraint.
    pub fn primary_field_count(&self) -> usize {
        self.fields.iter().filter(|f| f.is_primary()).count()
    }

    /// Find a field by name.
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Find a relationship by its field name.
    pub fn relationship(&self, name: &str) -> Option<&Relationship> {
        self.relationships.iter().find(|r| r.field_name == name)
    }

    /// Hooks registered for a given kind; empty slice when none were
    /// registered, never a missing-key distinction the caller must handle.
    pub fn hooks_for(&self, kind: HookKind) -> &[Hook] {
        self.hooks.get(&kind).map_or(&[], Vec::as_slice)
    }

    /// `belongs_to` relationships only — the edges the relationship graph
    /// is built from.
    pub fn belongs_to(&self) -> impl Iterator<Item = &Relationship> {
        self.relationships
            .iter()
            .filter(|r| r.kind == RelationshipKind::BelongsTo)
    }
}
