// SPDX-FileCopyrightText: 2025-2026 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

//! The contract an upstream schema compiler hands in. This crate never
//! parses a schema DSL itself — [`builder`](crate::builder) only consumes
//! these node types, already validated for syntax by that external
//! collaborator.

use crate::schema::SourceLocation;

/// A literal or identifier expression in a constraint/scope-default
/// position. Only [`ConstraintArg::Literal`] is accepted by the builder;
/// an identifier in that position is a build error.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstraintArg {
    /// A literal value (string, number, bool, or null), already parsed by
    /// the upstream compiler.
    Literal(orm_types::Value),
    /// A bare identifier reference — rejected everywhere the builder
    /// consumes a `ConstraintArg`.
    Identifier(String)
}

/// Discriminator + payload for a type node, mirroring [`crate::schema`]'s
/// `TypeSpec` one level up, before nullability has been checked for
/// totality.
#[derive(Debug, Clone)]
pub enum TypeNode {
    /// A primitive type by name (e.g. `"string"`, `"uuid"`), with optional
    /// length or precision/scale parameters.
    Primitive {
        /// Primitive name, as written by the upstream source.
        name: String,
        /// `string(N)` length parameter.
        length: Option<u32>,
        /// `decimal(P,S)` precision parameter.
        precision: Option<u32>,
        /// `decimal(P,S)` scale parameter.
        scale: Option<u32>,
        /// Whether this position may hold null. `None` means the upstream
        /// source omitted the marker entirely.
        nullable: Option<bool>
    },
    /// An array of some element type.
    Array {
        /// Element type node.
        element: Box<TypeNode>,
        /// Whether the array itself may be null.
        nullable: Option<bool>
    },
    /// A string-keyed hash of some value type.
    Hash {
        /// Value type node.
        value: Box<TypeNode>,
        /// Whether the hash itself may be null.
        nullable: Option<bool>
    },
    /// A nested struct.
    Struct {
        /// Ordered `(name, type)` fields.
        fields: Vec<(String, TypeNode)>,
        /// Whether the struct itself may be null.
        nullable: Option<bool>
    },
    /// A finite enumeration of string values.
    EnumValues {
        /// Allowed values, in declaration order.
        values: Vec<String>,
        /// Whether this position may hold null.
        nullable: Option<bool>
    }
}

/// A constraint attached to a field, as the upstream compiler describes
/// it, before the builder resolves its kind and argument.
#[derive(Debug, Clone)]
pub struct ConstraintNode {
    /// Constraint kind name (e.g. `"min"`, `"pattern"`).
    pub kind: String,
    /// The constraint's argument.
    pub arg: ConstraintArg,
    /// Custom failure message, if declared.
    pub message: Option<String>,
    /// Where this constraint was declared.
    pub location: Option<SourceLocation>
}

/// A single field, as the upstream compiler describes it.
#[derive(Debug, Clone)]
pub struct FieldNode {
    /// Field name.
    pub name: String,
    /// The field's type node.
    pub type_node: TypeNode,
    /// Constraints attached to this field, in declaration order.
    pub constraints: Vec<ConstraintNode>,
    /// Annotation strings attached to this field.
    pub annotations: Vec<String>,
    /// Where this field was declared.
    pub location: Option<SourceLocation>
}

/// A relationship, as the upstream compiler describes it. String-typed
/// `kind`/`on_delete`/`on_update` are resolved against
/// [`orm_types::RelationshipKind`]/[`orm_types::CascadeAction`] by the
/// builder, which is where an unknown name becomes a build error.
#[derive(Debug, Clone)]
pub struct RelationshipNode {
    /// Relationship kind name (`"belongs_to"`, `"has_one"`, `"has_many"`,
    /// `"has_many_through"`).
    pub kind: String,
    /// Field name within the parent record.
    pub name: String,
    /// Target resource name.
    pub target_type: String,
    /// Whether the relationship may be null.
    pub nullable: Option<bool>,
    /// Explicit foreign key column, if the source set one.
    pub foreign_key: Option<String>,
    /// `on_delete` action name.
    pub on_delete: Option<String>,
    /// `on_update` action name.
    pub on_update: Option<String>,
    /// `ORDER BY` string, unparsed.
    pub order_by: Option<String>,
    /// For `has_many_through`: the join-table resource name.
    pub through: Option<String>,
    /// For `has_many_through`: the explicit join table name.
    pub join_table: Option<String>,
    /// For `has_many_through`: the explicit association key column.
    pub association_key: Option<String>,
    /// Where this relationship was declared.
    pub location: Option<SourceLocation>
}

/// A lifecycle hook declaration, as the upstream compiler describes it.
#[derive(Debug, Clone)]
pub struct HookNode {
    /// `"before"` or `"after"`.
    pub timing: String,
    /// `"create"`, `"update"`, `"delete"`, or `"save"`.
    pub event: String,
    /// Whether the hook must run inside the active transaction.
    pub is_transaction: bool,
    /// Whether the hook runs on the async worker pool.
    pub is_async: bool,
    /// Stable name identifying the hook body, used for diagnostics.
    pub body: String,
    /// Where this hook was declared.
    pub location: Option<SourceLocation>
}

/// A named query scope, as the upstream compiler describes it.
#[derive(Debug, Clone)]
pub struct ScopeNode {
    /// Scope name.
    pub name: String,
    /// Documentation, if any.
    pub doc: Option<String>,
    /// Where this scope was declared.
    pub location: Option<SourceLocation>
}

/// A computed field, as the upstream compiler describes it.
#[derive(Debug, Clone)]
pub struct ComputedNode {
    /// Field name.
    pub name: String,
    /// The computed value's type node.
    pub type_node: TypeNode,
    /// Documentation, if any.
    pub doc: Option<String>,
    /// Where this field was declared.
    pub location: Option<SourceLocation>
}

/// A resource, as the upstream compiler describes it — the root node the
/// builder translates into a [`crate::schema::ResourceSchema`].
#[derive(Debug, Clone)]
pub struct ResourceNode {
    /// Resource name.
    pub name: String,
    /// Documentation string, if any.
    pub doc: Option<String>,
    /// Where this resource was declared.
    pub location: Option<SourceLocation>,
    /// Field declarations.
    pub fields: Vec<FieldNode>,
    /// Relationship declarations.
    pub relationships: Vec<RelationshipNode>,
    /// Hook declarations.
    pub hooks: Vec<HookNode>,
    /// Multi-field constraint-block names and their referenced fields,
    /// carried as raw `(name, fields, description)` triples — the builder
    /// does not further interpret the description text.
    pub constraint_blocks: Vec<(String, Vec<String>, String)>,
    /// Scope declarations.
    pub scopes: Vec<ScopeNode>,
    /// Computed-field declarations.
    pub computed: Vec<ComputedNode>,
    /// Free-form invariant strings not otherwise interpreted by this core.
    pub invariants: Vec<String>
}
