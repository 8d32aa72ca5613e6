// SPDX-FileCopyrightText: 2025-2026 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

//! The type model: primitives, composite type specs, constraints, cascade
//! actions, relationship kinds, and hook kinds.

use std::fmt;

/// A primitive scalar type a [`Field`](crate::value::Record) may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    /// Short text.
    String,
    /// Unbounded text.
    Text,
    /// Markdown-flavored text.
    Markdown,
    /// 32-bit signed integer.
    Int,
    /// 64-bit signed integer.
    BigInt,
    /// 64-bit float.
    Float,
    /// Arbitrary-precision decimal, parameterized by precision+scale.
    Decimal,
    /// Boolean.
    Bool,
    /// Timestamp with time zone.
    Timestamp,
    /// Calendar date.
    Date,
    /// Time of day.
    Time,
    /// UUID.
    Uuid,
    /// ULID.
    Ulid,
    /// Email address (stored as text, validated at the boundary).
    Email,
    /// URL (stored as text, validated at the boundary).
    Url,
    /// Phone number (stored as text, validated at the boundary).
    Phone,
    /// JSON value.
    Json,
    /// Binary JSON value (Postgres `jsonb`-flavored).
    Jsonb,
    /// Finite enumeration of string values.
    Enum
}

impl Primitive {
    /// Parse a primitive type name as used by upstream schema sources.
    ///
    /// Returns `None` for unknown names — the builder turns that into a
    /// build error rather than guessing.
    pub fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "string" => Self::String,
            "text" => Self::Text,
            "markdown" => Self::Markdown,
            "int" => Self::Int,
            "bigint" => Self::BigInt,
            "float" => Self::Float,
            "decimal" => Self::Decimal,
            "bool" => Self::Bool,
            "timestamp" => Self::Timestamp,
            "date" => Self::Date,
            "time" => Self::Time,
            "uuid" => Self::Uuid,
            "ulid" => Self::Ulid,
            "email" => Self::Email,
            "url" => Self::Url,
            "phone" => Self::Phone,
            "json" => Self::Json,
            "jsonb" => Self::Jsonb,
            "enum" => Self::Enum,
            _ => return None
        })
    }

    /// Whether this primitive belongs to the "text family" (used by the
    /// `Pattern` constraint compatibility check).
    pub const fn is_text_family(&self) -> bool {
        matches!(
            self,
            Self::String | Self::Text | Self::Markdown | Self::Email | Self::Url | Self::Phone
        )
    }

    /// Whether `Unique`/`Index` constraints are forbidden on this primitive.
    pub const fn forbids_unique_index(&self) -> bool {
        matches!(self, Self::Text | Self::Json | Self::Jsonb)
    }
}

/// Parameterization carried by a scalar `TypeSpec` (`string(N)`,
/// `decimal(P,S)`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Params {
    /// Length bound, for `string(N)`.
    pub length: Option<u32>,
    /// Precision, for `decimal(P,S)`.
    pub precision: Option<u32>,
    /// Scale, for `decimal(P,S)`.
    pub scale: Option<u32>
}

/// Tagged union of every shape a field's type may take.
///
/// Every variant, including nested ones, carries nullability explicitly —
/// [`TypeSpec::nullability_set`] reports whether that marker has actually
/// been provided, since a missing marker on a composite's inner component
/// is a validation error rather than an implicit default.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeSpec {
    /// A scalar primitive, with optional length/precision/scale.
    Scalar {
        /// The primitive kind.
        primitive: Primitive,
        /// Parameterization (length or precision+scale).
        params: Params,
        /// Whether this position may hold `null`.
        nullable: bool,
        /// Whether `nullable` was explicitly set by the upstream source.
        nullability_set: bool
    },
    /// An array of some element type; the element's own nullability is
    /// recorded on the nested `TypeSpec`.
    Array {
        /// Element type.
        element: Box<TypeSpec>,
        /// Whether the array itself may be `null`.
        nullable: bool,
        /// Whether `nullable` was explicitly set.
        nullability_set: bool
    },
    /// A homogeneous string-keyed hash of `key -> value`.
    Hash {
        /// Key type.
        key: Box<TypeSpec>,
        /// Value type.
        value: Box<TypeSpec>,
        /// Whether the hash itself may be `null`.
        nullable: bool,
        /// Whether `nullable` was explicitly set.
        nullability_set: bool
    },
    /// A named-field struct (nested record shape).
    Struct {
        /// Ordered `(name, type)` pairs; order follows declaration order.
        fields: Vec<(String, TypeSpec)>,
        /// Whether the struct itself may be `null`.
        nullable: bool,
        /// Whether `nullable` was explicitly set.
        nullability_set: bool
    },
    /// A finite enumeration of string values.
    EnumValues {
        /// The allowed values, in declaration order.
        values: Vec<String>,
        /// Whether this position may hold `null`.
        nullable: bool,
        /// Whether `nullable` was explicitly set.
        nullability_set: bool
    }
}

impl TypeSpec {
    /// Construct a non-parameterized, nullability-set scalar.
    pub const fn scalar(primitive: Primitive, nullable: bool) -> Self {
        Self::Scalar {
            primitive,
            params: Params {
                length: None,
                precision: None,
                scale: None
            },
            nullable,
            nullability_set: true
        }
    }

    /// Whether this spec (at its own level) may hold `null`.
    pub const fn nullable(&self) -> bool {
        match self {
            Self::Scalar { nullable, .. }
            | Self::Array { nullable, .. }
            | Self::Hash { nullable, .. }
            | Self::Struct { nullable, .. }
            | Self::EnumValues { nullable, .. } => *nullable
        }
    }

    /// Whether nullability was explicitly provided for this spec.
    pub const fn nullability_set(&self) -> bool {
        match self {
            Self::Scalar {
                nullability_set, ..
            }
            | Self::Array {
                nullability_set, ..
            }
            | Self::Hash {
                nullability_set, ..
            }
            | Self::Struct {
                nullability_set, ..
            }
            | Self::EnumValues {
                nullability_set, ..
            } => *nullability_set
        }
    }

    /// Check nullability totality: this spec and every nested component
    /// has `nullability_set == true`.
    pub fn nullability_total(&self) -> bool {
        if !self.nullability_set() {
            return false;
        }
        match self {
            Self::Scalar { .. } | Self::EnumValues { .. } => true,
            Self::Array { element, .. } => element.nullability_total(),
            Self::Hash { key, value, .. } => key.nullability_total() && value.nullability_total(),
            Self::Struct { fields, .. } => fields.iter().all(|(_, t)| t.nullability_total())
        }
    }

    /// Mirror a `Max` constraint value into this spec's `Params::length`,
    /// as the builder does for text fields to aid downstream storage
    /// sizing.
    pub fn set_length_hint(&mut self, length: u32) {
        if let Self::Scalar { params, .. } = self {
            params.length = Some(length);
        }
    }

    /// The underlying primitive, if this spec is a scalar.
    pub const fn as_primitive(&self) -> Option<Primitive> {
        match self {
            Self::Scalar { primitive, .. } => Some(*primitive),
            _ => None
        }
    }
}

/// Constraint kind attached to a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintKind {
    /// Minimum numeric value or minimum length.
    Min,
    /// Maximum numeric value or maximum length.
    Max,
    /// Regular-expression pattern (text-family types only).
    Pattern,
    /// Unique index.
    Unique,
    /// Non-unique index.
    Index,
    /// Primary key marker.
    Primary,
    /// Auto-generated on insert.
    Auto,
    /// Auto-updated on every write.
    AutoUpdate,
    /// Default value.
    Default
}

impl ConstraintKind {
    /// Parse a constraint kind name as used by upstream schema sources.
    pub fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "min" => Self::Min,
            "max" => Self::Max,
            "pattern" => Self::Pattern,
            "unique" => Self::Unique,
            "index" => Self::Index,
            "primary" => Self::Primary,
            "auto" => Self::Auto,
            "auto_update" => Self::AutoUpdate,
            "default" => Self::Default,
            _ => return None
        })
    }
}

/// A single constraint on a field: kind, literal value, optional custom
/// error message.
#[derive(Debug, Clone, PartialEq)]
pub struct Constraint {
    /// Which constraint this is.
    pub kind: ConstraintKind,
    /// The literal value the constraint carries (e.g. the pattern text,
    /// the min/max bound, the default value).
    pub value: crate::value::Value,
    /// Custom validation failure message, if the upstream source provided
    /// one.
    pub message: Option<String>
}

/// Cascade behavior for the "one" side of a `belongs_to` relationship when
/// its target is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CascadeAction {
    /// Forbid deletion of the target while referencing rows exist.
    #[default]
    Restrict,
    /// Delete referencing rows along with the target.
    Cascade,
    /// Null out the foreign key on referencing rows.
    SetNull,
    /// Do nothing at the ORM layer (defer to the database default).
    NoAction
}

impl CascadeAction {
    /// Parse an `on_delete`/`on_update` action name.
    pub fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "restrict" => Self::Restrict,
            "cascade" => Self::Cascade,
            "set_null" => Self::SetNull,
            "no_action" => Self::NoAction,
            _ => return None
        })
    }
}

/// Relationship kind between two resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationshipKind {
    /// Child holds the foreign key, pointing at its parent.
    BelongsTo,
    /// Parent-side, at most one child row per parent.
    HasOne,
    /// Parent-side, any number of child rows.
    HasMany,
    /// Many-to-many via an explicit join table.
    HasManyThrough
}

/// Lifecycle hook timing × event: eight combinations in total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HookKind {
    /// Before a record is created.
    BeforeCreate,
    /// After a record is created.
    AfterCreate,
    /// Before a record is updated.
    BeforeUpdate,
    /// After a record is updated.
    AfterUpdate,
    /// Before a record is deleted.
    BeforeDelete,
    /// After a record is deleted.
    AfterDelete,
    /// Before any save (create or update).
    BeforeSave,
    /// After any save (create or update).
    AfterSave
}

impl HookKind {
    /// All eight kinds, in a stable order — used by the registry's
    /// "empty slice, not missing key" lookups.
    pub const ALL: [Self; 8] = [
        Self::BeforeCreate,
        Self::AfterCreate,
        Self::BeforeUpdate,
        Self::AfterUpdate,
        Self::BeforeDelete,
        Self::AfterDelete,
        Self::BeforeSave,
        Self::AfterSave
    ];

    /// The `snake_case` name used in error messages and logs.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::BeforeCreate => "before_create",
            Self::AfterCreate => "after_create",
            Self::BeforeUpdate => "before_update",
            Self::AfterUpdate => "after_update",
            Self::BeforeDelete => "before_delete",
            Self::AfterDelete => "after_delete",
            Self::BeforeSave => "before_save",
            Self::AfterSave => "after_save"
        }
    }
}

impl fmt::Display for HookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sort direction for an `ORDER BY` clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    /// Ascending order.
    #[default]
    Asc,
    /// Descending order.
    Desc
}

impl SortDirection {
    /// Convert to the SQL keyword.
    pub const fn as_sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC"
        }
    }

    /// Parse the direction token of an `ORDER BY` clause. Only `ASC`/`DESC`
    /// (case-insensitive) are accepted.
    pub fn parse(token: &str) -> Option<Self> {
        match token.to_ascii_uppercase().as_str() {
            "ASC" => Some(Self::Asc),
            "DESC" => Some(Self::Desc),
            _ => None
        }
    }
}

/// One parsed `column [ASC|DESC]` clause from a relationship's `OrderBy`
/// string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderByClause {
    /// Column name, unquoted.
    pub column: String,
    /// Direction; defaults to ascending when omitted.
    pub direction: SortDirection
}

impl OrderByClause {
    /// Parse a comma-separated `OrderBy` string into clauses.
    ///
    /// Each comma-separated term is split into at most two whitespace
    /// tokens (column, direction); a third token or an unrecognized
    /// direction causes that *direction* token to be dropped, keeping only
    /// the column at `Asc`.
    pub fn parse_list(order_by: &str) -> Vec<Self> {
        order_by
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|clause| {
                let mut tokens = clause.split_whitespace();
                let column = tokens.next().unwrap_or_default().to_string();
                let direction = tokens
                    .next()
                    .and_then(SortDirection::parse)
                    .unwrap_or_default();
                Self { column, direction }
            })
            .collect()
    }
}

impl fmt::Display for OrderByClause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.column, self.direction.as_sql())
    }
}
