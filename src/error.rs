// SPDX-FileCopyrightText: 2025-2026 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

//! Crate-level error type.
//!
//! One enum covers every subsystem's failure kind from schema build
//! through hook execution. Each variant documents its propagation policy
//! (surfaced to the caller vs. logged and swallowed) — see the module docs
//! on [`hooks`](crate::hooks) and [`queue`](crate::queue) for the kinds
//! that never reach here because they are logged at the point of failure
//! instead.

use std::{error::Error as StdError, fmt};

use orm_types::HookKind;

use crate::schema::SourceLocation;

/// Boxed driver error, kept opaque since the database driver is an
/// external collaborator accessed only through the [`crate::driver`]
/// trait surface.
pub type DriverError = Box<dyn StdError + Send + Sync>;

/// Every error this crate's public operations can return.
#[derive(Debug)]
pub enum OrmError {
    /// Schema Builder accumulated one or more errors while translating an
    /// upstream resource node.
    SchemaBuild {
        /// The resource being built, if known.
        resource: String,
        /// Every error collected during the build, in encounter order.
        errors: Vec<String>
    },
    /// Structural or cross-resource validation failed.
    SchemaValidation {
        /// Resource the failure concerns.
        resource: String,
        /// Field name, if the failure is field-scoped.
        field: Option<String>,
        /// Source location, if the upstream node carried one.
        location: Option<SourceLocation>,
        /// Human-readable description of the violated invariant.
        message: String,
        /// A remediation hint, when one is available.
        hint: Option<String>
    },
    /// A directed cycle was detected among `belongs_to` edges.
    CycleDetected {
        /// Each cycle, as the ordered path from the revisited resource
        /// back to itself.
        cycles: Vec<Vec<String>>
    },
    /// An eager-load or lazy-load request named a relationship the target
    /// resource does not declare.
    UnknownRelationship {
        /// Resource the lookup was attempted against.
        resource: String,
        /// The requested relationship name.
        name: String
    },
    /// A relationship exists but is not of the kind the operation expects.
    InvalidRelationType {
        /// Relationship field name.
        name: String,
        /// What the caller expected.
        expected: &'static str
    },
    /// A non-nullable lazy `belongs_to`/`has_one` lookup found no row.
    NoRecords {
        /// Relationship field name.
        relationship: String
    },
    /// An eager-load traversal exceeded [`crate::loader::LoadContext`]'s
    /// configured maximum depth.
    MaxDepthExceeded {
        /// The configured cap that was exceeded.
        max_depth: usize
    },
    /// The caller explicitly aborted a transaction.
    TransactionAborted(String),
    /// A transaction operation was attempted in a state that forbids it
    /// (double commit, commit-after-rollback, rollback-after-commit is not
    /// included here since that case is a documented no-op).
    TransactionState(&'static str),
    /// `BeginNested` was called on a handle that is not inside a live
    /// top-level transaction.
    NestedTransactionNotSupported,
    /// The transaction's context deadline elapsed before completion.
    TransactionTimeout,
    /// Every retry attempt was exhausted; wraps the last deadlock /
    /// serialization-classified error observed.
    Deadlock(Box<OrmError>),
    /// The caller's context was already cancelled before the first retry
    /// attempt.
    ContextCancelled,
    /// A synchronous hook returned an error; the hook chain stopped before
    /// running any later hooks.
    HookSyncFailure {
        /// The hook kind being executed.
        kind: HookKind,
        /// The underlying error the hook returned.
        source: Box<OrmError>
    },
    /// The schema registry rejected a duplicate registration, or a lookup
    /// found no schema by that name.
    Registry(String),
    /// Opaque error surfaced by the downstream database driver.
    Driver(DriverError)
}

impl fmt::Display for OrmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SchemaBuild { resource, errors } => {
                write!(
                    f,
                    "{} errors building resource {resource}: {}",
                    errors.len(),
                    errors.join("; ")
                )
            }
            Self::SchemaValidation {
                resource,
                field,
                location,
                message,
                hint
            } => {
                write!(f, "validation failed for resource {resource}")?;
                if let Some(field) = field {
                    write!(f, ", field {field}")?;
                }
                if let Some(location) = location {
                    write!(f, " at {location}")?;
                }
                write!(f, ": {message}")?;
                if let Some(hint) = hint {
                    write!(f, " (hint: {hint})")?;
                }
                Ok(())
            }
            Self::CycleDetected { cycles } => {
                let rendered: Vec<String> = cycles.iter().map(|c| c.join(" -> ")).collect();
                write!(f, "circular dependency detected: {}", rendered.join(", "))
            }
            Self::UnknownRelationship { resource, name } => {
                write!(f, "unknown relationship {name} on resource {resource}")
            }
            Self::InvalidRelationType { name, expected } => {
                write!(f, "relationship {name} is not a {expected} relationship")
            }
            Self::NoRecords { relationship } => {
                write!(f, "no record found for non-nullable relationship {relationship}")
            }
            Self::MaxDepthExceeded { max_depth } => {
                write!(f, "eager-load depth exceeded maximum of {max_depth}")
            }
            Self::TransactionAborted(reason) => write!(f, "transaction aborted: {reason}"),
            Self::TransactionState(reason) => write!(f, "invalid transaction state: {reason}"),
            Self::NestedTransactionNotSupported => {
                write!(f, "BeginNested requires a live top-level transaction")
            }
            Self::TransactionTimeout => write!(f, "transaction timed out"),
            Self::Deadlock(source) => write!(f, "deadlock after retries exhausted: {source}"),
            Self::ContextCancelled => write!(f, "context cancelled before first attempt"),
            Self::HookSyncFailure { kind, source } => {
                write!(f, "hook {kind} failed: {source}")
            }
            Self::Registry(msg) => write!(f, "registry error: {msg}"),
            Self::Driver(err) => write!(f, "driver error: {err}")
        }
    }
}

impl StdError for OrmError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Deadlock(source) | Self::HookSyncFailure { source, .. } => Some(source.as_ref()),
            Self::Driver(err) => Some(err.as_ref()),
            _ => None
        }
    }
}

impl OrmError {
    /// Whether this is a deadlock/serialization-conflict error (after
    /// retries were exhausted).
    pub const fn is_deadlock(&self) -> bool {
        matches!(self, Self::Deadlock(_))
    }

    /// Whether this is a timeout/deadline error.
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::TransactionTimeout)
    }

    /// Whether this is a cycle-detection error.
    pub const fn is_cycle(&self) -> bool {
        matches!(self, Self::CycleDetected { .. })
    }

    /// Whether this is a max-depth error.
    pub const fn is_max_depth(&self) -> bool {
        matches!(self, Self::MaxDepthExceeded { .. })
    }

    /// Whether this is the pre-cancelled-context short-circuit.
    pub const fn is_context_cancelled(&self) -> bool {
        matches!(self, Self::ContextCancelled)
    }

    /// Classify a raw driver error message against the known
    /// deadlock/serialization-conflict signatures: the Postgres state codes
    /// `40P01`/`40001`, or the substrings `deadlock detected`,
    /// `deadlock found`, `lock wait timeout exceeded`,
    /// `could not serialize access`.
    pub fn message_is_deadlock(message: &str) -> bool {
        const NEEDLES: [&str; 6] = [
            "40P01",
            "deadlock detected",
            "deadlock found",
            "lock wait timeout exceeded",
            "could not serialize access",
            "40001"
        ];
        NEEDLES.iter().any(|needle| message.contains(needle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_build_display_joins_errors_with_count() {
        let err = OrmError::SchemaBuild {
            resource: "Post".to_string(),
            errors: vec!["unknown type".to_string(), "missing primary key".to_string()]
        };
        let rendered = err.to_string();
        assert!(rendered.starts_with("2 errors"));
        assert!(rendered.contains("unknown type"));
        assert!(rendered.contains("missing primary key"));
    }

    #[test]
    fn cycle_display_renders_path() {
        let err = OrmError::CycleDetected {
            cycles: vec![vec!["Category".to_string(), "Category".to_string()]]
        };
        assert!(err.to_string().contains("Category -> Category"));
    }

    #[test]
    fn deadlock_is_deadlock_and_has_source() {
        let inner = OrmError::TransactionAborted("serialization failure".to_string());
        let err = OrmError::Deadlock(Box::new(inner));
        assert!(err.is_deadlock());
        assert!(StdError::source(&err).is_some());
    }

    #[test]
    fn message_is_deadlock_matches_known_signatures() {
        assert!(OrmError::message_is_deadlock("ERROR: deadlock detected"));
        assert!(OrmError::message_is_deadlock("SQLSTATE 40001"));
        assert!(OrmError::message_is_deadlock("could not serialize access due to concurrent update"));
        assert!(!OrmError::message_is_deadlock("syntax error near SELECT"));
    }

    #[test]
    fn is_predicates_are_exclusive() {
        let err = OrmError::TransactionTimeout;
        assert!(err.is_timeout());
        assert!(!err.is_deadlock());
        assert!(!err.is_cycle());
    }
}
