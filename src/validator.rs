// SPDX-FileCopyrightText: 2025-2026 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

//! Structural and cross-resource validation.
//!
//! [`validate_structural`] runs at registration time and never looks past
//! the schema being registered — it tolerates forward references to
//! resources that haven't been registered yet. [`validate_all`] runs once
//! every schema is in the registry and checks the things that require the
//! whole graph: relationship targets, cascade legality, FK type coherence.

use orm_types::{CascadeAction, ConstraintKind, Primitive, RelationshipKind};

use crate::{
    error::OrmError,
    schema::{Field, ResourceSchema}
};

/// Validate one schema in isolation: nullability totality, exactly-one
/// primary key, and per-field constraint/type compatibility. Does not
/// touch relationship targets.
pub fn validate_structural(schema: &ResourceSchema) -> Result<(), OrmError> {
    for field in &schema.fields {
        if !field.type_spec.nullability_total() {
            return Err(validation_error(
                schema,
                Some(&field.name),
                "nullability must be explicitly set on this field and every nested component",
                Some("set an explicit nullable marker on the field and any array/hash/struct component")
            ));
        }
        validate_field_constraints(schema, field)?;
    }

    match schema.primary_field_count() {
        1 => {}
        0 => {
            return Err(validation_error(
                schema,
                None,
                "resource has no field annotated as primary key",
                Some("annotate exactly one field as primary")
            ));
        }
        n => {
            return Err(validation_error(
                schema,
                None,
                &format!("resource has {n} fields annotated as primary key, exactly one is required"),
                None
            ));
        }
    }

    if let Some(primary) = schema.primary_field() {
        if primary.type_spec.nullable() {
            return Err(validation_error(
                schema,
                Some(&primary.name),
                "primary key field must not be nullable",
                None
            ));
        }
    }

    for relationship in &schema.relationships {
        if relationship.on_delete == CascadeAction::SetNull && !relationship.nullable {
            return Err(validation_error(
                schema,
                Some(&relationship.field_name),
                "on_delete=set_null requires the relationship to be nullable",
                None
            ));
        }
        if relationship.kind == RelationshipKind::HasManyThrough
            && relationship.through_resource.is_none()
            && relationship.join_table.is_none()
        {
            return Err(validation_error(
                schema,
                Some(&relationship.field_name),
                "has_many_through requires either a through resource or a join table",
                None
            ));
        }
    }

    Ok(())
}

fn validate_field_constraints(schema: &ResourceSchema, field: &Field) -> Result<(), OrmError> {
    let primitive = field.type_spec.as_primitive();
    for constraint in &field.constraints {
        if constraint.kind == ConstraintKind::Pattern {
            if let Some(primitive) = primitive {
                if !primitive.is_text_family() {
                    return Err(validation_error(
                        schema,
                        Some(&field.name),
                        "pattern constraint requires a text-family type",
                        None
                    ));
                }
            }
        }
        if matches!(constraint.kind, ConstraintKind::Unique | ConstraintKind::Index) {
            if let Some(primitive) = primitive {
                if primitive.forbids_unique_index() {
                    return Err(validation_error(
                        schema,
                        Some(&field.name),
                        &format!("{:?} is forbidden on {primitive:?} fields", constraint.kind),
                        None
                    ));
                }
            }
        }
    }
    Ok(())
}

/// Validate the full graph: every `belongs_to` target exists and exposes
/// a primary key, and primary keys are UUID-typed by this core's
/// convention. Cycle detection is delegated to
/// [`crate::graph::detect_cycles`] by the caller (the registry), since it
/// needs the whole edge map rather than one schema at a time.
pub fn validate_all<'a>(schema: &ResourceSchema, lookup: impl Fn(&str) -> Option<&'a ResourceSchema>) -> Result<(), OrmError> {
    for relationship in schema.belongs_to() {
        let Some(target) = lookup(&relationship.target_resource) else {
            return Err(validation_error(
                schema,
                Some(&relationship.field_name),
                &format!("target resource {} does not exist", relationship.target_resource),
                Some("register the target resource before validating")
            ));
        };

        let Some(primary) = target.primary_field() else {
            return Err(validation_error(
                schema,
                Some(&relationship.field_name),
                &format!("target resource {} has no primary key", relationship.target_resource),
                None
            ));
        };

        if primary.type_spec.as_primitive() != Some(Primitive::Uuid) {
            return Err(validation_error(
                schema,
                Some(&relationship.field_name),
                &format!(
                    "target resource {}'s primary key is not uuid-typed, which this core's foreign-key convention requires",
                    relationship.target_resource
                ),
                None
            ));
        }
    }
    Ok(())
}

fn validation_error(schema: &ResourceSchema, field: Option<&str>, message: &str, hint: Option<&str>) -> OrmError {
    OrmError::SchemaValidation {
        resource: schema.name.clone(),
        field: field.map(str::to_string),
        location: schema.location.clone(),
        message: message.to_string(),
        hint: hint.map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use orm_types::{Constraint, TypeSpec, Value};

    use super::*;
    use crate::schema::Relationship;

    fn uuid_field(name: &str, primary: bool) -> Field {
        let mut constraints = Vec::new();
        if primary {
            constraints.push(Constraint {
                kind: ConstraintKind::Primary,
                value: Value::Null,
                message: None
            });
        }
        Field {
            name: name.to_string(),
            type_spec: TypeSpec::scalar(Primitive::Uuid, false),
            constraints,
            annotations: Vec::new(),
            nested: Vec::new()
        }
    }

    fn schema(name: &str, fields: Vec<Field>, relationships: Vec<Relationship>) -> ResourceSchema {
        ResourceSchema {
            name: name.to_string(),
            table_name: ResourceSchema::default_table_name(name),
            fields,
            relationships,
            hooks: BTreeMap::new(),
            scopes: Vec::new(),
            computed_fields: Vec::new(),
            constraint_blocks: Vec::new(),
            invariants: Vec::new(),
            doc: None,
            location: None
        }
    }

    #[test]
    fn structural_passes_with_single_primary_key() {
        let s = schema("User", vec![uuid_field("id", true)], vec![]);
        assert!(validate_structural(&s).is_ok());
    }

    #[test]
    fn structural_fails_with_no_primary_key() {
        let s = schema("User", vec![uuid_field("id", false)], vec![]);
        let err = validate_structural(&s).unwrap_err();
        assert!(err.to_string().contains("no field annotated"));
    }

    #[test]
    fn structural_fails_with_nullable_primary_key() {
        let mut field = uuid_field("id", true);
        field.type_spec = TypeSpec::scalar(Primitive::Uuid, true);
        let s = schema("User", vec![field], vec![]);
        let err = validate_structural(&s).unwrap_err();
        assert!(err.to_string().contains("must not be nullable"));
    }

    #[test]
    fn structural_fails_on_missing_nullability_marker() {
        let mut field = uuid_field("id", true);
        field.type_spec = TypeSpec::Scalar {
            primitive: Primitive::Uuid,
            params: orm_types::Params::default(),
            nullable: false,
            nullability_set: false
        };
        let s = schema("User", vec![field], vec![]);
        let err = validate_structural(&s).unwrap_err();
        assert!(err.to_string().contains("nullability must be explicitly set"));
    }

    #[test]
    fn validate_all_fails_on_missing_target() {
        let s = schema(
            "Post",
            vec![uuid_field("id", true)],
            vec![Relationship {
                kind: RelationshipKind::BelongsTo,
                field_name: "author".to_string(),
                target_resource: "User".to_string(),
                foreign_key: "user_id".to_string(),
                nullable: false,
                on_delete: CascadeAction::Restrict,
                on_update: CascadeAction::Restrict,
                order_by: Vec::new(),
                through_resource: None,
                join_table: None,
                association_key: None
            }]
        );
        let err = validate_all(&s, |_| None).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn validate_all_fails_when_target_primary_key_is_not_uuid() {
        let mut non_uuid_primary = uuid_field("id", true);
        non_uuid_primary.type_spec = TypeSpec::scalar(Primitive::BigInt, false);
        let user = schema("User", vec![non_uuid_primary], vec![]);
        let post = schema(
            "Post",
            vec![uuid_field("id", true)],
            vec![Relationship {
                kind: RelationshipKind::BelongsTo,
                field_name: "author".to_string(),
                target_resource: "User".to_string(),
                foreign_key: "user_id".to_string(),
                nullable: false,
                on_delete: CascadeAction::Restrict,
                on_update: CascadeAction::Restrict,
                order_by: Vec::new(),
                through_resource: None,
                join_table: None,
                association_key: None
            }]
        );
        let err = validate_all(&post, |name| if name == "User" { Some(&user) } else { None }).unwrap_err();
        assert!(err.to_string().contains("not uuid-typed"));
    }

    #[test]
    fn validate_all_passes_for_well_formed_belongs_to() {
        let user = schema("User", vec![uuid_field("id", true)], vec![]);
        let post = schema(
            "Post",
            vec![uuid_field("id", true)],
            vec![Relationship {
                kind: RelationshipKind::BelongsTo,
                field_name: "author".to_string(),
                target_resource: "User".to_string(),
                foreign_key: "user_id".to_string(),
                nullable: false,
                on_delete: CascadeAction::Restrict,
                on_update: CascadeAction::Restrict,
                order_by: Vec::new(),
                through_resource: None,
                join_table: None,
                association_key: None
            }]
        );
        assert!(validate_all(&post, |name| if name == "User" { Some(&user) } else { None }).is_ok());
    }
}
