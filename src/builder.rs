// SPDX-FileCopyrightText: 2025-2026 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

//! Translates validated upstream [`ast`](crate::ast) nodes into in-memory
//! [`ResourceSchema`](crate::schema::ResourceSchema) records.
//!
//! `build` never short-circuits on the first problem: every field,
//! relationship, and hook is attempted, and every failure is collected
//! into one [`crate::error::OrmError::SchemaBuild`] so a caller sees the
//! whole list of what's wrong with a resource in one pass.

use std::collections::BTreeMap;

use orm_types::{CascadeAction, Constraint, ConstraintKind, HookKind, OrderByClause, Primitive, RelationshipKind, TypeSpec, Value};

use crate::{
    ast::{ComputedNode, ConstraintArg, ConstraintNode, FieldNode, HookNode, RelationshipNode, ResourceNode, ScopeNode, TypeNode},
    error::OrmError,
    schema::{ComputedField, ConstraintBlock, Field, Hook, Relationship, ResourceSchema, Scope}
};

/// Non-fatal issues collected alongside a successful build, surfaced to
/// callers that want to log them (the registry does not reject a schema
/// for carrying warnings).
pub type Warnings = Vec<String>;

/// Translate one [`ResourceNode`] into a [`ResourceSchema`].
///
/// Returns every accumulated error joined into one
/// [`OrmError::SchemaBuild`] if anything failed; otherwise the schema plus
/// any non-fatal warnings.
pub fn build(node: &ResourceNode) -> Result<(ResourceSchema, Warnings), OrmError> {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    let fields = build_fields(&node.fields, &mut errors, &mut warnings);
    let relationships = build_relationships(&node.name, &node.relationships, &mut errors);
    let hooks = build_hooks(&node.hooks, &mut errors);
    let scopes = build_scopes(&node.scopes);
    let computed_fields = build_computed(&node.computed, &mut errors);
    let constraint_blocks = node
        .constraint_blocks
        .iter()
        .map(|(name, fields, description)| ConstraintBlock {
            name: name.clone(),
            fields: fields.clone(),
            description: description.clone()
        })
        .collect();

    if !errors.is_empty() {
        return Err(OrmError::SchemaBuild {
            resource: node.name.clone(),
            errors
        });
    }

    let schema = ResourceSchema {
        name: node.name.clone(),
        table_name: ResourceSchema::default_table_name(&node.name),
        fields,
        relationships,
        hooks,
        scopes,
        computed_fields,
        constraint_blocks,
        invariants: node.invariants.clone(),
        doc: node.doc.clone(),
        location: node.location.clone()
    };
    Ok((schema, warnings))
}

fn build_fields(nodes: &[FieldNode], errors: &mut Vec<String>, warnings: &mut Vec<String>) -> Vec<Field> {
    let mut fields: Vec<Field> = nodes
        .iter()
        .filter_map(|node| build_field(node, errors, warnings))
        .collect();
    fields.sort_by(|a, b| a.name.cmp(&b.name));
    fields
}

fn build_field(node: &FieldNode, errors: &mut Vec<String>, warnings: &mut Vec<String>) -> Option<Field> {
    let mut type_spec = build_type(&node.type_node, errors, &node.name)?;

    let mut constraints = Vec::with_capacity(node.constraints.len());
    let mut has_default = false;
    for constraint_node in &node.constraints {
        if let Some(constraint) = build_constraint(&node.name, constraint_node, &mut type_spec, errors) {
            if constraint.kind == ConstraintKind::Default {
                has_default = true;
            }
            constraints.push(constraint);
        }
    }

    if type_spec.nullable() && has_default {
        warnings.push(format!("field {}: optional field carries a default value", node.name));
    }

    Some(Field {
        name: node.name.clone(),
        type_spec,
        constraints,
        annotations: node.annotations.clone(),
        nested: Vec::new()
    })
}

fn build_type(node: &TypeNode, errors: &mut Vec<String>, field_name: &str) -> Option<TypeSpec> {
    match node {
        TypeNode::Primitive {
            name,
            length,
            precision,
            scale,
            nullable
        } => {
            let Some(primitive) = Primitive::parse(name) else {
                errors.push(format!("field {field_name}: unknown primitive type {name:?}"));
                return None;
            };
            let Some(nullable) = *nullable else {
                errors.push(format!("field {field_name}: missing nullability marker"));
                return None;
            };
            Some(TypeSpec::Scalar {
                primitive,
                params: orm_types::Params {
                    length: *length,
                    precision: *precision,
                    scale: *scale
                },
                nullable,
                nullability_set: true
            })
        }
        TypeNode::Array { element, nullable } => {
            let element = build_type(element, errors, field_name)?;
            let Some(nullable) = *nullable else {
                errors.push(format!("field {field_name}: missing nullability marker on array"));
                return None;
            };
            Some(TypeSpec::Array {
                element: Box::new(element),
                nullable,
                nullability_set: true
            })
        }
        TypeNode::Hash { value, nullable } => {
            let value_spec = build_type(value, errors, field_name)?;
            let Some(nullable) = *nullable else {
                errors.push(format!("field {field_name}: missing nullability marker on hash"));
                return None;
            };
            Some(TypeSpec::Hash {
                key: Box::new(TypeSpec::scalar(Primitive::String, false)),
                value: Box::new(value_spec),
                nullable,
                nullability_set: true
            })
        }
        TypeNode::Struct { fields, nullable } => {
            let mut built = Vec::with_capacity(fields.len());
            for (name, field_type) in fields {
                let spec = build_type(field_type, errors, field_name)?;
                built.push((name.clone(), spec));
            }
            let Some(nullable) = *nullable else {
                errors.push(format!("field {field_name}: missing nullability marker on struct"));
                return None;
            };
            Some(TypeSpec::Struct {
                fields: built,
                nullable,
                nullability_set: true
            })
        }
        TypeNode::EnumValues { values, nullable } => {
            let Some(nullable) = *nullable else {
                errors.push(format!("field {field_name}: missing nullability marker on enum"));
                return None;
            };
            Some(TypeSpec::EnumValues {
                values: values.clone(),
                nullable,
                nullability_set: true
            })
        }
    }
}

fn build_constraint(field_name: &str, node: &ConstraintNode, type_spec: &mut TypeSpec, errors: &mut Vec<String>) -> Option<Constraint> {
    let Some(kind) = ConstraintKind::parse(&node.kind) else {
        errors.push(format!("field {field_name}: unknown constraint {:?}", node.kind));
        return None;
    };

    let value = match &node.arg {
        ConstraintArg::Literal(value) => value.clone(),
        ConstraintArg::Identifier(name) => {
            errors.push(format!(
                "field {field_name}: constraint {kind:?} argument {name:?} is an identifier, only literals are accepted"
            ));
            return None;
        }
    };

    if kind == ConstraintKind::Pattern {
        if let Some(primitive) = type_spec.as_primitive() {
            if !primitive.is_text_family() {
                errors.push(format!("field {field_name}: pattern constraint requires a text-family type"));
                return None;
            }
        }
    }

    if matches!(kind, ConstraintKind::Unique | ConstraintKind::Index) {
        if let Some(primitive) = type_spec.as_primitive() {
            if primitive.forbids_unique_index() {
                errors.push(format!("field {field_name}: {kind:?} is forbidden on {primitive:?}"));
                return None;
            }
        }
    }

    if kind == ConstraintKind::Max {
        if let (Some(primitive), Value::Int(n)) = (type_spec.as_primitive(), &value) {
            if primitive.is_text_family() && *n >= 0 {
                type_spec.set_length_hint(*n as u32);
            }
        }
    }

    Some(Constraint {
        kind,
        value,
        message: node.message.clone()
    })
}

fn build_relationships(resource_name: &str, nodes: &[RelationshipNode], errors: &mut Vec<String>) -> Vec<Relationship> {
    nodes
        .iter()
        .filter_map(|node| build_relationship(resource_name, node, errors))
        .collect()
}

fn build_relationship(resource_name: &str, node: &RelationshipNode, errors: &mut Vec<String>) -> Option<Relationship> {
    let kind = match node.kind.as_str() {
        "belongs_to" => RelationshipKind::BelongsTo,
        "has_one" => RelationshipKind::HasOne,
        "has_many" => RelationshipKind::HasMany,
        "has_many_through" => RelationshipKind::HasManyThrough,
        other => {
            errors.push(format!("relationship {}: unknown kind {other:?}", node.name));
            return None;
        }
    };

    let nullable = node.nullable.unwrap_or(false);

    let on_delete = match &node.on_delete {
        Some(name) => match CascadeAction::parse(name) {
            Some(action) => action,
            None => {
                errors.push(format!("relationship {}: unknown on_delete {name:?}", node.name));
                return None;
            }
        },
        None => CascadeAction::default()
    };
    if on_delete == CascadeAction::SetNull && !nullable {
        errors.push(format!(
            "relationship {}: on_delete=set_null requires the relationship to be nullable",
            node.name
        ));
        return None;
    }

    let on_update = match &node.on_update {
        Some(name) => match CascadeAction::parse(name) {
            Some(action) => action,
            None => {
                errors.push(format!("relationship {}: unknown on_update {name:?}", node.name));
                return None;
            }
        },
        None => CascadeAction::default()
    };

    let foreign_key = node.foreign_key.clone().unwrap_or_else(|| match kind {
        RelationshipKind::BelongsTo => Relationship::default_belongs_to_fk(&node.target_type),
        _ => Relationship::default_has_fk(resource_name)
    });

    let order_by = node
        .order_by
        .as_deref()
        .map(OrderByClause::parse_list)
        .unwrap_or_default();

    let (through_resource, join_table, association_key) = if kind == RelationshipKind::HasManyThrough {
        if node.through.is_none() && node.join_table.is_none() {
            errors.push(format!(
                "relationship {}: has_many_through requires either through or join_table",
                node.name
            ));
            return None;
        }
        (
            node.through.clone(),
            Some(
                node.join_table
                    .clone()
                    .unwrap_or_else(|| Relationship::default_join_table(resource_name, &node.target_type))
            ),
            Some(
                node.association_key
                    .clone()
                    .unwrap_or_else(|| Relationship::default_association_key(&node.target_type))
            )
        )
    } else {
        (None, None, None)
    };

    Some(Relationship {
        kind,
        field_name: node.name.clone(),
        target_resource: node.target_type.clone(),
        foreign_key,
        nullable,
        on_delete,
        on_update,
        order_by,
        through_resource,
        join_table,
        association_key
    })
}

fn build_hooks(nodes: &[HookNode], errors: &mut Vec<String>) -> BTreeMap<HookKind, Vec<Hook>> {
    let mut hooks: BTreeMap<HookKind, Vec<Hook>> = BTreeMap::new();
    for node in nodes {
        let Some(kind) = parse_hook_kind(&node.timing, &node.event) else {
            errors.push(format!("hook: unknown timing/event combination {}/{}", node.timing, node.event));
            continue;
        };
        hooks.entry(kind).or_default().push(Hook {
            kind,
            transactional: node.is_transaction,
            is_async: node.is_async,
            name: node.body.clone()
        });
    }
    hooks
}

fn parse_hook_kind(timing: &str, event: &str) -> Option<HookKind> {
    HookKind::ALL.into_iter().find(|kind| kind.as_str() == format!("{timing}_{event}"))
}

fn build_scopes(nodes: &[ScopeNode]) -> Vec<Scope> {
    nodes
        .iter()
        .map(|node| Scope {
            name: node.name.clone(),
            doc: node.doc.clone()
        })
        .collect()
}

fn build_computed(nodes: &[ComputedNode], errors: &mut Vec<String>) -> Vec<ComputedField> {
    nodes
        .iter()
        .filter_map(|node| {
            let type_spec = build_type(&node.type_node, errors, &node.name)?;
            Some(ComputedField {
                name: node.name.clone(),
                type_spec,
                doc: node.doc.clone()
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::TypeNode;

    fn string_field(name: &str, nullable: bool) -> FieldNode {
        FieldNode {
            name: name.to_string(),
            type_node: TypeNode::Primitive {
                name: "string".to_string(),
                length: None,
                precision: None,
                scale: None,
                nullable: Some(nullable)
            },
            constraints: Vec::new(),
            annotations: Vec::new(),
            location: None
        }
    }

    fn minimal_resource(name: &str, fields: Vec<FieldNode>) -> ResourceNode {
        ResourceNode {
            name: name.to_string(),
            doc: None,
            location: None,
            fields,
            relationships: Vec::new(),
            hooks: Vec::new(),
            constraint_blocks: Vec::new(),
            scopes: Vec::new(),
            computed: Vec::new(),
            invariants: Vec::new()
        }
    }

    #[test]
    fn builds_simple_resource() {
        let node = minimal_resource("User", vec![string_field("id", false), string_field("name", true)]);
        let (schema, warnings) = build(&node).expect("build should succeed");
        assert_eq!(schema.table_name, "users");
        assert_eq!(schema.fields.len(), 2);
        assert!(warnings.is_empty());
    }

    #[test]
    fn unknown_primitive_is_accumulated_not_short_circuited() {
        let mut node = minimal_resource("User", vec![string_field("a", false)]);
        node.fields.push(FieldNode {
            name: "b".to_string(),
            type_node: TypeNode::Primitive {
                name: "not_a_type".to_string(),
                length: None,
                precision: None,
                scale: None,
                nullable: Some(false)
            },
            constraints: Vec::new(),
            annotations: Vec::new(),
            location: None
        });
        node.fields.push(FieldNode {
            name: "c".to_string(),
            type_node: TypeNode::Primitive {
                name: "also_bad".to_string(),
                length: None,
                precision: None,
                scale: None,
                nullable: Some(false)
            },
            constraints: Vec::new(),
            annotations: Vec::new(),
            location: None
        });
        let err = build(&node).unwrap_err();
        match err {
            OrmError::SchemaBuild { errors, .. } => assert_eq!(errors.len(), 2),
            other => panic!("expected SchemaBuild, got {other:?}")
        }
    }

    #[test]
    fn identifier_constraint_argument_is_rejected() {
        let mut field = string_field("name", false);
        field.constraints.push(ConstraintNode {
            kind: "min".to_string(),
            arg: ConstraintArg::Identifier("SOME_CONST".to_string()),
            message: None,
            location: None
        });
        let node = minimal_resource("User", vec![field]);
        let err = build(&node).unwrap_err();
        match err {
            OrmError::SchemaBuild { errors, .. } => assert!(errors[0].contains("identifier")),
            other => panic!("expected SchemaBuild, got {other:?}")
        }
    }

    #[test]
    fn max_constraint_mirrors_into_length_for_text_field() {
        let mut field = string_field("name", false);
        field.constraints.push(ConstraintNode {
            kind: "max".to_string(),
            arg: ConstraintArg::Literal(Value::Int(255)),
            message: None,
            location: None
        });
        let node = minimal_resource("User", vec![field]);
        let (schema, _) = build(&node).unwrap();
        let name_field = schema.field("name").unwrap();
        match &name_field.type_spec {
            TypeSpec::Scalar { params, .. } => assert_eq!(params.length, Some(255)),
            other => panic!("expected scalar, got {other:?}")
        }
    }

    #[test]
    fn set_null_on_non_nullable_relationship_is_rejected() {
        let mut node = minimal_resource("Post", vec![string_field("id", false)]);
        node.relationships.push(RelationshipNode {
            kind: "belongs_to".to_string(),
            name: "author".to_string(),
            target_type: "User".to_string(),
            nullable: Some(false),
            foreign_key: None,
            on_delete: Some("set_null".to_string()),
            on_update: None,
            order_by: None,
            through: None,
            join_table: None,
            association_key: None,
            location: None
        });
        let err = build(&node).unwrap_err();
        match err {
            OrmError::SchemaBuild { errors, .. } => assert!(errors[0].contains("set_null")),
            other => panic!("expected SchemaBuild, got {other:?}")
        }
    }

    #[test]
    fn belongs_to_default_foreign_key() {
        let mut node = minimal_resource("Post", vec![string_field("id", false)]);
        node.relationships.push(RelationshipNode {
            kind: "belongs_to".to_string(),
            name: "author".to_string(),
            target_type: "User".to_string(),
            nullable: Some(true),
            foreign_key: None,
            on_delete: None,
            on_update: None,
            order_by: None,
            through: None,
            join_table: None,
            association_key: None,
            location: None
        });
        let (schema, _) = build(&node).unwrap();
        assert_eq!(schema.relationships[0].foreign_key, "user_id");
    }

    #[test]
    fn has_many_through_requires_join_table_or_through() {
        let mut node = minimal_resource("Post", vec![string_field("id", false)]);
        node.relationships.push(RelationshipNode {
            kind: "has_many_through".to_string(),
            name: "tags".to_string(),
            target_type: "Tag".to_string(),
            nullable: Some(false),
            foreign_key: None,
            on_delete: None,
            on_update: None,
            order_by: None,
            through: None,
            join_table: None,
            association_key: None,
            location: None
        });
        let err = build(&node).unwrap_err();
        match err {
            OrmError::SchemaBuild { errors, .. } => assert!(errors[0].contains("has_many_through")),
            other => panic!("expected SchemaBuild, got {other:?}")
        }
    }

    #[test]
    fn optional_field_with_default_produces_warning() {
        let mut field = string_field("nickname", true);
        field.constraints.push(ConstraintNode {
            kind: "default".to_string(),
            arg: ConstraintArg::Literal(Value::Text("anon".to_string())),
            message: None,
            location: None
        });
        let node = minimal_resource("User", vec![field]);
        let (_, warnings) = build(&node).unwrap();
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn hooks_grouped_by_kind_in_declaration_order() {
        let mut node = minimal_resource("User", vec![string_field("id", false)]);
        for body in ["h1", "h2"] {
            node.hooks.push(HookNode {
                timing: "before".to_string(),
                event: "create".to_string(),
                is_transaction: false,
                is_async: false,
                body: body.to_string(),
                location: None
            });
        }
        let (schema, _) = build(&node).unwrap();
        let hooks = schema.hooks_for(HookKind::BeforeCreate);
        assert_eq!(hooks.len(), 2);
        assert_eq!(hooks[0].name, "h1");
        assert_eq!(hooks[1].name, "h2");
    }
}
