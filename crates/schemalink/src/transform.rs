//! Entity ↔ structure transformations.
//!
//! - [`to_dialect`] patches an entity for engine limitations.
//! - [`resolve_relations`] binds relations to the entities they point at.
//! - [`to_structure`] projects an entity to its canonical [`Structure`].
//! - [`to_schema`] reverse-derives an entity from introspected metadata.

use std::borrow::Borrow;
use std::collections::{BTreeSet, HashMap};

use schemalink_model::{Entity, Field, FieldTag, FieldType, Relation, RelationKind, Unique};
use schemalink_sql::Dialect;

use crate::inspect::{ColumnInfo, EnumColumn, ForeignKeyInfo, IndexInfo, UniqueInfo};
use crate::structure::{ColumnStructure, ForeignKeyStructure, Structure};
use crate::types::{ColumnType, TypeMap, logical_type, parse_column_type};
use crate::{Error, Result};

/// Patch an entity for the dialect's exceptions.
///
/// PostgreSQL has no inline ENUM type, so ENUM fields become TEXT and keep
/// their values (enforced by a CHECK constraint). It has no unsigned integers
/// either, so the flag is cleared.
pub fn to_dialect(entity: &Entity, dialect: Dialect) -> Entity {
    let mut patched = entity.clone();
    if dialect == Dialect::Postgres {
        for field in &mut patched.fields {
            if field.field_type == FieldType::Enum {
                field.field_type = FieldType::Text;
            }
            field.type_params.unsigned = false;
        }
    }
    patched
}

/// Bind every relation of `entity` to its target.
///
/// BELONGS_TO_ONE relations without a remote field get the target's primary
/// key. Relations whose target is unknown are stripped with a warning; a
/// relation naming a field that does not exist is an error.
pub fn resolve_relations<'a>(
    entity: &Entity,
    lookup: impl Fn(&str) -> Option<&'a Entity>,
) -> Result<Entity> {
    let mut resolved = entity.clone();
    resolved.relations.clear();

    for relation in &entity.relations {
        if relation.kind != RelationKind::BelongsToMany
            && entity.get_field(&relation.local_field).is_none()
        {
            return Err(Error::invalid(
                &entity.reference,
                format!(
                    "relation '{}' uses unknown local field '{}'",
                    relation.name, relation.local_field
                ),
            ));
        }

        let Some(target) = lookup(&relation.target) else {
            tracing::warn!(
                entity = %entity.reference,
                relation = %relation.name,
                target = %relation.target,
                "stripped relation to an unknown entity"
            );
            continue;
        };

        let mut relation = relation.clone();
        match relation.kind {
            RelationKind::BelongsToOne => {
                let remote = match &relation.remote_field {
                    Some(remote) => remote.clone(),
                    None => single_primary(target).ok_or_else(|| {
                        Error::invalid(
                            &entity.reference,
                            format!(
                                "relation '{}' needs a remote field, [{}] has no single primary key",
                                relation.name, target.reference
                            ),
                        )
                    })?,
                };
                relation.remote_field = Some(remote);
            }
            RelationKind::HasOne | RelationKind::HasMany => {
                if relation.remote_field.is_none() {
                    return Err(Error::invalid(
                        &entity.reference,
                        format!("relation '{}' needs a remote field", relation.name),
                    ));
                }
            }
            RelationKind::BelongsToMany => {}
        }

        if let Some(remote) = &relation.remote_field
            && target.get_field(remote).is_none()
        {
            return Err(Error::invalid(
                &entity.reference,
                format!(
                    "relation '{}' uses unknown field '{}' of [{}]",
                    relation.name, remote, target.reference
                ),
            ));
        }

        resolved.relations.push(relation);
    }

    Ok(resolved)
}

fn single_primary(entity: &Entity) -> Option<String> {
    let mut primaries = entity.primary_fields();
    match (primaries.next(), primaries.next()) {
        (Some(field), None) => Some(field.reference.clone()),
        _ => None,
    }
}

fn column_of(entity: &Entity, reference: &str) -> Result<String> {
    entity
        .get_field(reference)
        .map(|f| f.column_name.clone())
        .ok_or_else(|| {
            Error::invalid(
                &entity.reference,
                format!("unknown field '{}'", reference),
            )
        })
}

fn column_structure(field: &Field, type_map: &TypeMap) -> Result<ColumnStructure> {
    let column_type = type_map.resolve(field)?;

    let mut check_values = Vec::new();
    if type_map.dialect() == Dialect::Postgres && column_type == ColumnType::Text {
        check_values = field.type_params.values.clone();
        check_values.sort();
        check_values.dedup();
    }

    Ok(ColumnStructure {
        nullable: field.is_nullable() && !field.is_primary(),
        unsigned: field.type_params.unsigned
            && type_map.dialect() == Dialect::MySql
            && field.is_number(),
        check_values,
        column_type,
    })
}

/// Project an entity to its canonical structure.
///
/// Relations must already be resolved (see [`resolve_relations`]).
pub fn to_structure(entity: &Entity, type_map: &TypeMap) -> Result<Structure> {
    let mut structure = Structure {
        table: entity.table_name.clone(),
        ..Structure::default()
    };

    for field in &entity.fields {
        structure
            .columns
            .insert(field.column_name.clone(), column_structure(field, type_map)?);

        if field.is_primary() {
            structure.primary_key.push(field.column_name.clone());
        }
        if field.has_tag(FieldTag::Unique) {
            structure.uniques.insert(vec![field.column_name.clone()]);
        }
        if field.has_tag(FieldTag::Index) {
            structure.indexes.insert(field.column_name.clone());
        }
    }
    structure.primary_key.sort();

    for unique in &entity.uniques {
        let mut columns = unique
            .fields
            .iter()
            .map(|f| column_of(entity, f))
            .collect::<Result<Vec<_>>>()?;
        columns.sort();
        structure.uniques.insert(columns);
    }

    for relation in &entity.relations {
        if relation.kind != RelationKind::BelongsToOne {
            continue;
        }
        let remote_field = relation.remote_field.clone().ok_or_else(|| {
            Error::invalid(
                &entity.reference,
                format!("relation '{}' is not resolved", relation.name),
            )
        })?;
        structure.foreign_keys.insert(ForeignKeyStructure {
            column: column_of(entity, &relation.local_field)?,
            target: relation.target.clone(),
            remote_field,
        });
    }

    Ok(structure)
}

/// Maps physical names back to logical references.
pub trait Resolver {
    fn table_reference(&self, table: &str) -> Option<String>;
    fn field_reference(&self, table: &str, column: &str) -> Option<String>;
}

impl<E: Borrow<Entity>> Resolver for [E] {
    fn table_reference(&self, table: &str) -> Option<String> {
        self.iter()
            .map(Borrow::borrow)
            .find(|e| e.table_name == table)
            .map(|e| e.reference.clone())
    }

    fn field_reference(&self, table: &str, column: &str) -> Option<String> {
        self.iter()
            .map(Borrow::borrow)
            .find(|e| e.table_name == table)
            .and_then(|e| e.field_by_column(column))
            .map(|f| f.reference.clone())
    }
}

/// Metadata introspected from one live table.
#[derive(Debug, Clone, Default)]
pub struct TableMetadata {
    pub columns: Vec<ColumnInfo>,
    pub foreign_keys: Vec<ForeignKeyInfo>,
    pub uniques: Vec<UniqueInfo>,
    pub indexes: Vec<IndexInfo>,
    pub enumerators: Vec<EnumColumn>,
}

/// Reverse-derive an entity from introspected metadata.
///
/// Physical types map back to logical types through [`logical_type`], so the
/// result is deterministic. Names are mapped back to references through the
/// resolver; unknown tables and columns keep their physical names.
pub fn to_schema(
    database: &str,
    table: &str,
    metadata: &TableMetadata,
    dialect: Dialect,
    resolver: &(impl Resolver + ?Sized),
) -> Result<Entity> {
    let reference = resolver
        .table_reference(table)
        .unwrap_or_else(|| table.to_string());
    let field_ref = |column: &str| {
        resolver
            .field_reference(table, column)
            .unwrap_or_else(|| column.to_string())
    };

    let enums: HashMap<&str, &Vec<String>> = metadata
        .enumerators
        .iter()
        .map(|e| (e.column.as_str(), &e.values))
        .collect();

    let single_uniques: BTreeSet<&str> = metadata
        .uniques
        .iter()
        .filter(|u| u.columns.len() == 1)
        .map(|u| u.columns[0].as_str())
        .collect();

    let single_indexes: BTreeSet<&str> = metadata
        .indexes
        .iter()
        .filter(|i| i.columns.len() == 1)
        .map(|i| i.columns[0].as_str())
        .collect();

    let mut entity = Entity::new(database, reference, table);

    for column in &metadata.columns {
        let parsed = parse_column_type(dialect, &column.data_type).ok_or_else(|| {
            Error::UnknownColumnType {
                table: table.to_string(),
                column: column.name.clone(),
                data_type: column.data_type.clone(),
            }
        })?;

        let (field_type, mut params) = logical_type(dialect, &parsed.column_type);
        params.unsigned = parsed.unsigned;
        if field_type == FieldType::Text
            && let Some(values) = enums.get(column.name.as_str())
        {
            params.values = (*values).clone();
        }

        let mut field = Field::with_column(field_ref(&column.name), &column.name, field_type)
            .params(params);
        if column.is_primary {
            field = field.tag(FieldTag::Primary);
        }
        if column.nullable {
            field = field.tag(FieldTag::Nullable);
        }
        if single_uniques.contains(column.name.as_str()) {
            field = field.tag(FieldTag::Unique);
        }
        if single_indexes.contains(column.name.as_str()) {
            field = field.tag(FieldTag::Index);
        }
        entity = entity.field(field);
    }

    for unique in metadata.uniques.iter().filter(|u| u.columns.len() > 1) {
        entity = entity.unique(Unique::new(
            &unique.name,
            unique.columns.iter().map(|c| field_ref(c)),
        ));
    }

    for fk in &metadata.foreign_keys {
        let target = resolver
            .table_reference(&fk.foreign_table)
            .unwrap_or_else(|| fk.foreign_table.clone());
        let remote = resolver
            .field_reference(&fk.foreign_table, &fk.foreign_column)
            .unwrap_or_else(|| fk.foreign_column.clone());
        entity = entity.relation(
            Relation::belongs_to_one(&fk.name, field_ref(&fk.column), target).remote(remote),
        );
    }

    Ok(entity)
}
