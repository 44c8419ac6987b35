//! Bound data-access handles.
//!
//! A [`Model`] is what a connection hands out for an associated entity: the
//! physical table, its columns and the relations wired to their target
//! tables. Record access itself is left to the caller.

use schemalink_model::{Entity, Relation, RelationKind};

/// Which side of a relation holds the foreign key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// The owner holds it (belongs-to).
    Forward,
    /// The target holds it (has-one, has-many).
    Reverse,
    /// A join table holds one to each side.
    Through,
}

/// The join table of a belongs-to-many relation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinTable {
    pub table: String,
    /// Join column pointing at the owner.
    pub source_column: String,
    /// Join column pointing at the target.
    pub target_column: String,
}

/// A relation bound to physical names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationBinding {
    pub name: String,
    pub kind: RelationKind,
    pub direction: Direction,
    /// Reference of the target entity.
    pub target: String,
    pub target_table: String,
    /// `owner.local_column = target.remote_column` (through the join table
    /// for belongs-to-many).
    pub local_column: String,
    pub remote_column: String,
    pub through: Option<JoinTable>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Model {
    pub reference: String,
    pub table: String,
    pub columns: Vec<String>,
    /// Columns a write payload may carry; auto-generated keys are excluded.
    pub writable_columns: Vec<String>,
    pub primary_key: Vec<String>,
    pub relations: Vec<RelationBinding>,
}

impl Model {
    /// A model without relations.
    pub fn new(entity: &Entity) -> Self {
        Self {
            reference: entity.reference.clone(),
            table: entity.table_name.clone(),
            columns: entity.fields.iter().map(|f| f.column_name.clone()).collect(),
            writable_columns: entity
                .writable_fields()
                .map(|f| f.column_name.clone())
                .collect(),
            primary_key: entity
                .primary_fields()
                .map(|f| f.column_name.clone())
                .collect(),
            relations: Vec::new(),
        }
    }

    /// A model with every relation whose target `lookup` knows wired in.
    pub fn bind<'a>(entity: &Entity, lookup: impl Fn(&str) -> Option<&'a Entity>) -> Self {
        let mut model = Self::new(entity);
        for relation in &entity.relations {
            match bind_relation(entity, relation, &lookup) {
                Some(binding) => model.relations.push(binding),
                None => tracing::debug!(
                    entity = %entity.reference,
                    relation = %relation.name,
                    "relation not wired, target or field unknown"
                ),
            }
        }
        model
    }

    pub fn relation(&self, name: &str) -> Option<&RelationBinding> {
        self.relations.iter().find(|r| r.name == name)
    }
}

fn column_of(entity: &Entity, field: &str) -> Option<String> {
    entity.get_field(field).map(|f| f.column_name.clone())
}

/// Column a relation points at on `target`: the named field, or the first
/// primary key column.
fn remote_column(target: &Entity, remote_field: Option<&str>) -> Option<String> {
    match remote_field {
        Some(field) => column_of(target, field),
        None => target.primary_fields().next().map(|f| f.column_name.clone()),
    }
}

fn bind_relation<'a>(
    owner: &Entity,
    relation: &Relation,
    lookup: &impl Fn(&str) -> Option<&'a Entity>,
) -> Option<RelationBinding> {
    let target = lookup(&relation.target)?;

    let (direction, local_column, remote_column, through) = match relation.kind {
        RelationKind::BelongsToOne => (
            Direction::Forward,
            column_of(owner, &relation.local_field)?,
            remote_column(target, relation.remote_field.as_deref())?,
            None,
        ),
        RelationKind::HasOne | RelationKind::HasMany => (
            Direction::Reverse,
            column_of(owner, &relation.local_field)?,
            column_of(target, relation.remote_field.as_deref()?)?,
            None,
        ),
        RelationKind::BelongsToMany => {
            let join = lookup(relation.through.as_deref()?)?;
            let join_column = |to: &str| {
                join.relations
                    .iter()
                    .find(|r| r.kind == RelationKind::BelongsToOne && r.target == to)
                    .and_then(|r| column_of(join, &r.local_field))
            };
            (
                Direction::Through,
                column_of(owner, &relation.local_field)?,
                remote_column(target, relation.remote_field.as_deref())?,
                Some(JoinTable {
                    table: join.table_name.clone(),
                    source_column: join_column(&owner.reference)?,
                    target_column: join_column(&target.reference)?,
                }),
            )
        }
    };

    Some(RelationBinding {
        name: relation.name.clone(),
        kind: relation.kind,
        direction,
        target: target.reference.clone(),
        target_table: target.table_name.clone(),
        local_column,
        remote_column,
        through,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use schemalink_model::{Field, FieldTag, FieldType};

    fn customer() -> Entity {
        Entity::new("main", "Customer", "customers")
            .field(Field::new("id", FieldType::Uuid).tag(FieldTag::Primary))
            .field(Field::new("full name", FieldType::String))
            .relation(Relation::has_many("orders", "id", "Order", "customerId"))
    }

    fn order() -> Entity {
        Entity::new("main", "Order", "orders")
            .field(Field::new("id", FieldType::Integer).tag(FieldTag::Primary))
            .field(Field::new("customer id", FieldType::Uuid))
            .relation(Relation::belongs_to_one("customer", "customerId", "Customer"))
            .relation(Relation::belongs_to_one("coupon", "customerId", "Coupon"))
    }

    #[test]
    fn test_columns() {
        let model = Model::new(&order());
        assert_eq!(model.table, "orders");
        assert_eq!(model.columns, vec!["id", "customer_id"]);
        assert_eq!(model.writable_columns, vec!["customer_id"]);
        assert_eq!(model.primary_key, vec!["id"]);
        assert!(model.relations.is_empty());
    }

    #[test]
    fn test_bind_both_directions() {
        let entities = [customer(), order()];
        let lookup = |r: &str| entities.iter().find(|e| e.reference == r);

        let order = Model::bind(&entities[1], lookup);
        // coupon is not associated
        assert_eq!(order.relations.len(), 1);
        assert_eq!(
            order.relation("customer"),
            Some(&RelationBinding {
                name: "customer".into(),
                kind: RelationKind::BelongsToOne,
                direction: Direction::Forward,
                target: "Customer".into(),
                target_table: "customers".into(),
                local_column: "customer_id".into(),
                remote_column: "id".into(),
                through: None,
            })
        );

        let customer = Model::bind(&entities[0], lookup);
        let orders = customer.relation("orders").unwrap();
        assert_eq!(orders.direction, Direction::Reverse);
        assert_eq!(orders.target_table, "orders");
        assert_eq!(orders.remote_column, "customer_id");
    }

    #[test]
    fn test_bind_through_join_table() {
        let post = Entity::new("main", "Post", "posts")
            .field(Field::new("id", FieldType::Integer).tag(FieldTag::Primary))
            .relation(Relation::belongs_to_many("tags", "id", "Tag", "PostTag"));
        let tag = Entity::new("main", "Tag", "tags")
            .field(Field::new("id", FieldType::Integer).tag(FieldTag::Primary));
        let post_tag = Entity::new("main", "PostTag", "post_tags")
            .field(Field::new("post id", FieldType::Integer))
            .field(Field::new("tag id", FieldType::Integer))
            .relation(Relation::belongs_to_one("post", "postId", "Post"))
            .relation(Relation::belongs_to_one("tag", "tagId", "Tag"));
        let entities = [post, tag, post_tag];
        let lookup = |r: &str| entities.iter().find(|e| e.reference == r);

        let model = Model::bind(&entities[0], lookup);
        let tags = model.relation("tags").unwrap();
        assert_eq!(tags.direction, Direction::Through);
        assert_eq!(
            tags.through,
            Some(JoinTable {
                table: "post_tags".into(),
                source_column: "post_id".into(),
                target_column: "tag_id".into(),
            })
        );
    }
}
