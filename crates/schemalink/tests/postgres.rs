//! Synchronization against a real PostgreSQL.
//!
//! Run with: cargo test -p schemalink --test postgres -- --ignored
//!
//! Note: Requires Docker to be running.

use schemalink::{Change, Connection, DriftKind, LinkConfig, LinkManager, Phase};
use schemalink_model::{
    DefaultValue, Entity, Field, FieldTag, FieldType, Relation, TypeParams, Unique,
};
use testcontainers_modules::postgres::Postgres;
use testcontainers_modules::testcontainers::runners::AsyncRunner;
use testcontainers_modules::testcontainers::{ContainerAsync, ImageExt};
use tokio_postgres::NoTls;
use tokio_postgres::error::SqlState;

struct Database {
    // keeps the container alive
    _container: ContainerAsync<Postgres>,
    dsn: String,
}

async fn start() -> Database {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();

    // gen_random_uuid() is built in from 13 on
    let container = Postgres::default()
        .with_tag("16-alpine")
        .start()
        .await
        .expect("failed to start postgres container");
    let host = container.get_host().await.unwrap();
    let port = container.get_host_port_ipv4(5432).await.unwrap();
    Database {
        _container: container,
        dsn: format!("postgres://postgres:postgres@{}:{}/postgres", host, port),
    }
}

async fn link(db: &Database) -> Connection {
    Connection::open(&LinkConfig::new("main", &db.dsn))
        .await
        .unwrap()
}

/// Raw client for checking what actually landed in the catalog.
async fn client(db: &Database) -> tokio_postgres::Client {
    let (client, connection) = tokio_postgres::connect(&db.dsn, NoTls).await.unwrap();
    tokio::spawn(connection);
    client
}

async fn column_types(db: &Database, table: &str) -> Vec<(String, String, String)> {
    client(db)
        .await
        .query(
            "SELECT column_name::text, data_type::text, is_nullable::text
             FROM information_schema.columns
             WHERE table_schema = 'public' AND table_name = $1
             ORDER BY ordinal_position",
            &[&table],
        )
        .await
        .unwrap()
        .iter()
        .map(|row| (row.get(0), row.get(1), row.get(2)))
        .collect()
}

fn order() -> Entity {
    Entity::new("main", "Order", "orders")
        .field(Field::new("id", FieldType::Uuid).tag(FieldTag::Primary))
        .field(Field::new("total", FieldType::Decimal).params(TypeParams::decimal(10, 2)))
}

fn category() -> Entity {
    Entity::new("main", "Category", "categories")
        .field(Field::new("id", FieldType::Integer).tag(FieldTag::Primary))
        .field(
            Field::new("name", FieldType::String)
                .params(TypeParams::length(80))
                .tag(FieldTag::Unique),
        )
}

fn product() -> Entity {
    Entity::new("main", "Product", "products")
        .field(Field::new("id", FieldType::Integer).tag(FieldTag::Primary))
        .field(Field::new("sku", FieldType::String).tag(FieldTag::Index))
        .field(
            Field::new("status", FieldType::Enum)
                .params(TypeParams::values(["draft", "live"]))
                .default_value(DefaultValue::Text("draft".into())),
        )
        .field(Field::new("category id", FieldType::Integer).tag(FieldTag::Nullable))
        .relation(Relation::belongs_to_one("category", "categoryId", "Category"))
        .unique(Unique::new("sku_per_category", ["sku", "categoryId"]))
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_order_on_empty_database() {
    let db = start().await;
    let link = link(&db).await;

    link.associate(&[order()]).await.unwrap();

    assert!(link.is_in_sync("Order").await);
    assert_eq!(
        column_types(&db, "orders").await,
        vec![
            ("id".into(), "uuid".into(), "NO".into()),
            ("total".into(), "numeric".into(), "NO".into()),
        ]
    );

    // the generated key works
    let row = client(&db)
        .await
        .query_one("INSERT INTO orders (total) VALUES (12.50) RETURNING id::text", &[])
        .await
        .unwrap();
    assert_eq!(row.get::<_, String>(0).len(), 36);

    link.close().await;
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_second_pass_performs_no_ddl() {
    let db = start().await;
    let first = link(&db).await;
    first.associate(&[category(), product()]).await.unwrap();
    first.close().await;

    // a fresh registry sees everything as out of sync and must still agree
    let second = link(&db).await;
    let report = second.associate(&[category(), product()]).await.unwrap();
    assert!(report.is_empty(), "unexpected DDL: {:?}", report.executed);
    assert!(report.drift.is_empty(), "unexpected drift: {:?}", report.drift);
    assert!(second.is_in_sync("Product").await);
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_nullable_and_check_constraints() {
    let db = start().await;
    let link = link(&db).await;
    link.associate(&[category(), product()]).await.unwrap();

    let client = client(&db).await;
    client
        .execute("INSERT INTO products (sku, category_id) VALUES ('a-1', NULL)", &[])
        .await
        .unwrap();

    let err = client
        .execute("INSERT INTO products (sku, status) VALUES ('a-2', 'gone')", &[])
        .await
        .unwrap_err();
    assert_eq!(err.code(), Some(&SqlState::CHECK_VIOLATION), "{}", err);

    let err = client
        .execute("INSERT INTO products (category_id) VALUES (NULL)", &[])
        .await
        .unwrap_err();
    assert_eq!(err.code(), Some(&SqlState::NOT_NULL_VIOLATION), "{}", err);
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_circular_foreign_keys() {
    let a = Entity::new("main", "A", "a")
        .field(Field::new("id", FieldType::Integer).tag(FieldTag::Primary))
        .field(Field::new("b id", FieldType::Integer).tag(FieldTag::Nullable))
        .relation(Relation::belongs_to_one("b", "bId", "B"));
    let b = Entity::new("main", "B", "b")
        .field(Field::new("id", FieldType::Integer).tag(FieldTag::Primary))
        .field(Field::new("a id", FieldType::Integer).tag(FieldTag::Nullable))
        .relation(Relation::belongs_to_one("a", "aId", "A"));

    let db = start().await;
    let link = link(&db).await;
    let report = link.associate(&[a, b]).await.unwrap();

    assert_eq!(report.phases.get(&Phase::Foreign), Some(&2));
    assert!(link.is_in_sync("A").await);
    assert!(link.is_in_sync("B").await);
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_drop_column_and_its_constraints() {
    let db = start().await;
    let link = link(&db).await;
    link.associate(&[category(), product()]).await.unwrap();

    let mut slimmer = product();
    slimmer.fields.retain(|f| f.reference != "categoryId");
    slimmer.relations.clear();
    slimmer.uniques.clear();
    let report = link.associate(&[category(), slimmer]).await.unwrap();

    let changes: Vec<_> = report.executed.iter().map(|s| &s.change).collect();
    assert!(matches!(changes[0], Change::DropForeignKey { .. }));
    assert!(matches!(changes.last(), Some(Change::DropColumn(c)) if c == "category_id"));
    assert!(
        column_types(&db, "products")
            .await
            .iter()
            .all(|(name, _, _)| name != "category_id")
    );
    assert!(link.is_in_sync("Product").await);
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_type_change_is_reported() {
    let db = start().await;
    let link = link(&db).await;
    link.associate(&[order()]).await.unwrap();

    let mut wider = order();
    wider.fields[1].type_params = TypeParams::decimal(14, 2);
    let report = link.associate(&[wider]).await.unwrap();

    assert!(report.is_empty());
    assert_eq!(report.drift.len(), 1);
    assert!(matches!(report.drift[0].kind, DriftKind::Type { .. }));
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_discover_existing_tables() {
    let db = start().await;
    client(&db)
        .await
        .batch_execute(
            "CREATE TABLE audit_log (id serial PRIMARY KEY, message text NOT NULL, at timestamptz)",
        )
        .await
        .unwrap();

    let links = LinkManager::new();
    links
        .connect(&LinkConfig::new("main", &db.dsn))
        .await
        .unwrap();
    let discovered = links.discover("main").await.unwrap();

    assert_eq!(discovered.len(), 1);
    let audit = &discovered[0];
    assert_eq!(audit.table_name, "audit_log");
    let types: Vec<_> = audit.fields.iter().map(|f| f.field_type).collect();
    assert_eq!(
        types,
        vec![FieldType::Integer, FieldType::Text, FieldType::DateTime]
    );
    assert!(audit.fields[2].is_nullable());

    links.close_all().await;
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_single_value_enum_round_trips() {
    let flag = Entity::new("main", "Flag", "flags")
        .field(Field::new("id", FieldType::Integer).tag(FieldTag::Primary))
        .field(
            Field::new("state", FieldType::Enum)
                .params(TypeParams::values(["on"]))
                .default_value(DefaultValue::Text("on".into())),
        );

    let db = start().await;
    let first = link(&db).await;
    first.associate(std::slice::from_ref(&flag)).await.unwrap();
    first.close().await;

    let second = link(&db).await;
    let report = second.associate(&[flag]).await.unwrap();
    assert!(report.is_empty(), "unexpected DDL: {:?}", report.executed);
    assert!(report.drift.is_empty(), "unexpected drift: {:?}", report.drift);
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_index_tag_on_existing_column() {
    let db = start().await;
    let link = link(&db).await;
    link.associate(&[category(), product()]).await.unwrap();

    let mut indexed = category();
    indexed.fields[1] = indexed.fields[1].clone().tag(FieldTag::Index);
    let report = link.associate(&[indexed, product()]).await.unwrap();
    assert_eq!(report.executed.len(), 1);
    assert!(matches!(report.executed[0].change, Change::AddIndex { .. }));

    let indexes: Vec<String> = client(&db)
        .await
        .query(
            "SELECT indexname::text FROM pg_indexes WHERE tablename = 'categories' ORDER BY 1",
            &[],
        )
        .await
        .unwrap()
        .iter()
        .map(|row| row.get(0))
        .collect();
    assert!(indexes.contains(&"idx_categories_name".to_string()), "{:?}", indexes);

    let report = link.associate(&[category(), product()]).await.unwrap();
    assert!(matches!(report.executed[0].change, Change::DropIndex { .. }));
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_required_column_on_filled_table_is_drift() {
    let db = start().await;
    let link = link(&db).await;
    link.associate(&[order()]).await.unwrap();
    client(&db)
        .await
        .execute("INSERT INTO orders (total) VALUES (3.20)", &[])
        .await
        .unwrap();

    let heavier = order().field(Field::new("weight", FieldType::Integer));
    let report = link.associate(&[heavier]).await.unwrap();

    assert!(report.is_empty());
    assert_eq!(report.drift.len(), 1);
    assert_eq!(report.drift[0].kind, DriftKind::MissingColumn);
}
