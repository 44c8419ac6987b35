use super::*;
use schemalink_model::{FieldTag, TypeParams};

fn make_column(field: &Field, dialect: Dialect) -> ColumnDef {
    ColumnDef::from_field(field, &TypeMap::new(dialect), true).unwrap()
}

fn make_table(name: &str, fields: &[Field], dialect: Dialect) -> TableDef {
    TableDef {
        name: name.to_string(),
        columns: fields.iter().map(|f| make_column(f, dialect)).collect(),
    }
}

fn order_fields() -> Vec<Field> {
    vec![
        Field::new("id", FieldType::Uuid).tag(FieldTag::Primary),
        Field::new("total", FieldType::Decimal).params(TypeParams::decimal(10, 2)),
    ]
}

#[test]
fn snapshot_order_table_postgres() {
    let table = make_table("orders", &order_fields(), Dialect::Postgres);
    insta::assert_snapshot!(table.to_sql(Dialect::Postgres), @r#"
    CREATE TABLE IF NOT EXISTS "orders" (
        "id" uuid DEFAULT gen_random_uuid() PRIMARY KEY,
        "total" numeric(10, 2) NOT NULL
    );
    "#);
}

#[test]
fn snapshot_order_table_mysql() {
    let table = make_table("orders", &order_fields(), Dialect::MySql);
    insta::assert_snapshot!(table.to_sql(Dialect::MySql), @r"
    CREATE TABLE IF NOT EXISTS `orders` (
        `id` char(36) DEFAULT (uuid()) PRIMARY KEY,
        `total` decimal(10, 2) NOT NULL
    );
    ");
}

#[test]
fn snapshot_composite_primary_key() {
    let fields = vec![
        Field::new("user_id", FieldType::BigInt).tag(FieldTag::Primary),
        Field::new("post_id", FieldType::BigInt).tag(FieldTag::Primary),
        Field::new("created_at", FieldType::DateTime).tag(FieldTag::Created),
    ];
    let table = make_table("post_likes", &fields, Dialect::Postgres);
    insta::assert_snapshot!(table.to_sql(Dialect::Postgres), @r#"
    CREATE TABLE IF NOT EXISTS "post_likes" (
        "user_id" bigint NOT NULL,
        "post_id" bigint NOT NULL,
        "created_at" timestamptz NOT NULL,
        PRIMARY KEY ("user_id", "post_id")
    );
    "#);
}

#[test]
fn test_integer_primary_is_identity() {
    let id = Field::new("id", FieldType::Integer).tag(FieldTag::Primary);
    assert_eq!(
        make_column(&id, Dialect::Postgres).to_sql("users", Dialect::Postgres, true),
        "\"id\" integer GENERATED BY DEFAULT AS IDENTITY PRIMARY KEY"
    );

    let id = id.params(TypeParams::length(11).unsigned());
    assert_eq!(
        make_column(&id, Dialect::MySql).to_sql("users", Dialect::MySql, true),
        "`id` int(11) unsigned AUTO_INCREMENT PRIMARY KEY"
    );
}

#[test]
fn test_enum_fallback_check_constraint() {
    let status = Field::new("status", FieldType::Text)
        .params(TypeParams::values(["draft", "paid"]))
        .default_value(DefaultValue::Text("draft".into()));
    assert_eq!(
        make_column(&status, Dialect::Postgres).to_sql("orders", Dialect::Postgres, true),
        "\"status\" text NOT NULL DEFAULT 'draft' CONSTRAINT \"ck_orders_status\" CHECK (\"status\" IN ('draft', 'paid'))"
    );
}

#[test]
fn test_mysql_enum_column() {
    let size = Field::new("size", FieldType::Enum).params(TypeParams::values(["s", "m"]));
    assert_eq!(
        make_column(&size, Dialect::MySql).to_sql("shirts", Dialect::MySql, true),
        "`size` enum('s', 'm') NOT NULL"
    );
}

#[test]
fn test_typed_defaults() {
    let active = Field::new("active", FieldType::Boolean).default_value(DefaultValue::Bool(true));
    assert_eq!(
        make_column(&active, Dialect::Postgres).to_sql("t", Dialect::Postgres, true),
        "\"active\" boolean NOT NULL DEFAULT true"
    );
    assert_eq!(
        make_column(&active, Dialect::MySql).to_sql("t", Dialect::MySql, true),
        "`active` tinyint(1) NOT NULL DEFAULT 1"
    );

    let meta = Field::new("meta", FieldType::Json).default_value(DefaultValue::Json("{}".into()));
    assert_eq!(
        make_column(&meta, Dialect::MySql).to_sql("t", Dialect::MySql, true),
        "`meta` json NOT NULL DEFAULT ('{}')"
    );

    let note = Field::new("note", FieldType::Text).default_value(DefaultValue::Null);
    assert_eq!(
        make_column(&note, Dialect::Postgres).to_sql("t", Dialect::Postgres, true),
        "\"note\" text DEFAULT NULL"
    );

    let rank = Field::new("rank", FieldType::Double).default_value(DefaultValue::Float(1.5));
    assert_eq!(
        make_column(&rank, Dialect::Postgres).to_sql("t", Dialect::Postgres, true),
        "\"rank\" double precision NOT NULL DEFAULT 1.5"
    );
}

#[test]
fn test_added_column_drops_key_and_generation() {
    let id = Field::new("id", FieldType::Integer).tag(FieldTag::Primary);
    let col = ColumnDef::from_field(&id, &TypeMap::new(Dialect::Postgres), false).unwrap();
    assert!(!col.primary);
    assert_eq!(col.auto, None);
    assert_eq!(
        Change::AddColumn(col).to_sql("users", Dialect::Postgres),
        "ALTER TABLE \"users\" ADD COLUMN \"id\" integer NOT NULL;"
    );
}

#[test]
fn test_change_sql() {
    let pg = Dialect::Postgres;
    let my = Dialect::MySql;

    let fk = Change::AddForeignKey(ForeignKeyDef {
        name: "fk_products_category_id".into(),
        column: "category_id".into(),
        target_table: "categories".into(),
        target_column: "id".into(),
    });
    assert_eq!(
        fk.to_sql("products", pg),
        "ALTER TABLE \"products\" ADD CONSTRAINT \"fk_products_category_id\" FOREIGN KEY (\"category_id\") REFERENCES \"categories\" (\"id\");"
    );

    let drop_fk = Change::DropForeignKey {
        name: "fk_products_category_id".into(),
        column: "category_id".into(),
    };
    assert_eq!(
        drop_fk.to_sql("products", pg),
        "ALTER TABLE \"products\" DROP CONSTRAINT \"fk_products_category_id\";"
    );
    assert_eq!(
        drop_fk.to_sql("products", my),
        "ALTER TABLE `products` DROP FOREIGN KEY `fk_products_category_id`;"
    );

    let unique = Change::AddUnique {
        name: "uq_products_shop_id_handle".into(),
        columns: vec!["shop_id".into(), "handle".into()],
    };
    assert_eq!(
        unique.to_sql("products", my),
        "ALTER TABLE `products` ADD CONSTRAINT `uq_products_shop_id_handle` UNIQUE (`shop_id`, `handle`);"
    );

    let drop_unique = Change::DropUnique {
        name: "uq_products_sku".into(),
        columns: vec!["sku".into()],
    };
    assert_eq!(
        drop_unique.to_sql("products", my),
        "ALTER TABLE `products` DROP INDEX `uq_products_sku`;"
    );

    let index = Change::AddIndex {
        name: "idx_products_name".into(),
        columns: vec!["name".into()],
    };
    assert_eq!(
        index.to_sql("products", pg),
        "CREATE INDEX IF NOT EXISTS \"idx_products_name\" ON \"products\" (\"name\");"
    );
    assert_eq!(
        index.to_sql("products", my),
        "CREATE INDEX `idx_products_name` ON `products` (`name`);"
    );

    let drop_index = Change::DropIndex {
        name: "idx_products_name".into(),
        columns: vec!["name".into()],
    };
    assert_eq!(
        drop_index.to_sql("products", pg),
        "DROP INDEX IF EXISTS \"idx_products_name\";"
    );
    assert_eq!(
        drop_index.to_sql("products", my),
        "ALTER TABLE `products` DROP INDEX `idx_products_name`;"
    );
    assert_eq!(drop_index.phase(), Phase::Drop);
    assert_eq!(drop_index.to_string(), "- INDEX idx_products_name (name)");

    assert_eq!(
        Change::DropColumn("legacy".into()).to_sql("products", pg),
        "ALTER TABLE \"products\" DROP COLUMN \"legacy\";"
    );
}

#[test]
fn test_change_phases() {
    assert_eq!(Change::DropColumn("x".into()).phase(), Phase::Drop);
    assert_eq!(
        Change::DropForeignKey {
            name: "fk".into(),
            column: "x".into()
        }
        .phase(),
        Phase::Foreign
    );
    assert_eq!(
        Change::AddIndex {
            name: "idx".into(),
            columns: vec![]
        }
        .phase(),
        Phase::Constraint
    );
}

#[test]
fn test_change_display() {
    let col = make_column(
        &Field::new("bio", FieldType::Text).tag(FieldTag::Nullable),
        Dialect::Postgres,
    );
    assert_eq!(Change::AddColumn(col).to_string(), "+ bio: text (nullable)");
    assert_eq!(Change::DropColumn("legacy".into()).to_string(), "- legacy");
}

#[test]
fn test_unsupported_type_fails_before_ddl() {
    let ip = Field::new("ip", FieldType::Inet);
    let err = ColumnDef::from_field(&ip, &TypeMap::new(Dialect::MySql), true).unwrap_err();
    assert!(matches!(err, crate::Error::Unsupported { .. }));
}
