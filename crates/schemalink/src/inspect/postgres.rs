use tokio_postgres::Row;
use tokio_postgres::types::{FromSql, ToSql};

use crate::traced::TracedPool;
use crate::{Error, Result};

use super::{
    BoxFuture, ColumnInfo, EnumColumn, ForeignKeyInfo, IndexInfo, Inspector, UniqueInfo,
    group_indexes, group_uniques, parse_check_values,
};

const TABLES_SQL: &str = r#"
SELECT c.relname::text
FROM pg_catalog.pg_class c
JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
WHERE c.relkind IN ('r', 'p') AND n.nspname = current_schema()
ORDER BY c.relname
"#;

const COLUMNS_SQL: &str = r#"
SELECT
    a.attname::text,
    format_type(a.atttypid, a.atttypmod),
    NOT a.attnotnull,
    COALESCE(pk.is_pk, false),
    pg_get_expr(d.adbin, d.adrelid)
FROM pg_catalog.pg_attribute a
JOIN pg_catalog.pg_class c ON c.oid = a.attrelid
JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
LEFT JOIN pg_catalog.pg_attrdef d ON d.adrelid = a.attrelid AND d.adnum = a.attnum
LEFT JOIN LATERAL (
    SELECT true AS is_pk
    FROM pg_catalog.pg_index i
    WHERE i.indrelid = c.oid AND i.indisprimary AND a.attnum = ANY(i.indkey)
    LIMIT 1
) pk ON true
WHERE n.nspname = current_schema()
  AND c.relname = $1
  AND a.attnum > 0
  AND NOT a.attisdropped
ORDER BY a.attnum
"#;

const FOREIGN_KEYS_SQL: &str = r#"
SELECT
    con.conname::text,
    a.attname::text,
    ref.relname::text,
    ra.attname::text
FROM pg_catalog.pg_constraint con
JOIN pg_catalog.pg_class c ON c.oid = con.conrelid
JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
JOIN pg_catalog.pg_class ref ON ref.oid = con.confrelid
JOIN pg_catalog.pg_attribute a ON a.attrelid = con.conrelid AND a.attnum = con.conkey[1]
JOIN pg_catalog.pg_attribute ra ON ra.attrelid = con.confrelid AND ra.attnum = con.confkey[1]
WHERE con.contype = 'f'
  AND n.nspname = current_schema()
  AND c.relname = $1
  AND array_length(con.conkey, 1) = 1
ORDER BY con.conname
"#;

const UNIQUES_SQL: &str = r#"
SELECT con.conname::text, a.attname::text
FROM pg_catalog.pg_constraint con
JOIN pg_catalog.pg_class c ON c.oid = con.conrelid
JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
CROSS JOIN LATERAL unnest(con.conkey) WITH ORDINALITY AS k(attnum, ord)
JOIN pg_catalog.pg_attribute a ON a.attrelid = con.conrelid AND a.attnum = k.attnum
WHERE con.contype = 'u'
  AND n.nspname = current_schema()
  AND c.relname = $1
ORDER BY con.conname, k.ord
"#;

// expression and partial indexes are not ours to manage
const INDEXES_SQL: &str = r#"
SELECT ic.relname::text, a.attname::text
FROM pg_catalog.pg_index i
JOIN pg_catalog.pg_class c ON c.oid = i.indrelid
JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
JOIN pg_catalog.pg_class ic ON ic.oid = i.indexrelid
CROSS JOIN LATERAL unnest(i.indkey::int2[]) WITH ORDINALITY AS k(attnum, ord)
JOIN pg_catalog.pg_attribute a ON a.attrelid = i.indrelid AND a.attnum = k.attnum
WHERE NOT i.indisunique
  AND NOT i.indisprimary
  AND i.indexprs IS NULL
  AND i.indpred IS NULL
  AND n.nspname = current_schema()
  AND c.relname = $1
ORDER BY ic.relname, k.ord
"#;

const CHECKS_SQL: &str = r#"
SELECT a.attname::text, pg_get_constraintdef(con.oid)
FROM pg_catalog.pg_constraint con
JOIN pg_catalog.pg_class c ON c.oid = con.conrelid
JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
JOIN pg_catalog.pg_attribute a ON a.attrelid = con.conrelid AND a.attnum = con.conkey[1]
WHERE con.contype = 'c'
  AND n.nspname = current_schema()
  AND c.relname = $1
  AND array_length(con.conkey, 1) = 1
ORDER BY con.conname
"#;

/// Reads `pg_catalog` in the connection's current schema.
pub struct PostgresInspector {
    pool: TracedPool,
}

impl PostgresInspector {
    pub fn new(pool: TracedPool) -> Self {
        Self { pool }
    }

    async fn rows(
        &self,
        table: &str,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<Vec<Row>> {
        let introspection = |source| Error::Introspection {
            table: table.to_string(),
            source,
        };
        let conn = self.pool.get().await.map_err(introspection)?;
        conn.query(sql, params).await.map_err(introspection)
    }
}

fn read<'r, T>(row: &'r Row, idx: usize, table: &str) -> Result<T>
where
    T: FromSql<'r>,
{
    row.try_get(idx).map_err(|e| Error::Introspection {
        table: table.to_string(),
        source: e.into(),
    })
}

impl Inspector for PostgresInspector {
    fn tables(&self) -> BoxFuture<'_, Result<Vec<String>>> {
        Box::pin(async move {
            let rows = self.rows("", TABLES_SQL, &[]).await?;
            rows.iter().map(|r| read(r, 0, "")).collect()
        })
    }

    fn columns<'a>(&'a self, table: &'a str) -> BoxFuture<'a, Result<Vec<ColumnInfo>>> {
        Box::pin(async move {
            let rows = self.rows(table, COLUMNS_SQL, &[&table]).await?;
            rows.iter()
                .map(|r| {
                    Ok(ColumnInfo {
                        name: read(r, 0, table)?,
                        data_type: read(r, 1, table)?,
                        nullable: read(r, 2, table)?,
                        is_primary: read(r, 3, table)?,
                        default: read(r, 4, table)?,
                    })
                })
                .collect()
        })
    }

    fn foreign_keys<'a>(&'a self, table: &'a str) -> BoxFuture<'a, Result<Vec<ForeignKeyInfo>>> {
        Box::pin(async move {
            let rows = self.rows(table, FOREIGN_KEYS_SQL, &[&table]).await?;
            rows.iter()
                .map(|r| {
                    Ok(ForeignKeyInfo {
                        name: read(r, 0, table)?,
                        column: read(r, 1, table)?,
                        foreign_table: read(r, 2, table)?,
                        foreign_column: read(r, 3, table)?,
                    })
                })
                .collect()
        })
    }

    fn uniques<'a>(&'a self, table: &'a str) -> BoxFuture<'a, Result<Vec<UniqueInfo>>> {
        Box::pin(async move {
            let rows = self.rows(table, UNIQUES_SQL, &[&table]).await?;
            let pairs = rows
                .iter()
                .map(|r| Ok((read(r, 0, table)?, read(r, 1, table)?)))
                .collect::<Result<Vec<(String, String)>>>()?;
            Ok(group_uniques(pairs))
        })
    }

    fn indexes<'a>(&'a self, table: &'a str) -> BoxFuture<'a, Result<Vec<IndexInfo>>> {
        Box::pin(async move {
            let rows = self.rows(table, INDEXES_SQL, &[&table]).await?;
            let pairs = rows
                .iter()
                .map(|r| Ok((read(r, 0, table)?, read(r, 1, table)?)))
                .collect::<Result<Vec<(String, String)>>>()?;
            Ok(group_indexes(pairs))
        })
    }

    fn enumerators<'a>(
        &'a self,
        table: &'a str,
        columns: &'a [ColumnInfo],
    ) -> BoxFuture<'a, Result<Vec<EnumColumn>>> {
        Box::pin(async move {
            let rows = self.rows(table, CHECKS_SQL, &[&table]).await?;
            let mut enums = Vec::new();
            for row in &rows {
                let column: String = read(row, 0, table)?;
                let definition: String = read(row, 1, table)?;
                if !columns.iter().any(|c| c.name == column) {
                    continue;
                }
                if let Some(values) = parse_check_values(&definition) {
                    enums.push(EnumColumn { column, values });
                }
            }
            Ok(enums)
        })
    }
}
