use sqlx::Row;
use sqlx::mysql::MySqlRow;

use crate::traced::TracedMySqlPool;
use crate::{Error, Result};

use super::{
    BoxFuture, ColumnInfo, EnumColumn, ForeignKeyInfo, IndexInfo, Inspector, UniqueInfo,
    group_indexes, group_uniques, parse_mysql_enum,
};

// information_schema returns binary strings on some servers, cast to CHAR.
const TABLES_SQL: &str = r#"
SELECT CAST(TABLE_NAME AS CHAR) AS table_name
FROM information_schema.TABLES
WHERE TABLE_SCHEMA = DATABASE() AND TABLE_TYPE = 'BASE TABLE'
ORDER BY TABLE_NAME
"#;

const COLUMNS_SQL: &str = r#"
SELECT
    CAST(COLUMN_NAME AS CHAR) AS column_name,
    CAST(COLUMN_TYPE AS CHAR) AS column_type,
    CAST(IS_NULLABLE AS CHAR) AS is_nullable,
    CAST(COLUMN_KEY AS CHAR) AS column_key,
    CAST(COLUMN_DEFAULT AS CHAR) AS column_default
FROM information_schema.COLUMNS
WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ?
ORDER BY ORDINAL_POSITION
"#;

const FOREIGN_KEYS_SQL: &str = r#"
SELECT
    CAST(CONSTRAINT_NAME AS CHAR) AS constraint_name,
    CAST(COLUMN_NAME AS CHAR) AS column_name,
    CAST(REFERENCED_TABLE_NAME AS CHAR) AS foreign_table,
    CAST(REFERENCED_COLUMN_NAME AS CHAR) AS foreign_column
FROM information_schema.KEY_COLUMN_USAGE
WHERE TABLE_SCHEMA = DATABASE()
  AND TABLE_NAME = ?
  AND REFERENCED_TABLE_NAME IS NOT NULL
ORDER BY CONSTRAINT_NAME, ORDINAL_POSITION
"#;

const UNIQUES_SQL: &str = r#"
SELECT
    CAST(tc.CONSTRAINT_NAME AS CHAR) AS unique_name,
    CAST(kcu.COLUMN_NAME AS CHAR) AS column_name
FROM information_schema.TABLE_CONSTRAINTS tc
JOIN information_schema.KEY_COLUMN_USAGE kcu
  ON tc.TABLE_SCHEMA = kcu.TABLE_SCHEMA
 AND tc.TABLE_NAME = kcu.TABLE_NAME
 AND tc.CONSTRAINT_NAME = kcu.CONSTRAINT_NAME
WHERE tc.CONSTRAINT_TYPE = 'UNIQUE'
  AND tc.TABLE_SCHEMA = DATABASE()
  AND tc.TABLE_NAME = ?
ORDER BY tc.CONSTRAINT_NAME, kcu.ORDINAL_POSITION
"#;

// InnoDB creates an index named after each foreign key that lacks one
const INDEXES_SQL: &str = r#"
SELECT
    CAST(s.INDEX_NAME AS CHAR) AS index_name,
    CAST(s.COLUMN_NAME AS CHAR) AS column_name
FROM information_schema.STATISTICS s
WHERE s.TABLE_SCHEMA = DATABASE()
  AND s.TABLE_NAME = ?
  AND s.NON_UNIQUE = 1
  AND s.COLUMN_NAME IS NOT NULL
  AND s.INDEX_NAME NOT IN (
      SELECT tc.CONSTRAINT_NAME
      FROM information_schema.TABLE_CONSTRAINTS tc
      WHERE tc.TABLE_SCHEMA = s.TABLE_SCHEMA
        AND tc.TABLE_NAME = s.TABLE_NAME
        AND tc.CONSTRAINT_TYPE = 'FOREIGN KEY'
  )
ORDER BY s.INDEX_NAME, s.SEQ_IN_INDEX
"#;

/// Reads `information_schema` of the connection's default database.
pub struct MySqlInspector {
    pool: TracedMySqlPool,
}

impl MySqlInspector {
    pub fn new(pool: TracedMySqlPool) -> Self {
        Self { pool }
    }

    async fn rows(&self, table: &str, sql: &str, params: &[&str]) -> Result<Vec<MySqlRow>> {
        self.pool
            .query(sql, params)
            .await
            .map_err(|source| Error::Introspection {
                table: table.to_string(),
                source,
            })
    }
}

fn read<'r, T>(row: &'r MySqlRow, column: &str, table: &str) -> Result<T>
where
    T: sqlx::Decode<'r, sqlx::MySql> + sqlx::Type<sqlx::MySql>,
{
    row.try_get(column).map_err(|e| Error::Introspection {
        table: table.to_string(),
        source: e.into(),
    })
}

impl Inspector for MySqlInspector {
    fn tables(&self) -> BoxFuture<'_, Result<Vec<String>>> {
        Box::pin(async move {
            let rows = self.rows("", TABLES_SQL, &[]).await?;
            rows.iter().map(|r| read(r, "table_name", "")).collect()
        })
    }

    fn columns<'a>(&'a self, table: &'a str) -> BoxFuture<'a, Result<Vec<ColumnInfo>>> {
        Box::pin(async move {
            let rows = self.rows(table, COLUMNS_SQL, &[table]).await?;
            rows.iter()
                .map(|r| {
                    let nullable: String = read(r, "is_nullable", table)?;
                    let key: Option<String> = read(r, "column_key", table)?;
                    Ok(ColumnInfo {
                        name: read(r, "column_name", table)?,
                        data_type: read(r, "column_type", table)?,
                        nullable: nullable == "YES",
                        is_primary: key.as_deref() == Some("PRI"),
                        default: read(r, "column_default", table)?,
                    })
                })
                .collect()
        })
    }

    fn foreign_keys<'a>(&'a self, table: &'a str) -> BoxFuture<'a, Result<Vec<ForeignKeyInfo>>> {
        Box::pin(async move {
            let rows = self.rows(table, FOREIGN_KEYS_SQL, &[table]).await?;
            rows.iter()
                .map(|r| {
                    Ok(ForeignKeyInfo {
                        name: read(r, "constraint_name", table)?,
                        column: read(r, "column_name", table)?,
                        foreign_table: read(r, "foreign_table", table)?,
                        foreign_column: read(r, "foreign_column", table)?,
                    })
                })
                .collect()
        })
    }

    fn uniques<'a>(&'a self, table: &'a str) -> BoxFuture<'a, Result<Vec<UniqueInfo>>> {
        Box::pin(async move {
            let rows = self.rows(table, UNIQUES_SQL, &[table]).await?;
            let pairs = rows
                .iter()
                .map(|r| Ok((read(r, "unique_name", table)?, read(r, "column_name", table)?)))
                .collect::<Result<Vec<(String, String)>>>()?;
            Ok(group_uniques(pairs))
        })
    }

    fn indexes<'a>(&'a self, table: &'a str) -> BoxFuture<'a, Result<Vec<IndexInfo>>> {
        Box::pin(async move {
            let rows = self.rows(table, INDEXES_SQL, &[table]).await?;
            let pairs = rows
                .iter()
                .map(|r| Ok((read(r, "index_name", table)?, read(r, "column_name", table)?)))
                .collect::<Result<Vec<(String, String)>>>()?;
            Ok(group_indexes(pairs))
        })
    }

    /// The values are part of `COLUMN_TYPE`, no extra query is needed.
    fn enumerators<'a>(
        &'a self,
        _table: &'a str,
        columns: &'a [ColumnInfo],
    ) -> BoxFuture<'a, Result<Vec<EnumColumn>>> {
        Box::pin(async move {
            Ok(columns
                .iter()
                .filter_map(|c| {
                    parse_mysql_enum(&c.data_type).map(|values| EnumColumn {
                        column: c.name.clone(),
                        values,
                    })
                })
                .collect())
        })
    }
}
