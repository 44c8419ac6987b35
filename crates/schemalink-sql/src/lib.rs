//! SQL dialects, quoting and constraint naming.
//!
//! Everything here is pure string handling; nothing talks to a database.

use std::fmt;

/// Target SQL engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    Postgres,
    /// MySQL and MariaDB.
    MySql,
}

impl Dialect {
    /// Detect the dialect from a connection string scheme.
    ///
    /// ```
    /// use schemalink_sql::Dialect;
    /// assert_eq!(Dialect::from_dsn("postgres://localhost/app"), Some(Dialect::Postgres));
    /// assert_eq!(Dialect::from_dsn("mariadb://localhost/app"), Some(Dialect::MySql));
    /// assert_eq!(Dialect::from_dsn("sqlite::memory:"), None);
    /// ```
    pub fn from_dsn(dsn: &str) -> Option<Self> {
        let (scheme, _) = dsn.split_once("://")?;
        match scheme.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Some(Dialect::Postgres),
            "mysql" | "mariadb" => Some(Dialect::MySql),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Dialect::Postgres => "postgres",
            Dialect::MySql => "mysql",
        }
    }

    /// Longest identifier the engine accepts.
    pub fn identifier_max(&self) -> usize {
        match self {
            Dialect::Postgres => 63,
            Dialect::MySql => 64,
        }
    }

    /// Quote an identifier. Embedded quote characters are doubled.
    ///
    /// ```
    /// use schemalink_sql::Dialect;
    /// assert_eq!(Dialect::Postgres.quote("order"), "\"order\"");
    /// assert_eq!(Dialect::MySql.quote("order"), "`order`");
    /// ```
    pub fn quote(&self, name: &str) -> String {
        Ident(*self, name).to_string()
    }

    /// Quote a string literal for this dialect.
    ///
    /// MySQL treats backslash as an escape character inside strings, so it is
    /// doubled as well.
    pub fn literal(&self, value: &str) -> String {
        match self {
            Dialect::Postgres => Lit(value).to_string(),
            Dialect::MySql => Lit(value.replace('\\', "\\\\")).to_string(),
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A string literal wrapper.
///
/// Display writes the value quoted with single quotes, doubling embedded ones.
///
/// ```
/// use schemalink_sql::Lit;
/// assert_eq!(format!("{}", Lit("it's")), "'it''s'");
/// ```
pub struct Lit<T: AsRef<str>>(pub T);

impl<T: AsRef<str>> fmt::Display for Lit<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'")?;
        for c in self.0.as_ref().chars() {
            if c == '\'' {
                write!(f, "''")?;
            } else {
                write!(f, "{}", c)?;
            }
        }
        write!(f, "'")
    }
}

/// An identifier wrapper quoted for a given dialect.
pub struct Ident<'a>(pub Dialect, pub &'a str);

impl fmt::Display for Ident<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let quote = match self.0 {
            Dialect::Postgres => '"',
            Dialect::MySql => '`',
        };
        write!(f, "{}", quote)?;
        for c in self.1.chars() {
            if c == quote {
                write!(f, "{}{}", quote, quote)?;
            } else {
                write!(f, "{}", c)?;
            }
        }
        write!(f, "{}", quote)
    }
}

/// Join quoted identifiers with `", "`.
pub fn quote_list(dialect: Dialect, names: &[impl AsRef<str>]) -> String {
    names
        .iter()
        .map(|n| dialect.quote(n.as_ref()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Index name: `idx_{table}_{columns}`.
///
/// ```
/// use schemalink_sql::{index_name, Dialect};
/// assert_eq!(index_name(Dialect::Postgres, "post", &["author_id", "created_at"]), "idx_post_author_id_created_at");
/// ```
pub fn index_name(dialect: Dialect, table: &str, columns: &[impl AsRef<str>]) -> String {
    constraint_name(dialect, "idx", table, columns)
}

/// Unique constraint name: `uq_{table}_{columns}`.
pub fn unique_name(dialect: Dialect, table: &str, columns: &[impl AsRef<str>]) -> String {
    constraint_name(dialect, "uq", table, columns)
}

/// Foreign key constraint name: `fk_{table}_{column}`.
pub fn foreign_key_name(dialect: Dialect, table: &str, column: &str) -> String {
    constraint_name(dialect, "fk", table, &[column])
}

/// CHECK constraint name for an enum column: `ck_{table}_{column}`.
pub fn check_name(dialect: Dialect, table: &str, column: &str) -> String {
    constraint_name(dialect, "ck", table, &[column])
}

/// Build `{prefix}_{table}_{columns}`, shortened with a hash suffix when it
/// would exceed the dialect's identifier limit.
///
/// Shortened names stay deterministic: the suffix is the first 16 hex digits
/// of the blake3 hash of the full name.
pub fn constraint_name(
    dialect: Dialect,
    prefix: &str,
    table: &str,
    columns: &[impl AsRef<str>],
) -> String {
    let cols: Vec<&str> = columns.iter().map(|c| c.as_ref()).collect();
    let full = format!("{}_{}_{}", prefix, table, cols.join("_"));

    let max = dialect.identifier_max();
    if full.len() <= max {
        return full;
    }

    let hex = blake3::hash(full.as_bytes()).to_hex().to_string();
    let suffix = &hex[..16];

    let mut len = max - suffix.len() - 1;
    while len > 0 && !full.is_char_boundary(len) {
        len -= 1;
    }
    format!("{}_{}", &full[..len], suffix)
}

/// Extract every single-quoted literal from a SQL fragment, in order.
///
/// Works on MySQL column types (`enum('a','it''s')`) and on PostgreSQL CHECK
/// definitions (`CHECK ((status = ANY (ARRAY['a'::text, 'b'::text])))`).
///
/// ```
/// use schemalink_sql::string_literals;
/// assert_eq!(string_literals("enum('a','it''s')"), vec!["a", "it's"]);
/// ```
pub fn string_literals(input: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '\'' {
            continue;
        }
        let mut value = String::new();
        loop {
            match chars.next() {
                Some('\'') => {
                    if chars.peek() == Some(&'\'') {
                        chars.next();
                        value.push('\'');
                    } else {
                        break;
                    }
                }
                Some('\\') => {
                    if let Some(escaped) = chars.next() {
                        value.push(escaped);
                    }
                }
                Some(other) => value.push(other),
                // unterminated literal
                None => break,
            }
        }
        out.push(value);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_doubles_embedded_quotes() {
        assert_eq!(Dialect::Postgres.quote("bla\"h"), "\"bla\"\"h\"");
        assert_eq!(Dialect::MySql.quote("bla`h"), "`bla``h`");
    }

    #[test]
    fn test_literal() {
        assert_eq!(Dialect::Postgres.literal("it's"), "'it''s'");
        assert_eq!(Dialect::Postgres.literal(r"a\b"), r"'a\b'");
        assert_eq!(Dialect::MySql.literal(r"a\b"), r"'a\\b'");
    }

    #[test]
    fn test_quote_list() {
        assert_eq!(
            quote_list(Dialect::Postgres, &["shop_id", "handle"]),
            "\"shop_id\", \"handle\""
        );
    }

    #[test]
    fn test_from_dsn_is_case_insensitive() {
        assert_eq!(
            Dialect::from_dsn("PostgreSQL://db/app"),
            Some(Dialect::Postgres)
        );
        assert_eq!(Dialect::from_dsn("MYSQL://db/app"), Some(Dialect::MySql));
        assert_eq!(Dialect::from_dsn("localhost:5432"), None);
    }

    #[test]
    fn test_constraint_names() {
        assert_eq!(
            unique_name(Dialect::Postgres, "category", &["shop_id", "handle"]),
            "uq_category_shop_id_handle"
        );
        assert_eq!(
            foreign_key_name(Dialect::MySql, "products", "category_id"),
            "fk_products_category_id"
        );
        assert_eq!(
            check_name(Dialect::Postgres, "orders", "status"),
            "ck_orders_status"
        );
    }

    #[test]
    fn test_long_names_are_truncated_deterministically() {
        let table = "a_really_long_table_name_that_keeps_going_and_going";
        let cols = ["another_really_long_column_name"];

        let pg = index_name(Dialect::Postgres, table, &cols);
        let my = index_name(Dialect::MySql, table, &cols);

        assert_eq!(pg.len(), 63);
        assert_eq!(my.len(), 64);
        assert!(pg.starts_with("idx_a_really_long_table_name"));
        assert_eq!(pg, index_name(Dialect::Postgres, table, &cols));
        assert_ne!(pg, index_name(Dialect::Postgres, table, &["other_column_that_is_long_too"]));
    }

    #[test]
    fn test_string_literals_postgres_check() {
        let def = "CHECK ((status = ANY (ARRAY['draft'::text, 'paid'::text, 'it''s'::text])))";
        insta::assert_debug_snapshot!(string_literals(def), @r#"
        [
            "draft",
            "paid",
            "it's",
        ]
        "#);
    }

    #[test]
    fn test_string_literals_mysql_enum() {
        assert_eq!(
            string_literals("enum('small','medium','x,large')"),
            vec!["small", "medium", "x,large"]
        );
        assert_eq!(string_literals("enum('')"), vec![""]);
        assert!(string_literals("int(11)").is_empty());
    }
}
