//! Physical column types and the logical → physical mapping tables.
//!
//! A [`TypeMap`] is built once per connection. Every [`FieldType`] the dialect
//! supports has exactly one entry; a missing entry means the type cannot be
//! used on that engine.

use std::collections::HashMap;
use std::fmt;

use schemalink_model::{Field, FieldType, Length, TypeParams};
use schemalink_sql::{Dialect, string_literals};

use crate::{Error, Result};

/// A physical column type, as stored by the database engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ColumnType {
    /// `boolean` on PostgreSQL, `tinyint(1)` on MySQL.
    Boolean,
    /// Timestamp without time zone.
    Timestamp,
    TimestampTz,
    /// MySQL `datetime`.
    DateTime,
    Date,
    Time,
    TinyInt,
    SmallInt,
    MediumInt,
    Integer,
    BigInt,
    /// Single precision.
    Float,
    Double,
    /// `(precision, scale)`; `None` for an unconstrained numeric.
    Decimal(Option<(u32, u32)>),
    Char(u32),
    Varchar(u32),
    Text,
    MediumText,
    LongText,
    Json,
    Jsonb,
    Uuid,
    Binary,
    Enum(Vec<String>),
    Hstore,
    Cidr,
    Inet,
    Macaddr,
}

impl ColumnType {
    /// Render the type as it appears in DDL.
    pub fn to_sql(&self, dialect: Dialect) -> String {
        let pg = dialect == Dialect::Postgres;
        match self {
            ColumnType::Boolean if pg => "boolean".into(),
            ColumnType::Boolean => "tinyint(1)".into(),
            ColumnType::Timestamp => "timestamp".into(),
            ColumnType::TimestampTz => "timestamptz".into(),
            ColumnType::DateTime => "datetime".into(),
            ColumnType::Date => "date".into(),
            ColumnType::Time => "time".into(),
            ColumnType::TinyInt => "tinyint".into(),
            ColumnType::SmallInt => "smallint".into(),
            ColumnType::MediumInt => "mediumint".into(),
            ColumnType::Integer if pg => "integer".into(),
            ColumnType::Integer => "int".into(),
            ColumnType::BigInt => "bigint".into(),
            ColumnType::Float if pg => "real".into(),
            ColumnType::Float => "float".into(),
            ColumnType::Double if pg => "double precision".into(),
            ColumnType::Double => "double".into(),
            ColumnType::Decimal(params) => {
                let name = if pg { "numeric" } else { "decimal" };
                match params {
                    Some((p, s)) => format!("{}({}, {})", name, p, s),
                    None => name.into(),
                }
            }
            ColumnType::Char(n) => format!("char({})", n),
            ColumnType::Varchar(n) => format!("varchar({})", n),
            ColumnType::Text => "text".into(),
            ColumnType::MediumText => "mediumtext".into(),
            ColumnType::LongText => "longtext".into(),
            ColumnType::Json => "json".into(),
            ColumnType::Jsonb => "jsonb".into(),
            ColumnType::Uuid => "uuid".into(),
            ColumnType::Binary if pg => "bytea".into(),
            ColumnType::Binary => "blob".into(),
            ColumnType::Enum(_) if pg => "text".into(),
            ColumnType::Enum(values) => {
                let values: Vec<_> = values.iter().map(|v| dialect.literal(v)).collect();
                format!("enum({})", values.join(", "))
            }
            ColumnType::Hstore => "hstore".into(),
            ColumnType::Cidr => "cidr".into(),
            ColumnType::Inet => "inet".into(),
            ColumnType::Macaddr => "macaddr".into(),
        }
    }

    /// Text-like columns that MySQL only accepts expression defaults for.
    pub fn is_blob_like(&self) -> bool {
        matches!(
            self,
            ColumnType::Text
                | ColumnType::MediumText
                | ColumnType::LongText
                | ColumnType::Json
                | ColumnType::Binary
        )
    }

    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            ColumnType::TinyInt
                | ColumnType::SmallInt
                | ColumnType::MediumInt
                | ColumnType::Integer
                | ColumnType::BigInt
        )
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::Enum(values) => write!(f, "enum({})", values.join(", ")),
            other => f.write_str(&other.to_sql(Dialect::Postgres)),
        }
    }
}

/// Result of parsing an introspected type string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedType {
    pub column_type: ColumnType,
    pub unsigned: bool,
}

/// Parse a physical type string into a [`ColumnType`].
///
/// Accepts both the catalog spelling (`character varying(255)`, `timestamp
/// with time zone`, `int(11) unsigned`) and the DDL spelling this crate emits.
/// Returns `None` for types with no logical counterpart.
pub fn parse_column_type(dialect: Dialect, raw: &str) -> Option<ParsedType> {
    let lowered = raw.trim().to_ascii_lowercase();

    let mut unsigned = false;
    let mut words: Vec<&str> = Vec::new();
    for word in lowered.split_whitespace() {
        match word {
            "unsigned" => unsigned = true,
            "zerofill" => {}
            other => words.push(other),
        }
    }
    let cleaned = words.join(" ");

    if cleaned.starts_with("enum(") {
        // Values keep their original case.
        return Some(ParsedType {
            column_type: ColumnType::Enum(string_literals(raw)),
            unsigned,
        });
    }

    let (name, args) = match (cleaned.find('('), cleaned.find(')')) {
        (Some(open), Some(close)) if open < close => {
            let name = format!("{} {}", cleaned[..open].trim(), cleaned[close + 1..].trim());
            (name.trim().to_string(), Some(cleaned[open + 1..close].to_string()))
        }
        _ => (cleaned.clone(), None),
    };

    let numbers: Vec<u32> = args
        .as_deref()
        .map(|a| a.split(',').filter_map(|n| n.trim().parse().ok()).collect())
        .unwrap_or_default();

    let column_type = match name.as_str() {
        "boolean" | "bool" => ColumnType::Boolean,
        "timestamp with time zone" | "timestamptz" => ColumnType::TimestampTz,
        "timestamp without time zone" | "timestamp" => ColumnType::Timestamp,
        "datetime" => ColumnType::DateTime,
        "date" => ColumnType::Date,
        "time" | "time without time zone" => ColumnType::Time,
        "tinyint" if dialect == Dialect::MySql && numbers == [1] => ColumnType::Boolean,
        "tinyint" => ColumnType::TinyInt,
        "smallint" | "int2" => ColumnType::SmallInt,
        "mediumint" => ColumnType::MediumInt,
        "integer" | "int" | "int4" => ColumnType::Integer,
        "bigint" | "int8" => ColumnType::BigInt,
        "real" | "float4" | "float" => ColumnType::Float,
        "double precision" | "double" | "float8" => ColumnType::Double,
        "numeric" | "decimal" => match numbers.as_slice() {
            [p, s] => ColumnType::Decimal(Some((*p, *s))),
            [p] => ColumnType::Decimal(Some((*p, 0))),
            _ => ColumnType::Decimal(None),
        },
        "character" | "char" | "bpchar" => ColumnType::Char(numbers.first().copied().unwrap_or(1)),
        "character varying" | "varchar" => match numbers.first() {
            Some(n) => ColumnType::Varchar(*n),
            None => ColumnType::Text,
        },
        "text" | "tinytext" => ColumnType::Text,
        "mediumtext" => ColumnType::MediumText,
        "longtext" => ColumnType::LongText,
        "json" => ColumnType::Json,
        "jsonb" => ColumnType::Jsonb,
        "uuid" => ColumnType::Uuid,
        "bytea" | "blob" | "tinyblob" | "mediumblob" | "longblob" => ColumnType::Binary,
        "hstore" => ColumnType::Hstore,
        "cidr" => ColumnType::Cidr,
        "inet" => ColumnType::Inet,
        "macaddr" => ColumnType::Macaddr,
        _ => return None,
    };

    Some(ParsedType {
        column_type,
        unsigned,
    })
}

/// Map a physical type back to the logical type that produces it.
///
/// Lossy on purpose: MySQL `char(36)` reads back as UUID, `tinyint(1)` as
/// BOOLEAN, and PostgreSQL has a single integer type per width.
pub fn logical_type(dialect: Dialect, column_type: &ColumnType) -> (FieldType, TypeParams) {
    let plain = |ty| (ty, TypeParams::default());
    match column_type {
        ColumnType::Boolean => plain(FieldType::Boolean),
        ColumnType::Timestamp | ColumnType::TimestampTz | ColumnType::DateTime => {
            plain(FieldType::DateTime)
        }
        ColumnType::Date => plain(FieldType::DateOnly),
        ColumnType::Time => plain(FieldType::Time),
        ColumnType::TinyInt => plain(FieldType::TinyInt),
        ColumnType::SmallInt => plain(FieldType::SmallInt),
        ColumnType::MediumInt => plain(FieldType::MediumInt),
        ColumnType::Integer => plain(FieldType::Integer),
        ColumnType::BigInt => plain(FieldType::BigInt),
        ColumnType::Float => plain(FieldType::Float),
        ColumnType::Double => plain(FieldType::Double),
        ColumnType::Decimal(Some((p, s))) => (FieldType::Decimal, TypeParams::decimal(*p, *s)),
        ColumnType::Decimal(None) => plain(FieldType::Decimal),
        ColumnType::Char(36) if dialect == Dialect::MySql => plain(FieldType::Uuid),
        ColumnType::Char(n) => (FieldType::Char, TypeParams::length(*n)),
        ColumnType::Varchar(n) => (FieldType::String, TypeParams::length(*n)),
        ColumnType::Text => plain(FieldType::Text),
        ColumnType::MediumText => (FieldType::Text, TypeParams::medium()),
        ColumnType::LongText => (FieldType::Text, TypeParams::long()),
        ColumnType::Json => plain(FieldType::Json),
        ColumnType::Jsonb => plain(FieldType::Jsonb),
        ColumnType::Uuid => plain(FieldType::Uuid),
        ColumnType::Binary => plain(FieldType::Blob),
        ColumnType::Enum(values) => (FieldType::Enum, TypeParams::values(values.clone())),
        ColumnType::Hstore => plain(FieldType::Hstore),
        ColumnType::Cidr => plain(FieldType::Cidr),
        ColumnType::Inet => plain(FieldType::Inet),
        ColumnType::Macaddr => plain(FieldType::Macaddr),
    }
}

type Mapper = fn(&TypeParams) -> ColumnType;

fn fixed_or(params: &TypeParams, default: u32) -> u32 {
    params.length.and_then(|l| l.fixed()).unwrap_or(default)
}

fn decimal(params: &TypeParams) -> ColumnType {
    ColumnType::Decimal(Some((
        params.precision.unwrap_or(8),
        params.scale.unwrap_or(2),
    )))
}

/// Fixed logical → physical mapping table for one dialect.
#[derive(Debug, Clone)]
pub struct TypeMap {
    dialect: Dialect,
    mappers: HashMap<FieldType, Mapper>,
}

impl TypeMap {
    pub fn new(dialect: Dialect) -> Self {
        let map = Self {
            dialect,
            mappers: HashMap::new(),
        }
        .with(FieldType::Boolean, |_| ColumnType::Boolean)
        .with(FieldType::DateOnly, |_| ColumnType::Date)
        .with(FieldType::Time, |_| ColumnType::Time)
        .with(FieldType::Integer, |_| ColumnType::Integer)
        .with(FieldType::Json, |_| ColumnType::Json)
        .with(FieldType::String, |p| ColumnType::Varchar(fixed_or(p, 255)))
        .with(FieldType::Char, |p| ColumnType::Char(fixed_or(p, 255)))
        .with(FieldType::BigInt, |_| ColumnType::BigInt)
        .with(FieldType::SmallInt, |_| ColumnType::SmallInt)
        .with(FieldType::Float, |_| ColumnType::Float)
        .with(FieldType::Real, |_| ColumnType::Double)
        .with(FieldType::Double, |_| ColumnType::Double)
        .with(FieldType::Decimal, decimal)
        .with(FieldType::Blob, |_| ColumnType::Binary);

        match dialect {
            Dialect::Postgres => map
                .with(FieldType::DateTime, |_| ColumnType::TimestampTz)
                .with(FieldType::Text, |_| ColumnType::Text)
                .with(FieldType::Uuid, |_| ColumnType::Uuid)
                .with(FieldType::TinyInt, |_| ColumnType::SmallInt)
                .with(FieldType::MediumInt, |_| ColumnType::Integer)
                // enum fallback, the values become a CHECK constraint
                .with(FieldType::Enum, |_| ColumnType::Text)
                .with(FieldType::Jsonb, |_| ColumnType::Jsonb)
                .with(FieldType::Hstore, |_| ColumnType::Hstore)
                .with(FieldType::Cidr, |_| ColumnType::Cidr)
                .with(FieldType::Inet, |_| ColumnType::Inet)
                .with(FieldType::Macaddr, |_| ColumnType::Macaddr),
            Dialect::MySql => map
                .with(FieldType::DateTime, |_| ColumnType::DateTime)
                .with(FieldType::Text, |p| match p.length {
                    Some(Length::Medium) => ColumnType::MediumText,
                    Some(Length::Long) => ColumnType::LongText,
                    _ => ColumnType::Text,
                })
                .with(FieldType::Uuid, |_| ColumnType::Char(36))
                .with(FieldType::TinyInt, |_| ColumnType::TinyInt)
                .with(FieldType::MediumInt, |_| ColumnType::MediumInt)
                .with(FieldType::Enum, |p| ColumnType::Enum(p.values.clone())),
        }
    }

    fn with(mut self, field_type: FieldType, mapper: Mapper) -> Self {
        self.mappers.insert(field_type, mapper);
        self
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn supports(&self, field_type: FieldType) -> bool {
        self.mappers.contains_key(&field_type)
    }

    /// Physical type of a field.
    pub fn resolve(&self, field: &Field) -> Result<ColumnType> {
        let mapper = self
            .mappers
            .get(&field.field_type)
            .ok_or_else(|| Error::Unsupported {
                dialect: self.dialect,
                what: format!("field type '{}'", field.field_type),
            })?;
        Ok(mapper(&field.type_params))
    }
}
