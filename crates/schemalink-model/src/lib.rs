//! Logical schema types for schemalink.
//!
//! This crate contains the declarative description of what a database should
//! look like: [`Entity`] (one table), [`Field`] (one column), [`Relation`] and
//! [`Unique`]. It has no knowledge of SQL dialects or connections; those live in
//! `schemalink-sql` and `schemalink`.
//!
//! Entities are immutable snapshots. A new version of an entity replaces the
//! old one wholesale, it is never patched in place.
//!
//! ## Example
//!
//! ```
//! use schemalink_model::{Entity, Field, FieldTag, FieldType, TypeParams};
//!
//! let order = Entity::new("main", "Order", "orders")
//!     .field(Field::with_column("id", "id", FieldType::Uuid).tag(FieldTag::Primary))
//!     .field(
//!         Field::with_column("total", "total", FieldType::Decimal)
//!             .params(TypeParams::decimal(10, 2)),
//!     );
//!
//! assert_eq!(order.primary_fields().count(), 1);
//! assert!(order.get_field("id").unwrap().is_auto_generated());
//! ```

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Entity tag marking a table that must never be structurally modified.
pub const READONLY_TAG: &str = "readonly";

/// Logical field types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FieldType {
    Boolean,
    /// Date and time.
    DateTime,
    /// Date without time.
    DateOnly,
    Time,
    Integer,
    Json,
    Text,
    Uuid,
    /// Variable length string.
    String,
    /// Fixed length string.
    Char,
    BigInt,
    TinyInt,
    SmallInt,
    MediumInt,
    Float,
    Real,
    Double,
    Decimal,
    Blob,
    Enum,
    /// PostgreSQL only.
    Jsonb,
    /// PostgreSQL only.
    Hstore,
    /// PostgreSQL only.
    Cidr,
    /// PostgreSQL only.
    Inet,
    /// PostgreSQL only.
    Macaddr,
}

impl FieldType {
    /// Every field type, in declaration order.
    pub const ALL: [FieldType; 25] = [
        FieldType::Boolean,
        FieldType::DateTime,
        FieldType::DateOnly,
        FieldType::Time,
        FieldType::Integer,
        FieldType::Json,
        FieldType::Text,
        FieldType::Uuid,
        FieldType::String,
        FieldType::Char,
        FieldType::BigInt,
        FieldType::TinyInt,
        FieldType::SmallInt,
        FieldType::MediumInt,
        FieldType::Float,
        FieldType::Real,
        FieldType::Double,
        FieldType::Decimal,
        FieldType::Blob,
        FieldType::Enum,
        FieldType::Jsonb,
        FieldType::Hstore,
        FieldType::Cidr,
        FieldType::Inet,
        FieldType::Macaddr,
    ];

    /// The stable identifier used when entities are stored or exchanged.
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Boolean => "boolean",
            FieldType::DateTime => "timestamp",
            FieldType::DateOnly => "dateonly",
            FieldType::Time => "time",
            FieldType::Integer => "int",
            FieldType::Json => "json",
            FieldType::Text => "text",
            FieldType::Uuid => "uuid",
            FieldType::String => "string",
            FieldType::Char => "char",
            FieldType::BigInt => "bigint",
            FieldType::TinyInt => "tinyint",
            FieldType::SmallInt => "smallint",
            FieldType::MediumInt => "mediumint",
            FieldType::Float => "float",
            FieldType::Real => "real",
            FieldType::Double => "double",
            FieldType::Decimal => "decimal",
            FieldType::Blob => "blob",
            FieldType::Enum => "enum",
            FieldType::Jsonb => "jsonb",
            FieldType::Hstore => "hstore",
            FieldType::Cidr => "cidr",
            FieldType::Inet => "inet",
            FieldType::Macaddr => "macaddr",
        }
    }

    /// Types that only exist on PostgreSQL.
    pub fn is_postgres_only(&self) -> bool {
        matches!(
            self,
            FieldType::Jsonb
                | FieldType::Hstore
                | FieldType::Cidr
                | FieldType::Inet
                | FieldType::Macaddr
        )
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown field type or tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub kind: &'static str,
    pub input: String,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown {} '{}'", self.kind, self.input)
    }
}

impl std::error::Error for ParseError {}

impl FromStr for FieldType {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FieldType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ParseError {
                kind: "field type",
                input: s.to_string(),
            })
    }
}

/// Length parameter of a field.
///
/// Strings and integers use a fixed size, text columns use a size class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Length {
    Fixed(u32),
    Medium,
    Long,
}

impl Length {
    /// Returns the fixed size, if this is one.
    pub fn fixed(&self) -> Option<u32> {
        match self {
            Length::Fixed(n) => Some(*n),
            _ => None,
        }
    }
}

/// Type parameters of a field (length, precision, enum values...).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct TypeParams {
    pub length: Option<Length>,
    pub precision: Option<u32>,
    pub scale: Option<u32>,
    /// Permitted values of an enum field.
    pub values: Vec<String>,
    pub unsigned: bool,
}

impl TypeParams {
    pub fn length(n: u32) -> Self {
        Self {
            length: Some(Length::Fixed(n)),
            ..Self::default()
        }
    }

    pub fn medium() -> Self {
        Self {
            length: Some(Length::Medium),
            ..Self::default()
        }
    }

    pub fn long() -> Self {
        Self {
            length: Some(Length::Long),
            ..Self::default()
        }
    }

    pub fn decimal(precision: u32, scale: u32) -> Self {
        Self {
            precision: Some(precision),
            scale: Some(scale),
            ..Self::default()
        }
    }

    pub fn values<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            values: values.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn unsigned(mut self) -> Self {
        self.unsigned = true;
        self
    }
}

/// Capability tags of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FieldTag {
    Primary,
    Unique,
    Index,
    Nullable,
    /// Set when the record is created.
    Created,
    /// Set when the record is updated.
    Updated,
    /// Soft delete marker.
    Deleted,
    /// Optimistic lock version.
    Version,
    Tags,
}

impl FieldTag {
    pub const ALL: [FieldTag; 9] = [
        FieldTag::Primary,
        FieldTag::Unique,
        FieldTag::Index,
        FieldTag::Nullable,
        FieldTag::Created,
        FieldTag::Updated,
        FieldTag::Deleted,
        FieldTag::Version,
        FieldTag::Tags,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldTag::Primary => "primary",
            FieldTag::Unique => "unique",
            FieldTag::Index => "index",
            FieldTag::Nullable => "nullable",
            FieldTag::Created => "created",
            FieldTag::Updated => "updated",
            FieldTag::Deleted => "deleted",
            FieldTag::Version => "version",
            FieldTag::Tags => "tags",
        }
    }
}

impl fmt::Display for FieldTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldTag {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FieldTag::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ParseError {
                kind: "field tag",
                input: s.to_string(),
            })
    }
}

/// Default value of a field, typed by the kind of host value it came from.
#[derive(Debug, Clone, PartialEq)]
pub enum DefaultValue {
    /// Explicit null. Makes the column nullable.
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    /// A serialized JSON object or array.
    Json(String),
}

/// A field (column) of an entity.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    /// Identifier of the field within its entity.
    pub reference: String,
    /// Physical column name.
    pub column_name: String,
    pub field_type: FieldType,
    pub type_params: TypeParams,
    pub tags: BTreeSet<FieldTag>,
    pub default_value: Option<DefaultValue>,
}

impl Field {
    /// Create a field from a display name.
    ///
    /// The reference is the camelCase form of the name and the column is the
    /// snake_case form, so `"Created At"` becomes `createdAt` / `created_at`.
    pub fn new(name: &str, field_type: FieldType) -> Self {
        Self::with_column(camel_case(name), snake_case(name), field_type)
    }

    /// Create a field with an explicit reference and column name.
    pub fn with_column(
        reference: impl Into<String>,
        column_name: impl Into<String>,
        field_type: FieldType,
    ) -> Self {
        Self {
            reference: reference.into(),
            column_name: column_name.into(),
            field_type,
            type_params: TypeParams::default(),
            tags: BTreeSet::new(),
            default_value: None,
        }
    }

    pub fn tag(mut self, tag: FieldTag) -> Self {
        self.tags.insert(tag);
        self
    }

    pub fn params(mut self, params: TypeParams) -> Self {
        self.type_params = params;
        self
    }

    pub fn default_value(mut self, value: DefaultValue) -> Self {
        self.default_value = Some(value);
        self
    }

    pub fn has_tag(&self, tag: FieldTag) -> bool {
        self.tags.contains(&tag)
    }

    pub fn is_primary(&self) -> bool {
        self.has_tag(FieldTag::Primary)
    }

    /// A column is nullable when tagged so, or when its default is an explicit null.
    pub fn is_nullable(&self) -> bool {
        self.has_tag(FieldTag::Nullable) || self.default_value == Some(DefaultValue::Null)
    }

    /// Primary UUID and INTEGER fields are generated by the database and never written.
    pub fn is_auto_generated(&self) -> bool {
        self.is_primary() && matches!(self.field_type, FieldType::Uuid | FieldType::Integer)
    }

    pub fn is_indexed(&self) -> bool {
        self.has_tag(FieldTag::Primary)
            || self.has_tag(FieldTag::Index)
            || self.has_tag(FieldTag::Unique)
    }

    /// Fields maintained by the runtime rather than by callers.
    pub fn is_managed(&self) -> bool {
        self.has_tag(FieldTag::Created)
            || self.has_tag(FieldTag::Updated)
            || self.has_tag(FieldTag::Version)
            || self.has_tag(FieldTag::Deleted)
    }

    pub fn is_capability(&self) -> bool {
        self.is_managed() || self.has_tag(FieldTag::Tags)
    }

    pub fn has_default(&self) -> bool {
        self.default_value.is_some()
    }

    pub fn is_integer(&self) -> bool {
        matches!(
            self.field_type,
            FieldType::BigInt
                | FieldType::Integer
                | FieldType::MediumInt
                | FieldType::SmallInt
                | FieldType::TinyInt
        )
    }

    pub fn is_number(&self) -> bool {
        self.is_integer()
            || matches!(
                self.field_type,
                FieldType::Decimal | FieldType::Float | FieldType::Real | FieldType::Double
            )
    }

    pub fn is_text(&self) -> bool {
        matches!(self.field_type, FieldType::Text | FieldType::Blob)
    }

    pub fn is_json(&self) -> bool {
        matches!(
            self.field_type,
            FieldType::Json | FieldType::Jsonb | FieldType::Hstore
        )
    }

    pub fn is_date(&self) -> bool {
        matches!(self.field_type, FieldType::DateOnly | FieldType::DateTime)
    }
}

/// Kind of a relation between two entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationKind {
    /// The owner holds a foreign key to the target.
    BelongsToOne,
    /// Many-to-many through a join entity.
    BelongsToMany,
    /// The target holds a foreign key to the owner, at most one row.
    HasOne,
    /// The target holds a foreign key to the owner.
    HasMany,
}

/// A relation from one entity to another.
///
/// ```text
/// Product belongsToOne Category: local Product.categoryId, remote Category.id
/// User hasOne Avatar:            local User.id,            remote Avatar.userId
/// Customer hasMany Order:        local Customer.id,        remote Order.customerId
/// Product belongsToMany Order through OrderEntry
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Relation {
    pub name: String,
    pub kind: RelationKind,
    /// Field reference on the owning entity.
    pub local_field: String,
    /// Field reference on the target entity. `None` means the target's primary key.
    pub remote_field: Option<String>,
    /// Reference of the target entity.
    pub target: String,
    /// Join entity reference, only meaningful for [`RelationKind::BelongsToMany`].
    pub through: Option<String>,
}

impl Relation {
    pub fn belongs_to_one(
        name: impl Into<String>,
        local_field: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            kind: RelationKind::BelongsToOne,
            local_field: local_field.into(),
            remote_field: None,
            target: target.into(),
            through: None,
        }
    }

    pub fn has_one(
        name: impl Into<String>,
        local_field: impl Into<String>,
        target: impl Into<String>,
        remote_field: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            kind: RelationKind::HasOne,
            local_field: local_field.into(),
            remote_field: Some(remote_field.into()),
            target: target.into(),
            through: None,
        }
    }

    pub fn has_many(
        name: impl Into<String>,
        local_field: impl Into<String>,
        target: impl Into<String>,
        remote_field: impl Into<String>,
    ) -> Self {
        Self {
            kind: RelationKind::HasMany,
            ..Self::has_one(name, local_field, target, remote_field)
        }
    }

    pub fn belongs_to_many(
        name: impl Into<String>,
        local_field: impl Into<String>,
        target: impl Into<String>,
        through: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            kind: RelationKind::BelongsToMany,
            local_field: local_field.into(),
            remote_field: None,
            target: target.into(),
            through: Some(through.into()),
        }
    }

    /// Point the relation at a specific field of the target.
    pub fn remote(mut self, remote_field: impl Into<String>) -> Self {
        self.remote_field = Some(remote_field.into());
        self
    }
}

/// A named composite unique constraint over field references.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Unique {
    pub name: String,
    pub fields: Vec<String>,
}

impl Unique {
    pub fn new<I, S>(name: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }
}

/// Identity of an entity: the database it lives in and its reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityKey {
    pub database: String,
    pub reference: String,
}

impl EntityKey {
    pub fn new(database: impl Into<String>, reference: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            reference: reference.into(),
        }
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.database, self.reference)
    }
}

/// Logical definition of one database table.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    /// Name of the database (connection) the entity belongs to.
    pub database: String,
    /// Unique identifier within the database.
    pub reference: String,
    pub table_name: String,
    pub fields: Vec<Field>,
    pub relations: Vec<Relation>,
    pub uniques: Vec<Unique>,
    pub tags: BTreeSet<String>,
}

impl Entity {
    pub fn new(
        database: impl Into<String>,
        reference: impl Into<String>,
        table_name: impl Into<String>,
    ) -> Self {
        Self {
            database: database.into(),
            reference: reference.into(),
            table_name: table_name.into(),
            fields: Vec::new(),
            relations: Vec::new(),
            uniques: Vec::new(),
            tags: BTreeSet::new(),
        }
    }

    pub fn field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    pub fn relation(mut self, relation: Relation) -> Self {
        self.relations.push(relation);
        self
    }

    pub fn unique(mut self, unique: Unique) -> Self {
        self.uniques.push(unique);
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn key(&self) -> EntityKey {
        EntityKey::new(&self.database, &self.reference)
    }

    /// Look up a field by reference.
    pub fn get_field(&self, reference: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.reference == reference)
    }

    /// Look up a field by physical column name.
    pub fn field_by_column(&self, column: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.column_name == column)
    }

    pub fn primary_fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter().filter(|f| f.is_primary())
    }

    /// Fields a caller may write; auto-generated primary keys are excluded.
    pub fn writable_fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter().filter(|f| !f.is_auto_generated())
    }

    pub fn is_readonly(&self) -> bool {
        self.tags.contains(READONLY_TAG)
    }

    /// Entities this one holds a foreign key to.
    pub fn belongs_to_targets(&self) -> impl Iterator<Item = &str> {
        self.relations
            .iter()
            .filter(|r| r.kind == RelationKind::BelongsToOne)
            .map(|r| r.target.as_str())
    }

    /// Names that a new field or relation may not reuse.
    ///
    /// Column names and local fields are locked in the table, references and
    /// relation names are locked in the serialized record.
    pub fn taken_names(&self) -> BTreeSet<&str> {
        let mut names = BTreeSet::new();
        names.extend(self.fields.iter().map(|f| f.column_name.as_str()));
        names.extend(self.fields.iter().map(|f| f.reference.as_str()));
        names.extend(self.relations.iter().map(|r| r.local_field.as_str()));
        names.extend(self.relations.iter().map(|r| r.name.as_str()));
        names
    }
}

/// Split a name into lowercase words.
///
/// Words are separated by any non-alphanumeric character and by case
/// boundaries (`createdAt`, `HTTPServer`).
fn words(input: &str) -> Vec<String> {
    let chars: Vec<char> = input.chars().collect();
    let mut words = Vec::new();
    let mut current = String::new();

    for (i, &c) in chars.iter().enumerate() {
        if !c.is_alphanumeric() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            continue;
        }

        if c.is_uppercase() && !current.is_empty() {
            let prev = chars[i - 1];
            let next_is_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            if prev.is_lowercase() || prev.is_ascii_digit() || (prev.is_uppercase() && next_is_lower)
            {
                words.push(std::mem::take(&mut current));
            }
        }

        current.extend(c.to_lowercase());
    }

    if !current.is_empty() {
        words.push(current);
    }

    words
}

/// `"Created At"` → `"created_at"`.
pub fn snake_case(input: &str) -> String {
    words(input).join("_")
}

/// `"created at"` → `"createdAt"`.
pub fn camel_case(input: &str) -> String {
    let mut out = String::new();
    for (i, word) in words(input).iter().enumerate() {
        if i == 0 {
            out.push_str(word);
            continue;
        }
        let mut chars = word.chars();
        if let Some(first) = chars.next() {
            out.extend(first.to_uppercase());
            out.push_str(chars.as_str());
        }
    }
    out
}
