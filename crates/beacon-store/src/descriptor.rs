//! Record descriptors
//!
//! A [`RecordDescriptor`] is the column layout of a storage type. It is built
//! fresh by [`Record::descriptor`] on every call and carries no identity of
//! its own. Column order only decides the order of columns in the generated
//! DDL; values are always bound and decoded by column name.

use crate::error::{StoreError, StoreResult};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Default identity column name
pub const DEFAULT_IDENTITY: &str = "id";

/// Default `VARCHAR` length for string columns without an explicit length
pub const DEFAULT_STRING_LENGTH: u32 = 255;

/// A type that can be stored in a table.
///
/// The serde representation of the type must be a flat map whose keys match
/// the descriptor's column names. The identity field is part of that map but
/// is assigned by the store on insert.
///
/// ```rust,ignore
/// #[derive(Serialize, Deserialize)]
/// struct Reading { id: i64, mac: String, count: i32 }
///
/// impl Record for Reading {
///     fn descriptor() -> RecordDescriptor {
///         RecordDescriptor::new()
///             .column(Column::string("mac").length(17).unique())
///             .column(Column::integer("count").default_value(ColumnDefault::Integer(0)))
///     }
///     fn id(&self) -> i64 { self.id }
///     fn set_id(&mut self, id: i64) { self.id = id }
/// }
/// ```
pub trait Record: Serialize + DeserializeOwned + Send {
    /// Column layout for this type, excluding the identity column
    fn descriptor() -> RecordDescriptor;

    /// Store-assigned identity, zero before the first insert
    fn id(&self) -> i64;

    fn set_id(&mut self, id: i64);
}

/// Storage kind of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    /// 32-bit integer
    Integer,
    /// 64-bit integer
    Long,
    /// Floating point; NaN is stored as NULL
    Double,
    /// Bounded text
    String,
    /// Bounded text that permits NULL
    NullableString,
    /// Calendar date stored as `YYYY-MM-DD` text
    Date,
    /// Date and time stored as ISO-8601 text
    DateTime,
}

impl ColumnKind {
    /// SQL type name used in `CREATE TABLE`
    pub fn sql_type(&self, length: Option<u32>) -> String {
        match self {
            ColumnKind::Integer => "INTEGER".to_string(),
            ColumnKind::Long => "BIGINT".to_string(),
            ColumnKind::Double => "DOUBLE".to_string(),
            ColumnKind::String | ColumnKind::NullableString => {
                format!("VARCHAR({})", length.unwrap_or(DEFAULT_STRING_LENGTH))
            }
            ColumnKind::Date => "DATE".to_string(),
            ColumnKind::DateTime => "DATETIME".to_string(),
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, ColumnKind::Integer | ColumnKind::Long | ColumnKind::Double)
    }
}

/// Column default, rendered as a quoted SQL literal
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnDefault {
    Integer(i64),
    Double(f64),
    Text(String),
    /// `CURRENT_DATE` / `CURRENT_TIMESTAMP` depending on the column kind
    Now,
}

/// One column of a record descriptor
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub kind: ColumnKind,
    pub nullable: bool,
    pub length: Option<u32>,
    pub default: Option<ColumnDefault>,
    pub comment: Option<String>,
    pub unique: bool,
}

impl Column {
    pub fn new(name: impl Into<String>, kind: ColumnKind) -> Self {
        Self {
            name: name.into(),
            kind,
            nullable: kind == ColumnKind::NullableString,
            length: None,
            default: None,
            comment: None,
            unique: false,
        }
    }

    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, ColumnKind::Integer)
    }

    pub fn long(name: impl Into<String>) -> Self {
        Self::new(name, ColumnKind::Long)
    }

    /// Doubles are nullable so that NaN can be stored
    pub fn double(name: impl Into<String>) -> Self {
        Self::new(name, ColumnKind::Double).nullable()
    }

    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, ColumnKind::String)
    }

    pub fn nullable_string(name: impl Into<String>) -> Self {
        Self::new(name, ColumnKind::NullableString)
    }

    pub fn date(name: impl Into<String>) -> Self {
        Self::new(name, ColumnKind::Date)
    }

    pub fn datetime(name: impl Into<String>) -> Self {
        Self::new(name, ColumnKind::DateTime)
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn length(mut self, length: u32) -> Self {
        self.length = Some(length);
        self
    }

    pub fn default_value(mut self, default: ColumnDefault) -> Self {
        self.default = Some(default);
        self
    }

    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Include this column in the table's composite uniqueness constraint
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }
}

/// Column layout of a storage type
#[derive(Debug, Clone, PartialEq)]
pub struct RecordDescriptor {
    identity: String,
    columns: Vec<Column>,
}

impl RecordDescriptor {
    pub fn new() -> Self {
        Self {
            identity: DEFAULT_IDENTITY.to_string(),
            columns: Vec::new(),
        }
    }

    /// Use a different identity column than `id`
    pub fn identity(mut self, name: impl Into<String>) -> Self {
        self.identity = name.into();
        self
    }

    pub fn column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    pub fn identity_name(&self) -> &str {
        &self.identity
    }

    /// Non-identity columns in declared order
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn get(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn unique_columns(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter().filter(|c| c.unique)
    }

    /// Check every name is a plain identifier and no column is declared twice
    pub fn validate(&self) -> StoreResult<()> {
        validate_identifier(&self.identity)?;
        let mut seen = std::collections::HashSet::new();
        seen.insert(self.identity.as_str());
        for column in &self.columns {
            validate_identifier(&column.name)?;
            if !seen.insert(column.name.as_str()) {
                return Err(StoreError::Schema(format!(
                    "column {:?} declared more than once",
                    column.name
                )));
            }
        }
        Ok(())
    }
}

impl Default for RecordDescriptor {
    fn default() -> Self {
        Self::new()
    }
}

/// Accept `[A-Za-z_][A-Za-z0-9_]*` only
pub fn validate_identifier(name: &str) -> StoreResult<()> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidIdentifier(name.to_string()))
    }
}

/// Validate and double-quote an identifier
pub fn quote_identifier(name: &str) -> StoreResult<String> {
    validate_identifier(name)?;
    Ok(format!("\"{}\"", name))
}
