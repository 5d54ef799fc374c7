use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};

/// One table row, keyed by column name.
pub type Row = Map<String, Value>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("table \"{0}\" does not exist")]
    NoSuchTable(String),

    #[error("invalid identifier \"{0}\"")]
    InvalidName(String),

    #[error("duplicate value for primary key \"{column}\" in \"{table}\"")]
    Duplicate { table: String, column: String },

    #[error("corrupt table \"{table}\": {reason}")]
    Corrupt { table: String, reason: String },

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[cfg(feature = "backend-sql")]
    #[error("sql: {0}")]
    Sql(#[from] sqlx::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Text,
    Integer,
    Real,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub r#type: ColumnType,
    pub primary: bool,
}

impl ColumnType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "TEXT",
            Self::Integer => "INTEGER",
            Self::Real => "REAL",
        }
    }
}

impl TryFrom<&'_ str> for ColumnType {
    type Error = ();

    fn try_from(s: &str) -> std::result::Result<Self, Self::Error> {
        match s {
            "TEXT" => Ok(Self::Text),
            "INTEGER" => Ok(Self::Integer),
            "REAL" => Ok(Self::Real),
            _ => Err(()),
        }
    }
}

impl Column {
    pub const fn text(name: &'static str) -> Self {
        Self {
            name,
            r#type: ColumnType::Text,
            primary: false,
        }
    }

    pub const fn integer(name: &'static str) -> Self {
        Self {
            name,
            r#type: ColumnType::Integer,
            primary: false,
        }
    }

    pub const fn primary(self) -> Self {
        Self {
            primary: true,
            ..self
        }
    }
}

/// Table and column names end up in paths and SQL, so only `[A-Za-z0-9_]` is allowed.
pub fn check_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');

    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidName(name.into()))
    }
}

pub fn into_row<T: Serialize>(value: &T) -> Result<Row> {
    match serde_json::to_value(value)? {
        Value::Object(row) => Ok(row),
        other => Err(StoreError::Corrupt {
            table: "<row>".into(),
            reason: format!("expected an object, got {other}"),
        }),
    }
}

pub fn from_rows<T: DeserializeOwned>(rows: Vec<Row>) -> Result<Vec<T>> {
    rows.into_iter()
        .map(|row| serde_json::from_value(Value::Object(row)).map_err(StoreError::from))
        .collect()
}

#[cfg(feature = "backend-sql")]
mod backend_sql;
#[cfg(feature = "backend-sql")]
pub use backend_sql::*;

#[cfg(not(feature = "backend-sql"))]
mod backend_file;
#[cfg(not(feature = "backend-sql"))]
pub use backend_file::*;
