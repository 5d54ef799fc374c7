use std::path::Path;
use std::str::FromStr;

use log::{debug, error, info};
use serde_json::{Number, Value};
use sqlx::{
    query::Query,
    sqlite::{SqliteArguments, SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Pool, Row as _, Sqlite, TypeInfo, ValueRef,
};

use crate::backend::{check_name, Column, Result, Row, StoreError};

pub struct Backend(pub Pool<Sqlite>);

impl Backend {
    pub async fn new(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;

        let db_path = data_dir.join("mpds.sqlite");
        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .connect_with(options)
            .await
            .map_err(|e| {
                error!("couldn't open {}: {e:?}", db_path.display());
                e
            })?;

        info!("Using sqlite://{}", db_path.display());
        Ok(Self(pool))
    }

    /// A private database that lives as long as the pool.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        Ok(Self(pool))
    }
}

fn bind<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    value: Value,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(b) => query.bind(b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => query.bind(i),
            None => query.bind(n.as_f64()),
        },
        Value::String(s) => query.bind(s),
        nested => query.bind(nested.to_string()),
    }
}

fn decode(row: &SqliteRow, table: &str) -> Result<Row> {
    let mut out = Row::new();

    for (i, column) in row.columns().iter().enumerate() {
        use sqlx::Column as _;

        let raw = row.try_get_raw(i)?;
        let value = if raw.is_null() {
            Value::Null
        } else {
            match raw.type_info().name() {
                "INTEGER" => Value::from(row.try_get::<i64, _>(i)?),
                "REAL" => Number::from_f64(row.try_get::<f64, _>(i)?)
                    .map(Value::Number)
                    .unwrap_or(Value::Null),
                "TEXT" => Value::from(row.try_get::<String, _>(i)?),
                other => {
                    error!("{table}.{}: unsupported storage class {other}", column.name());
                    return Err(StoreError::Corrupt {
                        table: table.into(),
                        reason: format!("unsupported storage class {other}"),
                    });
                }
            }
        };

        out.insert(column.name().to_string(), value);
    }

    Ok(out)
}

impl Backend {
    pub async fn exists(&self, table: &str) -> Result<bool> {
        check_name(table)?;

        let found = sqlx::query("SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?")
            .bind(table)
            .fetch_optional(&self.0)
            .await?;

        Ok(found.is_some())
    }

    pub async fn create(&self, table: &str, columns: &[Column]) -> Result<()> {
        check_name(table)?;

        let defs = columns
            .iter()
            .map(|col| {
                check_name(col.name)?;
                let primary = if col.primary { " PRIMARY KEY" } else { "" };
                Ok(format!("{} {}{}", col.name, col.r#type.as_str(), primary))
            })
            .collect::<Result<Vec<_>>>()?;

        let sql = format!("CREATE TABLE {table} ({})", defs.join(", "));
        debug!("{sql}");

        sqlx::query(&sql).execute(&self.0).await?;
        Ok(())
    }

    pub async fn all_entries(&self, table: &str) -> Result<Vec<Row>> {
        check_name(table)?;

        let sql = format!("SELECT * FROM {table} ORDER BY rowid");
        let rows = sqlx::query(&sql).fetch_all(&self.0).await.map_err(|e| {
            error!("couldn't read {table}: {e:?}");
            no_such_table(e, table)
        })?;

        rows.iter().map(|row| decode(row, table)).collect()
    }

    pub async fn add(&self, table: &str, row: Row) -> Result<()> {
        check_name(table)?;

        let mut columns = Vec::with_capacity(row.len());
        let mut values = Vec::with_capacity(row.len());
        for (name, value) in row {
            check_name(&name)?;
            columns.push(name);
            values.push(value);
        }

        let placeholders = vec!["?"; columns.len()].join(", ");
        let sql = format!(
            "INSERT INTO {table} ({}) VALUES ({placeholders})",
            columns.join(", ")
        );

        let mut query = sqlx::query(&sql);
        for value in values {
            query = bind(query, value);
        }

        query.execute(&self.0).await.map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e {
                if db_err.message().starts_with("UNIQUE constraint failed") {
                    return StoreError::Duplicate {
                        table: table.into(),
                        column: columns.join(", "),
                    };
                }
            }
            error!("couldn't insert into {table}: {e:?}");
            no_such_table(e, table)
        })?;

        Ok(())
    }

    /// Deletes every row whose `column` equals `value`, returning how many went.
    pub async fn delete(&self, table: &str, column: &str, value: &Value) -> Result<u64> {
        check_name(table)?;
        check_name(column)?;

        let sql = format!("DELETE FROM {table} WHERE {column} = ?");
        let done = bind(sqlx::query(&sql), value.clone())
            .execute(&self.0)
            .await
            .map_err(|e| {
                error!("couldn't delete from {table}: {e:?}");
                no_such_table(e, table)
            })?;

        Ok(done.rows_affected())
    }
}

fn no_such_table(e: sqlx::Error, table: &str) -> StoreError {
    match e {
        sqlx::Error::Database(ref db_err) if db_err.message().starts_with("no such table") => {
            StoreError::NoSuchTable(table.into())
        }
        e => e.into(),
    }
}

#[cfg(test)]
pub mod test {
    use serde_json::json;

    use super::*;

    pub async fn create_db() -> Backend {
        Backend::in_memory().await.unwrap()
    }

    /// Leaves `table` unreadable.
    pub async fn corrupt_table(db: &Backend, table: &str) {
        sqlx::query(&format!("DROP TABLE {table}"))
            .execute(&db.0)
            .await
            .unwrap();
    }

    fn row(value: Value) -> Row {
        match value {
            Value::Object(row) => row,
            _ => panic!("not an object"),
        }
    }

    const SERVERS: &[Column] = &[
        Column::text("id").primary(),
        Column::text("name"),
        Column::integer("port"),
    ];

    #[tokio::test]
    async fn table_lifecycle() {
        let db = create_db().await;

        assert!(!db.exists("servers").await.unwrap());
        db.create("servers", SERVERS).await.unwrap();
        assert!(db.exists("servers").await.unwrap());

        db.add("servers", row(json!({ "id": "b", "name": "Beta", "port": 2 })))
            .await
            .unwrap();
        db.add("servers", row(json!({ "id": "a", "name": "Alpha" })))
            .await
            .unwrap();

        // insertion order, not key order
        let rows = db.all_entries("servers").await.unwrap();
        assert_eq!(
            rows,
            vec![
                row(json!({ "id": "b", "name": "Beta", "port": 2 })),
                row(json!({ "id": "a", "name": "Alpha", "port": null })),
            ]
        );

        assert_eq!(db.delete("servers", "id", &json!("b")).await.unwrap(), 1);
        assert_eq!(db.all_entries("servers").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn primary_keys_are_unique() {
        let db = create_db().await;
        db.create("servers", SERVERS).await.unwrap();

        db.add("servers", row(json!({ "id": "a" }))).await.unwrap();
        let err = db.add("servers", row(json!({ "id": "a" }))).await.unwrap_err();

        assert!(matches!(err, StoreError::Duplicate { .. }));
    }

    #[tokio::test]
    async fn missing_table() {
        let db = create_db().await;

        assert!(matches!(
            db.all_entries("servers").await,
            Err(StoreError::NoSuchTable(_))
        ));
    }
}
