use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::path::{Path, PathBuf};

use log::{debug, error, info};
use serde_json::Value;
use tokio::sync::Mutex;

use crate::backend::{check_name, Column, ColumnType, Result, Row, StoreError};

mod kv;

pub struct Backend {
    root: PathBuf,
    // rows.jsonl is rewritten on delete, so all writers take this
    writes: Mutex<()>,
}

macro_rules! path {
    ($root: expr, $($components: expr),*) => {
        {
            let mut p = $root.clone();
            path!(@internal, p, $($components),*);
            p
        }
    };
    (@internal, $p:expr, $next:expr, $($rest: expr),*) => {
        $p.push($next);
        path!(@internal, $p, $($rest),*);
    };
    (@internal, $p:expr, $next:expr) => {
        $p.push($next);
    };
}

impl Backend {
    pub async fn new(data_dir: &Path) -> Result<Self> {
        let root = data_dir.join("tables");
        fs::create_dir_all(&root).map_err(|e| {
            error!("couldn't create {root:?}: {e:?}");
            e
        })?;
        info!("Using {}", root.display());

        Ok(Self {
            root,
            writes: Mutex::new(()),
        })
    }
}

impl Backend {
    fn schema_path(&self, table: &str) -> Result<PathBuf> {
        check_name(table)?;
        Ok(path!(self.root, table, "schema.txt"))
    }

    fn rows_path(&self, table: &str) -> Result<PathBuf> {
        check_name(table)?;
        Ok(path!(self.root, table, "rows.jsonl"))
    }

    fn schema(&self, table: &str) -> Result<Vec<(String, ColumnType, bool)>> {
        let path = self.schema_path(table)?;
        let file = File::open(&path).map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                return StoreError::NoSuchTable(table.into());
            }
            error!("open \"{path:?}\": {e:?}");
            e.into()
        })?;

        kv::read(file, table)?
            .into_iter()
            .map(|(name, decl)| {
                let (type_, primary) = match decl.split_once(' ') {
                    Some((type_, "primary")) => (type_, true),
                    Some(_) => (decl.as_str(), false),
                    None => (decl.as_str(), false),
                };

                let type_ = ColumnType::try_from(type_).map_err(|()| StoreError::Corrupt {
                    table: table.into(),
                    reason: format!("unknown column type \"{decl}\""),
                })?;

                Ok((name, type_, primary))
            })
            .collect()
    }

    fn read_rows(&self, table: &str) -> Result<Vec<Row>> {
        let path = self.rows_path(table)?;
        let file = match File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => {
                error!("open \"{path:?}\": {e:?}");
                return Err(e.into());
            }
        };

        let mut rows = vec![];

        for line in BufReader::new(file).lines() {
            let line = line?;
            if line.is_empty() {
                continue;
            }

            match serde_json::from_str(&line)? {
                Value::Object(row) => rows.push(row),
                _ => {
                    error!("non-object row in {table}");
                    return Err(StoreError::Corrupt {
                        table: table.into(),
                        reason: "non-object row".into(),
                    });
                }
            }
        }

        Ok(rows)
    }

    fn write_rows(&self, table: &str, rows: &[Row]) -> Result<()> {
        let path = self.rows_path(table)?;
        let tmp = path.with_extension("jsonl.tmp");

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp)?;

        for row in rows {
            let json = serde_json::to_string(row)?;
            writeln!(file, "{}", json)?;
        }
        file.sync_all()?;
        drop(file);

        fs::rename(&tmp, &path)?;
        Ok(())
    }
}

impl Backend {
    pub async fn exists(&self, table: &str) -> Result<bool> {
        Ok(self.schema_path(table)?.is_file())
    }

    pub async fn create(&self, table: &str, columns: &[Column]) -> Result<()> {
        let schema_path = self.schema_path(table)?;
        let schema = columns
            .iter()
            .map(|col| {
                check_name(col.name)?;
                let decl = if col.primary {
                    format!("{} primary", col.r#type.as_str())
                } else {
                    col.r#type.as_str().to_string()
                };
                Ok((col.name.to_string(), decl))
            })
            .collect::<Result<Vec<_>>>()?;

        let _guard = self.writes.lock().await;

        fs::create_dir_all(path!(self.root, table))?;
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&schema_path)?;
        kv::write(file, &schema)?;

        debug!("created {table} with {} columns", columns.len());
        Ok(())
    }

    pub async fn all_entries(&self, table: &str) -> Result<Vec<Row>> {
        self.schema(table)?;
        self.read_rows(table)
    }

    pub async fn add(&self, table: &str, mut row: Row) -> Result<()> {
        let schema = self.schema(table)?;

        if let Some(unknown) = row
            .keys()
            .find(|key| !schema.iter().any(|(name, _, _)| name == *key))
        {
            return Err(StoreError::InvalidName(unknown.clone()));
        }

        for (name, _, _) in &schema {
            row.entry(name.clone()).or_insert(Value::Null);
        }

        let _guard = self.writes.lock().await;

        let existing = self.read_rows(table)?;
        for (name, _, primary) in &schema {
            if !primary {
                continue;
            }
            let clash = existing.iter().any(|r| r.get(name) == row.get(name));
            if clash {
                return Err(StoreError::Duplicate {
                    table: table.into(),
                    column: name.clone(),
                });
            }
        }

        let path = self.rows_path(table)?;
        let mut file = OpenOptions::new().append(true).create(true).open(path)?;
        writeln!(file, "{}", serde_json::to_string(&row)?)?;

        Ok(())
    }

    /// Deletes every row whose `column` equals `value`, returning how many went.
    pub async fn delete(&self, table: &str, column: &str, value: &Value) -> Result<u64> {
        let schema = self.schema(table)?;
        if !schema.iter().any(|(name, _, _)| name == column) {
            return Err(StoreError::InvalidName(column.into()));
        }

        let _guard = self.writes.lock().await;

        let rows = self.read_rows(table)?;
        let before = rows.len();
        let kept: Vec<Row> = rows
            .into_iter()
            .filter(|row| row.get(column) != Some(value))
            .collect();
        let deleted = (before - kept.len()) as u64;

        if deleted > 0 {
            self.write_rows(table, &kept)?;
        }

        Ok(deleted)
    }
}
