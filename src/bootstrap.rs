//! Startup reconciliation: make sure every table exists, check the stored
//! schema version and insert the rows a fresh install needs.

use futures_util::future::try_join_all;
use log::{info, warn};
use serde_json::Value;

use crate::auth::{Account, DEFAULT_ADMIN, DEFAULT_ADMIN_HASH};
use crate::backend::{self, Backend, Row, StoreError};
use crate::modpack::ModpackMeta;
use crate::schema::{Table, ACCOUNTS, METADATA, MODPACK};

const VERSION_KEY: &str = "db_version";

#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error("couldn't load or create table \"{table}\": {source}")]
    Table {
        table: &'static str,
        #[source]
        source: StoreError,
    },

    #[error("database version mismatch: expected \"{expected}\", found \"{found}\"")]
    VersionMismatch { expected: String, found: String },

    #[error("couldn't insert preload into \"{table}\": {source}")]
    Preload {
        table: &'static str,
        #[source]
        source: StoreError,
    },

    #[error("metadata: {0}")]
    Store(#[from] StoreError),
}

/// What a run changed.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Report {
    pub tables_created: Vec<&'static str>,
    pub version_written: bool,
    pub preloads_inserted: Vec<&'static str>,
}

pub struct Preload {
    pub table: &'static str,
    pub entry: Row,
    /// Insert while the table has fewer rows than this.
    pub min_size: usize,
}

pub fn preloads() -> Result<Vec<Preload>, StoreError> {
    Ok(vec![
        Preload {
            table: ACCOUNTS,
            entry: backend::into_row(&Account {
                username: DEFAULT_ADMIN.into(),
                password_hash: DEFAULT_ADMIN_HASH.into(),
            })?,
            min_size: 1,
        },
        Preload {
            table: MODPACK,
            entry: backend::into_row(&ModpackMeta::placeholder())?,
            min_size: 1,
        },
    ])
}

async fn ensure_table(backend: &Backend, table: &Table) -> Result<bool, BootstrapError> {
    let wrap = |source| BootstrapError::Table {
        table: table.name,
        source,
    };

    if backend.exists(table.name).await.map_err(wrap)? {
        info!("Loaded '{}' table.", table.name);
        return Ok(false);
    }

    info!("Creating '{}' table...", table.name);
    backend
        .create(table.name, table.columns)
        .await
        .map_err(wrap)?;
    info!("Created '{}' table.", table.name);

    Ok(true)
}

async fn insert_preload(backend: &Backend, preload: Preload) -> Result<bool, BootstrapError> {
    let wrap = |source| BootstrapError::Preload {
        table: preload.table,
        source,
    };

    let entries = backend.all_entries(preload.table).await.map_err(wrap)?;

    if entries.len() >= preload.min_size {
        info!("{} preload not needed.", preload.table);
        return Ok(false);
    }

    backend
        .add(preload.table, preload.entry)
        .await
        .map_err(wrap)?;
    info!("{} preload inserted.", preload.table);

    Ok(true)
}

pub async fn run(
    backend: &Backend,
    tables: &[Table],
    version: &str,
) -> Result<Report, BootstrapError> {
    info!("Loading database...");

    let created = try_join_all(tables.iter().map(|table| ensure_table(backend, table))).await?;

    let mut report = Report {
        tables_created: tables
            .iter()
            .zip(created)
            .filter(|(_, created)| *created)
            .map(|(table, _)| table.name)
            .collect(),
        ..Default::default()
    };

    let metadata = backend.all_entries(METADATA).await?;
    let stored = metadata
        .iter()
        .find(|row| row.get("key").and_then(Value::as_str) == Some(VERSION_KEY));

    if let Some(row) = stored {
        let found = match row.get("value") {
            Some(Value::String(s)) => s.clone(),
            other => format!("{other:?}"),
        };

        if found != version {
            return Err(BootstrapError::VersionMismatch {
                expected: version.into(),
                found,
            });
        }

        info!("Database at version {version}.");
    }

    // checked on every start, so a seed that failed once is retried
    for preload in preloads()? {
        if !tables.iter().any(|t| t.name == preload.table) {
            continue;
        }

        let table = preload.table;
        if insert_preload(backend, preload).await? {
            report.preloads_inserted.push(table);
        }
    }

    if report.preloads_inserted.contains(&ACCOUNTS) {
        warn!("Seeded account \"{DEFAULT_ADMIN}\" with the default password; change it.");
    }

    if stored.is_none() {
        let mut marker = Row::new();
        marker.insert("key".into(), VERSION_KEY.into());
        marker.insert("value".into(), version.into());
        backend.add(METADATA, marker).await?;
        report.version_written = true;
        info!("Database initialised at version {version}.");
    }

    Ok(report)
}
