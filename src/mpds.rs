use std::collections::HashMap;
use std::path::PathBuf;
use std::{result, sync::Arc};

use log::{debug, error, info, trace, warn};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use uuid::Uuid;
use warp::http;

use crate::auth::{self, Account, LoginForm, Scan, Session, SessionLookup};
use crate::backend::{self, Backend};
use crate::form::{self, Field, FieldKind, FormError};
use crate::modpack::{
    Item, ItemChanges, ItemList, ItemRow, ModpackMeta, ModpackServer, PlanError, Version,
};
use crate::schema::{ACCOUNTS, MODPACK, SERVERS, SESSIONS};
use crate::time::Timestamp;

pub struct Mpds {
    backend: Backend,
    icons_dir: PathBuf,
    placeholder_icon: PathBuf,
}

/// Handle for a request that passed the authorization gate.
pub struct MpdsAuthed {
    mpds: Arc<Mpds>,
    session: Session,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Error {
    Internal,
    Forbidden,
    NotFound,
    BadRequest,
    /// Rejected user input; the text is shown back to the user.
    Invalid(&'static str),
}

pub type Result<T> = result::Result<T, Error>;

impl From<Error> for http::StatusCode {
    fn from(e: Error) -> Self {
        match e {
            Error::Internal => http::StatusCode::INTERNAL_SERVER_ERROR,
            Error::Forbidden => http::StatusCode::FORBIDDEN,
            Error::NotFound => http::StatusCode::NOT_FOUND,
            Error::BadRequest | Error::Invalid(_) => http::StatusCode::BAD_REQUEST,
        }
    }
}

impl From<FormError> for Error {
    fn from(e: FormError) -> Self {
        let FormError::Missing(field) = e;
        debug!("form field \"{field}\" missing");
        Error::Invalid(e.message())
    }
}

impl warp::reject::Reject for Error {}

pub struct ModpackUpdate {
    pub name: String,
    pub version: String,
    pub description: String,
}

impl ModpackUpdate {
    pub const FIELDS: &'static [Field] = &[
        Field {
            name: "name",
            kind: FieldKind::String,
        },
        Field {
            name: "version",
            kind: FieldKind::String,
        },
        Field {
            name: "description",
            kind: FieldKind::String,
        },
    ];

    pub fn parse(raw: &HashMap<String, String>) -> result::Result<Self, FormError> {
        let mut fields = form::parse(Self::FIELDS, raw)?;

        Ok(Self {
            name: fields.string("name")?,
            version: fields.string("version")?,
            description: fields.string("description")?,
        })
    }
}

impl ModpackServer {
    pub const FIELDS: &'static [Field] = &[
        Field {
            name: "id",
            kind: FieldKind::String,
        },
        Field {
            name: "name",
            kind: FieldKind::String,
        },
        Field {
            name: "url",
            kind: FieldKind::String,
        },
        Field {
            name: "versions",
            kind: FieldKind::String,
        },
    ];

    pub fn parse(raw: &HashMap<String, String>) -> result::Result<Self, FormError> {
        let mut fields = form::parse(Self::FIELDS, raw)?;

        Ok(Self {
            id: fields.string("id")?,
            name: fields.string("name")?,
            url: fields.string("url")?,
            versions: fields.string("versions")?,
        })
    }
}

pub fn now() -> Result<Timestamp> {
    Timestamp::now().map_err(|e| {
        error!("couldn't get time: {e:?}");
        Error::Internal
    })
}

fn valid_icon_name(id: &str) -> bool {
    !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

impl Mpds {
    pub fn new(backend: Backend, icons_dir: PathBuf, placeholder_icon: PathBuf) -> Self {
        Self {
            backend,
            icons_dir,
            placeholder_icon,
        }
    }

    #[cfg(test)]
    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    pub fn authed(self: &Arc<Self>, session: Session) -> MpdsAuthed {
        MpdsAuthed {
            mpds: Arc::clone(self),
            session,
        }
    }

    async fn table<T: DeserializeOwned>(&self, table: &str) -> Result<Vec<T>> {
        let rows = self.backend.all_entries(table).await.map_err(|e| {
            error!("couldn't read {table}: {e}");
            Error::Internal
        })?;

        backend::from_rows(rows).map_err(|e| {
            error!("couldn't decode {table}: {e}");
            Error::Internal
        })
    }

    async fn insert<T: Serialize>(&self, table: &str, value: &T) -> Result<()> {
        let row = backend::into_row(value).map_err(|e| {
            error!("couldn't encode row for {table}: {e}");
            Error::Internal
        })?;

        self.backend.add(table, row).await.map_err(|e| {
            error!("couldn't insert into {table}: {e}");
            Error::Internal
        })
    }

    async fn remove(&self, table: &str, column: &str, value: &str) -> Result<u64> {
        self.backend
            .delete(table, column, &Value::from(value))
            .await
            .map_err(|e| {
                error!("couldn't delete from {table}: {e}");
                Error::Internal
            })
    }

    /// Matches a presented token against the stored sessions, revoking it if it expired.
    pub async fn authenticate(&self, token: &str) -> Result<SessionLookup> {
        let sessions: Vec<Session> = self.table(SESSIONS).await?;
        let now = now()?;

        match auth::scan(&sessions, token, now) {
            Scan::Valid(session) => {
                trace!("{} authenticated by session", session.username);
                Ok(SessionLookup::Valid(session.clone()))
            }
            Scan::Expired(session) => {
                info!(
                    "{} session expired at {}, revoking",
                    session.username, session.expires
                );
                self.remove(SESSIONS, "token", &session.token).await?;
                Ok(SessionLookup::ExpiredRevoked)
            }
            Scan::NotFound => {
                debug!("no session for presented token");
                Ok(SessionLookup::NotFound)
            }
        }
    }

    /// `None` when the credentials don't match an account.
    pub async fn login(&self, form: &LoginForm) -> Result<Option<Session>> {
        let username = &form.username;
        let pwhash = form.calc_pwhash();

        let accounts: Vec<Account> = self.table(ACCOUNTS).await?;
        let found = accounts
            .iter()
            .any(|acc| acc.username == *username && acc.password_hash == pwhash);

        if !found {
            warn!("failed login attempt for {username}");
            return Ok(None);
        }

        let now = now()?;
        let session = Session::new(username, now, form.lifetime());
        self.insert(SESSIONS, &session).await?;

        info!("{username} login: new session, expires {}", session.expires);
        Ok(Some(session))
    }

    pub async fn modpack(&self) -> Result<ModpackMeta> {
        let mut metas: Vec<ModpackMeta> = self.table(MODPACK).await?;

        metas.pop().ok_or_else(|| {
            error!("no modpack metadata stored");
            Error::NotFound
        })
    }

    pub async fn items(&self, list: ItemList) -> Result<Vec<Item>> {
        let rows: Vec<ItemRow> = self.table(list.table()).await?;
        Ok(rows.into_iter().map(Item::from).collect())
    }

    pub async fn item_counts(&self) -> Result<Vec<(ItemList, usize)>> {
        let mut counts = Vec::with_capacity(ItemList::ALL.len());
        for list in ItemList::ALL {
            counts.push((list, self.items(list).await?.len()));
        }
        Ok(counts)
    }

    pub async fn servers(&self, versions: Option<&str>) -> Result<Vec<ModpackServer>> {
        let servers: Vec<ModpackServer> = self.table(SERVERS).await?;

        Ok(match versions {
            Some(versions) => servers
                .into_iter()
                .filter(|s| s.versions == versions)
                .collect(),
            None => servers,
        })
    }

    pub async fn server(&self, versions: &str, id: &str) -> Result<ModpackServer> {
        self.servers(Some(versions))
            .await?
            .into_iter()
            .find(|s| s.id == id)
            .ok_or(Error::NotFound)
    }

    pub async fn icon(&self, id: &str) -> Result<Vec<u8>> {
        let path = if id == "temp" {
            self.placeholder_icon.clone()
        } else if valid_icon_name(id) {
            self.icons_dir.join(format!("{id}.jpg"))
        } else {
            return Err(Error::NotFound);
        };

        tokio::fs::read(&path).await.map_err(|e| {
            debug!("icon {path:?}: {e}");
            Error::NotFound
        })
    }
}

impl MpdsAuthed {
    pub fn username(&self) -> &str {
        &self.session.username
    }

    pub async fn logout(&self) -> Result<()> {
        let username = self.username();

        let deleted = self
            .mpds
            .remove(SESSIONS, "token", &self.session.token)
            .await?;

        info!("{username} logout, {deleted} session(s) removed");
        Ok(())
    }

    pub async fn update_modpack(
        &self,
        update: ModpackUpdate,
        icon: Option<Vec<u8>>,
    ) -> Result<ModpackMeta> {
        let username = self.username();

        let version: Version = update
            .version
            .parse()
            .map_err(|()| Error::Invalid("Invalid version."))?;

        let current = self.mpds.modpack().await?;
        let current_version = current.version.parse::<Version>().map_err(|()| {
            error!("stored modpack version {:?} is invalid", current.version);
            Error::Internal
        })?;

        if version <= current_version {
            return Err(Error::Invalid(
                "Version must be greater than previous version.",
            ));
        }

        let icon = match icon {
            Some(data) if !data.is_empty() => {
                let name = Uuid::new_v4().simple().to_string();
                let path = self.mpds.icons_dir.join(format!("{name}.jpg"));

                tokio::fs::create_dir_all(&self.mpds.icons_dir)
                    .await
                    .map_err(|e| {
                        error!("couldn't create {:?}: {e}", self.mpds.icons_dir);
                        Error::Internal
                    })?;
                tokio::fs::write(&path, data).await.map_err(|e| {
                    error!("couldn't write icon {path:?}: {e}");
                    Error::Internal
                })?;

                debug!("{username} uploaded icon {name}");
                name
            }
            _ => current.icon,
        };

        let meta = ModpackMeta {
            name: update.name,
            version: version.to_string(),
            description: update.description,
            icon,
        };
        self.mpds.insert(MODPACK, &meta).await?;

        info!(
            "{username} updated modpack {} from {current_version} to {version}",
            meta.name
        );
        Ok(meta)
    }

    /// Makes `list` hold exactly `items`, touching only rows that differ.
    pub async fn update_items(&self, list: ItemList, items: Vec<Item>) -> Result<ItemChanges> {
        let username = self.username();
        let table = list.table();

        let existing = self.mpds.items(list).await?;
        let changes = ItemChanges::plan(&existing, items).map_err(|e| {
            warn!("{username} sent a bad {table} list: {e:?}");
            match e {
                PlanError::EmptyId => Error::Invalid("Every item needs a project id."),
                PlanError::DuplicateId(_) => Error::Invalid("Project ids must be unique."),
            }
        })?;

        if changes.is_empty() {
            debug!("{username}: {table} unchanged");
            return Ok(changes);
        }

        let stale = changes
            .remove
            .iter()
            .chain(changes.update.iter().map(|item| &item.project_id));
        for id in stale {
            self.mpds.remove(table, "project_id", id).await?;
        }

        for item in changes.update.iter().chain(&changes.add) {
            self.mpds.insert(table, &ItemRow::from(item.clone())).await?;
        }

        info!(
            "{username} updated {table}: {} added, {} removed, {} updated",
            changes.add.len(),
            changes.remove.len(),
            changes.update.len(),
        );
        Ok(changes)
    }

    pub async fn add_server(&self, server: ModpackServer) -> Result<Vec<ModpackServer>> {
        if server.id.trim().is_empty() {
            return Err(Error::Invalid("Every server needs an id."));
        }

        let mut servers = self.mpds.servers(None).await?;
        if servers.iter().any(|s| s.id == server.id) {
            return Err(Error::Invalid("A server with that id already exists."));
        }

        self.mpds.insert(SERVERS, &server).await?;
        info!("{} added server {}", self.username(), server.id);

        servers.push(server);
        Ok(servers)
    }

    pub async fn remove_server(&self, id: &str) -> Result<()> {
        let deleted = self.mpds.remove(SERVERS, "id", id).await?;
        info!("{} removed server {id} ({deleted} rows)", self.username());
        Ok(())
    }
}
