use std::time::Duration;

use cookie::{Cookie, SameSite};
use log::warn;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::form::{self, Field, FieldKind, FormError};
use crate::time::Timestamp;

pub const AUTH_COOKIE: &str = "Auth-Token";

pub const SESSION_LIFETIME: Duration = Duration::from_secs(60 * 60);
pub const REMEMBERED_SESSION_LIFETIME: Duration = Duration::from_secs(14 * 24 * 60 * 60);

/// Seeded on first start. The password is `admin`.
pub const DEFAULT_ADMIN: &str = "admin";
pub const DEFAULT_ADMIN_HASH: &str =
    "8c6976e5b5410415bde908bd4dee15dfb167a9c873fc4bb8a81f6f2ab448a918";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub username: String,
    pub password_hash: String,
}

/// A row of the sessions table. The cookie carries the same record as JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    pub username: String,
    pub expires: Timestamp,
}

/// Outcome of matching a presented cookie against the sessions table.
#[derive(Debug, PartialEq, Eq)]
pub enum SessionLookup {
    Valid(Session),
    ExpiredRevoked,
    NotFound,
}

pub struct LoginForm {
    pub username: String,
    pub password: String,
    pub remember_me: bool,
}

// TODO: salted, slow hashing; needs a migration for the existing rows
pub fn hash_password(password: &str) -> String {
    sha256::digest(password)
}

impl LoginForm {
    pub const FIELDS: &'static [Field] = &[
        Field {
            name: "username",
            kind: FieldKind::String,
        },
        Field {
            name: "password",
            kind: FieldKind::String,
        },
        Field {
            name: "remember_me",
            kind: FieldKind::Boolean,
        },
    ];

    pub fn parse(raw: &std::collections::HashMap<String, String>) -> Result<Self, FormError> {
        let mut fields = form::parse(Self::FIELDS, raw)?;

        Ok(Self {
            username: fields.string("username")?,
            password: fields.string("password")?,
            remember_me: fields.boolean("remember_me"),
        })
    }

    pub fn calc_pwhash(&self) -> String {
        hash_password(&self.password)
    }

    pub fn lifetime(&self) -> Duration {
        if self.remember_me {
            REMEMBERED_SESSION_LIFETIME
        } else {
            SESSION_LIFETIME
        }
    }
}

impl Session {
    pub fn new(username: &str, now: Timestamp, lifetime: Duration) -> Self {
        Self {
            token: Uuid::new_v4().simple().to_string(),
            username: username.into(),
            expires: now.after(lifetime),
        }
    }

    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.expires.has_passed(now)
    }

    /// `Set-Cookie` value carrying this session, kept by the browser for `lifetime`.
    pub fn cookie(&self, lifetime: Duration, secure: bool) -> String {
        let json = serde_json::to_string(self).unwrap_or_default();
        let max_age = time::Duration::try_from(lifetime).unwrap_or(time::Duration::ZERO);

        Cookie::build((AUTH_COOKIE, urlencoding::encode(&json).into_owned()))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .secure(secure)
            .max_age(max_age)
            .build()
            .to_string()
    }

    pub fn from_cookie(value: &str) -> Option<Self> {
        let json = urlencoding::decode(value)
            .map_err(|e| warn!("undecodable {AUTH_COOKIE} cookie: {e:?}"))
            .ok()?;

        serde_json::from_str(&json)
            .map_err(|e| warn!("malformed {AUTH_COOKIE} cookie: {e}"))
            .ok()
    }
}

/// `Set-Cookie` value that removes the auth cookie.
pub fn clear_cookie(secure: bool) -> String {
    Cookie::build((AUTH_COOKIE, ""))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .max_age(time::Duration::ZERO)
        .build()
        .to_string()
}

/// Which stored session, if any, a presented token refers to.
pub enum Scan<'a> {
    Valid(&'a Session),
    Expired(&'a Session),
    NotFound,
}

/// Stops at the first row with a matching token.
pub fn scan<'a>(sessions: &'a [Session], token: &str, now: Timestamp) -> Scan<'a> {
    match sessions.iter().find(|s| s.token == token) {
        Some(s) if s.is_expired(now) => Scan::Expired(s),
        Some(s) => Scan::Valid(s),
        None => Scan::NotFound,
    }
}
