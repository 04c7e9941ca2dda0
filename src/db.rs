// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Local durable cache: one ledger document per session namespace.

use anyhow::{Context, Result};
use directories::ProjectDirs;
use once_cell::sync::Lazy;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::codec::{decode_cached, encode_cached};
use crate::error::CacheError;
use crate::models::{CachedLedger, Ledger, Outbox};

static APP: Lazy<(&str, &str, &str)> =
    Lazy::new(|| ("com.alphavelocity", "Moneysync", "moneysync"));

/// Namespace used by the anonymous, local-only session.
pub const LOCAL_NAMESPACE: &str = "local";

/// Namespace for work done after a sign-in attempt that could not reach
/// the backend before any user was known. The next user to sign in claims
/// it.
pub const UNCLAIMED_NAMESPACE: &str = "unclaimed";

const LAST_USER_KEY: &str = "last_user";

pub fn project_dirs() -> Result<ProjectDirs> {
    ProjectDirs::from(APP.0, APP.1, APP.2)
        .context("Could not determine platform-specific data dir")
}

pub fn default_data_dir() -> Result<PathBuf> {
    Ok(project_dirs()?.data_dir().to_path_buf())
}

pub fn db_path(data_dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(data_dir).context("Failed to create data dir")?;
    Ok(data_dir.join("moneysync.sqlite"))
}

/// Synchronous mirror of the record store that survives restarts.
pub trait LocalCache: Send + Sync {
    /// `Ok(None)` when nothing was saved for `namespace` yet.
    fn load(&self, namespace: &str) -> Result<Option<CachedLedger>, CacheError>;
    fn save(&self, namespace: &str, ledger: &Ledger, outbox: &Outbox) -> Result<(), CacheError>;

    /// The user who last signed in successfully on this device.
    fn last_user(&self) -> Result<Option<String>, CacheError>;
    fn remember_user(&self, user_id: &str) -> Result<(), CacheError>;
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct SqliteCache {
    conn: Mutex<Connection>,
}

impl SqliteCache {
    pub fn open(path: &Path) -> Result<Self, CacheError> {
        let conn = Connection::open(path)?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, CacheError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, CacheError> {
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

fn init_schema(conn: &Connection) -> Result<(), CacheError> {
    conn.execute_batch(
        r#"
    CREATE TABLE IF NOT EXISTS snapshots(
        namespace TEXT PRIMARY KEY,
        body TEXT NOT NULL,
        saved_at TEXT NOT NULL DEFAULT (datetime('now'))
    );
    CREATE TABLE IF NOT EXISTS settings(
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );
    "#,
    )?;
    Ok(())
}

impl LocalCache for SqliteCache {
    fn load(&self, namespace: &str) -> Result<Option<CachedLedger>, CacheError> {
        let conn = lock(&self.conn);
        let body: Option<String> = conn
            .query_row(
                "SELECT body FROM snapshots WHERE namespace=?1",
                params![namespace],
                |r| r.get(0),
            )
            .optional()?;
        match body {
            Some(b) => Ok(Some(decode_cached(&b)?)),
            None => Ok(None),
        }
    }

    fn save(&self, namespace: &str, ledger: &Ledger, outbox: &Outbox) -> Result<(), CacheError> {
        let body = encode_cached(ledger, outbox)?;
        let conn = lock(&self.conn);
        conn.execute(
            "INSERT INTO snapshots(namespace, body) VALUES(?1, ?2)
             ON CONFLICT(namespace) DO UPDATE SET body=excluded.body, saved_at=datetime('now')",
            params![namespace, body],
        )?;
        Ok(())
    }

    fn last_user(&self) -> Result<Option<String>, CacheError> {
        let conn = lock(&self.conn);
        let v: Option<String> = conn
            .query_row(
                "SELECT value FROM settings WHERE key=?1",
                params![LAST_USER_KEY],
                |r| r.get(0),
            )
            .optional()?;
        Ok(v)
    }

    fn remember_user(&self, user_id: &str) -> Result<(), CacheError> {
        let conn = lock(&self.conn);
        conn.execute(
            "INSERT INTO settings(key, value) VALUES(?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value=excluded.value",
            params![LAST_USER_KEY, user_id],
        )?;
        Ok(())
    }
}

/// Cache that lives only as long as the process.
#[derive(Default)]
pub struct MemoryCache {
    docs: Mutex<HashMap<String, String>>,
    last_user: Mutex<Option<String>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a raw document, bypassing encoding.
    pub fn insert_raw(&self, namespace: &str, body: impl Into<String>) {
        lock(&self.docs).insert(namespace.to_string(), body.into());
    }

    pub fn contains(&self, namespace: &str) -> bool {
        lock(&self.docs).contains_key(namespace)
    }
}

impl LocalCache for MemoryCache {
    fn load(&self, namespace: &str) -> Result<Option<CachedLedger>, CacheError> {
        match lock(&self.docs).get(namespace) {
            Some(body) => Ok(Some(decode_cached(body)?)),
            None => Ok(None),
        }
    }

    fn save(&self, namespace: &str, ledger: &Ledger, outbox: &Outbox) -> Result<(), CacheError> {
        let body = encode_cached(ledger, outbox)?;
        lock(&self.docs).insert(namespace.to_string(), body);
        Ok(())
    }

    fn last_user(&self) -> Result<Option<String>, CacheError> {
        Ok(lock(&self.last_user).clone())
    }

    fn remember_user(&self, user_id: &str) -> Result<(), CacheError> {
        *lock(&self.last_user) = Some(user_id.to_string());
        Ok(())
    }
}
