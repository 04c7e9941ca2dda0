// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Remote sync backends.
//!
//! A backend stores, per user, two keyed transaction collections and one
//! category document. The coordinator only talks to the [`RemoteBackend`]
//! trait; documents travel as `serde_json::Value` and are validated by
//! [`crate::codec`] on the way in.

pub mod memory;
pub mod rest;

use std::fmt;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::RemoteResult;
use crate::models::Collection;

pub use memory::MemoryRemote;
pub use rest::RestRemote;

/// Backend-side address of a single record.
pub type RecordKey = String;

/// Receives the full document of a collection each time it changes.
pub type ChangeSink = mpsc::UnboundedSender<Value>;

/// Who the backend authenticated us as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub token: Option<String>,
}

impl Identity {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            token: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteCollection {
    Expenses,
    Incomes,
    Categories,
}

impl RemoteCollection {
    pub const ALL: [RemoteCollection; 3] = [
        RemoteCollection::Expenses,
        RemoteCollection::Incomes,
        RemoteCollection::Categories,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            RemoteCollection::Expenses => "expenses",
            RemoteCollection::Incomes => "incomes",
            RemoteCollection::Categories => "categories",
        }
    }

    /// The transaction collection this maps to, if any.
    pub fn transactions(self) -> Option<Collection> {
        match self {
            RemoteCollection::Expenses => Some(Collection::Expenses),
            RemoteCollection::Incomes => Some(Collection::Incomes),
            RemoteCollection::Categories => None,
        }
    }
}

impl From<Collection> for RemoteCollection {
    fn from(c: Collection) -> Self {
        match c {
            Collection::Expenses => RemoteCollection::Expenses,
            Collection::Incomes => RemoteCollection::Incomes,
        }
    }
}

impl fmt::Display for RemoteCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Live-update registration. Dropping it (or calling
/// [`Subscription::unsubscribe`]) stops delivery.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

#[async_trait]
pub trait RemoteBackend: Send + Sync {
    async fn authenticate(&self) -> RemoteResult<Identity>;

    async fn deauthenticate(&self) -> RemoteResult<()>;

    /// Creates a record and returns the key the backend assigned to it.
    async fn push(
        &self,
        user: &Identity,
        collection: RemoteCollection,
        record: Value,
    ) -> RemoteResult<RecordKey>;

    /// Replaces the whole document stored for `collection`.
    async fn set(
        &self,
        user: &Identity,
        collection: RemoteCollection,
        document: Value,
    ) -> RemoteResult<()>;

    /// Current document for `collection`; `Value::Null` when absent.
    async fn pull(&self, user: &Identity, collection: RemoteCollection) -> RemoteResult<Value>;

    async fn delete_record(
        &self,
        user: &Identity,
        collection: RemoteCollection,
        key: &str,
    ) -> RemoteResult<()>;

    /// Delivers the full document into `sink` after every change.
    async fn subscribe(
        &self,
        user: &Identity,
        collection: RemoteCollection,
        sink: ChangeSink,
    ) -> RemoteResult<Subscription>;
}
