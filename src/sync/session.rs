// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Per-login session context owned by the coordinator.

use std::collections::HashSet;

use tokio::task::JoinHandle;

use crate::db::{LOCAL_NAMESPACE, UNCLAIMED_NAMESPACE};
use crate::models::{Collection, Outbox, TransactionId};
use crate::remote::{Identity, RemoteCollection, Subscription};

/// A transaction addressed by collection and value identity.
pub(crate) type RecordRef = (Collection, TransactionId);

/// What an async remote task needs to apply its result later: the identity
/// it ran as and the generation it must still match.
#[derive(Debug, Clone)]
pub(crate) struct Ticket {
    pub generation: u64,
    pub identity: Identity,
}

/// One live subscription plus the task feeding its updates into the store.
/// Dropping it unsubscribes and stops the task.
pub(crate) struct LiveFeed {
    collection: RemoteCollection,
    subscription: Option<Subscription>,
    pump: JoinHandle<()>,
}

impl LiveFeed {
    pub fn new(collection: RemoteCollection, subscription: Subscription, pump: JoinHandle<()>) -> Self {
        Self {
            collection,
            subscription: Some(subscription),
            pump,
        }
    }

    pub fn collection(&self) -> RemoteCollection {
        self.collection
    }
}

impl Drop for LiveFeed {
    fn drop(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
        self.pump.abort();
    }
}

#[derive(Default)]
pub(crate) struct Session {
    pub generation: u64,
    /// Set once the backend has accepted our credentials.
    pub identity: Option<Identity>,
    /// Whose ledger is loaded. Also set while working offline for the last
    /// user seen on this device.
    pub user_id: Option<String>,
    /// Working offline before any user is known.
    pub unclaimed: bool,
    pub feeds: Vec<LiveFeed>,
    /// Remote operations started in this generation and not finished yet.
    pub in_flight: usize,
    /// Records deleted locally during this session.
    pub tombstones: HashSet<RecordRef>,
    /// Unacknowledged changes, persisted alongside the ledger.
    pub outbox: Outbox,
}

impl Session {
    pub fn namespace(&self) -> &str {
        match (&self.user_id, self.unclaimed) {
            (Some(user_id), _) => user_id,
            (None, true) => UNCLAIMED_NAMESPACE,
            (None, false) => LOCAL_NAMESPACE,
        }
    }

    /// True when the loaded ledger belongs to a user account, signed in or
    /// not, so its changes must eventually reach the backend.
    pub fn owned(&self) -> bool {
        self.user_id.is_some()
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.generation == generation
    }

    pub fn ticket(&self) -> Option<Ticket> {
        self.identity.as_ref().map(|identity| Ticket {
            generation: self.generation,
            identity: identity.clone(),
        })
    }

    /// Ends the current session and starts the next generation. Live feeds
    /// are released here, before the lock guarding the session is dropped.
    pub fn restart(&mut self, identity: Option<Identity>) -> u64 {
        self.generation += 1;
        self.user_id = identity.as_ref().map(|i| i.user_id.clone());
        self.identity = identity;
        self.unclaimed = false;
        self.feeds.clear();
        self.in_flight = 0;
        self.tombstones.clear();
        self.outbox = Outbox::default();
        self.generation
    }

    /// Starts a session with no backend identity, for `user_id` if known
    /// and otherwise in the unclaimed namespace.
    pub fn restart_offline(&mut self, user_id: Option<String>) -> u64 {
        let generation = self.restart(None);
        self.unclaimed = user_id.is_none();
        self.user_id = user_id;
        generation
    }

    /// Records a remote document must not bring back: deleted this session
    /// or waiting for their remote delete.
    pub fn hidden(&self) -> HashSet<RecordRef> {
        let mut hidden = self.tombstones.clone();
        hidden.extend(
            self.outbox
                .deletes
                .iter()
                .map(|d| (d.collection, d.id.clone())),
        );
        hidden
    }
}
