// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! The sync coordinator.
//!
//! Every mutation lands in the record store and the local cache
//! synchronously, then goes to the remote backend on a spawned task. Remote
//! results and live updates are applied only while the session generation
//! they were started under is still current, so nothing from a previous
//! login can leak into the next one.
//!
//! Work the backend has not acknowledged is never dropped: records without
//! a backend key and deletes still waiting for the backend are cached with
//! the ledger and uploaded at the next sign-in or reconnect.

mod reconcile;
mod session;

use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use serde::Serialize;
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::codec;
use crate::db::{LocalCache, LOCAL_NAMESPACE, UNCLAIMED_NAMESPACE};
use crate::error::{RemoteError, RemoteResult, SyncError, ValidationError};
use crate::models::{
    CachedLedger, CategoryKind, CategorySet, Collection, Ledger, LedgerEntry, Outbox, PendingDelete,
    TransactionDraft, TransactionId,
};
use crate::remote::{RecordKey, RemoteBackend, RemoteCollection};
use crate::store::RecordStore;

use self::reconcile::reconcile;
use self::session::{LiveFeed, Session, Ticket};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Unauthenticated,
    Authenticating,
    Syncing,
    Synced,
    Disconnected,
}

impl ConnectionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionStatus::Unauthenticated => "unauthenticated",
            ConnectionStatus::Authenticating => "authenticating",
            ConnectionStatus::Syncing => "syncing",
            ConnectionStatus::Synced => "synced",
            ConnectionStatus::Disconnected => "disconnected",
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

use ConnectionStatus::{Authenticating, Disconnected, Synced, Syncing, Unauthenticated};

/// A push in progress, by user and record. Outlives sessions so a record is
/// never uploaded twice when its user signs back in mid-push.
type Upload = (String, Collection, TransactionId);

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

fn load_cached(cache: &dyn LocalCache, namespace: &str) -> CachedLedger {
    match cache.load(namespace) {
        Ok(Some(cached)) => cached,
        Ok(None) => CachedLedger::default(),
        Err(e) => {
            warn!("cached ledger for '{namespace}' is unusable, starting from defaults: {e}");
            CachedLedger::default()
        }
    }
}

/// Moves records made offline before any user was known into `ledger`,
/// adding the categories they use, and empties the unclaimed namespace.
fn claim_unclaimed(cache: &dyn LocalCache, ledger: &mut Ledger, outbox: &mut Outbox) {
    let unclaimed = load_cached(cache, UNCLAIMED_NAMESPACE).ledger;
    let mut claimed = 0;
    for collection in Collection::ALL {
        let kind = collection.category_kind();
        for entry in unclaimed.entries(collection) {
            let transaction = &entry.transaction;
            if ledger.find(collection, &transaction.id).is_some() {
                continue;
            }
            if !ledger.categories.contains(kind, &transaction.category) {
                ledger
                    .categories
                    .get_mut(kind)
                    .push(transaction.category.clone());
                outbox.categories = true;
            }
            ledger
                .entries_mut(collection)
                .push(LedgerEntry::local(transaction.clone()));
            claimed += 1;
        }
    }
    if claimed == 0 {
        return;
    }
    info!("claimed {claimed} record(s) made offline before sign-in");
    if let Err(e) = cache.save(UNCLAIMED_NAMESPACE, &Ledger::default(), &Outbox::default()) {
        warn!("failed to clear unclaimed ledger: {e}");
    }
}

/// Checks a draft against the shapes and the categories currently defined.
fn check_against(
    ledger: &Ledger,
    collection: Collection,
    draft: &TransactionDraft,
) -> Result<(), ValidationError> {
    draft.validate()?;
    let kind = collection.category_kind();
    let name = draft.category.trim();
    if !ledger.categories.contains(kind, name) {
        return Err(ValidationError::UnknownCategory {
            kind: kind.to_string(),
            name: name.to_string(),
        });
    }
    Ok(())
}

struct Inner {
    store: RecordStore,
    cache: Arc<dyn LocalCache>,
    remote: Option<Arc<dyn RemoteBackend>>,
    session: Mutex<Session>,
    status: watch::Sender<ConnectionStatus>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    uploads: Mutex<HashSet<Upload>>,
    runtime: Handle,
}

impl Inner {
    fn session(&self) -> MutexGuard<'_, Session> {
        lock(&self.session)
    }

    fn persist(&self, session: &Session) {
        let namespace = session.namespace();
        if let Err(e) = self
            .cache
            .save(namespace, &self.store.snapshot(), &session.outbox)
        {
            warn!("failed to write ledger cache for '{namespace}': {e}");
        }
    }

    fn set_status(&self, next: ConnectionStatus) {
        let previous = self.status.send_replace(next);
        if previous != next {
            debug!("connection status {previous} -> {next}");
        }
    }

    /// Moves to `to` if `generation` is still current and the status is one
    /// of `from`.
    fn transition_in(
        &self,
        session: &Session,
        generation: u64,
        from: &[ConnectionStatus],
        to: ConnectionStatus,
    ) -> bool {
        let current = *self.status.borrow();
        if !session.is_current(generation) || !from.contains(&current) {
            return false;
        }
        self.set_status(to);
        true
    }

    fn transition(
        &self,
        generation: u64,
        from: &[ConnectionStatus],
        to: ConnectionStatus,
    ) -> bool {
        let session = self.session();
        self.transition_in(&session, generation, from, to)
    }

    /// `Syncing` becomes `Synced` once this generation has nothing in flight.
    fn settle_status(&self, generation: u64) {
        let session = self.session();
        if session.in_flight == 0 {
            self.transition_in(&session, generation, &[Syncing], Synced);
        }
    }

    /// Identity to push as, if remote writes are currently possible.
    fn remote_ticket(&self, session: &Session) -> Option<Ticket> {
        self.remote.as_ref()?;
        if *self.status.borrow() == Disconnected {
            return None;
        }
        session.ticket()
    }

    /// The backend rejected our credentials mid-session.
    fn expire(&self, generation: u64) {
        let mut session = self.session();
        if !session.is_current(generation) || session.identity.is_none() {
            return;
        }
        warn!("remote session expired, signing out");
        session.restart(None);
        self.store.reset();
        self.set_status(Unauthenticated);
    }

    fn fail(&self, generation: u64, what: &str, e: &RemoteError) {
        warn!("{what} failed: {e}");
        match e {
            RemoteError::Unavailable(_) => {
                self.transition(generation, &[Authenticating, Syncing, Synced], Disconnected);
            }
            RemoteError::AuthRequired => self.expire(generation),
            _ => {}
        }
    }

    /// Continues without the backend after it could not be reached at
    /// sign-in: in the last signed-in user's namespace when there is one.
    fn work_offline(&self, attempt: u64) {
        let mut session = self.session();
        if !session.is_current(attempt) {
            return;
        }
        let user_id = self.cache.last_user().unwrap_or_else(|e| {
            warn!("could not read the last signed-in user: {e}");
            None
        });
        session.restart_offline(user_id);
        let cached = load_cached(self.cache.as_ref(), session.namespace());
        session.outbox = cached.outbox;
        self.store.replace(cached.ledger);
        self.set_status(Disconnected);
        info!("working offline in '{}'", session.namespace());
    }

    fn spawn_remote<F>(self: &Arc<Self>, generation: u64, what: String, op: F)
    where
        F: Future<Output = RemoteResult<()>> + Send + 'static,
    {
        {
            let mut session = self.session();
            if session.is_current(generation) {
                session.in_flight += 1;
                self.transition_in(&session, generation, &[Synced], Syncing);
            }
        }
        let inner = Arc::clone(self);
        let handle = self.runtime.spawn(async move {
            match op.await {
                Ok(()) => debug!("{what} done"),
                Err(e) => inner.fail(generation, &what, &e),
            }
            inner.finish_remote(generation);
        });
        let mut tasks = lock(&self.tasks);
        tasks.retain(|h| !h.is_finished());
        tasks.push(handle);
    }

    fn finish_remote(&self, generation: u64) {
        let mut session = self.session();
        if !session.is_current(generation) {
            return;
        }
        session.in_flight = session.in_flight.saturating_sub(1);
        if session.in_flight == 0 {
            self.transition_in(&session, generation, &[Syncing], Synced);
        }
    }

    fn spawn_push(self: &Arc<Self>, ticket: Ticket, collection: Collection, entry: &LedgerEntry) {
        let Some(remote) = self.remote.clone() else {
            return;
        };
        let id = entry.transaction.id.clone();
        let upload = (ticket.identity.user_id.clone(), collection, id.clone());
        if !lock(&self.uploads).insert(upload.clone()) {
            debug!("{collection} {id} is already being uploaded");
            return;
        }
        let record = codec::encode_record(&entry.transaction);
        let inner = Arc::clone(self);
        let generation = ticket.generation;
        self.spawn_remote(generation, format!("push of {collection} {id}"), async move {
            let result = remote.push(&ticket.identity, collection.into(), record).await;
            if let Ok(key) = &result {
                inner.settle_push(&ticket, collection, &id, key.clone());
            }
            lock(&inner.uploads).remove(&upload);
            result.map(|_| ())
        });
    }

    fn spawn_delete(self: &Arc<Self>, ticket: Ticket, collection: Collection, key: RecordKey) {
        let Some(remote) = self.remote.clone() else {
            return;
        };
        let inner = Arc::clone(self);
        let what = format!("delete of {collection} {key}");
        self.spawn_remote(ticket.generation, what, async move {
            remote
                .delete_record(&ticket.identity, collection.into(), &key)
                .await?;
            inner.settle_delete(ticket.generation, &key);
            Ok(())
        });
    }

    fn spawn_categories_set(self: &Arc<Self>, ticket: Ticket, document: Value) {
        let Some(remote) = self.remote.clone() else {
            return;
        };
        let inner = Arc::clone(self);
        let what = "categories update".to_string();
        self.spawn_remote(ticket.generation, what, async move {
            remote
                .set(&ticket.identity, RemoteCollection::Categories, document.clone())
                .await?;
            inner.settle_categories(ticket.generation, &document);
            Ok(())
        });
    }

    /// Attaches the backend key to a pushed record, or deletes the record
    /// remotely if it was deleted locally while the push was in flight.
    /// Tombstones stay until the session ends, so a stale live update
    /// still carrying the record cannot bring it back.
    fn settle_push(
        self: &Arc<Self>,
        ticket: &Ticket,
        collection: Collection,
        id: &TransactionId,
        key: RecordKey,
    ) {
        let mut session = self.session();
        if !session.is_current(ticket.generation) {
            debug!("discarding {collection} {id} push result from an ended session");
            return;
        }
        if session.tombstones.contains(&(collection, id.clone())) {
            session.outbox.deletes.push(PendingDelete {
                collection,
                id: id.clone(),
                key: key.clone(),
            });
            self.persist(&session);
            drop(session);
            debug!("{collection} {id} was deleted before its push landed, removing {key}");
            self.spawn_delete(ticket.clone(), collection, key);
            return;
        }
        if self.store.apply_key(collection, id, &key) {
            self.persist(&session);
        }
    }

    fn settle_delete(&self, generation: u64, key: &str) {
        let mut session = self.session();
        if !session.is_current(generation) {
            return;
        }
        let before = session.outbox.deletes.len();
        session.outbox.deletes.retain(|d| d.key != key);
        if session.outbox.deletes.len() != before {
            self.persist(&session);
        }
    }

    /// Clears the unsynced-categories mark if `document` is still what the
    /// store holds.
    fn settle_categories(&self, generation: u64, document: &Value) {
        let mut session = self.session();
        if !session.is_current(generation) || !session.outbox.categories {
            return;
        }
        if codec::encode_categories(&self.store.snapshot().categories) == *document {
            session.outbox.categories = false;
            self.persist(&session);
        }
    }

    /// After `sent` was written over every remote document, only deletes of
    /// records it still contained are outstanding.
    fn settle_upload(&self, generation: u64, sent: &Ledger) {
        let mut session = self.session();
        if !session.is_current(generation) {
            return;
        }
        let before = session.outbox.clone();
        session.outbox.deletes.retain(|d| {
            sent.entries(d.collection)
                .iter()
                .any(|e| e.key.as_deref() == Some(d.key.as_str()))
        });
        if self.store.snapshot().categories == sent.categories {
            session.outbox.categories = false;
        }
        if session.outbox != before {
            self.persist(&session);
        }
    }

    /// Uploads everything the backend has not acknowledged: records without
    /// a key, pending deletes and unsynced categories.
    fn flush_outbox(self: &Arc<Self>, ticket: &Ticket) {
        let session = self.session();
        if !session.is_current(ticket.generation) {
            return;
        }
        let ledger = self.store.snapshot();
        let deletes = session.outbox.deletes.clone();
        let categories = session
            .outbox
            .categories
            .then(|| codec::encode_categories(&ledger.categories));
        drop(session);

        let unsynced: Vec<(Collection, &LedgerEntry)> = Collection::ALL
            .into_iter()
            .flat_map(|c| {
                ledger
                    .entries(c)
                    .iter()
                    .filter(|e| e.key.is_none())
                    .map(move |e| (c, e))
            })
            .collect();
        if !unsynced.is_empty() || !deletes.is_empty() || categories.is_some() {
            info!(
                "uploading {} unsynced record(s) and {} pending delete(s)",
                unsynced.len(),
                deletes.len()
            );
        }
        for (collection, entry) in unsynced {
            self.spawn_push(ticket.clone(), collection, entry);
        }
        for delete in deletes {
            self.spawn_delete(ticket.clone(), delete.collection, delete.key);
        }
        if let Some(document) = categories {
            self.spawn_categories_set(ticket.clone(), document);
        }
    }

    /// Decodes a remote collection and merges it with unacknowledged local
    /// work.
    fn merged_entries(
        &self,
        session: &Session,
        current: &Ledger,
        collection: Collection,
        document: Value,
    ) -> Vec<LedgerEntry> {
        reconcile(
            collection,
            codec::decode_collection(document),
            current.entries(collection),
            &session.hidden(),
        )
    }

    /// Remote categories, unless local edits have not been uploaded yet.
    fn merged_categories(
        &self,
        session: &Session,
        current: &Ledger,
        document: Value,
    ) -> CategorySet {
        if session.outbox.categories {
            debug!("keeping local categories until they are uploaded");
            return current.categories.clone();
        }
        codec::decode_categories(document)
    }

    /// Replaces one part of the store with a live notification. Returns
    /// false when `generation` has ended.
    fn apply_live(&self, generation: u64, collection: RemoteCollection, document: Value) -> bool {
        let session = self.session();
        if !session.is_current(generation) {
            return false;
        }
        let before = self.store.snapshot();
        match collection.transactions() {
            Some(c) => {
                let entries = self.merged_entries(&session, &before, c, document);
                self.store.replace_collection(c, entries);
            }
            None => {
                let categories = self.merged_categories(&session, &before, document);
                self.store.replace_categories(categories);
            }
        }
        if !Arc::ptr_eq(&before, &self.store.snapshot()) {
            self.persist(&session);
        }
        true
    }

    /// Replaces all three documents with what the backend holds, in one
    /// snapshot. Returns false when `generation` has ended.
    fn apply_pulled(&self, generation: u64, documents: Vec<(RemoteCollection, Value)>) -> bool {
        let session = self.session();
        if !session.is_current(generation) {
            return false;
        }
        let current = self.store.snapshot();
        let mut next = (*current).clone();
        for (collection, document) in documents {
            match collection.transactions() {
                Some(c) => {
                    *next.entries_mut(c) = self.merged_entries(&session, &current, c, document)
                }
                None => next.categories = self.merged_categories(&session, &current, document),
            }
        }
        if next != *current {
            self.store.replace(next);
            self.persist(&session);
        }
        true
    }
}

async fn pump(
    inner: Weak<Inner>,
    generation: u64,
    collection: RemoteCollection,
    mut updates: mpsc::UnboundedReceiver<Value>,
) {
    while let Some(document) = updates.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        if !inner.apply_live(generation, collection, document) {
            debug!("live {collection} update arrived after its session ended");
            break;
        }
    }
}

/// Owns the record store, its cache mirror and the remote session.
pub struct SyncCoordinator {
    inner: Arc<Inner>,
}

impl SyncCoordinator {
    /// Must be called inside a tokio runtime; remote work is spawned on it.
    /// Starts anonymous, with whatever the cache holds for the local
    /// namespace.
    pub fn new(
        cache: Arc<dyn LocalCache>,
        remote: Option<Arc<dyn RemoteBackend>>,
    ) -> Result<Self, SyncError> {
        let runtime = Handle::try_current().map_err(|_| SyncError::NoRuntime)?;
        let initial = load_cached(cache.as_ref(), LOCAL_NAMESPACE).ledger;
        let (status, _) = watch::channel(Unauthenticated);
        Ok(Self {
            inner: Arc::new(Inner {
                store: RecordStore::new(initial),
                cache,
                remote,
                session: Mutex::new(Session::default()),
                status,
                tasks: Mutex::new(Vec::new()),
                uploads: Mutex::new(HashSet::new()),
                runtime,
            }),
        })
    }

    pub fn snapshot(&self) -> Arc<Ledger> {
        self.inner.store.snapshot()
    }

    /// Receives every new snapshot as it is published.
    pub fn subscribe(&self) -> watch::Receiver<Arc<Ledger>> {
        self.inner.store.subscribe()
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.inner.status.borrow()
    }

    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.inner.status.subscribe()
    }

    /// Owner of the loaded ledger; set while signed in and while working
    /// offline for a known user.
    pub fn user_id(&self) -> Option<String> {
        self.inner.session().user_id.clone()
    }

    /// Deletes and category edits the backend has not acknowledged.
    pub fn outbox(&self) -> Outbox {
        self.inner.session().outbox.clone()
    }

    pub fn has_remote(&self) -> bool {
        self.inner.remote.is_some()
    }

    pub fn live_feed_count(&self) -> usize {
        self.inner.session().feeds.len()
    }

    /// Collections currently fed by a live subscription.
    pub fn live_collections(&self) -> Vec<RemoteCollection> {
        self.inner
            .session()
            .feeds
            .iter()
            .map(LiveFeed::collection)
            .collect()
    }

    /// Why [`add_transaction`](Self::add_transaction) would ignore `draft`.
    pub fn check_draft(
        &self,
        collection: Collection,
        draft: &TransactionDraft,
    ) -> Result<(), ValidationError> {
        check_against(&self.snapshot(), collection, draft)
    }

    /// Records a new transaction with a fresh id. Invalid drafts are
    /// ignored and yield `None`.
    pub fn add_transaction(
        &self,
        collection: Collection,
        draft: TransactionDraft,
    ) -> Option<TransactionId> {
        let inner = &self.inner;
        let session = inner.session();
        if let Err(e) = check_against(&inner.store.snapshot(), collection, &draft) {
            debug!("ignoring {collection} draft: {e}");
            return None;
        }
        let id = TransactionId::generate();
        let entry = LedgerEntry::local(draft.build(id.clone()).ok()?);
        inner.store.apply_add(collection, entry.clone());
        inner.persist(&session);

        if let Some(ticket) = inner.remote_ticket(&session) {
            drop(session);
            inner.spawn_push(ticket, collection, &entry);
        }
        Some(id)
    }

    pub fn add_expense(&self, draft: TransactionDraft) -> Option<TransactionId> {
        self.add_transaction(Collection::Expenses, draft)
    }

    pub fn add_income(&self, draft: TransactionDraft) -> Option<TransactionId> {
        self.add_transaction(Collection::Incomes, draft)
    }

    /// Removes the first transaction with `id`. Returns false if there is
    /// none.
    pub fn delete_transaction(&self, collection: Collection, id: &TransactionId) -> bool {
        let inner = &self.inner;
        let mut session = inner.session();
        let Some(removed) = inner.store.apply_delete(collection, id) else {
            return false;
        };
        if session.owned() {
            session.tombstones.insert((collection, id.clone()));
            if let Some(key) = &removed.key {
                session.outbox.deletes.push(PendingDelete {
                    collection,
                    id: id.clone(),
                    key: key.clone(),
                });
            }
        }
        inner.persist(&session);

        if let (Some(key), Some(ticket)) = (removed.key, inner.remote_ticket(&session)) {
            drop(session);
            inner.spawn_delete(ticket, collection, key);
        }
        true
    }

    pub fn delete_expense(&self, id: &TransactionId) -> bool {
        self.delete_transaction(Collection::Expenses, id)
    }

    pub fn delete_income(&self, id: &TransactionId) -> bool {
        self.delete_transaction(Collection::Incomes, id)
    }

    /// Appends a category. Blank and already present names are ignored.
    pub fn add_category(&self, kind: CategoryKind, name: &str) -> bool {
        let name = name.trim();
        if name.is_empty() {
            return false;
        }
        let inner = &self.inner;
        let mut session = inner.session();
        if !inner.store.apply_category_add(kind, name) {
            return false;
        }
        if session.owned() {
            session.outbox.categories = true;
        }
        inner.persist(&session);
        if let Some(ticket) = inner.remote_ticket(&session) {
            let document = codec::encode_categories(&inner.store.snapshot().categories);
            drop(session);
            inner.spawn_categories_set(ticket, document);
        }
        true
    }

    /// Removes a category together with every transaction filed under it,
    /// in a single snapshot.
    pub fn delete_category(&self, kind: CategoryKind, name: &str) -> bool {
        let inner = &self.inner;
        let mut session = inner.session();
        let Some(cascaded) = inner.store.apply_category_delete(kind, name) else {
            return false;
        };

        let collection = kind.collection();
        info!(
            "deleted {kind} category '{name}' with {} transaction(s)",
            cascaded.len()
        );
        let owned = session.owned();
        if owned {
            session.outbox.categories = true;
        }
        let mut keys = Vec::new();
        for entry in cascaded {
            if !owned {
                continue;
            }
            let id = entry.transaction.id;
            session.tombstones.insert((collection, id.clone()));
            if let Some(key) = entry.key {
                session.outbox.deletes.push(PendingDelete {
                    collection,
                    id,
                    key: key.clone(),
                });
                keys.push(key);
            }
        }
        inner.persist(&session);

        if let Some(ticket) = inner.remote_ticket(&session) {
            let document = codec::encode_categories(&inner.store.snapshot().categories);
            drop(session);
            inner.spawn_categories_set(ticket.clone(), document);
            for key in keys {
                inner.spawn_delete(ticket.clone(), collection, key);
            }
        }
        true
    }

    /// Signs in, switches to the user's cached ledger, starts live updates,
    /// pulls all three documents and uploads whatever the backend has not
    /// acknowledged yet.
    ///
    /// Rejected credentials leave the coordinator unauthenticated with an
    /// empty default ledger. An unreachable backend leaves it
    /// `Disconnected`, working on the last signed-in user's cached ledger;
    /// [`reconnect`](Self::reconnect) retries the sign-in.
    pub async fn login(&self) -> ConnectionStatus {
        let Some(remote) = self.inner.remote.clone() else {
            warn!("login requested but no remote backend is configured");
            return self.status();
        };
        if self.inner.session().identity.is_some() {
            self.logout().await;
        }
        let attempt = self.inner.session().generation;
        self.inner.set_status(Authenticating);

        let identity = match remote.authenticate().await {
            Ok(identity) => identity,
            Err(e) if e.is_unavailable() => {
                warn!("sign-in could not reach the backend: {e}");
                self.inner.work_offline(attempt);
                return self.status();
            }
            Err(e) => {
                warn!("sign-in failed: {e}");
                let mut session = self.inner.session();
                if session.is_current(attempt) {
                    session.restart(None);
                    self.inner.store.reset();
                    self.inner.set_status(Unauthenticated);
                }
                return self.status();
            }
        };

        let ticket = {
            let mut session = self.inner.session();
            if !session.is_current(attempt) {
                debug!("sign-in for {} was superseded", identity.user_id);
                return self.status();
            }
            let generation = session.restart(Some(identity.clone()));
            let cache = self.inner.cache.as_ref();
            let mut cached = load_cached(cache, &identity.user_id);
            claim_unclaimed(cache, &mut cached.ledger, &mut cached.outbox);
            session.outbox = cached.outbox;
            self.inner.store.replace(cached.ledger);
            self.inner.persist(&session);
            if let Err(e) = cache.remember_user(&identity.user_id) {
                warn!("failed to remember {} for offline use: {e}", identity.user_id);
            }
            self.inner.set_status(Syncing);
            Ticket {
                generation,
                identity,
            }
        };
        info!("signed in as {}", ticket.identity.user_id);

        self.start_live_updates(&remote, &ticket).await;
        match self.pull_all(&remote, &ticket).await {
            Ok(()) => {
                self.inner.flush_outbox(&ticket);
                self.inner.settle_status(ticket.generation);
            }
            Err(e) => self.inner.fail(ticket.generation, "initial pull", &e),
        }
        self.status()
    }

    /// Drops every session resource and resets the store to defaults. The
    /// user's cache is left as it was. Pending remote work finishes but its
    /// results are discarded.
    pub async fn logout(&self) {
        let identity = {
            let mut session = self.inner.session();
            let identity = session.identity.take();
            session.restart(None);
            self.inner.store.reset();
            self.inner.set_status(Unauthenticated);
            identity
        };
        if let (Some(identity), Some(remote)) = (identity, self.inner.remote.as_ref()) {
            if let Err(e) = remote.deauthenticate().await {
                warn!("sign-out from backend failed: {e}");
            }
            info!("signed out {}", identity.user_id);
        }
    }

    /// Writes all three local documents over the remote ones, then pulls
    /// them back and replaces the store with the result. Whatever another
    /// writer stored between the two steps wins.
    pub async fn bidirectional_sync(&self) -> ConnectionStatus {
        let Some(remote) = self.inner.remote.clone() else {
            return self.status();
        };
        let Some(ticket) = self.inner.session().ticket() else {
            debug!("sync skipped: not signed in");
            return self.status();
        };
        self.wait_idle().await;
        if !self
            .inner
            .transition(ticket.generation, &[Syncing, Synced, Disconnected], Syncing)
        {
            return self.status();
        }
        info!("syncing ledger for {}", ticket.identity.user_id);

        let ledger = self.snapshot();
        let outgoing = [
            (
                RemoteCollection::Expenses,
                codec::encode_collection(&ledger.expenses),
            ),
            (
                RemoteCollection::Incomes,
                codec::encode_collection(&ledger.incomes),
            ),
            (
                RemoteCollection::Categories,
                codec::encode_categories(&ledger.categories),
            ),
        ];
        for (collection, document) in outgoing {
            if let Err(e) = remote.set(&ticket.identity, collection, document).await {
                self.inner
                    .fail(ticket.generation, &format!("sync of {collection}"), &e);
                self.inner.settle_status(ticket.generation);
                return self.status();
            }
        }
        self.inner.settle_upload(ticket.generation, &ledger);
        if let Err(e) = self.pull_all(&remote, &ticket).await {
            self.inner.fail(ticket.generation, "sync pull", &e);
        }
        self.inner.settle_status(ticket.generation);
        self.status()
    }

    /// Leaves `Disconnected`: retries the sign-in if it never reached the
    /// backend, otherwise runs a full sync.
    pub async fn reconnect(&self) -> ConnectionStatus {
        if self.status() != Disconnected {
            return self.status();
        }
        if self.inner.session().identity.is_none() {
            return self.login().await;
        }
        self.bidirectional_sync().await
    }

    /// Waits until every remote operation started so far has finished.
    pub async fn wait_idle(&self) {
        loop {
            let handles = std::mem::take(&mut *lock(&self.inner.tasks));
            if handles.is_empty() {
                break;
            }
            for handle in handles {
                if let Err(e) = handle.await {
                    if e.is_panic() {
                        warn!("remote task panicked: {e}");
                    }
                }
            }
        }
    }

    async fn pull_all(
        &self,
        remote: &Arc<dyn RemoteBackend>,
        ticket: &Ticket,
    ) -> RemoteResult<()> {
        let mut documents = Vec::with_capacity(RemoteCollection::ALL.len());
        for collection in RemoteCollection::ALL {
            documents.push((collection, remote.pull(&ticket.identity, collection).await?));
        }
        if !self.inner.apply_pulled(ticket.generation, documents) {
            debug!("pulled documents arrived after their session ended");
        }
        Ok(())
    }

    async fn start_live_updates(&self, remote: &Arc<dyn RemoteBackend>, ticket: &Ticket) {
        for collection in RemoteCollection::ALL {
            let (sink, updates) = mpsc::unbounded_channel();
            let subscription = match remote.subscribe(&ticket.identity, collection, sink).await {
                Ok(subscription) => subscription,
                Err(e) => {
                    self.inner
                        .fail(ticket.generation, &format!("subscribe to {collection}"), &e);
                    continue;
                }
            };
            let pump = self.inner.runtime.spawn(pump(
                Arc::downgrade(&self.inner),
                ticket.generation,
                collection,
                updates,
            ));
            let feed = LiveFeed::new(collection, subscription, pump);
            let mut session = self.inner.session();
            if !session.is_current(ticket.generation) {
                return;
            }
            session.feeds.push(feed);
        }
    }
}

impl Drop for SyncCoordinator {
    fn drop(&mut self) {
        self.inner.session().feeds.clear();
    }
}
