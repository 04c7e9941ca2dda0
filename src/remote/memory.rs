// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! In-process backend.
//!
//! Clones share one store, so two coordinators holding clones behave like
//! two devices signed in to the same account. Switches for going offline,
//! rejecting sign-in and holding writes in flight make it usable for
//! exercising the coordinator's failure paths.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::watch;
use tracing::debug;
use uuid::Uuid;

use super::{ChangeSink, Identity, RecordKey, RemoteBackend, RemoteCollection, Subscription};
use crate::error::{RemoteError, RemoteResult};

type DocKey = (String, RemoteCollection);

struct Subscriber {
    doc: DocKey,
    sink: ChangeSink,
}

#[derive(Default)]
struct State {
    docs: HashMap<DocKey, Value>,
    subscribers: HashMap<u64, Subscriber>,
}

struct Shared {
    state: Mutex<State>,
    online: AtomicBool,
    accept_auth: AtomicBool,
    paused: watch::Sender<bool>,
    next_subscriber: AtomicU64,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Clone)]
pub struct MemoryRemote {
    user_id: String,
    shared: Arc<Shared>,
}

impl MemoryRemote {
    /// Backend that signs everyone in as `user_id`.
    pub fn new(user_id: impl Into<String>) -> Self {
        let (paused, _) = watch::channel(false);
        Self {
            user_id: user_id.into(),
            shared: Arc::new(Shared {
                state: Mutex::new(State::default()),
                online: AtomicBool::new(true),
                accept_auth: AtomicBool::new(true),
                paused,
                next_subscriber: AtomicU64::new(1),
            }),
        }
    }

    /// Handle on the same store that signs in as a different user.
    pub fn as_user(&self, user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn set_online(&self, online: bool) {
        self.shared.online.store(online, Ordering::SeqCst);
    }

    pub fn set_accept_auth(&self, accept: bool) {
        self.shared.accept_auth.store(accept, Ordering::SeqCst);
    }

    /// Holds every write until [`MemoryRemote::resume_writes`].
    pub fn pause_writes(&self) {
        self.shared.paused.send_replace(true);
    }

    pub fn resume_writes(&self) {
        self.shared.paused.send_replace(false);
    }

    pub fn subscriber_count(&self) -> usize {
        self.shared.state().subscribers.len()
    }

    /// Current document of this handle's user.
    pub fn document(&self, collection: RemoteCollection) -> Value {
        self.shared
            .state()
            .docs
            .get(&(self.user_id.clone(), collection))
            .cloned()
            .unwrap_or(Value::Null)
    }

    /// Writes a document as another device would, notifying subscribers.
    pub fn seed(&self, collection: RemoteCollection, document: Value) {
        self.write((self.user_id.clone(), collection), |doc| *doc = document);
    }

    fn ensure_online(&self) -> RemoteResult<()> {
        if self.shared.online.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(RemoteError::Unavailable("memory backend is offline".into()))
        }
    }

    async fn write_gate(&self) -> RemoteResult<()> {
        let mut rx = self.shared.paused.subscribe();
        // The sender lives in `shared`, so the channel cannot close here.
        let _ = rx.wait_for(|paused| !*paused).await;
        self.ensure_online()
    }

    fn write<R>(&self, doc: DocKey, f: impl FnOnce(&mut Value) -> R) -> R {
        let mut state = self.shared.state();
        let entry = state.docs.entry(doc.clone()).or_insert(Value::Null);
        let out = f(entry);
        let snapshot = entry.clone();
        state.subscribers.retain(|id, sub| {
            if sub.doc != doc {
                return true;
            }
            let alive = sub.sink.send(snapshot.clone()).is_ok();
            if !alive {
                debug!("dropping closed memory subscriber {id}");
            }
            alive
        });
        out
    }
}

fn object(doc: &mut Value) -> &mut Map<String, Value> {
    if !doc.is_object() {
        *doc = Value::Object(Map::new());
    }
    match doc {
        Value::Object(map) => map,
        _ => unreachable!("document was just replaced by an object"),
    }
}

#[async_trait]
impl RemoteBackend for MemoryRemote {
    async fn authenticate(&self) -> RemoteResult<Identity> {
        self.ensure_online()?;
        if !self.shared.accept_auth.load(Ordering::SeqCst) {
            return Err(RemoteError::AuthFailed("credentials rejected".into()));
        }
        Ok(Identity {
            user_id: self.user_id.clone(),
            token: Some(format!("memory-{}", self.user_id)),
        })
    }

    async fn deauthenticate(&self) -> RemoteResult<()> {
        Ok(())
    }

    async fn push(
        &self,
        user: &Identity,
        collection: RemoteCollection,
        record: Value,
    ) -> RemoteResult<RecordKey> {
        self.write_gate().await?;
        let key = Uuid::now_v7().to_string();
        self.write((user.user_id.clone(), collection), |doc| {
            object(doc).insert(key.clone(), record);
        });
        Ok(key)
    }

    async fn set(
        &self,
        user: &Identity,
        collection: RemoteCollection,
        document: Value,
    ) -> RemoteResult<()> {
        self.write_gate().await?;
        self.write((user.user_id.clone(), collection), |doc| *doc = document);
        Ok(())
    }

    async fn pull(&self, user: &Identity, collection: RemoteCollection) -> RemoteResult<Value> {
        self.ensure_online()?;
        Ok(self
            .shared
            .state()
            .docs
            .get(&(user.user_id.clone(), collection))
            .cloned()
            .unwrap_or(Value::Null))
    }

    async fn delete_record(
        &self,
        user: &Identity,
        collection: RemoteCollection,
        key: &str,
    ) -> RemoteResult<()> {
        self.write_gate().await?;
        self.write((user.user_id.clone(), collection), |doc| {
            if let Value::Object(map) = doc {
                map.remove(key);
            }
        });
        Ok(())
    }

    async fn subscribe(
        &self,
        user: &Identity,
        collection: RemoteCollection,
        sink: ChangeSink,
    ) -> RemoteResult<Subscription> {
        self.ensure_online()?;
        let id = self.shared.next_subscriber.fetch_add(1, Ordering::SeqCst);
        self.shared.state().subscribers.insert(
            id,
            Subscriber {
                doc: (user.user_id.clone(), collection),
                sink,
            },
        );
        let shared: Weak<Shared> = Arc::downgrade(&self.shared);
        Ok(Subscription::new(move || {
            if let Some(shared) = shared.upgrade() {
                shared.state().subscribers.remove(&id);
            }
        }))
    }
}
