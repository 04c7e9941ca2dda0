// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use moneysync::db::MemoryCache;
use moneysync::models::{Ledger, TransactionDraft};
use moneysync::remote::{MemoryRemote, RemoteBackend, RemoteCollection};
use moneysync::sync::SyncCoordinator;

pub fn local_only() -> SyncCoordinator {
    SyncCoordinator::new(Arc::new(MemoryCache::new()), None).unwrap()
}

pub fn connected(remote: &MemoryRemote) -> (SyncCoordinator, Arc<MemoryCache>) {
    let cache = Arc::new(MemoryCache::new());
    (on_cache(remote, cache.clone()), cache)
}

/// Coordinator over an existing cache, as after an app restart.
pub fn on_cache(remote: &MemoryRemote, cache: Arc<MemoryCache>) -> SyncCoordinator {
    let backend: Arc<dyn RemoteBackend> = Arc::new(remote.clone());
    SyncCoordinator::new(cache, Some(backend)).unwrap()
}

/// Number of records in a remote collection document.
pub fn remote_len(remote: &MemoryRemote, collection: RemoteCollection) -> usize {
    remote
        .document(collection)
        .as_object()
        .map_or(0, |records| records.len())
}

pub fn draft(amount: &str, category: &str) -> TransactionDraft {
    TransactionDraft::new(amount, category).on("2024-06-01")
}

/// Waits until a published snapshot satisfies `pred`.
pub async fn wait_for(
    coordinator: &SyncCoordinator,
    pred: impl Fn(&Ledger) -> bool,
) -> Arc<Ledger> {
    let mut rx = coordinator.subscribe();
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let snapshot = rx.borrow_and_update().clone();
            if pred(&snapshot) {
                return snapshot;
            }
            rx.changed().await.expect("record store dropped");
        }
    })
    .await
    .expect("timed out waiting for ledger")
}
