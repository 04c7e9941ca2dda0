// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Merging a wholesale remote replacement with unacknowledged local work.
//!
//! The remote document wins (last writer wins per document), with two
//! exceptions:
//! - a local record without a backend key has never been acknowledged, so
//!   it is kept until the backend shows a record with the same id;
//! - a record deleted locally stays hidden even if a remote document still
//!   shows it.

use std::collections::HashSet;

use crate::models::{Collection, LedgerEntry};
use crate::sync::session::RecordRef;

pub(crate) fn reconcile(
    collection: Collection,
    remote: Vec<LedgerEntry>,
    local: &[LedgerEntry],
    hidden: &HashSet<RecordRef>,
) -> Vec<LedgerEntry> {
    let is_hidden = |e: &LedgerEntry| hidden.contains(&(collection, e.transaction.id.clone()));
    let mut merged: Vec<LedgerEntry> = remote.into_iter().filter(|e| !is_hidden(e)).collect();
    for entry in local {
        if entry.key.is_some() || is_hidden(entry) {
            continue;
        }
        let id = &entry.transaction.id;
        if !merged.iter().any(|m| &m.transaction.id == id) {
            merged.push(entry.clone());
        }
    }
    merged
}
