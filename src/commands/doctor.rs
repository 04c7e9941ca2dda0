// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use std::collections::HashSet;

use crate::models::{Collection, Ledger};
use crate::utils::pretty_table;
use anyhow::Result;

pub fn handle(ledger: &Ledger, remote: bool) -> Result<()> {
    let rows = diagnose(ledger, remote);
    if rows.is_empty() {
        println!("✅ doctor: no issues found");
    } else {
        println!("{}", pretty_table(&["Issue", "Detail"], rows));
    }
    Ok(())
}

/// `[issue, detail]` rows. Unsynced records only count when a remote is
/// configured.
pub fn diagnose(ledger: &Ledger, remote: bool) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    for collection in Collection::ALL {
        let kind = collection.category_kind();

        // Remote category edits do not cascade, so orphans can appear.
        for t in ledger.transactions(collection) {
            if !ledger.categories.contains(kind, &t.category) {
                rows.push(vec![
                    "orphaned_category".into(),
                    format!("{} {} -> '{}'", collection, t.id, t.category),
                ]);
            }
        }

        let mut seen = HashSet::new();
        for t in ledger.transactions(collection) {
            if !seen.insert(&t.id) {
                rows.push(vec!["duplicate_id".into(), format!("{} {}", collection, t.id)]);
            }
        }

        if remote {
            for e in ledger.entries(collection).iter().filter(|e| e.key.is_none()) {
                rows.push(vec![
                    "unsynced".into(),
                    format!("{} {}", collection, e.transaction.id),
                ]);
            }
        }
    }
    rows
}
