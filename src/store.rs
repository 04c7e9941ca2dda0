// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! In-memory record store for the active session.
//!
//! Readers get `Arc<Ledger>` snapshots that never change after they are
//! handed out; every mutation publishes a fresh snapshot through a
//! `watch` channel. Only the sync coordinator mutates the store.

use std::sync::Arc;

use tokio::sync::watch;

use crate::models::{
    CategoryKind, CategorySet, Collection, Ledger, LedgerEntry, TransactionId,
};

#[derive(Debug)]
pub struct RecordStore {
    tx: watch::Sender<Arc<Ledger>>,
}

impl Default for RecordStore {
    fn default() -> Self {
        Self::new(Ledger::default())
    }
}

impl RecordStore {
    pub fn new(initial: Ledger) -> Self {
        let (tx, _rx) = watch::channel(Arc::new(initial));
        Self { tx }
    }

    pub fn snapshot(&self) -> Arc<Ledger> {
        Arc::clone(&self.tx.borrow())
    }

    /// Receiver that wakes on every published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<Arc<Ledger>> {
        self.tx.subscribe()
    }

    /// Applies `f` to a private copy of the ledger and publishes it if `f`
    /// reports a change. Outstanding snapshots keep their old contents.
    fn mutate<R>(&self, f: impl FnOnce(&mut Ledger) -> (bool, R)) -> R {
        let mut out = None;
        self.tx.send_if_modified(|current| {
            let mut next = (**current).clone();
            let (changed, result) = f(&mut next);
            out = Some(result);
            if changed {
                *current = Arc::new(next);
            }
            changed
        });
        match out {
            Some(result) => result,
            None => unreachable!("send_if_modified always runs its closure"),
        }
    }

    /// Inserts `entry`, overwriting in place any entry with the same id.
    pub(crate) fn apply_add(&self, collection: Collection, entry: LedgerEntry) {
        self.mutate(|ledger| {
            let entries = ledger.entries_mut(collection);
            match entries
                .iter_mut()
                .find(|e| e.transaction.id == entry.transaction.id)
            {
                Some(existing) => *existing = entry,
                None => entries.push(entry),
            }
            (true, ())
        })
    }

    /// Removes the first entry with a matching id. Missing ids are a no-op.
    pub(crate) fn apply_delete(
        &self,
        collection: Collection,
        id: &TransactionId,
    ) -> Option<LedgerEntry> {
        self.mutate(|ledger| {
            let entries = ledger.entries_mut(collection);
            match entries.iter().position(|e| &e.transaction.id == id) {
                Some(pos) => (true, Some(entries.remove(pos))),
                None => (false, None),
            }
        })
    }

    /// Appends `name` unless already present. Returns whether it was added.
    pub(crate) fn apply_category_add(&self, kind: CategoryKind, name: &str) -> bool {
        self.mutate(|ledger| {
            if ledger.categories.contains(kind, name) {
                return (false, false);
            }
            ledger.categories.get_mut(kind).push(name.to_string());
            (true, true)
        })
    }

    /// Removes `name` and every transaction of the matching collection that
    /// references it, in one snapshot. Returns the cascaded entries, or
    /// `None` when the category did not exist.
    pub(crate) fn apply_category_delete(
        &self,
        kind: CategoryKind,
        name: &str,
    ) -> Option<Vec<LedgerEntry>> {
        self.mutate(|ledger| {
            if !ledger.categories.contains(kind, name) {
                return (false, None);
            }
            ledger.categories.get_mut(kind).retain(|c| c != name);
            let entries = std::mem::take(ledger.entries_mut(kind.collection()));
            let (removed, kept): (Vec<_>, Vec<_>) = entries
                .into_iter()
                .partition(|e| e.transaction.category == name);
            *ledger.entries_mut(kind.collection()) = kept;
            (true, Some(removed))
        })
    }

    /// Attaches a backend key to the first entry with `id`.
    pub(crate) fn apply_key(&self, collection: Collection, id: &TransactionId, key: &str) -> bool {
        self.mutate(|ledger| {
            match ledger
                .entries_mut(collection)
                .iter_mut()
                .find(|e| &e.transaction.id == id)
            {
                Some(entry) if entry.key.as_deref() == Some(key) => (false, true),
                Some(entry) => {
                    entry.key = Some(key.to_string());
                    (true, true)
                }
                None => (false, false),
            }
        })
    }

    pub(crate) fn replace_collection(&self, collection: Collection, entries: Vec<LedgerEntry>) {
        self.mutate(|ledger| {
            let changed = ledger.entries(collection) != entries.as_slice();
            *ledger.entries_mut(collection) = entries;
            (changed, ())
        })
    }

    pub(crate) fn replace_categories(&self, categories: CategorySet) {
        self.mutate(|ledger| {
            let changed = ledger.categories != categories;
            ledger.categories = categories;
            (changed, ())
        })
    }

    pub(crate) fn replace(&self, next: Ledger) {
        self.tx.send_replace(Arc::new(next));
    }

    pub(crate) fn reset(&self) {
        self.replace(Ledger::default());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Transaction;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    fn tx(id: i64, category: &str, amount: i64) -> LedgerEntry {
        LedgerEntry::local(Transaction {
            id: TransactionId::from(id),
            amount: Decimal::from(amount),
            category: category.to_string(),
            date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            note: None,
        })
    }

    #[test]
    fn snapshots_are_not_shared_with_later_mutations() {
        let store = RecordStore::default();
        let before = store.snapshot();
        store.apply_add(Collection::Expenses, tx(1, "Food", 10));
        assert!(before.expenses.is_empty());
        assert_eq!(store.snapshot().expenses.len(), 1);
    }

    #[test]
    fn add_of_existing_id_overwrites_in_place() {
        let store = RecordStore::default();
        store.apply_add(Collection::Expenses, tx(1, "Food", 10));
        store.apply_add(Collection::Expenses, tx(2, "Food", 20));
        store.apply_add(Collection::Expenses, tx(1, "Transport", 30));
        let snap = store.snapshot();
        assert_eq!(snap.expenses.len(), 2);
        assert_eq!(snap.expenses[0].transaction.category, "Transport");
        assert_eq!(snap.expenses[0].transaction.amount, Decimal::from(30));
    }

    #[test]
    fn delete_of_missing_id_keeps_the_same_snapshot() {
        let store = RecordStore::default();
        store.apply_add(Collection::Incomes, tx(1, "Salary", 100));
        let before = store.snapshot();
        assert!(store
            .apply_delete(Collection::Incomes, &TransactionId::from(99))
            .is_none());
        assert!(Arc::ptr_eq(&before, &store.snapshot()));
    }

    #[test]
    fn delete_removes_only_the_first_match() {
        let store = RecordStore::default();
        store.replace_collection(
            Collection::Expenses,
            vec![
                LedgerEntry::keyed("a", tx(7, "Food", 1).transaction),
                LedgerEntry::keyed("b", tx(7, "Food", 2).transaction),
            ],
        );
        let removed = store.apply_delete(Collection::Expenses, &TransactionId::from(7));
        assert_eq!(removed.and_then(|e| e.key), Some("a".to_string()));
        assert_eq!(store.snapshot().expenses[0].key.as_deref(), Some("b"));
    }

    #[test]
    fn category_delete_cascades_in_one_snapshot() {
        let store = RecordStore::default();
        store.apply_add(Collection::Expenses, tx(1, "Food", 10));
        store.apply_add(Collection::Expenses, tx(2, "Transport", 5));
        store.apply_add(Collection::Incomes, tx(3, "Other", 5));
        let mut rx = store.subscribe();
        rx.borrow_and_update();

        let removed = store
            .apply_category_delete(CategoryKind::Expense, "Food")
            .unwrap();
        assert_eq!(removed.len(), 1);
        assert!(rx.has_changed().unwrap());
        let snap = rx.borrow_and_update().clone();
        assert!(!snap.categories.contains(CategoryKind::Expense, "Food"));
        assert_eq!(snap.expenses.len(), 1);
        assert_eq!(snap.incomes.len(), 1);
    }

    #[test]
    fn category_add_is_exact_and_idempotent() {
        let store = RecordStore::default();
        assert!(store.apply_category_add(CategoryKind::Income, "Gifts"));
        assert!(!store.apply_category_add(CategoryKind::Income, "Gifts"));
        assert!(store.apply_category_add(CategoryKind::Income, "gifts"));
        let income = store.snapshot().categories.income.clone();
        assert_eq!(&income[income.len() - 2..], ["Gifts", "gifts"]);
    }

    #[test]
    fn apply_key_attaches_backend_key() {
        let store = RecordStore::default();
        store.apply_add(Collection::Expenses, tx(1, "Food", 10));
        assert!(store.apply_key(Collection::Expenses, &TransactionId::from(1), "-Nk1"));
        assert!(!store.apply_key(Collection::Expenses, &TransactionId::from(2), "-Nk2"));
        assert_eq!(store.snapshot().expenses[0].key.as_deref(), Some("-Nk1"));
    }
}
