// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

mod common;

use std::sync::Arc;

use common::{connected, draft, local_only};
use moneysync::db::{LocalCache, MemoryCache, LOCAL_NAMESPACE};
use moneysync::error::ValidationError;
use moneysync::models::{CategoryKind, Collection, Ledger, TransactionDraft, TransactionId};
use moneysync::remote::{MemoryRemote, RemoteCollection};
use moneysync::summary::Summary;
use moneysync::sync::{ConnectionStatus, SyncCoordinator};
use rust_decimal_macros::dec;
use serde_json::json;

#[test]
fn construction_requires_a_runtime() {
    let result = SyncCoordinator::new(Arc::new(MemoryCache::new()), None);
    assert!(result.is_err());
}

#[tokio::test]
async fn deleting_category_cascades_to_its_expenses() {
    let c = local_only();
    c.add_expense(draft("50", "Food")).unwrap();
    c.add_expense(draft("20", "Transport")).unwrap();

    assert!(c.delete_category(CategoryKind::Expense, "Food"));

    let ledger = c.snapshot();
    assert!(!ledger.categories.contains(CategoryKind::Expense, "Food"));
    assert_eq!(ledger.expenses.len(), 1);
    assert_eq!(ledger.expenses[0].transaction.category, "Transport");
}

#[tokio::test]
async fn deleting_expense_category_keeps_incomes_with_same_name() {
    let c = local_only();
    c.add_expense(draft("5", "Other")).unwrap();
    c.add_income(draft("7", "Other")).unwrap();

    c.delete_category(CategoryKind::Expense, "Other");

    let ledger = c.snapshot();
    assert!(ledger.expenses.is_empty());
    assert_eq!(ledger.incomes.len(), 1);
    assert!(ledger.categories.contains(CategoryKind::Income, "Other"));
}

#[tokio::test]
async fn incomes_sum_into_summary() {
    let c = local_only();
    c.add_income(draft("100", "Salary")).unwrap();
    c.add_income(draft("200", "Freelance")).unwrap();
    c.add_expense(draft("50", "Food")).unwrap();

    let s = Summary::from_ledger(&c.snapshot());
    assert_eq!(s.total_income, dec!(300));
    assert_eq!(s.balance, dec!(250));
}

#[tokio::test]
async fn add_category_is_idempotent_and_case_sensitive() {
    let c = local_only();
    assert!(c.add_category(CategoryKind::Expense, "Pets"));
    let before = c.snapshot();
    assert!(!c.add_category(CategoryKind::Expense, "Pets"));
    assert!(Arc::ptr_eq(&before, &c.snapshot()));
    assert!(c.add_category(CategoryKind::Expense, "pets"));
    assert!(!c.add_category(CategoryKind::Expense, "   "));

    let expense = &c.snapshot().categories.expense;
    assert_eq!(&expense[expense.len() - 2..], ["Pets", "pets"]);
}

#[tokio::test]
async fn deleting_unknown_id_leaves_snapshot_untouched() {
    let c = local_only();
    c.add_expense(draft("1", "Food")).unwrap();
    let before = c.snapshot();

    assert!(!c.delete_expense(&TransactionId::from("does-not-exist")));
    assert!(!c.delete_category(CategoryKind::Income, "Nope"));
    assert!(Arc::ptr_eq(&before, &c.snapshot()));
}

#[tokio::test]
async fn invalid_drafts_are_ignored() {
    let c = local_only();
    let before = c.snapshot();

    assert_eq!(c.add_expense(draft("abc", "Food")), None);
    assert_eq!(c.add_expense(draft("-3", "Food")), None);
    assert_eq!(c.add_expense(draft("3", "")), None);
    assert_eq!(c.add_expense(draft("3", "Salary")), None);
    assert_eq!(c.add_expense(TransactionDraft::new("3", "Food").on("2024-13-40")), None);
    assert!(Arc::ptr_eq(&before, &c.snapshot()));

    assert_eq!(
        c.check_draft(Collection::Expenses, &draft("3", "Salary")),
        Err(ValidationError::UnknownCategory {
            kind: "expense".into(),
            name: "Salary".into()
        })
    );
    assert!(matches!(
        c.check_draft(Collection::Expenses, &draft("-1", "Food")),
        Err(ValidationError::NegativeAmount(_))
    ));
}

#[tokio::test]
async fn ids_are_unique_and_increasing() {
    let c = local_only();
    let ids: Vec<_> = (0..20)
        .map(|_| c.add_expense(draft("1", "Food")).unwrap())
        .collect();
    for pair in ids.windows(2) {
        let a: i64 = pair[0].as_str().parse().unwrap();
        let b: i64 = pair[1].as_str().parse().unwrap();
        assert!(b > a);
    }
    assert_eq!(c.snapshot().expenses.len(), 20);
}

#[tokio::test]
async fn delete_removes_only_the_matching_entry() {
    let c = local_only();
    let keep = c.add_income(draft("10", "Salary")).unwrap();
    let gone = c.add_income(draft("20", "Salary")).unwrap();

    assert!(c.delete_income(&gone));
    let ledger = c.snapshot();
    assert_eq!(ledger.incomes.len(), 1);
    assert_eq!(ledger.incomes[0].transaction.id, keep);
}

#[tokio::test]
async fn old_snapshots_do_not_change() {
    let c = local_only();
    let empty = c.snapshot();
    c.add_expense(draft("9", "Food")).unwrap();
    assert!(empty.expenses.is_empty());
    assert_eq!(c.snapshot().expenses.len(), 1);
}

#[tokio::test]
async fn subscribers_see_each_mutation() {
    let c = local_only();
    let mut rx = c.subscribe();
    c.add_expense(draft("9", "Food")).unwrap();
    assert!(rx.has_changed().unwrap());
    assert_eq!(rx.borrow_and_update().expenses.len(), 1);
    c.add_expense(draft("nope", "Food"));
    assert!(!rx.has_changed().unwrap());
}

#[tokio::test]
async fn mutations_are_mirrored_to_the_local_cache() {
    let cache = Arc::new(MemoryCache::new());
    {
        let c = SyncCoordinator::new(cache.clone(), None).unwrap();
        c.add_expense(draft("12.5", "Food").with_note("lunch")).unwrap();
        c.add_category(CategoryKind::Income, "Gifts");
    }
    let c = SyncCoordinator::new(cache.clone(), None).unwrap();
    let ledger = c.snapshot();
    assert_eq!(ledger.expenses[0].transaction.amount, dec!(12.5));
    assert_eq!(ledger.expenses[0].transaction.note.as_deref(), Some("lunch"));
    assert!(ledger.categories.contains(CategoryKind::Income, "Gifts"));
    assert_eq!(
        cache.load(LOCAL_NAMESPACE).unwrap().map(|c| c.ledger).as_ref(),
        Some(&*ledger)
    );
}

#[tokio::test]
async fn malformed_cache_starts_from_defaults() {
    let cache = Arc::new(MemoryCache::new());
    cache.insert_raw(LOCAL_NAMESPACE, "{ not json");
    let c = SyncCoordinator::new(cache, None).unwrap();
    assert_eq!(*c.snapshot(), Ledger::default());
}

#[tokio::test]
async fn local_only_coordinator_cannot_log_in() {
    let c = local_only();
    assert!(!c.has_remote());
    assert_eq!(c.login().await, ConnectionStatus::Unauthenticated);
    assert_eq!(c.bidirectional_sync().await, ConnectionStatus::Unauthenticated);
}

#[tokio::test]
async fn login_switches_to_the_users_ledger() {
    let remote = MemoryRemote::new("alice");
    remote.seed(
        RemoteCollection::Incomes,
        json!({
            "k1": {"id": 1, "amount": "100", "category": "Salary", "date": "2024-01-31"}
        }),
    );
    let (c, cache) = connected(&remote);
    c.add_expense(draft("3", "Food")).unwrap();

    assert_eq!(c.login().await, ConnectionStatus::Synced);
    assert_eq!(c.user_id().as_deref(), Some("alice"));

    let ledger = c.snapshot();
    assert!(ledger.expenses.is_empty());
    assert_eq!(ledger.incomes.len(), 1);
    assert_eq!(ledger.incomes[0].key.as_deref(), Some("k1"));
    assert!(cache.contains("alice"));
    assert_eq!(
        cache.load(LOCAL_NAMESPACE).unwrap().unwrap().ledger.expenses.len(),
        1
    );
}

#[tokio::test]
async fn pushed_records_get_their_backend_key() {
    let remote = MemoryRemote::new("alice");
    let (c, _) = connected(&remote);
    c.login().await;

    let id = c.add_expense(draft("42", "Food")).unwrap();
    c.wait_idle().await;

    let ledger = c.snapshot();
    let entry = ledger.find(Collection::Expenses, &id).unwrap();
    let key = entry.key.clone().expect("key attached after push");
    assert_eq!(
        remote.document(RemoteCollection::Expenses)[&key]["amount"],
        json!("42")
    );
    assert_eq!(c.status(), ConnectionStatus::Synced);
}

#[tokio::test]
async fn category_changes_reach_the_remote() {
    let remote = MemoryRemote::new("alice");
    let (c, _) = connected(&remote);
    c.login().await;

    let id = c.add_expense(draft("8", "Food")).unwrap();
    c.wait_idle().await;
    c.add_category(CategoryKind::Expense, "Pets");
    c.delete_category(CategoryKind::Expense, "Food");
    c.wait_idle().await;

    let categories = remote.document(RemoteCollection::Categories);
    let expense: Vec<String> = serde_json::from_value(categories["expense"].clone()).unwrap();
    assert!(expense.contains(&"Pets".to_string()));
    assert!(!expense.contains(&"Food".to_string()));
    let expenses = remote.document(RemoteCollection::Expenses);
    assert!(expenses.as_object().is_none_or(|m| m.is_empty()));
    assert!(c.snapshot().find(Collection::Expenses, &id).is_none());
}
