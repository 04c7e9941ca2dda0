// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

mod common;

use moneysync::commands::{doctor, transactions};
use moneysync::models::{Collection, LedgerEntry, Transaction, TransactionDraft, TransactionId};
use moneysync::sync::SyncCoordinator;
use moneysync::cli;
use chrono::NaiveDate;
use rust_decimal_macros::dec;

fn setup() -> SyncCoordinator {
    let c = common::local_only();
    for i in 1..=3 {
        c.add_expense(TransactionDraft::new("10", "Food").on(format!("2025-01-0{}", i)))
            .unwrap();
    }
    c.add_expense(TransactionDraft::new("99", "Transport").on("2025-02-14"))
        .unwrap();
    c
}

fn list_matches(args: &[&str]) -> clap::ArgMatches {
    let mut argv = vec!["moneysync", "expense", "list"];
    argv.extend_from_slice(args);
    let matches = cli::build_cli().get_matches_from(argv);
    match matches.subcommand() {
        Some(("expense", m)) => match m.subcommand() {
            Some(("list", list_m)) => list_m.clone(),
            _ => panic!("no list subcommand"),
        },
        _ => panic!("no expense subcommand"),
    }
}

#[tokio::test]
async fn list_limit_respected() {
    let c = setup();
    let rows = transactions::query_rows(&c.snapshot(), Collection::Expenses, &list_matches(&["--limit", "2"]))
        .unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].date, "2025-02-14");
    assert_eq!(rows[1].date, "2025-01-03");
}

#[tokio::test]
async fn list_filters_by_month_and_category() {
    let c = setup();
    let ledger = c.snapshot();
    let january = transactions::query_rows(&ledger, Collection::Expenses, &list_matches(&["--month", "2025-01"]))
        .unwrap();
    assert_eq!(january.len(), 3);
    assert!(january.iter().all(|r| r.category == "Food" && r.amount == "10.00"));

    let transport = transactions::query_rows(&ledger, Collection::Expenses, &list_matches(&["--category", "Transport"]))
        .unwrap();
    assert_eq!(transport.len(), 1);
    assert!(!transport[0].synced);

    assert!(transactions::query_rows(&ledger, Collection::Expenses, &list_matches(&["--month", "2025-13"])).is_err());
}

#[tokio::test]
async fn add_and_rm_through_the_cli() {
    let c = common::local_only();
    let matches = cli::build_cli().get_matches_from([
        "moneysync", "income", "add", "--amount", "1200.50", "--category", "Salary", "--date", "2025-03-01",
    ]);
    let Some(("income", m)) = matches.subcommand() else {
        panic!("no income subcommand");
    };
    transactions::handle(&c, Collection::Incomes, m).unwrap();
    let ledger = c.snapshot();
    assert_eq!(ledger.incomes.len(), 1);
    assert_eq!(ledger.incomes[0].transaction.amount, dec!(1200.50));

    let id = ledger.incomes[0].transaction.id.to_string();
    let matches = cli::build_cli().get_matches_from(["moneysync", "income", "rm", "--id", &id]);
    let Some(("income", m)) = matches.subcommand() else {
        panic!("no income subcommand");
    };
    transactions::handle(&c, Collection::Incomes, m).unwrap();
    assert!(c.snapshot().incomes.is_empty());

    // Removing it again reports the missing id.
    assert!(transactions::handle(&c, Collection::Incomes, m).is_err());
}

#[tokio::test]
async fn add_with_unknown_category_is_an_error() {
    let c = common::local_only();
    let matches = cli::build_cli().get_matches_from([
        "moneysync", "expense", "add", "--amount", "5", "--category", "Salary",
    ]);
    let Some(("expense", m)) = matches.subcommand() else {
        panic!("no expense subcommand");
    };
    let err = transactions::handle(&c, Collection::Expenses, m).unwrap_err();
    assert!(format!("{err:#}").contains("unknown expense category 'Salary'"));
    assert!(c.snapshot().expenses.is_empty());
}

#[test]
fn doctor_reports_orphans_duplicates_and_unsynced() {
    let tx = |id: i64, category: &str| Transaction {
        id: TransactionId::from(id),
        amount: dec!(1),
        category: category.into(),
        date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
        note: None,
    };
    let mut ledger = moneysync::models::Ledger::default();
    ledger.expenses.push(LedgerEntry::keyed("k1", tx(1, "Food")));
    ledger.expenses.push(LedgerEntry::keyed("k2", tx(1, "Food")));
    ledger.expenses.push(LedgerEntry::local(tx(2, "Vanished")));

    let issues: Vec<String> = doctor::diagnose(&ledger, true)
        .into_iter()
        .map(|row| row[0].clone())
        .collect();
    assert_eq!(issues, ["orphaned_category", "duplicate_id", "unsynced"]);

    let local_only: Vec<_> = doctor::diagnose(&ledger, false);
    assert_eq!(local_only.len(), 2);
    assert!(doctor::diagnose(&moneysync::models::Ledger::default(), true).is_empty());
}

#[test]
fn same_day_rows_order_by_numeric_id() {
    let tx = |id: i64| Transaction {
        id: TransactionId::from(id),
        amount: dec!(1),
        category: "Food".into(),
        date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
        note: None,
    };
    let mut ledger = moneysync::models::Ledger::default();
    for id in [999, 1000, 50] {
        ledger.expenses.push(LedgerEntry::local(tx(id)));
    }
    let rows = transactions::query_rows(&ledger, Collection::Expenses, &list_matches(&[])).unwrap();
    let ids: Vec<&str> = rows.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, ["1000", "999", "50"]);
}
