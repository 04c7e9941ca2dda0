// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::models::{Collection, Ledger, TransactionDraft, TransactionId};
use crate::sync::SyncCoordinator;
use crate::utils::{fmt_money, maybe_print_json, parse_month, pretty_table};
use anyhow::{bail, Context, Result};
use serde::Serialize;

pub fn handle(coordinator: &SyncCoordinator, collection: Collection, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("add", sub)) => add(coordinator, collection, sub)?,
        Some(("list", sub)) => list(coordinator, collection, sub)?,
        Some(("rm", sub)) => rm(coordinator, collection, sub)?,
        _ => {}
    }
    Ok(())
}

fn singular(collection: Collection) -> &'static str {
    collection.category_kind().as_str()
}

fn add(coordinator: &SyncCoordinator, collection: Collection, sub: &clap::ArgMatches) -> Result<()> {
    let amount = sub.get_one::<String>("amount").context("--amount is required")?;
    let category = sub.get_one::<String>("category").context("--category is required")?;
    let mut draft = TransactionDraft::new(amount, category);
    if let Some(date) = sub.get_one::<String>("date") {
        draft = draft.on(date);
    }
    if let Some(note) = sub.get_one::<String>("note") {
        draft = draft.with_note(note);
    }

    coordinator
        .check_draft(collection, &draft)
        .with_context(|| format!("Cannot record {}", singular(collection)))?;
    let Some(id) = coordinator.add_transaction(collection, draft) else {
        bail!("{} was not recorded", singular(collection));
    };
    let ledger = coordinator.snapshot();
    if let Some(entry) = ledger.find(collection, &id) {
        let t = &entry.transaction;
        println!(
            "Recorded {} {} in '{}' on {} (id {})",
            singular(collection),
            fmt_money(&t.amount),
            t.category,
            t.date,
            id
        );
    }
    Ok(())
}

fn rm(coordinator: &SyncCoordinator, collection: Collection, sub: &clap::ArgMatches) -> Result<()> {
    let id = TransactionId::from(sub.get_one::<String>("id").context("--id is required")?.as_str());
    if !coordinator.delete_transaction(collection, &id) {
        bail!("No {} with id {}", singular(collection), id);
    }
    println!("Removed {} {}", singular(collection), id);
    Ok(())
}

fn list(coordinator: &SyncCoordinator, collection: Collection, sub: &clap::ArgMatches) -> Result<()> {
    let json_flag = sub.get_flag("json");
    let jsonl_flag = sub.get_flag("jsonl");
    let data = query_rows(&coordinator.snapshot(), collection, sub)?;
    if !maybe_print_json(json_flag, jsonl_flag, &data)? {
        let rows: Vec<Vec<String>> = data
            .iter()
            .map(|r| {
                vec![
                    r.id.clone(),
                    r.date.clone(),
                    r.amount.clone(),
                    r.category.clone(),
                    r.note.clone(),
                    if r.synced { "yes".into() } else { "no".into() },
                ]
            })
            .collect();
        println!(
            "{}",
            pretty_table(&["Id", "Date", "Amount", "Category", "Note", "Synced"], rows)
        );
    }
    Ok(())
}

#[derive(Serialize)]
pub struct TransactionRow {
    pub id: String,
    pub date: String,
    pub amount: String,
    pub category: String,
    pub note: String,
    pub synced: bool,
}

/// Rows of `collection` filtered by the `list` flags, newest first.
pub fn query_rows(
    ledger: &Ledger,
    collection: Collection,
    sub: &clap::ArgMatches,
) -> Result<Vec<TransactionRow>> {
    let month = match sub.get_one::<String>("month") {
        Some(m) => Some(parse_month(m)?),
        None => None,
    };
    let category = sub.get_one::<String>("category");

    let mut entries: Vec<_> = ledger
        .entries(collection)
        .iter()
        .filter(|e| {
            month
                .as_deref()
                .is_none_or(|m| e.transaction.date.format("%Y-%m").to_string() == m)
        })
        .filter(|e| category.is_none_or(|c| &e.transaction.category == c))
        .collect();
    entries.sort_by(|a, b| {
        b.transaction
            .date
            .cmp(&a.transaction.date)
            .then_with(|| b.transaction.id.cmp(&a.transaction.id))
    });
    if let Some(limit) = sub.get_one::<usize>("limit") {
        entries.truncate(*limit);
    }

    Ok(entries
        .into_iter()
        .map(|e| TransactionRow {
            id: e.transaction.id.to_string(),
            date: e.transaction.date.to_string(),
            amount: fmt_money(&e.transaction.amount),
            category: e.transaction.category.clone(),
            note: e.transaction.note.clone().unwrap_or_default(),
            synced: e.key.is_some(),
        })
        .collect())
}
