// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::models::{CategoryKind, Ledger};
use crate::summary::Summary;
use crate::utils::{fmt_money, maybe_print_json, pretty_table};
use anyhow::{anyhow, Result};

pub fn handle(ledger: &Ledger, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("summary", sub)) => summary(ledger, sub)?,
        Some(("by-category", sub)) => by_category(ledger, sub)?,
        _ => {}
    }
    Ok(())
}

fn summary(ledger: &Ledger, sub: &clap::ArgMatches) -> Result<()> {
    let s = Summary::from_ledger(ledger);
    if !maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &s)? {
        let rows = vec![
            vec!["Income".into(), fmt_money(&s.total_income)],
            vec!["Expenses".into(), fmt_money(&s.total_expenses)],
            vec!["Balance".into(), fmt_money(&s.balance)],
        ];
        println!("{}", pretty_table(&["", "Total"], rows));
    }
    Ok(())
}

fn by_category(ledger: &Ledger, sub: &clap::ArgMatches) -> Result<()> {
    let kind = sub
        .get_one::<String>("type")
        .map(|t| t.parse::<CategoryKind>().map_err(|e| anyhow!(e)))
        .transpose()?;
    let data: Vec<_> = Summary::from_ledger(ledger)
        .by_category
        .into_iter()
        .filter(|c| kind.is_none_or(|k| k == c.kind))
        .collect();
    if !maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &data)? {
        let rows = data
            .iter()
            .map(|c| {
                vec![
                    c.kind.to_string(),
                    c.category.clone(),
                    c.count.to_string(),
                    fmt_money(&c.total),
                ]
            })
            .collect();
        println!(
            "{}",
            pretty_table(&["Type", "Category", "Entries", "Total"], rows)
        );
    }
    Ok(())
}
