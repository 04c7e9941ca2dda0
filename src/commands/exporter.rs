// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::models::{Collection, Ledger};
use anyhow::{bail, Context, Result};
use serde_json::json;

pub fn handle(ledger: &Ledger, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("transactions", sub)) => export_transactions(ledger, sub),
        _ => Ok(()),
    }
}

fn export_transactions(ledger: &Ledger, sub: &clap::ArgMatches) -> Result<()> {
    let fmt = sub
        .get_one::<String>("format")
        .context("--format is required")?
        .to_lowercase();
    let out = sub.get_one::<String>("out").context("--out is required")?;

    let mut rows: Vec<_> = Collection::ALL
        .into_iter()
        .flat_map(|c| ledger.transactions(c).map(move |t| (c.category_kind(), t)))
        .collect();
    rows.sort_by(|a, b| a.1.date.cmp(&b.1.date).then_with(|| a.1.id.cmp(&b.1.id)));

    match fmt.as_str() {
        "csv" => {
            let mut wtr = csv::Writer::from_path(out)?;
            wtr.write_record(["type", "id", "date", "amount", "category", "note"])?;
            for (kind, t) in rows {
                let date = t.date.to_string();
                let amount = t.amount.to_string();
                wtr.write_record([
                    kind.as_str(),
                    t.id.as_str(),
                    date.as_str(),
                    amount.as_str(),
                    t.category.as_str(),
                    t.note.as_deref().unwrap_or_default(),
                ])?;
            }
            wtr.flush()?;
        }
        "json" => {
            let items: Vec<_> = rows
                .into_iter()
                .map(|(kind, t)| {
                    json!({
                        "type": kind, "id": t.id, "date": t.date, "amount": t.amount.to_string(),
                        "category": t.category, "note": t.note
                    })
                })
                .collect();
            std::fs::write(out, serde_json::to_string_pretty(&items)?)?;
        }
        _ => bail!("Unknown format: {} (use csv|json)", fmt),
    }
    println!("Exported transactions to {}", out);
    Ok(())
}
