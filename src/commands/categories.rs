// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::models::CategoryKind;
use crate::sync::SyncCoordinator;
use crate::utils::{maybe_print_json, pretty_table};
use anyhow::{anyhow, bail, Context, Result};
use serde::Serialize;

#[derive(Serialize)]
struct CategoryRow {
    kind: CategoryKind,
    name: String,
}

fn kind_arg(sub: &clap::ArgMatches) -> Result<Option<CategoryKind>> {
    sub.get_one::<String>("type")
        .map(|t| t.parse::<CategoryKind>().map_err(|e| anyhow!(e)))
        .transpose()
}

pub fn handle(coordinator: &SyncCoordinator, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("add", sub)) => {
            let kind = kind_arg(sub)?.context("--type is required")?;
            let name = sub.get_one::<String>("name").context("--name is required")?;
            if coordinator.add_category(kind, name) {
                println!("Added {} category '{}'", kind, name.trim());
            } else {
                println!("{} category '{}' already exists", kind, name.trim());
            }
        }
        Some(("list", sub)) => {
            let filter = kind_arg(sub)?;
            let ledger = coordinator.snapshot();
            let data: Vec<CategoryRow> = [CategoryKind::Expense, CategoryKind::Income]
                .into_iter()
                .filter(|k| filter.is_none_or(|f| f == *k))
                .flat_map(|kind| {
                    ledger
                        .categories
                        .get(kind)
                        .iter()
                        .map(move |name| CategoryRow {
                            kind,
                            name: name.clone(),
                        })
                })
                .collect();
            if !maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &data)? {
                let rows = data
                    .iter()
                    .map(|r| vec![r.kind.to_string(), r.name.clone()])
                    .collect();
                println!("{}", pretty_table(&["Type", "Category"], rows));
            }
        }
        Some(("rm", sub)) => {
            let kind = kind_arg(sub)?.context("--type is required")?;
            let name = sub.get_one::<String>("name").context("--name is required")?;
            let affected = coordinator
                .snapshot()
                .transactions(kind.collection())
                .filter(|t| &t.category == name)
                .count();
            if !coordinator.delete_category(kind, name) {
                bail!("No {} category named '{}'", kind, name);
            }
            println!(
                "Removed {} category '{}' and {} {}",
                kind,
                name,
                affected,
                kind.collection()
            );
        }
        _ => {}
    }
    Ok(())
}
