// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::models::Collection;
use crate::sync::{ConnectionStatus, SyncCoordinator};
use crate::utils::{maybe_print_json, pretty_table};
use anyhow::{bail, Result};
use serde::Serialize;

#[derive(Serialize)]
pub struct StatusReport {
    pub status: ConnectionStatus,
    pub user: Option<String>,
    pub live_feeds: Vec<String>,
    pub unsynced: usize,
    pub pending_deletes: usize,
}

pub fn status_report(coordinator: &SyncCoordinator) -> StatusReport {
    let ledger = coordinator.snapshot();
    StatusReport {
        status: coordinator.status(),
        user: coordinator.user_id(),
        live_feeds: coordinator
            .live_collections()
            .into_iter()
            .map(|c| c.to_string())
            .collect(),
        unsynced: Collection::ALL
            .into_iter()
            .map(|c| ledger.entries(c).iter().filter(|e| e.key.is_none()).count())
            .sum(),
        pending_deletes: coordinator.outbox().deletes.len(),
    }
}

pub async fn handle(coordinator: &SyncCoordinator, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("now", _)) => {
            if !coordinator.has_remote() {
                bail!("No remote configured; set [remote] kind in moneysync.toml");
            }
            if coordinator.status() == ConnectionStatus::Disconnected {
                coordinator.reconnect().await;
            } else {
                coordinator.bidirectional_sync().await;
            }
            coordinator.wait_idle().await;
            match coordinator.status() {
                ConnectionStatus::Synced => println!("Synced"),
                other => bail!("Sync did not complete (status: {})", other),
            }
        }
        Some(("status", sub)) => {
            let report = status_report(coordinator);
            if !maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &report)? {
                let rows = vec![
                    vec!["Status".into(), report.status.to_string()],
                    vec!["User".into(), report.user.clone().unwrap_or_else(|| "-".into())],
                    vec!["Live feeds".into(), report.live_feeds.join(", ")],
                    vec!["Unsynced records".into(), report.unsynced.to_string()],
                    vec!["Pending deletes".into(), report.pending_deletes.to_string()],
                ];
                println!("{}", pretty_table(&["", ""], rows));
            }
        }
        _ => {}
    }
    Ok(())
}
