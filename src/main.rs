// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use moneysync::config::{Config, RemoteKind};
use moneysync::db::{self, SqliteCache};
use moneysync::models::Collection;
use moneysync::remote::{RemoteBackend, RestRemote};
use moneysync::sync::SyncCoordinator;
use moneysync::{cli, commands};

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli::build_cli().get_matches();
    let config = Config::load(matches.get_one::<String>("config").map(Path::new))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let path = db::db_path(&config.data_dir()?)?;
    let cache = Arc::new(SqliteCache::open(&path)?);
    if let Some(("init", _)) = matches.subcommand() {
        println!("Database initialized at {}", path.display());
        return Ok(());
    }

    let remote: Option<Arc<dyn RemoteBackend>> = match config.remote.kind {
        RemoteKind::Rest => Some(Arc::new(RestRemote::new(config.remote.clone())?)),
        RemoteKind::None => None,
    };
    let coordinator = SyncCoordinator::new(cache, remote)?;
    if coordinator.has_remote() {
        let status = coordinator.login().await;
        info!("remote status after sign-in: {status}");
    }

    let result = run(&coordinator, &matches).await;
    coordinator.wait_idle().await;
    coordinator.logout().await;
    result
}

async fn run(coordinator: &SyncCoordinator, matches: &clap::ArgMatches) -> Result<()> {
    match matches.subcommand() {
        Some(("expense", sub)) => {
            commands::transactions::handle(coordinator, Collection::Expenses, sub)?
        }
        Some(("income", sub)) => {
            commands::transactions::handle(coordinator, Collection::Incomes, sub)?
        }
        Some(("category", sub)) => commands::categories::handle(coordinator, sub)?,
        Some(("report", sub)) => commands::reports::handle(&coordinator.snapshot(), sub)?,
        Some(("export", sub)) => commands::exporter::handle(&coordinator.snapshot(), sub)?,
        Some(("sync", sub)) => commands::sync::handle(coordinator, sub).await?,
        Some(("doctor", _)) => {
            commands::doctor::handle(&coordinator.snapshot(), coordinator.has_remote())?
        }
        _ => {
            cli::build_cli().print_help()?;
            println!();
        }
    }
    Ok(())
}
