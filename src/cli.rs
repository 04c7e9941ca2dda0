// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use clap::{crate_version, value_parser, Arg, ArgAction, Command};

fn json_flags(cmd: Command) -> Command {
    cmd.arg(
        Arg::new("json")
            .long("json")
            .action(ArgAction::SetTrue)
            .help("Print as pretty JSON"),
    )
    .arg(
        Arg::new("jsonl")
            .long("jsonl")
            .action(ArgAction::SetTrue)
            .conflicts_with("json")
            .help("Print one JSON object per line"),
    )
}

fn transaction_cmd(name: &'static str, about: &'static str) -> Command {
    Command::new(name)
        .about(about)
        .subcommand_required(true)
        .subcommand(
            Command::new("add")
                .about("Record a new entry")
                .arg(Arg::new("amount").long("amount").required(true))
                .arg(Arg::new("category").long("category").required(true))
                .arg(
                    Arg::new("date")
                        .long("date")
                        .help("YYYY-MM-DD, defaults to today"),
                )
                .arg(Arg::new("note").long("note")),
        )
        .subcommand(json_flags(
            Command::new("list")
                .about("List entries, newest first")
                .arg(Arg::new("month").long("month").help("YYYY-MM"))
                .arg(Arg::new("category").long("category"))
                .arg(
                    Arg::new("limit")
                        .long("limit")
                        .value_parser(value_parser!(usize)),
                ),
        ))
        .subcommand(
            Command::new("rm")
                .about("Delete an entry by id")
                .arg(Arg::new("id").long("id").required(true)),
        )
}

fn category_kind_arg() -> Arg {
    Arg::new("type")
        .long("type")
        .required(true)
        .value_parser(["expense", "income"])
}

pub fn build_cli() -> Command {
    Command::new("moneysync")
        .version(crate_version!())
        .about("Local-first expense and income tracker with cloud sync")
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .help("Path to moneysync.toml"),
        )
        .subcommand(Command::new("init").about("Create the local database"))
        .subcommand(transaction_cmd("expense", "Manage expenses"))
        .subcommand(transaction_cmd("income", "Manage incomes"))
        .subcommand(
            Command::new("category")
                .about("Manage categories")
                .subcommand_required(true)
                .subcommand(
                    Command::new("add")
                        .arg(category_kind_arg())
                        .arg(Arg::new("name").long("name").required(true)),
                )
                .subcommand(json_flags(
                    Command::new("list").arg(
                        Arg::new("type")
                            .long("type")
                            .value_parser(["expense", "income"]),
                    ),
                ))
                .subcommand(
                    Command::new("rm")
                        .about("Delete a category and every entry filed under it")
                        .arg(category_kind_arg())
                        .arg(Arg::new("name").long("name").required(true)),
                ),
        )
        .subcommand(
            Command::new("report")
                .about("Dashboard reports")
                .subcommand_required(true)
                .subcommand(json_flags(
                    Command::new("summary").about("Totals and balance"),
                ))
                .subcommand(json_flags(
                    Command::new("by-category")
                        .about("Totals per category")
                        .arg(
                            Arg::new("type")
                                .long("type")
                                .value_parser(["expense", "income"]),
                        ),
                )),
        )
        .subcommand(
            Command::new("export")
                .about("Export data")
                .subcommand_required(true)
                .subcommand(
                    Command::new("transactions")
                        .arg(Arg::new("format").long("format").required(true))
                        .arg(Arg::new("out").long("out").required(true)),
                ),
        )
        .subcommand(
            Command::new("sync")
                .about("Cloud sync")
                .subcommand_required(true)
                .subcommand(Command::new("now").about("Push local data, then pull"))
                .subcommand(json_flags(
                    Command::new("status").about("Show connection state"),
                )),
        )
        .subcommand(Command::new("doctor").about("Check ledger consistency"))
}
