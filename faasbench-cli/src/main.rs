// Copyright (c) 2020-present, UMD Database Group.
//
// This program is free software: you can use, redistribute, and/or modify
// it under the terms of the GNU Affero General Public License, version 3
// or later ("AGPL"), as published by the Free Software Foundation.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or
// FITNESS FOR A PARTICULAR PURPOSE.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <http://www.gnu.org/licenses/>.


//! The faasbench command line: invokes functions, drives load experiments and
//! stages inputs in the object store.

mod args;
mod bench;
mod invoke;
mod storage;

use anyhow::{bail, Result};
use clap::{crate_version, Command};

fn cli() -> Command<'static> {
    Command::new("faasbench")
        .version(crate_version!())
        .about("Command line controller for faasbench functions")
        .author("UMD Database Group")
        .args(args::get_args())
        .subcommand_required(true)
        .subcommand(invoke::command_args())
        .subcommand(bench::command_args())
        .subcommand(storage::command_args())
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli().get_matches();
    let (command, matches) = match matches.subcommand() {
        Some(subcommand) => subcommand,
        None => bail!(cli().render_usage()),
    };
    // Global flags are propagated down to the subcommand.
    args::get_logging(matches)?.init();

    match command {
        "invoke" => invoke::command(matches).await,
        "bench" => bench::command(matches).await,
        "storage" => storage::command(matches).await,
        _ => bail!(cli().render_usage()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_is_well_formed() {
        cli().debug_assert();
    }

    #[test]
    fn global_flags_reach_subcommands() {
        let matches = cli()
            .try_get_matches_from(["faasbench", "invoke", "localhost:50051", "--silent"])
            .unwrap();
        let (_, matches) = matches.subcommand().unwrap();
        assert_eq!(log::LevelFilter::Off, args::get_level(matches));
    }
}
