// This file is part of guacplay, a Guacamole session recording player.
// Copyright (C) 2026 The guacplay Authors.
// SPDX-License-Identifier: GPL-3.0-or-later

use base::Error;
use bpaf::Bpaf;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing::{debug, error};

mod cmds;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// guacplay: Guacamole session recording player.
#[derive(Bpaf, Debug)]
#[bpaf(options, version(VERSION))]
enum Args {
    // See docstrings of `cmds::*::Args` structs for a description of the respective subcommands.
    Cat(#[bpaf(external(cmds::cat::args))] cmds::cat::Args),
    Info(#[bpaf(external(cmds::info::args))] cmds::info::Args),
    Play(#[bpaf(external(cmds::play::args))] cmds::play::Args),
}

impl Args {
    fn run(self) -> Result<i32, Error> {
        match self {
            Args::Cat(a) => cmds::cat::run(a),
            Args::Info(a) => cmds::info::run(a),
            Args::Play(a) => cmds::play::run(a),
        }
    }
}

fn main() {
    base::tracing_setup::install();

    // Get the program name from the OS (e.g. if invoked as `target/debug/gp`: `gp`),
    // falling back to the crate name if conversion to a path/UTF-8 string fails.
    let progname = std::env::args_os().next().map(PathBuf::from);
    let progname = progname
        .as_deref()
        .and_then(Path::file_name)
        .and_then(OsStr::to_str)
        .unwrap_or(env!("CARGO_PKG_NAME"));

    let args = match args()
        .fallback_to_usage()
        .run_inner(bpaf::Args::current_args().set_name(progname))
    {
        Ok(a) => a,
        Err(e) => std::process::exit(e.exit_code()),
    };
    tracing::trace!("Parsed command-line arguments: {args:#?}");

    match args.run() {
        Err(e) => {
            error!(err = %e.chain(), "exiting due to error");
            ::std::process::exit(1);
        }
        Ok(rv) => {
            debug!("exiting with status {}", rv);
            std::process::exit(rv)
        }
    }
}

#[cfg(test)]
mod tests {
    #[test]
    fn bpaf_invariants() {
        super::args().check_invariants(false);
    }
}
