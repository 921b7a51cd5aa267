// This file is part of guacplay, a Guacamole session recording player.
// Copyright (C) 2026 The guacplay Authors.
// SPDX-License-Identifier: GPL-3.0-or-later

use base::{bail, err, Error};
use bpaf::Bpaf;
use session::index::BLOCK_SIZE;
use session::parser::Parser;
use std::path::PathBuf;

/// Decodes a recording and dumps each instruction with its byte offset.
#[derive(Bpaf, Debug)]
#[bpaf(command("cat"))]
pub struct Args {
    /// Only dump instructions with this opcode (e.g. `sync`).
    #[bpaf(long("opcode"), argument("OP"))]
    opcode: Option<String>,

    /// Path to the recording.
    #[bpaf(positional("FILE"))]
    file: PathBuf,
}

pub fn run(args: Args) -> Result<i32, Error> {
    let data = std::fs::read(&args.file)
        .map_err(|e| err!(NotFound, msg("unable to read {}", args.file.display()), source(e)))?;
    let mut parser = Parser::new(0);
    let mut start = 0;
    for chunk in data.chunks(BLOCK_SIZE as usize) {
        parser.feed(chunk)?;
        while let Some((instruction, end)) = parser.pop() {
            if args
                .opcode
                .as_deref()
                .map_or(true, |o| o == instruction.opcode)
            {
                print!("{start:>10} {}", instruction.opcode);
                for arg in &instruction.args {
                    print!(" {arg:?}");
                }
                println!();
            }
            start = end;
        }
    }
    if !parser.is_idle() {
        bail!(DataLoss, msg("recording ends mid-instruction"));
    }
    Ok(0)
}
