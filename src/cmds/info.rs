// This file is part of guacplay, a Guacamole session recording player.
// Copyright (C) 2026 The guacplay Authors.
// SPDX-License-Identifier: GPL-3.0-or-later

use base::time::Duration;
use base::Error;
use bpaf::Bpaf;
use serde::Serialize;
use session::index::{FrameIndex, Indexer, BLOCK_SIZE};
use session::{FileSource, Source};
use std::path::PathBuf;

/// Indexes a recording and prints a summary.
#[derive(Bpaf, Debug)]
#[bpaf(command("info"))]
pub struct Args {
    /// Print the summary as JSON.
    #[bpaf(long("json"), switch)]
    json: bool,

    /// Path to the recording.
    #[bpaf(positional("FILE"))]
    file: PathBuf,
}

#[derive(Serialize)]
struct Summary {
    bytes: u64,
    frames: usize,
    keyframes: usize,
    duration_ms: i64,
}

pub fn run(args: Args) -> Result<i32, Error> {
    let rt = super::runtime()?;
    let source = FileSource::open(&args.file)?;
    let index = rt.block_on(build_index(&source))?;
    let summary = Summary {
        bytes: source.len(),
        frames: index.len(),
        keyframes: index.frames().iter().filter(|f| f.keyframe).count(),
        duration_ms: index.duration().millis(),
    };
    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&summary).expect("summary serializes")
        );
    } else {
        println!(
            "{}: {} frames ({} keyframe-eligible), {} over {} bytes",
            args.file.display(),
            summary.frames,
            summary.keyframes,
            Duration(summary.duration_ms),
            summary.bytes,
        );
    }
    Ok(0)
}

async fn build_index(source: &FileSource) -> Result<FrameIndex<()>, Error> {
    let mut indexer = Indexer::new();
    let mut index = FrameIndex::new();
    let mut pos = 0;
    while pos < source.len() {
        let end = source.len().min(pos + BLOCK_SIZE);
        let data = source.read(pos..end).await?;
        pos = end;
        let (_, result) = indexer.ingest(&data, &mut index);
        result?;
    }
    Ok(index)
}
