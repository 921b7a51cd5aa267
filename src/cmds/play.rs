// This file is part of guacplay, a Guacamole session recording player.
// Copyright (C) 2026 The guacplay Authors.
// SPDX-License-Identifier: GPL-3.0-or-later

use async_trait::async_trait;
use base::time::Duration;
use base::{bail, Error};
use bpaf::Bpaf;
use session::player::Event;
use session::{Client, FileSource, Instruction, SessionRecording};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::info;

/// Plays a recording in real time against a counting display client.
#[derive(Bpaf, Debug)]
#[bpaf(command("play"))]
pub struct Args {
    /// Start position, as milliseconds or a [H:]MM:SS[.mmm] timecode.
    #[bpaf(long("start"), argument("POS"))]
    start: Option<Duration>,

    /// Path to the recording.
    #[bpaf(positional("FILE"))]
    file: PathBuf,
}

/// A headless display client: it only counts what it is asked to draw.
struct CountingClient(Arc<Mutex<u64>>);

#[async_trait]
impl Client for CountingClient {
    type State = u64;

    fn connect(&mut self) {}

    fn show_cursor(&mut self, _shown: bool) {}

    fn handle(&mut self, _instruction: &Instruction) {
        *self.0.lock().unwrap() += 1;
    }

    async fn export_state(&mut self) -> u64 {
        *self.0.lock().unwrap()
    }

    fn import_state(&mut self, state: &u64) {
        *self.0.lock().unwrap() = *state;
    }
}

pub fn run(args: Args) -> Result<i32, Error> {
    super::runtime()?.block_on(play(args))
}

async fn play(args: Args) -> Result<i32, Error> {
    let source = FileSource::open(&args.file)?;
    let instructions = Arc::new(Mutex::new(0));
    let (recording, mut events) =
        SessionRecording::new(source, CountingClient(instructions.clone()));

    // Index fully before starting so --start can bind to its frame.
    loop {
        match events.recv().await {
            Some(Event::Load) => break,
            Some(Event::Progress { .. }) => {}
            Some(Event::Error(e)) => return Err(e),
            Some(e) => bail!(Internal, msg("unexpected event before load: {e:?}")),
            None => bail!(Internal, msg("playback engine exited during load")),
        }
    }
    if recording.num_frames() == 0 {
        info!("recording has no frames");
        return Ok(0);
    }
    info!(
        frames = recording.num_frames(),
        duration = %recording.duration(),
        "loaded"
    );

    if let Some(start) = args.start {
        recording.seek(start).await;
    }
    recording.play().await;
    if !recording.is_playing() {
        // already at the last frame; there is nothing left to schedule
        info!(position = %recording.position(), "nothing further to play");
        return Ok(0);
    }
    while let Some(event) = events.recv().await {
        match event {
            Event::Seek { position, .. } => info!(%position, "frame"),
            Event::Pause => break,
            Event::Error(e) => return Err(e),
            _ => {}
        }
    }
    info!(
        position = %recording.position(),
        instructions = *instructions.lock().unwrap(),
        "finished"
    );
    Ok(0)
}
