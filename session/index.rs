// This file is part of guacplay, a Guacamole session recording player.
// Copyright (C) 2026 The guacplay Authors.
// SPDX-License-Identifier: GPL-3.0-or-later

//! Frame indexing: splitting the instruction stream on `sync` boundaries
//! and flagging keyframe candidates for sublinear seeking.

use crate::parser::Parser;
use base::time::{Duration, Timestamp};
use base::{err, Error};
use tracing::trace;

/// Ingest chunk size, in bytes.
pub const BLOCK_SIZE: u64 = 262_144;

/// Minimum gap between consecutive keyframe candidates, in bytes of
/// instruction stream.
pub const KEYFRAME_CHAR_INTERVAL: u64 = 16_384;

/// Minimum gap between consecutive keyframe candidates, in recording time.
pub const KEYFRAME_TIME_INTERVAL: Duration = Duration(5_000);

const SYNC: &str = "sync";

/// One indexed frame: the instructions in `[start, end)` produce it, and
/// the `sync` terminating it carries `timestamp`.
#[derive(Debug)]
pub struct Frame<S> {
    pub timestamp: Timestamp,
    pub start: u64,
    pub end: u64,
    /// Whether this frame may carry a state snapshot. Frame 0 always may;
    /// later frames only when both keyframe intervals have elapsed.
    pub keyframe: bool,
    /// Display-client snapshot, captured lazily on first replay of a
    /// keyframe-eligible frame. Present implies `keyframe`.
    pub state: Option<S>,
}

/// The ordered, append-only frame table of one recording.
pub struct FrameIndex<S> {
    frames: Vec<Frame<S>>,
    last_keyframe: usize,
}

impl<S> Default for FrameIndex<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> FrameIndex<S> {
    pub fn new() -> Self {
        FrameIndex {
            frames: Vec::new(),
            last_keyframe: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn get(&self, i: usize) -> Option<&Frame<S>> {
        self.frames.get(i)
    }

    pub fn frames(&self) -> &[Frame<S>] {
        &self.frames
    }

    /// Span from the first to the last indexed frame. Grows monotonically
    /// while ingest proceeds.
    pub fn duration(&self) -> Duration {
        match (self.frames.first(), self.frames.last()) {
            (Some(first), Some(last)) => last.timestamp - first.timestamp,
            _ => Duration::ZERO,
        }
    }

    /// Converts a frame timestamp to an offset from the first frame.
    pub fn relative(&self, timestamp: Timestamp) -> Duration {
        self.frames
            .first()
            .map_or(Duration::ZERO, |f| timestamp - f.timestamp)
    }

    /// Stores a display-state snapshot on a keyframe-eligible frame.
    pub fn set_state(&mut self, i: usize, state: S) {
        let frame = &mut self.frames[i];
        debug_assert!(frame.keyframe, "only keyframe-eligible frames carry state");
        frame.state = Some(state);
    }

    /// Appends the frame terminated by a `sync` with the given timestamp,
    /// whose instructions end at byte offset `end`.
    pub fn push(&mut self, timestamp: Timestamp, end: u64) {
        let start = self.frames.last().map_or(0, |f| f.end);
        let keyframe = if self.frames.is_empty() {
            true
        } else {
            let last = &self.frames[self.last_keyframe];
            end - last.start >= KEYFRAME_CHAR_INTERVAL
                && timestamp - last.timestamp >= KEYFRAME_TIME_INTERVAL
        };
        if keyframe {
            self.last_keyframe = self.frames.len();
        }
        self.frames.push(Frame {
            timestamp,
            start,
            end,
            keyframe,
            state: None,
        });
    }

    /// Finds the indexed frame whose timestamp is nearest to `position`
    /// (an offset from the first frame). Ties go to the earlier frame.
    pub fn find(&self, position: Duration) -> Option<usize> {
        let first = self.frames.first()?;
        let target = first.timestamp + position;
        let i = self.frames.partition_point(|f| f.timestamp < target);
        if i == 0 {
            return Some(0);
        }
        if i == self.frames.len() {
            return Some(i - 1);
        }
        let before = target - self.frames[i - 1].timestamp;
        let after = self.frames[i].timestamp - target;
        Some(if after < before { i } else { i - 1 })
    }
}

/// Progress note for one newly indexed frame.
#[derive(Clone, Copy, Debug)]
pub struct Progress {
    /// Indexed duration so far (the new frame's offset from frame 0).
    pub duration: Duration,
    /// Byte offset just past the new frame's terminating `sync`.
    pub parsed: u64,
}

/// Drives the wire parser over the blob, one chunk at a time, appending
/// a frame per `sync` instruction.
pub struct Indexer {
    parser: Parser,
}

impl Default for Indexer {
    fn default() -> Self {
        Self::new()
    }
}

impl Indexer {
    pub fn new() -> Self {
        Indexer {
            parser: Parser::new(0),
        }
    }

    /// Feeds one chunk of the blob. Frames completed by this chunk are
    /// appended to `index`, with one [`Progress`] per frame; frames that
    /// completed before a mid-chunk parse error are kept, and no partial
    /// frame is ever appended.
    pub fn ingest<S>(
        &mut self,
        data: &[u8],
        index: &mut FrameIndex<S>,
    ) -> (Vec<Progress>, Result<(), Error>) {
        let mut error = self.parser.feed(data).err();
        let mut progress = Vec::new();
        while let Some((instruction, end)) = self.parser.pop() {
            if instruction.opcode != SYNC {
                continue;
            }
            match sync_timestamp(&instruction) {
                Ok(timestamp) => {
                    index.push(timestamp, end);
                    trace!(%timestamp, end, frames = index.len(), "indexed frame");
                    progress.push(Progress {
                        duration: index.duration(),
                        parsed: end,
                    });
                }
                Err(e) => {
                    // a bad sync poisons everything after it
                    while self.parser.pop().is_some() {}
                    error.get_or_insert(e);
                }
            }
        }
        (progress, error.map_or(Ok(()), Err))
    }
}

fn sync_timestamp(instruction: &crate::parser::Instruction) -> Result<Timestamp, Error> {
    let arg = instruction
        .args
        .first()
        .ok_or_else(|| err!(DataLoss, msg("sync instruction is missing its timestamp")))?;
    let ms = arg
        .parse::<i64>()
        .map_err(|_| err!(DataLoss, msg("bad sync timestamp {arg:?}")))?;
    Ok(Timestamp(ms))
}
