// This file is part of guacplay, a Guacamole session recording player.
// Copyright (C) 2026 The guacplay Authors.
// SPDX-License-Identifier: GPL-3.0-or-later

//! Millisecond timestamps and durations for recorded sessions.

use crate::{bail, err, Error};
use nom::bytes::complete::{tag, take_while1, take_while_m_n};
use nom::combinator::{all_consuming, map, map_res, opt};
use nom::sequence::{preceded, tuple};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops;
use std::str::FromStr;

type IResult<'a, I, O> = nom::IResult<I, O, nom::error::VerboseError<&'a str>>;

pub const MILLIS_PER_SEC: i64 = 1_000;

/// A recording-time instant in milliseconds, as carried by the single
/// argument of a `sync` instruction. The epoch is whatever the capturing
/// server used; only differences are meaningful.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Ord, PartialEq, PartialOrd, Serialize)]
pub struct Timestamp(pub i64);

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl ops::Sub for Timestamp {
    type Output = Duration;
    fn sub(self, rhs: Timestamp) -> Duration {
        Duration(self.0 - rhs.0)
    }
}

impl ops::Add<Duration> for Timestamp {
    type Output = Timestamp;
    fn add(self, rhs: Duration) -> Timestamp {
        Timestamp(self.0 + rhs.0)
    }
}

/// A span between two recording timestamps, in milliseconds.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Ord, PartialEq, PartialOrd, Serialize)]
pub struct Duration(pub i64);

impl Duration {
    pub const ZERO: Duration = Duration(0);

    pub fn millis(self) -> i64 {
        self.0
    }

    /// Converts to a `std::time::Duration`, saturating negative spans to
    /// zero. This is the clamp the playback scheduler relies on when a
    /// frame's deadline has already passed.
    pub fn to_std(self) -> std::time::Duration {
        std::time::Duration::from_millis(self.0.max(0) as u64)
    }
}

impl ops::Add for Duration {
    type Output = Duration;
    fn add(self, rhs: Duration) -> Duration {
        Duration(self.0 + rhs.0)
    }
}

impl ops::Sub for Duration {
    type Output = Duration;
    fn sub(self, rhs: Duration) -> Duration {
        Duration(self.0 - rhs.0)
    }
}

/// Formats as a `H:MM:SS` timecode, with a `.mmm` suffix when the span
/// isn't a whole number of seconds.
impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ms = self.0;
        if ms < 0 {
            write!(f, "-")?;
            ms = -ms;
        }
        let hours = ms / 3_600_000;
        let mins = (ms / 60_000) % 60;
        let secs = (ms / MILLIS_PER_SEC) % 60;
        let frac = ms % MILLIS_PER_SEC;
        write!(f, "{hours}:{mins:02}:{secs:02}")?;
        if frac != 0 {
            write!(f, ".{frac:03}")?;
        }
        Ok(())
    }
}

/// Parses a 1–3 digit fraction, scaled to milliseconds (`.2` == 200 ms).
fn parse_frac(input: &str) -> IResult<'_, &str, i64> {
    map(
        take_while_m_n(1, 3, |c: char| c.is_ascii_digit()),
        |digits: &str| {
            let scale = 10_i64.pow(3 - digits.len() as u32);
            digits.parse::<i64>().expect("1-3 ascii digits") * scale
        },
    )(input)
}

fn parse_num(input: &str) -> IResult<'_, &str, i64> {
    map_res(take_while1(|c: char| c.is_ascii_digit()), |s: &str| {
        s.parse::<i64>()
    })(input)
}

/// Parses `[H:]MM:SS[.mmm]` into milliseconds.
fn parse_timecode(input: &str) -> IResult<'_, &str, i64> {
    map(
        tuple((
            parse_num,
            preceded(tag(":"), parse_num),
            opt(preceded(tag(":"), parse_num)),
            opt(preceded(tag("."), parse_frac)),
        )),
        |(first, second, third, frac)| {
            let (h, m, s) = match third {
                Some(third) => (first, second, third),
                None => (0, first, second),
            };
            (h * 3600 + m * 60 + s) * MILLIS_PER_SEC + frac.unwrap_or(0)
        },
    )(input)
}

impl Duration {
    /// Parses a duration as either raw milliseconds or a `[H:]MM:SS[.mmm]`
    /// timecode. E.g.: `90500`, `1:30`, `0:01:30.500`.
    pub fn parse(input: &str) -> Result<Self, Error> {
        if let Ok(ms) = i64::from_str(input) {
            if ms < 0 {
                bail!(InvalidArgument, msg("negative duration {input:?}"));
            }
            return Ok(Duration(ms));
        }
        let (_, ms) = all_consuming(parse_timecode)(input).map_err(|_| {
            err!(
                InvalidArgument,
                msg("expected milliseconds or [H:]MM:SS[.mmm] timecode, got {input:?}")
            )
        })?;
        Ok(Duration(ms))
    }
}

impl FromStr for Duration {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
