// This file is part of guacplay, a Guacamole session recording player.
// Copyright (C) 2026 The guacplay Authors.
// SPDX-License-Identifier: GPL-3.0-or-later

//! Incremental decoder for the Guacamole instruction wire format.
//!
//! An instruction is a non-empty comma-separated sequence of elements
//! terminated by `;`. Each element is `LENGTH.VALUE`, where `LENGTH` is the
//! decimal count of Unicode code points in `VALUE`. Values may therefore
//! contain `,`, `;`, and `.` freely. The first element is the opcode; the
//! rest are arguments.

use base::{bail, Error};
use std::collections::VecDeque;
use std::mem;

/// Ceiling on a single element's declared length, in code points.
/// Recordings legitimately carry large image blobs, but anything beyond
/// this is corruption.
pub const MAX_ELEMENT_LEN: u64 = 16 << 20;

/// One decoded instruction.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Instruction {
    pub opcode: String,
    pub args: Vec<String>,
}

impl Instruction {
    pub fn new<O, A>(opcode: O, args: A) -> Self
    where
        O: Into<String>,
        A: IntoIterator,
        A::Item: Into<String>,
    {
        Instruction {
            opcode: opcode.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Encodes back to wire form; the exact inverse of [`Parser`].
    pub fn encode(&self) -> String {
        let elements = std::iter::once(&self.opcode).chain(&self.args);
        let n = self.args.len() + 1;
        let mut out = String::new();
        for (i, element) in elements.enumerate() {
            // LENGTH counts code points, not bytes.
            out.push_str(&element.chars().count().to_string());
            out.push('.');
            out.push_str(element);
            out.push(if i + 1 == n { ';' } else { ',' });
        }
        out
    }
}

/// Returns the encoded size of one element in code points: the decimal
/// length prefix, the `.`, the value itself, and the `,`/`;` terminator.
pub fn element_len(value: &str) -> u64 {
    let n = value.chars().count() as u64;
    let digits = if n == 0 { 1 } else { u64::from(n.ilog10()) + 1 };
    n + digits + 2
}

#[derive(Clone, Copy, Debug)]
enum State {
    /// Accumulating the decimal length prefix of the next element.
    Length { len: u64, digits: u32 },
    /// Consuming the declared number of code points of a value.
    Value { remaining: u64 },
    /// Expecting the `,` or `;` following a complete value.
    Terminator,
}

/// Streaming instruction decoder.
///
/// Feed it chunks of the blob in order; completed instructions become
/// available from [`Parser::pop`] together with the byte offset just past
/// their terminating `;`. Incomplete tails (including split UTF-8
/// sequences) are retained across feeds.
pub struct Parser {
    state: State,
    /// Completed elements of the instruction being decoded.
    elements: Vec<String>,
    /// Accumulator for the value being decoded.
    value: String,
    /// Partial UTF-8 sequence split across a chunk boundary.
    pending: Vec<u8>,
    /// Absolute byte offset just past the last fully processed character.
    pos: u64,
    ready: VecDeque<(Instruction, u64)>,
}

impl Parser {
    /// Creates a parser whose input begins at absolute byte offset `start`
    /// within the blob.
    pub fn new(start: u64) -> Self {
        Parser {
            state: State::Length { len: 0, digits: 0 },
            elements: Vec::new(),
            value: String::new(),
            pending: Vec::new(),
            pos: start,
            ready: VecDeque::new(),
        }
    }

    /// Byte offset just past the last fully processed character.
    pub fn pos(&self) -> u64 {
        self.pos
    }

    /// True between instructions: no partial element, value, or character
    /// is buffered, and everything decoded has been popped.
    pub fn is_idle(&self) -> bool {
        self.ready.is_empty()
            && self.elements.is_empty()
            && self.pending.is_empty()
            && matches!(self.state, State::Length { digits: 0, .. })
    }

    /// Pops the next completed instruction and the byte offset just past
    /// its terminating `;`.
    pub fn pop(&mut self) -> Option<(Instruction, u64)> {
        self.ready.pop_front()
    }

    /// Consumes one chunk. Instructions it completes are queued for
    /// [`Parser::pop`]; instructions completed before a mid-chunk error are
    /// still queued.
    pub fn feed(&mut self, mut data: &[u8]) -> Result<(), Error> {
        // Finish a character split across the previous chunk boundary.
        while !self.pending.is_empty() && !data.is_empty() {
            self.pending.push(data[0]);
            data = &data[1..];
            match std::str::from_utf8(&self.pending) {
                Ok(s) => {
                    let c = s.chars().next().expect("pending holds a complete char");
                    self.pos += self.pending.len() as u64;
                    self.pending.clear();
                    self.step(c)?;
                }
                Err(e) if e.error_len().is_none() && self.pending.len() < 4 => continue,
                Err(_) => bail!(DataLoss, msg("invalid UTF-8 at offset {}", self.pos)),
            }
        }
        match std::str::from_utf8(data) {
            Ok(s) => self.consume(s),
            Err(e) => {
                let (valid, rest) = data.split_at(e.valid_up_to());
                self.consume(std::str::from_utf8(valid).expect("split at valid_up_to"))?;
                if e.error_len().is_some() {
                    bail!(DataLoss, msg("invalid UTF-8 at offset {}", self.pos));
                }
                self.pending.extend_from_slice(rest);
                Ok(())
            }
        }
    }

    fn consume(&mut self, s: &str) -> Result<(), Error> {
        for c in s.chars() {
            self.pos += c.len_utf8() as u64;
            self.step(c)?;
        }
        Ok(())
    }

    fn step(&mut self, c: char) -> Result<(), Error> {
        match self.state {
            State::Length { len, digits } => match c {
                '0'..='9' => {
                    let len = len * 10 + u64::from(c) - u64::from('0');
                    if len > MAX_ELEMENT_LEN {
                        bail!(
                            DataLoss,
                            msg("element length {len} at offset {} exceeds maximum", self.pos)
                        );
                    }
                    self.state = State::Length {
                        len,
                        digits: digits + 1,
                    };
                }
                '.' => {
                    if digits == 0 {
                        bail!(DataLoss, msg("missing element length at offset {}", self.pos));
                    }
                    self.state = if len == 0 {
                        State::Terminator
                    } else {
                        State::Value { remaining: len }
                    };
                }
                _ => bail!(
                    DataLoss,
                    msg("invalid character {c:?} in element length at offset {}", self.pos)
                ),
            },
            State::Value { remaining } => {
                self.value.push(c);
                self.state = if remaining == 1 {
                    State::Terminator
                } else {
                    State::Value {
                        remaining: remaining - 1,
                    }
                };
            }
            State::Terminator => match c {
                ',' => {
                    self.elements.push(mem::take(&mut self.value));
                    self.state = State::Length { len: 0, digits: 0 };
                }
                ';' => {
                    self.elements.push(mem::take(&mut self.value));
                    let mut elements = mem::take(&mut self.elements).into_iter();
                    let opcode = elements.next().expect("instruction has an opcode");
                    self.ready.push_back((
                        Instruction {
                            opcode,
                            args: elements.collect(),
                        },
                        self.pos,
                    ));
                    self.state = State::Length { len: 0, digits: 0 };
                }
                _ => bail!(
                    DataLoss,
                    msg(
                        "element value followed by {c:?} instead of ',' or ';' at offset {}",
                        self.pos
                    )
                ),
            },
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base::ErrorKind;

    fn parse_all(data: &[u8]) -> Vec<(Instruction, u64)> {
        let mut p = Parser::new(0);
        p.feed(data).unwrap();
        let mut out = Vec::new();
        while let Some(i) = p.pop() {
            out.push(i);
        }
        assert!(p.is_idle());
        out
    }

    #[test]
    fn basic_decode() {
        let got = parse_all(b"4.sync,4.1000;3.nop;");
        assert_eq!(
            got,
            vec![
                (Instruction::new("sync", ["1000"]), 14),
                (Instruction::new("nop", [] as [&str; 0]), 20),
            ]
        );
    }

    #[test]
    fn values_may_contain_separators() {
        let got = parse_all("5.mouse,7.a,b;c.d,0.;".as_bytes());
        assert_eq!(got, vec![(Instruction::new("mouse", ["a,b;c.d", ""]), 21)]);
    }

    #[test]
    fn lengths_count_code_points_not_bytes() {
        // "höj" is 3 code points but 4 bytes; offsets stay byte-accurate.
        let blob = "3.img,3.höj;".as_bytes();
        let got = parse_all(blob);
        assert_eq!(got, vec![(Instruction::new("img", ["höj"]), blob.len() as u64)]);
    }

    #[test]
    fn tails_survive_chunk_boundaries() {
        // Feeding byte-by-byte splits the length, the value, multi-byte
        // characters, and the terminator across feeds.
        let blob = "4.sync,4.1000;4.żółw,2.🦀!;".as_bytes();
        let mut p = Parser::new(0);
        let mut got = Vec::new();
        for b in blob {
            p.feed(std::slice::from_ref(b)).unwrap();
            while let Some(i) = p.pop() {
                got.push(i);
            }
        }
        assert!(p.is_idle());
        assert_eq!(
            got,
            vec![
                (Instruction::new("sync", ["1000"]), 14),
                (Instruction::new("żółw", ["🦀!"]), blob.len() as u64),
            ]
        );
    }

    #[test]
    fn incomplete_tail_is_retained() {
        let mut p = Parser::new(0);
        p.feed(b"4.sync,4.10").unwrap();
        assert!(p.pop().is_none());
        assert!(!p.is_idle());
        p.feed(b"00;").unwrap();
        assert_eq!(p.pop().unwrap(), (Instruction::new("sync", ["1000"]), 14));
        assert!(p.is_idle());
    }

    #[test]
    fn decode_errors() {
        struct Test {
            encoded: &'static [u8],
            err: &'static str,
        }
        let tests = [
            Test {
                encoded: b"x.sync;",
                err: "invalid character 'x' in element length at offset 1",
            },
            Test {
                encoded: b".sync;",
                err: "missing element length at offset 1",
            },
            Test {
                encoded: b"4.sync!",
                err: "element value followed by '!' instead of ',' or ';' at offset 7",
            },
            Test {
                encoded: b"99999999.x",
                err: "element length 99999999 at offset 8 exceeds maximum",
            },
            Test {
                encoded: b";",
                err: "invalid character ';' in element length at offset 1",
            },
            Test {
                encoded: b"2.a\xff;",
                err: "invalid UTF-8 at offset 3",
            },
        ];
        for test in &tests {
            let mut p = Parser::new(0);
            let e = p.feed(test.encoded).unwrap_err();
            assert_eq!(e.kind(), ErrorKind::DataLoss);
            assert_eq!(e.msg().unwrap(), test.err, "{:?}", test.encoded);
        }
    }

    #[test]
    fn instructions_before_an_error_are_kept() {
        let mut p = Parser::new(0);
        p.feed(b"4.sync,1.0;bogus").unwrap_err();
        assert_eq!(p.pop().unwrap(), (Instruction::new("sync", ["0"]), 11));
        assert!(p.pop().is_none());
    }

    #[test]
    fn start_offset_applies() {
        let mut p = Parser::new(100);
        p.feed(b"4.sync,1.0;").unwrap();
        assert_eq!(p.pop().unwrap().1, 111);
        assert_eq!(p.pos(), 111);
    }

    #[test]
    fn element_len_law() {
        // element_len(VALUE) == digits(LENGTH) + 1 + codepoints(VALUE) + 1,
        // which is the code-point count of the element's wire form.
        for value in ["", "a", "abc", "0123456789", "höj", "🦀🦀"] {
            let ins = Instruction::new("x", [value]);
            let encoded = ins.encode();
            let wire = encoded
                .split_once(',')
                .expect("opcode and one arg")
                .1;
            assert_eq!(element_len(value), wire.chars().count() as u64, "{value:?}");
        }
    }

    #[test]
    fn encode_round_trips() {
        let cases = [
            Instruction::new("sync", ["1000"]),
            Instruction::new("nop", [] as [&str; 0]),
            Instruction::new("mouse", ["a,b;c.d", "", "żółw"]),
        ];
        for ins in &cases {
            let encoded = ins.encode();
            let got = parse_all(encoded.as_bytes());
            assert_eq!(got.len(), 1);
            assert_eq!(&got[0].0, ins);
            assert_eq!(got[0].1, encoded.len() as u64);
        }
    }
}
