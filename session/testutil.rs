// This file is part of guacplay, a Guacamole session recording player.
// Copyright (C) 2026 The guacplay Authors.
// SPDX-License-Identifier: GPL-3.0-or-later

//! Utilities for automated testing of the playback core.

use crate::client::Client;
use crate::parser::Instruction;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

static INIT: std::sync::Once = std::sync::Once::new();

/// Performs global initialization for tests: sets up logging.
pub fn init() {
    INIT.call_once(|| {
        base::tracing_setup::install_for_tests();
    });
}

/// What a [`LoggedClient`] has seen so far.
#[derive(Default)]
pub struct ClientLog {
    /// Instructions applied since connect or the last `import_state`.
    /// This doubles as the client's "display state".
    pub ops: Vec<(String, Vec<String>)>,
    pub connects: usize,
    pub exports: usize,
    pub imports: usize,
    pub cursor_shown: Option<bool>,
}

/// A display client whose opaque snapshot is simply its applied-instruction
/// log, so "identical display state" is directly assertable in tests.
pub struct LoggedClient(Arc<Mutex<ClientLog>>);

pub fn logged_client() -> (LoggedClient, Arc<Mutex<ClientLog>>) {
    let log = Arc::new(Mutex::new(ClientLog::default()));
    (LoggedClient(log.clone()), log)
}

#[async_trait]
impl Client for LoggedClient {
    type State = Vec<(String, Vec<String>)>;

    fn connect(&mut self) {
        self.0.lock().unwrap().connects += 1;
    }

    fn show_cursor(&mut self, shown: bool) {
        self.0.lock().unwrap().cursor_shown = Some(shown);
    }

    fn handle(&mut self, instruction: &Instruction) {
        self.0
            .lock()
            .unwrap()
            .ops
            .push((instruction.opcode.clone(), instruction.args.clone()));
    }

    async fn export_state(&mut self) -> Self::State {
        let mut log = self.0.lock().unwrap();
        log.exports += 1;
        log.ops.clone()
    }

    fn import_state(&mut self, state: &Self::State) {
        let mut log = self.0.lock().unwrap();
        log.imports += 1;
        log.ops = state.clone();
    }
}

/// Encodes one instruction in wire form.
pub fn inst(opcode: &str, args: &[&str]) -> String {
    Instruction::new(opcode, args.iter().copied()).encode()
}

/// Encodes a `sync` carrying the given millisecond timestamp.
pub fn sync(timestamp: i64) -> String {
    inst("sync", &[&timestamp.to_string()])
}

/// Encodes a filler instruction whose payload is `payload_len` bytes, for
/// forcing the keyframe byte interval in tests.
pub fn padding(payload_len: usize) -> String {
    inst("fill", &["x".repeat(payload_len).as_str()])
}
