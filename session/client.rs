// This file is part of guacplay, a Guacamole session recording player.
// Copyright (C) 2026 The guacplay Authors.
// SPDX-License-Identifier: GPL-3.0-or-later

//! Contract the playback engine requires of a Guacamole display client.

use crate::parser::Instruction;
use async_trait::async_trait;

/// A display client: something that interprets Guacamole instructions into
/// a rendered display and can snapshot/restore its full internal state.
///
/// The engine holds the client exclusively for the lifetime of the
/// recording. Hosts that need access to the rendered output should keep
/// their own handle to it (e.g. via an `Arc` inside the implementation)
/// before handing the client over.
#[async_trait]
pub trait Client: Send + 'static {
    /// Opaque snapshot of the client's full state, suitable for later
    /// restoration via [`Client::import_state`]. The engine stores and
    /// returns it unchanged.
    type State: Send + Sync + 'static;

    /// Called once, when the engine is constructed. The client is expected
    /// to present an empty display afterward and is never disconnected.
    fn connect(&mut self);

    /// Shows or hides the local cursor. Hidden at connect time; the
    /// recording's own instructions decide whether one appears.
    fn show_cursor(&mut self, shown: bool);

    /// Applies one instruction to the display.
    fn handle(&mut self, instruction: &Instruction);

    /// Produces a snapshot of the current state. May complete
    /// asynchronously; the engine waits for it before proceeding.
    async fn export_state(&mut self) -> Self::State;

    /// Restores a previously exported snapshot. Synchronous.
    fn import_state(&mut self, state: &Self::State);
}
