// This file is part of guacplay, a Guacamole session recording player.
// Copyright (C) 2026 The guacplay Authors.
// SPDX-License-Identifier: GPL-3.0-or-later

//! The playback tunnel: an inert transport standing in for the network
//! tunnel a display client normally sits behind. Nothing is ever sent
//! anywhere; decoded instructions are handed straight to the client.

use crate::client::Client;
use crate::parser::Instruction;

pub struct PlaybackTunnel<C: Client> {
    client: C,
}

impl<C: Client> PlaybackTunnel<C> {
    /// Connects the client. There is no disconnect: the client stays
    /// attached for the lifetime of the recording. The cursor starts
    /// hidden; the recording's instructions decide whether to show one.
    pub fn new(mut client: C) -> Self {
        client.connect();
        client.show_cursor(false);
        PlaybackTunnel { client }
    }

    /// Delivers one instruction, as `oninstruction` would on a live tunnel.
    pub fn receive(&mut self, instruction: &Instruction) {
        self.client.handle(instruction);
    }

    pub fn client_mut(&mut self) -> &mut C {
        &mut self.client
    }
}
