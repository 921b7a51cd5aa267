// This file is part of guacplay, a Guacamole session recording player.
// Copyright (C) 2026 The guacplay Authors.
// SPDX-License-Identifier: GPL-3.0-or-later

use base::{err, Error};

pub mod cat;
pub mod info;
pub mod play;

/// Builds the single-threaded runtime the playback engine runs on.
fn runtime() -> Result<tokio::runtime::Runtime, Error> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| err!(Internal, msg("unable to build tokio runtime"), source(e)))
}
