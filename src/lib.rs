// Copyright (C) 2026 The beatline authors
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! A beat-timeline transport and sample scheduler.
//!
//! Timelines place audio samples and note patterns on tracks in beat space.
//! The transport converts beat positions into audio-clock seconds, queues
//! playback onto an audio graph ahead of time, and publishes the moving
//! playhead back to an injected state container as serializable commands.

pub mod buffers;
pub mod config;
pub mod fade;
pub mod graph;
pub mod mixer;
pub mod player;
pub mod playsync;
pub mod resolve;
pub mod store;
pub mod time;
pub mod timeline;
pub mod transport;

#[cfg(test)]
mod testutil;
