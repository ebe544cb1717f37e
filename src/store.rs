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

//! The external state container interface.
//!
//! The scheduler never imports a process-wide store. It receives a read-only
//! state accessor and a command dispatcher by injection, reads transport and
//! timeline snapshots through them, and publishes derived state (the current
//! beat) back as discrete, serializable commands.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::time::{clamp_beat, clamp_tempo, MIN_BEAT};
use crate::timeline::Timeline;

/// An optional loop region in beat space.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq)]
pub struct LoopRegion {
    pub start: f64,
    pub stop: f64,
}

impl Default for LoopRegion {
    fn default() -> Self {
        LoopRegion {
            start: MIN_BEAT,
            stop: MIN_BEAT,
        }
    }
}

/// The transport state snapshot the scheduler reads every tick.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq)]
pub struct TransportState {
    /// Beats per minute, clamped to [1, 500].
    pub tempo: f64,
    /// The current playhead position (>= 1).
    pub current_beat: f64,
    /// Whether the transport is playing.
    pub playing: bool,
    /// Audio-clock seconds at the last play transition.
    pub playing_start_time: f64,
    /// The beat the last play transition started from.
    pub playing_start_beat: f64,
    /// Master volume in [0, 1].
    pub volume: f32,
    /// The loop region.
    pub loop_region: LoopRegion,
    /// Whether looping is enabled.
    pub loop_enabled: bool,
    /// Raised while assets are being fetched/decoded so the UI can block
    /// edits.
    pub sample_loading: bool,
}

impl Default for TransportState {
    fn default() -> Self {
        TransportState {
            tempo: 120.0,
            current_beat: MIN_BEAT,
            playing: false,
            playing_start_time: 0.0,
            playing_start_beat: MIN_BEAT,
            volume: 1.0,
            loop_region: LoopRegion::default(),
            loop_enabled: false,
            sample_loading: false,
        }
    }
}

/// Commands the scheduler (and the UI) dispatch to the state container.
/// These are plain serializable action objects; the container applies them
/// synchronously.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    /// Starts playback, anchoring the position math at the given audio-clock
    /// time. Re-dispatching while playing re-anchors (used for seeks and
    /// loop wraps).
    Play { start_time: f64 },
    /// Pauses playback, freezing the playhead where it is.
    Pause,
    /// Stops playback and rewinds to the start of the song.
    Stop,
    /// Publishes a new playhead position.
    SetCurrentBeat { beat: f64 },
    /// Raises or clears the asset-loading flag.
    SetSampleLoading { loading: bool },
    /// Changes the tempo. Clamped at this boundary; already-started playback
    /// units are not moved.
    SetTempo { tempo: f64 },
    /// Changes the master volume. Applies to live units in real time.
    SetVolume { volume: f32 },
}

/// Read-only access to the current transport and timeline snapshots.
pub trait StateReader: Send + Sync {
    /// The current transport state.
    fn transport(&self) -> TransportState;

    /// The current timeline snapshot. Cheap to clone; the scheduler treats
    /// it as immutable for the duration of a tick.
    fn timeline(&self) -> Arc<Timeline>;
}

/// Applies commands to the state container.
pub trait Dispatch: Send + Sync {
    fn dispatch(&self, command: Command);
}

/// An in-process state container with the reducer semantics the transport
/// relies on.
pub struct MemoryStore {
    transport: RwLock<TransportState>,
    timeline: RwLock<Arc<Timeline>>,
}

impl MemoryStore {
    /// Creates a store with the given timeline and default transport state.
    pub fn new(timeline: Timeline) -> MemoryStore {
        MemoryStore {
            transport: RwLock::new(TransportState::default()),
            timeline: RwLock::new(Arc::new(timeline)),
        }
    }

    /// Creates a store with an explicit initial transport state.
    pub fn with_transport(timeline: Timeline, transport: TransportState) -> MemoryStore {
        MemoryStore {
            transport: RwLock::new(transport),
            timeline: RwLock::new(Arc::new(timeline)),
        }
    }

    /// Replaces the timeline snapshot. The transport notices on its next
    /// tick; callers are expected to trigger asset re-validation.
    pub fn replace_timeline(&self, timeline: Timeline) {
        *self.timeline.write() = Arc::new(timeline);
    }
}

impl StateReader for MemoryStore {
    fn transport(&self) -> TransportState {
        *self.transport.read()
    }

    fn timeline(&self) -> Arc<Timeline> {
        self.timeline.read().clone()
    }
}

impl Dispatch for MemoryStore {
    fn dispatch(&self, command: Command) {
        let mut state = self.transport.write();
        debug!(command = ?command, "Applying command");
        match command {
            Command::Play { start_time } => {
                state.playing = true;
                state.playing_start_time = start_time;
                state.playing_start_beat = state.current_beat;
            }
            Command::Pause => {
                state.playing = false;
                state.playing_start_beat = state.current_beat;
            }
            Command::Stop => {
                state.playing = false;
                state.playing_start_beat = MIN_BEAT;
                state.current_beat = MIN_BEAT;
            }
            Command::SetCurrentBeat { beat } => {
                state.current_beat = clamp_beat(beat);
                if !state.playing {
                    state.playing_start_beat = state.current_beat;
                }
            }
            Command::SetSampleLoading { loading } => {
                state.sample_loading = loading;
            }
            Command::SetTempo { tempo } => {
                state.tempo = clamp_tempo(tempo);
            }
            Command::SetVolume { volume } => {
                state.volume = volume.clamp(0.0, 1.0);
            }
        }
    }
}
