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

//! Conversions between musical beats and wall-clock seconds.
//!
//! Beat 1 is the start of the song; tempo is in beats per minute.

/// The minimum supported tempo in beats per minute.
pub const MIN_TEMPO: f64 = 1.0;

/// The maximum supported tempo in beats per minute.
pub const MAX_TEMPO: f64 = 500.0;

/// The first beat of a song. Beat positions are 1-based.
pub const MIN_BEAT: f64 = 1.0;

/// Converts a number of beats into seconds at the given tempo.
pub fn beats_to_seconds(beats: f64, tempo: f64) -> f64 {
    beats * 60.0 / tempo
}

/// Converts a number of seconds into beats at the given tempo.
pub fn seconds_to_beats(seconds: f64, tempo: f64) -> f64 {
    seconds * tempo / 60.0
}

/// Clamps a tempo into the supported range. Commands are clamped at the
/// boundary so the scheduler never sees an out-of-range tempo.
pub fn clamp_tempo(tempo: f64) -> f64 {
    tempo.clamp(MIN_TEMPO, MAX_TEMPO)
}

/// Clamps a beat position so it never precedes the start of the song.
pub fn clamp_beat(beat: f64) -> f64 {
    beat.max(MIN_BEAT)
}
