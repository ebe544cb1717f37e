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

//! Per-track mixing: solo/mute resolution and gain/pan settings.
//!
//! While any track is soloed, every other track is silent regardless of its
//! own volume. Mute silences its track unconditionally, soloed or not.

use crate::timeline::Track;

/// The gain/pan pair applied to a sample at schedule time. Gain is
/// refreshed on live playback units whenever track or master volume
/// changes; pan is fixed for the life of the unit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MixSettings {
    pub gain: f32,
    pub pan: f32,
}

/// Computes the effective playback volume for a sample on the given track:
/// 0 when another track is soloed, 0 when this track is muted, otherwise
/// the track volume scaled by the master volume.
pub fn effective_volume(tracks: &[Track], track_index: usize, master_volume: f32) -> f32 {
    let track = match tracks.get(track_index) {
        Some(track) => track,
        None => return 0.0,
    };

    let any_solo = tracks.iter().any(|t| t.solo());
    if any_solo && !track.solo() {
        return 0.0;
    }
    if track.mute() {
        return 0.0;
    }

    track.volume() * master_volume.clamp(0.0, 1.0)
}

/// Computes the full mix settings for a sample on the given track.
pub fn mix_settings(tracks: &[Track], track_index: usize, master_volume: f32) -> MixSettings {
    MixSettings {
        gain: effective_volume(tracks, track_index, master_volume),
        pan: tracks.get(track_index).map(Track::pan).unwrap_or(0.0),
    }
}
