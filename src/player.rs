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

//! Builds playback units: the live audio-graph handles for one sample.
//!
//! Audio samples become one buffer-backed source; pattern samples become one
//! oscillator source per note. Either way the caller gets back a
//! [`PlaybackUnit`] it can adjust or stop as a whole.

use tracing::debug;

use crate::buffers::AudioBuffer;
use crate::fade::Envelope;
use crate::graph::{ScheduledSource, Signal, SourceHandle, SourceSender};
use crate::mixer::MixSettings;
use crate::resolve::ResolvedTimes;
use crate::time::beats_to_seconds;
use crate::timeline::{Sample, MAX_VELOCITY};

/// The live handles for one currently-scheduled sample.
pub struct PlaybackUnit {
    sample_id: u64,
    track_index: usize,
    end_time: f64,
    handles: Vec<SourceHandle>,
}

impl PlaybackUnit {
    /// The id of the sample this unit plays.
    pub fn sample_id(&self) -> u64 {
        self.sample_id
    }

    /// The index of the track the sample was scheduled from.
    pub fn track_index(&self) -> usize {
        self.track_index
    }

    /// When the last source of this unit ends on the audio clock.
    pub fn end_time(&self) -> f64 {
        self.end_time
    }

    /// Updates the live gain on every source of this unit.
    pub fn set_gain(&self, gain: f32) {
        for handle in &self.handles {
            handle.set_gain(gain);
        }
    }

    /// Force-stops every source of this unit.
    pub fn stop(&self) {
        for handle in &self.handles {
            handle.stop();
        }
    }

    /// The number of live sources in this unit.
    pub fn source_count(&self) -> usize {
        self.handles.len()
    }
}

/// Schedules playback units onto the audio graph.
pub struct Player {
    source_tx: SourceSender,
}

impl Player {
    /// Creates a player scheduling through the given sender.
    pub fn new(source_tx: SourceSender) -> Player {
        Player { source_tx }
    }

    /// Schedules a buffer-backed audio sample. The buffer must already be
    /// decoded; callers pre-resolve through the cache.
    pub fn schedule_audio(
        &self,
        sample: &Sample,
        track_index: usize,
        resolved: &ResolvedTimes,
        buffer: AudioBuffer,
        settings: MixSettings,
    ) -> PlaybackUnit {
        let envelope = Envelope::fade_curve(resolved.start_time, resolved.end_time, sample.fade());
        let (source, handle) = ScheduledSource::new(
            Signal::Buffer(buffer),
            resolved.start_time,
            resolved.end_time,
            resolved.offset,
            1.0,
            settings.pan,
            envelope,
        );
        handle.set_gain(settings.gain);
        self.send(source);

        debug!(
            sample = sample.id(),
            track = track_index,
            start_time = resolved.start_time,
            offset = resolved.offset,
            "Audio sample scheduled"
        );

        PlaybackUnit {
            sample_id: sample.id(),
            track_index,
            end_time: resolved.end_time,
            handles: vec![handle],
        }
    }

    /// Schedules a pattern sample: one oscillator per note, each placed at
    /// its tick offset from the resolved sample start. The sample's fade
    /// curve spans the whole placement and applies to every note. Notes
    /// that already ended (resume mid-pattern) are skipped.
    pub fn schedule_pattern(
        &self,
        sample: &Sample,
        track_index: usize,
        resolved: &ResolvedTimes,
        tempo: f64,
        now: f64,
        settings: MixSettings,
    ) -> PlaybackUnit {
        let envelope = Envelope::fade_curve(resolved.start_time, resolved.end_time, sample.fade());
        let mut handles = Vec::with_capacity(sample.notes().len());
        let mut end_time = resolved.start_time;

        for note in sample.notes() {
            let note_start = resolved.start_time + beats_to_seconds(note.beat_offset(), tempo);
            let note_end = note_start + beats_to_seconds(note.duration_beats(), tempo);
            // Never sound past the end of the sample placement.
            let note_end = note_end.min(resolved.end_time);
            if note_end <= now || note_end <= note_start {
                continue;
            }

            let velocity_gain = note.velocity() as f32 / MAX_VELOCITY as f32;
            let (source, handle) = ScheduledSource::new(
                Signal::Sine {
                    frequency: note.frequency(),
                },
                note_start,
                note_end,
                0.0,
                velocity_gain,
                settings.pan,
                envelope.clone(),
            );
            handle.set_gain(settings.gain);
            self.send(source);

            end_time = end_time.max(note_end);
            handles.push(handle);
        }

        debug!(
            sample = sample.id(),
            track = track_index,
            notes = handles.len(),
            "Pattern sample scheduled"
        );

        PlaybackUnit {
            sample_id: sample.id(),
            track_index,
            end_time: end_time.max(resolved.end_time),
            handles,
        }
    }

    fn send(&self, source: ScheduledSource) {
        // The graph outlives the player in every configuration; a send
        // failure means shutdown is underway and the source is dropped.
        if let Err(e) = self.source_tx.send(source) {
            debug!(error = %e, "Graph is gone; dropping source");
        }
    }
}
