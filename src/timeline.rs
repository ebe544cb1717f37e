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

//! The timeline data model: tracks, samples, pattern notes and fades.
//!
//! Timelines arrive from the editing layer as plain data and are treated as an
//! immutable snapshot per scheduling tick.

use std::path::Path;

use config::{Config, File};
use serde::{Deserialize, Serialize};

use crate::time::clamp_beat;

/// Pattern note resolution: how many ticks make up one beat.
pub const TICKS_PER_BEAT: u32 = 480;

/// The highest pattern note key (piano-style, key 1 is A0, key 49 is A4).
pub const MAX_NOTE_KEY: u8 = 88;

/// The highest pattern note velocity.
pub const MAX_VELOCITY: u8 = 127;

/// Fade-in/fade-out fractions of a sample's duration. The two fractions
/// together never exceed the whole sample: growing one clamps the other.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, Default, PartialEq)]
pub struct Fade {
    #[serde(default)]
    fade_in: f32,
    #[serde(default)]
    fade_out: f32,
}

impl Fade {
    /// Creates a fade, clamping both fractions into [0, 1] and shrinking the
    /// fade-out so that `fade_in + fade_out <= 1`.
    pub fn new(fade_in: f32, fade_out: f32) -> Fade {
        let fade_in = fade_in.clamp(0.0, 1.0);
        let fade_out = fade_out.clamp(0.0, 1.0).min(1.0 - fade_in);
        Fade { fade_in, fade_out }
    }

    /// The fade-in fraction.
    pub fn fade_in(&self) -> f32 {
        self.fade_in
    }

    /// The fade-out fraction.
    pub fn fade_out(&self) -> f32 {
        self.fade_out
    }

    /// Sets the fade-in fraction, clamping the fade-out if necessary.
    pub fn set_fade_in(&mut self, fade_in: f32) {
        self.fade_in = fade_in.clamp(0.0, 1.0);
        self.fade_out = self.fade_out.min(1.0 - self.fade_in);
    }

    /// Sets the fade-out fraction, clamping the fade-in if necessary.
    pub fn set_fade_out(&mut self, fade_out: f32) {
        self.fade_out = fade_out.clamp(0.0, 1.0);
        self.fade_in = self.fade_in.min(1.0 - self.fade_out);
    }

    /// Re-establishes the fade invariants after deserialization.
    fn normalize(&mut self) {
        *self = Fade::new(self.fade_in, self.fade_out);
    }
}

/// A single note inside a pattern sample.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq)]
pub struct Note {
    /// Tick offset from the start of the pattern.
    tick: u32,
    /// Piano key number (1..=88).
    key: u8,
    /// Note velocity (0..=127).
    velocity: u8,
    /// Note length in ticks.
    duration: u32,
}

impl Note {
    /// Creates a new note, clamping key and velocity into range.
    pub fn new(tick: u32, key: u8, velocity: u8, duration: u32) -> Note {
        Note {
            tick,
            key: key.min(MAX_NOTE_KEY),
            velocity: velocity.min(MAX_VELOCITY),
            duration,
        }
    }

    /// Offset from the start of the pattern, in beats.
    pub fn beat_offset(&self) -> f64 {
        self.tick as f64 / TICKS_PER_BEAT as f64
    }

    /// Note length in beats.
    pub fn duration_beats(&self) -> f64 {
        self.duration as f64 / TICKS_PER_BEAT as f64
    }

    /// Note velocity (0..=127).
    pub fn velocity(&self) -> u8 {
        self.velocity
    }

    /// The note frequency in Hz using the standard piano key mapping
    /// (key 49 = A4 = 440 Hz).
    pub fn frequency(&self) -> f64 {
        440.0 * 2f64.powf((self.key as f64 - 49.0) / 12.0)
    }

    fn normalize(&mut self) {
        self.key = self.key.min(MAX_NOTE_KEY);
        self.velocity = self.velocity.min(MAX_VELOCITY);
    }
}

/// What kind of signal a sample produces.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SampleKind {
    /// A buffer-backed audio asset.
    #[default]
    Audio,
    /// A pattern of synthesized notes.
    Pattern,
}

/// A sample placed on the timeline. A sample belongs to exactly one track.
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct Sample {
    /// Unique sample id.
    id: u64,
    /// Beat position of the sample start (>= 1).
    time: f64,
    /// Sample length in beats.
    duration: f64,
    /// The audio asset reference for audio samples. Patterns carry no asset.
    #[serde(default)]
    url: String,
    /// Fade-in/out configuration.
    #[serde(default)]
    fade: Fade,
    /// Audio or pattern.
    #[serde(default)]
    kind: SampleKind,
    /// The notes of a pattern sample.
    #[serde(default)]
    notes: Vec<Note>,
}

impl Sample {
    /// Creates a new audio sample.
    pub fn audio(id: u64, time: f64, duration: f64, url: &str, fade: Fade) -> Sample {
        Sample {
            id,
            time: clamp_beat(time),
            duration: duration.max(0.0),
            url: url.to_string(),
            fade,
            kind: SampleKind::Audio,
            notes: Vec::new(),
        }
    }

    /// Creates a new pattern sample.
    pub fn pattern(id: u64, time: f64, duration: f64, notes: Vec<Note>) -> Sample {
        Sample {
            id,
            time: clamp_beat(time),
            duration: duration.max(0.0),
            url: String::new(),
            fade: Fade::default(),
            kind: SampleKind::Pattern,
            notes,
        }
    }

    /// Returns the sample with the given fade configuration.
    pub fn with_fade(mut self, fade: Fade) -> Sample {
        self.fade = fade;
        self
    }

    /// The unique sample id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The beat position of the sample start.
    pub fn time(&self) -> f64 {
        self.time
    }

    /// The sample length in beats.
    pub fn duration(&self) -> f64 {
        self.duration
    }

    /// The beat position just past the end of the sample.
    pub fn end(&self) -> f64 {
        self.time + self.duration
    }

    /// The audio asset reference.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// The fade configuration.
    pub fn fade(&self) -> &Fade {
        &self.fade
    }

    /// Audio or pattern.
    pub fn kind(&self) -> SampleKind {
        self.kind
    }

    /// The notes of a pattern sample.
    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    fn normalize(&mut self) {
        self.time = clamp_beat(self.time);
        self.duration = self.duration.max(0.0);
        self.fade.normalize();
        for note in &mut self.notes {
            note.normalize();
        }
    }
}

/// A track on the timeline: mixing state plus an ordered list of samples.
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct Track {
    /// Track volume in [0, 1].
    #[serde(default = "default_volume")]
    volume: f32,
    /// Stereo pan in [-1, 1].
    #[serde(default)]
    pan: f32,
    /// Whether this track is muted.
    #[serde(default)]
    mute: bool,
    /// Whether this track is soloed.
    #[serde(default)]
    solo: bool,
    /// The samples on this track, ordered by beat position.
    #[serde(default)]
    samples: Vec<Sample>,
}

fn default_volume() -> f32 {
    1.0
}

impl Track {
    /// Creates a new empty track.
    pub fn new(volume: f32, pan: f32, mute: bool, solo: bool) -> Track {
        Track {
            volume: volume.clamp(0.0, 1.0),
            pan: pan.clamp(-1.0, 1.0),
            mute,
            solo,
            samples: Vec::new(),
        }
    }

    /// The track volume in [0, 1].
    pub fn volume(&self) -> f32 {
        self.volume
    }

    /// The stereo pan in [-1, 1].
    pub fn pan(&self) -> f32 {
        self.pan
    }

    /// Whether this track is muted.
    pub fn mute(&self) -> bool {
        self.mute
    }

    /// Whether this track is soloed.
    pub fn solo(&self) -> bool {
        self.solo
    }

    /// The samples on this track.
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// Adds a sample to this track if it does not overlap an existing one.
    pub fn place(&mut self, sample: Sample) -> Result<(), TimelineError> {
        self.check_placement(sample.id, sample.time, sample.duration)?;
        let index = self
            .samples
            .partition_point(|existing| existing.time < sample.time);
        self.samples.insert(index, sample);
        Ok(())
    }

    /// Checks whether a sample could occupy `[time, time + duration)` on this
    /// track without overlapping any sample other than `exclude_id`.
    pub fn check_placement(
        &self,
        exclude_id: u64,
        time: f64,
        duration: f64,
    ) -> Result<(), TimelineError> {
        let end = time + duration;
        for existing in &self.samples {
            if existing.id == exclude_id {
                continue;
            }
            if time < existing.end() && existing.time < end {
                return Err(TimelineError::Overlap {
                    placed: exclude_id,
                    existing: existing.id,
                });
            }
        }
        Ok(())
    }

    fn normalize(&mut self) {
        self.volume = self.volume.clamp(0.0, 1.0);
        self.pan = self.pan.clamp(-1.0, 1.0);
        for sample in &mut self.samples {
            sample.normalize();
        }
        self.samples
            .sort_by(|a, b| a.time.partial_cmp(&b.time).expect("beat is not NaN"));
    }

    #[cfg(test)]
    pub(crate) fn with_samples(mut self, samples: Vec<Sample>) -> Track {
        self.samples = samples;
        self.normalize();
        self
    }
}

/// Errors for timeline construction and placement.
#[derive(Debug, thiserror::Error)]
pub enum TimelineError {
    #[error("sample {placed} overlaps sample {existing} on the same track")]
    Overlap { placed: u64, existing: u64 },

    #[error("timeline load/parse error: {0}")]
    Load(#[from] config::ConfigError),
}

/// A full timeline: the ordered set of tracks of one song.
#[derive(Deserialize, Serialize, Clone, Debug, Default)]
pub struct Timeline {
    /// The tracks, in display order.
    #[serde(default)]
    tracks: Vec<Track>,
}

impl Timeline {
    /// Creates a timeline from the given tracks, clamping all values into
    /// their domains and ordering samples by beat position.
    pub fn new(tracks: Vec<Track>) -> Timeline {
        let mut timeline = Timeline { tracks };
        timeline.normalize();
        timeline
    }

    /// Deserializes a timeline from a YAML file.
    pub fn deserialize(path: &Path) -> Result<Timeline, TimelineError> {
        let mut timeline = Config::builder()
            .add_source(File::from(path))
            .build()?
            .try_deserialize::<Timeline>()?;
        timeline.normalize();
        Ok(timeline)
    }

    /// The tracks of this timeline.
    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    /// Looks up a sample by id, returning its track index as well.
    pub fn sample(&self, id: u64) -> Option<(usize, &Sample)> {
        self.tracks.iter().enumerate().find_map(|(index, track)| {
            track
                .samples
                .iter()
                .find(|sample| sample.id == id)
                .map(|sample| (index, sample))
        })
    }

    /// The total timeline length in beats: the largest sample end across all
    /// tracks, or the start of the song when the timeline is empty.
    pub fn duration_beats(&self) -> f64 {
        self.tracks
            .iter()
            .flat_map(|track| track.samples.iter())
            .map(|sample| sample.end())
            .fold(crate::time::MIN_BEAT, f64::max)
    }

    /// All distinct asset URLs referenced by audio samples.
    pub fn asset_urls(&self) -> Vec<String> {
        let mut urls: Vec<String> = self
            .tracks
            .iter()
            .flat_map(|track| track.samples.iter())
            .filter(|sample| sample.kind == SampleKind::Audio && !sample.url.is_empty())
            .map(|sample| sample.url.clone())
            .collect();
        urls.sort();
        urls.dedup();
        urls
    }

    fn normalize(&mut self) {
        for track in &mut self.tracks {
            track.normalize();
        }
    }
}
