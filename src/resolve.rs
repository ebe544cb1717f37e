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

//! Resolves a sample's beat placement against the audio clock.

use crate::time::beats_to_seconds;
use crate::timeline::Sample;

/// A sample placement resolved into absolute audio-clock seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedTimes {
    /// When the sample should start on the audio clock. May lie in the past
    /// when the transport starts mid-sample.
    pub start_time: f64,
    /// When the sample ends on the audio clock.
    pub end_time: f64,
    /// How far into the sample playback should begin. Non-zero when the
    /// transport position is already past the sample's nominal start, which
    /// is what makes seek/resume land mid-sample instead of restarting it.
    pub offset: f64,
}

impl ResolvedTimes {
    /// Whether the playback window contains `now`.
    pub fn is_audible(&self, now: f64) -> bool {
        self.start_time <= now && now < self.end_time
    }

    /// Whether this sample should be scheduled on a tick at `now` with the
    /// given look-ahead window: it has not ended, and it starts no later
    /// than `now + window`.
    pub fn starts_within(&self, now: f64, window: f64) -> bool {
        self.end_time > now && self.start_time <= now + window
    }
}

/// Computes the absolute start/end times and playback offset for a sample
/// given the current transport position.
pub fn resolve(now: f64, current_beat: f64, tempo: f64, sample: &Sample) -> ResolvedTimes {
    ResolvedTimes {
        start_time: now + beats_to_seconds(sample.time() - current_beat, tempo),
        end_time: now + beats_to_seconds(sample.end() - current_beat, tempo),
        offset: beats_to_seconds(current_beat - sample.time(), tempo).max(0.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeline::Fade;

    fn sample(time: f64, duration: f64) -> Sample {
        Sample::audio(1, time, duration, "a.wav", Fade::default())
    }

    #[test]
    fn test_resolve_at_sample_start() {
        let resolved = resolve(10.0, 5.0, 120.0, &sample(5.0, 2.0));
        assert_eq!(resolved.start_time, 10.0);
        assert_eq!(resolved.end_time, 11.0);
        assert_eq!(resolved.offset, 0.0);
        assert!(resolved.is_audible(10.0));
    }

    #[test]
    fn test_resolve_mid_sample() {
        // Transport started one beat into the sample: at 120 BPM that is half
        // a second, so the nominal start lies half a second in the past.
        let resolved = resolve(10.0, 6.0, 120.0, &sample(5.0, 2.0));
        assert_eq!(resolved.start_time, 9.5);
        assert_eq!(resolved.offset, 0.5);
        assert!(resolved.is_audible(10.0));
    }

    #[test]
    fn test_resolve_future_sample() {
        let resolved = resolve(10.0, 1.0, 60.0, &sample(5.0, 2.0));
        assert_eq!(resolved.start_time, 14.0);
        assert_eq!(resolved.end_time, 16.0);
        assert_eq!(resolved.offset, 0.0);
        assert!(!resolved.is_audible(10.0));
    }

    #[test]
    fn test_starts_within_window() {
        let resolved = resolve(10.0, 1.0, 60.0, &sample(1.05, 2.0));
        // Starts 50ms in the future: inside a 100ms window.
        assert!(resolved.starts_within(10.0, 0.1));

        let resolved = resolve(10.0, 1.0, 60.0, &sample(1.5, 2.0));
        // Starts 500ms in the future: outside the window.
        assert!(!resolved.starts_within(10.0, 0.1));

        // A sample that already ended is never scheduled again.
        let resolved = resolve(10.0, 9.0, 60.0, &sample(1.0, 2.0));
        assert!(!resolved.starts_within(10.0, 0.1));

        // A currently-audible sample is always in the window.
        let resolved = resolve(10.0, 2.0, 60.0, &sample(1.0, 4.0));
        assert!(resolved.starts_within(10.0, 0.1));
    }
}
