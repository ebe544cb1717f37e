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

//! Gain envelope generation for sample fades.
//!
//! An envelope is a piecewise-linear gain automation curve over absolute
//! audio-clock time. Replacing a playback unit's envelope discards any
//! previously scheduled automation, so rescheduling a sample (e.g. after a
//! tempo change) never stacks curves.

use crate::timeline::Fade;

/// One automation point: the gain the curve reaches at `time`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnvelopePoint {
    pub time: f64,
    pub gain: f32,
}

/// A piecewise-linear gain curve with points sorted by time.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    points: Vec<EnvelopePoint>,
}

impl Envelope {
    /// A constant unity-gain envelope.
    pub fn unity() -> Envelope {
        Envelope {
            points: vec![EnvelopePoint {
                time: 0.0,
                gain: 1.0,
            }],
        }
    }

    /// Builds the fade curve for a sample playing over
    /// `[start_time, end_time]`: a linear ramp from the entry gain up to 1
    /// across the fade-in window, a hold at 1, then a linear ramp down to 0
    /// across the fade-out window.
    ///
    /// When playback begins inside a ramp (the transport resumed mid-fade),
    /// evaluating the curve at `now` yields the linearly interpolated gain
    /// rather than an abrupt 0 or 1, which avoids audible clicks.
    pub fn fade_curve(start_time: f64, end_time: f64, fade: &Fade) -> Envelope {
        if end_time <= start_time {
            return Envelope::unity();
        }

        let length = end_time - start_time;
        let ramp_in_end = start_time + length * fade.fade_in() as f64;
        let ramp_out_start = start_time + length * (1.0 - fade.fade_out()) as f64;

        let mut points = Vec::with_capacity(4);
        if fade.fade_in() > 0.0 {
            points.push(EnvelopePoint {
                time: start_time,
                gain: 0.0,
            });
        }
        points.push(EnvelopePoint {
            time: ramp_in_end,
            gain: 1.0,
        });
        if ramp_out_start > ramp_in_end {
            points.push(EnvelopePoint {
                time: ramp_out_start,
                gain: 1.0,
            });
        }
        if fade.fade_out() > 0.0 {
            points.push(EnvelopePoint {
                time: end_time,
                gain: 0.0,
            });
        }

        Envelope { points }
    }

    /// Evaluates the envelope at the given audio-clock time. Before the
    /// first point the first gain holds; past the last point the last gain
    /// holds; between points the gain is linearly interpolated.
    pub fn gain_at(&self, time: f64) -> f32 {
        let first = self.points.first().expect("envelope is never empty");
        if time <= first.time {
            return first.gain;
        }

        for window in self.points.windows(2) {
            let (a, b) = (window[0], window[1]);
            if time <= b.time {
                if b.time <= a.time {
                    return b.gain;
                }
                let t = ((time - a.time) / (b.time - a.time)) as f32;
                return a.gain + (b.gain - a.gain) * t;
            }
        }

        self.points.last().expect("envelope is never empty").gain
    }

    /// The automation points of this envelope.
    pub fn points(&self) -> &[EnvelopePoint] {
        &self.points
    }
}
