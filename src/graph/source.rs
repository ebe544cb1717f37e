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

//! A scheduled source: one playback instruction queued on the graph.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::buffers::AudioBuffer;
use crate::fade::Envelope;
use crate::playsync::CancelHandle;

/// Length of the anti-click ramp applied when a sounding source is
/// force-stopped.
const STOP_RAMP_SECONDS: f64 = 0.005;

/// Global source ID counter.
static NEXT_SOURCE_ID: AtomicU64 = AtomicU64::new(1);

/// Returns the next unique source id.
pub fn next_source_id() -> u64 {
    NEXT_SOURCE_ID.fetch_add(1, Ordering::SeqCst)
}

/// The signal a source produces.
pub enum Signal {
    /// A decoded audio buffer.
    Buffer(AudioBuffer),
    /// A sine oscillator at a fixed frequency (pattern notes).
    Sine { frequency: f64 },
}

/// Control surface handed back to the scheduler when a source is created.
/// Lets the application adjust gain in real time, replace the fade
/// automation, and force-stop the source.
#[derive(Clone)]
pub struct SourceHandle {
    id: u64,
    end_time: f64,
    live_gain: Arc<AtomicU32>,
    envelope: Arc<RwLock<Envelope>>,
    cancel_handle: CancelHandle,
}

impl SourceHandle {
    /// The source id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// When the source ends on the audio clock.
    pub fn end_time(&self) -> f64 {
        self.end_time
    }

    /// Updates the live gain. Applies on the next rendered block.
    pub fn set_gain(&self, gain: f32) {
        self.live_gain
            .store(gain.clamp(0.0, 1.0).to_bits(), Ordering::Relaxed);
    }

    /// Replaces the gain automation, discarding any previously scheduled
    /// curve.
    pub fn set_envelope(&self, envelope: Envelope) {
        *self.envelope.write() = envelope;
    }

    /// Force-stops the source. A sounding source ramps out over a few
    /// milliseconds to avoid a click; a source that has not started yet is
    /// dropped silently.
    pub fn stop(&self) {
        self.cancel_handle.cancel();
    }
}

/// One playback instruction: what to play, when, and through which gain/pan
/// settings. Owned by the render path once queued.
pub struct ScheduledSource {
    id: u64,
    /// Audio-clock start/end in seconds.
    start_time: f64,
    end_time: f64,
    /// Seconds to skip into the signal at start.
    offset: f64,
    signal: Signal,
    /// Fixed gain baked in at schedule time (note velocity).
    base_gain: f32,
    /// Fade automation over absolute clock time.
    envelope: Arc<RwLock<Envelope>>,
    /// Live gain (track volume x master), updatable in real time.
    live_gain: Arc<AtomicU32>,
    /// Stereo position in [-1, 1], fixed at schedule time.
    pan: f32,
    cancel_handle: CancelHandle,
    /// Oscillator phase in radians.
    phase: f64,
    /// Remaining/total frames of the stop ramp once cancelled mid-sound.
    stop_ramp: Option<(u32, u32)>,
}

impl ScheduledSource {
    /// Creates a source and its control handle.
    pub fn new(
        signal: Signal,
        start_time: f64,
        end_time: f64,
        offset: f64,
        base_gain: f32,
        pan: f32,
        envelope: Envelope,
    ) -> (ScheduledSource, SourceHandle) {
        let id = next_source_id();
        let envelope = Arc::new(RwLock::new(envelope));
        let live_gain = Arc::new(AtomicU32::new(1.0f32.to_bits()));
        let cancel_handle = CancelHandle::new();

        let handle = SourceHandle {
            id,
            end_time,
            live_gain: live_gain.clone(),
            envelope: envelope.clone(),
            cancel_handle: cancel_handle.clone(),
        };

        let source = ScheduledSource {
            id,
            start_time,
            end_time,
            offset,
            signal,
            base_gain: base_gain.clamp(0.0, 1.0),
            envelope,
            live_gain,
            pan: pan.clamp(-1.0, 1.0),
            cancel_handle,
            phase: 0.0,
            stop_ramp: None,
        };

        (source, handle)
    }

    /// The source id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Mixes this source's contribution into an interleaved stereo block
    /// starting at `block_start_frame`. Returns false once the source is
    /// finished and should be evicted.
    pub(crate) fn render(
        &mut self,
        out: &mut [f32],
        block_start_frame: u64,
        sample_rate: u32,
    ) -> bool {
        let rate = sample_rate as f64;
        let frames = out.len() / super::CHANNEL_COUNT;
        let block_start_time = block_start_frame as f64 / rate;

        if self.cancel_handle.is_cancelled() {
            if block_start_time < self.start_time {
                // Stopped before it ever started: drop without sounding.
                return false;
            }
            if self.stop_ramp.is_none() {
                let total = ((STOP_RAMP_SECONDS * rate) as u32).max(1);
                self.stop_ramp = Some((total, total));
            }
        }

        let envelope = self.envelope.read().clone();
        let live_gain = f32::from_bits(self.live_gain.load(Ordering::Relaxed));
        let (pan_left, pan_right) = pan_gains(self.pan);
        let phase_step = match self.signal {
            Signal::Sine { frequency } => 2.0 * std::f64::consts::PI * frequency / rate,
            Signal::Buffer(_) => 0.0,
        };

        for i in 0..frames {
            let t = (block_start_frame + i as u64) as f64 / rate;
            if t < self.start_time {
                continue;
            }
            if t >= self.end_time {
                return false;
            }

            let (left, right) = match &self.signal {
                Signal::Buffer(buffer) => {
                    let position = t - self.start_time + self.offset;
                    let frame = (position * buffer.sample_rate() as f64) as usize;
                    match buffer.stereo_frame(frame) {
                        Some(pair) => pair,
                        // Ran off the end of the buffer.
                        None => return false,
                    }
                }
                Signal::Sine { .. } => {
                    let value = self.phase.sin() as f32;
                    self.phase += phase_step;
                    (value, value)
                }
            };

            let mut gain = envelope.gain_at(t) * live_gain * self.base_gain;
            if let Some((remaining, total)) = &mut self.stop_ramp {
                if *remaining == 0 {
                    return false;
                }
                gain *= *remaining as f32 / *total as f32;
                *remaining -= 1;
            }

            out[i * 2] += left * gain * pan_left;
            out[i * 2 + 1] += right * gain * pan_right;
        }

        true
    }
}

/// Equal-power stereo pan gains for a position in [-1, 1].
fn pan_gains(pan: f32) -> (f32, f32) {
    let angle = (pan + 1.0) * std::f32::consts::FRAC_PI_4;
    (angle.cos(), angle.sin())
}
