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

//! The audio graph: the engine that executes scheduling instructions.
//!
//! The graph owns a monotonically advancing clock (derived from frames
//! rendered) and a set of scheduled sources. The scheduler queues sources
//! over a channel; the render path drains the channel and mixes whatever is
//! audible, so scheduling never contends with the audio callback. Once
//! queued, start/stop times execute sample-accurately without further
//! application involvement.

use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;

pub mod output;
pub mod source;

pub use source::{next_source_id, ScheduledSource, Signal, SourceHandle};

/// The graph renders interleaved stereo.
pub const CHANNEL_COUNT: usize = 2;

/// Channel used to deliver sources to the render path.
pub type SourceSender = Sender<ScheduledSource>;

/// The audio graph engine.
pub struct AudioGraph {
    /// Output sample rate.
    sample_rate: u32,
    /// Frames rendered so far; the audio clock.
    current_frame: AtomicU64,
    /// Sources currently queued or sounding.
    sources: Mutex<Vec<ScheduledSource>>,
    /// Receiving side of the source channel, drained by the render path.
    source_rx: Receiver<ScheduledSource>,
    /// Sending side, cloned out to schedulers.
    source_tx: SourceSender,
}

impl AudioGraph {
    /// Creates a new graph at the given sample rate.
    pub fn new(sample_rate: u32) -> AudioGraph {
        let (source_tx, source_rx) = crossbeam_channel::unbounded();
        AudioGraph {
            sample_rate,
            current_frame: AtomicU64::new(0),
            sources: Mutex::new(Vec::new()),
            source_rx,
            source_tx,
        }
    }

    /// The graph sample rate.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// The audio clock in seconds. Advances only as frames are rendered.
    pub fn now_seconds(&self) -> f64 {
        self.current_frame.load(Ordering::Relaxed) as f64 / self.sample_rate as f64
    }

    /// Returns a sender for queueing sources onto the graph.
    pub fn source_sender(&self) -> SourceSender {
        self.source_tx.clone()
    }

    /// Renders one block of interleaved stereo into `out`, mixing every
    /// audible source and advancing the clock. Called from the output
    /// device callback, or directly when rendering offline.
    pub fn render(&self, out: &mut [f32]) {
        for sample in out.iter_mut() {
            *sample = 0.0;
        }

        let mut sources = self.sources.lock();
        while let Ok(source) = self.source_rx.try_recv() {
            sources.push(source);
        }

        let block_start = self.current_frame.load(Ordering::Relaxed);
        let sample_rate = self.sample_rate;
        sources.retain_mut(|source| source.render(out, block_start, sample_rate));
        drop(sources);

        let frames = (out.len() / CHANNEL_COUNT) as u64;
        self.current_frame.fetch_add(frames, Ordering::Relaxed);
    }

    /// The number of sources queued or sounding.
    pub fn source_count(&self) -> usize {
        let mut sources = self.sources.lock();
        while let Ok(source) = self.source_rx.try_recv() {
            sources.push(source);
        }
        sources.len()
    }

    /// Renders silence until the clock has advanced by the given number of
    /// seconds. Test helper standing in for a running output device.
    #[cfg(test)]
    pub(crate) fn advance_seconds(&self, seconds: f64) {
        let frames = (seconds * self.sample_rate as f64).round() as usize;
        let mut block = vec![0.0f32; 512 * CHANNEL_COUNT];
        let mut remaining = frames;
        while remaining > 0 {
            let chunk = remaining.min(512);
            self.render(&mut block[..chunk * CHANNEL_COUNT]);
            remaining -= chunk;
        }
    }
}

impl std::fmt::Debug for AudioGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioGraph")
            .field("sample_rate", &self.sample_rate)
            .field("now_seconds", &self.now_seconds())
            .finish()
    }
}
