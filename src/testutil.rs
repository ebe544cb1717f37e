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

//! Shared test helpers.

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::buffers::{BufferError, Fetcher};

/// Generates an in-memory 16-bit PCM WAV file containing a 220 Hz tone.
pub fn wav_bytes(sample_rate: u32, channels: u16, frames: usize) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).expect("wav header writes");
        for frame in 0..frames {
            let t = frame as f64 / sample_rate as f64;
            let value = (t * 220.0 * 2.0 * std::f64::consts::PI).sin();
            let value = (value * 0.5 * i16::MAX as f64) as i16;
            for _ in 0..channels {
                writer.write_sample(value).expect("sample writes");
            }
        }
        writer.finalize().expect("wav finalizes");
    }
    cursor.into_inner()
}

/// An in-memory fetcher serving pre-registered byte blobs. Unknown URLs
/// fail; every attempt is counted so tests can assert fetch de-duplication.
pub struct MockFetcher {
    assets: Mutex<HashMap<String, Vec<u8>>>,
    fetch_count: Arc<AtomicUsize>,
}

impl MockFetcher {
    pub fn new() -> MockFetcher {
        MockFetcher {
            assets: Mutex::new(HashMap::new()),
            fetch_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Registers the bytes served for a URL.
    pub fn add(&self, url: &str, bytes: Vec<u8>) {
        self.assets.lock().insert(url.to_string(), bytes);
    }

    /// The shared fetch counter, incremented on every fetch attempt.
    pub fn fetch_count(&self) -> Arc<AtomicUsize> {
        self.fetch_count.clone()
    }
}

impl Fetcher for MockFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, BufferError> {
        self.fetch_count.fetch_add(1, Ordering::SeqCst);
        self.assets
            .lock()
            .get(url)
            .cloned()
            .ok_or_else(|| BufferError::Fetch {
                url: url.to_string(),
                message: "no such asset".to_string(),
            })
    }
}

/// Polls the expectation until it returns true, panicking with the given
/// message after five seconds.
pub async fn eventually_async<F: FnMut() -> bool>(mut expectation: F, message: &str) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !expectation() {
        if Instant::now() > deadline {
            panic!("{}", message);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
