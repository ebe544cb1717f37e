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

//! The shared buffer cache: asset URL to decoded audio buffer.
//!
//! Buffers are fetched and decoded out-of-band during timeline updates,
//! never inside the scheduling loop. Entries are only ever added; nothing is
//! evicted. Concurrent fetches for the same URL are de-duplicated through a
//! pending-fetch map, so one in-flight fetch serves all waiters.

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::default::{get_codecs, get_probe};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Errors from fetching or decoding an audio asset.
#[derive(Debug, thiserror::Error)]
pub enum BufferError {
    #[error("failed to fetch '{url}': {message}")]
    Fetch { url: String, message: String },

    #[error("failed to decode '{url}': {source}")]
    Decode {
        url: String,
        source: SymphoniaError,
    },

    #[error("'{url}' contains no audio track")]
    NoAudioTrack { url: String },

    #[error("'{url}' does not specify a sample rate")]
    MissingSampleRate { url: String },

    #[error("'{url}' previously failed to resolve")]
    Unresolved { url: String },
}

/// A decoded, hardware-ready audio buffer. The sample data is stored in an
/// Arc so it is shared read-only across every playback unit using it.
#[derive(Clone)]
pub struct AudioBuffer {
    /// Interleaved f32 samples.
    data: Arc<Vec<f32>>,
    /// Number of interleaved channels.
    channel_count: u16,
    /// Sample rate of the data (already matches the graph rate).
    sample_rate: u32,
}

impl AudioBuffer {
    /// Creates a buffer from interleaved samples.
    pub fn new(data: Vec<f32>, channel_count: u16, sample_rate: u32) -> AudioBuffer {
        AudioBuffer {
            data: Arc::new(data),
            channel_count: channel_count.max(1),
            sample_rate,
        }
    }

    /// Number of channels.
    pub fn channel_count(&self) -> u16 {
        self.channel_count
    }

    /// Sample rate of the data.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of frames (samples per channel).
    pub fn frame_count(&self) -> usize {
        self.data.len() / self.channel_count as usize
    }

    /// Buffer length in seconds.
    pub fn duration_seconds(&self) -> f64 {
        self.frame_count() as f64 / self.sample_rate as f64
    }

    /// Returns the stereo pair at the given frame, or None past the end.
    /// Mono buffers feed both sides; wider buffers contribute their first
    /// two channels.
    pub fn stereo_frame(&self, frame: usize) -> Option<(f32, f32)> {
        if frame >= self.frame_count() {
            return None;
        }
        let channels = self.channel_count as usize;
        let base = frame * channels;
        let left = self.data[base];
        let right = if channels > 1 { self.data[base + 1] } else { left };
        Some((left, right))
    }

    /// Memory used by the sample data in bytes.
    pub fn memory_size(&self) -> usize {
        self.data.len() * std::mem::size_of::<f32>()
    }
}

/// Fetches the raw bytes of an asset. Implementations are blocking; the
/// cache runs them on the blocking thread pool.
pub trait Fetcher: Send + Sync {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, BufferError>;
}

/// The default fetcher: binary HTTP GET for http/https URLs, filesystem
/// reads for everything else (local paths and file:// URLs).
pub struct AssetFetcher {
    client: reqwest::blocking::Client,
}

impl AssetFetcher {
    pub fn new() -> AssetFetcher {
        AssetFetcher {
            client: reqwest::blocking::Client::new(),
        }
    }
}

impl Default for AssetFetcher {
    fn default() -> Self {
        AssetFetcher::new()
    }
}

impl Fetcher for AssetFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, BufferError> {
        if url.starts_with("http://") || url.starts_with("https://") {
            let response = self
                .client
                .get(url)
                .send()
                .and_then(|response| response.error_for_status())
                .map_err(|e| BufferError::Fetch {
                    url: url.to_string(),
                    message: e.to_string(),
                })?;
            let bytes = response.bytes().map_err(|e| BufferError::Fetch {
                url: url.to_string(),
                message: e.to_string(),
            })?;
            return Ok(bytes.to_vec());
        }

        let path = url.strip_prefix("file://").unwrap_or(url);
        std::fs::read(path).map_err(|e| BufferError::Fetch {
            url: url.to_string(),
            message: e.to_string(),
        })
    }
}

/// A cache entry. Failed entries are kept so a bad asset is not refetched
/// on every tick; there is no automatic retry.
#[derive(Clone)]
enum CacheEntry {
    Resolved(AudioBuffer),
    Failed,
}

/// The shared buffer cache.
pub struct BufferCache {
    fetcher: Arc<dyn Fetcher>,
    /// All decoded buffers resample to this rate at load time.
    target_sample_rate: u32,
    entries: RwLock<HashMap<String, CacheEntry>>,
    /// In-flight fetches by URL. Waiters subscribe to the watch channel and
    /// re-check the entries map once the owner finishes.
    pending: Mutex<HashMap<String, watch::Receiver<bool>>>,
}

impl BufferCache {
    /// Creates a new cache resolving assets through the given fetcher.
    pub fn new(fetcher: Arc<dyn Fetcher>, target_sample_rate: u32) -> BufferCache {
        BufferCache {
            fetcher,
            target_sample_rate,
            entries: RwLock::new(HashMap::new()),
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the decoded buffer for a URL if it has been resolved.
    /// Missing and failed entries both return None; the scheduler skips
    /// such samples.
    pub fn get(&self, url: &str) -> Option<AudioBuffer> {
        match self.entries.read().get(url) {
            Some(CacheEntry::Resolved(buffer)) => Some(buffer.clone()),
            _ => None,
        }
    }

    /// Resolves a URL into the cache, fetching and decoding it if needed.
    /// Concurrent calls for the same URL share one in-flight fetch. A URL
    /// that already failed is not retried.
    pub async fn resolve(&self, url: &str) -> Result<AudioBuffer, BufferError> {
        loop {
            match self.entries.read().get(url) {
                Some(CacheEntry::Resolved(buffer)) => return Ok(buffer.clone()),
                Some(CacheEntry::Failed) => {
                    return Err(BufferError::Unresolved {
                        url: url.to_string(),
                    })
                }
                None => {}
            }

            // Either join an in-flight fetch or become the owner of one.
            let (tx, waiter) = {
                let mut pending = self.pending.lock();
                match pending.get(url) {
                    Some(rx) => (None, Some(rx.clone())),
                    None => {
                        let (tx, rx) = watch::channel(false);
                        pending.insert(url.to_string(), rx);
                        (Some(tx), None)
                    }
                }
            };

            if let Some(mut rx) = waiter {
                debug!(url, "Awaiting in-flight fetch");
                // A closed channel means the owner finished; re-check either way.
                let _ = rx.changed().await;
                continue;
            }

            let tx = tx.expect("owner holds the sender");

            // Another owner may have finished between the entries check and
            // winning the pending slot; never fetch a resolved URL twice.
            if self.entries.read().contains_key(url) {
                self.pending.lock().remove(url);
                let _ = tx.send(true);
                continue;
            }

            let result = self.fetch_and_decode(url).await;

            let entry = match &result {
                Ok(buffer) => CacheEntry::Resolved(buffer.clone()),
                Err(e) => {
                    warn!(url, error = %e, "Failed to resolve asset");
                    CacheEntry::Failed
                }
            };
            self.entries.write().insert(url.to_string(), entry);
            self.pending.lock().remove(url);
            let _ = tx.send(true);

            return result;
        }
    }

    /// Number of resolved entries.
    pub fn resolved_count(&self) -> usize {
        self.entries
            .read()
            .values()
            .filter(|entry| matches!(entry, CacheEntry::Resolved(_)))
            .count()
    }

    /// Number of entries that failed to resolve.
    pub fn unresolved_count(&self) -> usize {
        self.entries
            .read()
            .values()
            .filter(|entry| matches!(entry, CacheEntry::Failed))
            .count()
    }

    /// Total memory used by resolved buffers.
    pub fn memory_usage(&self) -> usize {
        self.entries
            .read()
            .values()
            .map(|entry| match entry {
                CacheEntry::Resolved(buffer) => buffer.memory_size(),
                CacheEntry::Failed => 0,
            })
            .sum()
    }

    async fn fetch_and_decode(&self, url: &str) -> Result<AudioBuffer, BufferError> {
        let fetcher = self.fetcher.clone();
        let owned_url = url.to_string();
        let target_sample_rate = self.target_sample_rate;

        // Fetch and decode are blocking; keep them off the runtime workers.
        let result = tokio::task::spawn_blocking(move || {
            let bytes = fetcher.fetch(&owned_url)?;
            decode(&owned_url, bytes, target_sample_rate)
        })
        .await;

        match result {
            Ok(result) => result,
            Err(e) => Err(BufferError::Fetch {
                url: url.to_string(),
                message: format!("fetch task failed: {}", e),
            }),
        }
    }

    #[cfg(test)]
    pub(crate) fn insert_resolved(&self, url: &str, buffer: AudioBuffer) {
        self.entries
            .write()
            .insert(url.to_string(), CacheEntry::Resolved(buffer));
    }
}

impl std::fmt::Debug for BufferCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferCache")
            .field("resolved", &self.resolved_count())
            .field("failed", &self.unresolved_count())
            .field("memory_kb", &(self.memory_usage() / 1024))
            .finish()
    }
}

/// Decodes asset bytes into an interleaved f32 buffer at the target rate.
fn decode(url: &str, bytes: Vec<u8>, target_sample_rate: u32) -> Result<AudioBuffer, BufferError> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());

    let mut hint = Hint::new();
    if let Some(extension) = url.rsplit('.').next() {
        hint.with_extension(extension);
    }

    let meta_opts: MetadataOptions = Default::default();
    let fmt_opts: FormatOptions = Default::default();
    let probed = get_probe()
        .format(&hint, mss, &fmt_opts, &meta_opts)
        .map_err(|e| BufferError::Decode {
            url: url.to_string(),
            source: e,
        })?;

    let mut format_reader = probed.format;
    let track = format_reader
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| BufferError::NoAudioTrack {
            url: url.to_string(),
        })?;
    let track_id = track.id;
    let params = &track.codec_params;

    let sample_rate = params
        .sample_rate
        .ok_or_else(|| BufferError::MissingSampleRate {
            url: url.to_string(),
        })?;

    let mut decoder =
        get_codecs()
            .make(params, &DecoderOptions::default())
            .map_err(|e| BufferError::Decode {
                url: url.to_string(),
                source: e,
            })?;

    let mut samples: Vec<f32> = Vec::new();
    let mut channel_count: u16 = params.channels.map(|c| c.count() as u16).unwrap_or(0);
    let mut sample_buffer: Option<SampleBuffer<f32>> = None;

    loop {
        let packet = match format_reader.next_packet() {
            Ok(packet) => packet,
            // End of stream.
            Err(SymphoniaError::IoError(ref e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => {
                return Err(BufferError::Decode {
                    url: url.to_string(),
                    source: e,
                })
            }
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            // Recoverable decode errors skip the packet.
            Err(SymphoniaError::DecodeError(e)) => {
                debug!(url, error = e, "Skipping undecodable packet");
                continue;
            }
            Err(e) => {
                return Err(BufferError::Decode {
                    url: url.to_string(),
                    source: e,
                })
            }
        };

        let spec = *decoded.spec();
        if channel_count == 0 {
            channel_count = spec.channels.count() as u16;
        }
        let buffer = sample_buffer
            .get_or_insert_with(|| SampleBuffer::new(decoded.capacity() as u64, spec));
        buffer.copy_interleaved_ref(decoded);
        samples.extend_from_slice(buffer.samples());
    }

    if channel_count == 0 {
        return Err(BufferError::NoAudioTrack {
            url: url.to_string(),
        });
    }

    let (samples, sample_rate) = if sample_rate != target_sample_rate {
        let resampled = resample_linear(&samples, channel_count, sample_rate, target_sample_rate);
        (resampled, target_sample_rate)
    } else {
        (samples, sample_rate)
    };

    let buffer = AudioBuffer::new(samples, channel_count, sample_rate);
    info!(
        url,
        channels = channel_count,
        sample_rate,
        duration_ms = (buffer.duration_seconds() * 1000.0) as u64,
        memory_kb = buffer.memory_size() / 1024,
        "Asset decoded"
    );
    Ok(buffer)
}

/// Resamples interleaved samples with linear interpolation. Simple and
/// sufficient for one-shot playback material.
fn resample_linear(
    samples: &[f32],
    channel_count: u16,
    source_rate: u32,
    target_rate: u32,
) -> Vec<f32> {
    let channels = channel_count as usize;
    if channels == 0 || samples.is_empty() {
        return Vec::new();
    }

    let ratio = target_rate as f64 / source_rate as f64;
    let source_frames = samples.len() / channels;
    let target_frames = (source_frames as f64 * ratio).ceil() as usize;

    let mut output = Vec::with_capacity(target_frames * channels);
    for target_frame in 0..target_frames {
        let source_pos = target_frame as f64 / ratio;
        let source_frame = source_pos.floor() as usize;
        let frac = source_pos.fract() as f32;

        for channel in 0..channels {
            let idx0 = source_frame * channels + channel;
            let idx1 = (source_frame + 1) * channels + channel;

            let s0 = samples.get(idx0).copied().unwrap_or(0.0);
            let s1 = samples.get(idx1).copied().unwrap_or(s0);
            output.push(s0 + (s1 - s0) * frac);
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{wav_bytes, MockFetcher};

    fn cache_with(fetcher: MockFetcher) -> BufferCache {
        BufferCache::new(Arc::new(fetcher), 44100)
    }

    #[tokio::test]
    async fn test_resolve_and_get() {
        let fetcher = MockFetcher::new();
        fetcher.add("kick.wav", wav_bytes(44100, 1, 4410));
        let cache = cache_with(fetcher);

        let buffer = cache.resolve("kick.wav").await.expect("asset resolves");
        assert_eq!(buffer.channel_count(), 1);
        assert_eq!(buffer.sample_rate(), 44100);
        assert_eq!(buffer.frame_count(), 4410);
        assert!((buffer.duration_seconds() - 0.1).abs() < 1e-6);

        let cached = cache.get("kick.wav").expect("buffer is cached");
        assert_eq!(cached.frame_count(), 4410);
        assert_eq!(cache.resolved_count(), 1);
    }

    #[tokio::test]
    async fn test_resolve_resamples_to_target_rate() {
        let fetcher = MockFetcher::new();
        fetcher.add("loop.wav", wav_bytes(22050, 2, 2205));
        let cache = cache_with(fetcher);

        let buffer = cache.resolve("loop.wav").await.expect("asset resolves");
        assert_eq!(buffer.sample_rate(), 44100);
        assert_eq!(buffer.channel_count(), 2);
        // Duration is preserved through the resample.
        assert!((buffer.duration_seconds() - 0.1).abs() < 1e-3);
    }

    #[tokio::test]
    async fn test_failed_fetch_is_not_retried() {
        let fetcher = MockFetcher::new();
        let cache = cache_with(fetcher);

        assert!(cache.resolve("missing.wav").await.is_err());
        assert!(cache.get("missing.wav").is_none());
        assert_eq!(cache.unresolved_count(), 1);

        // The second resolve fails without another fetch attempt.
        assert!(matches!(
            cache.resolve("missing.wav").await,
            Err(BufferError::Unresolved { .. })
        ));
    }

    #[tokio::test]
    async fn test_concurrent_resolves_share_one_fetch() {
        let fetcher = MockFetcher::new();
        fetcher.add("pad.wav", wav_bytes(44100, 1, 44100));
        let fetch_count = fetcher.fetch_count();
        let cache = Arc::new(cache_with(fetcher));

        let mut joins = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            joins.push(tokio::spawn(
                async move { cache.resolve("pad.wav").await },
            ));
        }
        for join in joins {
            join.await
                .expect("task completes")
                .expect("asset resolves");
        }

        assert_eq!(fetch_count.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert_eq!(cache.resolved_count(), 1);
    }

    #[test]
    fn test_stereo_frame_mapping() {
        let mono = AudioBuffer::new(vec![0.5, -0.5], 1, 44100);
        assert_eq!(mono.stereo_frame(0), Some((0.5, 0.5)));
        assert_eq!(mono.stereo_frame(1), Some((-0.5, -0.5)));
        assert_eq!(mono.stereo_frame(2), None);

        let stereo = AudioBuffer::new(vec![0.1, 0.2, 0.3, 0.4], 2, 44100);
        assert_eq!(stereo.stereo_frame(0), Some((0.1, 0.2)));
        assert_eq!(stereo.stereo_frame(1), Some((0.3, 0.4)));
    }

    #[test]
    fn test_resample_linear_length() {
        let samples: Vec<f32> = (0..441).map(|i| (i as f32 / 441.0).sin()).collect();
        let resampled = resample_linear(&samples, 1, 22050, 44100);
        assert_eq!(resampled.len(), 882);
    }
}
