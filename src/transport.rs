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

//! The transport: play/pause/stop/seek and the scheduling loops.
//!
//! Two polling loops run while the transport is playing. The look-ahead loop
//! walks the timeline every ~25ms and queues every sample starting within
//! the overlap window onto the audio graph; actual start/stop execution is
//! sample-accurate on the graph clock, so timer jitter only affects how
//! early a sample gets queued, never when it sounds. The position loop
//! derives the playhead beat from the audio clock and publishes it to the
//! state container at roughly UI frame rate.
//!
//! All scheduling math is anchored at the last play transition
//! (`playing_start_time`/`playing_start_beat`), which makes ticks
//! idempotent: re-resolving a sample on a later tick yields the same
//! absolute times.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::buffers::BufferCache;
use crate::config::EngineConfig;
use crate::graph::AudioGraph;
use crate::mixer;
use crate::player::{PlaybackUnit, Player};
use crate::playsync::CancelHandle;
use crate::resolve::resolve;
use crate::store::{Command, Dispatch, StateReader, TransportState};
use crate::time::seconds_to_beats;
use crate::timeline::SampleKind;

/// The handles of the spawned polling loops.
struct LoopHandles {
    cancel: CancelHandle,
    lookahead: JoinHandle<()>,
    position: JoinHandle<()>,
}

/// The playback transport. State lives in the injected store; the transport
/// owns only the live playback units and the polling loops.
pub struct Transport {
    state: Arc<dyn StateReader>,
    dispatch: Arc<dyn Dispatch>,
    graph: Arc<AudioGraph>,
    player: Player,
    cache: Arc<BufferCache>,

    /// Scheduling overlap window in seconds.
    overlap_window: f64,
    lookahead_period: Duration,
    position_update_period: Duration,

    /// Live playback units by sample id. Doubles as the idempotence guard:
    /// a sample with a live unit is never scheduled again.
    scheduled: Mutex<HashMap<u64, PlaybackUnit>>,
    loops: Mutex<Option<LoopHandles>>,
}

impl Transport {
    /// Creates a transport over the given state container, audio graph and
    /// buffer cache.
    pub fn new(
        state: Arc<dyn StateReader>,
        dispatch: Arc<dyn Dispatch>,
        graph: Arc<AudioGraph>,
        cache: Arc<BufferCache>,
        config: &EngineConfig,
    ) -> Transport {
        let player = Player::new(graph.source_sender());
        Transport {
            state,
            dispatch,
            graph,
            player,
            cache,
            overlap_window: config.overlap_window(),
            lookahead_period: config.lookahead_period(),
            position_update_period: config.position_update_period(),
            scheduled: Mutex::new(HashMap::new()),
            loops: Mutex::new(None),
        }
    }

    /// Starts playback from the current beat. Everything audible at the
    /// playhead is scheduled immediately (mid-sample starts resume at the
    /// right offset); the polling loops pick up everything after that.
    pub fn play(self: &Arc<Self>) {
        let now = self.graph.now_seconds();
        info!(
            start_time = now,
            beat = self.state.transport().current_beat,
            "Starting playback"
        );

        self.dispatch.dispatch(Command::Play { start_time: now });
        self.lookahead_tick();
        self.spawn_loops();
    }

    /// Pauses playback, freezing the playhead where it is. Live units ramp
    /// out; a following play resumes from the frozen beat.
    pub fn pause(&self) {
        info!(
            beat = self.state.transport().current_beat,
            "Pausing playback"
        );
        self.stop_loops();
        self.dispatch.dispatch(Command::Pause);
        self.stop_units();
    }

    /// Stops playback and rewinds to the start of the song.
    pub fn stop(&self) {
        info!("Stopping playback");
        self.stop_loops();
        self.dispatch.dispatch(Command::Stop);
        self.stop_units();
    }

    /// Moves the playhead. While playing this is a live seek: sounding
    /// units are stopped, the position math is re-anchored at the audio
    /// clock, and whatever is audible at the new position starts at its
    /// correct mid-sample offset.
    pub fn seek(&self, beat: f64) {
        debug!(beat, "Seeking");
        self.stop_units();
        self.dispatch.dispatch(Command::SetCurrentBeat { beat });

        if self.state.transport().playing {
            let now = self.graph.now_seconds();
            self.dispatch.dispatch(Command::Play { start_time: now });
            self.lookahead_tick();
        }
    }

    /// Whether the polling loops are running.
    pub fn is_running(&self) -> bool {
        self.loops.lock().is_some()
    }

    /// The number of live playback units.
    pub fn scheduled_count(&self) -> usize {
        self.scheduled.lock().len()
    }

    /// Pre-resolves every asset the timeline references, raising the
    /// loading flag while fetches are in flight. Samples whose assets fail
    /// stay silent during playback but never block it.
    pub async fn revalidate(&self) {
        let urls = self.state.timeline().asset_urls();
        if urls.is_empty() {
            return;
        }

        self.dispatch
            .dispatch(Command::SetSampleLoading { loading: true });
        for url in &urls {
            // Failures are cached and logged inside the cache; playback
            // skips unresolved samples.
            let _ = self.cache.resolve(url).await;
        }
        self.dispatch
            .dispatch(Command::SetSampleLoading { loading: false });

        info!(
            assets = urls.len(),
            resolved = self.cache.resolved_count(),
            failed = self.cache.unresolved_count(),
            "Assets validated"
        );
    }

    /// One pass of the look-ahead loop: evict finished units, schedule every
    /// sample whose resolved start falls within the overlap window, and
    /// refresh live gains from the current mix state.
    pub fn lookahead_tick(&self) {
        let state = self.state.transport();
        if !state.playing {
            return;
        }

        let now = self.graph.now_seconds();
        let timeline = self.state.timeline();
        let tracks = timeline.tracks();
        let mut scheduled = self.scheduled.lock();

        scheduled.retain(|_, unit| unit.end_time() > now);

        for (track_index, track) in tracks.iter().enumerate() {
            for sample in track.samples() {
                if scheduled.contains_key(&sample.id()) {
                    continue;
                }

                // Anchoring at the play transition keeps resolved times
                // stable across ticks.
                let resolved = resolve(
                    state.playing_start_time,
                    state.playing_start_beat,
                    state.tempo,
                    sample,
                );
                if !resolved.starts_within(now, self.overlap_window) {
                    continue;
                }

                let settings = mixer::mix_settings(tracks, track_index, state.volume);
                let unit = match sample.kind() {
                    SampleKind::Audio => match self.cache.get(sample.url()) {
                        Some(buffer) => self.player.schedule_audio(
                            sample,
                            track_index,
                            &resolved,
                            buffer,
                            settings,
                        ),
                        None => {
                            // Unresolved asset: skip silently, keep playing.
                            debug!(
                                sample = sample.id(),
                                url = sample.url(),
                                "Skipping sample with unresolved buffer"
                            );
                            continue;
                        }
                    },
                    SampleKind::Pattern => self.player.schedule_pattern(
                        sample,
                        track_index,
                        &resolved,
                        state.tempo,
                        now,
                        settings,
                    ),
                };
                scheduled.insert(sample.id(), unit);
            }
        }

        // Track/master volume changes apply to sounding units in real time.
        for unit in scheduled.values() {
            unit.set_gain(mixer::effective_volume(
                tracks,
                unit.track_index(),
                state.volume,
            ));
        }
    }

    /// One pass of the position loop: derive the playhead beat from the
    /// audio clock and publish it, wrapping to the loop start when looping
    /// is enabled and the region end was reached.
    pub fn position_tick(&self) {
        let state = self.state.transport();
        if !state.playing {
            return;
        }

        let now = self.graph.now_seconds();
        let beat = derive_beat(&state, now);

        if state.loop_enabled
            && state.loop_region.stop > state.loop_region.start
            && beat >= state.loop_region.stop
        {
            debug!(
                beat,
                loop_start = state.loop_region.start,
                "Loop region end reached"
            );
            self.seek(state.loop_region.start);
            return;
        }

        self.dispatch.dispatch(Command::SetCurrentBeat { beat });
    }

    fn spawn_loops(self: &Arc<Self>) {
        let mut loops = self.loops.lock();
        if let Some(handles) = loops.take() {
            handles.cancel.cancel();
            handles.lookahead.abort();
            handles.position.abort();
        }

        let cancel = CancelHandle::new();

        let lookahead = {
            let transport = self.clone();
            let cancel = cancel.clone();
            let period = self.lookahead_period;
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(period);
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = interval.tick() => transport.lookahead_tick(),
                    }
                }
                debug!("Look-ahead loop stopped");
            })
        };

        let position = {
            let transport = self.clone();
            let cancel = cancel.clone();
            let period = self.position_update_period;
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(period);
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = interval.tick() => transport.position_tick(),
                    }
                }
                debug!("Position loop stopped");
            })
        };

        *loops = Some(LoopHandles {
            cancel,
            lookahead,
            position,
        });
    }

    /// Stops the polling loops. Explicit and idempotent; also invoked on
    /// drop so an abandoned transport never leaves loops ticking.
    fn stop_loops(&self) {
        if let Some(handles) = self.loops.lock().take() {
            handles.cancel.cancel();
        }
    }

    fn stop_units(&self) {
        let mut scheduled = self.scheduled.lock();
        for unit in scheduled.values() {
            unit.stop();
        }
        scheduled.clear();
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.stop_loops();
    }
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("running", &self.is_running())
            .field("scheduled", &self.scheduled_count())
            .finish()
    }
}

/// Derives the playhead beat from the audio clock and the play anchor.
fn derive_beat(state: &TransportState, now: f64) -> f64 {
    state.playing_start_beat + seconds_to_beats(now - state.playing_start_time, state.tempo)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffers::AudioBuffer;
    use crate::graph::CHANNEL_COUNT;
    use crate::store::{LoopRegion, MemoryStore};
    use crate::timeline::{Fade, Note, Sample, Timeline, Track, TICKS_PER_BEAT};

    struct Fixture {
        store: Arc<MemoryStore>,
        graph: Arc<AudioGraph>,
        cache: Arc<BufferCache>,
        transport: Arc<Transport>,
    }

    fn fixture(timeline: Timeline) -> Fixture {
        let store = Arc::new(MemoryStore::new(timeline));
        let graph = Arc::new(AudioGraph::new(44100));
        let cache = Arc::new(BufferCache::new(
            Arc::new(crate::testutil::MockFetcher::new()),
            44100,
        ));
        let transport = Arc::new(Transport::new(
            store.clone(),
            store.clone(),
            graph.clone(),
            cache.clone(),
            &EngineConfig::default(),
        ));
        Fixture {
            store,
            graph,
            cache,
            transport,
        }
    }

    fn one_audio_sample() -> Timeline {
        Timeline::new(vec![Track::new(1.0, 0.0, false, false).with_samples(
            vec![Sample::audio(1, 1.0, 4.0, "kick.wav", Fade::default())],
        )])
    }

    fn silent_buffer(seconds: f64) -> AudioBuffer {
        AudioBuffer::new(vec![0.0; (44100.0 * seconds) as usize], 1, 44100)
    }

    #[test]
    fn test_tick_schedules_audible_sample_once() {
        let fx = fixture(one_audio_sample());
        fx.cache.insert_resolved("kick.wav", silent_buffer(4.0));

        fx.store.dispatch(Command::Play { start_time: 0.0 });
        fx.transport.lookahead_tick();
        assert_eq!(fx.transport.scheduled_count(), 1);
        assert_eq!(fx.graph.source_count(), 1);

        // Repeated ticks do not double-schedule.
        fx.transport.lookahead_tick();
        fx.transport.lookahead_tick();
        assert_eq!(fx.transport.scheduled_count(), 1);
        assert_eq!(fx.graph.source_count(), 1);
    }

    #[test]
    fn test_unresolved_buffer_is_skipped_silently() {
        let fx = fixture(one_audio_sample());

        fx.store.dispatch(Command::Play { start_time: 0.0 });
        fx.transport.lookahead_tick();
        assert_eq!(fx.transport.scheduled_count(), 0);
        assert_eq!(fx.graph.source_count(), 0);
    }

    #[test]
    fn test_future_sample_waits_for_window() {
        // A sample at beat 3: one second away at 120 BPM, far outside the
        // 100ms overlap window.
        let timeline = Timeline::new(vec![Track::new(1.0, 0.0, false, false).with_samples(
            vec![Sample::audio(1, 3.0, 2.0, "kick.wav", Fade::default())],
        )]);
        let fx = fixture(timeline);
        fx.cache.insert_resolved("kick.wav", silent_buffer(2.0));

        fx.store.dispatch(Command::Play { start_time: 0.0 });
        fx.transport.lookahead_tick();
        assert_eq!(fx.transport.scheduled_count(), 0);

        // 950ms in, the sample start is 50ms away: inside the window.
        fx.graph.advance_seconds(0.95);
        fx.transport.lookahead_tick();
        assert_eq!(fx.transport.scheduled_count(), 1);
    }

    #[test]
    fn test_position_advances_with_audio_clock() {
        let fx = fixture(one_audio_sample());
        fx.store.dispatch(Command::SetTempo { tempo: 60.0 });
        fx.store.dispatch(Command::Play { start_time: 0.0 });

        // Five seconds at 60 BPM moves the playhead five beats.
        fx.graph.advance_seconds(5.0);
        fx.transport.position_tick();
        assert!((fx.store.transport().current_beat - 6.0).abs() < 1e-6);
    }

    #[test]
    fn test_pause_freezes_and_resume_continues() {
        let fx = fixture(one_audio_sample());
        fx.store.dispatch(Command::SetTempo { tempo: 120.0 });
        fx.store.dispatch(Command::Play { start_time: 0.0 });

        // Two seconds at 120 BPM: beat 5.
        fx.graph.advance_seconds(2.0);
        fx.transport.position_tick();
        assert!((fx.store.transport().current_beat - 5.0).abs() < 1e-6);

        fx.store.dispatch(Command::Pause);
        fx.graph.advance_seconds(3.0);
        fx.transport.position_tick();
        assert!((fx.store.transport().current_beat - 5.0).abs() < 1e-6);

        // Resume re-anchors at the current clock; one more second adds two
        // beats from where playback paused.
        fx.store.dispatch(Command::Play {
            start_time: fx.graph.now_seconds(),
        });
        fx.graph.advance_seconds(1.0);
        fx.transport.position_tick();
        assert!((fx.store.transport().current_beat - 7.0).abs() < 1e-6);
    }

    #[test]
    fn test_resume_mid_sample_uses_offset() {
        let fx = fixture(one_audio_sample());
        fx.cache.insert_resolved("kick.wav", silent_buffer(4.0));

        // Playhead two beats into the sample before play.
        fx.store.dispatch(Command::SetCurrentBeat { beat: 3.0 });
        fx.store.dispatch(Command::Play { start_time: 0.0 });
        fx.transport.lookahead_tick();
        assert_eq!(fx.transport.scheduled_count(), 1);

        let state = fx.store.transport();
        let timeline = fx.store.timeline();
        let (_, sample) = timeline.sample(1).expect("sample present");
        let resolved = resolve(
            state.playing_start_time,
            state.playing_start_beat,
            state.tempo,
            sample,
        );
        // 120 BPM: two beats is one second into the sample.
        assert!((resolved.offset - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_loop_wraps_to_region_start() {
        let state = TransportState {
            tempo: 60.0,
            loop_enabled: true,
            loop_region: LoopRegion {
                start: 1.0,
                stop: 2.0,
            },
            ..TransportState::default()
        };
        let store = Arc::new(MemoryStore::with_transport(one_audio_sample(), state));
        let graph = Arc::new(AudioGraph::new(44100));
        let cache = Arc::new(BufferCache::new(
            Arc::new(crate::testutil::MockFetcher::new()),
            44100,
        ));
        let transport = Arc::new(Transport::new(
            store.clone(),
            store.clone(),
            graph.clone(),
            cache.clone(),
            &EngineConfig::default(),
        ));
        let fx = Fixture {
            store,
            graph,
            cache,
            transport,
        };

        fx.store.dispatch(Command::Play { start_time: 0.0 });
        // 1.2 seconds at 60 BPM crosses the loop end at beat 2.
        fx.graph.advance_seconds(1.2);
        fx.transport.position_tick();

        let state = fx.store.transport();
        assert!(state.playing);
        assert!((state.current_beat - 1.0).abs() < 1e-6);
        // Position math is re-anchored at the wrap.
        assert!((state.playing_start_beat - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_volume_change_applies_to_live_units() {
        let timeline = Timeline::new(vec![Track::new(1.0, 0.0, false, false).with_samples(
            vec![Sample::audio(1, 1.0, 4.0, "kick.wav", Fade::default())],
        )]);
        let fx = fixture(timeline);
        fx.cache
            .insert_resolved("kick.wav", AudioBuffer::new(vec![1.0; 44100], 1, 44100));

        fx.store.dispatch(Command::Play { start_time: 0.0 });
        fx.transport.lookahead_tick();

        let mut block = vec![0.0f32; 441 * CHANNEL_COUNT];
        fx.graph.render(&mut block);
        assert!(block[0] > 0.1);

        fx.store.dispatch(Command::SetVolume { volume: 0.0 });
        fx.transport.lookahead_tick();
        fx.graph.render(&mut block);
        assert!(block.iter().all(|sample| sample.abs() < 1e-6));
    }

    #[test]
    fn test_ended_units_are_evicted() {
        // One beat long at 120 BPM: half a second of sound.
        let timeline = Timeline::new(vec![Track::new(1.0, 0.0, false, false).with_samples(
            vec![Sample::audio(1, 1.0, 1.0, "kick.wav", Fade::default())],
        )]);
        let fx = fixture(timeline);
        fx.cache.insert_resolved("kick.wav", silent_buffer(1.0));

        fx.store.dispatch(Command::Play { start_time: 0.0 });
        fx.transport.lookahead_tick();
        assert_eq!(fx.transport.scheduled_count(), 1);

        fx.graph.advance_seconds(1.0);
        fx.transport.lookahead_tick();
        assert_eq!(fx.transport.scheduled_count(), 0);
    }

    #[tokio::test]
    async fn test_play_starts_and_stop_halts_loops() {
        let fx = fixture(one_audio_sample());
        fx.cache.insert_resolved("kick.wav", silent_buffer(4.0));

        fx.transport.play();
        assert!(fx.transport.is_running());
        assert!(fx.store.transport().playing);
        assert_eq!(fx.transport.scheduled_count(), 1);

        fx.transport.stop();
        assert!(!fx.transport.is_running());
        let state = fx.store.transport();
        assert!(!state.playing);
        assert_eq!(state.current_beat, crate::time::MIN_BEAT);
        assert_eq!(fx.transport.scheduled_count(), 0);
    }

    #[tokio::test]
    async fn test_position_loop_publishes_beat() {
        let fx = fixture(one_audio_sample());
        fx.cache.insert_resolved("kick.wav", silent_buffer(4.0));

        fx.transport.play();
        // One second at the default 120 BPM moves the playhead to beat 3;
        // the spawned position loop publishes it without explicit ticks.
        fx.graph.advance_seconds(1.0);
        crate::testutil::eventually_async(
            || (fx.store.transport().current_beat - 3.0).abs() < 1e-6,
            "position loop never published beat 3",
        )
        .await;
        fx.transport.stop();
    }

    #[tokio::test]
    async fn test_pause_keeps_playhead_for_resume() {
        let fx = fixture(one_audio_sample());
        fx.cache.insert_resolved("kick.wav", silent_buffer(4.0));

        fx.transport.play();
        fx.graph.advance_seconds(1.0);
        fx.transport.position_tick();
        fx.transport.pause();

        let paused_beat = fx.store.transport().current_beat;
        assert!(paused_beat > 1.0);
        assert!(!fx.transport.is_running());

        fx.transport.play();
        assert!((fx.store.transport().playing_start_beat - paused_beat).abs() < 1e-9);
        fx.transport.stop();
    }

    #[tokio::test]
    async fn test_seek_while_playing_reschedules() {
        // Two samples far apart; seeking jumps from one to the other.
        let timeline = Timeline::new(vec![Track::new(1.0, 0.0, false, false).with_samples(
            vec![
                Sample::audio(1, 1.0, 2.0, "a.wav", Fade::default()),
                Sample::audio(2, 50.0, 2.0, "b.wav", Fade::default()),
            ],
        )]);
        let fx = fixture(timeline);
        fx.cache.insert_resolved("a.wav", silent_buffer(1.0));
        fx.cache.insert_resolved("b.wav", silent_buffer(1.0));

        fx.transport.play();
        assert_eq!(fx.transport.scheduled_count(), 1);

        fx.transport.seek(50.0);
        let scheduled = fx.transport.scheduled.lock();
        assert_eq!(scheduled.len(), 1);
        assert!(scheduled.contains_key(&2));
        drop(scheduled);

        assert!((fx.store.transport().current_beat - 50.0).abs() < 1e-9);
        fx.transport.stop();
    }

    #[tokio::test]
    async fn test_revalidate_toggles_loading_flag_and_resolves() {
        let fetcher = crate::testutil::MockFetcher::new();
        fetcher.add("kick.wav", crate::testutil::wav_bytes(44100, 1, 4410));
        let store = Arc::new(MemoryStore::new(one_audio_sample()));
        let graph = Arc::new(AudioGraph::new(44100));
        let cache = Arc::new(BufferCache::new(Arc::new(fetcher), 44100));
        let transport = Arc::new(Transport::new(
            store.clone(),
            store.clone(),
            graph,
            cache.clone(),
            &EngineConfig::default(),
        ));

        transport.revalidate().await;
        assert!(!store.transport().sample_loading);
        assert_eq!(cache.resolved_count(), 1);
        assert!(cache.get("kick.wav").is_some());
    }

    #[test]
    fn test_pattern_sample_schedules_without_cache() {
        let timeline = Timeline::new(vec![Track::new(1.0, 0.0, false, false).with_samples(
            vec![Sample::pattern(
                5,
                1.0,
                2.0,
                vec![
                    Note::new(0, 49, 127, TICKS_PER_BEAT),
                    Note::new(TICKS_PER_BEAT, 53, 100, TICKS_PER_BEAT),
                ],
            )],
        )]);
        let fx = fixture(timeline);

        fx.store.dispatch(Command::Play { start_time: 0.0 });
        fx.transport.lookahead_tick();
        assert_eq!(fx.transport.scheduled_count(), 1);
        assert_eq!(fx.graph.source_count(), 2);
    }
}
