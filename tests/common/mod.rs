//! In-memory collaborators for driving the player without Discord or ffmpeg.
#![allow(dead_code)]

use async_trait::async_trait;
use guild_audio::{
    audio::{
        backend::{
            AudioBackend, Completion, EncodeOptions, EncodingSession, EncodingStats, StreamingSession,
            VoiceConnection,
        },
        metrics::DurationProbe,
        player::{Player, PlayerSettings},
        song::{Song, SourceKind},
    },
    error::{HistoryError, StreamError, VoiceError},
    history::HistoryRecorder,
};
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId};
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicU32, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::sync::oneshot;

pub fn guild() -> GuildId {
    GuildId::new(1)
}

pub fn channel(id: u64) -> ChannelId {
    ChannelId::new(id)
}

pub fn song(id: &str, secs: u64) -> Song {
    Song::new(format!("Song {id}"), format!("/music/{id}.mp3"), id, SourceKind::LocalFile)
        .with_duration(Duration::from_secs(secs))
}

pub fn live(id: &str) -> Song {
    Song::new(format!("Radio {id}"), format!("https://radio.example.com/{id}"), id, SourceKind::Stream)
}

/// Polls `cond` on the (usually paused) test clock until it holds.
pub async fn wait_until(what: &str, mut cond: impl FnMut() -> bool) {
    for _ in 0..2_000 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for: {what}");
}

// Voice

pub struct FakeVoice {
    guild_id: GuildId,
    channel_id: ChannelId,
    ready: bool,
    disconnects: Arc<AtomicU32>,
    speaking: Arc<Mutex<Vec<bool>>>,
}

#[async_trait]
impl VoiceConnection for FakeVoice {
    fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    fn channel_id(&self) -> ChannelId {
        self.channel_id
    }

    async fn is_ready(&self) -> bool {
        self.ready
    }

    async fn set_speaking(&self, speaking: bool) -> Result<(), VoiceError> {
        self.speaking.lock().push(speaking);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), VoiceError> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// Encoding

pub struct FakeEncoding {
    options: EncodeOptions,
    encoded: Arc<Mutex<Duration>>,
    cleanups: Arc<AtomicU32>,
}

impl EncodingSession for FakeEncoding {
    fn stats(&self) -> EncodingStats {
        EncodingStats {
            encoded_duration: *self.encoded.lock(),
        }
    }

    fn options(&self) -> &EncodeOptions {
        &self.options
    }

    fn stop(&self) {}

    fn cleanup(&self) {
        self.cleanups.fetch_add(1, Ordering::SeqCst);
    }
}

// Stream

#[derive(Default)]
struct StreamState {
    paused: AtomicBool,
    stopped: AtomicBool,
    position: Mutex<Duration>,
}

pub struct FakeStream {
    state: Arc<StreamState>,
    confirm_pause: bool,
}

#[async_trait]
impl StreamingSession for FakeStream {
    fn set_paused(&self, paused: bool) -> Result<(), StreamError> {
        if self.confirm_pause {
            self.state.paused.store(paused, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn paused(&self) -> bool {
        self.state.paused.load(Ordering::SeqCst)
    }

    async fn playback_position(&self) -> Duration {
        *self.state.position.lock()
    }

    async fn finished(&self) -> (bool, Option<StreamError>) {
        (false, None)
    }

    fn stop(&self) {
        self.state.stopped.store(true, Ordering::SeqCst);
    }
}

/// Test-side handle on one started stream.
struct StreamControl {
    state: Arc<StreamState>,
    encoded: Arc<Mutex<Duration>>,
    completion: Option<oneshot::Sender<Result<(), StreamError>>>,
}

// Backend

#[derive(Default)]
pub struct FakeBackend {
    joins: Mutex<Vec<ChannelId>>,
    encodes: Mutex<Vec<(String, Duration)>>,
    streams: Mutex<Vec<StreamControl>>,
    join_failures: AtomicU32,
    unready_joins: AtomicU32,
    encode_failures: AtomicU32,
    refuse_pause: AtomicBool,
    pub cleanups: Arc<AtomicU32>,
    pub disconnects: Arc<AtomicU32>,
    pub speaking: Arc<Mutex<Vec<bool>>>,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// The next `n` joins fail.
    pub fn fail_joins(&self, n: u32) {
        self.join_failures.store(n, Ordering::SeqCst);
    }

    /// The next `n` joins return a handle that never becomes ready.
    pub fn unready_joins(&self, n: u32) {
        self.unready_joins.store(n, Ordering::SeqCst);
    }

    pub fn fail_encodes(&self, n: u32) {
        self.encode_failures.store(n, Ordering::SeqCst);
    }

    /// Streams started from now on ignore pause requests.
    pub fn refuse_pause(&self) {
        self.refuse_pause.store(true, Ordering::SeqCst);
    }

    pub fn joins(&self) -> Vec<ChannelId> {
        self.joins.lock().clone()
    }

    /// `(locator, start offset)` of every encode request.
    pub fn encodes(&self) -> Vec<(String, Duration)> {
        self.encodes.lock().clone()
    }

    pub fn stream_count(&self) -> usize {
        self.streams.lock().len()
    }

    pub fn cleanup_count(&self) -> u32 {
        self.cleanups.load(Ordering::SeqCst)
    }

    pub fn disconnect_count(&self) -> u32 {
        self.disconnects.load(Ordering::SeqCst)
    }

    pub fn last_stream_stopped(&self) -> bool {
        self.streams
            .lock()
            .last()
            .is_some_and(|s| s.state.stopped.load(Ordering::SeqCst))
    }

    /// Ends the most recent stream after `streamed` of audio went out and the
    /// encoder produced `encoded`.
    pub fn finish_current(&self, result: Result<(), StreamError>, encoded: Duration, streamed: Duration) {
        let mut streams = self.streams.lock();
        let control = streams.last_mut().expect("no stream started");
        *control.encoded.lock() = encoded;
        *control.state.position.lock() = streamed;
        let sender = control.completion.take().expect("stream already finished");
        let _ = sender.send(result);
    }
}

#[async_trait]
impl AudioBackend for FakeBackend {
    type Voice = FakeVoice;
    type Encoding = FakeEncoding;
    type Stream = FakeStream;

    async fn join(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<FakeVoice, VoiceError> {
        self.joins.lock().push(channel_id);

        if self
            .join_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(VoiceError::Join("gateway timeout".into()));
        }
        let ready = self
            .unready_joins
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_err();

        Ok(FakeVoice {
            guild_id,
            channel_id,
            ready,
            disconnects: Arc::clone(&self.disconnects),
            speaking: Arc::clone(&self.speaking),
        })
    }

    async fn encode(&self, locator: &str, options: &EncodeOptions) -> Result<FakeEncoding, String> {
        self.encodes.lock().push((locator.to_string(), options.start_offset));

        if self
            .encode_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err("no such file".into());
        }

        Ok(FakeEncoding {
            options: options.clone(),
            encoded: Arc::new(Mutex::new(Duration::ZERO)),
            cleanups: Arc::clone(&self.cleanups),
        })
    }

    async fn stream(
        &self,
        encoding: &FakeEncoding,
        _voice: &FakeVoice,
    ) -> Result<(FakeStream, Completion), StreamError> {
        let (tx, rx) = oneshot::channel();
        let state = Arc::new(StreamState::default());

        self.streams.lock().push(StreamControl {
            state: Arc::clone(&state),
            encoded: Arc::clone(&encoding.encoded),
            completion: Some(tx),
        });

        let stream = FakeStream {
            state,
            confirm_pause: !self.refuse_pause.load(Ordering::SeqCst),
        };
        Ok((stream, rx))
    }
}

// History

#[derive(Default)]
pub struct FakeHistory {
    first_plays: Mutex<Vec<String>>,
    counts: Mutex<HashMap<String, u32>>,
    seconds: Mutex<HashMap<String, f64>>,
}

impl FakeHistory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn first_plays(&self) -> Vec<String> {
        self.first_plays.lock().clone()
    }

    pub fn play_count(&self, song_id: &str) -> u32 {
        self.counts.lock().get(song_id).copied().unwrap_or(0)
    }

    pub fn seconds(&self, song_id: &str) -> f64 {
        self.seconds.lock().get(song_id).copied().unwrap_or(0.0)
    }
}

#[async_trait]
impl HistoryRecorder for FakeHistory {
    async fn add_track_to_history(&self, _guild_id: GuildId, song: &Song) -> Result<(), HistoryError> {
        self.first_plays.lock().push(song.song_id.clone());
        Ok(())
    }

    async fn add_playback_count_stats(&self, _guild_id: GuildId, song_id: &str) -> Result<(), HistoryError> {
        *self.counts.lock().entry(song_id.to_string()).or_default() += 1;
        Ok(())
    }

    async fn add_playback_duration_stats(
        &self,
        _guild_id: GuildId,
        song_id: &str,
        delta_seconds: f64,
    ) -> Result<(), HistoryError> {
        *self.seconds.lock().entry(song_id.to_string()).or_default() += delta_seconds;
        Ok(())
    }

    async fn get_track_from_history(&self, _guild_id: GuildId, id: i64) -> Result<Song, HistoryError> {
        Err(HistoryError::NotFound(id))
    }
}

/// Uses the song's own metadata, never the locator.
pub struct FakeProbe;

#[async_trait]
impl DurationProbe for FakeProbe {
    async fn song_duration(&self, song: &Song) -> Option<Duration> {
        song.duration
    }
}

pub struct Harness {
    pub backend: Arc<FakeBackend>,
    pub history: Arc<FakeHistory>,
    pub player: Arc<Player<FakeBackend>>,
}

pub fn harness() -> Harness {
    harness_with(PlayerSettings::default())
}

pub fn harness_with(settings: PlayerSettings) -> Harness {
    let backend = FakeBackend::new();
    let history = FakeHistory::new();
    let player = Arc::new(Player::new(
        guild(),
        channel(10),
        Arc::clone(&backend),
        history.clone(),
        Arc::new(FakeProbe),
        settings,
    ));

    Harness {
        backend,
        history,
        player,
    }
}
