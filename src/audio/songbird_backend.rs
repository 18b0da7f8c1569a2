//! Backend de producción: llamadas de songbird como transporte de voz, un
//! proceso ffmpeg como sesión de codificación y una pista de songbird como
//! sesión de transmisión.

use async_trait::async_trait;
use parking_lot::Mutex as SyncMutex;
use serenity::model::id::{ChannelId, GuildId};
use songbird::{
    input::{AudioStream, Input, LiveInput},
    tracks::{PlayMode, TrackHandle},
    Call, Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::{
    io::{BufRead, BufReader},
    process::{Child, ChildStdout, Command, Stdio},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use symphonia::core::{
    io::{MediaSource, ReadOnlySource},
    probe::Hint,
};
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, info, warn};

use crate::{
    audio::backend::{
        AudioBackend, Completion, EncodeOptions, EncodingSession, EncodingStats, StreamingSession, VoiceConnection,
    },
    error::{StreamError, VoiceError},
};

pub struct SongbirdBackend {
    manager: Arc<Songbird>,
    ffmpeg_path: String,
}

impl SongbirdBackend {
    pub fn new(manager: Arc<Songbird>, ffmpeg_path: impl Into<String>) -> Self {
        Self {
            manager,
            ffmpeg_path: ffmpeg_path.into(),
        }
    }
}

/// Conexión de voz de songbird para un guild
pub struct SongbirdVoice {
    manager: Arc<Songbird>,
    call: Arc<Mutex<Call>>,
    guild_id: GuildId,
    channel_id: ChannelId,
}

#[async_trait]
impl VoiceConnection for SongbirdVoice {
    fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    fn channel_id(&self) -> ChannelId {
        self.channel_id
    }

    async fn is_ready(&self) -> bool {
        self.call.lock().await.current_connection().is_some()
    }

    async fn set_speaking(&self, speaking: bool) -> Result<(), VoiceError> {
        // El driver marca speaking por paquete; al dejar de hablar sólo vaciamos la mezcla
        if !speaking {
            self.call.lock().await.stop();
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), VoiceError> {
        self.manager
            .remove(self.guild_id)
            .await
            .map_err(|e| VoiceError::Disconnect(format!("{e:?}")))?;
        debug!("👋 Desconectado del canal {} en guild {}", self.channel_id, self.guild_id);
        Ok(())
    }
}

/// ffmpeg transcodificando un locator a Ogg Opus por su stdout.
///
/// El progreso se lee de `-progress pipe:2` en un hilo auxiliar, así se conoce
/// la duración codificada sin tocar el pipe de audio.
pub struct FfmpegSession {
    options: EncodeOptions,
    child: SyncMutex<Option<Child>>,
    stdout: SyncMutex<Option<ChildStdout>>,
    encoded_us: Arc<AtomicU64>,
}

impl FfmpegSession {
    fn spawn(ffmpeg_path: &str, locator: &str, options: &EncodeOptions) -> std::io::Result<Self> {
        let mut child = Command::new(ffmpeg_path)
            .args(ffmpeg_args(locator, options))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let stdout = child.stdout.take();
        let encoded_us = Arc::new(AtomicU64::new(0));

        if let Some(stderr) = child.stderr.take() {
            let progress = Arc::clone(&encoded_us);
            std::thread::spawn(move || {
                for line in BufReader::new(stderr).lines().map_while(Result::ok) {
                    match line.split_once('=') {
                        Some(("out_time_us", value)) => {
                            if let Ok(us) = value.trim().parse::<u64>() {
                                progress.store(us, Ordering::Relaxed);
                            }
                        }
                        Some(_) => {}
                        None if !line.trim().is_empty() => warn!("ffmpeg: {}", line.trim()),
                        None => {}
                    }
                }
            });
        }

        Ok(Self {
            options: options.clone(),
            child: SyncMutex::new(Some(child)),
            stdout: SyncMutex::new(stdout),
            encoded_us,
        })
    }

    fn take_output(&self) -> Option<ChildStdout> {
        self.stdout.lock().take()
    }
}

impl EncodingSession for FfmpegSession {
    fn stats(&self) -> EncodingStats {
        EncodingStats {
            encoded_duration: Duration::from_micros(self.encoded_us.load(Ordering::Relaxed)),
        }
    }

    fn options(&self) -> &EncodeOptions {
        &self.options
    }

    fn stop(&self) {
        if let Some(child) = self.child.lock().as_mut() {
            let _ = child.kill();
        }
    }

    fn cleanup(&self) {
        self.stdout.lock().take();
        if let Some(mut child) = self.child.lock().take() {
            let _ = child.kill();
            reap(child);
            debug!("🧹 Sesión de ffmpeg liberada");
        }
    }
}

/// Recoge el proceso sin bloquear un worker de tokio.
fn reap(mut child: Child) {
    if let Ok(Some(_)) = child.try_wait() {
        return;
    }
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn_blocking(move || {
                let _ = child.wait();
            });
        }
        Err(_) => {
            let _ = child.wait();
        }
    }
}

/// Arma la línea de comandos de ffmpeg para una codificación.
pub fn ffmpeg_args(locator: &str, options: &EncodeOptions) -> Vec<String> {
    let mut args: Vec<String> = ["-hide_banner", "-loglevel", "error", "-nostats", "-progress", "pipe:2"]
        .into_iter()
        .map(String::from)
        .collect();

    let remote = locator.starts_with("http://") || locator.starts_with("https://");
    if remote {
        let flag = |on: bool| if on { "1" } else { "0" }.to_string();
        args.extend([
            "-reconnect".to_string(),
            "1".to_string(),
            "-reconnect_at_eof".to_string(),
            flag(options.reconnect_at_eof),
            "-reconnect_streamed".to_string(),
            flag(options.reconnect_on_stream_drop),
            "-reconnect_on_network_error".to_string(),
            flag(options.reconnect_on_network_error),
        ]);
        if options.reconnect_on_http_error {
            args.extend(["-reconnect_on_http_error".to_string(), "4xx,5xx".to_string()]);
        }
        args.extend([
            "-reconnect_delay_max".to_string(),
            options.reconnect_delay_max_secs.to_string(),
        ]);
        if !options.user_agent.is_empty() {
            args.extend(["-user_agent".to_string(), options.user_agent.clone()]);
        }
    }

    if !options.start_offset.is_zero() {
        args.extend(["-ss".to_string(), format!("{:.3}", options.start_offset.as_secs_f64())]);
    }

    args.extend([
        "-i".to_string(),
        locator.to_string(),
        "-vn".to_string(),
        "-af".to_string(),
        format!("volume={:.2}", options.volume),
        "-ar".to_string(),
        "48000".to_string(),
        "-ac".to_string(),
        "2".to_string(),
        "-c:a".to_string(),
        "libopus".to_string(),
        "-application".to_string(),
        "audio".to_string(),
        "-b:a".to_string(),
        format!("{}k", options.bitrate_kbps),
        "-vbr".to_string(),
        if options.variable_bitrate { "on" } else { "off" }.to_string(),
        "-frame_duration".to_string(),
        options.frame_duration_ms.to_string(),
        "-packet_loss".to_string(),
        options.packet_loss_pct.to_string(),
        "-compression_level".to_string(),
        options.compression_level.to_string(),
        "-max_muxing_queue_size".to_string(),
        options.buffered_frames.to_string(),
        "-f".to_string(),
        if options.raw_output { "ogg" } else { "matroska" }.to_string(),
        "pipe:1".to_string(),
    ]);

    args
}

/// Pista de songbird alimentada por ffmpeg
pub struct SongbirdStream {
    track: TrackHandle,
}

#[async_trait]
impl StreamingSession for SongbirdStream {
    fn set_paused(&self, paused: bool) -> Result<(), StreamError> {
        let result = if paused { self.track.pause() } else { self.track.play() };
        result.map_err(|e| StreamError::Control(format!("{e:?}")))
    }

    async fn paused(&self) -> bool {
        match self.track.get_info().await {
            Ok(state) => matches!(state.playing, PlayMode::Pause),
            Err(_) => false,
        }
    }

    async fn playback_position(&self) -> Duration {
        self.track.get_info().await.map(|state| state.position).unwrap_or_default()
    }

    async fn finished(&self) -> (bool, Option<StreamError>) {
        match self.track.get_info().await {
            Ok(state) => match &state.playing {
                PlayMode::End | PlayMode::Stop => (true, None),
                PlayMode::Errored(e) => (true, Some(StreamError::Track(format!("{e:?}")))),
                _ => (false, None),
            },
            // El track ya no existe en el driver
            Err(_) => (true, None),
        }
    }

    fn stop(&self) {
        let _ = self.track.stop();
    }
}

/// Resuelve el canal de finalización con el primer evento de fin o error de la pista.
#[derive(Clone)]
struct CompletionNotifier {
    tx: Arc<SyncMutex<Option<oneshot::Sender<Result<(), StreamError>>>>>,
}

#[async_trait]
impl VoiceEventHandler for CompletionNotifier {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        let outcome = match ctx {
            EventContext::Track(tracks) => tracks
                .iter()
                .find_map(|(state, _)| match &state.playing {
                    PlayMode::Errored(e) => Some(Err(StreamError::Track(format!("{e:?}")))),
                    _ => None,
                })
                .unwrap_or(Ok(())),
            _ => Ok(()),
        };

        if let Some(tx) = self.tx.lock().take() {
            let _ = tx.send(outcome);
        }
        None
    }
}

#[async_trait]
impl AudioBackend for SongbirdBackend {
    type Voice = SongbirdVoice;
    type Encoding = FfmpegSession;
    type Stream = SongbirdStream;

    async fn join(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<SongbirdVoice, VoiceError> {
        match self.manager.join(guild_id, channel_id).await {
            Ok(call) => Ok(SongbirdVoice {
                manager: Arc::clone(&self.manager),
                call,
                guild_id,
                channel_id,
            }),
            Err(e) => {
                // No dejar una llamada a medio abrir en el manager
                let _ = self.manager.remove(guild_id).await;
                Err(VoiceError::Join(format!("{e:?}")))
            }
        }
    }

    async fn encode(&self, locator: &str, options: &EncodeOptions) -> Result<FfmpegSession, String> {
        let session = FfmpegSession::spawn(&self.ffmpeg_path, locator, options).map_err(|e| e.to_string())?;
        debug!("🎛️ ffmpeg iniciado para {} desde {:?}", locator, options.start_offset);
        Ok(session)
    }

    async fn stream(
        &self,
        encoding: &FfmpegSession,
        voice: &SongbirdVoice,
    ) -> Result<(SongbirdStream, Completion), StreamError> {
        let stdout = encoding
            .take_output()
            .ok_or_else(|| StreamError::Start("la salida de ffmpeg ya fue consumida".to_string()))?;

        let mut hint = Hint::new();
        hint.with_extension(if encoding.options().raw_output { "ogg" } else { "mkv" });

        let input = Input::Live(
            LiveInput::Raw(AudioStream {
                input: Box::new(ReadOnlySource::new(stdout)) as Box<dyn MediaSource>,
                hint: Some(hint),
            }),
            None,
        );

        let track = voice.call.lock().await.play_only_input(input);

        let (tx, rx) = oneshot::channel();
        let notifier = CompletionNotifier {
            tx: Arc::new(SyncMutex::new(Some(tx))),
        };
        track
            .add_event(Event::Track(TrackEvent::End), notifier.clone())
            .map_err(|e| StreamError::Start(format!("{e:?}")))?;
        track
            .add_event(Event::Track(TrackEvent::Error), notifier)
            .map_err(|e| StreamError::Start(format!("{e:?}")))?;

        info!("📡 Transmitiendo en el canal {} de guild {}", voice.channel_id, voice.guild_id);
        Ok((SongbirdStream { track }, rx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position_of(args: &[String], flag: &str) -> Option<usize> {
        args.iter().position(|a| a == flag)
    }

    #[tokio::test]
    async fn test_reap_does_not_wait_on_running_child() {
        let child = Command::new("sleep").arg("1").spawn().unwrap();

        let started = std::time::Instant::now();
        reap(child);

        assert!(started.elapsed() < Duration::from_millis(500));
    }

    #[test]
    fn test_local_file_has_no_reconnect_flags() {
        let args = ffmpeg_args("/music/song.mp3", &EncodeOptions::default());
        assert!(position_of(&args, "-reconnect").is_none());
        assert!(position_of(&args, "-ss").is_none());
        assert_eq!(args.last().map(String::as_str), Some("pipe:1"));
    }

    #[test]
    fn test_start_offset_comes_before_input() {
        let options = EncodeOptions::default().starting_at(Duration::from_millis(61_500));
        let args = ffmpeg_args("https://example.com/a.webm", &options);

        let ss = position_of(&args, "-ss").unwrap();
        let input = position_of(&args, "-i").unwrap();
        assert!(ss < input);
        assert_eq!(args[ss + 1], "61.500");
        assert!(position_of(&args, "-reconnect").unwrap() < input);
    }

    #[test]
    fn test_encoder_knobs_are_forwarded() {
        let options = EncodeOptions {
            bitrate_kbps: 128,
            frame_duration_ms: 60,
            variable_bitrate: false,
            ..EncodeOptions::default()
        };
        let args = ffmpeg_args("/music/a.flac", &options);

        assert_eq!(args[position_of(&args, "-b:a").unwrap() + 1], "128k");
        assert_eq!(args[position_of(&args, "-frame_duration").unwrap() + 1], "60");
        assert_eq!(args[position_of(&args, "-vbr").unwrap() + 1], "off");
    }
}
