//! Contratos de los colaboradores externos que maneja el reproductor: el
//! transporte de voz, el encoder de audio y la transmisión entre ambos.
//!
//! El reproductor nunca mira dentro de ellos. En producción se usa la
//! implementación de songbird/ffmpeg en [`super::songbird_backend`].

use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use std::time::Duration;
use tokio::sync::oneshot;

use crate::error::{StreamError, VoiceError};

/// Opciones que se pasan tal cual al encoder en cada intento.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodeOptions {
    pub volume: f32,
    pub frame_duration_ms: u32,
    pub bitrate_kbps: u32,
    pub packet_loss_pct: u32,
    pub raw_output: bool,
    pub compression_level: u32,
    pub buffered_frames: u32,
    pub variable_bitrate: bool,
    pub start_offset: Duration,
    pub reconnect_at_eof: bool,
    pub reconnect_on_stream_drop: bool,
    pub reconnect_on_network_error: bool,
    pub reconnect_on_http_error: bool,
    pub reconnect_delay_max_secs: u32,
    pub user_agent: String,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            volume: 1.0,
            frame_duration_ms: 20,
            bitrate_kbps: 96,
            packet_loss_pct: 1,
            raw_output: true,
            compression_level: 10,
            buffered_frames: 100,
            variable_bitrate: true,
            start_offset: Duration::ZERO,
            reconnect_at_eof: true,
            reconnect_on_stream_drop: true,
            reconnect_on_network_error: true,
            reconnect_on_http_error: true,
            reconnect_delay_max_secs: 5,
            user_agent: String::new(),
        }
    }
}

impl EncodeOptions {
    pub fn starting_at(mut self, offset: Duration) -> Self {
        self.start_offset = offset;
        self
    }
}

/// Telemetría del encoder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EncodingStats {
    /// Audio producido por el encoder, medido desde su offset inicial.
    pub encoded_duration: Duration,
}

/// Se resuelve al terminar el stream: `Ok(())` en un fin limpio, `Err` si no.
pub type Completion = oneshot::Receiver<Result<(), StreamError>>;

#[async_trait]
pub trait VoiceConnection: Send + Sync + 'static {
    fn guild_id(&self) -> GuildId;
    fn channel_id(&self) -> ChannelId;
    async fn is_ready(&self) -> bool;
    async fn set_speaking(&self, speaking: bool) -> Result<(), VoiceError>;
    async fn disconnect(&self) -> Result<(), VoiceError>;
}

pub trait EncodingSession: Send + Sync + 'static {
    fn stats(&self) -> EncodingStats;
    fn options(&self) -> &EncodeOptions;
    /// Pide al encoder que deje de producir salida.
    fn stop(&self);
    /// Libera todos los recursos de la sesión. Se puede llamar más de una vez.
    fn cleanup(&self);
}

#[async_trait]
pub trait StreamingSession: Send + Sync + 'static {
    fn set_paused(&self, paused: bool) -> Result<(), StreamError>;
    async fn paused(&self) -> bool;
    /// Audio realmente enviado al transporte de voz.
    async fn playback_position(&self) -> Duration;
    /// Si el stream terminó y con qué error, si falló.
    async fn finished(&self) -> (bool, Option<StreamError>);
    /// Deja de enviar frames. Después el canal de finalización puede no resolverse nunca.
    fn stop(&self);
}

/// Los tres colaboradores juntos para que sus tipos concretos coincidan: una
/// transmisión siempre une la sesión de codificación y la conexión de voz del
/// mismo backend.
#[async_trait]
pub trait AudioBackend: Send + Sync + 'static {
    type Voice: VoiceConnection;
    type Encoding: EncodingSession;
    type Stream: StreamingSession;

    async fn join(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<Self::Voice, VoiceError>;

    async fn encode(&self, locator: &str, options: &EncodeOptions) -> Result<Self::Encoding, String>;

    async fn stream(
        &self,
        encoding: &Self::Encoding,
        voice: &Self::Voice,
    ) -> Result<(Self::Stream, Completion), StreamError>;
}
