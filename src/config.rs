use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

use crate::audio::{backend::EncodeOptions, player::PlayerSettings};

const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub command_prefix: String,

    // Audio / codificador
    pub default_volume: f32,
    pub frame_duration_ms: u32,
    pub opus_bitrate_kbps: u32,
    pub packet_loss_pct: u32,
    pub compression_level: u32,
    pub buffered_frames: u32,
    pub variable_bitrate: bool,
    pub reconnect_delay_max_secs: u32,
    pub user_agent: String,

    // Conexión de voz y recuperación
    pub voice_join_attempts: u32,
    pub voice_join_delay_ms: u64,
    pub max_resume_attempts: u32,

    // Paths
    pub data_dir: PathBuf,
    pub music_dir: PathBuf,

    // Herramientas externas
    pub ffmpeg_path: String,
    pub ffprobe_path: String,
    pub ytdlp_path: String,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(val) if !val.trim().is_empty() => Ok(val.trim().parse()?),
        _ => Ok(default),
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();
        let config = Self {
            // Discord
            discord_token: std::env::var("DISCORD_TOKEN")?,
            command_prefix: env_or("COMMAND_PREFIX", defaults.command_prefix)?,

            // Audio
            default_volume: env_or("DEFAULT_VOLUME", defaults.default_volume)?,
            frame_duration_ms: env_or("FRAME_DURATION_MS", defaults.frame_duration_ms)?,
            opus_bitrate_kbps: env_or("OPUS_BITRATE", defaults.opus_bitrate_kbps)?,
            packet_loss_pct: env_or("PACKET_LOSS", defaults.packet_loss_pct)?,
            compression_level: env_or("COMPRESSION_LEVEL", defaults.compression_level)?,
            buffered_frames: env_or("BUFFERED_FRAMES", defaults.buffered_frames)?,
            variable_bitrate: env_or("VARIABLE_BITRATE", defaults.variable_bitrate)?,
            reconnect_delay_max_secs: env_or("RECONNECT_DELAY_MAX", defaults.reconnect_delay_max_secs)?,
            user_agent: env_or("USER_AGENT", defaults.user_agent)?,

            // Voz
            voice_join_attempts: env_or("VOICE_JOIN_ATTEMPTS", defaults.voice_join_attempts)?,
            voice_join_delay_ms: env_or("VOICE_JOIN_DELAY_MS", defaults.voice_join_delay_ms)?,
            max_resume_attempts: env_or("MAX_RESUME_ATTEMPTS", defaults.max_resume_attempts)?,

            // Paths
            data_dir: env_or("DATA_DIR", defaults.data_dir)?,
            music_dir: env_or("MUSIC_DIR", defaults.music_dir)?,

            // Herramientas
            ffmpeg_path: env_or("FFMPEG_PATH", defaults.ffmpeg_path)?,
            ffprobe_path: env_or("FFPROBE_PATH", defaults.ffprobe_path)?,
            ytdlp_path: env_or("YTDLP_PATH", defaults.ytdlp_path)?,
        };

        // Crear directorios si no existen
        std::fs::create_dir_all(&config.data_dir)?;
        std::fs::create_dir_all(&config.music_dir)?;

        config.validate()?;

        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - Volume must be between 0.0 and 2.0
    /// - Frame duration must be one Opus accepts for voice (20, 40 or 60 ms)
    /// - Opus bitrate must be within 8..=510 kbps
    /// - Packet loss is a percentage, compression level is 0..=10
    /// - At least one voice join attempt
    pub fn validate(&self) -> Result<()> {
        if self.default_volume < 0.0 || self.default_volume > 2.0 {
            anyhow::bail!("Default volume must be between 0.0 and 2.0, got: {}", self.default_volume);
        }

        if ![20, 40, 60].contains(&self.frame_duration_ms) {
            anyhow::bail!("Frame duration must be 20, 40 or 60 ms, got: {}", self.frame_duration_ms);
        }

        if !(8..=510).contains(&self.opus_bitrate_kbps) {
            anyhow::bail!("Opus bitrate must be between 8 and 510 kbps, got: {}", self.opus_bitrate_kbps);
        }

        if self.packet_loss_pct > 100 {
            anyhow::bail!("Packet loss is a percentage, got: {}", self.packet_loss_pct);
        }

        if self.compression_level > 10 {
            anyhow::bail!("Compression level must be between 0 and 10, got: {}", self.compression_level);
        }

        if self.voice_join_attempts == 0 {
            anyhow::bail!("Voice join attempts must be greater than 0");
        }

        Ok(())
    }

    /// Encoder options for one playback attempt, without a start offset.
    pub fn encode_options(&self) -> EncodeOptions {
        EncodeOptions {
            volume: self.default_volume,
            frame_duration_ms: self.frame_duration_ms,
            bitrate_kbps: self.opus_bitrate_kbps,
            packet_loss_pct: self.packet_loss_pct,
            raw_output: true,
            compression_level: self.compression_level,
            buffered_frames: self.buffered_frames,
            variable_bitrate: self.variable_bitrate,
            start_offset: Duration::ZERO,
            reconnect_at_eof: true,
            reconnect_on_stream_drop: true,
            reconnect_on_network_error: true,
            reconnect_on_http_error: true,
            reconnect_delay_max_secs: self.reconnect_delay_max_secs,
            user_agent: self.user_agent.clone(),
        }
    }

    pub fn player_settings(&self) -> PlayerSettings {
        PlayerSettings {
            encode: self.encode_options(),
            voice_join_attempts: self.voice_join_attempts,
            voice_join_delay: Duration::from_millis(self.voice_join_delay_ms),
            max_resume_attempts: self.max_resume_attempts,
            ..PlayerSettings::default()
        }
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// The token is never included.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Audio: {}% vol, {}kbps, {}ms frames, loss {}%\n  \
            Voice: {} join attempts every {}ms, {} resume attempts\n  \
            Paths: data={} music={}",
            (self.default_volume * 100.0) as u32,
            self.opus_bitrate_kbps,
            self.frame_duration_ms,
            self.packet_loss_pct,
            self.voice_join_attempts,
            self.voice_join_delay_ms,
            self.max_resume_attempts,
            self.data_dir.display(),
            self.music_dir.display(),
        )
    }
}

/// Default configuration values.
///
/// Used as fallbacks when environment variables are not provided.
impl Default for Config {
    fn default() -> Self {
        Self {
            discord_token: String::new(),
            command_prefix: "!".to_string(),

            default_volume: 1.0,
            frame_duration_ms: 20,
            opus_bitrate_kbps: 96,
            packet_loss_pct: 1,
            compression_level: 10,
            buffered_frames: 100,
            variable_bitrate: true,
            reconnect_delay_max_secs: 5,
            user_agent: DEFAULT_USER_AGENT.to_string(),

            voice_join_attempts: 5,
            voice_join_delay_ms: 300,
            max_resume_attempts: 5,

            data_dir: "./data".into(),
            music_dir: "./music".into(),

            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
            ytdlp_path: "yt-dlp".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_frame_duration() {
        let config = Config {
            frame_duration_ms: 25,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_player_settings_carry_encoder_knobs() {
        let config = Config {
            opus_bitrate_kbps: 128,
            voice_join_attempts: 3,
            ..Config::default()
        };
        let settings = config.player_settings();
        assert_eq!(settings.encode.bitrate_kbps, 128);
        assert_eq!(settings.voice_join_attempts, 3);
        assert_eq!(settings.encode.start_offset, Duration::ZERO);
    }
}
