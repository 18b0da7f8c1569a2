//! Estima cuánto de una canción llegó realmente a los oyentes y cuánto dura,
//! para que el loop distinga una canción terminada de una cortada.

use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};

use crate::audio::song::{Song, SourceKind};

/// Diferencia con la duración que todavía cuenta como final. La telemetría de
/// ffmpeg suele quedarse unos milisegundos antes de la duración reportada.
pub const END_TOLERANCE: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackMetrics {
    /// Adelanto del encoder en segundos. Negativo si el stream fue por delante.
    pub delay_secs: f64,
    /// Posición de la canción hasta la que se entregó audio.
    pub position: Duration,
    /// Duración total, `None` si se desconoce.
    pub duration: Option<Duration>,
}

impl PlaybackMetrics {
    /// `position = start_offset + streamed + |encoded - streamed|`
    pub fn estimate(
        start_offset: Duration,
        encoded: Duration,
        streamed: Duration,
        duration: Option<Duration>,
    ) -> Self {
        let delay_secs = encoded.as_secs_f64() - streamed.as_secs_f64();
        let position = start_offset + streamed + encoded.abs_diff(streamed);

        Self {
            delay_secs,
            position,
            duration,
        }
    }

    /// Sólo es `true` si ambos valores son útiles y la entrega quedó corta.
    pub fn cut_short(&self) -> bool {
        match self.duration {
            Some(duration) if !duration.is_zero() && !self.position.is_zero() => {
                self.position + END_TOLERANCE < duration
            }
            _ => false,
        }
    }
}

#[async_trait]
pub trait DurationProbe: Send + Sync + 'static {
    /// Duración total de `song`, o `None` si no se puede determinar.
    async fn song_duration(&self, song: &Song) -> Option<Duration>;
}

/// Lee `dur` de la query de un locator firmado (URLs estilo googlevideo).
pub fn locator_duration(locator: &str) -> Option<Duration> {
    let parsed = url::Url::parse(locator).ok()?;
    let (_, value) = parsed.query_pairs().find(|(key, _)| key == "dur")?;
    parse_seconds(&value)
}

fn parse_seconds(raw: &str) -> Option<Duration> {
    let secs: f64 = raw.trim().parse().ok()?;
    (secs.is_finite() && secs > 0.0).then(|| Duration::from_secs_f64(secs))
}

/// Duración según el tipo de fuente: parámetro de la URL para remotas,
/// `ffprobe` para archivos locales y nada para streams en vivo. Si falla usa
/// los metadatos de la propia canción.
pub struct MediaDurationProbe {
    ffprobe_path: String,
}

impl MediaDurationProbe {
    pub fn new(ffprobe_path: impl Into<String>) -> Self {
        Self {
            ffprobe_path: ffprobe_path.into(),
        }
    }

    async fn probe_file(&self, path: &str) -> Option<Duration> {
        let output = async_process::Command::new(&self.ffprobe_path)
            .args([
                "-v",
                "error",
                "-show_entries",
                "format=duration",
                "-of",
                "default=noprint_wrappers=1:nokey=1",
            ])
            .arg(path)
            .output()
            .await;

        match output {
            Ok(output) if output.status.success() => parse_seconds(&String::from_utf8_lossy(&output.stdout)),
            Ok(output) => {
                warn!("ffprobe falló para {}: {}", path, String::from_utf8_lossy(&output.stderr).trim());
                None
            }
            Err(e) => {
                warn!("No se pudo ejecutar ffprobe: {}", e);
                None
            }
        }
    }
}

impl Default for MediaDurationProbe {
    fn default() -> Self {
        Self::new("ffprobe")
    }
}

#[async_trait]
impl DurationProbe for MediaDurationProbe {
    async fn song_duration(&self, song: &Song) -> Option<Duration> {
        let probed = match song.source {
            SourceKind::Stream => return None,
            SourceKind::YouTube => locator_duration(&song.locator),
            SourceKind::LocalFile => self.probe_file(&song.locator).await,
        };

        if probed.is_none() {
            debug!("Duración desconocida para '{}', usando metadatos", song.title);
        }
        probed.or(song.duration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_accounts_for_read_ahead() {
        let metrics = PlaybackMetrics::estimate(
            Duration::from_secs(10),
            Duration::from_secs(50),
            Duration::from_secs(45),
            Some(Duration::from_secs(200)),
        );
        assert_eq!(metrics.delay_secs, 5.0);
        assert_eq!(metrics.position, Duration::from_secs(60));
        assert!(metrics.cut_short());
    }

    #[test]
    fn test_negative_delay_uses_magnitude() {
        let metrics = PlaybackMetrics::estimate(
            Duration::ZERO,
            Duration::from_secs(40),
            Duration::from_secs(42),
            None,
        );
        assert_eq!(metrics.delay_secs, -2.0);
        assert_eq!(metrics.position, Duration::from_secs(44));
    }

    #[test]
    fn test_unknown_duration_is_never_cut_short() {
        let metrics = PlaybackMetrics::estimate(Duration::ZERO, Duration::from_secs(3), Duration::from_secs(3), None);
        assert!(!metrics.cut_short());
    }

    #[test]
    fn test_reaching_duration_is_finished() {
        let metrics = PlaybackMetrics::estimate(
            Duration::ZERO,
            Duration::from_secs(180),
            Duration::from_secs(180),
            Some(Duration::from_secs(180)),
        );
        assert!(!metrics.cut_short());
    }

    #[test]
    fn test_telemetry_just_short_of_duration_is_finished() {
        let metrics = PlaybackMetrics::estimate(
            Duration::ZERO,
            Duration::from_millis(213_400),
            Duration::from_millis(213_380),
            Some(Duration::from_secs_f64(213.541)),
        );
        assert!(metrics.position < Duration::from_secs_f64(213.541));
        assert!(!metrics.cut_short());

        let cut = PlaybackMetrics::estimate(
            Duration::ZERO,
            Duration::from_secs(212),
            Duration::from_secs(212),
            Some(Duration::from_secs_f64(213.541)),
        );
        assert!(cut.cut_short());
    }

    #[test]
    fn test_locator_duration_from_query() {
        let url = "https://rr3---sn.googlevideo.com/videoplayback?expire=1&itag=251&dur=213.541&mime=audio%2Fwebm";
        assert_eq!(locator_duration(url), Some(Duration::from_secs_f64(213.541)));
        assert_eq!(locator_duration("https://example.com/a.mp3"), None);
        assert_eq!(locator_duration("/music/a.mp3"), None);
        assert_eq!(locator_duration("https://x.com/?dur=abc"), None);
    }

    #[tokio::test]
    async fn test_stream_has_no_duration() {
        let probe = MediaDurationProbe::default();
        let song = Song::new("radio", "https://radio.example/live", "radio", SourceKind::Stream)
            .with_duration(Duration::from_secs(10));
        assert_eq!(probe.song_duration(&song).await, None);
    }

    #[tokio::test]
    async fn test_youtube_falls_back_to_metadata() {
        let probe = MediaDurationProbe::default();
        let song = Song::new("song", "https://example.com/audio", "abc", SourceKind::YouTube)
            .with_duration(Duration::from_secs(99));
        assert_eq!(probe.song_duration(&song).await, Some(Duration::from_secs(99)));
    }
}
