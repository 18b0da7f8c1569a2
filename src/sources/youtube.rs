use async_process::Command;
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use serenity::model::id::GuildId;
use std::{sync::OnceLock, time::Duration};
use tokio::sync::Semaphore;
use tracing::{debug, info};

use super::SourceResolver;
use crate::{
    audio::song::{Song, SourceKind},
    error::ResolveError,
};

/// Cliente de yt-dlp: URLs de YouTube y búsquedas por título
pub struct YouTubeResolver {
    ytdlp_path: String,
    // Limitar procesos concurrentes para evitar rate limiting
    rate_limiter: Semaphore,
}

/// Información extraída de yt-dlp
#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    id: String,
    title: String,
    duration: Option<f64>,
    thumbnail: Option<String>,
    webpage_url: Option<String>,
    /// URL firmada del formato elegido con `-f bestaudio`
    url: Option<String>,
    is_live: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum YtDlpOutput {
    Search { entries: Vec<YtDlpInfo> },
    Video(YtDlpInfo),
}

fn youtube_url_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^https?://(www\.|m\.|music\.)?(youtube\.com/(watch|shorts|live)|youtu\.be/)")
            .ok()
    })
    .as_ref()
}

impl YouTubeResolver {
    pub fn new(ytdlp_path: impl Into<String>) -> Self {
        Self {
            ytdlp_path: ytdlp_path.into(),
            rate_limiter: Semaphore::new(3),
        }
    }

    pub fn is_youtube_url(url: &str) -> bool {
        youtube_url_regex().is_some_and(|re| re.is_match(url))
    }

    fn to_song(info: YtDlpInfo) -> Option<Song> {
        let locator = info.url?;
        let source = if info.is_live.unwrap_or(false) {
            SourceKind::Stream
        } else {
            SourceKind::YouTube
        };
        let user_url = info
            .webpage_url
            .unwrap_or_else(|| format!("https://www.youtube.com/watch?v={}", info.id));

        let mut song = Song::new(info.title, locator, info.id, source).with_user_url(user_url);
        if let Some(secs) = info.duration.filter(|d| d.is_finite() && *d > 0.0) {
            song = song.with_duration(Duration::from_secs_f64(secs));
        }
        if let Some(thumbnail) = info.thumbnail {
            song = song.with_thumbnail(thumbnail);
        }
        Some(song)
    }

    fn parse_output(stdout: &str) -> Result<Vec<Song>, ResolveError> {
        let output: YtDlpOutput = serde_json::from_str(stdout).map_err(|e| ResolveError::Parse {
            tool: "yt-dlp",
            reason: e.to_string(),
        })?;

        let infos = match output {
            YtDlpOutput::Search { entries } => entries,
            YtDlpOutput::Video(info) => vec![info],
        };
        Ok(infos.into_iter().filter_map(Self::to_song).collect())
    }
}

#[async_trait]
impl SourceResolver for YouTubeResolver {
    fn name(&self) -> &'static str {
        "youtube"
    }

    /// Acepta URLs de YouTube y cualquier texto que no sea una URL (búsqueda)
    fn accepts(&self, query: &str) -> bool {
        let query = query.trim();
        Self::is_youtube_url(query) || !(query.starts_with("http://") || query.starts_with("https://"))
    }

    async fn resolve(&self, _guild_id: GuildId, query: &str) -> Result<Vec<Song>, ResolveError> {
        let query = query.trim();
        let _permit = self
            .rate_limiter
            .acquire()
            .await
            .map_err(|e| ResolveError::Tool {
                tool: "yt-dlp",
                reason: e.to_string(),
            })?;

        let target = if Self::is_youtube_url(query) {
            query.to_string()
        } else {
            info!("🔍 Buscando en YouTube: {}", query);
            format!("ytsearch1:{}", query)
        };

        let output = Command::new(&self.ytdlp_path)
            .args([
                "--dump-single-json",
                "--no-playlist",
                "--no-warnings",
                "-f",
                "bestaudio/best",
                "--socket-timeout",
                "15",
            ])
            .arg(&target)
            .output()
            .await
            .map_err(|e| ResolveError::Tool {
                tool: "yt-dlp",
                reason: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(ResolveError::Tool {
                tool: "yt-dlp",
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let songs = Self::parse_output(&String::from_utf8_lossy(&output.stdout))?;
        debug!("yt-dlp devolvió {} resultados para {}", songs.len(), query);

        if songs.is_empty() {
            return Err(ResolveError::NoResults(query.to_string()));
        }
        Ok(songs)
    }
}
