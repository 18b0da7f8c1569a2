use async_trait::async_trait;
use serenity::model::id::GuildId;
use sha2::{Digest, Sha256};
use std::path::{Component, Path, PathBuf};
use tokio::{fs, io::AsyncReadExt};
use tracing::debug;

use super::SourceResolver;
use crate::{
    audio::song::{Song, SourceKind},
    error::ResolveError,
};

const AUDIO_EXTENSIONS: [&str; 7] = ["mp3", "wav", "ogg", "opus", "flac", "m4a", "webm"];

/// Archivos de audio dentro del directorio de música.
///
/// El id de la canción es el SHA-256 del contenido, así el historial reconoce
/// el mismo archivo aunque se mueva o renombre.
pub struct LocalFileResolver {
    music_dir: PathBuf,
}

impl LocalFileResolver {
    pub fn new(music_dir: PathBuf) -> Self {
        Self { music_dir }
    }

    fn has_audio_extension(path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| AUDIO_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
    }

    /// Ruta relativa al directorio de música; nunca sale de él
    fn contained_path(&self, query: &str) -> Option<PathBuf> {
        let relative = Path::new(query.trim().trim_start_matches("file://"));
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return None;
        }
        Some(self.music_dir.join(relative))
    }

    async fn content_hash(path: &Path) -> Result<String, ResolveError> {
        let mut file = fs::File::open(path).await?;
        let mut hasher = Sha256::new();
        let mut buffer = vec![0u8; 64 * 1024];

        loop {
            let read = file.read(&mut buffer).await?;
            if read == 0 {
                break;
            }
            hasher.update(&buffer[..read]);
        }

        Ok(hasher
            .finalize()
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect())
    }
}

#[async_trait]
impl SourceResolver for LocalFileResolver {
    fn name(&self) -> &'static str {
        "local"
    }

    fn accepts(&self, query: &str) -> bool {
        let query = query.trim();
        !query.starts_with("http://")
            && !query.starts_with("https://")
            && Self::has_audio_extension(Path::new(query))
    }

    async fn resolve(&self, _guild_id: GuildId, query: &str) -> Result<Vec<Song>, ResolveError> {
        let path = self
            .contained_path(query)
            .ok_or_else(|| ResolveError::Unsupported(query.to_string()))?;

        if !fs::metadata(&path).await?.is_file() {
            return Err(ResolveError::NoResults(query.to_string()));
        }

        let song_id = Self::content_hash(&path).await?;
        let title = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(query)
            .to_string();
        let locator = path.to_string_lossy().into_owned();
        debug!("📁 Archivo local '{}' ({})", title, &song_id[..12]);

        Ok(vec![Song::new(title, locator, song_id, SourceKind::LocalFile)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_audio_files_only() {
        let resolver = LocalFileResolver::new(PathBuf::from("/music"));
        assert!(resolver.accepts("albums/intro.MP3"));
        assert!(resolver.accepts("song.flac"));
        assert!(!resolver.accepts("notes.txt"));
        assert!(!resolver.accepts("https://example.com/song.mp3"));
        assert!(!resolver.accepts("never gonna give you up"));
    }

    #[test]
    fn test_rejects_paths_outside_music_dir() {
        let resolver = LocalFileResolver::new(PathBuf::from("/music"));
        assert!(resolver.contained_path("../etc/passwd.mp3").is_none());
        assert!(resolver.contained_path("/etc/song.mp3").is_none());
        assert_eq!(
            resolver.contained_path("a/b.mp3"),
            Some(PathBuf::from("/music/a/b.mp3"))
        );
    }

    #[tokio::test]
    async fn test_same_content_same_id() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("one.mp3"), b"ID3 fake audio").unwrap();
        std::fs::write(dir.path().join("two.mp3"), b"ID3 fake audio").unwrap();
        std::fs::write(dir.path().join("three.mp3"), b"other audio").unwrap();

        let resolver = LocalFileResolver::new(dir.path().to_path_buf());
        let guild = GuildId::new(1);
        let one = resolver.resolve(guild, "one.mp3").await.unwrap().remove(0);
        let two = resolver.resolve(guild, "two.mp3").await.unwrap().remove(0);
        let three = resolver.resolve(guild, "three.mp3").await.unwrap().remove(0);

        assert_eq!(one.title, "one");
        assert_eq!(one.source, SourceKind::LocalFile);
        assert_eq!(one.song_id, two.song_id);
        assert_ne!(one.song_id, three.song_id);
        assert_eq!(one.song_id.len(), 64);
    }

    #[tokio::test]
    async fn test_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = LocalFileResolver::new(dir.path().to_path_buf());
        assert!(resolver.resolve(GuildId::new(1), "missing.mp3").await.is_err());
    }
}
