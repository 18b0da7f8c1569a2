use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Origen de una canción. Define cómo se obtiene su duración y si puede
/// terminar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceKind {
    YouTube,
    /// Fuente en vivo sin fin (radio, directo). Nunca termina.
    Stream,
    LocalFile,
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::YouTube => "youtube",
            Self::Stream => "stream",
            Self::LocalFile => "local",
        };
        f.write_str(name)
    }
}

/// Una unidad reproducible. Inmutable una vez creada.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Song {
    pub title: String,
    /// Enlace que ve el usuario. Vacío para archivos locales.
    pub user_url: String,
    /// URL o ruta que recibe el encoder.
    pub locator: String,
    /// Metadato aproximado, puede faltar.
    pub duration: Option<Duration>,
    /// Hash del contenido para archivos locales, id de la plataforma para remotas.
    pub song_id: String,
    pub thumbnail: Option<String>,
    pub source: SourceKind,
}

impl Song {
    pub fn new(
        title: impl Into<String>,
        locator: impl Into<String>,
        song_id: impl Into<String>,
        source: SourceKind,
    ) -> Self {
        Self {
            title: title.into(),
            user_url: String::new(),
            locator: locator.into(),
            duration: None,
            song_id: song_id.into(),
            thumbnail: None,
            source,
        }
    }

    pub fn with_user_url(mut self, url: impl Into<String>) -> Self {
        self.user_url = url.into();
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn with_thumbnail(mut self, thumbnail: impl Into<String>) -> Self {
        self.thumbnail = Some(thumbnail.into());
        self
    }

    pub fn is_live(&self) -> bool {
        self.source == SourceKind::Stream
    }
}
