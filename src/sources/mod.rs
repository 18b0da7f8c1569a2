pub mod direct_url;
pub mod history_id;
pub mod local_file;
pub mod youtube;

use async_trait::async_trait;
use serenity::model::id::GuildId;
use std::sync::Arc;
use tracing::{debug, info};

pub use direct_url::DirectUrlResolver;
pub use history_id::HistoryIdResolver;
pub use local_file::LocalFileResolver;
pub use youtube::YouTubeResolver;

use crate::{audio::song::Song, config::Config, error::ResolveError, history::HistoryRecorder};

/// Trait común para todas las fuentes de música
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SourceResolver: Send + Sync {
    /// Nombre de la fuente
    fn name(&self) -> &'static str;

    /// Verifica si la consulta es válida para esta fuente
    fn accepts(&self, query: &str) -> bool;

    /// Convierte la consulta en canciones listas para encolar
    async fn resolve(&self, guild_id: GuildId, query: &str) -> Result<Vec<Song>, ResolveError>;
}

/// Convierte la consulta del usuario en canciones preguntando a cada fuente en orden.
///
/// La primera fuente cuyo [`SourceResolver::accepts`] coincide se encarga de
/// la consulta; si falla no se prueba con las siguientes.
pub struct QueryResolver {
    resolvers: Vec<Arc<dyn SourceResolver>>,
}

impl QueryResolver {
    pub fn new(resolvers: Vec<Arc<dyn SourceResolver>>) -> Self {
        Self { resolvers }
    }

    /// Ids del historial, archivos locales, URLs directas y por último YouTube (URLs y búsquedas).
    pub fn standard(config: &Config, history: Arc<dyn HistoryRecorder>) -> Self {
        Self::new(vec![
            Arc::new(HistoryIdResolver::new(history)),
            Arc::new(LocalFileResolver::new(config.music_dir.clone())),
            Arc::new(DirectUrlResolver::new(config.user_agent.clone())),
            Arc::new(YouTubeResolver::new(config.ytdlp_path.clone())),
        ])
    }

    pub async fn resolve(&self, guild_id: GuildId, query: &str) -> Result<Vec<Song>, ResolveError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ResolveError::NoResults(String::new()));
        }

        let resolver = self
            .resolvers
            .iter()
            .find(|r| r.accepts(query))
            .ok_or_else(|| ResolveError::Unsupported(query.to_string()))?;

        debug!("Consulta '{}' resuelta por {}", query, resolver.name());
        let songs = resolver.resolve(guild_id, query).await?;
        info!("🎵 {} canciones obtenidas de {}", songs.len(), resolver.name());
        Ok(songs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::song::SourceKind;
    use mockall::predicate::eq;

    fn mock(name: &'static str, accepts: bool) -> MockSourceResolver {
        let mut resolver = MockSourceResolver::new();
        resolver.expect_name().return_const(name);
        resolver.expect_accepts().return_const(accepts);
        resolver
    }

    #[tokio::test]
    async fn test_first_accepting_resolver_wins() {
        let skipped = mock("skipped", false);
        let mut chosen = mock("chosen", true);
        chosen
            .expect_resolve()
            .with(eq(GuildId::new(1)), eq("lofi"))
            .times(1)
            .returning(|_, q| Ok(vec![Song::new(q, "/music/lofi.mp3", "h", SourceKind::LocalFile)]));
        let mut never = mock("never", true);
        never.expect_resolve().never();

        let resolver = QueryResolver::new(vec![Arc::new(skipped), Arc::new(chosen), Arc::new(never)]);
        let songs = resolver.resolve(GuildId::new(1), "  lofi ").await.unwrap();
        assert_eq!(songs[0].title, "lofi");
    }

    #[tokio::test]
    async fn test_no_accepting_resolver() {
        let resolver = QueryResolver::new(vec![Arc::new(mock("a", false))]);
        assert!(matches!(
            resolver.resolve(GuildId::new(1), "x").await,
            Err(ResolveError::Unsupported(_))
        ));
    }
}
