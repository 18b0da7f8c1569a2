use async_trait::async_trait;
use serenity::model::id::GuildId;
use std::sync::Arc;

use super::SourceResolver;
use crate::{audio::song::Song, error::ResolveError, history::HistoryRecorder};

/// Vuelve a reproducir una entrada del historial del guild por su id numérico.
pub struct HistoryIdResolver {
    history: Arc<dyn HistoryRecorder>,
}

impl HistoryIdResolver {
    pub fn new(history: Arc<dyn HistoryRecorder>) -> Self {
        Self { history }
    }
}

#[async_trait]
impl SourceResolver for HistoryIdResolver {
    fn name(&self) -> &'static str {
        "history"
    }

    fn accepts(&self, query: &str) -> bool {
        query.trim().parse::<i64>().is_ok_and(|id| id > 0)
    }

    async fn resolve(&self, guild_id: GuildId, query: &str) -> Result<Vec<Song>, ResolveError> {
        let id: i64 = query
            .trim()
            .parse()
            .map_err(|_| ResolveError::Unsupported(query.to_string()))?;

        let song = self.history.get_track_from_history(guild_id, id).await?;
        Ok(vec![song])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{audio::song::SourceKind, history::JsonHistoryStore};

    #[tokio::test]
    async fn test_resolves_known_ids_only() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(JsonHistoryStore::new(dir.path().to_path_buf()).await.unwrap());
        let guild = GuildId::new(3);
        let song = Song::new("Intro", "/music/intro.mp3", "abc", SourceKind::LocalFile);
        store.add_track_to_history(guild, &song).await.unwrap();

        let resolver = HistoryIdResolver::new(store);
        assert!(resolver.accepts("1"));
        assert!(!resolver.accepts("0"));
        assert!(!resolver.accepts("despacito"));

        assert_eq!(resolver.resolve(guild, "1").await.unwrap(), vec![song]);
        assert!(matches!(
            resolver.resolve(guild, "9").await,
            Err(ResolveError::History(_))
        ));
    }
}
