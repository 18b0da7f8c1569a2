use async_trait::async_trait;
use reqwest::{header, Client};
use serenity::model::id::GuildId;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use super::{SourceResolver, YouTubeResolver};
use crate::{
    audio::song::{Song, SourceKind},
    error::ResolveError,
};

/// Radios por internet y cualquier otra URL http(s) que no sea de YouTube.
///
/// Se tratan como streams en vivo: al terminar o fallar se reinician desde 0.
pub struct DirectUrlResolver {
    client: Client,
}

impl DirectUrlResolver {
    pub fn new(user_agent: impl Into<String>) -> Self {
        let client = Client::builder()
            .user_agent(user_agent.into())
            .connect_timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|e| {
                warn!("⚠️ Cliente HTTP personalizado no disponible, usando el predeterminado: {}", e);
                Client::new()
            });

        Self { client }
    }

    /// Último segmento no vacío de la ruta, o el host si la ruta está vacía
    fn title_from_url(url: &Url) -> String {
        url.path_segments()
            .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
            .map(str::to_string)
            .or_else(|| url.host_str().map(str::to_string))
            .unwrap_or_else(|| url.to_string())
    }

    fn song_id(url: &Url) -> String {
        let mut id = url.clone();
        id.set_query(None);
        id.set_fragment(None);
        id.to_string()
    }
}

#[async_trait]
impl SourceResolver for DirectUrlResolver {
    fn name(&self) -> &'static str {
        "direct"
    }

    fn accepts(&self, query: &str) -> bool {
        let query = query.trim();
        (query.starts_with("http://") || query.starts_with("https://"))
            && !YouTubeResolver::is_youtube_url(query)
    }

    async fn resolve(&self, _guild_id: GuildId, query: &str) -> Result<Vec<Song>, ResolveError> {
        let url = Url::parse(query.trim()).map_err(|e| ResolveError::Parse {
            tool: "url",
            reason: e.to_string(),
        })?;

        // Solo interesan las cabeceras: el cuerpo de una radio no termina nunca
        let response = self
            .client
            .get(url.clone())
            .header("Icy-MetaData", "1")
            .send()
            .await?
            .error_for_status()?;

        let icy_name = response
            .headers()
            .get("icy-name")
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string);
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("desconocido")
            .to_string();
        drop(response);

        let title = icy_name.unwrap_or_else(|| Self::title_from_url(&url));
        debug!("📻 Stream directo '{}' ({})", title, content_type);

        let song = Song::new(title, url.as_str(), Self::song_id(&url), SourceKind::Stream)
            .with_user_url(url.as_str());
        Ok(vec![song])
    }
}
