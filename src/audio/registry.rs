use dashmap::DashMap;
use futures::future::join_all;
use serenity::model::id::{ChannelId, GuildId};
use std::sync::Arc;
use tracing::{info, warn};

use crate::{
    audio::{
        backend::AudioBackend,
        metrics::DurationProbe,
        player::{Player, PlayerSettings},
    },
    history::HistoryRecorder,
};

/// Un reproductor por guild, compartido por todos los comandos de ese guild.
pub struct PlayerRegistry<B: AudioBackend> {
    backend: Arc<B>,
    history: Arc<dyn HistoryRecorder>,
    probe: Arc<dyn DurationProbe>,
    settings: PlayerSettings,
    players: DashMap<GuildId, Arc<Player<B>>>,
}

impl<B: AudioBackend> PlayerRegistry<B> {
    pub fn new(
        backend: Arc<B>,
        history: Arc<dyn HistoryRecorder>,
        probe: Arc<dyn DurationProbe>,
        settings: PlayerSettings,
    ) -> Self {
        Self {
            backend,
            history,
            probe,
            settings,
            players: DashMap::new(),
        }
    }

    /// Devuelve el reproductor del guild, creándolo en `channel_id` si hace falta.
    pub fn get_or_create(&self, guild_id: GuildId, channel_id: ChannelId) -> Arc<Player<B>> {
        self.players
            .entry(guild_id)
            .or_insert_with(|| {
                info!("🎵 Creando reproductor para guild {}", guild_id);
                Arc::new(Player::new(
                    guild_id,
                    channel_id,
                    Arc::clone(&self.backend),
                    Arc::clone(&self.history),
                    Arc::clone(&self.probe),
                    self.settings.clone(),
                ))
            })
            .clone()
    }

    pub fn get(&self, guild_id: GuildId) -> Option<Arc<Player<B>>> {
        self.players.get(&guild_id).map(|p| Arc::clone(p.value()))
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    /// Detiene el reproductor del guild y lo olvida.
    pub async fn unregister(&self, guild_id: GuildId) {
        let Some((_, player)) = self.players.remove(&guild_id) else {
            return;
        };

        if let Err(e) = player.stop().await {
            warn!("Error al detener el reproductor de guild {}: {}", guild_id, e);
        }
        info!("👋 Reproductor eliminado para guild {}", guild_id);
    }

    /// Detiene todos los reproductores. Se usa al apagar el proceso.
    pub async fn shutdown(&self) {
        let guilds: Vec<GuildId> = self.players.iter().map(|entry| *entry.key()).collect();
        info!("⚠️ Deteniendo {} reproductores", guilds.len());
        join_all(guilds.into_iter().map(|guild_id| self.unregister(guild_id))).await;
    }
}
