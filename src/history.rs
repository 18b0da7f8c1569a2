//! Historial de reproducción y estadísticas.
//!
//! El motor sólo habla con [`HistoryRecorder`]. [`JsonHistoryStore`] guarda un
//! archivo JSON por guild en `<data_dir>/history/`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serenity::model::id::GuildId;
use std::{collections::HashMap, path::PathBuf};
use tokio::{fs, sync::Mutex};
use tracing::{debug, info, warn};

use crate::{audio::song::Song, error::HistoryError};

#[async_trait]
pub trait HistoryRecorder: Send + Sync + 'static {
    /// Registra la canción la primera vez que suena. Llamadas repetidas no hacen nada.
    async fn add_track_to_history(&self, guild_id: GuildId, song: &Song) -> Result<(), HistoryError>;

    async fn add_playback_count_stats(&self, guild_id: GuildId, song_id: &str) -> Result<(), HistoryError>;

    async fn add_playback_duration_stats(
        &self,
        guild_id: GuildId,
        song_id: &str,
        delta_seconds: f64,
    ) -> Result<(), HistoryError>;

    async fn get_track_from_history(&self, guild_id: GuildId, id: i64) -> Result<Song, HistoryError>;
}

/// Entrada del historial de un guild
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: i64,
    pub song: Song,
    pub play_count: u64,
    pub playback_seconds: f64,
    pub first_played: DateTime<Utc>,
    pub last_played: DateTime<Utc>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct GuildHistory {
    next_id: i64,
    entries: Vec<HistoryEntry>,
}

impl GuildHistory {
    fn entry_mut(&mut self, song_id: &str) -> Option<&mut HistoryEntry> {
        self.entries.iter_mut().find(|e| e.song.song_id == song_id)
    }
}

/// Historial basado en archivos JSON
pub struct JsonHistoryStore {
    data_dir: PathBuf,
    guilds: Mutex<HashMap<GuildId, GuildHistory>>,
}

impl JsonHistoryStore {
    pub async fn new(data_dir: PathBuf) -> Result<Self, HistoryError> {
        fs::create_dir_all(data_dir.join("history")).await?;
        info!("📁 Historial inicializado en: {}", data_dir.display());

        Ok(Self {
            data_dir,
            guilds: Mutex::new(HashMap::new()),
        })
    }

    /// Últimas canciones reproducidas, más recientes primero
    pub async fn recent(&self, guild_id: GuildId, limit: usize) -> Result<Vec<HistoryEntry>, HistoryError> {
        let mut guilds = self.guilds.lock().await;
        let history = self.load(&mut guilds, guild_id).await?;

        let mut entries = history.entries.clone();
        entries.sort_by(|a, b| b.last_played.cmp(&a.last_played));
        entries.truncate(limit);
        Ok(entries)
    }

    fn file_path(&self, guild_id: GuildId) -> PathBuf {
        self.data_dir.join("history").join(format!("guild_{}.json", guild_id.get()))
    }

    async fn load<'a>(
        &self,
        guilds: &'a mut HashMap<GuildId, GuildHistory>,
        guild_id: GuildId,
    ) -> Result<&'a mut GuildHistory, HistoryError> {
        if !guilds.contains_key(&guild_id) {
            let path = self.file_path(guild_id);
            let history = match fs::read_to_string(&path).await {
                Ok(content) => serde_json::from_str(&content)?,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => GuildHistory::default(),
                Err(e) => return Err(e.into()),
            };
            guilds.insert(guild_id, history);
        }

        Ok(guilds.entry(guild_id).or_default())
    }

    async fn save(&self, guild_id: GuildId, history: &GuildHistory) -> Result<(), HistoryError> {
        let content = serde_json::to_string_pretty(history)?;
        let path = self.file_path(guild_id);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, content).await?;
        fs::rename(&tmp, &path).await?;
        Ok(())
    }
}

#[async_trait]
impl HistoryRecorder for JsonHistoryStore {
    async fn add_track_to_history(&self, guild_id: GuildId, song: &Song) -> Result<(), HistoryError> {
        let mut guilds = self.guilds.lock().await;
        let history = self.load(&mut guilds, guild_id).await?;
        let now = Utc::now();

        if let Some(entry) = history.entry_mut(&song.song_id) {
            entry.last_played = now;
        } else {
            history.next_id += 1;
            let id = history.next_id;
            history.entries.push(HistoryEntry {
                id,
                song: song.clone(),
                play_count: 0,
                playback_seconds: 0.0,
                first_played: now,
                last_played: now,
            });
            debug!("📝 '{}' agregado al historial con id {}", song.title, id);
        }

        self.save(guild_id, history).await
    }

    async fn add_playback_count_stats(&self, guild_id: GuildId, song_id: &str) -> Result<(), HistoryError> {
        let mut guilds = self.guilds.lock().await;
        let history = self.load(&mut guilds, guild_id).await?;

        match history.entry_mut(song_id) {
            Some(entry) => entry.play_count += 1,
            None => {
                warn!("Conteo para canción fuera del historial: {}", song_id);
                return Ok(());
            }
        }

        self.save(guild_id, history).await
    }

    async fn add_playback_duration_stats(
        &self,
        guild_id: GuildId,
        song_id: &str,
        delta_seconds: f64,
    ) -> Result<(), HistoryError> {
        let mut guilds = self.guilds.lock().await;
        let history = self.load(&mut guilds, guild_id).await?;

        let Some(entry) = history.entry_mut(song_id) else {
            return Ok(());
        };
        entry.playback_seconds += delta_seconds;

        self.save(guild_id, history).await
    }

    async fn get_track_from_history(&self, guild_id: GuildId, id: i64) -> Result<Song, HistoryError> {
        let mut guilds = self.guilds.lock().await;
        let history = self.load(&mut guilds, guild_id).await?;

        history
            .entries
            .iter()
            .find(|e| e.id == id)
            .map(|e| e.song.clone())
            .ok_or(HistoryError::NotFound(id))
    }
}
