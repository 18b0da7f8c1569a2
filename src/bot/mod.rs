//! # Bot Module
//!
//! Prefix commands read from guild text channels and forwarded to the guild's
//! [`Player`](crate::audio::Player). The player always targets the voice
//! channel the author is in when the command arrives.
//!
//! | Command | Player call |
//! |---|---|
//! | `play <query>` | resolve, enqueue, start the loop if idle |
//! | `skip` | [`Player::skip`](crate::audio::Player::skip) |
//! | `stop` | [`Player::stop`](crate::audio::Player::stop) |
//! | `pause` / `resume` | pause / unpause on the author's channel |
//! | `queue` / `np` | snapshot getters |
//! | `leave` | unregister the guild's player |

use anyhow::{Context as _, Result};
use serenity::{
    all::{ChannelId, Context, EventHandler, GuildId, Message, Ready, UserId},
    async_trait,
};
use std::{sync::Arc, time::Duration};
use tracing::{debug, error, info, warn};

use crate::{
    audio::{songbird_backend::SongbirdBackend, PlayerRegistry, Song},
    config::Config,
    error::PlayerError,
    sources::QueryResolver,
};

const QUEUE_PAGE: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Play(String),
    Skip,
    Stop,
    Pause,
    Resume,
    Queue,
    NowPlaying,
    Leave,
}

impl Command {
    /// `None` when the message is not addressed to the bot or the command is unknown.
    fn parse(prefix: &str, content: &str) -> Option<Self> {
        let rest = content.trim().strip_prefix(prefix)?;
        let (name, args) = match rest.split_once(char::is_whitespace) {
            Some((name, args)) => (name, args.trim()),
            None => (rest, ""),
        };

        let command = match name.to_lowercase().as_str() {
            "play" | "p" if !args.is_empty() => Self::Play(args.to_string()),
            "skip" | "s" => Self::Skip,
            "stop" => Self::Stop,
            "pause" => Self::Pause,
            "resume" | "unpause" => Self::Resume,
            "queue" | "q" => Self::Queue,
            "np" | "nowplaying" => Self::NowPlaying,
            "leave" | "disconnect" => Self::Leave,
            _ => return None,
        };
        Some(command)
    }
}

pub struct MusicBot {
    config: Arc<Config>,
    registry: Arc<PlayerRegistry<SongbirdBackend>>,
    resolver: Arc<QueryResolver>,
}

impl MusicBot {
    pub fn new(
        config: Arc<Config>,
        registry: Arc<PlayerRegistry<SongbirdBackend>>,
        resolver: Arc<QueryResolver>,
    ) -> Self {
        Self {
            config,
            registry,
            resolver,
        }
    }

    async fn handle(&self, ctx: &Context, msg: &Message, guild_id: GuildId, command: Command) -> Result<String> {
        let author_channel = author_voice_channel(ctx, guild_id, msg.author.id);

        let reply = match command {
            Command::Play(query) => {
                let channel_id = author_channel.context("Debes estar en un canal de voz")?;
                let songs = self.resolver.resolve(guild_id, &query).await?;
                let first = songs.first().map(|s| s.title.clone()).unwrap_or_default();

                let player = self.registry.get_or_create(guild_id, channel_id);
                let added = player.enqueue_all(songs);

                if player.is_active() {
                    format!("📝 Añadido a la cola: **{}** ({} en total)", first, added)
                } else {
                    player.set_channel_id(channel_id);
                    player.spawn_play(Duration::ZERO, None);
                    format!("🎵 Reproduciendo: **{}**", first)
                }
            }
            Command::Skip => {
                self.player(guild_id)?.skip().await?;
                "⏭️ Canción saltada".to_string()
            }
            Command::Stop => {
                self.player(guild_id)?.stop().await?;
                "⏹️ Reproducción detenida y cola vaciada".to_string()
            }
            Command::Pause => {
                self.player(guild_id)?.pause().await?;
                "⏸️ Pausado".to_string()
            }
            Command::Resume => {
                let channel_id = author_channel.context("Debes estar en un canal de voz")?;
                self.player(guild_id)?.unpause(channel_id).await?;
                "▶️ Reanudado".to_string()
            }
            Command::Queue => {
                let queue = self.player(guild_id)?.song_queue();
                format_queue(&queue)
            }
            Command::NowPlaying => {
                let player = self.player(guild_id)?;
                let song = player.current_song().ok_or(PlayerError::NothingPlaying)?;
                let position = player.position().await.unwrap_or_default();
                format!(
                    "🎶 **{}** [{} / {}] ({})",
                    song.title,
                    format_duration(position),
                    song.duration.map(format_duration).unwrap_or_else(|| "en vivo".to_string()),
                    player.current_status(),
                )
            }
            Command::Leave => {
                self.registry.unregister(guild_id).await;
                "👋 Desconectado".to_string()
            }
        };

        Ok(reply)
    }

    fn player(&self, guild_id: GuildId) -> Result<Arc<crate::audio::Player<SongbirdBackend>>, PlayerError> {
        self.registry.get(guild_id).ok_or(PlayerError::NothingPlaying)
    }
}

#[async_trait]
impl EventHandler for MusicBot {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());
    }

    async fn message(&self, ctx: Context, msg: Message) {
        if msg.author.bot {
            return;
        }
        let Some(guild_id) = msg.guild_id else {
            return;
        };
        let Some(command) = Command::parse(&self.config.command_prefix, &msg.content) else {
            return;
        };
        debug!("📨 Comando {:?} en guild {}", command, guild_id);

        let reply = match self.handle(&ctx, &msg, guild_id, command).await {
            Ok(reply) => reply,
            Err(e) => {
                match e.downcast_ref::<PlayerError>() {
                    Some(player_error) if player_error.is_benign() => debug!("Comando rechazado: {}", e),
                    _ => warn!("⚠️ Error procesando comando en guild {}: {:#}", guild_id, e),
                }
                format!("❌ {}", e)
            }
        };

        if let Err(e) = msg.channel_id.say(&ctx.http, reply).await {
            error!("Error al enviar respuesta: {:?}", e);
        }
    }
}

// Helpers

fn author_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
    let guild = guild_id.to_guild_cached(&ctx.cache)?;
    guild.voice_states.get(&user_id).and_then(|vs| vs.channel_id)
}

fn format_duration(duration: Duration) -> String {
    humantime::format_duration(Duration::from_secs(duration.as_secs())).to_string()
}

fn format_queue(queue: &[Song]) -> String {
    if queue.is_empty() {
        return "📭 La cola está vacía".to_string();
    }

    let mut lines: Vec<String> = queue
        .iter()
        .take(QUEUE_PAGE)
        .enumerate()
        .map(|(i, song)| match song.duration {
            Some(d) => format!("`{}.` {} ({})", i + 1, song.title, format_duration(d)),
            None => format!("`{}.` {}", i + 1, song.title),
        })
        .collect();

    if queue.len() > QUEUE_PAGE {
        lines.push(format!("… y {} más", queue.len() - QUEUE_PAGE));
    }
    format!("📋 **Cola ({})**\n{}", queue.len(), lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::SourceKind;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_commands() {
        assert_eq!(Command::parse("!", "!play  lofi beats "), Some(Command::Play("lofi beats".into())));
        assert_eq!(Command::parse("!", "!SKIP"), Some(Command::Skip));
        assert_eq!(Command::parse("!", "!np"), Some(Command::NowPlaying));
        assert_eq!(Command::parse("!", "!play"), None);
        assert_eq!(Command::parse("!", "play lofi"), None);
        assert_eq!(Command::parse("!", "!dance"), None);
    }

    #[test]
    fn test_format_queue_truncates() {
        let songs: Vec<Song> = (0..12)
            .map(|i| {
                Song::new(format!("song {i}"), "/m.mp3", format!("{i}"), SourceKind::LocalFile)
                    .with_duration(Duration::from_secs(90))
            })
            .collect();

        let text = format_queue(&songs);
        assert!(text.starts_with("📋 **Cola (12)**"));
        assert!(text.contains("`1.` song 0 (1m 30s)"));
        assert!(text.ends_with("… y 2 más"));
        assert_eq!(format_queue(&[]), "📭 La cola está vacía");
    }
}
