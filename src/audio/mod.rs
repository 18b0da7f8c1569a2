//! # Módulo de Audio
//!
//! Motor de reproducción por guild del bot.
//!
//! ## Arquitectura
//!
//! ### [`player`] - Reproductor
//! - Es dueño del estado, la canción actual, la cola y los handles de voz, codificación y transmisión
//! - Ejecuta el loop: codificar, conectar, transmitir y esperar el final,
//!   un skip, un stop o un cambio de canal
//! - Reanuda canciones cuyo stream se cortó antes del final
//!
//! ### [`queue`] - Cola
//! - FIFO protegida por mutex, admite duplicados
//!
//! ### [`voice`] - Sesiones de voz
//! - Conecta con reintentos limitados (5 intentos, 300ms entre ellos por defecto)
//!
//! ### [`metrics`] - Métricas de reproducción
//! - Estima la posición entregada a partir de la telemetría
//! - Obtiene la duración según el tipo de fuente
//!
//! ### [`backend`] / [`songbird_backend`] - Colaboradores
//! - Traits de transporte de voz, encoder y transmisión
//! - Implementación con songbird + ffmpeg usada en producción
//!
//! ## Ejemplo de uso
//!
//! ```rust,no_run
//! # use std::{sync::Arc, time::Duration};
//! # use guild_audio::audio::{backend::AudioBackend, registry::PlayerRegistry, song::{Song, SourceKind}};
//! # use serenity::all::{ChannelId, GuildId};
//! # async fn example<B: AudioBackend>(registry: &PlayerRegistry<B>) -> anyhow::Result<()> {
//! let player = registry.get_or_create(GuildId::new(1), ChannelId::new(2));
//! player.enqueue(Song::new("Intro", "/music/intro.mp3", "abc123", SourceKind::LocalFile));
//! player.spawn_play(Duration::ZERO, None);
//!
//! player.pause().await?;
//! player.unpause(ChannelId::new(2)).await?;
//! player.skip().await?;
//! player.stop().await?;
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod interrupt;
pub mod metrics;
pub mod player;
pub mod queue;
pub mod registry;
pub mod song;
pub mod songbird_backend;
pub mod voice;

pub use player::{PlaybackStatus, Player, PlayerSettings};
pub use queue::SongQueue;
pub use registry::PlayerRegistry;
pub use song::{Song, SourceKind};
