use serenity::model::id::{ChannelId, GuildId};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::{
    audio::backend::{AudioBackend, VoiceConnection},
    error::{PlayerError, VoiceError},
};

/// Conecta a canales de voz con un número limitado de reintentos.
///
/// La conexión se intenta hasta `attempts` veces con `delay` fijo entre
/// intentos. Un handle que volvió pero nunca quedó listo se desconecta antes
/// del siguiente intento para no dejar sesiones a medio abrir.
#[derive(Debug, Clone, Copy)]
pub struct VoiceSessionManager {
    attempts: u32,
    delay: Duration,
}

impl Default for VoiceSessionManager {
    fn default() -> Self {
        Self::new(5, Duration::from_millis(300))
    }
}

impl VoiceSessionManager {
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            delay,
        }
    }

    pub async fn acquire<B: AudioBackend>(
        &self,
        backend: &B,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<B::Voice, PlayerError> {
        let mut last_error = VoiceError::NotReady;

        for attempt in 1..=self.attempts {
            if attempt > 1 {
                tokio::time::sleep(self.delay).await;
            }

            match backend.join(guild_id, channel_id).await {
                Ok(voice) if voice.is_ready().await => {
                    if attempt > 1 {
                        info!("🔊 Conectado al canal {} en el intento {}", channel_id, attempt);
                    } else {
                        debug!("🔊 Conectado al canal {} en guild {}", channel_id, guild_id);
                    }
                    return Ok(voice);
                }
                Ok(voice) => {
                    warn!("⚠️ Conexión de voz no lista (intento {}/{})", attempt, self.attempts);
                    if let Err(e) = voice.disconnect().await {
                        debug!("Error al desconectar sesión parcial: {}", e);
                    }
                    last_error = VoiceError::NotReady;
                }
                Err(e) => {
                    warn!("⚠️ Join falló (intento {}/{}): {}", attempt, self.attempts, e);
                    last_error = e;
                }
            }
        }

        Err(PlayerError::Transport {
            attempts: self.attempts,
            source: last_error,
        })
    }
}
