//! Tipos de error del motor de reproducción y sus colaboradores.
//!
//! Un colaborador que falla nunca provoca un panic: cada fallo se convierte en
//! uno de estos enums y vuelve a quien llamó (normalmente el bot, que lo
//! muestra como mensaje).

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlayerError {
    /// `dequeue` sobre una cola vacía. Es la única forma de indicar que no hay canción.
    #[error("la cola está vacía")]
    QueueEmpty,

    #[error("no se pudo iniciar la codificación de '{locator}': {reason}")]
    Encode { locator: String, reason: String },

    #[error("no se pudo conectar al canal de voz tras {attempts} intentos: {source}")]
    Transport {
        attempts: u32,
        #[source]
        source: VoiceError,
    },

    #[error("error en la transmisión: {0}")]
    Stream(#[from] StreamError),

    #[error("no hay ninguna canción reproduciéndose")]
    NothingPlaying,

    #[error("la reproducción no está activa")]
    NotPlaying,

    #[error("ya se está reproduciendo")]
    AlreadyPlaying,

    #[error("el reproductor está en estado de error")]
    Errored,

    #[error("no hay una sesión de transmisión activa")]
    NoStream,

    #[error("el stream no confirmó la pausa en {0:?}")]
    PauseTimeout(Duration),

    #[error("la canción ya terminó")]
    Finished,

    #[error("la canción sigue en pausa")]
    StillPaused,
}

impl PlayerError {
    /// Errores de precondición: errores esperables del usuario, no fallos.
    pub fn is_benign(&self) -> bool {
        matches!(
            self,
            Self::QueueEmpty
                | Self::NothingPlaying
                | Self::NotPlaying
                | Self::AlreadyPlaying
                | Self::NoStream
                | Self::Finished
                | Self::StillPaused
        )
    }
}

/// Fallo reportado por el transporte de voz.
#[derive(Debug, Clone, Error)]
pub enum VoiceError {
    #[error("join falló: {0}")]
    Join(String),

    #[error("la conexión de voz no está lista")]
    NotReady,

    #[error("speaking falló: {0}")]
    Speaking(String),

    #[error("desconexión falló: {0}")]
    Disconnect(String),
}

/// Fallo terminal o de control de una sesión de transmisión.
///
/// Un fin limpio de la entrada no es error: el canal de finalización lleva
/// `Ok(())`.
#[derive(Debug, Clone, Error)]
pub enum StreamError {
    #[error("no se pudo iniciar el stream: {0}")]
    Start(String),

    #[error("el track falló: {0}")]
    Track(String),

    #[error("control del track falló: {0}")]
    Control(String),

    #[error("el stream se cerró sin notificar su final")]
    Closed,
}

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("no existe la entrada {0} en el historial")]
    NotFound(i64),

    #[error("error de E/S en el historial: {0}")]
    Io(#[from] std::io::Error),

    #[error("historial corrupto: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("no se encontraron resultados para: {0}")]
    NoResults(String),

    #[error("ningún resolvedor acepta: {0}")]
    Unsupported(String),

    #[error("archivo local inválido: {0}")]
    LocalFile(#[from] std::io::Error),

    #[error("{tool} falló: {reason}")]
    Tool { tool: &'static str, reason: String },

    #[error("respuesta inválida de {tool}: {reason}")]
    Parse { tool: &'static str, reason: String },

    #[error("error HTTP: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    History(#[from] HistoryError),
}

pub type Result<T, E = PlayerError> = std::result::Result<T, E>;
