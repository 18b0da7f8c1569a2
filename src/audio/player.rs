use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId};
use std::{
    sync::{
        atomic::{AtomicBool, AtomicU32, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, error, info, warn};

use crate::{
    audio::{
        backend::{AudioBackend, EncodeOptions, EncodingSession, StreamingSession, VoiceConnection},
        interrupt::Interrupts,
        metrics::{DurationProbe, PlaybackMetrics},
        queue::SongQueue,
        song::Song,
        voice::VoiceSessionManager,
    },
    error::{PlayerError, StreamError},
    history::HistoryRecorder,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackStatus {
    Resting,
    Playing,
    Paused,
    Error,
}

impl std::fmt::Display for PlaybackStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Resting => "en reposo",
            Self::Playing => "reproduciendo",
            Self::Paused => "en pausa",
            Self::Error => "error",
        };
        f.write_str(name)
    }
}

/// Tiempos y opciones de codificación de un reproductor.
#[derive(Debug, Clone)]
pub struct PlayerSettings {
    pub encode: EncodeOptions,
    pub voice_join_attempts: u32,
    pub voice_join_delay: Duration,
    /// Reanudaciones seguidas antes de dar una canción por terminada.
    pub max_resume_attempts: u32,
    pub resume_backoff: Duration,
    pub resume_backoff_max: Duration,
    /// Un intento que transmitió al menos esto reinicia el contador de reanudaciones.
    pub resume_reset_after: Duration,
    pub skip_grace: Duration,
    pub pause_timeout: Duration,
    pub pause_poll: Duration,
    pub stats_interval: Duration,
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self {
            encode: EncodeOptions::default(),
            voice_join_attempts: 5,
            voice_join_delay: Duration::from_millis(300),
            max_resume_attempts: 5,
            resume_backoff: Duration::from_millis(500),
            resume_backoff_max: Duration::from_secs(8),
            resume_reset_after: Duration::from_secs(30),
            skip_grace: Duration::from_millis(250),
            pause_timeout: Duration::from_secs(3),
            pause_poll: Duration::from_millis(100),
            stats_interval: Duration::from_secs(2),
        }
    }
}

/// Qué hace el loop de reproducción al terminar un intento.
#[derive(Debug)]
enum NextAction {
    /// Reproduce `song` desde `offset` tras esperar `delay`. Los intentos
    /// `resumed` continúan la misma reproducción y no se cuentan otra vez.
    Continue {
        song: Song,
        offset: Duration,
        resumed: bool,
        delay: Duration,
    },
    /// Saca la siguiente canción de la cola.
    Advance,
    /// Sale del loop.
    Idle,
}

#[derive(Debug)]
enum Signal {
    Completed(Result<(), StreamError>),
    Skip,
    Stop,
    SwitchChannel,
}

struct PlayerState<B: AudioBackend> {
    status: PlaybackStatus,
    current_song: Option<Song>,
    channel_id: ChannelId,
    voice: Option<Arc<B::Voice>>,
    encoding: Option<Arc<B::Encoding>>,
    stream: Option<Arc<B::Stream>>,
    /// Hay un loop de reproducción activo.
    looping: bool,
}

/// Motor de reproducción de un guild.
///
/// Es dueño de la cola, la canción actual y los handles externos de voz,
/// codificación y transmisión. Los controles (`pause`, `unpause`, `skip`,
/// `stop`) modifican el estado bajo el lock o avisan al loop con una
/// interrupción de capacidad uno. Liberar un intento activo siempre ocurre
/// dentro del loop.
pub struct Player<B: AudioBackend> {
    guild_id: GuildId,
    backend: Arc<B>,
    history: Arc<dyn HistoryRecorder>,
    probe: Arc<dyn DurationProbe>,
    settings: PlayerSettings,
    voice_manager: VoiceSessionManager,
    queue: SongQueue,
    state: Mutex<PlayerState<B>>,
    interrupts: Interrupts,
    skip_in_flight: AtomicBool,
    resume_attempts: AtomicU32,
}

/// Libera la sesión de codificación exactamente una vez, salga como salga el intento.
struct EncodingRelease<E: EncodingSession>(Arc<E>);

impl<E: EncodingSession> Drop for EncodingRelease<E> {
    fn drop(&mut self) {
        self.0.cleanup();
    }
}

/// Marca el loop como terminado, también si se descarta su future.
struct LoopActive<'a, B: AudioBackend>(&'a Player<B>);

impl<B: AudioBackend> Drop for LoopActive<'_, B> {
    fn drop(&mut self) {
        self.0.state.lock().looping = false;
    }
}

impl<B: AudioBackend> Player<B> {
    pub fn new(
        guild_id: GuildId,
        channel_id: ChannelId,
        backend: Arc<B>,
        history: Arc<dyn HistoryRecorder>,
        probe: Arc<dyn DurationProbe>,
        settings: PlayerSettings,
    ) -> Self {
        let voice_manager = VoiceSessionManager::new(settings.voice_join_attempts, settings.voice_join_delay);

        Self {
            guild_id,
            backend,
            history,
            probe,
            settings,
            voice_manager,
            queue: SongQueue::new(),
            state: Mutex::new(PlayerState {
                status: PlaybackStatus::Resting,
                current_song: None,
                channel_id,
                voice: None,
                encoding: None,
                stream: None,
                looping: false,
            }),
            interrupts: Interrupts::default(),
            skip_in_flight: AtomicBool::new(false),
            resume_attempts: AtomicU32::new(0),
        }
    }

    // Getters

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    pub fn current_status(&self) -> PlaybackStatus {
        self.state.lock().status
    }

    pub fn current_song(&self) -> Option<Song> {
        self.state.lock().current_song.clone()
    }

    /// Copia de la cola; iterarla no bloquea la reproducción
    pub fn song_queue(&self) -> Vec<Song> {
        self.queue.snapshot()
    }

    pub fn channel_id(&self) -> ChannelId {
        self.state.lock().channel_id
    }

    /// Canal para la próxima conexión. No mueve una sesión activa.
    pub fn set_channel_id(&self, channel_id: ChannelId) {
        self.state.lock().channel_id = channel_id;
    }

    pub fn is_active(&self) -> bool {
        self.state.lock().looping
    }

    pub fn is_connected(&self) -> bool {
        self.state.lock().voice.is_some()
    }

    /// Estimación en vivo de la posición que están escuchando.
    pub async fn position(&self) -> Option<Duration> {
        let (encoding, stream) = {
            let state = self.state.lock();
            (state.encoding.clone()?, state.stream.clone()?)
        };
        let streamed = stream.playback_position().await;
        Some(encoding.options().start_offset + streamed)
    }

    pub fn enqueue(&self, song: Song) {
        self.queue.enqueue(song);
    }

    pub fn enqueue_all(&self, songs: impl IntoIterator<Item = Song>) -> usize {
        self.queue.enqueue_all(songs)
    }

    pub fn dequeue(&self) -> Result<Song, PlayerError> {
        self.queue.dequeue()
    }

    pub fn clear_queue(&self) {
        self.queue.clear();
    }

    /// Ejecuta el loop de reproducción hasta quedar en reposo.
    ///
    /// Reproduce `song` desde `start_at` si se indica; si no, toma de la cola.
    /// Un corte inesperado reanuda la misma canción donde quedó y una canción
    /// terminada avanza la cola. Vuelve cuando la cola se vacía, tras skip o
    /// stop, o ante un error que detiene la reproducción.
    pub async fn play(self: &Arc<Self>, start_at: Duration, song: Option<Song>) -> Result<(), PlayerError> {
        {
            let mut state = self.state.lock();
            if state.looping {
                return Err(PlayerError::AlreadyPlaying);
            }
            state.looping = true;
        }
        let _active = LoopActive(&**self);

        // Señales pendientes de un loop anterior no aplican a este
        self.interrupts.reset_all();

        let mut action = match song {
            Some(song) => NextAction::Continue {
                song,
                offset: start_at,
                resumed: false,
                delay: Duration::ZERO,
            },
            None => NextAction::Advance,
        };

        loop {
            action = match action {
                NextAction::Idle => return Ok(()),
                NextAction::Advance => match self.queue.dequeue() {
                    Ok(song) => {
                        self.resume_attempts.store(0, Ordering::SeqCst);
                        NextAction::Continue {
                            song,
                            offset: Duration::ZERO,
                            resumed: false,
                            delay: Duration::ZERO,
                        }
                    }
                    Err(_) => {
                        debug!("📭 Cola vacía en guild {}", self.guild_id);
                        self.settle_idle().await;
                        return Ok(());
                    }
                },
                NextAction::Continue {
                    song,
                    offset,
                    resumed,
                    delay,
                } => {
                    if !delay.is_zero() {
                        if let Some(next) = self.wait_before_resume(&song, delay).await {
                            action = next;
                            continue;
                        }
                    }

                    match self.run_attempt(song, offset, resumed).await {
                        Ok(next) => next,
                        Err(e) => {
                            self.skip_in_flight.store(false, Ordering::SeqCst);
                            // En Error se conservan canción y voz hasta un stop
                            if self.current_status() != PlaybackStatus::Error {
                                self.settle_idle().await;
                            }
                            return Err(e);
                        }
                    }
                }
            };
        }
    }

    /// Lanza el loop de reproducción en su propia tarea.
    pub fn spawn_play(self: &Arc<Self>, start_at: Duration, song: Option<Song>) -> tokio::task::JoinHandle<()> {
        let player = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = player.play(start_at, song).await {
                if e.is_benign() {
                    debug!("Play terminó: {}", e);
                } else {
                    error!("❌ Error de reproducción en guild {}: {}", player.guild_id, e);
                }
            }
        })
    }

    /// Un intento: codificar, conectar, transmitir y esperar la primera señal.
    async fn run_attempt(self: &Arc<Self>, song: Song, offset: Duration, resumed: bool) -> Result<NextAction, PlayerError> {
        let options = self.settings.encode.clone().starting_at(offset);

        let encoding = self
            .backend
            .encode(&song.locator, &options)
            .await
            .map(Arc::new)
            .map_err(|reason| PlayerError::Encode {
                locator: song.locator.clone(),
                reason,
            })?;
        let _release = EncodingRelease(Arc::clone(&encoding));

        let voice = self.ensure_voice().await?;

        let (stream, completion) = self.backend.stream(&encoding, &voice).await?;
        let stream = Arc::new(stream);

        if let Err(e) = voice.set_speaking(true).await {
            warn!("No se pudo activar speaking: {}", e);
        }

        {
            let mut state = self.state.lock();
            state.status = PlaybackStatus::Playing;
            state.current_song = Some(song.clone());
            state.encoding = Some(Arc::clone(&encoding));
            state.stream = Some(Arc::clone(&stream));
        }
        self.skip_in_flight.store(false, Ordering::SeqCst);

        if offset.is_zero() {
            info!("🎵 Reproduciendo: {} en guild {}", song.title, self.guild_id);
        } else {
            info!("🎵 Reanudando: {} desde {:?}", song.title, offset);
        }

        if !resumed {
            self.record_first_play(&song).await;
        }

        let ticker = self.spawn_stats_ticker(song.song_id.clone());

        let signal = tokio::select! {
            biased;
            _ = self.interrupts.stop.wait() => Signal::Stop,
            _ = self.interrupts.skip.wait() => Signal::Skip,
            _ = self.interrupts.switch_channel.wait() => Signal::SwitchChannel,
            res = completion => Signal::Completed(res.unwrap_or(Err(StreamError::Closed))),
        };
        drop(ticker);

        // Un skip en curso ya decidió la siguiente canción
        let signal = match signal {
            Signal::Completed(_) if self.skip_in_flight.load(Ordering::SeqCst) => Signal::Skip,
            other => other,
        };

        debug!("Señal recibida en guild {}: {:?}", self.guild_id, signal);

        match signal {
            Signal::Completed(Ok(())) => Ok(self.on_stream_end(song, &encoding, &stream).await),
            Signal::Completed(Err(e)) => self.on_stream_error(song, e, &voice, &stream).await,
            Signal::Skip => {
                self.release_attempt(&voice, &stream, &encoding).await;
                self.state.lock().status = PlaybackStatus::Resting;
                info!("⏭️ Canción saltada: {}", song.title);
                Ok(NextAction::Idle)
            }
            Signal::Stop => {
                self.release_attempt(&voice, &stream, &encoding).await;
                self.teardown().await;
                info!("⏹️ Reproducción detenida en guild {}", self.guild_id);
                Ok(NextAction::Idle)
            }
            Signal::SwitchChannel => {
                self.release_attempt(&voice, &stream, &encoding).await;
                Ok(self.switch_channel(song).await)
            }
        }
    }

    /// Fin limpio de la entrada: ¿terminó o se cortó?
    async fn on_stream_end(&self, song: Song, encoding: &Arc<B::Encoding>, stream: &Arc<B::Stream>) -> NextAction {
        let streamed = stream.playback_position().await;
        let encoded = encoding.stats().encoded_duration;
        let start_offset = encoding.options().start_offset;

        {
            let mut state = self.state.lock();
            state.status = PlaybackStatus::Resting;
            state.stream = None;
            state.encoding = None;
        }

        if song.is_live() {
            info!("📻 El stream en vivo '{}' se cortó, reiniciando", song.title);
            return self.schedule_resume(song, Duration::ZERO, streamed).await;
        }

        let duration = self.probe.song_duration(&song).await;
        let metrics = PlaybackMetrics::estimate(start_offset, encoded, streamed, duration);
        debug!(
            "Métricas de '{}': delay={:.2}s posición={:?} duración={:?}",
            song.title, metrics.delay_secs, metrics.position, metrics.duration
        );

        if metrics.cut_short() {
            warn!("⚠️ '{}' se cortó en {:?} de {:?}", song.title, metrics.position, duration);
            return self.schedule_resume(song, metrics.position, streamed).await;
        }

        self.on_song_finished(&song).await
    }

    async fn on_stream_error(
        &self,
        song: Song,
        err: StreamError,
        voice: &Arc<B::Voice>,
        stream: &Arc<B::Stream>,
    ) -> Result<NextAction, PlayerError> {
        let streamed = stream.playback_position().await;
        stream.stop();
        if let Err(e) = voice.set_speaking(false).await {
            debug!("Error al desactivar speaking: {}", e);
        }

        if song.is_live() {
            warn!("📻 El stream en vivo '{}' falló ({}), reiniciando", song.title, err);
            {
                let mut state = self.state.lock();
                state.status = PlaybackStatus::Resting;
                state.stream = None;
                state.encoding = None;
            }
            return Ok(self.schedule_resume(song, Duration::ZERO, streamed).await);
        }

        error!("❌ La transmisión de '{}' falló: {}", song.title, err);
        {
            let mut state = self.state.lock();
            state.status = PlaybackStatus::Error;
            state.stream = None;
            state.encoding = None;
        }
        Err(PlayerError::Stream(err))
    }

    /// La canción llegó al final: avanza la cola o queda en reposo.
    async fn on_song_finished(&self, song: &Song) -> NextAction {
        self.resume_attempts.store(0, Ordering::SeqCst);
        debug!("✅ Terminó: {}", song.title);

        if self.queue.is_empty() {
            self.settle_idle().await;
            NextAction::Idle
        } else {
            NextAction::Advance
        }
    }

    /// Reanudación tras un corte, con tope de intentos seguidos y espera exponencial.
    async fn schedule_resume(&self, song: Song, offset: Duration, streamed: Duration) -> NextAction {
        if streamed >= self.settings.resume_reset_after {
            self.resume_attempts.store(0, Ordering::SeqCst);
        }

        let attempt = self.resume_attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt > self.settings.max_resume_attempts {
            warn!(
                "🚫 '{}' se cortó {} veces seguidas, se da por terminada",
                song.title,
                attempt - 1
            );
            return self.on_song_finished(&song).await;
        }

        let exp = (attempt - 1).min(16);
        let delay = self
            .settings
            .resume_backoff
            .saturating_mul(1 << exp)
            .min(self.settings.resume_backoff_max);

        NextAction::Continue {
            song,
            offset,
            resumed: true,
            delay,
        }
    }

    /// Espera antes de reanudar sin dejar de atender los controles.
    async fn wait_before_resume(&self, song: &Song, delay: Duration) -> Option<NextAction> {
        debug!("⏳ Reintentando '{}' en {:?}", song.title, delay);

        let signal = tokio::select! {
            biased;
            _ = self.interrupts.stop.wait() => Signal::Stop,
            _ = self.interrupts.skip.wait() => Signal::Skip,
            _ = self.interrupts.switch_channel.wait() => Signal::SwitchChannel,
            _ = tokio::time::sleep(delay) => return None,
        };

        match signal {
            Signal::Stop => {
                self.teardown().await;
                Some(NextAction::Idle)
            }
            Signal::SwitchChannel => Some(self.switch_channel(song.clone()).await),
            _ => {
                self.state.lock().status = PlaybackStatus::Resting;
                Some(NextAction::Idle)
            }
        }
    }

    /// Suelta la sesión de voz para que el próximo intento entre al canal
    /// guardado en el reproductor. La canción vuelve a empezar.
    async fn switch_channel(&self, song: Song) -> NextAction {
        let (old_voice, channel_id) = {
            let mut state = self.state.lock();
            state.status = PlaybackStatus::Resting;
            (state.voice.take(), state.channel_id)
        };

        if let Some(voice) = old_voice {
            if let Err(e) = voice.disconnect().await {
                warn!("Error al desconectar del canal {}: {}", voice.channel_id(), e);
            }
        }
        info!("🔀 Cambiando al canal {} en guild {}", channel_id, self.guild_id);

        NextAction::Continue {
            song,
            offset: Duration::ZERO,
            resumed: true,
            delay: Duration::ZERO,
        }
    }

    /// Corta frames y speaking de un intento interrumpido. La sesión de
    /// codificación la libera el guard del intento.
    async fn release_attempt(&self, voice: &Arc<B::Voice>, stream: &Arc<B::Stream>, encoding: &Arc<B::Encoding>) {
        stream.stop();
        encoding.stop();
        if let Err(e) = voice.set_speaking(false).await {
            debug!("Error al desactivar speaking: {}", e);
        }

        let mut state = self.state.lock();
        state.stream = None;
        state.encoding = None;
    }

    /// Limpieza completa tras un stop.
    async fn teardown(&self) {
        let voice = {
            let mut state = self.state.lock();
            state.status = PlaybackStatus::Resting;
            state.current_song = None;
            state.stream = None;
            state.encoding = None;
            state.voice.take()
        };
        self.queue.clear();
        self.interrupts.reset_all();
        self.skip_in_flight.store(false, Ordering::SeqCst);
        self.resume_attempts.store(0, Ordering::SeqCst);

        if let Some(voice) = voice {
            if let Err(e) = voice.disconnect().await {
                warn!("Error al desconectar: {}", e);
            }
        }
    }

    /// Nada más que reproducir: suelta la voz y queda en reposo.
    async fn settle_idle(&self) {
        let voice = {
            let mut state = self.state.lock();
            state.status = PlaybackStatus::Resting;
            state.current_song = None;
            state.voice.take()
        };
        self.skip_in_flight.store(false, Ordering::SeqCst);

        if let Some(voice) = voice {
            if let Err(e) = voice.disconnect().await {
                warn!("Error al desconectar: {}", e);
            }
        }
        info!("💤 Reproductor en reposo en guild {}", self.guild_id);
    }

    /// Reutiliza la sesión de voz si está lista y en el canal destino; si no,
    /// la descarta y vuelve a conectar.
    async fn ensure_voice(&self) -> Result<Arc<B::Voice>, PlayerError> {
        let (existing, channel_id) = {
            let state = self.state.lock();
            (state.voice.clone(), state.channel_id)
        };

        if let Some(voice) = existing {
            if voice.channel_id() == channel_id && voice.is_ready().await {
                return Ok(voice);
            }
            debug!("Sesión de voz obsoleta en {}, reconectando", voice.channel_id());
            if let Err(e) = voice.disconnect().await {
                debug!("Error al desconectar sesión obsoleta: {}", e);
            }
            self.state.lock().voice = None;
        }

        let voice = Arc::new(
            self.voice_manager
                .acquire(&*self.backend, self.guild_id, channel_id)
                .await?,
        );
        self.state.lock().voice = Some(Arc::clone(&voice));
        Ok(voice)
    }

    async fn record_first_play(&self, song: &Song) {
        if let Err(e) = self.history.add_track_to_history(self.guild_id, song).await {
            warn!("No se pudo guardar '{}' en el historial: {}", song.title, e);
        }
        self.record_play_count(&song.song_id).await;
    }

    async fn record_play_count(&self, song_id: &str) {
        if let Err(e) = self.history.add_playback_count_stats(self.guild_id, song_id).await {
            warn!("No se pudo registrar la reproducción de {}: {}", song_id, e);
        }
    }

    /// Reporta al historial el tiempo reproducido. Termina al soltar el guard.
    fn spawn_stats_ticker(self: &Arc<Self>, song_id: String) -> DropGuard {
        let token = CancellationToken::new();
        let cancelled = token.clone();
        let player = Arc::clone(self);

        tokio::spawn(async move {
            let period = player.settings.stats_interval;
            let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);

            loop {
                tokio::select! {
                    _ = cancelled.cancelled() => break,
                    _ = interval.tick() => {
                        // Sólo cuenta tiempo realmente reproducido
                        if player.current_status() == PlaybackStatus::Playing {
                            if let Err(e) = player
                                .history
                                .add_playback_duration_stats(player.guild_id, &song_id, period.as_secs_f64())
                                .await
                            {
                                debug!("Error al registrar duración: {}", e);
                            }
                        }
                    }
                }
            }
        });

        token.drop_guard()
    }

    /// Pausa la transmisión activa y espera su confirmación.
    pub async fn pause(&self) -> Result<(), PlayerError> {
        let stream = {
            let state = self.state.lock();
            if state.current_song.is_none() {
                return Err(PlayerError::NothingPlaying);
            }
            if state.status != PlaybackStatus::Playing {
                return Err(PlayerError::NotPlaying);
            }
            state.stream.clone().ok_or(PlayerError::NoStream)?
        };

        stream.set_paused(true)?;

        if !self.wait_for_paused(&stream, true).await {
            warn!("⚠️ El stream no confirmó la pausa en guild {}", self.guild_id);
            return Err(PlayerError::PauseTimeout(self.settings.pause_timeout));
        }

        let mut state = self.state.lock();
        if state.stream.as_ref().is_some_and(|s| Arc::ptr_eq(s, &stream)) {
            state.status = PlaybackStatus::Paused;
        }
        info!("⏸️ Reproducción pausada en guild {}", self.guild_id);
        Ok(())
    }

    /// Reanuda la reproducción en `target_channel_id`.
    ///
    /// Un canal distinto interrumpe la transmisión y reconecta allí. Sin
    /// transmisión se arranca el loop con la canción actual o la cola.
    pub async fn unpause(self: &Arc<Self>, target_channel_id: ChannelId) -> Result<(), PlayerError> {
        let (stream, song, switched, looping) = {
            let mut state = self.state.lock();
            match state.status {
                PlaybackStatus::Playing => return Err(PlayerError::AlreadyPlaying),
                PlaybackStatus::Error => return Err(PlayerError::Errored),
                _ => {}
            }

            let switched = state.channel_id != target_channel_id;
            if switched {
                state.channel_id = target_channel_id;
            }
            (state.stream.clone(), state.current_song.clone(), switched, state.looping)
        };

        if switched && looping {
            self.interrupts.switch_channel.fire();
            info!("🔀 Solicitado cambio al canal {}", target_channel_id);
            return Ok(());
        }

        let Some(stream) = stream else {
            self.spawn_play(Duration::ZERO, song);
            return Ok(());
        };

        stream.set_paused(false)?;

        if let (true, _) = stream.finished().await {
            return Err(PlayerError::Finished);
        }
        if !self.wait_for_paused(&stream, false).await {
            return Err(PlayerError::StillPaused);
        }

        let mut state = self.state.lock();
        if state.stream.as_ref().is_some_and(|s| Arc::ptr_eq(s, &stream)) {
            state.status = PlaybackStatus::Playing;
        }
        info!("▶️ Reproducción reanudada en guild {}", self.guild_id);
        Ok(())
    }

    /// Consulta hasta que el stream reporte `paused`, con el timeout de pausa como límite.
    async fn wait_for_paused(&self, stream: &Arc<B::Stream>, paused: bool) -> bool {
        let poll = async {
            while stream.paused().await != paused {
                tokio::time::sleep(self.settings.pause_poll).await;
            }
        };
        tokio::time::timeout(self.settings.pause_timeout, poll).await.is_ok()
    }

    /// Salta a la siguiente canción, o detiene si la cola está vacía.
    ///
    /// Un skip que llega con otro pendiente se descarta.
    pub async fn skip(self: &Arc<Self>) -> Result<(), PlayerError> {
        let (song, looping) = {
            let state = self.state.lock();
            match (&state.current_song, &state.voice) {
                (Some(song), Some(_)) => (song.clone(), state.looping),
                _ => return Err(PlayerError::NothingPlaying),
            }
        };

        if self.queue.is_empty() {
            self.record_play_count(&song.song_id).await;
            return self.stop().await;
        }

        if self.interrupts.skip.is_pending() || self.skip_in_flight.swap(true, Ordering::SeqCst) {
            debug!("⏭️ Skip ya pendiente en guild {}, ignorado", self.guild_id);
            return Ok(());
        }

        self.record_play_count(&song.song_id).await;

        if looping {
            self.interrupts.skip.fire();
            tokio::time::sleep(self.settings.skip_grace).await;
        }

        let player = Arc::clone(self);
        tokio::spawn(async move {
            player.play_after_unwind().await;
        });
        Ok(())
    }

    /// Arranca el siguiente loop cuando el interrumpido terminó.
    async fn play_after_unwind(self: Arc<Self>) {
        const RETRIES: u32 = 10;

        for _ in 0..RETRIES {
            match self.play(Duration::ZERO, None).await {
                Err(PlayerError::AlreadyPlaying) => {
                    tokio::time::sleep(self.settings.skip_grace / 5).await;
                }
                Err(e) => {
                    error!("❌ Error al avanzar la cola en guild {}: {}", self.guild_id, e);
                    return;
                }
                Ok(()) => return,
            }
        }

        self.skip_in_flight.store(false, Ordering::SeqCst);
        warn!("⚠️ El loop anterior no terminó, no se pudo avanzar la cola");
    }

    /// Detiene la reproducción y vacía la cola. Sin sesión de voz no hace nada.
    ///
    /// A un loop activo sólo se le avisa; él libera sus propios handles.
    pub async fn stop(&self) -> Result<(), PlayerError> {
        let looping = {
            let state = self.state.lock();
            if state.voice.is_none() && !state.looping {
                debug!("⏹️ Nada que detener en guild {}", self.guild_id);
                return Ok(());
            }
            state.looping
        };

        if looping {
            self.interrupts.stop.fire();
            self.queue.clear();
            let mut state = self.state.lock();
            state.current_song = None;
            state.status = PlaybackStatus::Resting;
        } else {
            self.teardown().await;
        }

        info!("⏹️ Stop solicitado en guild {}", self.guild_id);
        Ok(())
    }
}
