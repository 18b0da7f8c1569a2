use anyhow::{Context as _, Result};
use serenity::{model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;
use tracing::{error, info};

use guild_audio::{
    audio::{metrics::MediaDurationProbe, songbird_backend::SongbirdBackend, PlayerRegistry},
    bot::MusicBot,
    config::Config,
    history::{HistoryRecorder, JsonHistoryStore},
    sources::QueryResolver,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("guild_audio=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎵 Iniciando guild-audio v{}", env!("CARGO_PKG_VERSION"));

    // Cargar configuración
    let config = Config::load().context("No se pudo cargar la configuración")?;

    if std::env::args().any(|arg| arg == "--health-check") {
        return health_check(&config).await;
    }
    info!("{}", config.summary());
    let config = Arc::new(config);

    // Historial de reproducción
    let history: Arc<dyn HistoryRecorder> = Arc::new(JsonHistoryStore::new(config.data_dir.clone()).await?);

    // Motor de audio: un reproductor por guild
    let songbird = Songbird::serenity();
    let backend = Arc::new(SongbirdBackend::new(Arc::clone(&songbird), config.ffmpeg_path.clone()));
    let probe = Arc::new(MediaDurationProbe::new(config.ffprobe_path.clone()));
    let registry = Arc::new(PlayerRegistry::new(
        backend,
        Arc::clone(&history),
        probe,
        config.player_settings(),
    ));
    let resolver = Arc::new(QueryResolver::standard(&config, history));

    // Configurar intents mínimos necesarios
    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_VOICE_STATES
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT;

    let handler = MusicBot::new(Arc::clone(&config), Arc::clone(&registry), resolver);

    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .register_songbird_with(songbird)
        .await
        .context("Error al crear el cliente de Discord")?;

    // Manejar shutdown graceful
    let shard_manager = Arc::clone(&client.shard_manager);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Error al registrar Ctrl+C: {:?}", e);
            return;
        }
        info!("⚠️ Señal de shutdown recibida, cerrando...");
        registry.shutdown().await;
        shard_manager.shutdown_all().await;
    });

    // Iniciar bot
    info!("🚀 Bot iniciado exitosamente");
    if let Err(why) = client.start().await {
        error!("Error al ejecutar cliente: {:?}", why);
    }

    Ok(())
}

async fn health_check(config: &Config) -> Result<()> {
    // Verificar dependencias críticas
    let tools = [
        (config.ffmpeg_path.as_str(), "-version"),
        (config.ffprobe_path.as_str(), "-version"),
        (config.ytdlp_path.as_str(), "--version"),
    ];

    let mut missing = Vec::new();
    for (tool, flag) in tools {
        let ok = async_process::Command::new(tool)
            .arg(flag)
            .output()
            .await
            .map(|output| output.status.success())
            .unwrap_or(false);
        if !ok {
            missing.push(tool);
        }
    }

    if missing.is_empty() {
        println!("OK");
        Ok(())
    } else {
        anyhow::bail!("Dependencias faltantes: {}", missing.join(", "));
    }
}
