mod common;

use common::{channel, song, wait_until, FakeBackend, FakeHistory, FakeProbe};
use guild_audio::audio::{player::PlayerSettings, PlaybackStatus, PlayerRegistry};
use serenity::model::id::GuildId;
use std::{sync::Arc, time::Duration};

fn registry() -> (Arc<FakeBackend>, PlayerRegistry<FakeBackend>) {
    let backend = FakeBackend::new();
    let registry = PlayerRegistry::new(
        Arc::clone(&backend),
        FakeHistory::new(),
        Arc::new(FakeProbe),
        PlayerSettings::default(),
    );
    (backend, registry)
}

#[tokio::test]
async fn test_one_player_per_guild() {
    let (_, registry) = registry();

    let first = registry.get_or_create(GuildId::new(1), channel(10));
    let again = registry.get_or_create(GuildId::new(1), channel(99));
    let other = registry.get_or_create(GuildId::new(2), channel(20));

    assert!(Arc::ptr_eq(&first, &again));
    assert!(!Arc::ptr_eq(&first, &other));
    // El canal del primer get_or_create se mantiene
    assert_eq!(again.channel_id(), channel(10));
    assert_eq!(registry.len(), 2);
    assert!(registry.get(GuildId::new(3)).is_none());
}

#[tokio::test(start_paused = true)]
async fn test_unregister_stops_playback() {
    let (backend, registry) = registry();
    let player = registry.get_or_create(GuildId::new(1), channel(10));
    player.enqueue(song("a", 60));
    player.enqueue(song("b", 60));
    player.spawn_play(Duration::ZERO, None);
    wait_until("a playing", || player.current_status() == PlaybackStatus::Playing).await;

    registry.unregister(GuildId::new(1)).await;

    assert!(registry.get(GuildId::new(1)).is_none());
    assert!(player.song_queue().is_empty());
    wait_until("loop exit", || !player.is_active()).await;
    assert_eq!(backend.disconnect_count(), 1);
    assert_eq!(backend.cleanup_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_stops_every_guild() {
    let (backend, registry) = registry();
    let players: Vec<_> = (1..=3)
        .map(|id| {
            let player = registry.get_or_create(GuildId::new(id), channel(10 + id));
            player.enqueue(song("a", 60));
            player.spawn_play(Duration::ZERO, None);
            player
        })
        .collect();
    wait_until("all streaming", || backend.stream_count() == 3).await;

    registry.shutdown().await;

    assert!(registry.is_empty());
    for player in &players {
        wait_until("loop exit", || !player.is_active()).await;
        assert_eq!(player.current_status(), PlaybackStatus::Resting);
    }
    assert_eq!(backend.disconnect_count(), 3);
}
