use parking_lot::Mutex;
use std::{collections::VecDeque, time::Duration};
use tracing::{debug, info};

use crate::{audio::song::Song, error::PlayerError};

/// Cola FIFO. El orden de inserción es el de reproducción y se permiten duplicados.
///
/// Cada operación toma el lock interno, así la comparten el loop y los
/// controles sin sincronización extra.
#[derive(Debug, Default)]
pub struct SongQueue {
    items: Mutex<VecDeque<Song>>,
}

impl SongQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Agrega una canción al final de la cola
    pub fn enqueue(&self, song: Song) {
        info!("➕ Agregado a la cola: {}", song.title);
        self.items.lock().push_back(song);
    }

    /// Agrega varias canciones conservando su orden
    pub fn enqueue_all(&self, songs: impl IntoIterator<Item = Song>) -> usize {
        let mut items = self.items.lock();
        let before = items.len();
        items.extend(songs);
        let added = items.len() - before;
        info!("➕ Agregadas {} canciones a la cola", added);
        added
    }

    /// Saca el frente de la cola. Vacía es un error, nunca una canción por defecto.
    pub fn dequeue(&self) -> Result<Song, PlayerError> {
        match self.items.lock().pop_front() {
            Some(song) => {
                debug!("➡️ Siguiente en cola (FIFO): {}", song.title);
                Ok(song)
            }
            None => Err(PlayerError::QueueEmpty),
        }
    }

    pub fn clear(&self) {
        self.items.lock().clear();
        debug!("🗑️ Cola limpiada");
    }

    /// Copia estable de la cola para mostrarla
    pub fn snapshot(&self) -> Vec<Song> {
        self.items.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// Suma de las duraciones conocidas
    pub fn total_duration(&self) -> Duration {
        self.items.lock().iter().filter_map(|song| song.duration).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::song::SourceKind;

    fn song(id: &str) -> Song {
        Song::new(id, format!("/music/{id}.mp3"), id, SourceKind::LocalFile)
    }

    #[test]
    fn test_dequeue_is_fifo() {
        let queue = SongQueue::new();
        for id in ["a", "b", "c"] {
            queue.enqueue(song(id));
        }

        let order: Vec<String> = std::iter::from_fn(|| queue.dequeue().ok())
            .map(|s| s.song_id)
            .collect();
        assert_eq!(order, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_dequeue_empty_is_error() {
        let queue = SongQueue::new();
        assert!(matches!(queue.dequeue(), Err(PlayerError::QueueEmpty)));

        queue.enqueue(song("a"));
        queue.dequeue().unwrap();
        assert!(matches!(queue.dequeue(), Err(PlayerError::QueueEmpty)));
    }

    #[test]
    fn test_duplicates_are_kept() {
        let queue = SongQueue::new();
        queue.enqueue(song("a"));
        queue.enqueue(song("a"));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_clear_and_total_duration() {
        let queue = SongQueue::new();
        queue.enqueue_all([
            song("a").with_duration(Duration::from_secs(60)),
            song("b"),
            song("c").with_duration(Duration::from_secs(30)),
        ]);
        assert_eq!(queue.total_duration(), Duration::from_secs(90));

        queue.clear();
        assert!(queue.is_empty());
        assert!(queue.snapshot().is_empty());
    }
}
