use tokio::sync::{mpsc, Mutex};

/// Señal de capacidad uno que consume el loop de reproducción.
///
/// `fire` nunca bloquea: si ya hay una señal pendiente de este tipo la nueva
/// se descarta, así hay como mucho una pendiente por tipo.
#[derive(Debug)]
pub struct Interrupt {
    tx: mpsc::Sender<()>,
    rx: Mutex<mpsc::Receiver<()>>,
}

impl Interrupt {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel(1);
        Self { tx, rx: Mutex::new(rx) }
    }

    /// Devuelve `true` si esta llamada encoló la señal.
    pub fn fire(&self) -> bool {
        self.tx.try_send(()).is_ok()
    }

    pub fn is_pending(&self) -> bool {
        self.tx.capacity() == 0
    }

    /// Descarta una señal pendiente; el canal queda como recién creado.
    pub fn reset(&self) {
        if let Ok(mut rx) = self.rx.try_lock() {
            while rx.try_recv().is_ok() {}
        }
    }

    /// Espera la siguiente señal. Es cancel-safe: descartar el future no pierde nada.
    pub async fn wait(&self) {
        let mut rx = self.rx.lock().await;
        // El sender vive en self, así que recv nunca devuelve None
        let _ = rx.recv().await;
    }
}

impl Default for Interrupt {
    fn default() -> Self {
        Self::new()
    }
}

/// Las tres señales de control de un reproductor.
#[derive(Debug, Default)]
pub struct Interrupts {
    pub skip: Interrupt,
    pub stop: Interrupt,
    pub switch_channel: Interrupt,
}

impl Interrupts {
    pub fn reset_all(&self) {
        self.skip.reset();
        self.stop.reset();
        self.switch_channel.reset();
    }
}
