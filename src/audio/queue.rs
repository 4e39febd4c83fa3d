use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::debug;

use crate::audio::track::Track;

/// Cola ordenada de tracks de una sesión.
///
/// La variante acotada descarta el elemento más antiguo al desbordar
/// (cola ambiental); la variante sin límite deja el control al caller
/// (cola de música). La señal de "cola no vacía" usa `notify_one`, que
/// almacena un permiso: un enqueue nunca se pierde aunque el consumidor
/// todavía no esté esperando.
#[derive(Debug)]
pub struct TrackQueue {
    items: Mutex<VecDeque<Arc<Track>>>,
    not_empty: Notify,
    max_size: Option<usize>,
}

impl TrackQueue {
    pub fn unbounded() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            not_empty: Notify::new(),
            max_size: None,
        }
    }

    pub fn bounded(max_size: usize) -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            not_empty: Notify::new(),
            max_size: Some(max_size),
        }
    }

    /// Agrega al final y despierta al consumidor
    pub fn enqueue(&self, track: Arc<Track>) {
        {
            let mut items = self.items.lock();
            if let Some(max) = self.max_size {
                if items.len() >= max {
                    if let Some(dropped) = items.pop_front() {
                        debug!("📤 Cola llena, descartando el más antiguo: {}", dropped);
                    }
                }
            }
            items.push_back(track);
        }
        self.not_empty.notify_one();
    }

    /// Inserta al frente (prioridad, p. ej. anuncios del sistema)
    pub fn enqueue_front(&self, track: Arc<Track>) {
        {
            let mut items = self.items.lock();
            if let Some(max) = self.max_size {
                if items.len() >= max {
                    if let Some(dropped) = items.pop_back() {
                        debug!("📤 Cola llena, descartando la cola: {}", dropped);
                    }
                }
            }
            items.push_front(track);
        }
        self.not_empty.notify_one();
    }

    /// Saca la cabeza sin bloquear
    pub fn dequeue_next(&self) -> Option<Arc<Track>> {
        self.items.lock().pop_front()
    }

    /// Saca la cabeza, esperando a que la cola deje de estar vacía
    pub async fn next(&self) -> Arc<Track> {
        loop {
            if let Some(track) = self.dequeue_next() {
                return track;
            }
            self.not_empty.notified().await;
        }
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    pub fn clear(&self) {
        self.items.lock().clear();
    }
}
