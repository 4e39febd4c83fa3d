use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::audio::composer::compose;
use crate::audio::decoder::DecoderHandle;
use crate::audio::queue::TrackQueue;
use crate::audio::registry::SessionRegistry;
use crate::audio::track::Track;
use crate::destination::Destination;
use crate::error::PlaybackError;

/// Identificador del canal al que pertenece una sesión
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionKey(pub u64);

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Tipo de sesión: determina la cola y las tareas de fondo
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionKind {
    /// Cola sin límite, sin inyector
    Music,
    /// Cola acotada con inyector ambiental
    Ambient,
}

/// Una sesión de reproducción activa sobre un canal.
///
/// El bucle reproductor es el único consumidor de la cola y el único
/// dueño del handle del decodificador activo. La señal de finalización
/// llega por un canal mpsc de capacidad 1: el callback del decodificador
/// dispara desde cualquier hilo y `try_send` la entrega sin bloquear.
pub struct Session {
    key: SessionKey,
    kind: SessionKind,
    queue: TrackQueue,
    current: Mutex<Option<Box<dyn DecoderHandle>>>,
    finished_tx: mpsc::Sender<()>,
    finished_rx: Mutex<Option<mpsc::Receiver<()>>>,
    ambient_enabled: AtomicBool,
    destination: Arc<dyn Destination>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Session {
    pub(crate) fn new(
        key: SessionKey,
        kind: SessionKind,
        destination: Arc<dyn Destination>,
        ambient_queue_size: usize,
        ambient_default_on: bool,
    ) -> Arc<Self> {
        let queue = match kind {
            SessionKind::Music => TrackQueue::unbounded(),
            SessionKind::Ambient => TrackQueue::bounded(ambient_queue_size),
        };
        let (finished_tx, finished_rx) = mpsc::channel(1);

        Arc::new(Self {
            key,
            kind,
            queue,
            current: Mutex::new(None),
            finished_tx,
            finished_rx: Mutex::new(Some(finished_rx)),
            ambient_enabled: AtomicBool::new(ambient_default_on),
            destination,
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// Lanza las tareas de fondo de la sesión
    pub(crate) fn start(self: &Arc<Self>, registry: &Arc<SessionRegistry>) {
        let mut tasks = self.tasks.lock();

        {
            let session = self.clone();
            let registry = registry.clone();
            tasks.push(tokio::spawn(async move {
                session.player_loop(registry).await;
            }));
        }

        if self.kind == SessionKind::Ambient {
            let session = self.clone();
            let registry = registry.clone();
            tasks.push(tokio::spawn(async move {
                session.injector_loop(registry).await;
            }));
        }

        info!("🎵 Sesión {} iniciada ({:?})", self.key, self.kind);
    }

    pub fn key(&self) -> SessionKey {
        self.key
    }

    pub fn kind(&self) -> SessionKind {
        self.kind
    }

    pub fn destination(&self) -> &Arc<dyn Destination> {
        &self.destination
    }

    pub fn enqueue(&self, track: Arc<Track>) {
        debug!("➕ Encolado en {}: {}", self.key, track);
        self.queue.enqueue(track);
    }

    pub fn enqueue_front(&self, track: Arc<Track>) {
        debug!("➕ Encolado con prioridad en {}: {}", self.key, track);
        self.queue.enqueue_front(track);
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Corta el track en curso; el bucle avanza solo al siguiente
    pub fn stop(&self) {
        if let Some(handle) = self.current.lock().as_ref() {
            debug!("⏭️ Cortando el track en curso de {}", self.key);
            handle.stop();
        }
    }

    pub fn is_playing(&self) -> bool {
        self.current
            .lock()
            .as_ref()
            .map(|handle| !handle.is_done())
            .unwrap_or(false)
    }

    pub fn set_ambient_enabled(&self, enabled: bool) {
        self.ambient_enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn ambient_enabled(&self) -> bool {
        self.ambient_enabled.load(Ordering::SeqCst)
    }

    /// Desmonta la sesión: mejor esfuerzo, nunca falla
    pub(crate) async fn shutdown(&self) {
        let tasks: Vec<_> = self.tasks.lock().drain(..).collect();
        for task in tasks {
            task.abort();
        }

        if let Some(handle) = self.current.lock().take() {
            handle.stop();
        }

        self.queue.clear();

        if let Err(e) = self.destination.disconnect().await {
            warn!("⚠️ Error al desconectar la sesión {}: {e:#}", self.key);
        }

        info!("🗑️ Sesión {} desmontada", self.key);
    }

    /// Bucle reproductor: consume la cola y conduce el decodificador
    async fn player_loop(self: Arc<Self>, registry: Arc<SessionRegistry>) {
        let Some(mut finished_rx) = self.finished_rx.lock().take() else {
            warn!("⚠️ El bucle reproductor de {} ya corrió una vez", self.key);
            return;
        };

        let config = registry.config();
        let backoff = Duration::from_secs(config.delete_backoff_secs);

        loop {
            // señales rezagadas de un track anterior no deben saltarse este
            while finished_rx.try_recv().is_ok() {}

            let track = self.queue.next().await;

            track
                .validate(
                    registry.resolver(),
                    self.destination.as_ref(),
                    config.freshness_window_secs,
                )
                .await;

            if !track.is_resolved() {
                warn!("⏭️ Saltando {} (no se pudo resolver)", track);
                // una resolución anterior pudo dejar una copia en el cache
                track
                    .release(config.delete_retries, backoff, config.persist_downloads)
                    .await;
                continue;
            }

            let Some(audio) = track.resolved_audio() else {
                continue;
            };

            let launched = {
                let tx = self.finished_tx.clone();
                registry
                    .launcher()
                    .start(
                        &audio.path,
                        &audio.pre_options,
                        &audio.post_options,
                        Box::new(move || {
                            let _ = tx.try_send(());
                        }),
                    )
                    .await
            };

            let handle = match launched {
                Ok(handle) => handle,
                Err(e) => {
                    let report = PlaybackError::DecodeLaunch {
                        path: audio.path.display().to_string(),
                        reason: format!("{e:#}"),
                    };
                    warn!("❌ {report}");
                    if let Err(send_err) = self.destination.send(&report.to_string()).await {
                        warn!("⚠️ No se pudo reportar el fallo: {send_err:#}");
                    }
                    track
                        .release(config.delete_retries, backoff, config.persist_downloads)
                        .await;
                    continue;
                }
            };

            info!("▶️ Reproduciendo en {}: {}", self.key, track);
            *self.current.lock() = Some(handle);

            if finished_rx.recv().await.is_none() {
                break;
            }

            self.current.lock().take();
            track
                .release(config.delete_retries, backoff, config.persist_downloads)
                .await;
        }
    }

    /// Inyector ambiental: un tick por intervalo, con salida automática
    /// cuando el canal se queda sin humanos
    async fn injector_loop(self: Arc<Self>, registry: Arc<SessionRegistry>) {
        let config = registry.config();
        let interval = Duration::from_secs(config.ambient_interval_secs);

        loop {
            match self.destination.participants().await {
                Ok(participants) => {
                    if !participants.iter().any(|p| !p.is_bot) {
                        info!("👋 Sin humanos en {}, desmontando la sesión", self.key);
                        // el desmontaje aborta esta misma tarea, así que
                        // corre en una tarea aparte
                        let registry = registry.clone();
                        let key = self.key;
                        tokio::spawn(async move {
                            registry.destroy(key).await;
                        });
                        return;
                    }
                }
                Err(e) => warn!("⚠️ No se pudo listar participantes de {}: {e:#}", self.key),
            }

            if self.ambient_enabled() && rand::random::<f64>() < config.ambient_chance {
                self.inject_ambient(&registry, config.ambient_pair_chance);
            }

            tokio::time::sleep(interval).await;
        }
    }

    fn inject_ambient(&self, registry: &SessionRegistry, pair_chance: f64) {
        let Some(first) = registry.assets().random() else {
            return;
        };

        let track = if rand::random::<f64>() < pair_chance {
            match registry.assets().random() {
                Some(second) => match compose(&[first.clone(), second], &[]) {
                    Ok(composition) => Track::from_composition(composition),
                    Err(_) => Track::local(first, "", ""),
                },
                None => Track::local(first, "", ""),
            }
        } else {
            Track::local(first, "", "")
        };

        debug!("🎲 Inyección ambiental en {}: {}", self.key, track);
        self.queue.enqueue(Arc::new(track));
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("key", &self.key)
            .field("kind", &self.kind)
            .field("queue_len", &self.queue.len())
            .finish()
    }
}
