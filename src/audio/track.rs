use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::audio::composer::Composition;
use crate::destination::Destination;
use crate::error::PlaybackError;
use crate::sources::{Locator, Resolver};

/// Opciones que siempre acompañan al decodificador
const DEFAULT_PRE_OPTIONS: &str = "-nostdin";
const DEFAULT_POST_OPTIONS: &str = "-vn -b:a 128k";

/// Estado de resolución de un track
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionState {
    Unresolved,
    Resolving,
    Resolved,
    Failed,
}

/// Audio resuelto, listo para entregar al decodificador
#[derive(Debug, Clone)]
pub struct ResolvedAudio {
    pub path: PathBuf,
    pub pre_options: String,
    pub post_options: String,
}

#[derive(Debug)]
struct TrackData {
    title: String,
    uploader: Option<String>,
    duration_secs: u64,
    is_live: bool,
    source_id: Option<String>,
    resolved: Option<ResolvedAudio>,
    last_resolved_at: Option<DateTime<Utc>>,
    /// true si el archivo es una copia privada descargada al cache
    owns_file: bool,
    pre_options: String,
    post_options: String,
}

/// Una unidad reproducible de audio (remota o local).
///
/// El estado de resolución vive en un canal `watch`: el cambio de estado
/// es a la vez la señal de finalización, y cualquier número de esperas
/// concurrentes la observa sin carreras. La resolución corre a lo sumo
/// una vez en vuelo; una llamada reentrante espera la señal existente.
#[derive(Debug)]
pub struct Track {
    locator: Locator,
    data: Mutex<TrackData>,
    state: watch::Sender<ResolutionState>,
}

impl Track {
    /// Track remoto aún sin resolver (URL o búsqueda)
    pub fn remote(request: impl Into<String>) -> Self {
        let request = request.into();
        let (state, _) = watch::channel(ResolutionState::Unresolved);

        Self {
            locator: Locator::Remote(request),
            data: Mutex::new(TrackData {
                title: "Sin título".to_owned(),
                uploader: None,
                duration_secs: 0,
                is_live: false,
                source_id: None,
                resolved: None,
                last_resolved_at: None,
                owns_file: false,
                pre_options: merge_pre_options(""),
                post_options: merge_post_options(""),
            }),
            state,
        }
    }

    /// Track local ya reproducible, con opciones extra del decodificador
    pub fn local(path: impl Into<PathBuf>, pre_options: &str, post_options: &str) -> Self {
        let path = path.into();
        let title = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("sfx")
            .to_owned();

        let pre = merge_pre_options(pre_options);
        let post = merge_post_options(post_options);
        let (state, _) = watch::channel(ResolutionState::Resolved);

        Self {
            locator: Locator::Local(path.clone()),
            data: Mutex::new(TrackData {
                title,
                uploader: None,
                duration_secs: 0,
                is_live: false,
                source_id: None,
                resolved: Some(ResolvedAudio {
                    path,
                    pre_options: pre.clone(),
                    post_options: post.clone(),
                }),
                last_resolved_at: Some(Utc::now()),
                owns_file: false,
                pre_options: pre,
                post_options: post,
            }),
            state,
        }
    }

    /// Clasifica una petición textual y construye el track apropiado
    pub fn from_request(request: &str) -> Self {
        match Locator::from_request(request) {
            Locator::Local(path) => Self::local(path, "", ""),
            Locator::Remote(url) => Self::remote(url),
        }
    }

    /// Track que envuelve una composición del filter-graph
    pub fn from_composition(composition: Composition) -> Self {
        match composition {
            Composition::Single(path) => Self::local(path, "", ""),
            Composition::Graph {
                input,
                post_options,
            } => Self::local(input, "", &post_options),
        }
    }

    pub fn locator(&self) -> &Locator {
        &self.locator
    }

    pub fn state(&self) -> ResolutionState {
        *self.state.borrow()
    }

    pub fn is_resolved(&self) -> bool {
        self.state() == ResolutionState::Resolved
    }

    pub fn title(&self) -> String {
        self.data.lock().title.clone()
    }

    pub fn duration_secs(&self) -> u64 {
        self.data.lock().duration_secs
    }

    pub fn is_live(&self) -> bool {
        self.data.lock().is_live
    }

    pub fn resolved_audio(&self) -> Option<ResolvedAudio> {
        self.data.lock().resolved.clone()
    }

    /// "título subido por uploader", para reportes largos
    pub fn long_str(&self) -> String {
        let data = self.data.lock();
        match &data.uploader {
            Some(uploader) => format!("**{}** subido por {}", data.title, uploader),
            None => format!("**{}**", data.title),
        }
    }

    /// Un track remoto resuelto solo vale dentro de la ventana de frescura
    pub fn is_fresh(&self, window_secs: u64) -> bool {
        let data = self.data.lock();
        self.fresh_locked(&data, window_secs)
    }

    fn fresh_locked(&self, data: &TrackData, window_secs: u64) -> bool {
        if !self.locator.is_remote() {
            return true;
        }

        match data.last_resolved_at {
            Some(at) => {
                Utc::now().signed_duration_since(at) < chrono::Duration::seconds(window_secs as i64)
            }
            None => false,
        }
    }

    /// Resuelve el track a un archivo local reproducible.
    ///
    /// Resuelto y fresco: retorna de inmediato. Resolución en vuelo: espera
    /// su señal sin invocar al resolver una segunda vez. En cualquier otro
    /// caso transita a `Resolving` y delega en el resolver; el fallo se
    /// reporta al destino y deja el track en `Failed`, nunca se propaga.
    pub async fn resolve(
        &self,
        resolver: &dyn Resolver,
        destination: &dyn Destination,
        freshness_window_secs: u64,
    ) {
        enum Claim {
            Fresh,
            InFlight,
            Ours,
        }

        let claim = {
            let data = self.data.lock();
            match *self.state.borrow() {
                ResolutionState::Resolved if self.fresh_locked(&data, freshness_window_secs) => {
                    Claim::Fresh
                }
                ResolutionState::Resolving => Claim::InFlight,
                _ => {
                    self.state.send_replace(ResolutionState::Resolving);
                    Claim::Ours
                }
            }
        };

        match claim {
            Claim::Fresh => return,
            Claim::InFlight => {
                // otra resolución en vuelo: esperar su señal
                let mut rx = self.state.subscribe();
                while *rx.borrow_and_update() == ResolutionState::Resolving {
                    if rx.changed().await.is_err() {
                        return;
                    }
                }
                return;
            }
            Claim::Ours => {}
        }

        debug!("🔍 Resolviendo {}", self.locator.describe());
        match resolver.resolve(&self.locator).await {
            Ok(media) => {
                {
                    let mut data = self.data.lock();
                    data.title = media.title;
                    data.uploader = media.uploader;
                    data.duration_secs = media.duration_secs;
                    data.is_live = media.is_live;
                    data.source_id = media.source_id;
                    data.owns_file = media.downloaded;
                    data.resolved = Some(ResolvedAudio {
                        path: media.local_path,
                        pre_options: data.pre_options.clone(),
                        post_options: data.post_options.clone(),
                    });
                    data.last_resolved_at = Some(Utc::now());
                }
                info!("✅ Resuelto: {}", self.long_str());
                self.state.send_replace(ResolutionState::Resolved);
            }
            Err(e) => {
                error!("❌ Fallo al resolver {}: {:#}", self.locator.describe(), e);
                let report = PlaybackError::Resolution {
                    title: self.title(),
                    reason: format!("{e:#}"),
                };
                if let Err(send_err) = destination.send(&report.to_string()).await {
                    warn!("⚠️ No se pudo reportar el fallo de resolución: {send_err:#}");
                }
                self.state.send_replace(ResolutionState::Failed);
            }
        }
    }

    /// Revalida un track remoto fuera de la ventana de frescura.
    ///
    /// Dentro de la ventana no hace nada. Fuera de ella sondea el
    /// localizador; solo una sonda fallida fuerza la re-resolución.
    pub async fn validate(
        &self,
        resolver: &dyn Resolver,
        destination: &dyn Destination,
        freshness_window_secs: u64,
    ) {
        if !self.locator.is_remote() {
            return;
        }

        if self.is_resolved() && self.is_fresh(freshness_window_secs) {
            return;
        }

        if self.is_resolved() {
            if resolver.probe(&self.locator).await.is_ok() {
                return;
            }
            info!(
                "🔄 Sonda falló para {}, re-resolviendo",
                self.locator.describe()
            );
        }

        self.resolve(resolver, destination, freshness_window_secs).await;
    }

    /// Borra la copia privada descargada, si la hay.
    ///
    /// El decodificador puede retener el archivo un instante después de
    /// terminar, así que el borrado reintenta con una pausa. El fallo
    /// definitivo se registra y se abandona, nunca se propaga.
    pub async fn release(&self, retries: u32, backoff: Duration, persist: bool) {
        let (path, owns) = {
            let data = self.data.lock();
            (
                data.resolved.as_ref().map(|audio| audio.path.clone()),
                data.owns_file,
            )
        };

        let Some(path) = path else { return };
        if persist || !owns {
            return;
        }

        for attempt in 0..=retries {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {
                    info!("🗑️ Borrado {}", path.display());
                    return;
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => return,
                Err(e) if attempt < retries => {
                    debug!("Borrado falló (intento {}): {}", attempt + 1, e);
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => {
                    warn!(
                        "⚠️ No se pudo borrar {} tras {} intentos: {}",
                        path.display(),
                        retries + 1,
                        e
                    );
                }
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn backdate_resolution(&self, secs: i64) {
        let mut data = self.data.lock();
        if let Some(at) = data.last_resolved_at {
            data.last_resolved_at = Some(at - chrono::Duration::seconds(secs));
        }
    }
}

impl fmt::Display for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "**{}**", self.data.lock().title)
    }
}

fn merge_pre_options(pre: &str) -> String {
    if pre.contains(DEFAULT_PRE_OPTIONS) {
        pre.trim().to_owned()
    } else {
        format!("{DEFAULT_PRE_OPTIONS} {pre}").trim().to_owned()
    }
}

fn merge_post_options(post: &str) -> String {
    if post.contains(DEFAULT_POST_OPTIONS) {
        post.trim().to_owned()
    } else {
        format!("{post} {DEFAULT_POST_OPTIONS}").trim().to_owned()
    }
}
