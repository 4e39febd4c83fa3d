use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::assets::AssetPool;
use crate::audio::composer::{compose, parse_combo_tokens};
use crate::audio::decoder::DecoderLauncher;
use crate::audio::session::{Session, SessionKey, SessionKind};
use crate::audio::track::Track;
use crate::config::Config;
use crate::destination::Destination;
use crate::error::{CompositionWarning, PlaybackError};
use crate::sources::Resolver;

/// Registro de sesiones activas, una por canal.
///
/// Es el supervisor y la fachada del motor: crear o recuperar sesiones,
/// encolar, combinar y desmontar pasan por aquí. El mapa concurrente
/// garantiza una sola sesión por clave sin lock global.
pub struct SessionRegistry {
    sessions: DashMap<SessionKey, Arc<Session>>,
    assets: Arc<AssetPool>,
    resolver: Arc<dyn Resolver>,
    launcher: Arc<dyn DecoderLauncher>,
    config: Arc<Config>,
}

impl SessionRegistry {
    pub fn new(
        config: Arc<Config>,
        resolver: Arc<dyn Resolver>,
        launcher: Arc<dyn DecoderLauncher>,
    ) -> Arc<Self> {
        let assets = Arc::new(AssetPool::new(&config.sfx_dir));

        Arc::new(Self {
            sessions: DashMap::new(),
            assets,
            resolver,
            launcher,
            config,
        })
    }

    pub fn assets(&self) -> &AssetPool {
        &self.assets
    }

    pub(crate) fn config(&self) -> &Config {
        &self.config
    }

    pub(crate) fn resolver(&self) -> &dyn Resolver {
        self.resolver.as_ref()
    }

    pub(crate) fn launcher(&self) -> &dyn DecoderLauncher {
        self.launcher.as_ref()
    }

    /// Recupera la sesión del canal o la crea y arranca sus tareas.
    ///
    /// La entrada del mapa se crea de forma atómica: dos llamadas
    /// concurrentes con la misma clave obtienen la misma sesión.
    pub async fn get_or_create(
        self: &Arc<Self>,
        key: SessionKey,
        kind: SessionKind,
        destination: Arc<dyn Destination>,
    ) -> Arc<Session> {
        self.sessions
            .entry(key)
            .or_insert_with(|| {
                let session = Session::new(
                    key,
                    kind,
                    destination,
                    self.config.ambient_queue_size,
                    self.config.ambient_default_on,
                );
                session.start(self);
                session
            })
            .clone()
    }

    pub fn get(&self, key: SessionKey) -> Option<Arc<Session>> {
        self.sessions.get(&key).map(|entry| entry.clone())
    }

    fn active(&self, key: SessionKey) -> Result<Arc<Session>, PlaybackError> {
        self.get(key).ok_or(PlaybackError::SessionNotActive(key.0))
    }

    /// Desmonta la sesión del canal.
    ///
    /// Quitar la entrada del mapa es lo primero: de dos destrucciones
    /// concurrentes solo una obtiene la sesión y ejecuta el desmontaje.
    pub async fn destroy(&self, key: SessionKey) -> bool {
        let Some((_, session)) = self.sessions.remove(&key) else {
            return false;
        };

        session.shutdown().await;
        true
    }

    /// Desmonta todas las sesiones activas
    pub async fn shutdown_all(&self) {
        let keys: Vec<SessionKey> = self.sessions.iter().map(|entry| *entry.key()).collect();
        info!("🔌 Desmontando {} sesiones", keys.len());
        for key in keys {
            self.destroy(key).await;
        }
    }

    pub fn enqueue(&self, key: SessionKey, track: Arc<Track>) -> Result<(), PlaybackError> {
        let session = self.active(key)?;
        session.enqueue(track);
        Ok(())
    }

    pub fn enqueue_priority(&self, key: SessionKey, track: Arc<Track>) -> Result<(), PlaybackError> {
        let session = self.active(key)?;
        session.enqueue_front(track);
        Ok(())
    }

    pub fn stop(&self, key: SessionKey) -> Result<(), PlaybackError> {
        let session = self.active(key)?;
        session.stop();
        Ok(())
    }

    pub fn is_playing(&self, key: SessionKey) -> bool {
        self.get(key).map(|s| s.is_playing()).unwrap_or(false)
    }

    pub fn set_ambient_enabled(&self, key: SessionKey, enabled: bool) -> Result<(), PlaybackError> {
        let session = self.active(key)?;
        session.set_ambient_enabled(enabled);
        debug!("🎛️ Ambiente en {key}: {enabled}");
        Ok(())
    }

    /// Combina varios assets (con silencios opcionales) en un solo track
    /// y lo encola. Los tokens inválidos generan advertencias que se
    /// reportan al destino; solo una combinación sin assets falla.
    pub async fn combine(
        &self,
        key: SessionKey,
        tokens: &[&str],
    ) -> Result<Vec<CompositionWarning>, PlaybackError> {
        let session = self.active(key)?;

        if tokens.len() > self.config.max_combo {
            return Err(PlaybackError::TooManyItems {
                max: self.config.max_combo,
            });
        }

        let spec = parse_combo_tokens(tokens, &self.assets);
        for warning in &spec.warnings {
            if let Err(e) = session.destination().send(&warning.to_string()).await {
                warn!("⚠️ No se pudo reportar la advertencia: {e:#}");
            }
        }

        if spec.assets.is_empty() {
            let report = PlaybackError::CompositionFailure;
            if let Err(e) = session.destination().send(&report.to_string()).await {
                warn!("⚠️ No se pudo reportar el fallo: {e:#}");
            }
            return Err(report);
        }

        let composition = compose(&spec.assets, &spec.gaps)?;
        session.enqueue(Arc::new(Track::from_composition(composition)));
        Ok(spec.warnings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::{init_tracing, FakeDestination, FakeLauncher, FakeResolver};
    use pretty_assertions::assert_eq;
    use std::sync::atomic::Ordering;

    fn registry_with_assets(names: &[&str]) -> (tempfile::TempDir, Arc<SessionRegistry>, Arc<FakeLauncher>) {
        init_tracing();
        let dir = tempfile::tempdir().unwrap();
        for name in names {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }

        let mut config = Config::default();
        config.sfx_dir = dir.path().to_path_buf();
        config.delete_backoff_secs = 0;

        let launcher = FakeLauncher::new();
        let registry = SessionRegistry::new(Arc::new(config), FakeResolver::new(), launcher.clone());
        (dir, registry, launcher)
    }

    #[tokio::test]
    async fn test_get_or_create_returns_same_session() {
        let (_dir, registry, _launcher) = registry_with_assets(&[]);

        let a = registry
            .get_or_create(SessionKey(1), SessionKind::Music, FakeDestination::new())
            .await;
        let b = registry
            .get_or_create(SessionKey(1), SessionKind::Music, FakeDestination::new())
            .await;

        assert!(Arc::ptr_eq(&a, &b));
        registry.destroy(SessionKey(1)).await;
    }

    #[tokio::test]
    async fn test_concurrent_destroy_runs_shutdown_once() {
        let (_dir, registry, launcher) = registry_with_assets(&[]);
        let destination = FakeDestination::new();

        let session = registry
            .get_or_create(SessionKey(7), SessionKind::Music, destination.clone())
            .await;
        session.enqueue(Arc::new(Track::local("/tmp/a.mp3", "", "")));
        let started = launcher.wait_for_starts(1).await;

        let (a, b) = tokio::join!(
            registry.destroy(SessionKey(7)),
            registry.destroy(SessionKey(7)),
        );

        assert!(a ^ b, "exactamente una destrucción debe ganar");
        assert_eq!(started[0].stop_calls.load(Ordering::SeqCst), 1);
        assert_eq!(destination.disconnects.load(Ordering::SeqCst), 1);
        assert!(registry.get(SessionKey(7)).is_none());
    }

    #[tokio::test]
    async fn test_shutdown_all_destroys_every_session() {
        let (_dir, registry, _launcher) = registry_with_assets(&[]);
        let music = FakeDestination::new();
        let ambient = FakeDestination::new();

        registry
            .get_or_create(SessionKey(21), SessionKind::Music, music.clone())
            .await;
        registry
            .get_or_create(SessionKey(22), SessionKind::Ambient, ambient.clone())
            .await;

        registry.shutdown_all().await;

        assert!(registry.get(SessionKey(21)).is_none());
        assert!(registry.get(SessionKey(22)).is_none());
        assert_eq!(music.disconnects.load(Ordering::SeqCst), 1);
        assert_eq!(ambient.disconnects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_operations_on_missing_session_fail() {
        let (_dir, registry, _launcher) = registry_with_assets(&[]);

        let track = Arc::new(Track::local("/tmp/a.mp3", "", ""));
        assert!(matches!(
            registry.enqueue(SessionKey(9), track),
            Err(PlaybackError::SessionNotActive(9))
        ));
        assert!(!registry.is_playing(SessionKey(9)));
        assert!(!registry.destroy(SessionKey(9)).await);
    }

    #[tokio::test]
    async fn test_combine_builds_graph_with_silence() {
        let (_dir, registry, launcher) = registry_with_assets(&["tic.mp3", "toc.mp3"]);
        let destination = FakeDestination::new();

        registry
            .get_or_create(SessionKey(2), SessionKind::Music, destination)
            .await;

        let warnings = registry
            .combine(SessionKey(2), &["tic", "-2", "toc"])
            .await
            .unwrap();
        assert!(warnings.is_empty());

        let started = launcher.wait_for_starts(1).await;
        assert!(started[0].post_options.contains("aevalsrc=0:d=2[s0]"));
        assert!(started[0]
            .post_options
            .contains("[0:a:0] [s0] [1:a:0] concat=n=3:v=0:a=1 [a]"));

        registry.destroy(SessionKey(2)).await;
    }

    #[tokio::test]
    async fn test_combine_partial_invalid_warns_but_plays() {
        let (_dir, registry, launcher) = registry_with_assets(&["tic.mp3"]);
        let destination = FakeDestination::new();

        registry
            .get_or_create(SessionKey(3), SessionKind::Music, destination.clone())
            .await;

        let warnings = registry
            .combine(SessionKey(3), &["tic", "nope"])
            .await
            .unwrap();
        assert_eq!(warnings.len(), 1);
        assert_eq!(destination.messages.lock().len(), 1);

        let started = launcher.wait_for_starts(1).await;
        assert!(started[0].path.ends_with("tic.mp3"));

        registry.destroy(SessionKey(3)).await;
    }

    #[tokio::test]
    async fn test_combine_all_invalid_is_error() {
        let (_dir, registry, _launcher) = registry_with_assets(&[]);
        let destination = FakeDestination::new();

        registry
            .get_or_create(SessionKey(4), SessionKind::Music, destination.clone())
            .await;

        let result = registry.combine(SessionKey(4), &["nope", "tampoco"]).await;
        assert!(matches!(result, Err(PlaybackError::CompositionFailure)));
        // dos advertencias mas el reporte del fallo
        assert_eq!(destination.messages.lock().len(), 3);

        registry.destroy(SessionKey(4)).await;
    }

    #[tokio::test]
    async fn test_combine_enforces_max_items() {
        let (_dir, registry, _launcher) = registry_with_assets(&["tic.mp3"]);

        registry
            .get_or_create(SessionKey(5), SessionKind::Music, FakeDestination::new())
            .await;

        let tokens: Vec<&str> = std::iter::repeat("tic").take(9).collect();
        let result = registry.combine(SessionKey(5), &tokens).await;
        assert!(matches!(result, Err(PlaybackError::TooManyItems { max: 8 })));

        registry.destroy(SessionKey(5)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_injector_enqueues_ambient_track() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("lluvia.mp3"), b"x").unwrap();

        let mut config = Config::default();
        config.sfx_dir = dir.path().to_path_buf();
        config.ambient_chance = 1.0;
        config.ambient_pair_chance = 0.0;
        config.ambient_interval_secs = 60;

        let launcher = FakeLauncher::new();
        let registry = SessionRegistry::new(Arc::new(config), FakeResolver::new(), launcher.clone());

        registry
            .get_or_create(SessionKey(6), SessionKind::Ambient, FakeDestination::new())
            .await;

        let started = launcher.wait_for_starts(1).await;
        assert!(started[0].path.ends_with("lluvia.mp3"));

        registry.destroy(SessionKey(6)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_injector_destroys_session_without_humans() {
        let (_dir, registry, _launcher) = registry_with_assets(&[]);
        let destination = FakeDestination::new();
        destination.set_participants(vec![]);

        registry
            .get_or_create(SessionKey(8), SessionKind::Ambient, destination.clone())
            .await;

        // el primer tick del inyector detecta el canal vacío
        tokio::time::sleep(std::time::Duration::from_secs(1)).await;
        for _ in 0..20 {
            if registry.get(SessionKey(8)).is_none() {
                break;
            }
            tokio::task::yield_now().await;
        }

        assert!(registry.get(SessionKey(8)).is_none());
        assert_eq!(destination.disconnects.load(Ordering::SeqCst), 1);
    }
}
