//! Dobles de prueba compartidos entre los módulos del crate.

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

use crate::audio::decoder::{CompletionFn, DecoderHandle, DecoderLauncher};
use crate::destination::{Destination, Participant};
use crate::sources::{Locator, ResolvedMedia, Resolver};

/// Inicializa tracing para los tests; idempotente entre tests del mismo
/// binario
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Resolver falso: cuenta invocaciones y simula éxito, fallo o demora
pub struct FakeResolver {
    pub calls: AtomicUsize,
    pub fail: AtomicBool,
    pub probe_ok: AtomicBool,
    pub delay: Mutex<Duration>,
    pub downloaded: AtomicBool,
    pub serve_path: Mutex<Option<PathBuf>>,
}

impl FakeResolver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
            probe_ok: AtomicBool::new(true),
            delay: Mutex::new(Duration::ZERO),
            downloaded: AtomicBool::new(false),
            serve_path: Mutex::new(None),
        })
    }
}

#[async_trait]
impl Resolver for FakeResolver {
    async fn resolve(&self, locator: &Locator) -> Result<ResolvedMedia> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let delay = *self.delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("fallo simulado");
        }

        let local_path = self
            .serve_path
            .lock()
            .clone()
            .unwrap_or_else(|| PathBuf::from("/tmp/resolved.mp3"));

        Ok(ResolvedMedia {
            title: format!("resuelto {}", locator.describe()),
            uploader: Some("prueba".to_owned()),
            duration_secs: 180,
            is_live: false,
            local_path,
            source_id: Some("fake-id".to_owned()),
            downloaded: self.downloaded.load(Ordering::SeqCst),
        })
    }

    async fn probe(&self, _locator: &Locator) -> Result<()> {
        if self.probe_ok.load(Ordering::SeqCst) {
            Ok(())
        } else {
            anyhow::bail!("sonda simulada falló")
        }
    }
}

/// Estado observable de un decodificador falso
pub struct FakeHandleState {
    pub path: PathBuf,
    pub pre_options: String,
    pub post_options: String,
    pub stop_calls: AtomicUsize,
    done: AtomicBool,
    complete: Mutex<Option<CompletionFn>>,
}

impl FakeHandleState {
    /// Simula el final natural del proceso
    pub fn finish(&self) {
        self.done.store(true, Ordering::SeqCst);
        if let Some(on_complete) = self.complete.lock().take() {
            on_complete();
        }
    }

    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::SeqCst)
    }
}

struct FakeHandle {
    state: Arc<FakeHandleState>,
}

impl DecoderHandle for FakeHandle {
    fn stop(&self) {
        self.state.stop_calls.fetch_add(1, Ordering::SeqCst);
        self.state.finish();
    }

    fn is_done(&self) -> bool {
        self.state.is_done()
    }
}

/// Lanzador falso: registra cada arranque y entrega handles controlables
pub struct FakeLauncher {
    handles: Mutex<Vec<Arc<FakeHandleState>>>,
    started: Notify,
    pub fail_next: AtomicBool,
}

impl FakeLauncher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            handles: Mutex::new(Vec::new()),
            started: Notify::new(),
            fail_next: AtomicBool::new(false),
        })
    }

    /// Espera hasta que hayan arrancado al menos `n` decodificadores
    pub async fn wait_for_starts(&self, n: usize) -> Vec<Arc<FakeHandleState>> {
        loop {
            {
                let handles = self.handles.lock();
                if handles.len() >= n {
                    return handles.clone();
                }
            }
            self.started.notified().await;
        }
    }
}

#[async_trait]
impl DecoderLauncher for FakeLauncher {
    async fn start(
        &self,
        path: &Path,
        pre_options: &str,
        post_options: &str,
        on_complete: CompletionFn,
    ) -> Result<Box<dyn DecoderHandle>> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            anyhow::bail!("lanzamiento simulado falló");
        }

        let state = Arc::new(FakeHandleState {
            path: path.to_path_buf(),
            pre_options: pre_options.to_owned(),
            post_options: post_options.to_owned(),
            stop_calls: AtomicUsize::new(0),
            done: AtomicBool::new(false),
            complete: Mutex::new(Some(on_complete)),
        });

        self.handles.lock().push(state.clone());
        self.started.notify_one();

        Ok(Box::new(FakeHandle { state }))
    }
}

/// Destino falso: acumula mensajes y expone participantes configurables
pub struct FakeDestination {
    pub messages: Mutex<Vec<String>>,
    participants: Mutex<Vec<Participant>>,
    pub disconnects: AtomicUsize,
}

impl FakeDestination {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            messages: Mutex::new(Vec::new()),
            participants: Mutex::new(vec![Participant {
                name: "ana".to_owned(),
                is_bot: false,
            }]),
            disconnects: AtomicUsize::new(0),
        })
    }

    pub fn set_participants(&self, participants: Vec<Participant>) {
        *self.participants.lock() = participants;
    }
}

#[async_trait]
impl Destination for FakeDestination {
    async fn send(&self, message: &str) -> Result<()> {
        self.messages.lock().push(message.to_owned());
        Ok(())
    }

    async fn participants(&self) -> Result<Vec<Participant>> {
        Ok(self.participants.lock().clone())
    }

    async fn disconnect(&self) -> Result<()> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
