use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::process::Command;
use tokio::sync::Notify;
use tracing::{debug, warn};

/// Callback de finalización; puede dispararse desde cualquier hilo
pub type CompletionFn = Box<dyn FnOnce() + Send + 'static>;

/// Handle de un proceso decodificador activo
pub trait DecoderHandle: Send + Sync {
    /// Termina el proceso. Dispara el mismo callback de finalización que
    /// un final natural: stop no es un camino de código aparte.
    fn stop(&self);

    fn is_done(&self) -> bool;
}

/// Colaborador que lanza el decodificador como subproceso opaco
#[async_trait]
pub trait DecoderLauncher: Send + Sync {
    async fn start(
        &self,
        path: &Path,
        pre_options: &str,
        post_options: &str,
        on_complete: CompletionFn,
    ) -> Result<Box<dyn DecoderHandle>>;
}

/// Lanzador por defecto: ffmpeg con opciones de paso directo.
///
/// La salida decodificada (s16le 48kHz estéreo por stdout) la consume la
/// capa de voz que integre este núcleo; aquí solo importa el ciclo de
/// vida del proceso y su señal de finalización.
pub struct FfmpegLauncher;

struct FfmpegHandle {
    kill: Arc<Notify>,
    done: Arc<AtomicBool>,
}

impl DecoderHandle for FfmpegHandle {
    fn stop(&self) {
        self.kill.notify_one();
    }

    fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }
}

#[async_trait]
impl DecoderLauncher for FfmpegLauncher {
    async fn start(
        &self,
        path: &Path,
        pre_options: &str,
        post_options: &str,
        on_complete: CompletionFn,
    ) -> Result<Box<dyn DecoderHandle>> {
        let mut cmd = Command::new("ffmpeg");
        cmd.args(split_options(pre_options));
        cmd.arg("-i").arg(path);
        cmd.args(split_options(post_options));
        cmd.args(["-f", "s16le", "-ar", "48000", "-ac", "2", "pipe:1"]);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        let mut child = cmd
            .spawn()
            .with_context(|| format!("no se pudo lanzar ffmpeg para {}", path.display()))?;
        debug!("🎚️ ffmpeg lanzado para {}", path.display());

        let kill = Arc::new(Notify::new());
        let done = Arc::new(AtomicBool::new(false));

        // La espera corre en su propia tarea: el callback puede disparar
        // desde cualquier worker, por eso la señal río arriba es thread-safe.
        {
            let kill = kill.clone();
            let done = done.clone();
            tokio::spawn(async move {
                tokio::select! {
                    status = child.wait() => match status {
                        Ok(status) if !status.success() => {
                            warn!("⚠️ ffmpeg terminó con estado {status}");
                        }
                        Ok(_) => {}
                        Err(e) => warn!("⚠️ Error esperando a ffmpeg: {e}"),
                    },
                    _ = kill.notified() => {
                        debug!("⏹️ Terminando ffmpeg");
                        let _ = child.start_kill();
                        let _ = child.wait().await;
                    }
                }

                done.store(true, Ordering::Release);
                on_complete();
            });
        }

        Ok(Box::new(FfmpegHandle { kill, done }))
    }
}

/// Divide una cadena de opciones respetando comillas dobles
fn split_options(options: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut quoted = false;

    for c in options.chars() {
        match c {
            '"' => quoted = !quoted,
            c if c.is_whitespace() && !quoted => {
                if !current.is_empty() {
                    out.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }

    if !current.is_empty() {
        out.push(current);
    }

    out
}
