use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::{Locator, ResolvedMedia, Resolver};

/// Resolver basado en yt-dlp + una sonda HTTP para validación.
///
/// La resolución corre `yt-dlp -j` para los metadatos y, si la descarga
/// está habilitada, una segunda invocación que materializa el audio en el
/// directorio de cache (con short-circuit si el id ya está cacheado).
pub struct YtDlpResolver {
    cache_dir: PathBuf,
    download: bool,
    http: reqwest::Client,
}

impl YtDlpResolver {
    pub fn new(cache_dir: impl Into<PathBuf>, download: bool) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            cache_dir: cache_dir.into(),
            download,
            http,
        })
    }

    /// Verifica que yt-dlp esté disponible
    pub async fn verify_dependencies() -> Result<()> {
        let output = Command::new("yt-dlp").arg("--version").output().await;

        match output {
            Ok(output) if output.status.success() => {
                let version = String::from_utf8_lossy(&output.stdout);
                info!("✅ yt-dlp versión: {}", version.trim());
                Ok(())
            }
            _ => anyhow::bail!("yt-dlp no disponible"),
        }
    }

    /// Extrae metadatos sin descargar
    async fn fetch_info(&self, request: &str) -> Result<serde_json::Value> {
        let output = Command::new("yt-dlp")
            .args([
                "-j",
                "--no-playlist",
                "--default-search",
                "ytsearch",
                "-f",
                "bestaudio/best",
                "--socket-timeout",
                "30",
                "--retries",
                "3",
                "--no-warnings",
            ])
            .arg(request)
            .output()
            .await
            .context("no se pudo ejecutar yt-dlp")?;

        if !output.status.success() {
            anyhow::bail!(
                "yt-dlp falló: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        serde_json::from_slice(&output.stdout).context("salida de yt-dlp no es JSON válido")
    }

    /// Busca en el cache un archivo ya descargado para este id
    fn find_cached(&self, id: &str) -> Option<PathBuf> {
        let prefix = format!("{id}.");
        let entries = std::fs::read_dir(&self.cache_dir).ok()?;
        entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .find(|path| {
                path.file_name()
                    .and_then(|name| name.to_str())
                    .map(|name| name.starts_with(&prefix))
                    .unwrap_or(false)
            })
    }

    async fn download_media(&self, request: &str, id: &str) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.cache_dir).await?;

        let template = self.cache_dir.join("%(id)s.%(ext)s");
        let output = Command::new("yt-dlp")
            .args([
                "-f",
                "bestaudio/best",
                "--no-playlist",
                "--default-search",
                "ytsearch",
                "--no-warnings",
                "-o",
            ])
            .arg(&template)
            .arg(request)
            .output()
            .await
            .context("no se pudo ejecutar yt-dlp para descargar")?;

        if !output.status.success() {
            anyhow::bail!(
                "descarga con yt-dlp falló: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        self.find_cached(id)
            .ok_or_else(|| anyhow::anyhow!("descarga completada pero sin archivo para {id}"))
    }
}

#[async_trait]
impl Resolver for YtDlpResolver {
    async fn resolve(&self, locator: &Locator) -> Result<ResolvedMedia> {
        match locator {
            Locator::Local(path) => {
                if !tokio::fs::try_exists(path).await.unwrap_or(false) {
                    anyhow::bail!("no existe el archivo {}", path.display());
                }

                let title = path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or("sfx")
                    .to_owned();

                Ok(ResolvedMedia {
                    title,
                    uploader: None,
                    duration_secs: 0,
                    is_live: false,
                    local_path: path.clone(),
                    source_id: None,
                    downloaded: false,
                })
            }
            Locator::Remote(request) => {
                let info = self.fetch_info(request).await?;

                let id = info["id"].as_str().map(str::to_owned);
                let title = info["title"].as_str().unwrap_or("Sin título").to_owned();
                let uploader = info["uploader"].as_str().map(str::to_owned);
                let duration_secs = info["duration"].as_f64().unwrap_or(0.0) as u64;
                let is_live = info["is_live"].as_bool().unwrap_or(false);

                // Un stream en vivo no se materializa, siempre va directo
                if self.download && !is_live {
                    if let Some(id) = &id {
                        if let Some(path) = self.find_cached(id) {
                            debug!("💾 Cache hit para {id}: {}", path.display());
                            return Ok(ResolvedMedia {
                                title,
                                uploader,
                                duration_secs,
                                is_live,
                                local_path: path,
                                source_id: Some(id.clone()),
                                downloaded: true,
                            });
                        }

                        info!("⬇️ Descargando {title}");
                        let path = self.download_media(request, id).await?;
                        return Ok(ResolvedMedia {
                            title,
                            uploader,
                            duration_secs,
                            is_live,
                            local_path: path,
                            source_id: Some(id.clone()),
                            downloaded: true,
                        });
                    }

                    warn!("⚠️ Sin id estable para {request}, usando stream directo");
                }

                let stream = info["url"].as_str().unwrap_or(request).to_owned();
                Ok(ResolvedMedia {
                    title,
                    uploader,
                    duration_secs,
                    is_live,
                    local_path: PathBuf::from(stream),
                    source_id: id,
                    downloaded: false,
                })
            }
        }
    }

    async fn probe(&self, locator: &Locator) -> Result<()> {
        match locator {
            Locator::Local(path) => {
                if tokio::fs::try_exists(path).await.unwrap_or(false) {
                    Ok(())
                } else {
                    anyhow::bail!("el archivo {} ya no existe", path.display())
                }
            }
            Locator::Remote(request) => {
                let response = self.http.head(request).send().await?;
                if !response.status().is_success() {
                    anyhow::bail!("sonda falló con estado {}", response.status());
                }
                Ok(())
            }
        }
    }
}
