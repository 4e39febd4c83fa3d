pub mod ytdlp;

use anyhow::Result;
use async_trait::async_trait;
use std::path::PathBuf;
use url::Url;

pub use ytdlp::YtDlpResolver;

/// Localizador de un track: referencia remota o archivo local
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    /// URL o término de búsqueda que el resolver convierte en audio
    Remote(String),
    /// Archivo ya presente en disco (pool de assets o ruta arbitraria)
    Local(PathBuf),
}

impl Locator {
    /// Clasifica una petición textual: URL http(s) o archivo existente
    /// van directo; cualquier otra cosa se trata como búsqueda remota.
    pub fn from_request(request: &str) -> Self {
        if let Ok(url) = Url::parse(request) {
            if matches!(url.scheme(), "http" | "https") {
                return Self::Remote(request.to_owned());
            }
        }

        let path = PathBuf::from(request);
        if path.is_file() {
            return Self::Local(path);
        }

        Self::Remote(request.to_owned())
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Remote(_))
    }

    pub fn describe(&self) -> String {
        match self {
            Self::Remote(url) => url.clone(),
            Self::Local(path) => path.display().to_string(),
        }
    }
}

/// Resultado de una resolución exitosa
#[derive(Debug, Clone)]
pub struct ResolvedMedia {
    pub title: String,
    pub uploader: Option<String>,
    /// Duración en segundos; 0 = desconocida
    pub duration_secs: u64,
    pub is_live: bool,
    /// Ruta local (o URL de stream) lista para el decodificador
    pub local_path: PathBuf,
    /// Id estable de la fuente, usado para el cache de descargas
    pub source_id: Option<String>,
    /// true si se materializó una copia privada en el cache
    pub downloaded: bool,
}

/// Colaborador que convierte localizadores en audio reproducible
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Resuelve un localizador a un asset local (descargando si aplica)
    async fn resolve(&self, locator: &Locator) -> Result<ResolvedMedia>;

    /// Sonda barata de vida sobre el localizador (sin descargar nada)
    async fn probe(&self, locator: &Locator) -> Result<()>;
}
