use anyhow::Result;
use rand::seq::SliceRandom;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Tamaño máximo de un asset agregado por subida (1 MB)
const MAX_ASSET_BYTES: usize = 1_000_000;

/// Pool de assets locales reproducibles.
///
/// Es un listado de directorio compartido de solo lectura; la única
/// escritura (`add_asset`) usa `create_new` para no pisar un nombre
/// existente.
#[derive(Debug, Clone)]
pub struct AssetPool {
    dir: PathBuf,
}

impl AssetPool {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Listado ordenado de nombres de archivo del pool
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries
                .filter_map(|entry| entry.ok())
                .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
                .filter_map(|entry| entry.file_name().into_string().ok())
                .collect(),
            Err(e) => {
                warn!(
                    "⚠️ No se pudo listar el pool de assets en {}: {}",
                    self.dir.display(),
                    e
                );
                Vec::new()
            }
        };
        names.sort();
        names
    }

    /// Busca un asset por nombre: stem exacto, luego prefijo de stem,
    /// luego substring del nombre completo. Gana el primer nivel con
    /// resultados.
    pub fn search(&self, name: &str) -> Option<PathBuf> {
        let name = name.replace(' ', "");
        let files = self.list();

        let found = files
            .iter()
            .find(|file| stem(file) == name)
            .or_else(|| files.iter().find(|file| stem(file).starts_with(&name)))
            .or_else(|| files.iter().find(|file| file.contains(&name)))?;

        Some(self.dir.join(found))
    }

    /// Un asset al azar, para el inyector ambiental
    pub fn random(&self) -> Option<PathBuf> {
        let files = self.list();
        let file = files.choose(&mut rand::thread_rng())?;
        Some(self.dir.join(file))
    }

    /// Agrega un asset nuevo al pool sin sobreescribir nombres existentes
    pub fn add_asset(&self, name: &str, data: &[u8]) -> Result<PathBuf> {
        if !name.ends_with(".mp3") {
            anyhow::bail!("El archivo debe ser un mp3");
        }

        if data.len() > MAX_ASSET_BYTES {
            anyhow::bail!("El archivo supera el límite de {} bytes", MAX_ASSET_BYTES);
        }

        let path = self.dir.join(name);
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| anyhow::anyhow!("Ya existe un archivo con el nombre {name} ({e})"))?;
        file.write_all(data)?;

        debug!("📁 Asset agregado: {}", path.display());
        Ok(path)
    }
}

/// Stem al estilo del pool: todo antes de la última extensión
fn stem(filename: &str) -> &str {
    filename.rsplit_once('.').map(|(s, _)| s).unwrap_or("")
}
