use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Paths
    pub sfx_dir: PathBuf,
    pub cache_dir: PathBuf,

    // Resolución
    pub freshness_window_secs: u64, // Ventana de validez de un track remoto resuelto
    pub persist_downloads: bool,    // Conservar descargas tras la reproducción

    // Inyector ambiental
    pub ambient_interval_secs: u64,
    pub ambient_chance: f64,
    pub ambient_pair_chance: f64,
    pub ambient_queue_size: usize,
    pub ambient_default_on: bool,

    // Límites
    pub max_combo: usize, // Máximo de tokens aceptados por combinación

    // Limpieza
    pub delete_retries: u32,
    pub delete_backoff_secs: u64,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            // Paths
            sfx_dir: std::env::var("SFX_DIR")
                .unwrap_or_else(|_| "./sfx".to_string())
                .into(),
            cache_dir: std::env::var("CACHE_DIR")
                .unwrap_or_else(|_| "./cache".to_string())
                .into(),

            // Resolución
            freshness_window_secs: std::env::var("FRESHNESS_WINDOW_SECS")
                .unwrap_or_else(|_| "7200".to_string()) // 2 horas
                .parse()?,
            persist_downloads: std::env::var("PERSIST_DOWNLOADS")
                .unwrap_or_else(|_| "false".to_string())
                .parse()?,

            // Inyector ambiental
            ambient_interval_secs: std::env::var("AMBIENT_INTERVAL_SECS")
                .unwrap_or_else(|_| "60".to_string())
                .parse()?,
            ambient_chance: std::env::var("AMBIENT_CHANCE")
                .unwrap_or_else(|_| "0.1".to_string())
                .parse()?,
            ambient_pair_chance: std::env::var("AMBIENT_PAIR_CHANCE")
                .unwrap_or_else(|_| "0.5".to_string())
                .parse()?,
            ambient_queue_size: std::env::var("AMBIENT_QUEUE_SIZE")
                .unwrap_or_else(|_| "6".to_string())
                .parse()?,
            ambient_default_on: std::env::var("AMBIENT_DEFAULT_ON")
                .unwrap_or_else(|_| "true".to_string())
                .parse()?,

            // Límites
            max_combo: std::env::var("MAX_COMBO")
                .unwrap_or_else(|_| "8".to_string())
                .parse()?,

            // Limpieza
            delete_retries: std::env::var("DELETE_RETRIES")
                .unwrap_or_else(|_| "2".to_string())
                .parse()?,
            delete_backoff_secs: std::env::var("DELETE_BACKOFF_SECS")
                .unwrap_or_else(|_| "1".to_string())
                .parse()?,
        };

        // Create directories if they don't exist
        std::fs::create_dir_all(&config.sfx_dir)?;
        std::fs::create_dir_all(&config.cache_dir)?;

        // Validate configuration before returning
        config.validate()?;

        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// Performs sanity checks on configuration values to catch
    /// common mistakes before any session is created.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.ambient_chance) {
            anyhow::bail!(
                "ambient_chance debe estar entre 0.0 y 1.0, se recibió: {}",
                self.ambient_chance
            );
        }

        if !(0.0..=1.0).contains(&self.ambient_pair_chance) {
            anyhow::bail!(
                "ambient_pair_chance debe estar entre 0.0 y 1.0, se recibió: {}",
                self.ambient_pair_chance
            );
        }

        if self.ambient_queue_size == 0 {
            anyhow::bail!("ambient_queue_size debe ser mayor que 0");
        }

        if self.ambient_interval_secs == 0 {
            anyhow::bail!("ambient_interval_secs debe ser mayor que 0");
        }

        if self.freshness_window_secs == 0 {
            anyhow::bail!("freshness_window_secs debe ser mayor que 0");
        }

        if self.max_combo == 0 {
            anyhow::bail!("max_combo debe ser mayor que 0");
        }

        Ok(())
    }

    /// Returns a summary of the current configuration for logging.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Paths: sfx={}, cache={}\n  \
            Resolución: {}s de frescura, persistir={}\n  \
            Ambiental: cada {}s, p={} (par p={}), cola de {}\n  \
            Límites: {} sfx por combo, {} reintentos de borrado",
            self.sfx_dir.display(),
            self.cache_dir.display(),
            self.freshness_window_secs,
            self.persist_downloads,
            self.ambient_interval_secs,
            self.ambient_chance,
            self.ambient_pair_chance,
            self.ambient_queue_size,
            self.max_combo,
            self.delete_retries,
        )
    }
}

/// Default configuration values.
///
/// Used as fallbacks when environment variables are not provided.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Path defaults
            sfx_dir: "./sfx".into(),
            cache_dir: "./cache".into(),

            // Resolution defaults
            freshness_window_secs: 7200, // 2 horas
            persist_downloads: false,

            // Ambient defaults
            ambient_interval_secs: 60,
            ambient_chance: 0.1,
            ambient_pair_chance: 0.5,
            ambient_queue_size: 6,
            ambient_default_on: true,

            // Limit defaults
            max_combo: 8,

            // Cleanup defaults
            delete_retries: 2,
            delete_backoff_secs: 1,
        }
    }
}
