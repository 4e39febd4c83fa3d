use std::fmt;
use thiserror::Error;

/// Errores del núcleo de reproducción.
///
/// Ninguno de estos errores es fatal para el proceso: la resolución y el
/// lanzamiento del decodificador se recuperan avanzando la cola, y los
/// errores de registro se tratan como "no hay sesión activa".
#[derive(Debug, Error)]
pub enum PlaybackError {
    /// Fallo de red/lookup/descarga al resolver un track
    #[error("No se pudo resolver **{title}**: {reason}")]
    Resolution { title: String, reason: String },

    /// El subproceso decodificador no pudo iniciarse
    #[error("No se pudo lanzar el decodificador para {path}: {reason}")]
    DecodeLaunch { path: String, reason: String },

    /// Ningún elemento válido quedó tras filtrar la combinación
    #[error("No se encontró ningún sfx válido para combinar")]
    CompositionFailure,

    /// La combinación supera el límite configurado de elementos
    #[error("Máximo {max} sfx se pueden combinar")]
    TooManyItems { max: usize },

    /// Operación sobre una sesión inexistente
    #[error("No hay una sesión activa para la clave {0}")]
    SessionNotActive(u64),
}

/// Advertencia por un elemento inválido dentro de una combinación.
///
/// Se reporta al canal del solicitante pero no aborta el resto de la
/// composición.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompositionWarning {
    /// La duración del silencio no es un número positivo
    InvalidSilence { token: String },
    /// El BPM debe ser un entero mayor que cero
    NonPositiveBpm { token: String },
    /// El nombre no coincide con ningún asset del pool
    UnknownAsset { name: String },
}

impl fmt::Display for CompositionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidSilence { token } => {
                write!(f, "La duración del silencio debe ser un número: `{token}`")
            }
            Self::NonPositiveBpm { token } => {
                write!(f, "El BPM debe ser mayor que 0: `{token}`")
            }
            Self::UnknownAsset { name } => {
                write!(f, "No se encontró **{name}**, saltándolo")
            }
        }
    }
}
