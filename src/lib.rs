//! Motor de colas de reproducción por canal.
//!
//! Cada canal activo tiene una sesión con su propia cola ordenada y un
//! bucle reproductor que conduce un decodificador externo (ffmpeg). Las
//! sesiones ambientales además inyectan efectos aleatorios de fondo. El
//! registro supervisa el conjunto: una sesión por canal, creación
//! atómica y desmontaje idempotente.
//!
//! La capa de transporte queda fuera: quien integre el motor implementa
//! [`Destination`] para reportar mensajes, listar participantes y cortar
//! la conexión de voz.

pub mod assets;
pub mod audio;
pub mod config;
pub mod destination;
pub mod error;
pub mod sources;

#[cfg(test)]
pub(crate) mod testkit;

pub use assets::AssetPool;
pub use audio::composer::{compose, parse_combo_tokens, ComboSpec, Composition, SilenceGap};
pub use audio::decoder::{CompletionFn, DecoderHandle, DecoderLauncher, FfmpegLauncher};
pub use audio::queue::TrackQueue;
pub use audio::registry::SessionRegistry;
pub use audio::session::{Session, SessionKey, SessionKind};
pub use audio::track::{ResolutionState, ResolvedAudio, Track};
pub use config::Config;
pub use destination::{Destination, Participant};
pub use error::{CompositionWarning, PlaybackError};
pub use sources::ytdlp::YtDlpResolver;
pub use sources::{Locator, ResolvedMedia, Resolver};
