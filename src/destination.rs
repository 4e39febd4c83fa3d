use anyhow::Result;
use async_trait::async_trait;

/// Un participante del destino de reproducción (canal de voz)
#[derive(Debug, Clone)]
pub struct Participant {
    pub name: String,
    pub is_bot: bool,
}

/// Abstracción del canal/destino de reproducción.
///
/// El núcleo nunca habla con el gateway directamente: reporta fallos,
/// consulta participantes y se desconecta a través de este trait.
#[async_trait]
pub trait Destination: Send + Sync {
    /// Envía un mensaje de texto al canal del solicitante
    async fn send(&self, message: &str) -> Result<()>;

    /// Participantes actuales del destino de voz
    async fn participants(&self) -> Result<Vec<Participant>>;

    /// Abandona el destino de reproducción
    async fn disconnect(&self) -> Result<()>;
}
