//! Motor de reproducción: sesiones, colas, composición y decodificador.

pub mod composer;
pub mod decoder;
pub mod queue;
pub mod registry;
pub mod session;
pub mod track;
