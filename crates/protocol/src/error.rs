//! Fehlertypen fuer Umschlag und Wire-Format

use thiserror::Error;

/// Fehler beim Kodieren/Dekodieren von Umschlaegen und Frames
#[derive(Debug, Error)]
pub enum ProtokollError {
    /// Bytes lassen sich nicht als Umschlag lesen (MalformedEnvelope)
    #[error("Ungueltiger Umschlag: {0}")]
    UngueltigerUmschlag(String),

    #[error("Frame zu gross: {laenge} Bytes (Maximum: {maximum} Bytes)")]
    FrameZuGross { laenge: usize, maximum: usize },
}

impl ProtokollError {
    /// Erstellt einen Umschlag-Fehler
    pub fn umschlag(msg: impl Into<String>) -> Self {
        Self::UngueltigerUmschlag(msg.into())
    }
}

pub type ProtokollResult<T> = Result<T, ProtokollError>;
