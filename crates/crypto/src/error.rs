//! Fehlertypen fuer das Kryptografie-Subsystem

use thiserror::Error;

/// Fehler im Kryptografie-Subsystem
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CryptoError {
    /// Ungerade Laenge oder Nicht-Hex-Zeichen (InvalidKeyEncoding)
    #[error("Ungueltige Schluessel-Kodierung: {0}")]
    UngueltigeSchluesselKodierung(String),

    #[error("Ungueltige Schluessel-Laenge: erwartet {erwartet}, erhalten {erhalten}")]
    UngueltigeSchluesselLaenge { erwartet: usize, erhalten: usize },

    #[error("Verschluesselung fehlgeschlagen: {0}")]
    Verschluesselung(String),

    /// Tag ungueltig oder Daten zu kurz (AuthenticationFailure)
    #[error("Authentifizierung fehlgeschlagen")]
    Authentifizierung,
}

pub type CryptoResult<T> = Result<T, CryptoError>;
