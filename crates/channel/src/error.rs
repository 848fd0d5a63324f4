//! Fehlertypen fuer Kanal und Sitzung

use securechat_crypto::CryptoError;
use securechat_protocol::ProtokollError;
use thiserror::Error;

/// Fehlertyp fuer Channel-Manager und Sitzung
///
/// Verbindungsfehler einzelner Peers treten asynchron auf und kommen als
/// `KanalEreignis::Getrennt` mit Zustand `Fehlgeschlagen` beim Konsumenten
/// an, nicht als Rueckgabewert.
#[derive(Debug, Error)]
pub enum KanalError {
    /// Listener konnte nicht gestartet werden (Port belegt, keine Rechte, ...)
    #[error("Listener konnte nicht an {adresse} gebunden werden: {quelle}")]
    BindFehler {
        adresse: String,
        #[source]
        quelle: std::io::Error,
    },

    /// Zieladresse fuer `connect_to_host` nicht verwendbar
    #[error("Ungueltige Adresse: {0}")]
    UngueltigeAdresse(String),

    #[error("Ungueltige Konfiguration: {0}")]
    Konfiguration(String),

    /// Der Manager-Task laeuft nicht mehr
    #[error("Channel-Manager ist beendet")]
    Gestoppt,

    #[error("Protokollfehler: {0}")]
    Protokoll(#[from] ProtokollError),

    #[error("Kryptografiefehler: {0}")]
    Krypto(#[from] CryptoError),

    #[error("Metriken konnten nicht registriert werden: {0}")]
    Metriken(#[from] prometheus::Error),
}

impl KanalError {
    /// Erstellt einen Adressfehler
    pub fn adresse(msg: impl Into<String>) -> Self {
        Self::UngueltigeAdresse(msg.into())
    }
}

/// Result-Typ fuer den Kanal
pub type KanalResult<T> = Result<T, KanalError>;
