//! Anwendungs-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Alle Felder haben
//! sinnvolle Standardwerte, sodass SecureChat ohne Konfigurationsdatei
//! lauffaehig ist. Nur der Schluessel muss von aussen kommen (Datei oder
//! `SECURECHAT_SCHLUESSEL`).

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use securechat_channel::KanalConfig;
use securechat_crypto::AeadAlgorithmus;

/// Umgebungsvariable fuer den Hex-Schluessel
pub const SCHLUESSEL_ENV: &str = "SECURECHAT_SCHLUESSEL";

/// Vollstaendige Anwendungs-Konfiguration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Listener, Zeitlimits, Queues
    pub kanal: KanalConfig,
    /// Gegenstelle
    pub peer: PeerEinstellungen,
    /// Schluessel und Verfahren
    pub krypto: KryptoEinstellungen,
    /// Ablage empfangener Bilder
    pub bilder: BilderEinstellungen,
    pub logging: LoggingEinstellungen,
}

/// Gegenstelle fuer die ausgehende Verbindung
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PeerEinstellungen {
    /// IP, Hostname oder `host:port` (leer = nur eingehende Verbindungen)
    pub adresse: Option<String>,
    /// Beim Start sofort verbinden
    pub beim_start_verbinden: bool,
    /// Listener beim Start oeffnen
    pub lauschen: bool,
}

impl Default for PeerEinstellungen {
    fn default() -> Self {
        Self {
            adresse: None,
            beim_start_verbinden: true,
            lauschen: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KryptoEinstellungen {
    /// 64 Hex-Zeichen; `SECURECHAT_SCHLUESSEL` hat Vorrang
    pub schluessel: Option<String>,
    pub algorithmus: AeadAlgorithmus,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BilderEinstellungen {
    /// Verzeichnis fuer empfangene Bilder (leer = nicht speichern)
    pub verzeichnis: Option<PathBuf>,
}

/// Logging-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// Log-Level: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// Format: "json" oder "text"
    pub format: String,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl AppConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei.
    /// Gibt `None` zurueck wenn die Datei nicht existiert; der Aufrufer
    /// entscheidet dann ueber Standardwerte und meldet das, sobald das
    /// Logging steht.
    pub fn laden(pfad: &str) -> anyhow::Result<Option<Self>> {
        match std::fs::read_to_string(pfad) {
            Ok(inhalt) => {
                let config: Self = toml::from_str(&inhalt)
                    .map_err(|e| anyhow::anyhow!("Konfigurationsfehler in '{pfad}': {e}"))?;
                Ok(Some(config))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(anyhow::anyhow!(
                "Konfigurationsdatei '{pfad}' nicht lesbar: {e}"
            )),
        }
    }

    /// Hex-Schluessel aus Umgebung oder Datei
    pub fn schluessel_hex(&self) -> Option<String> {
        self.schluessel_hex_mit(std::env::var(SCHLUESSEL_ENV).ok())
    }

    fn schluessel_hex_mit(&self, aus_env: Option<String>) -> Option<String> {
        aus_env
            .or_else(|| self.krypto.schluessel.clone())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    /// Peer-Adresse, sofern gesetzt und nicht leer
    pub fn peer_adresse(&self) -> Option<&str> {
        self.peer
            .adresse
            .as_deref()
            .map(str::trim)
            .filter(|a| !a.is_empty())
    }
}
