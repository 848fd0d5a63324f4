//! SecureChat – Einstiegspunkt
//!
//! Laedt die Konfiguration, initialisiert das Logging und startet die App.
//!
//! `securechat schluessel` gibt einen neuen zufaelligen Schluessel aus, der
//! an beide Peers verteilt werden kann.

use anyhow::Result;
use securechat::{config::AppConfig, App};
use securechat_crypto::Sitzungsschluessel;
use securechat_observability::logging_initialisieren;

#[tokio::main]
async fn main() -> Result<()> {
    if std::env::args().nth(1).as_deref() == Some("schluessel") {
        println!("{}", Sitzungsschluessel::zufaellig().als_hex());
        return Ok(());
    }

    // Konfigurationsdatei-Pfad aus Umgebungsvariable oder Standard
    let config_pfad =
        std::env::var("SECURECHAT_CONFIG").unwrap_or_else(|_| "securechat.toml".into());

    let geladen = AppConfig::laden(&config_pfad)?;
    let datei_gefunden = geladen.is_some();
    let config = geladen.unwrap_or_default();

    logging_initialisieren(&config.logging.level, &config.logging.format);

    if !datei_gefunden {
        tracing::warn!(
            pfad = %config_pfad,
            "Konfigurationsdatei nicht gefunden, verwende Standardwerte"
        );
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_pfad,
        "SecureChat wird initialisiert"
    );

    App::neu(config).starten().await
}
