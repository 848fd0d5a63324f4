//! securechat-core – Gemeinsame Typen fuer SecureChat
//!
//! Dieses Crate stellt die Bausteine bereit, die von Kanal, Protokoll und
//! Anwendung gemeinsam genutzt werden: Verbindungs-IDs, Richtung,
//! Lebenszyklus-Zustaende und die Ereignisse fuer den Konsumenten.

pub mod event;
pub mod types;

// Re-Exporte fuer bequemen Zugriff
pub use event::KanalEreignis;
pub use types::{Richtung, VerbindungsId, VerbindungsInfo, VerbindungsZustand, STANDARD_PORT};
