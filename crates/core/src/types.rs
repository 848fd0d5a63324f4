//! Gemeinsame Identifikations- und Zustandstypen fuer SecureChat
//!
//! IDs verwenden das Newtype-Pattern um Verwechslungen zur Compilezeit
//! auszuschliessen.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use uuid::Uuid;

/// Vereinbarter TCP-Port fuer Listener und ausgehende Verbindungen
pub const STANDARD_PORT: u16 = 12345;

/// Eindeutige Verbindungs-ID
///
/// Wird pro angenommener oder gewaehlter Verbindung neu erzeugt und nie
/// fuer eine andere Verbindung wiederverwendet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VerbindungsId(pub Uuid);

impl VerbindungsId {
    /// Erstellt eine neue zufaellige VerbindungsId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Gibt die innere UUID zurueck
    pub fn inner(&self) -> Uuid {
        self.0
    }
}

impl Default for VerbindungsId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for VerbindungsId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn:{}", self.0)
    }
}

/// Richtung einer Verbindung aus Sicht des lokalen Managers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Richtung {
    /// Vom Listener angenommen
    Eingehend,
    /// Per `connect_to_host` gewaehlt
    Ausgehend,
}

impl std::fmt::Display for Richtung {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Richtung::Eingehend => write!(f, "eingehend"),
            Richtung::Ausgehend => write!(f, "ausgehend"),
        }
    }
}

/// Lebenszyklus einer Verbindung
///
/// ```text
/// Verbindend -> Bereit -> Fehlgeschlagen
///     |           |
///     +-----------+-----> Abgebrochen
/// ```
///
/// `Fehlgeschlagen` und `Abgebrochen` sind terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerbindungsZustand {
    /// Transport wird aufgebaut
    Verbindend,
    /// Transport steht, Empfangsschleife laeuft
    Bereit,
    /// Transportfehler beobachtet
    Fehlgeschlagen,
    /// Explizit gestoppt oder vom Peer geschlossen
    Abgebrochen,
}

impl VerbindungsZustand {
    /// Gibt `true` zurueck fuer `Fehlgeschlagen` und `Abgebrochen`
    pub fn ist_terminal(&self) -> bool {
        matches!(
            self,
            VerbindungsZustand::Fehlgeschlagen | VerbindungsZustand::Abgebrochen
        )
    }

    /// Prueft ob der Uebergang nach `ziel` erlaubt ist
    pub fn uebergang_erlaubt(&self, ziel: VerbindungsZustand) -> bool {
        use VerbindungsZustand::*;
        match (self, ziel) {
            (Verbindend, Bereit) => true,
            (Verbindend | Bereit, Fehlgeschlagen | Abgebrochen) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for VerbindungsZustand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            VerbindungsZustand::Verbindend => "verbindend",
            VerbindungsZustand::Bereit => "bereit",
            VerbindungsZustand::Fehlgeschlagen => "fehlgeschlagen",
            VerbindungsZustand::Abgebrochen => "abgebrochen",
        };
        f.write_str(name)
    }
}

/// Momentaufnahme eines Registry-Eintrags
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerbindungsInfo {
    pub id: VerbindungsId,
    pub richtung: Richtung,
    pub zustand: VerbindungsZustand,
    /// Gegenstelle (erst bekannt sobald der Transport steht)
    pub peer: Option<SocketAddr>,
}
