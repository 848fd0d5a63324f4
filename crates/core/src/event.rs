//! Kanal-Ereignisse fuer den Konsumenten
//!
//! Der Channel-Manager liefert alle fuer den Konsumenten relevanten
//! Vorgaenge ueber einen tokio-Kanal aus. Pro Verbindung kommen die
//! Ereignisse in der Reihenfolge an, in der sie auf dem Socket auftraten.

use bytes::Bytes;
use std::net::SocketAddr;

use crate::types::{Richtung, VerbindungsId, VerbindungsZustand};

/// Ereignisse die der Channel-Manager an den Konsumenten ausliefert
#[derive(Debug, Clone)]
pub enum KanalEreignis {
    /// Eine Verbindung ist bereit (Transport steht)
    Verbunden {
        id: VerbindungsId,
        richtung: Richtung,
        peer: Option<SocketAddr>,
    },
    /// Ein vollstaendiger Frame wurde empfangen (kodierter Umschlag)
    Daten { id: VerbindungsId, daten: Bytes },
    /// Eine Verbindung wurde aus der Registry entfernt
    Getrennt {
        id: VerbindungsId,
        zustand: VerbindungsZustand,
        grund: String,
    },
}

impl KanalEreignis {
    /// Gibt die betroffene Verbindung zurueck
    pub fn verbindung(&self) -> VerbindungsId {
        match self {
            KanalEreignis::Verbunden { id, .. }
            | KanalEreignis::Daten { id, .. }
            | KanalEreignis::Getrennt { id, .. } => *id,
        }
    }
}
