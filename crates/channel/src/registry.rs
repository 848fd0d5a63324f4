//! Registry der aktiven Verbindungen
//!
//! Gehoert ausschliesslich dem Manager-Actor. Jeder Eintrag wird genau
//! einmal eingefuegt und genau einmal entfernt; ein Eintrag in der Registry
//! ist nie terminal, denn der Uebergang in einen terminalen Zustand
//! entfernt ihn.

use bytes::Bytes;
use std::collections::HashMap;
use std::net::SocketAddr;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use securechat_core::{Richtung, VerbindungsId, VerbindungsInfo, VerbindungsZustand};

/// Eine registrierte Verbindung mit den Handles ihres Tasks
#[derive(Debug)]
pub(crate) struct PeerVerbindung {
    pub id: VerbindungsId,
    pub richtung: Richtung,
    pub zustand: VerbindungsZustand,
    pub peer: Option<SocketAddr>,
    /// Sende-Queue des Verbindungs-Tasks (kodierte Umschlaege)
    pub sende_tx: mpsc::Sender<Bytes>,
    /// Bricht den Verbindungs-Task ab
    pub abbruch: CancellationToken,
}

impl PeerVerbindung {
    pub fn info(&self) -> VerbindungsInfo {
        VerbindungsInfo {
            id: self.id,
            richtung: self.richtung,
            zustand: self.zustand,
            peer: self.peer,
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct VerbindungsRegistry {
    eintraege: HashMap<VerbindungsId, PeerVerbindung>,
}

impl VerbindungsRegistry {
    /// Fuegt eine Verbindung ein; eine vorhandene ID wird nie ueberschrieben
    pub fn einfuegen(&mut self, verbindung: PeerVerbindung) -> bool {
        if self.eintraege.contains_key(&verbindung.id) {
            tracing::error!(verbindung = %verbindung.id, "Verbindungs-ID bereits registriert");
            return false;
        }
        self.eintraege.insert(verbindung.id, verbindung);
        true
    }

    pub fn enthaelt(&self, id: &VerbindungsId) -> bool {
        self.eintraege.contains_key(id)
    }

    /// `Verbindend` -> `Bereit`
    ///
    /// Gibt die Richtung zurueck, oder `None` wenn der Eintrag fehlt oder
    /// schon bereit ist.
    pub fn bereit_setzen(
        &mut self,
        id: &VerbindungsId,
        peer: Option<SocketAddr>,
    ) -> Option<Richtung> {
        let v = self.eintraege.get_mut(id)?;
        if !v.zustand.uebergang_erlaubt(VerbindungsZustand::Bereit) {
            return None;
        }
        v.zustand = VerbindungsZustand::Bereit;
        if peer.is_some() {
            v.peer = peer;
        }
        Some(v.richtung)
    }

    /// Setzt den terminalen Zustand und entfernt den Eintrag
    ///
    /// Gibt den Eintrag nur beim ersten Aufruf zurueck.
    pub fn beenden(
        &mut self,
        id: &VerbindungsId,
        zustand: VerbindungsZustand,
    ) -> Option<PeerVerbindung> {
        if !zustand.ist_terminal() {
            tracing::error!(verbindung = %id, zustand = %zustand, "Kein terminaler Zustand");
            return None;
        }
        let mut verbindung = self.eintraege.remove(id)?;
        verbindung.zustand = zustand;
        Some(verbindung)
    }

    /// Entfernt alle Eintraege (Stop)
    pub fn leeren(&mut self) -> Vec<PeerVerbindung> {
        self.eintraege.drain().map(|(_, v)| v).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PeerVerbindung> {
        self.eintraege.values()
    }

    pub fn schnappschuss(&self) -> Vec<VerbindungsInfo> {
        self.eintraege.values().map(PeerVerbindung::info).collect()
    }

    pub fn len(&self) -> usize {
        self.eintraege.len()
    }
}
