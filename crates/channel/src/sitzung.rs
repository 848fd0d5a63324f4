//! Sichere Sitzung – Verschluesselung, Umschlag und Kanal zusammengefuehrt
//!
//! Ausgehend: Klartext -> seal -> Umschlag kodieren -> `ChannelManager::send`
//!
//! Eingehend: `KanalEreignis::Daten` -> Umschlag dekodieren -> open ->
//! `EmpfangeneNachricht`
//!
//! Kaputte Umschlaege und Nachrichten mit ungueltigem Tag werden
//! protokolliert, gezaehlt und verworfen. Die Verbindung bleibt bestehen.

use chrono::{DateTime, Utc};
use std::net::SocketAddr;
use std::sync::Arc;

use securechat_core::{KanalEreignis, Richtung, VerbindungsId, VerbindungsZustand};
use securechat_crypto::{open_mit, seal_mit, AeadAlgorithmus, CryptoError, Sitzungsschluessel};
use securechat_observability::{KanalMetriken, VerwerfGrund};
use securechat_protocol::{decode, encode, NachrichtenTyp};

use crate::config::KanalConfig;
use crate::error::{KanalError, KanalResult};
use crate::manager::{ChannelManager, Ereignisempfaenger};

// ---------------------------------------------------------------------------
// Schluesselbund
// ---------------------------------------------------------------------------

/// Schluessel und Verfahren, geteilt zwischen Senden und Empfangen
#[derive(Debug, Clone)]
struct Schluesselbund {
    schluessel: Arc<Sitzungsschluessel>,
    algorithmus: AeadAlgorithmus,
}

impl Schluesselbund {
    fn versiegeln(&self, typ: NachrichtenTyp, klartext: &[u8]) -> KanalResult<Vec<u8>> {
        let kombiniert = seal_mit(self.algorithmus, klartext, &self.schluessel)?;
        Ok(encode(typ, &kombiniert))
    }

    fn oeffnen(&self, daten: &[u8]) -> KanalResult<(NachrichtenTyp, Vec<u8>)> {
        let (typ, kombiniert) = decode(daten)?;
        let klartext = open_mit(self.algorithmus, &kombiniert, &self.schluessel)?;
        Ok((typ, klartext))
    }
}

// ---------------------------------------------------------------------------
// SichereSitzung
// ---------------------------------------------------------------------------

/// Sendeseite einer verschluesselten Sitzung
#[derive(Debug, Clone)]
pub struct SichereSitzung {
    manager: ChannelManager,
    bund: Schluesselbund,
}

impl SichereSitzung {
    /// Verbindet einen vorhandenen Manager mit einem Schluessel
    ///
    /// Der zurueckgegebene `Sitzungsempfang` liest die Ereignisse des
    /// Managers und entschluesselt eingehende Nachrichten.
    pub fn neu(
        manager: ChannelManager,
        ereignisse: Ereignisempfaenger,
        schluessel: Sitzungsschluessel,
        algorithmus: AeadAlgorithmus,
    ) -> (Self, Sitzungsempfang) {
        let bund = Schluesselbund {
            schluessel: Arc::new(schluessel),
            algorithmus,
        };
        let empfang = Sitzungsempfang {
            ereignisse,
            bund: bund.clone(),
            metriken: manager.metriken().clone(),
        };
        (Self { manager, bund }, empfang)
    }

    /// Startet einen neuen Manager und baut die Sitzung darauf auf
    pub fn starten(
        config: KanalConfig,
        schluessel: Sitzungsschluessel,
        algorithmus: AeadAlgorithmus,
    ) -> KanalResult<(Self, Sitzungsempfang)> {
        let (manager, ereignisse) = ChannelManager::neu(config)?;
        Ok(Self::neu(manager, ereignisse, schluessel, algorithmus))
    }

    pub fn manager(&self) -> &ChannelManager {
        &self.manager
    }

    pub fn algorithmus(&self) -> AeadAlgorithmus {
        self.bund.algorithmus
    }

    /// Verschluesselt und verteilt eine Nachricht an alle Verbindungen
    ///
    /// Gibt die Anzahl der Verbindungen zurueck, bei denen sie eingereiht
    /// wurde.
    pub async fn nachricht_senden(
        &self,
        typ: NachrichtenTyp,
        klartext: &[u8],
    ) -> KanalResult<usize> {
        let umschlag = self.bund.versiegeln(typ, klartext)?;
        self.manager.send(umschlag).await
    }

    pub async fn text_senden(&self, text: &str) -> KanalResult<usize> {
        self.nachricht_senden(NachrichtenTyp::Text, text.as_bytes())
            .await
    }

    pub async fn bild_senden(&self, bild: &[u8]) -> KanalResult<usize> {
        self.nachricht_senden(NachrichtenTyp::Bild, bild).await
    }
}

// ---------------------------------------------------------------------------
// Empfang
// ---------------------------------------------------------------------------

/// Eine entschluesselte eingehende Nachricht
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmpfangeneNachricht {
    /// Verbindung, ueber die die Nachricht kam
    pub von: VerbindungsId,
    pub typ: NachrichtenTyp,
    /// Klartext
    pub inhalt: Vec<u8>,
    pub empfangen_am: DateTime<Utc>,
}

impl EmpfangeneNachricht {
    /// UTF-8-Sicht auf den Inhalt, `None` wenn er kein gueltiges UTF-8 ist
    pub fn als_text(&self) -> Option<&str> {
        std::str::from_utf8(&self.inhalt).ok()
    }
}

/// Was der Konsument einer Sitzung erhaelt
#[derive(Debug, Clone)]
pub enum SitzungsEreignis {
    Nachricht(EmpfangeneNachricht),
    Verbunden {
        id: VerbindungsId,
        richtung: Richtung,
        peer: Option<SocketAddr>,
    },
    Getrennt {
        id: VerbindungsId,
        zustand: VerbindungsZustand,
        grund: String,
    },
}

/// Empfangsseite einer verschluesselten Sitzung
///
/// Haelt kein Manager-Handle; der Manager endet also, sobald alle
/// `SichereSitzung`- und `ChannelManager`-Handles gedroppt sind.
pub struct Sitzungsempfang {
    ereignisse: Ereignisempfaenger,
    bund: Schluesselbund,
    metriken: KanalMetriken,
}

impl Sitzungsempfang {
    /// Wartet auf das naechste Ereignis
    ///
    /// Gibt `None` zurueck wenn der Manager beendet ist.
    pub async fn naechstes(&mut self) -> Option<SitzungsEreignis> {
        while let Some(ereignis) = self.ereignisse.recv().await {
            match ereignis {
                KanalEreignis::Daten { id, daten } => match self.bund.oeffnen(&daten) {
                    Ok((typ, inhalt)) => {
                        return Some(SitzungsEreignis::Nachricht(EmpfangeneNachricht {
                            von: id,
                            typ,
                            inhalt,
                            empfangen_am: Utc::now(),
                        }));
                    }
                    Err(e) => self.verwerfen(id, &e),
                },
                KanalEreignis::Verbunden { id, richtung, peer } => {
                    return Some(SitzungsEreignis::Verbunden { id, richtung, peer });
                }
                KanalEreignis::Getrennt { id, zustand, grund } => {
                    return Some(SitzungsEreignis::Getrennt { id, zustand, grund });
                }
            }
        }
        None
    }

    /// Wartet auf die naechste entschluesselte Nachricht und ueberspringt
    /// Verbindungsereignisse
    pub async fn naechste_nachricht(&mut self) -> Option<EmpfangeneNachricht> {
        loop {
            match self.naechstes().await? {
                SitzungsEreignis::Nachricht(nachricht) => return Some(nachricht),
                andere => tracing::trace!(ereignis = ?andere, "Verbindungsereignis uebersprungen"),
            }
        }
    }

    fn verwerfen(&self, id: VerbindungsId, fehler: &KanalError) {
        let grund = match fehler {
            KanalError::Krypto(CryptoError::Authentifizierung) => VerwerfGrund::Authentifizierung,
            _ => VerwerfGrund::Umschlag,
        };
        tracing::warn!(
            verbindung = %id,
            grund = grund.label(),
            fehler = %fehler,
            "Eingehende Nachricht verworfen"
        );
        self.metriken.verworfen(grund);
    }
}
