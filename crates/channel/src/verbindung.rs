//! Connection Handler – Verwaltet eine einzelne TCP-Verbindung
//!
//! Jede Verbindung (eingehend oder ausgehend) laeuft in einem eigenen
//! tokio-Task. Der Task fasst die Registry nie an, sondern meldet jeden
//! Vorgang als `Ereignis` an den Manager-Actor.
//!
//! ## State Machine
//! ```text
//! Verbindend -> Bereit -> Fehlgeschlagen
//!     |           |
//!     +-----------+-----> Abgebrochen
//! ```
//!
//! Ein Task meldet genau ein `Ereignis::Beendet`, danach endet er.
//!
//! ## Empfang
//! Pro Iteration werden bis zu `EMPFANGS_CHUNK` Bytes gelesen und an den
//! Reassembly-Puffer angehaengt. Der `FrameCodec` zieht daraus alle
//! vollstaendigen Frames, unabhaengig davon wie TCP die Bytes zerlegt hat.

use bytes::{Bytes, BytesMut};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::codec::{Decoder, Encoder};
use tokio_util::sync::CancellationToken;

use securechat_core::{VerbindungsId, VerbindungsZustand};
use securechat_protocol::FrameCodec;

use crate::config::KanalConfig;
use crate::manager::Ereignis;

/// Maximale Anzahl Bytes pro Lesevorgang
pub const EMPFANGS_CHUNK: usize = 64 * 1024;

// ---------------------------------------------------------------------------
// Ziel und Ende
// ---------------------------------------------------------------------------

/// Woher der Transport einer Verbindung kommt
pub(crate) enum Verbindungsziel {
    /// Vom Listener angenommener Stream
    Eingehend(TcpStream),
    /// Aufgeloeste Zieladresse fuer den Verbindungsaufbau
    Ausgehend(String),
}

/// Terminaler Ausgang eines Verbindungs-Tasks
#[derive(Debug)]
enum Ende {
    Abgebrochen(String),
    Fehlgeschlagen(String),
}

impl Ende {
    fn zustand(&self) -> VerbindungsZustand {
        match self {
            Ende::Abgebrochen(_) => VerbindungsZustand::Abgebrochen,
            Ende::Fehlgeschlagen(_) => VerbindungsZustand::Fehlgeschlagen,
        }
    }

    fn grund(self) -> String {
        match self {
            Ende::Abgebrochen(g) | Ende::Fehlgeschlagen(g) => g,
        }
    }
}

// ---------------------------------------------------------------------------
// VerbindungsAufgabe
// ---------------------------------------------------------------------------

/// Zustand eines Verbindungs-Tasks
pub(crate) struct VerbindungsAufgabe {
    pub id: VerbindungsId,
    pub config: Arc<KanalConfig>,
    pub ereignisse: mpsc::UnboundedSender<Ereignis>,
    pub abbruch: CancellationToken,
    pub sende_rx: mpsc::Receiver<Bytes>,
}

impl VerbindungsAufgabe {
    /// Betreibt die Verbindung bis zu einem terminalen Zustand
    pub async fn betreiben(mut self, ziel: Verbindungsziel) {
        let ende = match ziel {
            Verbindungsziel::Eingehend(stream) => self.bereit_betreiben(stream).await,
            Verbindungsziel::Ausgehend(adresse) => match self.verbinden(&adresse).await {
                Ok(stream) => self.bereit_betreiben(stream).await,
                Err(ende) => ende,
            },
        };

        let zustand = ende.zustand();
        let grund = ende.grund();
        match zustand {
            VerbindungsZustand::Fehlgeschlagen => {
                tracing::warn!(verbindung = %self.id, grund = %grund, "Verbindung fehlgeschlagen")
            }
            _ => tracing::debug!(verbindung = %self.id, grund = %grund, "Verbindung beendet"),
        }

        // Ist der Manager schon weg, gibt es niemanden mehr zu benachrichtigen
        let _ = self.ereignisse.send(Ereignis::Beendet {
            id: self.id,
            zustand,
            grund,
        });
    }

    /// Baut die ausgehende Verbindung auf (mit Zeitlimit, abbrechbar)
    async fn verbinden(&self, adresse: &str) -> Result<TcpStream, Ende> {
        tracing::debug!(verbindung = %self.id, ziel = %adresse, "Baue Verbindung auf");

        tokio::select! {
            _ = self.abbruch.cancelled() => {
                Err(Ende::Abgebrochen("vor dem Verbindungsaufbau gestoppt".into()))
            }
            ergebnis = tokio::time::timeout(
                self.config.verbindungs_timeout(),
                TcpStream::connect(adresse),
            ) => match ergebnis {
                Ok(Ok(stream)) => Ok(stream),
                Ok(Err(e)) => Err(Ende::Fehlgeschlagen(format!(
                    "Verbindungsaufbau zu {adresse} fehlgeschlagen: {e}"
                ))),
                Err(_) => Err(Ende::Fehlgeschlagen(format!(
                    "Zeitlimit beim Verbindungsaufbau zu {adresse}"
                ))),
            }
        }
    }

    /// Meldet `Bereit` und laesst Empfangs- und Sendeschleife laufen bis eine
    /// davon endet oder der Task abgebrochen wird
    async fn bereit_betreiben(&mut self, stream: TcpStream) -> Ende {
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(verbindung = %self.id, fehler = %e, "TCP_NODELAY nicht gesetzt");
        }
        let peer = stream.peer_addr().ok();

        if self
            .ereignisse
            .send(Ereignis::Bereit { id: self.id, peer })
            .is_err()
        {
            return Ende::Abgebrochen("Manager beendet".into());
        }

        let (leser, schreiber) = stream.into_split();
        let id = self.id;

        tokio::select! {
            _ = self.abbruch.cancelled() => Ende::Abgebrochen("gestoppt".into()),
            ende = empfangsschleife(id, leser, &self.config, &self.ereignisse) => ende,
            ende = sendeschleife(id, schreiber, &self.config, &mut self.sende_rx) => ende,
        }
    }
}

// ---------------------------------------------------------------------------
// Schleifen
// ---------------------------------------------------------------------------

async fn empfangsschleife(
    id: VerbindungsId,
    mut leser: OwnedReadHalf,
    config: &KanalConfig,
    ereignisse: &mpsc::UnboundedSender<Ereignis>,
) -> Ende {
    let mut codec = FrameCodec::with_max_size(config.max_frame_groesse);
    let mut puffer = BytesMut::with_capacity(EMPFANGS_CHUNK);
    let mut chunk = vec![0u8; EMPFANGS_CHUNK];

    loop {
        let gelesen = match config.lese_timeout() {
            Some(limit) => match tokio::time::timeout(limit, leser.read(&mut chunk)).await {
                Ok(r) => r,
                Err(_) => return Ende::Fehlgeschlagen("Lese-Zeitlimit ueberschritten".into()),
            },
            None => leser.read(&mut chunk).await,
        };

        let n = match gelesen {
            Ok(0) => {
                if !puffer.is_empty() {
                    tracing::warn!(
                        verbindung = %id,
                        rest = puffer.len(),
                        "Unvollstaendiger Frame beim Schliessen verworfen"
                    );
                }
                return Ende::Abgebrochen("vom Peer geschlossen".into());
            }
            Ok(n) => n,
            Err(e) => return Ende::Fehlgeschlagen(format!("Lesefehler: {e}")),
        };

        puffer.extend_from_slice(&chunk[..n]);

        loop {
            match codec.decode(&mut puffer) {
                Ok(Some(frame)) => {
                    tracing::trace!(verbindung = %id, laenge = frame.len(), "Frame empfangen");
                    if ereignisse
                        .send(Ereignis::Empfangen { id, daten: frame })
                        .is_err()
                    {
                        return Ende::Abgebrochen("Manager beendet".into());
                    }
                }
                Ok(None) => break,
                Err(e) => return Ende::Fehlgeschlagen(format!("Protokollfehler: {e}")),
            }
        }
    }
}

async fn sendeschleife(
    id: VerbindungsId,
    mut schreiber: OwnedWriteHalf,
    config: &KanalConfig,
    sende_rx: &mut mpsc::Receiver<Bytes>,
) -> Ende {
    let mut codec = FrameCodec::with_max_size(config.max_frame_groesse);
    let mut puffer = BytesMut::new();

    while let Some(daten) = sende_rx.recv().await {
        puffer.clear();
        if let Err(e) = codec.encode(daten, &mut puffer) {
            tracing::warn!(verbindung = %id, fehler = %e, "Nachricht nicht gesendet");
            continue;
        }

        match tokio::time::timeout(config.schreib_timeout(), schreiber.write_all(&puffer)).await {
            Ok(Ok(())) => {
                tracing::trace!(verbindung = %id, laenge = puffer.len(), "Frame gesendet")
            }
            Ok(Err(e)) => return Ende::Fehlgeschlagen(format!("Schreibfehler: {e}")),
            Err(_) => return Ende::Fehlgeschlagen("Schreib-Zeitlimit ueberschritten".into()),
        }
    }

    Ende::Abgebrochen("Sende-Queue geschlossen".into())
}
