//! Channel-Manager – Listener, ausgehendes Ziel und Verbindungs-Registry
//!
//! ## Concurrency-Modell
//! Ein einzelner Actor-Task besitzt Registry, Listener und das ausgehende
//! Ziel. Er verarbeitet zwei Eingaenge in `select!`:
//! - Befehle der `ChannelManager`-Handles (begrenzte Queue, Antwort per
//!   oneshot)
//! - Ereignisse der Listener- und Verbindungs-Tasks (unbegrenzt)
//!
//! Dadurch laeuft nie eine Registry-Aenderung parallel zu einer anderen.
//! Wird das letzte Handle gedroppt, stoppt der Actor alles und endet.

use bytes::Bytes;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use securechat_core::{
    KanalEreignis, Richtung, VerbindungsId, VerbindungsInfo, VerbindungsZustand,
};
use securechat_observability::{KanalMetriken, VerwerfGrund};
use securechat_protocol::ProtokollError;

use crate::config::{ziel_adresse, KanalConfig};
use crate::error::{KanalError, KanalResult};
use crate::listener::KanalListener;
use crate::registry::{PeerVerbindung, VerbindungsRegistry};
use crate::verbindung::{VerbindungsAufgabe, Verbindungsziel};

/// Plaetze in der Befehls-Queue des Actors
const BEFEHLS_QUEUE_GROESSE: usize = 64;

/// Empfaenger der Kanal-Ereignisse fuer den Konsumenten
pub type Ereignisempfaenger = mpsc::UnboundedReceiver<KanalEreignis>;

// ---------------------------------------------------------------------------
// Nachrichten an den Actor
// ---------------------------------------------------------------------------

enum Befehl {
    StartListening {
        antwort: oneshot::Sender<KanalResult<SocketAddr>>,
    },
    ConnectToHost {
        adresse: String,
        antwort: oneshot::Sender<KanalResult<VerbindungsId>>,
    },
    Senden {
        daten: Bytes,
        antwort: oneshot::Sender<usize>,
    },
    Verbindungen {
        antwort: oneshot::Sender<Vec<VerbindungsInfo>>,
    },
    Stoppen {
        antwort: oneshot::Sender<()>,
    },
}

/// Meldungen der Listener- und Verbindungs-Tasks
#[derive(Debug)]
pub(crate) enum Ereignis {
    /// Listener hat einen Stream angenommen
    Angenommen {
        generation: u64,
        stream: TcpStream,
        peer: SocketAddr,
    },
    /// Transport steht
    Bereit {
        id: VerbindungsId,
        peer: Option<SocketAddr>,
    },
    /// Vollstaendiger Frame empfangen
    Empfangen { id: VerbindungsId, daten: Bytes },
    /// Verbindungs-Task ist terminal
    Beendet {
        id: VerbindungsId,
        zustand: VerbindungsZustand,
        grund: String,
    },
}

// ---------------------------------------------------------------------------
// ChannelManager (Handle)
// ---------------------------------------------------------------------------

/// Handle auf einen Channel-Manager
///
/// Klonbar; alle Klone sprechen mit demselben Actor. Mehrere Manager im
/// selben Prozess sind voneinander unabhaengig.
#[derive(Clone)]
pub struct ChannelManager {
    befehle: mpsc::Sender<Befehl>,
    config: Arc<KanalConfig>,
    metriken: KanalMetriken,
}

impl std::fmt::Debug for ChannelManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelManager")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ChannelManager {
    /// Erstellt einen Manager mit eigener Metrik-Registry
    ///
    /// Muss innerhalb einer tokio-Runtime aufgerufen werden.
    pub fn neu(config: KanalConfig) -> KanalResult<(Self, Ereignisempfaenger)> {
        let metriken = KanalMetriken::neu()?;
        Self::mit_metriken(config, metriken)
    }

    /// Erstellt einen Manager der die uebergebenen Metriken fortschreibt
    pub fn mit_metriken(
        config: KanalConfig,
        metriken: KanalMetriken,
    ) -> KanalResult<(Self, Ereignisempfaenger)> {
        config.validieren()?;
        let config = Arc::new(config);

        let (befehle_tx, befehle_rx) = mpsc::channel(BEFEHLS_QUEUE_GROESSE);
        let (ereignis_tx, ereignis_rx) = mpsc::unbounded_channel();
        let (konsument_tx, konsument_rx) = mpsc::unbounded_channel();

        let aktor = ManagerAktor {
            config: Arc::clone(&config),
            registry: VerbindungsRegistry::default(),
            listener: None,
            listener_generation: 0,
            ausgehend: None,
            ereignis_tx,
            konsument: konsument_tx,
            metriken: metriken.clone(),
        };
        tokio::spawn(aktor.laufen(befehle_rx, ereignis_rx));

        let handle = Self {
            befehle: befehle_tx,
            config,
            metriken,
        };
        Ok((handle, konsument_rx))
    }

    /// Startet den Listener auf `bind_adresse:port`
    ///
    /// Laeuft bereits ein Listener, wird dessen Adresse zurueckgegeben.
    pub async fn start_listening(&self) -> KanalResult<SocketAddr> {
        self.anfragen(|antwort| Befehl::StartListening { antwort })
            .await?
    }

    /// Baut die (einzige) ausgehende Verbindung auf
    ///
    /// Eine vorherige ausgehende Verbindung wird vorher abgebrochen und
    /// entfernt. Der Aufbau laeuft im Hintergrund; Erfolg meldet
    /// `KanalEreignis::Verbunden`, Misserfolg `KanalEreignis::Getrennt`.
    pub async fn connect_to_host(&self, adresse: &str) -> KanalResult<VerbindungsId> {
        let adresse = adresse.to_string();
        self.anfragen(|antwort| Befehl::ConnectToHost { adresse, antwort })
            .await?
    }

    /// Reiht einen kodierten Umschlag bei allen registrierten Verbindungen ein
    ///
    /// Gibt die Anzahl der Verbindungen zurueck, bei denen der Frame
    /// eingereiht wurde (0 = keine Ziele).
    pub async fn send(&self, daten: impl Into<Bytes>) -> KanalResult<usize> {
        let daten = daten.into();
        if daten.len() > self.config.max_frame_groesse {
            return Err(ProtokollError::FrameZuGross {
                laenge: daten.len(),
                maximum: self.config.max_frame_groesse,
            }
            .into());
        }
        self.anfragen(|antwort| Befehl::Senden { daten, antwort })
            .await
    }

    /// Momentaufnahme der Registry
    pub async fn verbindungen(&self) -> KanalResult<Vec<VerbindungsInfo>> {
        self.anfragen(|antwort| Befehl::Verbindungen { antwort })
            .await
    }

    /// Stoppt Listener und alle Verbindungen; mehrfacher Aufruf ist harmlos
    pub async fn stop(&self) -> KanalResult<()> {
        self.anfragen(|antwort| Befehl::Stoppen { antwort }).await
    }

    pub fn config(&self) -> &KanalConfig {
        &self.config
    }

    pub fn metriken(&self) -> &KanalMetriken {
        &self.metriken
    }

    async fn anfragen<T>(
        &self,
        befehl: impl FnOnce(oneshot::Sender<T>) -> Befehl,
    ) -> KanalResult<T> {
        let (antwort_tx, antwort_rx) = oneshot::channel();
        self.befehle
            .send(befehl(antwort_tx))
            .await
            .map_err(|_| KanalError::Gestoppt)?;
        antwort_rx.await.map_err(|_| KanalError::Gestoppt)
    }
}

// ---------------------------------------------------------------------------
// Actor
// ---------------------------------------------------------------------------

struct AktiverListener {
    adresse: SocketAddr,
    generation: u64,
    abbruch: CancellationToken,
}

struct ManagerAktor {
    config: Arc<KanalConfig>,
    registry: VerbindungsRegistry,
    listener: Option<AktiverListener>,
    listener_generation: u64,
    ausgehend: Option<VerbindungsId>,
    ereignis_tx: mpsc::UnboundedSender<Ereignis>,
    konsument: mpsc::UnboundedSender<KanalEreignis>,
    metriken: KanalMetriken,
}

impl ManagerAktor {
    async fn laufen(
        mut self,
        mut befehle: mpsc::Receiver<Befehl>,
        mut ereignisse: mpsc::UnboundedReceiver<Ereignis>,
    ) {
        tracing::debug!("Channel-Manager gestartet");

        loop {
            tokio::select! {
                befehl = befehle.recv() => match befehl {
                    Some(befehl) => self.befehl_verarbeiten(befehl).await,
                    None => break,
                },
                // Der Actor haelt selbst einen Sender, der Kanal schliesst nie
                Some(ereignis) = ereignisse.recv() => self.ereignis_verarbeiten(ereignis),
            }
        }

        self.stoppen();
        tracing::debug!("Channel-Manager beendet (alle Handles gedroppt)");
    }

    async fn befehl_verarbeiten(&mut self, befehl: Befehl) {
        match befehl {
            Befehl::StartListening { antwort } => {
                let ergebnis = self.start_listening().await;
                let _ = antwort.send(ergebnis);
            }
            Befehl::ConnectToHost { adresse, antwort } => {
                let _ = antwort.send(self.connect_to_host(&adresse));
            }
            Befehl::Senden { daten, antwort } => {
                let _ = antwort.send(self.senden(daten));
            }
            Befehl::Verbindungen { antwort } => {
                let _ = antwort.send(self.registry.schnappschuss());
            }
            Befehl::Stoppen { antwort } => {
                self.stoppen();
                let _ = antwort.send(());
            }
        }
    }

    // -----------------------------------------------------------------------
    // Befehle
    // -----------------------------------------------------------------------

    async fn start_listening(&mut self) -> KanalResult<SocketAddr> {
        if let Some(aktiv) = &self.listener {
            tracing::debug!(adresse = %aktiv.adresse, "Listener laeuft bereits");
            return Ok(aktiv.adresse);
        }

        let generation = self.listener_generation + 1;
        let listener = match KanalListener::binden(&self.config.listen_adresse(), generation).await
        {
            Ok(l) => l,
            Err(e) => {
                tracing::error!(fehler = %e, "Listener konnte nicht gestartet werden");
                return Err(e);
            }
        };
        self.listener_generation = generation;

        let adresse = listener.lokale_adresse();
        let abbruch = CancellationToken::new();
        tokio::spawn(listener.annehmen(abbruch.clone(), self.ereignis_tx.clone()));

        self.listener = Some(AktiverListener {
            adresse,
            generation,
            abbruch,
        });
        Ok(adresse)
    }

    fn connect_to_host(&mut self, adresse: &str) -> KanalResult<VerbindungsId> {
        let ziel = ziel_adresse(adresse, self.config.port)?;

        if let Some(alt) = self.ausgehend.take() {
            self.entfernen(alt, VerbindungsZustand::Abgebrochen, "durch neues Ziel ersetzt");
        }

        let id = self.verbindung_starten(
            Richtung::Ausgehend,
            Verbindungsziel::Ausgehend(ziel.clone()),
            None,
        );
        self.ausgehend = Some(id);

        tracing::info!(verbindung = %id, ziel = %ziel, "Ausgehende Verbindung angelegt");
        Ok(id)
    }

    fn senden(&self, daten: Bytes) -> usize {
        let mut eingereiht = 0;

        for verbindung in self.registry.iter() {
            match verbindung.sende_tx.try_send(daten.clone()) {
                Ok(()) => eingereiht += 1,
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(
                        verbindung = %verbindung.id,
                        "Sende-Queue voll, Nachricht fuer diese Verbindung verworfen"
                    );
                    self.metriken.verworfen(VerwerfGrund::SendeQueue);
                }
                Err(TrySendError::Closed(_)) => {
                    tracing::debug!(verbindung = %verbindung.id, "Sende-Queue bereits geschlossen");
                    self.metriken.verworfen(VerwerfGrund::SendeQueue);
                }
            }
        }

        self.metriken.frames_gesendet_total.inc_by(eingereiht as u64);
        tracing::trace!(ziele = eingereiht, laenge = daten.len(), "Nachricht verteilt");
        eingereiht
    }

    /// Bricht Listener und alle Verbindungen ab und leert die Registry
    fn stoppen(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.abbruch.cancel();
        }
        self.ausgehend = None;

        let verbindungen = self.registry.leeren();
        if !verbindungen.is_empty() {
            tracing::info!(anzahl = verbindungen.len(), "Channel-Manager gestoppt");
        }
        for verbindung in verbindungen {
            verbindung.abbruch.cancel();
            let _ = self.konsument.send(KanalEreignis::Getrennt {
                id: verbindung.id,
                zustand: VerbindungsZustand::Abgebrochen,
                grund: "gestoppt".into(),
            });
        }
        self.metriken.verbindungen_aktiv.set(0);
    }

    // -----------------------------------------------------------------------
    // Ereignisse
    // -----------------------------------------------------------------------

    fn ereignis_verarbeiten(&mut self, ereignis: Ereignis) {
        match ereignis {
            Ereignis::Angenommen {
                generation,
                stream,
                peer,
            } => {
                let aktuell = self.listener.as_ref().map(|l| l.generation) == Some(generation);
                if !aktuell {
                    tracing::debug!(peer = %peer, "Verbindung nach Listener-Stop verworfen");
                    return;
                }
                let id = self.verbindung_starten(
                    Richtung::Eingehend,
                    Verbindungsziel::Eingehend(stream),
                    Some(peer),
                );
                tracing::info!(verbindung = %id, peer = %peer, "Eingehende Verbindung registriert");
            }

            Ereignis::Bereit { id, peer } => {
                let Some(richtung) = self.registry.bereit_setzen(&id, peer) else {
                    tracing::trace!(verbindung = %id, "Bereit fuer unbekannte Verbindung ignoriert");
                    return;
                };
                tracing::info!(verbindung = %id, richtung = %richtung, "Verbindung bereit");
                let _ = self.konsument.send(KanalEreignis::Verbunden { id, richtung, peer });
            }

            Ereignis::Empfangen { id, daten } => {
                if !self.registry.enthaelt(&id) {
                    tracing::trace!(verbindung = %id, "Daten fuer unbekannte Verbindung ignoriert");
                    return;
                }
                self.metriken.frames_empfangen_total.inc();
                self.metriken.frame_groesse_bytes.observe(daten.len() as f64);
                let _ = self.konsument.send(KanalEreignis::Daten { id, daten });
            }

            Ereignis::Beendet { id, zustand, grund } => {
                self.entfernen(id, zustand, grund);
            }
        }
    }

    // -----------------------------------------------------------------------
    // Registry-Hilfen
    // -----------------------------------------------------------------------

    fn verbindung_starten(
        &mut self,
        richtung: Richtung,
        ziel: Verbindungsziel,
        peer: Option<SocketAddr>,
    ) -> VerbindungsId {
        let mut id = VerbindungsId::new();
        while self.registry.enthaelt(&id) {
            id = VerbindungsId::new();
        }

        let (sende_tx, sende_rx) = mpsc::channel(self.config.sende_queue_groesse);
        let abbruch = CancellationToken::new();

        self.registry.einfuegen(PeerVerbindung {
            id,
            richtung,
            zustand: VerbindungsZustand::Verbindend,
            peer,
            sende_tx,
            abbruch: abbruch.clone(),
        });
        let label = richtung.to_string();
        self.metriken
            .verbindungen_total
            .with_label_values(&[label.as_str()])
            .inc();
        self.metriken.verbindungen_aktiv.set(self.registry.len() as i64);

        let aufgabe = VerbindungsAufgabe {
            id,
            config: Arc::clone(&self.config),
            ereignisse: self.ereignis_tx.clone(),
            abbruch,
            sende_rx,
        };
        tokio::spawn(aufgabe.betreiben(ziel));

        id
    }

    /// Entfernt eine Verbindung (genau einmal) und benachrichtigt den Konsumenten
    fn entfernen(
        &mut self,
        id: VerbindungsId,
        zustand: VerbindungsZustand,
        grund: impl Into<String>,
    ) {
        let Some(verbindung) = self.registry.beenden(&id, zustand) else {
            tracing::trace!(verbindung = %id, "Verbindung bereits entfernt");
            return;
        };
        verbindung.abbruch.cancel();

        if self.ausgehend == Some(id) {
            self.ausgehend = None;
        }
        if zustand == VerbindungsZustand::Fehlgeschlagen {
            self.metriken.verbindungsfehler_total.inc();
        }
        self.metriken.verbindungen_aktiv.set(self.registry.len() as i64);

        let grund = grund.into();
        tracing::info!(
            verbindung = %id,
            richtung = %verbindung.richtung,
            zustand = %zustand,
            grund = %grund,
            "Verbindung entfernt"
        );
        let _ = self.konsument.send(KanalEreignis::Getrennt { id, zustand, grund });
    }
}
