//! TCP-Listener – Bindet Socket, akzeptiert Verbindungen
//!
//! Angenommene Streams gehen als `Ereignis::Angenommen` an den
//! Manager-Actor, der sie registriert und den Verbindungs-Task startet.

use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{KanalError, KanalResult};
use crate::manager::Ereignis;

/// Gebundener Listener, bereit zum Annehmen
pub(crate) struct KanalListener {
    listener: TcpListener,
    lokale_adresse: SocketAddr,
    /// Unterscheidet Listener nach Stop und Neustart
    generation: u64,
}

impl KanalListener {
    /// Bindet den Socket an `adresse`
    pub async fn binden(adresse: &str, generation: u64) -> KanalResult<Self> {
        let bind_fehler = |quelle| KanalError::BindFehler {
            adresse: adresse.to_string(),
            quelle,
        };
        let listener = TcpListener::bind(adresse).await.map_err(bind_fehler)?;
        let lokale_adresse = listener.local_addr().map_err(bind_fehler)?;

        Ok(Self {
            listener,
            lokale_adresse,
            generation,
        })
    }

    pub fn lokale_adresse(&self) -> SocketAddr {
        self.lokale_adresse
    }

    /// Accept-Loop, laeuft bis `abbruch` ausgeloest wird oder der Manager weg ist
    pub async fn annehmen(
        self,
        abbruch: CancellationToken,
        ereignisse: mpsc::UnboundedSender<Ereignis>,
    ) {
        tracing::info!(adresse = %self.lokale_adresse, "Listener gestartet");

        loop {
            tokio::select! {
                _ = abbruch.cancelled() => break,

                result = self.listener.accept() => match result {
                    Ok((stream, peer)) => {
                        tracing::debug!(peer = %peer, "Verbindung akzeptiert");
                        let ereignis = Ereignis::Angenommen {
                            generation: self.generation,
                            stream,
                            peer,
                        };
                        if ereignisse.send(ereignis).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::error!(fehler = %e, "TCP-Accept-Fehler");
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        }

        tracing::info!(adresse = %self.lokale_adresse, "Listener gestoppt");
    }
}
