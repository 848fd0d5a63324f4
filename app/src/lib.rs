//! securechat – Bibliotheks-Root der Terminal-Anwendung
//!
//! Verbindet Konfiguration, Sitzung und stdin/stdout. Nachrichten gehen
//! nach stdout, Logs nach stderr.

pub mod config;
pub mod eingabe;

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use std::future::Future;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

use config::AppConfig;
use eingabe::{Eingabe, HILFE};
use securechat_channel::{EmpfangeneNachricht, SichereSitzung, SitzungsEreignis};
use securechat_crypto::schluessel_ableiten;
use securechat_protocol::NachrichtenTyp;

/// Ob die Hauptschleife weiterlaufen soll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Steuerung {
    Weiter,
    Beenden,
}

/// Haelt den Anwendungs-Zustand zusammen
pub struct App {
    pub config: AppConfig,
}

impl App {
    /// Erstellt eine neue App aus der gegebenen Konfiguration
    pub fn neu(config: AppConfig) -> Self {
        Self { config }
    }

    /// Startet Sitzung, Listener und ggf. die ausgehende Verbindung und
    /// laeuft bis `/quit`, Ctrl-C oder Ende von stdin
    pub async fn starten(self) -> Result<()> {
        self.laufen(BufReader::new(tokio::io::stdin()), tokio::signal::ctrl_c())
            .await
    }

    /// Wie `starten`, mit beliebiger Eingabequelle und Shutdown-Signal
    ///
    /// Das Signal wird einmal angelegt und ueber alle Schleifendurchlaeufe
    /// hinweg gepollt, damit kein Signal zwischen zwei Iterationen verloren
    /// geht.
    pub async fn laufen<E, S>(self, eingabe: E, signal: S) -> Result<()>
    where
        E: AsyncBufRead + Unpin,
        S: Future<Output = std::io::Result<()>>,
    {
        let hex = self.config.schluessel_hex().context(
            "Kein Schluessel konfiguriert ([krypto] schluessel oder SECURECHAT_SCHLUESSEL); \
             'securechat schluessel' erzeugt einen",
        )?;
        let schluessel = schluessel_ableiten(&hex).context("Schluessel unbrauchbar")?;

        let (sitzung, mut empfang) = SichereSitzung::starten(
            self.config.kanal.clone(),
            schluessel,
            self.config.krypto.algorithmus,
        )?;

        tracing::info!(
            algorithmus = %sitzung.algorithmus(),
            port = self.config.kanal.port,
            "SecureChat startet"
        );

        if self.config.peer.lauschen {
            match sitzung.manager().start_listening().await {
                Ok(adresse) => println!("Lausche auf {adresse}"),
                Err(e) => tracing::error!(fehler = %e, "Listener nicht verfuegbar, nur ausgehend"),
            }
        }

        if self.config.peer.beim_start_verbinden {
            if let Some(adresse) = self.config.peer_adresse() {
                sitzung.manager().connect_to_host(adresse).await?;
            }
        }

        println!("{HILFE}");

        let mut zeilen = eingabe.lines();
        let verzeichnis = self.config.bilder.verzeichnis.clone();
        tokio::pin!(signal);

        loop {
            tokio::select! {
                zeile = zeilen.next_line() => {
                    let Some(zeile) = zeile.context("Eingabe nicht lesbar")? else {
                        tracing::debug!("Eingabe geschlossen");
                        break;
                    };
                    match befehl_ausfuehren(&sitzung, Eingabe::parsen(&zeile)).await {
                        Ok(Steuerung::Weiter) => {}
                        Ok(Steuerung::Beenden) => break,
                        Err(e) => println!("Fehler: {e:#}"),
                    }
                }

                ereignis = empfang.naechstes() => {
                    let Some(ereignis) = ereignis else {
                        tracing::warn!("Kanal beendet");
                        break;
                    };
                    ereignis_ausgeben(ereignis, verzeichnis.as_deref()).await;
                }

                ergebnis = &mut signal => {
                    match ergebnis {
                        Ok(()) => tracing::info!("Shutdown-Signal empfangen"),
                        Err(e) => tracing::error!(fehler = %e, "Signal-Handler fehlgeschlagen"),
                    }
                    break;
                }
            }
        }

        sitzung.manager().stop().await?;
        tracing::info!("SecureChat beendet");
        Ok(())
    }
}

/// Fuehrt eine Eingabezeile gegen die Sitzung aus
pub async fn befehl_ausfuehren(
    sitzung: &SichereSitzung,
    eingabe: Eingabe,
) -> Result<Steuerung> {
    match eingabe {
        Eingabe::Leer => {}
        Eingabe::Text(text) => {
            let ziele = sitzung.text_senden(&text).await?;
            if ziele == 0 {
                println!("(keine Verbindung, Nachricht nicht gesendet)");
            }
        }
        Eingabe::Bild(pfad) => {
            let bild = tokio::fs::read(&pfad)
                .await
                .with_context(|| format!("Bild '{}' nicht lesbar", pfad.display()))?;
            let ziele = sitzung.bild_senden(&bild).await?;
            println!("Bild ({} Bytes) an {ziele} Verbindung(en) gesendet", bild.len());
        }
        Eingabe::Verbinden(adresse) => {
            let id = sitzung.manager().connect_to_host(&adresse).await?;
            println!("Verbinde mit {adresse} ({id})");
        }
        Eingabe::Peers => {
            let verbindungen = sitzung.manager().verbindungen().await?;
            if verbindungen.is_empty() {
                println!("Keine Verbindungen");
            }
            for v in verbindungen {
                let peer = v.peer.map(|p| p.to_string()).unwrap_or_else(|| "-".into());
                println!("  {} {} {} {}", v.id, v.richtung, v.zustand, peer);
            }
        }
        Eingabe::Metriken => print!("{}", sitzung.manager().metriken().exportieren()?),
        Eingabe::Hilfe => println!("{HILFE}"),
        Eingabe::Beenden => return Ok(Steuerung::Beenden),
        Eingabe::Ungueltig(meldung) => println!("{meldung}"),
    }
    Ok(Steuerung::Weiter)
}

async fn ereignis_ausgeben(ereignis: SitzungsEreignis, verzeichnis: Option<&Path>) {
    match ereignis {
        SitzungsEreignis::Nachricht(nachricht) => {
            let gespeichert = match (nachricht.typ, verzeichnis) {
                (NachrichtenTyp::Bild, Some(verzeichnis)) => {
                    match bild_speichern(verzeichnis, &nachricht).await {
                        Ok(pfad) => Some(pfad),
                        Err(e) => {
                            tracing::warn!(fehler = %e, "Bild konnte nicht gespeichert werden");
                            None
                        }
                    }
                }
                _ => None,
            };
            let lokal = nachricht.empfangen_am.with_timezone(&Local);
            println!("{}", nachricht_formatieren(&nachricht, lokal, gespeichert.as_deref()));
        }
        SitzungsEreignis::Verbunden { id, richtung, peer } => {
            let peer = peer.map(|p| p.to_string()).unwrap_or_default();
            println!("* Verbunden ({richtung}) {peer} [{id}]");
        }
        SitzungsEreignis::Getrennt { id, zustand, grund } => {
            println!("* Getrennt ({zustand}): {grund} [{id}]");
        }
    }
}

/// Formatiert eine empfangene Nachricht fuer die Ausgabe
pub fn nachricht_formatieren(
    nachricht: &EmpfangeneNachricht,
    zeit: DateTime<Local>,
    gespeichert: Option<&Path>,
) -> String {
    let zeitstempel = zeit.format("%H:%M:%S");
    match nachricht.typ {
        NachrichtenTyp::Text => match nachricht.als_text() {
            Some(text) => format!("[{zeitstempel}] {text}"),
            None => format!(
                "[{zeitstempel}] (Text mit ungueltigem UTF-8, {} Bytes)",
                nachricht.inhalt.len()
            ),
        },
        NachrichtenTyp::Bild => match gespeichert {
            Some(pfad) => format!(
                "[{zeitstempel}] Bild ({} Bytes) gespeichert unter {}",
                nachricht.inhalt.len(),
                pfad.display()
            ),
            None => format!("[{zeitstempel}] Bild ({} Bytes)", nachricht.inhalt.len()),
        },
    }
}

/// Dateiendung anhand der Magic Bytes
pub fn bild_endung(bild: &[u8]) -> &'static str {
    match bild {
        [0x89, b'P', b'N', b'G', ..] => "png",
        [0xFF, 0xD8, 0xFF, ..] => "jpg",
        [b'G', b'I', b'F', b'8', ..] => "gif",
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => "webp",
        _ => "bin",
    }
}

/// Schreibt ein empfangenes Bild nach `verzeichnis` und gibt den Pfad zurueck
pub async fn bild_speichern(
    verzeichnis: &Path,
    nachricht: &EmpfangeneNachricht,
) -> std::io::Result<PathBuf> {
    tokio::fs::create_dir_all(verzeichnis).await?;
    let name = format!(
        "bild_{}_{}.{}",
        nachricht.empfangen_am.format("%Y%m%d_%H%M%S%.3f"),
        &nachricht.von.inner().simple().to_string()[..8],
        bild_endung(&nachricht.inhalt)
    );
    let pfad = verzeichnis.join(name);
    tokio::fs::write(&pfad, &nachricht.inhalt).await?;
    Ok(pfad)
}
