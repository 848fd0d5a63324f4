//! Konfiguration des Kanals
//!
//! Wird von der Anwendung aus dem `[kanal]`-Abschnitt der TOML-Datei
//! gelesen. Fehlende Felder fallen auf die Standardwerte zurueck.

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use securechat_core::STANDARD_PORT;
use securechat_protocol::wire::DEFAULT_MAX_FRAME_SIZE;

use crate::error::{KanalError, KanalResult};

/// Einstellungen fuer Listener, Verbindungen und Sende-Queues
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KanalConfig {
    /// Bind-Adresse des Listeners
    pub bind_adresse: String,
    /// Port fuer Listener und ausgehende Verbindungen ohne expliziten Port
    pub port: u16,
    /// Zeitlimit fuer den Verbindungsaufbau in Sekunden
    pub verbindungs_timeout_sek: u64,
    /// Zeitlimit fuer einen einzelnen Frame-Schreibvorgang in Sekunden
    pub schreib_timeout_sek: u64,
    /// Optionales Leerlauf-Zeitlimit beim Lesen in Sekunden
    pub lese_timeout_sek: Option<u64>,
    /// Maximale Frame-Groesse in Bytes
    pub max_frame_groesse: usize,
    /// Plaetze in der Sende-Queue jeder Verbindung
    pub sende_queue_groesse: usize,
}

impl Default for KanalConfig {
    fn default() -> Self {
        Self {
            bind_adresse: "0.0.0.0".into(),
            port: STANDARD_PORT,
            verbindungs_timeout_sek: 10,
            schreib_timeout_sek: 10,
            lese_timeout_sek: None,
            max_frame_groesse: DEFAULT_MAX_FRAME_SIZE,
            sende_queue_groesse: 64,
        }
    }
}

impl KanalConfig {
    /// Gibt die Listen-Adresse als String zurueck (`bind_adresse:port`)
    pub fn listen_adresse(&self) -> String {
        match self.bind_adresse.parse::<IpAddr>() {
            Ok(ip) => SocketAddr::new(ip, self.port).to_string(),
            Err(_) => format!("{}:{}", self.bind_adresse, self.port),
        }
    }

    pub fn verbindungs_timeout(&self) -> Duration {
        Duration::from_secs(self.verbindungs_timeout_sek)
    }

    pub fn schreib_timeout(&self) -> Duration {
        Duration::from_secs(self.schreib_timeout_sek)
    }

    pub fn lese_timeout(&self) -> Option<Duration> {
        self.lese_timeout_sek.map(Duration::from_secs)
    }

    /// Prueft die Werte bevor ein Manager damit gestartet wird
    pub fn validieren(&self) -> KanalResult<()> {
        if self.sende_queue_groesse == 0 {
            return Err(KanalError::Konfiguration(
                "sende_queue_groesse muss groesser 0 sein".into(),
            ));
        }
        if self.max_frame_groesse == 0 {
            return Err(KanalError::Konfiguration(
                "max_frame_groesse muss groesser 0 sein".into(),
            ));
        }
        // Das Laengenfeld im Wire-Format ist ein u32
        if self.max_frame_groesse > u32::MAX as usize {
            return Err(KanalError::Konfiguration(format!(
                "max_frame_groesse darf {} nicht ueberschreiten",
                u32::MAX
            )));
        }
        if self.verbindungs_timeout_sek == 0 || self.schreib_timeout_sek == 0 {
            return Err(KanalError::Konfiguration(
                "Zeitlimits muessen groesser 0 sein".into(),
            ));
        }
        if self.lese_timeout_sek == Some(0) {
            return Err(KanalError::Konfiguration(
                "lese_timeout_sek muss groesser 0 sein oder fehlen".into(),
            ));
        }
        Ok(())
    }
}

/// Bildet aus einer Benutzereingabe die Zieladresse fuer `TcpStream::connect`
///
/// - `1.2.3.4:5000` / `[::1]:5000` werden unveraendert uebernommen
/// - `1.2.3.4` / `::1` / `[::1]` bekommen `port` angehaengt
/// - `host:5000` bleibt wie es ist, `host` wird zu `host:port`
pub fn ziel_adresse(adresse: &str, port: u16) -> KanalResult<String> {
    let adresse = adresse.trim();
    if adresse.is_empty() {
        return Err(KanalError::adresse("leere Adresse"));
    }

    if let Ok(sock) = adresse.parse::<SocketAddr>() {
        return Ok(sock.to_string());
    }
    if let Ok(ip) = adresse.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, port).to_string());
    }
    if let Some(innen) = adresse.strip_prefix('[').and_then(|r| r.strip_suffix(']')) {
        return innen
            .parse::<IpAddr>()
            .map(|ip| SocketAddr::new(ip, port).to_string())
            .map_err(|_| KanalError::adresse(format!("'{adresse}' ist keine IP-Adresse")));
    }

    match adresse.rsplit_once(':') {
        Some((host, p)) if !host.is_empty() && !host.contains(':') => {
            p.parse::<u16>()
                .map_err(|_| KanalError::adresse(format!("ungueltiger Port in '{adresse}'")))?;
            Ok(adresse.to_string())
        }
        Some(_) => Err(KanalError::adresse(format!("'{adresse}' nicht auswertbar"))),
        None if adresse.chars().any(char::is_whitespace) => Err(KanalError::adresse(
            format!("'{adresse}' enthaelt Leerzeichen"),
        )),
        None => Ok(format!("{adresse}:{port}")),
    }
}
