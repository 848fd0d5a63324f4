//! Auswertung der Eingabezeilen von stdin

use std::path::PathBuf;

/// Eine ausgewertete Eingabezeile
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Eingabe {
    /// Textnachricht an alle Verbindungen
    Text(String),
    /// Bilddatei senden
    Bild(PathBuf),
    /// Ausgehende Verbindung (neu) aufbauen
    Verbinden(String),
    /// Registry anzeigen
    Peers,
    /// Kanal-Metriken im Prometheus-Textformat ausgeben
    Metriken,
    Hilfe,
    Beenden,
    /// Leerzeile, wird ignoriert
    Leer,
    /// Unbekannter Befehl oder fehlendes Argument
    Ungueltig(String),
}

pub const HILFE: &str = "\
Befehle:
  <text>               Textnachricht senden
  /bild <pfad>         Bilddatei senden
  /verbinden <adresse> Mit Peer verbinden (ersetzt die bisherige Verbindung)
  /peers               Aktive Verbindungen anzeigen
  /metriken            Kanal-Metriken ausgeben
  /hilfe               Diese Hilfe
  /quit                Beenden
  //text               Text der mit '/' beginnt";

impl Eingabe {
    pub fn parsen(zeile: &str) -> Self {
        let zeile = zeile.trim_end_matches(['\r', '\n']);
        if zeile.trim().is_empty() {
            return Eingabe::Leer;
        }

        if let Some(text) = zeile.strip_prefix("//") {
            return Eingabe::Text(format!("/{text}"));
        }
        let Some(befehl) = zeile.strip_prefix('/') else {
            return Eingabe::Text(zeile.to_string());
        };

        let (name, argument) = match befehl.split_once(char::is_whitespace) {
            Some((name, rest)) => (name, rest.trim()),
            None => (befehl, ""),
        };

        match (name, argument) {
            ("bild", "") => Eingabe::Ungueltig("/bild braucht einen Pfad".into()),
            ("bild", pfad) => Eingabe::Bild(PathBuf::from(pfad)),
            ("verbinden", "") => Eingabe::Ungueltig("/verbinden braucht eine Adresse".into()),
            ("verbinden", adresse) => Eingabe::Verbinden(adresse.to_string()),
            ("peers", _) => Eingabe::Peers,
            ("metriken", _) => Eingabe::Metriken,
            ("hilfe" | "help", _) => Eingabe::Hilfe,
            ("quit" | "exit", _) => Eingabe::Beenden,
            (andere, _) => Eingabe::Ungueltig(format!("Unbekannter Befehl '/{andere}'")),
        }
    }
}
