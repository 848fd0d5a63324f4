//! Ableitung des Sitzungsschluessels aus einem Hex-String
//!
//! Der Schluessel wird extern verwaltet und als Hex-String uebergeben.
//! 64 Hex-Zeichen ergeben die 32 Bytes die AES-256-GCM bzw.
//! ChaCha20-Poly1305 verlangen. Jede andere Laenge wird abgelehnt statt
//! stillschweigend einen unbrauchbaren Schluessel zu erzeugen.

use hex::FromHexError;

use crate::error::{CryptoError, CryptoResult};
use crate::types::{Sitzungsschluessel, SCHLUESSEL_LAENGE};

/// Dekodiert einen Hex-String zu Bytes
///
/// # Fehler
/// `UngueltigeSchluesselKodierung` bei ungerader Laenge oder wenn ein Zeichen
/// kein gueltiges Hex ist.
pub fn hex_dekodieren(hex: &str) -> CryptoResult<Vec<u8>> {
    hex::decode(hex).map_err(|e| {
        let grund = match e {
            FromHexError::OddLength => format!("ungerade Laenge ({} Zeichen)", hex.len()),
            FromHexError::InvalidHexCharacter { c, index } => {
                format!("kein Hex-Zeichen '{c}' an Position {index}")
            }
            andere => andere.to_string(),
        };
        CryptoError::UngueltigeSchluesselKodierung(grund)
    })
}

/// Leitet den Sitzungsschluessel aus einem Hex-String ab
///
/// # Fehler
/// - `UngueltigeSchluesselKodierung` bei ungerader Laenge oder Nicht-Hex
/// - `UngueltigeSchluesselLaenge` wenn nicht genau 32 Bytes herauskommen
pub fn schluessel_ableiten(hex: &str) -> CryptoResult<Sitzungsschluessel> {
    let mut bytes = hex_dekodieren(hex)?;
    let result = if bytes.len() == SCHLUESSEL_LAENGE {
        Sitzungsschluessel::from_bytes(&bytes)
    } else {
        tracing::warn!(
            erhalten = bytes.len(),
            erwartet = SCHLUESSEL_LAENGE,
            "Schluessel hat falsche Laenge (64 Hex-Zeichen erwartet)"
        );
        Err(CryptoError::UngueltigeSchluesselLaenge {
            erwartet: SCHLUESSEL_LAENGE,
            erhalten: bytes.len(),
        })
    };
    bytes.iter_mut().for_each(|b| *b = 0);
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nullen_ergeben_32_null_bytes() {
        let schluessel = schluessel_ableiten(&"00".repeat(32)).unwrap();
        assert_eq!(schluessel.as_bytes(), &[0u8; 32]);
    }

    #[test]
    fn gross_und_kleinschreibung() {
        let hex = "aAbBcCdDeEfF".repeat(5) + "0123";
        let schluessel = schluessel_ableiten(&hex).unwrap();
        assert_eq!(schluessel.as_bytes()[0], 0xAA);
        assert_eq!(schluessel.as_bytes()[31], 0x23);
    }

    #[test]
    fn ungerade_laenge_wird_abgelehnt() {
        let result = schluessel_ableiten(&"0".repeat(63));
        assert!(matches!(
            result,
            Err(CryptoError::UngueltigeSchluesselKodierung(_))
        ));
    }

    #[test]
    fn nicht_hex_wird_abgelehnt() {
        for ungueltig in ["0g", "zz", "+1", " 1", "1 ", "ä0"] {
            let hex = format!("{}{}", ungueltig, "00".repeat(31));
            let result = schluessel_ableiten(&hex);
            assert!(
                matches!(result, Err(CryptoError::UngueltigeSchluesselKodierung(_))),
                "'{ungueltig}' haette abgelehnt werden muessen"
            );
        }
    }

    #[test]
    fn falsche_byte_anzahl_wird_abgelehnt() {
        // "64-Byte"-Eingabe: 128 Hex-Zeichen ergeben 64 Bytes
        let result = schluessel_ableiten(&"ab".repeat(64));
        assert_eq!(
            result,
            Err(CryptoError::UngueltigeSchluesselLaenge {
                erwartet: 32,
                erhalten: 64
            })
        );

        let result = schluessel_ableiten("");
        assert!(matches!(
            result,
            Err(CryptoError::UngueltigeSchluesselLaenge { erhalten: 0, .. })
        ));
    }

    #[test]
    fn hex_round_trip_mit_als_hex() {
        let original = Sitzungsschluessel::zufaellig();
        let wieder = schluessel_ableiten(&original.als_hex()).unwrap();
        assert_eq!(original.as_bytes(), wieder.as_bytes());
    }

    #[test]
    fn hex_dekodieren_position_im_fehler() {
        let fehler = hex_dekodieren("00zz").unwrap_err();
        assert!(fehler.to_string().contains("Position 2"));

        let fehler = hex_dekodieren("abc").unwrap_err();
        assert!(fehler.to_string().contains("ungerade Laenge (3 Zeichen)"));
    }
}
