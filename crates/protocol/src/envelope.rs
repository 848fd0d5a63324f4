//! Nachrichten-Umschlag
//!
//! Ein Umschlag ist die typisierte, verschluesselte Einheit die zwischen
//! Peers ausgetauscht wird. Er wird als JSON-Record mit zwei Feldern
//! uebertragen:
//!
//! ```text
//! {"type":"text","content":"<base64(nonce || ciphertext || tag)>"}
//! ```
//!
//! Die Grenzen zwischen Umschlaegen sichert das Wire-Format (`wire`), nicht
//! dieser Codec.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

use crate::error::{ProtokollError, ProtokollResult};

/// Art des Inhalts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NachrichtenTyp {
    #[serde(rename = "text")]
    Text,
    #[serde(rename = "image")]
    Bild,
}

impl NachrichtenTyp {
    /// Tag wie er auf der Leitung steht
    pub fn tag(&self) -> &'static str {
        match self {
            NachrichtenTyp::Text => "text",
            NachrichtenTyp::Bild => "image",
        }
    }
}

impl std::fmt::Display for NachrichtenTyp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

/// Dekodierter Umschlag: Typ und AEAD-kombinierter Inhalt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Umschlag {
    #[serde(rename = "type")]
    pub typ: NachrichtenTyp,
    #[serde(rename = "content", with = "base64_inhalt")]
    pub inhalt: Vec<u8>,
}

impl Umschlag {
    pub fn neu(typ: NachrichtenTyp, inhalt: Vec<u8>) -> Self {
        Self { typ, inhalt }
    }

    /// Kodiert den Umschlag fuer den Transport
    pub fn to_bytes(&self) -> Vec<u8> {
        encode(self.typ, &self.inhalt)
    }

    /// Liest einen Umschlag aus Transport-Bytes
    pub fn from_bytes(bytes: &[u8]) -> ProtokollResult<Self> {
        serde_json::from_slice(bytes).map_err(|e| ProtokollError::umschlag(e.to_string()))
    }
}

/// Kodiert `(typ, inhalt)` deterministisch als JSON-Record
///
/// Base64 (Standard-Alphabet) enthaelt keine Zeichen die in JSON maskiert
/// werden muessten, daher kann der Record direkt geschrieben werden.
pub fn encode(typ: NachrichtenTyp, inhalt: &[u8]) -> Vec<u8> {
    let b64 = STANDARD.encode(inhalt);
    let mut out = Vec::with_capacity(b64.len() + 32);
    out.extend_from_slice(b"{\"type\":\"");
    out.extend_from_slice(typ.tag().as_bytes());
    out.extend_from_slice(b"\",\"content\":\"");
    out.extend_from_slice(b64.as_bytes());
    out.extend_from_slice(b"\"}");
    out
}

/// Dekodiert Transport-Bytes zu `(typ, inhalt)`
///
/// # Fehler
/// `UngueltigerUmschlag` wenn kein JSON-Record mit beiden Feldern vorliegt,
/// das Base64 ungueltig ist oder der Typ-Tag unbekannt ist.
pub fn decode(bytes: &[u8]) -> ProtokollResult<(NachrichtenTyp, Vec<u8>)> {
    let umschlag = Umschlag::from_bytes(bytes)?;
    Ok((umschlag.typ, umschlag.inhalt))
}

mod base64_inhalt {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(inhalt: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&STANDARD.encode(inhalt))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(d)?;
        STANDARD.decode(text.as_bytes()).map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
