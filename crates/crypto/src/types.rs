//! Gemeinsame Typen fuer das Kryptografie-Subsystem

use aes_gcm::{
    aead::{KeyInit, OsRng},
    Aes256Gcm,
};
use serde::{Deserialize, Serialize};

use crate::error::{CryptoError, CryptoResult};

/// Laenge des Sitzungsschluessels in Bytes (256 Bit)
pub const SCHLUESSEL_LAENGE: usize = 32;

/// AEAD-Verfahren fuer die Nachrichten-Verschluesselung
///
/// Beide Peers muessen dasselbe Verfahren verwenden.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AeadAlgorithmus {
    /// AES-256-GCM
    #[default]
    #[serde(rename = "aes256_gcm")]
    Aes256Gcm,
    /// ChaCha20-Poly1305
    #[serde(rename = "chacha20_poly1305")]
    ChaCha20Poly1305,
}

impl std::fmt::Display for AeadAlgorithmus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AeadAlgorithmus::Aes256Gcm => write!(f, "aes256_gcm"),
            AeadAlgorithmus::ChaCha20Poly1305 => write!(f, "chacha20_poly1305"),
        }
    }
}

/// Symmetrischer 256-Bit-Sitzungsschluessel (wird beim Drop genullt)
///
/// Wird einmal pro Sitzung abgeleitet und danach nur noch gelesen.
#[derive(Clone, PartialEq, Eq)]
pub struct Sitzungsschluessel {
    bytes: [u8; SCHLUESSEL_LAENGE],
}

impl Drop for Sitzungsschluessel {
    fn drop(&mut self) {
        self.bytes.iter_mut().for_each(|b| *b = 0);
    }
}

impl std::fmt::Debug for Sitzungsschluessel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Sitzungsschluessel([REDACTED] {} bytes)", SCHLUESSEL_LAENGE)
    }
}

impl Sitzungsschluessel {
    /// Uebernimmt genau 32 Bytes als Schluessel
    pub fn from_bytes(bytes: &[u8]) -> CryptoResult<Self> {
        let bytes: [u8; SCHLUESSEL_LAENGE] =
            bytes
                .try_into()
                .map_err(|_| CryptoError::UngueltigeSchluesselLaenge {
                    erwartet: SCHLUESSEL_LAENGE,
                    erhalten: bytes.len(),
                })?;
        Ok(Self { bytes })
    }

    /// Erzeugt einen neuen zufaelligen Schluessel aus dem OS-Zufallsgenerator
    pub fn zufaellig() -> Self {
        let key = Aes256Gcm::generate_key(&mut OsRng);
        let mut bytes = [0u8; SCHLUESSEL_LAENGE];
        bytes.copy_from_slice(key.as_slice());
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; SCHLUESSEL_LAENGE] {
        &self.bytes
    }

    /// Hex-Darstellung (64 Zeichen, Kleinbuchstaben) zur Weitergabe an den Peer
    pub fn als_hex(&self) -> String {
        hex::encode(&self.bytes[..])
    }
}
