//! Nachrichten-Verschluesselung (AEAD)
//!
//! ## Format
//! ```text
//! [nonce(12)] [ciphertext] [auth_tag(16)]
//! ```
//!
//! Die Nonce ist pro Aufruf 96 Bit Zufall aus dem OS-Zufallsgenerator.
//! Kein AAD: der Umschlag-Typ ist nicht an den Ciphertext gebunden.

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Key, Nonce as AesNonce,
};
use chacha20poly1305::{ChaCha20Poly1305, Key as ChaChaKey, Nonce as ChaChaNonce};

use crate::error::{CryptoError, CryptoResult};
use crate::types::{AeadAlgorithmus, Sitzungsschluessel};

/// Nonce-Laenge beider Verfahren
pub const NONCE_LAENGE: usize = 12;

/// Laenge des Auth-Tags beider Verfahren
pub const TAG_LAENGE: usize = 16;

/// Kuerzeste Eingabe die `open` ueberhaupt versucht
pub const MIN_KOMBINIERT_LAENGE: usize = NONCE_LAENGE + TAG_LAENGE;

/// Versiegelt `klartext` mit AES-256-GCM
pub fn seal(klartext: &[u8], schluessel: &Sitzungsschluessel) -> CryptoResult<Vec<u8>> {
    seal_mit(AeadAlgorithmus::Aes256Gcm, klartext, schluessel)
}

/// Oeffnet eine mit AES-256-GCM versiegelte Nachricht
pub fn open(kombiniert: &[u8], schluessel: &Sitzungsschluessel) -> CryptoResult<Vec<u8>> {
    open_mit(AeadAlgorithmus::Aes256Gcm, kombiniert, schluessel)
}

/// Versiegelt `klartext` mit dem gewaehlten Verfahren
///
/// Gibt `nonce || ciphertext || tag` zurueck.
pub fn seal_mit(
    algorithmus: AeadAlgorithmus,
    klartext: &[u8],
    schluessel: &Sitzungsschluessel,
) -> CryptoResult<Vec<u8>> {
    match algorithmus {
        AeadAlgorithmus::Aes256Gcm => seal_aes256gcm(klartext, schluessel.as_bytes()),
        AeadAlgorithmus::ChaCha20Poly1305 => seal_chacha20(klartext, schluessel.as_bytes()),
    }
}

/// Oeffnet `nonce || ciphertext || tag`
///
/// # Fehler
/// `Authentifizierung` wenn die Eingabe kuerzer als Nonce + Tag ist oder
/// der Tag nicht verifiziert.
pub fn open_mit(
    algorithmus: AeadAlgorithmus,
    kombiniert: &[u8],
    schluessel: &Sitzungsschluessel,
) -> CryptoResult<Vec<u8>> {
    if kombiniert.len() < MIN_KOMBINIERT_LAENGE {
        tracing::debug!(
            laenge = kombiniert.len(),
            minimum = MIN_KOMBINIERT_LAENGE,
            "Verschluesselte Nachricht zu kurz"
        );
        return Err(CryptoError::Authentifizierung);
    }

    let (nonce, ciphertext) = kombiniert.split_at(NONCE_LAENGE);
    match algorithmus {
        AeadAlgorithmus::Aes256Gcm => open_aes256gcm(nonce, ciphertext, schluessel.as_bytes()),
        AeadAlgorithmus::ChaCha20Poly1305 => {
            open_chacha20(nonce, ciphertext, schluessel.as_bytes())
        }
    }
}

fn seal_aes256gcm(klartext: &[u8], key_bytes: &[u8; 32]) -> CryptoResult<Vec<u8>> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key_bytes));
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

    let ciphertext = cipher
        .encrypt(&nonce, klartext)
        .map_err(|e| CryptoError::Verschluesselung(e.to_string()))?;

    let mut kombiniert = Vec::with_capacity(NONCE_LAENGE + ciphertext.len());
    kombiniert.extend_from_slice(nonce.as_slice());
    kombiniert.extend_from_slice(&ciphertext);
    Ok(kombiniert)
}

fn seal_chacha20(klartext: &[u8], key_bytes: &[u8; 32]) -> CryptoResult<Vec<u8>> {
    let cipher = ChaCha20Poly1305::new(ChaChaKey::from_slice(key_bytes));
    let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);

    let ciphertext = cipher
        .encrypt(&nonce, klartext)
        .map_err(|e| CryptoError::Verschluesselung(e.to_string()))?;

    let mut kombiniert = Vec::with_capacity(NONCE_LAENGE + ciphertext.len());
    kombiniert.extend_from_slice(nonce.as_slice());
    kombiniert.extend_from_slice(&ciphertext);
    Ok(kombiniert)
}

fn open_aes256gcm(nonce: &[u8], ciphertext: &[u8], key_bytes: &[u8; 32]) -> CryptoResult<Vec<u8>> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key_bytes));
    cipher
        .decrypt(AesNonce::from_slice(nonce), ciphertext)
        .map_err(|_| CryptoError::Authentifizierung)
}

fn open_chacha20(nonce: &[u8], ciphertext: &[u8], key_bytes: &[u8; 32]) -> CryptoResult<Vec<u8>> {
    let cipher = ChaCha20Poly1305::new(ChaChaKey::from_slice(key_bytes));
    cipher
        .decrypt(ChaChaNonce::from_slice(nonce), ciphertext)
        .map_err(|_| CryptoError::Authentifizierung)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
