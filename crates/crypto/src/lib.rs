//! # securechat-crypto
//!
//! Kryptografie-Schicht fuer SecureChat.
//!
//! ## Module
//! - `schluessel` - Ableitung des Sitzungsschluessels aus einem Hex-String
//! - `aead` - Versiegeln/Oeffnen (nonce || ciphertext || tag)
//! - `types` - Sitzungsschluessel und AEAD-Algorithmus
//! - `error` - Fehlertypen

pub mod aead;
pub mod error;
pub mod schluessel;
pub mod types;

// Bequeme Re-Exports
pub use aead::{open, open_mit, seal, seal_mit, MIN_KOMBINIERT_LAENGE, NONCE_LAENGE, TAG_LAENGE};
pub use error::{CryptoError, CryptoResult};
pub use schluessel::schluessel_ableiten;
pub use types::{AeadAlgorithmus, Sitzungsschluessel, SCHLUESSEL_LAENGE};
