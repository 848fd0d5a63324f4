//! securechat-protocol – Umschlag-Codec und Wire-Format
//!
//! - `envelope` - `(Typ, Ciphertext)`-Umschlag als JSON-Record
//! - `wire` - Laengen-praefixierte Frames ueber den TCP-Bytestrom
//! - `error` - Fehlertypen

pub mod envelope;
pub mod error;
pub mod wire;

pub use envelope::{decode, encode, NachrichtenTyp, Umschlag};
pub use error::{ProtokollError, ProtokollResult};
pub use wire::FrameCodec;
