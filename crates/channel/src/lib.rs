//! securechat-channel – Verschluesselter Nachrichtenkanal ueber TCP
//!
//! ## Architektur
//!
//! ```text
//! SichereSitzung --seal/encode--> ChannelManager (Handle)
//!                                     |
//!                                     v  Befehle
//!                               ManagerAktor ---- VerbindungsRegistry
//!                                 ^      |
//!                       Ereignisse|      | Sende-Queues
//!                                 |      v
//!                 KanalListener  VerbindungsAufgabe (pro TCP-Verbindung)
//! ```
//!
//! - `manager`     – Handle und Actor, besitzt Registry und Listener
//! - `verbindung`  – Lebenszyklus einer Verbindung, Empfangs-/Sendeschleife
//! - `listener`    – Accept-Loop
//! - `registry`    – Verbindungs-Registry (nur vom Actor benutzt)
//! - `sitzung`     – Verschluesselte Sitzung ueber einem Manager
//! - `config`      – Kanal-Konfiguration und Zieladressen

pub mod config;
pub mod error;
mod listener;
pub mod manager;
mod registry;
pub mod sitzung;
pub mod verbindung;

pub use config::{ziel_adresse, KanalConfig};
pub use error::{KanalError, KanalResult};
pub use manager::{ChannelManager, Ereignisempfaenger};
pub use sitzung::{EmpfangeneNachricht, SichereSitzung, SitzungsEreignis, Sitzungsempfang};
pub use verbindung::EMPFANGS_CHUNK;

pub use securechat_core::{
    KanalEreignis, Richtung, VerbindungsId, VerbindungsInfo, VerbindungsZustand,
};
pub use securechat_crypto::{AeadAlgorithmus, Sitzungsschluessel};
pub use securechat_observability::KanalMetriken;
pub use securechat_protocol::NachrichtenTyp;
