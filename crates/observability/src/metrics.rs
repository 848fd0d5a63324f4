//! Prometheus-kompatible Metriken fuer den Kanal
//!
//! Registrierte Metriken:
//! - `securechat_verbindungen_aktiv` – Gauge: Eintraege in der Registry
//! - `securechat_verbindungen_total` – Counter: Registrierte Verbindungen (richtung)
//! - `securechat_verbindungsfehler_total` – Counter: Fehlgeschlagene Verbindungen
//! - `securechat_frames_gesendet_total` – Counter: In Sende-Queues eingereihte Frames
//! - `securechat_frames_empfangen_total` – Counter: Vollstaendig empfangene Frames
//! - `securechat_frame_groesse_bytes` – Histogram: Groesse empfangener Frames
//! - `securechat_nachrichten_verworfen_total` – Counter: Verworfene Nachrichten (grund)
//!
//! Jeder Manager hat eine eigene Registry, damit mehrere Instanzen im
//! selben Prozess (Tests) sich nicht in die Quere kommen.

use anyhow::Result;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;

/// Grund fuer eine verworfene Nachricht
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerwerfGrund {
    /// Umschlag nicht dekodierbar
    Umschlag,
    /// AEAD-Tag ungueltig
    Authentifizierung,
    /// Sende-Queue einer Verbindung voll oder geschlossen
    SendeQueue,
}

impl VerwerfGrund {
    pub fn label(&self) -> &'static str {
        match self {
            VerwerfGrund::Umschlag => "umschlag",
            VerwerfGrund::Authentifizierung => "authentifizierung",
            VerwerfGrund::SendeQueue => "sende_queue",
        }
    }
}

/// Alle Kanal-Metriken einer Manager-Instanz
#[derive(Clone)]
pub struct KanalMetriken {
    pub registry: Arc<Registry>,

    pub verbindungen_aktiv: IntGauge,
    pub verbindungen_total: IntCounterVec,
    pub verbindungsfehler_total: IntCounter,
    pub frames_gesendet_total: IntCounter,
    pub frames_empfangen_total: IntCounter,
    pub frame_groesse_bytes: Histogram,
    pub nachrichten_verworfen_total: IntCounterVec,
}

impl std::fmt::Debug for KanalMetriken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KanalMetriken")
            .field("verbindungen_aktiv", &self.verbindungen_aktiv.get())
            .finish_non_exhaustive()
    }
}

impl KanalMetriken {
    /// Erstellt und registriert alle Metriken in einer neuen Registry
    pub fn neu() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let verbindungen_aktiv = IntGauge::with_opts(Opts::new(
            "securechat_verbindungen_aktiv",
            "Anzahl Verbindungen in der Registry",
        ))?;
        registry.register(Box::new(verbindungen_aktiv.clone()))?;

        let verbindungen_total = IntCounterVec::new(
            Opts::new(
                "securechat_verbindungen_total",
                "Gesamtanzahl registrierter Verbindungen",
            ),
            &["richtung"],
        )?;
        registry.register(Box::new(verbindungen_total.clone()))?;

        let verbindungsfehler_total = IntCounter::with_opts(Opts::new(
            "securechat_verbindungsfehler_total",
            "Verbindungen die mit einem Transportfehler endeten",
        ))?;
        registry.register(Box::new(verbindungsfehler_total.clone()))?;

        let frames_gesendet_total = IntCounter::with_opts(Opts::new(
            "securechat_frames_gesendet_total",
            "In Sende-Queues eingereihte Frames",
        ))?;
        registry.register(Box::new(frames_gesendet_total.clone()))?;

        let frames_empfangen_total = IntCounter::with_opts(Opts::new(
            "securechat_frames_empfangen_total",
            "Vollstaendig empfangene Frames",
        ))?;
        registry.register(Box::new(frames_empfangen_total.clone()))?;

        let frame_groesse_bytes = Histogram::with_opts(
            HistogramOpts::new(
                "securechat_frame_groesse_bytes",
                "Groesse empfangener Frames in Bytes",
            )
            .buckets(vec![
                64.0, 256.0, 1024.0, 4096.0, 16384.0, 65536.0, 262144.0, 1048576.0, 4194304.0,
            ]),
        )?;
        registry.register(Box::new(frame_groesse_bytes.clone()))?;

        let nachrichten_verworfen_total = IntCounterVec::new(
            Opts::new(
                "securechat_nachrichten_verworfen_total",
                "Verworfene Nachrichten nach Grund",
            ),
            &["grund"],
        )?;
        registry.register(Box::new(nachrichten_verworfen_total.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            verbindungen_aktiv,
            verbindungen_total,
            verbindungsfehler_total,
            frames_gesendet_total,
            frames_empfangen_total,
            frame_groesse_bytes,
            nachrichten_verworfen_total,
        })
    }

    /// Zaehlt eine verworfene Nachricht
    pub fn verworfen(&self, grund: VerwerfGrund) {
        self.nachrichten_verworfen_total
            .with_label_values(&[grund.label()])
            .inc();
    }

    /// Liest den Zaehler fuer einen Verwerf-Grund
    pub fn verworfen_anzahl(&self, grund: VerwerfGrund) -> u64 {
        self.nachrichten_verworfen_total
            .with_label_values(&[grund.label()])
            .get()
    }

    /// Exportiert alle Metriken im Prometheus-Textformat
    pub fn exportieren(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}
