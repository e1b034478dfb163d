//! Prometheus-kompatible Metriken fuer die Floor-Control
//!
//! Registrierte Metriken:
//! - `sprechfunk_floor_grants_total` – Counter: Erteilte Sprechrechte
//! - `sprechfunk_floor_denials_total` – Counter: Abgelehnte Anfragen
//! - `sprechfunk_floor_preemptions_total` – Counter: Verdraengungen durch hoehere Prioritaet
//! - `sprechfunk_floor_self_grants_total` – Counter: Selbst-Erteilungen nach Timeout
//! - `sprechfunk_messages_dropped_total` – Counter: Verworfene Nachrichten (grund)
//! - `sprechfunk_floor_channels_active` – Gauge: Initialisierte Kanaele

use anyhow::Result;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use std::sync::Arc;

/// Alle Floor-Metriken
#[derive(Clone)]
pub struct FloorMetrics {
    pub registry: Arc<Registry>,

    pub grants_total: IntCounter,
    pub denials_total: IntCounter,
    pub preemptions_total: IntCounter,
    pub self_grants_total: IntCounter,
    pub messages_dropped_total: IntCounterVec,
    pub channels_active: IntGauge,
}

impl FloorMetrics {
    /// Erstellt und registriert alle Metriken in einer neuen Registry
    pub fn neu() -> Result<Self> {
        Self::mit_registry(Registry::new())
    }

    /// Registriert alle Metriken in einer bestehenden Registry
    pub fn mit_registry(registry: Registry) -> Result<Self> {
        let grants_total = IntCounter::with_opts(Opts::new(
            "sprechfunk_floor_grants_total",
            "Anzahl erteilter Sprechrechte",
        ))?;
        registry.register(Box::new(grants_total.clone()))?;

        let denials_total = IntCounter::with_opts(Opts::new(
            "sprechfunk_floor_denials_total",
            "Anzahl abgelehnter Floor-Anfragen",
        ))?;
        registry.register(Box::new(denials_total.clone()))?;

        let preemptions_total = IntCounter::with_opts(Opts::new(
            "sprechfunk_floor_preemptions_total",
            "Anzahl Verdraengungen durch hoehere Prioritaet",
        ))?;
        registry.register(Box::new(preemptions_total.clone()))?;

        let self_grants_total = IntCounter::with_opts(Opts::new(
            "sprechfunk_floor_self_grants_total",
            "Anzahl Selbst-Erteilungen nach Anfrage-Timeout",
        ))?;
        registry.register(Box::new(self_grants_total.clone()))?;

        let messages_dropped_total = IntCounterVec::new(
            Opts::new(
                "sprechfunk_messages_dropped_total",
                "Verworfene eingehende Floor-Nachrichten",
            ),
            &["grund"],
        )?;
        registry.register(Box::new(messages_dropped_total.clone()))?;

        let channels_active = IntGauge::with_opts(Opts::new(
            "sprechfunk_floor_channels_active",
            "Anzahl initialisierter Floor-Kanaele",
        ))?;
        registry.register(Box::new(channels_active.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            grants_total,
            denials_total,
            preemptions_total,
            self_grants_total,
            messages_dropped_total,
            channels_active,
        })
    }

    /// Zaehlt eine verworfene Nachricht mit Grund-Label
    pub fn nachricht_verworfen(&self, grund: &str) {
        self.messages_dropped_total.with_label_values(&[grund]).inc();
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

impl std::fmt::Debug for FloorMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FloorMetrics")
            .field("grants_total", &self.grants_total.get())
            .field("channels_active", &self.channels_active.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metriken_erstellen_erfolgreich() {
        let metriken = FloorMetrics::neu().unwrap();
        metriken.grants_total.inc();
        assert!(!metriken.registry.gather().is_empty());
    }

    #[test]
    fn counter_inkrementieren() {
        let metriken = FloorMetrics::neu().unwrap();
        metriken.preemptions_total.inc();
        metriken.preemptions_total.inc_by(2);
        assert_eq!(metriken.preemptions_total.get(), 3);
    }

    #[test]
    fn verworfene_nachrichten_mit_grund() {
        let metriken = FloorMetrics::neu().unwrap();
        metriken.nachricht_verworfen("replay");
        metriken.nachricht_verworfen("replay");
        metriken.nachricht_verworfen("bad_signature");
        assert_eq!(
            metriken
                .messages_dropped_total
                .with_label_values(&["replay"])
                .get(),
            2
        );
    }

    #[test]
    fn export_enthaelt_metriknamen() {
        let metriken = FloorMetrics::neu().unwrap();
        metriken.channels_active.set(2);
        metriken.self_grants_total.inc();
        let text = metriken.exportieren().unwrap();
        assert!(text.contains("sprechfunk_floor_channels_active 2"));
        assert!(text.contains("sprechfunk_floor_self_grants_total 1"));
    }

    #[test]
    fn doppelte_registrierung_schlaegt_fehl() {
        let registry = Registry::new();
        let _erste = FloorMetrics::mit_registry(registry.clone()).unwrap();
        assert!(FloorMetrics::mit_registry(registry).is_err());
    }
}
