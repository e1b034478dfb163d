//! Floor-Konfiguration
//!
//! Wird aus einer TOML-Datei geladen. Alle Felder haben Standardwerte,
//! sodass die Floor-Control ohne Konfigurationsdatei lauffaehig ist.
//!
//! ```toml
//! modus = "distributed"
//! wire_format = "binary"
//! request_timeout_ms = 2000
//! holder_verlust_erkennung = true
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Wer ueber Anfragen auf einen freien Kanal entscheidet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArbitrationMode {
    /// Jeder Teilnehmer entscheidet lokal, Schweigen gilt als Zustimmung
    #[default]
    Distributed,
    /// Anfragen auf freie Kanaele gehen an einen externen Arbiter
    Centralized,
}

/// Serialisierung ausgehender Nachrichten (eingehend wird beides erkannt)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireFormat {
    #[default]
    Envelope,
    Binary,
}

/// Vollstaendige Floor-Konfiguration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FloorConfig {
    pub modus: ArbitrationMode,
    pub wire_format: WireFormat,
    /// Wartezeit auf Antwort bevor Selbst-Erteilung bzw. Timeout greift
    pub request_timeout_ms: u64,
    pub default_floor_duration_ms: u64,
    pub emergency_floor_duration_ms: u64,
    /// Heartbeat-Intervall des Sprechers
    pub heartbeat_interval_ms: u64,
    /// Nur wirksam mit `holder_verlust_erkennung`
    pub floor_holder_timeout_ms: u64,
    /// Nur wirksam mit `queue_verdraengung`
    pub max_queue_wait_ms: u64,
    pub max_queue_size: usize,
    pub replay_ttl_ms: u64,
    /// Sprecher ohne Heartbeat nach `floor_holder_timeout_ms` als verloren werten
    pub holder_verlust_erkennung: bool,
    /// Queue-Eintraege nach `max_queue_wait_ms` ablehnen
    pub queue_verdraengung: bool,
}

impl Default for FloorConfig {
    fn default() -> Self {
        Self {
            modus: ArbitrationMode::Distributed,
            wire_format: WireFormat::Envelope,
            request_timeout_ms: 2_000,
            default_floor_duration_ms: 30_000,
            emergency_floor_duration_ms: 60_000,
            heartbeat_interval_ms: 5_000,
            floor_holder_timeout_ms: 15_000,
            max_queue_wait_ms: 120_000,
            max_queue_size: 10,
            replay_ttl_ms: 60_000,
            holder_verlust_erkennung: false,
            queue_verdraengung: false,
        }
    }
}

impl FloorConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei.
    /// Gibt die Standardkonfiguration zurueck wenn die Datei nicht existiert.
    pub fn laden(pfad: &str) -> anyhow::Result<Self> {
        let config = match std::fs::read_to_string(pfad) {
            Ok(inhalt) => Self::aus_toml(&inhalt)
                .map_err(|e| anyhow::anyhow!("Konfigurationsfehler in '{pfad}': {e}"))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    pfad = pfad,
                    "Konfigurationsdatei nicht gefunden, verwende Standardwerte"
                );
                Self::default()
            }
            Err(e) => {
                return Err(anyhow::anyhow!(
                    "Konfigurationsdatei '{pfad}' nicht lesbar: {e}"
                ))
            }
        };
        config.validieren()?;
        Ok(config)
    }

    pub fn aus_toml(inhalt: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(inhalt)?)
    }

    /// Prueft Wertebereiche
    pub fn validieren(&self) -> anyhow::Result<()> {
        let null_felder = [
            ("request_timeout_ms", self.request_timeout_ms),
            ("default_floor_duration_ms", self.default_floor_duration_ms),
            ("emergency_floor_duration_ms", self.emergency_floor_duration_ms),
            ("heartbeat_interval_ms", self.heartbeat_interval_ms),
            ("floor_holder_timeout_ms", self.floor_holder_timeout_ms),
            ("max_queue_wait_ms", self.max_queue_wait_ms),
            ("replay_ttl_ms", self.replay_ttl_ms),
        ];
        if let Some((name, _)) = null_felder.iter().find(|(_, wert)| *wert == 0) {
            anyhow::bail!("'{name}' muss groesser als 0 sein");
        }
        if self.max_queue_size == 0 {
            anyhow::bail!("'max_queue_size' muss groesser als 0 sein");
        }
        if self.holder_verlust_erkennung
            && self.floor_holder_timeout_ms <= self.heartbeat_interval_ms
        {
            anyhow::bail!(
                "'floor_holder_timeout_ms' ({}) muss groesser als 'heartbeat_interval_ms' ({}) sein",
                self.floor_holder_timeout_ms,
                self.heartbeat_interval_ms
            );
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn floor_holder_timeout(&self) -> Duration {
        Duration::from_millis(self.floor_holder_timeout_ms)
    }

    pub fn max_queue_wait(&self) -> Duration {
        Duration::from_millis(self.max_queue_wait_ms)
    }

    pub fn replay_ttl(&self) -> Duration {
        Duration::from_millis(self.replay_ttl_ms)
    }

    /// Sprechdauer fuer eine Anfrage: Notfall, Wunschdauer oder Standard
    ///
    /// Eine Wunschdauer kann die Standarddauer nur verkuerzen.
    pub fn sprechdauer_ms(&self, notfall: bool, wunsch_ms: u64) -> u64 {
        if notfall {
            self.emergency_floor_duration_ms
        } else if wunsch_ms > 0 {
            wunsch_ms.min(self.default_floor_duration_ms)
        } else {
            self.default_floor_duration_ms
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standardwerte() {
        let cfg = FloorConfig::default();
        assert_eq!(cfg.modus, ArbitrationMode::Distributed);
        assert_eq!(cfg.request_timeout(), Duration::from_millis(2000));
        assert_eq!(cfg.max_queue_size, 10);
        assert!(!cfg.holder_verlust_erkennung);
        assert!(!cfg.queue_verdraengung);
        assert!(cfg.validieren().is_ok());
    }

    #[test]
    fn config_aus_toml_string() {
        let cfg = FloorConfig::aus_toml(
            r#"
            modus = "centralized"
            wire_format = "binary"
            request_timeout_ms = 500
            "#,
        )
        .unwrap();
        assert_eq!(cfg.modus, ArbitrationMode::Centralized);
        assert_eq!(cfg.wire_format, WireFormat::Binary);
        assert_eq!(cfg.request_timeout_ms, 500);
        // Nicht angegebene Felder behalten Standardwerte
        assert_eq!(cfg.emergency_floor_duration_ms, 60_000);
    }

    #[test]
    fn unbekannter_modus_ist_fehler() {
        assert!(FloorConfig::aus_toml(r#"modus = "anarchie""#).is_err());
    }

    #[test]
    fn validierung() {
        let cfg = FloorConfig {
            max_queue_size: 0,
            ..FloorConfig::default()
        };
        assert!(cfg.validieren().is_err());

        let cfg = FloorConfig {
            holder_verlust_erkennung: true,
            floor_holder_timeout_ms: 1_000,
            ..FloorConfig::default()
        };
        assert!(cfg.validieren().is_err());
    }

    #[test]
    fn fehlende_datei_liefert_standard() {
        let cfg = FloorConfig::laden("/nicht/vorhanden/sprechfunk-floor.toml").unwrap();
        assert_eq!(cfg, FloorConfig::default());
    }

    #[test]
    fn sprechdauer() {
        let cfg = FloorConfig::default();
        assert_eq!(cfg.sprechdauer_ms(true, 5_000), 60_000);
        assert_eq!(cfg.sprechdauer_ms(false, 5_000), 5_000);
        assert_eq!(cfg.sprechdauer_ms(false, 0), 30_000);
        assert_eq!(cfg.sprechdauer_ms(false, 3_600_000_000), 30_000);
        assert_eq!(cfg.sprechdauer_ms(false, u64::MAX), 30_000);
    }
}
