//! Lamport-Uhr
//!
//! Ein logischer Zaehler pro Teilnehmer, gemeinsam fuer alle Kanaele.
//! Jede lokale Anfrage erhoeht ihn, jeder empfangene Zeitstempel zieht ihn
//! auf `max(lokal, entfernt) + 1` nach.

use std::sync::atomic::{AtomicU64, Ordering};

/// Atomare Lamport-Uhr
#[derive(Debug, Default)]
pub struct LamportClock {
    wert: AtomicU64,
}

impl LamportClock {
    pub fn neu() -> Self {
        Self::default()
    }

    /// Uhr mit vorgegebenem Startwert (Tests, Wiederanlauf)
    pub fn mit_startwert(start: u64) -> Self {
        Self {
            wert: AtomicU64::new(start),
        }
    }

    /// Aktueller Wert ohne Veraenderung
    pub fn aktuell(&self) -> u64 {
        self.wert.load(Ordering::Acquire)
    }

    /// Erhoeht die Uhr und gibt den neuen Wert zurueck
    pub fn increment(&self) -> u64 {
        self.wert.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Verarbeitet einen entfernten Zeitstempel: `max(lokal, entfernt) + 1`
    pub fn observe(&self, entfernt: u64) -> u64 {
        let mut aktuell = self.wert.load(Ordering::Acquire);
        loop {
            let neu = aktuell.max(entfernt).saturating_add(1);
            match self.wert.compare_exchange_weak(
                aktuell,
                neu,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return neu,
                Err(gesehen) => aktuell = gesehen,
            }
        }
    }
}
