//! Replay-Schutz fuer eingehende Nachrichten
//!
//! Merkt sich `message_id` (Schluessel-Praefix + Sequenz) fuer eine
//! begrenzte Zeit. Abgelaufene Eintraege werden bei jedem Einfuegen
//! entfernt.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

/// Standard-Lebensdauer eines Eintrags
pub const REPLAY_TTL: Duration = Duration::from_secs(60);

/// Zeitlich begrenzte Menge bereits gesehener Nachrichten
#[derive(Debug)]
pub struct ReplayCache {
    ttl: Duration,
    gesehen: Mutex<HashMap<String, Instant>>,
}

impl Default for ReplayCache {
    fn default() -> Self {
        Self::neu(REPLAY_TTL)
    }
}

impl ReplayCache {
    pub fn neu(ttl: Duration) -> Self {
        Self {
            ttl,
            gesehen: Mutex::new(HashMap::new()),
        }
    }

    /// Gibt `true` zurueck wenn die Nachricht neu ist, `false` bei Duplikat
    pub fn pruefen_und_merken(&self, message_id: &str) -> bool {
        let jetzt = Instant::now();
        let mut gesehen = self.gesehen.lock();
        gesehen.retain(|_, zeitpunkt| jetzt.duration_since(*zeitpunkt) < self.ttl);

        if gesehen.contains_key(message_id) {
            return false;
        }
        gesehen.insert(message_id.to_string(), jetzt);
        true
    }

    pub fn len(&self) -> usize {
        self.gesehen.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.gesehen.lock().is_empty()
    }

    pub fn leeren(&self) {
        self.gesehen.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn duplikat_innerhalb_ttl() {
        let cache = ReplayCache::default();
        assert!(cache.pruefen_und_merken("deadbeef-1"));
        assert!(!cache.pruefen_und_merken("deadbeef-1"));
        assert!(cache.pruefen_und_merken("deadbeef-2"));

        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(!cache.pruefen_und_merken("deadbeef-1"));
    }

    #[tokio::test(start_paused = true)]
    async fn nach_ablauf_wieder_neu() {
        let cache = ReplayCache::default();
        assert!(cache.pruefen_und_merken("a-1"));
        tokio::time::advance(Duration::from_secs(61)).await;

        assert!(cache.pruefen_und_merken("b-1"));
        // Einfuegen von b-1 hat a-1 weggeraeumt
        assert_eq!(cache.len(), 1);
        assert!(cache.pruefen_und_merken("a-1"));
    }

    #[test]
    fn leeren() {
        let cache = ReplayCache::neu(Duration::from_secs(5));
        cache.pruefen_und_merken("x-1");
        cache.leeren();
        assert!(cache.is_empty());
    }
}
