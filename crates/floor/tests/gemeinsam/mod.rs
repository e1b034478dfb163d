//! Gemeinsame Test-Hilfen: In-Memory-Netz zwischen mehreren Arbitratoren

#![allow(dead_code)]

use parking_lot::Mutex;
use sprechfunk_core::{ChannelId, PeerKey};
use sprechfunk_crypto::{Ed25519Verifier, Identity};
use sprechfunk_floor::{
    FloorArbitrator, FloorConfig, FloorEvent, FloorTransport, KanalEventSink,
};
use sprechfunk_observability::{logging_initialisieren, FloorMetrics};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

pub fn kanal() -> ChannelId {
    ChannelId::aus_name("Funkkreis-Nord")
}

/// Laesst alle Pumpen leerlaufen (mit pausierter Zeit: +1 ms)
pub async fn ruhen() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

pub async fn warten_ms(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

/// Alle bisher eingegangenen Ereignisse
pub fn ereignisse(rx: &mut mpsc::UnboundedReceiver<FloorEvent>) -> Vec<FloorEvent> {
    let mut alle = Vec::new();
    while let Ok(ereignis) = rx.try_recv() {
        alle.push(ereignis);
    }
    alle
}

// ---------------------------------------------------------------------------
// Netz
// ---------------------------------------------------------------------------

#[derive(Default)]
struct NetzInner {
    teilnehmer: Mutex<Vec<(PeerKey, mpsc::UnboundedSender<Vec<u8>>)>>,
    getrennt: AtomicBool,
    mitschnitt: Mutex<Vec<Vec<u8>>>,
}

/// Broadcast-Netz: jedes Paket geht an alle anderen Teilnehmer
#[derive(Clone, Default)]
pub struct Netz {
    inner: Arc<NetzInner>,
}

struct NetzTransport {
    netz: Arc<NetzInner>,
    absender: PeerKey,
}

impl FloorTransport for NetzTransport {
    fn send(&self, _kanal: &ChannelId, bytes: &[u8]) -> bool {
        self.netz.mitschnitt.lock().push(bytes.to_vec());
        if self.netz.getrennt.load(Ordering::SeqCst) {
            return false;
        }
        for (key, tx) in self.netz.teilnehmer.lock().iter() {
            if *key != self.absender {
                let _ = tx.send(bytes.to_vec());
            }
        }
        true
    }
}

pub struct Teilnehmer {
    pub arbitrator: FloorArbitrator,
    pub ereignisse: mpsc::UnboundedReceiver<FloorEvent>,
    pub metriken: FloorMetrics,
    pub key: PeerKey,
}

impl Teilnehmer {
    pub fn alle_ereignisse(&mut self) -> Vec<FloorEvent> {
        ereignisse(&mut self.ereignisse)
    }
}

impl Netz {
    pub fn neu() -> Self {
        // Nur der erste Aufruf im Testprozess setzt den Subscriber
        let _ = logging_initialisieren("warn", "text");
        Self::default()
    }

    /// Neuer Teilnehmer mit frischer Identitaet; der Kanal ist initialisiert
    pub fn teilnehmer(&self, name: &str, config: FloorConfig) -> Teilnehmer {
        let identitaet = Arc::new(Identity::generate());
        let key = identitaet.peer_key();
        let (sink, ereignisse) = KanalEventSink::neu();
        let metriken = FloorMetrics::neu().expect("Metriken konnten nicht erstellt werden");

        let arbitrator = FloorArbitrator::builder(
            identitaet,
            Arc::new(Ed25519Verifier),
            Arc::new(NetzTransport {
                netz: Arc::clone(&self.inner),
                absender: key,
            }),
        )
        .name(name)
        .config(config)
        .event_sink(Arc::new(sink))
        .metrics(metriken.clone())
        .bauen()
        .expect("Arbitrator konnte nicht gebaut werden");
        arbitrator.init_channel(&kanal());

        let (tx, mut rx) = mpsc::unbounded_channel::<Vec<u8>>();
        self.inner.teilnehmer.lock().push((key, tx));
        let pumpe = arbitrator.clone();
        tokio::spawn(async move {
            while let Some(bytes) = rx.recv().await {
                pumpe.handle_incoming(&bytes);
            }
        });

        Teilnehmer {
            arbitrator,
            ereignisse,
            metriken,
            key,
        }
    }

    /// Ab jetzt gehen alle Pakete verloren
    pub fn trennen(&self) {
        self.inner.getrennt.store(true, Ordering::SeqCst);
    }

    pub fn verbinden(&self) {
        self.inner.getrennt.store(false, Ordering::SeqCst);
    }

    /// Alle gesendeten Pakete, auch die verlorenen
    pub fn mitschnitt(&self) -> Vec<Vec<u8>> {
        self.inner.mitschnitt.lock().clone()
    }
}
