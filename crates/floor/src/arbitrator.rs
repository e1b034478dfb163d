//! FloorArbitrator – Floor-Control fuer alle Kanaele eines Teilnehmers
//!
//! Haelt pro Kanal eine Zelle mit Zustandsautomat, Timern und dem wartenden
//! `request_floor`-Aufruf. Alle Eingaben eines Kanals laufen unter dessen
//! Mutex; Kanaele sind voneinander unabhaengig.
//!
//! ## Ablauf einer Eingabe
//! 1. Kanal-Mutex sperren
//! 2. Automat liefert Effekte
//! 3. Effekte der Reihe nach ausfuehren (signieren, Timer, Ergebnis)
//! 4. Momentaufnahme ueber `watch` veroeffentlichen
//! 5. Nach dem Entsperren: Pakete senden, Ereignisse zustellen

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use sprechfunk_core::{ChannelId, PeerKey, Result, SprechfunkError};
use sprechfunk_observability::FloorMetrics;
use sprechfunk_protocol::{
    envelope_signieren, felder, frame_signieren, nachricht_oeffnen, signatur_pruefen, MessageSigner,
    MessageType, ProtocolError, ProtocolMessage, SignatureVerifier,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, watch};

use crate::clock::LamportClock;
use crate::config::{FloorConfig, WireFormat};
use crate::events::{CentralArbiter, FloorEvent, FloorEventSink, FloorTransport, KeineEreignisse};
use crate::machine::{jetzt_ms, Ausgehend, Effekt, FloorMachine, Zaehler};
use crate::replay::ReplayCache;
use crate::request::{FloorPriority, FloorRequest};
use crate::state::{gruende, ChannelFloorState, FloorRequestResult, FloorState};
use crate::timer::{TimerArt, TimerSet};

/// Zusaetzliche Wartezeit von `request_floor` ueber den Anfrage-Timeout hinaus
const ANTWORT_KULANZ: Duration = Duration::from_millis(500);

// ---------------------------------------------------------------------------
// Kanal-Zelle
// ---------------------------------------------------------------------------

struct KanalSlot {
    maschine: FloorMachine,
    timer: TimerSet,
    /// Offener `request_floor`-Aufruf
    wartend: Option<oneshot::Sender<FloorRequestResult>>,
}

struct ChannelZelle {
    slot: Mutex<KanalSlot>,
    zustand: watch::Sender<ChannelFloorState>,
}

impl ChannelZelle {
    fn veroeffentlichen(&self, slot: &KanalSlot) {
        self.zustand.send_replace(slot.maschine.snapshot());
    }
}

/// Was nach dem Entsperren des Kanals noch zu tun ist
#[derive(Default)]
struct Nachlauf {
    pakete: Vec<Vec<u8>>,
    ereignisse: Vec<FloorEvent>,
    an_arbiter: Vec<FloorRequest>,
}

// ---------------------------------------------------------------------------
// FloorArbitrator
// ---------------------------------------------------------------------------

/// Floor-Control eines Teilnehmers
///
/// Clone teilt den inneren Zustand.
#[derive(Clone)]
pub struct FloorArbitrator {
    inner: Arc<ArbitratorInner>,
}

struct ArbitratorInner {
    config: Arc<FloorConfig>,
    signer: Arc<dyn MessageSigner>,
    verifier: Arc<dyn SignatureVerifier>,
    transport: Arc<dyn FloorTransport>,
    ereignisse: Arc<dyn FloorEventSink>,
    zentral: Option<Arc<dyn CentralArbiter>>,
    metriken: Option<FloorMetrics>,
    lokal_key: PeerKey,
    lokal_name: String,
    uhr: Arc<LamportClock>,
    sequenz: AtomicU32,
    replay: ReplayCache,
    kanaele: DashMap<ChannelId, Arc<ChannelZelle>>,
}

impl FloorArbitrator {
    /// Startet den Builder mit den drei Pflicht-Bausteinen
    pub fn builder(
        signer: Arc<dyn MessageSigner>,
        verifier: Arc<dyn SignatureVerifier>,
        transport: Arc<dyn FloorTransport>,
    ) -> FloorArbitratorBuilder {
        FloorArbitratorBuilder {
            signer,
            verifier,
            transport,
            name: String::new(),
            config: FloorConfig::default(),
            ereignisse: Arc::new(KeineEreignisse),
            zentral: None,
            metriken: None,
        }
    }

    pub fn lokal_key(&self) -> PeerKey {
        self.inner.lokal_key
    }

    pub fn config(&self) -> &FloorConfig {
        &self.inner.config
    }

    /// Aktueller Wert der Lamport-Uhr
    pub fn lamport(&self) -> u64 {
        self.inner.uhr.aktuell()
    }

    // -----------------------------------------------------------------------
    // Kanal-Verwaltung
    // -----------------------------------------------------------------------

    /// Legt den Floor-Zustand eines Kanals an
    ///
    /// Ein bestehender Kanal bleibt unveraendert, ausser er steht im
    /// Fehlerzustand: dann wird er zurueckgesetzt.
    pub fn init_channel(&self, kanal: &ChannelId) {
        let zelle = match self.inner.kanaele.entry(*kanal) {
            Entry::Occupied(eintrag) => Arc::clone(eintrag.get()),
            Entry::Vacant(eintrag) => {
                let maschine = self.inner.maschine(kanal);
                let (tx, _) = watch::channel(maschine.snapshot());
                eintrag.insert(Arc::new(ChannelZelle {
                    slot: Mutex::new(KanalSlot {
                        maschine,
                        timer: TimerSet::neu(),
                        wartend: None,
                    }),
                    zustand: tx,
                }));
                if let Some(m) = &self.inner.metriken {
                    m.channels_active.inc();
                }
                tracing::debug!(kanal = %kanal, "Floor-Kanal initialisiert");
                return;
            }
        };

        let mut slot = zelle.slot.lock();
        if slot.maschine.zustand() != FloorState::Error {
            return;
        }
        slot.timer.alle_stoppen();
        slot.maschine = self.inner.maschine(kanal);
        zelle.veroeffentlichen(&slot);
        tracing::info!(kanal = %kanal, "Kanal aus Fehlerzustand zurueckgesetzt");
    }

    /// Entfernt einen Kanal; laufende Timer und ein wartender Aufruf enden
    pub fn cleanup_channel(&self, kanal: &ChannelId) {
        let Some((_, zelle)) = self.inner.kanaele.remove(kanal) else {
            return;
        };
        {
            let mut slot = zelle.slot.lock();
            slot.timer.alle_stoppen();
            if let Some(tx) = slot.wartend.take() {
                let _ = tx.send(FloorRequestResult::error(
                    SprechfunkError::KanalNichtInitialisiert(kanal.to_string()).to_string(),
                ));
            }
        }
        if let Some(m) = &self.inner.metriken {
            m.channels_active.dec();
        }
        tracing::debug!(kanal = %kanal, "Floor-Kanal entfernt");
    }

    /// Stoppt alle Timer und verwirft alle Kanaele und den Replay-Cache
    pub fn cleanup(&self) {
        for eintrag in self.inner.kanaele.iter() {
            eintrag.value().slot.lock().timer.alle_stoppen();
        }
        let kanaele: Vec<ChannelId> = self.inner.kanaele.iter().map(|e| *e.key()).collect();
        for kanal in &kanaele {
            self.cleanup_channel(kanal);
        }
        self.inner.replay.leeren();
        tracing::info!(kanaele = kanaele.len(), "Floor-Control beendet");
    }

    // -----------------------------------------------------------------------
    // Lokale Befehle
    // -----------------------------------------------------------------------

    /// Fordert das Sprechrecht an und wartet auf das Ergebnis
    ///
    /// Wartet hoechstens den Anfrage-Timeout plus eine kurze Kulanzzeit.
    pub async fn request_floor(
        &self,
        kanal: &ChannelId,
        prioritaet: FloorPriority,
        notfall: bool,
    ) -> FloorRequestResult {
        self.request_floor_mit_dauer(kanal, prioritaet, notfall, 0)
            .await
    }

    /// Wie `request_floor`, mit gewuenschter Sprechdauer (0 = Standard)
    pub async fn request_floor_mit_dauer(
        &self,
        kanal: &ChannelId,
        prioritaet: FloorPriority,
        notfall: bool,
        dauer_ms: u64,
    ) -> FloorRequestResult {
        let Some(zelle) = self.inner.zelle(kanal) else {
            return FloorRequestResult::error(
                SprechfunkError::KanalNichtInitialisiert(kanal.to_string()).to_string(),
            );
        };

        let (tx, rx) = oneshot::channel();
        let mut nachlauf = Nachlauf::default();
        {
            let mut slot = zelle.slot.lock();
            let effekte = match slot.maschine.anfordern(prioritaet, notfall, dauer_ms) {
                Ok(effekte) => effekte,
                Err(sofort) => {
                    drop(slot);
                    self.inner.sofort_beantwortet(kanal, &sofort);
                    return sofort;
                }
            };
            if let Some(alt) = slot.wartend.replace(tx) {
                let _ = alt.send(FloorRequestResult::denied(gruende::SUPERSEDED));
            }
            self.inner.ausfuehren(*kanal, &mut slot, effekte, &mut nachlauf);
            zelle.veroeffentlichen(&slot);
        }
        self.inner.nachlauf(kanal, nachlauf);

        let frist = self.inner.config.request_timeout() + ANTWORT_KULANZ;
        match tokio::time::timeout(frist, rx).await {
            Ok(Ok(ergebnis)) => ergebnis,
            Ok(Err(_)) => FloorRequestResult::error("Anfrage ohne Ergebnis beendet"),
            Err(_) => {
                tracing::warn!(kanal = %kanal, "Kein Ergebnis fuer Floor-Anfrage");
                FloorRequestResult::error(
                    SprechfunkError::Zeitlimit(format!("request_floor auf {kanal}")).to_string(),
                )
            }
        }
    }

    /// Gibt das eigene Sprechrecht frei; `false` wenn wir es nicht halten
    pub fn release_floor(&self, kanal: &ChannelId) -> bool {
        self.inner.befehl(kanal, FloorMachine::freigeben)
    }

    /// Zieht die offene eigene Anfrage zurueck
    pub fn cancel_request(&self, kanal: &ChannelId) -> bool {
        self.inner.befehl(kanal, FloorMachine::abbrechen)
    }

    // -----------------------------------------------------------------------
    // Eingang
    // -----------------------------------------------------------------------

    /// Verarbeitet empfangene Bytes (Envelope oder Binaer-Frame)
    ///
    /// Gibt `false` zurueck wenn die Nachricht verworfen wurde: ungueltig,
    /// falsche Signatur, Wiederholung, eigene Nachricht oder unbekannter Kanal.
    pub fn handle_incoming(&self, bytes: &[u8]) -> bool {
        let msg = match nachricht_oeffnen(bytes, self.inner.verifier.as_ref()) {
            Ok(msg) => msg,
            Err(e) => {
                self.inner.verworfen(e.grund());
                tracing::debug!(fehler = %e, "Eingehende Floor-Nachricht verworfen");
                return false;
            }
        };
        if msg.sender_key == self.inner.lokal_key {
            return false;
        }
        if !self.inner.replay.pruefen_und_merken(&msg.message_id()) {
            self.inner.verworfen("replay");
            tracing::debug!(
                message_id = %msg.message_id(),
                typ = %msg.message_type,
                "Wiederholte Nachricht verworfen"
            );
            return false;
        }
        self.inner.uhr_nachziehen(&msg);
        self.inner.zustellen(&msg)
    }

    /// Expliziter Eingang fuer eine bereits dekodierte Nachricht
    ///
    /// Fehler bei falschem Typ, unbekanntem Kanal, fehlender oder falscher
    /// Signatur und bei Wiederholung; der Zustand bleibt dann unveraendert.
    pub fn handle_floor_request(&self, msg: &ProtocolMessage) -> Result<()> {
        self.verifiziert_zustellen(msg, &[MessageType::FloorRequest, MessageType::EmergencyCall])
    }

    pub fn handle_floor_granted(&self, msg: &ProtocolMessage) -> Result<()> {
        self.verifiziert_zustellen(msg, &[MessageType::FloorGranted])
    }

    pub fn handle_floor_denied(&self, msg: &ProtocolMessage) -> Result<()> {
        self.verifiziert_zustellen(msg, &[MessageType::FloorDenied])
    }

    pub fn handle_floor_taken(&self, msg: &ProtocolMessage) -> Result<()> {
        self.verifiziert_zustellen(msg, &[MessageType::FloorTaken])
    }

    pub fn handle_floor_released(&self, msg: &ProtocolMessage) -> Result<()> {
        self.verifiziert_zustellen(msg, &[MessageType::FloorRelease, MessageType::FloorIdle])
    }

    /// Stellt eine dekodierte Nachricht eines erlaubten Typs zu
    ///
    /// Es gelten dieselben Pruefungen wie in `handle_incoming`: Signatur und
    /// Replay-Cache. Der Replay-Cache ist mit `handle_incoming` geteilt.
    fn verifiziert_zustellen(&self, msg: &ProtocolMessage, erlaubt: &[MessageType]) -> Result<()> {
        if !erlaubt.contains(&msg.message_type) {
            return Err(SprechfunkError::UngueltigeNachricht(format!(
                "{} an falschem Eingang",
                msg.message_type
            )));
        }
        if !self.inner.kanaele.contains_key(&msg.channel_id) {
            return Err(SprechfunkError::KanalNichtInitialisiert(
                msg.channel_id.to_string(),
            ));
        }
        if let Err(e) = signatur_pruefen(msg, self.inner.verifier.as_ref()) {
            self.inner.verworfen(e.grund());
            tracing::debug!(fehler = %e, typ = %msg.message_type, "Floor-Nachricht ohne gueltige Signatur verworfen");
            return Err(SprechfunkError::UngueltigeNachricht(e.to_string()));
        }
        if msg.sender_key == self.inner.lokal_key {
            return Err(SprechfunkError::UngueltigeNachricht(
                "eigene Nachricht".to_string(),
            ));
        }
        if !self.inner.replay.pruefen_und_merken(&msg.message_id()) {
            self.inner.verworfen("replay");
            return Err(SprechfunkError::Wiederholung(msg.message_id()));
        }
        self.inner.uhr_nachziehen(msg);
        self.inner.zustellen(msg);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Abfragen
    // -----------------------------------------------------------------------

    pub fn floor_state(&self, kanal: &ChannelId) -> Option<ChannelFloorState> {
        let zelle = self.inner.zelle(kanal)?;
        let snapshot = zelle.slot.lock().maschine.snapshot();
        Some(snapshot)
    }

    /// Empfaenger fuer Zustandsaenderungen eines Kanals
    pub fn subscribe(&self, kanal: &ChannelId) -> Result<watch::Receiver<ChannelFloorState>> {
        self.inner
            .zelle(kanal)
            .map(|zelle| zelle.zustand.subscribe())
            .ok_or_else(|| SprechfunkError::KanalNichtInitialisiert(kanal.to_string()))
    }

    pub fn kanal_anzahl(&self) -> usize {
        self.inner.kanaele.len()
    }
}

impl std::fmt::Debug for FloorArbitrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FloorArbitrator")
            .field("lokal", &self.inner.lokal_key)
            .field("kanaele", &self.inner.kanaele.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Interna
// ---------------------------------------------------------------------------

impl ArbitratorInner {
    fn zelle(&self, kanal: &ChannelId) -> Option<Arc<ChannelZelle>> {
        self.kanaele.get(kanal).map(|e| Arc::clone(e.value()))
    }

    fn maschine(&self, kanal: &ChannelId) -> FloorMachine {
        FloorMachine::neu(
            *kanal,
            self.lokal_key,
            self.lokal_name.clone(),
            Arc::clone(&self.config),
            Arc::clone(&self.uhr),
        )
    }

    fn uhr_nachziehen(&self, msg: &ProtocolMessage) {
        if let Some(entfernt) = msg.feld_als::<u64>(felder::LAMPORT) {
            self.uhr.observe(entfernt);
        }
    }

    fn verworfen(&self, grund: &str) {
        if let Some(m) = &self.metriken {
            m.nachricht_verworfen(grund);
        }
    }

    fn zaehlen(&self, zaehler: Zaehler) {
        let Some(m) = &self.metriken else {
            return;
        };
        match zaehler {
            Zaehler::Erteilung => m.grants_total.inc(),
            Zaehler::Ablehnung => m.denials_total.inc(),
            Zaehler::Verdraengung => m.preemptions_total.inc(),
            Zaehler::SelbstErteilung => m.self_grants_total.inc(),
        }
    }

    fn sofort_beantwortet(&self, kanal: &ChannelId, ergebnis: &FloorRequestResult) {
        if let FloorRequestResult::Denied { reason } = ergebnis {
            self.zaehlen(Zaehler::Ablehnung);
            FloorEvent::Denied {
                channel_id: *kanal,
                reason: reason.clone(),
            }
            .zustellen(self.ereignisse.as_ref());
        }
        tracing::debug!(kanal = %kanal, ?ergebnis, "Floor-Anfrage sofort beantwortet");
    }

    /// Lokaler Befehl ohne Wartezeit
    fn befehl(
        self: &Arc<Self>,
        kanal: &ChannelId,
        befehl: fn(&mut FloorMachine) -> (bool, Vec<Effekt>),
    ) -> bool {
        let Some(zelle) = self.zelle(kanal) else {
            return false;
        };
        let mut nachlauf = Nachlauf::default();
        let ausgefuehrt = {
            let mut slot = zelle.slot.lock();
            let (ausgefuehrt, effekte) = befehl(&mut slot.maschine);
            self.ausfuehren(*kanal, &mut slot, effekte, &mut nachlauf);
            zelle.veroeffentlichen(&slot);
            ausgefuehrt
        };
        self.nachlauf(kanal, nachlauf);
        ausgefuehrt
    }

    fn zustellen(self: &Arc<Self>, msg: &ProtocolMessage) -> bool {
        let Some(zelle) = self.zelle(&msg.channel_id) else {
            self.verworfen("unknown_channel");
            tracing::debug!(kanal = %msg.channel_id, typ = %msg.message_type, "Nachricht fuer unbekannten Kanal");
            return false;
        };
        tracing::trace!(
            kanal = %msg.channel_id,
            typ = %msg.message_type,
            von = %msg.sender_key,
            "Floor-Nachricht empfangen"
        );

        let mut nachlauf = Nachlauf::default();
        {
            let mut slot = zelle.slot.lock();
            let effekte = slot.maschine.verarbeiten(msg);
            self.ausfuehren(msg.channel_id, &mut slot, effekte, &mut nachlauf);
            zelle.veroeffentlichen(&slot);
        }
        self.nachlauf(&msg.channel_id, nachlauf);
        true
    }

    fn timer_feuern(self: &Arc<Self>, kanal: ChannelId, art: TimerArt, generation: u64) {
        let Some(zelle) = self.zelle(&kanal) else {
            return;
        };
        let mut nachlauf = Nachlauf::default();
        {
            let mut slot = zelle.slot.lock();
            if !slot.timer.abgelaufen(art, generation) {
                tracing::trace!(kanal = %kanal, ?art, "Veralteter Timer ignoriert");
                return;
            }
            let effekte = slot.maschine.timer_abgelaufen(art);
            self.ausfuehren(kanal, &mut slot, effekte, &mut nachlauf);
            zelle.veroeffentlichen(&slot);
        }
        self.nachlauf(&kanal, nachlauf);
    }

    /// Fuehrt Effekte unter dem Kanal-Mutex aus
    ///
    /// Schlaegt eine Signierung fehl, geht der Kanal in den Fehlerzustand
    /// und die restlichen Effekte entfallen.
    fn ausfuehren(
        self: &Arc<Self>,
        kanal: ChannelId,
        slot: &mut KanalSlot,
        effekte: Vec<Effekt>,
        nachlauf: &mut Nachlauf,
    ) {
        let mut offen: VecDeque<Effekt> = effekte.into();
        while let Some(effekt) = offen.pop_front() {
            match effekt {
                Effekt::Senden(ausgehend) => match self.signieren(&kanal, ausgehend) {
                    Ok(bytes) => nachlauf.pakete.push(bytes),
                    Err(e) => {
                        tracing::error!(kanal = %kanal, fehler = %e, "Ausgehende Nachricht nicht signierbar");
                        offen.clear();
                        offen.extend(slot.maschine.fehler(&SprechfunkError::Signierung.to_string()));
                    }
                },
                Effekt::Ereignis(ereignis) => nachlauf.ereignisse.push(ereignis),
                Effekt::Aufloesen(ergebnis) => {
                    if let Some(tx) = slot.wartend.take() {
                        let _ = tx.send(ergebnis);
                    }
                }
                Effekt::TimerStarten(art, dauer) => {
                    let schwach = Arc::downgrade(self);
                    slot.timer.starten(art, dauer, move |generation| {
                        if let Some(inner) = schwach.upgrade() {
                            inner.timer_feuern(kanal, art, generation);
                        }
                    });
                }
                Effekt::TimerStoppen(art) => slot.timer.stoppen(art),
                Effekt::Zustandswechsel { von, nach } => {
                    tracing::debug!(kanal = %kanal, %von, %nach, "Floor-Zustand gewechselt");
                }
                Effekt::AnArbiter(anfrage) => nachlauf.an_arbiter.push(anfrage),
                Effekt::Zaehlen(zaehler) => self.zaehlen(zaehler),
            }
        }
    }

    /// Baut, nummeriert und signiert eine ausgehende Nachricht
    fn signieren(
        &self,
        kanal: &ChannelId,
        ausgehend: Ausgehend,
    ) -> std::result::Result<Vec<u8>, ProtocolError> {
        let sequenz = self.sequenz.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
        let mut msg = ProtocolMessage::neu(
            ausgehend.typ,
            *kanal,
            self.lokal_key,
            self.lokal_name.clone(),
            sequenz,
            jetzt_ms(),
        );
        msg.payload = ausgehend.felder;
        msg.payload
            .entry(felder::LAMPORT.to_string())
            .or_insert_with(|| self.uhr.aktuell().to_string());

        match self.config.wire_format {
            WireFormat::Envelope => envelope_signieren(&msg, self.signer.as_ref()),
            WireFormat::Binary => frame_signieren(&msg, self.signer.as_ref()),
        }
    }

    fn nachlauf(&self, kanal: &ChannelId, nachlauf: Nachlauf) {
        for paket in &nachlauf.pakete {
            if !self.transport.send(kanal, paket) {
                tracing::debug!(kanal = %kanal, "Transport hat Floor-Nachricht nicht zugestellt");
            }
        }
        for ereignis in &nachlauf.ereignisse {
            ereignis.zustellen(self.ereignisse.as_ref());
        }
        if nachlauf.an_arbiter.is_empty() {
            return;
        }
        match &self.zentral {
            Some(zentral) => {
                for anfrage in &nachlauf.an_arbiter {
                    zentral.anfrage_weiterleiten(kanal, anfrage);
                }
            }
            None => tracing::warn!(
                kanal = %kanal,
                anzahl = nachlauf.an_arbiter.len(),
                "Zentraler Modus ohne Arbiter, Anfragen nicht weitergeleitet"
            ),
        }
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Baut einen `FloorArbitrator`
pub struct FloorArbitratorBuilder {
    signer: Arc<dyn MessageSigner>,
    verifier: Arc<dyn SignatureVerifier>,
    transport: Arc<dyn FloorTransport>,
    name: String,
    config: FloorConfig,
    ereignisse: Arc<dyn FloorEventSink>,
    zentral: Option<Arc<dyn CentralArbiter>>,
    metriken: Option<FloorMetrics>,
}

impl FloorArbitratorBuilder {
    /// Anzeigename in ausgehenden Nachrichten
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn config(mut self, config: FloorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn event_sink(mut self, sink: Arc<dyn FloorEventSink>) -> Self {
        self.ereignisse = sink;
        self
    }

    pub fn central_arbiter(mut self, arbiter: Arc<dyn CentralArbiter>) -> Self {
        self.zentral = Some(arbiter);
        self
    }

    pub fn metrics(mut self, metriken: FloorMetrics) -> Self {
        self.metriken = Some(metriken);
        self
    }

    pub fn bauen(self) -> Result<FloorArbitrator> {
        self.config
            .validieren()
            .map_err(|e| SprechfunkError::Konfiguration(e.to_string()))?;

        let lokal_key = self.signer.public_key();
        let replay = ReplayCache::neu(self.config.replay_ttl());
        tracing::info!(
            lokal = %lokal_key,
            modus = ?self.config.modus,
            format = ?self.config.wire_format,
            "Floor-Control gestartet"
        );

        Ok(FloorArbitrator {
            inner: Arc::new(ArbitratorInner {
                config: Arc::new(self.config),
                signer: self.signer,
                verifier: self.verifier,
                transport: self.transport,
                ereignisse: self.ereignisse,
                zentral: self.zentral,
                metriken: self.metriken,
                lokal_key,
                lokal_name: self.name,
                uhr: Arc::new(LamportClock::neu()),
                sequenz: AtomicU32::new(0),
                replay,
                kanaele: DashMap::new(),
            }),
        })
    }
}
