//! Floor-Zustandsautomat eines Kanals
//!
//! Der Automat kennt weder Transport noch Signatur noch Timer-Tasks. Jede
//! Eingabe (lokaler Befehl, eingehende Nachricht, abgelaufener Timer)
//! veraendert den Zustand und liefert eine geordnete Liste von Effekten,
//! die der Arbitrator ausfuehrt.
//!
//! ## Zustaende
//!
//! ```text
//!            anfordern                 FLOOR_GRANTED / Timeout (verteilt)
//!   IDLE ─────────────> PENDING ───────────────────────────────> GRANTED
//!    ^  \                  │  QUEUE_POSITION_INFO / FLOOR_TAKEN       │
//!    │   \ fremde          v                                          │ freigeben / Ablauf
//!    │    \ Erteilung    QUEUED ── FLOOR_GRANTED ──> GRANTED          v
//!    │     v                                                       RELEASING ──> IDLE
//!    └── TAKEN  <── FLOOR_TAKEN / FLOOR_GRANTED ── REVOKED <── hoehere Prioritaet
//! ```

use sprechfunk_core::{ChannelId, PeerKey, SprechfunkError};
use sprechfunk_protocol::{felder, MessageType, ProtocolMessage};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::clock::LamportClock;
use crate::config::{ArbitrationMode, FloorConfig};
use crate::events::FloorEvent;
use crate::queue::{EinreihFehler, RequestQueue};
use crate::request::{FloorHolder, FloorPriority, FloorRequest};
use crate::state::{gruende, ChannelFloorState, FloorRequestResult, FloorState};
use crate::timer::TimerArt;

/// Aktuelle Unix-Zeit in Millisekunden
pub(crate) fn jetzt_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

// ---------------------------------------------------------------------------
// Effekte
// ---------------------------------------------------------------------------

/// Unsignierte ausgehende Nachricht
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ausgehend {
    pub typ: MessageType,
    pub felder: BTreeMap<String, String>,
}

impl Ausgehend {
    fn neu(typ: MessageType) -> Self {
        Self {
            typ,
            felder: BTreeMap::new(),
        }
    }

    fn mit(mut self, schluessel: &str, wert: impl ToString) -> Self {
        self.felder.insert(schluessel.to_string(), wert.to_string());
        self
    }

    fn mit_feldern(typ: MessageType, felder: BTreeMap<String, String>) -> Self {
        Self { typ, felder }
    }
}

/// Zaehlbare Vorgaenge fuer die Metriken
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Zaehler {
    Erteilung,
    Ablehnung,
    Verdraengung,
    SelbstErteilung,
}

/// Auswirkung einer Eingabe, in Reihenfolge auszufuehren
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effekt {
    Senden(Ausgehend),
    Ereignis(FloorEvent),
    /// Beantwortet den wartenden `request_floor`-Aufruf
    Aufloesen(FloorRequestResult),
    TimerStarten(TimerArt, Duration),
    TimerStoppen(TimerArt),
    Zustandswechsel { von: FloorState, nach: FloorState },
    /// Anfrage an den zentralen Arbiter
    AnArbiter(FloorRequest),
    Zaehlen(Zaehler),
}

// ---------------------------------------------------------------------------
// FloorMachine
// ---------------------------------------------------------------------------

/// Zustandsautomat eines Kanals
#[derive(Debug)]
pub struct FloorMachine {
    kanal: ChannelId,
    lokal_key: PeerKey,
    lokal_name: String,
    config: Arc<FloorConfig>,
    uhr: Arc<LamportClock>,
    zustand: FloorState,
    /// Bekannter Sprecher, auch ausserhalb der Zustaende mit Inhaber
    inhaber: Option<FloorHolder>,
    eigene: Option<FloorRequest>,
    queue: RequestQueue,
    queue_position: usize,
    queue_size: usize,
    last_update: i64,
}

impl FloorMachine {
    pub fn neu(
        kanal: ChannelId,
        lokal_key: PeerKey,
        lokal_name: impl Into<String>,
        config: Arc<FloorConfig>,
        uhr: Arc<LamportClock>,
    ) -> Self {
        let queue = RequestQueue::neu(config.max_queue_size);
        Self {
            kanal,
            lokal_key,
            lokal_name: lokal_name.into(),
            config,
            uhr,
            zustand: FloorState::Idle,
            inhaber: None,
            eigene: None,
            queue,
            queue_position: 0,
            queue_size: 0,
            last_update: jetzt_ms(),
        }
    }

    pub fn zustand(&self) -> FloorState {
        self.zustand
    }

    pub fn queue(&self) -> &RequestQueue {
        &self.queue
    }

    /// Momentaufnahme; Inhaber und eigene Anfrage nur in den passenden Zustaenden
    pub fn snapshot(&self) -> ChannelFloorState {
        ChannelFloorState {
            channel_id: self.kanal,
            state: self.zustand,
            holder: self
                .inhaber
                .clone()
                .filter(|_| self.zustand.hat_inhaber()),
            my_request: self
                .eigene
                .clone()
                .filter(|_| self.zustand.hat_eigene_anfrage()),
            queue_position: self.queue_position,
            queue_size: self.queue_size,
            last_update: self.last_update,
        }
    }

    // -----------------------------------------------------------------------
    // Lokale Befehle
    // -----------------------------------------------------------------------

    /// Neue eigene Anfrage
    ///
    /// `Err` ist die sofortige Antwort ohne Zustandsaenderung. Eine
    /// Notfall-Anfrage ersetzt eine noch offene eigene Anfrage.
    pub fn anfordern(
        &mut self,
        prioritaet: FloorPriority,
        notfall: bool,
        dauer_ms: u64,
    ) -> Result<Vec<Effekt>, FloorRequestResult> {
        let mut fx = Vec::new();
        match self.zustand {
            FloorState::Idle | FloorState::Taken | FloorState::Revoked => {}
            FloorState::PendingRequest | FloorState::Queued if notfall => {
                if let Some(alt) = self.eigene.take() {
                    self.queue.entfernen(&alt.request_id);
                    fx.push(Effekt::TimerStoppen(TimerArt::Anfrage));
                    fx.push(Effekt::Senden(abbruch_nachricht(&alt)));
                }
            }
            FloorState::Granted | FloorState::Releasing => {
                return Err(FloorRequestResult::denied(gruende::FLOOR_BUSY));
            }
            FloorState::PendingRequest | FloorState::Queued => {
                return Err(FloorRequestResult::denied(gruende::FLOOR_TAKEN));
            }
            FloorState::Error => {
                return Err(FloorRequestResult::error(
                    SprechfunkError::KanalFehlerzustand(self.kanal.to_string()).to_string(),
                ));
            }
        }

        let prioritaet = if notfall {
            prioritaet.fuer_notfall()
        } else {
            prioritaet
        };
        let anfrage = FloorRequest {
            request_id: Uuid::new_v4().to_string(),
            public_key: self.lokal_key,
            name: self.lokal_name.clone(),
            priority: prioritaet,
            lamport_timestamp: self.uhr.increment(),
            local_timestamp: jetzt_ms(),
            is_emergency: notfall,
            duration_ms: self.config.sprechdauer_ms(notfall, dauer_ms),
        };
        tracing::debug!(
            kanal = %self.kanal,
            anfrage_id = %anfrage.request_id,
            prioritaet = %prioritaet,
            lamport = anfrage.lamport_timestamp,
            "Floor-Anfrage gesendet"
        );

        self.queue_position = 0;
        self.queue_size = 0;
        self.wechseln(FloorState::PendingRequest, &mut fx);
        fx.push(Effekt::Senden(anfrage_nachricht(&anfrage)));
        fx.push(Effekt::TimerStarten(
            TimerArt::Anfrage,
            self.config.request_timeout(),
        ));
        self.eigene = Some(anfrage);
        Ok(fx)
    }

    /// Gibt das eigene Sprechrecht ab; `false` wenn wir es nicht halten
    pub fn freigeben(&mut self) -> (bool, Vec<Effekt>) {
        let mut fx = Vec::new();
        if self.zustand != FloorState::Granted {
            return (false, fx);
        }
        self.abgeben(&mut fx);
        tracing::info!(kanal = %self.kanal, "Sprechrecht freigegeben");
        (true, fx)
    }

    /// Zieht die eigene Anfrage zurueck (Queue-Eintrag und Timer zusammen)
    pub fn abbrechen(&mut self) -> (bool, Vec<Effekt>) {
        let mut fx = Vec::new();
        if !self.zustand.hat_eigene_anfrage() {
            return (false, fx);
        }
        let Some(anfrage) = self.eigene.take() else {
            return (false, fx);
        };
        self.queue.entfernen(&anfrage.request_id);
        fx.push(Effekt::TimerStoppen(TimerArt::Anfrage));
        fx.push(Effekt::Senden(abbruch_nachricht(&anfrage)));
        self.zuruecksetzen(&mut fx);
        fx.push(Effekt::Aufloesen(FloorRequestResult::denied(
            gruende::CANCELLED,
        )));
        tracing::debug!(kanal = %self.kanal, anfrage_id = %anfrage.request_id, "Anfrage abgebrochen");
        (true, fx)
    }

    /// Nicht behebbarer Fehler (z.B. Signierung); erst `init_channel` setzt zurueck
    pub fn fehler(&mut self, meldung: &str) -> Vec<Effekt> {
        let mut fx: Vec<Effekt> = TimerArt::ALLE
            .iter()
            .map(|art| Effekt::TimerStoppen(*art))
            .collect();
        self.eigene = None;
        self.inhaber = None;
        self.queue.leeren();
        self.queue_position = 0;
        self.queue_size = 0;
        self.wechseln(FloorState::Error, &mut fx);
        fx.push(Effekt::Aufloesen(FloorRequestResult::error(meldung)));
        tracing::error!(kanal = %self.kanal, meldung, "Kanal im Fehlerzustand");
        fx
    }

    // -----------------------------------------------------------------------
    // Timer
    // -----------------------------------------------------------------------

    pub fn timer_abgelaufen(&mut self, art: TimerArt) -> Vec<Effekt> {
        let mut fx = Vec::new();
        match art {
            TimerArt::Anfrage => self.anfrage_abgelaufen(&mut fx),
            TimerArt::Erteilung => {
                if self.zustand == FloorState::Granted {
                    self.abgeben(&mut fx);
                    tracing::info!(kanal = %self.kanal, "Sprechzeit abgelaufen, automatisch freigegeben");
                }
            }
            TimerArt::Heartbeat => {
                if let (FloorState::Granted, Some(inhaber)) = (self.zustand, &self.inhaber) {
                    fx.push(Effekt::Senden(Ausgehend::mit_feldern(
                        MessageType::Heartbeat,
                        inhaber.nutzdaten(),
                    )));
                    fx.push(Effekt::TimerStarten(
                        TimerArt::Heartbeat,
                        self.config.heartbeat_interval(),
                    ));
                }
            }
            TimerArt::HalterWacht => self.halter_verloren(&mut fx),
        }
        fx
    }

    fn anfrage_abgelaufen(&mut self, fx: &mut Vec<Effekt>) {
        if !self.zustand.hat_eigene_anfrage() {
            return;
        }
        // Wartend hinter einem bekannten Sprecher: weiter warten
        if self.zustand == FloorState::Queued && self.inhaber.is_some() {
            return;
        }
        let Some(anfrage) = self.eigene.clone() else {
            return;
        };

        match self.config.modus {
            ArbitrationMode::Distributed => {
                tracing::warn!(
                    kanal = %self.kanal,
                    anfrage_id = %anfrage.request_id,
                    "Keine Antwort auf Floor-Anfrage, Selbst-Erteilung"
                );
                let dauer = self
                    .config
                    .sprechdauer_ms(anfrage.is_emergency, anfrage.duration_ms);
                self.lokal_erteilen(anfrage, dauer, fx);
                fx.push(Effekt::Zaehlen(Zaehler::Erteilung));
                fx.push(Effekt::Zaehlen(Zaehler::SelbstErteilung));
            }
            ArbitrationMode::Centralized => {
                if self.zustand != FloorState::PendingRequest {
                    return;
                }
                self.queue.entfernen(&anfrage.request_id);
                self.zuruecksetzen(fx);
                self.ablehnung_melden(gruende::TIMEOUT, fx);
                tracing::info!(kanal = %self.kanal, "Keine Entscheidung des Arbiters, Anfrage abgelehnt");
            }
        }
    }

    fn halter_verloren(&mut self, fx: &mut Vec<Effekt>) {
        if !self.config.holder_verlust_erkennung {
            return;
        }
        let Some(inhaber) = self.inhaber.clone() else {
            return;
        };
        if inhaber.public_key == self.lokal_key {
            return;
        }
        tracing::warn!(
            kanal = %self.kanal,
            sprecher = %inhaber.public_key,
            "Kein Heartbeat vom Sprecher, gilt als verloren"
        );
        self.inhaber = None;
        match self.zustand {
            FloorState::Taken | FloorState::Revoked => {
                self.wechseln(FloorState::Idle, fx);
                fx.push(self.ereignis_released());
            }
            FloorState::Queued => {
                fx.push(Effekt::TimerStarten(
                    TimerArt::Anfrage,
                    self.config.request_timeout(),
                ));
                fx.push(self.ereignis_released());
            }
            _ => {}
        }
    }

    // -----------------------------------------------------------------------
    // Eingehende Nachrichten
    // -----------------------------------------------------------------------

    /// Verarbeitet eine verifizierte, nicht doppelte Nachricht
    pub fn verarbeiten(&mut self, msg: &ProtocolMessage) -> Vec<Effekt> {
        let mut fx = Vec::new();
        if msg.sender_key == self.lokal_key {
            return fx;
        }
        if self.zustand == FloorState::Error {
            tracing::debug!(kanal = %self.kanal, typ = %msg.message_type, "Kanal im Fehlerzustand, Nachricht ignoriert");
            return fx;
        }

        match msg.message_type {
            MessageType::FloorRequest | MessageType::EmergencyCall => {
                self.anfrage_empfangen(msg, &mut fx)
            }
            MessageType::FloorGranted => self.erteilung_empfangen(msg, &mut fx),
            MessageType::FloorDenied => self.ablehnung_empfangen(msg, &mut fx),
            MessageType::FloorTaken => self.belegt_empfangen(msg, &mut fx),
            MessageType::FloorRelease | MessageType::FloorIdle => {
                self.freigabe_empfangen(msg, &mut fx)
            }
            MessageType::FloorQueueStatus | MessageType::QueuePositionInfo => {
                self.position_empfangen(msg, &mut fx)
            }
            MessageType::QueueCancel => self.abbruch_empfangen(msg, &mut fx),
            MessageType::EmergencyCancel => {
                if self.ist_inhaber(&msg.sender_key) {
                    self.freigabe_empfangen(msg, &mut fx)
                } else {
                    self.abbruch_empfangen(msg, &mut fx)
                }
            }
            MessageType::FloorRevoke => self.entzug_empfangen(msg, &mut fx),
            MessageType::Heartbeat => self.heartbeat_empfangen(msg, &mut fx),
            MessageType::HeartbeatAck => self.beruehrt(),
            MessageType::Error => {
                tracing::warn!(
                    kanal = %self.kanal,
                    von = %msg.sender_key,
                    grund = msg.feld(felder::REASON).unwrap_or_default(),
                    "Fehlermeldung von Teilnehmer"
                );
            }
        }
        fx
    }

    fn anfrage_empfangen(&mut self, msg: &ProtocolMessage, fx: &mut Vec<Effekt>) {
        let Some(anfrage) = FloorRequest::aus_nachricht(msg) else {
            tracing::debug!(kanal = %self.kanal, von = %msg.sender_key, "Floor-Anfrage ohne requestId verworfen");
            return;
        };
        self.beruehrt();

        // Wiederholte Anfrage: der Sprecher bestaetigt die Positionen erneut
        if self.queue.enthaelt(&anfrage.request_id) {
            if self.zustand == FloorState::Granted {
                self.positionen_senden(fx);
            }
            return;
        }

        match self.zustand {
            FloorState::Idle => match self.config.modus {
                ArbitrationMode::Distributed => {
                    let inhaber = self.fremd_erteilen(&anfrage, fx);
                    self.fremden_inhaber_setzen(inhaber, fx);
                }
                ArbitrationMode::Centralized => fx.push(Effekt::AnArbiter(anfrage)),
            },
            FloorState::Granted => self.anfrage_als_sprecher(anfrage, fx),
            FloorState::Taken | FloorState::Revoked | FloorState::Releasing => {
                self.spiegeln(anfrage)
            }
            FloorState::PendingRequest => self.kollision(anfrage, fx),
            FloorState::Queued => {
                self.spiegeln(anfrage);
                self.eigene_position_aktualisieren(fx);
            }
            FloorState::Error => {}
        }
    }

    /// Wir sprechen: verdraengen, einreihen oder ablehnen
    fn anfrage_als_sprecher(&mut self, anfrage: FloorRequest, fx: &mut Vec<Effekt>) {
        let eigene_prioritaet = self
            .inhaber
            .as_ref()
            .map(|h| h.priority)
            .unwrap_or(FloorPriority::Low);
        if anfrage.priority > eigene_prioritaet {
            self.verdraengen(anfrage, fx);
            return;
        }

        let request_id = anfrage.request_id.clone();
        let ziel = anfrage.public_key;
        match self.queue.einfuegen(anfrage) {
            Ok(position) => {
                tracing::debug!(kanal = %self.kanal, anfrage_id = %request_id, position, "Anfrage eingereiht");
                self.positionen_senden(fx);
            }
            Err(EinreihFehler::Voll) => {
                tracing::info!(kanal = %self.kanal, anfrage_id = %request_id, "Queue voll, Anfrage abgelehnt");
                fx.push(Effekt::Senden(
                    Ausgehend::neu(MessageType::FloorDenied)
                        .mit(felder::REQUEST_ID, &request_id)
                        .mit(felder::REASON, gruende::QUEUE_FULL)
                        .mit(felder::HOLDER_KEY, ziel.to_hex()),
                ));
                fx.push(Effekt::Zaehlen(Zaehler::Ablehnung));
            }
            Err(EinreihFehler::Doppelt) => self.positionen_senden(fx),
        }
    }

    /// Hoehere Prioritaet uebernimmt: erst REVOKED, dann Erteilung an den Anfrager
    fn verdraengen(&mut self, anfrage: FloorRequest, fx: &mut Vec<Effekt>) {
        let grund = if anfrage.is_emergency {
            gruende::EMERGENCY_OVERRIDE
        } else {
            gruende::PREEMPTED
        };
        tracing::warn!(
            kanal = %self.kanal,
            von = %anfrage.public_key,
            prioritaet = %anfrage.priority,
            "Sprechrecht durch hoehere Prioritaet entzogen"
        );

        fx.push(Effekt::TimerStoppen(TimerArt::Erteilung));
        fx.push(Effekt::TimerStoppen(TimerArt::Heartbeat));
        self.wechseln(FloorState::Revoked, fx);
        fx.push(Effekt::Ereignis(FloorEvent::Revoked {
            channel_id: self.kanal,
            reason: grund.to_string(),
        }));
        fx.push(Effekt::Senden(
            Ausgehend::neu(MessageType::FloorRevoke)
                .mit(felder::HOLDER_KEY, self.lokal_key.to_hex())
                .mit(felder::REASON, grund),
        ));

        let neuer = self.fremd_erteilen(&anfrage, fx);
        fx.push(Effekt::Zaehlen(Zaehler::Verdraengung));
        if anfrage.is_emergency {
            fx.push(Effekt::Ereignis(FloorEvent::EmergencyOverride {
                channel_id: self.kanal,
                holder: neuer.clone(),
            }));
        }
        self.inhaber = Some(neuer);
        self.halter_wacht_starten(fx);
    }

    /// Gleichzeitige Anfragen: die Gesamtordnung entscheidet
    fn kollision(&mut self, anfrage: FloorRequest, fx: &mut Vec<Effekt>) {
        let Some(eigene) = self.eigene.clone() else {
            return;
        };
        if !anfrage.gewinnt_gegen(&eigene) {
            tracing::debug!(kanal = %self.kanal, gegner = %anfrage.public_key, "Kollision gewonnen");
            self.spiegeln(anfrage);
            return;
        }

        tracing::debug!(kanal = %self.kanal, gewinner = %anfrage.public_key, "Kollision verloren");
        if self.inhaber.is_none() && self.config.modus == ArbitrationMode::Distributed {
            // Der Verlierer erteilt dem Gewinner und reiht sich dahinter ein
            let inhaber = self.fremd_erteilen(&anfrage, fx);
            fx.push(Effekt::Ereignis(FloorEvent::Taken {
                channel_id: self.kanal,
                holder: inhaber.clone(),
            }));
            self.inhaber = Some(inhaber);
            self.halter_wacht_starten(fx);
            self.warten_hinter_sprecher(fx);
        } else {
            self.spiegeln(anfrage);
        }
    }

    fn erteilung_empfangen(&mut self, msg: &ProtocolMessage, fx: &mut Vec<Effekt>) {
        let Some(inhaber) = FloorHolder::aus_nachricht(msg, self.config.default_floor_duration_ms)
        else {
            tracing::debug!(kanal = %self.kanal, "FLOOR_GRANTED mit ungueltigem holderKey verworfen");
            return;
        };
        let request_id = msg.feld(felder::REQUEST_ID).unwrap_or_default();

        if inhaber.public_key == self.lokal_key {
            let passend = self.zustand.hat_eigene_anfrage()
                && self
                    .eigene
                    .as_ref()
                    .is_some_and(|a| a.request_id == request_id);
            if !passend {
                tracing::debug!(kanal = %self.kanal, anfrage_id = request_id, "Erteilung ohne offene Anfrage ignoriert");
                return;
            }
            let fremder_spricht = self
                .inhaber
                .as_ref()
                .is_some_and(|h| h.public_key != msg.sender_key);
            if self.zustand == FloorState::Queued && fremder_spricht {
                tracing::debug!(kanal = %self.kanal, "Erteilung waehrend fremdem Sprecher ignoriert");
                return;
            }
            let Some(anfrage) = self.eigene.take() else {
                return;
            };
            let wunsch = match inhaber.dauer_ms() {
                0 => anfrage.duration_ms,
                d => d,
            };
            let dauer = self.config.sprechdauer_ms(anfrage.is_emergency, wunsch);
            self.lokal_erteilen(anfrage, dauer, fx);
            return;
        }

        self.queue.entfernen(request_id);
        match self.zustand {
            FloorState::Granted => {
                let eigene_prioritaet = self
                    .inhaber
                    .as_ref()
                    .map(|h| h.priority)
                    .unwrap_or(FloorPriority::Low);
                if inhaber.priority <= eigene_prioritaet {
                    tracing::warn!(
                        kanal = %self.kanal,
                        andere = %inhaber.public_key,
                        "Konflikt: fremde Erteilung waehrend eigenem Sprechrecht"
                    );
                    return;
                }
                let grund = if inhaber.is_emergency {
                    gruende::EMERGENCY_OVERRIDE
                } else {
                    gruende::PREEMPTED
                };
                fx.push(Effekt::TimerStoppen(TimerArt::Erteilung));
                fx.push(Effekt::TimerStoppen(TimerArt::Heartbeat));
                self.inhaber = Some(inhaber.clone());
                self.wechseln(FloorState::Revoked, fx);
                fx.push(Effekt::Ereignis(FloorEvent::Revoked {
                    channel_id: self.kanal,
                    reason: grund.to_string(),
                }));
                if inhaber.is_emergency {
                    fx.push(Effekt::Ereignis(FloorEvent::EmergencyOverride {
                        channel_id: self.kanal,
                        holder: inhaber,
                    }));
                }
                self.halter_wacht_starten(fx);
            }
            FloorState::Idle
            | FloorState::Taken
            | FloorState::Revoked
            | FloorState::Releasing => self.fremden_inhaber_setzen(inhaber, fx),
            FloorState::PendingRequest => {
                self.fremden_inhaber_setzen(inhaber, fx);
                self.warten_hinter_sprecher(fx);
                self.eigene_anfrage_wiederholen(fx);
            }
            FloorState::Queued => {
                self.fremden_inhaber_setzen(inhaber, fx);
                fx.push(Effekt::TimerStoppen(TimerArt::Anfrage));
                self.eigene_position_aktualisieren(fx);
            }
            FloorState::Error => {}
        }
    }

    fn ablehnung_empfangen(&mut self, msg: &ProtocolMessage, fx: &mut Vec<Effekt>) {
        let request_id = msg.feld(felder::REQUEST_ID).unwrap_or_default();
        let eigene = self.zustand.hat_eigene_anfrage()
            && self
                .eigene
                .as_ref()
                .is_some_and(|a| a.request_id == request_id);
        if !eigene {
            self.queue.entfernen(request_id);
            return;
        }

        let grund = msg.feld(felder::REASON).unwrap_or("denied").to_string();
        tracing::info!(kanal = %self.kanal, anfrage_id = request_id, grund = %grund, "Floor-Anfrage abgelehnt");
        self.queue.entfernen(request_id);
        fx.push(Effekt::TimerStoppen(TimerArt::Anfrage));
        self.zuruecksetzen(fx);
        self.ablehnung_melden(&grund, fx);
    }

    fn belegt_empfangen(&mut self, msg: &ProtocolMessage, fx: &mut Vec<Effekt>) {
        let Some(inhaber) = FloorHolder::aus_nachricht(msg, self.config.default_floor_duration_ms)
        else {
            return;
        };
        if let Some(id) = msg.feld(felder::REQUEST_ID) {
            self.queue.entfernen(id);
        }

        match self.zustand {
            FloorState::Granted => {
                // Nur bei Netzpartition moeglich: beide Seiten halten das Sprechrecht
                tracing::warn!(
                    kanal = %self.kanal,
                    andere = %inhaber.public_key,
                    "Konflikt: FLOOR_TAKEN waehrend eigenem Sprechrecht"
                );
            }
            FloorState::Idle
            | FloorState::Taken
            | FloorState::Revoked
            | FloorState::Releasing => self.fremden_inhaber_setzen(inhaber, fx),
            FloorState::PendingRequest => {
                self.fremden_inhaber_setzen(inhaber, fx);
                self.warten_hinter_sprecher(fx);
                self.eigene_anfrage_wiederholen(fx);
            }
            FloorState::Queued => {
                self.fremden_inhaber_setzen(inhaber, fx);
                fx.push(Effekt::TimerStoppen(TimerArt::Anfrage));
                self.eigene_position_aktualisieren(fx);
            }
            FloorState::Error => {}
        }
    }

    fn freigabe_empfangen(&mut self, msg: &ProtocolMessage, fx: &mut Vec<Effekt>) {
        if !self.ist_inhaber(&msg.sender_key) {
            tracing::debug!(
                kanal = %self.kanal,
                von = %msg.sender_key,
                "Freigabe von Nicht-Sprecher ignoriert"
            );
            return;
        }

        self.inhaber = None;
        fx.push(Effekt::TimerStoppen(TimerArt::HalterWacht));
        match self.zustand {
            FloorState::Taken | FloorState::Revoked => {
                self.wechseln(FloorState::Idle, fx);
            }
            FloorState::Queued => {
                // Rueckfall auf Selbst-Erteilung falls die Erteilung ausbleibt
                self.beruehrt();
                fx.push(Effekt::TimerStarten(
                    TimerArt::Anfrage,
                    self.config.request_timeout(),
                ));
            }
            _ => self.beruehrt(),
        }
        fx.push(self.ereignis_released());
    }

    fn position_empfangen(&mut self, msg: &ProtocolMessage, fx: &mut Vec<Effekt>) {
        let request_id = msg.feld(felder::REQUEST_ID).unwrap_or_default();
        let Some(eigene) = self
            .eigene
            .clone()
            .filter(|a| a.request_id == request_id && self.zustand.hat_eigene_anfrage())
        else {
            return;
        };
        let (Some(position), Some(total)) = (
            msg.feld_als::<usize>(felder::POSITION),
            msg.feld_als::<usize>(felder::TOTAL),
        ) else {
            return;
        };
        // Eigene Anfrage im gespiegelten Queue-Abbild halten
        let _ = self.queue.einfuegen(eigene);

        if self.zustand == FloorState::PendingRequest {
            fx.push(Effekt::TimerStoppen(TimerArt::Anfrage));
            self.wechseln(FloorState::Queued, fx);
            self.queue_position = position;
            self.queue_size = total;
            fx.push(Effekt::Aufloesen(FloorRequestResult::Queued { position, total }));
            fx.push(self.ereignis_position());
        } else if (position, total) != (self.queue_position, self.queue_size) {
            self.queue_position = position;
            self.queue_size = total;
            self.beruehrt();
            fx.push(self.ereignis_position());
        }
    }

    fn abbruch_empfangen(&mut self, msg: &ProtocolMessage, fx: &mut Vec<Effekt>) {
        let Some(id) = msg.feld(felder::REQUEST_ID) else {
            return;
        };
        if self.queue.entfernen(id).is_none() {
            return;
        }
        match self.zustand {
            FloorState::Granted => self.positionen_senden(fx),
            FloorState::Queued => self.eigene_position_aktualisieren(fx),
            _ => {}
        }
    }

    fn entzug_empfangen(&mut self, msg: &ProtocolMessage, fx: &mut Vec<Effekt>) {
        let ziel = msg.feld(felder::HOLDER_KEY).and_then(PeerKey::aus_hex);
        if ziel != Some(self.lokal_key) || self.zustand != FloorState::Granted {
            return;
        }
        let grund = msg.feld(felder::REASON).unwrap_or(gruende::PREEMPTED);
        tracing::warn!(kanal = %self.kanal, von = %msg.sender_key, grund, "Sprechrecht entzogen");
        fx.push(Effekt::TimerStoppen(TimerArt::Erteilung));
        fx.push(Effekt::TimerStoppen(TimerArt::Heartbeat));
        self.wechseln(FloorState::Revoked, fx);
        fx.push(Effekt::Ereignis(FloorEvent::Revoked {
            channel_id: self.kanal,
            reason: grund.to_string(),
        }));
    }

    fn heartbeat_empfangen(&mut self, msg: &ProtocolMessage, fx: &mut Vec<Effekt>) {
        if self.ist_inhaber(&msg.sender_key) {
            if let (Some(aktuell), Some(expires_at)) = (
                self.inhaber.as_mut(),
                msg.feld_als::<i64>(felder::EXPIRES_AT),
            ) {
                aktuell.expires_at = expires_at;
            }
            self.beruehrt();
            self.halter_wacht_starten(fx);
            return;
        }
        if self.inhaber.is_none() && self.zustand == FloorState::Idle {
            // Spaeter Beitritt: laufenden Sprecher uebernehmen
            if let Some(inhaber) =
                FloorHolder::aus_nachricht(msg, self.config.default_floor_duration_ms)
            {
                tracing::info!(kanal = %self.kanal, sprecher = %inhaber.public_key, "Sprecher aus Heartbeat uebernommen");
                self.fremden_inhaber_setzen(inhaber, fx);
            }
        }
    }

    // -----------------------------------------------------------------------
    // Hilfen
    // -----------------------------------------------------------------------

    fn wechseln(&mut self, nach: FloorState, fx: &mut Vec<Effekt>) {
        if self.zustand != nach {
            fx.push(Effekt::Zustandswechsel {
                von: self.zustand,
                nach,
            });
            self.zustand = nach;
        }
        self.beruehrt();
    }

    fn beruehrt(&mut self) {
        self.last_update = jetzt_ms();
    }

    fn ist_inhaber(&self, key: &PeerKey) -> bool {
        self.inhaber.as_ref().is_some_and(|h| &h.public_key == key)
    }

    fn ereignis_released(&self) -> Effekt {
        Effekt::Ereignis(FloorEvent::Released {
            channel_id: self.kanal,
        })
    }

    fn ereignis_position(&self) -> Effekt {
        Effekt::Ereignis(FloorEvent::QueuePositionChanged {
            channel_id: self.kanal,
            position: self.queue_position,
            total: self.queue_size,
        })
    }

    fn ablehnung_melden(&self, grund: &str, fx: &mut Vec<Effekt>) {
        fx.push(Effekt::Aufloesen(FloorRequestResult::denied(grund)));
        fx.push(Effekt::Ereignis(FloorEvent::Denied {
            channel_id: self.kanal,
            reason: grund.to_string(),
        }));
        fx.push(Effekt::Zaehlen(Zaehler::Ablehnung));
    }

    fn halter_wacht_starten(&self, fx: &mut Vec<Effekt>) {
        if self.config.holder_verlust_erkennung {
            fx.push(Effekt::TimerStarten(
                TimerArt::HalterWacht,
                self.config.floor_holder_timeout(),
            ));
        }
    }

    /// Zurueck nach TAKEN (fremder Sprecher bekannt) oder IDLE
    fn zuruecksetzen(&mut self, fx: &mut Vec<Effekt>) {
        self.eigene = None;
        self.queue_position = 0;
        self.queue_size = 0;
        let fremder_spricht = self
            .inhaber
            .as_ref()
            .is_some_and(|h| h.public_key != self.lokal_key);
        if fremder_spricht {
            self.wechseln(FloorState::Taken, fx);
        } else {
            self.inhaber = None;
            self.wechseln(FloorState::Idle, fx);
        }
    }

    /// Erteilt einem anderen Teilnehmer das Sprechrecht (sendet FLOOR_GRANTED)
    fn fremd_erteilen(&mut self, anfrage: &FloorRequest, fx: &mut Vec<Effekt>) -> FloorHolder {
        let dauer = self
            .config
            .sprechdauer_ms(anfrage.is_emergency, anfrage.duration_ms);
        let inhaber = FloorHolder::aus_anfrage(anfrage, jetzt_ms(), dauer);
        let mut nutzdaten = inhaber.nutzdaten();
        nutzdaten.insert(felder::REQUEST_ID.into(), anfrage.request_id.clone());
        fx.push(Effekt::Senden(Ausgehend::mit_feldern(
            MessageType::FloorGranted,
            nutzdaten,
        )));
        fx.push(Effekt::Zaehlen(Zaehler::Erteilung));
        tracing::debug!(
            kanal = %self.kanal,
            an = %anfrage.public_key,
            anfrage_id = %anfrage.request_id,
            dauer_ms = dauer,
            "Sprechrecht erteilt"
        );
        inhaber
    }

    /// Merkt sich einen fremden Sprecher; IDLE/REVOKED wird zu TAKEN
    fn fremden_inhaber_setzen(&mut self, inhaber: FloorHolder, fx: &mut Vec<Effekt>) {
        let neu = !self.ist_inhaber(&inhaber.public_key);
        self.inhaber = Some(inhaber.clone());
        self.halter_wacht_starten(fx);
        match self.zustand {
            FloorState::Idle
            | FloorState::Taken
            | FloorState::Revoked
            | FloorState::Releasing => {
                let war_belegt = self.zustand == FloorState::Taken;
                self.wechseln(FloorState::Taken, fx);
                if neu || !war_belegt {
                    fx.push(Effekt::Ereignis(FloorEvent::Taken {
                        channel_id: self.kanal,
                        holder: inhaber,
                    }));
                }
            }
            _ => self.beruehrt(),
        }
    }

    /// Wir haben das Sprechrecht (Erteilung oder Selbst-Erteilung)
    fn lokal_erteilen(&mut self, anfrage: FloorRequest, dauer_ms: u64, fx: &mut Vec<Effekt>) {
        self.queue.entfernen(&anfrage.request_id);
        let inhaber = FloorHolder::aus_anfrage(&anfrage, jetzt_ms(), dauer_ms);
        self.inhaber = Some(inhaber.clone());
        self.eigene = None;
        self.queue_position = 0;
        self.queue_size = 0;

        fx.push(Effekt::TimerStoppen(TimerArt::Anfrage));
        fx.push(Effekt::TimerStoppen(TimerArt::HalterWacht));
        self.wechseln(FloorState::Granted, fx);
        fx.push(Effekt::TimerStarten(
            TimerArt::Erteilung,
            Duration::from_millis(dauer_ms),
        ));
        fx.push(Effekt::TimerStarten(
            TimerArt::Heartbeat,
            self.config.heartbeat_interval(),
        ));

        let mut nutzdaten = inhaber.nutzdaten();
        nutzdaten.insert(felder::REQUEST_ID.into(), anfrage.request_id.clone());
        fx.push(Effekt::Senden(Ausgehend::mit_feldern(
            MessageType::FloorTaken,
            nutzdaten,
        )));
        self.positionen_senden(fx);

        fx.push(Effekt::Ereignis(FloorEvent::Granted {
            channel_id: self.kanal,
        }));
        fx.push(Effekt::Aufloesen(FloorRequestResult::Granted {
            request_id: anfrage.request_id.clone(),
        }));
        tracing::info!(
            kanal = %self.kanal,
            anfrage_id = %anfrage.request_id,
            dauer_ms,
            "Sprechrecht erhalten"
        );
    }

    /// GRANTED -> RELEASING -> IDLE, danach die naechste Anfrage bedienen
    fn abgeben(&mut self, fx: &mut Vec<Effekt>) {
        fx.push(Effekt::TimerStoppen(TimerArt::Erteilung));
        fx.push(Effekt::TimerStoppen(TimerArt::Heartbeat));
        self.wechseln(FloorState::Releasing, fx);
        self.inhaber = None;
        fx.push(Effekt::Senden(
            Ausgehend::neu(MessageType::FloorRelease)
                .mit(felder::HOLDER_KEY, self.lokal_key.to_hex()),
        ));
        self.wechseln(FloorState::Idle, fx);
        fx.push(self.ereignis_released());
        self.queue_abarbeiten(fx);
    }

    fn queue_abarbeiten(&mut self, fx: &mut Vec<Effekt>) {
        if self.config.queue_verdraengung {
            for alt in self.queue.aelter_als_entfernen(self.config.max_queue_wait()) {
                tracing::info!(kanal = %self.kanal, anfrage_id = %alt.request_id, "Maximale Wartezeit ueberschritten");
                fx.push(Effekt::Senden(
                    Ausgehend::neu(MessageType::FloorDenied)
                        .mit(felder::REQUEST_ID, &alt.request_id)
                        .mit(felder::REASON, gruende::QUEUE_TIMEOUT)
                        .mit(felder::HOLDER_KEY, alt.public_key.to_hex()),
                ));
                fx.push(Effekt::Zaehlen(Zaehler::Ablehnung));
            }
        }

        while let Some(naechste) = self.queue.naechste() {
            if naechste.public_key == self.lokal_key {
                continue;
            }
            let inhaber = self.fremd_erteilen(&naechste, fx);
            self.fremden_inhaber_setzen(inhaber, fx);
            self.positionen_senden(fx);
            return;
        }
    }

    /// Sendet jedem Eintrag der Queue seine aktuelle Position
    fn positionen_senden(&self, fx: &mut Vec<Effekt>) {
        let total = self.queue.len();
        for (index, anfrage) in self.queue.iter().enumerate() {
            fx.push(Effekt::Senden(
                Ausgehend::neu(MessageType::QueuePositionInfo)
                    .mit(felder::REQUEST_ID, &anfrage.request_id)
                    .mit(felder::POSITION, index + 1)
                    .mit(felder::TOTAL, total)
                    .mit(felder::HOLDER_KEY, anfrage.public_key.to_hex()),
            ));
        }
    }

    fn spiegeln(&mut self, anfrage: FloorRequest) {
        if let Err(fehler) = self.queue.einfuegen(anfrage) {
            tracing::trace!(kanal = %self.kanal, ?fehler, "Anfrage nicht gespiegelt");
        }
    }

    /// PENDING -> QUEUED hinter dem bekannten Sprecher
    fn warten_hinter_sprecher(&mut self, fx: &mut Vec<Effekt>) {
        let Some(eigene) = self.eigene.clone() else {
            return;
        };
        let _ = self.queue.einfuegen(eigene.clone());
        fx.push(Effekt::TimerStoppen(TimerArt::Anfrage));
        self.wechseln(FloorState::Queued, fx);

        let position = self
            .queue
            .position(&eigene.request_id)
            .unwrap_or(self.queue.len() + 1);
        self.queue_position = position;
        self.queue_size = self.queue.len().max(position);
        fx.push(Effekt::Aufloesen(FloorRequestResult::Queued {
            position: self.queue_position,
            total: self.queue_size,
        }));
        fx.push(self.ereignis_position());
    }

    /// Sendet die eigene Anfrage erneut, damit der neue Sprecher sie kennt
    fn eigene_anfrage_wiederholen(&self, fx: &mut Vec<Effekt>) {
        if let Some(eigene) = &self.eigene {
            fx.push(Effekt::Senden(anfrage_nachricht(eigene)));
        }
    }

    fn eigene_position_aktualisieren(&mut self, fx: &mut Vec<Effekt>) {
        let Some(eigene) = &self.eigene else {
            return;
        };
        let Some(position) = self.queue.position(&eigene.request_id) else {
            return;
        };
        let total = self.queue.len();
        if (position, total) != (self.queue_position, self.queue_size) {
            self.queue_position = position;
            self.queue_size = total;
            self.beruehrt();
            fx.push(self.ereignis_position());
        }
    }
}

fn anfrage_nachricht(anfrage: &FloorRequest) -> Ausgehend {
    let typ = if anfrage.is_emergency {
        MessageType::EmergencyCall
    } else {
        MessageType::FloorRequest
    };
    Ausgehend::mit_feldern(typ, anfrage.nutzdaten())
}

fn abbruch_nachricht(anfrage: &FloorRequest) -> Ausgehend {
    let typ = if anfrage.is_emergency {
        MessageType::EmergencyCancel
    } else {
        MessageType::QueueCancel
    };
    Ausgehend::neu(typ).mit(felder::REQUEST_ID, &anfrage.request_id)
}
