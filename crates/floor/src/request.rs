//! Floor-Anfragen, Prioritaeten und Sprechrecht-Inhaber
//!
//! ## Gesamtordnung von Anfragen
//!
//! 1. Prioritaet absteigend
//! 2. Lamport-Zeitstempel aufsteigend
//! 3. Identitaets-Hash aufsteigend (SHA-256 ueber den Schluessel)
//! 4. Anfrage-ID aufsteigend (nur damit die Ordnung zur Gleichheit passt)
//!
//! Dieselbe Ordnung entscheidet ueber die Queue-Position und ueber
//! Kollisionen zweier gleichzeitiger Anfragen.

use sprechfunk_core::PeerKey;
use sprechfunk_protocol::{felder, MessageType, ProtocolMessage};
use std::cmp::{Ordering, Reverse};
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// FloorPriority
// ---------------------------------------------------------------------------

/// Prioritaetsstufe einer Anfrage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum FloorPriority {
    Low = 0,
    Normal = 1,
    High = 2,
    Emergency = 3,
    Preemptive = 4,
}

impl FloorPriority {
    pub fn from_u8(wert: u8) -> Option<Self> {
        match wert {
            0 => Some(Self::Low),
            1 => Some(Self::Normal),
            2 => Some(Self::High),
            3 => Some(Self::Emergency),
            4 => Some(Self::Preemptive),
            _ => None,
        }
    }

    pub fn level(self) -> u8 {
        self as u8
    }

    /// Notfall-Anfragen laufen mindestens mit `Emergency`
    pub fn fuer_notfall(self) -> Self {
        self.max(Self::Emergency)
    }
}

impl std::fmt::Display for FloorPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Low => "LOW",
            Self::Normal => "NORMAL",
            Self::High => "HIGH",
            Self::Emergency => "EMERGENCY",
            Self::Preemptive => "PREEMPTIVE",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// FloorRequest
// ---------------------------------------------------------------------------

/// Eine Anfrage auf das Sprechrecht
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FloorRequest {
    pub request_id: String,
    pub public_key: PeerKey,
    pub name: String,
    pub priority: FloorPriority,
    pub lamport_timestamp: u64,
    /// Unix-Zeit in Millisekunden beim Erstellen
    pub local_timestamp: i64,
    pub is_emergency: bool,
    /// Gewuenschte Sprechdauer; 0 = Standarddauer
    pub duration_ms: u64,
}

/// Sortierschluessel der Gesamtordnung
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct OrdnungsSchluessel(Reverse<FloorPriority>, u64, u64, String);

impl FloorRequest {
    pub fn ordnungs_schluessel(&self) -> OrdnungsSchluessel {
        OrdnungsSchluessel(
            Reverse(self.priority),
            self.lamport_timestamp,
            self.public_key.identitaets_hash(),
            self.request_id.clone(),
        )
    }

    /// Vergleich nach der Gesamtordnung; `Less` = kommt zuerst dran
    pub fn vergleichen(&self, andere: &FloorRequest) -> Ordering {
        self.ordnungs_schluessel().cmp(&andere.ordnungs_schluessel())
    }

    /// Ob diese Anfrage eine Kollision gegen `andere` gewinnt
    pub fn gewinnt_gegen(&self, andere: &FloorRequest) -> bool {
        self.vergleichen(andere) == Ordering::Less
    }

    /// Nutzdaten einer FLOOR_REQUEST- bzw. EMERGENCY_CALL-Nachricht
    pub fn nutzdaten(&self) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        map.insert(felder::REQUEST_ID.into(), self.request_id.clone());
        map.insert(felder::PRIORITY.into(), self.priority.level().to_string());
        map.insert(felder::LAMPORT.into(), self.lamport_timestamp.to_string());
        map.insert(
            felder::LOCAL_TIMESTAMP.into(),
            self.local_timestamp.to_string(),
        );
        map.insert(felder::EMERGENCY.into(), self.is_emergency.to_string());
        map.insert(felder::DURATION_MS.into(), self.duration_ms.to_string());
        map
    }

    /// Liest eine Anfrage aus einer eingehenden Nachricht
    ///
    /// Ohne `requestId` gibt es keine Anfrage. EMERGENCY_CALL gilt immer als
    /// Notfall; Notfaelle laufen mindestens mit `Emergency`.
    pub fn aus_nachricht(msg: &ProtocolMessage) -> Option<Self> {
        let request_id = msg.feld(felder::REQUEST_ID)?.to_string();
        if request_id.is_empty() {
            return None;
        }
        let is_emergency = msg.message_type == MessageType::EmergencyCall
            || msg.feld_als::<bool>(felder::EMERGENCY).unwrap_or(false);
        let mut priority = msg
            .feld_als::<u8>(felder::PRIORITY)
            .and_then(FloorPriority::from_u8)
            .unwrap_or(FloorPriority::Normal);
        if is_emergency {
            priority = priority.fuer_notfall();
        }

        Some(Self {
            request_id,
            public_key: msg.sender_key,
            name: msg.sender_name.clone(),
            priority,
            lamport_timestamp: msg.feld_als(felder::LAMPORT).unwrap_or(0),
            local_timestamp: msg
                .feld_als(felder::LOCAL_TIMESTAMP)
                .unwrap_or(msg.timestamp),
            is_emergency,
            duration_ms: msg.feld_als(felder::DURATION_MS).unwrap_or(0),
        })
    }
}

fn ms_als_i64(ms: u64) -> i64 {
    i64::try_from(ms).unwrap_or(i64::MAX)
}

// ---------------------------------------------------------------------------
// FloorHolder
// ---------------------------------------------------------------------------

/// Aktueller Inhaber des Sprechrechts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FloorHolder {
    pub public_key: PeerKey,
    pub name: String,
    pub priority: FloorPriority,
    /// Unix-Zeit in Millisekunden
    pub granted_at: i64,
    pub expires_at: i64,
    pub is_emergency: bool,
}

impl FloorHolder {
    /// Inhaber aus einer erteilten Anfrage
    pub fn aus_anfrage(anfrage: &FloorRequest, granted_at: i64, dauer_ms: u64) -> Self {
        Self {
            public_key: anfrage.public_key,
            name: anfrage.name.clone(),
            priority: anfrage.priority,
            granted_at,
            expires_at: granted_at.saturating_add(ms_als_i64(dauer_ms)),
            is_emergency: anfrage.is_emergency,
        }
    }

    /// Verbleibende Sprechzeit, nie negativ
    pub fn remaining_ms(&self, jetzt_ms: i64) -> u64 {
        self.expires_at.saturating_sub(jetzt_ms).max(0) as u64
    }

    pub fn dauer_ms(&self) -> u64 {
        self.expires_at.saturating_sub(self.granted_at).max(0) as u64
    }

    /// Inhaber-Felder fuer FLOOR_GRANTED, FLOOR_TAKEN und HEARTBEAT
    pub fn nutzdaten(&self) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        map.insert(felder::HOLDER_KEY.into(), self.public_key.to_hex());
        map.insert(felder::HOLDER_NAME.into(), self.name.clone());
        map.insert(felder::PRIORITY.into(), self.priority.level().to_string());
        map.insert(felder::GRANTED_AT.into(), self.granted_at.to_string());
        map.insert(felder::EXPIRES_AT.into(), self.expires_at.to_string());
        map.insert(felder::DURATION_MS.into(), self.dauer_ms().to_string());
        map.insert(felder::EMERGENCY.into(), self.is_emergency.to_string());
        map
    }

    /// Liest den Inhaber aus einer Nachricht
    ///
    /// Fehlt `holderKey`, ist der Absender selbst gemeint.
    pub fn aus_nachricht(msg: &ProtocolMessage, standard_dauer_ms: u64) -> Option<Self> {
        let (public_key, name) = match msg.feld(felder::HOLDER_KEY) {
            Some(hex) => (
                PeerKey::aus_hex(hex)?,
                msg.feld(felder::HOLDER_NAME).unwrap_or_default().to_string(),
            ),
            None => (msg.sender_key, msg.sender_name.clone()),
        };
        let granted_at = msg.feld_als(felder::GRANTED_AT).unwrap_or(msg.timestamp);
        let dauer = msg
            .feld_als::<u64>(felder::DURATION_MS)
            .filter(|d| *d > 0)
            .unwrap_or(standard_dauer_ms);
        let expires_at = msg
            .feld_als(felder::EXPIRES_AT)
            .unwrap_or_else(|| granted_at.saturating_add(ms_als_i64(dauer)));

        Some(Self {
            public_key,
            name,
            priority: msg
                .feld_als::<u8>(felder::PRIORITY)
                .and_then(FloorPriority::from_u8)
                .unwrap_or(FloorPriority::Normal),
            granted_at,
            expires_at,
            is_emergency: msg.feld_als(felder::EMERGENCY).unwrap_or(false),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
