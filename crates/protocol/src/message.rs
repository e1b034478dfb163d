//! Floor-Control-Nachrichten
//!
//! Definiert die Nachrichtentypen und die gemeinsame Nachrichtenstruktur,
//! die in beiden Serialisierungen (JSON-Envelope und Binaer-Frame)
//! transportiert wird.
//!
//! ## Design
//! - Stabile numerische Typ-Codes, in beiden Formen identisch
//! - Nutzdaten als geordnete String-Map (deterministische Signatur-Bytes)
//! - `message_id` = erste 8 Hex-Zeichen des Senderschluessels + Sequenz

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sprechfunk_core::{ChannelId, PeerKey};
use std::collections::BTreeMap;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// MessageType
// ---------------------------------------------------------------------------

/// Art einer Floor-Control-Nachricht
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    FloorRequest = 0x01,
    FloorGranted = 0x02,
    FloorDenied = 0x03,
    FloorRelease = 0x04,
    FloorTaken = 0x05,
    FloorRevoke = 0x06,
    FloorIdle = 0x07,
    FloorQueueStatus = 0x08,
    QueuePositionInfo = 0x10,
    QueueCancel = 0x11,
    Heartbeat = 0x20,
    HeartbeatAck = 0x21,
    EmergencyCall = 0x30,
    EmergencyCancel = 0x31,
    Error = 0xFF,
}

impl MessageType {
    /// Konvertiert ein Byte in einen `MessageType`
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(Self::FloorRequest),
            0x02 => Some(Self::FloorGranted),
            0x03 => Some(Self::FloorDenied),
            0x04 => Some(Self::FloorRelease),
            0x05 => Some(Self::FloorTaken),
            0x06 => Some(Self::FloorRevoke),
            0x07 => Some(Self::FloorIdle),
            0x08 => Some(Self::FloorQueueStatus),
            0x10 => Some(Self::QueuePositionInfo),
            0x11 => Some(Self::QueueCancel),
            0x20 => Some(Self::Heartbeat),
            0x21 => Some(Self::HeartbeatAck),
            0x30 => Some(Self::EmergencyCall),
            0x31 => Some(Self::EmergencyCancel),
            0xFF => Some(Self::Error),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        self as u8
    }

    /// Protokollname fuer Logs
    pub fn bezeichnung(self) -> &'static str {
        match self {
            Self::FloorRequest => "FLOOR_REQUEST",
            Self::FloorGranted => "FLOOR_GRANTED",
            Self::FloorDenied => "FLOOR_DENIED",
            Self::FloorRelease => "FLOOR_RELEASE",
            Self::FloorTaken => "FLOOR_TAKEN",
            Self::FloorRevoke => "FLOOR_REVOKE",
            Self::FloorIdle => "FLOOR_IDLE",
            Self::FloorQueueStatus => "FLOOR_QUEUE_STATUS",
            Self::QueuePositionInfo => "QUEUE_POSITION_INFO",
            Self::QueueCancel => "QUEUE_CANCEL",
            Self::Heartbeat => "HEARTBEAT",
            Self::HeartbeatAck => "HEARTBEAT_ACK",
            Self::EmergencyCall => "EMERGENCY_CALL",
            Self::EmergencyCancel => "EMERGENCY_CANCEL",
            Self::Error => "ERROR",
        }
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.bezeichnung())
    }
}

// Im JSON steht der numerische Code, nicht der Name
impl Serialize for MessageType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.code())
    }
}

impl<'de> Deserialize<'de> for MessageType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let code = u8::deserialize(deserializer)?;
        Self::from_u8(code).ok_or_else(|| {
            serde::de::Error::custom(format!("Unbekannter Nachrichtentyp: 0x{code:02X}"))
        })
    }
}

// ---------------------------------------------------------------------------
// Nutzdaten-Felder
// ---------------------------------------------------------------------------

/// Schluessel der Nutzdaten-Map
pub mod felder {
    pub const REQUEST_ID: &str = "requestId";
    pub const PRIORITY: &str = "priority";
    pub const LAMPORT: &str = "lamport";
    pub const LOCAL_TIMESTAMP: &str = "localTimestamp";
    pub const EMERGENCY: &str = "emergency";
    pub const DURATION_MS: &str = "durationMs";
    pub const REASON: &str = "reason";
    pub const HOLDER_KEY: &str = "holderKey";
    pub const HOLDER_NAME: &str = "holderName";
    pub const GRANTED_AT: &str = "grantedAt";
    pub const EXPIRES_AT: &str = "expiresAt";
    pub const POSITION: &str = "position";
    pub const TOTAL: &str = "total";
    /// Im Binaer-Frame reserviert fuer den Absendernamen
    pub const SENDER_NAME: &str = "senderName";
}

// ---------------------------------------------------------------------------
// ProtocolMessage
// ---------------------------------------------------------------------------

/// Eine Floor-Control-Nachricht, unabhaengig von ihrer Serialisierung
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolMessage {
    pub message_type: MessageType,
    pub channel_id: ChannelId,
    pub sender_key: PeerKey,
    pub sender_name: String,
    /// Pro Sender monoton steigend
    pub sequence: u32,
    /// Unix-Zeit in Millisekunden
    pub timestamp: i64,
    pub payload: BTreeMap<String, String>,
    pub signature: Option<Vec<u8>>,
}

impl ProtocolMessage {
    /// Erstellt eine unsignierte Nachricht ohne Nutzdaten
    pub fn neu(
        message_type: MessageType,
        channel_id: ChannelId,
        sender_key: PeerKey,
        sender_name: impl Into<String>,
        sequence: u32,
        timestamp: i64,
    ) -> Self {
        Self {
            message_type,
            channel_id,
            sender_key,
            sender_name: sender_name.into(),
            sequence,
            timestamp,
            payload: BTreeMap::new(),
            signature: None,
        }
    }

    /// Fuegt ein Nutzdaten-Feld hinzu (Builder-Stil)
    pub fn mit_feld(mut self, schluessel: &str, wert: impl ToString) -> Self {
        self.payload.insert(schluessel.to_string(), wert.to_string());
        self
    }

    /// Schluessel fuer den Replay-Cache
    pub fn message_id(&self) -> String {
        format!("{}-{}", self.sender_key.kurz_hex(), self.sequence)
    }

    pub fn feld(&self, schluessel: &str) -> Option<&str> {
        self.payload.get(schluessel).map(String::as_str)
    }

    /// Liest ein Feld und parst es; `None` wenn es fehlt oder ungueltig ist
    pub fn feld_als<T: FromStr>(&self, schluessel: &str) -> Option<T> {
        self.feld(schluessel).and_then(|s| s.parse().ok())
    }

    /// Ob die Nachricht als Notfall markiert ist (Typ oder Nutzdaten)
    pub fn ist_notfall(&self) -> bool {
        matches!(
            self.message_type,
            MessageType::EmergencyCall | MessageType::EmergencyCancel
        ) || self.feld_als::<bool>(felder::EMERGENCY).unwrap_or(false)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn nachricht() -> ProtocolMessage {
        ProtocolMessage::neu(
            MessageType::FloorRequest,
            ChannelId::aus_name("C"),
            PeerKey::aus_bytes(&[0xDE, 0xAD, 0xBE, 0xEF, 0x01]),
            "Alice",
            42,
            1_700_000_000_000,
        )
    }

    #[test]
    fn typ_codes_sind_stabil() {
        assert_eq!(MessageType::FloorRequest.code(), 0x01);
        assert_eq!(MessageType::FloorQueueStatus.code(), 0x08);
        assert_eq!(MessageType::QueuePositionInfo.code(), 0x10);
        assert_eq!(MessageType::HeartbeatAck.code(), 0x21);
        assert_eq!(MessageType::EmergencyCancel.code(), 0x31);
        assert_eq!(MessageType::Error.code(), 0xFF);
    }

    #[test]
    fn alle_codes_rueckwandelbar() {
        for code in 0u8..=255 {
            if let Some(typ) = MessageType::from_u8(code) {
                assert_eq!(typ.code(), code);
            }
        }
        assert!(MessageType::from_u8(0x09).is_none());
        assert!(MessageType::from_u8(0x00).is_none());
    }

    #[test]
    fn typ_wird_als_zahl_serialisiert() {
        let json = serde_json::to_string(&MessageType::FloorTaken).unwrap();
        assert_eq!(json, "5");
        let typ: MessageType = serde_json::from_str("32").unwrap();
        assert_eq!(typ, MessageType::Heartbeat);
        assert!(serde_json::from_str::<MessageType>("9").is_err());
    }

    #[test]
    fn message_id_format() {
        assert_eq!(nachricht().message_id(), "deadbeef-42");
    }

    #[test]
    fn felder_lesen() {
        let msg = nachricht()
            .mit_feld(felder::PRIORITY, 3)
            .mit_feld(felder::EMERGENCY, true);
        assert_eq!(msg.feld_als::<u8>(felder::PRIORITY), Some(3));
        assert!(msg.ist_notfall());
        assert_eq!(msg.feld_als::<u8>(felder::LAMPORT), None);
    }
}
