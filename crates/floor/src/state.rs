//! Floor-Zustand eines Kanals und Ergebnis einer Anfrage

use sprechfunk_core::ChannelId;

use crate::request::{FloorHolder, FloorRequest};

/// Zustand der Floor-Control eines Kanals aus Sicht dieses Teilnehmers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FloorState {
    /// Keine Aktivitaet
    Idle,
    /// Eigene Anfrage gesendet, Ausgang offen
    PendingRequest,
    /// Wir haben das Sprechrecht
    Granted,
    /// Ein anderer Teilnehmer spricht
    Taken,
    /// Eigene Anfrage wartet hinter einem Sprecher
    Queued,
    /// Eigenes Sprechrecht wird abgegeben
    Releasing,
    /// Eigenes Sprechrecht wurde entzogen
    Revoked,
    /// Fehlerzustand bis zur Neuinitialisierung
    Error,
}

impl FloorState {
    /// Zustaende in denen ein Inhaber gemeldet wird
    pub fn hat_inhaber(self) -> bool {
        matches!(self, Self::Granted | Self::Taken | Self::Revoked)
    }

    /// Zustaende mit offener eigener Anfrage
    pub fn hat_eigene_anfrage(self) -> bool {
        matches!(self, Self::PendingRequest | Self::Queued)
    }

    pub fn bezeichnung(self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::PendingRequest => "PENDING_REQUEST",
            Self::Granted => "GRANTED",
            Self::Taken => "TAKEN",
            Self::Queued => "QUEUED",
            Self::Releasing => "RELEASING",
            Self::Revoked => "REVOKED",
            Self::Error => "ERROR",
        }
    }
}

impl std::fmt::Display for FloorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.bezeichnung())
    }
}

/// Momentaufnahme des Floor-Zustands eines Kanals
///
/// `holder` ist genau in GRANTED/TAKEN/REVOKED gesetzt, `my_request` genau
/// in PENDING_REQUEST/QUEUED.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelFloorState {
    pub channel_id: ChannelId,
    pub state: FloorState,
    pub holder: Option<FloorHolder>,
    pub my_request: Option<FloorRequest>,
    pub queue_position: usize,
    pub queue_size: usize,
    /// Unix-Zeit in Millisekunden der letzten Aenderung
    pub last_update: i64,
}

/// Ergebnis von `request_floor`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FloorRequestResult {
    Granted { request_id: String },
    Queued { position: usize, total: usize },
    Denied { reason: String },
    Error { message: String },
}

impl FloorRequestResult {
    pub fn denied(reason: impl Into<String>) -> Self {
        Self::Denied {
            reason: reason.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    pub fn ist_erteilt(&self) -> bool {
        matches!(self, Self::Granted { .. })
    }
}

/// Ablehnungsgruende
pub mod gruende {
    pub const FLOOR_BUSY: &str = "floor_busy";
    pub const FLOOR_TAKEN: &str = "floor_taken";
    pub const QUEUE_FULL: &str = "Queue full";
    pub const TIMEOUT: &str = "timeout";
    pub const CANCELLED: &str = "cancelled";
    /// Eine neue Notfall-Anfrage hat die alte ersetzt
    pub const SUPERSEDED: &str = "superseded";
    /// Ablauf der maximalen Wartezeit in der Queue
    pub const QUEUE_TIMEOUT: &str = "queue_timeout";
    pub const PREEMPTED: &str = "preempted";
    pub const EMERGENCY_OVERRIDE: &str = "emergency_override";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inhaber_und_anfrage_zustaende() {
        assert!(FloorState::Revoked.hat_inhaber());
        assert!(!FloorState::Queued.hat_inhaber());
        assert!(FloorState::Queued.hat_eigene_anfrage());
        assert!(!FloorState::Granted.hat_eigene_anfrage());
    }

    #[test]
    fn anzeige() {
        assert_eq!(FloorState::PendingRequest.to_string(), "PENDING_REQUEST");
        assert_eq!(
            FloorRequestResult::denied(gruende::QUEUE_FULL),
            FloorRequestResult::Denied {
                reason: "Queue full".into()
            }
        );
    }
}
