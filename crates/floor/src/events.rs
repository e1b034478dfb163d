//! Schnittstellen nach aussen: Transport, Ereignisse, zentraler Arbiter
//!
//! Alle Traits werden beim Bau des Arbitrators uebergeben; es gibt keine
//! globalen Callbacks.

use sprechfunk_core::ChannelId;
use tokio::sync::mpsc;

use crate::request::{FloorHolder, FloorRequest};

/// Best-Effort-Transport fuer signierte Floor-Nachrichten
pub trait FloorTransport: Send + Sync + 'static {
    /// Sendet an alle Teilnehmer des Kanals; `false` wenn nicht zugestellt
    fn send(&self, channel_id: &ChannelId, bytes: &[u8]) -> bool;
}

/// Empfaenger von Floor-Ereignissen
///
/// Alle Methoden haben leere Standard-Implementierungen.
#[allow(unused_variables)]
pub trait FloorEventSink: Send + Sync + 'static {
    fn on_floor_granted(&self, channel_id: &ChannelId) {}
    fn on_floor_denied(&self, channel_id: &ChannelId, reason: &str) {}
    fn on_floor_revoked(&self, channel_id: &ChannelId, reason: &str) {}
    fn on_floor_taken(&self, channel_id: &ChannelId, holder: &FloorHolder) {}
    fn on_floor_released(&self, channel_id: &ChannelId) {}
    fn on_emergency_override(&self, channel_id: &ChannelId, holder: &FloorHolder) {}
    fn on_queue_position_changed(&self, channel_id: &ChannelId, position: usize, total: usize) {}
}

/// Sink ohne Reaktion
#[derive(Debug, Default, Clone, Copy)]
pub struct KeineEreignisse;

impl FloorEventSink for KeineEreignisse {}

/// Entscheidungsinstanz im zentralen Modus
pub trait CentralArbiter: Send + Sync + 'static {
    fn anfrage_weiterleiten(&self, channel_id: &ChannelId, request: &FloorRequest);
}

// ---------------------------------------------------------------------------
// FloorEvent
// ---------------------------------------------------------------------------

/// Floor-Ereignis als Wert (fuer Kanaele und Tests)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FloorEvent {
    Granted {
        channel_id: ChannelId,
    },
    Denied {
        channel_id: ChannelId,
        reason: String,
    },
    Revoked {
        channel_id: ChannelId,
        reason: String,
    },
    Taken {
        channel_id: ChannelId,
        holder: FloorHolder,
    },
    Released {
        channel_id: ChannelId,
    },
    EmergencyOverride {
        channel_id: ChannelId,
        holder: FloorHolder,
    },
    QueuePositionChanged {
        channel_id: ChannelId,
        position: usize,
        total: usize,
    },
}

impl FloorEvent {
    pub fn channel_id(&self) -> &ChannelId {
        match self {
            Self::Granted { channel_id }
            | Self::Denied { channel_id, .. }
            | Self::Revoked { channel_id, .. }
            | Self::Taken { channel_id, .. }
            | Self::Released { channel_id }
            | Self::EmergencyOverride { channel_id, .. }
            | Self::QueuePositionChanged { channel_id, .. } => channel_id,
        }
    }

    /// Stellt das Ereignis an den passenden Sink-Callback zu
    pub fn zustellen(&self, sink: &dyn FloorEventSink) {
        match self {
            Self::Granted { channel_id } => sink.on_floor_granted(channel_id),
            Self::Denied { channel_id, reason } => sink.on_floor_denied(channel_id, reason),
            Self::Revoked { channel_id, reason } => sink.on_floor_revoked(channel_id, reason),
            Self::Taken { channel_id, holder } => sink.on_floor_taken(channel_id, holder),
            Self::Released { channel_id } => sink.on_floor_released(channel_id),
            Self::EmergencyOverride { channel_id, holder } => {
                sink.on_emergency_override(channel_id, holder)
            }
            Self::QueuePositionChanged {
                channel_id,
                position,
                total,
            } => sink.on_queue_position_changed(channel_id, *position, *total),
        }
    }
}

// ---------------------------------------------------------------------------
// KanalEventSink
// ---------------------------------------------------------------------------

/// Leitet alle Ereignisse in einen tokio-mpsc-Kanal weiter
#[derive(Debug, Clone)]
pub struct KanalEventSink {
    tx: mpsc::UnboundedSender<FloorEvent>,
}

impl KanalEventSink {
    /// Erstellt Sink und zugehoerigen Empfaenger
    pub fn neu() -> (Self, mpsc::UnboundedReceiver<FloorEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn weiterleiten(&self, ereignis: FloorEvent) {
        if self.tx.send(ereignis).is_err() {
            tracing::trace!("Ereignis-Empfaenger geschlossen, Ereignis verworfen");
        }
    }
}

impl FloorEventSink for KanalEventSink {
    fn on_floor_granted(&self, channel_id: &ChannelId) {
        self.weiterleiten(FloorEvent::Granted {
            channel_id: *channel_id,
        });
    }

    fn on_floor_denied(&self, channel_id: &ChannelId, reason: &str) {
        self.weiterleiten(FloorEvent::Denied {
            channel_id: *channel_id,
            reason: reason.to_string(),
        });
    }

    fn on_floor_revoked(&self, channel_id: &ChannelId, reason: &str) {
        self.weiterleiten(FloorEvent::Revoked {
            channel_id: *channel_id,
            reason: reason.to_string(),
        });
    }

    fn on_floor_taken(&self, channel_id: &ChannelId, holder: &FloorHolder) {
        self.weiterleiten(FloorEvent::Taken {
            channel_id: *channel_id,
            holder: holder.clone(),
        });
    }

    fn on_floor_released(&self, channel_id: &ChannelId) {
        self.weiterleiten(FloorEvent::Released {
            channel_id: *channel_id,
        });
    }

    fn on_emergency_override(&self, channel_id: &ChannelId, holder: &FloorHolder) {
        self.weiterleiten(FloorEvent::EmergencyOverride {
            channel_id: *channel_id,
            holder: holder.clone(),
        });
    }

    fn on_queue_position_changed(&self, channel_id: &ChannelId, position: usize, total: usize) {
        self.weiterleiten(FloorEvent::QueuePositionChanged {
            channel_id: *channel_id,
            position,
            total,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kanal_sink_leitet_weiter() {
        let (sink, mut rx) = KanalEventSink::neu();
        let kanal = ChannelId::aus_name("C");

        let ereignis = FloorEvent::QueuePositionChanged {
            channel_id: kanal,
            position: 1,
            total: 3,
        };
        ereignis.zustellen(&sink);
        FloorEvent::Released { channel_id: kanal }.zustellen(&sink);

        assert_eq!(rx.try_recv().unwrap(), ereignis);
        assert_eq!(rx.try_recv().unwrap().channel_id(), &kanal);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn geschlossener_empfaenger_ist_kein_fehler() {
        let (sink, rx) = KanalEventSink::neu();
        drop(rx);
        sink.on_floor_granted(&ChannelId::aus_name("C"));
    }
}
