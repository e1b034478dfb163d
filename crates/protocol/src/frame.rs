//! Binaer-Frame (Low-Latency-Form)
//!
//! Direkte Byte-Serialisierung, kein serde im Header (Performance-kritisch).
//!
//! ## Frame-Format
//!
//! ```text
//! Offset  Len  Beschreibung
//! ------  ---  -----------
//!  0       2   Magic 0x4D 0x52 ("MR")
//!  2       1   Version (= 1)
//!  3       1   Nachrichtentyp
//!  4       1   Flags (bit0 verschluesselt, bit1 komprimiert, bit2 Notfall)
//!  5       3   reserviert
//!  8       4   Sequenz (big-endian)
//! 12       4   Zeitstempel (big-endian, Unix-Sekunden mod 2^32)
//! 16      32   Kanal-ID (mit Nullen aufgefuellt / abgeschnitten)
//! 48      32   Senderschluessel
//! 80       2   Nutzdaten-Laenge (big-endian)
//! 82       N   Nutzdaten (JSON der Nutzdaten-Map)
//! 82+N    64   Signatur ueber alle vorhergehenden Bytes
//! ```

use sprechfunk_core::{ChannelId, PeerKey, ID_LAENGE};
use std::collections::BTreeMap;

use crate::error::{ProtocolError, ProtocolResult};
use crate::message::{felder, MessageType, ProtocolMessage};
use crate::signing::{MessageSigner, SignatureVerifier};

/// Magic-Bytes am Frame-Anfang
pub const MAGIC: [u8; 2] = [0x4D, 0x52];

/// Aktuelle Frame-Version
pub const FRAME_VERSION: u8 = 1;

/// Header-Groesse in Bytes
pub const HEADER_GROESSE: usize = 16;

/// Laenge der Signatur am Frame-Ende
pub const SIGNATUR_LAENGE: usize = 64;

/// Offset des Nutzdaten-Laengenfelds
pub const LAENGEN_OFFSET: usize = HEADER_GROESSE + 2 * ID_LAENGE;

/// Kleinster gueltiger Frame (leere Nutzdaten)
pub const MIN_FRAME_GROESSE: usize = LAENGEN_OFFSET + 2 + SIGNATUR_LAENGE;

// ---------------------------------------------------------------------------
// Flags
// ---------------------------------------------------------------------------

/// Bit-Masken fuer das Flags-Byte im Frame-Header
pub struct FrameFlags;

impl FrameFlags {
    pub const ENCRYPTED: u8 = 0x01;
    pub const COMPRESSED: u8 = 0x02;
    pub const EMERGENCY: u8 = 0x04;
}

// ---------------------------------------------------------------------------
// FloorFrame
// ---------------------------------------------------------------------------

/// Vollstaendiger Binaer-Frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FloorFrame {
    pub message_type: MessageType,
    /// Flags-Bitmask (siehe `FrameFlags`)
    pub flags: u8,
    pub sequence: u32,
    /// Unix-Sekunden mod 2^32
    pub timestamp: u32,
    pub channel_id: ChannelId,
    pub sender_key: PeerKey,
    pub payload: Vec<u8>,
    pub signature: [u8; SIGNATUR_LAENGE],
}

impl FloorFrame {
    /// Gesamtgroesse des Frames in Bytes
    pub fn groesse(&self) -> usize {
        MIN_FRAME_GROESSE + self.payload.len()
    }

    /// Prueft ob ein bestimmtes Flag gesetzt ist
    pub fn hat_flag(&self, flag: u8) -> bool {
        self.flags & flag != 0
    }

    /// Serialisiert alles ausser der Signatur (= signierter Bereich)
    pub fn signierter_bereich(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.groesse());
        buf.extend_from_slice(&MAGIC);
        buf.push(FRAME_VERSION);
        buf.push(self.message_type.code());
        buf.push(self.flags);
        buf.extend_from_slice(&[0u8; 3]);
        buf.extend_from_slice(&self.sequence.to_be_bytes());
        buf.extend_from_slice(&self.timestamp.to_be_bytes());
        buf.extend_from_slice(self.channel_id.as_bytes());
        buf.extend_from_slice(self.sender_key.as_bytes());
        // Laenge wird beim Erstellen auf u16 begrenzt
        buf.extend_from_slice(&(self.payload.len() as u16).to_be_bytes());
        buf.extend_from_slice(&self.payload);
        buf
    }

    /// Serialisiert den gesamten Frame inkl. Signatur
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = self.signierter_bereich();
        buf.extend_from_slice(&self.signature);
        buf
    }

    /// Deserialisiert einen Frame
    ///
    /// Gibt `None` zurueck bei zu kurzem Puffer, falschem Magic oder falscher
    /// Version, unbekanntem Typ-Code oder einer Nutzdaten-Laenge, die ueber
    /// das Pufferende hinausreichen wuerde.
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < MIN_FRAME_GROESSE {
            return None;
        }
        if buf[0..2] != MAGIC || buf[2] != FRAME_VERSION {
            return None;
        }
        let message_type = MessageType::from_u8(buf[3])?;
        let flags = buf[4];
        let sequence = u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]);
        let timestamp = u32::from_be_bytes([buf[12], buf[13], buf[14], buf[15]]);
        let channel_id = ChannelId::aus_bytes(&buf[HEADER_GROESSE..HEADER_GROESSE + ID_LAENGE]);
        let sender_key = PeerKey::aus_bytes(&buf[HEADER_GROESSE + ID_LAENGE..LAENGEN_OFFSET]);

        let laenge = u16::from_be_bytes([buf[LAENGEN_OFFSET], buf[LAENGEN_OFFSET + 1]]) as usize;
        let nutzdaten_start = LAENGEN_OFFSET + 2;
        let signatur_start = nutzdaten_start + laenge;
        if signatur_start + SIGNATUR_LAENGE > buf.len() {
            return None;
        }

        let mut signature = [0u8; SIGNATUR_LAENGE];
        signature.copy_from_slice(&buf[signatur_start..signatur_start + SIGNATUR_LAENGE]);

        Some(Self {
            message_type,
            flags,
            sequence,
            timestamp,
            channel_id,
            sender_key,
            payload: buf[nutzdaten_start..signatur_start].to_vec(),
            signature,
        })
    }

    /// Baut einen Frame aus einer Nachricht
    ///
    /// Der Absendername wird unter `senderName` in die Nutzdaten gelegt; der
    /// Zeitstempel wird auf Sekunden gekuerzt. Eine vorhandene Signatur wird
    /// uebernommen (sonst Nullen).
    pub fn aus_nachricht(msg: &ProtocolMessage) -> ProtocolResult<Self> {
        let mut nutzdaten = msg.payload.clone();
        if !msg.sender_name.is_empty() {
            nutzdaten.insert(felder::SENDER_NAME.to_string(), msg.sender_name.clone());
        }
        let payload = serde_json::to_vec(&nutzdaten)?;
        if payload.len() > u16::MAX as usize {
            return Err(ProtocolError::NutzdatenZuGross(payload.len()));
        }

        let mut signature = [0u8; SIGNATUR_LAENGE];
        if let Some(sig) = &msg.signature {
            if sig.len() != SIGNATUR_LAENGE {
                return Err(ProtocolError::SignaturUngueltig);
            }
            signature.copy_from_slice(sig);
        }

        let flags = if msg.ist_notfall() {
            FrameFlags::EMERGENCY
        } else {
            0
        };

        Ok(Self {
            message_type: msg.message_type,
            flags,
            sequence: msg.sequence,
            timestamp: (msg.timestamp.div_euclid(1000) as u64 & 0xFFFF_FFFF) as u32,
            channel_id: msg.channel_id,
            sender_key: msg.sender_key,
            payload,
            signature,
        })
    }

    /// Wandelt den Frame zurueck in eine Nachricht (Zeitstempel in Millisekunden)
    pub fn in_nachricht(&self) -> ProtocolResult<ProtocolMessage> {
        let mut payload: BTreeMap<String, String> = if self.payload.is_empty() {
            BTreeMap::new()
        } else {
            serde_json::from_slice(&self.payload)?
        };
        let sender_name = payload.remove(felder::SENDER_NAME).unwrap_or_default();

        Ok(ProtocolMessage {
            message_type: self.message_type,
            channel_id: self.channel_id,
            sender_key: self.sender_key,
            sender_name,
            sequence: self.sequence,
            timestamp: i64::from(self.timestamp) * 1000,
            payload,
            signature: Some(self.signature.to_vec()),
        })
    }
}

/// Signiert die Nachricht und serialisiert sie als Binaer-Frame
pub fn frame_signieren(
    msg: &ProtocolMessage,
    signer: &dyn MessageSigner,
) -> ProtocolResult<Vec<u8>> {
    let mut frame = FloorFrame::aus_nachricht(&ProtocolMessage {
        signature: None,
        ..msg.clone()
    })?;
    let signatur = signer
        .sign(&frame.signierter_bereich())
        .ok_or(ProtocolError::Signierung)?;
    if signatur.len() != SIGNATUR_LAENGE {
        return Err(ProtocolError::Signierung);
    }
    frame.signature.copy_from_slice(&signatur);
    Ok(frame.encode())
}

/// Dekodiert einen Frame, verifiziert die Signatur und extrahiert die Nachricht
pub fn frame_oeffnen(
    bytes: &[u8],
    verifier: &dyn SignatureVerifier,
) -> ProtocolResult<ProtocolMessage> {
    let frame = FloorFrame::decode(bytes).ok_or(ProtocolError::UngueltigerFrame)?;
    if !verifier.verify(&frame.signierter_bereich(), &frame.signature, &frame.sender_key) {
        return Err(ProtocolError::SignaturUngueltig);
    }
    frame.in_nachricht()
}

/// Erkennt an den ersten Bytes ob ein Binaer-Frame vorliegt
pub fn ist_frame(bytes: &[u8]) -> bool {
    bytes.len() >= 2 && bytes[0..2] == MAGIC
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
