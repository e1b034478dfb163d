//! JSON-Envelope (selbstbeschreibende Form)
//!
//! ## Format
//!
//! ```text
//! {
//!   "message": { "type", "channelId" (Base64), "senderKey" (Base64),
//!                "senderName", "sequence", "timestamp", "payload" },
//!   "signature": "<Base64>"
//! }
//! ```
//!
//! Die Signatur deckt exakt die serialisierten Bytes des `message`-Objekts ab.
//! Beim Oeffnen werden diese Bytes aus dem geparsten Objekt neu berechnet und
//! gegen die Signatur geprueft.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use sprechfunk_core::{ChannelId, PeerKey, ID_LAENGE};
use std::collections::BTreeMap;

use crate::error::{ProtocolError, ProtocolResult};
use crate::message::{MessageType, ProtocolMessage};
use crate::signing::{MessageSigner, SignatureVerifier};

/// Signierter Teil des Envelopes
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EnvelopeNachricht {
    #[serde(rename = "type")]
    message_type: MessageType,
    channel_id: String,
    sender_key: String,
    sender_name: String,
    sequence: u32,
    timestamp: i64,
    payload: BTreeMap<String, String>,
}

impl EnvelopeNachricht {
    fn aus(msg: &ProtocolMessage) -> Self {
        Self {
            message_type: msg.message_type,
            channel_id: STANDARD.encode(msg.channel_id.as_bytes()),
            sender_key: STANDARD.encode(msg.sender_key.as_bytes()),
            sender_name: msg.sender_name.clone(),
            sequence: msg.sequence,
            timestamp: msg.timestamp,
            payload: msg.payload.clone(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    message: EnvelopeNachricht,
    signature: String,
}

/// Bytes ueber die die Envelope-Signatur gebildet wird
pub fn signatur_bytes(msg: &ProtocolMessage) -> ProtocolResult<Vec<u8>> {
    Ok(serde_json::to_vec(&EnvelopeNachricht::aus(msg))?)
}

/// Signiert die Nachricht und verpackt sie als JSON-Envelope
pub fn envelope_signieren(
    msg: &ProtocolMessage,
    signer: &dyn MessageSigner,
) -> ProtocolResult<Vec<u8>> {
    let nachricht = EnvelopeNachricht::aus(msg);
    let bytes = serde_json::to_vec(&nachricht)?;
    let signatur = signer.sign(&bytes).ok_or(ProtocolError::Signierung)?;

    let envelope = Envelope {
        message: nachricht,
        signature: STANDARD.encode(signatur),
    };
    Ok(serde_json::to_vec(&envelope)?)
}

/// Parst einen Envelope, verifiziert die Signatur und extrahiert die Nachricht
///
/// # Fehler
/// - Ungueltiges JSON, unbekannter Typ-Code, ungueltiges Base64
/// - Senderschluessel nicht genau 32 Bytes
/// - Signatur fehlt oder passt nicht
pub fn envelope_oeffnen(
    bytes: &[u8],
    verifier: &dyn SignatureVerifier,
) -> ProtocolResult<ProtocolMessage> {
    let envelope: Envelope = serde_json::from_slice(bytes)?;

    let key_bytes = STANDARD.decode(&envelope.message.sender_key)?;
    if key_bytes.len() != ID_LAENGE {
        return Err(ProtocolError::SchluesselLaenge {
            erwartet: ID_LAENGE,
            erhalten: key_bytes.len(),
        });
    }
    let sender_key = PeerKey::aus_bytes(&key_bytes);
    let channel_id = ChannelId::aus_bytes(&STANDARD.decode(&envelope.message.channel_id)?);

    if envelope.signature.is_empty() {
        return Err(ProtocolError::SignaturFehlt);
    }
    let signatur = STANDARD.decode(&envelope.signature)?;

    let signiert = serde_json::to_vec(&envelope.message)?;
    if !verifier.verify(&signiert, &signatur, &sender_key) {
        return Err(ProtocolError::SignaturUngueltig);
    }

    let m = envelope.message;
    Ok(ProtocolMessage {
        message_type: m.message_type,
        channel_id,
        sender_key,
        sender_name: m.sender_name,
        sequence: m.sequence,
        timestamp: m.timestamp,
        payload: m.payload,
        signature: Some(signatur),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
