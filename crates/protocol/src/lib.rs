//! sprechfunk-protocol – Floor-Control-Protokoll
//!
//! Dieses Crate definiert die Nachrichtentypen des Floor-Protokolls und
//! ihre beiden Serialisierungen: den selbstbeschreibenden JSON-Envelope und
//! den kompakten Binaer-Frame. Signatur und Verifikation laufen ueber die
//! Traits in [`signing`], damit das Crate keine Kryptografie kennt.

pub mod envelope;
pub mod error;
pub mod frame;
pub mod message;
pub mod signing;
pub mod wire;

pub use envelope::{envelope_oeffnen, envelope_signieren, signatur_bytes};
pub use error::{ProtocolError, ProtocolResult};
pub use frame::{frame_oeffnen, frame_signieren, ist_frame, FloorFrame, FrameFlags};
pub use message::{felder, MessageType, ProtocolMessage};
pub use signing::{MessageSigner, SignatureVerifier};

/// Dekodiert eingehende Bytes im jeweils erkannten Format
///
/// Beginnt der Puffer mit dem Frame-Magic, wird er als Binaer-Frame gelesen,
/// sonst als JSON-Envelope.
pub fn nachricht_oeffnen(
    bytes: &[u8],
    verifier: &dyn SignatureVerifier,
) -> ProtocolResult<ProtocolMessage> {
    if ist_frame(bytes) {
        frame_oeffnen(bytes, verifier)
    } else {
        envelope_oeffnen(bytes, verifier)
    }
}

/// Prueft die Signatur einer bereits dekodierten Nachricht
///
/// Fuer Nachrichten, die nicht ueber [`nachricht_oeffnen`] hereinkommen. Die
/// signierten Bytes werden fuer beide Formate nachgebildet; die Nachricht ist
/// gueltig, wenn eines davon zur Signatur passt.
pub fn signatur_pruefen(
    msg: &ProtocolMessage,
    verifier: &dyn SignatureVerifier,
) -> ProtocolResult<()> {
    let signatur = match &msg.signature {
        Some(signatur) if !signatur.is_empty() => signatur,
        _ => return Err(ProtocolError::SignaturFehlt),
    };

    if verifier.verify(&signatur_bytes(msg)?, signatur, &msg.sender_key) {
        return Ok(());
    }
    let frame = FloorFrame::aus_nachricht(&ProtocolMessage {
        signature: None,
        ..msg.clone()
    })?;
    if verifier.verify(&frame.signierter_bereich(), signatur, &msg.sender_key) {
        return Ok(());
    }
    Err(ProtocolError::SignaturUngueltig)
}
