//! Langzeit-Identitaetsschluessel (Ed25519)
//!
//! Jeder Teilnehmer besitzt ein Ed25519-Schluessel-Paar. Der oeffentliche
//! Schluessel ist gleichzeitig seine Identitaet im Floor-Protokoll
//! (`PeerKey`), der private Schluessel signiert alle ausgehenden
//! Floor-Nachrichten.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use sprechfunk_core::PeerKey;
use sprechfunk_protocol::{MessageSigner, SignatureVerifier};

use crate::error::{CryptoError, CryptoResult};

/// Langzeit-Identitaet eines Teilnehmers (Ed25519)
pub struct Identity {
    signing_key: SigningKey,
}

impl Identity {
    /// Generiert ein neues Ed25519-Schluessel-Paar
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        Self { signing_key }
    }

    /// Erstellt eine Identity aus einem privaten Schluessel (32 Bytes)
    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(bytes),
        }
    }

    /// Erstellt eine Identity aus einem Base64-kodierten privaten Schluessel
    pub fn aus_base64(text: &str) -> CryptoResult<Self> {
        let bytes = STANDARD.decode(text.trim())?;
        let array: [u8; 32] =
            bytes
                .as_slice()
                .try_into()
                .map_err(|_| CryptoError::SchluesselLaenge {
                    erwartet: 32,
                    erhalten: bytes.len(),
                })?;
        Ok(Self::from_bytes(&array))
    }

    /// Privater Schluessel als Base64 (fuer Persistenz)
    pub fn als_base64(&self) -> String {
        STANDARD.encode(self.private_key_bytes())
    }

    /// Gibt den privaten Schluessel als Bytes zurueck
    pub fn private_key_bytes(&self) -> [u8; 32] {
        self.signing_key.to_bytes()
    }

    /// Gibt den oeffentlichen Schluessel als Bytes zurueck
    pub fn public_key_bytes(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }

    /// Oeffentlicher Schluessel als Floor-Identitaet
    pub fn peer_key(&self) -> PeerKey {
        PeerKey(self.public_key_bytes())
    }

    /// Signiert Daten mit dem privaten Schluessel (64 Bytes)
    pub fn signieren(&self, data: &[u8]) -> Vec<u8> {
        self.signing_key.sign(data).to_bytes().to_vec()
    }

    /// Verifiziert eine Signatur mit einem oeffentlichen Schluessel
    pub fn verify(data: &[u8], signature_bytes: &[u8], public_key_bytes: &[u8; 32]) -> bool {
        let Ok(verifying_key) = VerifyingKey::from_bytes(public_key_bytes) else {
            return false;
        };
        let Ok(sig_array) = signature_bytes.try_into() else {
            return false;
        };
        let signature = Signature::from_bytes(sig_array);
        verifying_key.verify(data, &signature).is_ok()
    }
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Identity {{ peer: {} }}", self.peer_key())
    }
}

impl MessageSigner for Identity {
    fn public_key(&self) -> PeerKey {
        self.peer_key()
    }

    fn sign(&self, data: &[u8]) -> Option<Vec<u8>> {
        Some(self.signieren(data))
    }
}

// ---------------------------------------------------------------------------
// Ed25519Verifier
// ---------------------------------------------------------------------------

/// Verifiziert Ed25519-Signaturen eingehender Floor-Nachrichten
#[derive(Debug, Clone, Copy, Default)]
pub struct Ed25519Verifier;

impl SignatureVerifier for Ed25519Verifier {
    fn verify(&self, data: &[u8], signature: &[u8], public_key: &PeerKey) -> bool {
        let gueltig = Identity::verify(data, signature, public_key.as_bytes());
        if !gueltig {
            tracing::debug!(peer = %public_key, "Ed25519-Signatur ungueltig");
        }
        gueltig
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use sprechfunk_core::ChannelId;
    use sprechfunk_protocol::{
        envelope_oeffnen, envelope_signieren, felder, frame_oeffnen, frame_signieren,
        signatur_pruefen, MessageType, ProtocolError, ProtocolMessage,
    };

    fn nachricht(identity: &Identity) -> ProtocolMessage {
        ProtocolMessage::neu(
            MessageType::FloorRequest,
            ChannelId::aus_name("einsatz"),
            identity.peer_key(),
            "Alice",
            1,
            1_700_000_000_000,
        )
        .mit_feld(felder::REQUEST_ID, "r-1")
    }

    #[test]
    fn identity_signieren_und_verifizieren() {
        let identity = Identity::generate();
        let data = b"Hallo, Sprechfunk!";

        let signature = identity.signieren(data);
        assert_eq!(signature.len(), 64);
        assert!(Identity::verify(data, &signature, &identity.public_key_bytes()));
    }

    #[test]
    fn falsche_signatur_wird_abgelehnt() {
        let identity = Identity::generate();
        let mut signature = identity.signieren(b"Originaltext");
        signature[0] ^= 0xFF;
        assert!(!Identity::verify(
            b"Originaltext",
            &signature,
            &identity.public_key_bytes()
        ));
        assert!(!Identity::verify(b"Originaltext", &signature[..10], &identity.public_key_bytes()));
    }

    #[test]
    fn verschiedene_keys_ablehnen() {
        let id1 = Identity::generate();
        let id2 = Identity::generate();
        let sig = id1.signieren(b"Testdaten");
        assert!(!Ed25519Verifier.verify(b"Testdaten", &sig, &id2.peer_key()));
    }

    #[test]
    fn base64_roundtrip() {
        let identity = Identity::generate();
        let restored = Identity::aus_base64(&identity.als_base64()).unwrap();
        assert_eq!(restored.peer_key(), identity.peer_key());

        let kurz = STANDARD.encode([1u8; 16]);
        assert!(matches!(
            Identity::aus_base64(&kurz),
            Err(CryptoError::SchluesselLaenge { erhalten: 16, .. })
        ));
    }

    #[test]
    fn envelope_mit_ed25519() {
        let identity = Identity::generate();
        let bytes = envelope_signieren(&nachricht(&identity), &identity).unwrap();
        let msg = envelope_oeffnen(&bytes, &Ed25519Verifier).unwrap();
        assert_eq!(msg.sender_key, identity.peer_key());
        assert_eq!(msg.signature.map(|s| s.len()), Some(64));
    }

    #[test]
    fn frame_mit_ed25519_und_fremdem_schluessel() {
        let identity = Identity::generate();
        let mut msg = nachricht(&identity);
        let bytes = frame_signieren(&msg, &identity).unwrap();
        assert!(frame_oeffnen(&bytes, &Ed25519Verifier).is_ok());

        // Senderschluessel passt nicht zur signierenden Identitaet
        msg.sender_key = Identity::generate().peer_key();
        let bytes = frame_signieren(&msg, &identity).unwrap();
        assert!(matches!(
            frame_oeffnen(&bytes, &Ed25519Verifier),
            Err(ProtocolError::SignaturUngueltig)
        ));
    }

    #[test]
    fn dekodierte_nachricht_nachpruefen() {
        let identity = Identity::generate();

        let bytes = envelope_signieren(&nachricht(&identity), &identity).unwrap();
        let aus_envelope = envelope_oeffnen(&bytes, &Ed25519Verifier).unwrap();
        assert!(signatur_pruefen(&aus_envelope, &Ed25519Verifier).is_ok());

        let bytes = frame_signieren(&nachricht(&identity), &identity).unwrap();
        let aus_frame = frame_oeffnen(&bytes, &Ed25519Verifier).unwrap();
        assert!(signatur_pruefen(&aus_frame, &Ed25519Verifier).is_ok());

        let veraendert = aus_envelope.clone().mit_feld(felder::DURATION_MS, 1);
        assert!(matches!(
            signatur_pruefen(&veraendert, &Ed25519Verifier),
            Err(ProtocolError::SignaturUngueltig)
        ));

        let unsigniert = nachricht(&identity);
        assert!(matches!(
            signatur_pruefen(&unsigniert, &Ed25519Verifier),
            Err(ProtocolError::SignaturFehlt)
        ));
    }
}
