//! Signatur-Schnittstellen
//!
//! Das Floor-Protokoll signiert jede ausgehende Nachricht und verifiziert
//! jede eingehende. Die Primitive selbst liefert ein externer Baustein
//! (z.B. `sprechfunk-crypto::Identity`).

use sprechfunk_core::PeerKey;

/// Signiert ausgehende Nachrichten mit dem lokalen Geheimschluessel
pub trait MessageSigner: Send + Sync + 'static {
    /// Oeffentlicher Schluessel der zu dieser Signatur passt
    fn public_key(&self) -> PeerKey;

    /// Signiert `data`; `None` wenn die Signierung fehlschlaegt
    fn sign(&self, data: &[u8]) -> Option<Vec<u8>>;
}

/// Verifiziert Signaturen eingehender Nachrichten
pub trait SignatureVerifier: Send + Sync + 'static {
    fn verify(&self, data: &[u8], signature: &[u8], public_key: &PeerKey) -> bool;
}
