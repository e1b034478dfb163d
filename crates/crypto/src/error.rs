//! Fehler beim Laden von Identitaetsschluesseln

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    /// Privater Ed25519-Schluessel mit falscher Laenge
    #[error("Privater Schluessel hat {erhalten} statt {erwartet} Bytes")]
    SchluesselLaenge { erwartet: usize, erhalten: usize },

    #[error("Schluessel ist kein gueltiges Base64: {0}")]
    Base64(#[from] base64::DecodeError),
}

pub type CryptoResult<T> = Result<T, CryptoError>;
