//! Fehlertypen fuer das Floor-Protokoll
//!
//! Diese Fehler verlassen das Floor-Subsystem nie: der Arbitrator loggt sie
//! und verwirft die Nachricht ohne Zustandsaenderung.

use thiserror::Error;

/// Fehler beim Kodieren, Dekodieren oder Verifizieren einer Nachricht
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Ungueltiges JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Base64-Dekodierung fehlgeschlagen: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Frame ungueltig oder abgeschnitten")]
    UngueltigerFrame,

    #[error("Unbekannter Nachrichtentyp: 0x{0:02X}")]
    UnbekannterTyp(u8),

    #[error("Ungueltige Schluessel-Laenge: erwartet {erwartet}, erhalten {erhalten}")]
    SchluesselLaenge { erwartet: usize, erhalten: usize },

    #[error("Nutzdaten zu gross: {0} Bytes")]
    NutzdatenZuGross(usize),

    #[error("Signierung fehlgeschlagen")]
    Signierung,

    #[error("Signatur fehlt")]
    SignaturFehlt,

    #[error("Signatur ungueltig")]
    SignaturUngueltig,
}

impl ProtocolError {
    /// Kurzer, stabiler Grund fuer Metrik-Labels
    pub fn grund(&self) -> &'static str {
        match self {
            Self::Json(_) | Self::Base64(_) => "malformed",
            Self::UngueltigerFrame | Self::NutzdatenZuGross(_) => "truncated",
            Self::UnbekannterTyp(_) => "unknown_type",
            Self::SchluesselLaenge { .. } => "bad_key",
            Self::Signierung => "sign_failed",
            Self::SignaturFehlt | Self::SignaturUngueltig => "bad_signature",
        }
    }
}

pub type ProtocolResult<T> = Result<T, ProtocolError>;
