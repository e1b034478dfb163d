//! Fehlertypen fuer Sprechfunk
//!
//! Zentraler Fehler-Enum fuer alle Fehler, die bis zum Aufrufer durchgereicht
//! werden. Protokoll- und Authentifizierungsfehler eingehender Nachrichten
//! gehoeren nicht hierher: sie werden geloggt und verworfen.

use thiserror::Error;

/// Globaler Result-Alias fuer Sprechfunk
pub type Result<T> = std::result::Result<T, SprechfunkError>;

/// Alle Fehler, die ein Aufrufer des Floor-Subsystems sehen kann
#[derive(Debug, Error)]
pub enum SprechfunkError {
    // --- Kanal ---
    #[error("Kanal nicht initialisiert: {0}")]
    KanalNichtInitialisiert(String),

    #[error("Kanal im Fehlerzustand: {0}")]
    KanalFehlerzustand(String),

    // --- Protokoll ---
    #[error("Ungueltige Nachricht: {0}")]
    UngueltigeNachricht(String),

    #[error("Signierung fehlgeschlagen")]
    Signierung,

    #[error("Nachricht bereits verarbeitet: {0}")]
    Wiederholung(String),

    // --- Konfiguration ---
    #[error("Konfigurationsfehler: {0}")]
    Konfiguration(String),

    #[error("Zeitlimit ueberschritten: {0}")]
    Zeitlimit(String),

    // --- Intern ---
    #[error("Interner Fehler: {0}")]
    Intern(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl SprechfunkError {
    /// Erstellt einen internen Fehler aus einer beliebigen Nachricht
    pub fn intern(msg: impl Into<String>) -> Self {
        Self::Intern(msg.into())
    }

    /// Gibt true zurueck wenn der Kanal nach dem Fehler ohne Neuinitialisierung weiterlaeuft
    pub fn ist_lokal_behebbar(&self) -> bool {
        !matches!(self, Self::Signierung | Self::KanalFehlerzustand(_))
    }
}
