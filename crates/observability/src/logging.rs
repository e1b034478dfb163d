//! Structured Logging Setup via tracing-subscriber
//!
//! Konfigurierbar per Umgebungsvariable:
//! - `SF_LOG_LEVEL`: Log-Level oder EnvFilter-Direktive, Standard: info
//! - `SF_LOG_FORMAT`: Format (text/json), Standard: text
//!
//! Kanal-IDs und Anfrage-IDs laufen als strukturierte Felder
//! (`kanal`, `anfrage_id`) durch alle Floor-Logs.

use anyhow::{anyhow, Result};
use tracing_subscriber::{fmt, EnvFilter};

/// Umgebungsvariable fuer den Log-Level
pub const ENV_LOG_LEVEL: &str = "SF_LOG_LEVEL";

/// Umgebungsvariable fuer das Log-Format
pub const ENV_LOG_FORMAT: &str = "SF_LOG_FORMAT";

/// Initialisiert das Logging-System.
///
/// Umgebungsvariablen haben Vorrang vor den Parametern. Ein ungueltiger
/// Filter faellt auf `info` zurueck. Schlaegt fehl bei unbekanntem Format
/// oder wenn bereits ein globaler Subscriber gesetzt ist.
pub fn logging_initialisieren(level: &str, format: &str) -> Result<()> {
    let filter = EnvFilter::try_from_env(ENV_LOG_LEVEL)
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let format = std::env::var(ENV_LOG_FORMAT).unwrap_or_else(|_| format.to_string());
    if !log_format_gueltig(&format) {
        return Err(anyhow!("Unbekanntes Log-Format '{format}' (erlaubt: text, json)"));
    }

    let ergebnis = match format.as_str() {
        "json" => fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(true)
            .with_current_span(true)
            .try_init(),
        _ => fmt().with_env_filter(filter).with_target(true).try_init(),
    };
    ergebnis.map_err(|e| anyhow!("Logging bereits initialisiert: {e}"))
}

/// Validiert ob ein Log-Level-String gueltig ist.
pub fn log_level_gueltig(level: &str) -> bool {
    matches!(level, "trace" | "debug" | "info" | "warn" | "error")
}

/// Validiert ob ein Log-Format-String gueltig ist.
pub fn log_format_gueltig(format: &str) -> bool {
    matches!(format, "text" | "json")
}
