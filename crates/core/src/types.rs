//! Gemeinsame Identifikationstypen fuer Sprechfunk
//!
//! Kanaele und Teilnehmer werden ueber feste 32-Byte-Kennungen adressiert.
//! Beide verwenden das Newtype-Pattern um Verwechslungen zwischen
//! Kanal-ID und oeffentlichem Schluessel zur Compilezeit auszuschliessen.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Laenge einer Kanal-ID bzw. eines oeffentlichen Schluessels in Bytes
pub const ID_LAENGE: usize = 32;

/// Kopiert beliebige Bytes in ein 32-Byte-Feld (mit Nullen aufgefuellt bzw. abgeschnitten)
fn auf_id_laenge(bytes: &[u8]) -> [u8; ID_LAENGE] {
    let mut buf = [0u8; ID_LAENGE];
    let n = bytes.len().min(ID_LAENGE);
    buf[..n].copy_from_slice(&bytes[..n]);
    buf
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn hex_parsen(text: &str) -> Option<[u8; ID_LAENGE]> {
    if text.len() != ID_LAENGE * 2 || !text.is_ascii() {
        return None;
    }
    let mut buf = [0u8; ID_LAENGE];
    for (i, ziel) in buf.iter_mut().enumerate() {
        *ziel = u8::from_str_radix(&text[i * 2..i * 2 + 2], 16).ok()?;
    }
    Some(buf)
}

/// Opake Kanal-ID (32 Bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChannelId(pub [u8; ID_LAENGE]);

impl ChannelId {
    /// Erstellt eine Kanal-ID aus beliebigen Bytes (Nullen auffuellen / abschneiden)
    pub fn aus_bytes(bytes: &[u8]) -> Self {
        Self(auf_id_laenge(bytes))
    }

    /// Erstellt eine Kanal-ID aus einem Kanalnamen (UTF-8-Bytes)
    pub fn aus_name(name: &str) -> Self {
        Self::aus_bytes(name.as_bytes())
    }

    pub fn as_bytes(&self) -> &[u8; ID_LAENGE] {
        &self.0
    }

    /// Hex-Darstellung aller 32 Bytes
    pub fn to_hex(&self) -> String {
        hex(&self.0)
    }
}

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Kurzform reicht fuer Logs
        write!(f, "kanal:{}", &self.to_hex()[..16])
    }
}

/// Oeffentlicher Schluessel eines Teilnehmers (Ed25519, 32 Bytes)
///
/// Dient gleichzeitig als Identitaet im Floor-Protokoll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerKey(pub [u8; ID_LAENGE]);

impl PeerKey {
    /// Erstellt einen Schluessel aus beliebigen Bytes (Nullen auffuellen / abschneiden)
    pub fn aus_bytes(bytes: &[u8]) -> Self {
        Self(auf_id_laenge(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; ID_LAENGE] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex(&self.0)
    }

    /// Parst die 64-stellige Hex-Darstellung aus `to_hex`
    pub fn aus_hex(text: &str) -> Option<Self> {
        hex_parsen(text).map(Self)
    }

    /// Erste 8 Hex-Zeichen des Schluessels (Praefix der Message-ID)
    pub fn kurz_hex(&self) -> String {
        hex(&self.0[..4])
    }

    /// Deterministischer Identitaets-Hash fuer den letzten Tiebreak
    ///
    /// Erste 8 Bytes von SHA-256 ueber den Schluessel, big-endian gelesen.
    pub fn identitaets_hash(&self) -> u64 {
        let digest = Sha256::digest(self.0);
        let mut erste = [0u8; 8];
        erste.copy_from_slice(&digest[..8]);
        u64::from_be_bytes(erste)
    }
}

impl std::fmt::Display for PeerKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "peer:{}", self.kurz_hex())
    }
}
