//! # sprechfunk-crypto
//!
//! Signaturen fuer das Floor-Protokoll.
//!
//! ## Module
//! - `identity` - Ed25519 Langzeit-Identitaet und Verifikation
//! - `error` - Fehlertypen

pub mod error;
pub mod identity;

pub use error::{CryptoError, CryptoResult};
pub use identity::{Ed25519Verifier, Identity};
