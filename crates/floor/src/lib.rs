//! sprechfunk-floor – Verteilte Floor-Control fuer Push-to-Talk
//!
//! Entscheidet pro Kanal, welcher Teilnehmer sprechen darf. Es gibt keinen
//! zentralen Server: jeder Teilnehmer fuehrt einen eigenen Zustandsautomaten,
//! Kollisionen loest eine Gesamtordnung aus Prioritaet, Lamport-Zeit und
//! Identitaets-Hash.
//!
//! ## Beispiel
//!
//! ```ignore
//! let arbitrator = FloorArbitrator::builder(signer, verifier, transport)
//!     .name("Funker-1")
//!     .config(FloorConfig::laden("floor.toml")?)
//!     .bauen()?;
//! arbitrator.init_channel(&kanal);
//! match arbitrator.request_floor(&kanal, FloorPriority::Normal, false).await {
//!     FloorRequestResult::Granted { .. } => { /* senden */ }
//!     andere => tracing::info!(?andere, "Kein Sprechrecht"),
//! }
//! ```

pub mod arbitrator;
pub mod clock;
pub mod config;
pub mod events;
pub mod machine;
pub mod queue;
pub mod replay;
pub mod request;
pub mod state;
pub mod timer;

pub use arbitrator::{FloorArbitrator, FloorArbitratorBuilder};
pub use clock::LamportClock;
pub use config::{ArbitrationMode, FloorConfig, WireFormat};
pub use events::{
    CentralArbiter, FloorEvent, FloorEventSink, FloorTransport, KanalEventSink, KeineEreignisse,
};
pub use queue::{RequestQueue, MAX_QUEUE_SIZE};
pub use replay::{ReplayCache, REPLAY_TTL};
pub use request::{FloorHolder, FloorPriority, FloorRequest};
pub use state::{gruende, ChannelFloorState, FloorRequestResult, FloorState};
