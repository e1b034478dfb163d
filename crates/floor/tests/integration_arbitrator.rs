//! Integration-Tests: Lebenszyklus und Eingang eines einzelnen Arbitrators

mod gemeinsam;

use gemeinsam::{kanal, ruhen, Netz};
use sprechfunk_core::{ChannelId, PeerKey, SprechfunkError};
use sprechfunk_crypto::{Ed25519Verifier, Identity};
use sprechfunk_floor::{
    FloorArbitrator, FloorConfig, FloorPriority, FloorRequestResult, FloorState, FloorTransport,
    WireFormat,
};
use sprechfunk_observability::FloorMetrics;
use sprechfunk_protocol::frame::MAGIC;
use sprechfunk_protocol::{
    envelope_signieren, felder, ist_frame, nachricht_oeffnen, MessageSigner, MessageType,
    ProtocolMessage,
};
use std::sync::Arc;

struct Stumm;

impl FloorTransport for Stumm {
    fn send(&self, _: &ChannelId, _: &[u8]) -> bool {
        true
    }
}

/// Signer dessen Signierung immer fehlschlaegt
struct KaputterSigner(PeerKey);

impl MessageSigner for KaputterSigner {
    fn public_key(&self) -> PeerKey {
        self.0
    }

    fn sign(&self, _data: &[u8]) -> Option<Vec<u8>> {
        None
    }
}

fn einzeln(config: FloorConfig) -> (FloorArbitrator, FloorMetrics) {
    let metriken = FloorMetrics::neu().unwrap();
    let arbitrator = FloorArbitrator::builder(
        Arc::new(Identity::generate()),
        Arc::new(Ed25519Verifier),
        Arc::new(Stumm),
    )
    .name("Leitstelle")
    .config(config)
    .metrics(metriken.clone())
    .bauen()
    .unwrap();
    (arbitrator, metriken)
}

/// Signiert wie ein entfernter Teilnehmer; liefert Bytes und dekodierte Nachricht
fn signiert(absender: &Identity, msg: ProtocolMessage) -> (Vec<u8>, ProtocolMessage) {
    let bytes = envelope_signieren(&msg, absender).unwrap();
    let geoeffnet = nachricht_oeffnen(&bytes, &Ed25519Verifier).unwrap();
    (bytes, geoeffnet)
}

fn anfrage_von(absender: &Identity, sequenz: u32, request_id: &str) -> ProtocolMessage {
    ProtocolMessage::neu(
        MessageType::FloorRequest,
        kanal(),
        absender.peer_key(),
        "X",
        sequenz,
        0,
    )
    .mit_feld(felder::REQUEST_ID, request_id)
    .mit_feld(felder::LAMPORT, sequenz)
}

#[tokio::test(start_paused = true)]
async fn wiederholte_nachricht_wird_verworfen() {
    let netz = Netz::neu();
    let a = netz.teilnehmer("A", FloorConfig::default());
    let (c, metriken) = einzeln(FloorConfig::default());
    c.init_channel(&kanal());

    let anfrage = tokio::spawn({
        let arb = a.arbitrator.clone();
        async move { arb.request_floor(&kanal(), FloorPriority::Normal, false).await }
    });
    ruhen().await;
    let paket = netz.mitschnitt().remove(0);

    assert!(c.handle_incoming(&paket));
    assert!(!c.handle_incoming(&paket));
    assert_eq!(
        metriken
            .messages_dropped_total
            .with_label_values(&["replay"])
            .get(),
        1
    );
    assert!(c.lamport() >= 2);
    anfrage.abort();
}

#[tokio::test(start_paused = true)]
async fn binaer_frame_wird_verarbeitet_und_manipulation_erkannt() {
    let binaer = FloorConfig {
        wire_format: WireFormat::Binary,
        ..FloorConfig::default()
    };
    let netz = Netz::neu();
    let a = netz.teilnehmer("A", binaer);
    let (c, metriken) = einzeln(FloorConfig::default());
    c.init_channel(&kanal());

    let anfrage = tokio::spawn({
        let arb = a.arbitrator.clone();
        async move { arb.request_floor(&kanal(), FloorPriority::Normal, false).await }
    });
    ruhen().await;
    let paket = netz.mitschnitt().remove(0);
    assert!(ist_frame(&paket));

    let mut manipuliert = paket.clone();
    let letztes = manipuliert.len() - 1;
    manipuliert[letztes] ^= 0xFF;
    assert!(!c.handle_incoming(&manipuliert));
    assert_eq!(
        metriken
            .messages_dropped_total
            .with_label_values(&["bad_signature"])
            .get(),
        1
    );

    assert!(c.handle_incoming(&paket));
    let zustand = c.floor_state(&kanal()).unwrap();
    assert_eq!(zustand.state, FloorState::Taken);
    assert_eq!(zustand.holder.unwrap().public_key, a.key);
    anfrage.abort();
}

#[tokio::test]
async fn muell_wird_verworfen() {
    let (c, metriken) = einzeln(FloorConfig::default());
    c.init_channel(&kanal());

    assert!(!c.handle_incoming(b"kein json"));
    let mut abgeschnitten = MAGIC.to_vec();
    abgeschnitten.push(0x01);
    assert!(!c.handle_incoming(&abgeschnitten));
    assert_eq!(
        metriken
            .messages_dropped_total
            .with_label_values(&["malformed"])
            .get(),
        1
    );
    assert_eq!(
        metriken
            .messages_dropped_total
            .with_label_values(&["truncated"])
            .get(),
        1
    );
}

#[tokio::test]
async fn unbekannter_kanal() {
    let (c, _) = einzeln(FloorConfig::default());
    let fremd = ChannelId::aus_name("gibt-es-nicht");

    assert!(matches!(
        c.request_floor(&fremd, FloorPriority::Normal, false).await,
        FloorRequestResult::Error { .. }
    ));
    assert!(!c.release_floor(&fremd));
    assert!(!c.cancel_request(&fremd));
    assert!(c.floor_state(&fremd).is_none());
    assert!(matches!(
        c.subscribe(&fremd),
        Err(SprechfunkError::KanalNichtInitialisiert(_))
    ));
}

#[tokio::test]
async fn explizite_eingaenge_pruefen_typ_und_kanal() {
    let (c, _) = einzeln(FloorConfig::default());
    let k = kanal();
    c.init_channel(&k);
    let sprecher = Identity::generate();
    let sender = sprecher.peer_key();

    let (_, erteilung) = signiert(
        &sprecher,
        ProtocolMessage::neu(MessageType::FloorGranted, k, sender, "X", 1, 0)
            .mit_feld(felder::HOLDER_KEY, sender.to_hex())
            .mit_feld(felder::REQUEST_ID, "r-1"),
    );

    assert!(matches!(
        c.handle_floor_request(&erteilung),
        Err(SprechfunkError::UngueltigeNachricht(_))
    ));

    let mut anderswo = erteilung.clone();
    anderswo.channel_id = ChannelId::aus_name("anderswo");
    assert!(matches!(
        c.handle_floor_granted(&anderswo),
        Err(SprechfunkError::KanalNichtInitialisiert(_))
    ));

    c.handle_floor_granted(&erteilung).unwrap();
    let zustand = c.floor_state(&k).unwrap();
    assert_eq!(zustand.state, FloorState::Taken);
    assert_eq!(zustand.holder.unwrap().public_key, sender);

    let (_, freigabe) = signiert(
        &sprecher,
        ProtocolMessage::neu(MessageType::FloorIdle, k, sender, "X", 2, 0),
    );
    c.handle_floor_released(&freigabe).unwrap();
    assert_eq!(c.floor_state(&k).unwrap().state, FloorState::Idle);
}

#[tokio::test]
async fn wiederholung_wirkt_ueber_beide_eingaenge_nur_einmal() {
    let (c, metriken) = einzeln(FloorConfig::default());
    let k = kanal();
    c.init_channel(&k);
    let x = Identity::generate();

    let (bytes, anfrage) = signiert(&x, anfrage_von(&x, 1, "r-x"));
    assert!(c.handle_incoming(&bytes));
    assert!(!c.handle_incoming(&bytes));
    assert!(matches!(
        c.handle_floor_request(&anfrage),
        Err(SprechfunkError::Wiederholung(_))
    ));

    assert_eq!(metriken.grants_total.get(), 1);
    assert_eq!(
        metriken
            .messages_dropped_total
            .with_label_values(&["replay"])
            .get(),
        2
    );
    let zustand = c.floor_state(&k).unwrap();
    assert_eq!(zustand.state, FloorState::Taken);
    assert_eq!(zustand.queue_size, 0);

    // Umgekehrte Reihenfolge: erst expliziter Eingang, dann Rohbytes
    let (bytes, anfrage) = signiert(&x, anfrage_von(&x, 2, "r-x2"));
    c.handle_floor_request(&anfrage).unwrap();
    assert!(!c.handle_incoming(&bytes));
}

#[tokio::test]
async fn unsignierte_oder_manipulierte_freigabe_wird_ignoriert() {
    let (c, metriken) = einzeln(FloorConfig::default());
    let k = kanal();
    c.init_channel(&k);
    let x = Identity::generate();
    let (bytes, _) = signiert(&x, anfrage_von(&x, 1, "r-x"));
    assert!(c.handle_incoming(&bytes));
    assert_eq!(c.floor_state(&k).unwrap().state, FloorState::Taken);

    let unsigniert = ProtocolMessage::neu(MessageType::FloorRelease, k, x.peer_key(), "X", 2, 0);
    assert!(matches!(
        c.handle_floor_released(&unsigniert),
        Err(SprechfunkError::UngueltigeNachricht(_))
    ));

    let (_, mut manipuliert) = signiert(
        &x,
        ProtocolMessage::neu(MessageType::FloorRelease, k, x.peer_key(), "X", 3, 0),
    );
    manipuliert.sequence = 4;
    assert!(matches!(
        c.handle_floor_released(&manipuliert),
        Err(SprechfunkError::UngueltigeNachricht(_))
    ));

    // Von einem Dritten signiert, aber mit dem Schluessel des Sprechers
    let dritter = Identity::generate();
    let (_, mut untergeschoben) = signiert(
        &dritter,
        ProtocolMessage::neu(MessageType::FloorRelease, k, dritter.peer_key(), "X", 5, 0),
    );
    untergeschoben.sender_key = x.peer_key();
    assert!(matches!(
        c.handle_floor_released(&untergeschoben),
        Err(SprechfunkError::UngueltigeNachricht(_))
    ));

    let zustand = c.floor_state(&k).unwrap();
    assert_eq!(zustand.state, FloorState::Taken);
    assert_eq!(zustand.holder.unwrap().public_key, x.peer_key());
    assert_eq!(
        metriken
            .messages_dropped_total
            .with_label_values(&["bad_signature"])
            .get(),
        3
    );

    let (_, echt) = signiert(
        &x,
        ProtocolMessage::neu(MessageType::FloorRelease, k, x.peer_key(), "X", 6, 0),
    );
    c.handle_floor_released(&echt).unwrap();
    assert_eq!(c.floor_state(&k).unwrap().state, FloorState::Idle);
}

#[tokio::test]
async fn ueberlange_sprechdauer_wird_auf_standard_begrenzt() {
    let (c, _) = einzeln(FloorConfig::default());
    let k = kanal();
    c.init_channel(&k);
    let x = Identity::generate();

    let (_, anfrage) = signiert(
        &x,
        anfrage_von(&x, 1, "r-lang").mit_feld(felder::DURATION_MS, u64::MAX),
    );
    c.handle_floor_request(&anfrage).unwrap();

    let inhaber = c.floor_state(&k).unwrap().holder.unwrap();
    assert_eq!(inhaber.public_key, x.peer_key());
    assert_eq!(
        inhaber.expires_at - inhaber.granted_at,
        c.config().default_floor_duration_ms as i64
    );
}

#[tokio::test(start_paused = true)]
async fn subscribe_meldet_zustandswechsel() {
    let (c, _) = einzeln(FloorConfig::default());
    let k = kanal();
    c.init_channel(&k);
    let mut rx = c.subscribe(&k).unwrap();
    assert_eq!(rx.borrow().state, FloorState::Idle);

    let ergebnis = c.request_floor(&k, FloorPriority::Normal, false).await;
    assert!(ergebnis.ist_erteilt());

    rx.changed().await.unwrap();
    let zustand = rx.borrow_and_update().clone();
    assert_eq!(zustand.state, FloorState::Granted);
    assert!(zustand.holder.is_some());
    assert!(zustand.my_request.is_none());
}

#[tokio::test(start_paused = true)]
async fn freigabe_ist_idempotent() {
    let (c, _) = einzeln(FloorConfig::default());
    let k = kanal();
    c.init_channel(&k);

    assert!(!c.release_floor(&k));
    assert!(c
        .request_floor(&k, FloorPriority::Normal, false)
        .await
        .ist_erteilt());
    assert!(c.release_floor(&k));
    assert!(!c.release_floor(&k));
    assert_eq!(c.floor_state(&k).unwrap().state, FloorState::Idle);
}

#[tokio::test(start_paused = true)]
async fn signierfehler_fuehrt_in_fehlerzustand() {
    let arbitrator = FloorArbitrator::builder(
        Arc::new(KaputterSigner(PeerKey([7; 32]))),
        Arc::new(Ed25519Verifier),
        Arc::new(Stumm),
    )
    .bauen()
    .unwrap();
    let k = kanal();
    arbitrator.init_channel(&k);

    let ergebnis = arbitrator
        .request_floor(&k, FloorPriority::Normal, false)
        .await;
    assert!(matches!(ergebnis, FloorRequestResult::Error { .. }));
    assert_eq!(arbitrator.floor_state(&k).unwrap().state, FloorState::Error);

    // Solange der Fehler besteht, wird sofort abgelehnt
    assert!(matches!(
        arbitrator
            .request_floor(&k, FloorPriority::Normal, false)
            .await,
        FloorRequestResult::Error { .. }
    ));

    arbitrator.init_channel(&k);
    assert_eq!(arbitrator.floor_state(&k).unwrap().state, FloorState::Idle);
}

#[tokio::test(start_paused = true)]
async fn aufraeumen_beendet_wartende_anfrage() {
    let (c, metriken) = einzeln(FloorConfig::default());
    let k = kanal();
    let zweiter = ChannelId::aus_name("Funkkreis-Sued");
    c.init_channel(&k);
    c.init_channel(&zweiter);
    c.init_channel(&k);
    assert_eq!(metriken.channels_active.get(), 2);

    let anfrage = tokio::spawn({
        let c = c.clone();
        async move { c.request_floor(&kanal(), FloorPriority::Normal, false).await }
    });
    ruhen().await;
    assert_eq!(
        c.floor_state(&k).unwrap().state,
        FloorState::PendingRequest
    );

    c.cleanup_channel(&k);
    assert!(matches!(
        anfrage.await.unwrap(),
        FloorRequestResult::Error { .. }
    ));
    assert!(c.floor_state(&k).is_none());

    c.cleanup();
    assert_eq!(c.kanal_anzahl(), 0);
    assert_eq!(metriken.channels_active.get(), 0);
}

#[test]
fn ungueltige_konfiguration_wird_abgelehnt() {
    let ergebnis = FloorArbitrator::builder(
        Arc::new(Identity::generate()),
        Arc::new(Ed25519Verifier),
        Arc::new(Stumm),
    )
    .config(FloorConfig {
        request_timeout_ms: 0,
        ..FloorConfig::default()
    })
    .bauen();
    assert!(matches!(ergebnis, Err(SprechfunkError::Konfiguration(_))));
}
