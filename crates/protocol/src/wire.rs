//! Stream-Transport fuer Binaer-Frames
//!
//! Auf Byte-Streams (TCP, Unix-Sockets) sind Frames selbstbegrenzend: das
//! Nutzdaten-Laengenfeld bei Offset 80 bestimmt die Gesamtgroesse
//! `146 + N`. Ein zusaetzliches Laengenpraefix ist nicht noetig.
//!
//! Datagramm-Transporte (UDP, Mesh) verwenden direkt `FloorFrame::decode`.

use bytes::BytesMut;
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::codec::{Decoder, Encoder};

use crate::frame::{FloorFrame, LAENGEN_OFFSET, MAGIC, MIN_FRAME_GROESSE};

// ---------------------------------------------------------------------------
// Konstanten
// ---------------------------------------------------------------------------

/// Standard-Maximum fuer Nutzdaten (8 KB reichen fuer jede Floor-Nachricht)
pub const DEFAULT_MAX_NUTZDATEN: usize = 8 * 1024;

/// Bytes bis einschliesslich Laengenfeld
const KOPF_MIT_LAENGE: usize = LAENGEN_OFFSET + 2;

fn ungueltig(text: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, text)
}

/// Prueft Magic und Nutzdaten-Laenge eines Frame-Kopfes
fn kopf_pruefen(kopf: &[u8], max_nutzdaten: usize) -> io::Result<usize> {
    if kopf[0..2] != MAGIC {
        return Err(ungueltig(format!(
            "Falsches Magic: {:02X} {:02X}",
            kopf[0], kopf[1]
        )));
    }
    let laenge = u16::from_be_bytes([kopf[LAENGEN_OFFSET], kopf[LAENGEN_OFFSET + 1]]) as usize;
    if laenge > max_nutzdaten {
        return Err(ungueltig(format!(
            "Nutzdaten zu gross: {} Bytes (Maximum: {} Bytes)",
            laenge, max_nutzdaten
        )));
    }
    Ok(laenge)
}

// ---------------------------------------------------------------------------
// FrameCodec
// ---------------------------------------------------------------------------

/// tokio-util Codec fuer Floor-Frames auf Byte-Streams
///
/// ```rust,no_run
/// use tokio_util::codec::Framed;
/// use sprechfunk_protocol::wire::FrameCodec;
///
/// // let stream = TcpStream::connect(...).await?;
/// // let framed = Framed::new(stream, FrameCodec::new());
/// ```
#[derive(Debug, Clone)]
pub struct FrameCodec {
    max_nutzdaten: usize,
}

impl FrameCodec {
    pub fn new() -> Self {
        Self {
            max_nutzdaten: DEFAULT_MAX_NUTZDATEN,
        }
    }

    /// Codec mit eigenem Nutzdaten-Limit
    pub fn with_max_size(max_nutzdaten: usize) -> Self {
        Self { max_nutzdaten }
    }

    pub fn max_nutzdaten(&self) -> usize {
        self.max_nutzdaten
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for FrameCodec {
    type Item = FloorFrame;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < KOPF_MIT_LAENGE {
            return Ok(None);
        }

        let laenge = kopf_pruefen(&src[..KOPF_MIT_LAENGE], self.max_nutzdaten)?;

        let gesamt = MIN_FRAME_GROESSE + laenge;
        if src.len() < gesamt {
            src.reserve(gesamt - src.len());
            return Ok(None);
        }

        let bytes = src.split_to(gesamt);
        FloorFrame::decode(&bytes)
            .map(Some)
            .ok_or_else(|| ungueltig("Frame nicht dekodierbar".to_string()))
    }
}

impl Encoder<FloorFrame> for FrameCodec {
    type Error = io::Error;

    fn encode(&mut self, item: FloorFrame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if item.payload.len() > self.max_nutzdaten {
            return Err(ungueltig(format!(
                "Nutzdaten zu gross: {} Bytes (Maximum: {} Bytes)",
                item.payload.len(),
                self.max_nutzdaten
            )));
        }
        dst.extend_from_slice(&item.encode());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Hilfsfunktionen fuer direktes async Lesen/Schreiben
// ---------------------------------------------------------------------------

/// Liest einen einzelnen Frame aus einem `AsyncRead`
///
/// # Fehler
/// - `UnexpectedEof` wenn der Stream vor Frame-Ende endet
/// - `InvalidData` bei falschem Magic, unbekanntem Typ oder zu grossen Nutzdaten
pub async fn read_frame<R>(reader: &mut R, max_nutzdaten: usize) -> io::Result<FloorFrame>
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; KOPF_MIT_LAENGE];
    reader.read_exact(&mut buf).await?;
    let laenge = kopf_pruefen(&buf, max_nutzdaten)?;

    buf.resize(MIN_FRAME_GROESSE + laenge, 0);
    reader.read_exact(&mut buf[KOPF_MIT_LAENGE..]).await?;

    FloorFrame::decode(&buf).ok_or_else(|| ungueltig("Frame nicht dekodierbar".to_string()))
}

/// Schreibt einen einzelnen Frame in einen `AsyncWrite`
pub async fn write_frame<W>(
    writer: &mut W,
    frame: &FloorFrame,
    max_nutzdaten: usize,
) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    if frame.payload.len() > max_nutzdaten {
        return Err(ungueltig(format!(
            "Nutzdaten zu gross: {} Bytes (Maximum: {} Bytes)",
            frame.payload.len(),
            max_nutzdaten
        )));
    }
    writer.write_all(&frame.encode()).await
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::SIGNATUR_LAENGE;
    use crate::message::MessageType;
    use sprechfunk_core::{ChannelId, PeerKey};

    fn test_frame(sequence: u32) -> FloorFrame {
        FloorFrame {
            message_type: MessageType::Heartbeat,
            flags: 0,
            sequence,
            timestamp: 1_700_000_000,
            channel_id: ChannelId::aus_name("kanal"),
            sender_key: PeerKey([4u8; 32]),
            payload: br#"{"holderName":"Bob"}"#.to_vec(),
            signature: [0x11; SIGNATUR_LAENGE],
        }
    }

    #[test]
    fn codec_encode_decode_round_trip() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        codec.encode(test_frame(3), &mut buf).unwrap();
        assert_eq!(buf.len(), MIN_FRAME_GROESSE + test_frame(3).payload.len());

        let decoded = codec.decode(&mut buf).unwrap().expect("Frame erwartet");
        assert_eq!(decoded, test_frame(3));
        assert!(buf.is_empty());
    }

    #[test]
    fn codec_unvollstaendiger_frame() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        codec.encode(test_frame(1), &mut buf).unwrap();

        let mut teil = buf.split_to(buf.len() - 10);
        assert!(codec.decode(&mut teil).unwrap().is_none());

        let mut kopf = BytesMut::from(&test_frame(1).encode()[..40]);
        assert!(codec.decode(&mut kopf).unwrap().is_none());
    }

    #[test]
    fn codec_mehrere_frames_im_buffer() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        for i in 0..3u32 {
            codec.encode(test_frame(i), &mut buf).unwrap();
        }
        for i in 0..3u32 {
            let frame = codec.decode(&mut buf).unwrap().expect("Frame erwartet");
            assert_eq!(frame.sequence, i);
        }
        assert!(buf.is_empty());
    }

    #[test]
    fn codec_ablehnung_falsches_magic() {
        let mut codec = FrameCodec::new();
        let mut bytes = test_frame(1).encode();
        bytes[0] = b'{';
        let mut buf = BytesMut::from(&bytes[..]);
        assert!(codec.decode(&mut buf).is_err());
    }

    #[test]
    fn codec_ablehnung_zu_grosse_nutzdaten() {
        let mut codec = FrameCodec::with_max_size(4);
        let mut buf = BytesMut::from(&test_frame(1).encode()[..]);
        assert!(codec.decode(&mut buf).is_err());

        let mut ziel = BytesMut::new();
        assert!(codec.encode(test_frame(1), &mut ziel).is_err());
    }

    #[tokio::test]
    async fn async_read_write_frame_round_trip() {
        let mut buffer: Vec<u8> = Vec::new();
        write_frame(&mut buffer, &test_frame(99), DEFAULT_MAX_NUTZDATEN)
            .await
            .unwrap();

        let mut cursor = io::Cursor::new(buffer);
        let decoded = read_frame(&mut cursor, DEFAULT_MAX_NUTZDATEN)
            .await
            .unwrap();
        assert_eq!(decoded.sequence, 99);
        assert_eq!(decoded.message_type, MessageType::Heartbeat);
    }

    #[tokio::test]
    async fn async_read_frame_abgeschnittener_stream() {
        let bytes = test_frame(5).encode();
        let mut cursor = io::Cursor::new(bytes[..bytes.len() - 1].to_vec());
        let result = read_frame(&mut cursor, DEFAULT_MAX_NUTZDATEN).await;
        assert_eq!(result.unwrap_err().kind(), io::ErrorKind::UnexpectedEof);
    }
}
