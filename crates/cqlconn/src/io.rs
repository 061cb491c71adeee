//! Frame I/O over a transport, legacy- and modern-framing aware.
//!
//! The reader and writer each own one half of the transport so the two
//! connection tasks can run independently. Which framing is active is shared
//! through [`FramingState`]; the handshake layer flips it when READY or
//! AUTHENTICATE is processed at a version that frames with segments.

use crate::error::Result;
use bytes::{Bytes, BytesMut};
use cqlframe::{split_frame, Frame, FrameCodec, SegmentAccumulator, SegmentCodec};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};

/// Any bidirectional byte stream; lets callers hand in a TLS-wrapped stream
/// in place of a plain TCP socket.
pub trait Transport: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> Transport for T {}

pub type BoxedTransport = Box<dyn Transport>;

/// Shared framing mode. Starts legacy; once flipped to modern it stays
/// modern for the life of the connection.
#[derive(Debug, Default)]
pub struct FramingState {
    modern: AtomicBool,
}

impl FramingState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn is_modern(&self) -> bool {
        self.modern.load(Ordering::SeqCst)
    }

    pub fn enable_modern(&self) {
        if !self.modern.swap(true, Ordering::SeqCst) {
            tracing::debug!("switched to modern framing");
        }
    }
}

/// Builds the codec pair and split I/O for one connection.
pub fn frame_io(
    transport: BoxedTransport,
    legacy_codec: FrameCodec,
    segment_codec: SegmentCodec,
    state: Arc<FramingState>,
) -> (FrameReader, FrameWriter) {
    // Body compression is a legacy-framing concern; inside segments frames
    // travel uncompressed (the segment layer compresses).
    let modern_codec = FrameCodec::new(Arc::clone(legacy_codec.registry()), None);
    let (read_half, write_half) = tokio::io::split(transport);
    (
        FrameReader {
            io: read_half,
            legacy_codec: legacy_codec.clone(),
            modern_codec: modern_codec.clone(),
            segment_codec: segment_codec.clone(),
            state: Arc::clone(&state),
            accumulator: SegmentAccumulator::new(),
            pending: VecDeque::new(),
        },
        FrameWriter {
            io: write_half,
            legacy_codec,
            modern_codec,
            segment_codec,
            state,
        },
    )
}

pub struct FrameReader {
    io: ReadHalf<BoxedTransport>,
    legacy_codec: FrameCodec,
    modern_codec: FrameCodec,
    segment_codec: SegmentCodec,
    state: Arc<FramingState>,
    accumulator: SegmentAccumulator,
    pending: VecDeque<Frame>,
}

impl FrameReader {
    /// Reads one frame, whichever framing is active.
    pub async fn read_frame(&mut self) -> Result<Frame> {
        if let Some(frame) = self.pending.pop_front() {
            return Ok(frame);
        }
        if self.state.is_modern() {
            self.read_modern().await
        } else {
            self.read_legacy().await
        }
    }

    /// Reads a single byte first so the await doubles as activity
    /// detection, then completes the buffer from the stream.
    async fn fill_probed(&mut self, buf: &mut [u8]) -> std::io::Result<()> {
        self.io.read_exact(&mut buf[..1]).await?;
        if buf.len() > 1 {
            self.io.read_exact(&mut buf[1..]).await?;
        }
        Ok(())
    }

    async fn read_legacy(&mut self) -> Result<Frame> {
        let mut header_bytes = [0u8; cqlframe::FrameHeader::LENGTH];
        self.fill_probed(&mut header_bytes).await?;
        let mut header_buf = Bytes::copy_from_slice(&header_bytes);
        let header = self.legacy_codec.decode_header(&mut header_buf)?;

        let mut body = vec![0u8; header.body_length as usize];
        self.io.read_exact(&mut body).await?;
        let mut body = Bytes::from(body);
        Ok(self.legacy_codec.decode_body(&header, &mut body)?)
    }

    async fn read_modern(&mut self) -> Result<Frame> {
        loop {
            let header_length =
                self.segment_codec.header_length() + cqlframe::segment::CRC24_LENGTH;
            let mut header_bytes = vec![0u8; header_length];
            self.fill_probed(&mut header_bytes).await?;
            let mut header_buf = Bytes::from(header_bytes);
            let header = self.segment_codec.decode_header(&mut header_buf)?;

            let mut payload =
                vec![0u8; header.payload_length + cqlframe::segment::CRC32_LENGTH];
            self.io.read_exact(&mut payload).await?;
            let mut payload_buf = Bytes::from(payload);
            let segment = self.segment_codec.decode_payload(&header, &mut payload_buf)?;

            if segment.self_contained {
                self.accumulator.expect_empty()?;
                let mut payload = segment.payload;
                while !payload.is_empty() {
                    self.pending.push_back(self.modern_codec.decode(&mut payload)?);
                }
                if let Some(frame) = self.pending.pop_front() {
                    return Ok(frame);
                }
            } else if let Some(frame_bytes) = self.accumulator.accumulate(&segment.payload)? {
                let mut frame_bytes = frame_bytes;
                return Ok(self.modern_codec.decode(&mut frame_bytes)?);
            }
        }
    }
}

pub struct FrameWriter {
    io: WriteHalf<BoxedTransport>,
    legacy_codec: FrameCodec,
    modern_codec: FrameCodec,
    segment_codec: SegmentCodec,
    state: Arc<FramingState>,
}

impl FrameWriter {
    /// Whether writes are currently segment-framed.
    pub fn is_modern(&self) -> bool {
        self.state.is_modern()
    }

    /// Serializes and writes one frame, wrapping it in segments when modern
    /// framing is active.
    pub async fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        let mut out = BytesMut::new();
        if self.state.is_modern() {
            // The frame-level COMPRESSED flag stays clear here: the segment
            // codec owns compression under modern framing.
            let mut frame_bytes = BytesMut::new();
            self.modern_codec.encode(frame, &mut frame_bytes)?;
            for segment in split_frame(frame_bytes.freeze()) {
                self.segment_codec.encode(&segment, &mut out)?;
            }
        } else {
            self.legacy_codec.encode(frame, &mut out)?;
        }
        self.io.write_all(&out).await?;
        self.io.flush().await?;
        Ok(())
    }

    /// Writes pre-encoded body bytes as a frame (raw-handler path).
    pub async fn write_raw(&mut self, raw: &cqlframe::RawFrame) -> Result<()> {
        let mut out = BytesMut::new();
        if self.state.is_modern() {
            let mut frame_bytes = BytesMut::new();
            self.modern_codec.encode_raw(raw, &mut frame_bytes)?;
            for segment in split_frame(frame_bytes.freeze()) {
                self.segment_codec.encode(&segment, &mut out)?;
            }
        } else {
            self.legacy_codec.encode_raw(raw, &mut out)?;
        }
        self.io.write_all(&out).await?;
        self.io.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cqlframe::message::{Message, Query, Supported};
    use cqlframe::segment::MAX_PAYLOAD_LENGTH;
    use cqlwire::ProtocolVersion;

    fn pair(modern: bool) -> (FrameReader, FrameWriter, FrameReader, FrameWriter) {
        let (a, b) = tokio::io::duplex(1024 * 1024);
        let state_a = FramingState::new();
        let state_b = FramingState::new();
        if modern {
            state_a.enable_modern();
            state_b.enable_modern();
        }
        let (reader_a, writer_a) = frame_io(
            Box::new(a),
            FrameCodec::with_defaults(),
            SegmentCodec::uncompressed(),
            state_a,
        );
        let (reader_b, writer_b) = frame_io(
            Box::new(b),
            FrameCodec::with_defaults(),
            SegmentCodec::uncompressed(),
            state_b,
        );
        (reader_a, writer_a, reader_b, writer_b)
    }

    #[tokio::test]
    async fn test_legacy_round_trip() {
        let (mut reader_a, _writer_a, _reader_b, mut writer_b) = pair(false);
        let frame = Frame::new(
            ProtocolVersion::V4,
            3,
            Message::Query(Query::new("SELECT * FROM system.local")),
        );
        writer_b.write_frame(&frame).await.unwrap();
        let decoded = reader_a.read_frame().await.unwrap();
        assert_eq!(decoded.message, frame.message);
        assert_eq!(decoded.header.stream_id, 3);
    }

    #[tokio::test]
    async fn test_modern_round_trip() {
        let (mut reader_a, _writer_a, _reader_b, mut writer_b) = pair(true);
        let frame = Frame::new(
            ProtocolVersion::V5,
            9,
            Message::Query(Query::new("SELECT * FROM system.peers")),
        );
        writer_b.write_frame(&frame).await.unwrap();
        let decoded = reader_a.read_frame().await.unwrap();
        assert_eq!(decoded.message, frame.message);
    }

    #[tokio::test]
    async fn test_modern_large_frame_is_split_and_reassembled() {
        let (mut reader_a, _writer_a, _reader_b, mut writer_b) = pair(true);
        let huge = "x".repeat(MAX_PAYLOAD_LENGTH + 1000);
        let frame = Frame::new(ProtocolVersion::V5, 1, Message::Query(Query::new(huge)));
        writer_b.write_frame(&frame).await.unwrap();
        let decoded = reader_a.read_frame().await.unwrap();
        assert_eq!(decoded.message, frame.message);
    }

    #[tokio::test]
    async fn test_self_contained_segment_carrying_two_frames() {
        use cqlframe::Segment;

        let (a, mut raw_peer) = tokio::io::duplex(1 << 16);
        let state = FramingState::new();
        state.enable_modern();
        let (mut reader, _writer) = frame_io(
            Box::new(a),
            FrameCodec::with_defaults(),
            SegmentCodec::uncompressed(),
            state,
        );

        // Pack two complete frames into one self-contained segment.
        let codec = FrameCodec::with_defaults();
        let mut payload = BytesMut::new();
        for stream_id in [1i16, 2] {
            codec
                .encode(
                    &Frame::new(
                        ProtocolVersion::V5,
                        stream_id,
                        Message::Supported(Supported::standard()),
                    ),
                    &mut payload,
                )
                .unwrap();
        }
        let mut segment_bytes = BytesMut::new();
        SegmentCodec::uncompressed()
            .encode(&Segment::self_contained(payload.freeze()), &mut segment_bytes)
            .unwrap();
        raw_peer.write_all(&segment_bytes).await.unwrap();

        let first = reader.read_frame().await.unwrap();
        let second = reader.read_frame().await.unwrap();
        assert_eq!(first.header.stream_id, 1);
        assert_eq!(second.header.stream_id, 2);
        assert!(matches!(second.message, Message::Supported(_)));
    }

    #[tokio::test]
    async fn test_framing_switch_mid_stream() {
        let (a, b) = tokio::io::duplex(1024 * 1024);
        let client_state = FramingState::new();
        let server_state = FramingState::new();
        let (mut client_reader, _client_writer) = frame_io(
            Box::new(a),
            FrameCodec::with_defaults(),
            SegmentCodec::uncompressed(),
            Arc::clone(&client_state),
        );
        let (_server_reader, mut server_writer) = frame_io(
            Box::new(b),
            FrameCodec::with_defaults(),
            SegmentCodec::uncompressed(),
            Arc::clone(&server_state),
        );

        // READY still goes out legacy-framed, then both sides switch.
        let ready = Frame::new(ProtocolVersion::V5, 0, Message::Ready);
        server_writer.write_frame(&ready).await.unwrap();
        server_state.enable_modern();

        let decoded = client_reader.read_frame().await.unwrap();
        assert_eq!(decoded.message, Message::Ready);
        client_state.enable_modern();

        let supported = Frame::new(
            ProtocolVersion::V5,
            -1,
            Message::Supported(Supported::standard()),
        );
        server_writer.write_frame(&supported).await.unwrap();
        let decoded = client_reader.read_frame().await.unwrap();
        assert_eq!(decoded.message, supported.message);
    }
}
