//! Frame codec: header + body to bytes and back, in decoded and raw forms.

use crate::compression::BodyCompressor;
use crate::error::{FrameError, Result};
use crate::frame::{Frame, FrameHeader, HeaderFlags, RawFrame};
use crate::message::{CodecRegistry, Message};
use bytes::{Buf, Bytes, BytesMut};
use cqlwire::{primitive, streamid, Opcode, ProtocolVersion};
use std::sync::Arc;

const DIRECTION_RESPONSE: u8 = 0x80;

/// Converts between frames and bytes.
///
/// The codec owns the message-codec registry and the optional body
/// compressor; it is cheap to clone and safe to share between the reader and
/// writer halves of a connection.
#[derive(Clone)]
pub struct FrameCodec {
    registry: Arc<CodecRegistry>,
    compressor: Option<Arc<dyn BodyCompressor>>,
}

impl FrameCodec {
    pub fn new(registry: Arc<CodecRegistry>, compressor: Option<Arc<dyn BodyCompressor>>) -> Self {
        Self {
            registry,
            compressor,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(Arc::new(CodecRegistry::new()), None)
    }

    pub fn compressor(&self) -> Option<&Arc<dyn BodyCompressor>> {
        self.compressor.as_ref()
    }

    pub fn registry(&self) -> &Arc<CodecRegistry> {
        &self.registry
    }

    /// Encodes a full frame, compressing the body when configured, legal for
    /// the version, and worthwhile for the opcode.
    pub fn encode(&self, frame: &Frame, buf: &mut BytesMut) -> Result<()> {
        let raw = self.to_raw(frame)?;
        self.encode_raw(&raw, buf)
    }

    /// Decodes one full frame from `buf`.
    pub fn decode(&self, buf: &mut Bytes) -> Result<Frame> {
        let header = self.decode_header(buf)?;
        self.decode_body(&header, buf)
    }

    /// Reads and validates the 9-byte header, leaving `buf` at the body.
    pub fn decode_header(&self, buf: &mut Bytes) -> Result<FrameHeader> {
        if buf.remaining() < FrameHeader::LENGTH {
            return Err(FrameError::Wire(cqlwire::WireError::UnexpectedEof {
                what: "frame header",
                needed: FrameHeader::LENGTH,
                remaining: buf.remaining(),
            }));
        }
        let version_byte = buf.get_u8();
        let is_response = version_byte & DIRECTION_RESPONSE != 0;
        let flags = HeaderFlags::from_bits_truncate(buf.get_u8());
        let use_beta = flags.contains(HeaderFlags::USE_BETA);
        let version = ProtocolVersion::from_wire(version_byte)
            .map_err(|_| FrameError::UnsupportedVersion {
                version_byte,
                use_beta,
            })?;
        if version.is_beta() && !use_beta {
            return Err(FrameError::UseBetaRequired { version, use_beta });
        }
        if !version.is_beta() && use_beta {
            return Err(FrameError::UseBetaUnexpected { version });
        }
        let stream_id = streamid::read_stream_id(buf, version)?;
        let opcode_byte = buf.get_u8();
        let opcode =
            Opcode::try_from(opcode_byte).map_err(|_| FrameError::UnsupportedOpcode(opcode_byte))?;
        if is_response && !opcode.is_response() {
            return Err(FrameError::InvalidDirection {
                opcode,
                direction: "response",
            });
        }
        if !is_response && !opcode.is_request() {
            return Err(FrameError::InvalidDirection {
                opcode,
                direction: "request",
            });
        }
        let body_length = buf.get_i32();
        if body_length < 0 {
            return Err(FrameError::NegativeBodyLength(body_length));
        }
        Ok(FrameHeader {
            version,
            flags,
            stream_id,
            opcode,
            body_length,
        })
    }

    /// Decodes the body following a header obtained from `decode_header`.
    pub fn decode_body(&self, header: &FrameHeader, buf: &mut Bytes) -> Result<Frame> {
        let raw = self.decode_raw_body(header, buf)?;
        self.from_raw(&raw)
    }

    /// Splits off the body bytes without decoding them.
    pub fn decode_raw_body(&self, header: &FrameHeader, buf: &mut Bytes) -> Result<RawFrame> {
        let length = header.body_length as usize;
        if buf.remaining() < length {
            return Err(FrameError::Wire(cqlwire::WireError::UnexpectedEof {
                what: "frame body",
                needed: length,
                remaining: buf.remaining(),
            }));
        }
        Ok(RawFrame {
            header: header.clone(),
            body: buf.split_to(length),
        })
    }

    /// Skips the body following a header. `Bytes` sources seek; there is
    /// nothing to copy.
    pub fn discard_body(&self, header: &FrameHeader, buf: &mut Bytes) -> Result<()> {
        let length = header.body_length as usize;
        if buf.remaining() < length {
            return Err(FrameError::Wire(cqlwire::WireError::UnexpectedEof {
                what: "frame body",
                needed: length,
                remaining: buf.remaining(),
            }));
        }
        buf.advance(length);
        Ok(())
    }

    /// Decodes a raw frame: header plus opaque body.
    pub fn decode_raw(&self, buf: &mut Bytes) -> Result<RawFrame> {
        let header = self.decode_header(buf)?;
        self.decode_raw_body(&header, buf)
    }

    /// Writes a raw frame back out, bit-exact.
    pub fn encode_raw(&self, raw: &RawFrame, buf: &mut BytesMut) -> Result<()> {
        let header = &raw.header;
        if raw.body.len() > i32::MAX as usize {
            return Err(FrameError::Wire(cqlwire::WireError::LengthOverflow {
                what: "frame body",
                len: raw.body.len(),
            }));
        }
        buf.reserve(FrameHeader::LENGTH + raw.body.len());
        let mut version_byte = header.version.as_u8();
        if header.opcode.is_response() {
            version_byte |= DIRECTION_RESPONSE;
        }
        primitive::write_byte(version_byte, buf);
        primitive::write_byte(header.flags.bits(), buf);
        streamid::write_stream_id(i32::from(header.stream_id), buf, header.version)?;
        primitive::write_byte(header.opcode.as_u8(), buf);
        primitive::write_int(raw.body.len() as i32, buf);
        buf.extend_from_slice(&raw.body);
        Ok(())
    }

    /// Encodes just the body of `frame` and pairs it with its header.
    pub fn to_raw(&self, frame: &Frame) -> Result<RawFrame> {
        let version = frame.header.version;
        let opcode = frame.message.opcode();
        if frame.header.opcode != opcode {
            return Err(FrameError::OpcodeMismatch {
                header: frame.header.opcode,
                body: opcode,
            });
        }
        self.check_prelude(frame, version)?;

        let mut body = BytesMut::new();
        let codec = self.registry.get(opcode)?;
        if let Ok(length) = codec.encoded_length(&frame.message, version) {
            body.reserve(length + 64);
        }
        if frame.is_response() {
            if let Some(tracing_id) = &frame.tracing_id {
                primitive::write_uuid(tracing_id, &mut body);
            }
        }
        if let Some(payload) = &frame.custom_payload {
            primitive::write_bytes_map(payload, &mut body)?;
        }
        if !frame.warnings.is_empty() {
            primitive::write_string_list(&frame.warnings, &mut body)?;
        }
        codec.encode(&frame.message, &mut body, version)?;

        let mut flags = self.content_flags(frame, version);
        let body = if self.should_compress(opcode, version) {
            let compressed = self
                .compressor
                .as_ref()
                .ok_or(FrameError::CompressorMissing)?
                .compress(&body)?;
            tracing::trace!(
                "compressed {} body: {} -> {} bytes",
                opcode,
                body.len(),
                compressed.len()
            );
            flags |= HeaderFlags::COMPRESSED;
            compressed
        } else {
            body.freeze()
        };

        Ok(RawFrame {
            header: FrameHeader {
                version,
                flags,
                stream_id: frame.header.stream_id,
                opcode,
                body_length: body.len() as i32,
            },
            body,
        })
    }

    /// Decodes a raw frame's body, honoring the flags in its header.
    pub fn from_raw(&self, raw: &RawFrame) -> Result<Frame> {
        let header = &raw.header;
        let version = header.version;
        let mut flags = header.flags;
        let mut body = if flags.contains(HeaderFlags::COMPRESSED) {
            if !header.opcode.is_compressible() {
                return Err(FrameError::malformed(
                    header.opcode,
                    "COMPRESSED flag on a non-compressible opcode",
                ));
            }
            let compressor = self
                .compressor
                .as_ref()
                .ok_or(FrameError::CompressorMissing)?;
            flags -= HeaderFlags::COMPRESSED;
            compressor.decompress(&raw.body)?
        } else {
            raw.body.clone()
        };

        let is_response = header.opcode.is_response();
        let mut tracing_requested = false;
        let mut tracing_id = None;
        if flags.contains(HeaderFlags::TRACING) {
            if is_response {
                tracing_id = Some(primitive::read_uuid(&mut body)?);
            } else {
                tracing_requested = true;
            }
        }
        let custom_payload = if flags.contains(HeaderFlags::CUSTOM_PAYLOAD) {
            if !version.supports_custom_payload() {
                return Err(FrameError::UnsupportedFeature {
                    feature: "custom payload",
                    version,
                });
            }
            Some(primitive::read_bytes_map(&mut body)?)
        } else {
            None
        };
        let warnings = if flags.contains(HeaderFlags::WARNING) {
            if !version.supports_warnings() || !is_response {
                return Err(FrameError::UnsupportedFeature {
                    feature: "warnings",
                    version,
                });
            }
            primitive::read_string_list(&mut body)?
        } else {
            Vec::new()
        };

        let message = self.registry.get(header.opcode)?.decode(&mut body, version)?;
        if !body.is_empty() {
            return Err(FrameError::malformed(
                header.opcode,
                format!("{} trailing bytes after message body", body.len()),
            ));
        }
        Ok(Frame {
            header: FrameHeader {
                version,
                flags,
                stream_id: header.stream_id,
                opcode: header.opcode,
                body_length: header.body_length,
            },
            tracing_requested,
            tracing_id,
            custom_payload,
            warnings,
            message,
        })
    }

    fn check_prelude(&self, frame: &Frame, version: ProtocolVersion) -> Result<()> {
        if frame.custom_payload.is_some() && !version.supports_custom_payload() {
            return Err(FrameError::UnsupportedFeature {
                feature: "custom payload",
                version,
            });
        }
        if !frame.warnings.is_empty() && !version.supports_warnings() {
            return Err(FrameError::UnsupportedFeature {
                feature: "warnings",
                version,
            });
        }
        if !frame.warnings.is_empty() && !frame.is_response() {
            return Err(FrameError::malformed(
                frame.opcode(),
                "warnings on a request frame",
            ));
        }
        if frame.tracing_id.is_some() && !frame.is_response() {
            return Err(FrameError::malformed(
                frame.opcode(),
                "tracing id on a request frame",
            ));
        }
        Ok(())
    }

    fn content_flags(&self, frame: &Frame, version: ProtocolVersion) -> HeaderFlags {
        let mut flags = HeaderFlags::empty();
        if version.is_beta() {
            flags |= HeaderFlags::USE_BETA;
        }
        if frame.tracing_requested || frame.tracing_id.is_some() {
            flags |= HeaderFlags::TRACING;
        }
        if frame.custom_payload.is_some() {
            flags |= HeaderFlags::CUSTOM_PAYLOAD;
        }
        if !frame.warnings.is_empty() {
            flags |= HeaderFlags::WARNING;
        }
        flags
    }

    fn should_compress(&self, opcode: Opcode, version: ProtocolVersion) -> bool {
        match &self.compressor {
            Some(compressor) => {
                opcode.is_compressible() && version.supports_compression(compressor.algorithm())
            }
            None => false,
        }
    }
}
