//! DSE REVISE_REQUEST body (continuous-paging cancel / more-pages).

use crate::error::{FrameError, Result};
use crate::message::{wrong_kind, Message, MessageCodec};
use bytes::{Bytes, BytesMut};
use cqlwire::{primitive, Opcode, ProtocolVersion};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, num_enum::TryFromPrimitive, num_enum::IntoPrimitive,
)]
#[repr(i32)]
pub enum RevisionType {
    CancelContinuousPaging = 1,
    /// DSE v2 only.
    MoreContinuousPages = 2,
}

/// REVISE_REQUEST: revision type, the stream id of the paging request, and
/// for more-pages the number of additional pages wanted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReviseRequest {
    pub revision_type: RevisionType,
    pub target_stream_id: i32,
    pub next_pages: Option<i32>,
}

impl ReviseRequest {
    pub fn cancel(target_stream_id: i32) -> Self {
        Self {
            revision_type: RevisionType::CancelContinuousPaging,
            target_stream_id,
            next_pages: None,
        }
    }

    pub fn more_pages(target_stream_id: i32, next_pages: i32) -> Self {
        Self {
            revision_type: RevisionType::MoreContinuousPages,
            target_stream_id,
            next_pages: Some(next_pages),
        }
    }
}

pub struct ReviseRequestCodec;

impl MessageCodec for ReviseRequestCodec {
    fn opcode(&self) -> Opcode {
        Opcode::ReviseRequest
    }

    fn encode(
        &self,
        message: &Message,
        buf: &mut BytesMut,
        version: ProtocolVersion,
    ) -> Result<()> {
        match message {
            Message::ReviseRequest(revise) => {
                if !version.supports_continuous_paging() {
                    return Err(FrameError::UnsupportedFeature {
                        feature: "revise request",
                        version,
                    });
                }
                if revise.revision_type == RevisionType::MoreContinuousPages
                    && version != ProtocolVersion::Dse2
                {
                    return Err(FrameError::UnsupportedFeature {
                        feature: "more-pages revision",
                        version,
                    });
                }
                primitive::write_int(revise.revision_type.into(), buf);
                primitive::write_int(revise.target_stream_id, buf);
                if revise.revision_type == RevisionType::MoreContinuousPages {
                    primitive::write_int(revise.next_pages.unwrap_or(1), buf);
                }
                Ok(())
            }
            other => Err(wrong_kind(Opcode::ReviseRequest, other)),
        }
    }

    fn encoded_length(&self, message: &Message, _: ProtocolVersion) -> Result<usize> {
        match message {
            Message::ReviseRequest(revise) => {
                Ok(
                    if revise.revision_type == RevisionType::MoreContinuousPages {
                        12
                    } else {
                        8
                    },
                )
            }
            other => Err(wrong_kind(Opcode::ReviseRequest, other)),
        }
    }

    fn decode(&self, buf: &mut Bytes, _: ProtocolVersion) -> Result<Message> {
        let raw = primitive::read_int(buf)?;
        let revision_type = RevisionType::try_from(raw).map_err(|_| {
            FrameError::malformed(
                Opcode::ReviseRequest,
                format!("unknown revision type {}", raw),
            )
        })?;
        let target_stream_id = primitive::read_int(buf)?;
        let next_pages = if revision_type == RevisionType::MoreContinuousPages {
            Some(primitive::read_int(buf)?)
        } else {
            None
        };
        Ok(Message::ReviseRequest(ReviseRequest {
            revision_type,
            target_stream_id,
            next_pages,
        }))
    }
}
