//! Framing for the control socket
//!
//! Each request travels as a big-endian `u32` length followed by a protobuf
//! `ControlMessage`. Only "forget peer" requests naming a peer are valid;
//! a message without one is rejected here rather than by the registry.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use prost::Message;
use thiserror::Error;

use crate::{ControlMessage, ForgetPeer};

/// Largest accepted message body (64 KiB); a request carries a single name
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024;

const LEN_PREFIX: usize = 4;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Control frame of {0} bytes exceeds {MAX_MESSAGE_SIZE}")]
    MessageTooLarge(usize),

    #[error("Control message names no peer to forget")]
    EmptyRequest,

    #[error("Control stream ended inside a frame ({0} bytes pending)")]
    Truncated(usize),

    #[error("Malformed control message: {0}")]
    Malformed(#[from] prost::DecodeError),
}

/// Extract the forget request, refusing messages that carry none
fn forget_request(message: ControlMessage) -> Result<ForgetPeer, CodecError> {
    match message.forget_peer {
        Some(request) if !request.display_name.is_empty() => Ok(request),
        _ => Err(CodecError::EmptyRequest),
    }
}

/// Frame a control message for the wire
pub fn encode(message: &ControlMessage) -> Result<Bytes, CodecError> {
    if message.display_name().map_or(true, str::is_empty) {
        return Err(CodecError::EmptyRequest);
    }

    let body = message.encode_to_vec();
    if body.len() > MAX_MESSAGE_SIZE {
        return Err(CodecError::MessageTooLarge(body.len()));
    }

    let mut frame = BytesMut::with_capacity(LEN_PREFIX + body.len());
    frame.put_u32(body.len() as u32);
    frame.put_slice(&body);
    Ok(frame.freeze())
}

/// Incremental decoder yielding forget requests from a byte stream
#[derive(Debug, Default)]
pub struct RequestDecoder {
    pending: BytesMut,
}

impl RequestDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffer bytes read from the socket
    pub fn push(&mut self, data: &[u8]) {
        self.pending.extend_from_slice(data);
    }

    /// Next complete request, or `None` until more bytes arrive
    ///
    /// A rejected frame is still consumed, so decoding may continue after
    /// `EmptyRequest`. Any other error leaves the stream unusable.
    pub fn next_request(&mut self) -> Result<Option<ForgetPeer>, CodecError> {
        if self.pending.len() < LEN_PREFIX {
            return Ok(None);
        }

        let body_len = (&self.pending[..LEN_PREFIX]).get_u32() as usize;
        if body_len > MAX_MESSAGE_SIZE {
            return Err(CodecError::MessageTooLarge(body_len));
        }
        if self.pending.len() < LEN_PREFIX + body_len {
            return Ok(None);
        }

        self.pending.advance(LEN_PREFIX);
        let body = self.pending.split_to(body_len).freeze();
        forget_request(ControlMessage::decode(body)?).map(Some)
    }

    /// Check the stream ended on a frame boundary
    pub fn finish(&self) -> Result<(), CodecError> {
        match self.pending.len() {
            0 => Ok(()),
            n => Err(CodecError::Truncated(n)),
        }
    }
}
