//! Length-delimited frame codec.
//!
//! # Wire format
//!
//! Each logical message is one frame:
//!
//! - `u8`: kind tag (0 = Request, 1 = Response, 2 = CancellationRequest)
//! - `u32 LE`: body length
//! - `[u8; len]`: body, the JSON encoding of the tagged record
//!
//! A clean end-of-stream between frames is a normal close. End-of-stream
//! inside a frame is a connection error. An unknown tag, an over-long
//! declared length, or a body that fails to parse is a protocol error and
//! fatal to the channel.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{ConnectionError, ProtocolError, RpcError};
use crate::wire::{CancellationRequest, Message, Request, Response};

const KIND_REQUEST: u8 = 0;
const KIND_RESPONSE: u8 = 1;
const KIND_CANCEL: u8 = 2;

/// Header bytes preceding every body: kind tag + length prefix.
const HEADER_LEN: usize = 1 + 4;

/// Encode a message into a complete frame (header + body).
///
/// The frame is assembled in one buffer so a single `write_all` under the
/// writer lock emits it without interleaving with concurrent senders.
pub fn encode_frame(message: &Message) -> Result<Vec<u8>, RpcError> {
    let (kind, body) = match message {
        Message::Request(r) => (KIND_REQUEST, serde_json::to_vec(r)?),
        Message::Response(r) => (KIND_RESPONSE, serde_json::to_vec(r)?),
        Message::Cancel(c) => (KIND_CANCEL, serde_json::to_vec(c)?),
    };

    let mut frame = Vec::with_capacity(HEADER_LEN + body.len());
    frame.push(kind);
    frame.extend_from_slice(&(body.len() as u32).to_le_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Write one message as a frame and flush.
pub async fn write_message<W>(writer: &mut W, message: &Message) -> Result<(), RpcError>
where
    W: AsyncWrite + Unpin,
{
    let frame = encode_frame(message)?;
    writer.write_all(&frame).await.map_err(io_error)?;
    writer.flush().await.map_err(io_error)?;
    Ok(())
}

/// Read one message.
///
/// Returns `Ok(None)` when the stream ends cleanly on a frame boundary.
pub async fn read_message<R>(reader: &mut R, max_frame_len: usize) -> Result<Option<Message>, RpcError>
where
    R: AsyncRead + Unpin,
{
    let mut kind = [0u8; 1];
    match reader.read_exact(&mut kind).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(io_error(e)),
    }

    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await.map_err(io_error)?;
    let len = u32::from_le_bytes(len_buf) as usize;
    if len > max_frame_len {
        return Err(ProtocolError::FrameTooLarge {
            len,
            max: max_frame_len,
        }
        .into());
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await.map_err(io_error)?;

    decode(kind[0], &body).map(Some)
}

fn decode(kind: u8, body: &[u8]) -> Result<Message, RpcError> {
    let malformed = |source| ProtocolError::Malformed { kind, source };
    match kind {
        KIND_REQUEST => serde_json::from_slice::<Request>(body)
            .map(Message::Request)
            .map_err(|e| malformed(e).into()),
        KIND_RESPONSE => serde_json::from_slice::<Response>(body)
            .map(Message::Response)
            .map_err(|e| malformed(e).into()),
        KIND_CANCEL => serde_json::from_slice::<CancellationRequest>(body)
            .map(Message::Cancel)
            .map_err(|e| malformed(e).into()),
        other => Err(ProtocolError::UnknownKind(other).into()),
    }
}

fn io_error(e: std::io::Error) -> RpcError {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        ConnectionError::Closed.into()
    } else {
        ConnectionError::Io(e).into()
    }
}
