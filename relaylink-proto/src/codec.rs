use bytes::{Bytes, BytesMut};
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::errors::CodecError;

pub const RECEIVE_BUFFER_BYTES: usize = 10 * 1024 * 1024;
pub const MAX_FRAME_BODY_BYTES: usize = RECEIVE_BUFFER_BYTES - 4;

// Kept as the exact bytes that were on the wire (4-byte big-endian length followed by
// the body) so it can be forwarded to another peer without re-encoding.
#[derive(Debug, Clone)]
pub struct Frame {
    bytes: Bytes,
}

impl Frame {
    pub fn body(&self) -> &[u8] {
        &self.bytes[4..]
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

pub fn new_receive_buffer() -> BytesMut {
    BytesMut::with_capacity(RECEIVE_BUFFER_BYTES)
}

pub async fn read_frame<R>(reader: &mut R, buf: &mut BytesMut) -> Result<Frame, CodecError>
where
    R: AsyncRead + Unpin,
{
    let mut length_prefix = [0_u8; 4];
    reader
        .read_exact(&mut length_prefix)
        .await
        .map_err(map_eof)?;
    let declared = u32::from_be_bytes(length_prefix) as usize;

    let max_body = buf.capacity().saturating_sub(4);
    if declared > max_body {
        return Err(CodecError::FrameTooLarge {
            declared,
            max: max_body,
        });
    }

    buf.clear();
    buf.resize(4 + declared, 0);
    buf[..4].copy_from_slice(&length_prefix);
    reader.read_exact(&mut buf[4..]).await.map_err(map_eof)?;

    // Copy out rather than `buf.split()`: split permanently shrinks `buf`'s capacity,
    // which would make the size check above drift from the buffer actually allocated.
    let bytes = Bytes::copy_from_slice(&buf[..]);
    buf.clear();
    Ok(Frame { bytes })
}

// Caller serializes writes to the same writer itself (e.g. via a per-peer write mutex);
// this issues exactly one logical write and does not lock.
pub async fn write_frame<W>(writer: &mut W, body: &[u8]) -> Result<(), CodecError>
where
    W: AsyncWrite + Unpin,
{
    let length = u32::try_from(body.len()).map_err(|_| CodecError::FrameTooLarge {
        declared: body.len(),
        max: u32::MAX as usize,
    })?;
    writer.write_all(&length.to_be_bytes()).await?;
    writer.write_all(body).await?;
    Ok(())
}

pub async fn write_json_message<W, T>(writer: &mut W, value: &T) -> Result<(), CodecError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let body =
        serde_json::to_vec(value).map_err(|err| CodecError::Serialization(err.to_string()))?;
    write_frame(writer, &body).await
}

// Newline-terminated framing, used only for the auth handshake (both the request and
// the reply); everything else on the wire is length-prefixed.
pub async fn write_line_json<W, T>(writer: &mut W, value: &T) -> Result<(), CodecError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let mut body =
        serde_json::to_vec(value).map_err(|err| CodecError::Serialization(err.to_string()))?;
    body.push(b'\n');
    writer.write_all(&body).await?;
    Ok(())
}

pub async fn write_raw_frame<W>(writer: &mut W, frame: &Frame) -> Result<(), CodecError>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(frame.as_bytes()).await?;
    Ok(())
}

fn map_eof(err: std::io::Error) -> CodecError {
    if err.kind() == std::io::ErrorKind::UnexpectedEof {
        CodecError::Eof
    } else {
        CodecError::Io(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[tokio::test]
    async fn round_trips_a_frame() {
        let mut out = Vec::new();
        write_frame(&mut out, b"{\"type\":\"ping\"}").await.unwrap();

        let mut buf = new_receive_buffer();
        let mut reader = Cursor::new(out);
        let frame = read_frame(&mut reader, &mut buf).await.unwrap();
        assert_eq!(frame.body(), b"{\"type\":\"ping\"}");
    }

    #[tokio::test]
    async fn boundary_length_is_accepted() {
        let body = vec![0_u8; MAX_FRAME_BODY_BYTES];
        let mut out = Vec::new();
        write_frame(&mut out, &body).await.unwrap();

        let mut buf = new_receive_buffer();
        let mut reader = Cursor::new(out);
        let frame = read_frame(&mut reader, &mut buf).await.unwrap();
        assert_eq!(frame.body().len(), MAX_FRAME_BODY_BYTES);
    }

    #[tokio::test]
    async fn oversized_length_is_rejected() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&(RECEIVE_BUFFER_BYTES as u32).to_be_bytes());

        let mut buf = new_receive_buffer();
        let mut reader = Cursor::new(bytes);
        let err = read_frame(&mut reader, &mut buf).await.unwrap_err();
        assert!(matches!(err, CodecError::FrameTooLarge { .. }));
    }

    #[tokio::test]
    async fn eof_before_length_prefix_is_reported() {
        let mut buf = new_receive_buffer();
        let mut reader = Cursor::new(Vec::<u8>::new());
        let err = read_frame(&mut reader, &mut buf).await.unwrap_err();
        assert!(matches!(err, CodecError::Eof));
    }

    #[tokio::test]
    async fn buffer_is_reused_across_frames() {
        let mut out = Vec::new();
        write_frame(&mut out, b"{\"a\":1}").await.unwrap();
        write_frame(&mut out, b"{\"b\":22}").await.unwrap();

        let mut buf = new_receive_buffer();
        let mut reader = Cursor::new(out);
        let first = read_frame(&mut reader, &mut buf).await.unwrap();
        assert_eq!(first.body(), b"{\"a\":1}");
        let second = read_frame(&mut reader, &mut buf).await.unwrap();
        assert_eq!(second.body(), b"{\"b\":22}");
    }
}
