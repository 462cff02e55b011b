//! Length-prefixed frame codec.
//!
//! Wire format, one frame per direction:
//! ```text
//! [8 bytes big-endian length][length bytes payload]
//! ```
//! The payload is opaque; nothing else is interpreted here.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::net::transport::TransportError;

/// Size of the length header.
pub const HEADER_LEN: usize = 8;

/// Encode `payload` as a single frame.
pub fn encode_frame(payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(HEADER_LEN + payload.len());
    frame.extend_from_slice(&(payload.len() as u64).to_be_bytes());
    frame.extend_from_slice(payload);
    frame
}

/// Write `payload` as one frame and flush.
pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&encode_frame(payload)).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one frame, rejecting declared lengths above `max_len`.
///
/// A peer that closes before sending any header byte yields
/// [`TransportError::Closed`]; closing anywhere later yields
/// [`TransportError::PeerClosed`].
pub async fn read_frame<R>(reader: &mut R, max_len: u64) -> Result<Vec<u8>, TransportError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; HEADER_LEN];
    match read_full(reader, &mut header).await {
        Err(TransportError::PeerClosed { received: 0, .. }) => return Err(TransportError::Closed),
        other => other?,
    }

    let declared = u64::from_be_bytes(header);
    if declared > max_len {
        return Err(TransportError::FrameTooLarge {
            declared,
            limit: max_len,
        });
    }
    let len = usize::try_from(declared).map_err(|_| TransportError::FrameTooLarge {
        declared,
        limit: max_len,
    })?;

    let mut payload = vec![0u8; len];
    read_full(reader, &mut payload).await?;
    Ok(payload)
}

/// Fill `buf` completely. A zero-length read before that is a peer close.
async fn read_full<R>(reader: &mut R, buf: &mut [u8]) -> Result<(), TransportError>
where
    R: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            return Err(TransportError::PeerClosed {
                expected: buf.len() as u64,
                received: filled as u64,
            });
        }
        filled += n;
    }
    Ok(())
}
