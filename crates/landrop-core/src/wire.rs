//! Binary stream protocol for transfers.
//!
//! One TCP stream carries one transfer: the sender writes `Chunk` frames in
//! order, then exactly one `End` frame; the receiver answers with a single
//! `TransferResult` frame before the stream closes. Frames are u32
//! big-endian length-prefixed bincode.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Upper bound on a single frame. A chunk frame is the chunk payload plus a
/// small header, so anything past this is a corrupt or hostile stream.
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

/// One bounded fragment of a file in flight.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileChunk {
    pub file_name: String,
    pub data: Vec<u8>,
    /// 1-based position of this chunk in the stream.
    pub chunk_number: u64,
    pub total_chunks: u64,
}

/// Frames the sender puts on a transfer stream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum StreamFrame {
    Chunk(FileChunk),
    /// End-of-stream marker; a stream that closes without one was cut off.
    End,
}

/// The receiver's single reply, sent after the `End` frame.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransferResult {
    pub success: bool,
    pub message: String,
    pub bytes_received: u64,
}

/// Number of chunks a file of `size` bytes occupies at `chunk_size`.
pub fn chunk_count(size: u64, chunk_size: usize) -> u64 {
    let chunk_size = chunk_size as u64;
    (size + chunk_size - 1) / chunk_size
}

pub async fn write_message<T, M>(transport: &mut T, msg: &M) -> std::io::Result<()>
where
    T: AsyncWrite + Unpin + Send,
    M: Serialize,
{
    let body = bincode::serialize(msg)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    transport.write_all(&(body.len() as u32).to_be_bytes()).await?;
    transport.write_all(&body).await?;
    transport.flush().await?;
    Ok(())
}

/// Read the next frame. `Ok(None)` means the peer closed at a frame
/// boundary; EOF inside a frame is an error.
pub async fn read_message<T, M>(transport: &mut T) -> std::io::Result<Option<M>>
where
    T: AsyncRead + Unpin + Send,
    M: DeserializeOwned,
{
    let mut lenb = [0u8; 4];
    let mut filled = 0;
    while filled < lenb.len() {
        let n = transport.read(&mut lenb[filled..]).await?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "stream closed inside a frame header",
            ));
        }
        filled += n;
    }

    let len = u32::from_be_bytes(lenb) as usize;
    if len > MAX_FRAME_LEN {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "frame too large",
        ));
    }

    let mut body = vec![0u8; len];
    transport.read_exact(&mut body).await?;

    let msg = bincode::deserialize(&body)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    Ok(Some(msg))
}
