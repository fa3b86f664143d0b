//! Outbound transfers: validate fast, then stream in the background.

use crate::config::NodeConfig;
use crate::error::TransferError;
use crate::peer::{Peer, PeerRegistry};
use crate::wire::{self, chunk_count, FileChunk, StreamFrame, TransferResult};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;

/// Acknowledgment returned once a transfer has been dispatched. The transfer
/// itself runs in its own task; its outcome is only logged.
#[derive(Debug, Clone)]
pub struct TransferStarted {
    pub peer_hostname: String,
    pub file_name: String,
}

#[derive(Clone)]
pub struct TransferSender {
    registry: Arc<PeerRegistry>,
    chunk_size: usize,
    transfer_timeout: Duration,
}

impl TransferSender {
    pub fn new(registry: Arc<PeerRegistry>, cfg: &NodeConfig) -> Self {
        Self {
            registry,
            chunk_size: cfg.chunk_size,
            transfer_timeout: cfg.transfer_timeout(),
        }
    }

    /// Validate the request and dispatch the transfer as a background task.
    ///
    /// Only initiation is observable here: the stream's eventual success or
    /// failure surfaces in the transfer task's log, never to this caller.
    pub async fn start(
        &self,
        peer_id: &str,
        path: &Path,
    ) -> Result<TransferStarted, TransferError> {
        let peer = self
            .registry
            .lookup(peer_id)
            .ok_or_else(|| TransferError::PeerNotFound(peer_id.to_string()))?;

        let is_file = tokio::fs::metadata(path)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false);
        if !is_file {
            return Err(TransferError::FileNotFound(path.to_path_buf()));
        }

        let file_name = base_name(path)?;
        let started = TransferStarted {
            peer_hostname: peer.hostname.clone(),
            file_name: file_name.clone(),
        };

        let sender = self.clone();
        let path = path.to_path_buf();
        tokio::spawn(async move {
            match sender.transfer(&peer, &path, &file_name).await {
                Ok(result) => tracing::info!(
                    peer = %peer.hostname,
                    file = %file_name,
                    bytes = result.bytes_received,
                    "transfer complete: {}",
                    result.message
                ),
                Err(e) => tracing::error!(
                    peer = %peer.hostname,
                    file = %file_name,
                    "transfer failed: {e}"
                ),
            }
        });

        Ok(started)
    }

    /// Run one complete transfer under a single whole-transfer timeout.
    pub async fn transfer(
        &self,
        peer: &Peer,
        path: &Path,
        file_name: &str,
    ) -> Result<TransferResult, TransferError> {
        match tokio::time::timeout(
            self.transfer_timeout,
            self.transfer_inner(peer, path, file_name),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(TransferError::TimedOut(self.transfer_timeout)),
        }
    }

    async fn transfer_inner(
        &self,
        peer: &Peer,
        path: &Path,
        file_name: &str,
    ) -> Result<TransferResult, TransferError> {
        let mut file = tokio::fs::File::open(path).await.map_err(TransferError::Io)?;
        let size = file.metadata().await.map_err(TransferError::Io)?.len();
        let total_chunks = chunk_count(size, self.chunk_size);

        let addr = SocketAddr::new(peer.ip, peer.port);
        tracing::info!(
            peer = %peer.hostname,
            %addr,
            file = %file_name,
            size,
            total_chunks,
            "sending file"
        );

        let mut stream = TcpStream::connect(addr)
            .await
            .map_err(TransferError::Transport)?;

        let mut buf = vec![0u8; self.chunk_size];
        let mut chunk_number = 0u64;
        loop {
            let n = read_chunk(&mut file, &mut buf)
                .await
                .map_err(TransferError::Io)?;
            if n == 0 {
                break;
            }
            chunk_number += 1;
            let frame = StreamFrame::Chunk(FileChunk {
                file_name: file_name.to_string(),
                data: buf[..n].to_vec(),
                chunk_number,
                total_chunks,
            });
            wire::write_message(&mut stream, &frame)
                .await
                .map_err(TransferError::Transport)?;
            tracing::debug!(chunk = chunk_number, of = total_chunks, len = n, "chunk sent");
        }

        wire::write_message(&mut stream, &StreamFrame::End)
            .await
            .map_err(TransferError::Transport)?;

        let result: TransferResult = wire::read_message(&mut stream)
            .await
            .map_err(TransferError::Transport)?
            .ok_or_else(|| {
                TransferError::Transport(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "stream closed before transfer result",
                ))
            })?;

        if !result.success {
            return Err(TransferError::Rejected(result.message));
        }
        Ok(result)
    }
}

/// Fill `buf` as far as the file allows, so every chunk but the last carries
/// exactly the configured chunk size.
async fn read_chunk(file: &mut tokio::fs::File, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = file.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

fn base_name(path: &Path) -> Result<String, TransferError> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.to_string())
        .ok_or_else(|| TransferError::InvalidFileName(path.display().to_string()))
}
