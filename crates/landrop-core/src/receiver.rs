//! Inbound transfer handling: one task per stream, all-or-nothing on disk.

use crate::error::TransferError;
use crate::wire::{self, StreamFrame, TransferResult};
use std::path::PathBuf;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};

#[derive(Clone)]
pub struct TransferReceiver {
    receive_dir: PathBuf,
}

struct OpenFile {
    file: File,
    path: PathBuf,
    name: String,
    bytes: u64,
    chunks: u64,
}

impl TransferReceiver {
    pub fn new(receive_dir: PathBuf) -> Self {
        Self { receive_dir }
    }

    /// Accept loop; runs for the life of the process.
    pub async fn serve(&self, listener: TcpListener) {
        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    tracing::debug!(%addr, "inbound transfer stream");
                    let receiver = self.clone();
                    tokio::spawn(async move {
                        match receiver.handle_stream(stream).await {
                            Ok(result) => tracing::info!(
                                %addr,
                                bytes = result.bytes_received,
                                "{}",
                                result.message
                            ),
                            Err(e) => tracing::warn!(%addr, "inbound transfer failed: {e}"),
                        }
                    });
                }
                Err(e) => tracing::warn!("accept failed: {e}"),
            }
        }
    }

    /// Reassemble one inbound chunk stream.
    ///
    /// The destination file is created when the first chunk arrives and every
    /// later payload is appended in arrival order. Exactly one result frame
    /// goes back on the stream. Any mid-stream failure deletes the partial
    /// file, so a half-written destination is never left behind.
    pub async fn handle_stream(
        &self,
        mut stream: TcpStream,
    ) -> Result<TransferResult, TransferError> {
        let mut open: Option<OpenFile> = None;
        match self.receive_into(&mut stream, &mut open).await {
            Ok(result) => {
                if let Err(e) = wire::write_message(&mut stream, &result).await {
                    tracing::debug!("could not send transfer result: {e}");
                }
                Ok(result)
            }
            Err(err) => {
                if let Some(dest) = open.take() {
                    discard(dest).await;
                }
                // On a transport failure the connection is already gone;
                // otherwise tell the sender why the stream was refused.
                if !matches!(err, TransferError::Transport(_)) {
                    let reply = TransferResult {
                        success: false,
                        message: err.to_string(),
                        bytes_received: 0,
                    };
                    if let Err(e) = wire::write_message(&mut stream, &reply).await {
                        tracing::debug!("could not send failure result: {e}");
                    }
                }
                Err(err)
            }
        }
    }

    async fn receive_into(
        &self,
        stream: &mut TcpStream,
        open: &mut Option<OpenFile>,
    ) -> Result<TransferResult, TransferError> {
        loop {
            let frame = wire::read_message::<_, StreamFrame>(stream)
                .await
                .map_err(TransferError::Transport)?
                .ok_or_else(|| {
                    TransferError::Transport(std::io::Error::new(
                        std::io::ErrorKind::UnexpectedEof,
                        "stream closed before end-of-stream marker",
                    ))
                })?;

            let chunk = match frame {
                StreamFrame::Chunk(chunk) => chunk,
                StreamFrame::End => {
                    let Some(dest) = open.as_mut() else {
                        return Ok(TransferResult {
                            success: false,
                            message: "no chunks received".to_string(),
                            bytes_received: 0,
                        });
                    };
                    dest.file.flush().await.map_err(TransferError::Io)?;
                    tracing::info!(
                        file = %dest.name,
                        bytes = dest.bytes,
                        chunks = dest.chunks,
                        "file received"
                    );
                    let result = TransferResult {
                        success: true,
                        message: format!("File {} received successfully", dest.name),
                        bytes_received: dest.bytes,
                    };
                    // Complete: close the handle, keep the file.
                    *open = None;
                    return Ok(result);
                }
            };

            if open.is_none() {
                let name = sanitized_file_name(&chunk.file_name)?;
                tokio::fs::create_dir_all(&self.receive_dir)
                    .await
                    .map_err(TransferError::Io)?;
                let path = self.receive_dir.join(&name);
                tracing::info!(file = %name, total = chunk.total_chunks, "receiving file");
                let file = File::create(&path).await.map_err(TransferError::Io)?;
                *open = Some(OpenFile {
                    file,
                    path,
                    name,
                    bytes: 0,
                    chunks: 0,
                });
            }

            if let Some(dest) = open.as_mut() {
                dest.file
                    .write_all(&chunk.data)
                    .await
                    .map_err(TransferError::Io)?;
                dest.bytes += chunk.data.len() as u64;
                dest.chunks += 1;
                tracing::debug!(
                    chunk = chunk.chunk_number,
                    of = chunk.total_chunks,
                    len = chunk.data.len(),
                    "chunk written"
                );
            }
        }
    }
}

async fn discard(dest: OpenFile) {
    drop(dest.file);
    match tokio::fs::remove_file(&dest.path).await {
        Ok(()) => tracing::debug!(path = %dest.path.display(), "partial file removed"),
        Err(e) => {
            tracing::warn!(path = %dest.path.display(), "could not remove partial file: {e}")
        }
    }
}

/// Destination names come from the remote sender; only a bare file name is
/// accepted. Anything that could escape the receive directory is rejected.
fn sanitized_file_name(name: &str) -> Result<String, TransferError> {
    if name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\\')
        || name.contains('\0')
    {
        return Err(TransferError::InvalidFileName(name.to_string()));
    }
    Ok(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::FileChunk;
    use tempfile::TempDir;
    use tokio::net::TcpListener;

    fn chunk(name: &str, data: &[u8], number: u64, total: u64) -> StreamFrame {
        StreamFrame::Chunk(FileChunk {
            file_name: name.to_string(),
            data: data.to_vec(),
            chunk_number: number,
            total_chunks: total,
        })
    }

    async fn accept_one(dir: &TempDir) -> (tokio::task::JoinHandle<Result<TransferResult, TransferError>>, std::net::SocketAddr) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let receiver = TransferReceiver::new(dir.path().to_path_buf());
        let handle = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            receiver.handle_stream(stream).await
        });
        (handle, addr)
    }

    #[test]
    fn file_names_that_escape_the_receive_dir_are_rejected() {
        assert!(sanitized_file_name("photo.jpg").is_ok());
        assert!(sanitized_file_name("").is_err());
        assert!(sanitized_file_name("..").is_err());
        assert!(sanitized_file_name("../etc/passwd").is_err());
        assert!(sanitized_file_name("a/b.txt").is_err());
        assert!(sanitized_file_name("a\\b.txt").is_err());
    }

    #[tokio::test]
    async fn reassembles_chunks_in_arrival_order() {
        let dir = TempDir::new().unwrap();
        let (handle, addr) = accept_one(&dir).await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        wire::write_message(&mut stream, &chunk("doc.txt", b"hello ", 1, 2))
            .await
            .unwrap();
        wire::write_message(&mut stream, &chunk("doc.txt", b"world", 2, 2))
            .await
            .unwrap();
        wire::write_message(&mut stream, &StreamFrame::End).await.unwrap();

        let reply: TransferResult = wire::read_message(&mut stream).await.unwrap().unwrap();
        assert!(reply.success);
        assert_eq!(reply.bytes_received, 11);

        let result = handle.await.unwrap().unwrap();
        assert!(result.success);
        assert_eq!(
            std::fs::read(dir.path().join("doc.txt")).unwrap(),
            b"hello world"
        );
    }

    #[tokio::test]
    async fn a_cut_stream_leaves_no_partial_file() {
        let dir = TempDir::new().unwrap();
        let (handle, addr) = accept_one(&dir).await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        wire::write_message(&mut stream, &chunk("doc.txt", b"partial", 1, 3))
            .await
            .unwrap();
        drop(stream); // connection lost before the end-of-stream marker

        let err = handle.await.unwrap().unwrap_err();
        assert!(matches!(err, TransferError::Transport(_)));
        assert!(!dir.path().join("doc.txt").exists());
    }

    #[tokio::test]
    async fn zero_chunk_streams_create_nothing_and_are_refused() {
        let dir = TempDir::new().unwrap();
        let (handle, addr) = accept_one(&dir).await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        wire::write_message(&mut stream, &StreamFrame::End).await.unwrap();

        let reply: TransferResult = wire::read_message(&mut stream).await.unwrap().unwrap();
        assert!(!reply.success);
        assert_eq!(reply.bytes_received, 0);

        let result = handle.await.unwrap().unwrap();
        assert!(!result.success);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn traversal_file_names_are_refused_before_any_write() {
        let dir = TempDir::new().unwrap();
        let (handle, addr) = accept_one(&dir).await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        wire::write_message(&mut stream, &chunk("../escape.txt", b"nope", 1, 1))
            .await
            .unwrap();

        let reply: TransferResult = wire::read_message(&mut stream).await.unwrap().unwrap();
        assert!(!reply.success);

        let err = handle.await.unwrap().unwrap_err();
        assert!(matches!(err, TransferError::InvalidFileName(_)));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
