//! HTTP/JSON control surface.
//!
//! Three routes drive the node from a frontend: peer listing, the local
//! system descriptor, and transfer initiation. The surface is a small
//! HTTP/1.1 responder on a plain TCP listener; bodies are JSON.

use crate::error::TransferError;
use crate::peer::{Peer, PeerRegistry};
use crate::scanner::PeerScanner;
use crate::sender::TransferSender;
use crate::sysinfo::SystemInfo;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

/// Request bodies past this size are refused outright.
const MAX_BODY_LEN: usize = 64 * 1024;

#[derive(Debug, Serialize)]
struct PeersResponse {
    peers: Vec<Peer>,
    count: usize,
}

#[derive(Debug, Deserialize)]
struct FileTransferRequest {
    #[serde(default)]
    peerid: String,
    #[serde(default)]
    file: String,
}

#[derive(Debug, Serialize)]
struct FileTransferResponse {
    message: String,
    peer: String,
    file: String,
    status: String,
}

struct Request {
    method: String,
    path: String,
    body: Vec<u8>,
}

struct Response {
    status: u16,
    reason: &'static str,
    content_type: &'static str,
    body: Vec<u8>,
}

impl Response {
    fn text(status: u16, reason: &'static str, body: &str) -> Self {
        Self {
            status,
            reason,
            content_type: "text/plain",
            body: body.as_bytes().to_vec(),
        }
    }

    fn json<T: Serialize>(value: &T) -> Self {
        match serde_json::to_vec(value) {
            Ok(body) => Self {
                status: 200,
                reason: "OK",
                content_type: "application/json",
                body,
            },
            Err(e) => {
                tracing::error!("response encoding failed: {e}");
                Self::text(500, "Internal Server Error", "internal server error")
            }
        }
    }

    fn method_not_allowed() -> Self {
        Self::text(405, "Method Not Allowed", "method not allowed")
    }
}

pub struct ApiServer {
    registry: Arc<PeerRegistry>,
    scanner: Arc<PeerScanner>,
    sender: TransferSender,
    info: SystemInfo,
}

impl ApiServer {
    pub fn new(
        registry: Arc<PeerRegistry>,
        scanner: Arc<PeerScanner>,
        sender: TransferSender,
        info: SystemInfo,
    ) -> Self {
        Self {
            registry,
            scanner,
            sender,
            info,
        }
    }

    /// Accept loop; runs for the life of the process.
    pub async fn serve(self: Arc<Self>, listener: TcpListener) {
        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    let server = self.clone();
                    tokio::spawn(async move {
                        if let Err(e) = server.handle_conn(stream).await {
                            tracing::debug!(%addr, "http connection error: {e}");
                        }
                    });
                }
                Err(e) => tracing::warn!("accept failed: {e}"),
            }
        }
    }

    async fn handle_conn(&self, mut stream: TcpStream) -> std::io::Result<()> {
        let Some(req) = read_request(&mut stream).await? else {
            return Ok(());
        };
        tracing::debug!(method = %req.method, path = %req.path, "http request");
        let resp = self.route(&req).await;
        write_response(&mut stream, &resp).await
    }

    async fn route(&self, req: &Request) -> Response {
        // CORS preflight from the frontend.
        if req.method == "OPTIONS" {
            return Response::text(200, "OK", "");
        }

        match req.path.as_str() {
            "/peers" => match req.method.as_str() {
                "GET" => self.get_peers().await,
                _ => Response::method_not_allowed(),
            },
            "/systeminfo" => match req.method.as_str() {
                "GET" => Response::json(&self.info),
                _ => Response::method_not_allowed(),
            },
            "/filetransfer" => match req.method.as_str() {
                "POST" => self.post_filetransfer(&req.body).await,
                _ => Response::method_not_allowed(),
            },
            _ => Response::text(404, "Not Found", "not found"),
        }
    }

    async fn get_peers(&self) -> Response {
        // An empty registry usually means no scan has completed yet; kick
        // one off without delaying this response.
        if self.registry.is_empty() {
            let scanner = self.scanner.clone();
            tokio::spawn(async move {
                scanner.scan().await;
            });
        }

        let peers = self.registry.list();
        Response::json(&PeersResponse {
            count: peers.len(),
            peers: peers.to_vec(),
        })
    }

    async fn post_filetransfer(&self, body: &[u8]) -> Response {
        let req: FileTransferRequest = match serde_json::from_slice(body) {
            Ok(req) => req,
            Err(_) => return Response::text(400, "Bad Request", "invalid JSON"),
        };
        if req.peerid.is_empty() || req.file.is_empty() {
            return Response::text(
                400,
                "Bad Request",
                "missing required fields: peerid and file",
            );
        }

        match self.sender.start(&req.peerid, Path::new(&req.file)).await {
            Ok(started) => Response::json(&FileTransferResponse {
                message: "File transfer initiated".to_string(),
                peer: started.peer_hostname,
                file: started.file_name,
                status: "started".to_string(),
            }),
            Err(TransferError::PeerNotFound(_)) => {
                Response::text(404, "Not Found", "peer not found")
            }
            Err(TransferError::FileNotFound(_)) => {
                Response::text(404, "Not Found", "file not found")
            }
            Err(e) => {
                tracing::error!("file transfer dispatch failed: {e}");
                Response::text(500, "Internal Server Error", "internal server error")
            }
        }
    }
}

async fn read_request(stream: &mut TcpStream) -> std::io::Result<Option<Request>> {
    let mut reader = BufReader::new(stream);

    let mut line = String::new();
    if reader.read_line(&mut line).await? == 0 {
        return Ok(None);
    }
    let mut parts = line.split_whitespace();
    let method = parts.next().unwrap_or_default().to_string();
    let path = parts.next().unwrap_or_default().to_string();

    let mut content_length = 0usize;
    loop {
        let mut header = String::new();
        if reader.read_line(&mut header).await? == 0 {
            break;
        }
        let header = header.trim_end();
        if header.is_empty() {
            break;
        }
        if let Some((name, value)) = header.split_once(':') {
            if name.eq_ignore_ascii_case("content-length") {
                content_length = value.trim().parse().unwrap_or(0);
            }
        }
    }

    if content_length > MAX_BODY_LEN {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "request body too large",
        ));
    }
    let mut body = vec![0u8; content_length];
    reader.read_exact(&mut body).await?;

    Ok(Some(Request { method, path, body }))
}

async fn write_response(stream: &mut TcpStream, resp: &Response) -> std::io::Result<()> {
    let head = format!(
        "HTTP/1.1 {} {}\r\n\
         Content-Type: {}\r\n\
         Content-Length: {}\r\n\
         Access-Control-Allow-Origin: *\r\n\
         Access-Control-Allow-Methods: GET, POST, OPTIONS\r\n\
         Access-Control-Allow-Headers: Content-Type\r\n\
         Connection: close\r\n\r\n",
        resp.status,
        resp.reason,
        resp.content_type,
        resp.body.len()
    );
    stream.write_all(head.as_bytes()).await?;
    stream.write_all(&resp.body).await?;
    stream.flush().await
}
