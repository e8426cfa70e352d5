//! Local callback transport
//!
//! Carries worker calls across the process boundary: a TCP listener on the
//! loopback interface reads one JSON request per line and answers with one
//! JSON reply per line. Requests are handed to an `AgentInbox`, so the
//! registry is only touched by the acceptor task.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::error::AgentError;
use super::inbound::AgentInbox;
use crate::models::{AgentHandle, AgentStatus};

/// Default bind address; port 0 picks a free port
pub const DEFAULT_CALLBACK_ADDR: &str = "127.0.0.1:0";

/// One call from a worker
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "call", rename_all = "snake_case")]
pub enum CallbackRequest {
    Register { id: Uuid, endpoint: String },
    ReportStatus { id: Uuid, status: AgentStatus },
}

/// Answer to one `CallbackRequest`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CallbackReply {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CallbackReply {
    fn from_result(result: Result<(), AgentError>) -> Self {
        match result {
            Ok(()) => Self { ok: true, error: None },
            Err(e) => Self {
                ok: false,
                error: Some(e.to_string()),
            },
        }
    }
}

/// Listener that workers call back to
pub struct CallbackServer {
    listener: TcpListener,
    addr: SocketAddr,
}

impl CallbackServer {
    pub async fn bind(addr: &str) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let addr = listener.local_addr()?;
        Ok(Self { listener, addr })
    }

    /// Address handed to workers through `--callback`
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Accept connections until `shutdown` is cancelled
    pub fn serve(self, inbox: AgentInbox, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("Callback listener on {}", self.addr);
            loop {
                let accepted = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    accepted = self.listener.accept() => accepted,
                };

                match accepted {
                    Ok((stream, peer)) => {
                        debug!("Worker connection from {}", peer);
                        let inbox = inbox.clone();
                        let shutdown = shutdown.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, inbox, shutdown).await {
                                warn!("Worker connection {} failed: {}", peer, e);
                            }
                        });
                    }
                    Err(e) => warn!("Accept failed: {}", e),
                }
            }
            info!("Callback listener on {} stopped", self.addr);
        })
    }
}

async fn handle_connection(
    stream: TcpStream,
    inbox: AgentInbox,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let (read, mut write) = stream.into_split();
    let mut lines = BufReader::new(read).lines();

    loop {
        let line = tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            line = lines.next_line() => line?,
        };
        let Some(line) = line else {
            return Ok(());
        };
        if line.trim().is_empty() {
            continue;
        }

        let reply = match serde_json::from_str::<CallbackRequest>(&line) {
            Ok(request) => CallbackReply::from_result(dispatch(&inbox, request).await),
            Err(e) => CallbackReply {
                ok: false,
                error: Some(format!("malformed request: {e}")),
            },
        };

        let mut encoded = serde_json::to_string(&reply)?;
        encoded.push('\n');
        write.write_all(encoded.as_bytes()).await?;
    }
}

async fn dispatch(inbox: &AgentInbox, request: CallbackRequest) -> Result<(), AgentError> {
    match request {
        CallbackRequest::Register { id, endpoint } => {
            inbox.register(AgentHandle::new(id, endpoint)).await
        }
        CallbackRequest::ReportStatus { id, status } => inbox.report_status(id, status).await,
    }
}

/// Worker side of the callback transport
pub struct CallbackClient {
    lines: tokio::io::Lines<BufReader<tokio::net::tcp::OwnedReadHalf>>,
    write: tokio::net::tcp::OwnedWriteHalf,
}

impl CallbackClient {
    pub async fn connect(addr: &str) -> anyhow::Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        let (read, write) = stream.into_split();
        Ok(Self {
            lines: BufReader::new(read).lines(),
            write,
        })
    }

    pub async fn register(&mut self, id: Uuid, endpoint: impl Into<String>) -> anyhow::Result<()> {
        self.call(CallbackRequest::Register {
            id,
            endpoint: endpoint.into(),
        })
        .await
    }

    pub async fn report_status(&mut self, id: Uuid, status: AgentStatus) -> anyhow::Result<()> {
        self.call(CallbackRequest::ReportStatus { id, status }).await
    }

    async fn call(&mut self, request: CallbackRequest) -> anyhow::Result<()> {
        let mut encoded = serde_json::to_string(&request)?;
        encoded.push('\n');
        self.write.write_all(encoded.as_bytes()).await?;

        let line = self
            .lines
            .next_line()
            .await?
            .ok_or_else(|| anyhow::anyhow!("callback listener closed the connection"))?;
        let reply: CallbackReply = serde_json::from_str(&line)?;
        if reply.ok {
            return Ok(());
        }
        anyhow::bail!(reply.error.unwrap_or_else(|| "call rejected".to_string()))
    }
}
