//! Inbound agent messages
//!
//! Workers announce themselves and report status through messages on a
//! channel owned by the orchestrator. Whatever transport carries the calls
//! across the process boundary hands them to an `AgentInbox`; a dedicated
//! acceptor task applies them to the registry.

use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::error::AgentError;
use super::orchestrator::AgentOrchestrator;
use crate::models::{AgentHandle, AgentStatus};

const INBOX_CAPACITY: usize = 256;

/// A call from a worker process
#[derive(Debug)]
pub enum AgentMessage {
    Register {
        agent: AgentHandle,
        reply: oneshot::Sender<Result<(), AgentError>>,
    },
    ReportStatus {
        id: Uuid,
        status: AgentStatus,
        reply: oneshot::Sender<Result<(), AgentError>>,
    },
}

/// Sending side of the orchestrator's inbound channel
#[derive(Clone, Debug)]
pub struct AgentInbox {
    sender: mpsc::Sender<AgentMessage>,
}

impl AgentInbox {
    pub async fn register(&self, agent: AgentHandle) -> Result<(), AgentError> {
        let (reply, response) = oneshot::channel();
        self.send(AgentMessage::Register { agent, reply }).await?;
        response.await.map_err(|_| AgentError::InboxClosed)?
    }

    pub async fn report_status(&self, id: Uuid, status: AgentStatus) -> Result<(), AgentError> {
        let (reply, response) = oneshot::channel();
        self.send(AgentMessage::ReportStatus { id, status, reply })
            .await?;
        response.await.map_err(|_| AgentError::InboxClosed)?
    }

    async fn send(&self, message: AgentMessage) -> Result<(), AgentError> {
        self.sender
            .send(message)
            .await
            .map_err(|_| AgentError::InboxClosed)
    }
}

/// Spawn the acceptor task. It runs until every inbox clone is dropped.
pub fn spawn_acceptor(orchestrator: Arc<AgentOrchestrator>) -> (AgentInbox, JoinHandle<()>) {
    let (sender, mut receiver) = mpsc::channel(INBOX_CAPACITY);

    let handle = tokio::spawn(async move {
        info!("Agent acceptor started");
        while let Some(message) = receiver.recv().await {
            handle_message(&orchestrator, message);
        }
        info!("Agent acceptor stopped");
    });

    (AgentInbox { sender }, handle)
}

fn handle_message(orchestrator: &AgentOrchestrator, message: AgentMessage) {
    match message {
        AgentMessage::Register { agent, reply } => {
            debug!("Inbound register from {}", agent);
            let result = orchestrator.register(agent);
            if let Err(e) = &result {
                warn!("Rejected registration: {}", e);
            }
            let _ = reply.send(result);
        }
        AgentMessage::ReportStatus { id, status, reply } => {
            debug!("Inbound status {} from {}", status, id);
            let result = orchestrator.report_status(id, status);
            if let Err(e) = &result {
                warn!("Rejected status report: {}", e);
            }
            let _ = reply.send(result);
        }
    }
}
