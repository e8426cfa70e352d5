//! Worker models
//!
//! Agent status, the worker reference handed to clients, and the record the
//! registry keeps for every launched worker process.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Lifecycle status of an agent
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    #[default]
    Unknown,
    Starting,
    Ready,
    Busy,
    Stopping,
}

impl AgentStatus {
    /// Whether a record may move from `self` to `next`.
    ///
    /// `Stopping` is terminal: the record is only ever removed afterwards.
    pub fn can_transition_to(self, next: AgentStatus) -> bool {
        !matches!(self, AgentStatus::Stopping) || next == AgentStatus::Stopping
    }

    pub fn from_str(s: &str) -> Option<AgentStatus> {
        match s.to_lowercase().as_str() {
            "unknown" => Some(AgentStatus::Unknown),
            "starting" => Some(AgentStatus::Starting),
            "ready" => Some(AgentStatus::Ready),
            "busy" => Some(AgentStatus::Busy),
            "stopping" => Some(AgentStatus::Stopping),
            _ => None,
        }
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentStatus::Unknown => write!(f, "Unknown"),
            AgentStatus::Starting => write!(f, "Starting"),
            AgentStatus::Ready => write!(f, "Ready"),
            AgentStatus::Busy => write!(f, "Busy"),
            AgentStatus::Stopping => write!(f, "Stopping"),
        }
    }
}

/// Reference to a registered agent, as announced by the worker itself
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgentHandle {
    pub id: Uuid,
    /// Address the call channel uses to reach the worker
    pub endpoint: String,
}

impl AgentHandle {
    pub fn new(id: Uuid, endpoint: impl Into<String>) -> Self {
        Self {
            id,
            endpoint: endpoint.into(),
        }
    }
}

impl fmt::Display for AgentHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "agent {} @ {}", self.id, self.endpoint)
    }
}

/// Bookkeeping entry for one launched worker
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkerRecord {
    pub id: Uuid,
    /// Name of the launcher that owns the process
    pub launcher: String,
    pub pid: Option<u32>,
    /// Set once the worker registers
    pub agent: Option<AgentHandle>,
    pub status: AgentStatus,
    pub created_at: DateTime<Utc>,
}

impl WorkerRecord {
    /// A freshly launched worker that has not registered yet
    pub fn starting(id: Uuid, launcher: impl Into<String>, pid: Option<u32>) -> Self {
        Self {
            id,
            launcher: launcher.into(),
            pid,
            agent: None,
            status: AgentStatus::Starting,
            created_at: Utc::now(),
        }
    }

    pub fn is_registered(&self) -> bool {
        self.agent.is_some()
    }
}
