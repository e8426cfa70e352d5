//! Agent orchestration errors

use thiserror::Error;
use uuid::Uuid;

use crate::models::{AgentStatus, Platform, PlatformError};

/// Errors surfaced to callers of the orchestration API.
///
/// These indicate programming or configuration mistakes and are never turned
/// into test results. A worker that does not register in time is not an
/// error; `request_worker` returns `None` for it.
#[derive(Error, Debug)]
pub enum AgentError {
    #[error(transparent)]
    Platform(#[from] PlatformError),

    #[error("No agent launcher supports platform {platform} required by package {package}")]
    UnsupportedPlatform { package: String, platform: Platform },

    #[error("Unable to select a runtime for package {package}: {reason}")]
    RuntimeSelection { package: String, reason: String },

    #[error("Launcher {launcher} failed to start a worker: {reason}")]
    Launch { launcher: String, reason: String },

    #[error("Agent {0} is not known to the registry")]
    UnknownAgent(Uuid),

    #[error("Agent {0} is already registered")]
    AlreadyRegistered(Uuid),

    #[error("Agent {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: Uuid,
        from: AgentStatus,
        to: AgentStatus,
    },

    #[error("Agent inbox is closed")]
    InboxClosed,
}
