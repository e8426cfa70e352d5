//! Agent orchestration
//!
//! Launching out-of-process workers per target platform, tracking them in a
//! registry, and waiting for them to call back and register over a local
//! listener.

mod error;
mod inbound;
mod launcher;
mod lifecycle;
mod orchestrator;
mod registry;
mod runtime;
mod service;
mod transport;

pub use error::AgentError;
pub use inbound::{spawn_acceptor, AgentInbox, AgentMessage};
pub use launcher::{ProcessLauncher, WorkerLauncher};
pub use lifecycle::AgentService;
pub use orchestrator::{
    AgentOrchestrator, WaitTimeout, DEFAULT_POLL_INTERVAL, MIN_POLL_INTERVAL,
};
pub use registry::WorkerRegistry;
pub use runtime::{HostRuntimeSupport, RuntimeSupport};
pub use service::{Service, ServiceStatus};
pub use transport::{
    CallbackClient, CallbackReply, CallbackRequest, CallbackServer, DEFAULT_CALLBACK_ADDR,
};
