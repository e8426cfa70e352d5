//! Managed services
//!
//! Common start/stop/status surface for the long-lived components.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    #[default]
    Stopped,
    Starting,
    Started,
    Stopping,
    Error,
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceStatus::Stopped => write!(f, "Stopped"),
            ServiceStatus::Starting => write!(f, "Starting"),
            ServiceStatus::Started => write!(f, "Started"),
            ServiceStatus::Stopping => write!(f, "Stopping"),
            ServiceStatus::Error => write!(f, "Error"),
        }
    }
}

/// A component with a managed lifecycle
pub trait Service: Send + Sync {
    fn name(&self) -> &str;

    fn status(&self) -> ServiceStatus;

    fn start(&self) -> anyhow::Result<()>;

    fn stop(&self) -> anyhow::Result<()>;
}
