//! Runtime support
//!
//! Chooses the concrete runtime a worker process should use for a package.

use parking_lot::Mutex;
use tracing::{debug, info};

use super::error::AgentError;
use super::service::{Service, ServiceStatus};
use crate::models::{settings, Platform, TestPackage};

/// Collaborator that picks a runtime descriptor for a package
pub trait RuntimeSupport: Service {
    fn select_runtime(&self, package: &TestPackage) -> Result<String, AgentError>;
}

/// Runtime support for the runtimes installed on this host
#[derive(Debug)]
pub struct HostRuntimeSupport {
    /// Runtimes that may be requested; empty means any
    available: Vec<String>,
    status: Mutex<ServiceStatus>,
}

impl HostRuntimeSupport {
    pub fn new() -> Self {
        Self {
            available: Vec::new(),
            status: Mutex::new(ServiceStatus::Stopped),
        }
    }

    pub fn with_runtimes(mut self, runtimes: Vec<String>) -> Self {
        self.available = runtimes;
        self
    }

    /// Runtime used when a package does not ask for one
    pub fn default_runtime() -> String {
        format!("native-{}", Platform::host())
    }
}

impl Default for HostRuntimeSupport {
    fn default() -> Self {
        Self::new()
    }
}

impl Service for HostRuntimeSupport {
    fn name(&self) -> &str {
        "runtime-support"
    }

    fn status(&self) -> ServiceStatus {
        *self.status.lock()
    }

    fn start(&self) -> anyhow::Result<()> {
        info!(
            "Runtime support started ({} runtimes configured)",
            self.available.len()
        );
        *self.status.lock() = ServiceStatus::Started;
        Ok(())
    }

    fn stop(&self) -> anyhow::Result<()> {
        *self.status.lock() = ServiceStatus::Stopped;
        Ok(())
    }
}

impl RuntimeSupport for HostRuntimeSupport {
    fn select_runtime(&self, package: &TestPackage) -> Result<String, AgentError> {
        let runtime = match package.get(settings::RUNTIME_FRAMEWORK) {
            Some(requested) => requested.to_string(),
            None => Self::default_runtime(),
        };

        if !self.available.is_empty() && !self.available.contains(&runtime) {
            return Err(AgentError::RuntimeSelection {
                package: package.name.clone(),
                reason: format!("runtime {runtime} is not installed"),
            });
        }

        debug!("Selected runtime {} for {}", runtime, package.name);
        Ok(runtime)
    }
}
