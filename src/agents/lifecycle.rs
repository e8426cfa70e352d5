//! Agent service lifecycle
//!
//! Starts and stops every launcher as one managed service. Failures leave the
//! service in a consistent `Error` or `Stopped` status before propagating.

use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{error, info};

use super::launcher::WorkerLauncher;
use super::orchestrator::AgentOrchestrator;
use super::runtime::RuntimeSupport;
use super::service::{Service, ServiceStatus};

pub struct AgentService {
    orchestrator: Arc<AgentOrchestrator>,
    status: Mutex<ServiceStatus>,
}

impl AgentService {
    pub fn new(orchestrator: Arc<AgentOrchestrator>) -> Self {
        Self {
            orchestrator,
            status: Mutex::new(ServiceStatus::Stopped),
        }
    }

    pub fn orchestrator(&self) -> &Arc<AgentOrchestrator> {
        &self.orchestrator
    }

    fn launchers(&self) -> &[Arc<dyn WorkerLauncher>] {
        self.orchestrator.launchers()
    }

    fn runtime(&self) -> &Arc<dyn RuntimeSupport> {
        self.orchestrator.runtime()
    }

    fn set_status(&self, status: ServiceStatus) {
        *self.status.lock() = status;
    }
}

impl Service for AgentService {
    fn name(&self) -> &str {
        "agent-service"
    }

    fn status(&self) -> ServiceStatus {
        *self.status.lock()
    }

    fn start(&self) -> anyhow::Result<()> {
        if self.runtime().status() != ServiceStatus::Started {
            self.set_status(ServiceStatus::Error);
            error!(
                "Cannot start agents: {} is {}",
                self.runtime().name(),
                self.runtime().status()
            );
            anyhow::bail!(
                "{} must be started before the agent service",
                self.runtime().name()
            );
        }

        self.set_status(ServiceStatus::Starting);
        for launcher in self.launchers() {
            if let Err(e) = launcher.start() {
                self.set_status(ServiceStatus::Error);
                error!("Failed to start {}: {:#}", launcher.name(), e);
                return Err(e.context(format!("starting {}", launcher.name())));
            }
        }

        self.set_status(ServiceStatus::Started);
        info!("Agent service started with {} launchers", self.launchers().len());
        Ok(())
    }

    fn stop(&self) -> anyhow::Result<()> {
        self.set_status(ServiceStatus::Stopping);

        let result = self.launchers().iter().try_for_each(|launcher| {
            launcher
                .stop()
                .map_err(|e| e.context(format!("stopping {}", launcher.name())))
        });

        // status is Stopped whether or not a launcher failed
        self.set_status(ServiceStatus::Stopped);
        match &result {
            Ok(()) => info!("Agent service stopped"),
            Err(e) => error!("Agent service stopped with error: {:#}", e),
        }
        result
    }
}
