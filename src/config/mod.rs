//! Configuration module
//!
//! Handles loading and managing configuration.

mod env;
mod file;
mod profile;

pub use env::{print_env_help, EnvBuilder, EnvConfig, EnvGuard};
pub use file::ConfigFile;
pub use profile::PackageProfile;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::agents::{
    AgentOrchestrator, HostRuntimeSupport, ProcessLauncher, RuntimeSupport, WaitTimeout,
    DEFAULT_CALLBACK_ADDR,
};
use crate::executor::ExecutionContext;
use crate::models::Platform;

/// Application configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub agents: AgentConfig,

    #[serde(default)]
    pub execution: ExecutionConfig,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            agents: AgentConfig::default(),
            execution: ExecutionConfig::default(),
        }
    }
}

/// Agent orchestration settings
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Interval between registry checks while waiting for a worker
    pub poll_interval_ms: u64,

    /// Default time to wait for a worker to register; 0 waits forever
    pub launch_timeout_secs: u64,

    /// Runtimes available on this host; empty allows any
    pub runtimes: Vec<String>,

    /// Local address workers call back to; port 0 picks a free port
    pub callback_addr: String,

    /// Worker launchers, tried in order
    pub launchers: Vec<LauncherConfig>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 200,
            launch_timeout_secs: 30,
            runtimes: Vec::new(),
            callback_addr: DEFAULT_CALLBACK_ADDR.to_string(),
            launchers: vec![LauncherConfig::new(Platform::Current, "suitegrid-agent")],
        }
    }
}

impl AgentConfig {
    pub fn wait_timeout(&self) -> WaitTimeout {
        match self.launch_timeout_secs {
            0 => WaitTimeout::Infinite,
            secs => WaitTimeout::Finite(Duration::from_secs(secs)),
        }
    }

    /// Build runtime support and an orchestrator with one process launcher
    /// per configured entry. Workers are told to call back to `callback`.
    pub fn build_orchestrator(
        &self,
        callback: Option<&str>,
    ) -> (Arc<HostRuntimeSupport>, AgentOrchestrator) {
        let runtime = Arc::new(HostRuntimeSupport::new().with_runtimes(self.runtimes.clone()));

        let mut orchestrator = AgentOrchestrator::new(runtime.clone() as Arc<dyn RuntimeSupport>)
            .with_poll_interval(Duration::from_millis(self.poll_interval_ms));
        for launcher in &self.launchers {
            let mut built = launcher.build();
            if let Some(addr) = callback {
                built = built.with_callback(addr);
            }
            orchestrator = orchestrator.with_launcher(Arc::new(built));
        }

        (runtime, orchestrator)
    }
}

/// One worker launcher
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LauncherConfig {
    /// Optional display name, defaults to `<platform>-launcher`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    pub platform: Platform,

    /// Worker executable
    pub program: PathBuf,

    /// Extra arguments placed before the agent arguments
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
}

impl LauncherConfig {
    pub fn new(platform: Platform, program: impl Into<PathBuf>) -> Self {
        Self {
            name: None,
            platform,
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn build(&self) -> ProcessLauncher {
        let launcher = ProcessLauncher::for_platform(self.platform, &self.program)
            .with_args(self.args.clone());
        match &self.name {
            Some(name) => launcher.with_name(name),
            None => launcher,
        }
    }
}

/// Local execution settings
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Per-test timeout in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_timeout_ms: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub culture: Option<String>,
}

impl ExecutionConfig {
    pub fn context(&self) -> ExecutionContext {
        let mut context = ExecutionContext::new();
        if let Some(ms) = self.default_timeout_ms {
            context = context.with_timeout(Duration::from_millis(ms));
        }
        if let Some(culture) = &self.culture {
            context = context.with_culture(culture);
        }
        context
    }
}
