//! Worker launchers
//!
//! A launcher starts worker processes for one platform and owns their
//! process handles until the worker is terminated or the launcher stops.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::error::AgentError;
use super::service::{Service, ServiceStatus};
use crate::models::{Platform, TestPackage, WorkerRecord};

/// Capability shared by all launchers
pub trait WorkerLauncher: Service {
    fn handles_platform(&self, platform: Platform) -> bool;

    /// Start a worker process; the returned record is `Starting`
    fn launch_worker(
        &self,
        package: &TestPackage,
        runtime: &str,
    ) -> Result<WorkerRecord, AgentError>;

    /// Kill one worker process; false if this launcher does not own it
    fn terminate(&self, id: Uuid) -> bool;

    /// Forget processes that exited on their own and return their ids
    fn reap_exited(&self) -> Vec<Uuid>;

    fn active_processes(&self) -> usize;
}

/// Launches a worker executable targeting a single platform
#[derive(Debug)]
pub struct ProcessLauncher {
    name: String,
    platform: Platform,
    program: PathBuf,
    args: Vec<String>,
    env: Vec<(String, String)>,
    callback: Option<String>,
    processes: Mutex<HashMap<Uuid, Child>>,
    status: Mutex<ServiceStatus>,
}

impl ProcessLauncher {
    pub fn for_platform(platform: Platform, program: impl Into<PathBuf>) -> Self {
        Self {
            name: format!("{platform}-launcher"),
            platform,
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            callback: None,
            processes: Mutex::new(HashMap::new()),
            status: Mutex::new(ServiceStatus::Stopped),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Address workers call back to, passed as `--callback`
    pub fn with_callback(mut self, addr: impl Into<String>) -> Self {
        self.callback = Some(addr.into());
        self
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    fn command(&self, id: Uuid, package: &TestPackage, runtime: &str) -> Result<Command, AgentError> {
        let package_json = serde_json::to_string(package).map_err(|e| AgentError::Launch {
            launcher: self.name.clone(),
            reason: format!("cannot serialize package: {e}"),
        })?;

        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .arg("--agent-id")
            .arg(id.to_string())
            .arg("--platform")
            .arg(self.platform.concrete().name())
            .arg("--runtime")
            .arg(runtime)
            .arg("--package")
            .arg(package_json);
        if let Some(callback) = &self.callback {
            command.arg("--callback").arg(callback);
        }
        command
            .envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .kill_on_drop(true);
        Ok(command)
    }
}

impl Service for ProcessLauncher {
    fn name(&self) -> &str {
        &self.name
    }

    fn status(&self) -> ServiceStatus {
        *self.status.lock()
    }

    fn start(&self) -> anyhow::Result<()> {
        if !self.program.exists() && self.program.components().count() > 1 {
            *self.status.lock() = ServiceStatus::Error;
            anyhow::bail!(
                "{}: worker executable {} does not exist",
                self.name,
                self.program.display()
            );
        }

        info!("{} started ({})", self.name, self.program.display());
        *self.status.lock() = ServiceStatus::Started;
        Ok(())
    }

    fn stop(&self) -> anyhow::Result<()> {
        *self.status.lock() = ServiceStatus::Stopping;

        let mut processes = self.processes.lock();
        for (id, mut child) in processes.drain() {
            debug!("{} killing worker {}", self.name, id);
            if let Err(e) = child.start_kill() {
                warn!("{} failed to kill worker {}: {}", self.name, id, e);
            }
        }

        *self.status.lock() = ServiceStatus::Stopped;
        info!("{} stopped", self.name);
        Ok(())
    }
}

impl WorkerLauncher for ProcessLauncher {
    fn handles_platform(&self, platform: Platform) -> bool {
        platform == self.platform || platform.concrete() == self.platform.concrete()
    }

    fn launch_worker(
        &self,
        package: &TestPackage,
        runtime: &str,
    ) -> Result<WorkerRecord, AgentError> {
        if self.status() != ServiceStatus::Started {
            return Err(AgentError::Launch {
                launcher: self.name.clone(),
                reason: format!("launcher is {}", self.status()),
            });
        }

        let id = Uuid::new_v4();
        let child = self
            .command(id, package, runtime)?
            .spawn()
            .map_err(|e| AgentError::Launch {
                launcher: self.name.clone(),
                reason: format!("{}: {e}", self.program.display()),
            })?;

        let pid = child.id();
        info!(
            "{} launched worker {} (pid {:?}) for {} on {}",
            self.name, id, pid, package.name, runtime
        );
        self.processes.lock().insert(id, child);

        Ok(WorkerRecord::starting(id, self.name.clone(), pid))
    }

    fn terminate(&self, id: Uuid) -> bool {
        match self.processes.lock().remove(&id) {
            Some(mut child) => {
                if let Err(e) = child.start_kill() {
                    warn!("{} failed to kill worker {}: {}", self.name, id, e);
                }
                true
            }
            None => false,
        }
    }

    fn reap_exited(&self) -> Vec<Uuid> {
        let mut processes = self.processes.lock();
        let exited: Vec<Uuid> = processes
            .iter_mut()
            .filter_map(|(id, child)| match child.try_wait() {
                Ok(Some(status)) => {
                    debug!("Worker {} exited with {}", id, status);
                    Some(*id)
                }
                Ok(None) => None,
                Err(e) => {
                    warn!("Cannot poll worker {}: {}", id, e);
                    None
                }
            })
            .collect();

        for id in &exited {
            processes.remove(id);
        }
        exited
    }

    fn active_processes(&self) -> usize {
        self.processes.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_matching() {
        let launcher = ProcessLauncher::for_platform(Platform::X86, "worker");
        assert!(launcher.handles_platform(Platform::X86));
        assert!(!launcher.handles_platform(Platform::Arm64));

        let native = ProcessLauncher::for_platform(Platform::Current, "worker");
        assert!(native.handles_platform(Platform::Current));
        assert!(native.handles_platform(Platform::host()));
        assert_eq!(native.name(), "current-launcher");
    }

    #[test]
    fn test_command_passes_callback_address() {
        let launcher = ProcessLauncher::for_platform(Platform::X86, "worker")
            .with_args(vec!["--quiet".to_string()])
            .with_callback("127.0.0.1:40111");
        let id = Uuid::new_v4();

        let command = launcher
            .command(id, &TestPackage::new("tests.dll"), "native-x86")
            .unwrap();
        let args: Vec<String> = command
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();

        assert_eq!(args[0], "--quiet");
        assert_eq!(args[1], "--agent-id");
        assert_eq!(args[2], id.to_string());
        assert_eq!(args[3..5], ["--platform", "x86"]);
        let callback = args.iter().position(|a| a == "--callback").unwrap();
        assert_eq!(args[callback + 1], "127.0.0.1:40111");

        let without = ProcessLauncher::for_platform(Platform::X86, "worker")
            .command(id, &TestPackage::new("tests.dll"), "native-x86")
            .unwrap();
        assert!(!without.as_std().get_args().any(|a| a == "--callback"));
    }

    #[test]
    fn test_launch_requires_start() {
        let launcher = ProcessLauncher::for_platform(Platform::Current, "worker");
        let err = launcher
            .launch_worker(&TestPackage::new("p"), "native")
            .unwrap_err();
        assert!(matches!(err, AgentError::Launch { .. }));
    }

    #[test]
    fn test_start_fails_for_missing_executable() {
        let launcher = ProcessLauncher::for_platform(Platform::Current, "/nonexistent/bin/worker");
        assert!(launcher.start().is_err());
        assert_eq!(launcher.status(), ServiceStatus::Error);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_launch_and_stop_kills_workers() {
        let launcher = ProcessLauncher::for_platform(Platform::Current, "sh")
            .with_args(vec!["-c".to_string(), "sleep 30".to_string()]);
        launcher.start().unwrap();

        let record = launcher
            .launch_worker(&TestPackage::new("p"), "native")
            .unwrap();
        assert_eq!(record.launcher, "current-launcher");
        assert!(record.pid.is_some());
        assert_eq!(launcher.active_processes(), 1);

        launcher.stop().unwrap();
        assert_eq!(launcher.active_processes(), 0);
        assert_eq!(launcher.status(), ServiceStatus::Stopped);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_reap_exited_workers() {
        let launcher = ProcessLauncher::for_platform(Platform::Current, "true");
        launcher.start().unwrap();

        let record = launcher
            .launch_worker(&TestPackage::new("p"), "native")
            .unwrap();

        let mut reaped = Vec::new();
        for _ in 0..50 {
            reaped = launcher.reap_exited();
            if !reaped.is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }

        assert_eq!(reaped, vec![record.id]);
        assert_eq!(launcher.active_processes(), 0);
    }
}
