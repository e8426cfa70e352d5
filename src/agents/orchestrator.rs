//! Agent orchestrator
//!
//! Matches a package to a platform-compatible launcher, starts a worker, and
//! waits for the worker to call back and register. Waiting only suspends the
//! calling task; registrations and status reports are served concurrently.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::error::AgentError;
use super::launcher::WorkerLauncher;
use super::registry::WorkerRegistry;
use super::runtime::RuntimeSupport;
use crate::models::{AgentHandle, AgentStatus, TestPackage};

/// Interval between registry checks while waiting for a worker
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Shorter intervals are raised to this
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// How long `request_worker` waits for the worker to register
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WaitTimeout {
    Finite(Duration),
    Infinite,
}

impl WaitTimeout {
    pub fn from_millis(ms: u64) -> Self {
        WaitTimeout::Finite(Duration::from_millis(ms))
    }

    fn expired(&self, waited: Duration) -> bool {
        match self {
            WaitTimeout::Finite(limit) => waited >= *limit,
            WaitTimeout::Infinite => false,
        }
    }
}

impl fmt::Display for WaitTimeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WaitTimeout::Finite(d) => write!(f, "{}ms", d.as_millis()),
            WaitTimeout::Infinite => write!(f, "infinite"),
        }
    }
}

pub struct AgentOrchestrator {
    registry: Arc<WorkerRegistry>,
    launchers: Vec<Arc<dyn WorkerLauncher>>,
    runtime: Arc<dyn RuntimeSupport>,
    poll_interval: Duration,
}

impl AgentOrchestrator {
    pub fn new(runtime: Arc<dyn RuntimeSupport>) -> Self {
        Self {
            registry: Arc::new(WorkerRegistry::new()),
            launchers: Vec::new(),
            runtime,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Launchers are tried in the order they are added
    pub fn with_launcher(mut self, launcher: Arc<dyn WorkerLauncher>) -> Self {
        self.launchers.push(launcher);
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        if interval < MIN_POLL_INTERVAL {
            warn!(
                "Poll interval {}ms raised to {}ms",
                interval.as_millis(),
                MIN_POLL_INTERVAL.as_millis()
            );
        }
        self.poll_interval = interval.max(MIN_POLL_INTERVAL);
        self
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn registry(&self) -> &Arc<WorkerRegistry> {
        &self.registry
    }

    pub fn launchers(&self) -> &[Arc<dyn WorkerLauncher>] {
        &self.launchers
    }

    pub fn runtime(&self) -> &Arc<dyn RuntimeSupport> {
        &self.runtime
    }

    /// Start a worker for the package and wait for it to register.
    ///
    /// Returns `Ok(None)` if the worker did not register within `wait`. The
    /// unregistered worker is stopped and its record dropped, so a late
    /// registration is rejected as unknown.
    pub async fn request_worker(
        &self,
        package: &TestPackage,
        wait: WaitTimeout,
    ) -> Result<Option<AgentHandle>, AgentError> {
        let platform = package.target_platform()?;

        let launcher = self
            .launchers
            .iter()
            .find(|l| l.handles_platform(platform))
            .ok_or_else(|| AgentError::UnsupportedPlatform {
                package: package.name.clone(),
                platform,
            })?;

        let runtime = self.runtime.select_runtime(package)?;

        info!(
            "Requesting {} worker for {} via {} (wait {})",
            platform,
            package.name,
            launcher.name(),
            wait
        );

        let record = launcher.launch_worker(package, &runtime)?;
        let id = record.id;
        self.registry.add(record);

        let started = Instant::now();
        loop {
            sleep(self.poll_interval).await;

            if let Some(agent) = self.registry.agent(id) {
                debug!(
                    "Worker {} registered after {}ms",
                    id,
                    started.elapsed().as_millis()
                );
                return Ok(Some(agent));
            }

            if wait.expired(started.elapsed()) {
                warn!(
                    "Worker {} for {} did not register within {}",
                    id, package.name, wait
                );
                if let Err(e) = self.stop_agent(id) {
                    warn!("Cannot stop unregistered worker {}: {}", id, e);
                }
                return Ok(None);
            }
        }
    }

    /// Called by a newly started worker to announce itself
    pub fn register(&self, agent: AgentHandle) -> Result<(), AgentError> {
        let id = agent.id;
        self.registry.attach_agent(agent)?;
        info!("Agent {} registered", id);
        Ok(())
    }

    /// The only way status changes after registration
    pub fn report_status(&self, id: Uuid, status: AgentStatus) -> Result<(), AgentError> {
        let previous = self.registry.set_status(id, status)?;
        debug!("Agent {} reported {} (was {})", id, status, previous);
        Ok(())
    }

    /// Mark a worker ready for reuse. Unknown workers are only logged, since
    /// a release can race with the worker shutting down.
    pub fn release_agent(&self, agent: &AgentHandle) {
        let Some(id) = self.registry.id_of(agent) else {
            warn!("Release of unknown {}", agent);
            return;
        };

        match self.registry.set_status(id, AgentStatus::Ready) {
            Ok(_) => debug!("Agent {} released", id),
            Err(e) => warn!("Release of agent {} ignored: {}", id, e),
        }
    }

    /// Move a worker to `Stopping`, kill its process, and drop its record
    pub fn stop_agent(&self, id: Uuid) -> Result<(), AgentError> {
        self.registry.set_status(id, AgentStatus::Stopping)?;

        let terminated = self.launchers.iter().any(|l| l.terminate(id));
        if !terminated {
            debug!("No launcher owned a process for agent {}", id);
        }

        self.registry.remove(id);
        info!("Agent {} stopped", id);
        Ok(())
    }

    /// Drop records of workers whose processes exited on their own
    pub fn prune_exited(&self) -> Vec<Uuid> {
        let exited: Vec<Uuid> = self
            .launchers
            .iter()
            .flat_map(|l| l.reap_exited())
            .collect();

        for id in &exited {
            if self.registry.remove(*id).is_some() {
                info!("Agent {} exited", id);
            }
        }
        exited
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::agents::runtime::HostRuntimeSupport;
    use crate::agents::service::{Service, ServiceStatus};
    use crate::models::{settings, Platform, WorkerRecord};
    use parking_lot::Mutex;
    use std::time::Instant;

    /// Launcher that records launches instead of spawning processes
    pub(crate) struct FakeLauncher {
        name: String,
        platform: Platform,
        pub(crate) launched: Mutex<Vec<Uuid>>,
        pub(crate) terminated: Mutex<Vec<Uuid>>,
        pub(crate) fail_start: bool,
        pub(crate) fail_stop: bool,
        status: Mutex<ServiceStatus>,
    }

    impl FakeLauncher {
        pub(crate) fn new(name: &str, platform: Platform) -> Self {
            Self {
                name: name.to_string(),
                platform,
                launched: Mutex::new(Vec::new()),
                terminated: Mutex::new(Vec::new()),
                fail_start: false,
                fail_stop: false,
                status: Mutex::new(ServiceStatus::Stopped),
            }
        }

        pub(crate) fn last_launched(&self) -> Option<Uuid> {
            self.launched.lock().last().copied()
        }
    }

    impl Service for FakeLauncher {
        fn name(&self) -> &str {
            &self.name
        }

        fn status(&self) -> ServiceStatus {
            *self.status.lock()
        }

        fn start(&self) -> anyhow::Result<()> {
            if self.fail_start {
                anyhow::bail!("{} cannot start", self.name);
            }
            *self.status.lock() = ServiceStatus::Started;
            Ok(())
        }

        fn stop(&self) -> anyhow::Result<()> {
            *self.status.lock() = ServiceStatus::Stopped;
            if self.fail_stop {
                anyhow::bail!("{} cannot stop", self.name);
            }
            Ok(())
        }
    }

    impl WorkerLauncher for FakeLauncher {
        fn handles_platform(&self, platform: Platform) -> bool {
            platform == self.platform
        }

        fn launch_worker(
            &self,
            _package: &TestPackage,
            _runtime: &str,
        ) -> Result<WorkerRecord, AgentError> {
            let id = Uuid::new_v4();
            self.launched.lock().push(id);
            Ok(WorkerRecord::starting(id, self.name.clone(), None))
        }

        fn terminate(&self, id: Uuid) -> bool {
            if !self.launched.lock().contains(&id) {
                return false;
            }
            self.terminated.lock().push(id);
            true
        }

        fn reap_exited(&self) -> Vec<Uuid> {
            Vec::new()
        }

        fn active_processes(&self) -> usize {
            self.launched.lock().len() - self.terminated.lock().len()
        }
    }

    fn orchestrator(launchers: Vec<Arc<FakeLauncher>>) -> AgentOrchestrator {
        let mut orchestrator = AgentOrchestrator::new(Arc::new(HostRuntimeSupport::new()))
            .with_poll_interval(Duration::from_millis(10));
        for launcher in launchers {
            orchestrator = orchestrator.with_launcher(launcher);
        }
        orchestrator
    }

    /// Register the launched worker from another task once it shows up
    fn register_when_launched(
        orchestrator: Arc<AgentOrchestrator>,
        launcher: Arc<FakeLauncher>,
        delay: Duration,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let id = loop {
                if let Some(id) = launcher.last_launched() {
                    break id;
                }
                tokio::task::yield_now().await;
            };
            sleep(delay).await;
            orchestrator
                .register(AgentHandle::new(id, format!("local://{id}")))
                .unwrap();
        })
    }

    #[tokio::test]
    async fn test_zero_wait_checks_registry_once() {
        let launcher = Arc::new(FakeLauncher::new("native", Platform::Current));
        let orchestrator = orchestrator(vec![launcher.clone()]);

        let start = Instant::now();
        let agent = orchestrator
            .request_worker(&TestPackage::new("p"), WaitTimeout::from_millis(0))
            .await
            .unwrap();

        assert!(agent.is_none());
        assert_eq!(orchestrator.registry().lookup_count(), 1);
        assert!(start.elapsed() < Duration::from_millis(500));
        assert_eq!(launcher.launched.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_timeout_stops_unregistered_worker() {
        let launcher = Arc::new(FakeLauncher::new("native", Platform::Current));
        let orchestrator = orchestrator(vec![launcher.clone()]);

        let agent = orchestrator
            .request_worker(&TestPackage::new("p"), WaitTimeout::from_millis(30))
            .await
            .unwrap();
        assert!(agent.is_none());

        let id = launcher.last_launched().unwrap();
        assert_eq!(*launcher.terminated.lock(), vec![id]);
        assert_eq!(launcher.active_processes(), 0);
        assert!(orchestrator.registry().is_empty());

        // the worker calls back after the requester gave up
        let err = orchestrator
            .register(AgentHandle::new(id, format!("local://{id}")))
            .unwrap_err();
        assert!(matches!(err, AgentError::UnknownAgent(_)));
        assert!(orchestrator.registry().is_empty());
    }

    #[tokio::test]
    async fn test_zero_poll_interval_still_times_out() {
        let launcher = Arc::new(FakeLauncher::new("native", Platform::Current));
        let orchestrator = AgentOrchestrator::new(Arc::new(HostRuntimeSupport::new()))
            .with_launcher(launcher.clone())
            .with_poll_interval(Duration::ZERO);
        assert_eq!(orchestrator.poll_interval(), MIN_POLL_INTERVAL);

        let agent = tokio::time::timeout(
            Duration::from_secs(5),
            orchestrator.request_worker(&TestPackage::new("p"), WaitTimeout::from_millis(50)),
        )
        .await
        .expect("bounded wait must return")
        .unwrap();

        assert!(agent.is_none());
        assert!(orchestrator.registry().is_empty());
    }

    #[tokio::test]
    async fn test_request_returns_registered_agent() {
        let launcher = Arc::new(FakeLauncher::new("native", Platform::Current));
        let orchestrator = Arc::new(orchestrator(vec![launcher.clone()]));

        let registration = register_when_launched(
            orchestrator.clone(),
            launcher.clone(),
            Duration::from_millis(25),
        );

        let agent = orchestrator
            .request_worker(&TestPackage::new("p"), WaitTimeout::from_millis(2_000))
            .await
            .unwrap()
            .expect("worker should register");
        registration.await.unwrap();

        assert_eq!(Some(agent.id), launcher.last_launched());
        assert_eq!(
            orchestrator.registry().status(agent.id),
            Some(AgentStatus::Starting)
        );

        orchestrator
            .report_status(agent.id, AgentStatus::Ready)
            .unwrap();
        assert_eq!(
            orchestrator.registry().status(agent.id),
            Some(AgentStatus::Ready)
        );
    }

    #[tokio::test]
    async fn test_infinite_wait() {
        let launcher = Arc::new(FakeLauncher::new("native", Platform::Current));
        let orchestrator = Arc::new(orchestrator(vec![launcher.clone()]));

        let registration = register_when_launched(
            orchestrator.clone(),
            launcher.clone(),
            Duration::from_millis(60),
        );

        let agent = orchestrator
            .request_worker(&TestPackage::new("p"), WaitTimeout::Infinite)
            .await
            .unwrap();
        registration.await.unwrap();

        assert!(agent.is_some());
        assert!(orchestrator.registry().lookup_count() > 1);
    }

    #[tokio::test]
    async fn test_first_matching_launcher_wins() {
        let x86 = Arc::new(FakeLauncher::new("x86-a", Platform::X86));
        let x86_second = Arc::new(FakeLauncher::new("x86-b", Platform::X86));
        let arm = Arc::new(FakeLauncher::new("arm", Platform::Arm64));
        let orchestrator = orchestrator(vec![arm.clone(), x86.clone(), x86_second.clone()]);

        let package = TestPackage::new("p").with_setting(settings::TARGET_PLATFORM, "x86");
        orchestrator
            .request_worker(&package, WaitTimeout::from_millis(0))
            .await
            .unwrap();

        assert_eq!(x86.launched.lock().len(), 1);
        assert!(x86_second.launched.lock().is_empty());
        assert!(arm.launched.lock().is_empty());
    }

    #[tokio::test]
    async fn test_unsupported_platform() {
        let orchestrator = orchestrator(vec![Arc::new(FakeLauncher::new("x86", Platform::X86))]);
        let package = TestPackage::new("arm-tests").with_setting(settings::TARGET_PLATFORM, "arm64");

        let err = orchestrator
            .request_worker(&package, WaitTimeout::from_millis(0))
            .await
            .unwrap_err();

        assert!(matches!(err, AgentError::UnsupportedPlatform { .. }));
        assert!(err.to_string().contains("arm-tests"));
        assert!(orchestrator.registry().is_empty());
    }

    #[tokio::test]
    async fn test_multi_platform_package_rejected() {
        let launcher = Arc::new(FakeLauncher::new("native", Platform::Current));
        let orchestrator = orchestrator(vec![launcher.clone()]);
        let package = TestPackage::new("p").with_setting(settings::TARGET_PLATFORM, "x86;x64");

        let err = orchestrator
            .request_worker(&package, WaitTimeout::Infinite)
            .await
            .unwrap_err();

        assert!(matches!(err, AgentError::Platform(_)));
        assert!(launcher.launched.lock().is_empty());
    }

    #[test]
    fn test_register_unknown_agent() {
        let orchestrator = orchestrator(vec![]);
        let err = orchestrator
            .register(AgentHandle::new(Uuid::new_v4(), "local://x"))
            .unwrap_err();

        assert!(matches!(err, AgentError::UnknownAgent(_)));
        assert!(orchestrator.registry().is_empty());
    }

    #[test]
    fn test_report_status_unknown_agent() {
        let orchestrator = orchestrator(vec![]);
        assert!(matches!(
            orchestrator.report_status(Uuid::new_v4(), AgentStatus::Ready),
            Err(AgentError::UnknownAgent(_))
        ));
    }

    #[test]
    fn test_release_is_idempotent() {
        let orchestrator = orchestrator(vec![]);
        let id = Uuid::new_v4();
        orchestrator
            .registry()
            .add(WorkerRecord::starting(id, "native", None));
        let agent = AgentHandle::new(id, "local://1");
        orchestrator.register(agent.clone()).unwrap();
        orchestrator.report_status(id, AgentStatus::Busy).unwrap();

        orchestrator.release_agent(&agent);
        assert_eq!(orchestrator.registry().status(id), Some(AgentStatus::Ready));
        orchestrator.release_agent(&agent);
        assert_eq!(orchestrator.registry().status(id), Some(AgentStatus::Ready));

        // unknown agents are ignored
        orchestrator.release_agent(&AgentHandle::new(Uuid::new_v4(), "gone"));
    }

    #[test]
    fn test_stop_agent_removes_record() {
        let launcher = Arc::new(FakeLauncher::new("native", Platform::Current));
        let orchestrator = orchestrator(vec![launcher.clone()]);
        let record = launcher
            .launch_worker(&TestPackage::new("p"), "native")
            .unwrap();
        let id = record.id;
        orchestrator.registry().add(record);

        orchestrator.stop_agent(id).unwrap();

        assert!(!orchestrator.registry().contains(id));
        assert!(matches!(
            orchestrator.stop_agent(id),
            Err(AgentError::UnknownAgent(_))
        ));
    }
}
