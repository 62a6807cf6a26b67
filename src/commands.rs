// ─── Launcher ───
// Entry point the front end talks to: acquire a runtime, plan, then hand the
// configuration to the supervisor.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{error, info, instrument, warn};

use crate::core::error::{LauncherError, LauncherResult};
use crate::core::events::{EventRelay, LauncherEvent};
use crate::core::java::{
    required_runtime_major, HostRuntimeProbe, InstallLayout, RuntimeDescriptor, RuntimeLocator,
    RuntimeProvisioner, SystemRuntimeProbe,
};
use crate::core::launch::{plan, LaunchCapability, LaunchRequest, ProcessSupervisor, SidecarLauncher};
use crate::core::state::LauncherSettings;

const STATUS_CHECKING_RUNTIME: &str = "Checking Java runtime...";
const STATUS_RUNTIME_READY: &str = "Java ready, starting game...";

/// Result of one launch attempt as reported to the front end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LaunchOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl LaunchOutcome {
    fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    fn failed(message: String) -> Self {
        Self {
            success: false,
            error: Some(message),
        }
    }
}

/// Clears the launching flag on every exit path.
struct LaunchingGuard<'a>(&'a AtomicBool);

impl<'a> LaunchingGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for LaunchingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct Launcher {
    settings: LauncherSettings,
    layout: InstallLayout,
    locator: RuntimeLocator,
    provisioner: RuntimeProvisioner,
    supervisor: ProcessSupervisor,
    relay: EventRelay,
    launching: AtomicBool,
}

impl Launcher {
    pub fn new(
        layout: InstallLayout,
        settings: LauncherSettings,
        probe: Arc<dyn SystemRuntimeProbe>,
        capability: Arc<dyn LaunchCapability>,
        relay: EventRelay,
    ) -> LauncherResult<Self> {
        let provisioning_dir = layout.provisioning_dir();
        let provisioner =
            RuntimeProvisioner::new(provisioning_dir.clone(), settings.provision_options())?;
        Ok(Self {
            locator: RuntimeLocator::new(provisioning_dir, probe),
            provisioner,
            supervisor: ProcessSupervisor::new(capability, relay.clone()),
            relay,
            settings,
            layout,
            launching: AtomicBool::new(false),
        })
    }

    /// Production wiring: settings from disk, host `PATH` probe and the
    /// configured sidecar program.
    pub fn from_layout(
        layout: InstallLayout,
    ) -> LauncherResult<(Self, mpsc::UnboundedReceiver<LauncherEvent>)> {
        let settings = LauncherSettings::load(&layout);
        let (relay, events) = EventRelay::channel(settings.progress_interval());
        let capability = Arc::new(SidecarLauncher::new(
            settings.launch_program.clone(),
            settings.launch_args.clone(),
        ));
        let launcher = Self::new(layout, settings, Arc::new(HostRuntimeProbe), capability, relay)?;
        Ok((launcher, events))
    }

    pub fn layout(&self) -> &InstallLayout {
        &self.layout
    }

    pub fn settings(&self) -> &LauncherSettings {
        &self.settings
    }

    pub fn supervisor(&self) -> &ProcessSupervisor {
        &self.supervisor
    }

    pub fn is_launching(&self) -> bool {
        self.launching.load(Ordering::Acquire)
    }

    /// Runs one full launch attempt. Failures are reported in the outcome and
    /// as events; the launching flag is always cleared on return.
    #[instrument(skip(self, request), fields(version = %request.distribution_version, variant = %request.variant))]
    pub async fn launch(&self, request: LaunchRequest) -> LaunchOutcome {
        let Some(_guard) = LaunchingGuard::acquire(&self.launching) else {
            warn!("Launch requested while another launch is being prepared");
            return LaunchOutcome::failed("A launch is already in progress".into());
        };

        match self.launch_inner(&request).await {
            Ok(()) => LaunchOutcome::ok(),
            Err(err) => {
                error!("Launch failed: {}", err);
                let message = match &err {
                    LauncherError::Provision(_) => format!(
                        "{err}. The launcher will attempt to download Java automatically on the next try."
                    ),
                    _ => err.to_string(),
                };
                // Start failures were already reported by the supervisor.
                if !matches!(err, LauncherError::ProcessStart(_)) {
                    self.relay.error(message.clone());
                }
                LaunchOutcome::failed(message)
            }
        }
    }

    async fn launch_inner(&self, request: &LaunchRequest) -> LauncherResult<()> {
        // Runtimes are provisioned below the layout root, so a request for a
        // different root would plan against a directory nobody prepared.
        if !self.layout.is_root(&request.install_root) {
            return Err(LauncherError::Configuration(format!(
                "install root {:?} does not match launcher root {:?}",
                request.install_root,
                self.layout.root()
            )));
        }

        self.relay.status(STATUS_CHECKING_RUNTIME);
        let runtime = self.ensure_runtime(&request.distribution_version).await?;
        self.relay.status(STATUS_RUNTIME_READY);

        let config = plan(request, &runtime, &self.settings.launch_defaults())?;
        let session = self.supervisor.launch(config).await?;
        info!("Launch session {} is running", session);
        Ok(())
    }

    /// A runtime satisfying the floor for `distribution_version`, located or
    /// freshly provisioned.
    pub async fn ensure_runtime(
        &self,
        distribution_version: &str,
    ) -> LauncherResult<RuntimeDescriptor> {
        let required = required_runtime_major(distribution_version);
        if let Some(runtime) = self.locator.locate(required).await {
            info!(
                "Using {:?} runtime {} at {:?}",
                runtime.origin, runtime.major_version, runtime.executable_path
            );
            return Ok(runtime);
        }

        info!("No Java {}+ found, provisioning", required);
        self.relay.status(format!("Downloading Java {required}..."));
        Ok(self.provisioner.provision(distribution_version).await?)
    }

    pub fn installed_versions(&self) -> Vec<String> {
        self.layout.installed_versions()
    }

    pub fn is_installed(&self, distribution_version: &str) -> bool {
        self.layout.is_installed(distribution_version)
    }
}
