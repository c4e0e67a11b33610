use log::{debug, info, warn};
use std::fmt;

use super::{InstallError, InstallTarget, InstallerRegistry};
use crate::runtime::{ProcessCommand, Runtime};

/// Lifecycle of a single installer run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallState {
    NotStarted,
    Running,
    Succeeded,
    Failed,
}

impl fmt::Display for InstallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstallState::NotStarted => write!(f, "not started"),
            InstallState::Running => write!(f, "running"),
            InstallState::Succeeded => write!(f, "succeeded"),
            InstallState::Failed => write!(f, "failed"),
        }
    }
}

/// Outcome of a successful installer run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
    pub target: InstallTarget,
    pub command: ProcessCommand,
    pub state: InstallState,
    pub exit_code: Option<i32>,
}

impl InstallReport {
    pub fn is_success(&self) -> bool {
        self.state == InstallState::Succeeded && self.exit_code == Some(0)
    }
}

/// Runs the registered installer for a platform and reports its exit status.
///
/// The dispatcher never retries and never interprets installer output. Each
/// call spawns at most one process; dropping the returned future kills it.
pub struct InstallDispatcher<R: Runtime> {
    runtime: R,
    registry: InstallerRegistry,
}

impl<R: Runtime> InstallDispatcher<R> {
    pub fn new(runtime: R, registry: InstallerRegistry) -> Self {
        Self { runtime, registry }
    }

    pub fn registry(&self) -> &InstallerRegistry {
        &self.registry
    }

    /// Install for a platform identifier such as `"rhel"`.
    #[tracing::instrument(skip(self))]
    pub async fn install(&self, platform: &str) -> Result<InstallReport, InstallError> {
        let target = platform.parse::<InstallTarget>()?;
        self.install_target(target).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn install_target(&self, target: InstallTarget) -> Result<InstallReport, InstallError> {
        let installer = self
            .registry
            .get(target)
            .ok_or_else(|| InstallError::UnsupportedPlatform(target.to_string()))?;
        let command = installer.to_process(self.registry.base_dir());

        let mut state = InstallState::NotStarted;
        if target.needs_root() && !self.runtime.is_privileged() {
            warn!(
                "Installer for {} usually requires root privileges; running it anyway",
                target
            );
        }

        info!("Running installer for {}: {}", target, command);
        transition(target, &mut state, InstallState::Running);
        let outcome = self.runtime.run_inherited(&command).await;

        match outcome {
            Ok(Some(0)) => {
                transition(target, &mut state, InstallState::Succeeded);
                info!("Installer for {} finished successfully", target);
                Ok(InstallReport {
                    target,
                    command,
                    state,
                    exit_code: Some(0),
                })
            }
            Ok(exit_code) => {
                transition(target, &mut state, InstallState::Failed);
                Err(InstallError::InstallationFailed { target, exit_code })
            }
            Err(cause) => {
                transition(target, &mut state, InstallState::Failed);
                Err(InstallError::Spawn { target, cause })
            }
        }
    }
}

fn transition(target: InstallTarget, state: &mut InstallState, next: InstallState) {
    debug!("Installer for {}: {} -> {}", target, state, next);
    *state = next;
}
