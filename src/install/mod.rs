//! Platform installer dispatch.
//!
//! Maps a platform identifier to an external installer command, runs it with
//! the terminal attached, and reports how it exited.

pub mod config;
mod dispatcher;
mod registry;
mod target;

use std::fmt;

pub use config::InstallerConfig;
pub use dispatcher::{InstallDispatcher, InstallReport, InstallState};
pub use registry::{InstallCommand, InstallerRegistry};
pub use target::InstallTarget;

/// Installer dispatch failures.
#[derive(Debug)]
pub enum InstallError {
    /// Unknown platform, or no installer registered for it. No process was spawned.
    UnsupportedPlatform(String),
    /// The installer ran and exited unsuccessfully. `None` means it was killed by a signal.
    InstallationFailed {
        target: InstallTarget,
        exit_code: Option<i32>,
    },
    /// The installer process could not be started or waited for.
    Spawn {
        target: InstallTarget,
        cause: anyhow::Error,
    },
}

impl InstallError {
    /// Exit code of the installer, when it ran to completion.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            InstallError::InstallationFailed { exit_code, .. } => *exit_code,
            _ => None,
        }
    }
}

impl fmt::Display for InstallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstallError::UnsupportedPlatform(platform) => {
                write!(f, "Unsupported platform: {}", platform)
            }
            InstallError::InstallationFailed {
                target,
                exit_code: Some(code),
            } => write!(f, "Installer for {} failed with exit code {}", target, code),
            InstallError::InstallationFailed {
                target,
                exit_code: None,
            } => write!(f, "Installer for {} was terminated by a signal", target),
            InstallError::Spawn { target, cause } => {
                write!(f, "Failed to run installer for {}: {:#}", target, cause)
            }
        }
    }
}

impl std::error::Error for InstallError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            InstallError::Spawn { cause, .. } => {
                let cause: &(dyn std::error::Error + 'static) = cause.as_ref();
                Some(cause)
            }
            _ => None,
        }
    }
}
