use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::InstallTarget;
use super::config::InstallerConfig;
use crate::runtime::ProcessCommand;

/// Default installer for the Red Hat family.
pub const DEFAULT_RHEL_SCRIPT: &str = "scripts/install.sh";

/// An external installer invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallCommand {
    pub program: PathBuf,
    #[serde(default)]
    pub args: Vec<String>,
}

impl InstallCommand {
    pub fn new<I, S>(program: impl Into<PathBuf>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Runs `bash <script>`.
    pub fn bash_script(script: impl Into<String>) -> Self {
        Self::new("bash", [script.into()])
    }

    /// The process to spawn from `base_dir`. A relative program with a
    /// directory part (`scripts/install.sh`) is joined onto `base_dir`; a bare
    /// name (`bash`) is looked up on `PATH`. Arguments are passed unchanged and
    /// so resolve against the working directory.
    pub fn to_process(&self, base_dir: &Path) -> ProcessCommand {
        let program = if self.program.is_relative() && self.program.components().count() > 1 {
            base_dir.join(&self.program)
        } else {
            self.program.clone()
        };
        ProcessCommand::new(program)
            .args(self.args.iter().cloned())
            .current_dir(base_dir)
    }
}

/// Mapping from platform to installer. New platforms are supported by
/// registering a command, not by changing the dispatcher.
#[derive(Debug, Clone)]
pub struct InstallerRegistry {
    base_dir: PathBuf,
    installers: BTreeMap<InstallTarget, InstallCommand>,
}

impl InstallerRegistry {
    /// An empty registry; installers run from `base_dir`.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            installers: BTreeMap::new(),
        }
    }

    /// The built-in installers: `bash scripts/install.sh` for the Red Hat family.
    pub fn with_defaults(base_dir: impl Into<PathBuf>) -> Self {
        Self::new(base_dir).register(
            InstallTarget::Rhel,
            InstallCommand::bash_script(DEFAULT_RHEL_SCRIPT),
        )
    }

    /// The built-in installers overlaid with the configured ones.
    pub fn from_config(base_dir: impl Into<PathBuf>, config: &InstallerConfig) -> anyhow::Result<Self> {
        let mut registry = Self::with_defaults(base_dir);
        for (target, command) in config.entries()? {
            registry = registry.register(target, command);
        }
        Ok(registry)
    }

    pub fn register(mut self, target: InstallTarget, command: InstallCommand) -> Self {
        self.installers.insert(target, command);
        self
    }

    pub fn get(&self, target: InstallTarget) -> Option<&InstallCommand> {
        self.installers.get(&target)
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Platforms with a registered installer.
    pub fn supported(&self) -> Vec<InstallTarget> {
        self.installers.keys().copied().collect()
    }
}
