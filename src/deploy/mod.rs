//! Deploy provider abstraction.
//!
//! A deploy provider materializes a source reference (a git ref, an archive
//! version, ...) at a destination directory. Callers depend on
//! [`DeployProvider`] only, so backends are interchangeable.

mod archive;
mod factory;
mod git;
mod staging;

use async_trait::async_trait;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

pub use archive::ArchiveDeployProvider;
pub use factory::create_provider;
pub use git::GitDeployProvider;

/// What to deploy and where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployTarget {
    /// Source location: a git remote URL or an archive URL/path
    pub remote: String,
    /// Ref to pin (branch, tag, commit) or archive version label
    pub reference: String,
    /// Directory the deployment is materialized at
    pub destination: PathBuf,
}

impl DeployTarget {
    pub fn new(
        remote: impl Into<String>,
        reference: impl Into<String>,
        destination: impl Into<PathBuf>,
    ) -> Self {
        Self {
            remote: remote.into(),
            reference: reference.into(),
            destination: destination.into(),
        }
    }
}

impl fmt::Display for DeployTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}@{} -> {}",
            self.remote,
            self.reference,
            self.destination.display()
        )
    }
}

/// Outcome of a successful deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployResult {
    pub provider: ProviderKind,
    pub destination: PathBuf,
    /// Resolved commit id (git) or version label (archive)
    pub revision: String,
}

/// Backend kind identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    Git,
    Archive,
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderKind::Git => write!(f, "git"),
            ProviderKind::Archive => write!(f, "archive"),
        }
    }
}

impl FromStr for ProviderKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "git" => Ok(ProviderKind::Git),
            "archive" | "tarball" => Ok(ProviderKind::Archive),
            _ => anyhow::bail!("Unknown provider: {}. Expected git or archive.", s),
        }
    }
}

/// The step of a deployment that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployStage {
    Fetch,
    Checkout,
    Apply,
}

impl fmt::Display for DeployStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeployStage::Fetch => write!(f, "fetch"),
            DeployStage::Checkout => write!(f, "checkout"),
            DeployStage::Apply => write!(f, "apply"),
        }
    }
}

/// A deployment failure, tagged with the stage it happened in.
#[derive(Debug)]
pub struct DeployError {
    pub stage: DeployStage,
    pub cause: anyhow::Error,
}

impl DeployError {
    pub fn new(stage: DeployStage, cause: impl Into<anyhow::Error>) -> Self {
        Self {
            stage,
            cause: cause.into(),
        }
    }
}

impl fmt::Display for DeployError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Deployment failed during {}: {:#}", self.stage, self.cause)
    }
}

impl std::error::Error for DeployError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        let cause: &(dyn std::error::Error + 'static) = self.cause.as_ref();
        Some(cause)
    }
}

/// Tags an `anyhow::Result` with the deploy stage it belongs to.
pub(crate) trait StageExt<T> {
    fn stage(self, stage: DeployStage) -> Result<T, DeployError>;
}

impl<T> StageExt<T> for anyhow::Result<T> {
    fn stage(self, stage: DeployStage) -> Result<T, DeployError> {
        self.map_err(|cause| DeployError::new(stage, cause))
    }
}

/// Trait for deployment backends (git, archive, ...).
///
/// Every invocation is isolated: it works in its own staging directory and
/// leaves the previous destination untouched on failure, so a failed call
/// can simply be retried.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DeployProvider: Send + Sync {
    /// Get the provider kind.
    fn kind(&self) -> ProviderKind;

    /// Materialize `target` at its destination.
    async fn deploy(&self, target: &DeployTarget) -> Result<DeployResult, DeployError>;
}
