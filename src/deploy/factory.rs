use anyhow::Result;
use std::sync::Arc;

use super::{ArchiveDeployProvider, DeployProvider, GitDeployProvider, ProviderKind};
use crate::http::HttpClient;
use crate::runtime::RealRuntime;

/// Create the provider for a backend kind, backed by the real system.
pub fn create_provider(kind: ProviderKind) -> Result<Arc<dyn DeployProvider>> {
    let provider: Arc<dyn DeployProvider> = match kind {
        ProviderKind::Git => Arc::new(GitDeployProvider::new(RealRuntime)),
        ProviderKind::Archive => Arc::new(ArchiveDeployProvider::new(
            RealRuntime,
            HttpClient::with_default_client()?,
        )),
    };
    Ok(provider)
}
