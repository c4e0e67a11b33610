//! Archive deploy provider: downloads a `.tar.gz` and unpacks it into the destination.

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use flate2::read::GzDecoder;
use log::{debug, info};
use std::path::{Component, Path, PathBuf};
use tar::{Archive, EntryType};

use super::staging::{StagingPaths, swap_into_place};
use super::{DeployError, DeployProvider, DeployResult, DeployStage, DeployTarget, ProviderKind, StageExt};
use crate::cleanup::CleanupContext;
use crate::http::HttpClient;
use crate::runtime::Runtime;

pub struct ArchiveDeployProvider<R: Runtime> {
    runtime: R,
    http_client: HttpClient,
}

impl<R: Runtime> ArchiveDeployProvider<R> {
    pub fn new(runtime: R, http_client: HttpClient) -> Self {
        Self {
            runtime,
            http_client,
        }
    }

    /// Makes the archive available locally. Remote archives are downloaded
    /// next to the staging directory; local ones are used in place.
    async fn fetch(
        &self,
        remote: &str,
        paths: &StagingPaths,
        cleanup: &mut CleanupContext<'_, R>,
    ) -> Result<PathBuf> {
        if !is_http_url(remote) {
            let local = PathBuf::from(remote.strip_prefix("file://").unwrap_or(remote));
            if !self.runtime.exists(&local) {
                bail!("Archive not found: {}", local.display());
            }
            return Ok(local);
        }

        let archive_path = paths.artifact("tar.gz");
        cleanup.add(archive_path.clone());
        info!("Downloading {}...", remote);
        self.http_client
            .download_file(remote, || {
                self.runtime
                    .create_file(&archive_path)
                    .with_context(|| format!("Failed to create {}", archive_path.display()))
            })
            .await?;
        Ok(archive_path)
    }
}

fn is_http_url(remote: &str) -> bool {
    remote.starts_with("http://") || remote.starts_with("https://")
}

/// Entry path relative to the archive root, with `./` removed.
/// Absolute paths and `..` components are rejected.
fn sanitize(path: &Path) -> Result<PathBuf> {
    let mut clean = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            _ => bail!("Unsafe path in archive: {}", path.display()),
        }
    }
    Ok(clean)
}

/// Where a symlink at `link` pointing to `target` lands, relative to the
/// extraction root. `None` if the target is absolute or climbs above the root.
fn resolve_link_target(link: &Path, target: &Path) -> Option<PathBuf> {
    let mut resolved = link.parent().map(Path::to_path_buf).unwrap_or_default();
    for component in target.components() {
        match component {
            Component::Normal(part) => resolved.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                if !resolved.pop() {
                    return None;
                }
            }
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(resolved)
}

/// Fails if any component of `relative` below `root` is already a symlink.
fn ensure_no_symlinks<R: Runtime + ?Sized>(runtime: &R, root: &Path, relative: &Path) -> Result<()> {
    let mut current = root.to_path_buf();
    for component in relative.components() {
        current.push(component);
        if runtime.is_symlink(&current) {
            bail!("Refusing to write through symlink in archive: {}", relative.display());
        }
    }
    Ok(())
}

fn strip_root(path: PathBuf, strip: Option<&Path>) -> PathBuf {
    match strip {
        Some(root) => path.strip_prefix(root).map(Path::to_path_buf).unwrap_or(path),
        None => path,
    }
}

fn is_metadata(entry_type: EntryType) -> bool {
    matches!(
        entry_type,
        EntryType::XGlobalHeader | EntryType::XHeader | EntryType::GNULongName | EntryType::GNULongLink
    )
}

/// The single top-level directory every entry lives under, if there is one.
fn common_root<R: Runtime + ?Sized>(runtime: &R, archive_path: &Path) -> Result<Option<PathBuf>> {
    let mut archive = Archive::new(GzDecoder::new(runtime.open(archive_path)?));
    let mut root: Option<PathBuf> = None;
    let mut nested = false;

    for entry in archive.entries().context("Failed to read archive")? {
        let entry = entry.context("Failed to read archive entry")?;
        if is_metadata(entry.header().entry_type()) {
            continue;
        }
        let path = sanitize(&entry.path()?)?;
        let mut components = path.components();
        let Some(first) = components.next() else {
            continue;
        };
        let first = PathBuf::from(first.as_os_str());
        let has_more = components.next().is_some();
        let is_dir = entry.header().entry_type().is_dir();

        if !has_more && !is_dir {
            // A file at the top level
            return Ok(None);
        }
        match &root {
            Some(existing) if *existing != first => return Ok(None),
            Some(_) => {}
            None => root = Some(first),
        }
        nested |= has_more;
    }

    Ok(root.filter(|_| nested))
}

/// Unpacks a gzip-compressed tarball into `extract_to`, stripping a single
/// top-level directory if the archive has one.
fn extract_tar_gz<R: Runtime + ?Sized>(
    runtime: &R,
    archive_path: &Path,
    extract_to: &Path,
) -> Result<usize> {
    let strip = common_root(runtime, archive_path)?;
    debug!("Extracting {:?} into {:?} (strip {:?})", archive_path, extract_to, strip);

    runtime.create_dir_all(extract_to)?;
    let mut archive = Archive::new(GzDecoder::new(runtime.open(archive_path)?));
    let mut unpacked = 0;

    for entry in archive.entries().context("Failed to read archive")? {
        let mut entry = entry.context("Failed to read archive entry")?;
        let entry_type = entry.header().entry_type();
        if is_metadata(entry_type) {
            continue;
        }
        let relative = strip_root(sanitize(&entry.path()?)?, strip.as_deref());
        if relative.as_os_str().is_empty() {
            continue;
        }

        ensure_no_symlinks(runtime, extract_to, &relative)?;
        let out_path = extract_to.join(&relative);
        if let Some(parent) = out_path.parent() {
            runtime.create_dir_all(parent)?;
        }

        match entry_type {
            EntryType::Symlink => {
                let target = link_name(&entry, &relative)?;
                if resolve_link_target(&relative, &target).is_none() {
                    bail!(
                        "Unsafe symlink in archive: {} -> {}",
                        relative.display(),
                        target.display()
                    );
                }
                entry
                    .unpack(&out_path)
                    .with_context(|| format!("Failed to unpack {}", relative.display()))?;
            }
            EntryType::Link => {
                // Hard link names are archive paths, not paths relative to the link
                let source = strip_root(sanitize(&link_name(&entry, &relative)?)?, strip.as_deref());
                ensure_no_symlinks(runtime, extract_to, &source)?;
                runtime.hard_link(&extract_to.join(&source), &out_path)?;
            }
            _ => {
                entry
                    .unpack(&out_path)
                    .with_context(|| format!("Failed to unpack {}", relative.display()))?;
            }
        }
        unpacked += 1;
    }

    if unpacked == 0 {
        bail!("Archive {} is empty", archive_path.display());
    }
    Ok(unpacked)
}

fn link_name<T: std::io::Read>(entry: &tar::Entry<'_, T>, relative: &Path) -> Result<PathBuf> {
    entry
        .link_name()?
        .map(|name| name.into_owned())
        .ok_or_else(|| anyhow!("Link {} has no target", relative.display()))
}

#[async_trait]
impl<R: Runtime> DeployProvider for ArchiveDeployProvider<R> {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Archive
    }

    #[tracing::instrument(skip(self))]
    async fn deploy(&self, target: &DeployTarget) -> Result<DeployResult, DeployError> {
        info!("Deploying {}", target);
        if target.remote.trim().is_empty() {
            return Err(DeployError::new(
                DeployStage::Fetch,
                anyhow::anyhow!("Archive location must not be empty"),
            ));
        }
        if target.reference.trim().is_empty() {
            return Err(DeployError::new(
                DeployStage::Fetch,
                anyhow::anyhow!("Archive version label must not be empty"),
            ));
        }

        let paths = StagingPaths::for_destination(&target.destination).stage(DeployStage::Fetch)?;
        self.runtime
            .create_dir_all(&paths.parent)
            .stage(DeployStage::Fetch)?;

        let mut cleanup = CleanupContext::new(&self.runtime);
        let archive_path = self
            .fetch(&target.remote, &paths, &mut cleanup)
            .await
            .stage(DeployStage::Fetch)?;

        cleanup.add(paths.staging.clone());
        let files = extract_tar_gz(&self.runtime, &archive_path, &paths.staging)
            .stage(DeployStage::Checkout)?;
        debug!("Unpacked {} entries", files);

        swap_into_place(&self.runtime, &paths, &target.destination).stage(DeployStage::Apply)?;
        cleanup.remove(&paths.staging);

        info!("Deployed {} at {:?}", target.reference, target.destination);
        Ok(DeployResult {
            provider: ProviderKind::Archive,
            destination: target.destination.clone(),
            revision: target.reference.clone(),
        })
    }
}
