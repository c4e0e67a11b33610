//! Per-invocation scratch paths and the final swap into the destination.

use anyhow::{Context, Result, anyhow};
use log::{debug, warn};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::runtime::Runtime;

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Sibling paths of a destination, unique to one deploy invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct StagingPaths {
    pub parent: PathBuf,
    /// Where the new content is materialized
    pub staging: PathBuf,
    /// Where the current destination is parked during the swap
    pub previous: PathBuf,
}

impl StagingPaths {
    pub fn for_destination(destination: &Path) -> Result<Self> {
        let name = destination
            .file_name()
            .ok_or_else(|| anyhow!("Invalid destination: {}", destination.display()))?
            .to_string_lossy()
            .into_owned();
        let parent = match destination.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.subsec_nanos())
            .unwrap_or_default();
        let suffix = format!(
            "{}-{}-{}",
            std::process::id(),
            SEQUENCE.fetch_add(1, Ordering::Relaxed),
            nanos
        );

        Ok(Self {
            staging: parent.join(format!(".{}.staging-{}", name, suffix)),
            previous: parent.join(format!(".{}.previous-{}", name, suffix)),
            parent,
        })
    }

    /// Companion file path for a downloaded artifact.
    pub fn artifact(&self, extension: &str) -> PathBuf {
        let mut name = self.staging.as_os_str().to_owned();
        name.push(".");
        name.push(extension);
        PathBuf::from(name)
    }
}

/// Moves `staging` to `destination`, replacing whatever is there.
/// If the replacement fails, the previous destination is put back.
pub(crate) fn swap_into_place<R: Runtime + ?Sized>(
    runtime: &R,
    paths: &StagingPaths,
    destination: &Path,
) -> Result<()> {
    if !runtime.exists(destination) {
        debug!("Moving {:?} into place at {:?}", paths.staging, destination);
        return runtime.rename(&paths.staging, destination);
    }

    runtime
        .rename(destination, &paths.previous)
        .context("Failed to move the current deployment aside")?;

    if let Err(e) = runtime.rename(&paths.staging, destination) {
        if let Err(restore) = runtime.rename(&paths.previous, destination) {
            warn!(
                "Failed to restore previous deployment from {:?}: {}",
                paths.previous, restore
            );
        }
        return Err(e);
    }

    let removed = if runtime.is_dir(&paths.previous) {
        runtime.remove_dir_all(&paths.previous)
    } else {
        runtime.remove_file(&paths.previous)
    };
    if let Err(e) = removed {
        warn!("Failed to remove previous deployment {:?}: {}", paths.previous, e);
    }
    Ok(())
}
