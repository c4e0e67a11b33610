//! Host platform detection.
//!
//! Linux hosts are identified from `/etc/os-release`: `ID` first, then each
//! entry of `ID_LIKE`, so derivatives map to the family they build on.

use log::debug;
use std::collections::HashMap;
use std::path::Path;

use crate::install::InstallTarget;
use crate::runtime::Runtime;

pub const OS_RELEASE_PATH: &str = "/etc/os-release";

/// Parses the `KEY=value` lines of an os-release file. Values may be quoted;
/// blank lines and comments are skipped.
pub fn parse_os_release(content: &str) -> HashMap<String, String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| {
            let value = value.trim();
            let unquoted = value
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
                .unwrap_or(value);
            (key.trim().to_string(), unquoted.to_string())
        })
        .collect()
}

/// The install target described by an os-release file, if any.
pub fn target_from_os_release(content: &str) -> Option<InstallTarget> {
    let fields = parse_os_release(content);
    let id = fields.get("ID").map(String::as_str).into_iter();
    let like = fields
        .get("ID_LIKE")
        .map(|v| v.split_whitespace().collect::<Vec<_>>())
        .unwrap_or_default();

    id.chain(like).find_map(|candidate| candidate.parse().ok())
}

/// Detect the install target of the current host.
pub fn detect<R: Runtime + ?Sized>(runtime: &R) -> Option<InstallTarget> {
    detect_for_os(runtime, std::env::consts::OS)
}

fn detect_for_os<R: Runtime + ?Sized>(runtime: &R, os: &str) -> Option<InstallTarget> {
    match os {
        "macos" => Some(InstallTarget::Macos),
        "linux" => {
            let content = runtime.read_to_string(Path::new(OS_RELEASE_PATH)).ok()?;
            let target = target_from_os_release(&content);
            debug!("Detected platform from {}: {:?}", OS_RELEASE_PATH, target);
            target
        }
        _ => None,
    }
}
