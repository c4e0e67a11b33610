use anyhow::{Context, Result, bail};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::{InstallCommand, InstallTarget};
use crate::runtime::Runtime;

/// Installer configuration file, e.g.
///
/// ```json
/// { "installers": { "debian": { "program": "bash", "args": ["scripts/install-debian.sh"] } } }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InstallerConfig {
    #[serde(default)]
    pub installers: BTreeMap<String, InstallCommand>,
}

impl InstallerConfig {
    /// `<config dir>/deployctl/installers.json`
    pub fn default_path<R: Runtime + ?Sized>(runtime: &R) -> Option<PathBuf> {
        runtime
            .config_dir()
            .map(|dir| dir.join("deployctl").join("installers.json"))
    }

    pub fn load<R: Runtime + ?Sized>(runtime: &R, path: &Path) -> Result<Self> {
        debug!("Loading installer config from {:?}", path);
        let content = runtime.read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Invalid installer config {}", path.display()))?;
        config.entries()?;
        Ok(config)
    }

    /// Loads `explicit` if given (it must exist), otherwise the default file
    /// if present, otherwise an empty configuration.
    pub fn resolve<R: Runtime + ?Sized>(runtime: &R, explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(runtime, path);
        }
        match Self::default_path(runtime) {
            Some(path) if runtime.exists(&path) => Self::load(runtime, &path),
            _ => Ok(Self::default()),
        }
    }

    /// Configured installers keyed by parsed platform.
    pub fn entries(&self) -> Result<Vec<(InstallTarget, InstallCommand)>> {
        let mut entries = Vec::with_capacity(self.installers.len());
        let mut seen: BTreeMap<InstallTarget, &str> = BTreeMap::new();
        for (key, command) in &self.installers {
            let target = key
                .parse::<InstallTarget>()
                .map_err(|e| anyhow::anyhow!("{} in installer config", e))?;
            if let Some(previous) = seen.insert(target, key) {
                bail!(
                    "Installer config keys \"{}\" and \"{}\" both name platform {}",
                    previous,
                    key,
                    target
                );
            }
            if command.program.as_os_str().is_empty() {
                bail!("Installer for {} has an empty program", key);
            }
            entries.push((target, command.clone()));
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::MockRuntime;
    use mockall::predicate::eq;

    #[test]
    fn test_load_config() {
        let mut runtime = MockRuntime::new();
        runtime
            .expect_read_to_string()
            .with(eq(PathBuf::from("/etc/deployctl/installers.json")))
            .returning(|_| {
                Ok(r#"{"installers": {"macos": {"program": "sh", "args": ["scripts/install-macos.sh"]}}}"#.into())
            });

        let config =
            InstallerConfig::load(&runtime, Path::new("/etc/deployctl/installers.json")).unwrap();
        let entries = config.entries().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].0, InstallTarget::Macos);
        assert_eq!(entries[0].1.args, vec!["scripts/install-macos.sh"]);
    }

    #[test]
    fn test_args_default_to_empty() {
        let config: InstallerConfig =
            serde_json::from_str(r#"{"installers": {"rhel": {"program": "/opt/install"}}}"#)
                .unwrap();
        assert!(config.installers["rhel"].args.is_empty());
    }

    #[test]
    fn test_load_rejects_unknown_platform() {
        let mut runtime = MockRuntime::new();
        runtime
            .expect_read_to_string()
            .returning(|_| Ok(r#"{"installers": {"plan9": {"program": "rc"}}}"#.into()));

        let err = InstallerConfig::load(&runtime, Path::new("cfg.json")).unwrap_err();
        assert!(err.to_string().contains("Unsupported platform: plan9"));
    }

    #[test]
    fn test_load_rejects_aliases_of_the_same_platform() {
        let mut runtime = MockRuntime::new();
        runtime.expect_read_to_string().returning(|_| {
            Ok(r#"{"installers": {
                "rhel": {"program": "bash", "args": ["a.sh"]},
                "centos": {"program": "bash", "args": ["b.sh"]}
            }}"#
            .into())
        });

        let err = InstallerConfig::load(&runtime, Path::new("/etc/deployctl/installers.json"))
            .unwrap_err()
            .to_string();
        assert!(err.contains("\"centos\""), "{}", err);
        assert!(err.contains("\"rhel\""), "{}", err);
    }

    #[test]
    fn test_load_rejects_invalid_json() {
        let mut runtime = MockRuntime::new();
        runtime
            .expect_read_to_string()
            .returning(|_| Ok("{ not json".into()));

        let err = InstallerConfig::load(&runtime, Path::new("cfg.json")).unwrap_err();
        assert!(err.to_string().contains("Invalid installer config"));
    }

    #[test]
    fn test_resolve_without_any_file_is_empty() {
        let mut runtime = MockRuntime::new();
        runtime
            .expect_config_dir()
            .returning(|| Some(PathBuf::from("/home/user/.config")));
        runtime
            .expect_exists()
            .with(eq(PathBuf::from("/home/user/.config/deployctl/installers.json")))
            .returning(|_| false);

        let config = InstallerConfig::resolve(&runtime, None).unwrap();
        assert_eq!(config, InstallerConfig::default());
    }

    #[test]
    fn test_resolve_explicit_path_must_exist() {
        let mut runtime = MockRuntime::new();
        runtime
            .expect_read_to_string()
            .returning(|_| Err(anyhow::anyhow!("No such file")));

        assert!(InstallerConfig::resolve(&runtime, Some(Path::new("missing.json"))).is_err());
    }
}
