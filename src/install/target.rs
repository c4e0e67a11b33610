use std::fmt;
use std::str::FromStr;

use super::InstallError;

/// Platforms an installer can be registered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum InstallTarget {
    /// Red Hat family: RHEL, CentOS, Fedora, Rocky, AlmaLinux, Oracle Linux
    Rhel,
    /// Debian family: Debian, Ubuntu
    Debian,
    Macos,
}

impl InstallTarget {
    pub const ALL: [InstallTarget; 3] = [InstallTarget::Rhel, InstallTarget::Debian, InstallTarget::Macos];

    /// Whether installers for this platform normally need root.
    pub fn needs_root(&self) -> bool {
        matches!(self, InstallTarget::Rhel | InstallTarget::Debian)
    }
}

impl fmt::Display for InstallTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstallTarget::Rhel => write!(f, "rhel"),
            InstallTarget::Debian => write!(f, "debian"),
            InstallTarget::Macos => write!(f, "macos"),
        }
    }
}

impl FromStr for InstallTarget {
    type Err = InstallError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "rhel" | "redhat" | "centos" | "fedora" | "rocky" | "almalinux" | "ol" => {
                Ok(InstallTarget::Rhel)
            }
            "debian" | "ubuntu" => Ok(InstallTarget::Debian),
            "macos" | "darwin" | "osx" => Ok(InstallTarget::Macos),
            _ => Err(InstallError::UnsupportedPlatform(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rhel_family() {
        for id in ["rhel", "RHEL", "centos", "fedora", "rocky", "almalinux", "ol"] {
            assert_eq!(id.parse::<InstallTarget>().unwrap(), InstallTarget::Rhel, "{}", id);
        }
    }

    #[test]
    fn test_parse_other_platforms() {
        assert_eq!("ubuntu".parse::<InstallTarget>().unwrap(), InstallTarget::Debian);
        assert_eq!("debian".parse::<InstallTarget>().unwrap(), InstallTarget::Debian);
        assert_eq!("darwin".parse::<InstallTarget>().unwrap(), InstallTarget::Macos);
    }

    #[test]
    fn test_parse_unknown_platform() {
        let err = "unknown-os".parse::<InstallTarget>().unwrap_err();
        assert!(matches!(err, InstallError::UnsupportedPlatform(p) if p == "unknown-os"));
        assert!("".parse::<InstallTarget>().is_err());
    }

    #[test]
    fn test_display_round_trips_through_parse() {
        for target in InstallTarget::ALL {
            assert_eq!(target.to_string().parse::<InstallTarget>().unwrap(), target);
        }
    }

    #[test]
    fn test_needs_root() {
        assert!(InstallTarget::Rhel.needs_root());
        assert!(!InstallTarget::Macos.needs_root());
    }
}
