//! Test package models
//!
//! A `TestPackage` is the unit of work handed to an agent: an opaque bag of
//! string settings describing what to run and how.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Well-known package setting keys
pub mod settings {
    pub const TARGET_PLATFORM: &str = "target_platform";
    pub const RUNTIME_FRAMEWORK: &str = "runtime_framework";
    pub const DEFAULT_TIMEOUT: &str = "default_timeout";
    pub const CULTURE: &str = "culture";
    pub const AGENT_LAUNCH_TIMEOUT: &str = "agent_launch_timeout";
}

/// Platform resolution errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlatformError {
    #[error("Package {package} targets multiple platforms ({value}); a package must target exactly one platform")]
    MultiplePlatforms { package: String, value: String },

    #[error("Package {package} has an unknown target platform: {value}")]
    Unknown { package: String, value: String },
}

/// Target platform of a worker process
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// Whatever the host runs natively
    #[default]
    Current,
    X86,
    X64,
    Arm64,
}

impl Platform {
    pub fn name(&self) -> &'static str {
        match self {
            Platform::Current => "current",
            Platform::X86 => "x86",
            Platform::X64 => "x64",
            Platform::Arm64 => "arm64",
        }
    }

    /// The concrete platform of the running host
    pub fn host() -> Platform {
        match std::env::consts::ARCH {
            "x86" => Platform::X86,
            "aarch64" => Platform::Arm64,
            _ => Platform::X64,
        }
    }

    /// Resolve `Current` to the host platform
    pub fn concrete(self) -> Platform {
        match self {
            Platform::Current => Platform::host(),
            other => other,
        }
    }

    pub fn all() -> Vec<Platform> {
        vec![Platform::Current, Platform::X86, Platform::X64, Platform::Arm64]
    }

    /// Parse from string
    pub fn from_str(s: &str) -> Option<Platform> {
        match s.trim().to_lowercase().as_str() {
            "" | "current" | "anycpu" | "any" | "default" => Some(Platform::Current),
            "x86" | "i686" | "win32" => Some(Platform::X86),
            "x64" | "x86_64" | "amd64" => Some(Platform::X64),
            "arm64" | "aarch64" => Some(Platform::Arm64),
            _ => None,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Unit of work sent to an agent
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestPackage {
    pub id: String,
    pub name: String,
    #[serde(default)]
    settings: BTreeMap<String, String>,
}

impl TestPackage {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            settings: BTreeMap::new(),
        }
    }

    pub fn with_setting(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.settings.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.settings.get(key).map(String::as_str)
    }

    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }

    /// Get a setting and parse it, falling back on a missing or bad value
    pub fn get_parsed<T: FromStr>(&self, key: &str, default: T) -> T {
        self.get(key).and_then(|v| v.parse().ok()).unwrap_or(default)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.settings.contains_key(key)
    }

    pub fn settings(&self) -> &BTreeMap<String, String> {
        &self.settings
    }

    /// Resolve the platform this package must run on
    pub fn target_platform(&self) -> Result<Platform, PlatformError> {
        let value = self.get_or(settings::TARGET_PLATFORM, "").trim();

        if value.contains([',', ';', '|', ' ']) || value.eq_ignore_ascii_case("multiple") {
            return Err(PlatformError::MultiplePlatforms {
                package: self.name.clone(),
                value: value.to_string(),
            });
        }

        Platform::from_str(value).ok_or_else(|| PlatformError::Unknown {
            package: self.name.clone(),
            value: value.to_string(),
        })
    }

    /// Per-test default timeout, if configured
    pub fn default_timeout(&self) -> Option<Duration> {
        self.get(settings::DEFAULT_TIMEOUT)
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_millis)
    }

    /// How long to wait for a worker to register, in seconds; 0 means forever
    pub fn agent_launch_timeout(&self) -> Option<u64> {
        self.get(settings::AGENT_LAUNCH_TIMEOUT)
            .and_then(|v| v.trim().parse::<u64>().ok())
    }
}

impl fmt::Display for TestPackage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unset_platform_resolves_to_current() {
        let package = TestPackage::new("tests.dll");
        for _ in 0..3 {
            assert_eq!(package.target_platform(), Ok(Platform::Current));
        }
    }

    #[test]
    fn test_platform_parsing() {
        let package = TestPackage::new("a").with_setting(settings::TARGET_PLATFORM, "AMD64");
        assert_eq!(package.target_platform(), Ok(Platform::X64));
        assert_eq!(Platform::from_str("aarch64"), Some(Platform::Arm64));
        assert_eq!(Platform::from_str("sparc"), None);
    }

    #[test]
    fn test_multiple_platforms_rejected() {
        let package = TestPackage::new("a").with_setting(settings::TARGET_PLATFORM, "x86,x64");
        assert!(matches!(
            package.target_platform(),
            Err(PlatformError::MultiplePlatforms { .. })
        ));

        let package = TestPackage::new("b").with_setting(settings::TARGET_PLATFORM, "Multiple");
        assert!(package.target_platform().is_err());
    }

    #[test]
    fn test_settings_lookup() {
        let package = TestPackage::new("a")
            .with_setting(settings::DEFAULT_TIMEOUT, "1500")
            .with_setting(settings::CULTURE, "fr-FR");

        assert!(package.contains_key(settings::CULTURE));
        assert_eq!(package.get_or("missing", "fallback"), "fallback");
        assert_eq!(package.get_parsed(settings::DEFAULT_TIMEOUT, 0u64), 1500);
        assert_eq!(package.get_parsed(settings::CULTURE, 3u64), 3);
        assert_eq!(package.default_timeout(), Some(Duration::from_millis(1500)));
        assert_eq!(package.agent_launch_timeout(), None);
    }

    #[test]
    fn test_agent_launch_timeout() {
        let package = TestPackage::new("a").with_setting(settings::AGENT_LAUNCH_TIMEOUT, " 0 ");
        assert_eq!(package.agent_launch_timeout(), Some(0));

        let package = TestPackage::new("a").with_setting(settings::AGENT_LAUNCH_TIMEOUT, "soon");
        assert_eq!(package.agent_launch_timeout(), None);
    }
}
