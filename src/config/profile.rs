//! Package profiles
//!
//! Named package presets so common settings combinations can be requested
//! without repeating them on the command line.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::models::{settings, Platform, TestPackage};

/// A reusable set of package settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PackageProfile {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Settings copied onto every package built from this profile
    #[serde(default)]
    pub settings: BTreeMap<String, String>,
}

impl PackageProfile {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            settings: BTreeMap::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_setting(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.settings.insert(key.into(), value.into());
        self
    }

    /// Native workers on the host platform
    pub fn native() -> Self {
        Self::new("native")
            .with_description("Run on the host platform")
            .with_setting(settings::TARGET_PLATFORM, Platform::Current.name())
    }

    /// 32-bit workers
    pub fn x86() -> Self {
        Self::new("x86")
            .with_description("Run in a 32-bit x86 worker")
            .with_setting(settings::TARGET_PLATFORM, Platform::X86.name())
    }

    /// Build a package named `package_name` carrying this profile's settings
    pub fn to_package(&self, package_name: &str) -> TestPackage {
        self.settings
            .iter()
            .fold(TestPackage::new(package_name), |package, (k, v)| {
                package.with_setting(k.as_str(), v.as_str())
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_to_package() {
        let profile = PackageProfile::x86().with_setting(settings::CULTURE, "fr-FR");
        let package = profile.to_package("tests.dll");

        assert_eq!(package.name, "tests.dll");
        assert_eq!(package.target_platform(), Ok(Platform::X86));
        assert_eq!(package.get(settings::CULTURE), Some("fr-FR"));
    }

    #[test]
    fn test_native_profile() {
        let package = PackageProfile::native().to_package("p");
        assert_eq!(package.target_platform(), Ok(Platform::Current));
    }
}
