//! Configuration file management
//!
//! Handles finding, loading, and validating configuration files.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::profile::PackageProfile;
use super::{AgentConfig, AppConfig, ExecutionConfig, LauncherConfig};
use crate::models::Platform;

/// Configuration file locations (in order of precedence)
const CONFIG_LOCATIONS: &[&str] = &[
    "./suitegrid.yaml",
    "./suitegrid.yml",
    "./.suitegrid.yaml",
    "./.suitegrid/config.yaml",
    "~/.config/suitegrid/config.yaml",
    "~/.suitegrid.yaml",
];

/// Full configuration file structure
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConfigFile {
    /// Version of config file format
    #[serde(default = "default_version")]
    pub version: String,

    /// Application settings
    #[serde(default)]
    pub app: AppConfig,

    /// Package profiles
    #[serde(default)]
    pub profiles: Vec<PackageProfile>,
}

fn default_version() -> String {
    "1.0".to_string()
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            version: default_version(),
            app: AppConfig::default(),
            profiles: Vec::new(),
        }
    }
}

impl ConfigFile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Find configuration file in standard locations
    pub fn find() -> Option<PathBuf> {
        CONFIG_LOCATIONS
            .iter()
            .map(|location| expand_path(location))
            .find(|path| path.exists())
    }

    /// Load configuration from default location
    pub fn load_default() -> Result<Self> {
        match Self::find() {
            Some(path) => Self::load(&path),
            None => Ok(Self::default()),
        }
    }

    /// Load configuration from file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = if is_yaml_file(path) {
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse YAML config: {}", path.display()))?
        } else {
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse JSON config: {}", path.display()))?
        };

        config
            .validate()
            .with_context(|| format!("Invalid config file: {}", path.display()))?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = if is_yaml_file(path) {
            serde_yaml::to_string(self).context("Failed to serialize config")?
        } else {
            serde_json::to_string_pretty(self).context("Failed to serialize config")?
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if !["1.0"].contains(&self.version.as_str()) {
            anyhow::bail!("Unsupported config version: {}", self.version);
        }

        let agents = &self.app.agents;
        if agents.poll_interval_ms == 0 {
            anyhow::bail!("agents.poll_interval_ms must be greater than zero");
        }
        agents
            .callback_addr
            .parse::<std::net::SocketAddr>()
            .with_context(|| format!("Invalid agents.callback_addr '{}'", agents.callback_addr))?;

        for launcher in &agents.launchers {
            if launcher.program.as_os_str().is_empty() {
                anyhow::bail!("Launcher for {} has no program", launcher.platform);
            }
        }
        for (i, launcher) in agents.launchers.iter().enumerate() {
            let label = launcher_label(launcher);
            if agents.launchers[..i]
                .iter()
                .any(|other| launcher_label(other) == label)
            {
                anyhow::bail!("Duplicate launcher name '{}'", label);
            }
        }

        for profile in &self.profiles {
            let package = profile.to_package(&profile.name);
            package
                .target_platform()
                .with_context(|| format!("Invalid profile '{}'", profile.name))?;
        }

        Ok(())
    }

    /// Generate example configuration
    pub fn example() -> Self {
        Self {
            version: default_version(),
            app: AppConfig {
                log_level: "info".to_string(),
                agents: AgentConfig {
                    poll_interval_ms: 200,
                    launch_timeout_secs: 30,
                    runtimes: Vec::new(),
                    callback_addr: crate::agents::DEFAULT_CALLBACK_ADDR.to_string(),
                    launchers: vec![
                        LauncherConfig::new(Platform::Current, "suitegrid-agent"),
                        LauncherConfig {
                            args: vec!["--x86".to_string()],
                            ..LauncherConfig::new(Platform::X86, "suitegrid-agent-x86")
                        },
                    ],
                },
                execution: ExecutionConfig {
                    default_timeout_ms: Some(60_000),
                    culture: None,
                },
            },
            profiles: vec![PackageProfile::native(), PackageProfile::x86()],
        }
    }

    /// Get package profile by name
    pub fn profile(&self, name: &str) -> Option<&PackageProfile> {
        self.profiles.iter().find(|p| p.name == name)
    }
}

fn launcher_label(launcher: &LauncherConfig) -> String {
    launcher
        .name
        .clone()
        .unwrap_or_else(|| format!("{}-launcher", launcher.platform))
}

/// Expand ~ to home directory
fn expand_path(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

/// Check if file is YAML based on extension
fn is_yaml_file(path: &Path) -> bool {
    path.extension()
        .map(|e| e == "yaml" || e == "yml")
        .unwrap_or(false)
}
