//! Environment variable configuration
//!
//! Provides environment variable overrides for configuration.

use std::env;
use tracing::warn;

use super::AppConfig;

/// Environment variable prefix
const ENV_PREFIX: &str = "SUITEGRID";

/// Environment configuration from environment variables
#[derive(Clone, Debug, Default)]
pub struct EnvConfig {
    /// Config file from SUITEGRID_CONFIG
    pub config_file: Option<String>,
    /// Log level from SUITEGRID_LOG_LEVEL
    pub log_level: Option<String>,
    /// Poll interval from SUITEGRID_POLL_INTERVAL_MS
    pub poll_interval_ms: Option<u64>,
    /// Worker wait from SUITEGRID_LAUNCH_TIMEOUT
    pub launch_timeout_secs: Option<u64>,
    /// Per-test timeout from SUITEGRID_TEST_TIMEOUT_MS
    pub test_timeout_ms: Option<u64>,
    /// Culture from SUITEGRID_CULTURE
    pub culture: Option<String>,
    /// Output format from SUITEGRID_FORMAT
    pub format: Option<String>,
    /// Verbose from SUITEGRID_VERBOSE
    pub verbose: Option<bool>,
}

impl EnvConfig {
    /// Load configuration from environment variables
    pub fn load() -> Self {
        Self {
            config_file: get_env("CONFIG"),
            log_level: get_env("LOG_LEVEL"),
            poll_interval_ms: get_env_parse("POLL_INTERVAL_MS"),
            launch_timeout_secs: get_env_parse("LAUNCH_TIMEOUT"),
            test_timeout_ms: get_env_parse("TEST_TIMEOUT_MS"),
            culture: get_env("CULTURE"),
            format: get_env("FORMAT"),
            verbose: get_env_bool("VERBOSE"),
        }
    }

    /// Check if any environment variables are set
    pub fn has_any(&self) -> bool {
        self.config_file.is_some()
            || self.log_level.is_some()
            || self.poll_interval_ms.is_some()
            || self.launch_timeout_secs.is_some()
            || self.test_timeout_ms.is_some()
            || self.culture.is_some()
            || self.format.is_some()
            || self.verbose.is_some()
    }

    /// Overlay the variables that are set onto a loaded configuration
    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(level) = &self.log_level {
            config.log_level = level.clone();
        }
        match self.poll_interval_ms {
            Some(0) => warn!("Ignoring {}_POLL_INTERVAL_MS=0", ENV_PREFIX),
            Some(ms) => config.agents.poll_interval_ms = ms,
            None => {}
        }
        if let Some(secs) = self.launch_timeout_secs {
            config.agents.launch_timeout_secs = secs;
        }
        if let Some(ms) = self.test_timeout_ms {
            config.execution.default_timeout_ms = Some(ms);
        }
        if let Some(culture) = &self.culture {
            config.execution.culture = Some(culture.clone());
        }
    }

    pub fn format_or(&self, default: &str) -> String {
        self.format.clone().unwrap_or_else(|| default.to_string())
    }

    /// Print current environment configuration
    pub fn print_summary(&self) {
        println!("Environment Configuration:");
        println!("  {}_CONFIG:            {:?}", ENV_PREFIX, self.config_file);
        println!("  {}_LOG_LEVEL:         {:?}", ENV_PREFIX, self.log_level);
        println!("  {}_POLL_INTERVAL_MS:  {:?}", ENV_PREFIX, self.poll_interval_ms);
        println!("  {}_LAUNCH_TIMEOUT:    {:?}", ENV_PREFIX, self.launch_timeout_secs);
        println!("  {}_TEST_TIMEOUT_MS:   {:?}", ENV_PREFIX, self.test_timeout_ms);
        println!("  {}_CULTURE:           {:?}", ENV_PREFIX, self.culture);
        println!("  {}_FORMAT:            {:?}", ENV_PREFIX, self.format);
    }
}

/// Get environment variable with prefix
fn get_env(name: &str) -> Option<String> {
    env::var(format!("{ENV_PREFIX}_{name}")).ok()
}

/// Get environment variable and parse to type
fn get_env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    get_env(name).and_then(|v| v.parse().ok())
}

/// Get environment variable as boolean
fn get_env_bool(name: &str) -> Option<bool> {
    get_env(name).map(|v| {
        matches!(
            v.to_lowercase().as_str(),
            "1" | "true" | "yes" | "on" | "enabled"
        )
    })
}

/// Builder for setting environment variables (useful for testing)
pub struct EnvBuilder {
    vars: Vec<(String, String)>,
}

impl EnvBuilder {
    pub fn new() -> Self {
        Self { vars: Vec::new() }
    }

    fn var(mut self, name: &str, value: String) -> Self {
        self.vars.push((format!("{ENV_PREFIX}_{name}"), value));
        self
    }

    pub fn log_level(self, level: impl Into<String>) -> Self {
        self.var("LOG_LEVEL", level.into())
    }

    pub fn poll_interval_ms(self, ms: u64) -> Self {
        self.var("POLL_INTERVAL_MS", ms.to_string())
    }

    pub fn launch_timeout_secs(self, secs: u64) -> Self {
        self.var("LAUNCH_TIMEOUT", secs.to_string())
    }

    pub fn test_timeout_ms(self, ms: u64) -> Self {
        self.var("TEST_TIMEOUT_MS", ms.to_string())
    }

    pub fn culture(self, culture: impl Into<String>) -> Self {
        self.var("CULTURE", culture.into())
    }

    pub fn verbose(self, verbose: bool) -> Self {
        self.var("VERBOSE", verbose.to_string())
    }

    /// Apply environment variables
    pub fn apply(self) {
        for (key, value) in self.vars {
            env::set_var(key, value);
        }
    }

    /// Apply and return guard that restores on drop
    pub fn apply_scoped(self) -> EnvGuard {
        let previous: Vec<_> = self
            .vars
            .iter()
            .map(|(k, _)| (k.clone(), env::var(k).ok()))
            .collect();

        self.apply();

        EnvGuard { previous }
    }
}

impl Default for EnvBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Guard that restores environment variables on drop
pub struct EnvGuard {
    previous: Vec<(String, Option<String>)>,
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, value) in &self.previous {
            match value {
                Some(v) => env::set_var(key, v),
                None => env::remove_var(key),
            }
        }
    }
}

/// Print all SUITEGRID environment variables
pub fn print_env_help() {
    println!("Environment Variables:");
    println!();
    println!("  {ENV_PREFIX}_CONFIG             Path to configuration file");
    println!("  {ENV_PREFIX}_LOG_LEVEL          Log level (trace, debug, info, warn, error)");
    println!("  {ENV_PREFIX}_POLL_INTERVAL_MS   Registry poll interval while waiting for workers");
    println!("  {ENV_PREFIX}_LAUNCH_TIMEOUT     Seconds to wait for a worker (0 waits forever)");
    println!("  {ENV_PREFIX}_TEST_TIMEOUT_MS    Default per-test timeout");
    println!("  {ENV_PREFIX}_CULTURE            Culture applied to test execution");
    println!("  {ENV_PREFIX}_FORMAT             Output format (table, json, json-pretty, summary)");
    println!("  {ENV_PREFIX}_VERBOSE            Enable verbose output (true/false)");
    println!();
    println!("Example:");
    println!("  export {ENV_PREFIX}_LAUNCH_TIMEOUT=10");
    println!("  suitegrid request tests.dll --platform x86");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_config_default() {
        let config = EnvConfig::default();
        assert!(config.config_file.is_none());
        assert!(!config.has_any());
        assert_eq!(config.format_or("table"), "table");
    }

    #[test]
    fn test_env_builder() {
        let _guard = EnvBuilder::new()
            .poll_interval_ms(25)
            .launch_timeout_secs(5)
            .culture("de-DE")
            .apply_scoped();

        let config = EnvConfig::load();
        assert_eq!(config.poll_interval_ms, Some(25));
        assert_eq!(config.launch_timeout_secs, Some(5));
        assert_eq!(config.culture, Some("de-DE".to_string()));
    }

    #[test]
    fn test_env_bool_parsing() {
        let _guard = EnvBuilder::new().verbose(true).apply_scoped();

        let config = EnvConfig::load();
        assert_eq!(config.verbose, Some(true));
    }

    #[test]
    fn test_apply_overrides_only_set_values() {
        let env = EnvConfig {
            test_timeout_ms: Some(500),
            log_level: Some("debug".to_string()),
            ..Default::default()
        };
        let mut config = AppConfig::default();
        env.apply(&mut config);

        assert_eq!(config.log_level, "debug");
        assert_eq!(config.execution.default_timeout_ms, Some(500));
        assert_eq!(config.agents.poll_interval_ms, 200);
        assert!(config.execution.culture.is_none());
    }

    #[test]
    fn test_apply_ignores_zero_poll_interval() {
        let env = EnvConfig {
            poll_interval_ms: Some(0),
            ..Default::default()
        };
        let mut config = AppConfig::default();
        env.apply(&mut config);

        assert_eq!(config.agents.poll_interval_ms, 200);

        let env = EnvConfig {
            poll_interval_ms: Some(20),
            ..Default::default()
        };
        env.apply(&mut config);
        assert_eq!(config.agents.poll_interval_ms, 20);
    }
}
