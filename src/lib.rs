//! Two-agent chat relay
//!
//! Drives a browser to scrape the newest message from one chat agent's tab and
//! type it into the other agent's tab, turn after turn. A custom agent variant
//! talks to a chat-completions endpoint instead of a browser tab.

pub mod agent;
mod browser;
pub mod browser_setup;
pub mod cli;
pub mod dom;
mod manager;
pub mod relay;
pub mod sites;
pub mod tabs;
pub mod transcript;
pub mod utils;

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::utils::RetryPolicy;
use crate::utils::constants::{DEADLOCK_AVOIDANCE_PROMPT, DEFAULT_TOPIC};

/// Name of the config file picked up from the working directory
pub const DEFAULT_CONFIG_FILE: &str = "relay.yaml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Seeded into the introduction of each agent
    #[serde(default = "default_topic")]
    pub topic: String,

    /// IANA timezone for transcript timestamps
    #[serde(default = "default_timezone")]
    pub timezone: String,

    /// Directory for transcript files. Defaults to the executable's directory.
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// Stop after this many relayed messages
    #[serde(default)]
    pub max_turns: Option<usize>,

    #[serde(default)]
    pub deadlock: DeadlockConfig,

    #[serde(default)]
    pub pacing: PacingConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub browser: BrowserConfig,

    #[serde(default)]
    pub custom: CustomAgentConfig,
}

/// Deadlock avoidance settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadlockConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Messages relayed before the prompt is injected
    #[serde(default = "default_deadlock_threshold")]
    pub threshold: u32,

    #[serde(default = "default_deadlock_prompt")]
    pub prompt: String,
}

/// Wait after typing into a browser agent, giving the site time to answer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PacingConfig {
    #[serde(default = "default_response_wait_secs")]
    pub response_wait_secs: f64,

    #[serde(default = "default_response_jitter_secs")]
    pub response_jitter_secs: f64,
}

/// DOM polling retry settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_retries")]
    pub retries: u32,

    #[serde(default = "default_retry_wait_secs")]
    pub wait_secs: f64,

    #[serde(default = "default_retry_jitter_secs")]
    pub jitter_secs: f64,
}

/// Browser security and launch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    /// Run browser in headless mode. The operator has to log in by hand,
    /// so this is off unless a pre-authenticated profile is supplied.
    #[serde(default)]
    pub headless: bool,

    /// Disable web security features (Same-Origin Policy, etc.)
    /// WARNING: Only enable for trusted content
    #[serde(default = "default_disable_security")]
    pub disable_security: bool,

    /// Chrome profile directory. Kept between runs so logins survive.
    #[serde(default)]
    pub user_data_dir: Option<PathBuf>,

    /// Use a throwaway profile under the temp dir, removed on shutdown
    #[serde(default)]
    pub ephemeral_profile: bool,

    /// Explicit Chrome/Chromium executable
    #[serde(default)]
    pub chrome_executable: Option<PathBuf>,

    /// Window dimensions
    #[serde(default)]
    pub window: WindowConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowConfig {
    #[serde(default = "default_window_width")]
    pub width: u32,

    #[serde(default = "default_window_height")]
    pub height: u32,
}

/// Model endpoint for the custom agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomAgentConfig {
    /// OpenAI-compatible chat completions URL
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_model")]
    pub model: String,

    /// Environment variable holding the bearer token, if the endpoint needs one
    #[serde(default)]
    pub api_key_env: Option<String>,

    #[serde(default)]
    pub system_prompt: Option<String>,

    #[serde(default = "default_temperature")]
    pub temperature: f64,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u64,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Previous exchanges resent with every request
    #[serde(default = "default_history_turns")]
    pub history_turns: usize,
}

fn default_topic() -> String {
    DEFAULT_TOPIC.to_string()
}
fn default_timezone() -> String {
    "UTC".to_string()
}
fn default_deadlock_threshold() -> u32 {
    25
}
fn default_deadlock_prompt() -> String {
    DEADLOCK_AVOIDANCE_PROMPT.to_string()
}
fn default_response_wait_secs() -> f64 {
    20.0
}
fn default_response_jitter_secs() -> f64 {
    2.0
}
fn default_retries() -> u32 {
    5
}
fn default_retry_wait_secs() -> f64 {
    5.0
}
fn default_retry_jitter_secs() -> f64 {
    1.0
}

fn default_disable_security() -> bool {
    false  // SECURE BY DEFAULT
}

fn default_window_width() -> u32 {
    1280
}

fn default_window_height() -> u32 {
    900
}

fn default_endpoint() -> String {
    "http://127.0.0.1:11434/v1/chat/completions".to_string()
}
fn default_model() -> String {
    "llama3.1:8b".to_string()
}
fn default_temperature() -> f64 {
    0.7
}
fn default_max_tokens() -> u64 {
    512
}
fn default_timeout_secs() -> u64 {
    120
}
fn default_history_turns() -> usize {
    8
}

impl Default for Config {
    fn default() -> Self {
        Self {
            topic: default_topic(),
            timezone: default_timezone(),
            log_dir: None,
            max_turns: None,
            deadlock: DeadlockConfig::default(),
            pacing: PacingConfig::default(),
            retry: RetryConfig::default(),
            browser: BrowserConfig::default(),
            custom: CustomAgentConfig::default(),
        }
    }
}

impl Default for DeadlockConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            threshold: default_deadlock_threshold(),
            prompt: default_deadlock_prompt(),
        }
    }
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            response_wait_secs: default_response_wait_secs(),
            response_jitter_secs: default_response_jitter_secs(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            retries: default_retries(),
            wait_secs: default_retry_wait_secs(),
            jitter_secs: default_retry_jitter_secs(),
        }
    }
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: false,
            disable_security: default_disable_security(),
            user_data_dir: None,
            ephemeral_profile: false,
            chrome_executable: None,
            window: WindowConfig::default(),
        }
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: default_window_width(),
            height: default_window_height(),
        }
    }
}

impl Default for CustomAgentConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            model: default_model(),
            api_key_env: None,
            system_prompt: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
            history_turns: default_history_turns(),
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retries,
            secs(self.wait_secs),
            secs(self.jitter_secs),
        )
    }
}

impl PacingConfig {
    pub fn response_wait(&self) -> Duration {
        secs(self.response_wait_secs)
    }

    pub fn response_jitter(&self) -> Duration {
        secs(self.response_jitter_secs)
    }
}

/// Negative or NaN values from a hand-edited file collapse to zero,
/// values too large for a `Duration` saturate
fn secs(value: f64) -> Duration {
    if value.is_nan() || value <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(value).unwrap_or(Duration::MAX)
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },
}

/// Load config from an explicit path, or `relay.yaml` in the working
/// directory when present, or fall back to defaults.
pub fn load_yaml_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let config_path = match path {
        Some(p) => p.to_path_buf(),
        None => {
            let candidate = PathBuf::from(DEFAULT_CONFIG_FILE);
            if !candidate.exists() {
                return Ok(Config::default());
            }
            candidate
        }
    };

    let contents = fs::read_to_string(&config_path).map_err(|source| ConfigError::Read {
        path: config_path.clone(),
        source,
    })?;
    serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: config_path,
        source,
    })
}

pub use agent::{Agent, AgentError, AgentKind, AgentResult, BrowserAgent, CustomAgent};
pub use browser::{
    BrowserError, BrowserResult, BrowserWrapper, download_managed_browser,
    find_browser_executable, launch_browser,
};
pub use manager::BrowserManager;
pub use relay::{Relay, RelaySettings};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_relay_conventions() {
        let config = Config::default();
        assert_eq!(config.topic, "stuff");
        assert_eq!(config.timezone, "UTC");
        assert_eq!(config.deadlock.threshold, 25);
        assert!(!config.deadlock.enabled);
        assert_eq!(config.retry.retries, 5);
        assert_eq!(config.pacing.response_wait(), Duration::from_secs(20));
        assert!(!config.browser.headless);
    }

    #[test]
    fn partial_yaml_keeps_defaults() {
        let yaml = "topic: cats\ndeadlock:\n  enabled: true\n  threshold: 3\nretry:\n  retries: 2\n";
        let config: Config = serde_yaml::from_str(yaml).expect("valid yaml");
        assert_eq!(config.topic, "cats");
        assert!(config.deadlock.enabled);
        assert_eq!(config.deadlock.threshold, 3);
        assert_eq!(config.deadlock.prompt, DEADLOCK_AVOIDANCE_PROMPT);
        assert_eq!(config.retry.retries, 2);
        assert_eq!(config.retry.wait_secs, 5.0);
        assert_eq!(config.custom.history_turns, 8);
    }

    #[test]
    fn negative_durations_collapse_to_zero() {
        let retry = RetryConfig {
            retries: 1,
            wait_secs: -3.0,
            jitter_secs: f64::NAN,
        };
        let policy = retry.policy();
        assert_eq!(policy.wait(), Duration::ZERO);
        assert_eq!(policy.jitter(), Duration::ZERO);
    }

    #[test]
    fn oversized_durations_saturate() {
        let config: Config = serde_yaml::from_str("retry:\n  wait_secs: 1e20\npacing:\n  response_wait_secs: .inf\n")
            .expect("valid yaml");
        assert_eq!(config.retry.policy().wait(), Duration::MAX);
        assert_eq!(config.pacing.response_wait(), Duration::MAX);
    }

    #[test]
    fn missing_explicit_config_is_an_error() {
        let path = std::env::temp_dir().join("agent_relay_missing_config_does_not_exist.yaml");
        let err = load_yaml_config(Some(&path)).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
