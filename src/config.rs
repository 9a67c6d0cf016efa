use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::llm::AnthropicConfig;
use crate::observe::CaptureSettings;
use crate::plugin::PluginLimits;
use crate::retry::RetryConfig;
use crate::runner::LoopBudgets;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: Option<String>,
    pub llm: LlmConfig,
    pub budgets: BudgetsConfig,
    pub capture: CaptureConfig,
    pub retry: RetrySection,
    pub safety: SafetyConfig,
    pub plugins: PluginsConfig,
    pub journal: JournalConfig,
    pub recovery: RecoverySection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub model: String,
    pub max_tokens: u32,
    pub timeout_ms: u64,
    /// Model used for the safety fallback scorer; defaults to `model`
    pub risk_model: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "claude-sonnet-4-20250514".to_string(),
            max_tokens: 1024,
            timeout_ms: 120000,
            risk_model: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetsConfig {
    pub max_iterations: u32,
    pub max_consecutive_failures: u32,
    pub fingerprint_window: usize,
    pub consecutive_repeat_threshold: u32,
    pub window_repeat_threshold: usize,
    pub progress_log_lines: usize,
    pub iteration_pause_ms: u64,
    pub coordinate_tolerance_px: u32,
}

impl Default for BudgetsConfig {
    fn default() -> Self {
        Self {
            max_iterations: 35,
            max_consecutive_failures: 3,
            fingerprint_window: 8,
            consecutive_repeat_threshold: 2,
            window_repeat_threshold: 3,
            progress_log_lines: 12,
            iteration_pause_ms: 400,
            coordinate_tolerance_px: 12,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub max_dimension: u32,
    pub quality: u8,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            max_dimension: 1280,
            quality: 70,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySection {
    pub transient_base_ms: u64,
    pub transient_max_delay_ms: u64,
    pub transient_max_attempts: u32,
    pub rate_limit_default_ms: u64,
    pub rate_limit_max_attempts: u32,
    pub unknown_base_ms: u64,
    pub unknown_max_delay_ms: u64,
    pub unknown_max_attempts: u32,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            transient_base_ms: 1000,
            transient_max_delay_ms: 15000,
            transient_max_attempts: 3,
            rate_limit_default_ms: 10000,
            rate_limit_max_attempts: 3,
            unknown_base_ms: 2000,
            unknown_max_delay_ms: 8000,
            unknown_max_attempts: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetyConfig {
    /// Ask the model to score actions the heuristics cannot place
    pub llm_fallback: bool,
    /// Log every tier2 approval at info level
    pub audit_log: bool,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            llm_fallback: true,
            audit_log: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginsConfig {
    pub plugin_dir: PathBuf,
    pub data_dir: PathBuf,
    pub timeout_secs: u64,
    pub max_output_bytes: usize,
}

impl Default for PluginsConfig {
    fn default() -> Self {
        let base = default_base_dir();
        Self {
            plugin_dir: base.join("plugins"),
            data_dir: base.join("plugin-data"),
            timeout_secs: 30,
            max_output_bytes: 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JournalConfig {
    pub journal_dir: PathBuf,
    pub save_observations: bool,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            journal_dir: default_base_dir().join("runs"),
            save_observations: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoverySection {
    /// Mark incomplete runs abandoned at start-up instead of offering resume
    pub auto_abandon: bool,
}

fn default_base_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(env!("CARGO_PKG_NAME"))
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: Some("info".to_string()),
            llm: LlmConfig::default(),
            budgets: BudgetsConfig::default(),
            capture: CaptureConfig::default(),
            retry: RetrySection::default(),
            safety: SafetyConfig::default(),
            plugins: PluginsConfig::default(),
            journal: JournalConfig::default(),
            recovery: RecoverySection::default(),
        }
    }
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Primary location: ~/.config/<project>/<project>.yml
        let project_name = env!("CARGO_PKG_NAME");
        if let Some(config_dir) = dirs::config_dir() {
            let primary_config = config_dir.join(project_name).join(format!("{}.yml", project_name));
            if primary_config.exists() {
                match Self::load_from_file(&primary_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        log::warn!("Failed to load config from {}: {}", primary_config.display(), e);
                    }
                }
            }
        }

        // Fallback location: ./<project>.yml
        let fallback_config = PathBuf::from(format!("{}.yml", project_name));
        if fallback_config.exists() {
            match Self::load_from_file(&fallback_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    log::warn!("Failed to load config from {}: {}", fallback_config.display(), e);
                }
            }
        }

        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        log::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    pub fn budgets(&self) -> LoopBudgets {
        let b = &self.budgets;
        LoopBudgets {
            max_iterations: b.max_iterations,
            max_consecutive_failures: b.max_consecutive_failures,
            fingerprint_window: b.fingerprint_window,
            consecutive_repeat_threshold: b.consecutive_repeat_threshold,
            window_repeat_threshold: b.window_repeat_threshold,
            progress_log_lines: b.progress_log_lines,
            iteration_pause: Duration::from_millis(b.iteration_pause_ms),
            coordinate_tolerance_px: b.coordinate_tolerance_px,
        }
    }

    /// Transport settings for `model`, or the main model when `None`.
    pub fn anthropic(&self, model: Option<&str>) -> AnthropicConfig {
        AnthropicConfig {
            model: model.unwrap_or(&self.llm.model).to_string(),
            max_tokens: self.llm.max_tokens,
            timeout: Duration::from_millis(self.llm.timeout_ms),
        }
    }

    pub fn capture_settings(&self) -> CaptureSettings {
        CaptureSettings {
            max_dimension: self.capture.max_dimension,
            quality: self.capture.quality,
        }
    }

    pub fn retry_config(&self) -> RetryConfig {
        let r = &self.retry;
        RetryConfig {
            transient_base: Duration::from_millis(r.transient_base_ms),
            transient_max_delay: Duration::from_millis(r.transient_max_delay_ms),
            transient_max_attempts: r.transient_max_attempts,
            rate_limit_default: Duration::from_millis(r.rate_limit_default_ms),
            rate_limit_max_attempts: r.rate_limit_max_attempts,
            unknown_base: Duration::from_millis(r.unknown_base_ms),
            unknown_max_delay: Duration::from_millis(r.unknown_max_delay_ms),
            unknown_max_attempts: r.unknown_max_attempts,
        }
    }

    pub fn plugin_limits(&self) -> PluginLimits {
        PluginLimits {
            timeout: Duration::from_secs(self.plugins.timeout_secs),
            max_output_bytes: self.plugins.max_output_bytes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults_match_runtime_defaults() {
        let config = Config::default();
        assert_eq!(config.budgets(), LoopBudgets::default());
        assert_eq!(config.retry_config(), RetryConfig::default());
        assert_eq!(config.plugin_limits(), PluginLimits::default());
        assert_eq!(config.capture_settings(), CaptureSettings::default());
    }

    #[test]
    fn test_load_partial_yaml() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "budgets:\n  max_iterations: 10\nplugins:\n  timeout_secs: 5\nsafety:\n  llm_fallback: false"
        )
        .unwrap();

        let config = Config::load(Some(&file.path().to_path_buf())).unwrap();
        assert_eq!(config.budgets.max_iterations, 10);
        assert_eq!(config.budgets.max_consecutive_failures, 3);
        assert_eq!(config.plugin_limits().timeout, Duration::from_secs(5));
        assert!(!config.safety.llm_fallback);
        assert_eq!(config.llm.model, "claude-sonnet-4-20250514");
    }

    #[test]
    fn test_load_explicit_missing_file_fails() {
        let path = PathBuf::from("/nonexistent/deskloop.yml");
        assert!(Config::load(Some(&path)).is_err());
    }

    #[test]
    fn test_load_invalid_yaml_fails() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "budgets: [not, a, map").unwrap();
        assert!(Config::load(Some(&file.path().to_path_buf())).is_err());
    }

    #[test]
    fn test_anthropic_transport_settings() {
        let mut config = Config::default();
        config.llm.timeout_ms = 5000;
        let main = config.anthropic(None);
        assert_eq!(main.model, config.llm.model);
        assert_eq!(main.timeout, Duration::from_secs(5));
        assert_eq!(config.anthropic(Some("claude-haiku")).model, "claude-haiku");
    }

    #[test]
    fn test_pause_converts_to_duration() {
        let mut config = Config::default();
        config.budgets.iteration_pause_ms = 250;
        assert_eq!(config.budgets().iteration_pause, Duration::from_millis(250));
    }
}
