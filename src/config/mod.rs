use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::browser::{SessionSettings, WaitSettings};
use crate::error::{Result, ScrapingError};
use crate::pipeline::RetryPolicy;
use crate::sites::SiteProfile;
use crate::storage::OutputFormat;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Config {
    pub site: SiteConfig,
    pub limits: LimitsConfig,
    pub browser: BrowserConfig,
    pub session: SessionConfig,
    pub retry: RetryConfig,
    pub pacing: PacingConfig,
    pub output: OutputConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SiteConfig {
    /// Name of a built-in profile, ignored when `custom` is set.
    pub profile: String,
    pub base_url: Option<String>,
    pub listing_url: Option<String>,
    pub custom: Option<SiteProfile>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct LimitsConfig {
    pub max_articles: usize,
    pub max_scrolls: u32,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BrowserConfig {
    pub headless: bool,
    pub chrome_executable: Option<PathBuf>,
    #[serde(with = "humantime_serde")]
    pub page_load_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub element_wait_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SessionConfig {
    pub launch_attempts: u32,
    #[serde(with = "humantime_serde")]
    pub launch_backoff: Duration,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub multiplier: f64,
    #[serde(with = "humantime_serde")]
    pub min_delay: Duration,
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PacingConfig {
    #[serde(with = "humantime_serde")]
    pub scroll_delay: Duration,
    #[serde(with = "humantime_serde")]
    pub article_delay: Duration,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct OutputConfig {
    pub directory: PathBuf,
    /// Overrides the profile's file prefix.
    pub prefix: Option<String>,
    /// Overrides the profile's output format.
    pub format: Option<OutputFormat>,
    pub timestamped: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct LoggingConfig {
    pub directory: PathBuf,
    pub file_prefix: String,
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for Config {
    fn default() -> Self {
        let retry = RetryPolicy::default();
        Self {
            site: SiteConfig {
                profile: "setopati".to_string(),
                base_url: None,
                listing_url: None,
                custom: None,
            },
            limits: LimitsConfig {
                max_articles: 20,
                max_scrolls: 5,
            },
            browser: BrowserConfig {
                headless: true,
                chrome_executable: None,
                page_load_timeout: Duration::from_secs(300),
                element_wait_timeout: Duration::from_secs(30),
                poll_interval: Duration::from_millis(500),
            },
            session: SessionConfig {
                launch_attempts: 3,
                launch_backoff: Duration::from_secs(5),
            },
            retry: RetryConfig {
                max_attempts: retry.max_attempts,
                multiplier: retry.multiplier,
                min_delay: retry.min_delay,
                max_delay: retry.max_delay,
            },
            pacing: PacingConfig {
                scroll_delay: Duration::from_secs(2),
                article_delay: Duration::from_secs(2),
            },
            output: OutputConfig {
                directory: PathBuf::from("."),
                prefix: None,
                format: None,
                timestamped: true,
            },
            logging: LoggingConfig {
                directory: PathBuf::from("logs"),
                file_prefix: "scraper".to_string(),
                level: "info".to_string(),
            },
        }
    }
}

impl Config {
    /// The site profile this run scrapes, with URL overrides applied.
    pub fn resolve_profile(&self) -> Result<SiteProfile> {
        let mut profile = match self.site.custom {
            Some(ref custom) => custom.clone(),
            None => SiteProfile::builtin(&self.site.profile).ok_or_else(|| {
                ScrapingError::Config(format!(
                    "Unknown site profile '{}', must be one of: {:?}",
                    self.site.profile,
                    SiteProfile::BUILTIN_NAMES
                ))
            })?,
        };

        if let Some(ref base_url) = self.site.base_url {
            profile.base_url = base_url.clone();
        }
        if let Some(ref listing_url) = self.site.listing_url {
            profile.listing_url = listing_url.clone();
        }
        if let Some(ref prefix) = self.output.prefix {
            profile.output_prefix = prefix.clone();
        }
        if let Some(format) = self.output.format {
            profile.output_format = format;
        }

        profile.validate()?;
        Ok(profile)
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            headless: self.browser.headless,
            chrome_executable: self.browser.chrome_executable.clone(),
            page_load_timeout: self.browser.page_load_timeout,
            element_wait: WaitSettings {
                timeout: self.browser.element_wait_timeout,
                poll_interval: self.browser.poll_interval,
            },
            launch_attempts: self.session.launch_attempts,
            launch_backoff: self.session.launch_backoff,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry.max_attempts,
            multiplier: self.retry.multiplier,
            min_delay: self.retry.min_delay,
            max_delay: self.retry.max_delay,
        }
    }
}

#[async_trait::async_trait]
pub trait ConfigManager {
    async fn load_config(&self) -> Result<Config>;
    async fn save_config(&self, config: &Config) -> Result<()>;
    fn validate_config(&self, config: &Config) -> Result<()>;
}

pub struct FileConfigManager {
    config_path: PathBuf,
}

impl FileConfigManager {
    pub fn new(config_path: PathBuf) -> Self {
        Self { config_path }
    }
}

#[async_trait::async_trait]
impl ConfigManager for FileConfigManager {
    async fn load_config(&self) -> Result<Config> {
        info!("Loading configuration from {:?}", self.config_path);

        if !self.config_path.exists() {
            warn!("Configuration file not found, creating default config at {:?}", self.config_path);
            self.create_default_config().await?;
        }

        let config_content = fs::read_to_string(&self.config_path)
            .map_err(|e| ScrapingError::Config(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&config_content)
            .map_err(|e| ScrapingError::Config(format!("Failed to parse TOML config: {}", e)))?;

        self.validate_config(&config)?;

        info!("Configuration loaded successfully");
        Ok(config)
    }

    fn validate_config(&self, config: &Config) -> Result<()> {
        debug!("Validating configuration");

        let profile = config.resolve_profile()?;

        let base_url = Url::parse(&profile.base_url).map_err(|e| {
            ScrapingError::Config(format!("Invalid base_url '{}': {}", profile.base_url, e))
        })?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(ScrapingError::Config("base_url must start with http:// or https://".to_string()));
        }
        base_url.join(&profile.listing_url).map_err(|e| {
            ScrapingError::Config(format!("Invalid listing_url '{}': {}", profile.listing_url, e))
        })?;

        // checking limits
        if config.limits.max_articles == 0 {
            return Err(ScrapingError::Config("max_articles must be greater than 0".to_string()));
        }
        if config.limits.max_scrolls > 100 {
            return Err(ScrapingError::Config("max_scrolls cannot exceed 100".to_string()));
        }

        // checking browser timeouts
        if config.browser.page_load_timeout.is_zero() || config.browser.element_wait_timeout.is_zero() {
            return Err(ScrapingError::Config("Browser timeouts must be greater than 0".to_string()));
        }
        if config.browser.poll_interval.is_zero() {
            return Err(ScrapingError::Config("poll_interval must be greater than 0".to_string()));
        }
        if config.browser.poll_interval > config.browser.element_wait_timeout {
            return Err(ScrapingError::Config(
                "poll_interval cannot exceed element_wait_timeout".to_string(),
            ));
        }
        if let Some(ref executable) = config.browser.chrome_executable {
            if !executable.exists() {
                return Err(ScrapingError::Config(format!("Chrome executable not found: {:?}", executable)));
            }
        }

        // checking session and retry budgets
        if config.session.launch_attempts == 0 || config.session.launch_attempts > 10 {
            return Err(ScrapingError::Config("launch_attempts must be between 1 and 10".to_string()));
        }
        if config.retry.max_attempts == 0 || config.retry.max_attempts > 10 {
            return Err(ScrapingError::Config("retry max_attempts must be between 1 and 10".to_string()));
        }
        if !config.retry.multiplier.is_finite() || config.retry.multiplier <= 0.0 {
            return Err(ScrapingError::Config("retry multiplier must be a positive number".to_string()));
        }
        if config.retry.min_delay > config.retry.max_delay {
            return Err(ScrapingError::Config(
                "retry min_delay must not exceed max_delay".to_string(),
            ));
        }

        // checking logging
        if config.logging.file_prefix.trim().is_empty() {
            return Err(ScrapingError::Config("logging file_prefix cannot be empty".to_string()));
        }

        debug!("Configuration validation passed");
        Ok(())
    }

    async fn save_config(&self, config: &Config) -> Result<()> {
        info!("Saving configuration to {:?}", self.config_path);

        let toml_content = toml::to_string_pretty(config)
            .map_err(|e| ScrapingError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(&self.config_path, toml_content)
            .map_err(|e| ScrapingError::Config(format!("Failed to write config file: {}", e)))?;

        info!("Configuration saved successfully");
        Ok(())
    }
}

impl FileConfigManager {
    async fn create_default_config(&self) -> Result<()> {
        let default_config = Config::default();
        let toml_content = toml::to_string_pretty(&default_config)
            .map_err(|e| ScrapingError::Config(format!("Failed to serialize default config: {}", e)))?;

        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| ScrapingError::Config(format!("Failed to create config directory: {}", e)))?;
        }

        fs::write(&self.config_path, toml_content)
            .map_err(|e| ScrapingError::Config(format!("Failed to write default config: {}", e)))?;

        info!("Default configuration file created at {:?}", self.config_path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sites::CollectionMode;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_load_default_config() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        let manager = FileConfigManager::new(config_path.clone());

        let config = manager.load_config().await.unwrap();

        assert_eq!(config, Config::default());
        assert_eq!(config.site.profile, "setopati");
        assert_eq!(config.limits.max_articles, 20);
        assert_eq!(config.browser.page_load_timeout, Duration::from_secs(300));
        assert!(config_path.exists());
    }

    #[tokio::test]
    async fn test_durations_are_human_readable() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        let manager = FileConfigManager::new(config_path.clone());

        let mut config = Config::default();
        config.browser.page_load_timeout = Duration::from_secs(120);
        manager.save_config(&config).await.unwrap();

        let written = fs::read_to_string(&config_path).unwrap();
        assert!(written.contains("page_load_timeout = \"2m\""));
        assert!(written.contains("poll_interval = \"500ms\""));

        let reloaded = manager.load_config().await.unwrap();
        assert_eq!(reloaded.browser.page_load_timeout, Duration::from_secs(120));
    }

    #[tokio::test]
    async fn test_parse_error_is_config_error() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        fs::write(&config_path, "[site]\nprofile = 42\n").unwrap();

        let err = FileConfigManager::new(config_path).load_config().await.unwrap_err();
        assert!(matches!(err, ScrapingError::Config(_)));
    }

    #[test]
    fn test_config_validation() {
        let manager = FileConfigManager::new(PathBuf::from("test.toml"));

        assert!(manager.validate_config(&Config::default()).is_ok());

        let mut invalid = Config::default();
        invalid.site.profile = "kathmandupost".to_string();
        assert!(manager.validate_config(&invalid).is_err());

        let mut invalid = Config::default();
        invalid.limits.max_articles = 0;
        assert!(manager.validate_config(&invalid).is_err());

        let mut invalid = Config::default();
        invalid.retry.min_delay = Duration::from_secs(20);
        assert!(manager.validate_config(&invalid).is_err());

        let mut invalid = Config::default();
        invalid.session.launch_attempts = 0;
        assert!(manager.validate_config(&invalid).is_err());

        let mut invalid = Config::default();
        invalid.browser.poll_interval = Duration::from_secs(60);
        assert!(manager.validate_config(&invalid).is_err());

        let mut invalid = Config::default();
        invalid.site.base_url = Some("ftp://setopati.com".to_string());
        assert!(manager.validate_config(&invalid).is_err());
    }

    #[test]
    fn test_resolve_profile_applies_overrides() {
        let mut config = Config::default();
        config.site.profile = "ekantipur".to_string();
        config.site.listing_url = Some("/business".to_string());
        config.output.prefix = Some("business".to_string());

        let profile = config.resolve_profile().unwrap();

        assert_eq!(profile.name, "ekantipur");
        assert_eq!(profile.mode, CollectionMode::Listing);
        assert_eq!(profile.listing_url, "/business");
        assert_eq!(profile.output_prefix, "business");
        assert_eq!(profile.output_format, OutputFormat::Json);
    }

    #[test]
    fn test_session_settings_and_retry_policy_follow_config() {
        let mut config = Config::default();
        config.browser.headless = false;
        config.browser.element_wait_timeout = Duration::from_secs(10);
        config.retry.max_attempts = 5;

        let settings = config.session_settings();
        assert!(!settings.headless);
        assert_eq!(settings.element_wait.timeout, Duration::from_secs(10));
        assert_eq!(settings.launch_attempts, 3);

        let policy = config.retry_policy();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.min_delay, Duration::from_secs(4));
    }
}
