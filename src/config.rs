//! Defines the configuration settings for the place-scout application.

use anyhow::Context;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub(crate) static EMAIL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Z|a-z]{2,}\b")
        .expect("Failed to compile email regex pattern. This should not happen.")
});

/// TOML configuration file structure
#[derive(Deserialize, Debug, Default)]
pub(crate) struct ConfigFile {
    network: Option<NetworkConfig>,
    places: Option<PlacesConfig>,
    emails: Option<EmailsConfig>,
    store: Option<StoreConfig>,
}

#[derive(Deserialize, Debug, Default)]
struct NetworkConfig {
    request_timeout: Option<u64>,
    email_timeout: Option<u64>,
    user_agent: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
struct PlacesConfig {
    api_key: Option<String>,
    base_url: Option<String>,
    page_delay: Option<u64>,
    max_pages: Option<u32>,
    detail_min_sleep: Option<f32>,
    detail_max_sleep: Option<f32>,
}

#[derive(Deserialize, Debug, Default)]
struct EmailsConfig {
    common_paths: Option<Vec<String>>,
    max_concurrency: Option<usize>,
}

#[derive(Deserialize, Debug, Default)]
struct StoreConfig {
    path: Option<String>,
    export_dir: Option<String>,
}

/// Application configuration settings. Built once in main and passed
/// down explicitly; there is no process-global config state.
#[derive(Debug, Clone)]
pub(crate) struct Config {
    /// API key for the places lookup service.
    pub api_key: String,
    /// Base URL of the places lookup service.
    pub places_base_url: String,
    /// Timeout for places API requests.
    pub request_timeout: Duration,
    /// Timeout for individual email-probe page fetches.
    pub email_timeout: Duration,
    /// Mandatory delay between paginated places requests; the upstream
    /// rejects immediately-repeated page requests.
    pub page_delay: Duration,
    /// Pagination cap per places query.
    pub max_pages: u32,
    /// Min/max politeness sleep between detail fetches (seconds).
    pub detail_sleep: (f32, f32),
    /// Ordered contact-page paths probed before the homepage fallback.
    pub common_paths: Vec<String>,
    /// Worker-pool size for concurrent email discovery.
    pub max_concurrency: usize,
    /// User agent for HTTP requests.
    pub user_agent: String,
    /// Path of the persisted store file.
    pub store_path: PathBuf,
    /// Directory that export artifacts are written to.
    pub export_dir: PathBuf,
    /// Show a progress bar during the email-probe phase (CLI mode only).
    pub show_progress: bool,
}

impl Default for Config {
    fn default() -> Self {
        let common_paths = [
            "/contact",
            "/contact-us",
            "/contacten",
            "/about",
            "/over-ons",
            "/impressum",
            "/contact.html",
        ];

        Config {
            api_key: String::new(),
            places_base_url: "https://maps.googleapis.com/maps/api/place".to_string(),
            request_timeout: Duration::from_secs(30),
            email_timeout: Duration::from_secs(6),
            page_delay: Duration::from_secs(2),
            max_pages: 3,
            detail_sleep: (0.1, 0.5),
            common_paths: common_paths.iter().map(|s| s.to_string()).collect(),
            max_concurrency: 8,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/118.0.0.0 Safari/537.36".to_string(),
            store_path: PathBuf::from("store.csv"),
            export_dir: PathBuf::from("."),
            show_progress: false,
        }
    }
}

/// Load configuration from a TOML file
fn load_config_file(file_path: &str) -> anyhow::Result<ConfigFile> {
    let path = Path::new(file_path);
    if !path.exists() {
        tracing::warn!("Configuration file {} not found, using defaults", file_path);
        return Ok(ConfigFile::default());
    }

    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read configuration file: {}", file_path))?;

    let config: ConfigFile = toml::from_str(&content)
        .with_context(|| format!("Failed to parse TOML configuration from {}", file_path))?;

    tracing::info!("Loaded configuration from {}", file_path);
    Ok(config)
}

fn apply_file_config(config: &mut Config, file_config: &ConfigFile) {
    if let Some(network) = &file_config.network {
        if let Some(timeout) = network.request_timeout {
            config.request_timeout = Duration::from_secs(timeout);
        }
        if let Some(timeout) = network.email_timeout {
            config.email_timeout = Duration::from_secs(timeout);
        }
        if let Some(user_agent) = &network.user_agent {
            config.user_agent = user_agent.clone();
        }
    }

    if let Some(places) = &file_config.places {
        if let Some(key) = &places.api_key {
            config.api_key = key.clone();
        }
        if let Some(base_url) = &places.base_url {
            config.places_base_url = base_url.trim_end_matches('/').to_string();
        }
        if let Some(delay) = places.page_delay {
            config.page_delay = Duration::from_secs(delay);
        }
        if let Some(pages) = places.max_pages {
            config.max_pages = pages;
        }
        if let Some(min_sleep) = places.detail_min_sleep {
            config.detail_sleep.0 = min_sleep;
        }
        if let Some(max_sleep) = places.detail_max_sleep {
            config.detail_sleep.1 = max_sleep;
        }
    }

    if let Some(emails) = &file_config.emails {
        if let Some(paths) = &emails.common_paths {
            config.common_paths = paths.clone();
        }
        if let Some(concurrency) = emails.max_concurrency {
            config.max_concurrency = concurrency;
        }
    }

    if let Some(store) = &file_config.store {
        if let Some(path) = &store.path {
            config.store_path = PathBuf::from(path);
        }
        if let Some(dir) = &store.export_dir {
            config.export_dir = PathBuf::from(dir);
        }
    }
}

fn validate_config(config: &mut Config) {
    if config.detail_sleep.0 > config.detail_sleep.1 {
        config.detail_sleep.1 = config.detail_sleep.0;
        tracing::warn!(
            "Min detail sleep was greater than max. Setting both to {}",
            config.detail_sleep.0
        );
    }

    if config.max_pages == 0 {
        config.max_pages = 1;
        tracing::warn!("Page cap was set to 0. Setting to 1.");
    }

    if config.max_concurrency == 0 {
        config.max_concurrency = 1;
        tracing::warn!("Concurrency was set to 0. Setting to 1.");
    }

    if config.common_paths.is_empty() {
        tracing::warn!("Common contact paths list is empty; only homepages will be probed.");
    }
}

/// Builds the effective configuration: defaults, overridden by an
/// optional TOML file, overridden by explicit CLI values.
pub(crate) fn build_config(
    config_file: Option<&str>,
    api_key: Option<&str>,
    store_path: Option<&str>,
) -> anyhow::Result<Config> {
    let mut config = Config::default();

    if let Some(file_path) = config_file {
        let file_config = load_config_file(file_path)?;
        apply_file_config(&mut config, &file_config);
    } else {
        for path in ["./place-scout.toml", "./config.toml"].iter() {
            if Path::new(path).exists() {
                match load_config_file(path) {
                    Ok(file_config) => {
                        apply_file_config(&mut config, &file_config);
                        break;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load configuration from {}: {}", path, e);
                    }
                }
            }
        }
    }

    if let Some(key) = api_key {
        config.api_key = key.to_string();
    }
    if let Some(path) = store_path {
        config.store_path = PathBuf::from(path);
    }

    validate_config(&mut config);

    tracing::debug!("Final configuration: {:?}", config);

    Ok(config)
}

/// Random politeness sleep between detail fetches.
pub(crate) fn get_random_sleep_duration(config: &Config) -> Duration {
    use rand::Rng;
    let (min, max) = config.detail_sleep;
    if min >= max {
        return Duration::from_secs_f32(min);
    }
    let duration_secs = rand::thread_rng().gen_range(min..max);
    Duration::from_secs_f32(duration_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.max_pages, 3);
        assert_eq!(config.page_delay, Duration::from_secs(2));
        assert_eq!(config.email_timeout, Duration::from_secs(6));
        assert_eq!(config.max_concurrency, 8);
        assert_eq!(config.common_paths[0], "/contact");
        assert_eq!(config.common_paths.last().unwrap(), "/contact.html");
    }

    #[test]
    fn test_apply_file_config() {
        let mut config = Config::default();
        let file: ConfigFile = toml::from_str(
            r#"
            [network]
            request_timeout = 10
            [places]
            max_pages = 5
            page_delay = 1
            [emails]
            max_concurrency = 12
            [store]
            path = "data/records.csv"
            "#,
        )
        .unwrap();
        apply_file_config(&mut config, &file);
        assert_eq!(config.request_timeout, Duration::from_secs(10));
        assert_eq!(config.max_pages, 5);
        assert_eq!(config.page_delay, Duration::from_secs(1));
        assert_eq!(config.max_concurrency, 12);
        assert_eq!(config.store_path, PathBuf::from("data/records.csv"));
    }

    #[test]
    fn test_validate_clamps_zeroes() {
        let mut config = Config::default();
        config.max_pages = 0;
        config.max_concurrency = 0;
        validate_config(&mut config);
        assert_eq!(config.max_pages, 1);
        assert_eq!(config.max_concurrency, 1);
    }

    #[test]
    fn test_email_regex() {
        assert!(EMAIL_REGEX.is_match("info@example.com"));
        assert!(!EMAIL_REGEX.is_match("not-an-email"));
    }
}
