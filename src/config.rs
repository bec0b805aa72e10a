//! Application-level configuration loading.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use serde_with::{DurationMilliSeconds, serde_as};
use tracing::{info, warn};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "REEL_PICK_CONFIG_PATH";
/// Environment variable holding the TMDB bearer token.
const TMDB_TOKEN_ENV: &str = "TMDB_API_TOKEN";

const DEFAULT_MAX_POOL_SIZE: usize = 100;
const DEFAULT_TRANSITION_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_FEED_CAPACITY: usize = 64;

/// What happens to a session once a winner is found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionPolicy {
    /// Keep the session in `Complete` with the winner and its title record.
    #[default]
    Retain,
    /// Delete the session, its titles and statuses.
    Delete,
}

/// Settings of the movie metadata provider.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MetadataConfig {
    /// API root, e.g. `https://api.themoviedb.org/3`.
    pub base_url: String,
    /// Prefix turning a poster path into a URL.
    pub image_base_url: String,
    /// Locale requested from the provider.
    pub language: String,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.themoviedb.org/3".into(),
            image_base_url: "https://image.tmdb.org/t/p/w500".into(),
            language: "pl-PL".into(),
        }
    }
}

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    max_pool_size: usize,
    transition_timeout: Option<Duration>,
    completion: CompletionPolicy,
    feed_capacity: usize,
    metadata: MetadataConfig,
    metadata_token: Option<String>,
}

impl AppConfig {
    /// Load the configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        let config = match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let app_config: Self = raw.into();
                    info!(
                        path = %path.display(),
                        max_pool_size = app_config.max_pool_size,
                        completion = ?app_config.completion,
                        "loaded configuration"
                    );
                    app_config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        };

        let token = env::var(TMDB_TOKEN_ENV)
            .ok()
            .filter(|token| !token.trim().is_empty());
        if token.is_none() {
            info!("{TMDB_TOKEN_ENV} not set; titles will use placeholder metadata");
        }
        Self {
            metadata_token: token,
            ..config
        }
    }

    /// Largest pool a session may hold; larger inputs are sampled down.
    pub fn max_pool_size(&self) -> usize {
        self.max_pool_size
    }

    /// Upper bound on a phase-exit transformation, `None` to wait indefinitely.
    pub fn transition_timeout(&self) -> Option<Duration> {
        self.transition_timeout
    }

    /// Completion behaviour.
    pub fn completion(&self) -> CompletionPolicy {
        self.completion
    }

    /// Buffered change events per feed subscriber.
    pub fn feed_capacity(&self) -> usize {
        self.feed_capacity
    }

    /// Metadata provider settings.
    pub fn metadata(&self) -> &MetadataConfig {
        &self.metadata
    }

    /// TMDB bearer token, when configured.
    pub fn metadata_token(&self) -> Option<&str> {
        self.metadata_token.as_deref()
    }

    /// Override the completion policy.
    pub fn with_completion(mut self, completion: CompletionPolicy) -> Self {
        self.completion = completion;
        self
    }

    /// Override the transition timeout.
    pub fn with_transition_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.transition_timeout = timeout;
        self
    }

    /// Override the maximum pool size.
    pub fn with_max_pool_size(mut self, max_pool_size: usize) -> Self {
        self.max_pool_size = max_pool_size.max(1);
        self
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        RawConfig::default().into()
    }
}

#[serde_as]
#[derive(Debug, Deserialize)]
#[serde(default)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    max_pool_size: usize,
    #[serde_as(as = "Option<DurationMilliSeconds<u64>>")]
    transition_timeout_ms: Option<Duration>,
    completion: CompletionPolicy,
    feed_capacity: usize,
    metadata: MetadataConfig,
}

impl Default for RawConfig {
    fn default() -> Self {
        Self {
            max_pool_size: DEFAULT_MAX_POOL_SIZE,
            transition_timeout_ms: Some(DEFAULT_TRANSITION_TIMEOUT),
            completion: CompletionPolicy::default(),
            feed_capacity: DEFAULT_FEED_CAPACITY,
            metadata: MetadataConfig::default(),
        }
    }
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        Self {
            max_pool_size: value.max_pool_size.max(1),
            transition_timeout: value.transition_timeout_ms,
            completion: value.completion,
            feed_capacity: value.feed_capacity.max(1),
            metadata: value.metadata,
            metadata_token: None,
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config: AppConfig = serde_json::from_str::<RawConfig>("{}").unwrap().into();
        assert_eq!(config.max_pool_size(), 100);
        assert_eq!(config.transition_timeout(), Some(Duration::from_secs(5)));
        assert_eq!(config.completion(), CompletionPolicy::Retain);
        assert_eq!(config.metadata().language, "pl-PL");
    }

    #[test]
    fn fields_override_defaults() {
        let raw = r#"{
            "max_pool_size": 40,
            "transition_timeout_ms": 250,
            "completion": "delete",
            "metadata": { "language": "en-US" }
        }"#;
        let config: AppConfig = serde_json::from_str::<RawConfig>(raw).unwrap().into();
        assert_eq!(config.max_pool_size(), 40);
        assert_eq!(config.transition_timeout(), Some(Duration::from_millis(250)));
        assert_eq!(config.completion(), CompletionPolicy::Delete);
        assert_eq!(config.metadata().language, "en-US");
        assert_eq!(
            config.metadata().base_url,
            MetadataConfig::default().base_url
        );
    }

    #[test]
    fn null_timeout_disables_it() {
        let config: AppConfig = serde_json::from_str::<RawConfig>(r#"{"transition_timeout_ms": null}"#)
            .unwrap()
            .into();
        assert_eq!(config.transition_timeout(), None);
    }
}
