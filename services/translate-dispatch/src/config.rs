//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! API keys come from the TRANSLATE_API_KEYS env var or `keys.key_file`,
//! never from the TOML body, so the config file can be committed.

use common::ApiKey;
use dispatcher::DispatchConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Env var holding comma-separated API keys. Overrides `keys.key_file`.
pub const KEYS_ENV: &str = "TRANSLATE_API_KEYS";

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub dispatch: DispatchConfig,
    pub provider: ProviderConfig,
    #[serde(default)]
    pub keys: KeysConfig,
    /// Resolved credentials, named `key1..keyN` in source order.
    #[serde(skip)]
    pub api_keys: Vec<ApiKey>,
}

/// Upstream chat-completions endpoint
#[derive(Debug, Deserialize)]
pub struct ProviderConfig {
    pub api_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Model filled into payloads that do not name one, and used by the
    /// health probe.
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

/// Where to read API keys from when the env var is unset
#[derive(Debug, Default, Deserialize)]
pub struct KeysConfig {
    /// One key per line; blank lines and `#` comments are skipped.
    #[serde(default)]
    pub key_file: Option<PathBuf>,
}

fn default_timeout() -> u64 {
    60
}

fn default_concurrency() -> usize {
    4
}

impl Config {
    /// Load configuration from a TOML file, validate it, then resolve keys.
    ///
    /// Key resolution order:
    /// 1. TRANSLATE_API_KEYS env var
    /// 2. key_file path from config
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        if !config.provider.api_url.starts_with("http://")
            && !config.provider.api_url.starts_with("https://")
        {
            return Err(common::Error::Config(format!(
                "api_url must start with http:// or https://, got: {}",
                config.provider.api_url
            )));
        }

        if config.provider.timeout_secs == 0 {
            return Err(common::Error::Config(
                "timeout_secs must be greater than 0".into(),
            ));
        }

        if config.provider.concurrency == 0 {
            return Err(common::Error::Config(
                "concurrency must be greater than 0".into(),
            ));
        }

        config.dispatch.validate()?;

        let raw = match std::env::var(KEYS_ENV) {
            Ok(value) => parse_key_list(&value),
            Err(_) => match config.keys.key_file {
                Some(ref key_file) => {
                    let contents = std::fs::read_to_string(key_file).map_err(|e| {
                        common::Error::Keys(format!(
                            "failed to read key_file {}: {e}",
                            key_file.display()
                        ))
                    })?;
                    parse_key_file(&contents)
                }
                None => Vec::new(),
            },
        };

        if raw.is_empty() {
            return Err(common::Error::Keys(format!(
                "no API keys configured: set {KEYS_ENV} or keys.key_file"
            )));
        }
        config.api_keys = ApiKey::numbered(raw);

        Ok(config)
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&Path>) -> PathBuf {
        if let Some(p) = cli_path {
            return p.to_path_buf();
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("translate-dispatch.toml")
    }
}

fn parse_key_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_owned)
        .collect()
}

fn parse_key_file(contents: &str) -> Vec<String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_owned)
        .collect()
}
