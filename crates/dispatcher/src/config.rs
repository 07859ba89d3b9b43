//! Dispatch settings
//!
//! Deserialized from the `[dispatch]` table of the service config. Every field
//! has a default so an empty table is valid.

use std::time::Duration;

use key_pool::PoolSettings;
use serde::{Deserialize, Serialize};

use crate::backoff::Backoff;

/// Retry, backoff and per-key quota settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Retries after the first attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Exponential multiplier: the delay before retry `n` is `backoff_base^n` seconds.
    #[serde(default = "default_backoff_base")]
    pub backoff_base: f64,
    /// Sends allowed per key inside one rate-limit window.
    #[serde(default = "default_max_requests_per_minute")]
    pub max_requests_per_minute: u32,
    #[serde(default = "default_rate_limit_window_seconds")]
    pub rate_limit_window_seconds: u64,
    /// Uniform jitter applied to each delay, as a percentage (0-100).
    #[serde(default)]
    pub jitter_pct: u8,
    /// Upper bound on a computed delay, before jitter.
    #[serde(default)]
    pub max_backoff_seconds: Option<f64>,
}

fn default_max_retries() -> u32 {
    3
}

fn default_backoff_base() -> f64 {
    2.0
}

fn default_max_requests_per_minute() -> u32 {
    20
}

fn default_rate_limit_window_seconds() -> u64 {
    60
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            backoff_base: default_backoff_base(),
            max_requests_per_minute: default_max_requests_per_minute(),
            rate_limit_window_seconds: default_rate_limit_window_seconds(),
            jitter_pct: 0,
            max_backoff_seconds: None,
        }
    }
}

impl DispatchConfig {
    /// Check value ranges.
    pub fn validate(&self) -> common::Result<()> {
        if !self.backoff_base.is_finite() || self.backoff_base < 1.0 {
            return Err(common::Error::Config(format!(
                "backoff_base must be a finite number >= 1.0, got: {}",
                self.backoff_base
            )));
        }
        if self.max_requests_per_minute == 0 {
            return Err(common::Error::Config(
                "max_requests_per_minute must be greater than 0".into(),
            ));
        }
        if self.rate_limit_window_seconds == 0 {
            return Err(common::Error::Config(
                "rate_limit_window_seconds must be greater than 0".into(),
            ));
        }
        if self.jitter_pct > 100 {
            return Err(common::Error::Config(format!(
                "jitter_pct must be <= 100, got: {}",
                self.jitter_pct
            )));
        }
        if let Some(cap) = self.max_backoff_seconds
            && (!cap.is_finite() || cap <= 0.0)
        {
            return Err(common::Error::Config(format!(
                "max_backoff_seconds must be a positive number, got: {cap}"
            )));
        }
        Ok(())
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_seconds)
    }

    /// Quota settings for the key pool.
    pub fn pool_settings(&self) -> PoolSettings {
        PoolSettings {
            max_requests_per_window: self.max_requests_per_minute as usize,
            window: self.rate_limit_window(),
        }
    }

    /// Backoff schedule for the dispatcher.
    pub fn backoff(&self) -> Backoff {
        let backoff = Backoff::new(self.backoff_base).with_jitter(self.jitter_pct);
        match self.max_backoff_seconds {
            Some(cap) => backoff.with_cap(Duration::try_from_secs_f64(cap).unwrap_or(Duration::MAX)),
            None => backoff,
        }
    }
}
