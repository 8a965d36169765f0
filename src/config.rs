use std::time::Duration;

use serde::Deserialize;

use crate::error::{AppError, AppResult};

/// Application configuration loaded from environment variables
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// TMDB API key (v3 auth)
    pub tmdb_api_key: String,

    /// TMDB API base URL
    #[serde(default = "default_tmdb_api_url")]
    pub tmdb_api_url: String,

    /// Per-request timeout in milliseconds
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Maximum attempts per upstream call (first try included)
    #[serde(default = "default_retry_max_attempts")]
    pub retry_max_attempts: u32,

    /// Base backoff delay in milliseconds, doubled on each retry
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    /// Consecutive failures before the circuit opens
    #[serde(default = "default_breaker_failure_threshold")]
    pub breaker_failure_threshold: u32,

    /// Cool-down before an open circuit admits a half-open probe, in milliseconds
    #[serde(default = "default_breaker_reset_ms")]
    pub breaker_reset_ms: u64,

    /// Deadline for secondary "enhancement" retrieval sources, in milliseconds
    #[serde(default = "default_enhancement_deadline_ms")]
    pub enhancement_deadline_ms: u64,

    /// Cache TTL for trending listings, in seconds
    #[serde(default = "default_trending_ttl")]
    pub trending_ttl: u64,

    /// Cache TTL for search results, in seconds
    #[serde(default = "default_search_ttl")]
    pub search_ttl: u64,

    /// Cache TTL for item details, in seconds
    #[serde(default = "default_details_ttl")]
    pub details_ttl: u64,

    /// Cache TTL for search suggestions, in seconds
    #[serde(default = "default_suggestions_ttl")]
    pub suggestions_ttl: u64,

    /// Cache TTL for personalized recommendation feeds, in seconds
    #[serde(default = "default_recommendations_ttl")]
    pub recommendations_ttl: u64,

    /// Cache TTL for proxied pass-through responses, in seconds
    #[serde(default = "default_proxy_ttl")]
    pub proxy_ttl: u64,

    /// Platform default language; suppressed as a taste signal
    #[serde(default = "default_language")]
    pub default_language: String,
}

fn default_tmdb_api_url() -> String {
    "https://api.themoviedb.org/3".to_string()
}

fn default_request_timeout_ms() -> u64 {
    8_000
}

fn default_retry_max_attempts() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    1_000
}

fn default_breaker_failure_threshold() -> u32 {
    5
}

fn default_breaker_reset_ms() -> u64 {
    30_000
}

fn default_enhancement_deadline_ms() -> u64 {
    1_500
}

fn default_trending_ttl() -> u64 {
    86_400 // 24 hours
}

fn default_search_ttl() -> u64 {
    900 // 15 minutes
}

fn default_details_ttl() -> u64 {
    43_200 // 12 hours
}

fn default_suggestions_ttl() -> u64 {
    3_600 // 1 hour
}

fn default_recommendations_ttl() -> u64 {
    1_800 // 30 minutes
}

fn default_proxy_ttl() -> u64 {
    900 // 15 minutes
}

fn default_language() -> String {
    "en".to_string()
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Fails fast when the API key is absent so that no request handler
    /// ever reaches the network with an unusable client.
    pub fn from_env() -> AppResult<Self> {
        dotenvy::dotenv().ok();
        let config = envy::from_env::<Config>()
            .map_err(|e| AppError::Config(format!("Failed to load config: {}", e)))?;

        if config.tmdb_api_key.trim().is_empty() {
            return Err(AppError::Config("TMDB_API_KEY must not be empty".to_string()));
        }

        Ok(config)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    pub fn breaker_reset(&self) -> Duration {
        Duration::from_millis(self.breaker_reset_ms)
    }

    pub fn enhancement_deadline(&self) -> Duration {
        Duration::from_millis(self.enhancement_deadline_ms)
    }
}

#[cfg(test)]
impl Config {
    /// Configuration for tests: tiny delays, deterministic defaults.
    pub fn for_tests(api_url: String) -> Self {
        Self {
            tmdb_api_key: "test_key".to_string(),
            tmdb_api_url: api_url,
            request_timeout_ms: 2_000,
            retry_max_attempts: 3,
            retry_base_delay_ms: 10,
            breaker_failure_threshold: 5,
            breaker_reset_ms: 50,
            enhancement_deadline_ms: 200,
            trending_ttl: 60,
            search_ttl: 60,
            details_ttl: 60,
            suggestions_ttl: 60,
            recommendations_ttl: 60,
            proxy_ttl: 60,
            default_language: "en".to_string(),
        }
    }
}
