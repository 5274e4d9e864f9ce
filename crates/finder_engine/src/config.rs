use std::time::Duration;

use crate::{ConfigError, RetryPolicy};

/// Largest page the upstream search endpoint accepts.
pub const MAX_PAGE_SIZE: u32 = 50;

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub page_size: u32,
    /// Courtesy pause after each item; cut short by cancellation.
    pub item_delay: Duration,
    pub max_retries: u32,
    pub backoff_base: Duration,
    /// Ceiling for any single wait, including a server `Retry-After`.
    pub max_backoff: Duration,
    /// Assumed cost of one item, used only to derive the displayed estimate.
    pub per_item_latency: Duration,
    /// Upper bound for `offset + page_size`; paging of a genre stops before it.
    pub max_offset: Option<u32>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            page_size: MAX_PAGE_SIZE,
            item_delay: Duration::from_millis(100),
            max_retries: 3,
            backoff_base: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
            per_item_latency: Duration::from_millis(100),
            max_offset: Some(1000),
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.page_size == 0 || self.page_size > MAX_PAGE_SIZE {
            return Err(ConfigError::InvalidPageSize(self.page_size));
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            backoff_base: self.backoff_base,
            max_backoff: self.max_backoff,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CatalogSettings {
    pub api_base_url: String,
    pub token_url: String,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for CatalogSettings {
    fn default() -> Self {
        Self {
            api_base_url: "https://api.spotify.com/v1".to_string(),
            token_url: "https://accounts.spotify.com/api/token".to_string(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
        }
    }
}
