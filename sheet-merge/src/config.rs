//! Merge configuration with builder pattern
//!
//! Built once at startup and handed to the client and the merger. Values come
//! from the presets below, the builder, or the environment.

use std::time::Duration;

use reqwest::StatusCode;

use crate::api::resilience::RetryConfig;
use crate::error::MergeError;
use crate::merge::{CollisionPolicy, MergeKind};

pub const DEFAULT_GRAPH_URL: &str = "https://graph.microsoft.com/v1.0";

pub const ENV_GRAPH_URL: &str = "SHEET_MERGE_GRAPH_URL";
pub const ENV_RETRY_ATTEMPTS: &str = "SHEET_MERGE_RETRY_ATTEMPTS";
pub const ENV_RETRY_DELAY_MS: &str = "SHEET_MERGE_RETRY_DELAY_MS";
pub const ENV_COLLISION: &str = "SHEET_MERGE_COLLISION";

/// Template sheet used when a request does not name one
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateDefaults {
    pub teacher: String,
    pub admin: String,
}

impl Default for TemplateDefaults {
    fn default() -> Self {
        Self {
            teacher: "Template".to_string(),
            admin: "Admin Template".to_string(),
        }
    }
}

impl TemplateDefaults {
    pub fn for_kind(&self, kind: MergeKind) -> &str {
        match kind {
            MergeKind::Teacher => &self.teacher,
            MergeKind::Admin => &self.admin,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergeConfig {
    pub graph_base_url: String,
    pub user_agent: String,
    pub retry: RetryConfig,
    pub collision: CollisionPolicy,
    pub templates: TemplateDefaults,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            graph_base_url: DEFAULT_GRAPH_URL.to_string(),
            user_agent: concat!("sheet-merge/", env!("CARGO_PKG_VERSION")).to_string(),
            retry: RetryConfig::default(),
            collision: CollisionPolicy::Reject,
            templates: TemplateDefaults::default(),
        }
    }
}

impl MergeConfig {
    pub fn builder() -> MergeConfigBuilder {
        MergeConfigBuilder::new()
    }

    /// No waiting between upload attempts
    pub fn testing() -> Self {
        Self {
            retry: RetryConfig {
                delay: Duration::ZERO,
                ..RetryConfig::default()
            },
            ..Self::default()
        }
    }

    pub fn from_env() -> Result<Self, MergeError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for the `SHEET_MERGE_*` keys.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, MergeError> {
        let mut config = Self::default();
        let value = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = value(ENV_GRAPH_URL) {
            let url = url.trim().trim_end_matches('/').to_string();
            if !(url.starts_with("https://") || url.starts_with("http://")) {
                return Err(MergeError::Configuration(format!(
                    "{ENV_GRAPH_URL} must be an http(s) URL, got '{url}'"
                )));
            }
            config.graph_base_url = url;
        }
        if let Some(attempts) = value(ENV_RETRY_ATTEMPTS) {
            config.retry.max_attempts = match attempts.trim().parse::<u32>() {
                Ok(n) if n >= 1 => n,
                _ => {
                    return Err(MergeError::Configuration(format!(
                        "{ENV_RETRY_ATTEMPTS} must be a positive integer, got '{attempts}'"
                    )));
                }
            };
        }
        if let Some(delay) = value(ENV_RETRY_DELAY_MS) {
            let millis = delay.trim().parse::<u64>().map_err(|_| {
                MergeError::Configuration(format!(
                    "{ENV_RETRY_DELAY_MS} must be a number of milliseconds, got '{delay}'"
                ))
            })?;
            config.retry.delay = Duration::from_millis(millis);
        }
        if let Some(policy) = value(ENV_COLLISION) {
            config.collision = policy.parse()?;
        }
        Ok(config)
    }
}

/// Builder for MergeConfig
#[derive(Debug)]
pub struct MergeConfigBuilder {
    config: MergeConfig,
}

impl MergeConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: MergeConfig::default(),
        }
    }

    pub fn graph_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.graph_base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    /// Replace the whole retry configuration
    pub fn retry_config(mut self, retry: RetryConfig) -> Self {
        self.config.retry = retry;
        self
    }

    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.config.retry.max_attempts = attempts.max(1);
        self
    }

    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.config.retry.delay = delay;
        self
    }

    /// Statuses treated as a lock conflict
    pub fn retry_statuses(mut self, statuses: Vec<StatusCode>) -> Self {
        self.config.retry.retry_statuses = statuses;
        self
    }

    pub fn collision(mut self, policy: CollisionPolicy) -> Self {
        self.config.collision = policy;
        self
    }

    pub fn teacher_template(mut self, name: impl Into<String>) -> Self {
        self.config.templates.teacher = name.into();
        self
    }

    pub fn admin_template(mut self, name: impl Into<String>) -> Self {
        self.config.templates.admin = name.into();
        self
    }

    pub fn build(self) -> MergeConfig {
        self.config
    }
}

impl Default for MergeConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
